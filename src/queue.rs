use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryKind {
    LifeStory,
    Horror,
    Facts,
    History,
    News,
}

impl StoryKind {
    pub fn scope(&self) -> &'static str {
        match self {
            StoryKind::LifeStory => "life_story",
            StoryKind::Horror => "horror",
            StoryKind::Facts => "facts",
            StoryKind::History => "history",
            StoryKind::News => "news",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            StoryKind::LifeStory => "\u{1f4f1}",
            StoryKind::Horror => "\u{1f631}",
            StoryKind::Facts => "\u{1f4a1}",
            StoryKind::History => "\u{1f4dc}",
            StoryKind::News => "\u{1f4f0}",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StoryKind::LifeStory => "Life story",
            StoryKind::Horror => "Horror story",
            StoryKind::Facts => "Interesting facts",
            StoryKind::History => "Historical facts",
            StoryKind::News => "Latest news",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    StockVideo,
    Animation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerPosition {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BannerConfig {
    pub file: String,
    #[serde(default = "default_banner_position")]
    pub position: BannerPosition,
}

fn default_banner_position() -> BannerPosition {
    BannerPosition::Center
}

#[derive(Debug, Clone)]
pub enum JobParams {
    ClipExtraction {
        kind: String,
        collection: String,
        min_sec: u32,
        max_sec: u32,
        banner: Option<BannerConfig>,
    },
    NarratedStory {
        kind: StoryKind,
        language: String,
        target_sec: u32,
        preset: String,
        voice: Option<String>,
        voice_name: Option<String>,
        speed: f64,
        background: BackgroundMode,
        fps: u32,
        subs_lang: Option<String>,
    },
}

impl JobParams {
    pub fn kind_label(&self) -> &'static str {
        match self {
            JobParams::ClipExtraction { .. } => "cuts",
            JobParams::NarratedStory { kind, .. } => kind.scope(),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            JobParams::ClipExtraction { .. } => "\u{2702}\u{fe0f}",
            JobParams::NarratedStory { kind, .. } => kind.emoji(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub video_path: PathBuf,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub requester: i64,
    pub channel: Option<String>,
    pub params: JobParams,
    pub status: JobStatus,
    pub created_at: f64,
    pub seq: u64,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub result: Option<JobOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Default)]
struct JobStore {
    jobs: HashMap<String, JobRecord>,
    by_user: HashMap<i64, Vec<String>>,
    counter: u64,
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// All mutation funnels through these methods; the store lock is never held
// across an await point.
pub struct TaskQueue {
    store: Mutex<JobStore>,
    tx: UnboundedSender<String>,
}

impl TaskQueue {
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                store: Mutex::new(JobStore::default()),
                tx,
            },
            rx,
        )
    }

    pub fn submit(
        &self,
        requester: i64,
        channel: Option<String>,
        params: JobParams,
    ) -> JobRecord {
        let mut store = self.store.lock().unwrap();
        store.counter += 1;
        let seq = store.counter;
        let created_at = now_unix();
        let id = format!("job_{}_{}", created_at as u64, seq);

        let record = JobRecord {
            id: id.clone(),
            requester,
            channel,
            params,
            status: JobStatus::Pending,
            created_at,
            seq,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        };

        store.jobs.insert(id.clone(), record.clone());
        store.by_user.entry(requester).or_default().push(id.clone());
        // An unbounded channel: submission never fails and never suspends.
        let _ = self.tx.send(id.clone());

        info!("Queued {} job {} for user {}", record.params.kind_label(), id, requester);
        record
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.store.lock().unwrap().jobs.get(job_id).cloned()
    }

    pub fn list_for(&self, requester: i64, status: Option<JobStatus>) -> Vec<JobRecord> {
        let store = self.store.lock().unwrap();
        let ids = match store.by_user.get(&requester) {
            Some(ids) => ids,
            None => return Vec::new(),
        };
        let mut jobs: Vec<JobRecord> = ids
            .iter()
            .filter_map(|id| store.jobs.get(id))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        // Newest first; the submission sequence breaks wall-clock ties.
        jobs.sort_by(|a, b| {
            b.created_at
                .partial_cmp(&a.created_at)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.seq.cmp(&a.seq))
        });
        jobs
    }

    /// 1-based rank among pending jobs, `None` once the job left the queue.
    pub fn position_of(&self, job_id: &str) -> Option<usize> {
        let store = self.store.lock().unwrap();
        let job = store.jobs.get(job_id)?;
        if job.status != JobStatus::Pending {
            return None;
        }
        let ahead = store
            .jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && (j.created_at, j.seq) < (job.created_at, job.seq)
            })
            .count();
        Some(ahead + 1)
    }

    pub fn stats(&self) -> QueueStats {
        let store = self.store.lock().unwrap();
        let mut stats = QueueStats {
            total: store.jobs.len(),
            ..QueueStats::default()
        };
        for job in store.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub(crate) fn mark_running(&self, job_id: &str) -> Option<JobRecord> {
        let mut store = self.store.lock().unwrap();
        let job = store.jobs.get_mut(job_id)?;
        job.status = JobStatus::Running;
        job.started_at = Some(now_unix());
        Some(job.clone())
    }

    pub(crate) fn complete(&self, job_id: &str, outcome: JobOutcome) -> Option<JobRecord> {
        let mut store = self.store.lock().unwrap();
        let job = store.jobs.get_mut(job_id)?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(now_unix());
        job.result = Some(outcome);
        job.error = None;
        Some(job.clone())
    }

    pub(crate) fn fail(&self, job_id: &str, error: String) -> Option<JobRecord> {
        let mut store = self.store.lock().unwrap();
        let job = store.jobs.get_mut(job_id)?;
        job.status = JobStatus::Failed;
        job.completed_at = Some(now_unix());
        job.error = Some(error);
        job.result = None;
        Some(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cut_params() -> JobParams {
        JobParams::ClipExtraction {
            kind: "cartoons".into(),
            collection: "classics".into(),
            min_sec: 180,
            max_sec: 240,
            banner: None,
        }
    }

    #[test]
    fn submit_returns_pending_record_with_unique_ids() {
        let (queue, _rx) = TaskQueue::new();
        let a = queue.submit(1, None, cut_params());
        let b = queue.submit(1, None, cut_params());
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, JobStatus::Pending);
        assert!(a.started_at.is_none());
        assert!(a.result.is_none() && a.error.is_none());
    }

    #[test]
    fn position_is_fifo_and_none_once_not_pending() {
        let (queue, _rx) = TaskQueue::new();
        let a = queue.submit(1, None, cut_params());
        let b = queue.submit(2, None, cut_params());
        let c = queue.submit(1, None, cut_params());

        assert_eq!(queue.position_of(&a.id), Some(1));
        assert_eq!(queue.position_of(&b.id), Some(2));
        assert_eq!(queue.position_of(&c.id), Some(3));

        queue.mark_running(&a.id);
        assert_eq!(queue.position_of(&a.id), None);
        assert_eq!(queue.position_of(&b.id), Some(1));
        assert_eq!(queue.position_of("job_0_999"), None);
    }

    #[test]
    fn list_for_is_newest_first_and_filters_by_status() {
        let (queue, _rx) = TaskQueue::new();
        let a = queue.submit(7, None, cut_params());
        let b = queue.submit(7, None, cut_params());
        queue.submit(8, None, cut_params());

        let all = queue.list_for(7, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);

        queue.mark_running(&a.id);
        queue.fail(&a.id, "boom".into());
        let failed = queue.list_for(7, Some(JobStatus::Failed));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a.id);
    }

    #[test]
    fn terminal_states_are_exclusive() {
        let (queue, _rx) = TaskQueue::new();
        let a = queue.submit(1, None, cut_params());
        let b = queue.submit(1, None, cut_params());

        queue.mark_running(&a.id);
        let done = queue
            .complete(
                &a.id,
                JobOutcome {
                    video_path: "out.mp4".into(),
                    caption: "done".into(),
                },
            )
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.result.is_some() && done.error.is_none());
        assert!(done.started_at.is_some() && done.completed_at.is_some());

        queue.mark_running(&b.id);
        let failed = queue.fail(&b.id, "provider exploded".into()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.result.is_none() && failed.error.is_some());
    }

    #[test]
    fn stats_count_per_status() {
        let (queue, _rx) = TaskQueue::new();
        let a = queue.submit(1, None, cut_params());
        queue.submit(2, None, cut_params());
        queue.mark_running(&a.id);

        let stats = queue.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn queued_ids_arrive_in_submission_order() {
        let (queue, mut rx) = TaskQueue::new();
        let a = queue.submit(1, None, cut_params());
        let b = queue.submit(2, None, cut_params());
        assert_eq!(rx.try_recv().unwrap(), a.id);
        assert_eq!(rx.try_recv().unwrap(), b.id);
    }
}
