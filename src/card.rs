use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use anyhow::Context;
use image::{Rgba, RgbaImage};
use tracing::{debug, info};

pub const CANVAS_W: u32 = 1080;
pub const CANVAS_H: u32 = 960;

const LINE_H_TITLE: f32 = 72.0;
const LINE_H_BODY: f32 = 56.0;
const TITLE_PX: f32 = 56.0;
const BODY_PX: f32 = 40.0;
const SMALL_PX: f32 = 28.0;

const CARD_FILL: Rgba<u8> = Rgba([255, 255, 255, 235]);
const TITLE_COLOR: Rgba<u8> = Rgba([33, 33, 33, 255]);
const BODY_COLOR: Rgba<u8> = Rgba([35, 35, 35, 255]);
const ACCENT_COLOR: Rgba<u8> = Rgba([237, 90, 49, 255]);
const META_COLOR: Rgba<u8> = Rgba([110, 110, 110, 255]);
const DIVIDER_COLOR: Rgba<u8> = Rgba([230, 230, 230, 255]);

const CURSOR_W: u32 = 8;
const CURSOR_H_RATIO: f32 = 0.78;
const CURSOR_COLOR: Rgba<u8> = Rgba([35, 35, 35, 255]);

#[derive(Debug, Clone)]
pub struct CardTheme {
    pub community: String,
    pub meta: String,
}

impl Default for CardTheme {
    fn default() -> Self {
        Self {
            community: "r/AskReddit".to_string(),
            meta: "\u{2191} 12.3k \u{2022} 6 hours ago".to_string(),
        }
    }
}

/// One paginated slice of the body text, as char offsets into the
/// sanitized body string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: usize,
    pub end: usize,
}

pub struct CardRenderer {
    font: FontVec,
}

fn sanitize_singleline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl CardRenderer {
    pub fn from_font_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("failed to parse font {}", path.display()))?;
        Ok(Self { font })
    }

    pub fn find_system_font() -> Option<PathBuf> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/Library/Fonts/Arial.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    fn text_width(&self, text: &str, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut width = 0.0;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }

    fn wrap(&self, text: &str, px: f32, max_width: f32) -> Vec<String> {
        let text = sanitize_singleline(text);
        if text.is_empty() {
            return Vec::new();
        }
        let mut lines = Vec::new();
        let mut cur = String::new();
        for word in text.split(' ') {
            let test = if cur.is_empty() {
                word.to_string()
            } else {
                format!("{cur} {word}")
            };
            if self.text_width(&test, px) <= max_width {
                cur = test;
            } else {
                if !cur.is_empty() {
                    lines.push(cur);
                }
                cur = word.to_string();
            }
        }
        if !cur.is_empty() {
            lines.push(cur);
        }
        lines
    }

    fn draw_text(&self, img: &mut RgbaImage, x: f32, y: f32, text: &str, px: f32, color: Rgba<u8>) {
        let scale = PxScale::from(px);
        let scaled = self.font.as_scaled(scale);
        let baseline = y + scaled.ascent();
        let mut pen_x = x;
        let mut prev = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                pen_x += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(scale, point(pen_x, baseline));
            if let Some(outline) = self.font.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                outline.draw(|gx, gy, cov| {
                    let px_x = bounds.min.x as i32 + gx as i32;
                    let px_y = bounds.min.y as i32 + gy as i32;
                    if px_x >= 0
                        && px_y >= 0
                        && (px_x as u32) < img.width()
                        && (px_y as u32) < img.height()
                    {
                        blend(img, px_x as u32, px_y as u32, color, cov);
                    }
                });
            }
            pen_x += scaled.h_advance(id);
            prev = Some(id);
        }
    }

    /// Greedy word packing against the card height available below the
    /// rendered title. Computed once per job from actual font metrics.
    pub fn paginate(&self, title: &str, body: &str) -> Vec<Page> {
        let body = sanitize_singleline(body);
        let card_w = (CANVAS_W as f32 * 0.6) as i32;
        let card_h = (CANVAS_H as f32 * 0.86) as i32;
        let text_w = (card_w - 64) as f32;

        let title_lines = self.wrap(title, TITLE_PX, text_w).len().max(1);
        let header_h = 24.0 + 44.0 + 44.0 + title_lines as f32 * LINE_H_TITLE + 36.0;
        let available = card_h as f32 - header_h - 64.0;
        let max_lines = ((available / LINE_H_BODY) as usize).max(1);

        let mut pages = Vec::new();
        let mut start = 0usize;
        let mut cur = String::new();
        for word in body.split(' ').filter(|w| !w.is_empty()) {
            let test = if cur.is_empty() {
                word.to_string()
            } else {
                format!("{cur} {word}")
            };
            if self.wrap(&test, BODY_PX, text_w).len() > max_lines {
                if !cur.is_empty() {
                    let len = cur.chars().count();
                    pages.push(Page { start, end: start + len });
                    start += len + 1;
                    cur = word.to_string();
                } else {
                    let len = word.chars().count();
                    pages.push(Page { start, end: start + len });
                    start += len + 1;
                }
            } else {
                cur = test;
            }
        }
        if !cur.is_empty() {
            let len = cur.chars().count();
            pages.push(Page { start, end: start + len });
        }
        if pages.is_empty() {
            pages.push(Page { start: 0, end: body.chars().count() });
        }
        pages
    }

    fn page_for(pages: &[Page], shown_chars: usize) -> usize {
        for (idx, page) in pages.iter().enumerate() {
            if shown_chars <= page.end {
                return idx;
            }
        }
        pages.len() - 1
    }

    fn draw_card(&self, img: &mut RgbaImage, title: &str, visible: &str, show_cursor: bool, theme: &CardTheme) {
        let w = CANVAS_W as f32;
        let h = CANVAS_H as f32;
        let card_w = w * 0.6;
        let card_h = h * 0.86;
        let card_x = w * 0.2;
        let card_y = ((h - card_h) / 2.0).max(0.0);

        fill_rounded_rect(
            img,
            card_x as i32,
            card_y as i32,
            (card_x + card_w) as i32,
            (card_y + card_h) as i32,
            32,
            CARD_FILL,
        );

        let text_x = card_x + 32.0;
        let text_w = card_w - 64.0;
        self.draw_text(img, text_x, card_y + 24.0, &theme.community, SMALL_PX, ACCENT_COLOR);
        self.draw_text(img, text_x, card_y + 24.0 + 44.0, &theme.meta, SMALL_PX, META_COLOR);

        let mut cur_y = card_y + 24.0 + 44.0 + 44.0;
        for line in self.wrap(title, TITLE_PX, text_w) {
            self.draw_text(img, text_x, cur_y, &line, TITLE_PX, TITLE_COLOR);
            cur_y += LINE_H_TITLE;
        }

        fill_rect(
            img,
            text_x as i32,
            (cur_y + 16.0) as i32,
            (text_x + text_w) as i32,
            (cur_y + 16.0) as i32 + 3,
            DIVIDER_COLOR,
        );
        cur_y += 36.0;

        let body_lines = self.wrap(visible, BODY_PX, text_w);
        let mut last_line: Option<String> = None;
        for line in &body_lines {
            if cur_y + LINE_H_BODY > card_y + card_h - 32.0 {
                break;
            }
            self.draw_text(img, text_x, cur_y, line, BODY_PX, BODY_COLOR);
            cur_y += LINE_H_BODY;
            last_line = Some(line.clone());
        }

        if show_cursor {
            if let Some(last) = last_line {
                let x = text_x + self.text_width(&last, BODY_PX) + 4.0;
                let caret_h = LINE_H_BODY * CURSOR_H_RATIO;
                let y_top = cur_y - LINE_H_BODY + 6.0;
                fill_rect(
                    img,
                    x as i32,
                    y_top as i32,
                    x as i32 + CURSOR_W as i32,
                    (y_top + caret_h) as i32,
                    CURSOR_COLOR,
                );
            }
        }
    }

    /// Renders one PNG per output frame into `out_dir`, revealing the body
    /// with a typewriter effect timed to the measured narration duration.
    /// Returns the number of frames written.
    pub fn render_frames(
        &self,
        out_dir: &Path,
        raw_title: &str,
        raw_body: &str,
        fps: u32,
        duration: f64,
        theme: &CardTheme,
    ) -> anyhow::Result<usize> {
        std::fs::create_dir_all(out_dir)?;
        let fps = fps.max(1);
        let total_frames = (duration.max(0.1) * fps as f64).ceil() as usize;

        let title = sanitize_singleline(raw_title);
        let mut body = sanitize_singleline(raw_body);
        if body.is_empty() {
            body.push(' ');
        }
        let body_chars: Vec<char> = body.chars().collect();
        let total_chars = body_chars.len().max(1);

        // The reveal finishes half a second early so the full page holds.
        let typing_frames = (total_frames as i64 - (fps / 2) as i64).max(1) as usize;
        let pages = self.paginate(&title, &body);
        info!(
            "Rendering {} card frames ({} pages) at {} fps",
            total_frames,
            pages.len(),
            fps
        );

        let mut prev_key: Option<(usize, usize, bool)> = None;
        let mut prev_path: Option<PathBuf> = None;
        for i in 0..total_frames {
            let shown = if i < typing_frames {
                (i as f64 / typing_frames as f64 * total_chars as f64) as usize
            } else {
                total_chars
            };
            let show_cursor = shown < total_chars && (i / 6) % 2 == 0;
            let page_idx = Self::page_for(&pages, shown);
            let page = pages[page_idx];
            let visible_end = shown.min(page.end);

            let frame_path = out_dir.join(format!("frame_{:05}.png", i));
            let key = (page_idx, visible_end, show_cursor);
            if prev_key == Some(key) {
                if let Some(prev) = &prev_path {
                    std::fs::copy(prev, &frame_path)?;
                    continue;
                }
            }

            let visible: String = body_chars[page.start.min(visible_end)..visible_end]
                .iter()
                .collect();
            let mut img = RgbaImage::from_pixel(CANVAS_W, CANVAS_H, Rgba([0, 0, 0, 0]));
            self.draw_card(&mut img, &title, &visible, show_cursor, theme);
            img.save(&frame_path)?;
            debug!("Wrote {}", frame_path.display());
            prev_key = Some(key);
            prev_path = Some(frame_path);
        }

        Ok(total_frames)
    }
}

fn blend(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>, coverage: f32) {
    let alpha = (color.0[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let dst = img.get_pixel_mut(x, y);
    let inv = 1.0 - alpha;
    for c in 0..3 {
        dst.0[c] = (color.0[c] as f32 * alpha + dst.0[c] as f32 * inv) as u8;
    }
    dst.0[3] = ((alpha + dst.0[3] as f32 / 255.0 * inv) * 255.0) as u8;
}

fn fill_rect(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    for y in y0.max(0)..y1.min(img.height() as i32) {
        for x in x0.max(0)..x1.min(img.width() as i32) {
            blend(img, x as u32, y as u32, color, 1.0);
        }
    }
}

fn fill_rounded_rect(
    img: &mut RgbaImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    radius: i32,
    color: Rgba<u8>,
) {
    let r = radius as f32;
    for y in y0.max(0)..y1.min(img.height() as i32) {
        for x in x0.max(0)..x1.min(img.width() as i32) {
            let dx = if x < x0 + radius {
                (x0 + radius - x) as f32
            } else if x > x1 - 1 - radius {
                (x - (x1 - 1 - radius)) as f32
            } else {
                0.0
            };
            let dy = if y < y0 + radius {
                (y0 + radius - y) as f32
            } else if y > y1 - 1 - radius {
                (y - (y1 - 1 - radius)) as f32
            } else {
                0.0
            };
            if dx * dx + dy * dy <= r * r {
                blend(img, x as u32, y as u32, color, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> Option<CardRenderer> {
        CardRenderer::find_system_font().map(|p| CardRenderer::from_font_file(&p).unwrap())
    }

    #[test]
    fn frame_count_matches_duration_within_one_frame() {
        let Some(r) = renderer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let frames = r
            .render_frames(
                dir.path(),
                "My Title",
                "Sentence one. Sentence two.",
                12,
                3.3,
                &CardTheme::default(),
            )
            .unwrap();
        // ceil(3.3 * 12) = 40; playback length frames/fps is within one frame.
        assert_eq!(frames, 40);
        assert!(dir.path().join("frame_00000.png").exists());
        assert!(dir.path().join("frame_00039.png").exists());
        assert!(!dir.path().join("frame_00040.png").exists());
    }

    #[test]
    fn pages_tile_the_body_contiguously() {
        let Some(r) = renderer() else { return };
        let body = "word ".repeat(600);
        let pages = r.paginate("Title", &body);
        assert!(pages.len() > 1);
        let sanitized_len = sanitize_singleline(&body).chars().count();
        assert_eq!(pages[0].start, 0);
        for w in pages.windows(2) {
            assert_eq!(w[1].start, w[0].end + 1);
        }
        assert_eq!(pages.last().unwrap().end, sanitized_len);
    }

    #[test]
    fn empty_body_still_renders() {
        let Some(r) = renderer() else { return };
        let dir = tempfile::tempdir().unwrap();
        let frames = r
            .render_frames(dir.path(), "Only a title", "", 10, 1.0, &CardTheme::default())
            .unwrap();
        assert_eq!(frames, 10);
    }

    #[test]
    fn wrapping_respects_width() {
        let Some(r) = renderer() else { return };
        let lines = r.wrap("a few words that will definitely not fit on one narrow line", BODY_PX, 200.0);
        assert!(lines.len() > 1);
        for line in lines {
            assert!(r.text_width(&line, BODY_PX) <= 200.0 || !line.contains(' '));
        }
    }
}
