use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window};

use crate::cli::HELP_KEYS;
use crate::controller::{Intent, Outcome, ViewerController};
use crate::decoder::ImageDecoder;
use crate::prefetch::{Side, SlotState};
use crate::ui::render::{
    BG_COLOR, ERROR_RED, WHITE, blit_centered, draw_text, fill_rect, rgb, text_width,
};

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// Presentation-side state wrapped around the controller.
pub struct ViewerState {
    pub controller: ViewerController<ImageDecoder>,
    pub is_fullscreen: bool,
    pub show_help: bool,
    pub show_info: bool,
}

/// What a key press asks the window to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Intent(Intent),
    ToggleFullscreen,
    ToggleHelp,
    ToggleInfo,
}

/// Map a key to an action. Auto-repeat only drives navigation.
pub fn key_action(key: &Key, repeat: bool) -> Option<KeyAction> {
    let action = match key {
        Key::Named(NamedKey::ArrowRight | NamedKey::Space) => KeyAction::Intent(Intent::Next),
        Key::Named(NamedKey::ArrowLeft) => KeyAction::Intent(Intent::Prev),
        Key::Named(NamedKey::Enter) => KeyAction::Intent(Intent::Pick),
        Key::Named(NamedKey::Escape) => KeyAction::Intent(Intent::Quit),
        Key::Character(s) => match s.chars().next()? {
            'l' | 'L' => KeyAction::Intent(Intent::Next),
            'h' | 'H' => KeyAction::Intent(Intent::Prev),
            'p' | 'P' => KeyAction::Intent(Intent::Pick),
            'q' | 'Q' => KeyAction::Intent(Intent::Quit),
            'f' | 'F' => KeyAction::ToggleFullscreen,
            '?' => KeyAction::ToggleHelp,
            'i' | 'I' => KeyAction::ToggleInfo,
            _ => return None,
        },
        _ => return None,
    };
    let navigates = matches!(action, KeyAction::Intent(Intent::Next | Intent::Prev));
    if repeat && !navigates {
        return None;
    }
    Some(action)
}

impl ViewerState {
    pub fn new(controller: ViewerController<ImageDecoder>) -> Self {
        Self {
            controller,
            is_fullscreen: false,
            show_help: false,
            show_info: false,
        }
    }

    pub fn handle(&mut self, action: KeyAction, window: &Window) {
        match action {
            KeyAction::ToggleFullscreen => {
                self.is_fullscreen = !self.is_fullscreen;
                if self.is_fullscreen {
                    window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                } else {
                    window.set_fullscreen(None);
                }
                // The Resized event that follows re-fits the image.
            }
            KeyAction::ToggleHelp => self.show_help = !self.show_help,
            KeyAction::ToggleInfo => self.show_info = !self.show_info,
            KeyAction::Intent(intent) => self.apply(intent),
        }
    }

    /// Forward an intent to the controller.
    pub fn apply(&mut self, intent: Intent) {
        match self.controller.apply(intent) {
            Ok(Outcome::Moved { index, cache_hit }) => {
                log::debug!("showing {} (cache_hit={})", index + 1, cache_hit);
            }
            Ok(_) => {}
            // The placeholder message is already on screen.
            Err(e) => log::warn!("{}", e),
        }
    }

    /// Apply finished prefetches. Returns true if the screen shows slot state
    /// and needs a redraw.
    pub fn on_prefetch_ready(&mut self) -> bool {
        self.controller.poll_prefetch() > 0 && self.show_info
    }

    fn info_lines(&self) -> Vec<String> {
        let c = &self.controller;
        let file = c
            .current_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let size = match c.current_buffer() {
            Some(buf) => format!("{}x{}", buf.width, buf.height),
            None => "-".to_string(),
        };
        let slot = |side: Side| {
            let slot = c.cache().slot(side);
            let what = match slot.state() {
                SlotState::Empty => "empty".to_string(),
                SlotState::Pending { target, .. } => format!("pending {}", target + 1),
                SlotState::Ready { target, .. } => format!("ready {}", target + 1),
            };
            format!("{} (gen {})", what, slot.generation())
        };
        vec![
            file,
            format!(
                "{} | prev: {} | next: {}",
                size,
                slot(Side::Prev),
                slot(Side::Next)
            ),
        ]
    }

    /// Render into the softbuffer framebuffer (u32 per pixel, 0x00RRGGBB).
    pub fn render(&self, frame: &mut [u32], fb_w: u32, fb_h: u32) {
        let bg = rgb(BG_COLOR[0], BG_COLOR[1], BG_COLOR[2]);
        frame.fill(bg);

        if let Some(buf) = self.controller.current_buffer() {
            blit_centered(frame, fb_w, fb_h, &buf.pixels, buf.width, buf.height);
        }

        if let Some(err) = self.controller.current_error() {
            let text_scale: u32 = 2;
            draw_text(frame, fb_w, fb_h, err, 20, fb_h as i32 / 2, text_scale, ERROR_RED);
        }

        // Counter overlay
        let counter = format!(
            "{} / {}",
            self.controller.current_index() + 1,
            self.controller.total_count()
        );
        let text_scale: u32 = 2;
        let box_w = text_width(&counter, text_scale) + 16;
        let box_h = 7 * text_scale + 12;
        fill_rect(frame, fb_w, fb_h, 10, 10, box_w, box_h, (0, 0, 0, 160));
        draw_text(frame, fb_w, fb_h, &counter, 18, 16, text_scale, WHITE);

        if self.show_info {
            let line_h = (7 * text_scale + 4) as i32;
            let top = 10 + box_h as i32 + 6;
            let lines = self.info_lines();
            fill_rect(frame, fb_w, fb_h, 0, top, fb_w, (line_h * lines.len() as i32 + 8) as u32, (0, 0, 0, 178));
            for (i, line) in lines.iter().enumerate() {
                draw_text(frame, fb_w, fb_h, line, 10, top + 4 + line_h * i as i32, text_scale, WHITE);
            }
        }

        if self.show_help {
            fill_rect(frame, fb_w, fb_h, 0, 0, fb_w, fb_h, (0, 0, 0, 200));
            let mut y = 20;
            for line in HELP_KEYS.lines() {
                draw_text(frame, fb_w, fb_h, line, 20, y, text_scale, WHITE);
                y += 24;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::controller::ViewerOptions;
    use crate::decoder::ViewportSize;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn viewer(dir: &tempfile::TempDir) -> ViewerState {
        for i in 0..3 {
            RgbImage::from_pixel(8, 8, Rgb([i * 40, 0, 0]))
                .save(dir.path().join(format!("{i}.png")))
                .unwrap();
        }
        let catalog = Arc::new(Catalog::scan(dir.path(), false).unwrap());
        let controller = ViewerController::new(
            catalog,
            Arc::new(ImageDecoder),
            ViewerOptions {
                output_dir: dir.path().join("out"),
                start_index: 1,
                viewport: ViewportSize::new(64, 64),
                store: None,
            },
        )
        .unwrap();
        ViewerState::new(controller)
    }

    fn both_slots_ready(state: &ViewerState) -> bool {
        let cache = state.controller.cache();
        cache.slot(Side::Prev).is_ready() && cache.slot(Side::Next).is_ready()
    }

    fn ch(s: &str) -> Key {
        Key::Character(s.into())
    }

    #[test]
    fn navigation_keys_repeat() {
        assert_eq!(
            key_action(&Key::Named(NamedKey::ArrowRight), true),
            Some(KeyAction::Intent(Intent::Next))
        );
        assert_eq!(key_action(&ch("h"), true), Some(KeyAction::Intent(Intent::Prev)));
        assert_eq!(
            key_action(&Key::Named(NamedKey::Space), false),
            Some(KeyAction::Intent(Intent::Next))
        );
    }

    #[test]
    fn pick_and_quit_ignore_repeat() {
        assert_eq!(
            key_action(&Key::Named(NamedKey::Enter), false),
            Some(KeyAction::Intent(Intent::Pick))
        );
        assert_eq!(key_action(&Key::Named(NamedKey::Enter), true), None);
        assert_eq!(key_action(&ch("q"), false), Some(KeyAction::Intent(Intent::Quit)));
        assert_eq!(key_action(&ch("f"), true), None);
    }

    #[test]
    fn finished_prefetch_redraws_info_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = viewer(&dir);
        state.show_info = true;

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut redraw = false;
        while !redraw && Instant::now() < deadline {
            redraw = state.on_prefetch_ready();
            std::thread::yield_now();
        }
        assert!(redraw);
    }

    #[test]
    fn finished_prefetch_without_overlay_needs_no_redraw() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = viewer(&dir);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !both_slots_ready(&state) && Instant::now() < deadline {
            assert!(!state.on_prefetch_ready());
            std::thread::yield_now();
        }
        assert!(both_slots_ready(&state));
    }

    #[test]
    fn unmapped_keys_do_nothing() {
        assert_eq!(key_action(&ch("i"), false), Some(KeyAction::ToggleInfo));
        assert_eq!(key_action(&ch("x"), false), None);
        assert_eq!(key_action(&Key::Named(NamedKey::Tab), false), None);
    }
}
