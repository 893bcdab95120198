//! Helpers shared by the menu and the session screen

use std::time::{Duration, Instant};

use crossterm::event::KeyCode;

/// Sleep out the rest of the frame so redraws stay near `target_fps`.
///
/// Call at the end of each loop iteration with the `Instant` the frame began.
pub fn limit_frame_rate(frame_start: Instant, target_fps: u64) {
    let frame = Duration::from_millis(1000 / target_fps.max(1));
    let elapsed = frame_start.elapsed();
    if elapsed < frame {
        std::thread::sleep(frame - elapsed);
    }
}

/// Does a configured binding ("R", "Enter", "Up", ...) match this key
///
/// Single letters match either case.
pub fn key_matches(binding: &str, code: KeyCode) -> bool {
    match code {
        KeyCode::Char(c) => {
            let mut chars = binding.chars();
            match (chars.next(), chars.next()) {
                (Some(b), None) => b.eq_ignore_ascii_case(&c),
                _ if c == ' ' => binding.eq_ignore_ascii_case("space"),
                _ => false,
            }
        }
        KeyCode::Enter => binding.eq_ignore_ascii_case("enter"),
        KeyCode::Esc => binding.eq_ignore_ascii_case("esc"),
        KeyCode::Up => binding.eq_ignore_ascii_case("up"),
        KeyCode::Down => binding.eq_ignore_ascii_case("down"),
        KeyCode::Left => binding.eq_ignore_ascii_case("left"),
        KeyCode::Right => binding.eq_ignore_ascii_case("right"),
        KeyCode::Tab => binding.eq_ignore_ascii_case("tab"),
        _ => false,
    }
}
