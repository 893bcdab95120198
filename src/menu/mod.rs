// Main menu: host, join by code, join with a pasted offer

pub mod input;
pub mod render;
pub mod state;

pub use input::{handle_menu_input, try_paste_from_clipboard, MenuAction};
pub use render::render_menu;
pub use state::{AppState, MenuItem, MenuState, PromptField};
