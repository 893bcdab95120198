// Menu input handling

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io;
use std::time::Duration;

use crate::config::KeyBindings;
use crate::game_modes::common::key_matches;
use crate::network::SessionMode;

use super::state::{MenuItem, MenuState, PromptField};

pub enum MenuAction {
    None,
    StartSession(SessionMode),
    Quit,
}

/// Handle menu input and return the next action
pub fn handle_menu_input(menu_state: &mut MenuState, keys: &KeyBindings) -> Result<MenuAction, io::Error> {
    if event::poll(Duration::from_millis(100))? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(handle_key_press(menu_state, keys, key.code));
            }
        }
    }

    Ok(MenuAction::None)
}

pub fn handle_key_press(menu_state: &mut MenuState, keys: &KeyBindings, key_code: KeyCode) -> MenuAction {
    if menu_state.prompt.is_some() {
        return handle_prompt_input(menu_state, keys, key_code);
    }

    if key_matches(&keys.menu_up, key_code) || key_code == KeyCode::Char('k') {
        menu_state.select_previous();
        MenuAction::None
    } else if key_matches(&keys.menu_down, key_code) || key_code == KeyCode::Char('j') {
        menu_state.select_next();
        MenuAction::None
    } else if key_matches(&keys.menu_select, key_code) || key_code == KeyCode::Char(' ') {
        match menu_state.selected_item() {
            MenuItem::Quit => MenuAction::Quit,
            item => {
                menu_state.start_prompt(item);
                MenuAction::None
            }
        }
    } else if key_matches(&keys.quit, key_code) || key_matches(&keys.menu_back, key_code) {
        MenuAction::Quit
    } else {
        MenuAction::None
    }
}

fn handle_prompt_input(menu_state: &mut MenuState, keys: &KeyBindings, key_code: KeyCode) -> MenuAction {
    let on_offer = menu_state
        .prompt
        .as_ref()
        .is_some_and(|p| p.field == PromptField::Offer);

    match key_code {
        KeyCode::Enter => match menu_state.submit() {
            Some(mode) => MenuAction::StartSession(mode),
            None => MenuAction::None,
        },
        KeyCode::Esc => {
            menu_state.cancel_prompt();
            MenuAction::None
        }
        KeyCode::Backspace => {
            menu_state.backspace();
            MenuAction::None
        }
        KeyCode::Char(c) if on_offer && key_matches(&keys.paste, KeyCode::Char(c)) => {
            match try_paste_from_clipboard() {
                Ok(text) => menu_state.set_pasted(&text),
                Err(e) => {
                    if let Some(prompt) = menu_state.prompt.as_mut() {
                        prompt.error = Some(e);
                    }
                }
            }
            MenuAction::None
        }
        KeyCode::Char(c) => {
            menu_state.push_char(c);
            MenuAction::None
        }
        _ => MenuAction::None,
    }
}

/// Read text from the system clipboard
pub fn try_paste_from_clipboard() -> Result<String, String> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| format!("Clipboard unavailable: {}", e))?;
    clipboard
        .get_text()
        .map_err(|e| format!("Paste failed: {}", e))
}
