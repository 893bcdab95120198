// Menu state: item selection and the name/code/offer prompts

use crate::network::{GameCode, SessionMode};

/// Application state machine
#[derive(Debug, Clone)]
pub enum AppState {
    Menu,
    Session(SessionMode),
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    HostGame,
    JoinByCode,
    JoinWithOffer,
    Quit,
}

impl MenuItem {
    pub fn display_text(&self) -> &str {
        match self {
            MenuItem::HostGame => "Host a Game",
            MenuItem::JoinByCode => "Join with Game Code",
            MenuItem::JoinWithOffer => "Join with Pasted Offer",
            MenuItem::Quit => "Quit",
        }
    }

    pub fn all() -> Vec<MenuItem> {
        vec![
            MenuItem::HostGame,
            MenuItem::JoinByCode,
            MenuItem::JoinWithOffer,
            MenuItem::Quit,
        ]
    }
}

/// Which value the open prompt is collecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptField {
    Name,
    Code,
    Offer,
}

impl PromptField {
    pub fn title(&self) -> &str {
        match self {
            PromptField::Name => " Your Name ",
            PromptField::Code => " Game Code ",
            PromptField::Offer => " Host's Offer ",
        }
    }

    pub fn placeholder(&self) -> &str {
        match self {
            PromptField::Name => "(how your valentine will see you)",
            PromptField::Code => "(6 letters and digits, e.g. AB12CD)",
            PromptField::Offer => "(press V to paste the offer text)",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub item: MenuItem,
    pub field: PromptField,
    pub input: String,
    pub name: String,
    pub error: Option<String>,
}

pub struct MenuState {
    pub selected_index: usize,
    pub items: Vec<MenuItem>,
    pub prompt: Option<Prompt>,
    /// Pre-fills the name prompt
    pub default_name: String,
    /// Shown under the menu after a session ends
    pub notice: Option<String>,
}

impl MenuState {
    pub fn new(default_name: &str) -> Self {
        Self {
            selected_index: 0,
            items: MenuItem::all(),
            prompt: None,
            default_name: default_name.to_string(),
            notice: None,
        }
    }

    pub fn selected_item(&self) -> MenuItem {
        self.items[self.selected_index]
    }

    pub fn select_previous(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        } else {
            self.selected_index = self.items.len() - 1;
        }
    }

    pub fn select_next(&mut self) {
        if self.selected_index < self.items.len() - 1 {
            self.selected_index += 1;
        } else {
            self.selected_index = 0;
        }
    }

    /// Open the name prompt for a session item
    pub fn start_prompt(&mut self, item: MenuItem) {
        self.notice = None;
        self.prompt = Some(Prompt {
            item,
            field: PromptField::Name,
            input: self.default_name.clone(),
            name: String::new(),
            error: None,
        });
    }

    pub fn cancel_prompt(&mut self) {
        self.prompt = None;
    }

    pub fn push_char(&mut self, c: char) {
        if let Some(prompt) = self.prompt.as_mut() {
            let accept = match prompt.field {
                PromptField::Name => !c.is_control() && prompt.input.chars().count() < 24,
                PromptField::Code => c.is_ascii_alphanumeric() && prompt.input.len() < 6,
                PromptField::Offer => !c.is_control(),
            };
            if accept {
                prompt.input.push(c);
                prompt.error = None;
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some(prompt) = self.prompt.as_mut() {
            prompt.input.pop();
        }
    }

    /// Replace the offer field with clipboard text
    pub fn set_pasted(&mut self, text: &str) {
        if let Some(prompt) = self.prompt.as_mut() {
            if prompt.field == PromptField::Offer {
                prompt.input = text.trim().to_string();
                prompt.error = None;
            }
        }
    }

    /// Confirm the current field; returns the session to start once all fields are in
    pub fn submit(&mut self) -> Option<SessionMode> {
        let prompt = self.prompt.as_mut()?;
        let value = prompt.input.trim().to_string();

        match prompt.field {
            PromptField::Name => {
                if value.is_empty() {
                    prompt.error = Some("Name cannot be empty".to_string());
                    return None;
                }
                self.default_name = value.clone();
                prompt.name = value;
                prompt.input.clear();
                match prompt.item {
                    MenuItem::HostGame => {
                        let name = prompt.name.clone();
                        self.prompt = None;
                        return Some(SessionMode::Host { name });
                    }
                    MenuItem::JoinByCode => prompt.field = PromptField::Code,
                    MenuItem::JoinWithOffer => prompt.field = PromptField::Offer,
                    MenuItem::Quit => self.prompt = None,
                }
                None
            }
            PromptField::Code => match GameCode::parse(&value) {
                Ok(code) => {
                    let name = prompt.name.clone();
                    self.prompt = None;
                    Some(SessionMode::Join {
                        code: code.to_string(),
                        name,
                    })
                }
                Err(e) => {
                    prompt.error = Some(e.to_string());
                    None
                }
            },
            PromptField::Offer => {
                if value.is_empty() {
                    prompt.error = Some("Paste the offer text first".to_string());
                    return None;
                }
                let name = prompt.name.clone();
                self.prompt = None;
                Some(SessionMode::JoinManual { name, offer: value })
            }
        }
    }
}

impl Default for MenuState {
    fn default() -> Self {
        Self::new("")
    }
}
