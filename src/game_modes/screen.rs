// What the player sees during a session, folded from network events
// Kept free of terminal I/O so key handling and event folding are testable

use crossterm::event::KeyCode;

use crate::config::KeyBindings;
use crate::game::{Board, Outcome, Symbol, BOARD_CELLS};
use crate::network::{
    GameCode, GameMessage, NegotiationState, NetworkEvent, PlayerInfo, SessionError, SessionMode,
};
use crate::ui::OverlayMessage;

use super::common::key_matches;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    /// Channel not open yet, or the opponent has not offered audio
    Waiting,
    Connected,
    Unavailable,
}

/// Something the run loop has to do on the player's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenAction {
    Move(usize),
    Restart,
    SetMuted(bool),
    CopyBlob,
    PasteBlob,
    Leave,
}

pub struct SessionScreen {
    pub local_name: String,
    pub symbol: Symbol,
    pub game_code: Option<GameCode>,
    pub manual_blob: Option<String>,
    /// Rendezvous unreachable; exchange goes through copy/paste
    pub manual_mode: bool,
    pub state: NegotiationState,
    pub opponent: Option<PlayerInfo>,
    pub board: Board,
    pub cursor: usize,
    pub muted: bool,
    pub voice: VoiceStatus,
    pub overlay: Option<OverlayMessage>,
    /// One-line feedback under the waiting screen (clipboard results)
    pub status: String,
    /// Session is over; only leaving is possible
    pub ended: bool,
}

impl SessionScreen {
    pub fn new(mode: &SessionMode) -> Self {
        let (symbol, manual_mode) = match mode {
            SessionMode::Host { .. } => (Symbol::X, false),
            SessionMode::Join { .. } => (Symbol::O, false),
            SessionMode::JoinManual { .. } => (Symbol::O, true),
        };
        Self {
            local_name: mode.display_name().to_string(),
            symbol,
            game_code: None,
            manual_blob: None,
            manual_mode,
            state: NegotiationState::New,
            opponent: None,
            board: Board::new(),
            cursor: 4,
            muted: false,
            voice: VoiceStatus::Waiting,
            overlay: None,
            status: String::new(),
            ended: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == NegotiationState::Open && !self.ended
    }

    pub fn my_turn(&self) -> bool {
        self.is_playing() && self.board.outcome.is_none() && self.board.current == self.symbol
    }

    pub fn opponent_name(&self) -> &str {
        self.opponent
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("your valentine")
    }

    /// Fold one network event into the screen
    pub fn apply_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::GameCode(code) => self.game_code = Some(code),
            NetworkEvent::EndpointRegistered(_) => {}
            NetworkEvent::BrokerFallback(err) => {
                self.manual_mode = true;
                self.overlay = Some(
                    OverlayMessage::from_error(&err)
                        .push_line("")
                        .push_line("C copies your text, V pastes theirs"),
                );
            }
            NetworkEvent::ManualBlob(blob) => self.manual_blob = Some(blob),
            NetworkEvent::StateChanged(state) => {
                self.state = state;
                if state == NegotiationState::Open {
                    self.overlay = None;
                    self.status.clear();
                } else if state.is_terminal() {
                    self.ended = true;
                }
            }
            NetworkEvent::PlayerConnected(info) => self.opponent = Some(info),
            NetworkEvent::Message(GameMessage::GameOver { winner }) => {
                self.board.conclude(winner);
            }
            NetworkEvent::Message(_) => {}
            NetworkEvent::BoardChanged(board) => {
                self.board = board;
                self.overlay = self.round_overlay();
            }
            NetworkEvent::RemoteAudio(_) => self.voice = VoiceStatus::Connected,
            NetworkEvent::VoiceUnavailable(err) => {
                self.voice = VoiceStatus::Unavailable;
                self.status = format!("{} ({})", err, err.next_step());
            }
            NetworkEvent::Error(err) => {
                if !err.is_recoverable() {
                    self.ended = true;
                }
                self.overlay = Some(self.error_overlay(&err));
            }
            NetworkEvent::Disconnected => {
                self.ended = true;
                let err = SessionError::TransportClosed(format!("{} left the game", self.opponent_name()));
                self.overlay = Some(self.error_overlay(&err));
            }
        }
    }

    fn error_overlay(&self, err: &SessionError) -> OverlayMessage {
        let overlay = OverlayMessage::from_error(err);
        if err.is_recoverable() {
            overlay
        } else {
            overlay.push_line("").push_line("Press Q to return to the menu")
        }
    }

    fn round_overlay(&self) -> Option<OverlayMessage> {
        let outcome = self.board.outcome?;
        let message = match outcome {
            Outcome::Win(symbol) if symbol == self.symbol => {
                OverlayMessage::success(vec!["You win! <3".to_string()])
            }
            Outcome::Win(_) => OverlayMessage::info(vec![format!("{} wins <3", self.opponent_name())]),
            Outcome::Draw => OverlayMessage::info(vec!["A draw, hearts even".to_string()]),
        };
        Some(message.push_line("").push_line("R to play again  |  Q to leave"))
    }

    /// Translate a key press into an action, updating cursor and overlay state
    pub fn handle_key(&mut self, code: KeyCode, keys: &KeyBindings) -> Option<ScreenAction> {
        if key_matches(&keys.quit, code) || code == KeyCode::Esc {
            return Some(ScreenAction::Leave);
        }
        if self.ended {
            return None;
        }

        if !self.is_playing() {
            if key_matches(&keys.copy, code) && self.manual_blob.is_some() {
                return Some(ScreenAction::CopyBlob);
            }
            if key_matches(&keys.paste, code) {
                return Some(ScreenAction::PasteBlob);
            }
            // Any other key dismisses a warning such as a bad paste
            if self.overlay.is_some() {
                self.overlay = None;
            }
            return None;
        }

        if key_matches(&keys.mute, code) {
            self.muted = !self.muted;
            return Some(ScreenAction::SetMuted(self.muted));
        }
        if key_matches(&keys.restart, code) {
            return Some(ScreenAction::Restart);
        }

        match code {
            KeyCode::Char(c @ '1'..='9') => {
                let position = (c as usize) - ('1' as usize);
                self.cursor = position;
                self.try_move(position)
            }
            KeyCode::Up => {
                self.cursor = (self.cursor + BOARD_CELLS - 3) % BOARD_CELLS;
                None
            }
            KeyCode::Down => {
                self.cursor = (self.cursor + 3) % BOARD_CELLS;
                None
            }
            KeyCode::Left => {
                self.cursor = self.cursor - self.cursor % 3 + (self.cursor + 2) % 3;
                None
            }
            KeyCode::Right => {
                self.cursor = self.cursor - self.cursor % 3 + (self.cursor + 1) % 3;
                None
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.try_move(self.cursor),
            _ => None,
        }
    }

    fn try_move(&self, position: usize) -> Option<ScreenAction> {
        if self.board.can_play(position, self.symbol) {
            Some(ScreenAction::Move(position))
        } else {
            None
        }
    }
}
