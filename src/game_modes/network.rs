use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use ratatui::Terminal;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::network::{self, NetworkClient, SessionMode};
use crate::ui;

use super::common::limit_frame_rate;
use super::screen::{ScreenAction, SessionScreen};

/// Run one session from negotiation to leaving; returns to the menu afterwards
pub fn run_session<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    config: &Config,
    mode: SessionMode,
) -> Result<(), io::Error> {
    info!("Session start: {:?}", mode);

    let client = network::start_network(mode.clone(), &config.network)?;
    let mut screen = SessionScreen::new(&mode);

    loop {
        let frame_start = Instant::now();

        while let Some(event) = client.try_recv_event() {
            debug!("Network event: {:?}", event);
            screen.apply_event(event);
        }

        let mut actions = Vec::new();
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = screen.handle_key(key.code, &config.keybindings) {
                        actions.push(action);
                    }
                }
            }
        }

        for action in actions {
            if action == ScreenAction::Leave {
                info!("Leaving session");
                client.leave();
                return Ok(());
            }
            perform(&client, &mut screen, action);
        }

        terminal.draw(|f| ui::render(f, &screen, &config.display))?;

        limit_frame_rate(frame_start, config.display.target_fps);
    }
}

fn perform(client: &NetworkClient, screen: &mut SessionScreen, action: ScreenAction) {
    let result = match action {
        ScreenAction::Move(position) => client.send_move(position),
        ScreenAction::Restart => client.send_restart(),
        ScreenAction::SetMuted(muted) => client.set_muted(muted),
        ScreenAction::CopyBlob => {
            if let Some(ref blob) = screen.manual_blob {
                screen.status = copy_to_clipboard(blob);
            }
            Ok(())
        }
        ScreenAction::PasteBlob => match paste_from_clipboard() {
            Ok(text) => {
                screen.status = "Pasted, connecting...".to_string();
                client.apply_remote_blob(&text)
            }
            Err(feedback) => {
                screen.status = feedback;
                Ok(())
            }
        },
        ScreenAction::Leave => Ok(()),
    };

    if let Err(e) = result {
        warn!("Command failed: {}", e);
        screen.apply_event(network::NetworkEvent::Error(e));
    }
}

fn copy_to_clipboard(text: &str) -> String {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => match clipboard.set_text(text.to_string()) {
            Ok(_) => {
                debug!("Copied {} chars to clipboard", text.len());
                "Copied to clipboard!".to_string()
            }
            Err(e) => {
                warn!("Clipboard copy failed: {}", e);
                format!("Copy failed: {}", e)
            }
        },
        Err(e) => {
            warn!("Clipboard unavailable: {}", e);
            format!("Clipboard unavailable: {}", e)
        }
    }
}

fn paste_from_clipboard() -> Result<String, String> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| format!("Clipboard unavailable: {}", e))?;
    let text = clipboard
        .get_text()
        .map_err(|e| format!("Paste failed: {}", e))?;
    if text.trim().is_empty() {
        return Err("Clipboard is empty".to_string());
    }
    Ok(text)
}
