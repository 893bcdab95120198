// Centered message boxes drawn over the board or waiting screen

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::network::SessionError;

/// A message to display as an overlay in the center of the screen
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayMessage {
    pub lines: Vec<String>,
    pub title: Option<String>,
    pub style: OverlayStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStyle {
    Info,
    Warning,
    Error,
    /// Round won or connection established
    Success,
}

impl OverlayMessage {
    fn styled(lines: Vec<String>, style: OverlayStyle) -> Self {
        Self {
            lines,
            title: None,
            style,
        }
    }

    pub fn info(lines: Vec<String>) -> Self {
        Self::styled(lines, OverlayStyle::Info)
    }

    pub fn warning(lines: Vec<String>) -> Self {
        Self::styled(lines, OverlayStyle::Warning)
    }

    pub fn error(lines: Vec<String>) -> Self {
        Self::styled(lines, OverlayStyle::Error)
    }

    pub fn success(lines: Vec<String>) -> Self {
        Self::styled(lines, OverlayStyle::Success)
    }

    /// Error box with the player's next step underneath
    ///
    /// Recoverable errors (bad paste, missing microphone, broker down) are
    /// shown as warnings since the current attempt goes on.
    pub fn from_error(err: &SessionError) -> Self {
        let lines = vec![err.to_string(), String::new(), err.next_step().to_string()];
        let message = if err.is_recoverable() {
            Self::warning(lines)
        } else {
            Self::error(lines)
        };
        message.with_title(if err.is_recoverable() {
            "Heads up"
        } else {
            "Connection problem"
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn push_line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    fn border_color(&self) -> Color {
        match self.style {
            OverlayStyle::Info => Color::LightMagenta,
            OverlayStyle::Warning => Color::Yellow,
            OverlayStyle::Error => Color::Red,
            OverlayStyle::Success => Color::Green,
        }
    }

    fn text_color(&self) -> Color {
        match self.style {
            OverlayStyle::Info => Color::White,
            OverlayStyle::Warning => Color::Yellow,
            OverlayStyle::Error => Color::LightRed,
            OverlayStyle::Success => Color::LightGreen,
        }
    }
}

/// Render an overlay message centered in `area`
pub fn render_overlay(frame: &mut Frame, message: &OverlayMessage, area: Rect) {
    let max_line_length = message
        .lines
        .iter()
        .map(|line| line.chars().count())
        .chain(message.title.iter().map(|t| t.chars().count() + 2))
        .max()
        .unwrap_or(0);

    let overlay_width = (max_line_length as u16 + 6).min(area.width.saturating_sub(4));
    let overlay_height = (message.lines.len() as u16 + 4).min(area.height.saturating_sub(2));

    let overlay_area = Rect {
        x: area.x + (area.width.saturating_sub(overlay_width)) / 2,
        y: area.y + (area.height.saturating_sub(overlay_height)) / 2,
        width: overlay_width,
        height: overlay_height,
    };

    frame.render_widget(Clear, overlay_area);

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(message.border_color()))
        .style(Style::default().bg(Color::Rgb(25, 15, 20)));

    if let Some(ref title) = message.title {
        block = block.title(format!(" {} ", title));
    }

    let text_lines: Vec<Line> = message
        .lines
        .iter()
        .map(|line| {
            Line::from(Span::styled(
                line.clone(),
                Style::default().fg(message.text_color()),
            ))
        })
        .collect();

    let paragraph = Paragraph::new(text_lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);

    frame.render_widget(paragraph, overlay_area);
}
