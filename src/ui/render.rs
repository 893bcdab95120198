use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::config::DisplayConfig;
use crate::game::{Symbol, BOARD_CELLS};
use crate::game_modes::screen::{SessionScreen, VoiceStatus};
use crate::network::NegotiationState;

use super::overlay::render_overlay;

// Each cell is 7 columns by 3 rows; separators take one more of each
const CELL_WIDTH: u16 = 7;
const CELL_HEIGHT: u16 = 3;
const BOARD_WIDTH: u16 = CELL_WIDTH * 3 + 2;
const BOARD_HEIGHT: u16 = CELL_HEIGHT * 3 + 2;

fn rgb(c: [u8; 3]) -> Color {
    Color::Rgb(c[0], c[1], c[2])
}

pub fn render(frame: &mut Frame, screen: &SessionScreen, display: &DisplayConfig) {
    let area = frame.area();

    let bg = Block::default().style(Style::default().bg(Color::Rgb(0, 0, 0)));
    frame.render_widget(bg, area);

    if screen.opponent.is_some() || screen.state == NegotiationState::Open {
        render_board(frame, screen, display, area);
    } else {
        render_waiting(frame, screen, display, area);
    }

    if let Some(ref overlay) = screen.overlay {
        render_overlay(frame, overlay, area);
    }
}

fn render_board(frame: &mut Frame, screen: &SessionScreen, display: &DisplayConfig, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),            // Players
            Constraint::Min(BOARD_HEIGHT),    // Board
            Constraint::Length(2),            // Status + controls
        ])
        .split(area);

    let accent = rgb(display.accent_color);
    let symbol_color = |s: Symbol| match s {
        Symbol::X => rgb(display.x_color),
        Symbol::O => rgb(display.o_color),
    };

    let header = Line::from(vec![
        Span::styled(
            format!("{} ({})", screen.local_name, screen.symbol),
            Style::default().fg(symbol_color(screen.symbol)).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  <3  ", Style::default().fg(accent)),
        Span::styled(
            format!("{} ({})", screen.opponent_name(), screen.symbol.opponent()),
            Style::default().fg(symbol_color(screen.symbol.opponent())).add_modifier(Modifier::BOLD),
        ),
    ]);
    frame.render_widget(
        Paragraph::new(vec![Line::from(""), header]).alignment(Alignment::Center),
        chunks[0],
    );

    let board_area = Rect {
        x: chunks[1].x + chunks[1].width.saturating_sub(BOARD_WIDTH) / 2,
        y: chunks[1].y + chunks[1].height.saturating_sub(BOARD_HEIGHT) / 2,
        width: BOARD_WIDTH.min(chunks[1].width),
        height: BOARD_HEIGHT.min(chunks[1].height),
    };
    frame.render_widget(Paragraph::new(board_lines(screen, display)), board_area);

    let turn = if screen.board.outcome.is_some() || screen.ended {
        String::new()
    } else if screen.my_turn() {
        "Your move".to_string()
    } else {
        format!("Waiting for {}", screen.opponent_name())
    };
    let voice = match (screen.voice, screen.muted) {
        (VoiceStatus::Unavailable, _) => "voice off",
        (_, true) => "muted",
        (VoiceStatus::Connected, false) => "voice on",
        (VoiceStatus::Waiting, false) => "voice pending",
    };
    let footer = vec![
        Line::from(vec![
            Span::styled(turn, Style::default().fg(Color::White)),
            Span::styled(format!("   [{}]", voice), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(Span::styled(
            "1-9/arrows+Enter: Place  R: Restart  M: Mute  Q: Leave",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(footer).alignment(Alignment::Center), chunks[2]);
}

fn board_lines(screen: &SessionScreen, display: &DisplayConfig) -> Vec<Line<'static>> {
    let grid = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::with_capacity(BOARD_HEIGHT as usize);

    for row in 0..3 {
        for sub in 0..CELL_HEIGHT {
            let mut spans = Vec::new();
            for col in 0..3 {
                let index = row * 3 + col;
                spans.push(cell_span(screen, display, index, sub));
                if col < 2 {
                    spans.push(Span::styled("│", grid));
                }
            }
            lines.push(Line::from(spans));
        }
        if row < 2 {
            let bar = "─".repeat(CELL_WIDTH as usize);
            lines.push(Line::from(Span::styled(format!("{bar}┼{bar}┼{bar}"), grid)));
        }
    }
    lines
}

fn cell_span(screen: &SessionScreen, display: &DisplayConfig, index: usize, sub: u16) -> Span<'static> {
    debug_assert!(index < BOARD_CELLS);
    let selected = index == screen.cursor && screen.my_turn();
    let base = if selected {
        Style::default().bg(Color::Rgb(60, 20, 40))
    } else {
        Style::default()
    };

    if sub != CELL_HEIGHT / 2 {
        return Span::styled(" ".repeat(CELL_WIDTH as usize), base);
    }

    match screen.board.cells[index] {
        Some(symbol) => {
            let color = match symbol {
                Symbol::X => rgb(display.x_color),
                Symbol::O => rgb(display.o_color),
            };
            Span::styled(
                format!("{:^width$}", symbol.to_string(), width = CELL_WIDTH as usize),
                base.fg(color).add_modifier(Modifier::BOLD),
            )
        }
        None => Span::styled(
            format!("{:^width$}", index + 1, width = CELL_WIDTH as usize),
            base.fg(Color::Rgb(70, 70, 70)),
        ),
    }
}

fn render_waiting(frame: &mut Frame, screen: &SessionScreen, display: &DisplayConfig, area: Rect) {
    let accent = rgb(display.accent_color);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(area);

    let title = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("Waiting for your valentine... ({})", screen.state),
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        )),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(title, chunks[0]);

    let mut body = Vec::new();
    if let Some(ref code) = screen.game_code {
        body.push(Line::from(Span::styled(
            "Share this game code:",
            Style::default().fg(Color::White),
        )));
        body.push(Line::from(Span::styled(
            code.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        body.push(Line::from(""));
    }

    if screen.manual_mode {
        body.push(Line::from(Span::styled(
            "Manual exchange: send your text to your opponent, paste theirs back",
            Style::default().fg(Color::White),
        )));
        if let Some(ref blob) = screen.manual_blob {
            body.push(Line::from(Span::styled(
                format!("Your text is ready ({} chars). Press C to copy", blob.len()),
                Style::default().fg(Color::Yellow),
            )));
        }
        body.push(Line::from(Span::styled(
            "Press V to paste the text you received",
            Style::default().fg(Color::Gray),
        )));
    } else if screen.manual_blob.is_some() {
        body.push(Line::from(Span::styled(
            "No luck with the code? C copies a manual offer, V pastes an answer",
            Style::default().fg(Color::DarkGray),
        )));
    }

    if !screen.status.is_empty() {
        body.push(Line::from(""));
        body.push(Line::from(Span::styled(
            screen.status.clone(),
            Style::default().fg(Color::LightGreen),
        )));
    }

    let body_widget = Paragraph::new(body)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .style(Style::default().bg(Color::Rgb(20, 10, 15))),
        );
    frame.render_widget(body_widget, chunks[1]);

    let hint = Paragraph::new(Line::from(Span::styled(
        "Q/Esc: Cancel",
        Style::default().fg(Color::DarkGray),
    )))
    .alignment(Alignment::Center);
    frame.render_widget(hint, chunks[2]);
}
