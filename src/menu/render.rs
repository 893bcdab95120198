// Menu rendering with Ratatui

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use super::state::{MenuState, Prompt, PromptField};

const TITLE: [&str; 5] = [
    r" _                     _   _ _       _    ",
    r"| |__   ___  __ _ _ __| |_| (_)_ __ | | __",
    r"| '_ \ / _ \/ _` | '__| __| | | '_ \| |/ /",
    r"| | | |  __/ (_| | |  | |_| | | | | |   < ",
    r"|_| |_|\___|\__,_|_|   \__|_|_|_| |_|_|\_\",
];

pub fn render_menu(frame: &mut Frame, menu_state: &MenuState) {
    let area = frame.area();

    let bg = Block::default().style(Style::default().bg(Color::Rgb(0, 0, 0)));
    frame.render_widget(bg, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8),  // Title area
            Constraint::Min(6),     // Menu items
            Constraint::Length(3),  // Notice + controls hint
        ])
        .split(area);

    let title_style = Style::default()
        .fg(Color::LightMagenta)
        .add_modifier(Modifier::BOLD);
    let mut title_text = vec![Line::from("")];
    title_text.extend(TITLE.iter().map(|l| Line::from(Span::styled(*l, title_style))));
    title_text.push(Line::from(Span::styled(
        "<3  tic-tac-toe for two  <3",
        Style::default().fg(Color::Rgb(255, 182, 193)),
    )));
    frame.render_widget(Paragraph::new(title_text).alignment(Alignment::Center), chunks[0]);

    let menu_items: Vec<Line> = menu_state
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let is_selected = i == menu_state.selected_index;
            let prefix = if is_selected { "  <3 " } else { "     " };
            let text = format!("{}{}", prefix, item.display_text());

            if is_selected {
                Line::from(Span::styled(
                    text,
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(Span::styled(text, Style::default().fg(Color::White)))
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(menu_items).alignment(Alignment::Center), chunks[1]);

    let mut footer = Vec::new();
    if let Some(ref notice) = menu_state.notice {
        footer.push(Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Yellow))));
    }
    footer.push(Line::from(vec![
        Span::styled("↑/↓", Style::default().fg(Color::Gray)),
        Span::styled(": Navigate  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Gray)),
        Span::styled(": Select  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Q/Esc", Style::default().fg(Color::Gray)),
        Span::styled(": Quit", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(Paragraph::new(footer).alignment(Alignment::Center), chunks[2]);

    if let Some(ref prompt) = menu_state.prompt {
        render_prompt(frame, prompt);
    }
}

fn render_prompt(frame: &mut Frame, prompt: &Prompt) {
    let area = frame.area();

    let dialog_width = 60.min(area.width.saturating_sub(4));
    let dialog_height = 8.min(area.height);
    let dialog_area = Rect {
        x: (area.width.saturating_sub(dialog_width)) / 2,
        y: (area.height.saturating_sub(dialog_height)) / 2,
        width: dialog_width,
        height: dialog_height,
    };

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(prompt.field.title())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::LightMagenta))
        .style(Style::default().bg(Color::Rgb(20, 10, 15)));
    frame.render_widget(block, dialog_area);

    let inner = dialog_area.inner(Margin::new(2, 1));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(inner);

    // Pasted offers are too long to show; report the length instead
    let shown = if prompt.field == PromptField::Offer && prompt.input.len() > inner.width as usize {
        format!("...{} chars pasted", prompt.input.len())
    } else {
        prompt.input.clone()
    };
    let input_text = if prompt.input.is_empty() {
        Span::styled(prompt.field.placeholder(), Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(format!("{}_", shown), Style::default().fg(Color::White))
    };
    frame.render_widget(Paragraph::new(Line::from(input_text)), rows[0]);

    if let Some(ref error) = prompt.error {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(error.clone(), Style::default().fg(Color::LightRed)))),
            rows[1],
        );
    }

    let mut hint = vec![
        Span::styled("Enter", Style::default().fg(Color::Gray)),
        Span::styled(": Confirm  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Esc", Style::default().fg(Color::Gray)),
        Span::styled(": Cancel", Style::default().fg(Color::DarkGray)),
    ];
    if prompt.field == PromptField::Offer {
        hint.push(Span::styled("  V", Style::default().fg(Color::Gray)));
        hint.push(Span::styled(": Paste", Style::default().fg(Color::DarkGray)));
    }
    frame.render_widget(Paragraph::new(Line::from(hint)).alignment(Alignment::Center), rows[3]);
}
