use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, ComposeField, InputMode};
use crate::chat::Message;
use crate::input::TextField;

pub fn draw(f: &mut Frame<'_>, app: &mut App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Input area
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(75), // Messages
            Constraint::Percentage(25), // Status
        ])
        .split(chunks[1]);

    draw_message_list(f, app, main_chunks[0]);
    draw_status_panel(f, app, main_chunks[1]);
    draw_input_area(f, app, chunks[2]);

    if app.input_mode == InputMode::Editing {
        draw_edit_overlay(f, app, main_chunks[0]);
    }
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let (state, style) = if app.is_live() {
        ("live", Style::default().fg(Color::Green))
    } else {
        ("syncing...", Style::default().fg(Color::Yellow))
    };

    let title = format!(
        " {} | {} | {} messages | {} ",
        app.nickname.value(),
        app.sync.collection(),
        app.sync.cache().len(),
        state
    );

    let title_paragraph = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).style(style).title(" LiveChat "))
        .alignment(Alignment::Center);

    f.render_widget(title_paragraph, area);
}

fn message_line(message: &Message, selected: bool) -> Line<'_> {
    let base = if selected {
        Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("[{}] ", message.date), base.fg(Color::Gray)),
        Span::styled(format!("<{}> ", message.username), base.fg(Color::Magenta)),
        Span::styled(message.text.as_str(), base),
    ])
}

fn draw_message_list(f: &mut Frame, app: &mut App, area: Rect) {
    let hint = match (app.input_mode, app.sync.view().selected().is_some()) {
        (InputMode::Editing, _) => " Messages (editing) ",
        (_, true) => " Messages | d=delete e=edit Esc=deselect ",
        (_, false) => " Messages ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(hint)
        .style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let (cache, view) = app.sync.view_parts();
    let range = view.layout(cache.len(), inner.height as usize);
    let selected = view.selected();

    let mut lines: Vec<Line> = cache.messages()[range]
        .iter()
        .map(|m| message_line(m, selected == Some(&m.id)))
        .collect();

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Press 'i', type a message and hit Enter.",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_status_panel(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Status ")
        .style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);

    let lines: Vec<Line> = app
        .get_visible_status_messages(inner.height as usize)
        .iter()
        .map(|s| Line::from(s.as_str()))
        .collect();

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_input_area(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
        .split(area);

    let composing = app.input_mode == InputMode::Composing;
    let focus = |field: ComposeField| {
        if composing && app.compose_field == field {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::White)
        }
    };

    let text_title = match app.input_mode {
        InputMode::Normal => " [NORMAL] i=input s=send q=quit ",
        InputMode::Composing => " [INPUT] Enter=send Tab=nickname Esc=normal ",
        InputMode::Editing => " [EDIT] ",
    };

    draw_field(f, &app.nickname, " Name ", focus(ComposeField::Nickname), chunks[0]);
    draw_field(f, &app.text, text_title, focus(ComposeField::Text), chunks[1]);

    if composing {
        let (field, area) = match app.compose_field {
            ComposeField::Nickname => (&app.nickname, chunks[0]),
            ComposeField::Text => (&app.text, chunks[1]),
        };
        f.set_cursor(area.x + field.cursor() as u16 + 1, area.y + 1);
    }
}

fn draw_field(f: &mut Frame, field: &TextField, title: &str, style: Style, area: Rect) {
    let paragraph = Paragraph::new(field.value())
        .block(Block::default().borders(Borders::ALL).title(title).style(style));
    f.render_widget(paragraph, area);
}

fn draw_edit_overlay(f: &mut Frame, app: &App, area: Rect) {
    let Some(overlay) = app.sync.overlay() else {
        return;
    };

    let popup = centered_rect(area, 80, 5);
    f.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Edit message | Enter=save Esc=close ")
        .style(Style::default().fg(Color::Yellow));
    let inner = block.inner(popup);

    let paragraph = Paragraph::new(overlay.value())
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, popup);

    f.set_cursor(inner.x + overlay.field.cursor() as u16, inner.y);
}

/// A rect `percent_x` wide and `height` tall in the middle of `area`.
fn centered_rect(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
