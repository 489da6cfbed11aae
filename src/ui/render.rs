//! Rendering for the chat TUI.

use super::app::{App, Focus};
use super::theme;
use crate::chat::{Author, ChatMessage};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};

/// Main draw entry point.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    frame.render_widget(Block::default().style(theme::background()), area);

    // Header (1) + progress (1) + chat + controls (3) + input (3).
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(area);

    draw_header(frame, outer[0], app);
    draw_progress(frame, outer[1], app);
    draw_chat(frame, outer[2], app);
    draw_controls(frame, outer[3], app);
    draw_input_bar(frame, outer[4], app);
}

// ── Header ───────────────────────────────────────────────

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(" 💧 Aqua Buddy ", theme::title())];
    if app.state.active {
        spans.push(Span::styled(
            format!(" every {}m ", app.state.interval_min),
            theme::success(),
        ));
    } else {
        spans.push(Span::styled(" reminders off ", theme::muted()));
    }
    if !app.worker_registered {
        spans.push(Span::styled(" chat-only ", theme::muted()));
    }
    if let Some(msg) = app.active_flash() {
        spans.push(Span::styled(format!(" {msg} "), theme::accent()));
    }

    let hints = " ^S start  ^X stop  Tab fields  ^C quit ";
    let used: usize = spans.iter().map(|s| s.width()).sum();
    let padding = (area.width as usize).saturating_sub(used + hints.len());
    if padding > 0 {
        spans.push(Span::raw(" ".repeat(padding)));
    }
    spans.push(Span::styled(hints, theme::subtitle()));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_progress(frame: &mut Frame, area: Rect, app: &App) {
    let pct = app.state.percent_of_goal();
    let label = format!(
        "{}/{} ml ({pct}%)",
        app.state.total_ml, app.state.goal_ml
    );
    let gauge = Gauge::default()
        .gauge_style(theme::gauge())
        .percent(pct.min(100) as u16)
        .label(Span::styled(label, theme::text()));
    frame.render_widget(gauge, area);
}

// ── Chat ─────────────────────────────────────────────────

fn draw_chat(frame: &mut Frame, area: Rect, app: &App) {
    let border_style = if app.focus == Focus::Chat {
        theme::border_active()
    } else {
        theme::border()
    };
    let block = Block::default()
        .title(Span::styled(" Chat ", theme::title()))
        .borders(Borders::ALL)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let messages = app.transcript.messages();
    if messages.is_empty() {
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for msg in messages {
        lines.push(message_line(msg));
        lines.push(Line::from(""));
    }

    // Apply scroll from bottom.
    let visible_height = inner.height as usize;
    let total = lines.len();
    let scroll = app.transcript.scroll() as usize;
    let skip = if total > visible_height {
        total - visible_height - scroll.min(total - visible_height)
    } else {
        0
    };

    let visible: Vec<Line> = lines.into_iter().skip(skip).take(visible_height).collect();
    frame.render_widget(Paragraph::new(visible).wrap(Wrap { trim: false }), inner);
}

fn message_line(msg: &ChatMessage) -> Line<'_> {
    let time = Span::styled(format!("  {}", msg.time_label()), theme::muted());
    match msg.author {
        Author::Bot => Line::from(vec![
            Span::raw(format!("{} ", msg.author.avatar())),
            Span::styled(msg.text.as_str(), theme::text()),
            time,
        ]),
        Author::User => Line::from(vec![
            Span::styled(msg.text.as_str(), theme::user_text()),
            Span::raw(format!(" {}", msg.author.avatar())),
            time,
        ])
        .alignment(Alignment::Right),
    }
}

// ── Controls ─────────────────────────────────────────────

fn draw_controls(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme::border());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let field = |label: &'static str, value: &str, unit: &'static str, focused: bool| {
        let style = if focused {
            theme::field_active()
        } else {
            theme::text()
        };
        vec![
            Span::styled(label, theme::subtitle()),
            Span::styled(format!("[{value:>5}]"), style),
            Span::styled(unit, theme::subtitle()),
        ]
    };
    let button = |label: &'static str, enabled: bool| {
        let style = if enabled {
            theme::button_enabled()
        } else {
            theme::button_disabled()
        };
        Span::styled(label, style)
    };

    let mut spans = Vec::new();
    spans.extend(field(
        " Interval ",
        &app.interval_field,
        " min   ",
        app.focus == Focus::Interval,
    ));
    spans.extend(field(
        "Goal ",
        &app.goal_field,
        " ml   ",
        app.focus == Focus::Goal,
    ));
    spans.push(button(" Start ", app.affordances.start_enabled));
    spans.push(Span::raw(" "));
    spans.push(button(" Stop ", app.affordances.stop_enabled));

    frame.render_widget(Paragraph::new(Line::from(spans)), inner);
}

// ── Input Bar ────────────────────────────────────────────

fn draw_input_bar(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(theme::border());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = Line::from(vec![
        Span::styled("> ", theme::key_hint()),
        Span::styled(app.input.as_str(), theme::text()),
    ]);
    frame.render_widget(Paragraph::new(line), inner);

    if app.focus == Focus::Chat {
        let chars = app.input[..app.input_cursor.min(app.input.len())]
            .chars()
            .count();
        let width = u16::try_from(chars).unwrap_or(u16::MAX);
        let cursor_x = inner.x.saturating_add(2).saturating_add(width);
        frame.set_cursor_position((cursor_x.min(inner.right().saturating_sub(1)), inner.y));
    }
}
