//! Color palette and styles for the chat TUI. Cool water tones.

use ratatui::style::{Color, Modifier, Style};

// ── Color Palette ──────────────────────────────────────────

pub const AQUA: Color = Color::Rgb(64, 196, 255); // bright water
pub const TIDE: Color = Color::Rgb(0, 150, 199); // deeper blue
pub const FOAM: Color = Color::Rgb(202, 240, 248); // pale highlight
pub const SLATE: Color = Color::Rgb(48, 60, 72); // borders
pub const DEEP: Color = Color::Rgb(18, 26, 36); // background
pub const MIST: Color = Color::Rgb(130, 145, 160); // muted text
pub const KELP: Color = Color::Rgb(100, 230, 180); // success
pub const CORAL: Color = Color::Rgb(255, 110, 100); // error
pub const PEARL: Color = Color::Rgb(225, 230, 235); // bright text

// ── Styles ─────────────────────────────────────────────────

pub fn title() -> Style {
    Style::default().fg(AQUA).add_modifier(Modifier::BOLD)
}

pub fn subtitle() -> Style {
    Style::default().fg(MIST)
}

pub fn text() -> Style {
    Style::default().fg(PEARL)
}

pub fn muted() -> Style {
    Style::default().fg(MIST)
}

pub fn accent() -> Style {
    Style::default().fg(AQUA)
}

pub fn user_text() -> Style {
    Style::default().fg(FOAM)
}

pub fn button_enabled() -> Style {
    Style::default()
        .fg(DEEP)
        .bg(AQUA)
        .add_modifier(Modifier::BOLD)
}

pub fn button_disabled() -> Style {
    Style::default().fg(MIST).bg(SLATE)
}

pub fn field_active() -> Style {
    Style::default().fg(FOAM).add_modifier(Modifier::UNDERLINED)
}

pub fn success() -> Style {
    Style::default().fg(KELP)
}

pub fn error() -> Style {
    Style::default().fg(CORAL)
}

pub fn gauge() -> Style {
    Style::default().fg(TIDE).bg(DEEP)
}

pub fn key_hint() -> Style {
    Style::default().fg(AQUA).add_modifier(Modifier::BOLD)
}

pub fn border() -> Style {
    Style::default().fg(SLATE)
}

pub fn border_active() -> Style {
    Style::default().fg(AQUA)
}

pub fn background() -> Style {
    Style::default().bg(DEEP)
}
