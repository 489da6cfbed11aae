//! Chat TUI: transcript, controls bar and composer, driven by the controller.

pub mod app;
pub mod render;
pub mod theme;

use app::{App, Focus};
use color_eyre::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyModifiers},
    style::Print,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::controller::{Action, Controller};
use crate::scheduler::ReminderTick;
use crate::worker::PageClient;
use crate::worker::clients::ClientMessage;

/// Launch the TUI. `page` is this window's connection to the worker, if
/// one is registered.
pub async fn run(
    controller: &mut Controller,
    ticks: mpsc::Receiver<ReminderTick>,
    page: Option<PageClient>,
) -> Result<()> {
    let mut app = App::new(controller.state().clone(), controller.affordances());
    app.worker_registered = page.is_some();
    let boot = controller.boot();
    app.apply(boot, controller.affordances());

    // Terminal setup.
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, &mut app, controller, ticks, page).await;

    // Terminal teardown.
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
    controller: &mut Controller,
    mut ticks: mpsc::Receiver<ReminderTick>,
    mut page: Option<PageClient>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| render::draw(frame, app))?;

        // Reminder ticks (non-blocking).
        while let Ok(tick) = ticks.try_recv() {
            if let Some(reply) = controller.on_tick(tick) {
                app.apply(reply, controller.affordances());
            }
        }

        // Focus requests from the worker after a notification click.
        if let Some(page) = page.as_mut() {
            while let Ok(msg) = page.messages.try_recv() {
                match msg {
                    ClientMessage::Focus => {
                        info!(target: "notify", "notification clicked, focusing chat");
                        app.focus = Focus::Chat;
                        app.flash("Time to drink water");
                        let _ = stdout().execute(Print('\u{7}'));
                    }
                }
            }
        }

        // Poll keyboard events with 100ms timeout.
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
        {
            if key.modifiers.contains(KeyModifiers::CONTROL) {
                let action = match key.code {
                    KeyCode::Char('c') => break,
                    KeyCode::Char('s') if app.affordances.start_enabled => Some(Action::Start),
                    KeyCode::Char('x') if app.affordances.stop_enabled => Some(Action::Stop),
                    _ => None,
                };
                if let Some(action) = action {
                    let reply = controller.dispatch(action).await;
                    app.apply(reply, controller.affordances());
                }
                continue;
            }

            match key.code {
                KeyCode::Tab => app.cycle_focus(),
                KeyCode::BackTab => app.cycle_focus_back(),
                KeyCode::Esc => app.focus = Focus::Chat,
                KeyCode::Enter => {
                    let action = match app.focus {
                        Focus::Chat => Action::Input(app.take_input()),
                        Focus::Interval => Action::SetInterval(app.interval_field.clone()),
                        Focus::Goal => Action::SetGoal(app.goal_field.clone()),
                    };
                    let reply = controller.dispatch(action).await;
                    app.apply(reply, controller.affordances());
                }
                KeyCode::Backspace => app.backspace(),
                KeyCode::Up if app.focus == Focus::Chat => app.transcript.scroll_up(),
                KeyCode::Down if app.focus == Focus::Chat => app.transcript.scroll_down(),
                KeyCode::Char(c) => app.insert_char(c),
                _ => {}
            }
        }
    }

    Ok(())
}
