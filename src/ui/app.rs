//! Application state for the chat TUI.

use crate::chat::Transcript;
use crate::controller::{Affordances, Reply};
use crate::state::HydrationState;
use std::time::{Duration, Instant};

/// Which input has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Chat,
    Interval,
    Goal,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Self::Chat => Self::Interval,
            Self::Interval => Self::Goal,
            Self::Goal => Self::Chat,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Chat => Self::Goal,
            Self::Interval => Self::Chat,
            Self::Goal => Self::Interval,
        }
    }
}

pub struct App {
    pub transcript: Transcript,

    // Chat composer
    pub input: String,
    pub input_cursor: usize,

    // Controls bar, mirrored from state after every reply
    pub interval_field: String,
    pub goal_field: String,
    pub affordances: Affordances,

    pub state: HydrationState,
    pub focus: Focus,

    /// Whether system notifications go through the worker.
    pub worker_registered: bool,

    flash: Option<(String, Instant)>,
}

impl App {
    pub fn new(state: HydrationState, affordances: Affordances) -> Self {
        Self {
            transcript: Transcript::new(),
            input: String::new(),
            input_cursor: 0,
            interval_field: state.interval_min.to_string(),
            goal_field: state.goal_ml.to_string(),
            affordances,
            state,
            focus: Focus::Chat,
            worker_registered: false,
            flash: None,
        }
    }

    /// Render a controller reply: append its messages and mirror the state.
    pub fn apply(&mut self, reply: Reply, affordances: Affordances) {
        self.transcript.extend(reply.messages);
        self.interval_field = reply.state.interval_min.to_string();
        self.goal_field = reply.state.goal_ml.to_string();
        self.state = reply.state;
        self.affordances = affordances;
    }

    pub fn cycle_focus(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn cycle_focus_back(&mut self) {
        self.focus = self.focus.prev();
    }

    /// Insert a character into the focused input.
    pub fn insert_char(&mut self, c: char) {
        match self.focus {
            Focus::Chat => {
                self.input
                    .insert(self.input.len().min(self.input_cursor), c);
                self.input_cursor += c.len_utf8();
            }
            Focus::Interval => self.interval_field.push(c),
            Focus::Goal => self.goal_field.push(c),
        }
    }

    /// Delete the character before the cursor in the focused input.
    pub fn backspace(&mut self) {
        match self.focus {
            Focus::Chat => {
                if self.input_cursor > 0 {
                    let prev = self.input[..self.input_cursor]
                        .char_indices()
                        .next_back()
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    self.input.drain(prev..self.input_cursor);
                    self.input_cursor = prev;
                }
            }
            Focus::Interval => {
                self.interval_field.pop();
            }
            Focus::Goal => {
                self.goal_field.pop();
            }
        }
    }

    /// Take the chat input, clearing the buffer.
    pub fn take_input(&mut self) -> String {
        let text = std::mem::take(&mut self.input);
        self.input_cursor = 0;
        text
    }

    pub fn flash(&mut self, msg: impl Into<String>) {
        self.flash = Some((msg.into(), Instant::now()));
    }

    /// The flash message, while it is still fresh.
    pub fn active_flash(&self) -> Option<&str> {
        self.flash
            .as_ref()
            .filter(|(_, at)| at.elapsed() < Duration::from_secs(3))
            .map(|(msg, _)| msg.as_str())
    }
}
