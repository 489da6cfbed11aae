//! Chat transcript — timestamped bot/user message rows.

use chrono::{DateTime, Local};

/// Who a chat row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    Bot,
    User,
}

impl Author {
    /// Avatar glyph drawn next to the message.
    pub fn avatar(self) -> &'static str {
        match self {
            Self::Bot => "💧",
            Self::User => "🙂",
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot => write!(f, "bot"),
            Self::User => write!(f, "user"),
        }
    }
}

/// A single row in the transcript.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub author: Author,
    pub text: String,
    pub at: DateTime<Local>,
}

impl ChatMessage {
    pub fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            author,
            text: text.into(),
            at: Local::now(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Author::Bot, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, text)
    }

    /// Hour:minute label for the row.
    pub fn time_label(&self) -> String {
        self.at.format("%H:%M").to_string()
    }
}

/// Scrolling transcript. New rows always scroll the view back to the bottom.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    /// Lines scrolled up from the bottom.
    scroll: u16,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row stamped with the current time.
    pub fn add_message(&mut self, text: impl Into<String>, author: Author) {
        self.push(ChatMessage::new(author, text));
    }

    /// Append an already-built row.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.scroll = 0;
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for m in messages {
            self.push(m);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_add(3);
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(3);
    }
}
