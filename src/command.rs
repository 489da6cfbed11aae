//! Chat command grammar.
//!
//! Input is trimmed and lower-cased, then matched in order; the first
//! matching rule wins:
//!
//! ```text
//! help | start | stop | set <n> | drink <n> | status | reset | <anything else>
//! ```

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Stop,
    /// `set <n>` — the raw argument, coerced later.
    SetInterval(String),
    /// `drink <n>` — the raw argument, coerced later.
    Drink(String),
    Status,
    Reset,
    Unknown,
}

/// Parse a chat line. Returns `None` for blank input.
pub fn parse(input: &str) -> Option<Command> {
    let msg = input.trim();
    if msg.is_empty() {
        return None;
    }
    let lower = msg.to_lowercase();

    let cmd = if lower == "help" {
        Command::Help
    } else if lower == "start" {
        Command::Start
    } else if lower == "stop" {
        Command::Stop
    } else if let Some(arg) = lower.strip_prefix("set ") {
        Command::SetInterval(arg.trim().to_owned())
    } else if let Some(arg) = lower.strip_prefix("drink ") {
        Command::Drink(arg.trim().to_owned())
    } else if lower == "status" {
        Command::Status
    } else if lower == "reset" {
        Command::Reset
    } else {
        Command::Unknown
    };
    Some(cmd)
}
