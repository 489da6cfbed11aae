//! The page controller: one owner for the hydration state, its store, the
//! reminder timer, the notifier and the worker registration.
//!
//! Every user action goes through [`Controller::dispatch`], which mutates
//! state, persists it, and returns the bot messages to render.

use crate::chat::ChatMessage;
use crate::command::{self, Command};
use crate::notify::{NotificationPayload, Notifier, Permission, REMINDER_TEXT, ensure_permission};
use crate::scheduler::{ReminderTick, ReminderTimer};
use crate::state::types::{drink_from_input, goal_from_input, interval_from_input};
use crate::state::{HydrationState, StateStore};
use crate::worker::WorkerHandle;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const HELP_TEXT: &str =
    "Commands: 'start', 'stop', 'set 20' (minutes), 'drink 250', 'status', 'reset'";
pub const GREETING_TEXT: &str =
    "Hi! I'm Aqua Buddy. Type 'start' to begin reminders. Try 'help' for commands.";
pub const WELCOME_BACK_TEXT: &str = "Welcome back! Type \u{2018}status\u{2019} anytime.";
pub const FALLBACK_TEXT: &str = "I didn't get that. Try 'help'.";

/// Something the user asked for, from chat or from a control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A raw chat line: echoed, then parsed and dispatched.
    Input(String),
    Help,
    Start,
    Stop,
    SetInterval(String),
    SetGoal(String),
    RecordDrink(String),
    Status,
    Reset,
    NotUnderstood,
}

impl From<Command> for Action {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Help => Self::Help,
            Command::Start => Self::Start,
            Command::Stop => Self::Stop,
            Command::SetInterval(n) => Self::SetInterval(n),
            Command::Drink(n) => Self::RecordDrink(n),
            Command::Status => Self::Status,
            Command::Reset => Self::Reset,
            Command::Unknown => Self::NotUnderstood,
        }
    }
}

/// Outcome of an action: the state afterwards and the messages to show.
#[derive(Debug, Clone)]
pub struct Reply {
    pub state: HydrationState,
    pub messages: Vec<ChatMessage>,
}

impl Reply {
    pub fn texts(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.text.as_str()).collect()
    }
}

/// Which of the start/stop controls can be pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

pub struct Controller {
    state: HydrationState,
    store: StateStore,
    timer: ReminderTimer,
    notifier: Arc<dyn Notifier>,
    worker: Option<WorkerHandle>,
    icon: String,
}

impl Controller {
    /// Load state for `today`. Ticks from the reminder timer are sent on
    /// `ticks`; feed them back through [`Controller::on_tick`].
    pub fn new(
        store: StateStore,
        today: NaiveDate,
        notifier: Arc<dyn Notifier>,
        ticks: mpsc::Sender<ReminderTick>,
    ) -> Self {
        let state = store.load(today);
        debug!(target: "store", ?state, "state loaded");
        Self {
            state,
            store,
            timer: ReminderTimer::new(ticks),
            notifier,
            worker: None,
            icon: NotificationPayload::reminder().icon,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Attach the worker registration used for system notifications.
    pub fn set_worker(&mut self, worker: Option<WorkerHandle>) {
        self.worker = worker;
    }

    pub fn state(&self) -> &HydrationState {
        &self.state
    }

    pub fn affordances(&self) -> Affordances {
        Affordances {
            start_enabled: !self.state.active,
            stop_enabled: self.state.active,
        }
    }

    /// Period of the running reminder timer, if any.
    pub fn timer_period(&self) -> Option<Duration> {
        self.timer.period()
    }

    /// Page-load work: greet or welcome back, and resume reminders that
    /// were running without prompting or announcing.
    pub fn boot(&mut self) -> Reply {
        let text = if self.store.is_welcomed() {
            WELCOME_BACK_TEXT
        } else {
            if let Err(e) = self.store.mark_welcomed() {
                warn!(target: "store", error = %e, "failed to persist welcomed flag");
            }
            GREETING_TEXT
        };
        if self.state.active {
            info!(target: "reminder", interval_min = self.state.interval_min, "resuming reminders");
            self.restart_timer();
        }
        self.reply(vec![ChatMessage::bot(text)])
    }

    /// Echo a chat line and dispatch it. Blank input yields no messages.
    pub async fn handle_input(&mut self, raw: &str) -> Reply {
        self.dispatch(Action::Input(raw.to_owned())).await
    }

    pub async fn dispatch(&mut self, action: Action) -> Reply {
        match action {
            Action::Input(raw) => {
                let Some(cmd) = command::parse(&raw) else {
                    return self.reply(Vec::new());
                };
                let echo = ChatMessage::user(raw.trim());
                let mut reply = Box::pin(self.dispatch(cmd.into())).await;
                reply.messages.insert(0, echo);
                reply
            }
            Action::Help => self.say(HELP_TEXT),
            Action::Start => self.start().await,
            Action::Stop => self.stop(),
            Action::SetInterval(raw) => self.set_interval(&raw),
            Action::SetGoal(raw) => self.set_goal(&raw),
            Action::RecordDrink(raw) => self.record_drink(&raw),
            Action::Status => {
                let s = &self.state;
                let text = format!(
                    "Interval: {}m \u{2022} Today: {}/{} ml ({}%)",
                    s.interval_min,
                    s.total_ml,
                    s.goal_ml,
                    s.percent_of_goal()
                );
                self.say(text)
            }
            Action::Reset => {
                self.state.total_ml = 0;
                self.persist();
                self.say("Daily total reset.")
            }
            Action::NotUnderstood => self.say(FALLBACK_TEXT),
        }
    }

    /// Turn a timer tick into a reminder. Ticks from a cancelled timer are
    /// dropped.
    pub fn on_tick(&mut self, tick: ReminderTick) -> Option<Reply> {
        if !self.timer.is_current(tick) {
            debug!(target: "reminder", generation = tick.generation, "stale tick ignored");
            return None;
        }
        Some(self.show_reminder())
    }

    /// Post the reminder to the chat, and as a system notification when
    /// the worker is registered and permission is granted.
    pub fn show_reminder(&mut self) -> Reply {
        if let Some(worker) = &self.worker
            && self.notifier.is_available()
            && self.notifier.permission() == Permission::Granted
        {
            let payload = NotificationPayload {
                icon: self.icon.clone(),
                ..NotificationPayload::reminder()
            };
            if !worker.show_notification(payload) {
                debug!(target: "notify", "worker did not accept notification");
            }
        }
        self.say(REMINDER_TEXT)
    }

    async fn start(&mut self) -> Reply {
        let allowed = ensure_permission(self.notifier.as_ref()).await;
        self.state.active = true;
        self.persist();
        self.restart_timer();
        info!(target: "reminder", interval_min = self.state.interval_min, allowed, "reminders on");
        self.say(if allowed {
            "Reminders ON. Notifications allowed."
        } else {
            "Reminders ON. Notifications not granted."
        })
    }

    fn stop(&mut self) -> Reply {
        self.state.active = false;
        self.persist();
        self.timer.cancel();
        info!(target: "reminder", "reminders off");
        self.say("Reminders OFF.")
    }

    fn set_interval(&mut self, raw: &str) -> Reply {
        let m = interval_from_input(raw);
        self.state.interval_min = m;
        self.persist();
        let reply = self.say(format!("Okay! I'll remind you every {m} minutes."));
        if self.state.active {
            self.restart_timer();
        }
        reply
    }

    fn set_goal(&mut self, raw: &str) -> Reply {
        let g = goal_from_input(raw);
        self.state.goal_ml = g;
        self.persist();
        self.say(format!("Daily goal set to {g} ml."))
    }

    fn record_drink(&mut self, raw: &str) -> Reply {
        let add = drink_from_input(raw);
        self.state.total_ml = self.state.total_ml.saturating_add(add);
        self.persist();
        self.say(format!(
            "Nice! Logged {add} ml. Total today: {} ml ({}%).",
            self.state.total_ml,
            self.state.percent_of_goal()
        ))
    }

    fn restart_timer(&mut self) {
        let period = Duration::from_secs(u64::from(self.state.interval_min) * 60);
        self.timer.start(period);
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            warn!(target: "store", error = %e, "failed to save state");
        }
    }

    fn say(&self, text: impl Into<String>) -> Reply {
        self.reply(vec![ChatMessage::bot(text)])
    }

    fn reply(&self, messages: Vec<ChatMessage>) -> Reply {
        Reply {
            state: self.state.clone(),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Author;
    use crate::notify::{DisabledNotifier, NotificationClick};
    use crate::state::STORAGE_KEY;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn controller() -> (Controller, mpsc::Receiver<ReminderTick>) {
        let (tx, rx) = mpsc::channel(8);
        let store = StateStore::new(Box::new(MemoryStorage::new()), STORAGE_KEY);
        let c = Controller::new(store, day("2024-05-02"), Arc::new(DisabledNotifier), tx);
        (c, rx)
    }

    struct Granted;

    #[async_trait]
    impl Notifier for Granted {
        fn is_available(&self) -> bool {
            true
        }
        fn permission(&self) -> Permission {
            Permission::Granted
        }
        async fn request_permission(&self) -> Permission {
            Permission::Granted
        }
        async fn show(
            &self,
            _payload: &NotificationPayload,
            _clicks: mpsc::Sender<NotificationClick>,
        ) -> color_eyre::Result<()> {
            Ok(())
        }
        fn close(&self, _tag: &str) {}
    }

    #[tokio::test]
    async fn test_blank_input_renders_nothing() {
        let (mut c, _rx) = controller();
        assert!(c.handle_input("   ").await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_input_echoes_then_replies() {
        let (mut c, _rx) = controller();
        let reply = c.handle_input("  HELP ").await;
        assert_eq!(reply.messages.len(), 2);
        assert_eq!(reply.messages[0].author, Author::User);
        assert_eq!(reply.messages[0].text, "HELP");
        assert_eq!(reply.messages[1].author, Author::Bot);
        assert_eq!(reply.messages[1].text, HELP_TEXT);
    }

    #[tokio::test]
    async fn test_set_interval_clamps_and_defaults() {
        let (mut c, _rx) = controller();
        for (input, expected) in [("set 3", 5), ("set 999", 240), ("set abc", 30), ("set 0", 30), ("set 12.9", 12)] {
            let reply = c.handle_input(input).await;
            assert_eq!(reply.state.interval_min, expected, "input: {input}");
            assert_eq!(
                reply.texts()[1],
                format!("Okay! I'll remind you every {expected} minutes.")
            );
        }
    }

    #[tokio::test]
    async fn test_drink_accumulates() {
        let (mut c, _rx) = controller();
        let reply = c.handle_input("drink 1").await;
        assert_eq!(reply.state.total_ml, 10);
        let reply = c.handle_input("drink 5000").await;
        assert_eq!(reply.state.total_ml, 2010);
        assert_eq!(
            reply.texts()[1],
            "Nice! Logged 2000 ml. Total today: 2010 ml (100%)."
        );
    }

    #[tokio::test]
    async fn test_status_and_reset() {
        let (mut c, _rx) = controller();
        c.handle_input("drink 500").await;
        let reply = c.handle_input("status").await;
        assert_eq!(reply.texts()[1], "Interval: 30m \u{2022} Today: 500/2000 ml (25%)");

        let reply = c.handle_input("reset").await;
        assert_eq!(reply.state.total_ml, 0);
        assert_eq!(reply.texts()[1], "Daily total reset.");
    }

    #[tokio::test]
    async fn test_goal_is_not_a_chat_command() {
        let (mut c, _rx) = controller();
        let reply = c.handle_input("goal 3000").await;
        assert_eq!(reply.texts()[1], FALLBACK_TEXT);
        assert_eq!(reply.state.goal_ml, 2000);

        let reply = c.dispatch(Action::SetGoal("3000".into())).await;
        assert_eq!(reply.state.goal_ml, 3000);
        assert_eq!(reply.texts(), vec!["Daily goal set to 3000 ml."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_permission() {
        let (mut c, _rx) = controller();
        assert!(c.affordances().start_enabled);
        let reply = c.handle_input("start").await;
        assert_eq!(reply.texts()[1], "Reminders ON. Notifications not granted.");
        assert!(reply.state.active);
        assert_eq!(
            c.affordances(),
            Affordances {
                start_enabled: false,
                stop_enabled: true
            }
        );
        assert_eq!(c.timer_period(), Some(Duration::from_secs(30 * 60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_permission() {
        let (tx, _rx) = mpsc::channel(8);
        let store = StateStore::new(Box::new(MemoryStorage::new()), STORAGE_KEY);
        let mut c = Controller::new(store, day("2024-05-02"), Arc::new(Granted), tx);
        let reply = c.dispatch(Action::Start).await;
        assert_eq!(reply.texts(), vec!["Reminders ON. Notifications allowed."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let (mut c, _rx) = controller();
        c.dispatch(Action::Start).await;
        let reply = c.dispatch(Action::Stop).await;
        assert_eq!(reply.texts(), vec!["Reminders OFF."]);
        assert!(!reply.state.active);
        assert!(c.timer_period().is_none());
        assert!(c.affordances().start_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_restarts_running_timer() {
        let (mut c, _rx) = controller();
        c.dispatch(Action::Start).await;
        c.handle_input("set 10").await;
        assert_eq!(c.timer_period(), Some(Duration::from_secs(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_while_stopped_leaves_timer_off() {
        let (mut c, _rx) = controller();
        c.handle_input("set 10").await;
        assert!(c.timer_period().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_shows_reminder_and_stale_tick_dropped() {
        let (mut c, mut rx) = controller();
        c.dispatch(Action::Start).await;
        let tick = rx.recv().await.unwrap();
        let reply = c.on_tick(tick).unwrap();
        assert_eq!(reply.texts(), vec![REMINDER_TEXT]);

        c.handle_input("set 10").await;
        assert!(c.on_tick(tick).is_none());
    }

    #[tokio::test]
    async fn test_boot_greets_once() {
        let (tx, _rx) = mpsc::channel(8);
        let storage = MemoryStorage::new();
        let store = StateStore::new(Box::new(storage), STORAGE_KEY);
        let mut c = Controller::new(store, day("2024-05-02"), Arc::new(DisabledNotifier), tx);
        assert_eq!(c.boot().texts(), vec![GREETING_TEXT]);
        assert_eq!(c.boot().texts(), vec![WELCOME_BACK_TEXT]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_resumes_active_silently() {
        let (tx, _rx) = mpsc::channel(8);
        let raw = r#"{"totalMl":100,"intervalMin":15,"goalMl":2000,"active":true,"today":"2024-05-02"}"#;
        let storage = MemoryStorage::new()
            .with_entry(STORAGE_KEY, raw)
            .with_entry("aqua-buddy-v1_welcomed", "1");
        let store = StateStore::new(Box::new(storage), STORAGE_KEY);
        let mut c = Controller::new(store, day("2024-05-02"), Arc::new(DisabledNotifier), tx);

        let reply = c.boot();
        assert_eq!(reply.texts(), vec![WELCOME_BACK_TEXT]);
        assert_eq!(c.timer_period(), Some(Duration::from_secs(15 * 60)));
    }
}
