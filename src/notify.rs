//! Notification bridge: permission handling and desktop notifications.
//!
//! Reminders always land in the chat transcript. A system notification is
//! raised in addition when the worker is registered and permission has been
//! granted. Permission is asked for at most once: a decision is persisted
//! and a denial is never re-prompted.

use crate::storage::{FileStorage, Storage};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const NOTIFICATION_TITLE: &str = "Aqua Buddy";
pub const REMINDER_TEXT: &str = "Time to drink water 💧";
pub const REMINDER_ICON: &str = "/icons/water.svg";
pub const REMINDER_TAG: &str = "aqua-reminder";

/// Notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not asked yet.
    Default,
    Granted,
    Denied,
}

impl Permission {
    fn from_stored(s: &str) -> Self {
        match s.trim() {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Default,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// What a reminder notification carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// Root-relative icon path, resolved against the asset cache.
    pub icon: String,
    /// Local file the icon was materialised to, if any.
    pub icon_file: Option<PathBuf>,
    /// Notifications with the same tag replace each other.
    pub tag: String,
    /// Alert again even when replacing a notification with the same tag.
    pub renotify: bool,
}

impl NotificationPayload {
    /// The fixed hydration reminder.
    pub fn reminder() -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_owned(),
            body: REMINDER_TEXT.to_owned(),
            icon: REMINDER_ICON.to_owned(),
            icon_file: None,
            tag: REMINDER_TAG.to_owned(),
            renotify: true,
        }
    }
}

/// A click on a shown notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClick {
    pub tag: String,
}

/// A system notification backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether notifications are supported at all.
    fn is_available(&self) -> bool;

    /// Current permission, without prompting.
    fn permission(&self) -> Permission;

    /// Prompt for permission and return the outcome.
    async fn request_permission(&self) -> Permission;

    /// Raise a notification. Clicks are reported on `clicks`.
    async fn show(
        &self,
        payload: &NotificationPayload,
        clicks: mpsc::Sender<NotificationClick>,
    ) -> color_eyre::Result<()>;

    /// Dismiss the notification with `tag`.
    fn close(&self, tag: &str);
}

/// Resolve notification permission, prompting at most once.
pub async fn ensure_permission(notifier: &dyn Notifier) -> bool {
    if !notifier.is_available() {
        return false;
    }
    match notifier.permission() {
        Permission::Granted => true,
        Permission::Denied => false,
        Permission::Default => notifier.request_permission().await == Permission::Granted,
    }
}

/// Backend used when notifications are switched off in config.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn is_available(&self) -> bool {
        false
    }

    fn permission(&self) -> Permission {
        Permission::Denied
    }

    async fn request_permission(&self) -> Permission {
        Permission::Denied
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

/// Desktop notifications through the platform notification service.
///
/// The permission decision is stored under `<key>_notifications`.
pub struct DesktopNotifier {
    storage: Mutex<FileStorage>,
    key: String,
    permission: Mutex<Permission>,
    listeners: Listeners,
}

impl DesktopNotifier {
    pub fn new(storage: FileStorage, storage_key: &str) -> Self {
        let key = format!("{storage_key}_notifications");
        let permission = storage
            .get(&key)
            .map(|s| Permission::from_stored(&s))
            .unwrap_or(Permission::Default);
        Self {
            storage: Mutex::new(storage),
            key,
            permission: Mutex::new(permission),
            listeners: Listeners::default(),
        }
    }

    fn remember(&self, permission: Permission) {
        if let Ok(mut p) = self.permission.lock() {
            *p = permission;
        }
        if let Ok(mut storage) = self.storage.lock()
            && let Err(e) = storage.set(&self.key, &permission.to_string())
        {
            warn!(target: "notify", error = %e, "failed to persist notification permission");
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn is_available(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        self.permission
            .lock()
            .map(|p| *p)
            .unwrap_or(Permission::Default)
    }

    async fn request_permission(&self) -> Permission {
        let reachable = tokio::task::spawn_blocking(notification_service_reachable)
            .await
            .unwrap_or(false);
        let permission = if reachable {
            Permission::Granted
        } else {
            Permission::Denied
        };
        info!(target: "notify", %permission, "notification permission decided");
        self.remember(permission);
        permission
    }

    async fn show(
        &self,
        payload: &NotificationPayload,
        clicks: mpsc::Sender<NotificationClick>,
    ) -> color_eyre::Result<()> {
        let payload = payload.clone();
        let listeners = self.listeners.clone();
        tokio::task::spawn_blocking(move || show_blocking(&payload, clicks, listeners))
            .await
            .map_err(|e| color_eyre::eyre::eyre!("notification task failed: {e}"))?
    }

    fn close(&self, tag: &str) {
        // The notification server dismisses a notification once its default
        // action is invoked; nothing is left open to close here.
        debug!(target: "notify", tag, "notification closed");
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn notification_service_reachable() -> bool {
    match notify_rust::get_server_information() {
        Ok(info) => {
            debug!(target: "notify", server = %info.name, "notification service found");
            true
        }
        Err(e) => {
            warn!(target: "notify", error = %e, "no notification service");
            false
        }
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn notification_service_reachable() -> bool {
    true
}

/// Tags with a thread blocked on their notification's actions.
///
/// A tag's notifications share one server id, so a single waiting thread
/// sees the actions of every replacement. Later shows of the same tag do
/// not start another.
#[derive(Debug, Default, Clone)]
struct Listeners(Arc<Mutex<HashSet<String>>>);

#[cfg_attr(not(all(unix, not(target_os = "macos"))), allow(dead_code))]
impl Listeners {
    /// Take the listener slot for `tag`. False if one is already waiting.
    fn claim(&self, tag: &str) -> bool {
        match self.0.lock() {
            Ok(mut tags) => tags.insert(tag.to_owned()),
            Err(_) => false,
        }
    }

    fn release(&self, tag: &str) {
        if let Ok(mut tags) = self.0.lock() {
            tags.remove(tag);
        }
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn show_blocking(
    payload: &NotificationPayload,
    clicks: mpsc::Sender<NotificationClick>,
    listeners: Listeners,
) -> color_eyre::Result<()> {
    let mut notification = notify_rust::Notification::new();
    notification
        .appname(NOTIFICATION_TITLE)
        .summary(&payload.title)
        .body(&payload.body)
        .id(tag_id(&payload.tag))
        .action("default", "Open");
    if let Some(icon) = &payload.icon_file {
        notification.icon(&icon.to_string_lossy());
    }
    if !payload.renotify {
        notification.hint(notify_rust::Hint::SuppressSound(true));
    }

    let handle = notification
        .show()
        .map_err(|e| color_eyre::eyre::eyre!("failed to show notification: {e}"))?;

    let tag = payload.tag.clone();
    if !listeners.claim(&tag) {
        debug!(target: "notify", %tag, "replaced notification, listener already waiting");
        return Ok(());
    }
    std::thread::spawn(move || {
        handle.wait_for_action(|action| {
            if action == "default" {
                let _ = clicks.blocking_send(NotificationClick { tag: tag.clone() });
            }
        });
        listeners.release(&tag);
    });
    Ok(())
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn show_blocking(
    payload: &NotificationPayload,
    _clicks: mpsc::Sender<NotificationClick>,
    _listeners: Listeners,
) -> color_eyre::Result<()> {
    notify_rust::Notification::new()
        .appname(NOTIFICATION_TITLE)
        .summary(&payload.title)
        .body(&payload.body)
        .show()
        .map_err(|e| color_eyre::eyre::eyre!("failed to show notification: {e}"))?;
    Ok(())
}

/// Stable notification id for a tag, so a new reminder replaces the last one.
#[cfg_attr(not(all(unix, not(target_os = "macos"))), allow(dead_code))]
fn tag_id(tag: &str) -> u32 {
    // FNV-1a; stays the same across runs and builds.
    let mut hash: u32 = 0x811c_9dc5;
    for b in tag.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash.max(1)
}
