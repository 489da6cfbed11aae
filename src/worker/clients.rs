//! Pages controlled by the worker, and opening a new one when none exist.

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifies one connected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Messages the worker sends to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Bring the page to the foreground.
    Focus,
}

struct Client {
    id: ClientId,
    tx: mpsc::Sender<ClientMessage>,
    controlled: bool,
}

/// Connected pages in connection order.
#[derive(Default)]
pub struct Clients {
    list: Vec<Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. Pages connected before activation stay uncontrolled
    /// until [`Clients::claim`].
    pub fn add(&mut self, controlled: bool) -> (ClientId, mpsc::Receiver<ClientMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let id = ClientId::new();
        self.list.push(Client { id, tx, controlled });
        debug!(target: "worker", client = %id, controlled, "client connected");
        (id, rx)
    }

    pub fn remove(&mut self, id: ClientId) -> bool {
        let before = self.list.len();
        self.list.retain(|c| c.id != id);
        before != self.list.len()
    }

    /// Every page, controlled or not, oldest first.
    pub fn match_all(&self) -> Vec<ClientId> {
        self.list.iter().map(|c| c.id).collect()
    }

    /// Take control of every connected page.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.list.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        if claimed > 0 {
            info!(target: "worker", claimed, "claimed open pages");
        }
        claimed
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.list.iter().any(|c| c.id == id && c.controlled)
    }

    /// Ask page `id` to focus. Pages whose receiver is gone are dropped.
    pub fn focus(&mut self, id: ClientId) -> bool {
        let Some(pos) = self.list.iter().position(|c| c.id == id) else {
            return false;
        };
        match self.list[pos].tx.try_send(ClientMessage::Focus) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.list.remove(pos);
                false
            }
        }
    }

    /// Focus the oldest page that is still listening.
    pub fn focus_first(&mut self) -> Option<ClientId> {
        while let Some(id) = self.match_all().first().copied() {
            if self.focus(id) {
                return Some(id);
            }
        }
        None
    }
}

/// Opens a new page when no existing one can be focused.
pub trait WindowOpener: Send + Sync {
    fn open_window(&self, path: &str) -> std::io::Result<()>;
}

/// Opens the app's URL in the system browser.
pub struct BrowserOpener {
    base_url: String,
}

impl BrowserOpener {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }
}

impl WindowOpener for BrowserOpener {
    fn open_window(&self, path: &str) -> std::io::Result<()> {
        let url = format!("{}{path}", self.base_url);
        info!(target: "worker", %url, "opening new window");
        open::that(url)
    }
}
