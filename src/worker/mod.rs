//! Asset cache worker.
//!
//! Runs as its own task, owns the on-disk cache and the list of connected
//! pages, and is reached only through a [`WorkerHandle`]. Registration
//! returns immediately; the asset manifest installs in the background, then
//! the worker activates (dropping caches from older versions). Fetches are
//! served cache-first throughout and notification clicks are routed back to
//! a page.

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod serve;

use crate::notify::{NotificationClick, NotificationPayload, Notifier};
use cache::{Cache, CacheStorage};
use clients::{ClientId, ClientMessage, Clients, WindowOpener};
use fetch::{AssetRequest, AssetResponse, FetchError, OfflineUpstream, Upstream, cache_first};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the current cache version.
pub const CACHE_NAME: &str = "aqua-buddy-cache-v1";

/// Assets fetched at install time.
pub const ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/styles.css",
    "/script.js",
    "/manifest.webmanifest",
    "/icons/water.svg",
];

/// Why installing the asset manifest failed. Nothing is cached when it does.
#[derive(Debug)]
pub enum InstallError {
    OpenCache(std::io::Error),
    Fetch { path: String, error: FetchError },
    BadStatus { path: String, status: u16 },
    Store { path: String, error: std::io::Error },
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenCache(e) => write!(f, "failed to open cache: {e}"),
            Self::Fetch { path, error } => write!(f, "failed to fetch {path}: {error}"),
            Self::BadStatus { path, status } => write!(f, "{path} returned status {status}"),
            Self::Store { path, error } => write!(f, "failed to cache {path}: {error}"),
        }
    }
}

impl std::error::Error for InstallError {}

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Installing,
    Activated,
    Stopped,
}

/// Everything an install needs, detached from the running worker.
struct Installer {
    caches: CacheStorage,
    cache_name: String,
    assets: Vec<String>,
    upstream: Option<Arc<dyn Upstream>>,
}

impl Installer {
    async fn run(self) -> Result<usize, InstallError> {
        let cache = self
            .caches
            .open(&self.cache_name)
            .await
            .map_err(InstallError::OpenCache)?;

        if cache.contains_all(&self.assets).await {
            debug!(target: "worker", cache = %self.cache_name, "assets already cached");
            return Ok(0);
        }
        let Some(upstream) = &self.upstream else {
            info!(target: "worker", "no upstream configured, skipping asset install");
            return Ok(0);
        };

        let mut fetched = Vec::with_capacity(self.assets.len());
        for path in &self.assets {
            let response = upstream
                .fetch(&AssetRequest::get(path.as_str()))
                .await
                .map_err(|error| InstallError::Fetch {
                    path: path.clone(),
                    error,
                })?;
            if !response.is_success() {
                return Err(InstallError::BadStatus {
                    path: path.clone(),
                    status: response.status,
                });
            }
            fetched.push((path, response));
        }

        for (path, response) in &fetched {
            cache
                .put(path, response)
                .await
                .map_err(|error| InstallError::Store {
                    path: (*path).clone(),
                    error,
                })?;
        }
        info!(target: "worker", cache = %self.cache_name, count = fetched.len(), "assets installed");
        Ok(fetched.len())
    }
}

enum WorkerMessage {
    Fetch {
        request: AssetRequest,
        reply: oneshot::Sender<Result<AssetResponse, FetchError>>,
    },
    ShowNotification(NotificationPayload),
    NotificationClick(NotificationClick),
    Connect {
        reply: oneshot::Sender<PageClient>,
    },
    Disconnect(ClientId),
}

/// A page's connection to the worker.
pub struct PageClient {
    pub id: ClientId,
    pub messages: mpsc::Receiver<ClientMessage>,
}

/// The page's handle on a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerMessage>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl WorkerHandle {
    /// Fetch through the worker.
    pub async fn fetch(&self, request: AssetRequest) -> Result<AssetResponse, FetchError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Fetch { request, reply })
            .await
            .map_err(|_| FetchError::WorkerGone)?;
        rx.await.map_err(|_| FetchError::WorkerGone)?
    }

    /// Post a notification. Returns false if the worker is gone or busy.
    pub fn show_notification(&self, payload: NotificationPayload) -> bool {
        self.tx
            .try_send(WorkerMessage::ShowNotification(payload))
            .is_ok()
    }

    /// Report a click on a shown notification.
    pub fn click(&self, click: NotificationClick) -> bool {
        self.tx
            .try_send(WorkerMessage::NotificationClick(click))
            .is_ok()
    }

    /// Connect a page so it can be focused on notification clicks.
    pub async fn connect(&self) -> Option<PageClient> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(WorkerMessage::Connect { reply }).await.ok()?;
        rx.await.ok()
    }

    pub fn disconnect(&self, id: ClientId) {
        let _ = self.tx.try_send(WorkerMessage::Disconnect(id));
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Wait until install has settled and the worker activated. Returns
    /// false if the worker stopped first.
    pub async fn activated(&self) -> bool {
        let mut rx = self.lifecycle.clone();
        matches!(
            rx.wait_for(|s| *s != Lifecycle::Installing).await.map(|s| *s),
            Ok(Lifecycle::Activated)
        )
    }
}

/// Worker state before and while it runs.
pub struct Worker {
    caches: CacheStorage,
    cache_name: String,
    assets: Vec<String>,
    upstream: Option<Arc<dyn Upstream>>,
    notifier: Arc<dyn Notifier>,
    opener: Arc<dyn WindowOpener>,
    clients: Clients,
    activated: bool,
    /// Tags with a notification on screen.
    shown: HashSet<String>,
}

impl Worker {
    pub fn new(
        caches: CacheStorage,
        notifier: Arc<dyn Notifier>,
        opener: Arc<dyn WindowOpener>,
    ) -> Self {
        Self {
            caches,
            cache_name: CACHE_NAME.to_owned(),
            assets: ASSETS.iter().map(|s| (*s).to_owned()).collect(),
            upstream: None,
            notifier,
            opener,
            clients: Clients::new(),
            activated: false,
            shown: HashSet::new(),
        }
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_assets(mut self, assets: Vec<String>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Fetch every manifest asset and store it in the current cache.
    ///
    /// All-or-nothing: every asset is fetched before any is stored, and a
    /// single failure or non-2xx response aborts the install. Returns the
    /// number of assets stored; zero when the cache is already complete or
    /// there is no upstream to fetch from.
    pub async fn install(&self) -> Result<usize, InstallError> {
        self.installer().run().await
    }

    fn installer(&self) -> Installer {
        Installer {
            caches: self.caches.clone(),
            cache_name: self.cache_name.clone(),
            assets: self.assets.clone(),
            upstream: self.upstream.clone(),
        }
    }

    /// Delete every cache but the current one and claim open pages.
    /// Returns the number of caches deleted.
    pub async fn activate(&mut self) -> std::io::Result<usize> {
        let mut deleted = 0;
        for name in self.caches.keys().await? {
            if name != self.cache_name && self.caches.delete(&name).await? {
                info!(target: "worker", cache = %name, "deleted stale cache");
                deleted += 1;
            }
        }
        self.activated = true;
        self.clients.claim();
        Ok(deleted)
    }

    /// Start the worker and return its handle at once.
    ///
    /// Install runs in the background while the worker already answers
    /// messages; activation follows when it settles. Install and activation
    /// failures are logged and the worker keeps serving, falling back to
    /// the network for anything not cached. The worker stops when `cancel`
    /// fires or every handle is dropped.
    pub fn register(self, cancel: CancellationToken) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(64);
        let (lifecycle_tx, lifecycle) = watch::channel(Lifecycle::Installing);
        let loopback = tx.downgrade();
        tokio::spawn(self.run(rx, loopback, lifecycle_tx, cancel));
        WorkerHandle { tx, lifecycle }
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<WorkerMessage>,
        loopback: mpsc::WeakSender<WorkerMessage>,
        lifecycle: watch::Sender<Lifecycle>,
        cancel: CancellationToken,
    ) {
        let upstream = self
            .upstream
            .clone()
            .unwrap_or_else(|| Arc::new(OfflineUpstream) as Arc<dyn Upstream>);
        let cache: Option<Cache> = match self.caches.open(&self.cache_name).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(target: "worker", error = %e, "cache unavailable, serving from network only");
                None
            }
        };
        let mut install = tokio::spawn(self.installer().run());
        let mut installing = true;

        // Clicks come back from the notifier on their own channel and are
        // forwarded into the main queue. The forwarder holds no strong
        // sender, so dropping every handle still stops the worker.
        let (click_tx, mut click_rx) = mpsc::channel::<NotificationClick>(8);
        let forward_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let click = tokio::select! {
                    _ = forward_cancel.cancelled() => break,
                    click = click_rx.recv() => match click {
                        Some(click) => click,
                        None => break,
                    },
                };
                let Some(tx) = loopback.upgrade() else { break };
                if tx.send(WorkerMessage::NotificationClick(click)).await.is_err() {
                    break;
                }
            }
        });

        info!(target: "worker", cache = %self.cache_name, "worker running");
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                joined = &mut install, if installing => {
                    installing = false;
                    match joined {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(target: "worker", error = %e, "asset install failed"),
                        Err(e) => warn!(target: "worker", error = %e, "asset install task failed"),
                    }
                    if let Err(e) = self.activate().await {
                        warn!(target: "worker", error = %e, "activation failed");
                    }
                    lifecycle.send_replace(Lifecycle::Activated);
                    continue;
                }
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };

            match msg {
                WorkerMessage::Fetch { request, reply } => {
                    let cache = cache.clone();
                    let upstream = Arc::clone(&upstream);
                    tokio::spawn(async move {
                        let result = match &cache {
                            Some(cache) => cache_first(cache, &upstream, request).await,
                            None => upstream.fetch(&request).await,
                        };
                        let _ = reply.send(result);
                    });
                }
                WorkerMessage::ShowNotification(mut payload) => {
                    if let Some(cache) = &cache {
                        match cache.materialize(&payload.icon).await {
                            Ok(file) => payload.icon_file = file,
                            Err(e) => debug!(target: "worker", error = %e, "icon not available"),
                        }
                    }
                    self.shown.insert(payload.tag.clone());
                    let notifier = Arc::clone(&self.notifier);
                    let click_tx = click_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = notifier.show(&payload, click_tx).await {
                            warn!(target: "worker", error = %e, "failed to show notification");
                        }
                    });
                }
                WorkerMessage::NotificationClick(click) => self.on_click(&click),
                WorkerMessage::Connect { reply } => {
                    let (id, messages) = self.clients.add(self.activated);
                    let _ = reply.send(PageClient { id, messages });
                }
                WorkerMessage::Disconnect(id) => {
                    self.clients.remove(id);
                }
            }
        }
        install.abort();
        lifecycle.send_replace(Lifecycle::Stopped);
        info!(target: "worker", "worker stopped");
    }

    fn on_click(&mut self, click: &NotificationClick) {
        // One notification per tag is on screen; repeat reports of the same
        // click are dropped.
        if !self.shown.remove(&click.tag) {
            debug!(target: "worker", tag = %click.tag, "click for a notification no longer shown");
            return;
        }
        self.notifier.close(&click.tag);
        if let Some(id) = self.clients.focus_first() {
            debug!(target: "worker", client = %id, "focused page");
            return;
        }
        if let Err(e) = self.opener.open_window("/") {
            warn!(target: "worker", error = %e, "failed to open window");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DisabledNotifier, Permission};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeUpstream {
        files: HashMap<String, AssetResponse>,
        calls: AtomicUsize,
    }

    impl FakeUpstream {
        fn serving(paths: &[&str]) -> Self {
            let files = paths
                .iter()
                .map(|p| (p.to_string(), AssetResponse::ok("text/plain", p.as_bytes().to_vec())))
                .collect();
            Self {
                files,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(&request.path)
                .cloned()
                .ok_or_else(|| FetchError::Network("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct FakeOpener {
        opened: Mutex<Vec<String>>,
    }

    impl WindowOpener for FakeOpener {
        fn open_window(&self, path: &str) -> std::io::Result<()> {
            self.opened.lock().unwrap().push(path.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        closed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
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
        fn close(&self, tag: &str) {
            self.closed.lock().unwrap().push(tag.to_owned());
        }
    }

    fn worker(dir: &std::path::Path) -> Worker {
        Worker::new(
            CacheStorage::new(dir),
            Arc::new(DisabledNotifier),
            Arc::new(FakeOpener::default()),
        )
    }

    #[tokio::test]
    async fn test_install_caches_every_asset() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path()).with_upstream(Arc::new(FakeUpstream::serving(ASSETS)));
        assert_eq!(w.install().await.unwrap(), ASSETS.len());

        let cache = CacheStorage::new(dir.path()).open(CACHE_NAME).await.unwrap();
        for path in ASSETS {
            assert!(cache.match_path(path).await.unwrap().is_some(), "missing {path}");
        }
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // Everything but the icon.
        let up = FakeUpstream::serving(&ASSETS[..ASSETS.len() - 1]);
        let w = worker(dir.path()).with_upstream(Arc::new(up));

        let err = w.install().await.unwrap_err();
        assert!(matches!(err, InstallError::Fetch { ref path, .. } if path == "/icons/water.svg"), "got: {err}");

        let cache = CacheStorage::new(dir.path()).open(CACHE_NAME).await.unwrap();
        assert!(cache.match_path("/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_skips_when_complete() {
        let dir = tempfile::tempdir().unwrap();
        let up = Arc::new(FakeUpstream::serving(ASSETS));
        let w = worker(dir.path()).with_upstream(up.clone());
        w.install().await.unwrap();
        let calls = up.calls.load(Ordering::SeqCst);

        assert_eq!(w.install().await.unwrap(), 0);
        assert_eq!(up.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_install_without_upstream_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(worker(dir.path()).install().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_activate_deletes_other_caches() {
        let dir = tempfile::tempdir().unwrap();
        let caches = CacheStorage::new(dir.path());
        caches.open("aqua-buddy-cache-v0").await.unwrap();
        caches.open(CACHE_NAME).await.unwrap();

        let mut w = worker(dir.path());
        assert_eq!(w.activate().await.unwrap(), 1);
        assert_eq!(caches.keys().await.unwrap(), vec![CACHE_NAME]);
    }

    /// An origin that never answers.
    struct Hung;

    #[async_trait]
    impl Upstream for Hung {
        async fn fetch(&self, _request: &AssetRequest) -> Result<AssetResponse, FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_register_returns_while_install_hangs() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let handle = worker(dir.path())
            .with_upstream(Arc::new(Hung))
            .register(cancel.clone());
        assert_eq!(handle.lifecycle(), Lifecycle::Installing);

        // The worker answers pages while install is still pending.
        let page = tokio::time::timeout(std::time::Duration::from_secs(1), handle.connect())
            .await
            .expect("connect blocked on install");
        assert!(page.is_some());
        assert!(handle.show_notification(NotificationPayload::reminder()));
        assert_eq!(handle.lifecycle(), Lifecycle::Installing);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_activates_after_install() {
        let dir = tempfile::tempdir().unwrap();
        let caches = CacheStorage::new(dir.path());
        caches.open("aqua-buddy-cache-v0").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = worker(dir.path())
            .with_upstream(Arc::new(FakeUpstream::serving(ASSETS)))
            .register(cancel.clone());

        assert!(handle.activated().await);
        assert_eq!(caches.keys().await.unwrap(), vec![CACHE_NAME]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_fetch_through_handle_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let up = Arc::new(FakeUpstream::serving(ASSETS));
        let cancel = CancellationToken::new();
        let handle = worker(dir.path())
            .with_upstream(up.clone())
            .register(cancel.clone());
        assert!(handle.activated().await);
        let after_install = up.calls.load(Ordering::SeqCst);

        let resp = handle.fetch(AssetRequest::get("/styles.css")).await.unwrap();
        assert_eq!(resp.body, b"/styles.css");
        assert_eq!(up.calls.load(Ordering::SeqCst), after_install);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_fetch_miss_without_network_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let handle = worker(dir.path()).register(cancel.clone());

        let err = handle.fetch(AssetRequest::get("/nope")).await.unwrap_err();
        assert_eq!(err, FetchError::Offline);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let handle = Worker::new(
            CacheStorage::new(dir.path()),
            notifier.clone(),
            Arc::new(FakeOpener::default()),
        )
        .register(CancellationToken::new());
        assert!(handle.activated().await);
        drop(handle);

        // The worker owns the only other reference to the notifier.
        for _ in 0..100 {
            if Arc::strong_count(&notifier) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(Arc::strong_count(&notifier), 1, "worker still running");
    }

    fn click() -> NotificationClick {
        NotificationClick {
            tag: "aqua-reminder".into(),
        }
    }

    #[tokio::test]
    async fn test_click_focuses_connected_page() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let opener = Arc::new(FakeOpener::default());
        let cancel = CancellationToken::new();
        let handle = Worker::new(CacheStorage::new(dir.path()), notifier.clone(), opener.clone())
            .register(cancel.clone());

        let mut page = handle.connect().await.unwrap();
        assert!(handle.show_notification(NotificationPayload::reminder()));
        assert!(handle.click(click()));
        assert_eq!(page.messages.recv().await, Some(ClientMessage::Focus));
        assert_eq!(*notifier.closed.lock().unwrap(), vec!["aqua-reminder"]);
        assert!(opener.opened.lock().unwrap().is_empty());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_repeated_click_reports_focus_once() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let cancel = CancellationToken::new();
        let handle = Worker::new(
            CacheStorage::new(dir.path()),
            notifier.clone(),
            Arc::new(FakeOpener::default()),
        )
        .register(cancel.clone());

        let mut page = handle.connect().await.unwrap();
        for _ in 0..3 {
            assert!(handle.show_notification(NotificationPayload::reminder()));
        }
        for _ in 0..3 {
            assert!(handle.click(click()));
        }
        // Round-trip a connect so every click has been processed.
        let _other = handle.connect().await.unwrap();

        assert_eq!(page.messages.try_recv(), Ok(ClientMessage::Focus));
        assert!(page.messages.try_recv().is_err(), "focused more than once");
        assert_eq!(notifier.closed.lock().unwrap().len(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_click_without_pages_opens_window() {
        let dir = tempfile::tempdir().unwrap();
        let opener = Arc::new(FakeOpener::default());
        let cancel = CancellationToken::new();
        let handle = Worker::new(
            CacheStorage::new(dir.path()),
            Arc::new(RecordingNotifier::default()),
            opener.clone(),
        )
        .register(cancel.clone());

        let page = handle.connect().await.unwrap();
        handle.disconnect(page.id);
        handle.show_notification(NotificationPayload::reminder());
        handle.click(click());

        // Round-trip a connect so the click has been processed.
        let _sync = handle.connect().await.unwrap();
        assert_eq!(*opener.opened.lock().unwrap(), vec!["/"]);
        cancel.cancel();
    }
}
