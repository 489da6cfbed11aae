//! Aqua Buddy — a chat-style hydration reminder for the terminal.
//!
//! The TUI keeps a daily fluid total, reminds you to drink on a fixed
//! interval, and raises desktop notifications through the asset cache
//! worker. One-shot subcommands run the same chat actions from a shell.

use aqua_buddy::config::{self, AquaConfig};
use aqua_buddy::controller::{Action, Controller};
use aqua_buddy::notify::{DesktopNotifier, DisabledNotifier, Notifier};
use aqua_buddy::state::StateStore;
use aqua_buddy::storage::FileStorage;
use aqua_buddy::worker::Worker;
use aqua_buddy::worker::cache::CacheStorage;
use aqua_buddy::worker::clients::BrowserOpener;
use aqua_buddy::worker::fetch::HttpUpstream;
use aqua_buddy::{logging, ui};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aqua Buddy — drink water, on a schedule.
#[derive(Parser)]
#[command(name = "aqua", version, about)]
struct Cli {
    /// Data directory (defaults to the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to config file (defaults to <data-dir>/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Launch the chat TUI (default).
    Ui,

    /// Run one chat command and print the replies.
    Say {
        /// The chat text (multiple words joined).
        #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Show interval and today's progress.
    Status,

    /// Log a drink (default 250 ml).
    Drink {
        /// Amount in ml.
        #[arg(allow_hyphen_values = true)]
        amount: Option<String>,
    },

    /// Set the reminder interval.
    Set {
        /// Minutes between reminders (5–240).
        #[arg(allow_hyphen_values = true)]
        minutes: String,
    },

    /// Set the daily goal.
    Goal {
        /// Goal in ml (500–10000).
        #[arg(allow_hyphen_values = true)]
        ml: String,
    },

    /// Reset today's total.
    Reset,

    /// Run the asset cache worker behind a local HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join("config.toml"));
    let command = cli.command.unwrap_or(Command::Ui);

    if matches!(command, Command::Ui) {
        logging::init_file(&data_dir.join("aqua.log")).wrap_err("failed to open log file")?;
    } else {
        logging::init_stderr();
    }

    let config = AquaConfig::load(&config_path)
        .wrap_err_with(|| format!("failed to load {}", config_path.display()))?;

    match command {
        Command::Ui => cmd_ui(&data_dir, &config).await,
        Command::Say { text } => cmd_once(&data_dir, &config, Action::Input(text.join(" "))).await,
        Command::Status => cmd_once(&data_dir, &config, Action::Status).await,
        Command::Drink { amount } => {
            cmd_once(&data_dir, &config, Action::RecordDrink(amount.unwrap_or_default())).await
        }
        Command::Set { minutes } => cmd_once(&data_dir, &config, Action::SetInterval(minutes)).await,
        Command::Goal { ml } => cmd_once(&data_dir, &config, Action::SetGoal(ml)).await,
        Command::Reset => cmd_once(&data_dir, &config, Action::Reset).await,
        Command::Serve => cmd_serve(&data_dir, &config).await,
    }
}

/// Launch the TUI with the worker registered alongside it.
async fn cmd_ui(data_dir: &Path, config: &AquaConfig) -> Result<()> {
    let notifier = build_notifier(data_dir, config);
    let (tick_tx, tick_rx) = mpsc::channel(16);
    let mut controller = Controller::new(
        state_store(data_dir, config),
        config.day_boundary.today(),
        Arc::clone(&notifier),
        tick_tx,
    )
    .with_icon(config.notifications.icon.clone());

    let cancel = CancellationToken::new();
    let page = if config.worker.enabled {
        let handle = build_worker(data_dir, config, notifier)?.register(cancel.clone());
        let page = handle.connect().await;
        controller.set_worker(Some(handle));
        page
    } else {
        None
    };

    let result = ui::run(&mut controller, tick_rx, page).await;
    cancel.cancel();
    result
}

/// Dispatch a single action and print the replies.
async fn cmd_once(data_dir: &Path, config: &AquaConfig, action: Action) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .wrap_err_with(|| format!("failed to create {}", data_dir.display()))?;

    // No page loop runs here, so ticks have nowhere to go.
    let (tick_tx, _tick_rx) = mpsc::channel(1);
    let mut controller = Controller::new(
        state_store(data_dir, config),
        config.day_boundary.today(),
        build_notifier(data_dir, config),
        tick_tx,
    );

    let reply = controller.dispatch(action).await;
    for msg in &reply.messages {
        println!("{} {}  {}", msg.author.avatar(), msg.time_label(), msg.text);
    }
    Ok(())
}

/// Serve cached assets over HTTP until Ctrl-C.
async fn cmd_serve(data_dir: &Path, config: &AquaConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let handle =
        build_worker(data_dir, config, build_notifier(data_dir, config))?.register(cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received; shutting down");
        ctrl_c.cancel();
    });

    aqua_buddy::worker::serve::serve(config.worker.listen, handle, cancel).await
}

fn state_store(data_dir: &Path, config: &AquaConfig) -> StateStore {
    StateStore::new(
        Box::new(FileStorage::new(data_dir)),
        config.storage_key.clone(),
    )
}

fn build_notifier(data_dir: &Path, config: &AquaConfig) -> Arc<dyn Notifier> {
    if config.notifications.enabled {
        Arc::new(DesktopNotifier::new(
            FileStorage::new(data_dir),
            &config.storage_key,
        ))
    } else {
        Arc::new(DisabledNotifier)
    }
}

fn build_worker(
    data_dir: &Path,
    config: &AquaConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Worker> {
    let base_url = config
        .worker
        .upstream
        .clone()
        .unwrap_or_else(|| format!("http://{}", config.worker.listen));
    let mut worker = Worker::new(
        CacheStorage::new(data_dir.join("cache")),
        notifier,
        Arc::new(BrowserOpener::new(base_url)),
    )
    .with_cache_name(config.worker.cache_name.clone())
    .with_assets(config.worker.assets.clone());
    if let Some(upstream) = &config.worker.upstream {
        let http = HttpUpstream::new(upstream.clone())
            .wrap_err_with(|| format!("failed to build HTTP client for {upstream}"))?;
        worker = worker.with_upstream(Arc::new(http));
    }
    Ok(worker)
}
