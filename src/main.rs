mod activity;
mod api;
mod browse;
mod cli;
mod config;
mod navigation;
mod session;
mod storage;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pawfinder", about = "Browse adoptable dogs from the terminal")]
pub struct Args {
    #[arg(long, env = "PAWFINDER_BASE_URL", help = "API base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Directory for persisted session state")]
    pub state_dir: Option<PathBuf>,

    #[arg(long, help = "Append session activity to this JSONL file")]
    pub activity_log: Option<PathBuf>,

    #[arg(long, help = "Debug output (HTTP details and session timers)")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.debug {
        "pawfinder=debug"
    } else {
        "pawfinder=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        config::Config::load()?
    };
    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = base_url.clone();
    }
    if let Some(dir) = &args.state_dir {
        cfg.storage.state_dir = Some(dir.clone());
    }
    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        anyhow::bail!("Invalid configuration ({} error(s))", errors.len());
    }

    let state_dir = cfg.state_dir();
    let client = Rc::new(
        api::ApiClient::new(&cfg.api.base_url, Duration::from_millis(cfg.api.timeout_ms))
            .with_credential_store(Box::new(storage::FileStore::in_dir(&state_dir))),
    );
    tracing::debug!(
        base_url = client.base_url(),
        state_dir = %state_dir.display(),
        has_credential = client.has_credential(),
        "starting"
    );

    let session_file = storage::FileStore::in_dir(&state_dir);
    tracing::debug!(path = %session_file.path().display(), "session state file");

    let (events_tx, events_rx) = mpsc::channel::<cli::AppEvent>();
    let navigator = navigation::CliNavigator::new();
    let mut session = session::SessionStore::new(
        Box::new(Rc::clone(&client)),
        Box::new(session_file),
        Box::new(navigator.clone()),
        Box::new(session::SystemClock),
        Box::new(session::ThreadScheduler::new(events_tx.clone())),
    );

    let mut activity = match &args.activity_log {
        Some(path) => {
            let run_id = uuid::Uuid::new_v4().to_string();
            let log = activity::ActivityLog::new(path, &run_id)?;
            tracing::debug!(path = %log.path.display(), %run_id, "activity log opened");
            Some(log)
        }
        None => None,
    };

    let restored = session.restore();
    if let Some(log) = activity.as_mut() {
        let result = match restored {
            session::Restore::Resumed { login_ts } => log.restore("resumed", Some(login_ts)),
            session::Restore::Expired => log.restore("expired", None),
            session::Restore::NoSession => log.restore("no_session", None),
        };
        if let Err(e) = result {
            tracing::warn!("failed to write activity log: {:#}", e);
        }
    }
    if restored == session::Restore::Expired {
        println!("Your previous session expired.");
    }

    let warning = session::WarningDialog::new(session.signals());
    let ctx = cli::Context {
        session,
        browser: browse::Browser::new(client, cfg.browse.page_size, cfg.browse.max_age),
        warning,
        navigator,
        activity,
    };

    cli::run_repl(ctx, events_tx, events_rx)
}
