use crate::backend::{ItemCatalog, RunBackend, StatusCatalog};
use crate::model::{Outcome, PanelView, RunItem, Score};
use crate::orchestrator::LifecycleController;
use crate::storage::{self, FileStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "playrun",
    version,
    about = "Track timed play sessions inside cycles, with an optional TUI side panel"
)]
pub struct Cli {
    /// Path to the JSON run store (defaults to the platform data directory)
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Item to open at launch (TUI) or to act on (headless modes)
    #[arg(long)]
    pub item: Option<String>,

    /// Print the item's run state as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary of the item's run state and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Start a cycle for --item in this status, then print the result
    #[arg(long, value_name = "STATUS_ID")]
    pub start: Option<String>,

    /// Stop the open session of --item, then print the result
    #[arg(long)]
    pub stop: bool,

    /// Score to record when stopping (number or free text)
    #[arg(long, requires = "stop")]
    pub score: Option<String>,

    /// Note to attach when starting or stopping
    #[arg(long)]
    pub note: Option<String>,

    /// Register a new item with this title and print its id
    #[arg(long, value_name = "TITLE")]
    pub add_item: Option<String>,

    /// List items and statuses and exit
    #[arg(long)]
    pub list: bool,

    /// TUI redraw interval
    #[arg(long, default_value = "100ms")]
    pub redraw_interval: humantime::Duration,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn store_path(&self) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(storage::default_store_path)
    }

    /// Modes that print and exit instead of starting the TUI.
    pub fn is_headless(&self) -> bool {
        self.json
            || self.text
            || self.start.is_some()
            || self.stop
            || self.add_item.is_some()
            || self.list
    }

    fn validate(&self) -> Result<()> {
        if self.start.is_some() && self.stop {
            anyhow::bail!("--start and --stop cannot be used together");
        }
        if self.json && self.text {
            anyhow::bail!("--json and --text cannot be used together");
        }
        let acts_on_item = self.json || self.text || self.start.is_some() || self.stop;
        if acts_on_item && self.item.is_none() {
            anyhow::bail!("--item is required with --json, --text, --start and --stop");
        }
        Ok(())
    }
}

pub async fn run(args: Cli) -> Result<()> {
    args.validate()?;

    let store = Arc::new(
        FileStore::open(args.store_path())
            .await
            .context("failed to open run store")?,
    );
    tracing::debug!(path = %store.path().display(), "run store opened");

    if args.is_headless() {
        return run_headless(args, store).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args, store).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        run_headless(
            Cli {
                list: true,
                ..args
            },
            store,
        )
        .await
    }
}

/// Look up an item by id in the store.
pub(crate) async fn find_item(store: &FileStore, item_id: &str) -> Result<RunItem> {
    store
        .items()
        .await?
        .into_iter()
        .find(|i| i.id == item_id)
        .with_context(|| format!("unknown item: {item_id}"))
}

async fn run_headless(args: Cli, store: Arc<FileStore>) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let res = headless_inner(&args, store, &out_tx).await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn headless_inner(
    args: &Cli,
    store: Arc<FileStore>,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    if let Some(title) = args.add_item.as_deref() {
        let item = store.add_item(title).await?;
        let _ = out_tx.send(OutputLine::Stdout(item.id));
        return Ok(());
    }

    if args.list {
        let statuses = store.statuses().await?;
        for item in store.items().await? {
            let _ = out_tx.send(OutputLine::Stdout(format!("{}\t{}", item.id, item.title)));
        }
        if statuses.is_empty() {
            let _ = out_tx.send(OutputLine::Stderr("No statuses yet".into()));
        }
        for status in statuses {
            let marker = if status.active == Some(true) { " *" } else { "" };
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "status {}\t{}{}",
                status.id, status.name, marker
            )));
        }
        return Ok(());
    }

    let Some(item_id) = args.item.as_deref() else {
        anyhow::bail!("--item is required");
    };
    let item = find_item(&store, item_id).await?;
    let backend: Arc<dyn RunBackend> = store.clone();
    let ctl = LifecycleController::new(backend);
    ctl.open(item).await;
    if let Outcome::Rejected { reason } = ctl.load().await {
        anyhow::bail!(
            "failed to load run state: {}",
            reason.unwrap_or_else(|| "unknown error".into())
        );
    }

    // Gate actions on the loaded phase the same way the panel disables its controls.
    let phase = ctl.view(OffsetDateTime::now_utc()).await.phase;
    let note = args.note.as_deref().unwrap_or_default();
    if let Some(status_id) = args.start.as_deref() {
        if !phase.can_start() {
            anyhow::bail!("item already has a cycle ({})", phase.label());
        }
        // Provision defaults so a fresh store accepts the standard statuses.
        store.ensure_default_statuses().await?;
        match ctl.start(status_id, note).await.context("start failed")? {
            Outcome::Applied => {
                let _ = out_tx.send(OutputLine::Stderr("Started".into()));
            }
            other => {
                let _ = out_tx.send(OutputLine::Stderr(format!("Start not applied: {other:?}")));
            }
        }
    } else if args.stop && !phase.can_stop() {
        let _ = out_tx.send(OutputLine::Stderr("No open session to stop".into()));
    } else if args.stop {
        let score = args.score.as_deref().and_then(Score::from_input);
        match ctl.stop(score, note).await {
            Outcome::Applied => {
                let _ = out_tx.send(OutputLine::Stderr("Stopped".into()));
            }
            Outcome::Skipped => {
                let _ = out_tx.send(OutputLine::Stderr("No session to stop".into()));
            }
            Outcome::Stale => {}
            Outcome::Rejected { reason } => {
                anyhow::bail!(
                    "stop rejected{}",
                    reason.map(|r| format!(": {r}")).unwrap_or_default()
                );
            }
        }
    }

    let view = ctl.view(OffsetDateTime::now_utc()).await;
    if args.json {
        let out = serde_json::to_string_pretty(&view_json(&view))?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in crate::text_summary::build_text_summary(&view).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    Ok(())
}

fn view_json(view: &PanelView) -> serde_json::Value {
    serde_json::json!({
        "item": view.item,
        "phase": view.phase,
        "run": view.run,
        "has_active_cycle": view.has_active_cycle,
        "has_open_session": view.has_open_session,
        "elapsed_secs": view.elapsed_secs,
        "elapsed": view.elapsed,
    })
}
