mod backend;
mod cli;
mod clock;
mod logging;
mod model;
mod orchestrator;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let store_path = args.store_path();
    let log_dir = store_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let interactive = cfg!(feature = "tui") && !args.is_headless();
    let _log_guard = if interactive {
        logging::init(&args.log_level, logging::LogTarget::File(&log_dir))
    } else {
        logging::init(&args.log_level, logging::LogTarget::Stderr)
    };

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "playrun failed");
            Err(e)
        }
    }
}
