//! # Carnaval Scrapers
//!
//! Command-line crawler for Barranquilla Carnival sources.
//!
//! ## Usage
//!
//! ```sh
//! carnaval_scrapers elheraldo -c config.yaml
//! ```
//!
//! Each run crawls one source and writes `output/<source>_<start>.jsonl`.
//! With `SUPABASE_URL` and `SUPABASE_KEY` set (flags, environment or `.env`)
//! records are also upserted into the matching Supabase tables.

use carnaval_scrapers::config::{RemoteCredentials, Settings};
use carnaval_scrapers::crawler::Crawler;
use carnaval_scrapers::error::RunError;
use carnaval_scrapers::fetch::HttpTransport;
use carnaval_scrapers::scrapers::Registry;
use carnaval_scrapers::sinks::{RemoteStore, SupabaseStore};
use carnaval_scrapers::utils::{ensure_writable_dir, run_file_path};
use chrono::Utc;
use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::Cli;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "Loaded .env file");
    }

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(source = ?args.source, config = ?args.config, "Parsed CLI arguments");

    let registry = Registry::builtin();
    if args.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let source = args.source.clone().unwrap_or_default();
    let Some(extractor) = registry.get(&source) else {
        error!(%source, available = %registry.names().join(", "), "Unknown source");
        return Err(RunError::UnknownSource(source).into());
    };

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.clone();
    }
    if args.no_cache {
        settings.http_cache.enabled = false;
    }

    let output = match &args.output {
        Some(path) => PathBuf::from(path),
        None => run_file_path(&settings.output_dir, &source, Utc::now()),
    };

    // Early check: the run file's directory must be writable
    let output_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if let Err(e) = ensure_writable_dir(&output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let transport = HttpTransport::new(&settings.user_agent, settings.request_timeout())
        .map_err(RunError::Client)?;
    let remote = remote_store(
        &RemoteCredentials {
            url: args.supabase_url.clone(),
            key: args.supabase_key.clone(),
        },
        &settings,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping crawl");
            on_signal.cancel();
        }
    });

    info!(%source, output = %output.display(), "carnaval_scrapers starting up");
    let crawler = Crawler::new(settings, Arc::new(transport))
        .with_remote(remote)
        .with_cancellation(cancel);
    let stats = crawler.run(extractor, &output).await?;

    info!(
        %source,
        persisted = stats.persisted,
        dropped = stats.dropped_total(),
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Run complete"
    );
    Ok(())
}

fn remote_store(creds: &RemoteCredentials, settings: &Settings) -> Option<Arc<dyn RemoteStore>> {
    let (Some(url), Some(key)) = (&creds.url, &creds.key) else {
        return None;
    };
    if !creds.is_configured() {
        return None;
    }
    match SupabaseStore::new(url, key, settings.request_timeout()) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Cannot build remote store client; continuing without it");
            None
        }
    }
}
