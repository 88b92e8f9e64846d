//! # VERDANT
//!
//! Autonomous garden bot.
//!
//! ```bash
//! # Validate a config without connecting
//! verdant --config verdant.toml --check
//!
//! # Run, preferring one room and journaling every frame
//! RUST_LOG=verdant=debug verdant -c verdant.toml --room-id MG4 --journal frames.log
//! ```
//!
//! The process exits with a non-zero code when the config is invalid or the
//! connection gives up after its retry budget.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod cli;
mod error;
mod identity;
mod journal_sink;
mod status;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use verdant_automation::AutomationEngine;
use verdant_core::{BotConfig, SpawnTableMapper, StateStore};
use verdant_networking::{ConnectionManager, ConnectionSettings, Credential, MessageJournal, WsConnector};

use crate::cli::Args;
use crate::error::{AppError, AppResult};
use crate::journal_sink::{JournalSink, JOURNAL_CAPACITY};

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("verdant=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> AppResult<()> {
    let mut config = BotConfig::load(&args.config)?;
    tracing::info!("config loaded from {}", args.config.display());
    if args.check {
        tracing::info!("config is valid");
        return Ok(());
    }

    let player_id = identity::resolve(&args.config, config.player_id.as_deref(), &mut rand::thread_rng())?;
    config.player_id = Some(player_id);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("verdant")
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(serve(args, config))
}

async fn serve(args: &Args, config: BotConfig) -> AppResult<()> {
    let store = Arc::new(StateStore::new(config.player_id.clone()));
    let connector = Arc::new(WsConnector::new(config.server.clone()));
    let settings = ConnectionSettings::from_config(&config, args.room_id.as_deref());
    tracing::info!(
        "player {} | rooms {:?} | retries {}",
        config.player_id.as_deref().unwrap_or("-"),
        settings.rooms,
        settings.backoff.max_retries()
    );

    let mut manager = ConnectionManager::new(
        connector,
        settings,
        Arc::clone(&store),
        Credential::new(config.cookies.clone()),
    )
    .with_mapper(Arc::new(SpawnTableMapper::new(config.spawn_points.clone())));

    let mut sink = None;
    if let Some(path) = &args.journal {
        let (journal, reader) = MessageJournal::bounded(JOURNAL_CAPACITY);
        sink = Some(JournalSink::spawn(path, reader)?);
        manager = manager.with_journal(journal);
    }

    let engine = AutomationEngine::from_config(&config);
    if engine.is_empty() {
        tracing::warn!("every policy is disabled; the bot will only keep its session alive");
    }
    engine.install(&manager);

    let manager = Arc::new(manager);
    let signals = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                manager.shutdown();
            }
        }
    });
    let reporter = (args.status_interval > 0)
        .then(|| tokio::spawn(status::report(Arc::clone(&store), Duration::from_secs(args.status_interval))));

    let outcome = manager.run().await;

    signals.abort();
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    let stats = manager.stats().snapshot();
    tracing::info!(
        "sessions {} | frames sent {} received {} | patches applied {} skipped {} | decode errors {}",
        stats.sessions,
        stats.frames_sent,
        stats.frames_received,
        stats.patches_applied,
        stats.patches_skipped,
        stats.decode_errors
    );

    if let Some(sink) = sink {
        let lines = sink.finish()?;
        tracing::info!("journal closed after {} lines", lines);
    }

    outcome.map_err(AppError::from)
}
