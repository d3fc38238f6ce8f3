// =============================================================================
// tickvault — Main Entry Point
// =============================================================================
//
//   tickvault ingest            JSON ticks on stdin, one object per line
//   tickvault replay <chunk-id> decoded records of one chunk as JSON lines
//   tickvault list [symbol]     stored chunk ids in write order
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tickvault::app_state::{build_reader, AppState};
use tickvault::market_data::{MinuteBar, RawTick};
use tickvault::runtime_config::{config_path, RuntimeConfig};
use tickvault::storage::{ChunkStore, FileChunkStore};

#[derive(Parser)]
#[command(name = "tickvault")]
#[command(about = "Ingest market ticks into compressed chunks and read them back")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON ticks from stdin until EOF or Ctrl+C (the default)
    Ingest,
    /// Print the decoded records of one chunk as JSON lines
    Replay {
        /// Chunk id as listed by `list`
        #[arg(value_name = "CHUNK_ID")]
        chunk_id: String,
    },
    /// Print stored chunk ids in write order
    List {
        /// Only chunks of this symbol
        #[arg(value_name = "SYMBOL")]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = Cli::parse().command.unwrap_or(Commands::Ingest);

    let env = |key: &str| std::env::var(key).ok();
    let path = config_path(env);
    let mut config = RuntimeConfig::load(&path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env(env);
    config.validate()?;

    // ── 2. Store ─────────────────────────────────────────────────────────
    let store: Arc<dyn ChunkStore> = Arc::new(
        FileChunkStore::open(&config.store_dir)
            .with_context(|| format!("failed to open store at {}", config.store_dir.display()))?,
    );

    match command {
        Commands::Ingest => run_ingest(config, store).await,
        Commands::Replay { chunk_id } => {
            let reader = build_reader(&config, store);
            let samples = reader.read(&chunk_id)?;
            for sample in &samples {
                println!("{}", serde_json::to_string(sample)?);
            }
            info!(chunk_id = %chunk_id, ticks = samples.len(), "replay complete");
            Ok(())
        }
        Commands::List { symbol } => {
            let reader = build_reader(&config, store);
            for id in reader.list_chunks(symbol.as_deref())? {
                println!("{id}");
            }
            Ok(())
        }
    }
}

async fn run_ingest(config: RuntimeConfig, store: Arc<dyn ChunkStore>) -> Result<()> {
    let flush_every = Duration::from_secs(config.flush_interval_secs.max(1));
    let bar_window = chrono::Duration::seconds(60 + config.minute_bar_grace_secs as i64);

    info!(
        store_dir = %config.store_dir.display(),
        chunk_capacity = config.chunk_capacity,
        compress = config.compress,
        "tickvault ingest starting"
    );
    let state = Arc::new(AppState::new(config, store));

    // ── Periodic seal of partially filled chunks ─────────────────────────
    let flush_state = state.clone();
    let flush_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(flush_every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let sealed = flush_state.pipeline.flush_all();
            if sealed > 0 {
                info!(sealed, "periodic flush");
            }
        }
    });

    // ── Completed minute bars ────────────────────────────────────────────
    let bar_state = state.clone();
    let bar_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let up_to = Local::now().naive_local() - bar_window;
            for bar in bar_state.minute_bars.drain_completed(up_to) {
                emit_bar(&bar);
            }
        }
    });

    // ── Feed ─────────────────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        let received_at = Local::now().naive_local();
                        match RawTick::from_json(&line, received_at) {
                            Ok(raw) => {
                                let outcome = state.pipeline.ingest(raw);
                                debug!(outcome = ?outcome, "tick processed");
                            }
                            Err(e) => warn!(error = %e, "unreadable feed line skipped"),
                        }
                    }
                    None => {
                        info!("feed closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Shutdown signal received, stopping gracefully");
                break;
            }
        }
    }

    // ── Graceful shutdown ────────────────────────────────────────────────
    flush_loop.abort();
    bar_loop.abort();

    for bar in state.minute_bars.drain_all() {
        emit_bar(&bar);
    }
    state.shutdown().await;

    let status = state.status();
    info!(
        accepted = status.stats.accepted,
        rejected = status.stats.rejected,
        encode_rejected = status.stats.encode_rejected,
        chunks_written = status.stats.chunks_written,
        chunks_dropped = status.stats.chunks_dropped,
        write_failures = status.stats.write_failures,
        uptime_secs = status.uptime_secs,
        "tickvault ingest shut down"
    );
    Ok(())
}

fn emit_bar(bar: &MinuteBar) {
    info!(
        symbol = %bar.symbol,
        minute = %bar.minute.format("%Y-%m-%d %H:%M"),
        open = bar.open,
        high = bar.high,
        low = bar.low,
        close = bar.close,
        volume = bar.volume,
        ticks = bar.tick_count,
        "minute bar"
    );
}
