use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod executor;
mod observe;

use executor::ShellExecutor;
use observe::{log_pool_events, LogNotifier, LogTimerRegistry};

#[derive(Parser)]
#[command(name = "taskloopd", about = "Polling task scheduler daemon")]
struct Cli {
    /// Path to taskloop.toml (default: ~/.taskloop/taskloop.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "taskloop_daemon=info,taskloop_engine=info,taskloop_pool=info,taskloop_store=info".into()
                }),
        )
        .init();

    let cli = Cli::parse();
    let config = taskloop_core::TaskloopConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        taskloop_core::TaskloopConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    taskloop_store::db::init_db(&db)?;
    let store = taskloop_store::TaskStore::new(db);

    // Pool events are drained into the log by a background task.
    let (events_tx, events_rx) = tokio::sync::mpsc::channel(config.pool.event_buffer);
    tokio::spawn(log_pool_events(events_rx));

    let pool = taskloop_pool::WorkerPool::with_observers(
        config.pool.capacity,
        Arc::new(ShellExecutor),
        Some(events_tx),
        Arc::new(LogNotifier),
    );
    info!(capacity = pool.capacity(), "worker pool ready");

    // Periodic monitoring snapshot, one JSON line per minute.
    let stats_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            match serde_json::to_string(&stats_pool.stats()) {
                Ok(json) => info!(target: "taskloop_daemon::stats", "{json}"),
                Err(e) => tracing::warn!("stats serialisation failed: {e}"),
            }
        }
    });

    let engine = taskloop_engine::SchedulerEngine::new(
        store,
        pool,
        Arc::new(LogTimerRegistry),
        config.scheduler.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    engine_task.await?;

    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
