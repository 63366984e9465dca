mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod grading;
mod recorder;
mod refresh;
mod state;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::repository;
use crate::db::writer::DbWriter;
use crate::error::Result;
use crate::recorder::GradeRecorder;
use crate::refresh::SnapshotRefresher;
use crate::state::OpportunityStore;

#[tokio::main]
async fn main() {
    // Grading options are validated here, before the database or the port
    // is touched, so a bad configuration never serves a ranking.
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let g = &cfg.grading;
    info!(
        "Grading: weights ev={:.2} edge={:.2} time={:.2} | thresholds A={} B={} C={} D={} | ev_ceiling={} edge_ceiling={} mismatch_ev>{}",
        g.weights.ev, g.weights.edge, g.weights.time,
        g.thresholds.a, g.thresholds.b, g.thresholds.c, g.thresholds.d,
        g.ev_ceiling, g.edge_ceiling, g.mismatch_ev_threshold,
    );

    // --- Database setup ---
    let pool = db::connect(&format!("sqlite:{}", cfg.db_path)).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- In-memory active set, hydrated so initial snapshots survive restarts ---
    let store = OpportunityStore::new();
    let persisted = repository::load_active(&pool).await?;
    info!("Hydrated {} active opportunities from DB", persisted.len());
    store.hydrate(persisted);

    let grading = Arc::new(cfg.grading.clone());
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());

    // --- Spawn tasks ---

    // DB writer
    let (db_writer, writer) = DbWriter::new(pool.clone(), CHANNEL_CAPACITY);
    tokio::spawn(async move { db_writer.run().await });

    // Feed poller (optional)
    match cfg.feed_url.clone() {
        Some(url) => {
            info!("Polling feed every {}s: {url}", cfg.poll_interval_secs);
            let refresher = SnapshotRefresher::new(
                url,
                cfg.poll_interval_secs,
                Arc::clone(&store),
                writer.clone(),
                Arc::clone(&health),
            );
            tokio::spawn(async move { refresher.run().await });
        }
        None => warn!("FEED_URL not set: snapshots are accepted only via POST /snapshots"),
    }

    // Grade recorder (background)
    let recorder = GradeRecorder::new(
        Arc::clone(&store),
        Arc::clone(&grading),
        Arc::clone(&latency),
        writer.clone(),
        cfg.grade_record_interval_secs,
    );
    tokio::spawn(async move { recorder.run().await });

    // HTTP API server
    let api_state = ApiState {
        store,
        pool,
        grading,
        latency,
        health,
        writer,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
