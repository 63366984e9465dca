use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::db::writer::{WriteMsg, WriterHandle};
use crate::error::Result;
use crate::fetcher::fetch_feed;
use crate::state::{OpportunityStore, PollOutcome};
use crate::types::Observation;

/// Merge one poll into the active set and queue it for persistence.
/// Shared by the feed poller and `POST /snapshots`.
///
/// The merge and the enqueue happen under one lock, and only the merged rows
/// are sent, so the writer replays exactly what memory holds, in order.
pub async fn ingest(
    store: &OpportunityStore,
    writer: &WriterHandle,
    health: &HealthState,
    observations: Vec<Observation>,
    observed_at: DateTime<Utc>,
) -> Result<PollOutcome> {
    let _ingest = store.lock_ingest().await;
    let outcome = store.apply_poll(observations);
    health.record_poll(observed_at);
    info!(
        added = outcome.added,
        updated = outcome.updated,
        removed = outcome.removed.len(),
        active = store.len(),
        "Poll applied"
    );

    writer
        .send(WriteMsg::Poll {
            observations: outcome.applied.clone(),
            removed: outcome.removed.clone(),
        })
        .await?;
    Ok(outcome)
}

/// Polls the snapshot feed on a fixed interval. A failed poll is logged and
/// leaves the active set as it was; the next tick is the retry.
pub struct SnapshotRefresher {
    feed_url: String,
    poll_interval: Duration,
    store: Arc<OpportunityStore>,
    writer: WriterHandle,
    health: Arc<HealthState>,
}

impl SnapshotRefresher {
    pub fn new(
        feed_url: String,
        poll_interval_secs: u64,
        store: Arc<OpportunityStore>,
        writer: WriterHandle,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            feed_url,
            poll_interval: Duration::from_secs(poll_interval_secs),
            store,
            writer,
            health,
        }
    }

    pub async fn run(self) {
        // First tick fires immediately: that is the startup poll.
        let mut ticker = interval(self.poll_interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh().await {
                self.health.record_poll_failure();
                error!("Feed poll failed: {e}");
            }
        }
    }

    async fn refresh(&self) -> Result<PollOutcome> {
        let observed_at = Utc::now();
        let (observations, stats) = fetch_feed(&self.feed_url, observed_at).await?;
        info!(
            "Feed fetched: {} rows, {} parsed (malformed={} no_sportsbook={} no_market={} no_event={})",
            stats.feed_total,
            stats.parsed,
            stats.rejected_malformed,
            stats.rejected_no_sportsbook,
            stats.rejected_no_market,
            stats.rejected_no_event,
        );
        ingest(&self.store, &self.writer, &self.health, observations, observed_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect, repository, writer::DbWriter};
    use crate::types::{BetDetails, OpportunityId, Snapshot};

    fn obs(line: &str, ev: f64, at: DateTime<Utc>) -> Observation {
        Observation {
            id: OpportunityId::new("caesars", "Jets vs Dolphins", "spread", line),
            details: BetDetails::default(),
            snapshot: Snapshot {
                odds: Some(-105.0),
                ev_percent: Some(ev),
                win_probability: Some(54.0),
                market_implied_probability: Some(51.2),
                event_time: None,
                sportsbook: "caesars".to_string(),
                observed_at: at,
            },
        }
    }

    #[tokio::test]
    async fn ingest_updates_store_health_and_database() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let (db_writer, handle) = DbWriter::new(pool.clone(), 16);
        let store = OpportunityStore::new();
        let health = HealthState::new();
        let t0 = Utc::now();

        ingest(&store, &handle, &health, vec![obs("Jets +3", 2.0, t0), obs("Jets -3", 1.0, t0)], t0)
            .await
            .unwrap();
        let outcome = ingest(&store, &handle, &health, vec![obs("Jets +3", 5.0, t0)], t0)
            .await
            .unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(health.last_poll_at().map(|t| t.timestamp_millis()), Some(t0.timestamp_millis()));

        drop(handle);
        db_writer.run().await;
        let persisted = repository::load_active(&pool).await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].current.ev_percent, Some(5.0));
        assert_eq!(persisted[0].initial.as_ref().unwrap().ev_percent, Some(2.0));
    }

    /// Every active line must carry the same baseline in memory and on disk.
    async fn assert_store_matches_db(store: &OpportunityStore, pool: &sqlx::SqlitePool) {
        let persisted = repository::load_active(pool).await.unwrap();
        let in_memory = store.active_opportunities();
        assert_eq!(persisted.len(), in_memory.len());
        for opp in &persisted {
            let live = store.get(&opp.id).unwrap();
            assert_eq!(live.initial, opp.initial, "baseline differs for {}", opp.id);
            assert_eq!(live.current, opp.current, "current differs for {}", opp.id);
            assert_eq!(live.first_seen_at, opp.first_seen_at);
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        // Millisecond precision, as stored.
        DateTime::from_timestamp_millis(1_767_225_600_000 + minutes * 60_000).unwrap()
    }

    #[tokio::test]
    async fn duplicate_rows_and_returning_lines_keep_store_and_db_in_step() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let (db_writer, handle) = DbWriter::new(pool.clone(), 16);
        let store = OpportunityStore::new();
        let health = HealthState::new();

        // Same id twice in one poll: the last row is the baseline everywhere.
        let outcome = ingest(
            &store,
            &handle,
            &health,
            vec![obs("Jets +3", 2.0, at(0)), obs("Jets +3", 6.0, at(0)), obs("Jets -3", 1.0, at(0))],
            at(0),
        )
        .await
        .unwrap();
        assert_eq!(outcome.applied.len(), 2);

        // Line leaves, then comes back with a new baseline.
        ingest(&store, &handle, &health, vec![obs("Jets +3", 7.0, at(5))], at(5)).await.unwrap();
        ingest(
            &store,
            &handle,
            &health,
            vec![obs("Jets +3", 8.0, at(10)), obs("Jets -3", 3.0, at(10))],
            at(10),
        )
        .await
        .unwrap();

        drop(handle);
        db_writer.run().await;

        let plus = store.get(&OpportunityId::new("caesars", "Jets vs Dolphins", "spread", "Jets +3")).unwrap();
        assert_eq!(plus.initial.as_ref().unwrap().ev_percent, Some(6.0));
        let minus = store.get(&OpportunityId::new("caesars", "Jets vs Dolphins", "spread", "Jets -3")).unwrap();
        assert_eq!(minus.initial.as_ref().unwrap().ev_percent, Some(3.0));
        assert_store_matches_db(&store, &pool).await;
    }

    #[tokio::test]
    async fn concurrent_ingests_reach_the_db_in_merge_order() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let (db_writer, handle) = DbWriter::new(pool.clone(), 16);
        let store = OpportunityStore::new();
        let health = HealthState::new();

        ingest(&store, &handle, &health, vec![obs("Jets +3", 2.0, at(0))], at(0)).await.unwrap();
        // One poll drops the line, the other keeps it; whichever merges
        // last must also be the last one written.
        let (a, b) = tokio::join!(
            ingest(&store, &handle, &health, vec![obs("Jets -3", 1.0, at(1))], at(1)),
            ingest(&store, &handle, &health, vec![obs("Jets +3", 4.0, at(2))], at(2)),
        );
        a.unwrap();
        b.unwrap();

        drop(handle);
        db_writer.run().await;
        assert_store_matches_db(&store, &pool).await;
    }
}
