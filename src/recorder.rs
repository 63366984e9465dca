use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::api::latency::LatencyStats;
use crate::config::GradingConfig;
use crate::db::writer::{WriteMsg, WriterHandle};
use crate::error::Result;
use crate::grading::rank_opportunities;
use crate::state::OpportunityStore;
use crate::types::GradeRecord;

/// Background task that grades the active set on a fixed interval and
/// appends the results to the grade history table.
pub struct GradeRecorder {
    store: Arc<OpportunityStore>,
    grading: Arc<GradingConfig>,
    latency: Arc<LatencyStats>,
    writer: WriterHandle,
    interval: Duration,
}

impl GradeRecorder {
    pub fn new(
        store: Arc<OpportunityStore>,
        grading: Arc<GradingConfig>,
        latency: Arc<LatencyStats>,
        writer: WriterHandle,
        interval_secs: u64,
    ) -> Self {
        Self {
            store,
            grading,
            latency,
            writer,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            if let Err(e) = self.record_once(Utc::now()).await {
                error!("Grade recorder error: {e}");
            }
        }
    }

    /// One pass: grade and rank, then queue a record per ranked line.
    /// Returns the number of records queued.
    pub async fn record_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let active = self.store.active_opportunities();
        let report = self
            .latency
            .time(|| rank_opportunities(&active, &self.grading, now));

        let records: Vec<GradeRecord> = report
            .ranked
            .iter()
            .map(|g| GradeRecord::from_graded(g, now))
            .collect();
        let count = records.len();
        debug!(recorded = count, excluded = report.excluded.len(), "Grades computed");

        if count > 0 {
            self.writer.send(WriteMsg::Grades(records)).await?;
        }
        Ok(count)
    }
}
