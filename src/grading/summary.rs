use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::grading::RankingReport;
use crate::types::{sportsbook_key, Grade, TimeBucket};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub excluded: usize,
    pub average_ev: f64,
    /// Mean edge in probability points.
    pub average_edge: f64,
    /// Every grade is present, zero if unused.
    pub grade_distribution: BTreeMap<Grade, usize>,
    pub sportsbook_distribution: BTreeMap<String, usize>,
    /// Every bucket is present, in urgency order.
    pub time_distribution: BTreeMap<TimeBucket, usize>,
    pub mismatch_count: usize,
    pub latest_observation: Option<DateTime<Utc>>,
}

/// Aggregate one ranking pass for the dashboard header.
pub fn summarize(report: &RankingReport) -> Summary {
    let ranked = &report.ranked;

    let mut grade_distribution: BTreeMap<Grade, usize> =
        Grade::ALL.iter().map(|&g| (g, 0)).collect();
    let mut time_distribution: BTreeMap<TimeBucket, usize> =
        TimeBucket::ALL.iter().map(|&b| (b, 0)).collect();
    let mut sportsbook_distribution: BTreeMap<String, usize> = BTreeMap::new();

    let mut ev_sum = 0.0;
    let mut edge_sum = 0.0;
    let mut mismatch_count = 0;
    let mut latest_observation: Option<DateTime<Utc>> = None;

    for o in ranked {
        *grade_distribution.entry(o.grade).or_default() += 1;
        *time_distribution.entry(o.time_bucket).or_default() += 1;
        *sportsbook_distribution
            .entry(sportsbook_key(&o.current.sportsbook))
            .or_default() += 1;

        // Ranked entries always carry EV; scoring would have excluded them otherwise.
        ev_sum += o.current.ev_percent.unwrap_or_default();
        edge_sum += o.edge;
        if o.mismatch {
            mismatch_count += 1;
        }
        latest_observation = latest_observation.max(Some(o.current.observed_at));
    }

    let n = ranked.len();
    let mean = |sum: f64| if n == 0 { 0.0 } else { sum / n as f64 };

    Summary {
        total: n,
        excluded: report.excluded.len(),
        average_ev: mean(ev_sum),
        average_edge: mean(edge_sum),
        grade_distribution,
        sportsbook_distribution,
        time_distribution,
        mismatch_count,
        latest_observation,
    }
}
