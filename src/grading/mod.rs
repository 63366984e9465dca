//! Grading core: composite score, grade, trend, time bucket and ranking.
//! Everything here is pure and recomputed on every read.

pub mod grade;
pub mod ranker;
pub mod scorer;
pub mod summary;
pub mod time_bucket;
pub mod trend;

use chrono::{DateTime, Utc};

use crate::config::GradingConfig;
use crate::error::Result;
use crate::types::{GradedOpportunity, Opportunity};

pub use ranker::{rank, rank_opportunities, RankingReport};
pub use summary::{summarize, Summary};

/// Derive every presentation field of one opportunity from its snapshots.
/// Fails only with `IncompleteSnapshot`.
pub fn grade_opportunity(
    opp: &Opportunity,
    cfg: &GradingConfig,
    now: DateTime<Utc>,
) -> Result<GradedOpportunity> {
    let inputs = scorer::ScoringInputs::from_snapshot(&opp.current, now)?;
    let (breakdown, time_bucket) = scorer::score_inputs(&inputs, cfg);
    let grade = grade::grade(breakdown.composite, &cfg.thresholds);
    let mismatch = grade::is_mismatch(grade, inputs.ev_percent, cfg.mismatch_ev_threshold);
    let trend = trend::trend(&opp.current, opp.initial.as_ref(), &cfg.trend);

    Ok(GradedOpportunity {
        id: opp.id.clone(),
        details: opp.details.clone(),
        current: opp.current.clone(),
        grade,
        composite_score: breakdown.composite,
        breakdown,
        mismatch,
        edge: inputs.edge(),
        trend,
        time_bucket,
        bucket_color: time_bucket.color(),
        time_to_event_secs: inputs.time_to_event.num_seconds(),
    })
}
