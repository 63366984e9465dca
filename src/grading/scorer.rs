use chrono::{DateTime, Duration, Utc};

use crate::config::GradingConfig;
use crate::error::{AppError, Result};
use crate::grading::time_bucket;
use crate::types::{ScoreBreakdown, Snapshot, TimeBucket};

/// The fields the composite score needs, all present and finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringInputs {
    pub ev_percent: f64,
    pub win_probability: f64,
    pub market_implied_probability: f64,
    pub time_to_event: Duration,
}

impl ScoringInputs {
    /// Validate a snapshot at the scorer boundary. A missing or non-finite
    /// field is `IncompleteSnapshot`; nothing is defaulted.
    pub fn from_snapshot(snapshot: &Snapshot, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            ev_percent: required(snapshot.ev_percent, "ev_percent")?,
            win_probability: required(snapshot.win_probability, "win_probability")?,
            market_implied_probability: required(
                snapshot.market_implied_probability,
                "market_implied_probability",
            )?,
            time_to_event: snapshot
                .time_to_event(now)
                .ok_or_else(|| AppError::incomplete("time_to_event"))?,
        })
    }

    pub fn edge(&self) -> f64 {
        self.win_probability - self.market_implied_probability
    }
}

fn required(value: Option<f64>, field: &'static str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::incomplete(field)),
    }
}

/// Linear ramp from 0 at zero to 100 at `ceiling`, flat beyond either end.
fn saturate(value: f64, ceiling: f64) -> f64 {
    (value / ceiling).clamp(0.0, 1.0) * 100.0
}

/// EV sub-score. Non-positive EV scores 0; EV at or above the ceiling scores 100.
pub fn ev_score(ev_percent: f64, cfg: &GradingConfig) -> f64 {
    saturate(ev_percent, cfg.ev_ceiling)
}

/// Edge sub-score on the same saturating scale as EV.
pub fn edge_score(edge: f64, cfg: &GradingConfig) -> f64 {
    saturate(edge, cfg.edge_ceiling)
}

/// Weighted composite of pre-validated inputs. Pure and deterministic.
pub fn score_inputs(inputs: &ScoringInputs, cfg: &GradingConfig) -> (ScoreBreakdown, TimeBucket) {
    let bucket = time_bucket::bucket(inputs.time_to_event, &cfg.buckets);
    let ev = ev_score(inputs.ev_percent, cfg);
    let edge = edge_score(inputs.edge(), cfg);
    let time = time_bucket::time_score(bucket, &cfg.buckets);

    let w = &cfg.weights;
    let composite = (w.ev * ev + w.edge * edge + w.time * time).clamp(0.0, 100.0);

    (
        ScoreBreakdown {
            ev_score: ev,
            edge_score: edge,
            time_score: time,
            composite,
        },
        bucket,
    )
}

/// Composite score of a snapshot in [0, 100], or `IncompleteSnapshot`.
pub fn score(snapshot: &Snapshot, cfg: &GradingConfig, now: DateTime<Utc>) -> Result<f64> {
    let inputs = ScoringInputs::from_snapshot(snapshot, now)?;
    Ok(score_inputs(&inputs, cfg).0.composite)
}
