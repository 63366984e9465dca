//! Database row types matching migrations/0001_init.sql.
//! Timestamps are stored as Unix milliseconds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::types::{BetDetails, Opportunity, OpportunityId, Snapshot};

#[derive(Debug, sqlx::FromRow)]
pub struct OpportunityRow {
    pub id: String,
    pub sportsbook: String,
    pub event: String,
    pub market: String,
    pub line: String,
    pub sport: Option<String>,
    pub league: Option<String>,
    pub participant: Option<String>,
    pub description: Option<String>,
    pub event_teams: Option<String>,

    pub initial_odds: Option<f64>,
    pub initial_ev_percent: Option<f64>,
    pub initial_win_prob: Option<f64>,
    pub initial_implied_prob: Option<f64>,
    pub initial_event_time: Option<i64>,
    pub initial_observed_at: i64,

    pub current_odds: Option<f64>,
    pub current_ev_percent: Option<f64>,
    pub current_win_prob: Option<f64>,
    pub current_implied_prob: Option<f64>,
    pub current_event_time: Option<i64>,
    pub current_observed_at: i64,

    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub active: bool,
}

impl OpportunityRow {
    /// Fails on a timestamp column that is out of range for `DateTime`.
    pub fn into_opportunity(self) -> Result<Opportunity> {
        let initial = Snapshot {
            odds: self.initial_odds,
            ev_percent: self.initial_ev_percent,
            win_probability: self.initial_win_prob,
            market_implied_probability: self.initial_implied_prob,
            event_time: optional_millis(self.initial_event_time, "initial_event_time")?,
            sportsbook: self.sportsbook.clone(),
            observed_at: millis(self.initial_observed_at, "initial_observed_at")?,
        };
        let current = Snapshot {
            odds: self.current_odds,
            ev_percent: self.current_ev_percent,
            win_probability: self.current_win_prob,
            market_implied_probability: self.current_implied_prob,
            event_time: optional_millis(self.current_event_time, "current_event_time")?,
            sportsbook: self.sportsbook,
            observed_at: millis(self.current_observed_at, "current_observed_at")?,
        };
        Ok(Opportunity {
            id: OpportunityId::from(self.id),
            details: BetDetails {
                event: self.event,
                market: self.market,
                line: self.line,
                sport: self.sport,
                league: self.league,
                participant: self.participant,
                description: self.description,
                event_teams: self.event_teams,
            },
            current,
            initial: Some(initial),
            first_seen_at: millis(self.first_seen_at, "first_seen_at")?,
        })
    }
}

fn millis(ms: i64, column: &'static str) -> Result<DateTime<Utc>> {
    from_millis(ms).ok_or_else(|| {
        AppError::Database(sqlx::Error::Decode(
            format!("{column} out of range: {ms}").into(),
        ))
    })
}

fn optional_millis(ms: Option<i64>, column: &'static str) -> Result<Option<DateTime<Utc>>> {
    ms.map(|ms| millis(ms, column)).transpose()
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct GradeHistoryRow {
    pub id: i64,
    pub opportunity_id: String,
    pub grade: String,
    pub composite_score: f64,
    pub ev_score: f64,
    pub edge_score: f64,
    pub time_score: f64,
    pub time_bucket: String,
    pub mismatch: bool,
    pub calculated_at: i64,
}

pub fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
