use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identity of one betting line: sportsbook + event + market + line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpportunityId(String);

impl OpportunityId {
    pub fn new(sportsbook: &str, event: &str, market: &str, line: &str) -> Self {
        let parts = [sportsbook, event, market, line].map(|p| p.trim().to_lowercase());
        Self(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OpportunityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonical sportsbook key, matching the form used inside `OpportunityId`.
pub fn sportsbook_key(sportsbook: &str) -> String {
    sportsbook.trim().to_lowercase()
}

impl std::fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One observation of a line's market numbers. Numeric fields are optional
/// because feeds drop them; the scorer rejects a snapshot with any missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// American odds (+150, -110).
    pub odds: Option<f64>,
    pub ev_percent: Option<f64>,
    /// Model win probability, 0–100.
    pub win_probability: Option<f64>,
    /// Probability implied by the offered odds, 0–100.
    pub market_implied_probability: Option<f64>,
    pub event_time: Option<DateTime<Utc>>,
    pub sportsbook: String,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    /// Wall-clock time until the event starts. Negative once it has started.
    /// Always computed against the caller's `now`, never cached.
    pub fn time_to_event(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.event_time.map(|t| t - now)
    }
}

/// Descriptive fields shown next to a line. Not used for scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetDetails {
    pub event: String,
    pub market: String,
    pub line: String,
    pub sport: Option<String>,
    pub league: Option<String>,
    pub participant: Option<String>,
    pub description: Option<String>,
    pub event_teams: Option<String>,
}

/// A tracked line: the latest snapshot plus the one captured at first sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub details: BetDetails,
    pub current: Snapshot,
    /// None only while a freshly created row has not yet been fully read back.
    pub initial: Option<Snapshot>,
    pub first_seen_at: DateTime<Utc>,
}

/// One parsed row of a feed poll, before it is merged into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: OpportunityId,
    pub details: BetDetails,
    pub snapshot: Snapshot,
}

// ---------------------------------------------------------------------------
// Grade
// ---------------------------------------------------------------------------

/// Discrete quality grade. Declaration order is rank order: A sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub const ALL: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            other => Err(format!("unknown grade '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Time buckets
// ---------------------------------------------------------------------------

/// Urgency level of a line by time until its event. Declaration order runs
/// from most to least urgent and is the order used for every comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// < 1h, including events that already started.
    Immediate,
    /// 1h–3h
    VeryUrgent,
    /// 3h–6h
    Urgent,
    /// 6h–12h
    Monitor,
    /// > 12h
    Plan,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 5] = [
        TimeBucket::Immediate,
        TimeBucket::VeryUrgent,
        TimeBucket::Urgent,
        TimeBucket::Monitor,
        TimeBucket::Plan,
    ];

    /// 0 = most urgent.
    pub fn urgency_rank(self) -> usize {
        self as usize
    }

    pub fn color(self) -> &'static str {
        match self {
            TimeBucket::Immediate => "red",
            TimeBucket::VeryUrgent => "orange",
            TimeBucket::Urgent => "yellow",
            TimeBucket::Monitor => "blue",
            TimeBucket::Plan => "green",
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeBucket::Immediate => "immediate",
            TimeBucket::VeryUrgent => "very_urgent",
            TimeBucket::Urgent => "urgent",
            TimeBucket::Monitor => "monitor",
            TimeBucket::Plan => "plan",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improving,
    Stable,
    Worsening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    None,
    Small,
    Medium,
    Large,
}

/// Movement of one metric between the initial and current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Movement {
    /// No baseline to compare against. Not an error.
    Unavailable,
    Measured {
        direction: Direction,
        magnitude: Magnitude,
        delta: f64,
    },
}

impl Movement {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Movement::Measured { direction, .. } => Some(*direction),
            Movement::Unavailable => None,
        }
    }

    pub fn magnitude(&self) -> Option<Magnitude> {
        match self {
            Movement::Measured { magnitude, .. } => Some(*magnitude),
            Movement::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub ev: Movement,
    pub odds: Movement,
}

impl Trend {
    pub const UNAVAILABLE: Trend = Trend {
        ev: Movement::Unavailable,
        odds: Movement::Unavailable,
    };
}

// ---------------------------------------------------------------------------
// Derived, read-only records handed to presentation
// ---------------------------------------------------------------------------

/// The three weighted inputs behind a composite score, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub ev_score: f64,
    pub edge_score: f64,
    pub time_score: f64,
    pub composite: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradedOpportunity {
    pub id: OpportunityId,
    pub details: BetDetails,
    pub current: Snapshot,
    pub grade: Grade,
    pub composite_score: f64,
    pub breakdown: ScoreBreakdown,
    pub mismatch: bool,
    pub edge: f64,
    pub trend: Trend,
    pub time_bucket: TimeBucket,
    pub bucket_color: &'static str,
    /// Seconds until the event at the moment of grading; negative once started.
    pub time_to_event_secs: i64,
}

/// An opportunity left out of a ranking pass, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub id: OpportunityId,
    pub reason: String,
}

/// One computed grade appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeRecord {
    pub opportunity_id: OpportunityId,
    pub grade: Grade,
    pub breakdown: ScoreBreakdown,
    pub time_bucket: TimeBucket,
    pub mismatch: bool,
    pub calculated_at: DateTime<Utc>,
}

impl GradeRecord {
    pub fn from_graded(g: &GradedOpportunity, calculated_at: DateTime<Utc>) -> Self {
        Self {
            opportunity_id: g.id.clone(),
            grade: g.grade,
            breakdown: g.breakdown,
            time_bucket: g.time_bucket,
            mismatch: g.mismatch,
            calculated_at,
        }
    }
}
