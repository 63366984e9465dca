use crate::error::{AppError, Result};

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Feed poll interval (seconds) when POLL_INTERVAL_SECS is unset.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Grade recorder interval (seconds) when GRADE_RECORD_INTERVAL_SECS is unset.
pub const DEFAULT_GRADE_RECORD_INTERVAL_SECS: u64 = 60;

/// Feed request timeout (seconds).
pub const FEED_TIMEOUT_SECS: u64 = 30;

/// Tolerance when checking that the sub-score weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Default values for every grading option.
pub mod grading_defaults {
    /// EV% at which the EV sub-score saturates at 100.
    pub const EV_CEILING: f64 = 15.0;
    /// Edge (probability points) at which the edge sub-score saturates at 100.
    pub const EDGE_CEILING: f64 = 10.0;

    pub const WEIGHT_EV: f64 = 0.55;
    pub const WEIGHT_EDGE: f64 = 0.30;
    pub const WEIGHT_TIME: f64 = 0.15;

    /// Inclusive lower edges of grades A, B, C, D. Everything below D is F.
    pub const THRESHOLD_A: f64 = 90.0;
    pub const THRESHOLD_B: f64 = 80.0;
    pub const THRESHOLD_C: f64 = 70.0;
    pub const THRESHOLD_D: f64 = 65.0;

    /// EV% above which a C-or-lower line is flagged for review.
    pub const MISMATCH_EV: f64 = 20.0;

    /// Upper edges (hours, exclusive) of the first four time buckets.
    pub const BUCKET_BOUNDARIES_HOURS: [f64; 4] = [1.0, 3.0, 6.0, 12.0];
    /// Time sub-score per bucket, most urgent first. The last bucket is
    /// discounted below the one before it for long-dated uncertainty.
    pub const BUCKET_TIME_SCORES: [f64; 5] = [20.0, 45.0, 70.0, 100.0, 90.0];

    /// EV trend: dead band and medium/large tier edges, in percentage points.
    pub const TREND_EV_DEAD_BAND: f64 = 1.0;
    pub const TREND_EV_TIERS: [f64; 2] = [2.0, 5.0];

    /// Odds trend: dead band and medium/large tier edges, in American-odds units.
    pub const TREND_ODDS_DEAD_BAND: f64 = 5.0;
    pub const TREND_ODDS_TIERS: [f64; 2] = [15.0, 40.0];
}

// ---------------------------------------------------------------------------
// Grading configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub ev: f64,
    pub edge: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub boundaries_hours: [f64; 4],
    pub time_scores: [f64; 5],
}

/// Dead band plus the absolute-delta edges where Medium and Large begin.
/// Deltas beyond the dead band but under `medium` are Small.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendTiers {
    pub dead_band: f64,
    pub medium: f64,
    pub large: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendConfig {
    pub ev: TrendTiers,
    pub odds: TrendTiers,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingConfig {
    pub ev_ceiling: f64,
    pub edge_ceiling: f64,
    pub weights: ScoreWeights,
    pub thresholds: GradeThresholds,
    pub mismatch_ev_threshold: f64,
    pub buckets: BucketConfig,
    pub trend: TrendConfig,
}

impl Default for GradingConfig {
    fn default() -> Self {
        use grading_defaults::*;
        Self {
            ev_ceiling: EV_CEILING,
            edge_ceiling: EDGE_CEILING,
            weights: ScoreWeights {
                ev: WEIGHT_EV,
                edge: WEIGHT_EDGE,
                time: WEIGHT_TIME,
            },
            thresholds: GradeThresholds {
                a: THRESHOLD_A,
                b: THRESHOLD_B,
                c: THRESHOLD_C,
                d: THRESHOLD_D,
            },
            mismatch_ev_threshold: MISMATCH_EV,
            buckets: BucketConfig {
                boundaries_hours: BUCKET_BOUNDARIES_HOURS,
                time_scores: BUCKET_TIME_SCORES,
            },
            trend: TrendConfig {
                ev: TrendTiers {
                    dead_band: TREND_EV_DEAD_BAND,
                    medium: TREND_EV_TIERS[0],
                    large: TREND_EV_TIERS[1],
                },
                odds: TrendTiers {
                    dead_band: TREND_ODDS_DEAD_BAND,
                    medium: TREND_ODDS_TIERS[0],
                    large: TREND_ODDS_TIERS[1],
                },
            },
        }
    }
}

impl GradingConfig {
    /// Defaults overridden by any GRADE_*, BUCKET_* and TREND_* variables set.
    /// Unparseable values are errors. The result is validated.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let [ev_medium, ev_large] =
            env_list("TREND_EV_TIERS", [d.trend.ev.medium, d.trend.ev.large])?;
        let [odds_medium, odds_large] =
            env_list("TREND_ODDS_TIERS", [d.trend.odds.medium, d.trend.odds.large])?;

        let cfg = Self {
            ev_ceiling: env_f64("GRADE_EV_CEILING", d.ev_ceiling)?,
            edge_ceiling: env_f64("GRADE_EDGE_CEILING", d.edge_ceiling)?,
            weights: ScoreWeights {
                ev: env_f64("GRADE_WEIGHT_EV", d.weights.ev)?,
                edge: env_f64("GRADE_WEIGHT_EDGE", d.weights.edge)?,
                time: env_f64("GRADE_WEIGHT_TIME", d.weights.time)?,
            },
            thresholds: GradeThresholds {
                a: env_f64("GRADE_THRESHOLD_A", d.thresholds.a)?,
                b: env_f64("GRADE_THRESHOLD_B", d.thresholds.b)?,
                c: env_f64("GRADE_THRESHOLD_C", d.thresholds.c)?,
                d: env_f64("GRADE_THRESHOLD_D", d.thresholds.d)?,
            },
            mismatch_ev_threshold: env_f64("GRADE_MISMATCH_EV", d.mismatch_ev_threshold)?,
            buckets: BucketConfig {
                boundaries_hours: env_list("BUCKET_BOUNDARIES_HOURS", d.buckets.boundaries_hours)?,
                time_scores: env_list("BUCKET_TIME_SCORES", d.buckets.time_scores)?,
            },
            trend: TrendConfig {
                ev: TrendTiers {
                    dead_band: env_f64("TREND_EV_DEAD_BAND", d.trend.ev.dead_band)?,
                    medium: ev_medium,
                    large: ev_large,
                },
                odds: TrendTiers {
                    dead_band: env_f64("TREND_ODDS_DEAD_BAND", d.trend.odds.dead_band)?,
                    medium: odds_medium,
                    large: odds_large,
                },
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects weights that do not sum to 1.0 and thresholds or boundaries
    /// that are non-monotonic, out of range or non-finite.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let all_finite = [
            self.ev_ceiling,
            self.edge_ceiling,
            w.ev,
            w.edge,
            w.time,
            self.thresholds.a,
            self.thresholds.b,
            self.thresholds.c,
            self.thresholds.d,
            self.mismatch_ev_threshold,
            self.trend.ev.dead_band,
            self.trend.ev.medium,
            self.trend.ev.large,
            self.trend.odds.dead_band,
            self.trend.odds.medium,
            self.trend.odds.large,
        ]
        .iter()
        .chain(self.buckets.boundaries_hours.iter())
        .chain(self.buckets.time_scores.iter())
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(config_err("grading options must be finite numbers"));
        }

        if w.ev < 0.0 || w.edge < 0.0 || w.time < 0.0 {
            return Err(config_err(format!(
                "weights must be non-negative (ev={}, edge={}, time={})",
                w.ev, w.edge, w.time
            )));
        }
        let sum = w.ev + w.edge + w.time;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(config_err(format!("weights must sum to 1.0, got {sum}")));
        }

        if self.ev_ceiling <= 0.0 || self.edge_ceiling <= 0.0 {
            return Err(config_err("EV and edge ceilings must be positive"));
        }

        let t = &self.thresholds;
        let ordered = 0.0 <= t.d && t.d < t.c && t.c < t.b && t.b < t.a && t.a <= 100.0;
        if !ordered {
            return Err(config_err(format!(
                "grade thresholds must satisfy 0 <= D < C < B < A <= 100 (A={}, B={}, C={}, D={})",
                t.a, t.b, t.c, t.d
            )));
        }

        let b = &self.buckets.boundaries_hours;
        if b[0] <= 0.0 || b.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(config_err(format!(
                "time-bucket boundaries must be positive and strictly increasing, got {b:?}"
            )));
        }
        if self
            .buckets
            .time_scores
            .iter()
            .any(|s| !(0.0..=100.0).contains(s))
        {
            return Err(config_err("time-bucket scores must lie in [0, 100]"));
        }

        for (name, tiers) in [("EV", &self.trend.ev), ("odds", &self.trend.odds)] {
            let ok = 0.0 <= tiers.dead_band
                && tiers.dead_band <= tiers.medium
                && tiers.medium < tiers.large;
            if !ok {
                return Err(config_err(format!(
                    "{name} trend tiers must satisfy 0 <= dead_band <= medium < large \
                     (dead_band={}, medium={}, large={})",
                    tiers.dead_band, tiers.medium, tiers.large
                )));
            }
        }

        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> AppError {
    AppError::Config(msg.into())
}

fn env_f64(name: &str, default: f64) -> Result<f64> {
    match std::env::var(name) {
        Ok(raw) => parse_f64(name, &raw),
        Err(_) => Ok(default),
    }
}

fn env_list<const N: usize>(name: &str, default: [f64; N]) -> Result<[f64; N]> {
    match std::env::var(name) {
        Ok(raw) => parse_list(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_f64(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| config_err(format!("{name} must be a number, got '{raw}'")))
}

fn parse_list<const N: usize>(name: &str, raw: &str) -> Result<[f64; N]> {
    let values = raw
        .split(',')
        .map(|part| parse_f64(name, part))
        .collect::<Result<Vec<f64>>>()?;
    let len = values.len();
    values
        .try_into()
        .map_err(|_| config_err(format!("{name} needs exactly {N} comma-separated values, got {len}")))
}

// ---------------------------------------------------------------------------
// Process configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// JSON feed polled for snapshots (FEED_URL). None disables polling;
    /// snapshots then arrive through POST /snapshots.
    pub feed_url: Option<String>,
    pub poll_interval_secs: u64,
    pub grade_record_interval_secs: u64,
    pub grading: GradingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "ev_grader.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            feed_url: std::env::var("FEED_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            grade_record_interval_secs: std::env::var("GRADE_RECORD_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_GRADE_RECORD_INTERVAL_SECS),
            grading: GradingConfig::from_env()?,
        })
    }
}
