use chrono::Duration;

use crate::config::BucketConfig;
use crate::types::TimeBucket;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Classify time-until-event into an urgency bucket.
///
/// Buckets are half-open `[lower, upper)` and cover the whole real line:
/// anything under the first boundary, including events that already
/// started, is `Immediate`; anything at or past the last is `Plan`.
pub fn bucket(time_to_event: Duration, cfg: &BucketConfig) -> TimeBucket {
    let hours = time_to_event.num_milliseconds() as f64 / MILLIS_PER_HOUR;
    let idx = cfg
        .boundaries_hours
        .iter()
        .position(|&upper| hours < upper)
        .unwrap_or(cfg.boundaries_hours.len());
    TimeBucket::ALL[idx]
}

/// Time sub-score for a bucket, in [0, 100].
pub fn time_score(bucket: TimeBucket, cfg: &BucketConfig) -> f64 {
    cfg.time_scores[bucket.urgency_rank()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradingConfig;

    fn cfg() -> BucketConfig {
        GradingConfig::default().buckets
    }

    #[test]
    fn started_events_are_most_urgent() {
        assert_eq!(bucket(Duration::hours(-5), &cfg()), TimeBucket::Immediate);
        assert_eq!(bucket(Duration::zero(), &cfg()), TimeBucket::Immediate);
    }

    #[test]
    fn default_buckets() {
        let c = cfg();
        assert_eq!(bucket(Duration::minutes(30), &c), TimeBucket::Immediate);
        assert_eq!(bucket(Duration::hours(2), &c), TimeBucket::VeryUrgent);
        assert_eq!(bucket(Duration::hours(4), &c), TimeBucket::Urgent);
        assert_eq!(bucket(Duration::hours(8), &c), TimeBucket::Monitor);
        assert_eq!(bucket(Duration::hours(20), &c), TimeBucket::Plan);
        assert_eq!(bucket(Duration::days(30), &c), TimeBucket::Plan);
    }

    #[test]
    fn boundaries_are_contiguous() {
        let c = cfg();
        for (i, &edge) in c.boundaries_hours.iter().enumerate() {
            let at = Duration::milliseconds((edge * MILLIS_PER_HOUR) as i64);
            let just_below = at - Duration::milliseconds(1);
            assert_eq!(bucket(just_below, &c), TimeBucket::ALL[i], "below {edge}h");
            assert_eq!(bucket(at, &c), TimeBucket::ALL[i + 1], "at {edge}h");
        }
    }

    #[test]
    fn bucket_order_runs_most_to_least_urgent() {
        let mut sorted = TimeBucket::ALL;
        sorted.sort();
        assert_eq!(sorted, TimeBucket::ALL);
        assert_eq!(TimeBucket::Immediate.urgency_rank(), 0);
        assert_eq!(TimeBucket::Plan.urgency_rank(), 4);
    }

    #[test]
    fn time_score_follows_config() {
        let c = cfg();
        assert_eq!(time_score(TimeBucket::VeryUrgent, &c), 45.0);
        assert!(time_score(TimeBucket::Plan, &c) > time_score(TimeBucket::VeryUrgent, &c));
    }
}
