use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;
use tracing::warn;

use crate::config::GradingConfig;
use crate::grading::grade_opportunity;
use crate::types::{Exclusion, Grade, GradedOpportunity, Opportunity};

/// Sort key, compared field by field in declaration order:
/// grade (A first), then mismatch (flagged first), then score (high first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
    pub grade: Grade,
    pub mismatch_first: Reverse<bool>,
    pub score_desc: Reverse<OrderedFloat<f64>>,
}

pub fn rank_key(o: &GradedOpportunity) -> RankKey {
    RankKey {
        grade: o.grade,
        mismatch_first: Reverse(o.mismatch),
        score_desc: Reverse(OrderedFloat(o.composite_score)),
    }
}

/// Order opportunities most important first. Returns a new vector; the input
/// is untouched. The sort is stable, so entries with equal keys keep their
/// input order and re-ranking a ranked list is a no-op.
pub fn rank(items: &[GradedOpportunity]) -> Vec<GradedOpportunity> {
    let mut ranked = items.to_vec();
    ranked.sort_by_key(rank_key);
    ranked
}

/// Output of one ranking pass over the active set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingReport {
    pub ranked: Vec<GradedOpportunity>,
    /// Opportunities that could not be scored, reported instead of ranked.
    pub excluded: Vec<Exclusion>,
}

/// Grade every opportunity and rank the ones that could be graded.
/// One bad snapshot never aborts the pass.
pub fn rank_opportunities(
    opportunities: &[Opportunity],
    cfg: &GradingConfig,
    now: DateTime<Utc>,
) -> RankingReport {
    let mut graded = Vec::with_capacity(opportunities.len());
    let mut excluded = Vec::new();

    for opp in opportunities {
        match grade_opportunity(opp, cfg, now) {
            Ok(g) => graded.push(g),
            Err(e) => {
                warn!(opportunity_id = %opp.id, "Excluded from ranking: {e}");
                excluded.push(Exclusion {
                    id: opp.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    RankingReport {
        ranked: rank(&graded),
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetDetails, OpportunityId, ScoreBreakdown, Snapshot, TimeBucket, Trend};
    use chrono::Duration;

    fn graded(name: &str, grade: Grade, score: f64, mismatch: bool) -> GradedOpportunity {
        let now = Utc::now();
        GradedOpportunity {
            id: OpportunityId::from(name.to_string()),
            details: BetDetails::default(),
            current: Snapshot {
                odds: Some(120.0),
                ev_percent: Some(5.0),
                win_probability: Some(50.0),
                market_implied_probability: Some(45.0),
                event_time: Some(now + Duration::hours(4)),
                sportsbook: "caesars".to_string(),
                observed_at: now,
            },
            grade,
            composite_score: score,
            breakdown: ScoreBreakdown {
                ev_score: 0.0,
                edge_score: 0.0,
                time_score: 0.0,
                composite: score,
            },
            mismatch,
            edge: 5.0,
            trend: Trend::UNAVAILABLE,
            time_bucket: TimeBucket::Urgent,
            bucket_color: TimeBucket::Urgent.color(),
            time_to_event_secs: 4 * 3600,
        }
    }

    fn ids(items: &[GradedOpportunity]) -> Vec<&str> {
        items.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn empty_input_ranks_to_empty() {
        assert!(rank(&[]).is_empty());
    }

    #[test]
    fn grade_then_mismatch_then_score() {
        let input = vec![
            graded("c_plain_high", Grade::C, 79.0, false),
            graded("b_low", Grade::B, 81.0, false),
            graded("c_mismatch", Grade::C, 95.0, true),
            graded("a", Grade::A, 91.0, false),
            graded("b_high", Grade::B, 82.0, false),
            graded("c_plain_low", Grade::C, 71.0, false),
        ];
        let ranked = rank(&input);
        assert_eq!(
            ids(&ranked),
            vec!["a", "b_high", "b_low", "c_mismatch", "c_plain_high", "c_plain_low"]
        );
    }

    #[test]
    fn mismatch_beats_higher_score_within_grade() {
        let input = vec![
            graded("plain", Grade::D, 69.0, false),
            graded("flagged", Grade::D, 66.0, true),
        ];
        assert_eq!(ids(&rank(&input)), vec!["flagged", "plain"]);
    }

    #[test]
    fn identical_keys_keep_input_order() {
        let input: Vec<_> = (0..6)
            .map(|i| graded(&format!("op{i}"), Grade::B, 85.0, false))
            .collect();
        assert_eq!(ids(&rank(&input)), vec!["op0", "op1", "op2", "op3", "op4", "op5"]);
    }

    #[test]
    fn ranking_is_idempotent_and_leaves_input_alone() {
        let input = vec![
            graded("x", Grade::F, 10.0, false),
            graded("y", Grade::A, 95.0, false),
            graded("z", Grade::F, 10.0, false),
            graded("w", Grade::F, 40.0, true),
        ];
        let before = input.clone();
        let once = rank(&input);
        let twice = rank(&once);
        assert_eq!(input, before);
        assert_eq!(once, twice);
        assert_eq!(ids(&once), vec!["y", "w", "x", "z"]);
    }

    #[test]
    fn each_key_orders_independently() {
        let a = graded("a", Grade::A, 10.0, false);
        let b = graded("b", Grade::B, 99.0, true);
        assert!(rank_key(&a) < rank_key(&b));

        let flagged = graded("f", Grade::C, 10.0, true);
        let plain = graded("p", Grade::C, 99.0, false);
        assert!(rank_key(&flagged) < rank_key(&plain));

        let high = graded("h", Grade::C, 75.0, false);
        let low = graded("l", Grade::C, 72.0, false);
        assert!(rank_key(&high) < rank_key(&low));
    }

    #[test]
    fn incomplete_snapshots_are_excluded_not_fatal() {
        let now = Utc::now();
        let complete = |name: &str, ev: f64| {
            let snap = Snapshot {
                odds: Some(-120.0),
                ev_percent: Some(ev),
                win_probability: Some(60.0),
                market_implied_probability: Some(54.5),
                event_time: Some(now + Duration::hours(7)),
                sportsbook: "pointsbet".to_string(),
                observed_at: now,
            };
            Opportunity {
                id: OpportunityId::from(name.to_string()),
                details: BetDetails::default(),
                initial: Some(snap.clone()),
                current: snap,
                first_seen_at: now,
            }
        };
        let mut broken = complete("broken", 4.0);
        broken.current.market_implied_probability = None;

        let input = vec![complete("low", 2.0), broken, complete("high", 12.0)];
        let report = rank_opportunities(&input, &GradingConfig::default(), now);

        assert_eq!(report.ranked.len(), input.len() - 1);
        assert_eq!(ids(&report.ranked), vec!["high", "low"]);
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].id.as_str(), "broken");
        assert!(report.excluded[0].reason.contains("market_implied_probability"));
    }
}
