use crate::config::{TrendConfig, TrendTiers};
use crate::types::{Direction, Magnitude, Movement, Snapshot, Trend};

/// Compare the current snapshot against the one captured at first sighting.
///
/// Display-only. A missing baseline (or a metric missing on either side)
/// reports `Unavailable` instead of a fabricated zero delta.
pub fn trend(current: &Snapshot, initial: Option<&Snapshot>, cfg: &TrendConfig) -> Trend {
    let Some(initial) = initial else {
        return Trend::UNAVAILABLE;
    };

    let ev = movement(current.ev_percent, initial.ev_percent, &cfg.ev);
    let odds = movement(
        current.odds.and_then(odds_line_value),
        initial.odds.and_then(odds_line_value),
        &cfg.odds,
    );

    Trend { ev, odds }
}

fn movement(current: Option<f64>, initial: Option<f64>, tiers: &TrendTiers) -> Movement {
    match (current, initial) {
        (Some(c), Some(i)) if c.is_finite() && i.is_finite() => {
            let delta = c - i;
            let (direction, magnitude) = classify_delta(delta, tiers);
            Movement::Measured {
                direction,
                magnitude,
                delta,
            }
        }
        _ => Movement::Unavailable,
    }
}

/// Direction and size of a signed delta. Positive deltas are improvements.
pub fn classify_delta(delta: f64, tiers: &TrendTiers) -> (Direction, Magnitude) {
    let size = delta.abs();
    if size <= tiers.dead_band {
        return (Direction::Stable, Magnitude::None);
    }

    let direction = if delta > 0.0 {
        Direction::Improving
    } else {
        Direction::Worsening
    };
    let magnitude = if size >= tiers.large {
        Magnitude::Large
    } else if size >= tiers.medium {
        Magnitude::Medium
    } else {
        Magnitude::Small
    };

    (direction, magnitude)
}

/// Map American odds onto a continuous payout scale so that deltas across
/// the -100/+100 seam are small: +100 and -100 both map to 100, -110 to 90.
/// Higher is a better price for the bettor. Odds strictly inside (-100, 100)
/// are not valid American odds.
pub fn odds_line_value(american: f64) -> Option<f64> {
    if american >= 100.0 {
        Some(american)
    } else if american <= -100.0 {
        Some(american + 200.0)
    } else {
        None
    }
}
