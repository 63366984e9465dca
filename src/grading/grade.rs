use crate::config::GradeThresholds;
use crate::types::Grade;

/// Clamp a score into [0, 100] before lookup. NaN maps to 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Map a composite score to a grade. Lower edges are inclusive:
/// A `[a, 100]`, B `[b, a)`, C `[c, b)`, D `[d, c)`, F `[0, d)`.
pub fn grade(score: f64, t: &GradeThresholds) -> Grade {
    let s = clamp_score(score);
    if s >= t.a {
        Grade::A
    } else if s >= t.b {
        Grade::B
    } else if s >= t.c {
        Grade::C
    } else if s >= t.d {
        Grade::D
    } else {
        Grade::F
    }
}

/// A C-or-lower line whose EV% exceeds the review threshold.
pub fn is_mismatch(grade: Grade, ev_percent: f64, mismatch_ev_threshold: f64) -> bool {
    grade >= Grade::C && ev_percent > mismatch_ev_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradingConfig;

    fn thresholds() -> GradeThresholds {
        GradingConfig::default().thresholds
    }

    #[test]
    fn boundaries_are_inclusive_on_the_lower_edge() {
        let t = thresholds();
        assert_eq!(grade(100.0, &t), Grade::A);
        assert_eq!(grade(90.0, &t), Grade::A);
        assert_eq!(grade(89.999, &t), Grade::B);
        assert_eq!(grade(80.0, &t), Grade::B);
        assert_eq!(grade(79.999, &t), Grade::C);
        assert_eq!(grade(70.0, &t), Grade::C);
        assert_eq!(grade(69.999, &t), Grade::D);
        assert_eq!(grade(65.0, &t), Grade::D);
        assert_eq!(grade(64.999, &t), Grade::F);
        assert_eq!(grade(0.0, &t), Grade::F);
    }

    #[test]
    fn grades_partition_the_range_in_order() {
        let t = thresholds();
        let mut previous = Grade::F;
        for hundredth in 0..=10_000 {
            let s = hundredth as f64 / 100.0;
            let g = grade(s, &t);
            // Grade never gets worse as the score rises.
            assert!(g <= previous, "grade worsened at {s}: {g} after {previous}");
            previous = g;
        }
        assert_eq!(previous, Grade::A);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let t = thresholds();
        assert_eq!(grade(140.0, &t), Grade::A);
        assert_eq!(grade(-12.0, &t), Grade::F);
        assert_eq!(grade(f64::NAN, &t), Grade::F);
        assert_eq!(grade(f64::INFINITY, &t), Grade::A);
    }

    #[test]
    fn mismatch_needs_low_grade_and_high_ev() {
        assert!(is_mismatch(Grade::C, 25.0, 20.0));
        assert!(is_mismatch(Grade::F, 20.5, 20.0));
        assert!(!is_mismatch(Grade::C, 20.0, 20.0));
        assert!(!is_mismatch(Grade::B, 40.0, 20.0));
        assert!(!is_mismatch(Grade::D, 5.0, 20.0));
    }
}
