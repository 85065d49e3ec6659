//! Reduction of a score series into video-level statistics

use deepfake_common::{FinalScores, ScoreSeries, SummaryStatistics};

/// A frame counts toward a class when that class scores strictly above this
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Summarize a series of per-frame scores
///
/// `real_count` and `fake_count` count frames whose score exceeds
/// [`DECISION_THRESHOLD`]; percentages are relative to the number of entries
/// in the series. An empty series yields [`FinalScores::NoData`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(series: &ScoreSeries) -> FinalScores {
    let total_frames = series.len();
    if total_frames == 0 {
        return FinalScores::no_data();
    }

    let real_count = count_above(series.real_scores());
    let fake_count = count_above(series.fake_scores());
    let percentage = |count: usize| count as f64 / total_frames as f64 * 100.0;

    FinalScores::Summary(SummaryStatistics {
        total_frames,
        real_count,
        fake_count,
        real_percentage: percentage(real_count),
        fake_percentage: percentage(fake_count),
    })
}

fn count_above(scores: &[f32]) -> usize {
    scores.iter().filter(|&&s| s > DECISION_THRESHOLD).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfake_common::ClassificationResult;

    fn series(scores: &[(f32, f32)]) -> ScoreSeries {
        let mut series = ScoreSeries::new();
        for (i, &(real, fake)) in scores.iter().enumerate() {
            series
                .push(i as u64, ClassificationResult::new(real, fake))
                .unwrap();
        }
        series
    }

    #[test]
    fn test_even_split() {
        let result = aggregate(&series(&[(0.9, 0.1), (0.3, 0.7)]));
        let stats = result.summary().expect("expected statistics");
        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.real_count, 1);
        assert_eq!(stats.fake_count, 1);
        assert_eq!(stats.real_percentage, 50.0);
        assert_eq!(stats.fake_percentage, 50.0);
    }

    #[test]
    fn test_empty_series_reports_no_data() {
        let result = aggregate(&ScoreSeries::new());
        assert_eq!(result, FinalScores::no_data());
        assert!(result.summary().is_none());
    }

    #[test]
    fn test_exact_half_counts_toward_neither() {
        let result = aggregate(&series(&[(0.5, 0.5), (0.2, 0.8)]));
        let stats = result.summary().unwrap();
        assert_eq!(stats.real_count, 0);
        assert_eq!(stats.fake_count, 1);
        assert!(stats.real_percentage + stats.fake_percentage <= 100.0);
    }

    #[test]
    fn test_counts_never_exceed_total() {
        let input = series(&[(0.6, 0.4), (0.1, 0.2), (0.49, 0.51), (0.7, 0.3), (0.0, 0.0)]);
        let stats = aggregate(&input).summary().cloned().unwrap();
        assert!(stats.real_count + stats.fake_count <= stats.total_frames);
        assert_eq!(stats.total_frames, 5);
        assert_eq!(stats.real_count, 2);
        assert_eq!(stats.fake_count, 1);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let input = series(&[(0.9, 0.1), (0.2, 0.8), (0.6, 0.4)]);
        assert_eq!(aggregate(&input), aggregate(&input));
    }
}
