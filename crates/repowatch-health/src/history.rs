//! Historical matching: find the persisted result closest to a point in time.

use repowatch_core::types::HealthAnalysisResult;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_MATCH_WINDOW: Duration = Duration::days(30);

/// The result whose commit date is nearest to `target`, if it lies within
/// `window` of it. Ties go to the earlier entry in `samples`.
pub fn closest_within(
    samples: &[HealthAnalysisResult],
    target: OffsetDateTime,
    window: Duration,
) -> Option<&HealthAnalysisResult> {
    let mut best: Option<(&HealthAnalysisResult, Duration)> = None;
    for sample in samples {
        let Some(date) = sample.parsed_commit_date() else {
            continue;
        };
        let diff = (date - target).abs();
        if diff > window {
            continue;
        }
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((sample, diff));
        }
    }
    best.map(|(sample, _)| sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use repowatch_core::clock::{format_rfc3339, parse_rfc3339};
    use repowatch_core::types::ScoreSource;

    fn result(sha: &str, date: &str, score: u8) -> HealthAnalysisResult {
        HealthAnalysisResult {
            watchlist_id: "w1".into(),
            commit_sha: sha.into(),
            commit_date: date.into(),
            raw_output: None,
            health_score: score,
            analyzed_at: "2025-06-01T00:00:00Z".into(),
            source: ScoreSource::Tool,
        }
    }

    #[test]
    fn picks_closest_inside_window() {
        let samples = vec![
            result("a", "2025-01-01T00:00:00Z", 40),
            result("b", "2025-01-20T00:00:00Z", 60),
            result("c", "2025-03-01T00:00:00Z", 80),
        ];
        let target = parse_rfc3339("2025-01-15T00:00:00Z").unwrap();
        let hit = closest_within(&samples, target, DEFAULT_MATCH_WINDOW).unwrap();
        assert_eq!(hit.commit_sha, "b");
    }

    #[test]
    fn rejects_matches_outside_window() {
        let samples = vec![result("a", "2025-01-01T00:00:00Z", 40)];
        let target = parse_rfc3339("2025-02-01T00:00:01Z").unwrap();
        assert!(closest_within(&samples, target, DEFAULT_MATCH_WINDOW).is_none());

        // Exactly 30 days is still a match.
        let edge = parse_rfc3339("2025-01-31T00:00:00Z").unwrap();
        assert!(closest_within(&samples, edge, DEFAULT_MATCH_WINDOW).is_some());
    }

    #[test]
    fn matches_targets_before_samples_too() {
        let target = parse_rfc3339("2025-01-01T00:00:00Z").unwrap();
        let samples = vec![result(
            "later",
            &format_rfc3339(target + Duration::days(10)),
            50,
        )];
        assert_eq!(
            closest_within(&samples, target, DEFAULT_MATCH_WINDOW)
                .unwrap()
                .commit_sha,
            "later"
        );
    }

    #[test]
    fn skips_unparseable_dates_and_handles_empty() {
        let target = parse_rfc3339("2025-01-01T00:00:00Z").unwrap();
        assert!(closest_within(&[], target, DEFAULT_MATCH_WINDOW).is_none());
        let samples = vec![result("bad", "yesterday", 10)];
        assert!(closest_within(&samples, target, DEFAULT_MATCH_WINDOW).is_none());
    }
}
