//! Sampling Planner: picks the commits a health analysis scores.

use repowatch_core::config::{SamplingConfig, SamplingTier};
use repowatch_core::types::SamplingPoint;

/// How many samples a timeline of a given length gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingPolicy {
    tiers: Vec<SamplingTier>,
    max: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::from_config(&SamplingConfig::default())
    }
}

impl SamplingPolicy {
    /// `tiers` must be ordered by ascending `below`.
    pub fn new(tiers: Vec<SamplingTier>, max: usize) -> Self {
        Self { tiers, max }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.tiers.clone(), config.max_samples)
    }

    /// Sample count for a timeline of `total` commits. Never exceeds the cap;
    /// zero only for an empty timeline.
    pub fn count(&self, total: usize) -> usize {
        if total == 0 {
            return 0;
        }
        self.tiers
            .iter()
            .find(|tier| total < tier.below)
            .map_or(self.max, |tier| tier.count)
            .min(self.max)
    }
}

/// Choose up to `count` points from a timeline sorted oldest first.
///
/// The oldest commit is always included, followed by `count - 2` evenly
/// spaced intermediates at `floor(i * (N-1) / (count-1))` and finally the
/// newest. `count` is clamped to `[2, N]`; repeated indices are dropped.
pub fn points(timeline: &[SamplingPoint], count: usize) -> Vec<SamplingPoint> {
    let n = timeline.len();
    if n == 0 || count == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![timeline[0].clone()];
    }

    let count = count.clamp(2, n);
    let mut indices = Vec::with_capacity(count);
    indices.push(0);
    for i in 1..count - 1 {
        let idx = i * (n - 1) / (count - 1);
        if indices.last() != Some(&idx) {
            indices.push(idx);
        }
    }
    if indices.last() != Some(&(n - 1)) {
        indices.push(n - 1);
    }

    indices.into_iter().map(|i| timeline[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime};

    fn timeline(n: usize) -> Vec<SamplingPoint> {
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        (0..n)
            .map(|i| SamplingPoint {
                sha: format!("c{i}"),
                date: start + Duration::hours(i as i64),
            })
            .collect()
    }

    fn shas(points: &[SamplingPoint]) -> Vec<&str> {
        points.iter().map(|p| p.sha.as_str()).collect()
    }

    #[test]
    fn default_tiers() {
        let policy = SamplingPolicy::default();
        assert_eq!(policy.count(0), 0);
        assert_eq!(policy.count(1), 3);
        assert_eq!(policy.count(999), 3);
        assert_eq!(policy.count(1000), 4);
        assert_eq!(policy.count(2500), 4);
    }

    #[test]
    fn count_is_monotonic_and_capped() {
        let policy = SamplingPolicy::new(
            vec![
                SamplingTier { below: 10, count: 2 },
                SamplingTier { below: 100, count: 5 },
                SamplingTier { below: 1000, count: 9 },
            ],
            6,
        );
        let mut prev = 0;
        for total in 1..5000 {
            let c = policy.count(total);
            assert!(c >= prev, "count dropped at {total}");
            assert!(c <= 6);
            prev = c;
        }
        assert_eq!(policy.count(5), 2);
        assert_eq!(policy.count(50), 5);
        assert_eq!(policy.count(500), 6);
    }

    #[test]
    fn endpoints_always_included() {
        for n in 2..60 {
            for count in 2..8 {
                let pts = points(&timeline(n), count);
                assert_eq!(pts.first().unwrap().sha, "c0");
                assert_eq!(pts.last().unwrap().sha, format!("c{}", n - 1));
                assert!(pts.len() <= count.min(n));
            }
        }
    }

    #[test]
    fn intermediates_are_evenly_spaced() {
        let pts = points(&timeline(2500), 4);
        // floor(1*2499/3) = 833, floor(2*2499/3) = 1666
        assert_eq!(shas(&pts), vec!["c0", "c833", "c1666", "c2499"]);
    }

    #[test]
    fn small_timelines() {
        assert!(points(&timeline(0), 4).is_empty());
        assert_eq!(shas(&points(&timeline(1), 4)), vec!["c0"]);
        assert_eq!(shas(&points(&timeline(2), 4)), vec!["c0", "c1"]);
        assert_eq!(shas(&points(&timeline(3), 4)), vec!["c0", "c1", "c2"]);
        assert_eq!(shas(&points(&timeline(5), 1)), vec!["c0", "c4"]);
    }

    #[test]
    fn deterministic() {
        let tl = timeline(777);
        assert_eq!(points(&tl, 3), points(&tl, 3));
    }
}
