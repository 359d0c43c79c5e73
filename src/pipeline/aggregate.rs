use chrono::{DateTime, Utc};

use crate::models::{MetricAggregate, MetricKind, MetricRecord};

/// Packs one kind's selected samples into a model-ready aggregate.
///
/// Pure: the only inputs are the arguments. Samples outside the window or
/// belonging to another repository or kind are caller bugs and trip a debug
/// assertion.
pub fn build(
    repository_id: &str,
    kind: MetricKind,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    samples: Vec<MetricRecord>,
) -> MetricAggregate {
    debug_assert!(window_start <= window_end, "inverted window");
    debug_assert!(
        samples.iter().all(|s| s.repository_id == repository_id
            && s.kind == kind
            && s.timestamp >= window_start
            && s.timestamp < window_end),
        "sample outside aggregate bounds"
    );
    debug_assert!(
        samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "samples not in timestamp order"
    );

    MetricAggregate {
        repository_id: repository_id.to_string(),
        kind,
        window_start,
        window_end,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn samples(start: DateTime<Utc>, n: usize) -> Vec<MetricRecord> {
        (0..n)
            .map(|i| MetricRecord {
                id: format!("m{i}"),
                repository_id: "repo".to_string(),
                kind: MetricKind::Commit,
                value: i as u64,
                timestamp: start + Duration::hours(i as i64),
            })
            .collect()
    }

    #[test]
    fn test_build_is_pure() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(7);

        let first = build("repo", MetricKind::Commit, start, end, samples(start, 4));
        let second = build("repo", MetricKind::Commit, start, end, samples(start, 4));

        assert_eq!(first, second);
        assert_eq!(first.sample_count(), 4);
        assert_eq!(first.window_start, start);
        assert_eq!(first.window_end, end);
    }

    #[test]
    fn test_build_with_no_samples_keeps_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);

        let aggregate = build("repo", MetricKind::PullRequest, start, end, vec![]);

        assert!(aggregate.is_empty());
        assert_eq!(aggregate.total_value(), 0);
        assert_eq!(aggregate.kind, MetricKind::PullRequest);
        assert_eq!(aggregate.repository_id, "repo");
    }

    #[test]
    #[should_panic(expected = "sample outside aggregate bounds")]
    #[cfg(debug_assertions)]
    fn test_build_rejects_foreign_samples_in_debug() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);

        build("other-repo", MetricKind::Commit, start, end, samples(start, 1));
    }
}
