//! Retention policy and the stale/retained decision rule.
//!
//! This module is pure: no clock, no registry. The caller supplies `now` and
//! the manifest, and gets a `Classification` back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::manifest::ArtifactManifest;

/// Delete-if-older-than-N-days.
///
/// Immutable for the duration of a run. `retention_days` is unsigned, so a
/// negative window cannot be represented; the config loader rejects it
/// before a policy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub retention_days: u32,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// `now - retention_days days`, clamped to the earliest representable
    /// instant when the window reaches past it.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.retention_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Outcome of comparing one artifact against the cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Last updated strictly before the cutoff: eligible for deletion.
    Stale,
    /// Everything else, including exactly-at-cutoff.
    Retained,
}

/// Strict less-than: an artifact updated at the cutoff instant is retained.
pub fn classify(manifest: &ArtifactManifest, cutoff: DateTime<Utc>) -> Classification {
    if manifest.last_updated_on < cutoff {
        Classification::Stale
    } else {
        Classification::Retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn cutoff_subtracts_whole_days() {
        let policy = RetentionPolicy::new(30);
        assert_eq!(policy.cutoff(at(2024, 6, 1)), at(2024, 5, 2));
    }

    #[test]
    fn zero_day_window_cuts_off_at_now() {
        let now = at(2024, 6, 1);
        assert_eq!(RetentionPolicy::new(0).cutoff(now), now);
    }

    #[rstest]
    #[case::beyond_calendar_range(100_000_000)]
    #[case::max(u32::MAX)]
    fn oversized_window_clamps_instead_of_overflowing(#[case] days: u32) {
        let cutoff = RetentionPolicy::new(days).cutoff(at(2024, 6, 1));
        assert_eq!(cutoff, DateTime::<Utc>::MIN_UTC);

        let ancient = ArtifactManifest::new("web", "sha256:aa", at(1970, 1, 1));
        assert_eq!(classify(&ancient, cutoff), Classification::Retained);
    }

    #[rstest]
    #[case::well_before(at(2024, 4, 1), Classification::Stale)]
    #[case::one_microsecond_before(at(2024, 5, 2) - Duration::microseconds(1), Classification::Stale)]
    #[case::exactly_at_cutoff(at(2024, 5, 2), Classification::Retained)]
    #[case::after(at(2024, 5, 15), Classification::Retained)]
    #[case::in_the_future(at(2025, 1, 1), Classification::Retained)]
    fn classify_uses_strict_inequality(
        #[case] last_updated_on: DateTime<Utc>,
        #[case] expected: Classification,
    ) {
        let cutoff = RetentionPolicy::new(30).cutoff(at(2024, 6, 1));
        let manifest = ArtifactManifest::new("web", "sha256:aa", last_updated_on);
        assert_eq!(classify(&manifest, cutoff), expected);
    }

    #[test]
    fn classification_serializes_screaming_snake() {
        let s = serde_json::to_string(&Classification::Stale).unwrap();
        assert_eq!(s, "\"STALE\"");
    }
}
