use crate::assets::ResolvedSegment;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Refuse to build from voice files older than `max_age_minutes`.
    pub enabled: bool,
    pub max_age_minutes: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        FreshnessConfig {
            enabled: false,
            max_age_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaleSegment {
    pub identifier: String,
    pub age_minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessReport {
    pub all_fresh: bool,
    pub stale: Vec<StaleSegment>,
}

/// Minutes since `mtime`, fractional. A modification time in the future
/// counts as brand new.
pub fn age_minutes(mtime: DateTime<Local>, now: DateTime<Local>) -> f64 {
    let elapsed = now.signed_duration_since(mtime);
    (elapsed.num_milliseconds() as f64 / 60_000.0).max(0.0)
}

/// Flag every segment whose file is older than `max_age_minutes` at `now`.
pub fn check(
    segments: &[ResolvedSegment],
    max_age_minutes: u32,
    now: DateTime<Local>,
) -> FreshnessReport {
    let stale: Vec<StaleSegment> = segments
        .iter()
        .filter_map(|segment| {
            let age = age_minutes(segment.mtime, now);
            (age > max_age_minutes as f64).then(|| StaleSegment {
                identifier: segment.spec.identifier.clone(),
                age_minutes: age,
            })
        })
        .collect();

    FreshnessReport {
        all_fresh: stale.is_empty(),
        stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SegmentSpec;
    use chrono::Duration;
    use std::path::PathBuf;

    fn segment(id: &str, mtime: DateTime<Local>) -> ResolvedSegment {
        ResolvedSegment {
            spec: SegmentSpec::new(id),
            path: PathBuf::from(format!("{id}.mp3")),
            mtime,
        }
    }

    #[test]
    fn ten_minute_old_file_is_stale_at_five() {
        let now = Local::now();
        let report = check(&[segment("001_intro", now - Duration::minutes(10))], 5, now);
        assert!(!report.all_fresh);
        assert_eq!(report.stale.len(), 1);
        assert_eq!(report.stale[0].identifier, "001_intro");
        assert!((report.stale[0].age_minutes - 10.0).abs() < 1e-6);
    }

    #[test]
    fn only_stale_segments_are_listed() {
        let now = Local::now();
        let segments = vec![
            segment("001_intro", now - Duration::minutes(2)),
            segment("002_news", now - Duration::minutes(90)),
            segment("003_outro", now - Duration::seconds(30)),
        ];
        let report = check(&segments, 60, now);
        assert_eq!(report.stale.len(), 1);
        assert_eq!(report.stale[0].identifier, "002_news");
    }

    #[test]
    fn exactly_max_age_is_fresh() {
        let now = Local::now();
        let report = check(&[segment("a", now - Duration::minutes(5))], 5, now);
        assert!(report.all_fresh);
    }

    #[test]
    fn future_mtime_counts_as_new() {
        let now = Local::now();
        assert_eq!(age_minutes(now + Duration::minutes(3), now), 0.0);
        let report = check(&[segment("a", now + Duration::minutes(3))], 0, now);
        assert!(report.all_fresh);
    }

    #[test]
    fn empty_list_is_fresh() {
        let report = check(&[], 1, Local::now());
        assert!(report.all_fresh);
        assert!(report.stale.is_empty());
    }
}
