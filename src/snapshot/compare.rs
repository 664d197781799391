//! Rule-based snapshot comparison
//!
//! Diffs two snapshots metric by metric into recorded changes plus plain-language
//! issues and improvements. Deterministic: the same pair always yields the same
//! diff, and comparing a snapshot with itself yields no findings.

use tracing::debug;

use super::round_to;
use crate::types::{
    ComparisonDiff, CountChange, DurationChange, MetricsChanged, RateChange, Snapshot,
    StepRateChange, Tally, Trend,
};

/// Conversion rate change classified as an issue or improvement
pub const CONVERSION_THRESHOLD: f64 = 0.05;

/// Drop-off change needed before a step is recorded at all
pub const DROPOFF_RECORD_THRESHOLD: f64 = 0.03;

/// Drop-off change classified as an issue or improvement
pub const DROPOFF_THRESHOLD: f64 = 0.05;

/// Time-to-complete change classified as an issue or improvement
pub const TIME_THRESHOLD_MS: i64 = 5000;

/// Path count growth factor flagged as fragmentation
pub const PATH_FRAGMENTED_FACTOR: f64 = 1.5;

/// Path count shrink factor flagged as focusing
pub const PATH_FOCUSED_FACTOR: f64 = 0.7;

/// Accumulates findings while the individual metrics are compared
#[derive(Default)]
struct Findings {
    changes: MetricsChanged,
    issues: Vec<String>,
    improvements: Vec<String>,
}

/// Stateless snapshot comparator
pub struct SnapshotComparator;

impl SnapshotComparator {
    /// Compare `previous` against `current`
    pub fn compare(previous: &Snapshot, current: &Snapshot) -> ComparisonDiff {
        let mut findings = Findings::default();

        Self::compare_conversion(previous, current, &mut findings);
        Self::compare_dropoffs(previous, current, &mut findings);
        Self::compare_time(previous, current, &mut findings);
        Self::compare_path_diversity(previous, current, &mut findings);
        Self::compare_errors(previous, current, &mut findings);

        let overall_trend = determine_trend(findings.issues.len(), findings.improvements.len());
        debug!(
            issues = findings.issues.len(),
            improvements = findings.improvements.len(),
            trend = ?overall_trend,
            "snapshots compared"
        );

        ComparisonDiff {
            metrics_changed: findings.changes,
            issues: findings.issues,
            improvements: findings.improvements,
            overall_trend,
        }
    }

    fn compare_conversion(previous: &Snapshot, current: &Snapshot, findings: &mut Findings) {
        let (Some(prev), Some(curr)) = (previous.conversion_rate, current.conversion_rate) else {
            return;
        };

        let delta = curr - prev;
        let delta_percent = if prev > 0.0 {
            Some(delta / prev * 100.0)
        } else {
            None
        };

        findings.changes.conversion_rate = Some(RateChange {
            previous: round_to(prev, 4),
            current: round_to(curr, 4),
            delta: round_to(delta, 4),
            delta_percent: nonzero_percent(delta_percent),
        });

        if delta < -CONVERSION_THRESHOLD {
            findings
                .issues
                .push(format!("Conversion rate dropped by {}", percent(delta.abs())));
        } else if delta > CONVERSION_THRESHOLD {
            findings
                .improvements
                .push(format!("Conversion rate improved by {}", percent(delta)));
        }
    }

    /// Only steps present in both snapshots are compared
    fn compare_dropoffs(previous: &Snapshot, current: &Snapshot, findings: &mut Findings) {
        let mut changed = Tally::new();

        for (step, &curr) in current.dropoff_rates.iter() {
            let Some(&prev) = previous.dropoff_rates.get(step) else {
                continue;
            };

            let delta = curr - prev;
            if delta.abs() <= DROPOFF_RECORD_THRESHOLD {
                continue;
            }

            changed.insert(
                step,
                StepRateChange {
                    previous: round_to(prev, 4),
                    current: round_to(curr, 4),
                    delta: round_to(delta, 4),
                },
            );

            if delta > DROPOFF_THRESHOLD {
                findings.issues.push(format!(
                    "Drop-off at '{step}' increased by {}",
                    percent(delta)
                ));
            } else if delta < -DROPOFF_THRESHOLD {
                findings.improvements.push(format!(
                    "Drop-off at '{step}' decreased by {}",
                    percent(delta.abs())
                ));
            }
        }

        if !changed.is_empty() {
            findings.changes.dropoff_rates = Some(changed);
        }
    }

    fn compare_time(previous: &Snapshot, current: &Snapshot, findings: &mut Findings) {
        let (Some(prev), Some(curr)) = (
            previous.avg_time_to_complete_ms,
            current.avg_time_to_complete_ms,
        ) else {
            return;
        };

        let delta_ms = curr.saturating_sub(prev);
        let delta_percent = if prev > 0 {
            Some(delta_ms as f64 / prev as f64 * 100.0)
        } else {
            None
        };

        findings.changes.time_to_complete = Some(DurationChange {
            previous_ms: prev,
            current_ms: curr,
            delta_ms,
            delta_percent: nonzero_percent(delta_percent),
        });

        if delta_ms > TIME_THRESHOLD_MS {
            findings.issues.push(format!(
                "Time-to-complete increased by {:.1}s",
                delta_ms as f64 / 1000.0
            ));
        } else if delta_ms < -TIME_THRESHOLD_MS {
            findings.improvements.push(format!(
                "Time-to-complete decreased by {:.1}s",
                delta_ms.unsigned_abs() as f64 / 1000.0
            ));
        }
    }

    fn compare_path_diversity(previous: &Snapshot, current: &Snapshot, findings: &mut Findings) {
        let (prev, curr) = (previous.unique_paths, current.unique_paths);
        if prev == 0 && curr == 0 {
            return;
        }

        findings.changes.path_diversity = Some(CountChange {
            previous: prev,
            current: curr,
        });

        if prev == 0 {
            return;
        }
        if curr as f64 > prev as f64 * PATH_FRAGMENTED_FACTOR {
            findings
                .issues
                .push("User paths becoming more fragmented".to_string());
        } else if (curr as f64) < prev as f64 * PATH_FOCUSED_FACTOR {
            findings
                .improvements
                .push("User paths becoming more focused".to_string());
        }
    }

    fn compare_errors(previous: &Snapshot, current: &Snapshot, findings: &mut Findings) {
        let (prev, curr) = (previous.error_count, current.error_count);
        if prev == 0 && curr == 0 {
            return;
        }

        findings.changes.error_count = Some(CountChange {
            previous: prev,
            current: curr,
        });

        if curr > prev {
            findings
                .issues
                .push(format!("Error events increased from {prev} to {curr}"));
        } else if curr < prev {
            findings
                .improvements
                .push(format!("Error events decreased from {prev} to {curr}"));
        }
    }
}

/// Vote margin: one side must lead by at least two findings
fn determine_trend(issues: usize, improvements: usize) -> Trend {
    if improvements > issues + 1 {
        Trend::Improving
    } else if issues > improvements + 1 {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

/// Two-decimal percentage; a zero change reports no percentage
fn nonzero_percent(value: Option<f64>) -> Option<f64> {
    value.filter(|p| *p != 0.0).map(|p| round_to(p, 2))
}

/// 0-1 fraction rendered as a one-decimal percentage
fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::empty("app-key");
        snapshot.conversion_rate = Some(0.5);
        snapshot.dropoff_rates.insert("view", 0.2);
        snapshot.dropoff_rates.insert("signup", 0.3);
        snapshot.avg_time_to_complete_ms = Some(20_000);
        snapshot.unique_paths = 10;
        snapshot.error_count = 4;
        snapshot
    }

    #[test]
    fn test_identical_snapshots_are_stable() {
        let base = snapshot();
        let diff = SnapshotComparator::compare(&base, &base);

        assert!(diff.issues.is_empty());
        assert!(diff.improvements.is_empty());
        assert_eq!(diff.overall_trend, Trend::Stable);
        assert_eq!(
            diff.metrics_changed.conversion_rate,
            Some(RateChange {
                previous: 0.5,
                current: 0.5,
                delta: 0.0,
                delta_percent: None,
            })
        );
        assert_eq!(diff.metrics_changed.dropoff_rates, None);
    }

    #[test]
    fn test_conversion_drop() {
        let previous = snapshot();
        let current = Snapshot {
            conversion_rate: Some(0.4),
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(diff.issues, vec!["Conversion rate dropped by 10.0%".to_string()]);
        assert_eq!(
            diff.metrics_changed.conversion_rate,
            Some(RateChange {
                previous: 0.5,
                current: 0.4,
                delta: -0.1,
                delta_percent: Some(-20.0),
            })
        );
        // a single issue is within the vote margin
        assert_eq!(diff.overall_trend, Trend::Stable);
    }

    #[test]
    fn test_conversion_drop_with_second_issue_degrades() {
        let previous = snapshot();
        let current = Snapshot {
            conversion_rate: Some(0.4),
            error_count: 9,
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(
            diff.issues,
            vec![
                "Conversion rate dropped by 10.0%".to_string(),
                "Error events increased from 4 to 9".to_string(),
            ]
        );
        assert_eq!(diff.overall_trend, Trend::Degrading);
    }

    #[test]
    fn test_conversion_improvement_and_zero_baseline() {
        let previous = Snapshot {
            conversion_rate: Some(0.0),
            ..Snapshot::empty("app-key")
        };
        let current = Snapshot {
            conversion_rate: Some(0.25),
            ..Snapshot::empty("app-key")
        };
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(diff.improvements, vec!["Conversion rate improved by 25.0%".to_string()]);
        assert_eq!(diff.metrics_changed.conversion_rate.unwrap().delta_percent, None);
    }

    #[test]
    fn test_conversion_needs_both_values() {
        let previous = Snapshot::empty("app-key");
        let diff = SnapshotComparator::compare(&previous, &snapshot());
        assert!(diff.metrics_changed.conversion_rate.is_none());
    }

    #[test]
    fn test_dropoff_gates() {
        let previous = snapshot();
        let mut current = snapshot();
        // +0.02: below the recording gate
        current.dropoff_rates.insert("view", 0.22);
        // +0.04: recorded but not classified
        current.dropoff_rates.insert("signup", 0.34);
        // new step: never compared
        current.dropoff_rates.insert("purchase", 0.9);
        let diff = SnapshotComparator::compare(&previous, &current);

        let changed = diff.metrics_changed.dropoff_rates.unwrap();
        let keys: Vec<&str> = changed.keys().collect();
        assert_eq!(keys, vec!["signup"]);
        assert_eq!(
            changed.get("signup"),
            Some(&StepRateChange {
                previous: 0.3,
                current: 0.34,
                delta: 0.04,
            })
        );
        assert!(diff.issues.is_empty());
        assert!(diff.improvements.is_empty());
    }

    #[test]
    fn test_dropoff_classification() {
        let previous = snapshot();
        let mut current = snapshot();
        current.dropoff_rates.insert("view", 0.3);
        current.dropoff_rates.insert("signup", 0.1);
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(diff.issues, vec!["Drop-off at 'view' increased by 10.0%".to_string()]);
        assert_eq!(
            diff.improvements,
            vec!["Drop-off at 'signup' decreased by 20.0%".to_string()]
        );
    }

    #[test]
    fn test_time_to_complete() {
        let previous = snapshot();
        let slower = Snapshot {
            avg_time_to_complete_ms: Some(26_500),
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &slower);
        assert_eq!(diff.issues, vec!["Time-to-complete increased by 6.5s".to_string()]);
        assert_eq!(
            diff.metrics_changed.time_to_complete,
            Some(DurationChange {
                previous_ms: 20_000,
                current_ms: 26_500,
                delta_ms: 6_500,
                delta_percent: Some(32.5),
            })
        );

        let faster = Snapshot {
            avg_time_to_complete_ms: Some(12_000),
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &faster);
        assert_eq!(
            diff.improvements,
            vec!["Time-to-complete decreased by 8.0s".to_string()]
        );

        // exactly at the threshold is not significant
        let edge = Snapshot {
            avg_time_to_complete_ms: Some(25_000),
            ..snapshot()
        };
        assert!(SnapshotComparator::compare(&previous, &edge).issues.is_empty());
    }

    #[test]
    fn test_extreme_time_delta_saturates() {
        let previous = Snapshot {
            avg_time_to_complete_ms: Some(i64::MIN + 1),
            ..Snapshot::empty("app-key")
        };
        let current = Snapshot {
            avg_time_to_complete_ms: Some(i64::MAX),
            ..Snapshot::empty("app-key")
        };
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(diff.metrics_changed.time_to_complete.unwrap().delta_ms, i64::MAX);
        assert_eq!(diff.issues.len(), 1);
    }

    #[test]
    fn test_path_diversity() {
        let previous = snapshot();
        let fragmented = Snapshot {
            unique_paths: 16,
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &fragmented);
        assert_eq!(diff.issues, vec!["User paths becoming more fragmented".to_string()]);
        assert_eq!(
            diff.metrics_changed.path_diversity,
            Some(CountChange {
                previous: 10,
                current: 16,
            })
        );

        let focused = Snapshot {
            unique_paths: 6,
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &focused);
        assert_eq!(diff.improvements, vec!["User paths becoming more focused".to_string()]);
    }

    #[test]
    fn test_path_diversity_from_zero_is_recorded_only() {
        let previous = Snapshot::empty("app-key");
        let current = Snapshot {
            unique_paths: 40,
            ..Snapshot::empty("app-key")
        };
        let diff = SnapshotComparator::compare(&previous, &current);

        assert!(diff.issues.is_empty());
        assert!(diff.metrics_changed.path_diversity.is_some());
    }

    #[test]
    fn test_error_count() {
        let previous = snapshot();
        let fewer = Snapshot {
            error_count: 1,
            ..snapshot()
        };
        let diff = SnapshotComparator::compare(&previous, &fewer);
        assert_eq!(diff.improvements, vec!["Error events decreased from 4 to 1".to_string()]);

        let empty = Snapshot::empty("app-key");
        let diff = SnapshotComparator::compare(&empty, &empty);
        assert!(diff.metrics_changed.is_empty());
    }

    #[test]
    fn test_improving_trend() {
        let previous = snapshot();
        let mut current = Snapshot {
            conversion_rate: Some(0.7),
            avg_time_to_complete_ms: Some(10_000),
            error_count: 0,
            ..snapshot()
        };
        current.dropoff_rates.insert("signup", 0.2);
        let diff = SnapshotComparator::compare(&previous, &current);

        assert_eq!(diff.improvements.len(), 4);
        assert_eq!(diff.overall_trend, Trend::Improving);
    }

    #[test]
    fn test_determine_trend_margin() {
        assert_eq!(determine_trend(0, 0), Trend::Stable);
        assert_eq!(determine_trend(1, 0), Trend::Stable);
        assert_eq!(determine_trend(2, 0), Trend::Degrading);
        assert_eq!(determine_trend(2, 1), Trend::Stable);
        assert_eq!(determine_trend(1, 3), Trend::Improving);
    }

    #[test]
    fn test_diff_json_shape() {
        let previous = snapshot();
        let current = Snapshot {
            conversion_rate: Some(0.4),
            ..snapshot()
        };
        let json = serde_json::to_value(SnapshotComparator::compare(&previous, &current)).unwrap();

        assert_eq!(json["overall_trend"], "stable");
        assert_eq!(json["metrics_changed"]["conversion_rate"]["delta"], -0.1);
        assert!(json["metrics_changed"].get("dropoff_rates").is_none());
        assert_eq!(json["metrics_changed"]["error_count"]["previous"], 4);
    }
}
