//! Default test-pass-ratio scoring.

use serde_json::Value;

/// Pass/total counts extracted from review metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCounts {
    pub passed: f64,
    pub total: f64,
}

/// Counts for the default formula. The review must carry a `tests` block at
/// all; metadata reporting only `assertions` takes the zero outcome instead.
pub fn default_counts(metadata: Option<&Value>) -> Option<TestCounts> {
    metadata?.get("tests")?;
    extract_counts(metadata)
}

/// Pull test counts out of review metadata. `assertions` is preferred over
/// `tests`; an explicit `passed` count wins over the derived
/// `total - pending - failed`.
pub fn extract_counts(metadata: Option<&Value>) -> Option<TestCounts> {
    let tests = metadata?
        .get("assertions")
        .or_else(|| metadata?.get("tests"))?;
    let total = tests.get("total").and_then(Value::as_f64)?;
    let passed = match tests.get("passed").and_then(Value::as_f64) {
        Some(passed) => passed,
        None => {
            let pending = tests.get("pending").and_then(Value::as_f64).unwrap_or(0.0);
            let failed = tests.get("failed").and_then(Value::as_f64).unwrap_or(0.0);
            total - pending - failed
        }
    };
    Some(TestCounts { passed, total })
}

/// Score for the default formula, rounded to exactly 3 decimal places. The
/// precision here is fixed, independent of the configured score decimals
/// used by the other formulas.
pub fn score(counts: TestCounts, time_left_ms: f64, total_time_ms: f64, time_weight: f64) -> f64 {
    let ratio = if counts.total > 0.0 {
        counts.passed / counts.total
    } else {
        0.0
    };
    let aggregate = if ratio > 0.0 {
        (ratio * 100.0) + (time_left_ms / total_time_ms) * time_weight
    } else {
        0.0
    };
    (aggregate * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_passed_scores_zero_regardless_of_time() {
        let counts = TestCounts {
            passed: 0.0,
            total: 10.0,
        };
        assert_eq!(score(counts, 100_000.0, 100_000.0, 30.0), 0.0);
    }

    #[test]
    fn full_pass_at_phase_start_scores_hundred_plus_weight() {
        let counts = TestCounts {
            passed: 10.0,
            total: 10.0,
        };
        assert_eq!(score(counts, 86_400_000.0, 86_400_000.0, 30.0), 130.0);
    }

    #[test]
    fn score_rounds_to_three_decimals() {
        let counts = TestCounts {
            passed: 1.0,
            total: 3.0,
        };
        // 33.3333... + (1/3) * 30 = 43.3333... -> 43.333
        assert_eq!(score(counts, 1.0, 3.0, 30.0), 43.333);
    }

    #[test]
    fn assertions_take_precedence_over_tests() {
        let metadata = json!({
            "assertions": { "total": 10, "passed": 7 },
            "tests": { "total": 4, "passed": 1 }
        });
        assert_eq!(
            extract_counts(Some(&metadata)),
            Some(TestCounts {
                passed: 7.0,
                total: 10.0
            })
        );
    }

    #[test]
    fn passed_is_derived_when_absent() {
        let metadata = json!({
            "tests": { "total": 12, "pending": 2, "failed": 3 }
        });
        assert_eq!(
            extract_counts(Some(&metadata)),
            Some(TestCounts {
                passed: 7.0,
                total: 12.0
            })
        );
    }

    #[test]
    fn default_counts_require_a_tests_block() {
        let assertions_only = json!({ "assertions": { "total": 4, "passed": 2 } });
        assert_eq!(default_counts(Some(&assertions_only)), None);

        // Once a tests block exists, extraction still prefers assertions.
        let with_tests = json!({
            "assertions": { "total": 10, "passed": 7 },
            "tests": { "total": 4, "passed": 1 }
        });
        assert_eq!(
            default_counts(Some(&with_tests)),
            Some(TestCounts {
                passed: 7.0,
                total: 10.0
            })
        );
    }

    #[test]
    fn metadata_without_counts_yields_none() {
        assert_eq!(extract_counts(None), None);
        assert_eq!(extract_counts(Some(&json!({ "notes": "ok" }))), None);
        assert_eq!(
            extract_counts(Some(&json!({ "tests": { "passed": 3 } }))),
            None
        );
    }
}
