//! RDM time-decay scoring.

/// Inputs to the RDM formula. Times are in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RdmInputs {
    pub tests_passed: f64,
    pub total_tests: f64,
    pub max_points: f64,
    /// Time between phase start and submission creation.
    pub elapsed_ms: f64,
    /// The tier's configured total time.
    pub tier_total_ms: f64,
}

/// Aggregate score for an RDM contest.
///
/// The decay factor is 1.0 for a submission at phase start and approaches
/// 0.3 as elapsed time grows; at exactly the tier total time it is
/// 0.3 + 0.7/11.
pub fn score(inputs: RdmInputs) -> f64 {
    let total_sq = inputs.tier_total_ms * inputs.tier_total_ms;
    let factor = 0.3 + (0.7 * total_sq) / (10.0 * inputs.elapsed_ms * inputs.elapsed_ms + total_sq);
    (inputs.tests_passed / inputs.total_tests) * inputs.max_points * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOURS_48_MS: f64 = 48.0 * 3_600_000.0;

    fn inputs(elapsed_ms: f64) -> RdmInputs {
        RdmInputs {
            tests_passed: 80.0,
            total_tests: 100.0,
            max_points: 250.0,
            elapsed_ms,
            tier_total_ms: HOURS_48_MS,
        }
    }

    #[test]
    fn submission_at_phase_start_earns_the_full_factor() {
        assert!((score(inputs(0.0)) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn submission_at_tier_total_time_earns_the_decayed_factor() {
        let expected = 0.8 * 250.0 * (0.3 + 0.7 / 11.0);
        let actual = score(inputs(HOURS_48_MS));
        assert!((actual - expected).abs() < 1e-9);
        // 72.73 after rounding to two decimals.
        assert!((actual - 72.7272).abs() < 1e-3);
    }

    #[test]
    fn factor_never_drops_below_the_floor() {
        let far_out = score(inputs(HOURS_48_MS * 1000.0));
        assert!(far_out > 0.8 * 250.0 * 0.3 - 1e-6);
        assert!(far_out < 0.8 * 250.0 * 0.31);
    }
}
