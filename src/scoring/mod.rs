//! Contest classification and score rounding.
//!
//! The scoring engine is pure: no I/O, no shared state. The dispatcher
//! fetches whatever each formula needs and calls in here.

pub mod ranking;
pub mod rdm;
pub mod test_ratio;

use crate::config::{F2fTierConfig, RdmTierConfig, ScoringConfig};

/// Which scoring formula applies to a challenge.
#[derive(Debug, PartialEq)]
pub enum ContestClass<'a> {
    /// Time-decay formula with the matched difficulty tier.
    Rdm(&'a RdmTierConfig),
    /// First-to-finish ranking formula with the matched tier.
    Ranking(&'a F2fTierConfig),
    /// Default test-pass-ratio formula.
    TestRatio,
}

/// Classifies challenges by their tags. Priority is fixed: RDM first, then
/// the F2F tiers in configured order, then the default formula. First match
/// wins regardless of tag order on the challenge.
pub struct Classifier<'a> {
    config: &'a ScoringConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, tags: &[String]) -> ContestClass<'a> {
        if tags.iter().any(|tag| self.config.rdm_tags.contains(tag)) {
            return ContestClass::Rdm(self.rdm_tier(tags));
        }
        for tier in &self.config.f2f_tiers {
            if tags.iter().any(|tag| tag == &tier.tag) {
                return ContestClass::Ranking(tier);
            }
        }
        ContestClass::TestRatio
    }

    // Tier whose tag set intersects the challenge tags; the first (lowest)
    // tier is the fallback when none matches. Config validation guarantees
    // at least one tier.
    fn rdm_tier(&self, tags: &[String]) -> &'a RdmTierConfig {
        self.config
            .rdm_tiers
            .iter()
            .find(|tier| tags.iter().any(|tag| tier.tags.contains(tag)))
            .unwrap_or(&self.config.rdm_tiers[0])
    }
}

/// Round to the configured number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
