//! Engine configuration.
//!
//! Every field has a default, so a JSON file only needs the keys it changes:
//!
//! ```json
//! { "coverage_threshold": 0.9, "confidence": { "fuzzy_cap": 85 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ChangeSets covering a smaller fraction of spans are marked incomplete.
    pub coverage_threshold: f64,
    pub confidence: ConfidencePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.8,
            confidence: ConfidencePolicy::default(),
        }
    }
}

/// Scoring constants used when reconciling two extraction passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidencePolicy {
    /// Base score when both passes agree on kind, range and texts.
    pub agreement_base: u32,
    /// Base score for a record only one pass produced.
    pub single_pass_base: u32,
    /// Base score when both passes hit the same range but disagree on text.
    pub disagreement_base: u32,
    /// Added per consistent structural signal.
    pub signal_bonus: u32,
    pub fuzzy_cap: u32,
    pub unresolved_cap: u32,
    /// Cap for records whose citation could not be verified or was back-filled.
    pub unverified_cap: u32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            agreement_base: 90,
            single_pass_base: 75,
            disagreement_base: 75,
            signal_bonus: 1,
            fuzzy_cap: 89,
            unresolved_cap: 40,
            unverified_cap: 60,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_coverage_threshold(mut self, threshold: f64) -> Result<Self, ModelError> {
        self.coverage_threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !(0.0..=1.0).contains(&self.coverage_threshold) {
            return Err(ModelError::Config(format!(
                "coverage_threshold must be within 0..=1, got {}",
                self.coverage_threshold
            )));
        }
        let c = &self.confidence;
        // Disagreement and single-pass records must never reach HIGH.
        if c.disagreement_base >= 90 || c.single_pass_base >= 90 || c.fuzzy_cap >= 90 {
            return Err(ModelError::Config(
                "disagreement_base, single_pass_base and fuzzy_cap must stay below 90".into(),
            ));
        }
        if c.agreement_base > 100 || c.signal_bonus > 10 {
            return Err(ModelError::Config(format!(
                "agreement_base must be at most 100 and signal_bonus at most 10, got {} and {}",
                c.agreement_base, c.signal_bonus
            )));
        }
        if c.unresolved_cap >= 70 || c.unverified_cap >= 70 {
            return Err(ModelError::Config(
                "unresolved_cap and unverified_cap must stay below 70".into(),
            ));
        }
        Ok(())
    }
}
