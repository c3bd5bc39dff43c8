// ⚙️ Pipeline Configuration - JSON with defaults
//
// Every section is optional; a missing section or field takes its default.
// Call validate() before use (from_file does it for you).

use crate::error::PipelineError;
use crate::guard::ConsistencyGuard;
use crate::matching::MatchingEngine;
use crate::quality_gate::QualityGate;
use crate::resolver::MentionResolver;
use crate::scoring::{ImputationPolicy, ScoreWeights, ScoringEngine};
use crate::sectors::SectorNormalizer;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub promotion: PromotionConfig,
    pub resolver: ResolverConfig,
    pub scoring: ScoringConfig,
    pub matching: MatchingConfig,
    pub guard: GuardConfig,
    pub sectors: SectorsConfig,
    pub gate: GateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub min_distinct_sources: usize,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        PromotionConfig {
            min_distinct_sources: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub alias_max_edit_distance: usize,
    pub alias_min_key_len: usize,
    pub alias_min_token_overlap: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            alias_max_edit_distance: 2,
            alias_min_key_len: 6,
            alias_min_token_overlap: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub imputation: ImputationPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub top_k: usize,
    pub thesis_only_discount: f64,
    pub default_momentum: f64,
    pub min_total_score: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            top_k: 3,
            thesis_only_discount: 0.6,
            default_momentum: 5.0,
            min_total_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub min_match_floor: u64,
    pub max_drop_pct: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            min_match_floor: 1,
            max_drop_pct: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorsConfig {
    /// JSON synonym table; built-in taxonomy when None
    pub synonyms_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// JSON rule table; built-in rules when None
    pub rules_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load from JSON and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("malformed JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::Config(msg));

        if self.promotion.min_distinct_sources < 1 {
            return fail("promotion.min_distinct_sources must be at least 1".to_string());
        }
        if let Err(msg) = self.scoring.weights.validate() {
            return fail(format!("scoring.weights: {}", msg));
        }
        if let ImputationPolicy::Neutral { value } = self.scoring.imputation {
            if !(0.0..=100.0).contains(&value) {
                return fail(format!("scoring.imputation.value must be in [0,100], got {}", value));
            }
        }
        if self.matching.top_k < 1 {
            return fail("matching.top_k must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.matching.thesis_only_discount) {
            return fail("matching.thesis_only_discount must be in [0,1]".to_string());
        }
        if !(0.0..=10.0).contains(&self.matching.default_momentum) {
            return fail("matching.default_momentum must be in [0,10]".to_string());
        }
        if !(self.guard.max_drop_pct > 0.0 && self.guard.max_drop_pct <= 100.0) {
            return fail(format!(
                "guard.max_drop_pct must be in (0,100], got {}",
                self.guard.max_drop_pct
            ));
        }
        if !(0.0..=1.0).contains(&self.resolver.alias_min_token_overlap) {
            return fail("resolver.alias_min_token_overlap must be in [0,1]".to_string());
        }

        Ok(())
    }

    // ========================================================================
    // COMPONENT BUILDERS
    // ========================================================================

    pub fn build_normalizer(&self) -> Result<SectorNormalizer> {
        match &self.sectors.synonyms_path {
            Some(path) => SectorNormalizer::from_file(path),
            None => Ok(SectorNormalizer::with_defaults()),
        }
    }

    pub fn build_gate(&self) -> Result<QualityGate> {
        match &self.gate.rules_path {
            Some(path) => QualityGate::from_file(path),
            None => QualityGate::with_defaults(),
        }
    }

    pub fn build_resolver(&self) -> Result<MentionResolver> {
        Ok(MentionResolver::new(self.build_gate()?).with_alias_thresholds(
            self.resolver.alias_max_edit_distance,
            self.resolver.alias_min_key_len,
            self.resolver.alias_min_token_overlap,
        ))
    }

    pub fn build_scoring(&self) -> ScoringEngine {
        ScoringEngine::new(self.scoring.weights, self.scoring.imputation)
    }

    pub fn build_matching(&self) -> MatchingEngine {
        MatchingEngine::new(self.matching.top_k)
            .with_thesis_discount(self.matching.thesis_only_discount)
            .with_min_total_score(self.matching.min_total_score)
    }

    pub fn build_guard(&self) -> ConsistencyGuard {
        ConsistencyGuard::new(self.guard.min_match_floor, self.guard.max_drop_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.promotion.min_distinct_sources, 2);
        assert_eq!(config.matching.top_k, 3);
        assert_eq!(config.guard.max_drop_pct, 20.0);
        assert_eq!(config.scoring.imputation, ImputationPolicy::Neutral { value: 50.0 });
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "matching": {"top_k": 5},
                "scoring": {
                    "weights": {"team": 0.3, "traction": 0.25, "market": 0.2, "product": 0.15, "vision": 0.1},
                    "imputation": {"policy": "median"}
                }
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();

        assert_eq!(config.matching.top_k, 5);
        assert_eq!(config.matching.thesis_only_discount, 0.6);
        assert_eq!(config.scoring.weights, ScoreWeights::god());
        assert_eq!(config.scoring.imputation, ImputationPolicy::Median);
        assert_eq!(config.promotion.min_distinct_sources, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.guard.max_drop_pct = 0.0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.matching.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.scoring.weights.team = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_builders_use_settings() {
        let mut config = PipelineConfig::default();
        config.guard.min_match_floor = 10;
        config.matching.top_k = 1;

        assert_eq!(config.build_guard().min_floor, 10);
        assert_eq!(config.build_matching().top_k, 1);
        assert!(config.build_gate().is_ok());
    }
}
