// 📊 Scoring Engine - Five components + weighted total ("GOD score")
//
// team, traction, market, product, vision ∈ [0,100]
// total = Σ weight_i · component_i, weights sum to 1
//
// Missing inputs are NEVER zero-filled. They are imputed by an explicit
// policy (neutral midpoint or population median) and reported in `imputed`.
// total is a pure function of the five components; a previously stored total
// is never read.

use crate::entities::{ComponentInputs, Startup};
use crate::sectors::{normalize_stage, SectorNormalizer};
use serde::{Deserialize, Serialize};

pub const COMPONENT_NAMES: [&str; 5] = ["team", "traction", "market", "product", "vision"];

/// Value used when nothing better is known
pub const NEUTRAL_MIDPOINT: f64 = 50.0;

// ============================================================================
// WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub team: f64,
    pub traction: f64,
    pub market: f64,
    pub product: f64,
    pub vision: f64,
}

impl ScoreWeights {
    /// 0.2 each
    pub fn equal() -> Self {
        ScoreWeights {
            team: 0.2,
            traction: 0.2,
            market: 0.2,
            product: 0.2,
            vision: 0.2,
        }
    }

    /// Domain weighting: team 30%, traction 25%, market 20%, product 15%, vision 10%
    pub fn god() -> Self {
        ScoreWeights {
            team: 0.30,
            traction: 0.25,
            market: 0.20,
            product: 0.15,
            vision: 0.10,
        }
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.team, self.traction, self.market, self.product, self.vision]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in COMPONENT_NAMES.iter().zip(self.as_array()) {
            if !(0.0..=1.0).contains(&w) {
                return Err(format!("weight '{}' must be in [0,1], got {}", name, w));
            }
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(format!("weights must sum to 1.0, got {:.6}", self.sum()));
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::equal()
    }
}

// ============================================================================
// IMPUTATION POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum ImputationPolicy {
    /// Fixed value for every missing component
    Neutral { value: f64 },

    /// Median of the known values of that component across the batch
    Median,
}

impl Default for ImputationPolicy {
    fn default() -> Self {
        ImputationPolicy::Neutral {
            value: NEUTRAL_MIDPOINT,
        }
    }
}

// ============================================================================
// SCORE CARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub team: f64,
    pub traction: f64,
    pub market: f64,
    pub product: f64,
    pub vision: f64,
    pub total: f64,

    /// Components filled by imputation
    #[serde(default)]
    pub imputed: Vec<String>,
}

impl ScoreCard {
    pub fn components(&self) -> [f64; 5] {
        [self.team, self.traction, self.market, self.product, self.vision]
    }
}

// ============================================================================
// SCORING ENGINE
// ============================================================================

pub struct ScoringEngine {
    pub weights: ScoreWeights,
    pub policy: ImputationPolicy,
}

impl ScoringEngine {
    pub fn new(weights: ScoreWeights, policy: ImputationPolicy) -> Self {
        ScoringEngine { weights, policy }
    }

    /// Score one startup on its own; Median has no population here and uses the midpoint
    pub fn score(&self, inputs: &ComponentInputs) -> ScoreCard {
        let fallback = match self.policy {
            ImputationPolicy::Neutral { value } => [value; 5],
            ImputationPolicy::Median => [NEUTRAL_MIDPOINT; 5],
        };
        self.score_with_fallback(inputs, fallback)
    }

    /// Per-component fallback values for a batch
    pub fn population_fallback(&self, startups: &[Startup]) -> [f64; 5] {
        match self.policy {
            ImputationPolicy::Neutral { value } => [value; 5],
            ImputationPolicy::Median => {
                let mut fallback = [NEUTRAL_MIDPOINT; 5];
                for (i, slot) in fallback.iter_mut().enumerate() {
                    let known: Vec<f64> = startups
                        .iter()
                        .filter_map(|s| usable(s.inputs.as_array()[i]))
                        .collect();
                    if let Some(m) = median(known) {
                        *slot = m;
                    }
                }
                fallback
            }
        }
    }

    /// Score every startup in the batch with one shared fallback
    pub fn score_batch(&self, startups: &mut [Startup]) {
        let fallback = self.population_fallback(startups);
        for startup in startups.iter_mut() {
            startup.scores = Some(self.score_with_fallback(&startup.inputs, fallback));
        }
    }

    pub fn score_with_fallback(&self, inputs: &ComponentInputs, fallback: [f64; 5]) -> ScoreCard {
        let mut values = [0.0; 5];
        let mut imputed = Vec::new();

        for (i, raw) in inputs.as_array().into_iter().enumerate() {
            values[i] = match usable(raw) {
                Some(v) => v,
                None => {
                    imputed.push(COMPONENT_NAMES[i].to_string());
                    fallback[i].clamp(0.0, 100.0)
                }
            };
        }

        let total = values
            .iter()
            .zip(self.weights.as_array())
            .map(|(v, w)| v * w)
            .sum::<f64>()
            .clamp(0.0, 100.0);

        ScoreCard {
            team: values[0],
            traction: values[1],
            market: values[2],
            product: values[3],
            vision: values[4],
            total,
            imputed,
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoreWeights::default(), ImputationPolicy::default())
    }
}

/// Normalize sector tags and stage before scoring/matching
pub fn prepare_startup(startup: &mut Startup, normalizer: &SectorNormalizer) {
    let source = if startup.raw_sectors.is_empty() {
        startup.sectors.clone()
    } else {
        startup.raw_sectors.clone()
    };
    startup.sectors = normalizer.normalize(&source);
    startup.stage = startup
        .stage
        .as_deref()
        .map(normalize_stage)
        .filter(|s| !s.is_empty());
}

/// Finite input clamped into [0,100]; NaN counts as missing
fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(|v| v.clamp(0.0, 100.0))
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

// ============================================================================
// TESTS
// ============================================================================
