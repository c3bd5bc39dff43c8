// 🚀 Startup Entity - Record to be scored and matched
// Sectors are normalized on the way in; scores stay None until computed.

use crate::scoring::ScoreCard;
use serde::{Deserialize, Serialize};

/// Raw component inputs from enrichment; None means "unknown", never zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentInputs {
    pub team: Option<f64>,
    pub traction: Option<f64>,
    pub market: Option<f64>,
    pub product: Option<f64>,
    pub vision: Option<f64>,
}

impl ComponentInputs {
    pub fn as_array(&self) -> [Option<f64>; 5] {
        [self.team, self.traction, self.market, self.product, self.vision]
    }

    pub fn missing_count(&self) -> usize {
        self.as_array().iter().filter(|v| v.is_none()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Startup {
    pub id: String,

    pub name: String,

    /// Tags as received, kept for audit
    #[serde(default)]
    pub raw_sectors: Vec<String>,

    /// Taxonomy-normalized, at most 3
    #[serde(default)]
    pub sectors: Vec<String>,

    /// Normalized stage token
    pub stage: Option<String>,

    #[serde(default)]
    pub inputs: ComponentInputs,

    /// Computed scores (None until the scoring engine runs)
    #[serde(default)]
    pub scores: Option<ScoreCard>,
}

impl Startup {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Startup {
            id: id.into(),
            name: name.into(),
            raw_sectors: Vec::new(),
            sectors: Vec::new(),
            stage: None,
            inputs: ComponentInputs::default(),
            scores: None,
        }
    }

    pub fn total_score(&self) -> Option<f64> {
        self.scores.as_ref().map(|s| s.total)
    }
}
