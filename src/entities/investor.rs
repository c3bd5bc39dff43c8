// 💼 Investor Entity - Canonical, trusted investor record
//
// "Name is a VALUE, normalized key + UUID is IDENTITY"
//
// Created only by the EntityPromoter once promotion criteria hold.
// Identity (id, normalized_key) never changes after creation; descriptive
// fields may be enriched later by collaborators outside the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INVESTOR STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestorStatus {
    /// Promoted from a clean (accepted) candidate
    Active,

    /// Promoted from a quarantined candidate that carried firm + url
    Quarantined,
}

impl InvestorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestorStatus::Active => "active",
            InvestorStatus::Quarantined => "quarantined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(InvestorStatus::Active),
            "quarantined" => Some(InvestorStatus::Quarantined),
            _ => None,
        }
    }
}

/// Typical cheque size in USD
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckSize {
    pub min_usd: Option<f64>,
    pub max_usd: Option<f64>,
}

// ============================================================================
// INVESTOR ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investor {
    // ========================================================================
    // IDENTITY (never changes)
    // ========================================================================
    pub id: String,

    /// Unique natural key (case-folded, punctuation stripped)
    pub normalized_key: String,

    // ========================================================================
    // VALUES
    // ========================================================================
    pub name: String,

    pub firm: Option<String>,

    pub url: Option<String>,

    pub description: Option<String>,

    /// Taxonomy-normalized, at most 3
    pub sectors: Vec<String>,

    /// Normalized stage tokens ("seed", "seriesa")
    pub stages: Vec<String>,

    #[serde(default)]
    pub check_size: CheckSize,

    pub status: InvestorStatus,

    /// Distinct sources at promotion time
    pub evidence_count: u32,

    #[serde(default)]
    pub aliases: Vec<String>,

    pub promoted_at: DateTime<Utc>,
}

impl Investor {
    pub fn new(
        normalized_key: impl Into<String>,
        name: impl Into<String>,
        status: InvestorStatus,
        promoted_at: DateTime<Utc>,
    ) -> Self {
        Investor {
            id: uuid::Uuid::new_v4().to_string(),
            normalized_key: normalized_key.into(),
            name: name.into(),
            firm: None,
            url: None,
            description: None,
            sectors: Vec::new(),
            stages: Vec::new(),
            check_size: CheckSize::default(),
            status,
            evidence_count: 0,
            aliases: Vec::new(),
            promoted_at,
        }
    }

    /// Does this investor list the given (normalized) stage?
    pub fn invests_at(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s == stage)
    }

    /// Text searched for thesis keywords: description plus firm name
    pub fn thesis_text(&self) -> String {
        let mut text = String::new();
        if let Some(desc) = &self.description {
            text.push_str(desc);
        }
        if let Some(firm) = &self.firm {
            text.push(' ');
            text.push_str(firm);
        }
        text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_investor_identity() {
        let a = Investor::new("accel", "Accel", InvestorStatus::Active, Utc::now());
        let b = Investor::new("accel", "Accel", InvestorStatus::Active, Utc::now());

        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
        assert_eq!(a.status.as_str(), "active");
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [InvestorStatus::Active, InvestorStatus::Quarantined] {
            assert_eq!(InvestorStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvestorStatus::parse("deleted"), None);
    }

    #[test]
    fn test_thesis_text() {
        let mut inv = Investor::new("x", "X", InvestorStatus::Active, Utc::now());
        inv.description = Some("We back Fintech founders".to_string());
        inv.firm = Some("X Capital".to_string());

        assert_eq!(inv.thesis_text(), "we back fintech founders x capital");
    }
}
