// 📝 Mention - One raw observation of a possible investor name
// Mentions are append-only. Identity for deduplication is the idempotency
// hash (source + raw text + candidate), never a generated UUID, so replaying
// the same extraction batch is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    // ========================================================================
    // CORE FIELDS (immutable once recorded)
    // ========================================================================
    /// Raw text span as extracted from the source
    pub raw_text: String,

    /// Candidate investor name extracted from the span
    pub candidate_name: String,

    /// Surrounding context snippet
    #[serde(default)]
    pub context: String,

    /// Source identifier (URL or document id)
    pub source_id: String,

    pub observed_at: DateTime<Utc>,

    // ========================================================================
    // OPTIONAL ATTRIBUTES (merged into the candidate first-write-wins)
    // ========================================================================
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sectors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Mention {
    /// Create a mention whose candidate name is the trimmed raw text
    pub fn new(
        raw_text: impl Into<String>,
        source_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let raw_text = raw_text.into();
        let candidate_name = raw_text.trim().to_string();

        Mention {
            raw_text,
            candidate_name,
            context: String::new(),
            source_id: source_id.into(),
            observed_at,
            firm: None,
            url: None,
            sectors: Vec::new(),
            stages: Vec::new(),
            description: None,
        }
    }

    pub fn with_candidate(mut self, name: impl Into<String>) -> Self {
        self.candidate_name = name.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_firm(mut self, firm: impl Into<String>) -> Self {
        self.firm = Some(firm.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_sectors(mut self, sectors: Vec<String>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Compute idempotency hash used as the natural key of the mentions table
    pub fn mention_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.raw_text.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.candidate_name.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check the record is usable at all; returns every problem found
    pub fn check_well_formed(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.raw_text.trim().is_empty() {
            problems.push("raw text is empty".to_string());
        }

        if self.candidate_name.trim().is_empty() {
            problems.push("candidate name is empty".to_string());
        }

        if self.source_id.trim().is_empty() {
            problems.push("source identifier is empty".to_string());
        }

        if self.candidate_name.chars().any(|c| c.is_control()) {
            problems.push("candidate name contains control characters".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    /// Firm present and non-blank
    pub fn firm(&self) -> Option<&str> {
        non_blank(self.firm.as_deref())
    }

    /// URL present and non-blank
    pub fn url(&self) -> Option<&str> {
        non_blank(self.url.as_deref())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalized candidate key: case-folded, punctuation stripped, whitespace collapsed
///
/// "Sequoia Capital, LLC." → "sequoia capital llc"
pub fn normalize_name_key(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn observed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_name_key() {
        assert_eq!(normalize_name_key("Sequoia Capital"), "sequoia capital");
        assert_eq!(normalize_name_key("  SEQUOIA   capital, LLC. "), "sequoia capital llc");
        assert_eq!(normalize_name_key("a16z"), "a16z");
        assert_eq!(normalize_name_key("!!! ..."), "");
    }

    #[test]
    fn test_mention_id_is_stable() {
        let m1 = Mention::new("Sequoia Capital", "https://a.example/1", observed());
        let m2 = Mention::new("Sequoia Capital", "https://a.example/1", observed());
        let m3 = Mention::new("Sequoia Capital", "https://b.example/2", observed());

        assert_eq!(m1.mention_id(), m2.mention_id());
        assert_ne!(m1.mention_id(), m3.mention_id());
        assert_eq!(m1.mention_id().len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_candidate_defaults_to_trimmed_text() {
        let m = Mention::new("  Accel Partners ", "doc-1", observed());

        assert_eq!(m.candidate_name, "Accel Partners");
    }

    #[test]
    fn test_malformed_mention_reports_problems() {
        let m = Mention::new("   ", "", observed());

        let problems = m.check_well_formed().unwrap_err();

        assert!(problems.iter().any(|p| p.contains("raw text")));
        assert!(problems.iter().any(|p| p.contains("source")));
    }

    #[test]
    fn test_blank_optional_fields_are_absent() {
        let m = Mention::new("Accel", "doc-1", observed())
            .with_firm("  ")
            .with_url("https://accel.com");

        assert_eq!(m.firm(), None);
        assert_eq!(m.url(), Some("https://accel.com"));
    }
}
