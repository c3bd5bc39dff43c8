// 🏷️ Sector Taxonomy - Closed vocabulary of canonical sector tags
// Freeform tags ("Fin Tech", "machine learning", "E-Commerce") → canonical keys
//
// normalize() is pure and idempotent:
//   normalize(normalize(x)) == normalize(x)
// Canonical keys always map to themselves, and unmapped tags pass through
// lower-cased and trimmed, so a second pass finds exactly the same entries.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Maximum number of sectors kept on a startup or investor
pub const MAX_SECTORS: usize = 3;

// ============================================================================
// SYNONYM TABLE (configuration data)
// ============================================================================

/// One canonical sector and the freeform variants that map onto it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorDefinition {
    pub key: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

fn default_taxonomy() -> Vec<SectorDefinition> {
    let table: [(&str, &[&str]); 12] = [
        (
            "ai",
            &["artificial intelligence", "machine learning", "ml", "deep learning", "generative ai"],
        ),
        (
            "fintech",
            &["fin tech", "financial technology", "payments", "banking", "insurtech", "neobank"],
        ),
        (
            "healthtech",
            &["health tech", "digital health", "healthcare", "medtech", "biotech"],
        ),
        ("saas", &["software", "b2b software", "enterprise software", "cloud"]),
        ("ecommerce", &["e-commerce", "retail", "marketplace", "dtc", "d2c"]),
        ("edtech", &["education technology", "ed-tech", "learning"]),
        ("proptech", &["real estate tech", "property technology"]),
        (
            "cleantech",
            &["clean technology", "climate tech", "climate", "sustainability", "greentech"],
        ),
        ("logistics", &["supply chain", "shipping", "delivery", "fulfillment"]),
        ("cybersecurity", &["security", "infosec", "information security"]),
        ("crypto", &["web3", "blockchain", "defi"]),
        ("consumer", &["consumer apps", "b2c"]),
    ];

    table
        .iter()
        .map(|(key, synonyms)| SectorDefinition {
            key: key.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        })
        .collect()
}

// ============================================================================
// SECTOR NORMALIZER
// ============================================================================

pub struct SectorNormalizer {
    /// variant (cleaned) → canonical key
    lookup: HashMap<String, String>,

    /// compact variant (no spaces/hyphens) → canonical key
    compact_lookup: HashMap<String, String>,

    /// canonical key → synonyms, ordered for stable keyword lists
    definitions: BTreeMap<String, Vec<String>>,
}

impl SectorNormalizer {
    /// Build normalizer from an explicit synonym table
    pub fn from_definitions(definitions: Vec<SectorDefinition>) -> Self {
        let mut normalizer = SectorNormalizer {
            lookup: HashMap::new(),
            compact_lookup: HashMap::new(),
            definitions: BTreeMap::new(),
        };

        let definitions: Vec<(String, Vec<String>)> = definitions
            .into_iter()
            .map(|def| (clean_tag(&def.key), def.synonyms))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        // Canonical keys map to themselves before any synonym is registered,
        // so a key listed as another sector's synonym stays canonical.
        for (key, _) in &definitions {
            normalizer.insert_variant(key, key);
        }

        for (key, synonyms) in definitions {
            for synonym in &synonyms {
                normalizer.insert_variant(synonym, &key);
            }

            normalizer
                .definitions
                .entry(key)
                .or_default()
                .extend(synonyms.iter().map(|s| clean_tag(s)));
        }

        normalizer
    }

    /// Built-in taxonomy
    pub fn with_defaults() -> Self {
        Self::from_definitions(default_taxonomy())
    }

    /// Load synonym table from JSON file (array of {key, synonyms})
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read sector table: {:?}", path.as_ref()))?;

        let definitions: Vec<SectorDefinition> =
            serde_json::from_str(&content).context("Failed to parse sector table JSON")?;

        Ok(Self::from_definitions(definitions))
    }

    fn insert_variant(&mut self, variant: &str, key: &str) {
        let cleaned = clean_tag(variant);
        if cleaned.is_empty() {
            return;
        }
        // First definition wins on collisions
        self.compact_lookup
            .entry(compact(&cleaned))
            .or_insert_with(|| key.to_string());
        self.lookup.entry(cleaned).or_insert_with(|| key.to_string());
    }

    /// Map a single tag to its canonical key (None for empty tags)
    pub fn canonicalize(&self, raw: &str) -> Option<String> {
        let cleaned = clean_tag(raw);
        if cleaned.is_empty() {
            return None;
        }

        if let Some(key) = self.lookup.get(&cleaned) {
            return Some(key.clone());
        }
        if let Some(key) = self.compact_lookup.get(&compact(&cleaned)) {
            return Some(key.clone());
        }

        Some(cleaned)
    }

    /// Normalize a list of raw tags: map, deduplicate (first occurrence wins), cap at 3
    pub fn normalize<S: AsRef<str>>(&self, raw_tags: &[S]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();

        for tag in raw_tags {
            if out.len() >= MAX_SECTORS {
                break;
            }
            if let Some(key) = self.canonicalize(tag.as_ref()) {
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }

        out
    }

    /// Is this a key of the closed taxonomy?
    pub fn is_canonical(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    /// Canonical key plus every synonym, used for free-text thesis matching
    pub fn keywords_for(&self, key: &str) -> Vec<String> {
        let mut keywords = vec![key.to_string()];
        if let Some(synonyms) = self.definitions.get(key) {
            keywords.extend(synonyms.iter().cloned());
        }
        keywords
    }

    pub fn sector_count(&self) -> usize {
        self.definitions.len()
    }
}

impl Default for SectorNormalizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Lowercase, trim, collapse internal whitespace
fn clean_tag(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, ' ' | '-' | '_')).collect()
}

/// Normalize a funding stage for comparison
///
/// "Series A" → "seriesa", "pre-seed" → "preseed"
pub fn normalize_stage(stage: &str) -> String {
    stage
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
