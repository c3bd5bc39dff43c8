// 🔗 Mention Resolver - Cluster raw mentions into candidate entities
//
// Auto-merge happens ONLY on exact normalized-key match. Near-duplicates
// ("Sequoia Capital" vs "Sequoia") stay separate and are flagged as possible
// aliases for external review.
//
// Merge policy per field: first write wins. A later, noisier mention never
// overwrites firm / url / description / sectors / stages already on file.
// Aliases and sources are set unions.

use crate::mention::{non_blank, normalize_name_key, Mention};
use crate::quality_gate::{GateContext, QualityGate, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Tokens ignored when comparing names for alias overlap
const GENERIC_FIRM_TOKENS: &[&str] = &[
    "capital", "ventures", "venture", "partners", "partner", "fund", "funds", "management",
    "group", "holdings", "investments", "vc", "llc", "lp", "inc", "the", "and",
];

// ============================================================================
// CANDIDATE ENTITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Pending,
    /// Gate rejected a mention; no further promotion attempts
    Blocked,
    Promoted,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Blocked => "blocked",
            CandidateStatus::Promoted => "promoted",
        }
    }
}

/// Attributes merged from mentions (first write wins per field)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateAttributes {
    pub firm: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub sectors: Vec<String>,
    pub stages: Vec<String>,
}

impl CandidateAttributes {
    fn merge_from(&mut self, mention: &Mention) {
        fill_if_absent(&mut self.firm, mention.firm());
        fill_if_absent(&mut self.url, mention.url());
        fill_if_absent(&mut self.description, non_blank(mention.description.as_deref()));

        if self.sectors.is_empty() {
            self.sectors = non_blank_list(&mention.sectors);
        }
        if self.stages.is_empty() {
            self.stages = non_blank_list(&mention.stages);
        }
    }
}

fn fill_if_absent(slot: &mut Option<String>, value: Option<&str>) {
    if slot.is_none() {
        *slot = value.map(|v| v.to_string());
    }
}

fn non_blank_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Normalized key (cluster identity)
    pub key: String,

    /// Name as first observed
    pub display_name: String,

    /// Every distinct raw spelling seen for this key
    pub aliases: BTreeSet<String>,

    /// Distinct source identifiers (evidence)
    pub sources: BTreeSet<String>,

    pub mention_ids: Vec<String>,

    pub attributes: CandidateAttributes,

    pub verdict: Verdict,

    /// Gate reasons from the most recent evaluation
    pub reasons: Vec<String>,

    pub status: CandidateStatus,

    /// Other candidate keys that look like the same firm
    pub possible_aliases: BTreeSet<String>,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CandidateEntity {
    fn new(key: String, mention: &Mention) -> Self {
        CandidateEntity {
            key,
            display_name: mention.candidate_name.trim().to_string(),
            aliases: BTreeSet::new(),
            sources: BTreeSet::new(),
            mention_ids: Vec::new(),
            attributes: CandidateAttributes::default(),
            verdict: Verdict::Accept,
            reasons: Vec::new(),
            status: CandidateStatus::Pending,
            possible_aliases: BTreeSet::new(),
            first_seen: mention.observed_at,
            last_seen: mention.observed_at,
        }
    }

    /// Number of distinct sources
    pub fn evidence_count(&self) -> usize {
        self.sources.len()
    }

    pub fn is_blocked(&self) -> bool {
        self.status == CandidateStatus::Blocked
    }

    pub fn has_firm_and_url(&self) -> bool {
        self.attributes.firm.is_some() && self.attributes.url.is_some()
    }
}

// ============================================================================
// INGEST OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Mention attached to a candidate
    Recorded {
        key: String,
        verdict: Verdict,
        new_candidate: bool,
        possible_aliases: Vec<String>,
    },

    /// Exact same mention already ingested
    Duplicate { key: String },

    /// Malformed input; never fatal
    Skipped { reason: String },
}

impl IngestOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            IngestOutcome::Recorded { key, .. } | IngestOutcome::Duplicate { key } => Some(key),
            IngestOutcome::Skipped { .. } => None,
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct MentionResolver {
    gate: QualityGate,

    candidates: BTreeMap<String, CandidateEntity>,

    /// Mention idempotency hashes already ingested
    seen: HashSet<String>,

    /// Max char edit distance for alias flagging (default: 2)
    pub alias_max_edit_distance: usize,

    /// Both keys must be at least this long for edit-distance flagging (default: 6)
    pub alias_min_key_len: usize,

    /// Min token Jaccard after dropping generic firm words (default: 0.5)
    pub alias_min_token_overlap: f64,
}

impl MentionResolver {
    pub fn new(gate: QualityGate) -> Self {
        MentionResolver {
            gate,
            candidates: BTreeMap::new(),
            seen: HashSet::new(),
            alias_max_edit_distance: 2,
            alias_min_key_len: 6,
            alias_min_token_overlap: 0.5,
        }
    }

    pub fn with_alias_thresholds(
        mut self,
        max_edit_distance: usize,
        min_key_len: usize,
        min_token_overlap: f64,
    ) -> Self {
        self.alias_max_edit_distance = max_edit_distance;
        self.alias_min_key_len = min_key_len;
        self.alias_min_token_overlap = min_token_overlap;
        self
    }

    /// Ingest one mention: dedupe, cluster by key, merge, gate
    pub fn ingest(&mut self, mention: &Mention) -> IngestOutcome {
        if let Err(problems) = mention.check_well_formed() {
            return IngestOutcome::Skipped {
                reason: problems.join("; "),
            };
        }

        let key = normalize_name_key(&mention.candidate_name);
        if key.is_empty() {
            return IngestOutcome::Skipped {
                reason: "candidate name is empty after normalization".to_string(),
            };
        }

        let mention_id = mention.mention_id();
        if !self.seen.insert(mention_id.clone()) {
            return IngestOutcome::Duplicate { key };
        }

        let new_candidate = !self.candidates.contains_key(&key);
        let possible_aliases = if new_candidate {
            self.flag_aliases(&key)
        } else {
            Vec::new()
        };

        let candidate = self
            .candidates
            .entry(key.clone())
            .or_insert_with(|| CandidateEntity::new(key.clone(), mention));

        candidate.aliases.insert(mention.candidate_name.trim().to_string());
        candidate.sources.insert(mention.source_id.trim().to_string());
        candidate.mention_ids.push(mention_id);
        candidate.attributes.merge_from(mention);
        candidate.possible_aliases.extend(possible_aliases.iter().cloned());
        candidate.first_seen = candidate.first_seen.min(mention.observed_at);
        candidate.last_seen = candidate.last_seen.max(mention.observed_at);

        let ctx = GateContext {
            firm: mention.firm().or(candidate.attributes.firm.as_deref()),
            url: mention.url().or(candidate.attributes.url.as_deref()),
            snippet: &mention.context,
        };
        let result = self.gate.validate(&mention.candidate_name, &ctx);

        match (result.verdict, candidate.status) {
            (Verdict::Reject, CandidateStatus::Pending) => {
                info!(key = %key, reasons = ?result.reasons, "candidate blocked by quality gate");
                candidate.status = CandidateStatus::Blocked;
                candidate.verdict = Verdict::Reject;
            }
            (_, CandidateStatus::Blocked) => {}
            (verdict, _) => candidate.verdict = verdict,
        }
        candidate.reasons = result.reasons;

        debug!(key = %key, sources = candidate.evidence_count(), "mention recorded");

        IngestOutcome::Recorded {
            key,
            verdict: result.verdict,
            new_candidate,
            possible_aliases,
        }
    }

    /// Compare a new key against every existing key; link both sides
    fn flag_aliases(&mut self, key: &str) -> Vec<String> {
        let flagged: Vec<String> = self
            .candidates
            .keys()
            .filter(|other| self.looks_like_alias(key, other))
            .cloned()
            .collect();

        for other in &flagged {
            if let Some(candidate) = self.candidates.get_mut(other) {
                candidate.possible_aliases.insert(key.to_string());
            }
        }

        flagged
    }

    /// Near-duplicate test between two distinct normalized keys
    pub fn looks_like_alias(&self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }

        let long_enough = a.chars().count() >= self.alias_min_key_len
            && b.chars().count() >= self.alias_min_key_len;
        if long_enough && levenshtein_distance(a, b) <= self.alias_max_edit_distance {
            return true;
        }

        let ta = distinctive_tokens(a);
        let tb = distinctive_tokens(b);
        if ta.is_empty() || tb.is_empty() {
            return false;
        }

        if ta.is_subset(&tb) || tb.is_subset(&ta) {
            return true;
        }

        let shared = ta.intersection(&tb).count() as f64;
        let union = ta.union(&tb).count() as f64;
        shared / union >= self.alias_min_token_overlap
    }

    /// Record that the promoter turned this candidate into an entity
    pub fn mark_promoted(&mut self, key: &str) {
        if let Some(candidate) = self.candidates.get_mut(key) {
            if candidate.status == CandidateStatus::Pending {
                candidate.status = CandidateStatus::Promoted;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&CandidateEntity> {
        self.candidates.get(key)
    }

    /// All candidates in key order
    pub fn candidates(&self) -> impl Iterator<Item = &CandidateEntity> {
        self.candidates.values()
    }

    pub fn count(&self) -> usize {
        self.candidates.len()
    }

    pub fn count_by_status(&self, status: CandidateStatus) -> usize {
        self.candidates.values().filter(|c| c.status == status).count()
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn distinctive_tokens(key: &str) -> BTreeSet<&str> {
    key.split_whitespace()
        .filter(|t| !GENERIC_FIRM_TOKENS.contains(t))
        .collect()
}

/// Levenshtein distance over characters
///
/// levenshtein_distance("sequoia", "sequioa") = 2
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

// ============================================================================
// TESTS
// ============================================================================
