// ⬆️ Entity Promoter - Candidate → canonical Investor
//
// Promotion criteria (all required):
//   1. candidate not blocked
//   2. verdict = accept, or quarantine with firm AND url on file
//   3. distinct sources ≥ min_distinct_sources (default: 2)
//
// Idempotent: promoting an already-promoted key returns the existing entity.
// Failing candidates stay pending; they never time out here.

use crate::entities::{Investor, InvestorStatus};
use crate::quality_gate::Verdict;
use crate::resolver::CandidateEntity;
use crate::sectors::{normalize_stage, SectorNormalizer};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionDecision {
    Promote(InvestorStatus),
    AlreadyPromoted,
    Blocked,
    NotYet { reason: String },
}

pub struct EntityPromoter {
    /// Distinct sources required (default: 2)
    pub min_distinct_sources: usize,

    /// normalized key → promoted entity
    promoted: HashMap<String, Investor>,
}

impl EntityPromoter {
    pub fn new(min_distinct_sources: usize) -> Self {
        EntityPromoter {
            min_distinct_sources,
            promoted: HashMap::new(),
        }
    }

    /// Seed with entities promoted in earlier cycles
    pub fn with_existing(mut self, investors: Vec<Investor>) -> Self {
        for investor in investors {
            self.promoted
                .entry(investor.normalized_key.clone())
                .or_insert(investor);
        }
        self
    }

    /// Decide without side effects
    pub fn evaluate(&self, candidate: &CandidateEntity) -> PromotionDecision {
        if self.promoted.contains_key(&candidate.key) {
            return PromotionDecision::AlreadyPromoted;
        }

        if candidate.is_blocked() {
            return PromotionDecision::Blocked;
        }

        let status = match candidate.verdict {
            Verdict::Accept => InvestorStatus::Active,
            Verdict::Quarantine if candidate.has_firm_and_url() => InvestorStatus::Quarantined,
            Verdict::Quarantine => {
                return PromotionDecision::NotYet {
                    reason: "quarantined without firm and url".to_string(),
                }
            }
            Verdict::Reject => return PromotionDecision::Blocked,
        };

        if candidate.evidence_count() < self.min_distinct_sources {
            return PromotionDecision::NotYet {
                reason: format!(
                    "{} of {} distinct sources",
                    candidate.evidence_count(),
                    self.min_distinct_sources
                ),
            };
        }

        PromotionDecision::Promote(status)
    }

    /// Promote if criteria hold; returns the (new or existing) entity
    pub fn promote(
        &mut self,
        candidate: &CandidateEntity,
        normalizer: &SectorNormalizer,
        now: DateTime<Utc>,
    ) -> Option<Investor> {
        match self.evaluate(candidate) {
            PromotionDecision::AlreadyPromoted => self.promoted.get(&candidate.key).cloned(),
            PromotionDecision::Promote(status) => {
                let investor = build_investor(candidate, status, normalizer, now);
                info!(
                    key = %candidate.key,
                    id = %investor.id,
                    status = investor.status.as_str(),
                    sources = candidate.evidence_count(),
                    "candidate promoted"
                );
                self.promoted.insert(candidate.key.clone(), investor.clone());
                Some(investor)
            }
            PromotionDecision::Blocked | PromotionDecision::NotYet { .. } => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Investor> {
        self.promoted.get(key)
    }

    pub fn promoted_count(&self) -> usize {
        self.promoted.len()
    }
}

impl Default for EntityPromoter {
    fn default() -> Self {
        Self::new(2)
    }
}

fn build_investor(
    candidate: &CandidateEntity,
    status: InvestorStatus,
    normalizer: &SectorNormalizer,
    now: DateTime<Utc>,
) -> Investor {
    let attrs = &candidate.attributes;
    let mut investor = Investor::new(&candidate.key, &candidate.display_name, status, now);

    investor.firm = attrs.firm.clone();
    investor.url = attrs.url.clone();
    investor.description = attrs.description.clone();
    investor.sectors = normalizer.normalize(&attrs.sectors);

    for stage in attrs.stages.iter().map(|s| normalize_stage(s)) {
        if !stage.is_empty() && !investor.stages.contains(&stage) {
            investor.stages.push(stage);
        }
    }

    investor.evidence_count = candidate.evidence_count() as u32;
    investor.aliases = candidate
        .aliases
        .iter()
        .filter(|a| **a != candidate.display_name)
        .cloned()
        .collect();

    investor
}

// ============================================================================
// TESTS
// ============================================================================
