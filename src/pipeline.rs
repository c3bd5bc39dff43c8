// 🔁 Pipeline - one full cycle over an injected repository
//
//   mentions ─► gate ─► resolver ─► promoter ─► investors
//   startups ─► sectors ─► scoring ─────────────┐
//   investors + scored startups ─► matching ─► guard ─► stage/swap
//
// The resolver is rebuilt each cycle by replaying the append-only mention log,
// so the outcome depends only on stored data and configuration.

use crate::config::PipelineConfig;
use crate::entities::{Investor, Startup};
use crate::error::PipelineError;
use crate::matching::SectorSignals;
use crate::mention::{normalize_name_key, Mention};
use crate::promoter::{EntityPromoter, PromotionDecision};
use crate::quality_gate::{GateContext, QualityGate, Verdict};
use crate::regenerate::{regenerate_matches, RegenerationReport};
use crate::resolver::{CandidateStatus, IngestOutcome};
use crate::scoring::prepare_startup;
use crate::sectors::SectorNormalizer;
use crate::store::{Event, Repository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

const ACTOR: &str = "pipeline";

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub recorded: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    pub candidates: usize,
    pub pending: usize,
    pub blocked: usize,
    pub promoted_new: usize,
    pub possible_aliases: usize,
    pub investors_total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub promotion: PromotionReport,
    pub startups_scored: usize,
    pub matches_generated: usize,
    pub regeneration: RegenerationReport,
}

impl CycleReport {
    pub fn summary(&self) -> String {
        format!(
            "{} candidates ({} blocked, {} new investors, {} total) | {} startups scored | {} matches → {} live",
            self.promotion.candidates,
            self.promotion.blocked,
            self.promotion.promoted_new,
            self.promotion.investors_total,
            self.startups_scored,
            self.matches_generated,
            self.regeneration.stats.live_count
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<R: Repository> {
    store: R,
    config: PipelineConfig,
    normalizer: SectorNormalizer,
    gate: QualityGate,
}

impl<R: Repository> Pipeline<R> {
    pub fn new(store: R, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let normalizer = config.build_normalizer()?;
        let gate = config.build_gate()?;

        Ok(Pipeline {
            store,
            config,
            normalizer,
            gate,
        })
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &SectorNormalizer {
        &self.normalizer
    }

    /// Append mentions to the log; malformed ones are skipped, gate rejects are audited
    pub fn ingest_mentions(&self, mentions: &[Mention]) -> Result<IngestReport, PipelineError> {
        let mut report = IngestReport::default();
        let mut promoted_keys: Option<HashSet<String>> = None;

        for mention in mentions {
            if let Err(problems) = mention.check_well_formed() {
                let reason = problems.join("; ");
                warn!(source = %mention.source_id, reason = %reason, "mention skipped");
                self.store.record_event(&Event::new(
                    "mention_skipped",
                    "mention",
                    &mention.mention_id(),
                    serde_json::json!({ "reason": reason, "source_id": mention.source_id }),
                    ACTOR,
                ))?;
                report.skipped += 1;
                continue;
            }

            if !self.store.append_mention(mention)? {
                report.duplicates += 1;
                continue;
            }
            report.recorded += 1;

            let ctx = GateContext {
                firm: mention.firm(),
                url: mention.url(),
                snippet: &mention.context,
            };
            let result = self.gate.validate(&mention.candidate_name, &ctx);
            if result.verdict == Verdict::Reject {
                report.rejected += 1;

                if promoted_keys.is_none() {
                    promoted_keys = Some(
                        self.store
                            .all_investors()?
                            .into_iter()
                            .map(|inv| inv.normalized_key)
                            .collect(),
                    );
                }
                let key = normalize_name_key(&mention.candidate_name);
                // A promoted investor stays promoted; only the mention is noted
                let event_type = match &promoted_keys {
                    Some(keys) if keys.contains(&key) => "mention_rejected",
                    _ => "candidate_blocked",
                };

                self.store.record_event(&Event::new(
                    event_type,
                    "candidate",
                    &key,
                    serde_json::json!({
                        "candidate": mention.candidate_name,
                        "source_id": mention.source_id,
                        "reasons": result.reasons,
                    }),
                    ACTOR,
                ))?;
            }
        }

        info!(
            recorded = report.recorded,
            duplicates = report.duplicates,
            skipped = report.skipped,
            rejected = report.rejected,
            "mentions ingested"
        );
        Ok(report)
    }

    /// Normalize and store startups (scores are computed during the cycle)
    pub fn import_startups(&self, startups: Vec<Startup>) -> Result<usize, PipelineError> {
        let mut count = 0;
        for mut startup in startups {
            prepare_startup(&mut startup, &self.normalizer);
            self.store.upsert_startup(&startup)?;
            count += 1;
        }
        Ok(count)
    }

    /// Replay mentions into candidates and promote whatever qualifies
    pub fn resolve_and_promote(&self, now: DateTime<Utc>) -> Result<PromotionReport, PipelineError> {
        let mut resolver = self.config.build_resolver()?;
        for mention in self.store.all_mentions()? {
            if let IngestOutcome::Skipped { reason } = resolver.ingest(&mention) {
                debug!(reason = %reason, "stored mention not resolvable");
            }
        }

        let mut promoter = EntityPromoter::new(self.config.promotion.min_distinct_sources)
            .with_existing(self.store.all_investors()?);

        let mut report = PromotionReport {
            candidates: resolver.count(),
            ..PromotionReport::default()
        };

        let keys: Vec<String> = resolver.candidates().map(|c| c.key.clone()).collect();
        for key in keys {
            let Some(candidate) = resolver.get(&key) else { continue };
            report.possible_aliases += candidate.possible_aliases.len();

            match promoter.evaluate(candidate) {
                PromotionDecision::Promote(_) => {
                    if let Some(investor) = promoter.promote(candidate, &self.normalizer, now) {
                        let stored = self.store.ensure_investor(&investor)?;
                        self.record_promotion(&stored, candidate.evidence_count())?;
                        report.promoted_new += 1;
                        resolver.mark_promoted(&key);
                    }
                }
                PromotionDecision::AlreadyPromoted => resolver.mark_promoted(&key),
                PromotionDecision::Blocked | PromotionDecision::NotYet { .. } => {}
            }
        }

        report.pending = resolver.count_by_status(CandidateStatus::Pending);
        report.blocked = resolver.count_by_status(CandidateStatus::Blocked);
        report.investors_total = promoter.promoted_count();

        info!(
            candidates = report.candidates,
            blocked = report.blocked,
            promoted = report.promoted_new,
            "resolution finished"
        );
        Ok(report)
    }

    fn record_promotion(&self, investor: &Investor, sources: usize) -> Result<(), PipelineError> {
        self.store.record_event(&Event::new(
            "entity_promoted",
            "investor",
            &investor.id,
            serde_json::json!({
                "normalized_key": investor.normalized_key,
                "status": investor.status.as_str(),
                "sources": sources,
            }),
            ACTOR,
        ))?;
        Ok(())
    }

    /// Recompute every startup's scores from its inputs
    pub fn score_startups(&self) -> Result<Vec<Startup>, PipelineError> {
        let mut startups = self.store.all_startups()?;
        for startup in startups.iter_mut() {
            prepare_startup(startup, &self.normalizer);
        }

        self.config.build_scoring().score_batch(&mut startups);
        for startup in &startups {
            self.store.upsert_startup(startup)?;
        }
        Ok(startups)
    }

    /// ingest → resolve → promote → score → match → guard → commit
    pub fn run_cycle(
        &self,
        signals: &SectorSignals,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, PipelineError> {
        let promotion = self.resolve_and_promote(now)?;
        let startups = self.score_startups()?;
        let investors = self.store.all_investors()?;

        let matches = self.config.build_matching().rank(
            &startups,
            &investors,
            signals,
            &self.normalizer,
            now,
        );
        let matches_generated = matches.len();

        let regeneration = regenerate_matches(&self.store, &self.config.build_guard(), &matches, now)?;

        let report = CycleReport {
            promotion,
            startups_scored: startups.len(),
            matches_generated,
            regeneration,
        };
        info!(summary = %report.summary(), "cycle complete");
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, day, 12, 0, 0).unwrap()
    }

    fn sequoia(source: &str) -> Mention {
        Mention::new("Sequoia Capital", source, at(1))
            .with_sectors(vec!["Fin Tech".to_string()])
            .with_context("Sequoia Capital led the seed round")
    }

    fn fintech_startup() -> Startup {
        let mut s = Startup::new("s1", "Ledgerly");
        s.raw_sectors = vec!["FinTech".to_string()];
        s.stage = Some("Seed".to_string());
        s.inputs.team = Some(70.0);
        s
    }

    fn end_to_end<R: Repository>(store: R) {
        let pipeline = Pipeline::new(store, PipelineConfig::default()).unwrap();

        let ingest = pipeline
            .ingest_mentions(&[sequoia("src-1"), sequoia("src-2"), sequoia("src-3")])
            .unwrap();
        assert_eq!(ingest.recorded, 3);
        pipeline.import_startups(vec![fintech_startup()]).unwrap();

        let first = pipeline.run_cycle(&SectorSignals::default(), at(2)).unwrap();
        let investors = pipeline.store().all_investors().unwrap();
        assert_eq!(first.promotion.promoted_new, 1);
        assert_eq!(investors.len(), 1);
        assert_eq!(investors[0].normalized_key, "sequoia capital");
        assert_eq!(investors[0].sectors, vec!["fintech"]);

        let noise = pipeline
            .ingest_mentions(&[Mention::new("and Sequoia is great", "src-4", at(3))])
            .unwrap();
        assert_eq!(noise.rejected, 1);
        let blocked = pipeline.store().recent_events(Some("candidate_blocked"), 10).unwrap();
        assert_eq!(blocked[0].entity_id, "and sequoia is great");

        let second = pipeline.run_cycle(&SectorSignals::default(), at(4)).unwrap();
        let after = pipeline.store().all_investors().unwrap();

        assert_eq!(second.promotion.promoted_new, 0);
        assert_eq!(second.promotion.blocked, 1);
        assert_eq!(after, investors, "promoted entity must not change");

        let live = pipeline.store().live_matches().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].investor_id, investors[0].id);
        assert_eq!(live[0].created_at, at(2), "unchanged pairing keeps its creation time");
    }

    #[test]
    fn test_end_to_end_sequoia_memory_store() {
        end_to_end(MemoryStore::new());
    }

    #[test]
    fn test_end_to_end_sequoia_sqlite_store() {
        end_to_end(SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_reject_on_promoted_key_not_reported_as_blocked() {
        let pipeline = Pipeline::new(MemoryStore::new(), PipelineConfig::default()).unwrap();
        let name = "Senior Partners Group";
        let backed = |source: &str| {
            Mention::new(name, source, at(1)).with_context("Senior Partners Group backed the seed round")
        };
        pipeline.ingest_mentions(&[backed("src-1"), backed("src-2")]).unwrap();
        pipeline.resolve_and_promote(at(2)).unwrap();
        assert_eq!(pipeline.store().all_investors().unwrap().len(), 1);

        // Same name, no funding context: the role rule rejects this mention
        let report = pipeline
            .ingest_mentions(&[Mention::new(name, "src-3", at(3)).with_context("met at a conference")])
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert!(pipeline.store().recent_events(Some("candidate_blocked"), 10).unwrap().is_empty());
        let noted = pipeline.store().recent_events(Some("mention_rejected"), 10).unwrap();
        assert_eq!(noted.len(), 1);
        assert_eq!(noted[0].entity_id, "senior partners group");

        pipeline.resolve_and_promote(at(4)).unwrap();
        assert_eq!(pipeline.store().all_investors().unwrap().len(), 1);
    }

    #[test]
    fn test_single_source_not_promoted() {
        let pipeline = Pipeline::new(MemoryStore::new(), PipelineConfig::default()).unwrap();
        pipeline.ingest_mentions(&[sequoia("src-1"), sequoia("src-1")]).unwrap();

        let report = pipeline.resolve_and_promote(at(2)).unwrap();

        assert_eq!(report.promoted_new, 0);
        assert_eq!(report.pending, 1);
        assert!(pipeline.store().all_investors().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_mentions_skipped_and_audited() {
        let pipeline = Pipeline::new(MemoryStore::new(), PipelineConfig::default()).unwrap();

        let report = pipeline
            .ingest_mentions(&[Mention::new("", "src-1", at(1)), sequoia("src-1")])
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.recorded, 1);
        let events = pipeline.store().recent_events(Some("mention_skipped"), 10).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_guard_trip_halts_cycle() {
        let pipeline = Pipeline::new(MemoryStore::new(), PipelineConfig::default()).unwrap();
        pipeline.ingest_mentions(&[sequoia("src-1"), sequoia("src-2")]).unwrap();
        pipeline.import_startups(vec![fintech_startup()]).unwrap();
        pipeline.run_cycle(&SectorSignals::default(), at(2)).unwrap();

        // Startup loses its sector: zero matches would replace one live match
        let mut changed = fintech_startup();
        changed.raw_sectors = vec![];
        pipeline.import_startups(vec![changed]).unwrap();

        let err = pipeline.run_cycle(&SectorSignals::default(), at(3)).unwrap_err();

        assert!(err.is_blocked());
        assert_eq!(pipeline.store().live_match_count().unwrap(), 1);
    }

    #[test]
    fn test_scores_written_back() {
        let pipeline = Pipeline::new(MemoryStore::new(), PipelineConfig::default()).unwrap();
        pipeline.import_startups(vec![fintech_startup()]).unwrap();

        let scored = pipeline.score_startups().unwrap();
        let stored = pipeline.store().all_startups().unwrap();

        assert_eq!(scored[0].total_score(), stored[0].total_score());
        assert!((stored[0].total_score().unwrap() - 54.0).abs() < 1e-9);
        assert_eq!(stored[0].sectors, vec!["fintech"]);
    }
}
