// 🗄️ Repository - Injected persistence seam
//
// Every pipeline component talks to storage through this trait, so a cycle can
// run against SQLite in production and against MemoryStore in tests.
//
// Writes are idempotent by natural key:
//   mentions  → mention hash
//   investors → normalized key (first identity kept)
//   startups  → id
//   matches   → (startup_id, investor_id)

use crate::entities::{Investor, Startup};
use crate::matching::Match;
use crate::mention::Mention;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// AUDIT EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// MATCH SWAP
// ============================================================================

/// What a commit of the staged match set did to the live set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapStats {
    /// New pairs
    pub inserted: u64,

    /// Existing pairs refreshed in place (created_at preserved)
    pub refreshed: u64,

    /// Existing pairs whose reason code or sector changed (new created_at)
    pub replaced: u64,

    /// Live pairs absent from the new set
    pub removed: u64,

    /// Live count after the swap
    pub live_count: u64,
}

/// Upsert `staged` over `live` keyed by (startup_id, investor_id)
///
/// created_at is preserved unless the pairing semantically changed
/// (different reason code or sector key). Pairs missing from `staged` are dropped.
pub fn merge_match_sets(live: &[Match], staged: &[Match]) -> (Vec<Match>, SwapStats) {
    let existing: BTreeMap<(&str, &str), &Match> = live.iter().map(|m| (m.pair(), m)).collect();
    let mut stats = SwapStats::default();
    let mut merged = Vec::with_capacity(staged.len());

    for next in staged {
        let mut row = next.clone();
        match existing.get(&next.pair()) {
            None => stats.inserted += 1,
            Some(prev) if prev.reason_code == next.reason_code && prev.sector_key == next.sector_key => {
                row.created_at = prev.created_at;
                stats.refreshed += 1;
            }
            Some(_) => stats.replaced += 1,
        }
        merged.push(row);
    }

    let staged_pairs: HashSet<(&str, &str)> = staged.iter().map(|m| m.pair()).collect();
    stats.removed = live.iter().filter(|m| !staged_pairs.contains(&m.pair())).count() as u64;
    stats.live_count = merged.len() as u64;

    (merged, stats)
}

// ============================================================================
// REPOSITORY TRAIT
// ============================================================================

pub trait Repository {
    /// Append a mention; false when the same mention hash is already stored
    fn append_mention(&self, mention: &Mention) -> Result<bool>;

    /// All mentions in insertion order
    fn all_mentions(&self) -> Result<Vec<Mention>>;

    /// Insert unless the normalized key exists; returns the stored entity
    fn ensure_investor(&self, investor: &Investor) -> Result<Investor>;

    fn all_investors(&self) -> Result<Vec<Investor>>;

    /// Insert or replace by startup id
    fn upsert_startup(&self, startup: &Startup) -> Result<()>;

    fn all_startups(&self) -> Result<Vec<Startup>>;

    fn live_matches(&self) -> Result<Vec<Match>>;

    fn live_match_count(&self) -> Result<u64>;

    /// Count recorded at the last successful commit
    fn last_known_good_count(&self) -> Result<Option<u64>>;

    /// Replace the staging area with `matches`; live rows are untouched
    fn stage_matches(&self, matches: &[Match]) -> Result<u64>;

    fn staged_count(&self) -> Result<u64>;

    fn discard_staged(&self) -> Result<()>;

    /// Atomically swap staged rows over the live set and record a snapshot
    fn commit_staged(&self, committed_at: DateTime<Utc>) -> Result<SwapStats>;

    fn record_event(&self, event: &Event) -> Result<()>;

    /// Most recent first; optionally filtered by type
    fn recent_events(&self, event_type: Option<&str>, limit: usize) -> Result<Vec<Event>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Default)]
struct MemoryState {
    mentions: Vec<Mention>,
    mention_ids: HashSet<String>,
    investors: BTreeMap<String, Investor>,
    startups: BTreeMap<String, Startup>,
    live: Vec<Match>,
    staging: Vec<Match>,
    snapshots: Vec<(DateTime<Utc>, u64)>,
    events: Vec<Event>,
}

/// Repository kept entirely in memory (tests, dry runs)
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl Repository for MemoryStore {
    fn append_mention(&self, mention: &Mention) -> Result<bool> {
        let mut state = self.state()?;
        if !state.mention_ids.insert(mention.mention_id()) {
            return Ok(false);
        }
        state.mentions.push(mention.clone());
        Ok(true)
    }

    fn all_mentions(&self) -> Result<Vec<Mention>> {
        Ok(self.state()?.mentions.clone())
    }

    fn ensure_investor(&self, investor: &Investor) -> Result<Investor> {
        let mut state = self.state()?;
        let stored = state
            .investors
            .entry(investor.normalized_key.clone())
            .or_insert_with(|| investor.clone());
        Ok(stored.clone())
    }

    fn all_investors(&self) -> Result<Vec<Investor>> {
        Ok(self.state()?.investors.values().cloned().collect())
    }

    fn upsert_startup(&self, startup: &Startup) -> Result<()> {
        self.state()?
            .startups
            .insert(startup.id.clone(), startup.clone());
        Ok(())
    }

    fn all_startups(&self) -> Result<Vec<Startup>> {
        Ok(self.state()?.startups.values().cloned().collect())
    }

    fn live_matches(&self) -> Result<Vec<Match>> {
        let mut live = self.state()?.live.clone();
        live.sort_by(|a, b| a.startup_id.cmp(&b.startup_id).then(a.rank.cmp(&b.rank)));
        Ok(live)
    }

    fn live_match_count(&self) -> Result<u64> {
        Ok(self.state()?.live.len() as u64)
    }

    fn last_known_good_count(&self) -> Result<Option<u64>> {
        Ok(self.state()?.snapshots.last().map(|(_, count)| *count))
    }

    fn stage_matches(&self, matches: &[Match]) -> Result<u64> {
        let mut state = self.state()?;
        state.staging = matches.to_vec();
        Ok(state.staging.len() as u64)
    }

    fn staged_count(&self) -> Result<u64> {
        Ok(self.state()?.staging.len() as u64)
    }

    fn discard_staged(&self) -> Result<()> {
        self.state()?.staging.clear();
        Ok(())
    }

    fn commit_staged(&self, committed_at: DateTime<Utc>) -> Result<SwapStats> {
        let mut state = self.state()?;
        let (merged, stats) = merge_match_sets(&state.live, &state.staging);
        state.live = merged;
        state.staging.clear();
        state.snapshots.push((committed_at, stats.live_count));
        Ok(stats)
    }

    fn record_event(&self, event: &Event) -> Result<()> {
        self.state()?.events.push(event.clone());
        Ok(())
    }

    fn recent_events(&self, event_type: Option<&str>, limit: usize) -> Result<Vec<Event>> {
        Ok(self
            .state()?
            .events
            .iter()
            .rev()
            .filter(|e| event_type.map(|t| e.event_type == t).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::InvestorStatus;
    use crate::matching::ReasonCode;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap()
    }

    fn m(startup: &str, investor: &str, reason: ReasonCode, created: DateTime<Utc>) -> Match {
        Match {
            startup_id: startup.to_string(),
            investor_id: investor.to_string(),
            confidence: 0.5,
            reason_code: reason,
            sector_key: "fintech".to_string(),
            rank: 1,
            hot: false,
            momentum: 5.0,
            evidence: 4.0,
            narrative: 0.0,
            created_at: created,
        }
    }

    #[test]
    fn test_merge_preserves_created_at() {
        let live = vec![m("s1", "i1", ReasonCode::CapitalVelocity, at(1))];
        let mut refreshed = m("s1", "i1", ReasonCode::CapitalVelocity, at(9));
        refreshed.confidence = 0.7;

        let (merged, stats) = merge_match_sets(&live, &[refreshed]);

        assert_eq!(merged[0].created_at, at(1));
        assert_eq!(merged[0].confidence, 0.7);
        assert_eq!(stats.refreshed, 1);
    }

    #[test]
    fn test_merge_resets_created_at_on_semantic_change() {
        let live = vec![
            m("s1", "i1", ReasonCode::CapitalVelocity, at(1)),
            m("s1", "i2", ReasonCode::CapitalVelocity, at(1)),
        ];
        let staged = vec![
            m("s1", "i1", ReasonCode::StageReadiness, at(9)),
            m("s2", "i1", ReasonCode::CapitalVelocity, at(9)),
        ];

        let (merged, stats) = merge_match_sets(&live, &staged);

        assert_eq!(merged[0].created_at, at(9));
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.live_count, 2);
    }

    #[test]
    fn test_memory_store_mentions_idempotent() {
        let store = MemoryStore::new();
        let mention = Mention::new("Accel", "src-1", at(1));

        assert!(store.append_mention(&mention).unwrap());
        assert!(!store.append_mention(&mention).unwrap());
        assert_eq!(store.all_mentions().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_keeps_first_investor_identity() {
        let store = MemoryStore::new();
        let first = Investor::new("accel", "Accel", InvestorStatus::Active, at(1));
        let second = Investor::new("accel", "Accel Partners", InvestorStatus::Active, at(2));

        store.ensure_investor(&first).unwrap();
        let stored = store.ensure_investor(&second).unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(store.all_investors().unwrap().len(), 1);
    }

    #[test]
    fn test_staging_invisible_until_commit() {
        let store = MemoryStore::new();
        store
            .stage_matches(&[m("s1", "i1", ReasonCode::CapitalVelocity, at(1))])
            .unwrap();

        assert_eq!(store.live_match_count().unwrap(), 0);
        assert_eq!(store.staged_count().unwrap(), 1);

        let stats = store.commit_staged(at(2)).unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(store.live_match_count().unwrap(), 1);
        assert_eq!(store.staged_count().unwrap(), 0);
        assert_eq!(store.last_known_good_count().unwrap(), Some(1));
    }

    #[test]
    fn test_recent_events_filter() {
        let store = MemoryStore::new();
        store
            .record_event(&Event::new("a", "x", "1", serde_json::json!({}), "test"))
            .unwrap();
        store
            .record_event(&Event::new("b", "x", "2", serde_json::json!({}), "test"))
            .unwrap();

        let only_a = store.recent_events(Some("a"), 10).unwrap();
        let all = store.recent_events(None, 10).unwrap();

        assert_eq!(only_a.len(), 1);
        assert_eq!(all[0].event_type, "b");
    }
}
