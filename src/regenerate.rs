// 🔄 Match Regeneration - stage, check, swap
//
//   1. reject duplicate pairs
//   2. guard pre-flight: new count vs last known-good snapshot
//   3. write the complete new set to staging
//   4. guard pre-commit: staged count vs live count
//   5. one atomic upsert-swap over the live set
//
// Truncate-then-repopulate never happens. A trip at step 2 writes nothing; a
// trip at step 4 discards staging and leaves the live set untouched.

use crate::error::PipelineError;
use crate::guard::{ConsistencyGuard, GuardVerdict};
use crate::matching::Match;
use crate::store::{Event, Repository, SwapStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

const ACTOR: &str = "match_regenerator";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub preflight: GuardVerdict,
    pub precommit: GuardVerdict,
    pub stats: SwapStats,
}

/// First (startup, investor) pair that appears twice, if any
pub fn find_duplicate_pair(matches: &[Match]) -> Option<(String, String)> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .find(|m| !seen.insert(m.pair()))
        .map(|m| (m.startup_id.clone(), m.investor_id.clone()))
}

pub fn regenerate_matches<R: Repository + ?Sized>(
    store: &R,
    guard: &ConsistencyGuard,
    matches: &[Match],
    now: DateTime<Utc>,
) -> Result<RegenerationReport, PipelineError> {
    if let Some((startup_id, investor_id)) = find_duplicate_pair(matches) {
        return Err(PipelineError::DuplicatePair {
            startup_id,
            investor_id,
        });
    }

    let new_count = matches.len() as u64;

    // Pre-flight against last known-good snapshot (fall back to live rows)
    let live_count = store.live_match_count()?;
    let known_good = match store.last_known_good_count()? {
        Some(count) => Some(count),
        None if live_count > 0 => Some(live_count),
        None => None,
    };
    let preflight = guard.check_safe(new_count, known_good);
    if !preflight.safe {
        return Err(trip(store, "preflight", preflight)?);
    }

    store.stage_matches(matches)?;

    let staged = store.staged_count()?;
    let precommit = guard.check_safe(staged, Some(store.live_match_count()?));
    if !precommit.safe {
        store.discard_staged()?;
        return Err(trip(store, "precommit", precommit)?);
    }

    let stats = store.commit_staged(now)?;
    info!(
        inserted = stats.inserted,
        refreshed = stats.refreshed,
        replaced = stats.replaced,
        removed = stats.removed,
        live = stats.live_count,
        "match set committed"
    );

    store.record_event(&Event::new(
        "matches_committed",
        "match_set",
        &now.to_rfc3339(),
        serde_json::to_value(&stats).map_err(anyhow::Error::from)?,
        ACTOR,
    ))?;

    Ok(RegenerationReport {
        preflight,
        precommit,
        stats,
    })
}

/// Record the trip and build the blocking error
fn trip<R: Repository + ?Sized>(
    store: &R,
    phase: &str,
    verdict: GuardVerdict,
) -> Result<PipelineError, PipelineError> {
    warn!(phase, current = verdict.current, prior = ?verdict.prior, "consistency guard tripped");

    store.record_event(&Event::new(
        "guard_tripped",
        "match_set",
        phase,
        serde_json::json!({
            "phase": phase,
            "current": verdict.current,
            "prior": verdict.prior,
            "drop_pct": verdict.drop_pct,
            "message": verdict.message,
        }),
        ACTOR,
    ))?;

    Ok(PipelineError::Blocked(verdict))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::matching::ReasonCode;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, 0, 0, 0).unwrap()
    }

    fn matches(n: usize) -> Vec<Match> {
        (0..n)
            .map(|i| Match {
                startup_id: format!("s{}", i),
                investor_id: "i1".to_string(),
                confidence: 0.5,
                reason_code: ReasonCode::CapitalVelocity,
                sector_key: "ai".to_string(),
                rank: 1,
                hot: false,
                momentum: 5.0,
                evidence: 2.0,
                narrative: 0.0,
                created_at: at(1),
            })
            .collect()
    }

    #[test]
    fn test_first_regeneration_commits() {
        let store = MemoryStore::new();

        let report = regenerate_matches(&store, &ConsistencyGuard::default(), &matches(10), at(1)).unwrap();

        assert_eq!(report.stats.inserted, 10);
        assert_eq!(store.live_match_count().unwrap(), 10);
        assert_eq!(store.recent_events(Some("matches_committed"), 5).unwrap().len(), 1);
    }

    #[test]
    fn test_large_drop_blocked_and_live_untouched() {
        let store = SqliteStore::open_in_memory().unwrap();
        let guard = ConsistencyGuard::default();
        regenerate_matches(&store, &guard, &matches(100), at(1)).unwrap();

        let err = regenerate_matches(&store, &guard, &matches(40), at(2)).unwrap_err();

        assert!(err.is_blocked());
        assert_eq!(store.live_match_count().unwrap(), 100);
        assert_eq!(store.staged_count().unwrap(), 0);
        assert_eq!(store.recent_events(Some("guard_tripped"), 5).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_set_blocked_by_floor() {
        let store = MemoryStore::new();

        let err = regenerate_matches(&store, &ConsistencyGuard::default(), &[], at(1)).unwrap_err();

        assert!(matches!(err, PipelineError::Blocked(ref v) if v.current == 0));
    }

    #[test]
    fn test_duplicate_pair_rejected_before_staging() {
        let store = MemoryStore::new();
        let mut set = matches(3);
        set.push(set[0].clone());

        let err = regenerate_matches(&store, &ConsistencyGuard::default(), &set, at(1)).unwrap_err();

        assert!(matches!(err, PipelineError::DuplicatePair { .. }));
        assert_eq!(store.staged_count().unwrap(), 0);
    }

    #[test]
    fn test_small_drop_allowed() {
        let store = MemoryStore::new();
        let guard = ConsistencyGuard::default();
        regenerate_matches(&store, &guard, &matches(100), at(1)).unwrap();

        let report = regenerate_matches(&store, &guard, &matches(85), at(2)).unwrap();

        assert_eq!(report.stats.removed, 15);
        assert_eq!(report.stats.refreshed, 85);
        assert_eq!(store.last_known_good_count().unwrap(), Some(85));
    }
}
