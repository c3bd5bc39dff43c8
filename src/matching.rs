// 🤝 Matching Engine - Ranked (startup, investor) pairs with a reason
//
// Per startup:
//   1. Candidates = investors sharing a normalized sector, or (weaker) whose
//      thesis text mentions one of the startup's sector keywords
//   2. Sub-signals in [0,10]: momentum, evidence, narrative
//   3. confidence = clamp(momentum / 10, 0, 1)
//   4. reason = dominant sub-signal (ties → momentum, then evidence)
//   5. order: hot first, confidence desc, investor id asc
//   6. keep top K
//
// Output is fully determined by the inputs; running twice yields the same list.

use crate::entities::{Investor, Startup};
use crate::sectors::SectorNormalizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Momentum at or above this marks a sector as hot
pub const HOT_THRESHOLD: f64 = 7.5;

// ============================================================================
// SECTOR SIGNALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorSignal {
    /// Recency / velocity of deal activity, 0..=10
    pub momentum: f64,
    pub hot: bool,
}

impl SectorSignal {
    pub fn from_momentum(momentum: f64) -> Self {
        let momentum = momentum.clamp(0.0, 10.0);
        SectorSignal {
            momentum,
            hot: momentum >= HOT_THRESHOLD,
        }
    }
}

/// momentum = clamp(5 + 2.5·log2((recent+1)/(prior+1)), 0, 10)
///
/// Flat activity → 5.0, doubling → 7.5 (hot), halving → 2.5
pub fn momentum_from_activity(recent_deals: u32, prior_deals: u32) -> f64 {
    let ratio = (recent_deals as f64 + 1.0) / (prior_deals as f64 + 1.0);
    (5.0 + 2.5 * ratio.log2()).clamp(0.0, 10.0)
}

#[derive(Debug, Clone)]
pub struct SectorSignals {
    signals: BTreeMap<String, SectorSignal>,
    default_momentum: f64,
}

impl SectorSignals {
    pub fn new(default_momentum: f64) -> Self {
        SectorSignals {
            signals: BTreeMap::new(),
            default_momentum: default_momentum.clamp(0.0, 10.0),
        }
    }

    pub fn set(&mut self, sector: impl Into<String>, signal: SectorSignal) {
        self.signals.insert(sector.into(), signal);
    }

    pub fn set_momentum(&mut self, sector: impl Into<String>, momentum: f64) {
        self.set(sector, SectorSignal::from_momentum(momentum));
    }

    pub fn set_activity(&mut self, sector: impl Into<String>, recent_deals: u32, prior_deals: u32) {
        self.set_momentum(sector, momentum_from_activity(recent_deals, prior_deals));
    }

    /// Unknown sectors get the default momentum and are never hot
    pub fn get(&self, sector: &str) -> SectorSignal {
        self.signals.get(sector).copied().unwrap_or(SectorSignal {
            momentum: self.default_momentum,
            hot: false,
        })
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl Default for SectorSignals {
    fn default() -> Self {
        Self::new(5.0)
    }
}

// ============================================================================
// REASON CODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Momentum dominates
    CapitalVelocity,

    /// Evidence dominates
    StageReadiness,

    /// Narrative dominates
    ThesisConvergence,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::CapitalVelocity => "Capital velocity",
            ReasonCode::StageReadiness => "Stage readiness",
            ReasonCode::ThesisConvergence => "Thesis convergence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Capital velocity" => Some(ReasonCode::CapitalVelocity),
            "Stage readiness" => Some(ReasonCode::StageReadiness),
            "Thesis convergence" => Some(ReasonCode::ThesisConvergence),
            _ => None,
        }
    }

    /// Dominant sub-signal; ties go to momentum, then evidence
    pub fn dominant(momentum: f64, evidence: f64, narrative: f64) -> Self {
        if momentum >= evidence && momentum >= narrative {
            ReasonCode::CapitalVelocity
        } else if evidence >= narrative {
            ReasonCode::StageReadiness
        } else {
            ReasonCode::ThesisConvergence
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub startup_id: String,
    pub investor_id: String,

    /// 0..=1
    pub confidence: f64,

    pub reason_code: ReasonCode,

    /// Sector that carried the pairing
    pub sector_key: String,

    /// 1-based position within the startup's list
    pub rank: u32,

    pub hot: bool,

    pub momentum: f64,
    pub evidence: f64,
    pub narrative: f64,

    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn pair(&self) -> (&str, &str) {
        (&self.startup_id, &self.investor_id)
    }
}

// ============================================================================
// MATCHING ENGINE
// ============================================================================

pub struct MatchingEngine {
    /// Max matches per startup (default: 3)
    pub top_k: usize,

    /// Momentum multiplier when only thesis text qualified the pair (default: 0.6)
    pub thesis_only_discount: f64,

    /// Startups below this total are not matched (default: 0)
    pub min_total_score: f64,
}

/// Scored pair before ranking
struct Scored<'a> {
    investor: &'a Investor,
    sector_key: String,
    momentum: f64,
    evidence: f64,
    narrative: f64,
    confidence: f64,
    hot: bool,
}

impl MatchingEngine {
    pub fn new(top_k: usize) -> Self {
        MatchingEngine {
            top_k,
            thesis_only_discount: 0.6,
            min_total_score: 0.0,
        }
    }

    pub fn with_thesis_discount(mut self, discount: f64) -> Self {
        self.thesis_only_discount = discount;
        self
    }

    pub fn with_min_total_score(mut self, min_total: f64) -> Self {
        self.min_total_score = min_total;
        self
    }

    /// Rank investors for every startup
    ///
    /// Startups are visited by total score desc then id; duplicate ids (startup
    /// or investor) are ignored after the first occurrence.
    pub fn rank(
        &self,
        startups: &[Startup],
        investors: &[Investor],
        signals: &SectorSignals,
        normalizer: &SectorNormalizer,
        generated_at: DateTime<Utc>,
    ) -> Vec<Match> {
        let mut seen_investors = HashSet::new();
        let investors: Vec<&Investor> = investors
            .iter()
            .filter(|inv| seen_investors.insert(inv.id.as_str()))
            .collect();

        let mut seen_startups = HashSet::new();
        let mut ordered: Vec<&Startup> = startups
            .iter()
            .filter(|s| seen_startups.insert(s.id.as_str()))
            .filter(|s| s.total_score().unwrap_or(0.0) >= self.min_total_score)
            .collect();
        ordered.sort_by(|a, b| {
            let ta = a.total_score().unwrap_or(0.0);
            let tb = b.total_score().unwrap_or(0.0);
            tb.total_cmp(&ta).then_with(|| a.id.cmp(&b.id))
        });

        let mut matches = Vec::new();
        for startup in ordered {
            matches.extend(self.rank_for_startup(
                startup,
                &investors,
                signals,
                normalizer,
                generated_at,
            ));
        }
        matches
    }

    /// Top-K investors for one startup (empty when nothing qualifies)
    pub fn rank_for_startup(
        &self,
        startup: &Startup,
        investors: &[&Investor],
        signals: &SectorSignals,
        normalizer: &SectorNormalizer,
        generated_at: DateTime<Utc>,
    ) -> Vec<Match> {
        if startup.sectors.is_empty() || self.top_k == 0 {
            return Vec::new();
        }

        let keywords: Vec<Vec<String>> = startup
            .sectors
            .iter()
            .map(|s| normalizer.keywords_for(s))
            .collect();

        let mut scored: Vec<Scored> = investors
            .iter()
            .filter_map(|inv| self.score_pair(startup, *inv, &keywords, signals))
            .collect();

        scored.sort_by(|a, b| {
            b.hot
                .cmp(&a.hot)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.investor.id.cmp(&b.investor.id))
        });

        scored
            .into_iter()
            .take(self.top_k)
            .enumerate()
            .map(|(i, s)| Match {
                startup_id: startup.id.clone(),
                investor_id: s.investor.id.clone(),
                confidence: s.confidence,
                reason_code: ReasonCode::dominant(s.momentum, s.evidence, s.narrative),
                sector_key: s.sector_key,
                rank: i as u32 + 1,
                hot: s.hot,
                momentum: s.momentum,
                evidence: s.evidence,
                narrative: s.narrative,
                created_at: generated_at,
            })
            .collect()
    }

    fn score_pair<'a>(
        &self,
        startup: &Startup,
        investor: &'a Investor,
        keywords: &[Vec<String>],
        signals: &SectorSignals,
    ) -> Option<Scored<'a>> {
        let thesis = investor.thesis_text();

        // Sector indices present in the investor's thesis text
        let thesis_hits: Vec<usize> = keywords
            .iter()
            .enumerate()
            .filter(|(_, kws)| kws.iter().any(|kw| contains_term(&thesis, kw)))
            .map(|(i, _)| i)
            .collect();

        let shared: Vec<usize> = startup
            .sectors
            .iter()
            .enumerate()
            .filter(|(_, s)| investor.sectors.contains(*s))
            .map(|(i, _)| i)
            .collect();

        let thesis_only = shared.is_empty();
        let qualifying = if thesis_only { &thesis_hits } else { &shared };
        if qualifying.is_empty() {
            return None;
        }

        // Strongest qualifying sector; first in startup order wins ties
        let mut best = qualifying[0];
        for &i in qualifying.iter().skip(1) {
            if signals.get(&startup.sectors[i]).momentum > signals.get(&startup.sectors[best]).momentum {
                best = i;
            }
        }
        let sector_key = startup.sectors[best].clone();
        let signal = signals.get(&sector_key);

        let mut momentum = signal.momentum;
        if thesis_only {
            momentum *= self.thesis_only_discount;
        }
        let momentum = momentum.clamp(0.0, 10.0);

        let stage_fit = match (&startup.stage, investor.stages.is_empty()) {
            (_, true) | (None, false) => 0.5,
            (Some(stage), false) if investor.invests_at(stage) => 1.0,
            _ => 0.0,
        };
        let sector_share = shared.len() as f64 / startup.sectors.len() as f64;
        let support = investor.evidence_count.min(5) as f64 / 5.0;
        let evidence = (4.0 * sector_share + 3.0 * stage_fit + 3.0 * support).clamp(0.0, 10.0);

        let narrative = 10.0 * thesis_hits.len() as f64 / startup.sectors.len() as f64;

        Some(Scored {
            investor,
            sector_key,
            momentum,
            evidence,
            narrative,
            confidence: (momentum / 10.0).clamp(0.0, 1.0),
            hot: signal.hot,
        })
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Whole-word (or whole-phrase) containment; `text` and `term` are lowercase
fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(pos) = text[start..].find(term) {
        let begin = start + pos;
        let end = begin + term.len();
        let before_ok = begin == 0 || !bytes[begin - 1].is_ascii_alphanumeric();
        let after_ok = end == text.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
        start = end;
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::InvestorStatus;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
    }

    fn investor(id: &str, sectors: &[&str], stages: &[&str]) -> Investor {
        let mut inv = Investor::new(id, id, InvestorStatus::Active, at());
        inv.id = id.to_string();
        inv.sectors = sectors.iter().map(|s| s.to_string()).collect();
        inv.stages = stages.iter().map(|s| s.to_string()).collect();
        inv.evidence_count = 3;
        inv
    }

    fn startup(id: &str, sectors: &[&str], total: f64) -> Startup {
        let mut s = Startup::new(id, id);
        s.sectors = sectors.iter().map(|x| x.to_string()).collect();
        s.stage = Some("seed".to_string());
        s.scores = Some(crate::scoring::ScoreCard {
            team: total,
            traction: total,
            market: total,
            product: total,
            vision: total,
            total,
            imputed: vec![],
        });
        s
    }

    #[test]
    fn test_momentum_from_activity() {
        assert!((momentum_from_activity(3, 3) - 5.0).abs() < 1e-9);
        assert!((momentum_from_activity(3, 1) - 7.5).abs() < 1e-9);
        assert_eq!(momentum_from_activity(10_000, 0), 10.0);
        assert_eq!(momentum_from_activity(0, 10_000), 0.0);
        assert!(SectorSignal::from_momentum(7.5).hot);
    }

    #[test]
    fn test_unknown_sector_uses_default() {
        let signals = SectorSignals::new(4.0);

        let s = signals.get("quantum computing");

        assert_eq!(s.momentum, 4.0);
        assert!(!s.hot);
    }

    #[test]
    fn test_reason_code_tie_breaks() {
        assert_eq!(ReasonCode::dominant(5.0, 5.0, 5.0), ReasonCode::CapitalVelocity);
        assert_eq!(ReasonCode::dominant(4.0, 6.0, 6.0), ReasonCode::StageReadiness);
        assert_eq!(ReasonCode::dominant(4.0, 5.0, 6.0), ReasonCode::ThesisConvergence);
        assert_eq!(ReasonCode::CapitalVelocity.to_string(), "Capital velocity");
    }

    #[test]
    fn test_top_k_and_no_duplicate_pairs() {
        let engine = MatchingEngine::new(2);
        let startups = vec![startup("s1", &["fintech"], 70.0), startup("s1", &["fintech"], 70.0)];
        let investors = vec![
            investor("i1", &["fintech"], &["seed"]),
            investor("i2", &["fintech"], &[]),
            investor("i3", &["fintech"], &["seriesb"]),
            investor("i1", &["fintech"], &["seed"]),
        ];

        let matches = engine.rank(
            &startups,
            &investors,
            &SectorSignals::default(),
            &SectorNormalizer::default(),
            at(),
        );

        assert_eq!(matches.len(), 2);
        let pairs: HashSet<(&str, &str)> = matches.iter().map(|m| m.pair()).collect();
        assert_eq!(pairs.len(), matches.len());
        assert_eq!(matches[0].rank, 1);
        assert_eq!(matches[1].rank, 2);
    }

    #[test]
    fn test_ranking_is_reproducible() {
        let engine = MatchingEngine::default();
        let startups = vec![
            startup("s2", &["ai", "saas"], 40.0),
            startup("s1", &["fintech"], 80.0),
        ];
        let investors = vec![
            investor("i3", &["ai"], &["seed"]),
            investor("i1", &["fintech", "ai"], &[]),
            investor("i2", &["saas"], &["seed"]),
        ];
        let mut signals = SectorSignals::default();
        signals.set_momentum("ai", 9.0);

        let first = engine.rank(&startups, &investors, &signals, &SectorNormalizer::default(), at());
        let second = engine.rank(&startups, &investors, &signals, &SectorNormalizer::default(), at());

        assert_eq!(first, second);
        // Higher total first
        assert_eq!(first[0].startup_id, "s1");
    }

    #[test]
    fn test_hot_before_confidence_then_id() {
        let engine = MatchingEngine::default();
        let startups = vec![startup("s1", &["ai", "fintech"], 60.0)];
        let investors = vec![
            investor("b", &["fintech"], &["seed"]),
            investor("a", &["fintech"], &["seed"]),
            investor("c", &["ai"], &["seed"]),
        ];
        let mut signals = SectorSignals::default();
        signals.set(
            "ai",
            SectorSignal {
                momentum: 6.0,
                hot: true,
            },
        );
        signals.set(
            "fintech",
            SectorSignal {
                momentum: 9.0,
                hot: false,
            },
        );

        let matches = engine.rank(&startups, &investors, &signals, &SectorNormalizer::default(), at());

        let order: Vec<&str> = matches.iter().map(|m| m.investor_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert!((matches[1].confidence - 0.9).abs() < 1e-9);
        assert_eq!(matches[1].reason_code, ReasonCode::CapitalVelocity);
    }

    #[test]
    fn test_thesis_only_is_weaker() {
        let engine = MatchingEngine::default();
        let startups = vec![startup("s1", &["fintech"], 60.0)];
        let mut thesis = investor("t", &[], &["seed"]);
        thesis.description = Some("We back payments infrastructure".to_string());
        let direct = investor("d", &["fintech"], &["seed"]);

        let matches = engine.rank(
            &startups,
            &[thesis, direct],
            &SectorSignals::default(),
            &SectorNormalizer::default(),
            at(),
        );

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].investor_id, "d");
        assert!((matches[1].confidence - 0.3).abs() < 1e-9);
        assert_eq!(matches[1].sector_key, "fintech");
    }

    #[test]
    fn test_zero_qualifying_investors_is_empty() {
        let engine = MatchingEngine::default();
        let startups = vec![startup("s1", &["proptech"], 60.0)];
        let investors = vec![investor("i1", &["fintech"], &[])];

        let matches = engine.rank(
            &startups,
            &investors,
            &SectorSignals::default(),
            &SectorNormalizer::default(),
            at(),
        );

        assert!(matches.is_empty());
    }

    #[test]
    fn test_min_total_score_filters_startups() {
        let engine = MatchingEngine::default().with_min_total_score(50.0);
        let startups = vec![startup("low", &["ai"], 30.0), startup("high", &["ai"], 70.0)];
        let investors = vec![investor("i1", &["ai"], &[])];

        let matches = engine.rank(
            &startups,
            &investors,
            &SectorSignals::default(),
            &SectorNormalizer::default(),
            at(),
        );

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].startup_id, "high");
    }

    #[test]
    fn test_contains_term_whole_word() {
        assert!(contains_term("we back ml teams", "ml"));
        assert!(!contains_term("html tooling", "ml"));
        assert!(contains_term("digital health, b2b", "digital health"));
    }
}
