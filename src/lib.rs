// Matchmaker - Core Library
// Investor resolution, startup scoring and guarded match regeneration.
// Exposes all modules for use in the batch runner, API server and tests.

pub mod sectors;
pub mod mention;
pub mod quality_gate;
pub mod extract;
pub mod resolver;
pub mod entities;
pub mod promoter;
pub mod scoring;
pub mod matching;
pub mod guard;
pub mod store;
pub mod db;
pub mod regenerate;
pub mod import;
pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use sectors::{normalize_stage, SectorDefinition, SectorNormalizer, MAX_SECTORS};
pub use mention::{normalize_name_key, Mention};
pub use quality_gate::{
    GateContext, GateResult, GateRule, GateSummary, QualityGate, RuleMatcher, RuleStrength,
    Verdict,
};
pub use extract::{CandidateExtractor, ExtractedCandidate, ExtractionPattern};
pub use resolver::{
    levenshtein_distance, CandidateAttributes, CandidateEntity, CandidateStatus, IngestOutcome,
    MentionResolver,
};
pub use entities::{CheckSize, ComponentInputs, Investor, InvestorStatus, Startup};
pub use promoter::{EntityPromoter, PromotionDecision};
pub use scoring::{prepare_startup, ImputationPolicy, ScoreCard, ScoreWeights, ScoringEngine};
pub use matching::{Match, MatchingEngine, ReasonCode, SectorSignal, SectorSignals};
pub use guard::{ConsistencyGuard, GuardVerdict};
pub use store::{Event, MemoryStore, Repository, SwapStats};
pub use db::{setup_database, SqliteStore};
pub use regenerate::{regenerate_matches, RegenerationReport};
pub use import::{load_mentions, load_signals, load_startups, ImportReport};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{CycleReport, IngestReport, Pipeline, PromotionReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
