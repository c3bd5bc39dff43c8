// ❗ Pipeline errors a caller must branch on
// Everything else travels as anyhow::Error inside `Store`.

use crate::guard::GuardVerdict;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Consistency guard tripped; nothing was written to the live match set
    #[error("regeneration blocked: {0}")]
    Blocked(GuardVerdict),

    #[error("duplicate match pair ({startup_id}, {investor_id}) in regenerated set")]
    DuplicatePair {
        startup_id: String,
        investor_id: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, PipelineError::Blocked(_))
    }
}
