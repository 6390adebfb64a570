//! Kernel errors

use thiserror::Error;

use crate::types::{RegionId, SignalId};

/// Kernel result type
pub type Result<T> = std::result::Result<T, Error>;

/// Kernel errors
///
/// None of these are recoverable mid-step: a failed `eval_step` signals a
/// structural defect in the compiled design and the embedder is expected
/// to tear the model down.
#[derive(Debug, Error)]
pub enum Error {
    #[error("'{region}' region did not converge after {iterations} iterations")]
    NonConvergence { region: RegionId, iterations: u32 },

    #[error("signal not found: {0}")]
    SignalNotFound(SignalId),

    #[error("duplicate signal: {0}")]
    DuplicateSignal(SignalId),

    #[error("no delays in the design: timed event API is not available")]
    NoScheduledDelays,

    #[error("model '{0}' already finalized")]
    AlreadyFinalized(String),
}
