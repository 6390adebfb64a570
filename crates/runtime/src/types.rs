//! Core kernel types
//!
//! These types describe the evaluation model at runtime. They are
//! populated by the embedder when the model is built and never change
//! afterwards.

use std::fmt;

/// Unique identifier for a signal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub String);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SignalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Named evaluation regions in execution order
///
/// One evaluation step visits `ico` (input/combinational), then the
/// `act`/`nba` pair. `stl` (settle) runs only once, during lazy
/// initialization, to reach a self-consistent starting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionId {
    /// Input/combinational region, converged at the start of every step
    Ico,
    /// Settle region, converged once during initialization
    Stl,
    /// Active region
    Act,
    /// Non-blocking-assignment region
    Nba,
}

impl RegionId {
    /// Short tag used in diagnostics
    pub fn tag(&self) -> &'static str {
        match self {
            RegionId::Ico => "ico",
            RegionId::Stl => "stl",
            RegionId::Act => "act",
            RegionId::Nba => "nba",
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Fill policy applied to a signal before the first evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// Zero fill
    #[default]
    Zero,
    /// Random fill from the context's seeded RNG
    Randomize,
}

/// Outcome of a bounded convergence loop that reached a fixed point
///
/// A loop that exceeds its ceiling reports through
/// [`Error::NonConvergence`](crate::Error::NonConvergence) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergeReport {
    /// Number of `phase` invocations performed
    pub iterations: u32,
}
