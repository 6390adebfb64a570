//! Lockstep runtime
//!
//! Cycle-based evaluation kernel for compiled digital-logic models. The
//! per-design logic is supplied as opaque callables; this crate drives
//! them through ordered evaluation regions until signal values stabilize,
//! and re-drives them one step at a time as inputs change.

pub mod context;
pub mod error;
pub mod model;
pub mod region;
pub mod signal;
pub mod trigger;
pub mod types;

pub use context::SimContext;
pub use error::{Error, Result};
pub use model::{Model, ModelBuilder, DEFAULT_CONVERGE_LIMIT};
pub use region::{EvalContext, TriggerContext};
pub use signal::SignalState;
pub use trigger::TriggerSet;
pub use types::*;
