//! Region execution
//!
//! A region is one named phase of an evaluation step: an ordered list of
//! evaluation callables gated by a trigger set. On every entry the trigger
//! set is recomputed wholesale from current signal state; if any flag is
//! set, every callable runs in registration order.
//!
//! [`Region::converge`] wraps the trigger/execute cycle in a bounded
//! fixed-point loop. Exceeding the iteration ceiling means the compiled
//! logic contains a structural combinational cycle, which is not a
//! transient condition, so no retry is attempted.

use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::signal::SignalState;
use crate::trigger::TriggerSet;
use crate::types::{ConvergeReport, RegionId};

/// Read-only view handed to trigger conditions
///
/// Conditions must depend only on this view. They may capture their own
/// previous sample to implement edge/change detection, which is why the
/// condition type is `FnMut`.
pub struct TriggerContext<'a> {
    /// Current signal state
    pub signals: &'a SignalState,
    /// True only for the first iteration of a convergence loop
    pub first_iteration: bool,
}

/// Mutable view handed to evaluation callables
pub struct EvalContext<'a> {
    /// Signal state to read and mutate
    pub signals: &'a mut SignalState,
    deferred: &'a mut DeferredQueue,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(signals: &'a mut SignalState, deferred: &'a mut DeferredQueue) -> Self {
        Self { signals, deferred }
    }

    /// Schedule a cleanup action for the start of the next evaluation step
    pub fn defer(&mut self, action: impl FnOnce() + 'static) {
        self.deferred.defer(Box::new(action));
    }
}

/// Function that evaluates one slice of compiled logic
pub type EvalFn = Box<dyn FnMut(&mut EvalContext)>;

/// Function that recomputes one trigger condition
pub type TriggerFn = Box<dyn FnMut(&TriggerContext) -> bool>;

/// Cleanup actions gathered during evaluation, flushed at the start of
/// the next step so no deferred resource outlives one step boundary
#[derive(Default)]
pub struct DeferredQueue {
    queue: Vec<Box<dyn FnOnce()>>,
}

impl DeferredQueue {
    pub(crate) fn defer(&mut self, action: Box<dyn FnOnce()>) {
        self.queue.push(action);
    }

    /// Run and drop every pending action
    pub(crate) fn flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        trace!(pending = self.queue.len(), "flushing deferred cleanup");
        for action in self.queue.drain(..) {
            action();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

/// One trigger condition with its diagnostic description
struct Trigger {
    description: String,
    cond: TriggerFn,
}

/// A named evaluation region
pub struct Region {
    id: RegionId,
    triggers: Vec<Trigger>,
    active: TriggerSet,
    callables: Vec<EvalFn>,
}

impl Region {
    pub(crate) fn new(id: RegionId) -> Self {
        Self {
            id,
            triggers: Vec::new(),
            active: TriggerSet::new(0),
            callables: Vec::new(),
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn callable_count(&self) -> usize {
        self.callables.len()
    }

    /// Add a trigger condition; the set's cardinality is fixed once the
    /// model is built
    pub(crate) fn add_trigger(&mut self, description: impl Into<String>, cond: TriggerFn) {
        self.triggers.push(Trigger {
            description: description.into(),
            cond,
        });
        self.active = TriggerSet::new(self.triggers.len());
    }

    /// Add an evaluation callable; execution order is registration order
    pub(crate) fn add_callable(&mut self, callable: EvalFn) {
        self.callables.push(callable);
    }

    /// Recompute every trigger flag from current state
    fn recompute_triggers(&mut self, signals: &SignalState, first_iteration: bool) {
        self.active.clear();
        let ctx = TriggerContext {
            signals,
            first_iteration,
        };
        for (index, trigger) in self.triggers.iter_mut().enumerate() {
            self.active.set(index, (trigger.cond)(&ctx));
        }
    }

    /// Run every callable in registration order
    fn run(&mut self, signals: &mut SignalState, deferred: &mut DeferredQueue) {
        trace!(region = %self.id, callables = self.callables.len(), "region executing");
        let mut ctx = EvalContext::new(signals, deferred);
        for callable in &mut self.callables {
            callable(&mut ctx);
        }
    }

    /// One trigger/execute cycle: recompute the trigger set, run the
    /// region if any flag is set, report whether it ran
    pub(crate) fn phase(
        &mut self,
        signals: &mut SignalState,
        deferred: &mut DeferredQueue,
        first_iteration: bool,
    ) -> bool {
        self.recompute_triggers(signals, first_iteration);
        let execute = self.active.any();
        if execute {
            self.run(signals, deferred);
        }
        execute
    }

    /// Iterate [`Region::phase`] to a fixed point, bounded by `limit`
    ///
    /// The first iteration runs with the first-iteration flag set; the
    /// loop ends on the first phase that finds no triggers. Exceeding the
    /// ceiling reports the iteration count at which the overflow was
    /// detected (`limit + 1`).
    pub(crate) fn converge(
        &mut self,
        signals: &mut SignalState,
        deferred: &mut DeferredQueue,
        limit: u32,
    ) -> Result<ConvergeReport> {
        let mut iterations: u32 = 0;
        let mut first_iteration = true;
        loop {
            if iterations > limit {
                self.dump_triggers();
                error!(region = %self.id, iterations, "region did not converge");
                return Err(Error::NonConvergence {
                    region: self.id,
                    iterations,
                });
            }
            iterations += 1;
            let executed = self.phase(signals, deferred, first_iteration);
            first_iteration = false;
            if !executed {
                trace!(region = %self.id, iterations, "region converged");
                return Ok(ConvergeReport { iterations });
            }
        }
    }

    /// Log the still-active trigger conditions, for divergence diagnostics
    pub(crate) fn dump_triggers(&self) {
        if !self.active.any() {
            debug!(region = %self.id, "no triggers active");
            return;
        }
        for (index, trigger) in self.triggers.iter().enumerate() {
            if self.active.is_set(index) {
                debug!(
                    region = %self.id,
                    index,
                    "active trigger: {}",
                    trigger.description
                );
            }
        }
    }
}
