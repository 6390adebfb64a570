//! Model facade
//!
//! [`Model`] is the externally visible handle for one compiled logic
//! model: it owns the signal state, the four evaluation regions, and the
//! step state machine. The first call to [`Model::eval_step`] performs
//! one-time initialization (static elaboration, initial-value assignment,
//! settle convergence); every call, including the first, advances the
//! model by exactly one evaluation.
//!
//! Models are assembled through [`ModelBuilder`], which registers the
//! per-design signals, callables, and trigger conditions once at model
//! definition time.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, trace};

use crate::context::SimContext;
use crate::error::{Error, Result};
use crate::region::{DeferredQueue, EvalContext, EvalFn, Region, TriggerFn};
use crate::signal::SignalState;
use crate::types::{RegionId, ResetPolicy, SignalId};

/// Default iteration ceiling for every convergence loop
pub const DEFAULT_CONVERGE_LIMIT: u32 = 100;

/// Builder for a [`Model`]
///
/// The set of signals, callables, and triggers is closed once `build`
/// is called; nothing is registered at runtime.
pub struct ModelBuilder {
    name: String,
    model_name: String,
    context: Arc<SimContext>,
    signals: SignalState,
    duplicate: Option<SignalId>,
    static_fns: Vec<EvalFn>,
    initial_fns: Vec<EvalFn>,
    final_fns: Vec<EvalFn>,
    ico: Region,
    stl: Region,
    act: Region,
    nba: Region,
    converge_limit: u32,
}

impl ModelBuilder {
    pub fn new(context: Arc<SimContext>, name: impl Into<String>) -> Self {
        let name = name.into();

        // The settle and input/combinational regions always carry the
        // implicit first-iteration trigger at index 0
        let mut stl = Region::new(RegionId::Stl);
        stl.add_trigger(
            "internal 'stl' trigger - first iteration",
            Box::new(|ctx| ctx.first_iteration),
        );
        let mut ico = Region::new(RegionId::Ico);
        ico.add_trigger(
            "internal 'ico' trigger - first iteration",
            Box::new(|ctx| ctx.first_iteration),
        );

        Self {
            model_name: name.clone(),
            name,
            context,
            signals: SignalState::default(),
            duplicate: None,
            static_fns: Vec::new(),
            initial_fns: Vec::new(),
            final_fns: Vec::new(),
            ico,
            stl,
            act: Region::new(RegionId::Act),
            nba: Region::new(RegionId::Nba),
            converge_limit: DEFAULT_CONVERGE_LIMIT,
        }
    }

    /// Override the design name reported by [`Model::model_name`]
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Declare a zero-reset signal of the given width
    pub fn signal(self, id: impl Into<SignalId>, width: u32) -> Self {
        self.signal_with_reset(id, width, ResetPolicy::Zero)
    }

    /// Declare a signal with an explicit reset policy
    pub fn signal_with_reset(
        mut self,
        id: impl Into<SignalId>,
        width: u32,
        reset: ResetPolicy,
    ) -> Self {
        let id = id.into();
        if !self.signals.declare(id.clone(), width, reset) && self.duplicate.is_none() {
            self.duplicate = Some(id);
        }
        self
    }

    /// Register a static-elaboration callable (runs once, before initial
    /// assignment)
    pub fn static_init(mut self, f: impl FnMut(&mut EvalContext) + 'static) -> Self {
        self.static_fns.push(Box::new(f));
        self
    }

    /// Register an initial-value callable (runs once, before settle)
    pub fn initial(mut self, f: impl FnMut(&mut EvalContext) + 'static) -> Self {
        self.initial_fns.push(Box::new(f));
        self
    }

    /// Register an end-of-simulation callable (runs on [`Model::finalize`])
    pub fn on_final(mut self, f: impl FnMut(&mut EvalContext) + 'static) -> Self {
        self.final_fns.push(Box::new(f));
        self
    }

    /// Register an evaluation callable with a region; execution order is
    /// registration order
    pub fn callable(mut self, region: RegionId, f: impl FnMut(&mut EvalContext) + 'static) -> Self {
        self.region_mut(region).add_callable(Box::new(f));
        self
    }

    /// Register a trigger condition with a region
    pub fn trigger(
        mut self,
        region: RegionId,
        description: impl Into<String>,
        cond: impl FnMut(&crate::region::TriggerContext) -> bool + 'static,
    ) -> Self {
        self.region_mut(region)
            .add_trigger(description, Box::new(cond) as TriggerFn);
        self
    }

    /// Override the convergence iteration ceiling
    pub fn converge_limit(mut self, limit: u32) -> Self {
        self.converge_limit = limit;
        self
    }

    fn region_mut(&mut self, region: RegionId) -> &mut Region {
        match region {
            RegionId::Ico => &mut self.ico,
            RegionId::Stl => &mut self.stl,
            RegionId::Act => &mut self.act,
            RegionId::Nba => &mut self.nba,
        }
    }

    /// Finish the definition, reset signals, and produce the model
    pub fn build(self) -> Result<Model> {
        if let Some(id) = self.duplicate {
            return Err(Error::DuplicateSignal(id));
        }

        let mut signals = self.signals;
        signals.reset(&mut self.context.reset_rng());

        info!(
            model = %self.name,
            signals = signals.len(),
            act_callables = self.act.callable_count(),
            "model built"
        );

        Ok(Model {
            name: self.name,
            model_name: self.model_name,
            context: self.context,
            signals,
            static_fns: self.static_fns,
            initial_fns: self.initial_fns,
            final_fns: self.final_fns,
            ico: self.ico,
            stl: self.stl,
            act: self.act,
            nba: self.nba,
            deferred: DeferredQueue::default(),
            did_init: false,
            finalized: false,
            steps: 0,
            converge_limit: self.converge_limit,
        })
    }
}

/// One compiled logic model instance
///
/// Single-threaded by contract: a model must never be evaluated from two
/// threads at once. Distinct instances share nothing and may be driven
/// from distinct threads.
pub struct Model {
    name: String,
    model_name: String,
    context: Arc<SimContext>,
    signals: SignalState,
    static_fns: Vec<EvalFn>,
    initial_fns: Vec<EvalFn>,
    final_fns: Vec<EvalFn>,
    ico: Region,
    stl: Region,
    act: Region,
    nba: Region,
    deferred: DeferredQueue,
    did_init: bool,
    finalized: bool,
    steps: u64,
    converge_limit: u32,
}

impl Model {
    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Design name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn context(&self) -> &Arc<SimContext> {
        &self.context
    }

    /// Whether one-time initialization has run
    pub fn did_init(&self) -> bool {
        self.did_init
    }

    /// Number of completed evaluation steps
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Read a signal's current value
    pub fn get_signal(&self, id: &SignalId) -> Option<u64> {
        self.signals.get(id)
    }

    /// Drive a signal from outside, between evaluation steps
    pub fn set_signal(&mut self, id: &SignalId, value: u64) -> Result<()> {
        if self.signals.set(id, value) {
            Ok(())
        } else {
            Err(Error::SignalNotFound(id.clone()))
        }
    }

    /// This variant declares zero simulated delay; there is never a
    /// pending timed event
    pub fn events_pending(&self) -> bool {
        false
    }

    /// Timed-event lookahead is not available on a delay-free model
    pub fn next_time_slot(&self) -> Result<u64> {
        Err(Error::NoScheduledDelays)
    }

    /// Advance the model by exactly one evaluation
    ///
    /// Flushes deferred cleanup, performs one-time initialization on the
    /// first call, then evaluates the input/combinational region and the
    /// active/non-blocking-assignment pair.
    #[instrument(skip(self), fields(model = %self.name, step = self.steps))]
    pub fn eval_step(&mut self) -> Result<()> {
        trace!("eval step");
        self.deferred.flush();

        if !self.did_init {
            self.did_init = true;
            debug!("initial");
            Self::run_fns(&mut self.static_fns, &mut self.signals, &mut self.deferred);
            Self::run_fns(&mut self.initial_fns, &mut self.signals, &mut self.deferred);
            let report =
                self.stl
                    .converge(&mut self.signals, &mut self.deferred, self.converge_limit)?;
            debug!(iterations = report.iterations, "settle converged");
        }

        debug!("eval");
        self.ico
            .converge(&mut self.signals, &mut self.deferred, self.converge_limit)?;

        // The active region re-converges after every non-blocking-
        // assignment execution; the outer loop carries its own ceiling
        let mut iterations: u32 = 0;
        loop {
            if iterations > self.converge_limit {
                self.nba.dump_triggers();
                error!(region = %RegionId::Nba, iterations, "region did not converge");
                return Err(Error::NonConvergence {
                    region: RegionId::Nba,
                    iterations,
                });
            }
            iterations += 1;
            self.act
                .converge(&mut self.signals, &mut self.deferred, self.converge_limit)?;
            if !self.nba.phase(&mut self.signals, &mut self.deferred, false) {
                break;
            }
        }

        self.steps += 1;
        trace!("eval step complete");
        Ok(())
    }

    /// Run end-of-simulation callables; single-call contract
    #[instrument(skip(self), fields(model = %self.name))]
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(Error::AlreadyFinalized(self.name.clone()));
        }
        self.finalized = true;
        info!("finalizing");
        Self::run_fns(&mut self.final_fns, &mut self.signals, &mut self.deferred);
        // End of life: nothing deferred may outlive the model
        self.deferred.flush();
        Ok(())
    }

    fn run_fns(fns: &mut [EvalFn], signals: &mut SignalState, deferred: &mut DeferredQueue) {
        let mut ctx = EvalContext::new(signals, deferred);
        for f in fns {
            f(&mut ctx);
        }
    }

    #[cfg(test)]
    fn pending_cleanup(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context() -> Arc<SimContext> {
        Arc::new(SimContext::new())
    }

    /// Trigger that fires whenever the watched signal differs from the
    /// last sample (including the very first sample)
    fn change_detect(watch: &str) -> impl FnMut(&crate::region::TriggerContext) -> bool {
        let id: SignalId = watch.into();
        let mut prev: Option<u64> = None;
        move |ctx| {
            let now = ctx.signals.get(&id);
            let fired = prev != now;
            prev = now;
            fired
        }
    }

    #[test]
    fn test_first_step_runs_init_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());

        let mut model = ModelBuilder::new(context(), "top")
            .static_init(move |_| l1.borrow_mut().push("static"))
            .initial(move |_| l2.borrow_mut().push("initial"))
            .callable(RegionId::Stl, move |_| l3.borrow_mut().push("settle"))
            .build()
            .unwrap();

        assert!(!model.did_init());
        model.eval_step().unwrap();

        assert!(model.did_init());
        // Settle ran exactly once: the implicit first-iteration trigger
        // fires on iteration 1 only
        assert_eq!(*log.borrow(), vec!["static", "initial", "settle"]);

        // Init never re-runs
        model.eval_step().unwrap();
        model.eval_step().unwrap();
        assert_eq!(*log.borrow(), vec!["static", "initial", "settle"]);
    }

    #[test]
    fn test_settle_chain_converges_in_two_iterations() {
        // x2 := x1; x1 := 7 during settle; both consistent afterwards
        let mut model = ModelBuilder::new(context(), "chain")
            .signal("x1", 8)
            .signal("x2", 8)
            .callable(RegionId::Stl, |ctx| {
                let x1 = ctx.signals.get(&"x1".into()).unwrap();
                ctx.signals.set(&"x2".into(), x1);
            })
            .callable(RegionId::Stl, |ctx| {
                ctx.signals.set(&"x1".into(), 7);
            })
            .build()
            .unwrap();

        model.eval_step().unwrap();
        assert_eq!(model.get_signal(&"x1".into()), Some(7));
    }

    #[test]
    fn test_settle_cycle_is_fatal_at_iteration_101() {
        let mut model = ModelBuilder::new(context(), "cyclic")
            .signal("x", 1)
            .trigger(RegionId::Stl, "combinational feedback", |_| true)
            .callable(RegionId::Stl, |ctx| {
                let x = ctx.signals.get(&"x".into()).unwrap();
                ctx.signals.set(&"x".into(), x ^ 1);
            })
            .build()
            .unwrap();

        let err = model.eval_step().unwrap_err();
        match err {
            Error::NonConvergence { region, iterations } => {
                assert_eq!(region, RegionId::Stl);
                assert_eq!(iterations, 101);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_active_region_runs_once_per_step() {
        // A clocked counter: the driver toggles clk between steps, the
        // active region fires on each change
        let mut model = ModelBuilder::new(context(), "counter")
            .signal("clk", 1)
            .signal("count", 32)
            .trigger(RegionId::Act, "change on 'clk'", change_detect("clk"))
            .callable(RegionId::Act, |ctx| {
                let count = ctx.signals.get(&"count".into()).unwrap();
                ctx.signals.set(&"count".into(), count + 1);
            })
            .build()
            .unwrap();

        let n = 5;
        for step in 0..n {
            model.set_signal(&"clk".into(), step % 2).unwrap();
            model.eval_step().unwrap();
        }

        assert_eq!(model.get_signal(&"count".into()), Some(n));
        assert_eq!(model.steps(), n);
    }

    #[test]
    fn test_and_gate_scenario() {
        let mut model = ModelBuilder::new(context(), "and_gate")
            .signal("a", 1)
            .signal("b", 1)
            .signal("y", 1)
            .trigger(RegionId::Act, "change on 'a'", change_detect("a"))
            .trigger(RegionId::Act, "change on 'b'", change_detect("b"))
            .callable(RegionId::Act, |ctx| {
                let a = ctx.signals.get(&"a".into()).unwrap();
                let b = ctx.signals.get(&"b".into()).unwrap();
                ctx.signals.set(&"y".into(), a & b);
            })
            .build()
            .unwrap();

        model.eval_step().unwrap();
        assert_eq!(model.get_signal(&"y".into()), Some(0));

        model.set_signal(&"a".into(), 1).unwrap();
        model.set_signal(&"b".into(), 1).unwrap();
        model.eval_step().unwrap();
        assert_eq!(model.get_signal(&"y".into()), Some(1));

        // Unchanged inputs: idempotent
        model.eval_step().unwrap();
        assert_eq!(model.get_signal(&"y".into()), Some(1));
    }

    #[test]
    fn test_ico_region_runs_every_step() {
        let mut model = ModelBuilder::new(context(), "ico")
            .signal("n", 32)
            .callable(RegionId::Ico, |ctx| {
                let n = ctx.signals.get(&"n".into()).unwrap();
                ctx.signals.set(&"n".into(), n + 1);
            })
            .build()
            .unwrap();

        for _ in 0..3 {
            model.eval_step().unwrap();
        }
        assert_eq!(model.get_signal(&"n".into()), Some(3));
    }

    #[test]
    fn test_nba_reenters_active_region() {
        // nba commits a staged value once; act copies it onward during
        // the re-entry pass
        let mut model = ModelBuilder::new(context(), "nba")
            .signal("stage", 8)
            .signal("q", 8)
            .signal("mirror", 8)
            .trigger(RegionId::Act, "change on 'q'", change_detect("q"))
            .callable(RegionId::Act, |ctx| {
                let q = ctx.signals.get(&"q".into()).unwrap();
                ctx.signals.set(&"mirror".into(), q);
            })
            .trigger(RegionId::Nba, "change on 'stage'", change_detect("stage"))
            .callable(RegionId::Nba, |ctx| {
                let stage = ctx.signals.get(&"stage".into()).unwrap();
                ctx.signals.set(&"q".into(), stage);
            })
            .build()
            .unwrap();

        model.set_signal(&"stage".into(), 9).unwrap();
        model.eval_step().unwrap();

        assert_eq!(model.get_signal(&"q".into()), Some(9));
        assert_eq!(model.get_signal(&"mirror".into()), Some(9));
    }

    #[test]
    fn test_nba_outer_loop_is_bounded() {
        // A non-blocking-assignment trigger that never clears keeps
        // re-entering the active region; the outer loop must give up at
        // the same ceiling as the region loops
        let mut model = ModelBuilder::new(context(), "nba_cycle")
            .signal("q", 1)
            .trigger(RegionId::Nba, "commit feedback", |_| true)
            .callable(RegionId::Nba, |ctx| {
                let q = ctx.signals.get(&"q".into()).unwrap();
                ctx.signals.set(&"q".into(), q ^ 1);
            })
            .build()
            .unwrap();

        let err = model.eval_step().unwrap_err();
        match err {
            Error::NonConvergence { region, iterations } => {
                assert_eq!(region, RegionId::Nba);
                assert_eq!(iterations, 101);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deferred_cleanup_flushes_next_step() {
        let released = Rc::new(RefCell::new(0u32));
        let r = released.clone();

        let mut model = ModelBuilder::new(context(), "cleanup")
            .callable(RegionId::Ico, move |ctx| {
                let r = r.clone();
                ctx.defer(move || *r.borrow_mut() += 1);
            })
            .build()
            .unwrap();

        model.eval_step().unwrap();
        // Scheduled during this step, not yet released
        assert_eq!(*released.borrow(), 0);
        assert_eq!(model.pending_cleanup(), 1);

        model.eval_step().unwrap();
        // Released at the start of the next step, before evaluation
        assert_eq!(*released.borrow(), 1);
        assert_eq!(model.pending_cleanup(), 1);

        model.eval_step().unwrap();
        assert_eq!(*released.borrow(), 2);
    }

    #[test]
    fn test_finalize_flushes_pending_cleanup() {
        let released = Rc::new(RefCell::new(0u32));
        let (r1, r2) = (released.clone(), released.clone());

        let mut model = ModelBuilder::new(context(), "cleanup")
            .callable(RegionId::Ico, move |ctx| {
                let r = r1.clone();
                ctx.defer(move || *r.borrow_mut() += 1);
            })
            .on_final(move |ctx| {
                let r = r2.clone();
                ctx.defer(move || *r.borrow_mut() += 1);
            })
            .build()
            .unwrap();

        model.eval_step().unwrap();
        assert_eq!(*released.borrow(), 0);

        // Finalize releases both the last step's deferral and its own
        model.finalize().unwrap();
        assert_eq!(*released.borrow(), 2);
        assert_eq!(model.pending_cleanup(), 0);
    }

    #[test]
    fn test_finalize_single_call_contract() {
        let finals = Rc::new(RefCell::new(0u32));
        let f = finals.clone();

        let mut model = ModelBuilder::new(context(), "top")
            .on_final(move |_| *f.borrow_mut() += 1)
            .build()
            .unwrap();

        model.eval_step().unwrap();
        assert_eq!(*finals.borrow(), 0);

        model.finalize().unwrap();
        assert_eq!(*finals.borrow(), 1);

        assert!(matches!(model.finalize(), Err(Error::AlreadyFinalized(_))));
        assert_eq!(*finals.borrow(), 1);
    }

    #[test]
    fn test_delay_free_surface() {
        let model = ModelBuilder::new(context(), "top").build().unwrap();

        assert!(!model.events_pending());
        assert!(matches!(model.next_time_slot(), Err(Error::NoScheduledDelays)));
        assert_eq!(model.name(), "top");
        assert_eq!(model.model_name(), "top");
    }

    #[test]
    fn test_duplicate_signal_rejected_at_build() {
        let result = ModelBuilder::new(context(), "top")
            .signal("a", 1)
            .signal("a", 8)
            .build();

        assert!(matches!(result, Err(Error::DuplicateSignal(_))));
    }

    #[test]
    fn test_randomized_reset_is_seed_deterministic() {
        let build = |seed| {
            ModelBuilder::new(Arc::new(SimContext::with_seed(seed)), "top")
                .signal_with_reset("r", 32, ResetPolicy::Randomize)
                .build()
                .unwrap()
        };

        let a = build(7);
        let b = build(7);
        let c = build(8);

        assert_eq!(a.get_signal(&"r".into()), b.get_signal(&"r".into()));
        assert_ne!(a.get_signal(&"r".into()), c.get_signal(&"r".into()));
    }
}
