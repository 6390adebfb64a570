//! Signal state storage
//!
//! Holds the current values of a model's input/output/internal signals.
//! The signal set is fixed when the model is built; nothing is added or
//! removed at runtime.

use indexmap::IndexMap;
use rand::Rng;
use tracing::trace;

use crate::types::{ResetPolicy, SignalId};

/// A single fixed-width signal slot
#[derive(Debug, Clone)]
pub struct Signal {
    width: u32,
    value: u64,
    reset: ResetPolicy,
}

impl Signal {
    fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Declared width in bits (1..=64)
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Storage for a model's signal values
///
/// Iteration order is declaration order.
#[derive(Debug, Default)]
pub struct SignalState {
    signals: IndexMap<SignalId, Signal>,
}

impl SignalState {
    /// Declare a signal. Returns false if the id is already taken.
    pub(crate) fn declare(&mut self, id: SignalId, width: u32, reset: ResetPolicy) -> bool {
        debug_assert!((1..=64).contains(&width), "signal width out of range");
        if self.signals.contains_key(&id) {
            return false;
        }
        self.signals.insert(
            id,
            Signal {
                width,
                value: 0,
                reset,
            },
        );
        true
    }

    /// Fill every signal with its reset value
    pub(crate) fn reset(&mut self, rng: &mut impl Rng) {
        for (id, signal) in &mut self.signals {
            signal.value = match signal.reset {
                ResetPolicy::Zero => 0,
                ResetPolicy::Randomize => rng.gen::<u64>() & signal.mask(),
            };
            trace!(signal = %id, value = signal.value, "signal reset");
        }
    }

    /// Get a signal's current value
    pub fn get(&self, id: &SignalId) -> Option<u64> {
        self.signals.get(id).map(|s| s.value)
    }

    /// Set a signal's value, masked to its declared width.
    /// Returns false if the signal does not exist.
    pub fn set(&mut self, id: &SignalId, value: u64) -> bool {
        match self.signals.get_mut(id) {
            Some(signal) => {
                signal.value = value & signal.mask();
                true
            }
            None => false,
        }
    }

    /// Look up a signal's declared width
    pub fn width(&self, id: &SignalId) -> Option<u32> {
        self.signals.get(id).map(|s| s.width)
    }

    pub fn contains(&self, id: &SignalId) -> bool {
        self.signals.contains_key(id)
    }

    /// All signal ids in declaration order
    pub fn signal_ids(&self) -> impl Iterator<Item = &SignalId> {
        self.signals.keys()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
