//! Trigger flag sets
//!
//! A [`TriggerSet`] is a fixed-cardinality set of boolean flags, one per
//! trigger condition defined for a region. Flags are recomputed wholesale
//! on every region entry; the set's value is only meaningful between one
//! recomputation and the next.

/// Fixed-size bitset of trigger flags, packed into machine words
#[derive(Debug, Clone)]
pub struct TriggerSet {
    words: Vec<u64>,
    len: usize,
}

impl TriggerSet {
    /// Create a set with `len` flags, all clear
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Number of flags in the set
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clear every flag
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Assign one flag
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "trigger index out of range");
        let bit = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= bit;
        } else {
            self.words[index / 64] &= !bit;
        }
    }

    /// Read one flag
    pub fn is_set(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "trigger index out of range");
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Whether at least one flag is set
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// Number of set flags
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Raw backing word, 64 flags per word
    pub fn word(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or(0)
    }
}
