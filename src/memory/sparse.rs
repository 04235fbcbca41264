//! Two-tier sparse memory: an explicit map of materialized words plus a
//! sorted list of lazily zero-filled ranges, mirroring the reference
//! loader's `reserved_dict_threshold` split between eager and lazy
//! zero-fill.

use crate::constants::SPARSE_ZERO_THRESHOLD;
use crate::memory::Memory;
use crate::word::WordSize;
use std::collections::HashMap;

/// A half-open `[lo, hi)` range of word indices that reads as all-zero
/// until a write inside it materializes that one word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ZeroRange {
    lo: u64,
    hi: u64,
}

impl ZeroRange {
    fn contains(&self, word_index: u64) -> bool {
        self.lo <= word_index && word_index < self.hi
    }
}

/// Sparse, bit-addressed memory built by the loader from a decoded `.fjm`
/// image. Reads first check the materialized-word map, then the
/// zero-ranges, then fall back to garbage handling.
pub struct SparseMemory {
    word_size: WordSize,
    garbage_handling: GarbageHandling,
    words: HashMap<u64, u64>,
    zero_ranges: Vec<ZeroRange>,
    last_word_index: u64,
}

impl SparseMemory {
    pub fn new(word_size: WordSize) -> SparseMemory {
        SparseMemory::with_garbage_handling(word_size, GarbageHandling::default())
    }

    pub fn with_garbage_handling(
        word_size: WordSize,
        garbage_handling: GarbageHandling,
    ) -> SparseMemory {
        SparseMemory {
            word_size,
            garbage_handling,
            words: HashMap::new(),
            zero_ranges: Vec::new(),
            last_word_index: 0,
        }
    }

    /// Materializes `data[i]` at word index `start + i` for every element,
    /// then either materializes or lazily records the `length - data.len()`
    /// trailing zero words, per [`SPARSE_ZERO_THRESHOLD`].
    pub fn add_segment(&mut self, start: u64, length: u64, data: &[u64]) {
        for (i, &word) in data.iter().enumerate() {
            self.words.insert(start + i as u64, word);
        }

        let zero_lo = start + data.len() as u64;
        let zero_hi = start + length;
        if zero_hi > zero_lo {
            if zero_hi - zero_lo < SPARSE_ZERO_THRESHOLD {
                for idx in zero_lo..zero_hi {
                    self.words.entry(idx).or_insert(0);
                }
            } else {
                self.zero_ranges.push(ZeroRange {
                    lo: zero_lo,
                    hi: zero_hi,
                });
            }
        }

        self.last_word_index = self.last_word_index.max(zero_hi.saturating_sub(1));
    }

    /// Directly materializes a whole word at a word-aligned bit-address.
    /// Used by the loader and by tests that set up memory by hand.
    pub fn write_word(&mut self, bit_address: u64, value: u64) {
        let word_index = bit_address >> self.word_size.shift();
        self.words.insert(word_index, value & self.word_size.mask());
        self.last_word_index = self.last_word_index.max(word_index);
    }

    fn read_word(&self, word_index: u64) -> Option<u64> {
        if let Some(&w) = self.words.get(&word_index) {
            return Some(w);
        }
        if self.zero_ranges.iter().any(|r| r.contains(word_index)) {
            return Some(0);
        }
        None
    }

    /// Reads `word_index`, applying the configured garbage policy if the
    /// word was never materialized, and materializing the result as a
    /// value-`0` word afterward so a later write behaves like an ordinary
    /// write.
    fn read_word_checked(&mut self, word_index: u64) -> Result<u64, crate::error::RuntimeError> {
        if let Some(w) = self.read_word(word_index) {
            return Ok(w);
        }

        match self.garbage_handling {
            GarbageHandling::Stop => {
                return Err(crate::error::RuntimeError::GarbageRead(
                    word_index << self.word_size.shift(),
                ))
            }
            GarbageHandling::OnlyWarning => {
                tracing::warn!(word_index, "garbage read of unmapped word");
            }
            GarbageHandling::SlowRead => {
                tracing::warn!(word_index, "garbage read of unmapped word (slow-read policy)");
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            GarbageHandling::Continue => {}
        }

        self.words.insert(word_index, 0);
        Ok(0)
    }
}

impl Memory for SparseMemory {
    fn word_size(&self) -> WordSize {
        self.word_size
    }

    fn last_word_index(&self) -> u64 {
        self.last_word_index
    }

    fn read_bit(&mut self, bit_address: u64) -> Result<bool, crate::error::RuntimeError> {
        let shift = self.word_size.shift();
        let word_index = bit_address >> shift;
        let bit_in_word = bit_address & (self.word_size.bits() as u64 - 1);
        let word = self.read_word_checked(word_index)?;
        Ok((word >> bit_in_word) & 1 != 0)
    }

    fn write_bit(&mut self, bit_address: u64, value: bool) {
        let shift = self.word_size.shift();
        let word_index = bit_address >> shift;
        let bit_in_word = bit_address & (self.word_size.bits() as u64 - 1);
        let word = self.read_word(word_index).unwrap_or(0);
        let updated = if value {
            word | (1 << bit_in_word)
        } else {
            word & !(1 << bit_in_word)
        };
        self.words.insert(word_index, updated & self.word_size.mask());
        self.last_word_index = self.last_word_index.max(word_index);
    }
}

/// Policy applied when the interpreter reads a bit-address that was never
/// written and falls outside every eagerly- or lazily-zeroed range.
#[derive(Clone, Copy, Eq, PartialEq, Debug, serde::Serialize, serde::Deserialize)]
pub enum GarbageHandling {
    /// Fail with [`crate::error::RuntimeError::GarbageRead`].
    Stop,
    /// Log and return 0, pausing briefly first.
    SlowRead,
    /// Log and return 0.
    OnlyWarning,
    /// Silently return 0.
    Continue,
}

impl Default for GarbageHandling {
    fn default() -> GarbageHandling {
        GarbageHandling::Continue
    }
}

impl util::EnumFromStr for GarbageHandling {
    fn from_str(s: &str) -> Result<GarbageHandling, util::ParseEnumError> {
        match s {
            "stop" => Ok(GarbageHandling::Stop),
            "slow-read" => Ok(GarbageHandling::SlowRead),
            "only-warning" => Ok(GarbageHandling::OnlyWarning),
            "continue" => Ok(GarbageHandling::Continue),
            _ => Err(util::ParseEnumError {
                value: s.to_string(),
                enum_name: "GarbageHandling",
            }),
        }
    }
}

impl std::str::FromStr for GarbageHandling {
    type Err = util::ParseEnumError;

    fn from_str(s: &str) -> Result<GarbageHandling, util::ParseEnumError> {
        util::EnumFromStr::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_round_trip() {
        let mut mem = SparseMemory::new(WordSize::W8);
        mem.write_bit(10, true);
        assert!(mem.read_bit(10).unwrap());
        assert!(!mem.read_bit(11).unwrap());
        mem.write_bit(10, false);
        assert!(!mem.read_bit(10).unwrap());
    }

    #[test]
    fn eager_zero_fill_below_threshold() {
        let mut mem = SparseMemory::new(WordSize::W8);
        mem.add_segment(0, 10, &[0xAB]);
        assert_eq!(mem.read_word(0), Some(0xAB));
        assert_eq!(mem.read_word(5), Some(0));
        assert!(mem.zero_ranges.is_empty());
    }

    #[test]
    fn lazy_zero_range_above_threshold() {
        let mut mem = SparseMemory::new(WordSize::W8);
        mem.add_segment(0, 5000, &[0x01]);
        assert_eq!(mem.read_word(0), Some(0x01));
        assert_eq!(mem.read_word(4999), Some(0));
        assert_eq!(mem.zero_ranges.len(), 1);
    }

    #[test]
    fn garbage_stop_errors_then_materializes_on_other_policies() {
        let mut mem = SparseMemory::with_garbage_handling(WordSize::W8, GarbageHandling::Stop);
        assert!(mem.read_word_checked(3).is_err());

        let mut mem2 =
            SparseMemory::with_garbage_handling(WordSize::W8, GarbageHandling::Continue);
        assert_eq!(mem2.read_word_checked(3).unwrap(), 0);
        assert_eq!(mem2.read_word(3), Some(0));
    }
}
