use util::{EnumFromStr, ParseEnumError};
use std::fmt;

/// The global word size a FlipJump image is assembled/run with.
///
/// Memory is addressed at bit granularity everywhere, but words (the unit a
/// flip-jump instruction's two operands name) are always `w` bits wide.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, serde::Serialize, serde::Deserialize)]
pub enum WordSize {
    W8,
    W16,
    W32,
    W64,
}

impl WordSize {
    pub fn bits(self) -> u32 {
        match self {
            WordSize::W8 => 8,
            WordSize::W16 => 16,
            WordSize::W32 => 32,
            WordSize::W64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<WordSize> {
        match bits {
            8 => Some(WordSize::W8),
            16 => Some(WordSize::W16),
            32 => Some(WordSize::W32),
            64 => Some(WordSize::W64),
            _ => None,
        }
    }

    /// Mask selecting the low `w` bits of a `u64`.
    pub fn mask(self) -> u64 {
        if self.bits() == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits()) - 1
        }
    }

    pub fn shift(self) -> u32 {
        crate::constants::word_shift(self.bits())
    }
}

impl fmt::Display for WordSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl EnumFromStr for WordSize {
    fn from_str(s: &str) -> Result<WordSize, ParseEnumError> {
        s.parse::<u32>()
            .ok()
            .and_then(WordSize::from_bits)
            .ok_or_else(|| ParseEnumError {
                value: s.to_string(),
                enum_name: "WordSize",
            })
    }
}

impl std::str::FromStr for WordSize {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<WordSize, ParseEnumError> {
        EnumFromStr::from_str(s)
    }
}

impl Default for WordSize {
    fn default() -> WordSize {
        WordSize::W64
    }
}
