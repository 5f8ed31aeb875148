//! The 24-bit word.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A 24-bit word, stored in the low bits of a `u32`.
///
/// Used for:
/// - Memory words (3 bytes, big-endian)
/// - The 24-bit registers A, X, L, B, S, T, PC, SW
/// - Effective addresses after indirection
///
/// Signed interpretation is two's complement on bit 23.
/// Value range: -8,388,608 to +8,388,607 (signed), 0 to 16,777,215 (unsigned)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Word(u32);

impl Word {
    /// Number of bytes in a word.
    pub const BYTES: usize = 3;

    /// Mask selecting the 24 value bits.
    pub const MASK: u32 = 0x00FF_FFFF;

    /// Sign bit (bit 23).
    pub const SIGN_BIT: u32 = 0x0080_0000;

    /// Largest signed value.
    pub const MAX: i32 = 0x007F_FFFF;

    /// Smallest signed value.
    pub const MIN: i32 = -0x0080_0000;

    /// Create a zero word.
    #[inline]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from an unsigned value, keeping the low 24 bits.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value & Self::MASK)
    }

    /// Create from a signed value, wrapping into 24 bits.
    #[inline]
    pub const fn from_i32(value: i32) -> Self {
        Self((value as u32) & Self::MASK)
    }

    /// Create from a wide signed value, wrapping into 24 bits.
    #[inline]
    pub const fn from_i64(value: i64) -> Self {
        Self((value as u64 & Self::MASK as u64) as u32)
    }

    /// Create from 3 big-endian bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }

    /// Split into 3 big-endian bytes.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// The unsigned value.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// The signed value (sign-extended from bit 23).
    #[inline]
    pub const fn to_i32(self) -> i32 {
        ((self.0 << 8) as i32) >> 8
    }

    /// The low byte.
    #[inline]
    pub const fn low_byte(self) -> u8 {
        self.0 as u8
    }

    /// Replace the low byte, keeping the high 16 bits.
    #[inline]
    pub const fn with_low_byte(self, byte: u8) -> Self {
        Self((self.0 & 0x00FF_FF00) | byte as u32)
    }

    /// Check if this word is zero.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Check if the sign bit is set.
    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 & Self::SIGN_BIT != 0
    }
}

impl From<[u8; 3]> for Word {
    fn from(bytes: [u8; 3]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Word> for [u8; 3] {
    fn from(word: Word) -> Self {
        word.to_bytes()
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:06X} = {})", self.0, self.to_i32())
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl fmt::UpperHex for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}
