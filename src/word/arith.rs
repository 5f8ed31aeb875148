//! 24-bit word arithmetic.
//!
//! All operations interpret words as two's-complement signed values and
//! wrap their results back into 24 bits, the way the SIC/XE ALU does.

use std::cmp::Ordering;

use crate::word::Word;

/// Add two words: `a + b`, wrapping.
#[inline]
pub fn add(a: Word, b: Word) -> Word {
    Word::new(a.to_u32().wrapping_add(b.to_u32()))
}

/// Subtract two words: `a - b`, wrapping.
#[inline]
pub fn sub(a: Word, b: Word) -> Word {
    Word::new(a.to_u32().wrapping_sub(b.to_u32()))
}

/// Multiply two words, keeping the low 24 bits of the product.
#[inline]
pub fn mul(a: Word, b: Word) -> Word {
    Word::from_i64(a.to_i32() as i64 * b.to_i32() as i64)
}

/// Signed division truncating toward zero.
///
/// Returns `None` when the divisor is zero.
pub fn div(a: Word, b: Word) -> Option<Word> {
    if b.is_zero() {
        return None;
    }
    // MIN / -1 overflows 24 bits and wraps back to MIN
    Some(Word::from_i64(a.to_i32() as i64 / b.to_i32() as i64))
}

/// Bitwise AND.
#[inline]
pub fn and(a: Word, b: Word) -> Word {
    Word::new(a.to_u32() & b.to_u32())
}

/// Bitwise OR.
#[inline]
pub fn or(a: Word, b: Word) -> Word {
    Word::new(a.to_u32() | b.to_u32())
}

/// Compare two words as signed values.
///
/// The difference is computed without wrapping, so large operands of
/// opposite sign still compare correctly.
#[inline]
pub fn compare(a: Word, b: Word) -> Ordering {
    a.to_i32().cmp(&b.to_i32())
}

/// Sign of a word, as an ordering against zero.
#[inline]
pub fn sign(a: Word) -> Ordering {
    a.to_i32().cmp(&0)
}

/// Circular left shift within 24 bits.
///
/// Bits leaving position 23 re-enter at position 0.
pub fn shift_left(a: Word, count: u32) -> Word {
    let n = count % 24;
    if n == 0 {
        return a;
    }
    let v = a.to_u32();
    Word::new((v << n) | (v >> (24 - n)))
}

/// Logical right shift, filling with zeros.
///
/// Shifting by 24 or more clears the word.
pub fn shift_right(a: Word, count: u32) -> Word {
    if count >= 24 {
        return Word::zero();
    }
    Word::new(a.to_u32() >> count)
}
