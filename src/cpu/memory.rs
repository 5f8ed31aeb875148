//! SIC/XE memory subsystem.
//!
//! Memory is a contiguous array of 3-byte words. The same backing store is
//! reachable through two views:
//! - byte addresses `0..size_bytes()`, used by the program counter and by
//!   effective addresses
//! - word indices `0..size_words()`, where word `w` covers bytes `3w..3w+3`

use crate::word::Word;
use thiserror::Error;

/// Default memory size in bytes (1 MiB, rounded up to whole words).
pub const DEFAULT_MEMORY_BYTES: usize = 1 << 20;

/// Word-organized, byte-addressable memory.
#[derive(Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a zeroed memory of at least `size_bytes` bytes.
    ///
    /// The size is rounded up to a whole number of words.
    pub fn new(size_bytes: usize) -> Self {
        Self {
            bytes: vec![0; words_for(size_bytes) * Word::BYTES],
        }
    }

    /// Create a zeroed memory holding exactly `words` words.
    pub fn with_words(words: usize) -> Self {
        Self {
            bytes: vec![0; words * Word::BYTES],
        }
    }

    /// Size in words.
    #[inline]
    pub fn size_words(&self) -> usize {
        self.bytes.len() / Word::BYTES
    }

    /// Size in bytes (always a multiple of 3).
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Read one byte.
    #[inline]
    pub fn read_byte(&self, address: usize) -> Result<u8, MemoryError> {
        self.bytes
            .get(address)
            .copied()
            .ok_or(MemoryError::OutOfBounds { address: address as i64, limit: self.bytes.len() })
    }

    /// Write one byte.
    #[inline]
    pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), MemoryError> {
        let limit = self.bytes.len();
        let cell = self
            .bytes
            .get_mut(address)
            .ok_or(MemoryError::OutOfBounds { address: address as i64, limit })?;
        *cell = value;
        Ok(())
    }

    /// Read a word by word index.
    pub fn read_word(&self, index: usize) -> Result<Word, MemoryError> {
        let start = self.word_start(index)?;
        self.read_word_at(start)
    }

    /// Write a word by word index.
    pub fn write_word(&mut self, index: usize, value: Word) -> Result<(), MemoryError> {
        let start = self.word_start(index)?;
        self.write_word_at(start, value)
    }

    /// Read the 3 bytes starting at a byte address as one big-endian word.
    ///
    /// The address need not be word-aligned.
    pub fn read_word_at(&self, address: usize) -> Result<Word, MemoryError> {
        let range = self.span(address, Word::BYTES)?;
        let b = &self.bytes[range];
        Ok(Word::from_bytes([b[0], b[1], b[2]]))
    }

    /// Write a word to the 3 bytes starting at a byte address.
    ///
    /// Nothing is written unless all 3 bytes are in range.
    pub fn write_word_at(&mut self, address: usize, value: Word) -> Result<(), MemoryError> {
        let range = self.span(address, Word::BYTES)?;
        self.bytes[range].copy_from_slice(&value.to_bytes());
        Ok(())
    }

    /// Reallocate to at least `size_bytes` bytes, discarding all content.
    pub fn resize(&mut self, size_bytes: usize) {
        self.bytes = vec![0; words_for(size_bytes) * Word::BYTES];
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Copy a block of bytes into memory starting at a byte address.
    pub fn load_bytes(&mut self, address: usize, data: &[u8]) -> Result<(), MemoryError> {
        let available = self.bytes.len().saturating_sub(address);
        if address > self.bytes.len() || data.len() > available {
            return Err(MemoryError::ProgramTooLarge { size: data.len(), available });
        }
        self.bytes[address..address + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Dump words (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.size_words());
        (start..end)
            .map(|i| {
                let b = &self.bytes[i * 3..i * 3 + 3];
                (i, Word::from_bytes([b[0], b[1], b[2]]))
            })
            .collect()
    }

    fn word_start(&self, index: usize) -> Result<usize, MemoryError> {
        if index >= self.size_words() {
            return Err(MemoryError::OutOfBounds { address: index as i64, limit: self.size_words() });
        }
        Ok(index * Word::BYTES)
    }

    fn span(&self, address: usize, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        match address.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(address..end),
            _ => Err(MemoryError::OutOfBounds { address: address as i64, limit: self.bytes.len() }),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BYTES)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero words
        let non_zero = self
            .bytes
            .chunks_exact(Word::BYTES)
            .filter(|w| w.iter().any(|&b| b != 0))
            .count();

        f.debug_struct("Memory")
            .field("non_zero_words", &non_zero)
            .field("total_words", &self.size_words())
            .finish()
    }
}

fn words_for(size_bytes: usize) -> usize {
    (size_bytes + Word::BYTES - 1) / Word::BYTES
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside the configured memory.
    ///
    /// `limit` is the size of the addressed view (bytes or words).
    #[error("memory address {address:#X} out of range (limit {limit:#X})")]
    OutOfBounds { address: i64, limit: usize },

    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_size_rounds_up_to_words() {
        let mem = Memory::new(10);
        assert_eq!(mem.size_words(), 4);
        assert_eq!(mem.size_bytes(), 12);
        assert_eq!(Memory::default().size_bytes() % 3, 0);
    }

    #[test]
    fn test_byte_and_word_views_share_storage() {
        let mut mem = Memory::with_words(4);
        mem.write_word(1, Word::new(0x12_3456)).unwrap();

        assert_eq!(mem.read_byte(3).unwrap(), 0x12);
        assert_eq!(mem.read_byte(4).unwrap(), 0x34);
        assert_eq!(mem.read_byte(5).unwrap(), 0x56);

        mem.write_byte(5, 0xFF).unwrap();
        assert_eq!(mem.read_word(1).unwrap().to_u32(), 0x12_34FF);
    }

    #[test]
    fn test_unaligned_word_access() {
        let mut mem = Memory::with_words(4);
        mem.write_word_at(4, Word::new(0xAB_CDEF)).unwrap();
        assert_eq!(mem.read_word(1).unwrap().to_u32(), 0x00_ABCD);
        assert_eq!(mem.read_word(2).unwrap().to_u32(), 0xEF_0000);
        assert_eq!(mem.read_word_at(4).unwrap().to_u32(), 0xAB_CDEF);
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = Memory::with_words(4);

        assert!(mem.read_byte(11).is_ok());
        assert!(mem.read_byte(12).is_err());
        assert!(mem.read_word(3).is_ok());
        assert!(mem.read_word(4).is_err());
        assert!(mem.write_byte(12, 1).is_err());
        assert!(mem.write_word(4, Word::zero()).is_err());
        assert!(mem.read_word_at(usize::MAX).is_err());
    }

    #[test]
    fn test_straddling_write_is_not_partial() {
        let mut mem = Memory::with_words(2);
        let err = mem.write_word_at(4, Word::new(0xFF_FFFF)).unwrap_err();

        assert!(matches!(err, MemoryError::OutOfBounds { address: 4, limit: 6 }));
        assert_eq!(mem.read_byte(4).unwrap(), 0);
        assert_eq!(mem.read_byte(5).unwrap(), 0);
    }

    #[test]
    fn test_resize_clears_content() {
        let mut mem = Memory::with_words(4);
        mem.write_word(0, Word::new(0x11_1111)).unwrap();

        mem.resize(30);
        assert_eq!(mem.size_words(), 10);
        assert!(mem.dump(0, 10).iter().all(|(_, w)| w.is_zero()));
    }

    #[test]
    fn test_load_bytes() {
        let mut mem = Memory::with_words(4);
        mem.load_bytes(2, &[1, 2, 3]).unwrap();
        assert_eq!(mem.read_word(1).unwrap().to_u32(), 0x02_0300);

        let err = mem.load_bytes(10, &[1, 2, 3]).unwrap_err();
        assert_eq!(err, MemoryError::ProgramTooLarge { size: 3, available: 2 });
        assert_eq!(mem.read_byte(10).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn prop_byte_round_trip(addr in 0usize..300, value: u8) {
            let mut mem = Memory::with_words(100);
            mem.write_byte(addr, value).unwrap();
            prop_assert_eq!(mem.read_byte(addr).unwrap(), value);
        }

        #[test]
        fn prop_word_round_trip(index in 0usize..100, value: u32) {
            let mut mem = Memory::with_words(100);
            mem.write_word(index, Word::new(value)).unwrap();
            prop_assert_eq!(mem.read_word(index).unwrap().to_u32(), value & Word::MASK);
            prop_assert_eq!(mem.read_byte(index * 3).unwrap(), ((value >> 16) & 0xFF) as u8);
        }
    }
}
