//! SIC/XE CPU registers.
//!
//! The SIC/XE has 9 registers:
//! - A: 24-bit accumulator
//! - X: 24-bit index register
//! - L: 24-bit linkage register (return address of JSUB)
//! - B: 24-bit base register (base-relative addressing)
//! - S, T: 24-bit general-purpose registers
//! - F: 48-bit floating-point accumulator
//! - PC: 24-bit program counter (a byte address)
//! - SW: 24-bit status word; bits 0..1 hold the condition code

use std::cmp::Ordering;
use std::fmt;

use crate::word::Word;
use serde::{Serialize, Deserialize};

/// Register names, in register-number order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegisterName {
    A,
    X,
    L,
    B,
    S,
    T,
    F,
    PC,
    SW,
}

impl RegisterName {
    /// All registers, in bank order.
    pub const ALL: [RegisterName; 9] = [
        RegisterName::A,
        RegisterName::X,
        RegisterName::L,
        RegisterName::B,
        RegisterName::S,
        RegisterName::T,
        RegisterName::F,
        RegisterName::PC,
        RegisterName::SW,
    ];

    /// Look up a register by its machine number (as used in format-2 operands).
    ///
    /// Number 7 is unassigned.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(RegisterName::A),
            1 => Some(RegisterName::X),
            2 => Some(RegisterName::L),
            3 => Some(RegisterName::B),
            4 => Some(RegisterName::S),
            5 => Some(RegisterName::T),
            6 => Some(RegisterName::F),
            8 => Some(RegisterName::PC),
            9 => Some(RegisterName::SW),
            _ => None,
        }
    }

    /// Machine register number.
    pub fn number(self) -> u8 {
        match self {
            RegisterName::A => 0,
            RegisterName::X => 1,
            RegisterName::L => 2,
            RegisterName::B => 3,
            RegisterName::S => 4,
            RegisterName::T => 5,
            RegisterName::F => 6,
            RegisterName::PC => 8,
            RegisterName::SW => 9,
        }
    }

    /// Width in bits: 48 for F, 24 for everything else.
    pub fn width(self) -> u32 {
        match self {
            RegisterName::F => 48,
            _ => 24,
        }
    }

    /// Mask applied on every write.
    pub fn mask(self) -> u64 {
        (1u64 << self.width()) - 1
    }

    /// Assembler name.
    pub fn as_str(self) -> &'static str {
        match self {
            RegisterName::A => "A",
            RegisterName::X => "X",
            RegisterName::L => "L",
            RegisterName::B => "B",
            RegisterName::S => "S",
            RegisterName::T => "T",
            RegisterName::F => "F",
            RegisterName::PC => "PC",
            RegisterName::SW => "SW",
        }
    }

    /// Parse an assembler register name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        RegisterName::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(name))
    }

    fn slot(self) -> usize {
        match self {
            RegisterName::A => 0,
            RegisterName::X => 1,
            RegisterName::L => 2,
            RegisterName::B => 3,
            RegisterName::S => 4,
            RegisterName::T => 5,
            RegisterName::F => 6,
            RegisterName::PC => 7,
            RegisterName::SW => 8,
        }
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition code held in the low 2 bits of SW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionCode {
    Equal = 0,
    Less = 1,
    Greater = 2,
}

impl ConditionCode {
    /// Mask of the condition code bits within SW.
    pub const MASK: u64 = 0b11;

    /// Decode from the 2-bit field. The pattern `11` is not a valid code.
    pub fn from_bits(bits: u64) -> Option<Self> {
        match bits & Self::MASK {
            0 => Some(ConditionCode::Equal),
            1 => Some(ConditionCode::Less),
            2 => Some(ConditionCode::Greater),
            _ => None,
        }
    }

    /// The 2-bit encoding.
    pub fn bits(self) -> u64 {
        self as u64
    }

    /// Short symbol: `=`, `<` or `>`.
    pub fn symbol(self) -> char {
        match self {
            ConditionCode::Equal => '=',
            ConditionCode::Less => '<',
            ConditionCode::Greater => '>',
        }
    }
}

impl From<Ordering> for ConditionCode {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => ConditionCode::Less,
            Ordering::Equal => ConditionCode::Equal,
            Ordering::Greater => ConditionCode::Greater,
        }
    }
}

/// The SIC/XE register bank.
///
/// Exactly one slot per [`RegisterName`]; values are masked to the
/// register's width on every write.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    values: [u64; 9],
}

impl Registers {
    /// Create a register bank with all values zeroed.
    pub fn new() -> Self {
        Self { values: [0; 9] }
    }

    /// Current value of a register.
    #[inline]
    pub fn get(&self, name: RegisterName) -> u64 {
        self.values[name.slot()]
    }

    /// Store `value & mask(name)`.
    #[inline]
    pub fn set(&mut self, name: RegisterName, value: u64) {
        self.values[name.slot()] = value & name.mask();
    }

    /// Read a 24-bit register as a word.
    ///
    /// For F this yields the low 24 bits; the engine never does that.
    #[inline]
    pub fn word(&self, name: RegisterName) -> Word {
        Word::new(self.get(name) as u32)
    }

    /// Write a word into a register.
    #[inline]
    pub fn set_word(&mut self, name: RegisterName, value: Word) {
        self.set(name, value.to_u32() as u64);
    }

    /// Reset all registers to zero.
    pub fn clear_all(&mut self) {
        self.values = [0; 9];
    }

    /// Program counter (a byte address).
    #[inline]
    pub fn pc(&self) -> u32 {
        self.get(RegisterName::PC) as u32
    }

    /// Set the program counter, masked to 24 bits.
    #[inline]
    pub fn set_pc(&mut self, address: u32) {
        self.set(RegisterName::PC, address as u64);
    }

    /// Advance the program counter by `bytes`.
    /// Returns the old value.
    pub fn advance_pc(&mut self, bytes: u32) -> u32 {
        let old = self.pc();
        self.set_pc(old.wrapping_add(bytes));
        old
    }

    /// Current condition code, or `None` if SW holds the unused pattern `11`.
    pub fn condition_code(&self) -> Option<ConditionCode> {
        ConditionCode::from_bits(self.get(RegisterName::SW))
    }

    /// Set the condition code, leaving the other SW bits alone.
    pub fn set_condition_code(&mut self, cc: ConditionCode) {
        let sw = self.get(RegisterName::SW) & !ConditionCode::MASK;
        self.set(RegisterName::SW, sw | cc.bits());
    }

    /// Iterate `(name, value)` pairs in bank order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterName, u64)> + '_ {
        RegisterName::ALL.into_iter().map(move |r| (r, self.get(r)))
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.iter() {
            if name == RegisterName::F {
                map.entry(&name, &format_args!("{:012X}", value));
            } else {
                map.entry(&name, &format_args!("{:06X}", value));
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_register_numbers() {
        for r in RegisterName::ALL {
            assert_eq!(RegisterName::from_number(r.number()), Some(r));
        }
        assert_eq!(RegisterName::from_number(7), None);
        assert_eq!(RegisterName::from_number(10), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(RegisterName::parse("pc"), Some(RegisterName::PC));
        assert_eq!(RegisterName::parse("SW"), Some(RegisterName::SW));
        assert_eq!(RegisterName::parse("Q"), None);
    }

    #[test]
    fn test_masking() {
        let mut regs = Registers::new();
        regs.set(RegisterName::A, 0x1_2345_6789);
        assert_eq!(regs.get(RegisterName::A), 0x45_6789);

        regs.set(RegisterName::F, 0xFFFF_1234_5678_9ABC);
        assert_eq!(regs.get(RegisterName::F), 0x1234_5678_9ABC);
    }

    #[test]
    fn test_condition_code_preserves_other_sw_bits() {
        let mut regs = Registers::new();
        regs.set(RegisterName::SW, 0x80_0000);

        regs.set_condition_code(ConditionCode::Greater);
        assert_eq!(regs.condition_code(), Some(ConditionCode::Greater));
        assert_eq!(regs.get(RegisterName::SW), 0x80_0002);

        regs.set_condition_code(ConditionCode::Equal);
        assert_eq!(regs.get(RegisterName::SW), 0x80_0000);

        regs.set(RegisterName::SW, 3);
        assert_eq!(regs.condition_code(), None);
    }

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.set_pc(10);

        let old = regs.advance_pc(3);
        assert_eq!(old, 10);
        assert_eq!(regs.pc(), 13);

        regs.set_pc(0xFF_FFFF);
        regs.advance_pc(1);
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn test_clear_all() {
        let mut regs = Registers::new();
        for r in RegisterName::ALL {
            regs.set(r, 0xABCDEF);
        }
        regs.clear_all();
        assert!(regs.iter().all(|(_, v)| v == 0));
    }

    proptest! {
        #[test]
        fn prop_writes_are_masked(v: u64) {
            let mut regs = Registers::new();
            for r in RegisterName::ALL {
                regs.set(r, v);
                let expected = if r == RegisterName::F { v & 0xFFFF_FFFF_FFFF } else { v & 0xFF_FFFF };
                prop_assert_eq!(regs.get(r), expected);
            }
        }
    }
}
