//! Instruction decoder for the SIC/XE.
//!
//! Instructions are 1 to 4 bytes long. The first byte selects the format:
//! - Format 1: `op(8)`
//! - Format 2: `op(8) r1(4) r2(4)`
//! - Format 3: `op(6) n i x b p e disp(12)`
//! - Format 4: `op(6) n i x b p e address(20)`
//!
//! For formats 3 and 4 the decoder also resolves the effective address,
//! applying pc-relative, base-relative, indexed and indirect addressing.

use bitflags::bitflags;
use thiserror::Error;

use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::opcode::{Opcode, OpcodeClass};
use crate::cpu::registers::{RegisterName, Registers};

bitflags! {
    /// The n, i, x, b, p, e addressing bits of a format 3/4 instruction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Nixbpe: u8 {
        /// Indirect-capable.
        const N = 0b10_0000;
        /// Immediate-capable.
        const I = 0b01_0000;
        /// Indexed.
        const X = 0b00_1000;
        /// Base-relative.
        const B = 0b00_0100;
        /// PC-relative.
        const P = 0b00_0010;
        /// Extended (format 4).
        const E = 0b00_0001;

        /// Simple addressing (n=1, i=1).
        const SIMPLE = Self::N.bits() | Self::I.bits();
    }
}

/// Instruction length class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    One,
    Two,
    Three,
    Four,
}

impl Format {
    /// Length in bytes.
    pub const fn len(self) -> u32 {
        match self {
            Format::One => 1,
            Format::Two => 2,
            Format::Three => 3,
            Format::Four => 4,
        }
    }

    /// Format number (1-4).
    pub const fn number(self) -> u8 {
        self.len() as u8
    }
}

/// Operand addressing mode, from the n and i flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    /// n=0, i=1: the effective address is the operand value itself.
    Immediate,
    /// n=1, i=0: the effective address is read from memory.
    Indirect,
    /// Any other combination: the effective address is dereferenced.
    Simple,
}

impl AddrMode {
    /// Create from the n and i flags.
    pub fn from_flags(flags: Nixbpe) -> Self {
        match (flags.contains(Nixbpe::N), flags.contains(Nixbpe::I)) {
            (false, true) => AddrMode::Immediate,
            (true, false) => AddrMode::Indirect,
            _ => AddrMode::Simple,
        }
    }
}

/// Raw operand fields of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    /// Format 1.
    None,
    /// Format 2: the two 4-bit selectors, uninterpreted.
    Registers { r1: u8, r2: u8 },
    /// Format 3/4: addressing flags and the displacement or address field.
    ///
    /// The format 3 displacement is sign-extended from 12 bits; the format 4
    /// address is unsigned.
    Memory { flags: Nixbpe, displacement: i32 },
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte address the instruction was fetched from.
    pub address: u32,
    pub opcode: Opcode,
    pub format: Format,
    pub operands: Operands,
    pub mode: AddrMode,
    pub indexed: bool,
    /// Final effective address, or the literal operand in immediate mode.
    /// Always 0 for formats 1 and 2.
    pub effective_address: i32,
}

impl Instruction {
    /// Length in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.format.len()
    }

    /// Address of the next sequential instruction.
    #[inline]
    pub fn next_address(&self) -> u32 {
        self.address.wrapping_add(self.size())
    }

    /// Addressing flags, for format 3/4 instructions.
    pub fn flags(&self) -> Option<Nixbpe> {
        match self.operands {
            Operands::Memory { flags, .. } => Some(flags),
            _ => None,
        }
    }
}

/// Decode the instruction at byte address `pc`.
///
/// Reads memory for the instruction bytes and, in indirect mode, for the
/// pointer word. Registers B and X are consulted for base-relative and
/// indexed addressing.
pub fn decode(mem: &Memory, regs: &Registers, pc: u32) -> Result<Instruction, DecodeError> {
    let at = |offset: u32| mem.read_byte(pc.wrapping_add(offset) as usize);

    let first = at(0)?;
    let opcode = Opcode::from_byte(first)
        .ok_or(DecodeError::UnsupportedOpcode { opcode: first, address: pc })?;

    let mut instr = Instruction {
        address: pc,
        opcode,
        format: Format::One,
        operands: Operands::None,
        mode: AddrMode::Simple,
        indexed: false,
        effective_address: 0,
    };

    match opcode.class() {
        OpcodeClass::OneByte => {}

        OpcodeClass::TwoByte => {
            let regs_byte = at(1)?;
            instr.format = Format::Two;
            instr.operands = Operands::Registers { r1: regs_byte >> 4, r2: regs_byte & 0x0F };
        }

        OpcodeClass::ThreeOrFour => {
            let second = at(1)?;
            let third = at(2)?;
            let flags = Nixbpe::from_bits_truncate(((first & 0x03) << 4) | (second >> 4));

            let (format, displacement) = if flags.contains(Nixbpe::E) {
                let fourth = at(3)?;
                let address = ((second as i32 & 0x0F) << 16) | ((third as i32) << 8) | fourth as i32;
                (Format::Four, address)
            } else {
                let disp = ((second as i32 & 0x0F) << 8) | third as i32;
                if disp & 0x800 != 0 {
                    (Format::Three, disp - 0x1000)
                } else {
                    (Format::Three, disp)
                }
            };

            instr.format = format;
            instr.operands = Operands::Memory { flags, displacement };
            instr.mode = AddrMode::from_flags(flags);
            instr.indexed = flags.contains(Nixbpe::X);
            instr.effective_address = resolve(mem, regs, &instr, flags, displacement)?;
        }
    }

    Ok(instr)
}

/// Effective-address resolution for format 3/4.
fn resolve(
    mem: &Memory,
    regs: &Registers,
    instr: &Instruction,
    flags: Nixbpe,
    displacement: i32,
) -> Result<i32, DecodeError> {
    let mut address = displacement;

    // Format 4 addresses are absolute
    if instr.format == Format::Three {
        if flags.contains(Nixbpe::P) {
            address += instr.next_address() as i32;
        } else if flags.contains(Nixbpe::B) {
            address += regs.get(RegisterName::B) as i32;
        }
    }

    if flags.contains(Nixbpe::X) {
        address += regs.get(RegisterName::X) as i32;
    }

    if instr.mode == AddrMode::Indirect {
        if address.rem_euclid(3) != 0 {
            return Err(DecodeError::MisalignedAccess { address, instruction: instr.address });
        }
        let index = usize::try_from(address / 3)
            .map_err(|_| MemoryError::OutOfBounds { address: address as i64, limit: mem.size_bytes() })?;
        address = mem.read_word(index)?.to_i32();
    }

    Ok(address)
}

/// Encode a format 1 instruction.
pub fn encode_format1(op: Opcode) -> [u8; 1] {
    [op.byte()]
}

/// Encode a format 2 instruction from two 4-bit selectors.
pub fn encode_format2(op: Opcode, r1: u8, r2: u8) -> [u8; 2] {
    [op.byte(), ((r1 & 0x0F) << 4) | (r2 & 0x0F)]
}

/// Encode a format 3 instruction. The displacement is truncated to 12 bits
/// and the e flag is cleared.
pub fn encode_format3(op: Opcode, flags: Nixbpe, displacement: i32) -> [u8; 3] {
    let bits = (flags - Nixbpe::E).bits();
    let disp = (displacement & 0x0FFF) as u16;
    [
        op.byte() | (bits >> 4),
        ((bits & 0x0F) << 4) | (disp >> 8) as u8,
        disp as u8,
    ]
}

/// Encode a format 4 instruction. The address is truncated to 20 bits and
/// the e flag is set.
pub fn encode_format4(op: Opcode, flags: Nixbpe, address: u32) -> [u8; 4] {
    let bits = (flags | Nixbpe::E).bits();
    let addr = address & 0x0F_FFFF;
    [
        op.byte() | (bits >> 4),
        ((bits & 0x0F) << 4) | (addr >> 16) as u8,
        (addr >> 8) as u8,
        addr as u8,
    ]
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported opcode {opcode:#04X} at {address:#06X}")]
    UnsupportedOpcode { opcode: u8, address: u32 },

    #[error("indirect address {address:#X} is not word-aligned (instruction at {instruction:#06X})")]
    MisalignedAccess { address: i32, instruction: u32 },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::Word;
    use proptest::prelude::*;

    fn machine(code: &[u8]) -> (Memory, Registers) {
        let mut mem = Memory::with_words(1000);
        mem.load_bytes(0, code).unwrap();
        (mem, Registers::new())
    }

    #[test]
    fn test_decode_format1() {
        let (mem, regs) = machine(&encode_format1(Opcode::Fix));
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Fix);
        assert_eq!(instr.format, Format::One);
        assert_eq!(instr.operands, Operands::None);
        assert_eq!(instr.effective_address, 0);
    }

    #[test]
    fn test_decode_format2() {
        let (mem, regs) = machine(&encode_format2(Opcode::Addr, 4, 0));
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Addr);
        assert_eq!(instr.format, Format::Two);
        assert_eq!(instr.operands, Operands::Registers { r1: 4, r2: 0 });
    }

    #[test]
    fn test_decode_raw_bytes() {
        // 032600: LDA with n=1 i=1 p=1, disp 0x600
        let (mem, regs) = machine(&[0x03, 0x26, 0x00]);
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Lda);
        assert_eq!(instr.format, Format::Three);
        assert_eq!(instr.mode, AddrMode::Simple);
        assert_eq!(instr.flags(), Some(Nixbpe::SIMPLE | Nixbpe::P));
        assert_eq!(instr.effective_address, 0x603);
    }

    #[test]
    fn test_immediate_is_literal() {
        let (mem, regs) = machine(&encode_format3(Opcode::Lda, Nixbpe::I, 5));
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.mode, AddrMode::Immediate);
        assert_eq!(instr.effective_address, 5);
    }

    #[test]
    fn test_pc_relative_negative_displacement() {
        let mut code = vec![0; 30];
        code.extend_from_slice(&encode_format3(Opcode::J, Nixbpe::SIMPLE | Nixbpe::P, -1));
        let (mem, regs) = machine(&code);
        let instr = decode(&mem, &regs, 30).unwrap();
        assert_eq!(instr.effective_address, 33 - 1);
    }

    #[test]
    fn test_base_relative_is_signed() {
        let (mem, mut regs) = machine(&encode_format3(Opcode::Lda, Nixbpe::SIMPLE | Nixbpe::B, 0xFFF));
        regs.set(RegisterName::B, 0x1000);
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.effective_address, 0x0FFF);
    }

    #[test]
    fn test_immediate_high_bit_is_negative() {
        let (mem, regs) = machine(&[0x01, 0x0F, 0xFF]);
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.mode, AddrMode::Immediate);
        assert_eq!(instr.effective_address, -1);
        assert_eq!(instr.operands, Operands::Memory { flags: Nixbpe::I, displacement: -1 });
    }

    #[test]
    fn test_direct_displacement_is_signed() {
        let (mem, mut regs) = machine(&encode_format3(Opcode::Lda, Nixbpe::SIMPLE | Nixbpe::X, 0x800));
        regs.set(RegisterName::X, 0x900);
        assert_eq!(decode(&mem, &regs, 0).unwrap().effective_address, 0x100);
    }

    #[test]
    fn test_pc_takes_precedence_over_base() {
        let flags = Nixbpe::SIMPLE | Nixbpe::P | Nixbpe::B;
        let (mem, mut regs) = machine(&encode_format3(Opcode::Lda, flags, 6));
        regs.set(RegisterName::B, 0x500);
        assert_eq!(decode(&mem, &regs, 0).unwrap().effective_address, 9);
    }

    #[test]
    fn test_indexed() {
        let (mem, mut regs) = machine(&encode_format3(Opcode::Lda, Nixbpe::SIMPLE | Nixbpe::X, 0x100));
        regs.set(RegisterName::X, 9);
        let instr = decode(&mem, &regs, 0).unwrap();
        assert!(instr.indexed);
        assert_eq!(instr.effective_address, 0x109);
    }

    #[test]
    fn test_format4_is_absolute() {
        let flags = Nixbpe::SIMPLE | Nixbpe::P;
        let (mem, regs) = machine(&encode_format4(Opcode::Jsub, flags, 0x1_0036));
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.format, Format::Four);
        assert_eq!(instr.size(), 4);
        assert_eq!(instr.effective_address, 0x1_0036);
    }

    #[test]
    fn test_indirect_follows_pointer() {
        let (mut mem, regs) = machine(&encode_format3(Opcode::J, Nixbpe::N, 30));
        mem.write_word(10, Word::new(0x300)).unwrap();
        let instr = decode(&mem, &regs, 0).unwrap();
        assert_eq!(instr.mode, AddrMode::Indirect);
        assert_eq!(instr.effective_address, 0x300);
    }

    #[test]
    fn test_indirect_pointer_is_sign_extended() {
        let (mut mem, regs) = machine(&encode_format3(Opcode::J, Nixbpe::N, 30));
        mem.write_word(10, Word::new(0xFF_FFFD)).unwrap();
        assert_eq!(decode(&mem, &regs, 0).unwrap().effective_address, -3);
    }

    #[test]
    fn test_indirect_misaligned() {
        let (mem, regs) = machine(&encode_format3(Opcode::Lda, Nixbpe::N, 31));
        let err = decode(&mem, &regs, 0).unwrap_err();
        assert_eq!(err, DecodeError::MisalignedAccess { address: 31, instruction: 0 });
    }

    #[test]
    fn test_indirect_out_of_bounds() {
        let (mem, regs) = machine(&encode_format4(Opcode::Lda, Nixbpe::N, 0xF_FFF0));
        assert!(matches!(decode(&mem, &regs, 0), Err(DecodeError::Memory(MemoryError::OutOfBounds { .. }))));
    }

    #[test]
    fn test_unknown_opcode() {
        let (mem, regs) = machine(&[0xFF]);
        assert_eq!(
            decode(&mem, &regs, 0).unwrap_err(),
            DecodeError::UnsupportedOpcode { opcode: 0xFF, address: 0 }
        );
    }

    #[test]
    fn test_truncated_instruction() {
        let mut mem = Memory::with_words(1);
        mem.load_bytes(1, &[0x03, 0x10]).unwrap();
        // Operand bytes run past the end of memory
        assert!(matches!(decode(&mem, &Registers::new(), 1), Err(DecodeError::Memory(_))));
    }

    proptest! {
        #[test]
        fn prop_pc_relative(disp in -2048i32..2048, pc in 0u32..2000) {
            let mut mem = Memory::with_words(1000);
            mem.load_bytes(pc as usize, &encode_format3(Opcode::Lda, Nixbpe::SIMPLE | Nixbpe::P, disp)).unwrap();
            let instr = decode(&mem, &Registers::new(), pc).unwrap();
            prop_assert_eq!(instr.effective_address, pc as i32 + 3 + disp);
        }

        #[test]
        fn prop_format3_displacement_is_signed(raw in 0i32..4096, flag_bits in 0u8..0x40, base in 0u64..0x10000) {
            let flags = Nixbpe::from_bits_truncate(flag_bits) - Nixbpe::E - Nixbpe::N;
            let mut mem = Memory::with_words(1000);
            mem.load_bytes(0, &encode_format3(Opcode::Lda, flags, raw)).unwrap();
            let mut regs = Registers::new();
            regs.set(RegisterName::B, base);
            regs.set(RegisterName::X, 7);

            let disp = if raw >= 0x800 { raw - 0x1000 } else { raw };
            let mut expected = disp;
            if flags.contains(Nixbpe::P) {
                expected += 3;
            } else if flags.contains(Nixbpe::B) {
                expected += base as i32;
            }
            if flags.contains(Nixbpe::X) {
                expected += 7;
            }

            let instr = decode(&mem, &regs, 0).unwrap();
            prop_assert_eq!(instr.format, Format::Three);
            prop_assert_eq!(instr.operands, Operands::Memory { flags, displacement: disp });
            prop_assert_eq!(instr.effective_address, expected);
        }

        #[test]
        fn prop_immediate_never_reads_operand(value in -2048i32..2048) {
            // Memory is exactly as large as the instruction
            let mut mem = Memory::with_words(1);
            mem.load_bytes(0, &encode_format3(Opcode::Lda, Nixbpe::I, value)).unwrap();
            let instr = decode(&mem, &Registers::new(), 0).unwrap();
            prop_assert_eq!(instr.effective_address, value);
        }
    }
}
