//! Disassembler for SIC/XE programs.
//!
//! Converts decoded instructions back to assembler notation.

use crate::cpu::decode::{decode, AddrMode, Format, Instruction, Nixbpe, Operands};
use crate::cpu::opcode::Opcode;
use crate::cpu::registers::{RegisterName, Registers};
use crate::cpu::Memory;

/// Disassemble a single decoded instruction to text.
pub fn disassemble_instruction(instr: &Instruction) -> String {
    match instr.operands {
        Operands::None => instr.opcode.mnemonic().to_string(),
        Operands::Registers { r1, r2 } => format_registers(instr.opcode, r1, r2),
        Operands::Memory { flags, displacement } => format_memory(instr, flags, displacement),
    }
}

/// Disassemble `len` bytes of memory starting at `start`.
///
/// Bytes that do not decode are listed as `BYTE` constants.
pub fn disassemble(mem: &Memory, start: usize, len: usize) -> String {
    let regs = Registers::new();
    let end = start.saturating_add(len).min(mem.size_bytes());

    let mut output = String::new();
    output.push_str(". SIC/XE Disassembly\n");
    output.push_str(". ------------------\n\n");

    let mut addr = start;
    while addr < end {
        let (size, text) = match decode(mem, &regs, addr as u32) {
            Ok(instr) => (instr.size() as usize, disassemble_instruction(&instr)),
            Err(_) => {
                let byte = mem.read_byte(addr).unwrap_or(0);
                (1, format!("BYTE X'{:02X}'", byte))
            }
        };
        let bytes: String = (addr..addr + size)
            .map(|a| format!("{:02X}", mem.read_byte(a).unwrap_or(0)))
            .collect();
        output.push_str(&format!("{:06X}: {:<8}  {}\n", addr, bytes, text));
        addr += size;
    }

    output
}

fn register_name(selector: u8) -> String {
    match RegisterName::from_number(selector) {
        Some(r) => r.to_string(),
        None => format!("R{}", selector),
    }
}

fn format_registers(opcode: Opcode, r1: u8, r2: u8) -> String {
    match opcode {
        Opcode::Clear | Opcode::Tixr => format!("{} {}", opcode, register_name(r1)),
        Opcode::Shiftl | Opcode::Shiftr => format!("{} {},{}", opcode, register_name(r1), r2 as u32 + 1),
        Opcode::Svc => format!("{} {}", opcode, r1),
        _ => format!("{} {},{}", opcode, register_name(r1), register_name(r2)),
    }
}

/// Format a format 3/4 operand with its addressing prefixes and suffixes.
fn format_memory(instr: &Instruction, flags: Nixbpe, displacement: i32) -> String {
    let plus = if instr.format == Format::Four { "+" } else { "" };
    if instr.opcode == Opcode::Rsub {
        return format!("{}{}", plus, instr.opcode);
    }

    let prefix = match instr.mode {
        AddrMode::Immediate => "#",
        AddrMode::Indirect => "@",
        AddrMode::Simple => "",
    };

    let relative = instr.format == Format::Three;
    let operand = if relative && flags.contains(Nixbpe::P) {
        signed_hex(instr.next_address() as i32 + displacement, 6)
    } else if relative && flags.contains(Nixbpe::B) {
        format!("{}(B)", signed_hex(displacement, 3))
    } else if instr.mode == AddrMode::Immediate {
        format!("{}", displacement)
    } else {
        signed_hex(displacement, 6)
    };

    let index = if instr.indexed { ",X" } else { "" };
    format!("{}{} {}{}{}", plus, instr.opcode, prefix, operand, index)
}

/// Zero-padded hex with a leading `-` for negative values.
fn signed_hex(value: i32, width: usize) -> String {
    if value < 0 {
        format!("-{:0width$X}", value.unsigned_abs(), width = width)
    } else {
        format!("{:0width$X}", value, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode_format1, encode_format2, encode_format3, encode_format4};

    fn decode_bytes(code: &[u8]) -> Instruction {
        let mut mem = Memory::with_words(100);
        mem.load_bytes(0, code).unwrap();
        decode(&mem, &Registers::new(), 0).unwrap()
    }

    fn text(code: &[u8]) -> String {
        disassemble_instruction(&decode_bytes(code))
    }

    #[test]
    fn test_disassemble_formats_1_and_2() {
        assert_eq!(text(&encode_format1(Opcode::Fix)), "FIX");
        assert_eq!(text(&encode_format2(Opcode::Addr, 4, 0)), "ADDR S,A");
        assert_eq!(text(&encode_format2(Opcode::Clear, 1, 0)), "CLEAR X");
        assert_eq!(text(&encode_format2(Opcode::Shiftl, 0, 3)), "SHIFTL A,4");
        assert_eq!(text(&encode_format2(Opcode::Rmo, 7, 0)), "RMO R7,A");
    }

    #[test]
    fn test_disassemble_addressing_modes() {
        assert_eq!(text(&encode_format3(Opcode::Lda, Nixbpe::I, 5)), "LDA #5");
        assert_eq!(text(&encode_format3(Opcode::J, Nixbpe::N, 30)), "J @00001E");
        assert_eq!(text(&encode_format3(Opcode::Sta, Nixbpe::SIMPLE | Nixbpe::P, -3)), "STA 000000");
        assert_eq!(text(&encode_format3(Opcode::Ldch, Nixbpe::SIMPLE | Nixbpe::B | Nixbpe::X, 0x10)), "LDCH 010(B),X");
        assert_eq!(text(&encode_format4(Opcode::Jsub, Nixbpe::SIMPLE, 0x1036)), "+JSUB 001036");
        assert_eq!(text(&encode_format3(Opcode::Rsub, Nixbpe::SIMPLE, 0)), "RSUB");
    }

    #[test]
    fn test_disassemble_negative_displacements() {
        assert_eq!(text(&encode_format3(Opcode::Lda, Nixbpe::I, 0xFFF)), "LDA #-1");
        assert_eq!(text(&encode_format3(Opcode::Ldt, Nixbpe::SIMPLE | Nixbpe::B, -16)), "LDT -010(B)");
        assert_eq!(text(&encode_format3(Opcode::J, Nixbpe::SIMPLE | Nixbpe::P, -6)), "J -000003");
    }

    #[test]
    fn test_disassemble_listing() {
        let mut mem = Memory::with_words(4);
        let mut code = encode_format3(Opcode::Lda, Nixbpe::I, 1).to_vec();
        code.push(0xFF);
        code.extend_from_slice(&encode_format2(Opcode::Tixr, 0, 0));
        mem.load_bytes(0, &code).unwrap();

        let listing = disassemble(&mem, 0, code.len());
        assert!(listing.contains("000000: 010001    LDA #1"));
        assert!(listing.contains("000003: FF        BYTE X'FF'"));
        assert!(listing.contains("000004: B800      TIXR A"));
    }
}
