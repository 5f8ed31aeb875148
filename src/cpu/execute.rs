//! Execution unit for the SIC/XE.
//!
//! Implements the semantics of every supported opcode against the register
//! bank and memory. The control unit advances PC past the instruction before
//! calling [`execute`], so jumps simply overwrite it.

use crate::cpu::control::RunState;
use crate::cpu::decode::{AddrMode, DecodeError, Instruction, Operands};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::opcode::Opcode;
use crate::cpu::registers::{ConditionCode, RegisterName, Registers};
use crate::word::{self, arith, Word};
use thiserror::Error;

/// What an executed instruction did besides ordinary register/memory writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outcome {
    /// The condition code, if the instruction set it.
    pub condition_code: Option<ConditionCode>,
    /// Set when RSUB ran with L = 0.
    pub halted: bool,
}

impl Outcome {
    fn cc(cc: ConditionCode) -> Self {
        Self { condition_code: Some(cc), halted: false }
    }
}

/// Execute one decoded instruction.
///
/// Every fallible step (operand fetch, divisor check, register lookup) runs
/// before the first write, so an error leaves registers and memory untouched.
pub fn execute(instr: &Instruction, regs: &mut Registers, mem: &mut Memory) -> Result<Outcome, CpuError> {
    use RegisterName::*;

    let outcome = match instr.opcode {
        // ==================== Load/Store ====================

        Opcode::Lda => load(instr, regs, mem, A)?,
        Opcode::Ldx => load(instr, regs, mem, X)?,
        Opcode::Ldl => load(instr, regs, mem, L)?,
        Opcode::Ldb => load(instr, regs, mem, B)?,
        Opcode::Lds => load(instr, regs, mem, S)?,
        Opcode::Ldt => load(instr, regs, mem, T)?,

        Opcode::Ldch => {
            let byte = operand_byte(instr, mem)?;
            let a = regs.word(A).with_low_byte(byte);
            regs.set_word(A, a);
            Outcome::default()
        }

        Opcode::Sta => store(instr, regs, mem, A)?,
        Opcode::Stx => store(instr, regs, mem, X)?,
        Opcode::Stl => store(instr, regs, mem, L)?,
        Opcode::Stb => store(instr, regs, mem, B)?,
        Opcode::Sts => store(instr, regs, mem, S)?,
        Opcode::Stt => store(instr, regs, mem, T)?,

        Opcode::Stch => {
            let address = target_address(instr.effective_address, mem)?;
            mem.write_byte(address, regs.word(A).low_byte())?;
            Outcome::default()
        }

        // ==================== Arithmetic ====================

        Opcode::Add => accumulate(instr, regs, mem, arith::add)?,
        Opcode::Sub => accumulate(instr, regs, mem, arith::sub)?,
        Opcode::Mul => accumulate(instr, regs, mem, arith::mul)?,
        Opcode::And => accumulate(instr, regs, mem, arith::and)?,
        Opcode::Or => accumulate(instr, regs, mem, arith::or)?,

        Opcode::Div => {
            let divisor = operand_word(instr, mem)?;
            let quotient = arith::div(regs.word(A), divisor).ok_or(CpuError::DivisionByZero {
                opcode: instr.opcode,
                address: instr.address,
            })?;
            regs.set_word(A, quotient);
            Outcome::cc(arith::sign(quotient).into())
        }

        Opcode::Comp => {
            let operand = operand_word(instr, mem)?;
            Outcome::cc(word::compare(regs.word(A), operand).into())
        }

        Opcode::Tix => {
            let operand = operand_word(instr, mem)?;
            let x = arith::add(regs.word(X), Word::new(1));
            regs.set_word(X, x);
            Outcome::cc(word::compare(x, operand).into())
        }

        // ==================== Control Flow ====================

        Opcode::J => jump(regs, instr.effective_address),
        Opcode::Jeq => jump_if(regs, instr.effective_address, ConditionCode::Equal),
        Opcode::Jgt => jump_if(regs, instr.effective_address, ConditionCode::Greater),
        Opcode::Jlt => jump_if(regs, instr.effective_address, ConditionCode::Less),

        Opcode::Jsub => {
            regs.set(L, regs.pc() as u64);
            jump(regs, instr.effective_address)
        }

        Opcode::Rsub => {
            let l = regs.get(L);
            if l == 0 {
                Outcome { condition_code: None, halted: true }
            } else {
                regs.set_pc(l as u32);
                Outcome::default()
            }
        }

        // ==================== Register-Register ====================

        Opcode::Addr => combine(instr, regs, |a, b| Some(arith::add(a, b)))?,
        Opcode::Subr => combine(instr, regs, |a, b| Some(arith::sub(a, b)))?,
        Opcode::Mulr => combine(instr, regs, |a, b| Some(arith::mul(a, b)))?,
        Opcode::Divr => combine(instr, regs, arith::div)?,

        Opcode::Compr => {
            let (r1, r2) = register_pair(instr)?;
            Outcome::cc(word::compare(regs.word(r1), regs.word(r2)).into())
        }

        Opcode::Shiftl | Opcode::Shiftr => {
            let (r1, n) = selectors(instr)?;
            let r1 = word_register(r1, instr)?;
            // The second nibble holds the count minus one
            let count = n as u32 + 1;
            let value = if instr.opcode == Opcode::Shiftl {
                arith::shift_left(regs.word(r1), count)
            } else {
                arith::shift_right(regs.word(r1), count)
            };
            regs.set_word(r1, value);
            Outcome::cc(arith::sign(value).into())
        }

        Opcode::Rmo => {
            let (r1, r2) = register_pair(instr)?;
            regs.set_word(r2, regs.word(r1));
            Outcome::default()
        }

        Opcode::Clear => {
            let (r1, _) = selectors(instr)?;
            let r1 = RegisterName::from_number(r1)
                .ok_or(CpuError::InvalidRegister { selector: r1, address: instr.address })?;
            regs.set(r1, 0);
            Outcome::default()
        }

        Opcode::Tixr => {
            let (r1, _) = selectors(instr)?;
            let r1 = word_register(r1, instr)?;
            let x = arith::add(regs.word(X), Word::new(1));
            regs.set_word(X, x);
            Outcome::cc(word::compare(x, regs.word(r1)).into())
        }

        // ==================== Unsupported ====================

        Opcode::Addf
        | Opcode::Subf
        | Opcode::Mulf
        | Opcode::Divf
        | Opcode::Ldf
        | Opcode::Stf
        | Opcode::Compf
        | Opcode::Float
        | Opcode::Fix
        | Opcode::Norm
        | Opcode::Lps
        | Opcode::Sti
        | Opcode::Stsw
        | Opcode::Ssk
        | Opcode::Svc
        | Opcode::Rd
        | Opcode::Wd
        | Opcode::Td
        | Opcode::Sio
        | Opcode::Hio
        | Opcode::Tio => {
            return Err(CpuError::UnsupportedInstruction {
                opcode: instr.opcode,
                address: instr.address,
            })
        }
    };

    if let Some(cc) = outcome.condition_code {
        regs.set_condition_code(cc);
    }

    Ok(outcome)
}

/// Convert an effective address into a byte address.
fn target_address(address: i32, mem: &Memory) -> Result<usize, MemoryError> {
    usize::try_from(address)
        .map_err(|_| MemoryError::OutOfBounds { address: address as i64, limit: mem.size_bytes() })
}

/// Fetch a word operand, honoring immediate mode.
fn operand_word(instr: &Instruction, mem: &Memory) -> Result<Word, MemoryError> {
    match instr.mode {
        AddrMode::Immediate => Ok(Word::from_i32(instr.effective_address)),
        AddrMode::Simple | AddrMode::Indirect => {
            mem.read_word_at(target_address(instr.effective_address, mem)?)
        }
    }
}

/// Fetch a byte operand, honoring immediate mode.
fn operand_byte(instr: &Instruction, mem: &Memory) -> Result<u8, MemoryError> {
    match instr.mode {
        AddrMode::Immediate => Ok(instr.effective_address as u8),
        AddrMode::Simple | AddrMode::Indirect => {
            mem.read_byte(target_address(instr.effective_address, mem)?)
        }
    }
}

fn load(instr: &Instruction, regs: &mut Registers, mem: &Memory, reg: RegisterName) -> Result<Outcome, CpuError> {
    let value = operand_word(instr, mem)?;
    regs.set_word(reg, value);
    Ok(Outcome::default())
}

fn store(instr: &Instruction, regs: &Registers, mem: &mut Memory, reg: RegisterName) -> Result<Outcome, CpuError> {
    let address = target_address(instr.effective_address, mem)?;
    mem.write_word_at(address, regs.word(reg))?;
    Ok(Outcome::default())
}

/// `A <- A op operand`, setting the condition code from the result.
fn accumulate(
    instr: &Instruction,
    regs: &mut Registers,
    mem: &Memory,
    op: fn(Word, Word) -> Word,
) -> Result<Outcome, CpuError> {
    let operand = operand_word(instr, mem)?;
    let result = op(regs.word(RegisterName::A), operand);
    regs.set_word(RegisterName::A, result);
    Ok(Outcome::cc(arith::sign(result).into()))
}

/// `r2 <- r2 op r1`, setting the condition code from the result.
/// `op` returns `None` for a zero divisor.
fn combine(
    instr: &Instruction,
    regs: &mut Registers,
    op: impl Fn(Word, Word) -> Option<Word>,
) -> Result<Outcome, CpuError> {
    let (r1, r2) = register_pair(instr)?;
    let result = op(regs.word(r2), regs.word(r1)).ok_or(CpuError::DivisionByZero {
        opcode: instr.opcode,
        address: instr.address,
    })?;
    regs.set_word(r2, result);
    Ok(Outcome::cc(arith::sign(result).into()))
}

fn jump(regs: &mut Registers, target: i32) -> Outcome {
    regs.set_pc(target as u32);
    Outcome::default()
}

fn jump_if(regs: &mut Registers, target: i32, cc: ConditionCode) -> Outcome {
    if regs.condition_code() == Some(cc) {
        regs.set_pc(target as u32);
    }
    Outcome::default()
}

/// The two register selectors of a format 2 instruction.
fn selectors(instr: &Instruction) -> Result<(u8, u8), CpuError> {
    match instr.operands {
        Operands::Registers { r1, r2 } => Ok((r1, r2)),
        _ => Err(CpuError::UnsupportedInstruction {
            opcode: instr.opcode,
            address: instr.address,
        }),
    }
}

/// Resolve a selector to a 24-bit register. F is rejected: format-2
/// arithmetic never touches the floating-point accumulator.
fn word_register(selector: u8, instr: &Instruction) -> Result<RegisterName, CpuError> {
    match RegisterName::from_number(selector) {
        Some(RegisterName::F) | None => Err(CpuError::InvalidRegister { selector, address: instr.address }),
        Some(r) => Ok(r),
    }
}

fn register_pair(instr: &Instruction) -> Result<(RegisterName, RegisterName), CpuError> {
    let (r1, r2) = selectors(instr)?;
    Ok((word_register(r1, instr)?, word_register(r2, instr)?))
}

/// The error taxonomy every [`CpuError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Memory access outside the configured size.
    OutOfBounds,
    /// Indirect addressing through a non-word-aligned address.
    MisalignedAccess,
    /// DIV or DIVR with a zero divisor.
    DivisionByZero,
    /// Opcode, format or operand with no defined semantics.
    UnsupportedInstruction,
    /// `step()` called while halted.
    InvalidRunState,
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    InvalidRunState(RunState),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("division by zero in {opcode} at {address:#06X}")]
    DivisionByZero { opcode: Opcode, address: u32 },

    #[error("unsupported instruction {opcode} at {address:#06X}")]
    UnsupportedInstruction { opcode: Opcode, address: u32 },

    #[error("invalid register selector {selector} at {address:#06X}")]
    InvalidRegister { selector: u8, address: u32 },
}

impl CpuError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CpuError::InvalidRunState(_) => ErrorKind::InvalidRunState,
            CpuError::Memory(MemoryError::OutOfBounds { .. }) => ErrorKind::OutOfBounds,
            CpuError::Memory(MemoryError::ProgramTooLarge { .. }) => ErrorKind::OutOfBounds,
            CpuError::Decode(DecodeError::Memory(_)) => ErrorKind::OutOfBounds,
            CpuError::Decode(DecodeError::MisalignedAccess { .. }) => ErrorKind::MisalignedAccess,
            CpuError::Decode(DecodeError::UnsupportedOpcode { .. }) => ErrorKind::UnsupportedInstruction,
            CpuError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
            CpuError::UnsupportedInstruction { .. } => ErrorKind::UnsupportedInstruction,
            CpuError::InvalidRegister { .. } => ErrorKind::UnsupportedInstruction,
        }
    }
}
