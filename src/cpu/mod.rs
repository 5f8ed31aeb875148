//! CPU emulation for the SIC/XE.
//!
//! This module implements the SIC/XE instruction execution engine:
//! - Word-organized, byte-addressable memory
//! - 9 registers: A, X, L, B, S, T, F, PC, SW
//! - 4 instruction formats with immediate, indirect, indexed,
//!   pc-relative and base-relative addressing

pub mod memory;
pub mod registers;
pub mod opcode;
pub mod decode;
pub mod execute;
pub mod control;
pub mod observer;

pub use memory::{Memory, MemoryError};
pub use registers::{Registers, RegisterName, ConditionCode};
pub use opcode::{Opcode, OpcodeClass};
pub use decode::{Instruction, AddrMode, Format, Nixbpe, Operands, DecodeError};
pub use execute::{CpuError, ErrorKind, Outcome};
pub use control::{Cpu, CpuSnapshot, RunState, StepRecord};
pub use observer::{HistoryLog, StepObserver};
