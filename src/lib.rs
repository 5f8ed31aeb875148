//! # SIC/XE Emulator
//!
//! An instruction execution engine for the SIC/XE architecture.
//!
//! The machine has a 24-bit word, byte-addressed memory organized in
//! 3-byte words, nine registers and four instruction formats. This crate
//! decodes and executes programs one instruction at a time, reporting
//! every completed step to registered observers.

pub mod word;
pub mod cpu;
pub mod config;
pub mod program;

// Re-export commonly used types
pub use word::Word;
pub use cpu::{
    Cpu, CpuError, CpuSnapshot, ErrorKind, RunState, StepRecord, Memory, MemoryError,
    Registers, RegisterName, ConditionCode, Instruction, Opcode, HistoryLog, StepObserver,
};
pub use config::{MachineConfig, ConfigError};
pub use program::{ObjectProgram, ObjectError, load_object_file, load_and_start, disassemble};
