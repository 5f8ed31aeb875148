//! Object programs: loading and disassembly.
//!
//! This module provides:
//! - A parser for SIC/XE object records (H, D, R, T, M, E)
//! - A relocating loader that places programs in memory
//! - A disassembler (memory → assembler text)

pub mod record;
pub mod loader;
pub mod disasm;

pub use record::{ObjectProgram, ObjectError, TextRecord, Modification, parse_object, load_object_file};
pub use loader::{LoadedProgram, load_object, load_and_start};
pub use disasm::{disassemble, disassemble_instruction};
