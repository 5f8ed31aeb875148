//! 24-bit machine words.
//!
//! This module provides the word type used throughout the SIC/XE:
//! - [`Word`] - a 3-byte big-endian value (memory cells, 24-bit registers)
//! - [`arith`] - wrapping 24-bit arithmetic and shifts

mod value;
pub mod arith;

pub use value::Word;
pub use arith::{add, sub, mul, div, compare};
