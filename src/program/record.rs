//! SIC/XE object program records.
//!
//! An object program is a text file with one record per line:
//! - `H` name(6) start(6) length(6)
//! - `D` (name(6) address(6))*
//! - `R` name(6)*
//! - `T` start(6) length(2) code(2 hex digits per byte)
//! - `M` address(6) nibbles(2) [sign(1) symbol(6)]
//! - `E` [entry(6)]
//!
//! Fields are fixed-width hex, or separated by `^` as printed in listings.
//! Blank lines and lines starting with `.` are ignored.

use std::path::Path;

use thiserror::Error;

use crate::cpu::memory::MemoryError;

/// A `T` record: bytes to place at a program-relative address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub start: u32,
    pub bytes: Vec<u8>,
}

/// An `M` record: a field to relocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Address of the first byte holding the field.
    pub address: u32,
    /// Field length in half-bytes. An odd length starts in the low nibble.
    pub nibbles: u8,
    /// `true` to subtract the symbol value.
    pub negative: bool,
    /// Symbol whose value is added; `None` means the program's own address.
    pub symbol: Option<String>,
}

impl Modification {
    /// Valid field lengths: a relocated field is at most one word.
    pub const NIBBLES: std::ops::RangeInclusive<u32> = 1..=6;
}

/// A parsed object program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectProgram {
    pub name: String,
    pub start: u32,
    pub length: u32,
    /// Exported symbols (`D` records) with program-relative addresses.
    pub definitions: Vec<(String, u32)>,
    /// Imported symbols (`R` records).
    pub references: Vec<String>,
    pub text: Vec<TextRecord>,
    pub modifications: Vec<Modification>,
    /// First executable instruction (`E` record).
    pub entry: Option<u32>,
}

impl ObjectProgram {
    /// Total number of code bytes in all text records.
    pub fn code_size(&self) -> usize {
        self.text.iter().map(|t| t.bytes.len()).sum()
    }

    /// Address of an exported symbol.
    pub fn definition(&self, name: &str) -> Option<u32> {
        self.definitions
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, addr)| addr)
    }
}

/// Load an object program from disk.
pub fn load_object_file<P: AsRef<Path>>(path: P) -> Result<ObjectProgram, ObjectError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ObjectError::IoError(e.to_string()))?;
    parse_object(&text)
}

/// Parse object program text.
pub fn parse_object(source: &str) -> Result<ObjectProgram, ObjectError> {
    let mut program = ObjectProgram::default();
    let mut seen_header = false;

    for (line_num, raw) in source.lines().enumerate() {
        let line = raw.trim_end();
        if line.trim().is_empty() || line.starts_with('.') {
            continue;
        }

        let mut fields = Fields::new(line, line_num + 1);
        let kind = fields.kind();

        if !seen_header && kind != 'H' {
            return Err(ObjectError::MissingHeader);
        }

        match kind {
            'H' => {
                if seen_header {
                    return Err(fields.error("duplicate header record"));
                }
                seen_header = true;
                program.name = fields.name()?;
                program.start = fields.hex(6)?;
                program.length = fields.hex(6)?;
            }
            'D' => {
                while !fields.is_empty() {
                    let name = fields.name()?;
                    let addr = fields.hex(6)?;
                    program.definitions.push((name, addr));
                }
            }
            'R' => {
                while !fields.is_empty() {
                    program.references.push(fields.name()?);
                }
            }
            'T' => {
                let start = fields.hex(6)?;
                let len = fields.hex(2)? as usize;
                let code: String = fields
                    .rest()
                    .chars()
                    .filter(|c| *c != '^' && !c.is_whitespace())
                    .collect();
                if !code.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(fields.error("text record code is not hex"));
                }
                if code.len() != len * 2 {
                    return Err(fields.error(&format!("expected {} bytes of code, found {} hex digits", len, code.len())));
                }
                let bytes = code
                    .as_bytes()
                    .chunks_exact(2)
                    .map(|pair| (hex_digit(pair[0]) << 4) | hex_digit(pair[1]))
                    .collect();
                program.text.push(TextRecord { start, bytes });
            }
            'M' => {
                let address = fields.hex(6)?;
                let nibbles = fields.hex(2)?;
                if !Modification::NIBBLES.contains(&nibbles) {
                    return Err(fields.error(&format!("modification length {} outside 1..=6 half-bytes", nibbles)));
                }
                let nibbles = nibbles as u8;
                let (negative, symbol) = if fields.is_empty() {
                    (false, None)
                } else {
                    let sign = fields.sign()?;
                    (sign, Some(fields.name()?))
                };
                program.modifications.push(Modification { address, nibbles, negative, symbol });
            }
            'E' => {
                program.entry = if fields.is_empty() { None } else { Some(fields.hex(6)?) };
            }
            other => return Err(fields.error(&format!("unknown record type '{}'", other))),
        }
    }

    if !seen_header {
        return Err(ObjectError::MissingHeader);
    }
    Ok(program)
}

/// Value of an ASCII hex digit already checked with `is_ascii_hexdigit`.
fn hex_digit(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

/// Cursor over the fields of one record, fixed-width or `^`-separated.
struct Fields<'a> {
    line: usize,
    separated: bool,
    rest: &'a str,
}

impl<'a> Fields<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self {
            line,
            separated: text.contains('^'),
            rest: text,
        }
    }

    fn kind(&mut self) -> char {
        let kind = self.rest.chars().next().unwrap_or(' ').to_ascii_uppercase();
        self.rest = &self.rest[kind.len_utf8().min(self.rest.len())..];
        kind
    }

    fn is_empty(&self) -> bool {
        self.rest.trim_matches(|c: char| c == '^' || c.is_whitespace()).is_empty()
    }

    /// Take the next field: up to the next `^`, or `width` characters.
    fn take(&mut self, width: usize) -> &'a str {
        if self.separated {
            let s = self.rest.trim_start_matches('^');
            let end = s.find('^').unwrap_or(s.len());
            self.rest = &s[end..];
            s[..end].trim()
        } else {
            let end = self.rest.char_indices().nth(width).map_or(self.rest.len(), |(i, _)| i);
            let field = &self.rest[..end];
            self.rest = &self.rest[end..];
            field
        }
    }

    fn rest(&mut self) -> &'a str {
        let s = self.rest.trim_start_matches('^');
        self.rest = "";
        s.trim()
    }

    fn name(&mut self) -> Result<String, ObjectError> {
        let name = self.take(6).trim().to_string();
        if name.is_empty() {
            return Err(self.error("missing symbol name"));
        }
        Ok(name)
    }

    fn hex(&mut self, width: usize) -> Result<u32, ObjectError> {
        let field = self.take(width).trim();
        u32::from_str_radix(field, 16).map_err(|_| self.error(&format!("invalid hex field '{}'", field)))
    }

    /// The sign always directly precedes the symbol, even in `^` form.
    fn sign(&mut self) -> Result<bool, ObjectError> {
        let s = self.rest.trim_start_matches('^').trim_start();
        let negative = match s.chars().next() {
            Some('+') => false,
            Some('-') => true,
            other => {
                return Err(self.error(&format!("invalid modification sign {:?}", other)));
            }
        };
        self.rest = &s[1..];
        Ok(negative)
    }

    fn error(&self, message: &str) -> ObjectError {
        ObjectError::ParseError { line: self.line, message: message.to_string() }
    }
}

/// Errors that can occur while reading or loading an object program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("object program has no header record")]
    MissingHeader,

    #[error("modification at {address:#06X} spans {nibbles} half-bytes (at most 6)")]
    InvalidModification { address: u32, nibbles: u8 },

    #[error("unresolved external symbol '{0}'")]
    UnresolvedSymbol(String),

    #[error("load error: {0}")]
    Memory(#[from] MemoryError),
}
