//! The SIC/XE opcode table.
//!
//! Every opcode of the architecture is listed, including the ones this
//! emulator refuses to execute (floating point, device I/O, system calls).
//! Decoding them succeeds so they can be disassembled; executing them fails
//! with an unsupported-instruction error.

use std::fmt;

/// How an opcode is encoded in the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// Format 1: the opcode byte alone.
    OneByte,
    /// Format 2: opcode byte plus a byte of two register nibbles.
    TwoByte,
    /// Format 3 or 4: 6-bit opcode plus n/i flags, selected by the e flag.
    ThreeOrFour,
}

macro_rules! opcodes {
    ($( $variant:ident = $byte:literal, $mnemonic:literal, $class:ident; )*) => {
        /// A SIC/XE opcode.
        ///
        /// For format 3/4 opcodes the value is the opcode byte with the
        /// n and i bits cleared.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $variant, )*
        }

        impl Opcode {
            /// All opcodes, in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$variant, )* ];

            /// The opcode byte (n/i bits clear for format 3/4).
            pub const fn byte(self) -> u8 {
                match self {
                    $( Opcode::$variant => $byte, )*
                }
            }

            /// Assembler mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$variant => $mnemonic, )*
                }
            }

            /// Encoding class.
            pub const fn class(self) -> OpcodeClass {
                match self {
                    $( Opcode::$variant => OpcodeClass::$class, )*
                }
            }
        }
    };
}

opcodes! {
    // ==================== Format 3/4: load/store ====================
    Lda = 0x00, "LDA", ThreeOrFour;
    Ldx = 0x04, "LDX", ThreeOrFour;
    Ldl = 0x08, "LDL", ThreeOrFour;
    Sta = 0x0C, "STA", ThreeOrFour;
    Stx = 0x10, "STX", ThreeOrFour;
    Stl = 0x14, "STL", ThreeOrFour;
    Ldch = 0x50, "LDCH", ThreeOrFour;
    Stch = 0x54, "STCH", ThreeOrFour;
    Ldb = 0x68, "LDB", ThreeOrFour;
    Lds = 0x6C, "LDS", ThreeOrFour;
    Ldt = 0x74, "LDT", ThreeOrFour;
    Stb = 0x78, "STB", ThreeOrFour;
    Sts = 0x7C, "STS", ThreeOrFour;
    Stt = 0x84, "STT", ThreeOrFour;

    // ==================== Format 3/4: arithmetic ====================
    Add = 0x18, "ADD", ThreeOrFour;
    Sub = 0x1C, "SUB", ThreeOrFour;
    Mul = 0x20, "MUL", ThreeOrFour;
    Div = 0x24, "DIV", ThreeOrFour;
    Comp = 0x28, "COMP", ThreeOrFour;
    Tix = 0x2C, "TIX", ThreeOrFour;
    And = 0x40, "AND", ThreeOrFour;
    Or = 0x44, "OR", ThreeOrFour;

    // ==================== Format 3/4: control flow ====================
    Jeq = 0x30, "JEQ", ThreeOrFour;
    Jgt = 0x34, "JGT", ThreeOrFour;
    Jlt = 0x38, "JLT", ThreeOrFour;
    J = 0x3C, "J", ThreeOrFour;
    Jsub = 0x48, "JSUB", ThreeOrFour;
    Rsub = 0x4C, "RSUB", ThreeOrFour;

    // ==================== Format 3/4: floating point ====================
    Addf = 0x58, "ADDF", ThreeOrFour;
    Subf = 0x5C, "SUBF", ThreeOrFour;
    Mulf = 0x60, "MULF", ThreeOrFour;
    Divf = 0x64, "DIVF", ThreeOrFour;
    Ldf = 0x70, "LDF", ThreeOrFour;
    Stf = 0x80, "STF", ThreeOrFour;
    Compf = 0x88, "COMPF", ThreeOrFour;

    // ==================== Format 3/4: system and device I/O ====================
    Lps = 0xD0, "LPS", ThreeOrFour;
    Sti = 0xD4, "STI", ThreeOrFour;
    Rd = 0xD8, "RD", ThreeOrFour;
    Wd = 0xDC, "WD", ThreeOrFour;
    Td = 0xE0, "TD", ThreeOrFour;
    Stsw = 0xE8, "STSW", ThreeOrFour;
    Ssk = 0xEC, "SSK", ThreeOrFour;

    // ==================== Format 2 ====================
    Addr = 0x90, "ADDR", TwoByte;
    Subr = 0x94, "SUBR", TwoByte;
    Mulr = 0x98, "MULR", TwoByte;
    Divr = 0x9C, "DIVR", TwoByte;
    Compr = 0xA0, "COMPR", TwoByte;
    Shiftl = 0xA4, "SHIFTL", TwoByte;
    Shiftr = 0xA8, "SHIFTR", TwoByte;
    Rmo = 0xAC, "RMO", TwoByte;
    Svc = 0xB0, "SVC", TwoByte;
    Clear = 0xB4, "CLEAR", TwoByte;
    Tixr = 0xB8, "TIXR", TwoByte;

    // ==================== Format 1 ====================
    Float = 0xC0, "FLOAT", OneByte;
    Fix = 0xC4, "FIX", OneByte;
    Norm = 0xC8, "NORM", OneByte;
    Sio = 0xF0, "SIO", OneByte;
    Hio = 0xF4, "HIO", OneByte;
    Tio = 0xF8, "TIO", OneByte;
}

impl Opcode {
    /// Classify the first byte of an instruction.
    ///
    /// Format 1 and 2 opcodes must match the byte exactly. Otherwise the
    /// n/i bits are masked off and the remaining 6 bits must name a
    /// format 3/4 opcode.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        if let Some(op) = Self::lookup(byte) {
            if op.class() != OpcodeClass::ThreeOrFour {
                return Some(op);
            }
        }
        Self::lookup(byte & 0xFC).filter(|op| op.class() == OpcodeClass::ThreeOrFour)
    }

    /// Look up an opcode by its exact byte (n/i clear for format 3/4).
    pub fn lookup(byte: u8) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| op.byte() == byte)
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    /// Whether the execution unit implements this opcode.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            Opcode::Addf
                | Opcode::Subf
                | Opcode::Mulf
                | Opcode::Divf
                | Opcode::Ldf
                | Opcode::Stf
                | Opcode::Compf
                | Opcode::Lps
                | Opcode::Sti
                | Opcode::Rd
                | Opcode::Wd
                | Opcode::Td
                | Opcode::Stsw
                | Opcode::Ssk
                | Opcode::Svc
                | Opcode::Float
                | Opcode::Fix
                | Opcode::Norm
                | Opcode::Sio
                | Opcode::Hio
                | Opcode::Tio
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
