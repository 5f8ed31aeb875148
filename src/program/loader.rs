//! Relocating loader for object programs.

use tracing::debug;

use super::record::{Modification, ObjectProgram, ObjectError};
use crate::cpu::{Cpu, Memory};

/// Where a program ended up after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedProgram {
    pub name: String,
    /// Byte address of the program's first byte.
    pub load_address: u32,
    pub length: u32,
    /// Byte address of the first instruction to execute.
    pub entry: u32,
}

/// Copy an object program into memory and apply its modification records.
///
/// The program is placed at `load_address`, or at the start address from
/// its header when `None`. Only symbols defined by the program itself can
/// be resolved.
pub fn load_object(
    mem: &mut Memory,
    program: &ObjectProgram,
    load_address: Option<u32>,
) -> Result<LoadedProgram, ObjectError> {
    if let Some(m) = program
        .modifications
        .iter()
        .find(|m| !Modification::NIBBLES.contains(&(m.nibbles as u32)))
    {
        return Err(ObjectError::InvalidModification { address: m.address, nibbles: m.nibbles });
    }

    let base = load_address.unwrap_or(program.start);
    let relocate = |addr: u32| -> u32 { addr.wrapping_sub(program.start).wrapping_add(base) };

    for text in &program.text {
        mem.load_bytes(relocate(text.start) as usize, &text.bytes)?;
    }

    for m in &program.modifications {
        let value = symbol_value(program, base, m)?;
        patch_field(mem, relocate(m.address) as usize, m, value)?;
    }

    let entry = program.entry.map_or(base, relocate);
    debug!(
        name = %program.name,
        load_address = base,
        bytes = program.code_size(),
        modifications = program.modifications.len(),
        "object program loaded"
    );

    Ok(LoadedProgram {
        name: program.name.clone(),
        load_address: base,
        length: program.length,
        entry,
    })
}

/// Load an object program into a CPU's memory and point PC at its entry.
pub fn load_and_start(
    cpu: &mut Cpu,
    program: &ObjectProgram,
    load_address: Option<u32>,
) -> Result<LoadedProgram, ObjectError> {
    let loaded = load_object(&mut cpu.mem, program, load_address)?;
    cpu.set_program_counter(loaded.entry);
    Ok(loaded)
}

fn symbol_value(program: &ObjectProgram, base: u32, m: &Modification) -> Result<u32, ObjectError> {
    match m.symbol.as_deref() {
        None => Ok(base),
        Some(name) if name == program.name => Ok(base),
        Some(name) => program
            .definition(name)
            .map(|addr| addr.wrapping_sub(program.start).wrapping_add(base))
            .ok_or_else(|| ObjectError::UnresolvedSymbol(name.to_string())),
    }
}

/// Add (or subtract) `value` to the `m.nibbles`-wide field at `address`.
///
/// The field is right-aligned in `ceil(nibbles / 2)` bytes; any high nibble
/// outside it is preserved. `nibbles` is at most 6.
fn patch_field(mem: &mut Memory, address: usize, m: &Modification, value: u32) -> Result<(), ObjectError> {
    let nbytes = (m.nibbles as usize + 1) / 2;
    let mask = (1u64 << (4 * m.nibbles as u32)) - 1;

    let mut raw = 0u64;
    for i in 0..nbytes {
        raw = (raw << 8) | mem.read_byte(address + i)? as u64;
    }

    let field = raw & mask;
    let patched = if m.negative {
        field.wrapping_sub(value as u64)
    } else {
        field.wrapping_add(value as u64)
    } & mask;
    let raw = (raw & !mask) | patched;

    for i in 0..nbytes {
        let shift = 8 * (nbytes - 1 - i);
        mem.write_byte(address + i, (raw >> shift) as u8)?;
    }
    Ok(())
}
