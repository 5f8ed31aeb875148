//! Control unit for the SIC/XE.
//!
//! Owns the machine (registers + memory), runs the fetch-decode-execute
//! cycle and tracks the running/halted state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, trace, warn};

use crate::config::{ConfigError, MachineConfig};
use crate::cpu::decode::{self, Instruction};
use crate::cpu::execute::{self, CpuError};
use crate::cpu::memory::MemoryError;
use crate::cpu::observer::StepObserver;
use crate::cpu::{ConditionCode, Memory, RegisterName, Registers};
use crate::program::disasm::disassemble_instruction;
use crate::word::Word;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (RSUB with L = 0).
    Halted,
}

/// What one `step()` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Cycle number of this step, starting at 1.
    pub cycle: u64,
    /// Address the instruction was fetched from.
    pub address: u32,
    pub instruction: Instruction,
    /// Condition code set by the instruction, if any.
    pub condition_code: Option<ConditionCode>,
    /// Whether this step halted the machine.
    pub halted: bool,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {:06X}  {}", self.cycle, self.address, disassemble_instruction(&self.instruction))?;
        if let Some(cc) = self.condition_code {
            write!(f, "  CC={}", cc.symbol())?;
        }
        if self.halted {
            write!(f, "  [halt]")?;
        }
        Ok(())
    }
}

/// Serializable machine state (registers, run-state, cycle count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub registers: BTreeMap<RegisterName, u64>,
    pub condition_code: Option<ConditionCode>,
    pub state: RunState,
    pub cycles: u64,
}

/// The SIC/XE CPU.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    state: RunState,
    /// Instruction count.
    cycles: u64,
    observers: Vec<Arc<dyn StepObserver>>,
}

impl Cpu {
    /// Create a CPU with default-sized, zeroed memory.
    pub fn new() -> Self {
        Self::with_memory(Memory::default())
    }

    /// Create a CPU around an existing memory.
    pub fn with_memory(mem: Memory) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            state: RunState::Running,
            cycles: 0,
            observers: Vec::new(),
        }
    }

    /// Create a CPU from a configuration.
    pub fn with_config(config: &MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut cpu = Self::with_memory(Memory::new(config.memory_bytes));
        cpu.set_program_counter(config.start_address);
        Ok(cpu)
    }

    /// Register an observer notified after every step.
    pub fn add_observer(&mut self, observer: Arc<dyn StepObserver>) {
        self.observers.push(observer);
    }

    /// Reset to the initial state: registers cleared, PC = 0, running.
    ///
    /// Memory is left as it is.
    pub fn reset(&mut self) {
        self.regs.clear_all();
        self.state = RunState::Running;
        self.cycles = 0;
        debug!("cpu reset");
        for observer in &self.observers {
            observer.on_reset();
        }
    }

    /// Copy a program image into memory at a byte address.
    pub fn load_program(&mut self, address: usize, image: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_bytes(address, image)?;
        debug!(address, len = image.len(), "program loaded");
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Fails with [`CpuError::InvalidRunState`] once halted. On any other
    /// error the program counter is restored, so the failed step leaves no
    /// trace in the machine state.
    pub fn step(&mut self) -> Result<StepRecord, CpuError> {
        if self.state != RunState::Running {
            return Err(CpuError::InvalidRunState(self.state));
        }

        let pc = self.regs.pc();
        match self.cycle(pc) {
            Ok(record) => {
                trace!("{}", record);
                for observer in &self.observers {
                    observer.on_step(&record);
                }
                Ok(record)
            }
            Err(e) => {
                self.regs.set_pc(pc);
                warn!(pc, error = %e, "step failed");
                for observer in &self.observers {
                    observer.on_error(pc, &e);
                }
                Err(e)
            }
        }
    }

    /// Fetch, decode, advance PC, execute.
    fn cycle(&mut self, pc: u32) -> Result<StepRecord, CpuError> {
        let instr = decode::decode(&self.mem, &self.regs, pc)?;
        self.regs.advance_pc(instr.size());

        let outcome = execute::execute(&instr, &mut self.regs, &mut self.mem)?;

        self.cycles += 1;
        if outcome.halted {
            self.state = RunState::Halted;
            debug!(cycles = self.cycles, "cpu halted");
        }

        Ok(StepRecord {
            cycle: self.cycles,
            address: pc,
            instruction: instr,
            condition_code: outcome.condition_code,
            halted: outcome.halted,
        })
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == RunState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == RunState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Current run-state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Instructions executed since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == RunState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Current value of a register.
    pub fn register(&self, name: RegisterName) -> u64 {
        self.regs.get(name)
    }

    /// Read a memory word by word index.
    pub fn read_memory_word(&self, index: usize) -> Result<Word, MemoryError> {
        self.mem.read_word(index)
    }

    /// Read a memory byte by byte address.
    pub fn read_memory_byte(&self, address: usize) -> Result<u8, MemoryError> {
        self.mem.read_byte(address)
    }

    /// Set the program counter (start address).
    pub fn set_program_counter(&mut self, address: u32) {
        self.regs.set_pc(address);
    }

    /// Capture the register file and run-state.
    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.regs.iter().collect(),
            condition_code: self.regs.condition_code(),
            state: self.state,
            cycles: self.cycles,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode_format2, encode_format3, Nixbpe};
    use crate::cpu::execute::ErrorKind;
    use crate::cpu::opcode::Opcode;

    fn make_program(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    fn f3(op: Opcode, disp: i32) -> [u8; 3] {
        encode_format3(op, Nixbpe::SIMPLE, disp)
    }

    #[test]
    fn test_lda_add_sta() {
        let mut cpu = Cpu::new();
        cpu.mem.write_word(20, Word::new(7)).unwrap();
        let program = make_program(&[
            &encode_format3(Opcode::Lda, Nixbpe::I, 5),
            &f3(Opcode::Add, 60),
            &f3(Opcode::Sta, 90),
        ]);
        cpu.load_program(0, &program).unwrap();

        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.register(RegisterName::A), 12);

        cpu.step().unwrap();
        assert_eq!(cpu.read_memory_word(30).unwrap().to_u32(), 12);
        assert_eq!(cpu.register(RegisterName::PC), 9);
        assert_eq!(cpu.cycles(), 3);
    }

    #[test]
    fn test_rsub_with_zero_link_halts() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &f3(Opcode::Rsub, 0)).unwrap();

        let record = cpu.step().unwrap();
        assert!(record.halted);
        assert!(cpu.is_halted());
        assert_eq!(cpu.state(), RunState::Halted);

        let err = cpu.step().unwrap_err();
        assert_eq!(err, CpuError::InvalidRunState(RunState::Halted));
        assert_eq!(err.kind(), ErrorKind::InvalidRunState);
    }

    #[test]
    fn test_subroutine_call_and_return() {
        let mut cpu = Cpu::new();
        // 0: JSUB sub ; 3: LDA #1 ; 6: J end ; 9: sub: LDT #2 ; 12: RSUB ; 15: end: CLEAR L ; 17: RSUB
        let program = make_program(&[
            &f3(Opcode::Jsub, 9),
            &encode_format3(Opcode::Lda, Nixbpe::I, 1),
            &f3(Opcode::J, 15),
            &encode_format3(Opcode::Ldt, Nixbpe::I, 2),
            &f3(Opcode::Rsub, 0),
            &encode_format2(Opcode::Clear, 2, 0),
            &f3(Opcode::Rsub, 0),
        ]);
        cpu.load_program(0, &program).unwrap();

        let executed = cpu.run().unwrap();

        // JSUB, LDT, RSUB, LDA, J, CLEAR, RSUB
        assert_eq!(executed, 7);
        assert!(cpu.is_halted());
        assert_eq!(cpu.register(RegisterName::A), 1);
        assert_eq!(cpu.register(RegisterName::T), 2);
    }

    #[test]
    fn test_counting_loop() {
        let mut cpu = Cpu::new();
        // loop: TIX #5 ; JLT loop ; RSUB
        let program = make_program(&[
            &encode_format3(Opcode::Tix, Nixbpe::I, 5),
            &encode_format3(Opcode::Jlt, Nixbpe::SIMPLE | Nixbpe::P, -6),
            &f3(Opcode::Rsub, 0),
        ]);
        cpu.load_program(0, &program).unwrap();

        cpu.run().unwrap();
        assert_eq!(cpu.register(RegisterName::X), 5);
        assert_eq!(cpu.cycles(), 11);
    }

    #[test]
    fn test_div_by_zero_restores_pc() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &encode_format3(Opcode::Div, Nixbpe::I, 0)).unwrap();
        cpu.regs.set(RegisterName::A, 9);

        let err = cpu.step().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivisionByZero);
        assert_eq!(cpu.register(RegisterName::A), 9);
        assert_eq!(cpu.register(RegisterName::PC), 0);
        assert_eq!(cpu.cycles(), 0);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_misaligned_indirect() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &encode_format3(Opcode::Lda, Nixbpe::N, 100)).unwrap();
        assert_eq!(cpu.step().unwrap_err().kind(), ErrorKind::MisalignedAccess);
    }

    #[test]
    fn test_fetch_out_of_bounds() {
        let mut cpu = Cpu::with_memory(Memory::with_words(2));
        cpu.load_program(0, &f3(Opcode::J, 0x7FF)).unwrap();

        cpu.step().unwrap();
        assert_eq!(cpu.register(RegisterName::PC), 0x7FF);
        assert_eq!(cpu.step().unwrap_err().kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_reset_keeps_memory() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &f3(Opcode::Rsub, 0)).unwrap();
        cpu.regs.set(RegisterName::S, 99);
        cpu.run().unwrap();
        assert!(cpu.is_halted());

        cpu.reset();
        assert!(cpu.is_running());
        assert_eq!(cpu.cycles(), 0);
        assert!(cpu.regs.iter().all(|(_, v)| v == 0));
        assert_eq!(cpu.read_memory_byte(0).unwrap(), Opcode::Rsub.byte() | 0x03);

        cpu.run().unwrap();
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_start_address() {
        let mut cpu = Cpu::new();
        cpu.load_program(0x300, &f3(Opcode::Rsub, 0)).unwrap();
        cpu.set_program_counter(0x300);
        let record = cpu.step().unwrap();
        assert_eq!(record.address, 0x300);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_run_limited() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &f3(Opcode::J, 0)).unwrap();
        assert_eq!(cpu.run_limited(25).unwrap(), 25);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_step_record_display() {
        let mut cpu = Cpu::new();
        cpu.load_program(0, &encode_format3(Opcode::Comp, Nixbpe::I, 0)).unwrap();
        let record = cpu.step().unwrap();
        let line = record.to_string();
        assert!(line.contains("000000"));
        assert!(line.contains("COMP"));
        assert!(line.contains("CC=="));
    }

    #[test]
    fn test_snapshot() {
        let mut cpu = Cpu::new();
        cpu.regs.set(RegisterName::X, 4);
        let snapshot = cpu.snapshot();
        assert_eq!(snapshot.registers[&RegisterName::X], 4);
        assert_eq!(snapshot.registers.len(), 9);
        assert_eq!(snapshot.state, RunState::Running);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"X\":4"));
    }
}
