//! SIC/XE Emulator - CLI Entry Point
//!
//! Commands:
//! - `sicxe-emu run <program>` - Run an object or raw binary program
//! - `sicxe-emu disasm <program>` - Disassemble a program
//! - `sicxe-emu test` - Built-in self-test

use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, Level};

use sicxe::cpu::decode::{encode_format2, encode_format3, Nixbpe};
use sicxe::program::{load_object, LoadedProgram};
use sicxe::{
    disassemble, load_object_file, ConditionCode, Cpu, ErrorKind, HistoryLog,
    MachineConfig, Memory, Opcode, RegisterName, RunState, Word,
};

#[derive(Parser)]
#[command(name = "sicxe-emu")]
#[command(version = "0.1.0")]
#[command(about = "An instruction execution engine for the SIC/XE architecture")]
struct Cli {
    /// Log verbosity (-t for debug, -tt for per-step trace)
    #[arg(short = 't', long = "trace", action = ArgAction::Count, global = true)]
    trace: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the object (.obj) or raw binary program
        program: String,
        /// Treat the file as a raw memory image
        #[arg(long)]
        raw: bool,
        /// Maximum number of cycles to run
        #[arg(short, long, default_value = "100000")]
        max_cycles: u64,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// Memory size in bytes
        #[arg(long)]
        memory: Option<usize>,
        /// Load address (hex)
        #[arg(long, value_parser = parse_address)]
        start: Option<u32>,
        /// JSON machine configuration
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Disassemble a program
    Disasm {
        /// Path to the object or raw binary program
        program: String,
        /// Treat the file as a raw memory image
        #[arg(long)]
        raw: bool,
    },
    /// Run the built-in self-test
    Test,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.trace {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Run { program, raw, max_cycles, json, memory, start, config }) => {
            run_program(&program, RunOptions { raw, max_cycles, json, memory, start, config })
        }
        Some(Commands::Disasm { program, raw }) => disassemble_file(&program, raw),
        Some(Commands::Test) => run_self_test(),
        None => {
            println!("SIC/XE Emulator v0.1.0");
            println!("An instruction execution engine for the SIC/XE architecture");
            println!();
            println!("Use --help for available commands");
            ExitCode::SUCCESS
        }
    }
}

struct RunOptions {
    raw: bool,
    max_cycles: u64,
    json: bool,
    memory: Option<usize>,
    start: Option<u32>,
    config: Option<String>,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{}': {}", s, e))
}

/// Load a program into memory. Returns where it was placed.
fn load_file(mem: &mut Memory, path: &str, raw: bool, start: Option<u32>) -> Result<LoadedProgram, String> {
    if raw {
        let bytes = std::fs::read(path).map_err(|e| format!("Failed to read file: {}", e))?;
        let address = start.unwrap_or(0);
        mem.load_bytes(address as usize, &bytes)
            .map_err(|e| format!("Failed to load program: {}", e))?;
        return Ok(LoadedProgram {
            name: path.to_string(),
            load_address: address,
            length: bytes.len() as u32,
            entry: address,
        });
    }

    let program = load_object_file(path).map_err(|e| format!("Failed to read object file: {}", e))?;
    load_object(mem, &program, start).map_err(|e| format!("Failed to load program: {}", e))
}

fn run_program(path: &str, opts: RunOptions) -> ExitCode {
    println!("🔧 Running: {}", path);

    let mut config = match &opts.config {
        Some(p) => match MachineConfig::from_json_file(p) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ Failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => MachineConfig::default(),
    };
    if let Some(bytes) = opts.memory {
        config.memory_bytes = bytes;
    }

    let mut cpu = match Cpu::with_config(&config) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = opts.start.or(if opts.raw { Some(config.start_address) } else { None });
    let loaded = match load_file(&mut cpu.mem, path, opts.raw, start) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    cpu.set_program_counter(loaded.entry);
    info!(
        program = %loaded.name,
        load_address = loaded.load_address,
        entry = loaded.entry,
        "program loaded"
    );

    let history = Arc::new(HistoryLog::new(config.history_capacity));
    cpu.add_observer(history.clone());

    println!();
    println!("━━━ Execution ━━━");

    let result = cpu.run_limited(opts.max_cycles);

    if let Err(e) = &result {
        eprintln!("❌ CPU error at PC={:06X}: {} ({:?})", cpu.regs.pc(), e, e.kind());
        let recent = history.entries();
        if !recent.is_empty() {
            eprintln!("Last {} steps:", recent.len());
            for record in recent {
                eprintln!("{}", record);
            }
        }
    }

    if opts.json {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to serialize state: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_registers(&cpu);
    }

    if result.is_err() {
        return ExitCode::FAILURE;
    }
    if cpu.state() == RunState::Running {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", opts.max_cycles);
    }
    ExitCode::SUCCESS
}

fn print_registers(cpu: &Cpu) {
    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cpu.cycles());
    println!("State:  {:?}", cpu.state());
    for (name, value) in cpu.regs.iter() {
        if name == RegisterName::F {
            println!("{:<2} = {:012X}", name.as_str(), value);
        } else {
            println!("{:<2} = {:06X} ({})", name.as_str(), value, Word::new(value as u32).to_i32());
        }
    }
    match cpu.regs.condition_code() {
        Some(cc) => println!("CC = {}", cc.symbol()),
        None => println!("CC = ?"),
    }
}

fn disassemble_file(path: &str, raw: bool) -> ExitCode {
    println!("📖 Disassembling: {}", path);
    println!();

    let mut mem = Memory::default();
    let loaded = match load_file(&mut mem, path, raw, None) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let output = disassemble(&mem, loaded.load_address as usize, loaded.length as usize);
    println!("{}", output);
    ExitCode::SUCCESS
}

fn check(name: &str, ok: bool, passed: &mut u32, failed: &mut u32) {
    if ok {
        println!("{}... ✓", name);
        *passed += 1;
    } else {
        println!("{}... ✗", name);
        *failed += 1;
    }
}

fn run_self_test() -> ExitCode {
    println!("━━━ SIC/XE Emulator Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let simple = Nixbpe::SIMPLE;

    // Test 1: register masking
    let mut cpu = Cpu::new();
    cpu.regs.set(RegisterName::A, 0x1FF_FFFF);
    cpu.regs.set(RegisterName::F, u64::MAX);
    check(
        "Register width masking",
        cpu.register(RegisterName::A) == 0xFF_FFFF && cpu.register(RegisterName::F) == 0xFFFF_FFFF_FFFF,
        &mut passed,
        &mut failed,
    );

    // Test 2: load/add/store
    let mut cpu = Cpu::new();
    let program = [
        &encode_format3(Opcode::Lda, Nixbpe::I, 5)[..],
        &encode_format3(Opcode::Add, simple, 60)[..],
        &encode_format3(Opcode::Sta, simple, 90)[..],
    ]
    .concat();
    let ok = cpu.mem.write_word(20, Word::new(7)).is_ok()
        && cpu.load_program(0, &program).is_ok()
        && (0..3).all(|_| cpu.step().is_ok())
        && cpu.register(RegisterName::A) == 12
        && cpu.read_memory_word(30).map(|w| w.to_u32()) == Ok(12);
    check("LDA #5 / ADD / STA", ok, &mut passed, &mut failed);

    // Test 3: COMP condition codes
    let mut ok = true;
    for (a, operand, expected) in [(10, 10, ConditionCode::Equal), (5, 10, ConditionCode::Less), (10, 5, ConditionCode::Greater)] {
        let mut cpu = Cpu::new();
        cpu.regs.set(RegisterName::A, a);
        ok &= cpu.load_program(0, &encode_format3(Opcode::Comp, Nixbpe::I, operand)).is_ok()
            && cpu.step().is_ok()
            && cpu.regs.condition_code() == Some(expected);
    }
    check("COMP condition codes", ok, &mut passed, &mut failed);

    // Test 4: halt convention
    let mut cpu = Cpu::new();
    let ok = cpu.load_program(0, &encode_format3(Opcode::Rsub, simple, 0)).is_ok()
        && cpu.step().is_ok()
        && cpu.is_halted()
        && cpu.step().map_err(|e| e.kind()) == Err(ErrorKind::InvalidRunState);
    check("RSUB with L=0 halts", ok, &mut passed, &mut failed);

    // Test 5: division by zero
    let mut cpu = Cpu::new();
    cpu.regs.set(RegisterName::A, 99);
    let ok = cpu.load_program(0, &encode_format3(Opcode::Div, Nixbpe::I, 0)).is_ok()
        && cpu.step().map_err(|e| e.kind()) == Err(ErrorKind::DivisionByZero)
        && cpu.register(RegisterName::A) == 99;
    check("DIV by zero leaves A unchanged", ok, &mut passed, &mut failed);

    // Test 6: misaligned indirect
    let mut cpu = Cpu::new();
    let ok = cpu.load_program(0, &encode_format3(Opcode::Lda, Nixbpe::N, 100)).is_ok()
        && cpu.step().map_err(|e| e.kind()) == Err(ErrorKind::MisalignedAccess);
    check("Misaligned indirect address", ok, &mut passed, &mut failed);

    // Test 7: pc-relative displacement -1
    let mut cpu = Cpu::new();
    let ok = cpu.load_program(0, &encode_format3(Opcode::J, simple | Nixbpe::P, -1)).is_ok()
        && cpu.step().is_ok()
        && cpu.regs.pc() == 2;
    check("PC-relative displacement -1", ok, &mut passed, &mut failed);

    // Test 8: counting loop with TIXR
    let mut cpu = Cpu::new();
    cpu.regs.set(RegisterName::T, 5);
    let program = [
        &encode_format2(Opcode::Tixr, 5, 0)[..],
        &encode_format3(Opcode::Jlt, simple | Nixbpe::P, -5)[..],
        &encode_format3(Opcode::Rsub, simple, 0)[..],
    ]
    .concat();
    let ok = cpu.load_program(0, &program).is_ok()
        && cpu.run_limited(100).is_ok()
        && cpu.is_halted()
        && cpu.register(RegisterName::X) == 5;
    check("TIXR counting loop", ok, &mut passed, &mut failed);

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
