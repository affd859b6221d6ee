//! tinyrv_sim 命令行入口
//!
//! 加载原始二进制或 ELF 程序，按合规测试约定运行并报告结果。

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use tinyrv_sim::sim_env::{
    DEFAULT_COMPLIANCE_REG, DEFAULT_WATCHDOG_TICKS, SimConfig, SimEnv, TestResult, Topology, TraceRecord,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program image: raw little-endian binary or RISC-V ELF32
    program: PathBuf,

    /// Reset PC (default 0x200, or the ELF entry point)
    #[arg(long, value_parser = parse_u32)]
    reset_addr: Option<u32>,

    /// Load address for raw binaries (default: memory base)
    #[arg(long, value_parser = parse_u32)]
    load_addr: Option<u32>,

    /// Base address of the (instruction) memory
    #[arg(long, value_parser = parse_u32, default_value = "0")]
    mem_base: u32,

    /// Size of the (instruction) memory in 32-bit words
    #[arg(long, default_value_t = 16 * 1024)]
    mem_words: usize,

    /// Bus topology: shared or split
    #[arg(long, default_value = "shared")]
    topology: Topology,

    /// Base address of the data memory (split topology)
    #[arg(long, value_parser = parse_u32, default_value = "0")]
    data_base: u32,

    /// Size of the data memory in 32-bit words (split topology)
    #[arg(long, default_value_t = 16 * 1024)]
    data_words: usize,

    /// Extra wait states per bus access
    #[arg(long, default_value_t = 0)]
    wait_states: u32,

    /// Run this many instructions and dump state instead of the compliance check
    #[arg(long)]
    max_instructions: Option<u64>,

    /// Ticks allowed per instruction before the run is aborted
    #[arg(long, default_value_t = DEFAULT_WATCHDOG_TICKS)]
    watchdog: u32,

    /// Register that holds the compliance result (0 = pass)
    #[arg(long, default_value_t = DEFAULT_COMPLIANCE_REG)]
    compliance_reg: u8,

    /// Print one line per retired instruction
    #[arg(long)]
    trace: bool,

    /// Dump registers after the run
    #[arg(long)]
    dump: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn is_elf(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    let n = file.read(&mut magic)?;
    Ok(n == 4 && magic == [0x7F, b'E', b'L', b'F'])
}

fn build_config(args: &Args) -> Result<SimConfig, Box<dyn std::error::Error>> {
    let path = args.program.to_string_lossy().into_owned();
    let mut config = SimConfig::new()
        .with_memory("ram", args.mem_base, args.mem_words)
        .with_data_memory("dram", args.data_base, args.data_words)
        .with_topology(args.topology)
        .with_wait_states(args.wait_states)
        .with_watchdog_ticks(args.watchdog)
        .with_compliance_reg(args.compliance_reg)
        .with_trace(args.trace);

    config = if is_elf(&args.program)? {
        config.with_elf_path(path)
    } else {
        config.with_bin_path(path)
    };
    if let Some(addr) = args.reset_addr {
        config = config.with_reset_addr(addr);
    }
    if let Some(addr) = args.load_addr {
        config = config.with_load_addr(addr);
    }
    if let Some(n) = args.max_instructions {
        config = config.with_max_instructions(n);
    }
    Ok(config)
}

fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let mut env = SimEnv::from_config(build_config(args)?)?;

    if args.trace {
        println!("{}", TraceRecord::header());
    }

    let passed = match args.max_instructions {
        Some(_) => {
            let executed = env.run_until_halt()?;
            println!("executed {} instructions in {} cycles", executed, env.cpu.cycles());
            true
        }
        None => {
            let result = env.run_compliance()?;
            println!("{}", "-".repeat(20));
            match result {
                TestResult::Pass => println!("PASSED"),
                TestResult::Fail(value) => {
                    println!("FAILED (x{} = 0x{:08x})", args.compliance_reg, value)
                }
            }
            println!("STEPS: {}", env.cpu.pc());
            println!("{}", "-".repeat(20));
            result == TestResult::Pass
        }
    };

    if args.trace {
        for record in env.trace() {
            println!("{}", record);
        }
    }
    if args.dump {
        env.dump();
    }
    Ok(passed)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
