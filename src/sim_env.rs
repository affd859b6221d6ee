//! 仿真环境初始化模块
//!
//! 本模块负责：
//! - 读取仿真配置
//! - 读取原始二进制 / 解析 ELF 文件
//! - 按总线拓扑初始化存储，并将程序加载到存储
//! - 以周期或指令为单位驱动 CPU，带每条指令的看门狗
//! - 指令追踪与合规测试判定
//!
//! # 示例
//!
//! ```no_run
//! use tinyrv_sim::sim_env::{SimConfig, SimEnv, TestResult};
//!
//! let config = SimConfig::new()
//!     .with_bin_path("add.bin")
//!     .with_memory_words(16 * 1024);
//!
//! let mut env = SimEnv::from_config(config).expect("Failed to create sim env");
//! let result = env.run_compliance().expect("watchdog expired");
//! assert_eq!(result, TestResult::Pass);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use elf::ElfBytes;
use elf::abi::{EM_RISCV, PF_W, PF_X, PT_LOAD};
use elf::endian::AnyEndian;
use thiserror::Error;

use crate::cpu::{BuildError, CpuBuilder, CpuCore, CpuState, MemAccess, Retired};
use crate::memory::{
    Bus, BusRequest, BusResponse, MemError, MemoryUnit, PortId, SplitBus, words_from_le_bytes,
};

/// 合规测试程序的默认复位地址
pub const DEFAULT_RESET_ADDR: u32 = 0x0000_0200;
/// 每条指令允许的最大周期数
pub const DEFAULT_WATCHDOG_TICKS: u32 = 8;
/// 合规测试约定的结果寄存器（x28 == 0 表示通过）
pub const DEFAULT_COMPLIANCE_REG: u8 = 28;

/// 仿真环境错误
#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("ELF parse error: {0}")]
    ElfParse(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Memory error: {0}")]
    Memory(#[from] MemError),
    #[error("CPU config error: {0}")]
    Core(#[from] BuildError),
    /// 一条指令在限定周期内没有退休
    #[error("watchdog expired after {ticks} ticks at pc=0x{pc:08x} in {state:?}")]
    Watchdog { pc: u32, ticks: u32, state: CpuState },
}

/// 总线拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// 指令端口与数据端口经仲裁器共享一块存储
    #[default]
    Shared,
    /// 指令与数据各自一块存储
    Split,
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(Topology::Shared),
            "split" => Ok(Topology::Split),
            other => Err(format!("unknown topology '{}', expected 'shared' or 'split'", other)),
        }
    }
}

/// 存储区域配置
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// 区域名称（用于调试）
    pub name: String,
    /// 起始地址
    pub base: u32,
    /// 大小（字）
    pub words: usize,
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self {
            name: "ram".to_string(),
            base: 0,
            words: 16 * 1024, // 默认 64KB
        }
    }
}

impl MemoryRegion {
    fn build(&self, wait_states: u32) -> MemoryUnit {
        MemoryUnit::new(self.words, self.base).with_wait_states(wait_states)
    }
}

/// 仿真配置
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// ELF 文件路径
    pub elf_path: Option<String>,
    /// 原始二进制文件路径（小端 32-bit 字序列）
    pub bin_path: Option<String>,
    /// 直接给出的程序字
    pub program: Option<Vec<u32>>,
    /// 原始二进制 / 程序字的加载地址，缺省为存储起始地址
    pub load_addr: Option<u32>,
    /// 复位 PC；缺省时 ELF 使用入口点，其余使用 `DEFAULT_RESET_ADDR`
    pub reset_addr: Option<u32>,
    /// 共享存储，或 Split 拓扑下的指令存储
    pub memory: MemoryRegion,
    /// Split 拓扑下的数据存储
    pub data_memory: MemoryRegion,
    pub topology: Topology,
    /// 每次总线访问额外的等待周期
    pub wait_states: u32,
    /// `run_until_halt` 执行的指令数（0 表示程序长度）
    pub max_instructions: u64,
    pub watchdog_ticks: u32,
    pub compliance_reg: u8,
    /// 是否收集指令追踪
    pub trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            elf_path: None,
            bin_path: None,
            program: None,
            load_addr: None,
            reset_addr: None,
            memory: MemoryRegion::default(),
            data_memory: MemoryRegion {
                name: "dram".to_string(),
                ..MemoryRegion::default()
            },
            topology: Topology::Shared,
            wait_states: 0,
            max_instructions: 0,
            watchdog_ticks: DEFAULT_WATCHDOG_TICKS,
            compliance_reg: DEFAULT_COMPLIANCE_REG,
            trace: false,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elf_path(mut self, path: impl Into<String>) -> Self {
        self.elf_path = Some(path.into());
        self
    }

    pub fn with_bin_path(mut self, path: impl Into<String>) -> Self {
        self.bin_path = Some(path.into());
        self
    }

    pub fn with_program(mut self, words: &[u32]) -> Self {
        self.program = Some(words.to_vec());
        self
    }

    pub fn with_load_addr(mut self, addr: u32) -> Self {
        self.load_addr = Some(addr);
        self
    }

    pub fn with_reset_addr(mut self, addr: u32) -> Self {
        self.reset_addr = Some(addr);
        self
    }

    /// 设置存储大小（字）
    pub fn with_memory_words(mut self, words: usize) -> Self {
        self.memory.words = words;
        self
    }

    pub fn with_memory_base(mut self, base: u32) -> Self {
        self.memory.base = base;
        self
    }

    pub fn with_memory(mut self, name: impl Into<String>, base: u32, words: usize) -> Self {
        self.memory = MemoryRegion {
            name: name.into(),
            base,
            words,
        };
        self
    }

    /// 设置 Split 拓扑下的数据存储
    pub fn with_data_memory(mut self, name: impl Into<String>, base: u32, words: usize) -> Self {
        self.data_memory = MemoryRegion {
            name: name.into(),
            base,
            words,
        };
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_wait_states(mut self, wait_states: u32) -> Self {
        self.wait_states = wait_states;
        self
    }

    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    pub fn with_watchdog_ticks(mut self, ticks: u32) -> Self {
        self.watchdog_ticks = ticks;
        self
    }

    pub fn with_compliance_reg(mut self, reg: u8) -> Self {
        self.compliance_reg = reg;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    fn validate(&self) -> Result<(), SimError> {
        let sources = [
            self.elf_path.is_some(),
            self.bin_path.is_some(),
            self.program.is_some(),
        ];
        if sources.iter().filter(|&&s| s).count() > 1 {
            return Err(SimError::Config(
                "only one of elf_path, bin_path and program may be set".into(),
            ));
        }
        if self.watchdog_ticks == 0 {
            return Err(SimError::Config("watchdog_ticks must be at least 1".into()));
        }
        if self.compliance_reg >= 32 {
            return Err(SimError::Config(format!(
                "compliance register x{} does not exist",
                self.compliance_reg
            )));
        }
        if self.memory.words == 0 {
            return Err(SimError::Config(format!("memory region '{}' is empty", self.memory.name)));
        }
        if self.topology == Topology::Split && self.data_memory.words == 0 {
            return Err(SimError::Config(format!(
                "memory region '{}' is empty",
                self.data_memory.name
            )));
        }
        Ok(())
    }
}

/// ELF 程序段信息
#[derive(Debug, Clone)]
pub struct ElfSegment {
    /// 虚拟地址
    pub vaddr: u32,
    /// 文件中的大小
    pub file_size: usize,
    /// 内存中的大小
    pub mem_size: usize,
    /// 段数据
    pub data: Vec<u8>,
    pub executable: bool,
    pub writable: bool,
}

/// ELF 符号信息
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    pub name: String,
    pub addr: u32,
    pub size: u32,
}

/// ELF 文件解析结果
#[derive(Debug, Clone)]
pub struct ElfInfo {
    /// 入口点地址
    pub entry: u32,
    /// 可加载段
    pub segments: Vec<ElfSegment>,
    /// 符号表（仅保留 tohost / fromhost）
    pub symbols: Vec<ElfSymbol>,
}

impl ElfInfo {
    /// 解析 ELF 文件
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Self::parse_bytes(&data)
    }

    /// 从字节数组解析 ELF
    pub fn parse_bytes(data: &[u8]) -> Result<Self, SimError> {
        let elf_file = ElfBytes::<AnyEndian>::minimal_parse(data)
            .map_err(|e| SimError::ElfParse(format!("Failed to parse ELF: {}", e)))?;

        let header = &elf_file.ehdr;

        if header.e_machine != EM_RISCV {
            return Err(SimError::ElfParse(format!(
                "Not a RISC-V ELF (machine type: 0x{:x}, expected 0x{:x})",
                header.e_machine, EM_RISCV
            )));
        }
        if header.class != elf::file::Class::ELF32 {
            return Err(SimError::ElfParse("Only 32-bit ELF is supported".into()));
        }
        if header.endianness != AnyEndian::Little {
            return Err(SimError::ElfParse("Only little-endian ELF is supported".into()));
        }

        let mut segments = Vec::new();
        if let Some(phdrs) = elf_file.segments() {
            for phdr in phdrs {
                if phdr.p_type != PT_LOAD {
                    continue;
                }

                let data = elf_file
                    .segment_data(&phdr)
                    .map_err(|e| SimError::ElfParse(format!("Failed to read segment data: {}", e)))?
                    .to_vec();

                segments.push(ElfSegment {
                    vaddr: phdr.p_vaddr as u32,
                    file_size: phdr.p_filesz as usize,
                    mem_size: phdr.p_memsz as usize,
                    data,
                    executable: (phdr.p_flags & PF_X) != 0,
                    writable: (phdr.p_flags & PF_W) != 0,
                });
            }
        }

        let mut symbols = Vec::new();
        if let Ok(Some((symtab, strtab))) = elf_file.symbol_table() {
            for sym in symtab {
                if sym.st_value == 0 {
                    continue;
                }
                if let Ok(name) = strtab.get(sym.st_name as usize) {
                    if name == "tohost" || name == "fromhost" {
                        symbols.push(ElfSymbol {
                            name: name.to_string(),
                            addr: sym.st_value as u32,
                            size: sym.st_size as u32,
                        });
                    }
                }
            }
        }

        Ok(ElfInfo {
            entry: header.e_entry as u32,
            segments,
            symbols,
        })
    }

    pub fn find_symbol(&self, name: &str) -> Option<u32> {
        self.symbols.iter().find(|s| s.name == name).map(|s| s.addr)
    }

    /// 程序使用的最小和最大地址
    pub fn address_range(&self) -> Option<(u32, u32)> {
        let min_addr = self.segments.iter().map(|s| s.vaddr).min()?;
        let max_addr = self
            .segments
            .iter()
            .map(|s| s.vaddr.wrapping_add(s.mem_size as u32))
            .max()?;
        Some((min_addr, max_addr))
    }

    /// 文件中实际存放的字数
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.file_size.div_ceil(4)).sum()
    }
}

/// 读取原始二进制程序
pub fn read_bin<P: AsRef<Path>>(path: P) -> Result<Vec<u32>, SimError> {
    let data = std::fs::read(path)?;
    Ok(words_from_le_bytes(&data))
}

fn range_end(addr: u32, len: usize) -> Result<u32, SimError> {
    let len: u32 = len
        .try_into()
        .map_err(|_| SimError::Config(format!("Size {} exceeds 32-bit address space", len)))?;
    addr.checked_add(len).ok_or_else(|| {
        SimError::Config(format!(
            "Address range overflow: start=0x{:08x}, len=0x{:x}",
            addr, len
        ))
    })
}

fn check_segment_alignment(seg: &ElfSegment) -> Result<(), SimError> {
    if seg.vaddr & 0x3 != 0 {
        return Err(SimError::ElfParse(format!(
            "segment at 0x{:08x} is not word aligned",
            seg.vaddr
        )));
    }
    Ok(())
}

fn load_segment(memory: &mut MemoryUnit, seg: &ElfSegment) -> Result<(), SimError> {
    memory.load_bytes(seg.vaddr, &seg.data)?;
    if seg.mem_size > seg.file_size {
        let bss_start = range_end(seg.vaddr, seg.file_size)?;
        memory.zero_range(bss_start, seg.mem_size - seg.file_size)?;
    }
    Ok(())
}

fn load_segments_into_memory(memory: &mut MemoryUnit, segments: &[ElfSegment]) -> Result<(), SimError> {
    for seg in segments.iter().filter(|s| s.mem_size > 0) {
        check_segment_alignment(seg)?;
        load_segment(memory, seg)?;
    }
    Ok(())
}

/// Split 拓扑：每个段放入包含它的存储
///
/// 可执行段必须落在指令存储内；落在数据存储范围内的段（含可执行段）再放一份到数据存储
fn load_segments_split(
    imem: &mut MemoryUnit,
    dmem: &mut MemoryUnit,
    segments: &[ElfSegment],
) -> Result<(), SimError> {
    for seg in segments.iter().filter(|s| s.mem_size > 0) {
        check_segment_alignment(seg)?;
        let in_imem = imem.contains(seg.vaddr, seg.mem_size);
        let in_dmem = dmem.contains(seg.vaddr, seg.mem_size);

        if seg.executable && !in_imem {
            return Err(SimError::Config(format!(
                "executable segment at 0x{:08x} (0x{:x} bytes) is outside instruction memory",
                seg.vaddr, seg.mem_size
            )));
        }
        if !in_imem && !in_dmem {
            return Err(SimError::Config(format!(
                "segment at 0x{:08x} (0x{:x} bytes) fits neither instruction nor data memory",
                seg.vaddr, seg.mem_size
            )));
        }
        if in_imem {
            load_segment(imem, seg)?;
        }
        if in_dmem {
            load_segment(dmem, seg)?;
        }
    }
    Ok(())
}

/// 已读入的程序映像
#[derive(Debug, Clone)]
enum ProgramImage {
    Words { addr: u32, words: Vec<u32> },
    Elf(ElfInfo),
}

impl ProgramImage {
    fn word_count(&self) -> usize {
        match self {
            ProgramImage::Words { words, .. } => words.len(),
            ProgramImage::Elf(elf) => elf.word_count(),
        }
    }

    fn install(&self, memory: &mut MemoryUnit) -> Result<(), SimError> {
        match self {
            ProgramImage::Words { addr, words } => memory.load_words(*addr, words)?,
            ProgramImage::Elf(elf) => load_segments_into_memory(memory, &elf.segments)?,
        }
        Ok(())
    }

    fn install_split(&self, imem: &mut MemoryUnit, dmem: &mut MemoryUnit) -> Result<(), SimError> {
        match self {
            ProgramImage::Words { addr, words } => {
                imem.load_words(*addr, words)?;
                // 程序字落在数据存储范围内时同样放一份，供加载常量使用
                if dmem.contains(*addr, words.len() * 4) {
                    dmem.load_words(*addr, words)?;
                }
            }
            ProgramImage::Elf(elf) => load_segments_split(imem, dmem, &elf.segments)?,
        }
        Ok(())
    }
}

/// 按配置连接好的总线
#[derive(Debug, Clone)]
pub enum SimBus {
    Shared(MemoryUnit),
    Split(SplitBus),
}

impl SimBus {
    /// 数据端口所连接的存储
    pub fn data_memory(&self) -> &MemoryUnit {
        match self {
            SimBus::Shared(mem) => mem,
            SimBus::Split(bus) => &bus.data,
        }
    }

    /// 指令端口所连接的存储
    pub fn instr_memory(&self) -> &MemoryUnit {
        match self {
            SimBus::Shared(mem) => mem,
            SimBus::Split(bus) => &bus.instr,
        }
    }
}

impl Bus for SimBus {
    fn request(&mut self, port: PortId, req: BusRequest) {
        match self {
            SimBus::Shared(mem) => mem.request(port, req),
            SimBus::Split(bus) => bus.request(port, req),
        }
    }

    fn clock(&mut self) {
        match self {
            SimBus::Shared(mem) => mem.clock(),
            SimBus::Split(bus) => bus.clock(),
        }
    }

    fn response(&self, port: PortId) -> BusResponse {
        match self {
            SimBus::Shared(mem) => mem.response(port),
            SimBus::Split(bus) => bus.response(port),
        }
    }
}

/// 合规测试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    /// 结果寄存器的非零值
    Fail(u32),
}

impl TestResult {
    pub fn from_reg(value: u32) -> Self {
        if value == 0 {
            TestResult::Pass
        } else {
            TestResult::Fail(value)
        }
    }
}

/// 一条退休指令的追踪记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    /// 退休序号（从 0 开始）
    pub seq: u64,
    /// 退休时的周期计数
    pub cycle: u64,
    pub pc: u32,
    pub instr: u32,
    pub rs1: Option<(u8, u32)>,
    pub rs2: Option<(u8, u32)>,
    pub rd: Option<(u8, u32)>,
    pub mem: Option<MemAccess>,
}

impl TraceRecord {
    pub fn new(seq: u64, cycle: u64, retired: &Retired) -> Self {
        TraceRecord {
            seq,
            cycle,
            pc: retired.pc,
            instr: retired.instr.raw,
            rs1: retired.rs1,
            rs2: retired.rs2,
            rd: retired.rd,
            mem: retired.mem,
        }
    }

    /// 与 `Display` 输出对齐的表头
    pub fn header() -> String {
        format!(
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Instr", "PC", "RS1 Addr", "RS1 Data", "RS2 Addr", "RS2 Data", "RD Addr", "RD Data",
            "Bus Addr", "Bus Data"
        )
    }
}

fn reg_cols(reg: Option<(u8, u32)>) -> (String, String) {
    match reg {
        Some((r, v)) => (format!("x{}", r), format!("0x{:x}", v)),
        None => ("-".to_string(), "-".to_string()),
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rs1_a, rs1_d) = reg_cols(self.rs1);
        let (rs2_a, rs2_d) = reg_cols(self.rs2);
        let (rd_a, rd_d) = reg_cols(self.rd);
        let (bus_a, bus_d) = match self.mem {
            Some(m) => (format!("0x{:x}", m.addr), format!("0x{:x}", m.data)),
            None => ("-".to_string(), "-".to_string()),
        };
        write!(
            f,
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            format!("0x{:x}", self.instr),
            format!("0x{:x}", self.pc),
            rs1_a,
            rs1_d,
            rs2_a,
            rs2_d,
            rd_a,
            rd_d,
            bus_a,
            bus_d
        )
    }
}

/// 仿真环境
///
/// 封装了 CPU、总线和仿真配置，提供统一的仿真接口
pub struct SimEnv {
    pub cpu: CpuCore,
    pub bus: SimBus,
    pub config: SimConfig,
    image: ProgramImage,
    /// HTIF tohost 地址（仅 ELF，供报告使用）
    pub tohost_addr: Option<u32>,
    trace: Vec<TraceRecord>,
}

impl SimEnv {
    /// 从配置创建仿真环境
    pub fn from_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let load_addr = config.load_addr.unwrap_or(config.memory.base);
        let mut tohost_addr = None;
        let mut entry = None;

        let image = if let Some(ref elf_path) = config.elf_path {
            let elf = ElfInfo::parse(elf_path)?;
            tohost_addr = elf.find_symbol("tohost");
            entry = Some(elf.entry);

            log::info!(
                "loaded ELF {}: entry=0x{:08x}, {} segments",
                elf_path,
                elf.entry,
                elf.segments.len()
            );
            for (i, seg) in elf.segments.iter().enumerate() {
                log::debug!(
                    "  segment {}: vaddr=0x{:08x}, size=0x{:x}, flags={}{}",
                    i,
                    seg.vaddr,
                    seg.mem_size,
                    if seg.executable { "X" } else { "-" },
                    if seg.writable { "W" } else { "R" },
                );
            }
            if let Some((lo, hi)) = elf.address_range() {
                log::debug!("  address range: 0x{:08x}..0x{:08x}", lo, hi);
            }
            if let Some(addr) = tohost_addr {
                log::info!("  tohost: 0x{:08x}", addr);
            }
            ProgramImage::Elf(elf)
        } else if let Some(ref bin_path) = config.bin_path {
            let words = read_bin(bin_path)?;
            log::info!(
                "loaded binary {}: {} words at 0x{:08x}",
                bin_path,
                words.len(),
                load_addr
            );
            ProgramImage::Words { addr: load_addr, words }
        } else {
            let words = config.program.clone().unwrap_or_default();
            log::info!("loaded {} program words at 0x{:08x}", words.len(), load_addr);
            ProgramImage::Words { addr: load_addr, words }
        };

        let reset_addr = config.reset_addr.or(entry).unwrap_or(DEFAULT_RESET_ADDR);
        let (bus, ibus, dbus) = Self::build_bus(&config, &image)?;
        let cpu = Self::build_cpu(reset_addr, ibus, dbus)?;

        log::info!(
            "CPU initialized at PC=0x{:08x} ({:?} bus, {} wait states)",
            reset_addr,
            config.topology,
            config.wait_states
        );

        Ok(SimEnv {
            cpu,
            bus,
            config,
            image,
            tohost_addr,
            trace: Vec::new(),
        })
    }

    /// 直接从程序字创建仿真环境（便捷方法）
    pub fn from_program(words: &[u32]) -> Result<Self, SimError> {
        Self::from_config(SimConfig::new().with_program(words))
    }

    /// 按拓扑建立总线并装入程序，返回总线及 CPU 应使用的 (指令端口, 数据端口)
    fn build_bus(config: &SimConfig, image: &ProgramImage) -> Result<(SimBus, PortId, PortId), SimError> {
        match config.topology {
            Topology::Shared => {
                let mut mem = config.memory.build(config.wait_states);
                let ibus = mem.new_port();
                let dbus = mem.new_port();
                image.install(&mut mem)?;
                Ok((SimBus::Shared(mem), ibus, dbus))
            }
            Topology::Split => {
                let mut imem = config.memory.build(config.wait_states);
                let mut dmem = config.data_memory.build(config.wait_states);
                image.install_split(&mut imem, &mut dmem)?;
                Ok((SimBus::Split(SplitBus::new(imem, dmem)), SplitBus::INSTR, SplitBus::DATA))
            }
        }
    }

    fn build_cpu(reset_addr: u32, ibus: PortId, dbus: PortId) -> Result<CpuCore, SimError> {
        Ok(CpuBuilder::new(reset_addr).instr_port(ibus).data_port(dbus).build()?)
    }

    pub fn cpu(&self) -> &CpuCore {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuCore {
        &mut self.cpu
    }

    /// 程序映像的字数
    pub fn program_len(&self) -> usize {
        self.image.word_count()
    }

    /// 通过数据端口所连的存储旁路读取一个字
    pub fn read_word(&self, addr: u32) -> Result<u32, SimError> {
        Ok(self.bus.data_memory().read_word(addr)?)
    }

    /// 推进一个时钟周期
    pub fn tick(&mut self) -> Option<Retired> {
        let retired = self.cpu.tick(&mut self.bus)?;
        if self.config.trace {
            let record = TraceRecord::new(self.cpu.retired() - 1, self.cpu.cycles(), &retired);
            log::info!("{}", record);
            self.trace.push(record);
        }
        Some(retired)
    }

    /// 执行一条指令：推进时钟直到有指令退休
    ///
    /// 超过 `watchdog_ticks` 个周期仍未退休时返回 `SimError::Watchdog`
    pub fn step(&mut self) -> Result<Retired, SimError> {
        let limit = self.config.watchdog_ticks;
        for _ in 0..limit {
            if let Some(retired) = self.tick() {
                return Ok(retired);
            }
        }
        Err(SimError::Watchdog {
            pc: self.cpu.pc(),
            ticks: limit,
            state: self.cpu.state(),
        })
    }

    /// 执行 `n` 条指令，返回实际退休的指令数
    pub fn run(&mut self, n: u64) -> Result<u64, SimError> {
        for _ in 0..n {
            self.step()?;
        }
        Ok(n)
    }

    /// 执行 `max_instructions` 条指令（为 0 时执行程序长度条）
    pub fn run_until_halt(&mut self) -> Result<u64, SimError> {
        let n = match self.config.max_instructions {
            0 => self.program_len() as u64,
            n => n,
        };
        self.run(n)
    }

    /// 运行合规测试
    ///
    /// 执行与程序字数相同条数的指令，然后检查结果寄存器
    pub fn run_compliance(&mut self) -> Result<TestResult, SimError> {
        self.run(self.program_len() as u64)?;
        let value = self.cpu.read_reg(self.config.compliance_reg);
        let result = TestResult::from_reg(value);
        log::info!(
            "compliance x{} = 0x{:08x} -> {:?} (pc=0x{:08x}, {} cycles)",
            self.config.compliance_reg,
            value,
            result,
            self.cpu.pc(),
            self.cpu.cycles()
        );
        Ok(result)
    }

    /// 已收集的追踪记录
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    /// 打印仿真状态
    pub fn dump(&self) {
        println!("=== SimEnv Status ===");
        println!(
            "Topology: {:?}  Wait states: {}  Program: {} words",
            self.config.topology,
            self.config.wait_states,
            self.program_len()
        );
        if let Some(addr) = self.tohost_addr {
            println!("tohost: 0x{:08x}", addr);
        }
        self.cpu.dump_regs();
    }

    /// 重置仿真环境：CPU 复位，重新加载程序映像
    pub fn reset(&mut self) -> Result<(), SimError> {
        let (bus, _, _) = Self::build_bus(&self.config, &self.image)?;
        self.bus = bus;
        self.cpu.reset();
        self.trace.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::asm;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tinyrv_sim_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_sim_config_builder() {
        let config = SimConfig::new()
            .with_memory_words(1024)
            .with_memory_base(0x8000_0000)
            .with_reset_addr(0x8000_0000)
            .with_topology(Topology::Split)
            .with_wait_states(1)
            .with_max_instructions(1000);

        assert_eq!(config.memory.words, 1024);
        assert_eq!(config.memory.base, 0x8000_0000);
        assert_eq!(config.reset_addr, Some(0x8000_0000));
        assert_eq!(config.topology, Topology::Split);
        assert_eq!(config.wait_states, 1);
        assert_eq!(config.max_instructions, 1000);
        assert_eq!(config.watchdog_ticks, DEFAULT_WATCHDOG_TICKS);
        assert_eq!(config.compliance_reg, 28);
    }

    #[test]
    fn test_topology_from_str() {
        assert_eq!("shared".parse::<Topology>(), Ok(Topology::Shared));
        assert_eq!("Split".parse::<Topology>(), Ok(Topology::Split));
        assert!("ring".parse::<Topology>().is_err());
    }

    #[test]
    fn test_config_validation() {
        let both = SimConfig::new().with_program(&[0]).with_bin_path("x.bin");
        assert!(matches!(SimEnv::from_config(both), Err(SimError::Config(_))));

        let no_watchdog = SimConfig::new().with_watchdog_ticks(0);
        assert!(matches!(SimEnv::from_config(no_watchdog), Err(SimError::Config(_))));

        let bad_reg = SimConfig::new().with_compliance_reg(40);
        assert!(matches!(SimEnv::from_config(bad_reg), Err(SimError::Config(_))));
    }

    #[test]
    fn test_split_requires_data_memory() {
        let split = SimConfig::new()
            .with_program(&[asm::nop()])
            .with_topology(Topology::Split)
            .with_data_memory("dram", 0, 0);
        assert!(matches!(SimEnv::from_config(split), Err(SimError::Config(_))));

        // 共享拓扑不使用数据存储配置
        let shared = SimConfig::new().with_program(&[asm::nop()]).with_data_memory("dram", 0, 0);
        assert!(SimEnv::from_config(shared).is_ok());
    }

    #[test]
    fn test_program_too_large() {
        let config = SimConfig::new().with_program(&[0; 8]).with_memory_words(4);
        assert!(matches!(SimEnv::from_config(config), Err(SimError::Memory(_))));
    }

    #[test]
    fn test_sim_env_basic() {
        let mut prog = vec![0; 0x80];
        prog.push(asm::addi(1, 0, 42));
        let mut env = SimEnv::from_program(&prog).expect("Failed to create sim env");

        assert_eq!(env.cpu.pc(), DEFAULT_RESET_ADDR);
        let retired = env.step().expect("retire");
        assert_eq!(retired.pc, DEFAULT_RESET_ADDR);
        assert_eq!(env.cpu.read_reg(1), 42);
        assert_eq!(env.cpu.retired(), 1);
        assert_eq!(env.cpu.cycles(), 2);
    }

    #[test]
    fn test_watchdog_expires() {
        let config = SimConfig::new()
            .with_program(&[asm::lw(1, 0, 0x100)])
            .with_reset_addr(0)
            .with_wait_states(4)
            .with_watchdog_ticks(8);
        let mut env = SimEnv::from_config(config).unwrap();
        // 取指 5 周期 + 执行 1 周期 + 访存 5 周期 > 8
        let err = env.step().unwrap_err();
        assert!(matches!(err, SimError::Watchdog { ticks: 8, state: CpuState::Write, .. }));
    }

    #[test]
    fn test_compliance_pass_and_fail() {
        let pass = [asm::addi(28, 0, 0), asm::nop()];
        let mut env = SimEnv::from_config(SimConfig::new().with_program(&pass).with_reset_addr(0)).unwrap();
        assert_eq!(env.run_compliance().unwrap(), TestResult::Pass);
        assert_eq!(env.cpu.retired(), 2);

        let fail = [asm::addi(28, 0, 3), asm::nop()];
        let mut env = SimEnv::from_config(SimConfig::new().with_program(&fail).with_reset_addr(0)).unwrap();
        assert_eq!(env.run_compliance().unwrap(), TestResult::Fail(3));
    }

    #[test]
    fn test_split_topology_store_load() {
        let prog = [
            0xDEADC0B7, // lui   x1, 0xdeadc
            0xEEF08093, // addi  x1, x1, -273
            0x80004197, // auipc x3, 0x80004
            0xFE11AC23, // sw    x1, -8(x3)
            0x80004117, // auipc x2, 0x80004
            0xFF012103, // lw    x2, -16(x2)
            0x00110463, // beq   x2, x1, 8
            0x00000073, // ecall
            0x00000013, // nop
        ];
        let config = SimConfig::new()
            .with_program(&prog)
            .with_memory("rom", 0x8000_0000, 64)
            .with_reset_addr(0x8000_0000)
            .with_topology(Topology::Split)
            .with_data_memory("dram", 0, 0x2000)
            .with_trace(true);
        let mut env = SimEnv::from_config(config).unwrap();
        env.run(7).unwrap();

        assert_eq!(env.cpu.read_reg(2), 0xDEADC0B7);
        assert_eq!(env.cpu.pc(), 0x8000_0020);
        assert_eq!(env.read_word(0x4000).unwrap(), 0xDEADC0B7);

        let trace = env.trace();
        assert_eq!(trace.len(), 7);
        assert_eq!(trace[0].instr, 0xDEADC0B7);
        assert_eq!(trace[0].rd, Some((1, 0xDEADC000)));
        assert_eq!(trace[3].mem, Some(MemAccess { addr: 0x4000, data: 0xDEADC0B7, store: true }));
        assert_eq!(trace[5].rd, Some((2, 0xDEADC0B7)));
        assert_eq!(trace[6].pc, 0x8000_0018);
        assert_eq!(trace.iter().map(|r| r.seq).collect::<Vec<_>>(), (0..7).collect::<Vec<_>>());
        assert!(trace[0].to_string().contains("0xdeadc0b7"));
    }

    #[test]
    fn test_split_topology_copies_image_into_data_memory() {
        // lw 读取程序自身第一个字
        let prog = [asm::lw(1, 0, 0), asm::nop()];
        let config = SimConfig::new()
            .with_program(&prog)
            .with_reset_addr(0)
            .with_topology(Topology::Split)
            .with_memory_words(64)
            .with_data_memory("dram", 0, 64);
        let mut env = SimEnv::from_config(config).unwrap();
        env.step().unwrap();
        assert_eq!(env.cpu.read_reg(1), asm::lw(1, 0, 0));
    }

    #[test]
    fn test_run_until_halt_defaults_to_program_len() {
        let prog = [asm::addi(1, 0, 1), asm::addi(1, 1, 1), asm::addi(1, 1, 1)];
        let mut env = SimEnv::from_config(SimConfig::new().with_program(&prog).with_reset_addr(0)).unwrap();
        assert_eq!(env.run_until_halt().unwrap(), 3);
        assert_eq!(env.cpu.read_reg(1), 3);
    }

    #[test]
    fn test_reset_reloads_image() {
        let prog = [asm::addi(1, 0, 7), asm::sw(0, 1, 0x100)];
        let mut env = SimEnv::from_config(SimConfig::new().with_program(&prog).with_reset_addr(0)).unwrap();
        env.run(2).unwrap();
        assert_eq!(env.read_word(0x100).unwrap(), 7);

        env.reset().unwrap();
        assert_eq!(env.cpu.pc(), 0);
        assert_eq!(env.cpu.read_reg(1), 0);
        assert_eq!(env.read_word(0x100).unwrap(), 0);
        assert_eq!(env.read_word(0).unwrap(), asm::addi(1, 0, 7));
    }

    #[test]
    fn test_words_from_le_bytes() {
        assert_eq!(words_from_le_bytes(&[0x93, 0x00, 0x10, 0x00]), vec![0x0010_0093]);
        assert_eq!(words_from_le_bytes(&[0x13, 0x00, 0x00, 0x00, 0xFF]), vec![0x13, 0xFF]);
        assert!(words_from_le_bytes(&[]).is_empty());
    }

    #[test]
    fn test_load_raw_binary() {
        let path = temp_path("pass.bin");
        let words = [asm::addi(28, 0, 0), asm::addi(5, 0, 9)];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        let config = SimConfig::new()
            .with_bin_path(path.to_string_lossy().into_owned())
            .with_reset_addr(0);
        let mut env = SimEnv::from_config(config).unwrap();
        assert_eq!(env.program_len(), 2);
        assert_eq!(env.run_compliance().unwrap(), TestResult::Pass);
        assert_eq!(env.cpu.read_reg(5), 9);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_binary_is_io_error() {
        let config = SimConfig::new().with_bin_path(temp_path("missing.bin").to_string_lossy().into_owned());
        assert!(matches!(SimEnv::from_config(config), Err(SimError::Io(_))));
    }

    /// 手工拼一个只有一个 PT_LOAD 段的 ELF32 文件
    fn tiny_elf(vaddr: u32, code: &[u32], bss: u32) -> Vec<u8> {
        let code: Vec<u8> = code.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut out = Vec::new();
        // e_ident
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // e_type = EXEC
        out.extend_from_slice(&EM_RISCV.to_le_bytes()); // e_machine
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&vaddr.to_le_bytes()); // e_entry
        out.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        out.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        // program header
        let offset = 52u32 + 32;
        out.extend_from_slice(&PT_LOAD.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&vaddr.to_le_bytes());
        out.extend_from_slice(&vaddr.to_le_bytes());
        out.extend_from_slice(&(code.len() as u32).to_le_bytes());
        out.extend_from_slice(&(code.len() as u32 + bss).to_le_bytes());
        out.extend_from_slice(&(PF_X | 0x4).to_le_bytes());
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(&code);
        out
    }

    #[test]
    fn test_elf_parse_bytes() {
        let code = [asm::addi(1, 0, 5), asm::nop()];
        let elf = ElfInfo::parse_bytes(&tiny_elf(0x1000, &code, 8)).expect("parse");
        assert_eq!(elf.entry, 0x1000);
        assert_eq!(elf.segments.len(), 1);
        assert!(elf.segments[0].executable);
        assert!(!elf.segments[0].writable);
        assert_eq!(elf.segments[0].file_size, 8);
        assert_eq!(elf.segments[0].mem_size, 16);
        assert_eq!(elf.address_range(), Some((0x1000, 0x1010)));
        assert_eq!(elf.word_count(), 2);
        assert_eq!(elf.find_symbol("tohost"), None);
    }

    #[test]
    fn test_elf_rejects_garbage() {
        assert!(matches!(ElfInfo::parse_bytes(&[0u8; 16]), Err(SimError::ElfParse(_))));
    }

    #[test]
    fn test_run_elf_program() {
        let path = temp_path("prog.elf");
        let code = [asm::addi(28, 0, 0), asm::addi(1, 0, 5)];
        std::fs::write(&path, tiny_elf(0x1000, &code, 8)).unwrap();

        let config = SimConfig::new().with_elf_path(path.to_string_lossy().into_owned());
        let mut env = SimEnv::from_config(config).unwrap();
        assert_eq!(env.cpu.pc(), 0x1000);
        assert_eq!(env.run_compliance().unwrap(), TestResult::Pass);
        assert_eq!(env.cpu.read_reg(1), 5);

        std::fs::remove_file(&path).ok();
    }

    fn segment(vaddr: u32, words: &[u32], bss: usize, executable: bool) -> ElfSegment {
        let data: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        ElfSegment {
            vaddr,
            file_size: data.len(),
            mem_size: data.len() + bss,
            data,
            executable,
            writable: !executable,
        }
    }

    fn elf_image(entry: u32, segments: Vec<ElfSegment>) -> ProgramImage {
        ProgramImage::Elf(ElfInfo {
            entry,
            segments,
            symbols: Vec::new(),
        })
    }

    fn harvard_config() -> SimConfig {
        SimConfig::new()
            .with_memory("rom", 0x8000_0000, 64)
            .with_data_memory("dram", 0, 0x2000)
            .with_topology(Topology::Split)
            .with_reset_addr(0x8000_0000)
    }

    #[test]
    fn test_split_elf_routes_segments() {
        let text = [
            asm::lui(2, 0x4000), // x2 = 0x4000
            asm::lw(1, 2, 0),    // x1 = mem[0x4000]
            asm::sw(2, 1, 4),    // mem[0x4004] = x1
            asm::nop(),
        ];
        let image = elf_image(
            0x8000_0000,
            vec![
                segment(0x8000_0000, &text, 0, true),
                segment(0x4000, &[0xCAFE_F00D], 4, false),
            ],
        );
        let config = harvard_config();
        let (bus, ibus, dbus) = SimEnv::build_bus(&config, &image).expect("segments routed");

        assert_eq!(bus.instr_memory().read_word(0x8000_0000).unwrap(), text[0]);
        assert_eq!(bus.data_memory().read_word(0x4000).unwrap(), 0xCAFE_F00D);
        // 数据段不在指令存储范围内
        assert!(bus.instr_memory().read_word(0x4000).is_err());

        let cpu = SimEnv::build_cpu(0x8000_0000, ibus, dbus).unwrap();
        let mut env = SimEnv {
            cpu,
            bus,
            config,
            image,
            tohost_addr: None,
            trace: Vec::new(),
        };
        env.run(3).unwrap();
        assert_eq!(env.cpu.read_reg(1), 0xCAFE_F00D);
        assert_eq!(env.read_word(0x4004).unwrap(), 0xCAFE_F00D);
    }

    #[test]
    fn test_split_elf_rejects_misplaced_segments() {
        let config = harvard_config();

        let stray = elf_image(
            0x8000_0000,
            vec![segment(0x8000_0000, &[asm::nop()], 0, true), segment(0x10_0000, &[1], 0, false)],
        );
        assert!(matches!(SimEnv::build_bus(&config, &stray), Err(SimError::Config(_))));

        // 可执行段只能放在指令存储
        let text_in_dram = elf_image(0x100, vec![segment(0x100, &[asm::nop()], 0, true)]);
        assert!(matches!(SimEnv::build_bus(&config, &text_in_dram), Err(SimError::Config(_))));
    }

    #[test]
    fn test_unaligned_segment_rejected() {
        let image = elf_image(0x1002, vec![segment(0x1002, &[asm::nop()], 0, true)]);
        let shared = SimConfig::new();
        assert!(matches!(SimEnv::build_bus(&shared, &image), Err(SimError::ElfParse(_))));

        let split = SimConfig::new().with_topology(Topology::Split).with_data_memory("dram", 0x10_0000, 16);
        assert!(matches!(SimEnv::build_bus(&split, &image), Err(SimError::ElfParse(_))));
    }

    #[test]
    fn test_core_uses_ports_from_bus() {
        let config = SimConfig::new().with_program(&[asm::nop()]);
        let env = SimEnv::from_config(config).unwrap();
        let SimBus::Shared(ref mem) = env.bus else {
            panic!("expected shared bus");
        };
        assert_ne!(env.cpu.instr_port(), env.cpu.data_port());
        assert_eq!(mem.granted(), None);

        let config = SimConfig::new().with_program(&[asm::nop()]).with_topology(Topology::Split);
        let env = SimEnv::from_config(config).unwrap();
        assert_eq!(env.cpu.instr_port(), SplitBus::INSTR);
        assert_eq!(env.cpu.data_port(), SplitBus::DATA);
    }
}
