//! CPU 核心
//!
//! 本模块定义了多周期 RV32I 核心 `CpuCore`：
//! 每条指令依次经过 FETCH → EXECUTE →（访存指令）WRITE 三个状态，
//! 指令之间没有重叠。
//!
//! 核心以时钟周期为单位推进（`tick`）：先由寄存器状态得到本周期的
//! 总线请求，再推进总线时钟，最后一次性提交下一周期的寄存器状态。

use crate::isa::{self, AluOp, DecodedInstr, InstrClass, WIDTH_WORD};
use crate::memory::{Bus, BusRequest, BusResponse, PortId};

pub mod alu;
pub mod branch;
mod builder;
pub mod regfile;

pub use builder::{BuildError, CpuBuilder};
use alu::AluOutput;
use branch::BranchOutput;
use regfile::RegisterFile;

/// 控制状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    /// 通过指令端口取指
    Fetch,
    /// 解码、运算，非访存指令在此退休
    Execute,
    /// 通过数据端口完成加载 / 存储
    Write,
}

/// 一次数据总线访问
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemAccess {
    pub addr: u32,
    /// 存储时为写数据，加载时为读回的数据
    pub data: u32,
    pub store: bool,
}

/// 退休指令的记录，由完成该指令的那个 `tick` 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    /// 指令所在地址
    pub pc: u32,
    /// 提交后的 PC
    pub next_pc: u32,
    pub instr: DecodedInstr,
    /// (寄存器号, 读出的值)
    pub rs1: Option<(u8, u32)>,
    pub rs2: Option<(u8, u32)>,
    /// (寄存器号, 写回的值)；写 x0 时值被丢弃
    pub rd: Option<(u8, u32)>,
    pub mem: Option<MemAccess>,
}

/// EXECUTE 阶段的运算结果，访存指令保留到 WRITE 阶段使用
#[derive(Debug, Clone, Copy)]
struct Execution {
    decoded: DecodedInstr,
    rs1_val: u32,
    rs2_val: u32,
    alu: AluOutput,
    next_pc: u32,
    writeback: Option<(u8, u32)>,
}

/// 多周期 CPU 核心
///
/// 设计约定：
/// - x0 永远为 0，写入时丢弃
/// - PC 为字节地址，按惯例 4 字节对齐（不做检查）
/// - 核心只通过 `Bus` 访问存储，自身不持有存储
pub struct CpuCore {
    pc: u32,
    reset_addr: u32,
    state: CpuState,
    /// FETCH 阶段锁存的指令字
    instruction: u32,
    regs: RegisterFile,
    /// 复位时恢复的寄存器初值
    preset: RegisterFile,
    ibus: PortId,
    dbus: PortId,
    pending: Option<Execution>,
    valid: bool,
    cycles: u64,
    retired: u64,
}

impl CpuCore {
    /// 创建一个新的 CPU 核心，使用默认端口 `PortId(0)` / `PortId(1)`
    ///
    /// # 示例
    ///
    /// ```
    /// use tinyrv_sim::cpu::{CpuCore, CpuState};
    ///
    /// let cpu = CpuCore::new(0x200);
    /// assert_eq!(cpu.pc(), 0x200);
    /// assert_eq!(cpu.state(), CpuState::Fetch);
    /// ```
    pub fn new(reset_addr: u32) -> Self {
        Self::with_config(reset_addr, RegisterFile::new(), PortId(0), PortId(1))
    }

    pub(crate) fn with_config(reset_addr: u32, regs: RegisterFile, ibus: PortId, dbus: PortId) -> Self {
        CpuCore {
            pc: reset_addr,
            reset_addr,
            state: CpuState::Fetch,
            instruction: 0,
            preset: regs.clone(),
            regs,
            ibus,
            dbus,
            pending: None,
            valid: false,
            cycles: 0,
            retired: 0,
        }
    }

    /// 复位：回到 FETCH，PC 回到复位地址，寄存器恢复为构建时的初值
    pub fn reset(&mut self) {
        let preset = std::mem::take(&mut self.preset);
        *self = Self::with_config(self.reset_addr, preset, self.ibus, self.dbus);
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// 读取 x0 总是返回 0
    pub fn read_reg(&self, reg: u8) -> u32 {
        self.regs.read(reg)
    }

    /// 获取所有寄存器的快照
    pub fn regs(&self) -> &[u32; 32] {
        self.regs.snapshot()
    }

    /// 上一个 `tick` 是否退休了一条指令
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// 最近一次取到的指令字
    pub fn instruction(&self) -> u32 {
        self.instruction
    }

    /// 复位以来经过的时钟周期数
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// 复位以来退休的指令数
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub fn instr_port(&self) -> PortId {
        self.ibus
    }

    pub fn data_port(&self) -> PortId {
        self.dbus
    }

    /// 由当前寄存器状态得到的总线请求：(指令端口, 数据端口)
    pub fn bus_requests(&self) -> (BusRequest, BusRequest) {
        match self.state {
            CpuState::Fetch => (BusRequest::read(self.pc), BusRequest::idle()),
            CpuState::Execute => (BusRequest::idle(), BusRequest::idle()),
            CpuState::Write => match &self.pending {
                Some(exec) if exec.decoded.mem_op_store() => {
                    (BusRequest::idle(), BusRequest::write(exec.alu.result, exec.rs2_val))
                }
                Some(exec) => (BusRequest::idle(), BusRequest::read(exec.alu.result)),
                None => (BusRequest::idle(), BusRequest::idle()),
            },
        }
    }

    /// 推进一个时钟周期
    ///
    /// # 返回
    ///
    /// 本周期退休的指令；没有指令退休时返回 `None`
    ///
    /// # 流程
    ///
    /// 1. 驱动两个端口的请求
    /// 2. 推进总线时钟
    /// 3. 按当前状态计算下一状态，并提交寄存器堆写入
    pub fn tick(&mut self, bus: &mut dyn Bus) -> Option<Retired> {
        let (ireq, dreq) = self.bus_requests();
        bus.request(self.ibus, ireq);
        bus.request(self.dbus, dreq);

        log::trace!(
            "cycle {} {:?} pc=0x{:08x} ibus.stb={} dbus.stb={} dbus.we={}",
            self.cycles,
            self.state,
            self.pc,
            ireq.stb,
            dreq.stb,
            dreq.we
        );

        bus.clock();
        self.cycles += 1;

        let retired = match self.state {
            CpuState::Fetch => {
                let resp = bus.response(self.ibus);
                if resp.ack {
                    self.instruction = resp.data_r;
                    self.state = CpuState::Execute;
                }
                None
            }
            CpuState::Execute => {
                let exec = self.execute();
                if exec.decoded.mem_op_en() {
                    self.pending = Some(exec);
                    self.state = CpuState::Write;
                    None
                } else {
                    Some(self.commit(exec, None))
                }
            }
            CpuState::Write => {
                let resp = bus.response(self.dbus);
                match self.pending {
                    Some(exec) if resp.ack => {
                        self.pending = None;
                        Some(self.commit(exec, Some(resp)))
                    }
                    Some(_) => None,
                    None => {
                        self.state = CpuState::Fetch;
                        None
                    }
                }
            }
        };

        self.regs.clock();
        self.valid = retired.is_some();
        retired
    }

    /// 解码锁存的指令，计算 ALU、分支与下一条 PC
    fn execute(&self) -> Execution {
        let decoded = isa::decode(self.instruction);
        if !decoded.recognized {
            log::warn!(
                "unknown opcode 0x{:02x} in 0x{:08x} at pc=0x{:08x}, executed as no-op",
                isa::opcode(decoded.raw),
                decoded.raw,
                self.pc
            );
        }

        let rs1_val = decoded.rs1.map_or(0, |r| self.regs.read(r));
        let rs2_val = decoded.rs2.map_or(0, |r| self.regs.read(r));

        // 操作数选择
        let a = match decoded.class {
            InstrClass::Auipc | InstrClass::Jump | InstrClass::Branch => self.pc,
            _ => rs1_val,
        };
        let b = match (decoded.class, decoded.rs2) {
            (InstrClass::Alu, Some(_)) => rs2_val,
            _ => decoded.imm_or_zero(),
        };
        let op = match decoded.class {
            InstrClass::Alu => decoded.funct,
            _ => AluOp::Add.bits(),
        };

        let alu = alu::compute(a, b, op);
        if !alu.valid {
            log::debug!(
                "invalid alu op 0b{:04b} in 0x{:08x} at pc=0x{:08x}, result forced to 0",
                op,
                decoded.raw,
                self.pc
            );
        }

        let branch = if decoded.class == InstrClass::Branch {
            let out = branch::evaluate(rs1_val, rs2_val, decoded.funct3());
            if !out.valid {
                log::debug!(
                    "invalid branch condition 0b{:03b} in 0x{:08x} at pc=0x{:08x}, not taken",
                    decoded.funct3(),
                    decoded.raw,
                    self.pc
                );
            }
            out
        } else {
            BranchOutput::default()
        };

        if decoded.mem_op_en() && decoded.funct3() != WIDTH_WORD {
            log::warn!(
                "sub-word access width 0b{:03b} in 0x{:08x} at pc=0x{:08x}, treated as word",
                decoded.funct3(),
                decoded.raw,
                self.pc
            );
        }

        let seq_pc = self.pc.wrapping_add(4);
        let next_pc = match decoded.class {
            InstrClass::Jump | InstrClass::JumpReg => alu.result,
            InstrClass::Branch if branch.taken => alu.result,
            _ => seq_pc,
        };

        // 加载的写回值在 WRITE 阶段才确定
        let writeback = decoded.rd.and_then(|rd| match decoded.class {
            InstrClass::Alu | InstrClass::Auipc => Some((rd, alu.result)),
            InstrClass::Jump | InstrClass::JumpReg => Some((rd, seq_pc)),
            InstrClass::Load | InstrClass::Store | InstrClass::Branch => None,
        });

        Execution {
            decoded,
            rs1_val,
            rs2_val,
            alu,
            next_pc,
            writeback,
        }
    }

    /// 提交写回与 PC，回到 FETCH
    fn commit(&mut self, exec: Execution, resp: Option<BusResponse>) -> Retired {
        let decoded = exec.decoded;

        let mem = resp.map(|resp| {
            let store = decoded.mem_op_store();
            MemAccess {
                addr: exec.alu.result,
                data: if store { exec.rs2_val } else { resp.data_r },
                store,
            }
        });

        let writeback = match (decoded.class, decoded.rd, resp) {
            (InstrClass::Load, Some(rd), Some(resp)) => Some((rd, resp.data_r)),
            _ => exec.writeback,
        };
        if let Some((rd, value)) = writeback {
            self.regs.write(rd, value, true);
        }

        let record = Retired {
            pc: self.pc,
            next_pc: exec.next_pc,
            instr: decoded,
            rs1: decoded.rs1.map(|r| (r, exec.rs1_val)),
            rs2: decoded.rs2.map(|r| (r, exec.rs2_val)),
            rd: writeback,
            mem,
        };

        log::debug!(
            "retire #{} pc=0x{:08x} 0x{:08x} {} -> next_pc=0x{:08x}",
            self.retired,
            record.pc,
            decoded.raw,
            decoded,
            record.next_pc
        );

        self.pc = exec.next_pc;
        self.state = CpuState::Fetch;
        self.retired += 1;
        record
    }

    /// 打印寄存器状态
    pub fn dump_regs(&self) {
        println!("═══════════════════════════════════════════════════════════════════");
        println!("CPU Status Dump");
        println!("═══════════════════════════════════════════════════════════════════");

        println!(
            "PC: 0x{:08x}  State: {:?}  Cycles: {}  Retired: {}",
            self.pc, self.state, self.cycles, self.retired
        );
        println!("Instruction: 0x{:08x}  {}", self.instruction, isa::decode(self.instruction));
        println!();

        println!("─── Integer Registers (x0-x31) ───────────────────────────────────");
        for i in 0..32 {
            if i % 4 == 0 {
                print!("  ");
            }
            print!("x{:02}: 0x{:08x}  ", i, self.read_reg(i as u8));
            if i % 4 == 3 {
                println!();
            }
        }

        println!("═══════════════════════════════════════════════════════════════════");
    }
}

impl Default for CpuCore {
    fn default() -> Self {
        Self::new(0)
    }
}
