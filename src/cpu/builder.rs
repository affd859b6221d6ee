//! CPU 配置器
//!
//! 统一配置复位地址、总线端口与初始寄存器值。
//!
//! # 示例
//!
//! ```
//! use tinyrv_sim::cpu::CpuBuilder;
//! use tinyrv_sim::memory::MemoryUnit;
//!
//! let mut mem = MemoryUnit::new(256, 0);
//! let ibus = mem.new_port();
//! let dbus = mem.new_port();
//!
//! let cpu = CpuBuilder::new(0x200)
//!     .instr_port(ibus)
//!     .data_port(dbus)
//!     .with_reg(2, 0x400)
//!     .build()
//!     .expect("端口不冲突");
//! assert_eq!(cpu.pc(), 0x200);
//! assert_eq!(cpu.read_reg(2), 0x400);
//! ```

use thiserror::Error;

use super::CpuCore;
use super::regfile::RegisterFile;
use crate::memory::PortId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("instruction and data buses cannot share port {0}")]
    SharedPort(usize),
    #[error("register x{0} does not exist")]
    InvalidRegister(u8),
}

/// CPU 构建器
///
/// 默认指令端口为 `PortId(0)`、数据端口为 `PortId(1)`，
/// 与在一个 `MemoryUnit` 上依次调用两次 `new_port` 的结果一致，
/// 也与 `SplitBus::INSTR` / `SplitBus::DATA` 一致。
#[derive(Debug, Clone)]
pub struct CpuBuilder {
    reset_addr: u32,
    ibus: PortId,
    dbus: PortId,
    regs: Vec<(u8, u32)>,
}

impl CpuBuilder {
    pub fn new(reset_addr: u32) -> Self {
        Self {
            reset_addr,
            ibus: PortId(0),
            dbus: PortId(1),
            regs: Vec::new(),
        }
    }

    /// 指令总线端口
    pub fn instr_port(mut self, port: PortId) -> Self {
        self.ibus = port;
        self
    }

    /// 数据总线端口
    pub fn data_port(mut self, port: PortId) -> Self {
        self.dbus = port;
        self
    }

    /// 复位后寄存器的初始值（默认全 0）
    pub fn with_reg(mut self, reg: u8, value: u32) -> Self {
        self.regs.push((reg, value));
        self
    }

    pub fn build(self) -> Result<CpuCore, BuildError> {
        if self.ibus == self.dbus {
            return Err(BuildError::SharedPort(self.ibus.0));
        }

        let mut regs = RegisterFile::new();
        for (reg, value) in self.regs {
            if reg >= 32 {
                return Err(BuildError::InvalidRegister(reg));
            }
            regs.poke(reg, value);
        }

        Ok(CpuCore::with_config(self.reset_addr, regs, self.ibus, self.dbus))
    }
}

impl Default for CpuBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}
