//! 通用寄存器堆
//!
//! 读为组合逻辑，写在时钟沿生效。

/// 写端口上暂存的写操作，下一次 `clock()` 时提交
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWrite {
    reg: u8,
    value: u32,
}

/// 寄存器 x0..x31，x0 恒为 0
///
/// - `read` 读到的是上一个时钟沿之后的状态
/// - `write` 只暂存，`clock()` 之后才可见；同一周期内多次写入只保留最后一次（单写端口）
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    regs: [u32; 32],
    pending: Option<PendingWrite>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self, reg: u8) -> u32 {
        match reg & 0x1F {
            0 => 0,
            r => self.regs[r as usize],
        }
    }

    /// 暂存一次写入，写 x0 在时钟沿被丢弃
    #[inline]
    pub fn write(&mut self, reg: u8, value: u32, enable: bool) {
        if enable {
            self.pending = Some(PendingWrite { reg: reg & 0x1F, value });
        }
    }

    /// 时钟沿：提交暂存的写入
    pub fn clock(&mut self) {
        if let Some(PendingWrite { reg, value }) = self.pending.take() {
            if reg != 0 {
                self.regs[reg as usize] = value;
            }
        }
    }

    /// 绕过写端口直接写入，用于预置初值
    pub fn poke(&mut self, reg: u8, value: u32) {
        let reg = reg & 0x1F;
        if reg != 0 {
            self.regs[reg as usize] = value;
        }
    }

    pub fn snapshot(&self) -> &[u32; 32] {
        &self.regs
    }
}
