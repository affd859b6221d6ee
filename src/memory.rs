//! 总线与存储单元
//!
//! 本模块定义了握手总线的请求/响应信号、统一的 `Bus` 接口，
//! 以及带仲裁器的字寻址存储单元 `MemoryUnit`。
//!
//! 协议（每个端口）：
//! - 主设备在整个事务期间拉高 `cyc`，地址/数据有效时拉高 `stb`，
//!   并保持地址与数据不变直到看到 `ack`
//! - 存储单元在时钟沿上登记 `ack` 与 `data_r`；`wait_states = 0` 时，
//!   某个周期发出的请求在该周期结束的时钟沿上完成
//! - 写操作在 `ack` 登记的同一时钟沿提交
//!
//! 只支持整字访问：字节地址右移 2 位得到字索引，低两位被忽略。

use thiserror::Error;

/// 主设备发出的请求信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusRequest {
    /// 字节地址
    pub addr: u32,
    /// 写数据
    pub data_w: u32,
    /// 写使能
    pub we: bool,
    /// 总线周期有效
    pub cyc: bool,
    /// 选通
    pub stb: bool,
}

impl BusRequest {
    /// 空闲：不占用总线
    pub fn idle() -> Self {
        Self::default()
    }

    /// 读请求
    pub fn read(addr: u32) -> Self {
        BusRequest {
            addr,
            data_w: 0,
            we: false,
            cyc: true,
            stb: true,
        }
    }

    /// 写请求
    pub fn write(addr: u32, data: u32) -> Self {
        BusRequest {
            addr,
            data_w: data,
            we: true,
            cyc: true,
            stb: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cyc && self.stb
    }
}

/// 存储单元返回的响应信号（寄存器输出）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusResponse {
    pub data_r: u32,
    pub ack: bool,
}

/// 总线端口句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub usize);

/// 总线接口
///
/// 每个时钟周期的调用顺序：
/// 1. 各主设备通过 `request` 驱动本周期的请求信号（组合逻辑）
/// 2. `clock` 推进一个时钟沿，仲裁并登记响应
/// 3. 主设备通过 `response` 采样登记后的 `ack` / `data_r`
pub trait Bus {
    /// 驱动指定端口的请求信号
    fn request(&mut self, port: PortId, req: BusRequest);

    /// 推进一个时钟沿
    fn clock(&mut self);

    /// 读取指定端口的响应
    fn response(&self, port: PortId) -> BusResponse;
}

/// 存储访问错误（只出现在加载程序、调试读写等旁路接口上）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemError {
    #[error("Out-of-range access at 0x{addr:08x} (region=0x{base:08x}, {words} words)")]
    OutOfRange { addr: u32, base: u32, words: usize },
}

pub type MemResult<T> = Result<T, MemError>;

/// 将小端字节流切成 32-bit 字，末尾不足 4 字节的部分补零
pub fn words_from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(buf)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct PortState {
    req: BusRequest,
    resp: BusResponse,
}

/// 带仲裁器的字寻址存储单元
///
/// 一个实例拥有一块存储和任意多个端口（`new_port`）。
/// 同一时刻只有一个端口获得授权：授权端口保持 `cyc` 时授权不变，
/// 撤销 `cyc` 后在其余发出 `cyc` 的端口中轮询选择下一个。
///
/// # 示例
///
/// ```
/// use tinyrv_sim::memory::{Bus, BusRequest, MemoryUnit};
///
/// let mut mem = MemoryUnit::new(64, 0);
/// let port = mem.new_port();
/// mem.write_word(8, 0x1234).unwrap();
///
/// mem.request(port, BusRequest::read(8));
/// mem.clock();
/// let resp = mem.response(port);
/// assert!(resp.ack);
/// assert_eq!(resp.data_r, 0x1234);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryUnit {
    words: Vec<u32>,
    base_addr: u32,
    wait_states: u32,
    ports: Vec<PortState>,
    grant: Option<usize>,
    last_grant: usize,
    waited: u32,
}

impl MemoryUnit {
    /// 创建一个 `size_words` 字、映射到 `base_addr` 起始的存储单元
    pub fn new(size_words: usize, base_addr: u32) -> Self {
        MemoryUnit {
            words: vec![0; size_words],
            base_addr,
            wait_states: 0,
            ports: Vec::new(),
            grant: None,
            last_grant: 0,
            waited: 0,
        }
    }

    /// 在固定的一个周期延迟之外，额外插入的等待周期数
    pub fn with_wait_states(mut self, wait_states: u32) -> Self {
        self.wait_states = wait_states;
        self
    }

    /// 新增一个总线端口
    pub fn new_port(&mut self) -> PortId {
        self.ports.push(PortState::default());
        PortId(self.ports.len() - 1)
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    pub fn size_words(&self) -> usize {
        self.words.len()
    }

    pub fn wait_states(&self) -> u32 {
        self.wait_states
    }

    /// 当前获得授权的端口
    pub fn granted(&self) -> Option<PortId> {
        self.grant.map(PortId)
    }

    fn index(&self, addr: u32) -> Option<usize> {
        let offset = addr.wrapping_sub(self.base_addr) >> 2;
        let idx = offset as usize;
        (addr >= self.base_addr && idx < self.words.len()).then_some(idx)
    }

    /// `[addr, addr + len)` 是否完全落在本存储内
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        let Some(start) = self.index(addr) else {
            return false;
        };
        start * 4 + len <= self.words.len() * 4
    }

    fn out_of_range(&self, addr: u32) -> MemError {
        MemError::OutOfRange {
            addr,
            base: self.base_addr,
            words: self.words.len(),
        }
    }

    /// 旁路读取一个字（不经过总线时序）
    pub fn read_word(&self, addr: u32) -> MemResult<u32> {
        let idx = self.index(addr).ok_or_else(|| self.out_of_range(addr))?;
        Ok(self.words[idx])
    }

    /// 旁路写入一个字（不经过总线时序）
    pub fn write_word(&mut self, addr: u32, value: u32) -> MemResult<()> {
        let idx = self.index(addr).ok_or_else(|| self.out_of_range(addr))?;
        self.words[idx] = value;
        Ok(())
    }

    /// 从 `addr` 起顺序写入一组字
    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> MemResult<()> {
        if words.is_empty() {
            return Ok(());
        }
        let start = self.index(addr).ok_or_else(|| self.out_of_range(addr))?;
        let end = start + words.len();
        if end > self.words.len() {
            let last = addr.wrapping_add(((words.len() - 1) * 4) as u32);
            return Err(self.out_of_range(last));
        }
        self.words[start..end].copy_from_slice(words);
        Ok(())
    }

    /// 按小端序把字节流写入，末尾不足一个字的部分补零
    pub fn load_bytes(&mut self, addr: u32, bytes: &[u8]) -> MemResult<()> {
        self.load_words(addr, &words_from_le_bytes(bytes))
    }

    /// 将指定字节范围清零（按字对齐）
    pub fn zero_range(&mut self, addr: u32, len: usize) -> MemResult<()> {
        let words = len.div_ceil(4);
        self.load_words(addr, &vec![0; words])
    }

    /// 所有字的只读视图
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    fn next_requester(&self) -> Option<usize> {
        let n = self.ports.len();
        (1..=n)
            .map(|i| (self.last_grant + i) % n)
            .find(|&i| self.ports[i].req.cyc)
    }

    fn access(&mut self, req: BusRequest) -> u32 {
        match self.index(req.addr) {
            Some(idx) => {
                let data = self.words[idx];
                if req.we {
                    self.words[idx] = req.data_w;
                }
                data
            }
            None => {
                log::warn!(
                    "bus access outside memory at 0x{:08x} (region=0x{:08x}, {} words), {}",
                    req.addr,
                    self.base_addr,
                    self.words.len(),
                    if req.we { "write dropped" } else { "reads 0" }
                );
                0
            }
        }
    }
}

impl Bus for MemoryUnit {
    fn request(&mut self, port: PortId, req: BusRequest) {
        match self.ports.get_mut(port.0) {
            Some(state) => state.req = req,
            None => log::warn!("request on unknown bus port {}", port.0),
        }
    }

    fn clock(&mut self) {
        // 授权端口撤销 cyc 即释放总线
        if let Some(g) = self.grant {
            if !self.ports[g].req.cyc {
                self.grant = None;
                self.waited = 0;
            }
        }
        if self.grant.is_none() {
            self.grant = self.next_requester();
            if let Some(g) = self.grant {
                self.last_grant = g;
            }
        }

        for state in &mut self.ports {
            state.resp.ack = false;
        }

        let Some(g) = self.grant else {
            return;
        };
        let req = self.ports[g].req;
        if !req.is_active() {
            return;
        }
        if self.waited < self.wait_states {
            self.waited += 1;
            return;
        }
        self.waited = 0;
        let data = self.access(req);
        self.ports[g].resp = BusResponse { data_r: data, ack: true };
    }

    fn response(&self, port: PortId) -> BusResponse {
        self.ports
            .get(port.0)
            .map(|state| state.resp)
            .unwrap_or_default()
    }
}

/// 哈佛结构：指令端口与数据端口分别连到两个独立的存储单元
#[derive(Debug, Clone)]
pub struct SplitBus {
    pub instr: MemoryUnit,
    pub data: MemoryUnit,
    instr_port: PortId,
    data_port: PortId,
}

impl SplitBus {
    /// 对外暴露的指令端口
    pub const INSTR: PortId = PortId(0);
    /// 对外暴露的数据端口
    pub const DATA: PortId = PortId(1);

    pub fn new(mut instr: MemoryUnit, mut data: MemoryUnit) -> Self {
        let instr_port = instr.new_port();
        let data_port = data.new_port();
        SplitBus {
            instr,
            data,
            instr_port,
            data_port,
        }
    }
}

impl Bus for SplitBus {
    fn request(&mut self, port: PortId, req: BusRequest) {
        match port {
            Self::INSTR => self.instr.request(self.instr_port, req),
            Self::DATA => self.data.request(self.data_port, req),
            other => log::warn!("request on unknown bus port {}", other.0),
        }
    }

    fn clock(&mut self) {
        self.instr.clock();
        self.data.clock();
    }

    fn response(&self, port: PortId) -> BusResponse {
        match port {
            Self::INSTR => self.instr.response(self.instr_port),
            Self::DATA => self.data.response(self.data_port),
            _ => BusResponse::default(),
        }
    }
}
