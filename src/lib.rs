//! tinyrv_sim: 周期级多周期 RV32I 核心仿真库
//!
//! 核心每条指令经过 FETCH / EXECUTE / WRITE 状态机，
//! 通过握手总线访问带仲裁器的字寻址存储。
//!
//! # 模块结构
//!
//! - `isa`: RV32I 子集的字段提取、解码与编码
//! - `cpu`: ALU、分支单元、寄存器堆与控制状态机
//! - `memory`: 总线信号、`Bus` 接口与存储单元
//! - `sim_env`: 仿真环境（配置、程序加载、看门狗、追踪、合规判定）

pub mod cpu;
pub mod isa;
pub mod memory;
pub mod sim_env;
