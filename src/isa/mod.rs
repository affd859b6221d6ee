//! RV32I 指令集子集：字段提取、解码与编码
//!
//! - `fields`: 指令字段与立即数的位提取
//! - `DecodedInstr`: 解码结果（类别 + 可选操作数）
//! - `decode`: 纯组合逻辑的解码器
//! - `asm`: 拼装机器码的辅助函数

mod decoder;
mod fields;
mod instr;
pub mod asm;

pub use decoder::decode;
pub use fields::*;
pub use instr::{AluOp, BranchCond, DecodedInstr, InstrClass, MemOp};

#[cfg(test)]
mod tests;
