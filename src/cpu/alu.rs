//! 算术逻辑单元（组合逻辑）

use crate::isa::AluOp;

/// ALU 输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AluOutput {
    pub result: u32,
    /// 操作码是否有效；无效时 `result` 为 0
    pub valid: bool,
}

/// 计算 `a op b`
///
/// 操作数按需要解释为有符号或无符号数；移位量只取 `b` 的低 5 位。
/// 未定义的操作码不会报错，只是 `valid = false`。
pub fn compute(a: u32, b: u32, op: u8) -> AluOutput {
    let Some(op) = AluOp::from_bits(op) else {
        return AluOutput { result: 0, valid: false };
    };
    let shamt = b & 0x1F;
    let result = match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::And => a & b,
        AluOp::Or => a | b,
        AluOp::Xor => a ^ b,
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::Sltu => (a < b) as u32,
        AluOp::Sll => a << shamt,
        AluOp::Srl => a >> shamt,
        AluOp::Sra => ((a as i32) >> shamt) as u32,
    };
    AluOutput { result, valid: true }
}
