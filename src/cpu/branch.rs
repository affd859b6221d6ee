//! 分支比较单元（组合逻辑）

use crate::isa::BranchCond;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BranchOutput {
    pub taken: bool,
    pub valid: bool,
}

/// 按 funct3 比较 `a` 与 `b`；未定义的条件码 `valid = false` 且不跳转
pub fn evaluate(a: u32, b: u32, cond: u8) -> BranchOutput {
    let Some(cond) = BranchCond::from_bits(cond) else {
        return BranchOutput { taken: false, valid: false };
    };
    let taken = match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i32) < (b as i32),
        BranchCond::Ge => (a as i32) >= (b as i32),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    };
    BranchOutput { taken, valid: true }
}
