//! 指令编码辅助函数
//!
//! 用于在测试和演示中直接拼装机器码。
//! 寄存器编号取低 5 位；分支、跳转的偏移量以字节为单位（最低位被丢弃）。

use crate::isa::fields::*;
use crate::isa::instr::{AluOp, BranchCond};

/// R-type：rd = rs1 ? rs2
pub fn r_type(op: u32, funct3: u8, funct7: u8, rd: u8, rs1: u8, rs2: u8) -> u32 {
    (op & 0x7F)
        | ((rd as u32 & 0x1F) << 7)
        | ((funct3 as u32 & 0x7) << 12)
        | ((rs1 as u32 & 0x1F) << 15)
        | ((rs2 as u32 & 0x1F) << 20)
        | ((funct7 as u32 & 0x7F) << 25)
}

/// I-type：rd = rs1 ? imm[11:0]
pub fn i_type(op: u32, funct3: u8, rd: u8, rs1: u8, imm: i32) -> u32 {
    (op & 0x7F)
        | ((rd as u32 & 0x1F) << 7)
        | ((funct3 as u32 & 0x7) << 12)
        | ((rs1 as u32 & 0x1F) << 15)
        | ((imm as u32 & 0xFFF) << 20)
}

/// S-type：mem[rs1 + imm] = rs2
pub fn s_type(op: u32, funct3: u8, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    (op & 0x7F)
        | ((imm & 0x1F) << 7)
        | ((funct3 as u32 & 0x7) << 12)
        | ((rs1 as u32 & 0x1F) << 15)
        | ((rs2 as u32 & 0x1F) << 20)
        | (((imm >> 5) & 0x7F) << 25)
}

/// B-type：if rs1 ? rs2 then pc += offset
pub fn b_type(op: u32, funct3: u8, rs1: u8, rs2: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (op & 0x7F)
        | (((imm >> 11) & 0x1) << 7)
        | (((imm >> 1) & 0xF) << 8)
        | ((funct3 as u32 & 0x7) << 12)
        | ((rs1 as u32 & 0x1F) << 15)
        | ((rs2 as u32 & 0x1F) << 20)
        | (((imm >> 5) & 0x3F) << 25)
        | (((imm >> 12) & 0x1) << 31)
}

/// U-type：`upper` 取其高 20 位（与 `lui x1, 0xdeadc` 中写的是 `0xdeadc000`）
pub fn u_type(op: u32, rd: u8, upper: u32) -> u32 {
    (op & 0x7F) | ((rd as u32 & 0x1F) << 7) | (upper & 0xFFFF_F000)
}

/// J-type：rd = pc + 4; pc += offset
pub fn j_type(op: u32, rd: u8, offset: i32) -> u32 {
    let imm = offset as u32;
    (op & 0x7F)
        | ((rd as u32 & 0x1F) << 7)
        | (imm & 0x000F_F000)
        | (((imm >> 11) & 0x1) << 20)
        | (((imm >> 1) & 0x3FF) << 21)
        | (((imm >> 20) & 0x1) << 31)
}

fn alu_r(op: AluOp, rd: u8, rs1: u8, rs2: u8) -> u32 {
    let bits = op.bits();
    r_type(OP_REG, bits & 0x7, (bits >> 3) << 5, rd, rs1, rs2)
}

fn alu_i(op: AluOp, rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(OP_IMM, op.bits() & 0x7, rd, rs1, imm)
}

fn shift_i(op: AluOp, rd: u8, rs1: u8, shamt: u8) -> u32 {
    let bits = op.bits();
    r_type(OP_IMM, bits & 0x7, (bits >> 3) << 5, rd, rs1, shamt)
}

fn branch(cond: BranchCond, rs1: u8, rs2: u8, offset: i32) -> u32 {
    b_type(OP_BRANCH, cond.bits(), rs1, rs2, offset)
}

// ========== R-type ==========
pub fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Add, rd, rs1, rs2)
}
pub fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Sub, rd, rs1, rs2)
}
pub fn sll(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Sll, rd, rs1, rs2)
}
pub fn slt(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Slt, rd, rs1, rs2)
}
pub fn sltu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Sltu, rd, rs1, rs2)
}
pub fn xor(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Xor, rd, rs1, rs2)
}
pub fn srl(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Srl, rd, rs1, rs2)
}
pub fn sra(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Sra, rd, rs1, rs2)
}
pub fn or(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::Or, rd, rs1, rs2)
}
pub fn and(rd: u8, rs1: u8, rs2: u8) -> u32 {
    alu_r(AluOp::And, rd, rs1, rs2)
}

// ========== 移位立即数（R-type 布局，shamt 位于 rs2 字段） ==========
pub fn slli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    shift_i(AluOp::Sll, rd, rs1, shamt)
}
pub fn srli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    shift_i(AluOp::Srl, rd, rs1, shamt)
}
pub fn srai(rd: u8, rs1: u8, shamt: u8) -> u32 {
    shift_i(AluOp::Sra, rd, rs1, shamt)
}

// ========== I-type ==========
pub fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::Add, rd, rs1, imm)
}
pub fn slti(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::Slt, rd, rs1, imm)
}
pub fn sltiu(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::Sltu, rd, rs1, imm)
}
pub fn xori(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::Xor, rd, rs1, imm)
}
pub fn ori(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::Or, rd, rs1, imm)
}
pub fn andi(rd: u8, rs1: u8, imm: i32) -> u32 {
    alu_i(AluOp::And, rd, rs1, imm)
}
pub fn jalr(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(OP_JALR, 0b000, rd, rs1, imm)
}
pub fn lw(rd: u8, rs1: u8, imm: i32) -> u32 {
    i_type(OP_LOAD, WIDTH_WORD, rd, rs1, imm)
}

// ========== S-type ==========
pub fn sw(rs1: u8, rs2: u8, imm: i32) -> u32 {
    s_type(OP_STORE, WIDTH_WORD, rs1, rs2, imm)
}

// ========== B-type ==========
pub fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Eq, rs1, rs2, offset)
}
pub fn bne(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Ne, rs1, rs2, offset)
}
pub fn blt(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Lt, rs1, rs2, offset)
}
pub fn bge(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Ge, rs1, rs2, offset)
}
pub fn bltu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Ltu, rs1, rs2, offset)
}
pub fn bgeu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(BranchCond::Geu, rs1, rs2, offset)
}

// ========== U-type / J-type ==========
pub fn lui(rd: u8, upper: u32) -> u32 {
    u_type(OP_LUI, rd, upper)
}
pub fn auipc(rd: u8, upper: u32) -> u32 {
    u_type(OP_AUIPC, rd, upper)
}
pub fn jal(rd: u8, offset: i32) -> u32 {
    j_type(OP_JAL, rd, offset)
}

/// 伪指令 LI：拆成 LUI + ADDI
///
/// ADDI 的立即数会被符号扩展，低 12 位最高位为 1 时 LUI 部分需要进位补偿。
pub fn li(rd: u8, value: u32) -> [u32; 2] {
    let low = ((value << 20) as i32) >> 20;
    let upper = value.wrapping_sub(low as u32);
    [lui(rd, upper), addi(rd, rd, low)]
}

/// 伪指令 NOP：addi x0, x0, 0
pub fn nop() -> u32 {
    addi(0, 0, 0)
}
