//! 指令字段提取辅助函数
//!
//! 从 32-bit 指令字中切出各字段，并按 I/S/B/U/J 五种格式拼装立即数。
//! 立即数统一以 `u32` 返回（已完成符号扩展），与数据通路的位宽一致。

/// 提取 opcode 字段 [6:0]
#[inline]
pub fn opcode(raw: u32) -> u32 {
    raw & 0x7F
}

/// 提取 rd 字段 [11:7]
#[inline]
pub fn rd(raw: u32) -> u8 {
    ((raw >> 7) & 0x1F) as u8
}

/// 提取 funct3 字段 [14:12]
#[inline]
pub fn funct3(raw: u32) -> u8 {
    ((raw >> 12) & 0x7) as u8
}

/// 提取 rs1 字段 [19:15]
#[inline]
pub fn rs1(raw: u32) -> u8 {
    ((raw >> 15) & 0x1F) as u8
}

/// 提取 rs2 字段 [24:20]
#[inline]
pub fn rs2(raw: u32) -> u8 {
    ((raw >> 20) & 0x1F) as u8
}

/// 提取 funct7 字段 [31:25]
#[inline]
pub fn funct7(raw: u32) -> u8 {
    ((raw >> 25) & 0x7F) as u8
}

/// 提取 inst[30]，即 ADD/SUB、SRL/SRA 的区分位
#[inline]
pub fn alt_bit(raw: u32) -> u8 {
    ((raw >> 30) & 0x1) as u8
}

/// I-type 立即数：imm[11:0] = raw[31:20]，从 bit 31 符号扩展
#[inline]
pub fn i_imm(raw: u32) -> u32 {
    ((raw as i32) >> 20) as u32
}

/// S-type 立即数：imm[11:5] = raw[31:25], imm[4:0] = raw[11:7]
#[inline]
pub fn s_imm(raw: u32) -> u32 {
    let hi = ((raw as i32) >> 25) as u32; // 已符号扩展的 imm[11:5]
    (hi << 5) | ((raw >> 7) & 0x1F)
}

/// B-type 立即数：imm[12|10:5|4:1|11] = raw[31|30:25|11:8|7]，imm[0] = 0
#[inline]
pub fn b_imm(raw: u32) -> u32 {
    let sign = ((raw as i32) >> 31) as u32; // 全 0 或全 1
    (sign << 12)
        | (((raw >> 7) & 0x1) << 11)
        | (((raw >> 25) & 0x3F) << 5)
        | (((raw >> 8) & 0xF) << 1)
}

/// U-type 立即数：imm[31:12] = raw[31:12]，低 12 位清零，不做符号扩展
#[inline]
pub fn u_imm(raw: u32) -> u32 {
    raw & 0xFFFF_F000
}

/// J-type 立即数：imm[20|10:1|11|19:12] = raw[31|30:21|20|19:12]，imm[0] = 0
#[inline]
pub fn j_imm(raw: u32) -> u32 {
    let sign = ((raw as i32) >> 31) as u32;
    (sign << 20)
        | (raw & 0x000F_F000)
        | (((raw >> 20) & 0x1) << 11)
        | (((raw >> 21) & 0x3FF) << 1)
}

/// 移位立即数 shamt [24:20]，零扩展
#[inline]
pub fn shamt(raw: u32) -> u32 {
    (raw >> 20) & 0x1F
}

// ========== Opcode 常量 ==========
pub const OP_LUI: u32 = 0b0110111;
pub const OP_AUIPC: u32 = 0b0010111;
pub const OP_JAL: u32 = 0b1101111;
pub const OP_JALR: u32 = 0b1100111;
pub const OP_BRANCH: u32 = 0b1100011;
pub const OP_LOAD: u32 = 0b0000011;
pub const OP_STORE: u32 = 0b0100011;
pub const OP_IMM: u32 = 0b0010011;
pub const OP_REG: u32 = 0b0110011;

// ========== 访存宽度 (funct3) ==========
/// 仅支持字访问，其余宽度按字处理
pub const WIDTH_WORD: u8 = 0b010;
