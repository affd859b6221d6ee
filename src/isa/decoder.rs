//! 指令解码器
//!
//! 纯函数：`decode(raw) -> DecodedInstr`，不持有任何状态。
//! 五种立即数格式并行拼装，再按 opcode 选择其一。

use crate::isa::fields::*;
use crate::isa::instr::{DecodedInstr, InstrClass, MemOp};

/// 解码一条 32-bit 指令
///
/// 不支持的 opcode 不会报错，而是得到 `DecodedInstr::unrecognized`：
/// ALU 类、没有任何操作数与写回，执行效果等同于空操作。
///
/// # 示例
///
/// ```
/// use tinyrv_sim::isa::{decode, InstrClass};
///
/// let d = decode(0x00100093); // addi x1, x0, 1
/// assert_eq!(d.class, InstrClass::Alu);
/// assert_eq!(d.rd, Some(1));
/// assert_eq!(d.imm, Some(1));
/// ```
pub fn decode(raw: u32) -> DecodedInstr {
    let rd = Some(rd(raw));
    let rs1 = Some(rs1(raw));
    let rs2 = Some(rs2(raw));
    let funct3 = funct3(raw);

    let base = DecodedInstr {
        raw,
        class: InstrClass::Alu,
        rs1: None,
        rs2: None,
        rd: None,
        funct: funct3,
        imm: None,
        mem_op: None,
        recognized: true,
    };

    match opcode(raw) {
        OP_LUI => DecodedInstr {
            rd,
            funct: 0,
            imm: Some(u_imm(raw)),
            ..base
        },
        OP_AUIPC => DecodedInstr {
            class: InstrClass::Auipc,
            rd,
            funct: 0,
            imm: Some(u_imm(raw)),
            ..base
        },
        OP_REG => DecodedInstr {
            rs1,
            rs2,
            rd,
            funct: (alt_bit(raw) << 3) | funct3,
            ..base
        },
        OP_IMM => {
            // 移位立即数：shamt 取自 rs2 字段，inst[30] 区分 SRLI/SRAI
            let is_shift = matches!(funct3, 0b001 | 0b101);
            let (funct, imm) = if is_shift {
                ((alt_bit(raw) << 3) | funct3, shamt(raw))
            } else {
                (funct3, i_imm(raw))
            };
            DecodedInstr {
                rs1,
                rd,
                funct,
                imm: Some(imm),
                ..base
            }
        }
        OP_JAL => DecodedInstr {
            class: InstrClass::Jump,
            rd,
            funct: 0,
            imm: Some(j_imm(raw)),
            ..base
        },
        OP_JALR => DecodedInstr {
            class: InstrClass::JumpReg,
            rs1,
            rd,
            funct: 0,
            imm: Some(i_imm(raw)),
            ..base
        },
        OP_BRANCH => DecodedInstr {
            class: InstrClass::Branch,
            rs1,
            rs2,
            imm: Some(b_imm(raw)),
            ..base
        },
        OP_LOAD => DecodedInstr {
            class: InstrClass::Load,
            rs1,
            rd,
            imm: Some(i_imm(raw)),
            mem_op: Some(MemOp::Load),
            ..base
        },
        OP_STORE => DecodedInstr {
            class: InstrClass::Store,
            rs1,
            rs2,
            imm: Some(s_imm(raw)),
            mem_op: Some(MemOp::Store),
            ..base
        },
        _ => DecodedInstr::unrecognized(raw),
    }
}
