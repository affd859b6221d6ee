//! ISA 模块测试

use super::*;

fn signed(imm: i32) -> Option<u32> {
    Some(imm as u32)
}

#[test]
fn test_decode_lui() {
    let d = decode(0xDEADC0B7); // lui x1, 0xdeadc
    assert!(d.recognized);
    assert_eq!(d.class, InstrClass::Alu);
    assert_eq!(d.rd, Some(1));
    assert_eq!(d.rs1, None);
    assert_eq!(d.rs2, None);
    assert_eq!(d.imm, Some(0xDEADC000));
    assert_eq!(d.funct, 0);
    assert_eq!(d.mem_op, None);
}

#[test]
fn test_decode_addi_negative() {
    let d = decode(0xEEF08093); // addi x1, x1, -273
    assert_eq!(d.class, InstrClass::Alu);
    assert_eq!((d.rd, d.rs1, d.rs2), (Some(1), Some(1), None));
    assert_eq!(d.imm, signed(-273));
    assert_eq!(d.alu_op(), Some(AluOp::Add));
}

#[test]
fn test_decode_auipc() {
    let d = decode(0x80004197); // auipc x3, 0x80004
    assert_eq!(d.class, InstrClass::Auipc);
    assert_eq!(d.rd, Some(3));
    assert_eq!(d.rs1, None);
    assert_eq!(d.imm, Some(0x8000_4000));

    let d = decode(0x80004117); // auipc x2, 0x80004
    assert_eq!(d.class, InstrClass::Auipc);
    assert_eq!(d.rd, Some(2));
}

#[test]
fn test_decode_store() {
    let d = decode(0xFE11AC23); // sw x1, -8(x3)
    assert_eq!(d.class, InstrClass::Store);
    assert_eq!((d.rs1, d.rs2, d.rd), (Some(3), Some(1), None));
    assert_eq!(d.imm, signed(-8));
    assert_eq!(d.funct3(), WIDTH_WORD);
    assert!(d.mem_op_en());
    assert!(d.mem_op_store());
}

#[test]
fn test_decode_load() {
    let d = decode(0xFF012103); // lw x2, -16(x2)
    assert_eq!(d.class, InstrClass::Load);
    assert_eq!((d.rs1, d.rs2, d.rd), (Some(2), None, Some(2)));
    assert_eq!(d.imm, signed(-16));
    assert_eq!(d.mem_op, Some(MemOp::Load));
    assert!(!d.mem_op_store());
}

#[test]
fn test_decode_branch() {
    let d = decode(0x00110463); // beq x2, x1, 8
    assert_eq!(d.class, InstrClass::Branch);
    assert_eq!((d.rs1, d.rs2, d.rd), (Some(2), Some(1), None));
    assert_eq!(d.imm, Some(8));
    assert_eq!(BranchCond::from_bits(d.funct), Some(BranchCond::Eq));

    let d = decode(0xFE314CE3); // blt x2, x3, -8
    assert_eq!(d.imm, signed(-8));
    assert_eq!(BranchCond::from_bits(d.funct), Some(BranchCond::Lt));
}

#[test]
fn test_decode_jumps() {
    let d = decode(0x008000EF); // jal x1, 8
    assert_eq!(d.class, InstrClass::Jump);
    assert_eq!((d.rs1, d.rs2, d.rd), (None, None, Some(1)));
    assert_eq!(d.imm, Some(8));

    let d = decode(0xFFDFF06F); // jal x0, -4
    assert_eq!(d.rd, Some(0));
    assert_eq!(d.imm, signed(-4));

    let d = decode(0x00008067); // jalr x0, 0(x1)
    assert_eq!(d.class, InstrClass::JumpReg);
    assert_eq!((d.rs1, d.rs2, d.rd), (Some(1), None, Some(0)));
    assert_eq!(d.imm, Some(0));
}

#[test]
fn test_decode_reg_reg() {
    let d = decode(0x002081B3); // add x3, x1, x2
    assert_eq!((d.rd, d.rs1, d.rs2), (Some(3), Some(1), Some(2)));
    assert_eq!(d.imm, None);
    assert_eq!(d.alu_op(), Some(AluOp::Add));

    let d = decode(0x402081B3); // sub x3, x1, x2
    assert_eq!(d.funct, 0b1000);
    assert_eq!(d.alu_op(), Some(AluOp::Sub));
}

#[test]
fn test_decode_shift_immediates() {
    let d = decode(asm::srai(1, 2, 3));
    assert_eq!(d.funct, 0b1101);
    assert_eq!(d.imm, Some(3));
    assert_eq!(d.rs2, None);

    let d = decode(asm::srli(1, 2, 31));
    assert_eq!(d.alu_op(), Some(AluOp::Srl));
    assert_eq!(d.imm, Some(31));

    let d = decode(0x00209113); // slli x2, x1, 2
    assert_eq!(d.alu_op(), Some(AluOp::Sll));
    assert_eq!(d.imm, Some(2));
}

#[test]
fn test_immediate_alu_ops_ignore_bit_30() {
    // andi 的立即数 bit 30 为 1，不能被当作 alt 位
    let d = decode(asm::andi(1, 2, 0x400));
    assert_eq!(d.funct, 0b111);
    assert_eq!(d.alu_op(), Some(AluOp::And));
    assert_eq!(d.imm, Some(0x400));

    let d = decode(asm::addi(1, 2, -1));
    assert_eq!(d.alu_op(), Some(AluOp::Add));
}

#[test]
fn test_decode_unrecognized() {
    for raw in [0x0000_0073u32, 0x0000_000F, 0x0000_0000, 0xFFFF_FFFF] {
        let d = decode(raw);
        assert!(!d.recognized, "0x{:08x}", raw);
        assert_eq!(d, DecodedInstr::unrecognized(raw));
        assert!(!d.rd_en() && !d.rs1_en() && !d.rs2_en() && !d.mem_op_en());
    }
}

const IMM12: [i32; 5] = [-2048, -1, 0, 1, 2047];
const BRANCH_OFFSETS: [i32; 5] = [-4096, -2, 0, 2, 4094];
const JAL_OFFSETS: [i32; 5] = [-1048576, -2, 0, 2, 1048574];
const UPPER: [u32; 4] = [0, 0x1000, 0x7FFF_F000, 0xFFFF_F000];

/// 每个寄存器编号都出现在每个字段上，其余两个字段错开取值
fn reg_triples() -> impl Iterator<Item = (u8, u8, u8)> {
    (0..32u8).map(|r| (r, (r + 7) % 32, (r + 13) % 32))
}

#[track_caller]
fn check_fields(
    raw: u32,
    class: InstrClass,
    regs: (Option<u8>, Option<u8>, Option<u8>),
    funct: u8,
    imm: Option<u32>,
) {
    let d = decode(raw);
    assert!(d.recognized, "0x{:08x}", raw);
    assert_eq!(d.class, class, "0x{:08x}", raw);
    assert_eq!((d.rs1, d.rs2, d.rd), regs, "0x{:08x}", raw);
    assert_eq!(d.funct, funct, "0x{:08x}", raw);
    assert_eq!(d.imm, imm, "0x{:08x}", raw);
}

#[test]
fn test_asm_round_trip_r_type() {
    type Enc = fn(u8, u8, u8) -> u32;
    let table: [(Enc, u8); 10] = [
        (asm::add, 0b0000),
        (asm::sub, 0b1000),
        (asm::sll, 0b0001),
        (asm::slt, 0b0010),
        (asm::sltu, 0b0011),
        (asm::xor, 0b0100),
        (asm::srl, 0b0101),
        (asm::sra, 0b1101),
        (asm::or, 0b0110),
        (asm::and, 0b0111),
    ];
    for (enc, funct) in table {
        for (rd, rs1, rs2) in reg_triples() {
            let regs = (Some(rs1), Some(rs2), Some(rd));
            check_fields(enc(rd, rs1, rs2), InstrClass::Alu, regs, funct, None);
        }
    }
}

#[test]
fn test_asm_round_trip_i_type() {
    type Enc = fn(u8, u8, i32) -> u32;
    let table: [(Enc, InstrClass, u8); 8] = [
        (asm::addi, InstrClass::Alu, 0b000),
        (asm::slti, InstrClass::Alu, 0b010),
        (asm::sltiu, InstrClass::Alu, 0b011),
        (asm::xori, InstrClass::Alu, 0b100),
        (asm::ori, InstrClass::Alu, 0b110),
        (asm::andi, InstrClass::Alu, 0b111),
        (asm::jalr, InstrClass::JumpReg, 0),
        (asm::lw, InstrClass::Load, WIDTH_WORD),
    ];
    for (enc, class, funct) in table {
        for (rd, rs1, _) in reg_triples() {
            for imm in IMM12 {
                let regs = (Some(rs1), None, Some(rd));
                check_fields(enc(rd, rs1, imm), class, regs, funct, signed(imm));
            }
        }
    }
}

#[test]
fn test_asm_round_trip_shift_immediates() {
    type Enc = fn(u8, u8, u8) -> u32;
    let table: [(Enc, u8); 3] = [(asm::slli, 0b0001), (asm::srli, 0b0101), (asm::srai, 0b1101)];
    for (enc, funct) in table {
        for (rd, rs1, _) in reg_triples() {
            for shamt in 0..32u8 {
                let regs = (Some(rs1), None, Some(rd));
                check_fields(enc(rd, rs1, shamt), InstrClass::Alu, regs, funct, Some(shamt as u32));
            }
        }
    }
}

#[test]
fn test_asm_round_trip_store_and_branch() {
    for (_, rs1, rs2) in reg_triples() {
        for imm in IMM12 {
            let regs = (Some(rs1), Some(rs2), None);
            check_fields(asm::sw(rs1, rs2, imm), InstrClass::Store, regs, WIDTH_WORD, signed(imm));
        }
    }

    type Enc = fn(u8, u8, i32) -> u32;
    let table: [(Enc, u8); 6] = [
        (asm::beq, 0b000),
        (asm::bne, 0b001),
        (asm::blt, 0b100),
        (asm::bge, 0b101),
        (asm::bltu, 0b110),
        (asm::bgeu, 0b111),
    ];
    for (enc, funct) in table {
        for (_, rs1, rs2) in reg_triples() {
            for offset in BRANCH_OFFSETS {
                let regs = (Some(rs1), Some(rs2), None);
                check_fields(enc(rs1, rs2, offset), InstrClass::Branch, regs, funct, signed(offset));
            }
        }
    }
}

#[test]
fn test_asm_round_trip_u_and_j_type() {
    for (rd, _, _) in reg_triples() {
        for upper in UPPER {
            let regs = (None, None, Some(rd));
            check_fields(asm::lui(rd, upper), InstrClass::Alu, regs, 0, Some(upper));
            check_fields(asm::auipc(rd, upper), InstrClass::Auipc, regs, 0, Some(upper));
        }
        for offset in JAL_OFFSETS {
            let regs = (None, None, Some(rd));
            check_fields(asm::jal(rd, offset), InstrClass::Jump, regs, 0, signed(offset));
        }
    }
}

#[test]
fn test_disassembly() {
    assert_eq!(decode(0xDEADC0B7).to_string(), "lui x1, 0xdeadc");
    assert_eq!(decode(0xEEF08093).to_string(), "addi x1, x1, -273");
    assert_eq!(decode(0xFE11AC23).to_string(), "sw x1, -8(x3)");
    assert_eq!(decode(0xFF012103).to_string(), "lw x2, -16(x2)");
    assert_eq!(decode(0x00110463).to_string(), "beq x2, x1, 8");
    assert_eq!(decode(asm::sltiu(1, 2, 3)).to_string(), "sltiu x1, x2, 3");
    assert_eq!(decode(0x0000_0073).to_string(), "unknown 0x00000073");
}
