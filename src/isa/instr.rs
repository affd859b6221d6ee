//! 已解码指令的表示，以及 ALU / 分支单元的操作码

use std::fmt;

/// 指令类别
///
/// 控制器只按类别决定操作数选择、下一条 PC 与写回数据，
/// 具体运算由 `funct` 交给 ALU / 分支单元。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrClass {
    /// 寄存器-寄存器、寄存器-立即数运算，以及 LUI
    Alu,
    /// JAL
    Jump,
    /// JALR
    JumpReg,
    /// 条件分支
    Branch,
    /// 存储
    Store,
    /// 加载
    Load,
    /// AUIPC
    Auipc,
}

impl fmt::Display for InstrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrClass::Alu => "ALU",
            InstrClass::Jump => "J",
            InstrClass::JumpReg => "JR",
            InstrClass::Branch => "BR",
            InstrClass::Store => "ST",
            InstrClass::Load => "LD",
            InstrClass::Auipc => "AUIPC",
        };
        f.write_str(name)
    }
}

/// 访存方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Load,
    Store,
}

/// ALU 操作码：`{alt, funct3}` 共 4 位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0b0000,
    Sub = 0b1000,
    Sll = 0b0001,
    Slt = 0b0010,
    Sltu = 0b0011,
    Xor = 0b0100,
    Srl = 0b0101,
    Sra = 0b1101,
    Or = 0b0110,
    And = 0b0111,
}

impl AluOp {
    /// 从 4 位编码还原操作；未定义的编码返回 `None`
    pub fn from_bits(bits: u8) -> Option<Self> {
        let op = match bits & 0xF {
            0b0000 => AluOp::Add,
            0b1000 => AluOp::Sub,
            0b0001 => AluOp::Sll,
            0b0010 => AluOp::Slt,
            0b0011 => AluOp::Sltu,
            0b0100 => AluOp::Xor,
            0b0101 => AluOp::Srl,
            0b1101 => AluOp::Sra,
            0b0110 => AluOp::Or,
            0b0111 => AluOp::And,
            _ => return None,
        };
        Some(op)
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Sll => "sll",
            AluOp::Slt => "slt",
            AluOp::Sltu => "sltu",
            AluOp::Xor => "xor",
            AluOp::Srl => "srl",
            AluOp::Sra => "sra",
            AluOp::Or => "or",
            AluOp::And => "and",
        }
    }
}

/// 分支条件：即 B-type 指令的 funct3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BranchCond {
    Eq = 0b000,
    Ne = 0b001,
    Lt = 0b100,
    Ge = 0b101,
    Ltu = 0b110,
    Geu = 0b111,
}

impl BranchCond {
    pub fn from_bits(bits: u8) -> Option<Self> {
        let cond = match bits & 0x7 {
            0b000 => BranchCond::Eq,
            0b001 => BranchCond::Ne,
            0b100 => BranchCond::Lt,
            0b101 => BranchCond::Ge,
            0b110 => BranchCond::Ltu,
            0b111 => BranchCond::Geu,
            _ => return None,
        };
        Some(cond)
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchCond::Eq => "beq",
            BranchCond::Ne => "bne",
            BranchCond::Lt => "blt",
            BranchCond::Ge => "bge",
            BranchCond::Ltu => "bltu",
            BranchCond::Geu => "bgeu",
        }
    }
}

/// 解码结果
///
/// 每个字段是否有效用 `Option` 表示，而不是用 0 代表“无”：
/// 例如 BRANCH 没有 rd，LUI/JAL 没有 rs1/rs2，R-type 没有立即数。
/// 每次取指后重新计算，只在本条指令的执行阶段内使用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstr {
    /// 原始指令字
    pub raw: u32,
    /// 指令类别
    pub class: InstrClass,
    pub rs1: Option<u8>,
    pub rs2: Option<u8>,
    pub rd: Option<u8>,
    /// ALU 类为 `{alt, funct3}`，其余类别为 funct3（分支条件 / 访存宽度）
    pub funct: u8,
    /// 已完成符号扩展的立即数
    pub imm: Option<u32>,
    pub mem_op: Option<MemOp>,
    /// opcode 是否属于支持的子集
    pub recognized: bool,
}

impl DecodedInstr {
    /// 未识别 opcode 的默认解码：ALU 类、无操作数、无写回
    pub fn unrecognized(raw: u32) -> Self {
        DecodedInstr {
            raw,
            class: InstrClass::Alu,
            rs1: None,
            rs2: None,
            rd: None,
            funct: 0,
            imm: None,
            mem_op: None,
            recognized: false,
        }
    }

    pub fn rs1_en(&self) -> bool {
        self.rs1.is_some()
    }

    pub fn rs2_en(&self) -> bool {
        self.rs2.is_some()
    }

    pub fn rd_en(&self) -> bool {
        self.rd.is_some()
    }

    pub fn mem_op_en(&self) -> bool {
        self.mem_op.is_some()
    }

    pub fn mem_op_store(&self) -> bool {
        self.mem_op == Some(MemOp::Store)
    }

    /// funct3 部分
    pub fn funct3(&self) -> u8 {
        self.funct & 0x7
    }

    /// ALU 类的运算；非 ALU 类地址/目标计算统一使用加法
    pub fn alu_op(&self) -> Option<AluOp> {
        match self.class {
            InstrClass::Alu => AluOp::from_bits(self.funct),
            _ => Some(AluOp::Add),
        }
    }

    /// 立即数，缺省为 0
    pub fn imm_or_zero(&self) -> u32 {
        self.imm.unwrap_or(0)
    }
}

fn reg(r: Option<u8>) -> String {
    r.map(|r| format!("x{}", r)).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for DecodedInstr {
    /// 简易反汇编，仅用于追踪输出
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.recognized {
            return write!(f, "unknown 0x{:08x}", self.raw);
        }
        let imm = self.imm_or_zero() as i32;
        match self.class {
            InstrClass::Alu => {
                let name = self.alu_op().map(AluOp::mnemonic).unwrap_or("alu?");
                match (self.rs1, self.rs2) {
                    (Some(_), Some(_)) => write!(
                        f,
                        "{} {}, {}, {}",
                        name,
                        reg(self.rd),
                        reg(self.rs1),
                        reg(self.rs2)
                    ),
                    (Some(_), None) if name == "sltu" => write!(
                        f,
                        "sltiu {}, {}, {}",
                        reg(self.rd),
                        reg(self.rs1),
                        imm
                    ),
                    (Some(_), None) => write!(
                        f,
                        "{}i {}, {}, {}",
                        name,
                        reg(self.rd),
                        reg(self.rs1),
                        imm
                    ),
                    _ => write!(f, "lui {}, 0x{:05x}", reg(self.rd), self.imm_or_zero() >> 12),
                }
            }
            InstrClass::Auipc => {
                write!(f, "auipc {}, 0x{:05x}", reg(self.rd), self.imm_or_zero() >> 12)
            }
            InstrClass::Jump => write!(f, "jal {}, {}", reg(self.rd), imm),
            InstrClass::JumpReg => {
                write!(f, "jalr {}, {}({})", reg(self.rd), imm, reg(self.rs1))
            }
            InstrClass::Branch => {
                let name = BranchCond::from_bits(self.funct3())
                    .map(BranchCond::mnemonic)
                    .unwrap_or("b?");
                write!(f, "{} {}, {}, {}", name, reg(self.rs1), reg(self.rs2), imm)
            }
            InstrClass::Load => write!(f, "lw {}, {}({})", reg(self.rd), imm, reg(self.rs1)),
            InstrClass::Store => write!(f, "sw {}, {}({})", reg(self.rs2), imm, reg(self.rs1)),
        }
    }
}
