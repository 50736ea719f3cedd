//! Static table of supported instructions: operand layout, operation class
//! and a human readable description for every mnemonic.

use crate::inst::{ArgRole, Mnemonic, OpClass, OperandKind};
use serde::Serialize;
use strum::IntoEnumIterator;

#[derive(Debug, Copy, Clone)]
pub struct Signature {
    pub roles: &'static [ArgRole],
    pub class: OpClass,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionDescription {
    pub mnemonic: Mnemonic,
    pub operands: Vec<OperandDescription>,
    pub class: OpClass,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperandDescription {
    pub role: ArgRole,
    pub kind: OperandKind,
}

use ArgRole::{Imm, Mem, Rd, Rs1, Rs2, Target};

const R_TYPE: &[ArgRole] = &[Rd, Rs1, Rs2];
const I_TYPE: &[ArgRole] = &[Rd, Rs1, Imm];
const U_TYPE: &[ArgRole] = &[Rd, Imm];
const UNARY: &[ArgRole] = &[Rd, Rs1];
const LOAD: &[ArgRole] = &[Rd, Mem];
const STORE: &[ArgRole] = &[Rs2, Mem];
const BRANCH: &[ArgRole] = &[Rs1, Rs2, Target];
const BRANCH_ZERO: &[ArgRole] = &[Rs1, Target];

pub fn signature(m: Mnemonic) -> Signature {
    let (roles, class, description) = match m {
        Mnemonic::Add => (R_TYPE, OpClass::Alu, "rd = rs1 + rs2"),
        Mnemonic::Sub => (R_TYPE, OpClass::Alu, "rd = rs1 - rs2"),
        Mnemonic::And => (R_TYPE, OpClass::Alu, "rd = rs1 & rs2"),
        Mnemonic::Or => (R_TYPE, OpClass::Alu, "rd = rs1 | rs2"),
        Mnemonic::Xor => (R_TYPE, OpClass::Alu, "rd = rs1 ^ rs2"),
        Mnemonic::Sll => (R_TYPE, OpClass::Alu, "rd = rs1 << rs2[4:0]"),
        Mnemonic::Srl => (R_TYPE, OpClass::Alu, "rd = rs1 >> rs2[4:0] (logical)"),
        Mnemonic::Sra => (R_TYPE, OpClass::Alu, "rd = rs1 >> rs2[4:0] (arithmetic)"),
        Mnemonic::Slt => (R_TYPE, OpClass::Alu, "rd = rs1 < rs2 (signed)"),
        Mnemonic::Sltu => (R_TYPE, OpClass::Alu, "rd = rs1 < rs2 (unsigned)"),
        Mnemonic::Addi => (I_TYPE, OpClass::Alu, "rd = rs1 + imm"),
        Mnemonic::Andi => (I_TYPE, OpClass::Alu, "rd = rs1 & imm"),
        Mnemonic::Ori => (I_TYPE, OpClass::Alu, "rd = rs1 | imm"),
        Mnemonic::Xori => (I_TYPE, OpClass::Alu, "rd = rs1 ^ imm"),
        Mnemonic::Slti => (I_TYPE, OpClass::Alu, "rd = rs1 < imm (signed)"),
        Mnemonic::Sltiu => (I_TYPE, OpClass::Alu, "rd = rs1 < imm (unsigned)"),
        Mnemonic::Slli => (I_TYPE, OpClass::Alu, "rd = rs1 << imm[4:0]"),
        Mnemonic::Srli => (I_TYPE, OpClass::Alu, "rd = rs1 >> imm[4:0] (logical)"),
        Mnemonic::Srai => (I_TYPE, OpClass::Alu, "rd = rs1 >> imm[4:0] (arithmetic)"),
        Mnemonic::Lui => (U_TYPE, OpClass::Alu, "rd = imm << 12"),
        Mnemonic::Auipc => (U_TYPE, OpClass::Alu, "rd = pc + (imm << 12)"),
        Mnemonic::Li => (U_TYPE, OpClass::Alu, "rd = imm"),
        Mnemonic::Mv => (UNARY, OpClass::Alu, "rd = rs1"),
        Mnemonic::Not => (UNARY, OpClass::Alu, "rd = !rs1"),
        Mnemonic::Neg => (UNARY, OpClass::Alu, "rd = -rs1"),
        Mnemonic::Nop => (&[][..], OpClass::Alu, "no operation"),
        Mnemonic::Mul => (R_TYPE, OpClass::Mul, "rd = (rs1 * rs2)[31:0]"),
        Mnemonic::Mulh => (R_TYPE, OpClass::Mul, "rd = (rs1 * rs2)[63:32] (signed)"),
        Mnemonic::Mulhu => (R_TYPE, OpClass::Mul, "rd = (rs1 * rs2)[63:32] (unsigned)"),
        Mnemonic::Div => (R_TYPE, OpClass::Div, "rd = rs1 / rs2 (signed)"),
        Mnemonic::Divu => (R_TYPE, OpClass::Div, "rd = rs1 / rs2 (unsigned)"),
        Mnemonic::Rem => (R_TYPE, OpClass::Div, "rd = rs1 % rs2 (signed)"),
        Mnemonic::Remu => (R_TYPE, OpClass::Div, "rd = rs1 % rs2 (unsigned)"),
        Mnemonic::Lb => (LOAD, OpClass::Load, "rd = sign-extended byte at mem"),
        Mnemonic::Lbu => (LOAD, OpClass::Load, "rd = zero-extended byte at mem"),
        Mnemonic::Lh => (LOAD, OpClass::Load, "rd = sign-extended half word at mem"),
        Mnemonic::Lhu => (LOAD, OpClass::Load, "rd = zero-extended half word at mem"),
        Mnemonic::Lw => (LOAD, OpClass::Load, "rd = word at mem"),
        Mnemonic::Sb => (STORE, OpClass::Store, "byte at mem = rs2[7:0]"),
        Mnemonic::Sh => (STORE, OpClass::Store, "half word at mem = rs2[15:0]"),
        Mnemonic::Sw => (STORE, OpClass::Store, "word at mem = rs2"),
        Mnemonic::Beq => (BRANCH, OpClass::Branch, "jump to target if rs1 == rs2"),
        Mnemonic::Bne => (BRANCH, OpClass::Branch, "jump to target if rs1 != rs2"),
        Mnemonic::Blt => (BRANCH, OpClass::Branch, "jump to target if rs1 < rs2 (signed)"),
        Mnemonic::Bge => (BRANCH, OpClass::Branch, "jump to target if rs1 >= rs2 (signed)"),
        Mnemonic::Bltu => (BRANCH, OpClass::Branch, "jump to target if rs1 < rs2 (unsigned)"),
        Mnemonic::Bgeu => (BRANCH, OpClass::Branch, "jump to target if rs1 >= rs2 (unsigned)"),
        Mnemonic::Beqz => (BRANCH_ZERO, OpClass::Branch, "jump to target if rs1 == 0"),
        Mnemonic::Bnez => (BRANCH_ZERO, OpClass::Branch, "jump to target if rs1 != 0"),
        Mnemonic::J => (&[Target][..], OpClass::Branch, "jump to target"),
        Mnemonic::Jal => (&[Rd, Target][..], OpClass::Branch, "rd = pc + 4; jump to target"),
        Mnemonic::Jalr => (I_TYPE, OpClass::Branch, "rd = pc + 4; jump to rs1 + imm"),
        Mnemonic::Jr => (&[Rs1][..], OpClass::Branch, "jump to rs1"),
        Mnemonic::Ret => (&[][..], OpClass::Branch, "jump to ra"),
    };

    Signature {
        roles,
        class,
        description,
    }
}

pub fn describe(m: Mnemonic) -> InstructionDescription {
    let sig = signature(m);
    InstructionDescription {
        mnemonic: m,
        operands: sig
            .roles
            .iter()
            .map(|&role| OperandDescription {
                role,
                kind: role.kind(),
            })
            .collect(),
        class: sig.class,
        description: sig.description,
    }
}

pub fn catalogue() -> Vec<InstructionDescription> {
    Mnemonic::iter().map(describe).collect()
}
