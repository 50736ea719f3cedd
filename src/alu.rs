//! Instruction semantics shared by the in-order model and the pipeline's
//! functional units.

use crate::{
    inst::{Mnemonic, Pc},
    util::Addr,
};

fn signed(x: u32) -> i32 {
    i32::from_le_bytes(x.to_le_bytes())
}

fn unsigned(x: i32) -> u32 {
    u32::from_le_bytes(x.to_le_bytes())
}

/// Value written to the destination register. `a` and `b` are the values of
/// `rs1` and `rs2` (zero when absent).
pub fn alu(m: Mnemonic, a: u32, b: u32, imm: i32, pc: Pc) -> u32 {
    let uimm = unsigned(imm);

    match m {
        Mnemonic::Add => a.wrapping_add(b),
        Mnemonic::Sub => a.wrapping_sub(b),
        Mnemonic::And => a & b,
        Mnemonic::Or => a | b,
        Mnemonic::Xor => a ^ b,
        Mnemonic::Sll => a.wrapping_shl(b & 0x1f),
        Mnemonic::Srl => a.wrapping_shr(b & 0x1f),
        Mnemonic::Sra => unsigned(signed(a).wrapping_shr(b & 0x1f)),
        Mnemonic::Slt => (signed(a) < signed(b)).into(),
        Mnemonic::Sltu => (a < b).into(),
        Mnemonic::Addi => a.wrapping_add(uimm),
        Mnemonic::Andi => a & uimm,
        Mnemonic::Ori => a | uimm,
        Mnemonic::Xori => a ^ uimm,
        Mnemonic::Slti => (signed(a) < imm).into(),
        Mnemonic::Sltiu => (a < uimm).into(),
        Mnemonic::Slli => a.wrapping_shl(uimm & 0x1f),
        Mnemonic::Srli => a.wrapping_shr(uimm & 0x1f),
        Mnemonic::Srai => unsigned(signed(a).wrapping_shr(uimm & 0x1f)),
        Mnemonic::Lui => uimm.wrapping_shl(12),
        Mnemonic::Auipc => pc.wrapping_add(uimm.wrapping_shl(12)),
        Mnemonic::Li => uimm,
        Mnemonic::Mv => a,
        Mnemonic::Not => !a,
        Mnemonic::Neg => a.wrapping_neg(),
        Mnemonic::Nop => 0,
        Mnemonic::Mul => a.wrapping_mul(b),
        Mnemonic::Mulh => ((i64::from(signed(a)) * i64::from(signed(b))) >> 32) as u32,
        Mnemonic::Mulhu => ((u64::from(a) * u64::from(b)) >> 32) as u32,
        Mnemonic::Div => match signed(b) {
            0 => u32::MAX,
            d => unsigned(signed(a).wrapping_div(d)),
        },
        Mnemonic::Divu => a.checked_div(b).unwrap_or(u32::MAX),
        Mnemonic::Rem => match signed(b) {
            0 => a,
            d => unsigned(signed(a).wrapping_rem(d)),
        },
        Mnemonic::Remu => a.checked_rem(b).unwrap_or(a),
        Mnemonic::Jal | Mnemonic::Jalr | Mnemonic::J | Mnemonic::Jr | Mnemonic::Ret => {
            pc.wrapping_add(4)
        }
        // Loads, stores and conditional branches produce no ALU result.
        _ => 0,
    }
}

pub fn branch_taken(m: Mnemonic, a: u32, b: u32) -> bool {
    match m {
        Mnemonic::Beq => a == b,
        Mnemonic::Bne => a != b,
        Mnemonic::Blt => signed(a) < signed(b),
        Mnemonic::Bge => signed(a) >= signed(b),
        Mnemonic::Bltu => a < b,
        Mnemonic::Bgeu => a >= b,
        Mnemonic::Beqz => a == 0,
        Mnemonic::Bnez => a != 0,
        Mnemonic::J | Mnemonic::Jal | Mnemonic::Jalr | Mnemonic::Jr | Mnemonic::Ret => true,
        _ => false,
    }
}

/// Address of the next instruction once a control transfer is resolved.
pub fn next_pc(m: Mnemonic, a: u32, b: u32, imm: i32, pc: Pc, target: Option<Pc>) -> Pc {
    match m {
        Mnemonic::Jalr | Mnemonic::Jr | Mnemonic::Ret => a.wrapping_add(unsigned(imm)) & !1,
        _ => match (branch_taken(m, a, b), target) {
            (true, Some(target)) => target,
            _ => pc.wrapping_add(4),
        },
    }
}

/// Width of a memory access in bytes.
pub fn access_width(m: Mnemonic) -> u32 {
    match m {
        Mnemonic::Lb | Mnemonic::Lbu | Mnemonic::Sb => 1,
        Mnemonic::Lh | Mnemonic::Lhu | Mnemonic::Sh => 2,
        _ => 4,
    }
}

pub fn effective_address(base: u32, imm: i32) -> Addr {
    Addr(base).offset(imm)
}

/// Sign or zero extend a raw little-endian load value.
pub fn extend_load(m: Mnemonic, raw: u32) -> u32 {
    match m {
        Mnemonic::Lb => unsigned(i32::from(raw as u8 as i8)),
        Mnemonic::Lbu => raw & 0xff,
        Mnemonic::Lh => unsigned(i32::from(raw as u16 as i16)),
        Mnemonic::Lhu => raw & 0xffff,
        _ => raw,
    }
}
