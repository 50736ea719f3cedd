use crate::{catalogue, error::DecodeError};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub type Pc = u32;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CodeId(pub usize);

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    EnumCount,
    IntoStaticStr,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArchReg {
    Zero,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
}

impl ArchReg {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        ArchReg::iter().nth(i)
    }
}

impl fmt::Display for ArchReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(<&'static str>::from(*self))
    }
}

impl FromStr for ArchReg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "fp" {
            return Ok(ArchReg::S0);
        }

        if let Some(n) = s.strip_prefix('x') {
            let canonical =
                n.bytes().all(|b| b.is_ascii_digit()) && (n == "0" || !n.starts_with('0'));
            return match n.parse::<usize>().ok().and_then(ArchReg::from_index) {
                Some(reg) if canonical => Ok(reg),
                _ => Err(format!("unknown register: '{s}'")),
            };
        }

        ArchReg::iter()
            .find(|r| <&'static str>::from(*r) == s)
            .ok_or_else(|| format!("unknown register: '{s}'"))
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PhysReg(pub u16);

impl PhysReg {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    Display,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OpClass {
    Alu,
    Mul,
    Div,
    Load,
    Store,
    Branch,
}

impl OpClass {
    /// Latency used by the in-order reference model and the default unit set.
    pub fn nominal_latency(self) -> u64 {
        match self {
            OpClass::Alu | OpClass::Branch => 1,
            OpClass::Load | OpClass::Store => 2,
            OpClass::Mul => 3,
            OpClass::Div => 10,
        }
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Display,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mnemonic {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sra,
    Slt,
    Sltu,
    Addi,
    Andi,
    Ori,
    Xori,
    Slti,
    Sltiu,
    Slli,
    Srli,
    Srai,
    Lui,
    Auipc,
    Li,
    Mv,
    Not,
    Neg,
    Nop,
    Mul,
    Mulh,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    Lb,
    Lbu,
    Lh,
    Lhu,
    Lw,
    Sb,
    Sh,
    Sw,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Beqz,
    Bnez,
    J,
    Jal,
    Jalr,
    Jr,
    Ret,
}

impl Mnemonic {
    pub fn class(self) -> OpClass {
        catalogue::signature(self).class
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgRole {
    Rd,
    Rs1,
    Rs2,
    Imm,
    Mem,
    Target,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    Register,
    Immediate,
    Memory,
    Label,
}

impl ArgRole {
    pub fn kind(self) -> OperandKind {
        match self {
            ArgRole::Rd | ArgRole::Rs1 | ArgRole::Rs2 => OperandKind::Register,
            ArgRole::Imm => OperandKind::Immediate,
            ArgRole::Mem => OperandKind::Memory,
            ArgRole::Target => OperandKind::Label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Label(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Operand {
    Register { reg: ArchReg },
    Immediate { value: i32 },
    Memory { offset: i32, base: ArchReg },
    Label { name: Label },
    Target { name: Label, pc: Pc },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputCodeArgument {
    pub role: ArgRole,
    pub operand: Operand,
}

/// A statically decoded instruction of the program image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputCodeModel {
    pub id: CodeId,
    pub mnemonic: Mnemonic,
    pub args: Vec<InputCodeArgument>,
    pub source_line: usize,
}

impl InputCodeModel {
    pub fn decode(raw: &str, id: CodeId, source_line: usize) -> Result<Self, DecodeError> {
        let raw = raw.trim();
        let (op, rest) = raw
            .split_once(char::is_whitespace)
            .unwrap_or((raw, ""));

        let mnemonic = op
            .to_lowercase()
            .parse::<Mnemonic>()
            .map_err(|_| DecodeError::UnsupportedMnemonic {
                line: source_line,
                mnemonic: op.to_owned(),
            })?;

        let texts = if rest.trim().is_empty() {
            vec![]
        } else {
            rest.split(',').map(str::trim).collect::<Vec<_>>()
        };

        let malformed = |operand: &str, reason: String| DecodeError::MalformedOperand {
            line: source_line,
            operand: operand.to_owned(),
            reason,
        };

        let roles = catalogue::signature(mnemonic).roles;
        if texts.len() != roles.len() {
            return Err(malformed(
                rest.trim(),
                format!(
                    "'{mnemonic}' expects {} operands, found {}",
                    roles.len(),
                    texts.len()
                ),
            ));
        }

        let mut args = Vec::with_capacity(roles.len() + 1);
        for (&role, &text) in roles.iter().zip(&texts) {
            let operand = match role {
                ArgRole::Rd | ArgRole::Rs1 | ArgRole::Rs2 => Operand::Register {
                    reg: text.parse().map_err(|e| malformed(text, e))?,
                },
                ArgRole::Imm => match parse_imm(text) {
                    Ok(value) => Operand::Immediate { value },
                    // A data symbol, resolved to its address once the program is laid out.
                    Err(e) => Operand::Label {
                        name: parse_symbol(text).ok_or_else(|| malformed(text, e))?,
                    },
                },
                ArgRole::Mem => {
                    let (offset, base) = parse_mem(text).map_err(|e| malformed(text, e))?;
                    Operand::Memory { offset, base }
                }
                ArgRole::Target => Operand::Label {
                    name: text.parse().map_err(|e| malformed(text, e))?,
                },
            };
            args.push(InputCodeArgument { role, operand });
        }

        if mnemonic == Mnemonic::Ret {
            args.push(InputCodeArgument {
                role: ArgRole::Rs1,
                operand: Operand::Register { reg: ArchReg::Ra },
            });
        }

        Ok(Self {
            id,
            mnemonic,
            args,
            source_line,
        })
    }

    pub fn class(&self) -> OpClass {
        self.mnemonic.class()
    }

    pub fn dest(&self) -> Option<ArchReg> {
        self.args.iter().find_map(|arg| match (arg.role, &arg.operand) {
            (ArgRole::Rd, Operand::Register { reg }) => Some(*reg),
            _ => None,
        })
    }

    /// Source registers in operand order (the memory base counts as a source).
    pub fn sources(&self) -> impl Iterator<Item = (ArgRole, ArchReg)> + '_ {
        self.args.iter().filter_map(|arg| match (arg.role, &arg.operand) {
            (ArgRole::Rs1 | ArgRole::Rs2, Operand::Register { reg }) => Some((arg.role, *reg)),
            (ArgRole::Mem, Operand::Memory { base, .. }) => Some((ArgRole::Mem, *base)),
            _ => None,
        })
    }

    pub fn imm(&self) -> i32 {
        self.args
            .iter()
            .find_map(|arg| match &arg.operand {
                Operand::Immediate { value } => Some(*value),
                Operand::Memory { offset, .. } => Some(*offset),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn target(&self) -> Option<Pc> {
        self.args.iter().find_map(|arg| match &arg.operand {
            Operand::Target { pc, .. } => Some(*pc),
            _ => None,
        })
    }

    pub fn is_control(&self) -> bool {
        self.class() == OpClass::Branch
    }

    pub fn is_conditional(&self) -> bool {
        matches!(
            self.mnemonic,
            Mnemonic::Beq
                | Mnemonic::Bne
                | Mnemonic::Blt
                | Mnemonic::Bge
                | Mnemonic::Bltu
                | Mnemonic::Bgeu
                | Mnemonic::Beqz
                | Mnemonic::Bnez
        )
    }

    pub fn is_load(&self) -> bool {
        self.class() == OpClass::Load
    }

    pub fn is_store(&self) -> bool {
        self.class() == OpClass::Store
    }

    /// Replace every label with the address `lookup` gives for it. Branch
    /// targets become [`Operand::Target`]; symbols in immediate position
    /// become plain immediates. Fails with the first label `lookup` rejects.
    pub fn resolve_labels<F>(mut self, mut lookup: F) -> Result<Self, Label>
    where
        F: FnMut(ArgRole, &Label) -> Option<u32>,
    {
        for arg in &mut self.args {
            if let Operand::Label { name } = &arg.operand {
                let addr = lookup(arg.role, name).ok_or_else(|| name.clone())?;
                arg.operand = match arg.role {
                    ArgRole::Imm => Operand::Immediate { value: addr as i32 },
                    _ => Operand::Target {
                        name: name.clone(),
                        pc: addr,
                    },
                };
            }
        }
        Ok(self)
    }
}

impl fmt::Display for InputCodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        let shown = catalogue::signature(self.mnemonic).roles.len();
        for (i, arg) in self.args.iter().take(shown).enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match &arg.operand {
                Operand::Register { reg } => write!(f, "{sep}{reg}")?,
                Operand::Immediate { value } => write!(f, "{sep}{value}")?,
                Operand::Memory { offset, base } => write!(f, "{sep}{offset}({base})")?,
                Operand::Label { name } | Operand::Target { name, .. } => {
                    write!(f, "{sep}{}", name.0)?
                }
            }
        }
        Ok(())
    }
}

fn parse_imm(s: &str) -> Result<i32, String> {
    let invalid = || format!("invalid immediate: '{s}'");
    let hex = |digits: &str| match digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        true => i64::from_str_radix(digits, 16).map_err(|_| invalid()),
        false => Err(invalid()),
    };

    let val = if let Some(digits) = s.strip_prefix("0x") {
        hex(digits)?
    } else if let Some(digits) = s.strip_prefix("-0x") {
        -hex(digits)?
    } else {
        i64::from_str(s).map_err(|_| invalid())?
    };

    if let Ok(v) = i32::try_from(val) {
        Ok(v)
    } else if let Ok(u) = u32::try_from(val) {
        Ok(u as i32)
    } else {
        Err(format!("immediate out of range: '{s}'"))
    }
}

fn parse_symbol(s: &str) -> Option<Label> {
    s.starts_with(|c: char| c.is_alphabetic() || "_.".contains(c))
        .then(|| s.parse().ok())
        .flatten()
}

fn parse_mem(s: &str) -> Result<(i32, ArchReg), String> {
    let (offset, rest) = s
        .split_once('(')
        .ok_or_else(|| format!("invalid memory reference (no base register): '{s}'"))?;
    let base = rest
        .strip_suffix(')')
        .ok_or_else(|| format!("invalid memory reference (unclosed): '{s}'"))?
        .trim();

    let offset = match offset.trim() {
        "" => 0,
        off => parse_imm(off)?,
    };

    Ok((offset, base.parse()?))
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || "_.".contains(c)) {
            true => Ok(Label(s.to_owned())),
            false => Err(format!("invalid label name: '{s}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Result<InputCodeModel, DecodeError> {
        InputCodeModel::decode(s, CodeId(0), 1)
    }

    #[test]
    fn test_reg() {
        assert_eq!(ArchReg::from_str("zero"), Ok(ArchReg::Zero));
        assert_eq!(ArchReg::from_str("sp"), Ok(ArchReg::Sp));
        assert_eq!(ArchReg::from_str("ra"), Ok(ArchReg::Ra));
        assert_eq!(ArchReg::from_str("fp"), Ok(ArchReg::S0));
        assert_eq!(ArchReg::from_str("x0"), Ok(ArchReg::Zero));
        assert_eq!(ArchReg::from_str("x10"), Ok(ArchReg::A0));
        assert_eq!(ArchReg::from_str("x31"), Ok(ArchReg::T6));
        assert_eq!(ArchReg::from_str("s11"), Ok(ArchReg::S11));
        assert_eq!(ArchReg::from_str("t3"), Ok(ArchReg::T3));
        assert!(ArchReg::from_str("0").is_err());
        assert!(ArchReg::from_str("x-1").is_err());
        assert!(ArchReg::from_str("x+1").is_err());
        assert!(ArchReg::from_str("x32").is_err());
        assert!(ArchReg::from_str("x01").is_err());
        assert!(ArchReg::from_str("x00").is_err());
        assert!(ArchReg::from_str("a8").is_err());
        assert_eq!(ArchReg::COUNT, 32);
        assert_eq!(ArchReg::T6.index(), 31);
    }

    #[test]
    fn test_imm() {
        assert_eq!(parse_imm("0"), Ok(0));
        assert_eq!(parse_imm("-1"), Ok(-1));
        assert_eq!(parse_imm("0x10"), Ok(16));
        assert_eq!(parse_imm("-0x10"), Ok(-16));
        assert_eq!(parse_imm("0xffffffff"), Ok(-1));
        assert!(parse_imm("0x100000000").is_err());
        assert!(parse_imm("ten").is_err());
        assert!(parse_imm("0x-5").is_err());
        assert!(parse_imm("-0x+5").is_err());
        assert!(parse_imm("0x").is_err());
    }

    #[test]
    fn test_memref() {
        assert_eq!(parse_mem("(a1)"), Ok((0, ArchReg::A1)));
        assert_eq!(parse_mem("0(a1)"), Ok((0, ArchReg::A1)));
        assert_eq!(parse_mem("8(sp)"), Ok((8, ArchReg::Sp)));
        assert_eq!(parse_mem("-4(x8)"), Ok((-4, ArchReg::S0)));
        assert_eq!(parse_mem("0x10( t0 )"), Ok((16, ArchReg::T0)));

        assert!(parse_mem("8").is_err());
        assert!(parse_mem("8(sp").is_err());
        assert!(parse_mem("8(q9)").is_err());
        assert!(parse_mem("x(sp)").is_err());
    }

    #[test]
    fn test_label() {
        assert_eq!(Label::from_str("foo"), Ok(Label("foo".to_string())));
        assert_eq!(Label::from_str(".foo_bar5"), Ok(Label(".foo_bar5".to_string())));
        assert_ne!(Label::from_str("FOO_bar"), Label::from_str("foo_BAR"));

        assert!(Label::from_str("").is_err());
        assert!(Label::from_str("foo bar").is_err());
        assert!(Label::from_str("foo-bar").is_err());
        assert!(Label::from_str("foobar:").is_err());
    }

    #[test]
    fn test_decode() {
        let inst = decode("addi a0, a1, -3").unwrap();
        assert_eq!(inst.mnemonic, Mnemonic::Addi);
        assert_eq!(inst.dest(), Some(ArchReg::A0));
        assert_eq!(
            inst.sources().collect::<Vec<_>>(),
            vec![(ArgRole::Rs1, ArchReg::A1)]
        );
        assert_eq!(inst.imm(), -3);
        assert_eq!(inst.class(), OpClass::Alu);

        let inst = decode("SW t0, 8(sp)").unwrap();
        assert_eq!(inst.dest(), None);
        assert_eq!(
            inst.sources().collect::<Vec<_>>(),
            vec![(ArgRole::Rs2, ArchReg::T0), (ArgRole::Mem, ArchReg::Sp)]
        );
        assert_eq!(inst.imm(), 8);
        assert!(inst.is_store());

        let inst = decode("ret").unwrap();
        assert_eq!(
            inst.sources().collect::<Vec<_>>(),
            vec![(ArgRole::Rs1, ArchReg::Ra)]
        );
        assert_eq!(inst.to_string(), "ret");

        let inst = decode("bnez t1, loop").unwrap();
        assert!(inst.is_conditional());
        assert_eq!(
            inst.args[1].operand,
            Operand::Label {
                name: Label("loop".to_owned())
            }
        );
        assert_eq!(inst.to_string(), "bnez t1, loop");
    }

    #[test]
    fn test_resolve_symbols() {
        let inst = decode("li a0, table").unwrap();
        let resolved = inst
            .clone()
            .resolve_labels(|role, _| (role == ArgRole::Imm).then_some(0x200))
            .unwrap();
        assert_eq!(resolved.imm(), 0x200);
        assert_eq!(
            inst.resolve_labels(|_, _| None).unwrap_err(),
            Label("table".to_owned())
        );

        let inst = decode("j end").unwrap().resolve_labels(|_, _| Some(12)).unwrap();
        assert_eq!(inst.target(), Some(12));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("frobnicate a0"),
            Err(DecodeError::UnsupportedMnemonic { mnemonic, .. }) if mnemonic == "frobnicate"
        ));
        assert!(matches!(
            decode("add a0, a1"),
            Err(DecodeError::MalformedOperand { .. })
        ));
        assert!(matches!(
            decode("addi a0, a1, 12q"),
            Err(DecodeError::MalformedOperand { operand, .. }) if operand == "12q"
        ));
        assert!(matches!(
            decode("li a0, 0x-5"),
            Err(DecodeError::MalformedOperand { operand, .. }) if operand == "0x-5"
        ));
        assert!(matches!(
            decode("mv x01, a0"),
            Err(DecodeError::MalformedOperand { operand, .. }) if operand == "x01"
        ));
        assert!(matches!(
            decode("lw a0, a1"),
            Err(DecodeError::MalformedOperand { .. })
        ));
        assert!(matches!(
            decode("nop a0"),
            Err(DecodeError::MalformedOperand { .. })
        ));
    }
}
