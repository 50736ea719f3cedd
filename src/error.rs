use crate::{
    inst::{Mnemonic, OpClass, Pc, PhysReg},
    util::{Addr, Tag},
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for callers of the simulator.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("simulation halted: {0}")]
    Halted(#[from] HaltReason),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("step limit of {0} instructions reached")]
    StepLimit(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DecodeError {
    #[error("line {line}: unsupported mnemonic '{mnemonic}'")]
    UnsupportedMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: malformed operand '{operand}': {reason}")]
    MalformedOperand {
        line: usize,
        operand: String,
        reason: String,
    },

    #[error("line {line}: undefined label '{label}'")]
    UndefinedLabel { line: usize, label: String },

    #[error("line {line}: duplicate label '{label}'")]
    DuplicateLabel { line: usize, label: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("{0}")]
    Invalid(String),

    #[error("no functional unit can execute class '{class}' (needed by '{mnemonic}')")]
    NoUnitForClass { class: OpClass, mnemonic: Mnemonic },
}

/// Backpressure from a full structure. Absorbed by the pipeline as a stall.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStall {
    #[error("reorder buffer full")]
    RobFull,

    #[error("physical register file exhausted")]
    PhysicalRegisterExhausted,

    #[error("issue window full")]
    IssueWindowFull,

    #[error("load buffer full")]
    LoadBufferFull,

    #[error("store buffer full")]
    StoreBufferFull,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InvariantViolation {
    #[error("out of order commit: {found} after {last}")]
    OutOfOrderCommit { last: Tag, found: Tag },

    #[error("commit of {tag} which is not the completed head of the reorder buffer")]
    CommitNotReady { tag: Tag },

    #[error("no reorder buffer entry for {tag}")]
    UnknownRobEntry { tag: Tag },

    #[error("read of physical register {phys} which holds no value")]
    DanglingRegister { phys: PhysReg },

    #[error("physical register {phys} allocated while still referenced")]
    RegisterStillReferenced { phys: PhysReg },

    #[error("store {tag} committed without a resolved address")]
    UnresolvedStore { tag: Tag },

    #[error("{stall} after space was checked")]
    ResourceOverflow { stall: ResourceStall },
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[error("access of {width} bytes at {address} is out of bounds")]
pub struct MemoryFault {
    pub address: Addr,
    pub width: u32,
}

/// Why a simulation stopped before completing.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum HaltReason {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("memory fault at pc {pc:#x}: {fault}")]
    MemoryFault { pc: Pc, fault: MemoryFault },

    #[error("internal invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("cycle limit of {0} reached")]
    MaxCycles(u64),
}
