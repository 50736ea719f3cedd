//! Architectural state and the value snapshots handed to observers.

use crate::{
    branch::BranchPredictor,
    cache::Cache,
    error::HaltReason,
    execution_unit::UnitView,
    inst::Pc,
    mem::MainMemory,
    model::{BlockId, SimCodeModel},
    regs::RegSet,
    rob::ReorderBufferEntry,
    stats::SimulationStatistics,
    util::Tag,
};
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimStatus {
    Idle,
    Running,
    Stalled,
    Completed,
    Halted,
}

impl SimStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SimStatus::Completed | SimStatus::Halted)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
}

impl Flags {
    pub fn from_value(val: u32) -> Self {
        Self {
            zero: val == 0,
            negative: (val as i32) < 0,
        }
    }

    pub fn as_array(self) -> [bool; 2] {
        [self.zero, self.negative]
    }
}

/// The only state visible outside speculation. Changed exclusively at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitecturalState {
    pub pc: Pc,
    pub regs: RegSet,
    pub mem: MainMemory,
    pub flags: Flags,
}

impl ArchitecturalState {
    pub fn new(regs: RegSet, mem: MainMemory) -> Self {
        Self {
            pc: 0,
            regs,
            mem,
            flags: Flags::default(),
        }
    }

    pub fn snapshot(&self) -> ArchitecturalSnapshot {
        ArchitecturalSnapshot {
            program_counter: self.pc,
            registers: self.regs.as_slice().to_vec(),
            memory: self.mem.bytes().to_vec(),
            flags: self.flags.as_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitecturalSnapshot {
    pub program_counter: Pc,
    pub registers: Vec<u32>,
    pub memory: Vec<u8>,
    /// `[zero, negative]`
    pub flags: [bool; 2],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchBlockView {
    pub id: BlockId,
    pub cycle: u64,
    pub predicted_taken: bool,
    pub instructions: Vec<SimCodeModel>,
}

/// Everything an observer can see after a cycle. Owns its data, so the
/// simulator keeps running independently of any snapshot taken.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorState {
    pub cycle: u64,
    pub status: SimStatus,
    pub halt_reason: Option<HaltReason>,
    pub arch: ArchitecturalSnapshot,
    pub blocks: Vec<FetchBlockView>,
    pub rob: Vec<ReorderBufferEntry>,
    pub issue_window: Vec<Tag>,
    pub units: Vec<UnitView>,
    pub predictor: BranchPredictor,
    pub cache: Option<Cache>,
    pub free_registers: usize,
    pub stats: SimulationStatistics,
}
