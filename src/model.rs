//! Dynamic instruction records. Every fetched instruction becomes a
//! [`SimCodeModel`] stored in a [`SimArena`] and addressed by its [`SimId`];
//! the reorder buffer, issue window and fetch blocks hold ids, never models.

use crate::{
    branch::Prediction,
    error::MemoryFault,
    inst::{ArchReg, ArgRole, CodeId, Pc, PhysReg},
    rob::RobStatus,
    util::{Addr, Tag},
};
use serde::Serialize;
use std::{
    collections::VecDeque,
    fmt,
    ops::{Index, IndexMut},
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SimId(pub u64);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

/// What an operand was bound to at rename time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Binding {
    /// Source read from a physical register.
    Phys { reg: PhysReg },
    /// Source `x0`.
    Zero,
    /// Destination; `prev` is the mapping it replaces and is freed on commit.
    Dest {
        arch: ArchReg,
        phys: PhysReg,
        prev: PhysReg,
    },
    /// Destination `x0`, the result is dropped.
    Discard,
    Imm { value: i32 },
    Mem { base: Option<PhysReg>, offset: i32 },
    Target { pc: Pc },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedArgument {
    pub role: ArgRole,
    #[serde(flatten)]
    pub binding: Binding,
}

impl fmt::Display for RenamedArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding {
            Binding::Phys { reg } => write!(f, "{reg}"),
            Binding::Zero | Binding::Discard => write!(f, "zero"),
            Binding::Dest { phys, .. } => write!(f, "{phys}"),
            Binding::Imm { value } => write!(f, "{value}"),
            Binding::Mem {
                base: Some(base),
                offset,
            } => write!(f, "{offset}({base})"),
            Binding::Mem { base: None, offset } => write!(f, "{offset}(zero)"),
            Binding::Target { pc } => write!(f, "{pc:#x}"),
        }
    }
}

/// A dynamic instance of a program instruction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimCodeModel {
    pub id: SimId,
    pub code: CodeId,
    pub pc: Pc,
    pub block: BlockId,
    /// Rendering of the static instruction, for observers.
    pub assembly: String,
    pub renamed: Vec<RenamedArgument>,
    pub tag: Option<Tag>,
    /// `None` until dispatched into the reorder buffer.
    pub status: Option<RobStatus>,
    /// Fetched past an unresolved control transfer.
    pub speculative: bool,
    pub prediction: Option<Prediction>,
    pub predicted_next: Pc,
    pub fetch_cycle: u64,
    pub dispatch_cycle: Option<u64>,
    pub issue_cycle: Option<u64>,
    pub complete_cycle: Option<u64>,
    pub commit_cycle: Option<u64>,
    pub result: Option<u32>,
    pub address: Option<Addr>,
    pub actual_next: Option<Pc>,
    pub fault: Option<MemoryFault>,
}

impl SimCodeModel {
    pub fn new(id: SimId, code: CodeId, pc: Pc, block: BlockId, fetch_cycle: u64) -> Self {
        Self {
            id,
            code,
            pc,
            block,
            assembly: String::new(),
            renamed: Vec::new(),
            tag: None,
            status: None,
            speculative: false,
            prediction: None,
            predicted_next: pc.wrapping_add(4),
            fetch_cycle,
            dispatch_cycle: None,
            issue_cycle: None,
            complete_cycle: None,
            commit_cycle: None,
            result: None,
            address: None,
            actual_next: None,
            fault: None,
        }
    }

    pub fn dest(&self) -> Option<(ArchReg, PhysReg, PhysReg)> {
        self.renamed.iter().find_map(|arg| match arg.binding {
            Binding::Dest { arch, phys, prev } => Some((arch, phys, prev)),
            _ => None,
        })
    }

    /// Physical registers this instance waits on.
    pub fn source_regs(&self) -> impl Iterator<Item = PhysReg> + '_ {
        self.renamed.iter().filter_map(|arg| match arg.binding {
            Binding::Phys { reg } => Some(reg),
            Binding::Mem { base, .. } => base,
            _ => None,
        })
    }

    /// Committed or squashed.
    pub fn is_retired(&self) -> bool {
        matches!(
            self.status,
            Some(RobStatus::Committed | RobStatus::Squashed)
        )
    }

    pub fn mispredicted(&self) -> bool {
        self.actual_next
            .map_or(false, |actual| actual != self.predicted_next)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionFetchBlock {
    pub id: BlockId,
    pub cycle: u64,
    pub sims: Vec<SimId>,
    pub predicted_taken: bool,
}

/// Arena of in-flight models. Ids grow monotonically; retired models are
/// pruned from the front once no fetch block refers to them.
#[derive(Debug, Clone, Default)]
pub struct SimArena {
    base: u64,
    sims: VecDeque<SimCodeModel>,
}

impl SimArena {
    pub fn next_id(&self) -> SimId {
        SimId(self.base + self.sims.len() as u64)
    }

    pub fn push(&mut self, mut sim: SimCodeModel) -> SimId {
        let id = self.next_id();
        sim.id = id;
        self.sims.push_back(sim);
        id
    }

    fn slot(&self, id: SimId) -> Option<usize> {
        id.0.checked_sub(self.base)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < self.sims.len())
    }

    pub fn get(&self, id: SimId) -> Option<&SimCodeModel> {
        self.slot(id).and_then(|i| self.sims.get(i))
    }

    pub fn get_mut(&mut self, id: SimId) -> Option<&mut SimCodeModel> {
        self.slot(id).and_then(move |i| self.sims.get_mut(i))
    }

    /// Drop every model older than `id`.
    pub fn prune_before(&mut self, id: SimId) {
        while self.base < id.0 && self.sims.pop_front().is_some() {
            self.base += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.sims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimCodeModel> + '_ {
        self.sims.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SimCodeModel> + '_ {
        self.sims.iter_mut()
    }
}

impl Index<SimId> for SimArena {
    type Output = SimCodeModel;

    fn index(&self, id: SimId) -> &Self::Output {
        self.get(id).expect("simulation id outlived its model")
    }
}

impl IndexMut<SimId> for SimArena {
    fn index_mut(&mut self, id: SimId) -> &mut Self::Output {
        self.get_mut(id).expect("simulation id outlived its model")
    }
}
