use crate::{
    error::InvariantViolation,
    inst::{ArchReg, PhysReg},
};
use serde::Serialize;
use strum::{EnumCount, IntoEnumIterator};

/// Architectural register values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegSet {
    regs: [u32; ArchReg::COUNT],
}

impl RegSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: ArchReg) -> u32 {
        self.regs[reg.index()]
    }

    pub fn set(&mut self, reg: ArchReg, value: u32) {
        if reg != ArchReg::Zero {
            self.regs[reg.index()] = value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArchReg, u32)> + '_ {
        ArchReg::iter().zip(self.regs.iter().copied())
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.regs
    }
}

impl<const N: usize> From<[(ArchReg, u32); N]> for RegSet {
    fn from(arr: [(ArchReg, u32); N]) -> Self {
        let mut regs = Self::new();
        for (reg, val) in arr {
            regs.set(reg, val);
        }
        regs
    }
}

// https://ece.uwaterloo.ca/~maagaard/ece720-t4/lec-05.pdf
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "value")]
pub enum PrfEntry {
    Free,
    Pending,
    Ready(u32),
}

/// Physical register file. The forwarding path: a value written here wakes
/// every consumer bound to the register.
#[derive(Debug, Clone)]
pub struct PhysRegFile {
    entries: Vec<PrfEntry>,
}

impl PhysRegFile {
    /// The first `ArchReg::COUNT` registers hold the initial architectural
    /// values; the rest start free.
    pub fn new(capacity: usize, initial: &RegSet) -> Self {
        let mut entries = vec![PrfEntry::Free; capacity];
        for (reg, val) in initial.iter() {
            entries[reg.index()] = PrfEntry::Ready(val);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, phys: PhysReg) -> PrfEntry {
        self.entries
            .get(phys.index())
            .copied()
            .unwrap_or(PrfEntry::Free)
    }

    pub fn is_ready(&self, phys: PhysReg) -> bool {
        matches!(self.get(phys), PrfEntry::Ready(_))
    }

    pub fn read(&self, phys: PhysReg) -> Result<u32, InvariantViolation> {
        match self.get(phys) {
            PrfEntry::Ready(val) => Ok(val),
            _ => Err(InvariantViolation::DanglingRegister { phys }),
        }
    }

    /// Mark a freshly allocated register as awaiting its producer.
    pub fn reserve(&mut self, phys: PhysReg) -> Result<(), InvariantViolation> {
        match self.entries.get_mut(phys.index()) {
            Some(entry @ PrfEntry::Free) => {
                *entry = PrfEntry::Pending;
                Ok(())
            }
            _ => Err(InvariantViolation::RegisterStillReferenced { phys }),
        }
    }

    pub fn write(&mut self, phys: PhysReg, val: u32) -> Result<(), InvariantViolation> {
        match self.entries.get_mut(phys.index()) {
            Some(entry @ (PrfEntry::Pending | PrfEntry::Ready(_))) => {
                *entry = PrfEntry::Ready(val);
                Ok(())
            }
            _ => Err(InvariantViolation::DanglingRegister { phys }),
        }
    }

    pub fn release(&mut self, phys: PhysReg) {
        if let Some(entry) = self.entries.get_mut(phys.index()) {
            *entry = PrfEntry::Free;
        }
    }

    pub fn allocated(&self) -> usize {
        self.entries
            .iter()
            .filter(|&&e| e != PrfEntry::Free)
            .count()
    }
}
