//! gshare direction predictor with a tagged, direct-mapped branch target
//! buffer. All state changes happen at commit, so squashes never need to
//! repair the predictor.

use crate::{config::PredictorConfig, inst::Pc};
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Strong,
    Weak,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct SaturatingCounter {
    bits: u8,
    value: u8,
}

impl SaturatingCounter {
    pub fn new(bits: u8, value: u8) -> Self {
        Self { bits, value }
    }

    fn max(&self) -> u8 {
        (1u8 << self.bits) - 1
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn taken(&self) -> bool {
        match self.bits {
            0 => self.value != 0,
            bits => (self.value >> (bits - 1)) & 1 == 1,
        }
    }

    pub fn confidence(&self) -> Confidence {
        if self.bits == 0 || self.value == 0 || self.value == self.max() {
            Confidence::Strong
        } else {
            Confidence::Weak
        }
    }

    pub fn update(&mut self, taken: bool) {
        if self.bits == 0 {
            return;
        }

        self.value = if taken {
            (self.value + 1).min(self.max())
        } else {
            self.value.saturating_sub(1)
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternHistoryTable {
    counters: Vec<SaturatingCounter>,
}

impl PatternHistoryTable {
    pub fn new(size: usize, bits: u8, initial: u8) -> Self {
        Self {
            counters: vec![SaturatingCounter::new(bits, initial); size],
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn get(&self, index: usize) -> SaturatingCounter {
        self.counters[index % self.counters.len()]
    }

    pub fn update(&mut self, index: usize, taken: bool) {
        let len = self.counters.len();
        self.counters[index % len].update(taken);
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalHistory {
    bits: u32,
    value: u32,
}

impl GlobalHistory {
    pub fn new(bits: u32) -> Self {
        Self { bits, value: 0 }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn push(&mut self, taken: bool) {
        let mask = (1u32 << self.bits) - 1;
        self.value = ((self.value << 1) | u32::from(taken)) & mask;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct BtbEntry {
    pub pc: Pc,
    pub target: Pc,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchTargetBuffer {
    entries: Vec<Option<BtbEntry>>,
}

impl BranchTargetBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
        }
    }

    fn slot(&self, pc: Pc) -> usize {
        (pc >> 2) as usize % self.entries.len()
    }

    pub fn get(&self, pc: Pc) -> Option<Pc> {
        self.entries[self.slot(pc)]
            .filter(|e| e.pc == pc)
            .map(|e| e.target)
    }

    pub fn add_entry(&mut self, pc: Pc, target: Pc) {
        let slot = self.slot(pc);
        self.entries[slot] = Some(BtbEntry { pc, target });
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub taken: bool,
    pub confidence: Confidence,
    pub target: Option<Pc>,
    /// PHT entry consulted; trained at commit.
    pub index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchPredictor {
    pht: PatternHistoryTable,
    history: GlobalHistory,
    btb: BranchTargetBuffer,
}

impl BranchPredictor {
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            pht: PatternHistoryTable::new(
                config.pht_size,
                config.counter_bits,
                config.initial_state,
            ),
            history: GlobalHistory::new(config.history_bits),
            btb: BranchTargetBuffer::new(config.btb_size),
        }
    }

    fn index(&self, pc: Pc) -> usize {
        ((pc >> 2) ^ self.history.value()) as usize % self.pht.len()
    }

    /// A transfer is predicted taken only when the BTB knows its target.
    pub fn predict(&self, pc: Pc, conditional: bool) -> Prediction {
        let index = self.index(pc);
        let counter = self.pht.get(index);
        let target = self.btb.get(pc);

        let (direction, confidence) = if conditional {
            (counter.taken(), counter.confidence())
        } else {
            (true, Confidence::Strong)
        };

        Prediction {
            taken: direction && target.is_some(),
            confidence,
            target,
            index,
        }
    }

    pub fn update(
        &mut self,
        pc: Pc,
        prediction: &Prediction,
        conditional: bool,
        taken: bool,
        target: Pc,
    ) {
        if conditional {
            self.pht.update(prediction.index, taken);
            self.history.push(taken);
        }

        if taken {
            self.btb.add_entry(pc, target);
        }
    }

    pub fn history(&self) -> u32 {
        self.history.value()
    }
}
