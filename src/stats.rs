//! Simulation statistics collection and reporting.

use crate::{cache::CacheStatistics, error::ResourceStall, inst::OpClass};
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

/// Cycles in which dispatch stopped, by the structure that was full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StallCounters {
    pub rob_full: u64,
    pub physical_register_exhausted: u64,
    pub issue_window_full: u64,
    pub load_buffer_full: u64,
    pub store_buffer_full: u64,
}

impl StallCounters {
    pub fn record(&mut self, stall: ResourceStall) {
        let counter = match stall {
            ResourceStall::RobFull => &mut self.rob_full,
            ResourceStall::PhysicalRegisterExhausted => &mut self.physical_register_exhausted,
            ResourceStall::IssueWindowFull => &mut self.issue_window_full,
            ResourceStall::LoadBufferFull => &mut self.load_buffer_full,
            ResourceStall::StoreBufferFull => &mut self.store_buffer_full,
        };
        *counter += 1;
    }

    pub fn total(&self) -> u64 {
        self.rob_full
            + self.physical_register_exhausted
            + self.issue_window_full
            + self.load_buffer_full
            + self.store_buffer_full
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStatistics {
    /// Total simulator cycles elapsed.
    pub cycles: u64,
    /// Instructions retired.
    pub committed: u64,
    pub fetched: u64,
    /// Instructions discarded by squashes.
    pub flushed: u64,
    /// Number of misprediction squashes.
    pub rob_flushes: u64,
    /// Cycles fetch sat idle paying the flush penalty.
    pub flush_penalty_cycles: u64,
    /// Committed control transfers.
    pub branches: u64,
    pub conditional_branches: u64,
    pub taken_branches: u64,
    pub correct_predictions: u64,
    pub mispredictions: u64,
    pub stalls: StallCounters,
    /// Cycles each functional unit held an operation.
    pub unit_busy: BTreeMap<String, u64>,
    pub max_allocated_registers: usize,
    pub bytes_loaded: u64,
    pub bytes_stored: u64,
    pub cache: Option<CacheStatistics>,
    /// Committed instructions by operation class.
    pub mix: BTreeMap<OpClass, u64>,
}

impl SimulationStatistics {
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.committed as f64 / self.cycles as f64
        }
    }

    pub fn prediction_accuracy(&self) -> Option<f64> {
        match self.correct_predictions + self.mispredictions {
            0 => None,
            total => Some(self.correct_predictions as f64 / total as f64),
        }
    }
}

impl fmt::Display for SimulationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "          Cycles taken: {}", self.cycles)?;
        writeln!(f, "  Instructions retired: {}", self.committed)?;
        writeln!(f, "  Instructions fetched: {}", self.fetched)?;
        writeln!(f, "  Instructions flushed: {}", self.flushed)?;
        writeln!(f, "Instructions per clock: {:.2}", self.ipc())?;
        writeln!(f, "              Branches: {}", self.branches)?;
        writeln!(f, "        Mispredictions: {}", self.mispredictions)?;
        if let Some(acc) = self.prediction_accuracy() {
            writeln!(f, "   Prediction accuracy: {:.1}%", acc * 100.0)?;
        }
        writeln!(f, "          Stall cycles: {}", self.stalls.total())?;
        writeln!(f, "   Peak registers used: {}", self.max_allocated_registers)?;
        writeln!(
            f,
            "     Bytes loaded/stored: {}/{}",
            self.bytes_loaded, self.bytes_stored
        )?;
        if let Some(cache) = &self.cache {
            writeln!(f, "     Cache hits/misses: {}/{}", cache.hits, cache.misses)?;
            if let Some(rate) = cache.hit_rate() {
                writeln!(f, "        Cache hit rate: {:.1}%", rate * 100.0)?;
            }
            writeln!(f, "     Cache write-backs: {}", cache.write_backs)?;
        }
        for (unit, busy) in &self.unit_busy {
            writeln!(f, "  {unit:>12} busy for: {busy}")?;
        }
        Ok(())
    }
}
