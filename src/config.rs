//! Machine configuration.
//!
//! Every field has a default, so a JSON file only needs to name what it
//! changes:
//!
//! ```json
//! { "fetch_width": 2, "rob_size": 8, "predictor": { "counter_bits": 1 } }
//! ```
//!
//! The data cache is off unless a `cache` object is present.

use crate::{
    error::ConfigError,
    inst::{ArchReg, Label, OpClass},
    mem::MainMemory,
    program::Program,
    util::Addr,
};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};

mod defaults {
    pub const FETCH_WIDTH: usize = 3;
    pub const COMMIT_WIDTH: usize = 4;
    pub const ROB_SIZE: usize = 32;
    pub const PHYS_REGS: usize = 64;
    pub const WINDOW_SIZE: usize = 16;
    pub const LOAD_BUFFER_SIZE: usize = 16;
    pub const STORE_BUFFER_SIZE: usize = 16;
    pub const MEMORY_SIZE: usize = crate::mem::DEFAULT_MEMORY_SIZE;
    pub const MAX_CYCLES: u64 = 1_000_000;

    pub const PHT_SIZE: usize = 16;
    pub const HISTORY_BITS: u32 = 4;
    pub const COUNTER_BITS: u8 = 2;
    /// Weakly not taken.
    pub const INITIAL_STATE: u8 = 1;
    pub const BTB_SIZE: usize = 16;

    pub const CACHE_LINES: usize = 16;
    pub const CACHE_LINE_SIZE: usize = 16;
    pub const CACHE_ASSOCIATIVITY: usize = 2;
    pub const CACHE_ACCESS_DELAY: u64 = 1;
    pub const MEMORY_LATENCY: u64 = 10;

    pub const MAX_FLUSH_PENALTY: u64 = 100;
    pub const MAX_CACHE_LINES: usize = 65536;
    pub const MAX_CACHE_LINE_SIZE: usize = 512;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub classes: Vec<OpClass>,
    /// Cycles an operation occupies the unit.
    pub latency: u64,
}

impl UnitConfig {
    pub fn new(name: &str, classes: &[OpClass], latency: u64) -> Self {
        Self {
            name: name.to_owned(),
            classes: classes.to_vec(),
            latency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Pattern history table entries.
    pub pht_size: usize,
    /// Bits of global history folded into the table index.
    pub history_bits: u32,
    /// Width of each saturating counter (0, 1 or 2). A zero-bit counter is a
    /// static prediction taken from `initial_state`.
    pub counter_bits: u8,
    pub initial_state: u8,
    /// Branch target buffer entries.
    pub btb_size: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            pht_size: defaults::PHT_SIZE,
            history_bits: defaults::HISTORY_BITS,
            counter_bits: defaults::COUNTER_BITS,
            initial_state: defaults::INITIAL_STATE,
            btb_size: defaults::BTB_SIZE,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Fifo,
    Random,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBehavior {
    /// Stores only dirty the line; memory sees it on eviction.
    #[default]
    WriteBack,
    /// Every store also goes to memory.
    WriteThrough,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total lines; a multiple of `associativity`.
    pub lines: usize,
    /// Bytes per line, a power of two.
    pub line_size: usize,
    pub associativity: usize,
    pub replacement: ReplacementPolicy,
    pub store_behavior: StoreBehavior,
    /// Cycles added to every load that reads through the cache.
    pub access_delay: u64,
    /// Further cycles for a load that misses, and again if the victim was dirty.
    pub memory_latency: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lines: defaults::CACHE_LINES,
            line_size: defaults::CACHE_LINE_SIZE,
            associativity: defaults::CACHE_ASSOCIATIVITY,
            replacement: ReplacementPolicy::default(),
            store_behavior: StoreBehavior::default(),
            access_delay: defaults::CACHE_ACCESS_DELAY,
            memory_latency: defaults::MEMORY_LATENCY,
        }
    }
}

impl CacheConfig {
    pub fn sets(&self) -> usize {
        self.lines / self.associativity.max(1)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(format!("cache.{msg}")));

        if self.lines == 0 || self.lines > defaults::MAX_CACHE_LINES {
            return invalid(format!(
                "lines must be between 1 and {}, got {}",
                defaults::MAX_CACHE_LINES,
                self.lines
            ));
        }
        if !self.line_size.is_power_of_two() || self.line_size > defaults::MAX_CACHE_LINE_SIZE {
            return invalid(format!(
                "line_size must be a power of two up to {}, got {}",
                defaults::MAX_CACHE_LINE_SIZE,
                self.line_size
            ));
        }
        if self.associativity == 0 || self.lines % self.associativity != 0 {
            return invalid(format!(
                "associativity must divide lines ({}), got {}",
                self.lines, self.associativity
            ));
        }
        if !self.sets().is_power_of_two() {
            return invalid(format!(
                "lines / associativity must be a power of two, got {}",
                self.sets()
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Byte,
    Half,
    #[default]
    Word,
}

impl DataKind {
    pub fn width(self) -> u32 {
        match self {
            DataKind::Byte => 1,
            DataKind::Half => 2,
            DataKind::Word => 4,
        }
    }
}

/// Named data placed in memory before the program starts. Its name can be
/// used wherever the program expects an immediate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLocation {
    pub name: String,
    pub address: u32,
    #[serde(default)]
    pub kind: DataKind,
    /// Signed or unsigned, as long as each fits in `kind`.
    pub values: Vec<i64>,
}

impl MemoryLocation {
    pub fn new(name: &str, address: u32, kind: DataKind, values: &[i64]) -> Self {
        Self {
            name: name.to_owned(),
            address,
            kind,
            values: values.to_vec(),
        }
    }

    pub fn end(&self) -> u64 {
        u64::from(self.address) + self.values.len() as u64 * u64::from(self.kind.width())
    }

    /// Little-endian image of the values.
    pub fn bytes(&self) -> Result<Vec<u8>, ConfigError> {
        let width = self.kind.width();
        let (min, max) = (-(1i64 << (8 * width - 1)), (1i64 << (8 * width)) - 1);

        let mut out = Vec::with_capacity(self.values.len() * width as usize);
        for &value in &self.values {
            if value < min || value > max {
                return Err(ConfigError::Invalid(format!(
                    "value {value} of '{}' does not fit in a {:?}",
                    self.name, self.kind
                )));
            }
            out.extend_from_slice(&value.to_le_bytes()[..width as usize]);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Instructions fetched per cycle.
    pub fetch_width: usize,
    /// Instructions retired per cycle.
    pub commit_width: usize,
    pub rob_size: usize,
    /// Physical registers, including the 32 holding the initial mapping.
    pub phys_regs: usize,
    /// Issue window (reservation station) entries.
    pub window_size: usize,
    pub load_buffer_size: usize,
    pub store_buffer_size: usize,
    pub units: Vec<UnitConfig>,
    pub predictor: PredictorConfig,
    /// Minimum size of the simulated memory in bytes.
    pub memory_size: usize,
    /// Halt after this many cycles; `None` runs until the program ends.
    pub max_cycles: Option<u64>,
    /// Cycles fetch stays idle after a misprediction squash.
    pub flush_penalty: u64,
    pub cache: Option<CacheConfig>,
    pub memory_locations: Vec<MemoryLocation>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            fetch_width: defaults::FETCH_WIDTH,
            commit_width: defaults::COMMIT_WIDTH,
            rob_size: defaults::ROB_SIZE,
            phys_regs: defaults::PHYS_REGS,
            window_size: defaults::WINDOW_SIZE,
            load_buffer_size: defaults::LOAD_BUFFER_SIZE,
            store_buffer_size: defaults::STORE_BUFFER_SIZE,
            units: vec![
                UnitConfig::new("alu0", &[OpClass::Alu], OpClass::Alu.nominal_latency()),
                UnitConfig::new("alu1", &[OpClass::Alu], OpClass::Alu.nominal_latency()),
                UnitConfig::new("mul", &[OpClass::Mul], OpClass::Mul.nominal_latency()),
                UnitConfig::new("div", &[OpClass::Div], OpClass::Div.nominal_latency()),
                UnitConfig::new("branch", &[OpClass::Branch], OpClass::Branch.nominal_latency()),
                UnitConfig::new(
                    "lsu",
                    &[OpClass::Load, OpClass::Store],
                    OpClass::Load.nominal_latency(),
                ),
            ],
            predictor: PredictorConfig::default(),
            memory_size: defaults::MEMORY_SIZE,
            max_cycles: Some(defaults::MAX_CYCLES),
            flush_penalty: 0,
            cache: None,
            memory_locations: Vec::new(),
        }
    }
}

impl CpuConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("fetch_width", self.fetch_width),
            ("commit_width", self.commit_width),
            ("rob_size", self.rob_size),
            ("window_size", self.window_size),
            ("load_buffer_size", self.load_buffer_size),
            ("store_buffer_size", self.store_buffer_size),
            ("predictor.pht_size", self.predictor.pht_size),
            ("predictor.btb_size", self.predictor.btb_size),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }

        if self.phys_regs <= ArchReg::COUNT || self.phys_regs > usize::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "phys_regs must be between {} and {}, got {}",
                ArchReg::COUNT + 1,
                u16::MAX,
                self.phys_regs
            )));
        }

        if self.units.is_empty() {
            return Err(ConfigError::Invalid("no functional units".to_owned()));
        }

        if let Some(unit) = self
            .units
            .iter()
            .find(|u| u.latency == 0 || u.classes.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "unit '{}' needs a non-zero latency and at least one class",
                unit.name
            )));
        }

        if self.predictor.counter_bits > 2 {
            return Err(ConfigError::Invalid(format!(
                "predictor.counter_bits must be at most 2, got {}",
                self.predictor.counter_bits
            )));
        }

        if self.predictor.history_bits > 16 {
            return Err(ConfigError::Invalid(format!(
                "predictor.history_bits must be at most 16, got {}",
                self.predictor.history_bits
            )));
        }

        let max_state = (1u8 << self.predictor.counter_bits.max(1)) - 1;
        if self.predictor.initial_state > max_state {
            return Err(ConfigError::Invalid(format!(
                "predictor.initial_state must be at most {max_state}"
            )));
        }

        if self.flush_penalty > defaults::MAX_FLUSH_PENALTY {
            return Err(ConfigError::Invalid(format!(
                "flush_penalty must be at most {}, got {}",
                defaults::MAX_FLUSH_PENALTY,
                self.flush_penalty
            )));
        }

        if let Some(cache) = &self.cache {
            cache.validate()?;
        }

        self.validate_memory_locations()
    }

    fn validate_memory_locations(&self) -> Result<(), ConfigError> {
        let mut names = hashbrown::HashSet::new();

        for loc in &self.memory_locations {
            let symbol = loc.name.starts_with(|c: char| c.is_alphabetic() || "_.".contains(c))
                && loc.name.parse::<Label>().is_ok();
            if !symbol {
                return Err(ConfigError::Invalid(format!(
                    "memory location name '{}' is not a valid label",
                    loc.name
                )));
            }
            if !names.insert(loc.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate memory location '{}'",
                    loc.name
                )));
            }
            if loc.end() > self.memory_size as u64 {
                return Err(ConfigError::Invalid(format!(
                    "memory location '{}' ends at {:#x}, past memory_size {:#x}",
                    loc.name,
                    loc.end(),
                    self.memory_size
                )));
            }
            loc.bytes()?;
        }

        Ok(())
    }

    /// Copy every named location into `mem`.
    pub fn initialize_memory(&self, mem: &mut MainMemory) -> Result<(), ConfigError> {
        for loc in &self.memory_locations {
            mem.copy_from_slice(&loc.bytes()?, Addr(loc.address));
        }
        Ok(())
    }

    pub fn executes(&self, class: OpClass) -> bool {
        self.units.iter().any(|u| u.classes.contains(&class))
    }

    /// Reject programs containing an operation no unit can execute.
    pub fn check_program(&self, prog: &Program) -> Result<(), ConfigError> {
        for class in OpClass::iter().filter(|&c| !self.executes(c)) {
            if let Some(inst) = prog.insts.iter().find(|i| i.class() == class) {
                return Err(ConfigError::NoUnitForClass {
                    class,
                    mnemonic: inst.mnemonic,
                });
            }
        }

        Ok(())
    }
}
