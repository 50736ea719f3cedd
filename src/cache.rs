//! Set-associative data cache.
//!
//! The cache only tracks tags, so memory contents always live in
//! [`MainMemory`](crate::mem::MainMemory). What it adds is timing: the delay
//! a load pays to read through it, and the traffic a store causes.

use std::ops::RangeInclusive;

use serde::Serialize;

use crate::{
    config::{CacheConfig, ReplacementPolicy, StoreBehavior},
    util::Addr,
};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheLine {
    pub tag: u64,
    pub valid: bool,
    pub dirty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub loads: u64,
    pub stores: u64,
    pub hits: u64,
    pub misses: u64,
    /// Dirty lines written to memory when evicted.
    pub write_backs: u64,
    /// Stores sent straight to memory by a write-through cache.
    pub memory_writes: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> Option<f64> {
        match self.hits + self.misses {
            0 => None,
            total => Some(self.hits as f64 / total as f64),
        }
    }
}

/// Victim selection state, one variant per policy.
#[derive(Debug, Clone)]
enum Victims {
    /// Per set, ways ordered most to least recently used.
    Lru(Vec<Vec<usize>>),
    /// Per set, the next way to replace.
    Fifo(Vec<usize>),
    /// xorshift state.
    Random(u64),
}

impl Victims {
    fn new(policy: ReplacementPolicy, sets: usize, ways: usize) -> Self {
        match policy {
            ReplacementPolicy::Lru => Victims::Lru(vec![(0..ways).collect(); sets]),
            ReplacementPolicy::Fifo => Victims::Fifo(vec![0; sets]),
            ReplacementPolicy::Random => Victims::Random(0x9e37_79b9_7f4a_7c15),
        }
    }

    fn touch(&mut self, set: usize, way: usize) {
        if let Victims::Lru(usage) = self {
            let stack = &mut usage[set];
            if let Some(pos) = stack.iter().position(|&w| w == way) {
                stack.remove(pos);
            }
            stack.insert(0, way);
        }
    }

    fn filled(&mut self, set: usize, way: usize, ways: usize) {
        if let Victims::Fifo(next) = self {
            if next[set] == way {
                next[set] = (way + 1) % ways;
            }
        } else {
            self.touch(set, way);
        }
    }

    fn victim(&mut self, set: usize, ways: usize) -> usize {
        match self {
            Victims::Lru(usage) => usage[set].last().copied().unwrap_or(0),
            Victims::Fifo(next) => next[set],
            Victims::Random(state) => {
                let mut x = *state;
                x ^= x << 13;
                x ^= x >> 7;
                x ^= x << 17;
                *state = x;
                (x % ways as u64) as usize
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cache {
    #[serde(skip)]
    config: CacheConfig,
    sets: usize,
    ways: usize,
    /// `sets * ways` lines, set-major.
    lines: Vec<CacheLine>,
    #[serde(skip)]
    victims: Victims,
    stats: CacheStatistics,
}

impl Cache {
    pub fn new(config: &CacheConfig) -> Self {
        let (sets, ways) = (config.sets().max(1), config.associativity.max(1));
        Self {
            victims: Victims::new(config.replacement, sets, ways),
            lines: vec![CacheLine::default(); sets * ways],
            config: config.clone(),
            sets,
            ways,
            stats: CacheStatistics::default(),
        }
    }

    pub fn stats(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// Read `width` bytes at `addr` through the cache. Returns the cycles the
    /// access adds to the load.
    pub fn load(&mut self, addr: Addr, width: u32) -> u64 {
        self.stats.loads += 1;
        let penalty = self
            .line_numbers(addr, width)
            .map(|line| self.access(line, false))
            .sum::<u64>();
        self.config.access_delay + penalty
    }

    /// Record a committed store of `width` bytes at `addr`.
    pub fn store(&mut self, addr: Addr, width: u32) {
        self.stats.stores += 1;
        let write_back = self.config.store_behavior == StoreBehavior::WriteBack;

        for line in self.line_numbers(addr, width) {
            self.access(line, write_back);
        }
        if !write_back {
            self.stats.memory_writes += 1;
        }
    }

    fn line_numbers(&self, addr: Addr, width: u32) -> RangeInclusive<u64> {
        let size = self.config.line_size as u64;
        let first = u64::from(addr.0) / size;
        let last = (u64::from(addr.0) + u64::from(width.max(1)) - 1) / size;
        first..=last
    }

    // Look up one line, filling it on a miss. Returns the miss penalty.
    fn access(&mut self, line: u64, write: bool) -> u64 {
        let set = (line % self.sets as u64) as usize;
        let tag = line / self.sets as u64;
        let base = set * self.ways;
        let ways = &mut self.lines[base..base + self.ways];

        if let Some(way) = ways.iter().position(|l| l.valid && l.tag == tag) {
            ways[way].dirty |= write;
            self.victims.touch(set, way);
            self.stats.hits += 1;
            return 0;
        }

        self.stats.misses += 1;
        let way = match ways.iter().position(|l| !l.valid) {
            Some(way) => way,
            None => self.victims.victim(set, self.ways),
        };

        let victim = &mut self.lines[base + way];
        let mut penalty = self.config.memory_latency;
        if victim.valid && victim.dirty {
            self.stats.write_backs += 1;
            penalty += self.config.memory_latency;
        }
        *victim = CacheLine {
            tag,
            valid: true,
            dirty: write,
        };
        self.victims.filled(set, way, self.ways);

        penalty
    }
}
