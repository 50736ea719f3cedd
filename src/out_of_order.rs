//! The cycle-driven out-of-order pipeline.
//!
//! Each call to [`OutOfOrder::step`] advances one clock. Stages run back to
//! front (commit, execute, issue, dispatch, fetch) so that a stage only sees
//! what older stages produced in earlier cycles.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{debug, trace};

use crate::{
    alu,
    branch::BranchPredictor,
    cache::Cache,
    config::CpuConfig,
    cpu::{Cpu, ExecResult},
    error::{ConfigError, HaltReason, InvariantViolation, ResourceStall, SimError},
    inst::{OpClass, Pc},
    lsq::LoadStoreQueue,
    mem::MainMemory,
    model::{BlockId, InstructionFetchBlock, SimArena, SimCodeModel, SimId},
    program::{Program, INST_BYTES},
    rat::RegisterAliasTable,
    regs::{PhysRegFile, RegSet},
    rob::{ReorderBuffer, RobStatus},
    scheduler::{IssueContext, Scheduler},
    state::{ArchitecturalState, FetchBlockView, Flags, SimStatus, SimulatorState},
    stats::SimulationStatistics,
    util::Tag,
};

mod stages {
    use super::*;

    /// Fetched instructions waiting to be renamed, oldest first.
    #[derive(Debug, Clone, Default)]
    pub struct FetchDecode {
        pub sims: VecDeque<SimId>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Commit {
        pub retired: usize,
        pub redirect: Option<Pc>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Execute {
        pub completed: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Issue {
        pub issued: usize,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Dispatch {
        pub dispatched: usize,
        pub stall: Option<ResourceStall>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Fetch {
        pub fetched: usize,
    }
}

#[derive(Debug, Clone)]
pub struct OutOfOrder {
    config: CpuConfig,
    prog: Program,
    initial: (RegSet, MainMemory),
    arch: ArchitecturalState,

    rat: RegisterAliasTable,
    prf: PhysRegFile,
    rob: ReorderBuffer,
    scheduler: Scheduler,
    lsq: LoadStoreQueue,
    predictor: BranchPredictor,
    cache: Option<Cache>,

    arena: SimArena,
    blocks: VecDeque<InstructionFetchBlock>,
    fetch_decode: stages::FetchDecode,
    fetch_pc: Pc,
    /// First cycle fetch may run again after a squash.
    fetch_resume: u64,
    next_block: BlockId,

    cycle: u64,
    status: SimStatus,
    halt: Option<HaltReason>,
    stats: SimulationStatistics,
}

impl Cpu for OutOfOrder {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Result<Self, SimError> {
        Self::with_config(prog, regs, mem, CpuConfig::default())
    }

    fn exec_all(mut self) -> Result<ExecResult, SimError> {
        while !self.step().is_terminal() {}

        match self.halt.take() {
            Some(reason) => Err(reason.into()),
            None => Ok(ExecResult {
                mem: self.arch.mem,
                regs: self.arch.regs,
                cycles_taken: self.cycle,
                insts_retired: self.stats.committed,
            }),
        }
    }
}

impl OutOfOrder {
    pub fn with_config(
        prog: Program,
        regs: RegSet,
        mut mem: MainMemory,
        config: CpuConfig,
    ) -> Result<Self, SimError> {
        config.validate()?;
        config.check_program(&prog)?;
        mem.ensure_size(config.memory_size);
        config.initialize_memory(&mut mem)?;
        Ok(Self::build(prog, regs, mem, config))
    }

    /// Parse `src` and build a simulator for it. A program that fails to
    /// decode yields a simulator that is already halted with the decode
    /// error; only an unusable configuration is reported as `Err`.
    pub fn from_assembly(src: &str, config: CpuConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut mem = MainMemory::with_size(config.memory_size);
        config.initialize_memory(&mut mem)?;

        match Program::assemble(src, &config.memory_locations) {
            Ok(prog) => {
                config.check_program(&prog)?;
                Ok(Self::build(prog, RegSet::new(), mem, config))
            }
            Err(err) => {
                let mut sim = Self::build(Program::default(), RegSet::new(), mem, config);
                sim.halt_with(err.into());
                Ok(sim)
            }
        }
    }

    fn build(prog: Program, regs: RegSet, mem: MainMemory, config: CpuConfig) -> Self {
        let mut stats = SimulationStatistics::default();
        for unit in &config.units {
            stats.unit_busy.insert(unit.name.clone(), 0);
        }

        Self {
            rat: RegisterAliasTable::new(config.phys_regs),
            prf: PhysRegFile::new(config.phys_regs, &regs),
            rob: ReorderBuffer::new(config.rob_size),
            scheduler: Scheduler::new(&config),
            lsq: LoadStoreQueue::new(config.load_buffer_size, config.store_buffer_size),
            predictor: BranchPredictor::new(&config.predictor),
            cache: config.cache.as_ref().map(Cache::new),
            arch: ArchitecturalState::new(regs.clone(), mem.clone()),
            initial: (regs, mem),
            arena: SimArena::default(),
            blocks: VecDeque::new(),
            fetch_decode: stages::FetchDecode::default(),
            fetch_pc: 0,
            fetch_resume: 0,
            next_block: BlockId::default(),
            cycle: 0,
            status: SimStatus::Idle,
            halt: None,
            stats,
            prog,
            config,
        }
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt.as_ref()
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn arch_state(&self) -> &ArchitecturalState {
        &self.arch
    }

    pub fn stats(&self) -> &SimulationStatistics {
        &self.stats
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    pub fn program(&self) -> &Program {
        &self.prog
    }

    /// Advance one clock cycle. Once the simulation has completed or halted
    /// this does nothing and returns the final status.
    pub fn step(&mut self) -> SimStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        self.cycle += 1;
        self.stats.cycles = self.cycle;

        match self.tick() {
            Ok(status) => self.status = status,
            Err(reason) => self.halt_with(reason),
        }

        if let Some(max) = self.config.max_cycles {
            if !self.status.is_terminal() && self.cycle >= max {
                self.halt_with(HaltReason::MaxCycles(max));
            }
        }

        self.status
    }

    /// Step at most `cycles` times, stopping early at a terminal status.
    pub fn run(&mut self, cycles: u64) -> SimStatus {
        for _ in 0..cycles {
            if self.step().is_terminal() {
                break;
            }
        }
        self.status
    }

    /// Step until the simulation ends or `cancel` is raised. The flag is
    /// checked between cycles, never in the middle of one.
    pub fn run_to_completion(&mut self, cancel: &AtomicBool) -> SimStatus {
        while !self.status.is_terminal() {
            if cancel.load(Ordering::Relaxed) {
                debug!(cycle = self.cycle, "run cancelled");
                break;
            }
            self.step();
        }
        self.status
    }

    /// Start over from the initial registers and memory with the same
    /// program and configuration.
    pub fn reset(&mut self) {
        let decode = match &self.halt {
            Some(HaltReason::Decode(err)) => Some(err.clone()),
            _ => None,
        };
        let (regs, mem) = self.initial.clone();

        *self = Self::build(self.prog.clone(), regs, mem, self.config.clone());
        if let Some(err) = decode {
            self.halt_with(err.into());
        }
    }

    /// An owned copy of everything observable. Later steps do not affect it.
    pub fn snapshot(&self) -> SimulatorState {
        SimulatorState {
            cycle: self.cycle,
            status: self.status,
            halt_reason: self.halt.clone(),
            arch: self.arch.snapshot(),
            blocks: self
                .blocks
                .iter()
                .map(|block| FetchBlockView {
                    id: block.id,
                    cycle: block.cycle,
                    predicted_taken: block.predicted_taken,
                    instructions: block
                        .sims
                        .iter()
                        .filter_map(|&id| self.arena.get(id))
                        .cloned()
                        .collect(),
                })
                .collect(),
            rob: self.rob.iter().copied().collect(),
            issue_window: self.scheduler.window().map(|(tag, _)| tag).collect(),
            units: self.scheduler.unit_views(),
            predictor: self.predictor.clone(),
            cache: self.cache.clone(),
            free_registers: self.rat.free_count(),
            stats: self.stats.clone(),
        }
    }

    fn halt_with(&mut self, reason: HaltReason) {
        debug!(cycle = self.cycle, %reason, "simulation halted");
        self.halt = Some(reason);
        self.status = SimStatus::Halted;
    }

    fn tick(&mut self) -> Result<SimStatus, HaltReason> {
        let now = self.cycle;

        let commit = self.stage_commit(now)?;
        let execute = self.stage_execute(now)?;
        let issue = self.stage_issue(now)?;
        let dispatch = self.stage_dispatch(now)?;
        let fetch = self.stage_fetch(now);

        trace!(
            cycle = now,
            retired = commit.retired,
            completed = execute.completed,
            issued = issue.issued,
            dispatched = dispatch.dispatched,
            fetched = fetch.fetched,
            "cycle"
        );

        self.refresh_speculation();
        self.prune();
        for unit in self.scheduler.units() {
            self.stats.unit_busy.insert(unit.name.clone(), unit.busy_cycles);
        }
        self.stats.cache = self.cache.as_ref().map(|cache| cache.stats().clone());

        if self.is_drained() {
            debug!(cycle = now, committed = self.stats.committed, "simulation completed");
            return Ok(SimStatus::Completed);
        }

        Ok(match dispatch.stall {
            Some(_) => SimStatus::Stalled,
            None => SimStatus::Running,
        })
    }

    fn is_drained(&self) -> bool {
        self.rob.is_empty()
            && self.fetch_decode.sims.is_empty()
            && self.prog.fetch(self.fetch_pc).is_none()
    }

    // Retire completed instructions from the ROB head into architectural state.
    fn stage_commit(&mut self, now: u64) -> Result<stages::Commit, HaltReason> {
        let mut out = stages::Commit::default();

        for entry in self.rob.commit_ready(self.config.commit_width) {
            let sim = &self.arena[entry.sim];
            let pc = sim.pc;
            if let Some(fault) = sim.fault {
                return Err(HaltReason::MemoryFault { pc, fault });
            }

            let (dest, prediction, mispredicted) = (sim.dest(), sim.prediction, sim.mispredicted());
            let actual = sim.actual_next.unwrap_or_else(|| pc.wrapping_add(INST_BYTES));
            let code = &self.prog.insts[sim.code.0];

            self.rob.retire_head(entry.tag)?;

            if code.is_store() {
                let store = self.lsq.commit_store(entry.tag)?;
                let address = store
                    .address
                    .ok_or(InvariantViolation::UnresolvedStore { tag: entry.tag })?;
                self.arch
                    .mem
                    .write(address, store.width, store.data)
                    .map_err(|fault| HaltReason::MemoryFault { pc, fault })?;
                if let Some(cache) = &mut self.cache {
                    cache.store(address, store.width);
                }
                self.stats.bytes_stored += u64::from(store.width);
            } else if code.is_load() {
                self.lsq.release_load(entry.tag);
                self.stats.bytes_loaded += u64::from(alu::access_width(code.mnemonic));
            }

            if let Some((arch, phys, prev)) = dest {
                let value = self.prf.read(phys)?;
                self.arch.regs.set(arch, value);
                self.arch.flags = Flags::from_value(value);
                let freed = self.rat.commit(arch, phys, prev);
                self.prf.release(freed);
            }

            if code.is_control() {
                let conditional = code.is_conditional();
                let taken = !conditional || actual != pc.wrapping_add(INST_BYTES);
                if let Some(prediction) = prediction {
                    self.predictor.update(pc, &prediction, conditional, taken, actual);
                }

                self.stats.branches += 1;
                self.stats.conditional_branches += u64::from(conditional);
                self.stats.taken_branches += u64::from(taken);
                if mispredicted {
                    self.stats.mispredictions += 1;
                } else {
                    self.stats.correct_predictions += 1;
                }
            }

            *self.stats.mix.entry(code.class()).or_default() += 1;
            self.stats.committed += 1;
            self.arch.pc = actual;

            let sim = &mut self.arena[entry.sim];
            sim.status = Some(RobStatus::Committed);
            sim.commit_cycle = Some(now);
            trace!(cycle = now, tag = %entry.tag, pc, inst = %sim.assembly, "commit");
            out.retired += 1;

            if mispredicted {
                self.squash_after(entry.tag);
                self.fetch_pc = actual;
                out.redirect = Some(actual);
                break;
            }
        }

        Ok(out)
    }

    // Throw away everything younger than a mispredicted branch and restore
    // the rename state to the committed mapping.
    fn squash_after(&mut self, branch: Tag) {
        let first = branch.next();
        let squashed = self.rob.squash_from(first);
        self.scheduler.squash_from(first);
        self.lsq.squash_from(first);

        let mut freed = Vec::new();
        for entry in &squashed {
            let sim = &mut self.arena[entry.sim];
            sim.status = Some(RobStatus::Squashed);
            if let Some((_, phys, _)) = sim.dest() {
                self.prf.release(phys);
                freed.push(phys);
            }
        }
        self.rat.restore(freed);

        let pending = self.fetch_decode.sims.drain(..).collect::<Vec<_>>();
        for &id in &pending {
            self.arena[id].status = Some(RobStatus::Squashed);
        }

        let flushed = squashed.len() + pending.len();
        self.stats.flushed += flushed as u64;
        self.stats.rob_flushes += 1;
        self.fetch_resume = self.cycle + self.config.flush_penalty;
        debug!(cycle = self.cycle, branch = %branch, flushed, "squashed wrong path");
    }

    // Advance the functional units and write back whatever finished.
    fn stage_execute(&mut self, now: u64) -> Result<stages::Execute, HaltReason> {
        let completions = self.scheduler.execute();

        for done in &completions {
            let sim = &mut self.arena[done.sim];
            let code = &self.prog.insts[sim.code.0];
            let outcome = done.outcome;

            if let Some((_, phys, _)) = sim.dest() {
                self.prf.write(phys, outcome.value)?;
            }
            if code.is_store() {
                let address = outcome
                    .address
                    .ok_or(InvariantViolation::UnresolvedStore { tag: done.tag })?;
                self.lsq.store_executed(done.tag, address, outcome.value)?;
            }
            self.rob.mark_completed(done.tag)?;

            sim.status = Some(RobStatus::Completed);
            sim.complete_cycle = Some(now);
            sim.result = Some(outcome.value);
            sim.address = outcome.address;
            sim.actual_next = Some(outcome.next_pc);
            sim.fault = outcome.fault;

            if sim.mispredicted() {
                debug!(
                    cycle = now,
                    tag = %done.tag,
                    predicted = sim.predicted_next,
                    actual = outcome.next_pc,
                    "branch mispredicted"
                );
            }
        }

        Ok(stages::Execute {
            completed: completions.len(),
        })
    }

    fn stage_issue(&mut self, now: u64) -> Result<stages::Issue, HaltReason> {
        let mut cx = IssueContext {
            prf: &self.prf,
            lsq: &self.lsq,
            mem: &self.arch.mem,
            cache: self.cache.as_mut(),
        };
        let (arena, prog) = (&self.arena, &self.prog);
        let issued = self.scheduler.issue(&mut cx, move |id| {
            let sim = &arena[id];
            (sim, &prog.insts[sim.code.0])
        })?;

        for i in &issued {
            self.rob.mark_executing(i.tag)?;
            let sim = &mut self.arena[i.sim];
            sim.status = Some(RobStatus::Executing);
            sim.issue_cycle = Some(now);
            trace!(cycle = now, tag = %i.tag, unit = i.unit, inst = %sim.assembly, "issue");
        }

        Ok(stages::Issue {
            issued: issued.len(),
        })
    }

    // Rename fetched instructions in order and allocate their ROB, window and
    // load/store entries. Stops at the first instruction that does not fit.
    fn stage_dispatch(&mut self, now: u64) -> Result<stages::Dispatch, HaltReason> {
        let mut out = stages::Dispatch::default();

        while let Some(&id) = self.fetch_decode.sims.front() {
            let code = &self.prog.insts[self.arena[id].code.0];
            let class = code.class();

            let space = if self.rob.is_full() {
                Err(ResourceStall::RobFull)
            } else if self.scheduler.is_full() {
                Err(ResourceStall::IssueWindowFull)
            } else {
                self.lsq.has_space(class)
            };

            let renamed = match space.and_then(|()| self.rat.rename(code)) {
                Ok(renamed) => renamed,
                Err(stall) => {
                    trace!(cycle = now, %stall, "dispatch stalled");
                    self.stats.stalls.record(stall);
                    out.stall = Some(stall);
                    break;
                }
            };

            let overflow = |stall: ResourceStall| InvariantViolation::ResourceOverflow { stall };
            let tag = self.rob.allocate(id).map_err(overflow)?;
            self.scheduler.insert(tag, id);
            match class {
                OpClass::Load => self.lsq.insert_load(tag).map_err(overflow)?,
                OpClass::Store => self
                    .lsq
                    .insert_store(tag, alu::access_width(code.mnemonic))
                    .map_err(overflow)?,
                _ => {}
            }

            let sim = &mut self.arena[id];
            sim.renamed = renamed;
            if let Some((_, phys, _)) = sim.dest() {
                self.prf.reserve(phys)?;
            }
            sim.tag = Some(tag);
            sim.status = Some(RobStatus::Allocated);
            sim.dispatch_cycle = Some(now);
            trace!(cycle = now, %tag, inst = %sim.assembly, "dispatch");

            self.fetch_decode.sims.pop_front();
            out.dispatched += 1;
        }

        self.stats.max_allocated_registers =
            self.stats.max_allocated_registers.max(self.prf.allocated());

        Ok(out)
    }

    // Fetch up to `fetch_width` instructions as one block, following the
    // predictor. Nothing is fetched while the previous block waits, or while
    // the front end refills after a squash.
    fn stage_fetch(&mut self, now: u64) -> stages::Fetch {
        if now < self.fetch_resume {
            self.stats.flush_penalty_cycles += 1;
            return stages::Fetch::default();
        }
        if !self.fetch_decode.sims.is_empty() {
            return stages::Fetch::default();
        }

        let block = self.next_block;
        let mut sims = Vec::new();
        let mut predicted_taken = false;

        while sims.len() < self.config.fetch_width {
            let pc = self.fetch_pc;
            let Some(code) = self.prog.fetch(pc) else {
                break;
            };

            let mut sim = SimCodeModel::new(SimId::default(), code.id, pc, block, now);
            sim.assembly = code.to_string();
            if code.is_control() {
                let prediction = self.predictor.predict(pc, code.is_conditional());
                if let Some(target) = prediction.target.filter(|_| prediction.taken) {
                    sim.predicted_next = target;
                }
                sim.prediction = Some(prediction);
            }

            let next = sim.predicted_next;
            let id = self.arena.push(sim);
            trace!(cycle = now, pc, id = id.0, "fetch");
            sims.push(id);
            self.fetch_decode.sims.push_back(id);
            self.fetch_pc = next;

            if next != pc.wrapping_add(INST_BYTES) {
                predicted_taken = true;
                break;
            }
        }

        let fetched = sims.len();
        if fetched > 0 {
            self.stats.fetched += fetched as u64;
            self.blocks.push_back(InstructionFetchBlock {
                id: block,
                cycle: now,
                sims,
                predicted_taken,
            });
            self.next_block = BlockId(block.0 + 1);
        }

        stages::Fetch { fetched }
    }

    // An in-flight instruction is speculative while an older control
    // transfer has not resolved to its predicted target.
    fn refresh_speculation(&mut self) {
        let mut unresolved = false;
        for sim in self.arena.iter_mut() {
            if sim.is_retired() {
                continue;
            }
            sim.speculative = unresolved;

            let control = self.prog.insts[sim.code.0].is_control();
            if control && (sim.actual_next.is_none() || sim.mispredicted()) {
                unresolved = true;
            }
        }
    }

    // Drop fetch blocks whose instructions have all retired, then the models
    // nothing refers to any more.
    fn prune(&mut self) {
        while let Some(front) = self.blocks.front() {
            let retired = front
                .sims
                .iter()
                .all(|&id| self.arena.get(id).map_or(true, SimCodeModel::is_retired));
            if !retired {
                break;
            }
            self.blocks.pop_front();
        }

        let keep = self
            .blocks
            .front()
            .and_then(|block| block.sims.first().copied())
            .unwrap_or_else(|| self.arena.next_id());
        self.arena.prune_before(keep);
    }
}
