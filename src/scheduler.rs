use crate::{
    alu,
    cache::Cache,
    config::CpuConfig,
    error::InvariantViolation,
    execution_unit::{Completion, ExecutionUnit, Operation, UnitView},
    inst::{ArgRole, InputCodeModel},
    lsq::{LoadSource, LoadStoreQueue},
    mem::MainMemory,
    model::{Binding, SimCodeModel, SimId},
    regs::PhysRegFile,
    reservation_station::ReservationStation,
    util::Tag,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Issued {
    pub sim: SimId,
    pub tag: Tag,
    pub unit: usize,
}

/// State consulted when selecting instructions. Only the cache changes, as
/// issued loads read through it.
pub struct IssueContext<'a> {
    pub prf: &'a PhysRegFile,
    pub lsq: &'a LoadStoreQueue,
    pub mem: &'a MainMemory,
    pub cache: Option<&'a mut Cache>,
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    window: ReservationStation,
    units: Vec<ExecutionUnit>,
}

impl Scheduler {
    pub fn new(config: &CpuConfig) -> Self {
        Self {
            window: ReservationStation::new(config.window_size),
            units: config.units.iter().map(ExecutionUnit::new).collect(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }

    pub fn insert(&mut self, tag: Tag, sim: SimId) {
        self.window.insert(tag, sim);
    }

    pub fn window(&self) -> impl Iterator<Item = (Tag, SimId)> + '_ {
        self.window.iter()
    }

    pub fn units(&self) -> &[ExecutionUnit] {
        &self.units
    }

    pub fn unit_views(&self) -> Vec<UnitView> {
        self.units.iter().map(ExecutionUnit::view).collect()
    }

    /// Start every ready instruction that finds a free compatible unit,
    /// oldest first. `lookup` maps a window entry to its model and code.
    pub fn issue<'m, F>(
        &mut self,
        cx: &mut IssueContext,
        mut lookup: F,
    ) -> Result<Vec<Issued>, InvariantViolation>
    where
        F: FnMut(SimId) -> (&'m SimCodeModel, &'m InputCodeModel),
    {
        let mut issued = Vec::new();
        let candidates = self.window.iter().collect::<Vec<_>>();

        for (tag, id) in candidates {
            let (sim, code) = lookup(id);
            if !sim.source_regs().all(|p| cx.prf.is_ready(p)) {
                continue;
            }

            let class = code.class();
            let Some(unit) = self.units.iter().position(|u| u.can_accept(class)) else {
                continue;
            };

            let mut op = Self::gather(sim, code, cx.prf)?;
            let mut delay = 0;
            if code.is_load() {
                let width = alu::access_width(code.mnemonic);
                let addr = op.address();
                op.loaded = match cx.lsq.load_source(tag, addr, width) {
                    LoadSource::Blocked => continue,
                    LoadSource::Forward(val) => Some(Ok(val)),
                    LoadSource::Memory => {
                        let loaded = cx.mem.read(addr, width);
                        if let (Ok(_), Some(cache)) = (&loaded, cx.cache.as_deref_mut()) {
                            delay = cache.load(addr, width);
                        }
                        Some(loaded)
                    }
                };
            }

            self.units[unit].begin_execute(id, tag, op, delay);
            self.window.remove(tag);
            issued.push(Issued { sim: id, tag, unit });
        }

        Ok(issued)
    }

    fn gather(
        sim: &SimCodeModel,
        code: &InputCodeModel,
        prf: &PhysRegFile,
    ) -> Result<Operation, InvariantViolation> {
        let mut op = Operation {
            mnemonic: code.mnemonic,
            a: 0,
            b: 0,
            imm: 0,
            pc: sim.pc,
            target: None,
            loaded: None,
        };

        for arg in &sim.renamed {
            match (arg.role, arg.binding) {
                (ArgRole::Rs1, Binding::Phys { reg }) => op.a = prf.read(reg)?,
                (ArgRole::Rs2, Binding::Phys { reg }) => op.b = prf.read(reg)?,
                (_, Binding::Mem { base, offset }) => {
                    op.a = base.map(|reg| prf.read(reg)).transpose()?.unwrap_or(0);
                    op.imm = offset;
                }
                (_, Binding::Imm { value }) => op.imm = value,
                (_, Binding::Target { pc }) => op.target = Some(pc),
                _ => {}
            }
        }

        Ok(op)
    }

    /// Advance every unit by one cycle. Results come back oldest first.
    pub fn execute(&mut self) -> Vec<Completion> {
        let mut done = self
            .units
            .iter_mut()
            .filter_map(ExecutionUnit::advance)
            .collect::<Vec<_>>();
        done.sort_by_key(|c| c.tag);
        done
    }

    /// Drop `tag` and everything younger from the window and the units.
    pub fn squash_from(&mut self, tag: Tag) -> Vec<SimId> {
        for unit in &mut self.units {
            unit.squash_from(tag);
        }
        self.window.squash_from(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::UnitConfig,
        inst::{CodeId, OpClass},
        model::{BlockId, RenamedArgument},
        rat::RegisterAliasTable,
        regs::RegSet,
    };

    struct Fixture {
        codes: Vec<InputCodeModel>,
        sims: Vec<SimCodeModel>,
        rat: RegisterAliasTable,
        prf: PhysRegFile,
    }

    impl Fixture {
        fn new(regs: RegSet) -> Self {
            Self {
                codes: vec![],
                sims: vec![],
                rat: RegisterAliasTable::new(40),
                prf: PhysRegFile::new(40, &regs),
            }
        }

        fn add(&mut self, text: &str) -> (Tag, SimId) {
            let i = self.sims.len();
            let code = InputCodeModel::decode(text, CodeId(i), i + 1).unwrap();
            let mut sim = SimCodeModel::new(SimId(i as u64), code.id, 4 * i as u32, BlockId(0), 1);
            sim.renamed = self.rat.rename(&code).unwrap();
            if let Some((_, phys, _)) = sim.dest() {
                self.prf.reserve(phys).unwrap();
            }
            self.codes.push(code);
            self.sims.push(sim);
            (Tag(i as u64), SimId(i as u64))
        }

        fn dest(&self, i: usize) -> RenamedArgument {
            self.sims[i].renamed[0]
        }
    }

    fn config(units: Vec<UnitConfig>) -> CpuConfig {
        CpuConfig {
            units,
            ..Default::default()
        }
    }

    #[test]
    fn test_waits_for_operands_and_units() {
        let mut fx = Fixture::new(RegSet::from([(crate::inst::ArchReg::A1, 4)]));
        let mut sched = Scheduler::new(&config(vec![UnitConfig::new("alu", &[OpClass::Alu], 1)]));

        for text in ["addi a0, a1, 1", "add a2, a0, a0", "addi a3, a1, 2"] {
            let (tag, id) = fx.add(text);
            sched.insert(tag, id);
        }

        let lsq = LoadStoreQueue::new(1, 1);
        let mem = MainMemory::with_size(16);
        let mut cx = IssueContext {
            prf: &fx.prf,
            lsq: &lsq,
            mem: &mem,
            cache: None,
        };

        // One unit: only the oldest ready instruction goes.
        let issued = sched
            .issue(&mut cx, |id| (&fx.sims[id.0 as usize], &fx.codes[id.0 as usize]))
            .unwrap();
        assert_eq!(issued.iter().map(|i| i.tag).collect::<Vec<_>>(), vec![Tag(0)]);

        let done = sched.execute();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].outcome.value, 5);
        let Binding::Dest { phys, .. } = fx.dest(0).binding else {
            panic!("expected a destination");
        };

        // `add` still waits on a0, so the younger independent op issues.
        let issued = sched
            .issue(&mut cx, |id| (&fx.sims[id.0 as usize], &fx.codes[id.0 as usize]))
            .unwrap();
        assert_eq!(issued.iter().map(|i| i.tag).collect::<Vec<_>>(), vec![Tag(2)]);
        assert!(!fx.prf.is_ready(phys));
        assert_eq!(sched.window().count(), 1);
    }

    #[test]
    fn test_load_blocked_by_unknown_store() {
        let mut fx = Fixture::new(RegSet::new());
        let mut sched = Scheduler::new(&config(vec![
            UnitConfig::new("lsu0", &[OpClass::Load, OpClass::Store], 2),
            UnitConfig::new("lsu1", &[OpClass::Load, OpClass::Store], 2),
        ]));
        let mut lsq = LoadStoreQueue::new(2, 2);

        let (st, _) = fx.add("sw zero, 0(zero)");
        let (ld, ld_id) = fx.add("lw a0, 8(zero)");
        lsq.insert_store(st, 4).unwrap();
        lsq.insert_load(ld).unwrap();
        sched.insert(ld, ld_id);

        let mem = MainMemory::with_size(16);
        let mut cx = IssueContext {
            prf: &fx.prf,
            lsq: &lsq,
            mem: &mem,
            cache: None,
        };
        let issued = sched
            .issue(&mut cx, |id| (&fx.sims[id.0 as usize], &fx.codes[id.0 as usize]))
            .unwrap();
        assert!(issued.is_empty());

        lsq.store_executed(st, crate::util::Addr(0), 0).unwrap();
        let mut cx = IssueContext {
            prf: &fx.prf,
            lsq: &lsq,
            mem: &mem,
            cache: None,
        };
        let issued = sched
            .issue(&mut cx, |id| (&fx.sims[id.0 as usize], &fx.codes[id.0 as usize]))
            .unwrap();
        assert_eq!(issued, vec![Issued { sim: ld_id, tag: ld, unit: 0 }]);

        assert_eq!(sched.squash_from(Tag(0)), Vec::<SimId>::new());
        assert!(sched.units()[0].busy_with().is_none());
    }
}
