use crate::{
    alu,
    config::UnitConfig,
    error::MemoryFault,
    inst::{Mnemonic, OpClass, Pc},
    model::SimId,
    util::{Addr, Tag},
};
use serde::Serialize;

/// Operand values captured when an instruction issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub mnemonic: Mnemonic,
    /// `rs1`, or the base register of a memory operand.
    pub a: u32,
    pub b: u32,
    pub imm: i32,
    pub pc: Pc,
    pub target: Option<Pc>,
    /// Raw value for loads, resolved at issue from a forwarding store or memory.
    pub loaded: Option<Result<u32, MemoryFault>>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Destination value; the data to write for stores.
    pub value: u32,
    pub next_pc: Pc,
    pub address: Option<Addr>,
    pub fault: Option<MemoryFault>,
}

impl Operation {
    pub fn class(&self) -> OpClass {
        self.mnemonic.class()
    }

    pub fn address(&self) -> Addr {
        alu::effective_address(self.a, self.imm)
    }

    pub fn execute(&self) -> Outcome {
        let next_pc = alu::next_pc(self.mnemonic, self.a, self.b, self.imm, self.pc, self.target);

        match self.class() {
            OpClass::Load => {
                let (value, fault) = match self.loaded {
                    Some(Ok(raw)) => (alu::extend_load(self.mnemonic, raw), None),
                    Some(Err(fault)) => (0, Some(fault)),
                    None => (0, None),
                };

                Outcome {
                    value,
                    next_pc,
                    address: Some(self.address()),
                    fault,
                }
            }
            OpClass::Store => Outcome {
                value: self.b,
                next_pc,
                address: Some(self.address()),
                fault: None,
            },
            _ => Outcome {
                value: alu::alu(self.mnemonic, self.a, self.b, self.imm, self.pc),
                next_pc,
                address: None,
                fault: None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub sim: SimId,
    pub tag: Tag,
    pub remaining: u64,
    pub op: Operation,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub sim: SimId,
    pub tag: Tag,
    pub outcome: Outcome,
}

/// A functional unit. Holds one operation for its whole latency.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    pub name: String,
    pub classes: Vec<OpClass>,
    pub latency: u64,
    pub busy_cycles: u64,
    job: Option<Job>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub name: String,
    pub busy_with: Option<Tag>,
    pub remaining: u64,
    pub busy_cycles: u64,
}

impl ExecutionUnit {
    pub fn new(config: &UnitConfig) -> Self {
        Self {
            name: config.name.clone(),
            classes: config.classes.clone(),
            latency: config.latency,
            busy_cycles: 0,
            job: None,
        }
    }

    pub fn can_accept(&self, class: OpClass) -> bool {
        self.job.is_none() && self.classes.contains(&class)
    }

    /// Start `op`. `delay` extra cycles are added to the unit latency, as when
    /// a load waits on the data cache.
    pub fn begin_execute(&mut self, sim: SimId, tag: Tag, op: Operation, delay: u64) {
        debug_assert!(self.can_accept(op.class()));
        self.job = Some(Job {
            sim,
            tag,
            remaining: self.latency + delay,
            op,
        });
    }

    pub fn busy_with(&self) -> Option<Tag> {
        self.job.as_ref().map(|job| job.tag)
    }

    /// Advance one cycle; yields the result once the latency has elapsed.
    pub fn advance(&mut self) -> Option<Completion> {
        let job = self.job.as_mut()?;
        self.busy_cycles += 1;
        job.remaining = job.remaining.saturating_sub(1);

        if job.remaining > 0 {
            return None;
        }

        self.job.take().map(|job| Completion {
            sim: job.sim,
            tag: job.tag,
            outcome: job.op.execute(),
        })
    }

    pub fn squash_from(&mut self, tag: Tag) {
        if self.job.as_ref().map_or(false, |job| job.tag >= tag) {
            self.job = None;
        }
    }

    pub fn view(&self) -> UnitView {
        UnitView {
            name: self.name.clone(),
            busy_with: self.busy_with(),
            remaining: self.job.as_ref().map_or(0, |job| job.remaining),
            busy_cycles: self.busy_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(mnemonic: Mnemonic, a: u32, b: u32, imm: i32) -> Operation {
        Operation {
            mnemonic,
            a,
            b,
            imm,
            pc: 8,
            target: Some(0),
            loaded: None,
        }
    }

    #[test]
    fn test_latency() {
        let mut mul = ExecutionUnit::new(&UnitConfig::new("mul", &[OpClass::Mul], 3));
        assert!(!mul.can_accept(OpClass::Alu));
        mul.begin_execute(SimId(0), Tag(0), op(Mnemonic::Mul, 6, 7, 0), 0);
        assert!(!mul.can_accept(OpClass::Mul));

        assert!(mul.advance().is_none());
        assert!(mul.advance().is_none());
        let done = mul.advance().unwrap();
        assert_eq!(done.outcome.value, 42);
        assert_eq!(done.outcome.next_pc, 12);
        assert!(mul.can_accept(OpClass::Mul));
        assert!(mul.advance().is_none());
        assert_eq!(mul.busy_cycles, 3);
    }

    #[test]
    fn test_outcomes() {
        let beq = op(Mnemonic::Beq, 1, 1, 0).execute();
        assert_eq!(beq.next_pc, 0);

        let sw = op(Mnemonic::Sw, 100, 5, -4).execute();
        assert_eq!((sw.value, sw.address), (5, Some(Addr(96))));

        let fault = MemoryFault {
            address: Addr(1 << 20),
            width: 1,
        };
        let lb = Operation {
            loaded: Some(Ok(0xfe)),
            ..op(Mnemonic::Lb, 0, 0, 0)
        };
        assert_eq!(lb.execute().value, u32::MAX - 1);
        let bad = Operation {
            loaded: Some(Err(fault)),
            ..op(Mnemonic::Lbu, 0, 0, 0)
        };
        assert_eq!(bad.execute().fault, Some(fault));
    }

    #[test]
    fn test_extra_delay() {
        let mut lsu = ExecutionUnit::new(&UnitConfig::new("lsu", &[OpClass::Load], 1));
        let load = Operation {
            loaded: Some(Ok(9)),
            ..op(Mnemonic::Lw, 0, 0, 0)
        };
        lsu.begin_execute(SimId(0), Tag(0), load, 2);
        assert_eq!(lsu.view().remaining, 3);

        assert!(lsu.advance().is_none());
        assert!(lsu.advance().is_none());
        assert_eq!(lsu.advance().map(|done| done.outcome.value), Some(9));
        assert_eq!(lsu.busy_cycles, 3);
    }

    #[test]
    fn test_kill() {
        let mut alu = ExecutionUnit::new(&UnitConfig::new("alu", &[OpClass::Alu], 1));
        alu.begin_execute(SimId(4), Tag(4), op(Mnemonic::Add, 1, 2, 0), 0);
        alu.squash_from(Tag(5));
        assert_eq!(alu.busy_with(), Some(Tag(4)));
        alu.squash_from(Tag(4));
        assert!(alu.advance().is_none());
        assert_eq!(alu.busy_cycles, 0);
    }
}
