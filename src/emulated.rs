use crate::{
    alu,
    cpu::{Cpu, CpuState, ExecResult},
    error::{HaltReason, SimError},
    inst::{ArgRole, Operand},
    mem::MainMemory,
    program::Program,
    regs::RegSet,
};
use tracing::trace;

/// Instructions executed before giving up on a runaway program.
pub const STEP_LIMIT: u64 = 50_000_000;

/// Executes one instruction at a time in program order.
#[derive(Debug, Clone)]
pub struct Emulated {
    regs: RegSet,
    mem: MainMemory,
    prog: Program,
    pc: u32,
    cycles: u64,
    insts_retired: u64,
}

impl Cpu for Emulated {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Result<Self, SimError> {
        Ok(Self {
            regs,
            pc: 0,
            cycles: 0,
            insts_retired: 0,
            mem,
            prog,
        })
    }

    fn exec_all(mut self) -> Result<ExecResult, SimError> {
        while CpuState::Running == self.exec_one()? {
            if self.insts_retired >= STEP_LIMIT {
                return Err(SimError::StepLimit(STEP_LIMIT));
            }
        }

        Ok(ExecResult {
            mem: self.mem,
            regs: self.regs,
            cycles_taken: self.cycles,
            insts_retired: self.insts_retired,
        })
    }
}

impl Emulated {
    fn exec_one(&mut self) -> Result<CpuState, SimError> {
        let inst = match self.prog.fetch(self.pc) {
            Some(i) => i,
            None => return Ok(CpuState::Stopped),
        };

        let (mut a, mut b, mut imm, mut target) = (0, 0, 0, None);
        for arg in &inst.args {
            match (&arg.operand, arg.role) {
                (Operand::Register { reg }, ArgRole::Rs1) => a = self.regs.get(*reg),
                (Operand::Register { reg }, ArgRole::Rs2) => b = self.regs.get(*reg),
                (Operand::Memory { offset, base }, _) => {
                    a = self.regs.get(*base);
                    imm = *offset;
                }
                (Operand::Immediate { value }, _) => imm = *value,
                (Operand::Target { pc, .. }, _) => target = Some(*pc),
                _ => {}
            }
        }

        let m = inst.mnemonic;
        let fault = |fault| {
            SimError::Halted(HaltReason::MemoryFault {
                pc: self.pc,
                fault,
            })
        };

        let value = if inst.is_load() {
            let raw = self
                .mem
                .read(alu::effective_address(a, imm), alu::access_width(m))
                .map_err(fault)?;
            alu::extend_load(m, raw)
        } else if inst.is_store() {
            self.mem
                .write(alu::effective_address(a, imm), alu::access_width(m), b)
                .map_err(fault)?;
            0
        } else {
            alu::alu(m, a, b, imm, self.pc)
        };

        if let Some(rd) = inst.dest() {
            self.regs.set(rd, value);
        }

        trace!(pc = self.pc, inst = %inst, value, "emulated");

        self.pc = alu::next_pc(m, a, b, imm, self.pc, target);
        self.insts_retired += 1;
        self.cycles += inst.class().nominal_latency();

        Ok(CpuState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inst::ArchReg, util::Addr};

    fn run(src: &str) -> Result<ExecResult, SimError> {
        Emulated::new(src.parse().unwrap(), RegSet::new(), MainMemory::new())?.exec_all()
    }

    #[test]
    fn test_call_and_return() {
        let res = run("
                li a0, 5
                jal ra, double
                j end
            double:
                add a0, a0, a0
                ret
            end:
        ")
        .unwrap();

        assert_eq!(res.regs.get(ArchReg::A0), 10);
        assert_eq!(res.regs.get(ArchReg::Ra), 8);
        assert_eq!(res.insts_retired, 5);
    }

    #[test]
    fn test_memory() {
        let res = run("
                li t0, -2
                sh t0, 6(zero)
                lhu a0, 6(zero)
                lh a1, 6(zero)
                lbu a2, 7(zero)
        ")
        .unwrap();

        assert_eq!(res.regs.get(ArchReg::A0), 0xfffe);
        assert_eq!(res.regs.get(ArchReg::A1), u32::MAX - 1);
        assert_eq!(res.regs.get(ArchReg::A2), 0xff);
        assert_eq!(res.mem.readw(Addr(4)), 0xfffe_0000);
    }

    #[test]
    fn test_fault() {
        let err = run("li t0, 0x7fffffff\nlw a0, 0(t0)").unwrap_err();
        assert!(matches!(
            err,
            SimError::Halted(HaltReason::MemoryFault { pc: 4, .. })
        ));
    }
}
