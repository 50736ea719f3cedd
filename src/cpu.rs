use crate::{error::SimError, mem::MainMemory, program::Program, regs::RegSet};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CpuState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub mem: MainMemory,
    pub regs: RegSet,
    pub cycles_taken: u64,
    pub insts_retired: u64,
}

pub trait Cpu: Sized {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Result<Self, SimError>;

    fn exec_all(self) -> Result<ExecResult, SimError>;
}
