use cpu::{Cpu, ExecResult};
use error::SimError;
use mem::MainMemory;
use program::Program;
use regs::RegSet;

pub mod alu;
pub mod branch;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod cpu;
pub mod emulated;
pub mod error;
pub mod execution_unit;
pub mod inst;
pub mod lsq;
pub mod mem;
pub mod model;
pub mod out_of_order;
pub mod program;
pub mod queue;
pub mod rat;
pub mod regs;
pub mod reservation_station;
pub mod rob;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod util;

/// Run `asm/{name}.asm` to completion on `C`.
pub fn parse_and_exec<C: Cpu>(
    name: &str,
    regs: RegSet,
    mem: MainMemory,
) -> Result<ExecResult, SimError> {
    let contents = std::fs::read_to_string(format!("asm/{}.asm", name))?;
    let prog = contents.parse::<Program>()?;
    C::new(prog, regs, mem)?.exec_all()
}
