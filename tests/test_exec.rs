use superscalar::{
    config::CpuConfig,
    cpu::{Cpu, ExecResult},
    emulated::Emulated,
    error::{HaltReason, SimError},
    inst::ArchReg,
    mem::MainMemory,
    out_of_order::OutOfOrder,
    parse_and_exec,
    program::Program,
    regs::RegSet,
    util::Addr,
};

/// The out-of-order core squeezed down to one instruction per cycle and
/// almost no spare registers, so every structure fills up.
struct Narrow(OutOfOrder);

impl Cpu for Narrow {
    fn new(prog: Program, regs: RegSet, mem: MainMemory) -> Result<Self, SimError> {
        let config = CpuConfig {
            fetch_width: 1,
            commit_width: 1,
            rob_size: 4,
            phys_regs: 34,
            window_size: 2,
            load_buffer_size: 1,
            store_buffer_size: 1,
            ..Default::default()
        };
        OutOfOrder::with_config(prog, regs, mem, config).map(Narrow)
    }

    fn exec_all(self) -> Result<ExecResult, SimError> {
        self.0.exec_all()
    }
}

fn exec_src<C: Cpu>(src: &str) -> Result<ExecResult, SimError> {
    C::new(src.parse()?, RegSet::new(), MainMemory::new())?.exec_all()
}

#[generic_tests::define]
mod t {
    use super::*;

    #[test]
    fn test_loop<C: Cpu>() {
        let initial_regs = RegSet::from([
            (ArchReg::A0, 0),
            (ArchReg::A1, 40),
            (ArchReg::A2, 80),
            (ArchReg::A3, 10),
        ]);

        let mut initial_mem = MainMemory::new();
        for i in 0..10 {
            initial_mem.writew(Addr(40 + i * 4), i);
            initial_mem.writew(Addr(80 + i * 4), 10 - i);
        }

        let res = parse_and_exec::<C>("loop", initial_regs, initial_mem).unwrap();

        for i in 0..10 {
            assert_eq!(res.mem.readw(Addr(i * 4)), 10);
        }
        assert_eq!(res.insts_retired, 90);
    }

    #[test]
    fn test_label<C: Cpu>() {
        let res = parse_and_exec::<C>("label", RegSet::new(), MainMemory::new()).unwrap();
        for i in 0..10 {
            assert_eq!(res.mem.readw(Addr(i * 4)), 0);
        }

        assert_eq!(res.regs.get(ArchReg::T0), 1);
        assert_eq!(res.regs.get(ArchReg::T3), 6);
        assert_eq!(res.insts_retired, 7);
    }

    #[test]
    fn test_branch<C: Cpu>() {
        let res = parse_and_exec::<C>("branch", RegSet::new(), MainMemory::new()).unwrap();
        assert_eq!(res.mem.readw(Addr(0)), 4);
        assert_eq!(res.mem.readw(Addr(4)), 3);
        assert_eq!(res.mem.readw(Addr(8)), 2);
    }

    #[test]
    fn test_hazard_raw<C: Cpu>() {
        let res = parse_and_exec::<C>("hazard_raw", RegSet::new(), MainMemory::new()).unwrap();
        assert_eq!(res.mem.readw(Addr(0)), 3);
        assert_eq!(res.mem.readw(Addr(4)), 1);
        assert_eq!(res.mem.readw(Addr(8)), 1);
    }

    #[test]
    fn test_hazard_war<C: Cpu>() {
        let res = parse_and_exec::<C>("hazard_war", RegSet::new(), MainMemory::new()).unwrap();
        assert_eq!(res.mem.readw(Addr(0)), 1);
        assert_eq!(res.mem.readw(Addr(4)), 2);
        assert_eq!(res.regs.get(ArchReg::T0), 7);
    }

    #[test]
    fn test_hazard_waw<C: Cpu>() {
        let res = parse_and_exec::<C>("hazard_waw", RegSet::new(), MainMemory::new()).unwrap();
        assert_eq!(res.mem.readw(Addr(0)), 2);
        assert_eq!(res.mem.readw(Addr(4)), 2);
        assert_eq!(res.regs.get(ArchReg::T0), 2);
    }

    #[test]
    fn test_prime<C: Cpu>() {
        let run = |x| {
            parse_and_exec::<C>("prime", RegSet::from([(ArchReg::A0, x)]), MainMemory::new())
                .unwrap()
                .regs
                .get(ArchReg::A0)
        };

        assert_eq!(run(2), 1);
        assert_eq!(run(3), 1);
        assert_eq!(run(4), 0);
        assert_eq!(run(5), 1);
        assert_eq!(run(10), 0);
        assert_eq!(run(100), 0);
        assert_eq!(run(293), 1);
    }

    #[test]
    fn test_matmul<C: Cpu>() {
        let run = |dim| {
            let mem = parse_and_exec::<C>(
                "matmul",
                RegSet::from([(ArchReg::A0, 0), (ArchReg::A1, dim)]),
                MainMemory::new(),
            )
            .unwrap()
            .mem;

            for i in 0..dim {
                for j in 0..dim {
                    let c_start = 2 * (4 * dim * dim);
                    let val = if i == j { 1 } else { 0 };
                    assert_eq!(mem.readw(Addr(c_start + 4 * (j * dim + i))), val);
                }
            }
        };

        run(1);
        run(2);
        run(4);
        run(9);
    }

    #[test]
    fn test_call<C: Cpu>() {
        let res = parse_and_exec::<C>("call", RegSet::from([(ArchReg::A0, 10)]), MainMemory::new())
            .unwrap();
        assert_eq!(res.regs.get(ArchReg::A0), 55);
        assert_eq!(res.regs.get(ArchReg::Sp), 4096);
    }

    #[test]
    fn test_memory<C: Cpu>() {
        let res = parse_and_exec::<C>("memory", RegSet::new(), MainMemory::new()).unwrap();
        assert_eq!(res.regs.get(ArchReg::T1), 0x44);
        assert_eq!(res.regs.get(ArchReg::T2), 0x1122);
        assert_eq!(res.regs.get(ArchReg::T4), 0x1122_ff44);
        assert_eq!(res.regs.get(ArchReg::T5), u32::MAX);
        assert_eq!(res.mem.readw(Addr(4)), 0x1122);
        assert_eq!(res.mem.readw(Addr(8)), 0x1122_ff44);
    }

    #[test]
    fn test_muldiv<C: Cpu>() {
        let res = parse_and_exec::<C>("muldiv", RegSet::new(), MainMemory::new()).unwrap();
        let get = |r| res.regs.get(r) as i32;
        assert_eq!(get(ArchReg::A0), -14);
        assert_eq!(get(ArchReg::A1), -3);
        assert_eq!(get(ArchReg::A2), -1);
        assert_eq!(res.regs.get(ArchReg::A3), 0x7fff_fffc);
        assert_eq!(get(ArchReg::A4), -1);
        assert_eq!(get(ArchReg::A5), -7);
        assert_eq!(get(ArchReg::A6), -1);
        assert_eq!(get(ArchReg::A7), 1);
    }

    #[test]
    fn test_zero_register<C: Cpu>() {
        let res = exec_src::<C>("li zero, 5\naddi a0, zero, 1\nlw zero, 0(zero)").unwrap();
        assert_eq!(res.regs.get(ArchReg::Zero), 0);
        assert_eq!(res.regs.get(ArchReg::A0), 1);
    }

    #[test]
    fn test_fault<C: Cpu>() {
        let err = exec_src::<C>("li t1, 0x7ffffff0\nlw a0, 0(t1)\nli a1, 1").unwrap_err();
        let SimError::Halted(HaltReason::MemoryFault { pc, fault }) = err else {
            panic!("expected a memory fault, got {err}");
        };
        assert_eq!(pc, 4);
        assert_eq!(fault.address, Addr(0x7fff_fff0));

        let err = exec_src::<C>("li t1, -4\nsw t1, 0(t1)").unwrap_err();
        assert!(matches!(
            err,
            SimError::Halted(HaltReason::MemoryFault { pc: 4, .. })
        ));
    }

    #[instantiate_tests(<Emulated>)]
    mod emulated {}

    #[instantiate_tests(<OutOfOrder>)]
    mod out_of_order {}

    #[instantiate_tests(<Narrow>)]
    mod narrow {}
}

#[cfg(test)]
mod cosim {
    use super::*;

    fn run<C: Cpu>(name: &str, regs: &RegSet) -> ExecResult {
        parse_and_exec::<C>(name, regs.clone(), MainMemory::new()).unwrap()
    }

    #[test]
    fn test_same_architectural_result() {
        let cases = [
            ("prime", RegSet::from([(ArchReg::A0, 97)])),
            ("call", RegSet::from([(ArchReg::A0, 20)])),
            ("matmul", RegSet::from([(ArchReg::A0, 64), (ArchReg::A1, 5)])),
            ("memory", RegSet::new()),
            ("branch", RegSet::new()),
        ];

        for (name, regs) in &cases {
            let golden = run::<Emulated>(name, regs);
            let ooo = run::<OutOfOrder>(name, regs);
            let narrow = run::<Narrow>(name, regs);

            assert_eq!(golden.regs, ooo.regs, "{name}: registers differ");
            assert!(golden.mem == ooo.mem, "{name}: memory differs");
            assert_eq!(golden.insts_retired, ooo.insts_retired, "{name}");
            assert_eq!(golden.regs, narrow.regs, "{name}: registers differ (narrow)");
            assert!(golden.mem == narrow.mem, "{name}: memory differs (narrow)");
        }
    }
}
