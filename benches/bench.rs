use criterion::{black_box, criterion_group, criterion_main, Criterion};
use superscalar::{
    cpu::Cpu, inst::ArchReg, mem::MainMemory, out_of_order::OutOfOrder, parse_and_exec,
    regs::RegSet,
};

type CpuType = OutOfOrder;

fn is_prime<C: Cpu>(x: u32) -> bool {
    parse_and_exec::<C>("prime", RegSet::from([(ArchReg::A0, x)]), MainMemory::new())
        .map_or(false, |res| res.regs.get(ArchReg::A0) == 1)
}

fn matmul<C: Cpu>(dim: u32) -> u64 {
    parse_and_exec::<C>(
        "matmul",
        RegSet::from([(ArchReg::A0, 0), (ArchReg::A1, dim)]),
        MainMemory::new(),
    )
    .map_or(0, |res| res.cycles_taken)
}

fn primes_large(c: &mut Criterion) {
    let mut group = c.benchmark_group("primes_large");
    group.sample_size(10);
    group.bench_function("prime 2946901", |b| {
        b.iter(|| is_prime::<CpuType>(black_box(2946901)))
    });
    group.finish();
}

fn matmul_small(c: &mut Criterion) {
    c.bench_function("matmul 6x6", |b| b.iter(|| matmul::<CpuType>(black_box(6))));
}

criterion_group!(benches, primes_large, matmul_small);
criterion_main!(benches);
