use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use sn_sweep::prelude::*;
use sn_sweep::topology::meshgen::orthogonal_grid;

fn problem(mesh: &PartitionedMesh) -> TransportProblem {
    TransportProblem::uniform(mesh, 4, 1.0, 1.0, (0..4).map(|b| (b, BoundaryCondition::Vacuum)))
}

fn bench_serial_grid(c: &mut Criterion) {
    let q = Quadrature::product(16, 4).unwrap();
    let mut group = c.benchmark_group("sweep_all_serial");
    for &n in &[16usize, 32, 64] {
        let mesh = orthogonal_grid(n, n, 1.0, 1.0, 1, |_, _| 0).unwrap().remove(0);
        let mut s =
            SweepScheduler::new(&mesh, &q, problem(&mesh), StepKernel, SweepConfig::default(), &NoComm)
                .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| s.sweep_all(&NoComm).unwrap())
        });
    }
    group.finish();
}

fn bench_threaded_grid(c: &mut Criterion) {
    let q = Quadrature::product(8, 2).unwrap();
    let n = 32;
    let mut group = c.benchmark_group("sweep_all_threads");
    for &ranks in &[2usize, 4] {
        let parts = orthogonal_grid(n, n, 1.0, 1.0, ranks, |i, _| i * ranks / n).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(ranks), &ranks, |b, _| {
            b.iter(|| {
                let world = RayonComm::world(ranks);
                std::thread::scope(|s| {
                    for (mesh, comm) in parts.iter().zip(&world) {
                        let q = &q;
                        s.spawn(move || {
                            let mut sched = SweepScheduler::new(
                                mesh,
                                q,
                                problem(mesh),
                                StepKernel,
                                SweepConfig::default(),
                                comm,
                            )
                            .unwrap();
                            sched.sweep_all(comm).unwrap();
                        });
                    }
                });
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_serial_grid, bench_threaded_grid);
criterion_main!(benches);
