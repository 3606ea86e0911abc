use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use gridsim::mna::{MnaConfig, MnaSystem};
use gridsim::*;

/// Resistor ladder: VS on node 1, `stages` series/shunt pairs down to ground
fn ladder(stages: usize) -> Vec<Component> {
    let mut components = vec![
        Component::new_voltage_source("VS1", 1, 0, 10.0),
        Component::new_ground("GND", 0),
    ];
    for i in 1..=stages {
        components.push(Component::new_resistor(format!("RS{}", i), i, i + 1, 100.0));
        components.push(Component::new_resistor(format!("RP{}", i), i + 1, 0, 1000.0));
    }
    components
}

fn bench_simple_circuit(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_circuit");

    let components = vec![
        Component::new_voltage_source("VS1", 1, 0, 5.0),
        Component::new_resistor("R1", 1, 2, 1000.0),
        Component::new_resistor("R2", 2, 0, 2000.0),
        Component::new_ground("GND", 0),
    ];

    group.bench_function("validate", |b| {
        b.iter(|| validate_circuit(&components));
    });

    group.bench_function("operating_point", |b| {
        b.iter(|| {
            let mut simulator = Simulator::new();
            simulator.solve(&components).unwrap()
        });
    });

    group.finish();
}

fn bench_ladder_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder");

    for stages in [10, 50, 100, 200].iter() {
        let components = ladder(*stages);

        group.bench_with_input(BenchmarkId::new("assemble", stages), &components, |b, components| {
            b.iter(|| MnaSystem::build(components, &MnaConfig::default()).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("solve", stages), &components, |b, components| {
            let mut simulator = Simulator::new();
            b.iter(|| simulator.solve(components).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simple_circuit, bench_ladder_sizes);
criterion_main!(benches);
