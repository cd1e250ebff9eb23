use criterion::{Criterion, black_box, criterion_group, criterion_main};

use strata_nn::{Dataset, Network, StrategyKind};

fn network_compute_bench(c: &mut Criterion) {
    let mut net = Network::from_widths(&[128, 256, 256, 10], StrategyKind::rprop(), 0).unwrap();
    let input = vec![0.1_f64; net.input_width()];

    c.bench_function("network_compute_128_256_256_10", |b| {
        b.iter(|| {
            let class = net.compute(black_box(&input));
            black_box(class);
        })
    });
}

fn network_epoch_bench(c: &mut Criterion) {
    let input_width = 32;
    let rows = 256;
    let features = (0..rows * input_width)
        .map(|i| ((i % 13) as f64) * 0.05)
        .collect();
    let labels = (0..rows).map(|i| i % 4).collect();
    let data = Dataset::from_flat(features, labels, input_width).unwrap();

    for (name, strategy) in [
        ("rprop", StrategyKind::rprop()),
        ("adam", StrategyKind::adam()),
    ] {
        let mut net = Network::from_widths(&[input_width, 64, 4], strategy, 0).unwrap();
        net.set_halt(0.0);
        net.set_keep_alive(0);

        c.bench_function(&format!("network_epoch_{name}_32_64_4_x256"), |b| {
            b.iter(|| {
                let outcome = net.train_for(black_box(&data), 1).unwrap();
                black_box(outcome);
            })
        });
    }
}

criterion_group!(benches, network_compute_bench, network_epoch_bench);
criterion_main!(benches);
