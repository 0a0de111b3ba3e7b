use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use wardendns::algs::ar1::Ar1Params;
use wardendns::algs::bind::BindParams;
use wardendns::algs::{Params, State};
use wardendns::question::Rcode;

const SERVER_COUNTS: [usize; 3] = [4, 16, 64];

fn servers(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("10.0.0.{i}")).collect()
}

fn warm_up(state: &State, servers: &[String]) {
    for s in servers {
        state.add(s);
    }
    for (i, s) in servers.iter().enumerate() {
        let rtime = 0.01 + (i as f64) * 0.001;
        state.observe(s, rtime, Rcode::NoError, servers);
    }
}

fn bench_observe(c: &mut Criterion) {
    let mut group = c.benchmark_group("observe");
    for &n in &SERVER_COUNTS {
        let servers = servers(n);

        let bind = State::new(&Params::Bind(BindParams::default()));
        warm_up(&bind, &servers);
        group.bench_with_input(BenchmarkId::new("bind", n), &n, |b, _| {
            b.iter(|| bind.observe(black_box(&servers[0]), black_box(0.012), Rcode::NoError, &servers));
        });

        let bmod = State::new(&Params::Bmod(BindParams::default()));
        warm_up(&bmod, &servers);
        group.bench_with_input(BenchmarkId::new("bmod", n), &n, |b, _| {
            b.iter(|| bmod.observe(black_box(&servers[0]), black_box(0.012), Rcode::NoError, &servers));
        });

        let ar1 = State::new(&Params::Ar1(Ar1Params::default()));
        warm_up(&ar1, &servers);
        group.bench_with_input(BenchmarkId::new("ar1", n), &n, |b, _| {
            b.iter(|| ar1.observe(black_box(&servers[0]), black_box(0.012), Rcode::NoError, &servers));
        });
    }
    group.finish();
}

fn bench_ranked(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranked");
    for &n in &SERVER_COUNTS {
        let servers = servers(n);

        let bind = State::new(&Params::Bind(BindParams::default()));
        warm_up(&bind, &servers);
        group.bench_with_input(BenchmarkId::new("bind", n), &n, |b, _| {
            b.iter(|| black_box(bind.ranked(black_box(&servers))));
        });

        let ar1 = State::new(&Params::Ar1(Ar1Params::default()));
        warm_up(&ar1, &servers);
        group.bench_with_input(BenchmarkId::new("ar1", n), &n, |b, _| {
            b.iter(|| black_box(ar1.ranked(black_box(&servers))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_observe, bench_ranked);
criterion_main!(benches);
