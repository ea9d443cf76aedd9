use criterion::{black_box, criterion_group, AxisScale, BenchmarkId, Criterion, PlotConfiguration};
use netmatch::passes::dsp::DspMatcher;
use netmatch::passes::infer_dsp;

use super::generators::make_mul_add_stages;

fn bench_match_only(c: &mut Criterion) {
    let mut g = c.benchmark_group("match the DSP pattern");
    g.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for size in [10, 100, 1_000] {
        g.bench_with_input(BenchmarkId::new("match_only", size), &size, |b, size| {
            let module = make_mul_add_stages(*size);
            b.iter(|| {
                let mut module = module.clone();
                let cells = module.cell_ids();
                let mut matcher = DspMatcher::new(&mut module, &cells);
                black_box(matcher.run(|_| {}))
            })
        });
    }
    g.finish();
}

fn bench_infer_dsp(c: &mut Criterion) {
    let mut g = c.benchmark_group("infer DSP cells");
    g.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for size in [10, 100, 1_000] {
        g.bench_with_input(BenchmarkId::new("infer_dsp", size), &size, |b, size| {
            let module = make_mul_add_stages(*size);
            b.iter(|| {
                let mut module = module.clone();
                black_box(infer_dsp(&mut module))
            })
        });
    }
    g.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        bench_match_only,
        bench_infer_dsp,
}
