use criterion::Criterion;

use elutionfit::mixture::{ElutionTrace, FitConfig, MixtureParameters, ParameterBounds, fit_mixture};
use elutionfit::pipeline::{fit_samples, DeconvolutionConfig, ElutionTable, SampleColumn};
use elutionfit::{CurveConfig, DenseCurve};


fn reference_trace() -> ElutionTrace<'static> {
    let truth = MixtureParameters::new(-1.2, 0.2, 2.0, -0.5, 0.2, 7.0);
    let volume: Vec<f64> = (1..=300).map(|i| i as f64 * 0.005).collect();
    let signal = truth.predict(&volume);
    ElutionTrace::try_from((volume, signal)).unwrap()
}


fn mixture_fitting(c: &mut Criterion) {
    let trace = reference_trace();
    let init = MixtureParameters::default();
    let bounds = ParameterBounds::default();
    let config = FitConfig::default();
    c.bench_function("mixture_jacobian", |b| {
        b.iter(|| trace.volume().iter().map(|x| init.jacobian(*x)).count())
    });
    c.bench_function("mixture_fit", |b| {
        b.iter(|| fit_mixture(&trace, &init, &bounds, &config).unwrap())
    });
}


fn curve_evaluation(c: &mut Criterion) {
    let params = MixtureParameters::new(-1.2, 0.2, 2.0, -0.5, 0.2, 7.0);
    let config = CurveConfig::default();
    c.bench_function("dense_curve", |b| {
        b.iter(|| DenseCurve::evaluate(&params, &config))
    });
}


fn batch_fitting(c: &mut Criterion) {
    let trace = reference_trace();
    let samples = (0..8)
        .map(|i| SampleColumn::measured(format!("S{i}"), trace.signal()))
        .collect();
    let table = ElutionTable::new(trace.volume().to_vec(), samples).unwrap();
    let config = DeconvolutionConfig::default();
    c.bench_function("batch_fit", |b| {
        b.iter(|| fit_samples(&table, &config).unwrap())
    });
}


fn fitting(c: &mut Criterion) {
    mixture_fitting(c);
    curve_evaluation(c);
    batch_fitting(c);
}


criterion::criterion_group!(benches, fitting);
criterion::criterion_main!(benches);
