use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voxid_embed::{Extractor, SpectralConfig, SpectralExtractor};

fn make_tone(freq_hz: f64, n_samples: usize, sample_rate: usize) -> Vec<f32> {
    (0..n_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (0.5 * (freq_hz * 2.0 * std::f64::consts::PI * t).sin()) as f32
        })
        .collect()
}

fn bench_extract_400ms(c: &mut Criterion) {
    let ex = SpectralExtractor::default();
    let audio = make_tone(440.0, 6400, 16000); // 400ms

    c.bench_function("spectral_extract_256d_400ms", |b| {
        b.iter(|| {
            let _ = black_box(ex.extract(black_box(&audio)));
        });
    });
}

fn bench_extract_1s(c: &mut Criterion) {
    let ex = SpectralExtractor::default();
    let audio = make_tone(440.0, 16000, 16000); // 1s

    c.bench_function("spectral_extract_256d_1s", |b| {
        b.iter(|| {
            let _ = black_box(ex.extract(black_box(&audio)));
        });
    });
}

fn bench_extract_small_dim(c: &mut Criterion) {
    let cfg = SpectralConfig {
        num_bands: 64,
        ..SpectralConfig::default()
    };
    let ex = SpectralExtractor::new(cfg).unwrap();
    let audio = make_tone(440.0, 16000, 16000); // 1s

    c.bench_function("spectral_extract_64d_1s", |b| {
        b.iter(|| {
            let _ = black_box(ex.extract(black_box(&audio)));
        });
    });
}

criterion_group!(
    benches,
    bench_extract_400ms,
    bench_extract_1s,
    bench_extract_small_dim
);
criterion_main!(benches);
