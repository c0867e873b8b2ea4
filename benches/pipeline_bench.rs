use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use verifyspot_forensics::{
    Normalization,
    analysis::{ela::ElaAnalyzer, phash::PerceptualHasher},
    detection::authenticity::AuthenticityScorer,
    image_utils::to_input_tensor,
    model::network::{ArchitectureConfig, CompactCnn},
};

fn sample_image() -> RgbImage {
    RgbImage::from_fn(640, 480, |x, y| Rgb([(x ^ y) as u8, (x * 3) as u8, (y * 5) as u8]))
}

fn bench_ela(c: &mut Criterion) {
    let image = sample_image();
    let analyzer = ElaAnalyzer::new(90);

    c.bench_function("ela_640x480", |b| b.iter(|| analyzer.analyze(black_box(&image), None)));
}

fn bench_phash(c: &mut Criterion) {
    let image = sample_image();
    let hasher = PerceptualHasher::new();

    c.bench_function("phash_640x480", |b| b.iter(|| hasher.hash(black_box(&image))));
}

fn bench_scoring(c: &mut Criterion) {
    let image = sample_image();
    let model = CompactCnn::new(ArchitectureConfig::default()).unwrap();
    let scorer = AuthenticityScorer::new(&model);
    let tensor = to_input_tensor(&image, 300, Normalization::ImageNet);

    c.bench_function("preprocess_300", |b| b.iter(|| scorer.preprocess(black_box(&image))));
    c.bench_function("score_300", |b| b.iter(|| scorer.score_tensor(black_box(&tensor))));
}

criterion_group!(benches, bench_ela, bench_phash, bench_scoring);
criterion_main!(benches);
