use cam_ruler::{CameraPreset, Ruler};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn generate_measurements(max_span_px: usize, step_px: usize) -> Vec<(f64, f64)> {
    let mut measurements = Vec::new();
    for span in (step_px..max_span_px).step_by(step_px) {
        for angle in [30.0, 45.0, 60.0, 75.0] {
            measurements.push((span as f64, angle));
        }
    }
    measurements
}

fn criterion_benchmark(c: &mut Criterion) {
    let camera = CameraPreset::CanonEosR6.intrinsics::<f64>();
    let ruler = Ruler::new(&camera);
    let measurements = generate_measurements(2000, 50);
    println!("{} measurements", measurements.len());

    c.bench_function("distance_to_object", |b| {
        b.iter(|| {
            for &(span, angle) in &measurements {
                let _ = ruler.distance_to_object(black_box(span), black_box(90.0), angle);
            }
        });
    });

    c.bench_function("object_length", |b| {
        b.iter(|| {
            for &(span, angle) in &measurements {
                let _ = ruler.object_length(black_box(span), black_box(140.0), angle);
            }
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
