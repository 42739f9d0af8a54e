//! Utilities for testing `cam_ruler` measurements.
use crate::{CameraIntrinsics, Ruler};
use nalgebra::{convert, RealField};

/// Pixel spans from `step` up to (excluding) `max`, in steps of `step`.
pub(crate) fn generate_spans<R: RealField>(max_px: usize, step_px: usize) -> Vec<R> {
    let mut spans = Vec::new();
    for px in num_iter::range_step(step_px, max_px, step_px) {
        spans.push(convert(px as f64));
    }
    spans
}

/// Check round-trip duality of the two solver operations over a grid.
///
/// For every span/angle pair that describes a solvable geometry, solve for
/// the distance from a known length, feed that distance to the dual
/// operation, and compare the recovered length against the original.
pub fn roundtrip_ruler<R: RealField>(
    camera: &CameraIntrinsics<R>,
    max_span_px: usize,
    span_step_px: usize,
    angles_degrees: &[f64],
    real_length_cm: f64,
    eps: R,
) {
    let ruler = Ruler::new(camera);
    let real: R = convert(real_length_cm);
    for span in generate_spans::<R>(max_span_px, span_step_px) {
        for &angle in angles_degrees {
            let angle: R = convert(angle);
            let distance =
                match ruler.distance_to_object(span.clone(), real.clone(), angle.clone()) {
                    Ok(distance) => distance,
                    // Grid point outside the solvable domain; skip it.
                    Err(_) => continue,
                };
            let recovered = ruler
                .object_length(span.clone(), distance, angle)
                .expect("dual solve accepts what the forward solve accepted");
            approx::assert_abs_diff_eq!(recovered, real.clone(), epsilon = eps.clone());
        }
    }
}
