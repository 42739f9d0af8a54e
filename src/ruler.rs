use nalgebra::{convert, RealField};

use crate::{CameraIntrinsics, Error};

/// Tilt angles in degrees below this threshold are treated as zenith views.
///
/// The tilted-view equation only holds while the span's subtended angle
/// stays below the tilt; as the camera approaches a straight-down view that
/// window closes on zero and the direction of the remaining tilt is no
/// longer resolvable from a pixel span alone. Below this threshold the
/// solver switches to the orthographic limit of the same projection, which
/// requires the camera's [`SensorShape`] to pin the span inside the frame.
///
/// [`SensorShape`]: crate::SensorShape
pub const ZENITH_FALLBACK_MAX_DEGREES: f64 = 0.5;

/// Which quantity the shared projection equation is solved for.
#[derive(Debug, Clone, Copy)]
enum Unknown {
    Distance,
    Length,
}

/// Converts image-space pixel measurements into real-world lengths.
///
/// A `Ruler` borrows one [`CameraIntrinsics`] and exposes two dual
/// operations over the same projection equation: solve for the camera-to-
/// object distance given the object's true length, or solve for the true
/// length given the distance. Both are pure functions of their arguments and
/// the borrowed intrinsics, so one ruler (or many rulers over one camera) can
/// be used freely from concurrent callers.
///
/// # Example
///
/// ```
/// use cam_ruler::{CameraIntrinsics, Ruler};
///
/// // Canon EOS R6 with a 50mm lens.
/// let camera = CameraIntrinsics::new(0.00818, 50.0).unwrap();
/// let ruler = Ruler::new(&camera);
///
/// // A 90cm object spanning 1969 pixels, photographed at 60 degrees
/// // from the zenith, is about 140cm from the lens.
/// let distance = ruler.distance_to_object(1969.0, 90.0, 60.0).unwrap();
/// assert!((distance - 139.7).abs() < 0.5);
///
/// // The dual solve recovers the object length from a known distance.
/// let length = ruler.object_length(1969.0, 140.0, 60.0).unwrap();
/// assert!((length - 90.2).abs() < 0.5);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Ruler<'cam, R: RealField> {
    camera: &'cam CameraIntrinsics<R>,
}

impl<'cam, R: RealField> Ruler<'cam, R> {
    /// Create a ruler bound to the given camera.
    #[inline]
    pub fn new(camera: &'cam CameraIntrinsics<R>) -> Self {
        Self { camera }
    }

    /// Return the camera this ruler is bound to.
    #[inline]
    pub fn camera(&self) -> &CameraIntrinsics<R> {
        self.camera
    }

    /// Distance from the lens to the near edge of an object, in centimeters.
    ///
    /// # Arguments
    /// * `object_length_px` - pixels spanned by the object in the image,
    ///   must be positive.
    /// * `real_object_length_cm` - known true length of the object, must be
    ///   positive.
    /// * `angle_degrees` - camera tilt from the zenith in `[0, 90)`, where 0
    ///   is looking straight down.
    ///
    /// # Errors
    /// [`Error::InvalidAngle`] when the tilt is outside `[0, 90)`,
    /// [`Error::MissingSensorShape`] when the tilt is below
    /// [`ZENITH_FALLBACK_MAX_DEGREES`] and the camera has no sensor shape,
    /// and [`Error::DegenerateGeometry`] when the measurements cannot
    /// describe a physical scene (non-positive span or length, or a span
    /// whose subtended angle reaches past the nadir at the given tilt).
    pub fn distance_to_object(
        &self,
        object_length_px: R,
        real_object_length_cm: R,
        angle_degrees: R,
    ) -> Result<R, Error<R>> {
        self.solve(
            object_length_px,
            real_object_length_cm,
            angle_degrees,
            Unknown::Distance,
        )
    }

    /// True length of an object at a known distance, in centimeters.
    ///
    /// Dual of [`distance_to_object`](Ruler::distance_to_object): same
    /// equation solved for the other unknown, same argument domains and the
    /// same error conditions with `distance_to_object_cm` taking the place
    /// of the known length.
    pub fn object_length(
        &self,
        object_length_px: R,
        distance_to_object_cm: R,
        angle_degrees: R,
    ) -> Result<R, Error<R>> {
        self.solve(
            object_length_px,
            distance_to_object_cm,
            angle_degrees,
            Unknown::Length,
        )
    }

    /// Shared solve over the projection equation.
    ///
    /// Computes the ratio `s` of real object length to distance implied by
    /// the pixel span and tilt; the two public operations are `distance =
    /// known / s` and `length = known * s`.
    fn solve(
        &self,
        object_length_px: R,
        known_cm: R,
        angle_degrees: R,
        unknown: Unknown,
    ) -> Result<R, Error<R>> {
        let zero: R = convert(0.0);
        if !(angle_degrees >= zero) || !(angle_degrees < convert(90.0)) {
            return Err(Error::InvalidAngle { angle_degrees });
        }

        let subtended = self.camera.angle_for_span(object_length_px.clone());
        let tilt = deg_to_rad(angle_degrees.clone());

        if !(subtended > zero) || !(known_cm > zero) {
            return Err(Error::DegenerateGeometry {
                object_length_px,
                subtended_radians: subtended,
                tilt_radians: tilt,
                known_cm,
            });
        }

        let zenith_limit: R = convert(ZENITH_FALLBACK_MAX_DEGREES);
        let scale = if angle_degrees < zenith_limit {
            let shape = match self.camera.sensor_shape_px() {
                Some(shape) => shape,
                None => return Err(Error::MissingSensorShape),
            };
            let frame_limit: R = convert(shape.long_side_px() as f64);
            if object_length_px > frame_limit {
                return Err(Error::DegenerateGeometry {
                    object_length_px,
                    subtended_radians: subtended,
                    tilt_radians: tilt,
                    known_cm,
                });
            }
            log::debug!(
                "tilt below {} degrees, solving in the orthographic limit",
                ZENITH_FALLBACK_MAX_DEGREES
            );
            self.zenith_scale(object_length_px, tilt)
        } else {
            // The span reaches past the nadir at this tilt: the far end of
            // the object would sit at or behind the camera's vertical.
            if subtended >= tilt {
                return Err(Error::DegenerateGeometry {
                    object_length_px,
                    subtended_radians: subtended,
                    tilt_radians: tilt,
                    known_cm,
                });
            }
            self.tilted_scale(subtended, tilt)
        };

        Ok(match unknown {
            Unknown::Distance => known_cm / scale,
            Unknown::Length => known_cm * scale,
        })
    }

    /// Length-to-distance ratio in the general tilted view: the accumulated
    /// subtended angle, deprojected by the tilt's foreshortening.
    #[inline]
    fn tilted_scale(&self, subtended: R, tilt: R) -> R {
        subtended / tilt.cos()
    }

    /// Length-to-distance ratio in the orthographic limit: the span's
    /// physical extent on the sensor plane over the focal length. Agrees
    /// with [`tilted_scale`](Ruler::tilted_scale) to within the per-pixel
    /// arctangent linearization as the tilt goes to zero.
    #[inline]
    fn zenith_scale(&self, span_px: R, tilt: R) -> R {
        span_px * self.camera.pixel_size_mm() / self.camera.focal_length_mm() / tilt.cos()
    }
}

#[inline]
fn deg_to_rad<R: RealField>(degrees: R) -> R {
    degrees * R::pi() / convert(180.0)
}

#[cfg(test)]
mod tests {
    use super::{deg_to_rad, Ruler, ZENITH_FALLBACK_MAX_DEGREES};
    use crate::{CameraIntrinsics, Error, SensorShape};

    fn canon() -> CameraIntrinsics<f64> {
        CameraIntrinsics::new(0.00818, 50.0).unwrap()
    }

    fn canon_with_shape() -> CameraIntrinsics<f64> {
        canon()
            .with_sensor_shape(SensorShape::new(5472, 3648))
            .unwrap()
    }

    #[test]
    fn documented_canon_measurements() {
        let camera = canon();
        let ruler = Ruler::new(&camera);

        let distance = ruler.distance_to_object(1969.0, 90.0, 60.0).unwrap();
        approx::assert_abs_diff_eq!(distance, 139.70, epsilon = 0.5);

        let length = ruler.object_length(1969.0, 140.0, 60.0).unwrap();
        approx::assert_abs_diff_eq!(length, 90.20, epsilon = 0.5);

        // Closed form: distance = length * cos(tilt) / subtended.
        let subtended = camera.angle_for_span(1969.0);
        let expected = 90.0 * 60.0_f64.to_radians().cos() / subtended;
        approx::assert_relative_eq!(distance, expected, max_relative = 1e-12);
    }

    #[test]
    fn duality_roundtrip() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        for &(px, real_cm, angle) in &[
            (1969.0, 90.0, 60.0),
            (350.0, 12.5, 25.0),
            (40.0, 3.0, 5.0),
            (2500.0, 210.0, 75.0),
        ] {
            let d = ruler.distance_to_object(px, real_cm, angle).unwrap();
            let back = ruler.object_length(px, d, angle).unwrap();
            approx::assert_relative_eq!(back, real_cm, max_relative = 1e-9);
        }
    }

    #[test]
    fn distance_strictly_decreases_with_tilt() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        let mut previous = f64::INFINITY;
        for angle in [20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 89.0] {
            let d = ruler.distance_to_object(1969.0, 90.0, angle).unwrap();
            assert!(
                d < previous,
                "distance {} at {} degrees not below {}",
                d,
                angle,
                previous
            );
            assert!(d > 0.0);
            previous = d;
        }
    }

    #[test]
    fn results_are_positive() {
        let camera = canon_with_shape();
        let ruler = Ruler::new(&camera);
        for &px in &[1.0, 17.0, 400.0, 3000.0] {
            for &angle in &[0.0, 0.25, 45.0, 89.9] {
                for &known in &[0.1, 42.0, 1.0e4] {
                    let subtended = camera.angle_for_span(px);
                    if angle >= ZENITH_FALLBACK_MAX_DEGREES && subtended >= angle.to_radians() {
                        continue;
                    }
                    let d = ruler.distance_to_object(px, known, angle).unwrap();
                    let l = ruler.object_length(px, known, angle).unwrap();
                    assert!(d > 0.0 && l > 0.0, "px={} angle={} known={}", px, angle, known);
                }
            }
        }
    }

    #[test]
    fn rejects_angle_outside_domain() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        for angle in [90.0, 90.1, 180.0, -0.001, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ruler.distance_to_object(1969.0, 90.0, angle),
                Err(Error::InvalidAngle { .. })
            ));
            assert!(matches!(
                ruler.object_length(1969.0, 140.0, angle),
                Err(Error::InvalidAngle { .. })
            ));
        }
    }

    #[test]
    fn rejects_non_positive_measurements() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        assert!(matches!(
            ruler.distance_to_object(0.0, 90.0, 60.0),
            Err(Error::DegenerateGeometry { .. })
        ));
        assert!(matches!(
            ruler.distance_to_object(1969.0, -90.0, 60.0),
            Err(Error::DegenerateGeometry { .. })
        ));
        assert!(matches!(
            ruler.object_length(1969.0, 0.0, 60.0),
            Err(Error::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn rejects_span_past_the_nadir() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        // 1969 px subtend about 18.5 degrees, more than a 10 degree tilt.
        let err = ruler.distance_to_object(1969.0, 90.0, 10.0).unwrap_err();
        match err {
            Error::DegenerateGeometry {
                subtended_radians,
                tilt_radians,
                ..
            } => {
                assert!(subtended_radians >= tilt_radians);
            }
            other => panic!("expected degenerate geometry, got {:?}", other),
        }
    }

    #[test]
    fn zenith_requires_sensor_shape() {
        let camera = canon();
        let ruler = Ruler::new(&camera);
        assert!(matches!(
            ruler.distance_to_object(1969.0, 90.0, 0.0),
            Err(Error::MissingSensorShape)
        ));
        assert!(matches!(
            ruler.object_length(1969.0, 140.0, 0.0),
            Err(Error::MissingSensorShape)
        ));
    }

    #[test]
    fn zenith_solves_with_sensor_shape() {
        let camera = canon_with_shape();
        let ruler = Ruler::new(&camera);
        let d = ruler.distance_to_object(1969.0, 90.0, 0.0).unwrap();
        // Straight down, the solve is plain similar triangles:
        // distance = length * focal / span_on_sensor.
        let expected = 90.0 * 5.0 / (1969.0 * 0.000818);
        approx::assert_relative_eq!(d, expected, max_relative = 1e-12);

        let back = ruler.object_length(1969.0, d, 0.0).unwrap();
        approx::assert_relative_eq!(back, 90.0, max_relative = 1e-12);
    }

    #[test]
    fn zenith_rejects_span_wider_than_frame() {
        let camera = canon_with_shape();
        let ruler = Ruler::new(&camera);
        assert!(matches!(
            ruler.distance_to_object(6000.0, 90.0, 0.0),
            Err(Error::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn fallback_agrees_with_general_formula_at_the_threshold() {
        let camera = canon_with_shape();
        let ruler = Ruler::new(&camera);

        // The two internal scales, evaluated at the same small tilt, differ
        // only by the arctangent linearization of the per-pixel angle.
        let tilt = deg_to_rad(ZENITH_FALLBACK_MAX_DEGREES);
        let subtended = camera.angle_for_span(10.0);
        approx::assert_relative_eq!(
            ruler.tilted_scale(subtended, tilt),
            ruler.zenith_scale(10.0, tilt),
            max_relative = 1e-8
        );

        // And through the public API, results straddling the threshold
        // converge as the tilt goes to zero.
        let above = ruler.distance_to_object(10.0, 90.0, 0.51).unwrap();
        let below = ruler.distance_to_object(10.0, 90.0, 0.49).unwrap();
        approx::assert_relative_eq!(above, below, max_relative = 1e-3);
    }
}
