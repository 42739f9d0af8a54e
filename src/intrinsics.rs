use nalgebra::{convert, RealField};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// Sensor resolution in pixels.
///
/// Only needed for measurements taken close to the zenith (camera looking
/// straight down), where the tilted-view equation no longer applies and the
/// solver falls back to the orthographic limit resolved against the sensor
/// extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct SensorShape {
    /// Horizontal resolution in pixels.
    pub width_px: u32,
    /// Vertical resolution in pixels.
    pub height_px: u32,
}

impl SensorShape {
    /// Create a new sensor shape.
    #[inline]
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }

    /// Length in pixels of the longer sensor side.
    ///
    /// A measured span can run in either direction across the frame, so this
    /// is the upper bound used when checking that a span fits the sensor.
    #[inline]
    pub fn long_side_px(&self) -> u32 {
        self.width_px.max(self.height_px)
    }
}

/// Parameters defining a camera's optics and sensor.
///
/// These describe a thin-lens pinhole camera by the physical size of one
/// sensor pixel and the lens focal length. The sensor resolution is optional
/// and only consulted for near-zenith measurements.
///
/// Can be converted into [`CameraIntrinsics`](struct.CameraIntrinsics.html)
/// via `.try_into()` like so:
///
/// ```
/// use cam_ruler::{CameraIntrinsics, IntrinsicsParams};
/// let params = IntrinsicsParams {
///     pixel_size_mm: 0.00818,
///     focal_length_mm: 50.0,
///     sensor_shape_px: None,
/// };
/// let intrinsics: CameraIntrinsics<f64> = params.try_into().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct IntrinsicsParams<R: RealField> {
    /// Physical size of one sensor pixel in millimeters. Must be positive.
    pub pixel_size_mm: R,
    /// Lens focal length in millimeters. Must be positive.
    pub focal_length_mm: R,
    /// Sensor resolution, when known.
    pub sensor_shape_px: Option<SensorShape>,
}

/// Immutable optical description of a camera.
///
/// Holds the validated inputs plus the angular resolution derived from them:
/// one pixel of physical size `p` behind a lens of focal length `f` subtends
/// `atan(p / f)` radians. That per-pixel angle is frozen at construction and
/// is the atomic unit of all downstream trigonometry: a span of `n` pixels
/// subtends `n` of these per-pixel arctangents.
///
/// There is no way to mutate an instance after construction; operations such
/// as [`with_sensor_shape`](CameraIntrinsics::with_sensor_shape) return a new
/// instance with the derived state recomputed.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize))]
pub struct CameraIntrinsics<R: RealField> {
    pixel_size_mm: R,
    focal_length_mm: R,
    sensor_shape_px: Option<SensorShape>,
    #[cfg_attr(feature = "serde-serialize", serde(skip))]
    angle_per_pixel_radians: R,
}

impl<R: RealField> CameraIntrinsics<R> {
    /// Create intrinsics from pixel size and focal length, with no sensor
    /// shape.
    ///
    /// Returns [`Error::InvalidIntrinsics`] if either quantity is not
    /// positive.
    pub fn new(pixel_size_mm: R, focal_length_mm: R) -> Result<Self, Error<R>> {
        IntrinsicsParams {
            pixel_size_mm,
            focal_length_mm,
            sensor_shape_px: None,
        }
        .try_into()
    }

    /// Return a copy of these intrinsics carrying the given sensor shape.
    ///
    /// Returns [`Error::InvalidIntrinsics`] if a sensor dimension is zero.
    pub fn with_sensor_shape(&self, sensor_shape_px: SensorShape) -> Result<Self, Error<R>> {
        IntrinsicsParams {
            pixel_size_mm: self.pixel_size_mm.clone(),
            focal_length_mm: self.focal_length_mm.clone(),
            sensor_shape_px: Some(sensor_shape_px),
        }
        .try_into()
    }

    /// Build without re-validating. Callers must have checked positivity.
    pub(crate) fn from_validated(
        pixel_size_mm: R,
        focal_length_mm: R,
        sensor_shape_px: Option<SensorShape>,
    ) -> Self {
        let angle_per_pixel_radians =
            (pixel_size_mm.clone() / focal_length_mm.clone()).atan();
        Self {
            pixel_size_mm,
            focal_length_mm,
            sensor_shape_px,
            angle_per_pixel_radians,
        }
    }

    /// Physical pixel size in millimeters.
    #[inline]
    pub fn pixel_size_mm(&self) -> R {
        self.pixel_size_mm.clone()
    }

    /// Physical pixel size in centimeters.
    #[inline]
    pub fn pixel_size_cm(&self) -> R {
        self.pixel_size_mm.clone() / convert(10.0)
    }

    /// Lens focal length in millimeters.
    #[inline]
    pub fn focal_length_mm(&self) -> R {
        self.focal_length_mm.clone()
    }

    /// Lens focal length in centimeters.
    #[inline]
    pub fn focal_length_cm(&self) -> R {
        self.focal_length_mm.clone() / convert(10.0)
    }

    /// Sensor resolution, when known.
    #[inline]
    pub fn sensor_shape_px(&self) -> Option<SensorShape> {
        self.sensor_shape_px
    }

    /// Angle subtended by a single pixel, in radians.
    #[inline]
    pub fn angle_per_pixel_radians(&self) -> R {
        self.angle_per_pixel_radians.clone()
    }

    /// Angle subtended by a span of pixels, in radians.
    ///
    /// The per-pixel arctangent is accumulated over the span rather than
    /// taking one arctangent of the whole span, so the result stays accurate
    /// for spans covering a large fraction of the field of view.
    #[inline]
    pub fn angle_for_span(&self, span_px: R) -> R {
        span_px * self.angle_per_pixel_radians.clone()
    }

    /// Full angular aperture of the sensor `(width, height)` in radians, when
    /// the sensor shape is known.
    pub fn sensor_aperture_radians(&self) -> Option<(R, R)> {
        self.sensor_shape_px.map(|shape| {
            (
                self.angle_for_span(convert(shape.width_px as f64)),
                self.angle_for_span(convert(shape.height_px as f64)),
            )
        })
    }
}

impl<R: RealField> TryFrom<IntrinsicsParams<R>> for CameraIntrinsics<R> {
    type Error = Error<R>;

    fn try_from(params: IntrinsicsParams<R>) -> Result<Self, Error<R>> {
        let zero: R = convert(0.0);
        if !(params.pixel_size_mm > zero) {
            return Err(Error::InvalidIntrinsics {
                quantity: "pixel_size_mm",
            });
        }
        if !(params.focal_length_mm > zero) {
            return Err(Error::InvalidIntrinsics {
                quantity: "focal_length_mm",
            });
        }
        if let Some(shape) = params.sensor_shape_px {
            if shape.width_px == 0 || shape.height_px == 0 {
                return Err(Error::InvalidIntrinsics {
                    quantity: "sensor_shape_px",
                });
            }
        }
        Ok(Self::from_validated(
            params.pixel_size_mm,
            params.focal_length_mm,
            params.sensor_shape_px,
        ))
    }
}

impl<R: RealField> std::fmt::Debug for CameraIntrinsics<R> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // This should match the auto derived Debug implementation but not
        // print the derived angle_per_pixel_radians field.
        fmt.debug_struct("CameraIntrinsics")
            .field("pixel_size_mm", &self.pixel_size_mm)
            .field("focal_length_mm", &self.focal_length_mm)
            .field("sensor_shape_px", &self.sensor_shape_px)
            .finish()
    }
}

// Deserialize goes through `IntrinsicsParams` so the stored inputs are
// re-validated and the derived per-pixel angle is recomputed rather than
// trusted from the wire.
#[cfg(feature = "serde-serialize")]
impl<'de, R: RealField + serde::Deserialize<'de>> serde::Deserialize<'de>
    for CameraIntrinsics<R>
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let params = IntrinsicsParams::<R>::deserialize(deserializer)?;
        Self::try_from(params).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "serde-serialize")]
fn _test_intrinsics_serde_traits() {
    // Compile-time check that CameraIntrinsics implements both serde traits.
    fn implements_ser<T: serde::Serialize>() {}
    fn implements_de<'de, T: serde::Deserialize<'de>>() {}
    implements_ser::<CameraIntrinsics<f64>>();
    implements_de::<CameraIntrinsics<f64>>();
}

#[cfg(test)]
mod tests {
    use super::{CameraIntrinsics, IntrinsicsParams, SensorShape};
    use crate::Error;

    #[test]
    fn derived_angle_matches_arctangent() {
        let cam = CameraIntrinsics::<f64>::new(0.00818, 50.0).unwrap();
        let expected = (0.00818_f64 / 50.0).atan();
        approx::assert_relative_eq!(cam.angle_per_pixel_radians(), expected);
        approx::assert_relative_eq!(
            cam.angle_for_span(1969.0),
            1969.0 * expected,
            max_relative = 1e-12
        );
    }

    #[test]
    fn unit_accessors() {
        let cam = CameraIntrinsics::<f64>::new(0.0021, 24.0).unwrap();
        approx::assert_relative_eq!(cam.pixel_size_cm(), 0.00021);
        approx::assert_relative_eq!(cam.focal_length_cm(), 2.4);
    }

    #[test]
    fn rejects_non_positive_inputs() {
        assert!(matches!(
            CameraIntrinsics::<f64>::new(0.0, 50.0),
            Err(Error::InvalidIntrinsics {
                quantity: "pixel_size_mm"
            })
        ));
        assert!(matches!(
            CameraIntrinsics::<f64>::new(0.00818, -1.0),
            Err(Error::InvalidIntrinsics {
                quantity: "focal_length_mm"
            })
        ));
        assert!(matches!(
            CameraIntrinsics::<f64>::new(f64::NAN, 50.0),
            Err(Error::InvalidIntrinsics {
                quantity: "pixel_size_mm"
            })
        ));
        let params = IntrinsicsParams {
            pixel_size_mm: 0.00818_f64,
            focal_length_mm: 50.0,
            sensor_shape_px: Some(SensorShape::new(0, 3648)),
        };
        assert!(matches!(
            CameraIntrinsics::try_from(params),
            Err(Error::InvalidIntrinsics {
                quantity: "sensor_shape_px"
            })
        ));
    }

    #[test]
    fn with_sensor_shape_returns_new_instance() {
        let cam = CameraIntrinsics::<f64>::new(0.00818, 50.0).unwrap();
        assert!(cam.sensor_shape_px().is_none());
        let shaped = cam
            .with_sensor_shape(SensorShape::new(5472, 3648))
            .unwrap();
        assert_eq!(
            shaped.sensor_shape_px(),
            Some(SensorShape::new(5472, 3648))
        );
        // The original is untouched and the derived state carried over.
        assert!(cam.sensor_shape_px().is_none());
        approx::assert_relative_eq!(
            shaped.angle_per_pixel_radians(),
            cam.angle_per_pixel_radians()
        );
    }

    #[test]
    fn sensor_aperture() {
        let cam = CameraIntrinsics::<f64>::new(0.00818, 50.0)
            .unwrap()
            .with_sensor_shape(SensorShape::new(5472, 3648))
            .unwrap();
        let (w, h) = cam.sensor_aperture_radians().unwrap();
        approx::assert_relative_eq!(w, 5472.0 * cam.angle_per_pixel_radians());
        approx::assert_relative_eq!(h, 3648.0 * cam.angle_per_pixel_radians());
        assert_eq!(
            cam.sensor_shape_px().unwrap().long_side_px(),
            5472
        );
    }

    #[test]
    #[cfg(feature = "serde-serialize")]
    fn serde_roundtrip_recomputes_derived_state() {
        let expected = CameraIntrinsics::<f64>::new(0.00818, 50.0)
            .unwrap()
            .with_sensor_shape(SensorShape::new(5472, 3648))
            .unwrap();

        let buf = serde_json::to_string(&expected).unwrap();
        // The derived field never travels on the wire.
        assert!(!buf.contains("angle_per_pixel_radians"));

        let actual: CameraIntrinsics<f64> = serde_json::from_str(&buf).unwrap();
        assert!(expected == actual);
        approx::assert_relative_eq!(
            actual.angle_per_pixel_radians(),
            (0.00818_f64 / 50.0).atan()
        );
    }

    #[test]
    #[cfg(feature = "serde-serialize")]
    fn serde_rejects_invalid_wire_data() {
        let buf = r#"{"pixel_size_mm":0.0,"focal_length_mm":50.0,"sensor_shape_px":null}"#;
        assert!(serde_json::from_str::<CameraIntrinsics<f64>>(buf).is_err());
    }
}
