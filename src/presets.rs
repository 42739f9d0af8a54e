//! Ready-made intrinsics for known camera models.
//!
//! Pixel sizes are the effective values after on-sensor binning: phone
//! sensors that merge Bayer blocks report the merged pixel pitch, since that
//! is what one image pixel subtends.

use nalgebra::{convert, RealField};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::{CameraIntrinsics, SensorShape};

/// Camera models with known optics, keyed by a human-readable name.
///
/// ```
/// use cam_ruler::{CameraPreset, Ruler};
///
/// let camera = CameraPreset::CanonEosR6.intrinsics::<f64>();
/// let ruler = Ruler::new(&camera);
/// let distance = ruler.distance_to_object(1969.0, 90.0, 60.0).unwrap();
/// assert!((distance - 139.7).abs() < 0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum CameraPreset {
    /// Redmi Note 11 Pro main camera (Samsung ISOCELL HM2, 9-in-1 binned).
    RedmiNote11ProMain,
    /// Redmi Note 11 Pro selfie camera (OmniVision OV16A1Q, 4-in-1 binned).
    RedmiNote11ProSelfie,
    /// Canon EOS R6 with a 50mm lens.
    CanonEosR6,
}

impl CameraPreset {
    /// Every known preset.
    pub const ALL: [CameraPreset; 3] = [
        CameraPreset::RedmiNote11ProMain,
        CameraPreset::RedmiNote11ProSelfie,
        CameraPreset::CanonEosR6,
    ];

    /// Human-readable model identifier.
    pub fn name(self) -> &'static str {
        match self {
            CameraPreset::RedmiNote11ProMain => "Redmi Note 11 Pro - Main",
            CameraPreset::RedmiNote11ProSelfie => "Redmi Note 11 Pro - Selfie",
            CameraPreset::CanonEosR6 => "Canon EOS R6",
        }
    }

    /// Look a preset up by its [`name`](CameraPreset::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    /// Build the intrinsics for this model.
    pub fn intrinsics<R: RealField>(self) -> CameraIntrinsics<R> {
        // All constants below are positive, so the validated constructor
        // path cannot fail for them.
        let (pixel_size_mm, focal_length_mm, shape) = match self {
            // 0.7um photosites merged 3x3; 108MP binned down to 12MP.
            CameraPreset::RedmiNote11ProMain => (0.0021, 24.0, SensorShape::new(4000, 3000)),
            // 1.0um photosites merged 2x2; 16MP binned down to 4MP.
            CameraPreset::RedmiNote11ProSelfie => (0.0020, 24.0, SensorShape::new(2328, 1748)),
            CameraPreset::CanonEosR6 => (0.00818, 50.0, SensorShape::new(5472, 3648)),
        };
        CameraIntrinsics::from_validated(
            convert(pixel_size_mm),
            convert(focal_length_mm),
            Some(shape),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::CameraPreset;
    use crate::{IntrinsicsParams, CameraIntrinsics};

    #[test]
    fn names_roundtrip() {
        for preset in CameraPreset::ALL {
            assert_eq!(CameraPreset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(CameraPreset::from_name("Box Brownie"), None);
    }

    #[test]
    fn presets_match_the_validated_constructor() {
        for preset in CameraPreset::ALL {
            let built = preset.intrinsics::<f64>();
            let revalidated: CameraIntrinsics<f64> = IntrinsicsParams {
                pixel_size_mm: built.pixel_size_mm(),
                focal_length_mm: built.focal_length_mm(),
                sensor_shape_px: built.sensor_shape_px(),
            }
            .try_into()
            .unwrap();
            assert!(built == revalidated);
        }
    }

    #[test]
    fn canon_per_pixel_angle() {
        let cam = CameraPreset::CanonEosR6.intrinsics::<f64>();
        approx::assert_relative_eq!(
            cam.angle_per_pixel_radians(),
            (0.00818_f64 / 50.0).atan()
        );
    }

    #[test]
    fn presets_carry_sensor_shapes() {
        for preset in CameraPreset::ALL {
            assert!(preset.intrinsics::<f64>().sensor_shape_px().is_some());
        }
    }
}
