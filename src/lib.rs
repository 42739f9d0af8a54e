#![cfg_attr(not(feature = "std"), no_std)]
#![deny(rust_2018_idioms, unsafe_code, missing_docs)]
#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(doc_cfg, feature(doc_cfg))]

//! # Examples
//!
//! ## Example - measuring with a tilted camera.
//!
//! ```
//! use cam_ruler::{CameraIntrinsics, Ruler};
//!
//! // Canon EOS R6 behind a 50mm lens: 8.18um pixels.
//! let camera = CameraIntrinsics::new(0.00818, 50.0).unwrap();
//! let ruler = Ruler::new(&camera);
//!
//! // A 90cm object spans 1969 pixels at 60 degrees from the zenith.
//! let distance_cm = ruler.distance_to_object(1969.0, 90.0, 60.0).unwrap();
//! assert!((distance_cm - 139.7).abs() < 0.5);
//!
//! // The dual operation: known distance, unknown object length.
//! let length_cm = ruler.object_length(1969.0, 140.0, 60.0).unwrap();
//! assert!((length_cm - 90.2).abs() < 0.5);
//! ```
//!
//! ## Example - straight-down views resolve against the sensor frame.
//!
//! ```
//! use cam_ruler::{CameraIntrinsics, CameraPreset, Error, Ruler};
//!
//! // Presets carry their sensor shape, so zenith measurements work.
//! let camera = CameraPreset::CanonEosR6.intrinsics::<f64>();
//! let ruler = Ruler::new(&camera);
//! let distance_cm = ruler.distance_to_object(1969.0, 90.0, 0.0).unwrap();
//! assert!(distance_cm > 0.0);
//!
//! // Without a sensor shape the near-zenith geometry is unresolvable.
//! let bare = CameraIntrinsics::new(0.00818, 50.0).unwrap();
//! let ruler = Ruler::new(&bare);
//! assert!(matches!(
//!     ruler.distance_to_object(1969.0, 90.0, 0.0),
//!     Err(Error::MissingSensorShape)
//! ));
//! ```

#[cfg(not(feature = "std"))]
extern crate core as std;

use nalgebra::RealField;

mod intrinsics;
pub use intrinsics::{CameraIntrinsics, IntrinsicsParams, SensorShape};

mod ruler;
pub use ruler::{Ruler, ZENITH_FALLBACK_MAX_DEGREES};

mod presets;
pub use presets::CameraPreset;

#[cfg(feature = "std")]
pub mod rectify;

#[cfg(feature = "std")]
pub mod ruler_test_utils;

/// All possible errors.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error<R: RealField> {
    /// A camera parameter given at construction was not positive.
    InvalidIntrinsics {
        /// Name of the offending parameter.
        quantity: &'static str,
    },
    /// Camera tilt outside `[0, 90)` degrees from the zenith.
    InvalidAngle {
        /// The rejected tilt.
        angle_degrees: R,
    },
    /// A near-zenith solve was attempted on a camera without a sensor shape.
    MissingSensorShape,
    /// The supplied measurements describe a geometrically impossible scene.
    DegenerateGeometry {
        /// Pixels spanned by the object.
        object_length_px: R,
        /// Angle subtended by that span, in radians.
        subtended_radians: R,
        /// Camera tilt from the zenith, in radians.
        tilt_radians: R,
        /// The known measurement supplied by the caller, in centimeters.
        known_cm: R,
    },
}

impl<R: RealField> std::fmt::Display for Error<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidIntrinsics { quantity } => {
                write!(f, "camera parameter {} must be positive", quantity)
            }
            Error::InvalidAngle { angle_degrees } => {
                write!(f, "tilt angle {} degrees is outside [0, 90)", angle_degrees)
            }
            Error::MissingSensorShape => {
                write!(f, "near-zenith solve needs the camera's sensor shape")
            }
            Error::DegenerateGeometry {
                object_length_px,
                subtended_radians,
                tilt_radians,
                known_cm,
            } => {
                write!(
                    f,
                    "impossible geometry: {} px subtend {} rad at tilt {} rad \
                     (known measurement {} cm)",
                    object_length_px, subtended_radians, tilt_radians, known_cm
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl<R: RealField> std::error::Error for Error<R> {}
