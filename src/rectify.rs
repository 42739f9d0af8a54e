//! Perspective correction of a photographed planar region to a zenith view.
//!
//! Given the four corners of a planar region in a photograph, this module
//! estimates the projective transform that re-renders the region as if
//! photographed from straight above, with the camera tilt angle used to
//! restore the true-world aspect ratio of the output. The polygon may be
//! supplied directly or acquired from a human operator through the blocking
//! [`PolygonSource`] seam.

use itertools::Itertools;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Quads whose shoelace area falls below this many square pixels are
/// rejected as degenerate.
const MIN_QUAD_AREA: f64 = 1e-6;

/// Errors from perspective correction.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RectifyError {
    /// No polygon was supplied and no interactive source produced one.
    MissingPolygon,
    /// Camera tilt outside `[0, 90)` degrees.
    InvalidAngle {
        /// The rejected tilt.
        angle_degrees: f64,
    },
    /// Padding fraction outside `[0, 0.5)`.
    InvalidPadding {
        /// The rejected fraction.
        padding_fraction: f64,
    },
    /// A requested output dimension was zero.
    InvalidOutputShape {
        /// Requested width in pixels.
        width: usize,
        /// Requested height in pixels.
        height: usize,
    },
    /// The polygon has (near) zero area.
    DegenerateQuad,
    /// The corner correspondence does not define an invertible transform.
    SingularTransform,
}

impl std::fmt::Display for RectifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for RectifyError {}

/// A quadrilateral in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Quad {
    /// The four corner points.
    pub corners: [Point2<f64>; 4],
}

impl Quad {
    /// Create a quad from its corners.
    #[inline]
    pub fn new(corners: [Point2<f64>; 4]) -> Self {
        Self { corners }
    }

    /// Create a quad from `(x, y)` corner tuples.
    pub fn from_tuples(corners: [(f64, f64); 4]) -> Self {
        Self::new(corners.map(|(x, y)| Point2::new(x, y)))
    }

    /// Mean of the corner points.
    pub fn centroid(&self) -> Point2<f64> {
        let mut x = 0.0;
        let mut y = 0.0;
        for corner in &self.corners {
            x += corner.x;
            y += corner.y;
        }
        Point2::new(x / 4.0, y / 4.0)
    }

    /// Unsigned shoelace area in square pixels.
    pub fn area(&self) -> f64 {
        let mut twice = 0.0;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            twice += a.x * b.y - b.x * a.y;
        }
        twice.abs() / 2.0
    }

    /// Corners ordered clockwise (in image coordinates, y pointing down),
    /// starting from the corner nearest the top-left.
    pub fn ordered_clockwise(&self) -> Quad {
        let center = self.centroid();
        let sorted: Vec<Point2<f64>> = self
            .corners
            .iter()
            .copied()
            .sorted_by(|a, b| {
                let ta = (a.y - center.y).atan2(a.x - center.x);
                let tb = (b.y - center.y).atan2(b.x - center.x);
                ta.total_cmp(&tb)
            })
            .collect();
        let start = sorted
            .iter()
            .position_min_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)))
            .unwrap_or(0);
        let mut corners = [Point2::new(0.0, 0.0); 4];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = sorted[(start + i) % 4];
        }
        Quad { corners }
    }

    /// Axis-aligned bounding rectangle as `(min corner, width, height)`.
    pub fn bounding_rect(&self) -> (Point2<f64>, f64, f64) {
        let (min_x, max_x) = self
            .corners
            .iter()
            .map(|p| p.x)
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or((0.0, 0.0));
        let (min_y, max_y) = self
            .corners
            .iter()
            .map(|p| p.y)
            .minmax_by(f64::total_cmp)
            .into_option()
            .unwrap_or((0.0, 0.0));
        (Point2::new(min_x, min_y), max_x - min_x, max_y - min_y)
    }
}

/// A 3x3 projective transform between pixel planes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Homography {
    /// The transform matrix, normalized so the bottom-right entry is 1.
    pub matrix: Matrix3<f64>,
}

impl Homography {
    /// Wrap an existing matrix.
    #[inline]
    pub fn new(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    /// Estimate the transform sending the corners of `from` onto the
    /// corresponding corners of `to`.
    ///
    /// Corner order must agree between the two quads. Both point sets are
    /// Hartley-normalized before the 8x8 linear solve so the conditioning
    /// does not depend on where in the image the quads sit.
    pub fn mapping(from: &Quad, to: &Quad) -> Result<Self, RectifyError> {
        let (t_from, from_n) = normalize_corners(&from.corners);
        let (t_to, to_n) = normalize_corners(&to.corners);

        // Unknowns [h11 h12 h13 h21 h22 h23 h31 h32], h33 = 1. For each
        // correspondence (x,y) -> (u,v):
        //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
        //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for k in 0..4 {
            let x = from_n[k].x;
            let y = from_n[k].y;
            let u = to_n[k].x;
            let v = to_n[k].y;

            let r0 = 2 * k;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -u * x;
            a[(r0, 7)] = -u * y;
            b[r0] = u;

            let r1 = 2 * k + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -v * x;
            a[(r1, 7)] = -v * y;
            b[r1] = v;
        }

        let h = match a.lu().solve(&b) {
            Some(h) => h,
            None => return Err(RectifyError::SingularTransform),
        };
        let normalized = Matrix3::new(
            h[0], h[1], h[2], //
            h[3], h[4], h[5], //
            h[6], h[7], 1.0,
        );

        let t_to_inv = match t_to.try_inverse() {
            Some(inv) => inv,
            None => return Err(RectifyError::SingularTransform),
        };
        scaled_to_unit(t_to_inv * normalized * t_from).map(Self::new)
    }

    /// Apply the transform to a point.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Result<Self, RectifyError> {
        match self.matrix.try_inverse() {
            Some(inv) => scaled_to_unit(inv).map(Self::new),
            None => Err(RectifyError::SingularTransform),
        }
    }
}

/// Hartley normalization: translate the centroid to the origin and scale so
/// the mean distance from it is sqrt(2).
fn normalize_corners(corners: &[Point2<f64>; 4]) -> (Matrix3<f64>, [Point2<f64>; 4]) {
    let mut cx = 0.0;
    let mut cy = 0.0;
    for p in corners {
        cx += p.x;
        cy += p.y;
    }
    cx /= 4.0;
    cy /= 4.0;

    let mut mean_dist = 0.0;
    for p in corners {
        mean_dist += ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt();
    }
    mean_dist /= 4.0;

    let s = if mean_dist > 1e-12 {
        core::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);

    let mut out = [Point2::new(0.0, 0.0); 4];
    for (i, p) in corners.iter().enumerate() {
        out[i] = Point2::new(s * (p.x - cx), s * (p.y - cy));
    }
    (t, out)
}

/// Rescale so the bottom-right entry is exactly 1.
fn scaled_to_unit(h: Matrix3<f64>) -> Result<Matrix3<f64>, RectifyError> {
    let w = h[(2, 2)];
    if w.abs() < 1e-12 {
        return Err(RectifyError::SingularTransform);
    }
    Ok(h / w)
}

/// An 8-bit single-channel raster.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct GrayImage {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Row-major samples, `width * height` entries.
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Bilinearly sample at continuous pixel-center coordinates.
    ///
    /// The sample of pixel `(col, row)` sits at `(col + 0.5, row + 0.5)`.
    /// Coordinates outside the image return 0.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> u8 {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        if x < 0.0 || y < 0.0 || x > self.width as f64 || y > self.height as f64 {
            return 0;
        }
        let fx = x - 0.5;
        let fy = y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let x0 = x0 as isize;
        let y0 = y0 as isize;

        let v00 = self.at_clamped(x0, y0) as f64;
        let v10 = self.at_clamped(x0 + 1, y0) as f64;
        let v01 = self.at_clamped(x0, y0 + 1) as f64;
        let v11 = self.at_clamped(x0 + 1, y0 + 1) as f64;

        let top = v00 + (v10 - v00) * tx;
        let bottom = v01 + (v11 - v01) * tx;
        (top + (bottom - top) * ty).round() as u8
    }

    fn at_clamped(&self, x: isize, y: isize) -> u8 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }
}

/// A blocking source of operator-confirmed polygons.
///
/// Implementations present the photograph to a human operator and block the
/// calling flow until the operator confirms four corners (for example, by
/// clicking in a plotting window). Returning `None` means the operator
/// declined to provide one.
pub trait PolygonSource {
    /// Obtain a quadrilateral, offering `fallback` as the pre-selected
    /// suggestion when one is known.
    fn acquire_polygon(&mut self, fallback: Option<Quad>) -> Option<Quad>;
}

/// Inputs to [`rectify_to_zenith`].
pub struct RectifyParams<'a> {
    /// The region to correct. Used directly, or as the fallback offered to
    /// `source` when one is present.
    pub polygon: Option<Quad>,
    /// Interactive polygon source consulted before `polygon`.
    pub source: Option<&'a mut dyn PolygonSource>,
    /// Camera tilt from the zenith in `[0, 90)` degrees; when known, the
    /// output's depth axis is stretched by `1 / cos(angle)` to restore
    /// true-world proportions.
    pub angle_degrees: Option<f64>,
    /// Output raster `(width, height)`. When absent, the output is sized
    /// from the corrected region itself.
    pub output_shape: Option<(usize, usize)>,
    /// Fraction of the output left as margin on every side, in `[0, 0.5)`.
    pub padding_fraction: f64,
}

impl<'a> Default for RectifyParams<'a> {
    fn default() -> Self {
        Self {
            polygon: None,
            source: None,
            angle_degrees: None,
            output_shape: None,
            padding_fraction: 0.0,
        }
    }
}

/// Re-render the quadrilateral region of `image` as seen from straight
/// above.
///
/// The polygon is taken from the interactive source when one is supplied
/// (blocking until the operator answers, with `params.polygon` as the
/// fallback), otherwise from `params.polygon`. The corrected region is
/// placed centered in the output raster, scaled to fit when an explicit
/// output shape is requested.
pub fn rectify_to_zenith(
    image: &GrayImage,
    params: RectifyParams<'_>,
) -> Result<GrayImage, RectifyError> {
    let RectifyParams {
        polygon,
        source,
        angle_degrees,
        output_shape,
        padding_fraction,
    } = params;

    if !(0.0..0.5).contains(&padding_fraction) {
        return Err(RectifyError::InvalidPadding { padding_fraction });
    }
    let stretch = match angle_degrees {
        Some(angle) => {
            if !(0.0..90.0).contains(&angle) {
                return Err(RectifyError::InvalidAngle {
                    angle_degrees: angle,
                });
            }
            1.0 / angle.to_radians().cos()
        }
        None => 1.0,
    };

    // Parameters are validated before the operator is prompted.
    let polygon = match source {
        Some(source) => source.acquire_polygon(polygon).or(polygon),
        None => polygon,
    };
    let polygon = match polygon {
        Some(polygon) => polygon,
        None => return Err(RectifyError::MissingPolygon),
    };

    let quad = polygon.ordered_clockwise();
    if approx::abs_diff_eq!(quad.area(), 0.0, epsilon = MIN_QUAD_AREA) {
        return Err(RectifyError::DegenerateQuad);
    }

    let (_, width, height) = quad.bounding_rect();
    let placement = place_content(width, height * stretch, output_shape, padding_fraction)?;
    log::debug!(
        "rectifying to {}x{} canvas, content {}x{} at ({}, {})",
        placement.canvas_width,
        placement.canvas_height,
        placement.content_width,
        placement.content_height,
        placement.origin_x,
        placement.origin_y,
    );

    let target = Quad::from_tuples([
        (placement.origin_x, placement.origin_y),
        (placement.origin_x + placement.content_width, placement.origin_y),
        (
            placement.origin_x + placement.content_width,
            placement.origin_y + placement.content_height,
        ),
        (placement.origin_x, placement.origin_y + placement.content_height),
    ]);

    // Map output pixels back into the photograph and sample.
    let transform = Homography::mapping(&target, &quad)?;
    Ok(GrayImage::from_fn(
        placement.canvas_width,
        placement.canvas_height,
        |x, y| {
            let p = transform.apply(Point2::new(x as f64 + 0.5, y as f64 + 0.5));
            image.sample_bilinear(p.x, p.y)
        },
    ))
}

struct Placement {
    canvas_width: usize,
    canvas_height: usize,
    origin_x: f64,
    origin_y: f64,
    content_width: f64,
    content_height: f64,
}

/// Size the output canvas and center the corrected region inside it.
fn place_content(
    content_width: f64,
    content_height: f64,
    output_shape: Option<(usize, usize)>,
    padding_fraction: f64,
) -> Result<Placement, RectifyError> {
    match output_shape {
        None => {
            let canvas_width = (content_width * (1.0 + 2.0 * padding_fraction)).round().max(1.0);
            let canvas_height = (content_height * (1.0 + 2.0 * padding_fraction)).round().max(1.0);
            Ok(Placement {
                canvas_width: canvas_width as usize,
                canvas_height: canvas_height as usize,
                origin_x: (canvas_width - content_width) / 2.0,
                origin_y: (canvas_height - content_height) / 2.0,
                content_width,
                content_height,
            })
        }
        Some((width, height)) => {
            if width == 0 || height == 0 {
                return Err(RectifyError::InvalidOutputShape { width, height });
            }
            let avail_width = width as f64 * (1.0 - 2.0 * padding_fraction);
            let avail_height = height as f64 * (1.0 - 2.0 * padding_fraction);
            let scale = (avail_width / content_width).min(avail_height / content_height);
            let scaled_width = content_width * scale;
            let scaled_height = content_height * scale;
            Ok(Placement {
                canvas_width: width,
                canvas_height: height,
                origin_x: (width as f64 - scaled_width) / 2.0,
                origin_y: (height as f64 - scaled_height) / 2.0,
                content_width: scaled_width,
                content_height: scaled_height,
            })
        }
    }
}
