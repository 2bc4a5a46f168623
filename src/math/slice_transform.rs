//! The piecewise-linear remap at the heart of slicing.
//!
//! Each axis is split into three regions around `center`:
//!
//! * inside `center ± slice_extent` values are stretched by `size`,
//! * below or above that region values are translated rigidly so that they
//!   keep their distance to the (scaled) outer boundary `center ± extent * size`.
//!
//! When `size != 1` the two rules do not meet at the slice boundary. The outer
//! regions keep their original length and are pushed outwards, which is what
//! produces the "sliced" look.

use super::{transform_point, BoundingBox, Matrix4, Point3, Vector3};

/// Per-axis parameters of one slice evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceParams {
    /// Final scale of each axis.
    pub size: Vector3,
    /// Center of the region being sliced.
    pub center: Point3,
    /// Half-size of everything being sliced.
    pub extents: Vector3,
    /// Half-size of the stretched region.
    pub slice_extents: Vector3,
}

impl SliceParams {
    /// Builds the parameters from a size and the complete/sliced bounds pair.
    #[must_use]
    pub fn new(size: Vector3, complete: &BoundingBox, sliced: &BoundingBox) -> Self {
        Self {
            size,
            center: complete.center,
            extents: complete.extents,
            slice_extents: sliced.extents,
        }
    }

    /// Replaces the center, keeping every other parameter.
    #[must_use]
    pub fn with_center(mut self, center: Point3) -> Self {
        self.center = center;
        self
    }
}

/// Remaps a single coordinate.
///
/// `slice_extent` is expected to lie in `[0, extent]`. A zero slice extent
/// means every value is translated and nothing is stretched.
#[must_use]
pub fn slice_value(value: f64, center: f64, extent: f64, slice_extent: f64, size: f64) -> f64 {
    if value <= center - slice_extent {
        let offset = (center - extent) - value;
        (center - extent * size) - offset
    } else if value >= center + slice_extent {
        let offset = (center + extent) - value;
        (center + extent * size) - offset
    } else {
        let min = center - slice_extent;
        let max = center + slice_extent;
        let t = (value - min) / (max - min);

        let scaled = slice_extent * size;
        lerp(center - scaled, center + scaled, t)
    }
}

/// Remaps every axis of a point independently.
#[must_use]
pub fn slice_vector(point: &Point3, params: &SliceParams) -> Point3 {
    Point3::new(
        slice_value(
            point.x,
            params.center.x,
            params.extents.x,
            params.slice_extents.x,
            params.size.x,
        ),
        slice_value(
            point.y,
            params.center.y,
            params.extents.y,
            params.slice_extents.y,
            params.size.y,
        ),
        slice_value(
            point.z,
            params.center.z,
            params.extents.z,
            params.slice_extents.z,
            params.size.z,
        ),
    )
}

/// Moves `point` into the slicing frame, remaps it and moves it back.
///
/// `to_frame` and `from_frame` must be inverses of each other.
#[must_use]
pub fn slice_point_in_frame(
    point: &Point3,
    to_frame: &Matrix4,
    from_frame: &Matrix4,
    params: &SliceParams,
) -> Point3 {
    let framed = transform_point(to_frame, point);
    let sliced = slice_vector(&framed, params);
    transform_point(from_frame, &sliced)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_values_with_double_size() {
        let inputs = [-10.0, -4.0, 0.0, 4.0, 10.0];
        let expected = [-20.0, -14.0, 0.0, 14.0, 20.0];
        for (v, e) in inputs.iter().zip(expected) {
            assert_relative_eq!(slice_value(*v, 0.0, 10.0, 4.0, 2.0), e);
        }
    }

    #[test]
    fn unit_size_is_identity() {
        for v in [-12.0, -3.5, 0.0, 1.25, 7.0, 30.0] {
            assert_relative_eq!(slice_value(v, 2.0, 10.0, 6.0, 1.0), v);
        }
    }

    #[test]
    fn outer_region_is_translated_rigidly() {
        // Two points in the upper region keep their distance.
        let a = slice_value(6.0, 0.0, 10.0, 5.0, 3.0);
        let b = slice_value(9.0, 0.0, 10.0, 5.0, 3.0);
        assert_relative_eq!(b - a, 3.0);
        // The far edge lands on the scaled outer boundary.
        assert_relative_eq!(slice_value(10.0, 0.0, 10.0, 5.0, 3.0), 30.0);
    }

    #[test]
    fn boundary_has_gap_when_size_differs_from_one() {
        let inside = slice_value(3.999_999, 0.0, 10.0, 4.0, 2.0);
        let outside = slice_value(4.0, 0.0, 10.0, 4.0, 2.0);
        assert!(outside - inside > 5.0);
    }

    #[test]
    fn zero_slice_extent_translates_everything() {
        assert_relative_eq!(slice_value(0.0, 0.0, 10.0, 0.0, 2.0), -10.0);
        assert_relative_eq!(slice_value(1.0, 0.0, 10.0, 0.0, 2.0), 11.0);
        assert_relative_eq!(slice_value(-1.0, 0.0, 10.0, 0.0, 2.0), -11.0);
    }

    #[test]
    fn axes_are_independent() {
        let complete = BoundingBox::new(Point3::origin(), Vector3::new(10.0, 10.0, 10.0));
        let sliced = BoundingBox::new(Point3::origin(), Vector3::new(4.0, 4.0, 4.0));
        let params = SliceParams::new(Vector3::new(2.0, 1.0, 1.0), &complete, &sliced);

        let p = slice_vector(&Point3::new(10.0, 10.0, -4.0), &params);
        assert_relative_eq!(p, Point3::new(20.0, 10.0, -4.0));
    }

    #[test]
    fn frame_round_trip_uses_local_axes() {
        // A frame rotated 90 degrees about Z swaps the roles of X and Y.
        let rotation = nalgebra::Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            std::f64::consts::FRAC_PI_2,
        );
        let to_frame = rotation.to_homogeneous();
        let from_frame = rotation.inverse().to_homogeneous();

        let complete = BoundingBox::new(Point3::origin(), Vector3::new(10.0, 10.0, 10.0));
        let sliced = BoundingBox::new(Point3::origin(), Vector3::new(4.0, 4.0, 4.0));
        let params = SliceParams::new(Vector3::new(1.0, 2.0, 1.0), &complete, &sliced);

        // Local +X becomes frame +Y, which is doubled.
        let p = slice_point_in_frame(&Point3::new(10.0, 0.0, 0.0), &to_frame, &from_frame, &params);
        assert_relative_eq!(p, Point3::new(20.0, 0.0, 0.0), epsilon = 1e-9);
    }
}
