use serde::{Deserialize, Serialize};

use super::{transform_point, Matrix4, Point3, Vector3};
use crate::error::Result;
use crate::scene::{NodeId, Scene};

/// An axis-aligned box stored as center and half-size.
///
/// A box carries no space tag of its own: every field or function holding one
/// states which space it is expressed in (node-local, controller-local, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Center of the box.
    pub center: Point3,
    /// Half of the box size along each axis, never negative.
    pub extents: Vector3,
}

impl BoundingBox {
    /// Creates a box from center and extents.
    #[must_use]
    pub fn new(center: Point3, extents: Vector3) -> Self {
        Self {
            center,
            extents: extents.abs(),
        }
    }

    /// Creates a box from center and full size.
    #[must_use]
    pub fn from_center_size(center: Point3, size: Vector3) -> Self {
        Self::new(center, size * 0.5)
    }

    /// Creates the box spanning two corners.
    #[must_use]
    pub fn from_min_max(min: Point3, max: Point3) -> Self {
        let center = nalgebra::center(&min, &max);
        Self::new(center, (max - min) * 0.5)
    }

    /// Returns the minimum corner.
    #[must_use]
    pub fn min(&self) -> Point3 {
        self.center - self.extents
    }

    /// Returns the maximum corner.
    #[must_use]
    pub fn max(&self) -> Point3 {
        self.center + self.extents
    }

    /// Returns the full size of the box.
    #[must_use]
    pub fn size(&self) -> Vector3 {
        self.extents * 2.0
    }

    /// Returns the eight corners of the box.
    #[must_use]
    pub fn corners(&self) -> [Point3; 8] {
        let min = self.min();
        let s = self.size();
        [
            Point3::new(min.x, min.y, min.z),
            Point3::new(min.x + s.x, min.y, min.z),
            Point3::new(min.x, min.y, min.z + s.z),
            Point3::new(min.x + s.x, min.y, min.z + s.z),
            Point3::new(min.x, min.y + s.y, min.z),
            Point3::new(min.x + s.x, min.y + s.y, min.z),
            Point3::new(min.x, min.y + s.y, min.z + s.z),
            Point3::new(min.x + s.x, min.y + s.y, min.z + s.z),
        ]
    }

    /// Returns the smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let min = self.min().inf(&other.min());
        let max = self.max().sup(&other.max());
        Self::from_min_max(min, max)
    }

    /// Transforms the corner set by `matrix` and returns its envelope.
    ///
    /// Rotations break axis alignment, so the corners are transformed rather
    /// than the center and extents.
    #[must_use]
    pub fn transformed(&self, matrix: &Matrix4) -> Self {
        let corners = self.corners();
        envelope(corners.iter().map(|c| transform_point(matrix, c))).unwrap_or(*self)
    }
}

/// Three-valued union: absent inputs are ignored, two absent inputs give `None`.
#[must_use]
pub fn encapsulate(a: Option<BoundingBox>, b: Option<BoundingBox>) -> Option<BoundingBox> {
    match (a, b) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (Some(a), Some(b)) => Some(a.union(&b)),
    }
}

/// Transforms every point by `matrix` and returns the min/max envelope.
///
/// Returns `None` when `points` is empty.
#[must_use]
pub fn local_bounds(points: &[Point3], matrix: &Matrix4) -> Option<BoundingBox> {
    envelope(points.iter().map(|p| transform_point(matrix, p)))
}

/// Re-expresses a box given in `child`'s local space in `root`'s local space.
///
/// # Errors
///
/// Returns an error if either node is missing or `root` cannot be inverted.
pub fn to_root_space(
    scene: &Scene,
    bounds: &BoundingBox,
    child: NodeId,
    root: NodeId,
) -> Result<BoundingBox> {
    let matrix = scene.relative_matrix(child, root)?;
    Ok(bounds.transformed(&matrix))
}

fn envelope(mut points: impl Iterator<Item = Point3>) -> Option<BoundingBox> {
    let first = points.next()?;
    let (min, max) = points.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)));
    Some(BoundingBox::from_min_max(min, max))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box_at(x: f64) -> BoundingBox {
        BoundingBox::new(Point3::new(x, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5))
    }

    #[test]
    fn encapsulate_is_three_valued() {
        assert!(encapsulate(None, None).is_none());
        assert_eq!(encapsulate(Some(unit_box_at(1.0)), None), Some(unit_box_at(1.0)));
        assert_eq!(encapsulate(None, Some(unit_box_at(2.0))), Some(unit_box_at(2.0)));

        let both = encapsulate(Some(unit_box_at(0.0)), Some(unit_box_at(3.0))).unwrap();
        assert_relative_eq!(both.min(), Point3::new(-0.5, -0.5, -0.5));
        assert_relative_eq!(both.max(), Point3::new(3.5, 0.5, 0.5));
    }

    #[test]
    fn local_bounds_applies_matrix_before_enveloping() {
        let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0)];
        let matrix = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 1.0));
        let bounds = local_bounds(&points, &matrix).unwrap();
        assert_relative_eq!(bounds.size(), Vector3::new(2.0, 2.0, 3.0));
        assert!(local_bounds(&[], &matrix).is_none());
    }

    #[test]
    fn rotated_box_grows_to_contain_corners() {
        let rotation = nalgebra::Rotation3::from_axis_angle(
            &Vector3::z_axis(),
            std::f64::consts::FRAC_PI_4,
        );
        let bounds = BoundingBox::new(Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let rotated = bounds.transformed(&rotation.to_homogeneous());
        let half_diagonal = 2.0_f64.sqrt();
        assert_relative_eq!(rotated.extents.x, half_diagonal, epsilon = 1e-9);
        assert_relative_eq!(rotated.extents.y, half_diagonal, epsilon = 1e-9);
        assert_relative_eq!(rotated.extents.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn corners_span_min_and_max() {
        let bounds = BoundingBox::from_min_max(Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 4.0, 3.0));
        let corners = bounds.corners();
        assert_eq!(corners[0], bounds.min());
        assert_eq!(corners[7], bounds.max());
    }
}
