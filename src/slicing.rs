//! Applying the slice transform to vertex buffers and boxes expressed in a
//! tracked node's local space.

use tracing::warn;

use crate::error::Result;
use crate::hash::ContentHash;
use crate::math::bounds::local_bounds;
use crate::math::{slice_vector, transform_point, BoundingBox, Matrix4, Point3, SliceParams, Vector3};
use crate::scene::{NodeId, Scene};
use crate::settings::SliceConfig;

/// The per-cycle inputs shared by every slice call of one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceFrame {
    /// The controller's node; bounds are in its local space.
    pub root: NodeId,
    pub size: Vector3,
    pub thresholds: Vector3,
    pub complete: BoundingBox,
    pub sliced: BoundingBox,
}

impl SliceFrame {
    /// Derives the sliced bounds from `complete` and the config.
    #[must_use]
    pub fn new(root: NodeId, config: &SliceConfig, complete: BoundingBox) -> Self {
        Self {
            root,
            size: config.size(),
            thresholds: config.thresholds(),
            complete,
            sliced: sliced_bounds(&complete, config),
        }
    }

    /// Slice parameters centered on the complete bounds.
    #[must_use]
    pub fn params(&self) -> SliceParams {
        SliceParams::new(self.size, &self.complete, &self.sliced)
    }

    /// How far the sliced region was moved away from the complete bounds.
    #[must_use]
    pub fn offset(&self) -> Vector3 {
        self.sliced.center - self.complete.center
    }
}

/// CompleteBounds with extents scaled by the thresholds, moved by the offset.
#[must_use]
pub fn sliced_bounds(complete: &BoundingBox, config: &SliceConfig) -> BoundingBox {
    BoundingBox::new(
        complete.center + config.offset(),
        complete.extents.component_mul(&config.thresholds()),
    )
}

/// Slices the positions of one tracked mesh.
#[derive(Debug, Clone, Copy)]
pub struct VertexSlicer<'a> {
    pub frame: &'a SliceFrame,
    /// Maps the tracked node's local space into the controller's space.
    pub to_root: Matrix4,
    /// Deliberately skip slicing and keep the source positions.
    pub skip: bool,
    /// Whether an unchanged `previous` hash short-circuits work.
    pub skip_unmodified: bool,
}

impl VertexSlicer<'_> {
    /// Writes sliced `source` positions into `target`.
    ///
    /// Returns [`ContentHash::SKIP_VERTICES`] when skipping. When the
    /// computed hash equals `previous` (and memoization is on) `target` is
    /// left untouched. A `to_root` that cannot be inverted (a zero-scale
    /// axis somewhere above the mesh) leaves the source positions in place.
    #[must_use]
    pub fn apply(
        &self,
        source: &[Point3],
        source_hash: ContentHash,
        target: &mut Vec<Point3>,
        previous: Option<ContentHash>,
    ) -> ContentHash {
        if self.skip {
            if previous != Some(ContentHash::SKIP_VERTICES) || !self.skip_unmodified {
                target.clear();
                target.extend_from_slice(source);
            }
            return ContentHash::SKIP_VERTICES;
        }

        let frame = self.frame;
        let offset = frame.offset();
        let params = frame.params().with_center(frame.sliced.center);

        let hash = ContentHash::of_vector3(&frame.sliced.extents)
            .appended(source_hash)
            .appended(ContentHash::of_matrix4(&self.to_root))
            .appended(ContentHash::of_vector3(&frame.size))
            .appended(ContentHash::of_point3(&params.center))
            .appended(ContentHash::of_vector3(&params.extents))
            .appended(ContentHash::of_vector3(&offset));

        if previous == Some(hash) && self.skip_unmodified {
            return hash;
        }

        target.clear();
        let Some(from_root) = self.to_root.try_inverse() else {
            warn!(%hash, "singular node transform, vertices left unsliced");
            target.extend_from_slice(source);
            return hash;
        };

        target.extend(source.iter().map(|p| {
            let framed = transform_point(&self.to_root, p) + offset;
            transform_point(&from_root, &slice_vector(&framed, &params))
        }));
        hash
    }
}

/// Slices a box given in `node`'s local space and returns the envelope of
/// its sliced corners, again in `node`'s local space. The box comes back
/// unchanged when `node` has collapsed to a zero-scale axis.
///
/// # Errors
///
/// Returns an error if a node is missing.
pub fn slice_box(
    scene: &Scene,
    local: &BoundingBox,
    node: NodeId,
    frame: &SliceFrame,
) -> Result<BoundingBox> {
    let to_root = scene.relative_matrix(node, frame.root)?;
    let Some(from_root) = to_root.try_inverse() else {
        warn!(?node, "singular node transform, box left unsliced");
        return Ok(*local);
    };
    let params = frame.params();

    let corners = local.corners().map(|corner| {
        let sliced = slice_vector(&transform_point(&to_root, &corner), &params);
        transform_point(&from_root, &sliced)
    });
    Ok(local_bounds(&corners, &Matrix4::identity()).unwrap_or(*local))
}
