use serde::{Deserialize, Serialize};

use crate::geometry::{AssetId, DerivedId, Material};
use crate::hash::ContentHash;
use crate::math::{BoundingBox, Point3, Vector3};
use crate::settings::SliceConfig;

slotmap::new_key_type! {
    /// Unique identifier for a collider in the scene.
    pub struct ColliderId;
}

slotmap::new_key_type! {
    /// Unique identifier for a slice modifier in the scene.
    pub struct ModifierId;
}

/// Names one attachment slot on a node that can carry a mesh binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachmentRef {
    MeshFilter,
    Collider(ColliderId),
}

impl AttachmentRef {
    /// The collider this slot names, if any.
    #[must_use]
    pub fn collider(self) -> Option<ColliderId> {
        match self {
            Self::MeshFilter => None,
            Self::Collider(id) => Some(id),
        }
    }

    /// Identity digest of the slot.
    #[must_use]
    pub fn content_hash(self) -> ContentHash {
        use slotmap::Key;
        match self {
            Self::MeshFilter => ContentHash::of_bytes("mesh-filter", &[]),
            Self::Collider(id) => {
                ContentHash::of_bytes("collider", &id.data().as_ffi().to_le_bytes())
            }
        }
    }
}

/// Which geometry a mesh filter or mesh collider currently uses.
///
/// A derived binding never owns the buffers: the slicing detail that
/// allocated them does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshBinding {
    Asset(AssetId),
    Derived(DerivedId),
}

impl MeshBinding {
    /// Returns the asset when bound to one directly.
    #[must_use]
    pub fn asset(self) -> Option<AssetId> {
        match self {
            Self::Asset(id) => Some(id),
            Self::Derived(_) => None,
        }
    }

    /// Identity digest of the binding.
    #[must_use]
    pub fn content_hash(self) -> ContentHash {
        match self {
            Self::Asset(id) => asset_identity_hash(id),
            Self::Derived(id) => id.content_hash(),
        }
    }
}

/// Identity digest of an asset key. Assets are immutable, so identity is
/// enough to detect a change of source geometry.
#[must_use]
pub fn asset_identity_hash(id: AssetId) -> ContentHash {
    use slotmap::Key;
    ContentHash::of_bytes("asset", &id.data().as_ffi().to_le_bytes())
}

/// Holds the mesh a node renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshFilter {
    pub mesh: Option<MeshBinding>,
}

impl MeshFilter {
    #[must_use]
    pub fn new(asset: AssetId) -> Self {
        Self {
            mesh: Some(MeshBinding::Asset(asset)),
        }
    }
}

/// Draws a node's mesh filter with one material per submesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshRenderer {
    pub enabled: bool,
    pub materials: Vec<Option<Material>>,
}

impl MeshRenderer {
    #[must_use]
    pub fn new(materials: Vec<Option<Material>>) -> Self {
        Self {
            enabled: true,
            materials,
        }
    }
}

/// Shape of a collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Mesh { mesh: Option<MeshBinding> },
    Box { center: Point3, size: Vector3 },
    Sphere { center: Point3, radius: f64 },
    Capsule { center: Point3, radius: f64, height: f64 },
}

impl ColliderShape {
    /// A box collider at its default placement (centered, unit size).
    #[must_use]
    pub fn default_box() -> Self {
        Self::Box {
            center: Point3::origin(),
            size: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Returns the box as bounds, if this is a box shape.
    #[must_use]
    pub fn as_box(&self) -> Option<BoundingBox> {
        match *self {
            Self::Box { center, size } => Some(BoundingBox::from_center_size(center, size)),
            _ => None,
        }
    }

    /// Short name of the shape kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Mesh { .. } => "mesh",
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Capsule { .. } => "capsule",
        }
    }
}

/// A collider attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub enabled: bool,
    pub shape: ColliderShape,
}

impl Collider {
    #[must_use]
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            enabled: true,
            shape,
        }
    }
}

/// Marks a node as the root of a slice controller.
///
/// The config lives on the node rather than in the controller so that a
/// modifier owned by an enclosing controller can drive it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerAttachment {
    pub config: SliceConfig,
    /// Set to run a cycle on the next tick.
    pub refresh_requested: bool,
    /// CompleteBounds published by the controller's last cycle, in its
    /// node's local space.
    pub complete_bounds: Option<BoundingBox>,
}

impl ControllerAttachment {
    /// New attachments request a first cycle.
    #[must_use]
    pub fn new(config: SliceConfig) -> Self {
        Self {
            config,
            refresh_requested: true,
            complete_bounds: None,
        }
    }
}
