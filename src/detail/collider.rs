use super::{DetailKey, MeshDetail};
use crate::error::Result;
use crate::geometry::{AssetId, DerivedId};
use crate::hash::ContentHash;
use crate::math::BoundingBox;
use crate::scene::{AttachmentRef, ColliderShape, MeshBinding, NodeId, Scene};

/// Payload of a tracked collider.
#[derive(Debug, Clone, PartialEq)]
pub enum ColliderDetail {
    /// A mesh collider that owns its derived copy.
    Mesh(MeshDetail),
    /// A mesh collider that borrows the derived copy of a sibling mesh detail.
    Managed(ManagedColliderDetail),
    Box(BoxColliderDetail),
    /// A shape that cannot be sliced. Tracked for reporting only.
    Unsupported { shape: &'static str },
}

impl ColliderDetail {
    /// Short name of the detail kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Mesh(_) => "mesh collider",
            Self::Managed(_) => "managed mesh collider",
            Self::Box(_) => "box collider",
            Self::Unsupported { .. } => "unsupported collider",
        }
    }

    /// Reverts what this detail changed on its collider.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    pub fn disable(&self, scene: &mut Scene, node: NodeId, slot: AttachmentRef) -> Result<()> {
        match self {
            Self::Mesh(owned) => owned.disable(scene, node, slot),
            Self::Managed(managed) => managed.disable(scene, node, slot),
            Self::Box(boxed) => boxed.disable(scene, slot),
            Self::Unsupported { .. } => Ok(()),
        }
    }
}

/// A mesh collider sharing geometry with the mesh detail of its node.
///
/// The derived copy belongs to the sibling detail. This detail only binds
/// the collider to it and must never release it.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedColliderDetail {
    pub(crate) mesh_detail: DetailKey,
    pub(crate) original: Option<AssetId>,
    pub(crate) derived: Option<DerivedId>,
    /// Sibling vertex hash the collider was last bound at.
    pub(crate) last_vertex_hash: Option<ContentHash>,
}

impl ManagedColliderDetail {
    /// Key of the sibling mesh detail in the mesh component's store.
    #[must_use]
    pub fn mesh_detail(&self) -> DetailKey {
        self.mesh_detail
    }

    #[must_use]
    pub fn original(&self) -> Option<AssetId> {
        self.original
    }

    #[must_use]
    pub fn derived(&self) -> Option<DerivedId> {
        self.derived
    }

    /// Binds the collider to the sibling's derived copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or collider is missing.
    pub fn enable(&self, scene: &mut Scene, node: NodeId, slot: AttachmentRef) -> Result<()> {
        if let Some(id) = self.derived {
            scene.set_mesh_binding(node, slot, Some(MeshBinding::Derived(id)))?;
        }
        Ok(())
    }

    /// Binds the collider back to the original asset if it still shows the
    /// sibling's derived copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    pub fn disable(&self, scene: &mut Scene, node: NodeId, slot: AttachmentRef) -> Result<()> {
        let Ok(current) = scene.mesh_binding(node, slot) else {
            return Ok(());
        };
        if current.is_some() && current == self.derived.map(MeshBinding::Derived) {
            scene.set_mesh_binding(node, slot, self.original.map(MeshBinding::Asset))?;
        }
        Ok(())
    }
}

/// A box collider: only center and size are sliced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxColliderDetail {
    /// The box as the user set it, in node-local space.
    pub(crate) original: BoundingBox,
    pub(crate) sliced: Option<BoundingBox>,
}

impl BoxColliderDetail {
    #[must_use]
    pub fn original(&self) -> BoundingBox {
        self.original
    }

    #[must_use]
    pub fn sliced(&self) -> Option<BoundingBox> {
        self.sliced
    }

    /// Writes the sliced box, if one was computed.
    ///
    /// # Errors
    ///
    /// Returns an error if the collider is missing.
    pub fn enable(&self, scene: &mut Scene, slot: AttachmentRef) -> Result<()> {
        match self.sliced {
            Some(sliced) => write_box(scene, slot, &sliced),
            None => Ok(()),
        }
    }

    /// Writes the original box back. A vanished collider is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    pub fn disable(&self, scene: &mut Scene, slot: AttachmentRef) -> Result<()> {
        let exists = slot.collider().is_some_and(|id| scene.collider(id).is_ok());
        if exists {
            write_box(scene, slot, &self.original)?;
        }
        Ok(())
    }
}

/// Sets the center and size of a box collider. Other shapes are untouched.
pub(crate) fn write_box(scene: &mut Scene, slot: AttachmentRef, bounds: &BoundingBox) -> Result<()> {
    let Some(id) = slot.collider() else {
        return Ok(());
    };
    if let ColliderShape::Box { center, size } = &mut scene.collider_mut(id)?.shape {
        *center = bounds.center;
        *size = bounds.size();
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::{Point3, Vector3};
    use crate::scene::Collider;
    use approx::assert_relative_eq;

    #[test]
    fn box_detail_round_trips_collider_parameters() {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let node = scene.add_child(root, "box").unwrap();
        let id = scene
            .add_collider(node, Collider::new(ColliderShape::default_box()))
            .unwrap();
        let slot = AttachmentRef::Collider(id);

        let detail = BoxColliderDetail {
            original: scene.collider(id).unwrap().shape.as_box().unwrap(),
            sliced: Some(BoundingBox::new(
                Point3::new(1.0, 0.0, 0.0),
                Vector3::new(2.0, 0.5, 0.5),
            )),
        };

        detail.enable(&mut scene, slot).unwrap();
        let shape = scene.collider(id).unwrap().shape;
        assert_relative_eq!(shape.as_box().unwrap().size(), Vector3::new(4.0, 1.0, 1.0));

        detail.disable(&mut scene, slot).unwrap();
        assert_eq!(scene.collider(id).unwrap().shape, ColliderShape::default_box());

        scene.remove_collider(node, id).unwrap();
        detail.disable(&mut scene, slot).unwrap();
    }
}
