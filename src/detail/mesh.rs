use tracing::{trace, warn};

use super::DetailCore;
use crate::error::Result;
use crate::geometry::{AssetId, DerivedGeometry, DerivedId, GeometryAsset, UvMappingSettings};
use crate::geometry::uv::UvProjector;
use crate::hash::ContentHash;
use crate::math::bounds::local_bounds;
use crate::scene::{asset_identity_hash, AttachmentRef, MeshBinding, NodeId, Scene};
use crate::slicing::{SliceFrame, VertexSlicer};

/// A source asset and the derived copy this detail owns.
///
/// Used for rendered meshes and for mesh colliders that have no sibling
/// mesh detail to share with.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDetail {
    original: Option<AssetId>,
    derived: Option<DerivedGeometry>,
    sliced_vertex_hash: Option<ContentHash>,
    sliced_uv_hash: Option<ContentHash>,
}

impl MeshDetail {
    pub(crate) fn new(original: AssetId) -> Self {
        Self {
            original: Some(original),
            derived: None,
            sliced_vertex_hash: None,
            sliced_uv_hash: None,
        }
    }

    /// The asset the derived copy was made from.
    #[must_use]
    pub fn original(&self) -> Option<AssetId> {
        self.original
    }

    #[must_use]
    pub fn derived(&self) -> Option<&DerivedGeometry> {
        self.derived.as_ref()
    }

    #[must_use]
    pub fn derived_id(&self) -> Option<DerivedId> {
        self.derived.as_ref().map(DerivedGeometry::id)
    }

    /// Vertex hash of the last upload; `None` forces the next one.
    #[must_use]
    pub fn sliced_vertex_hash(&self) -> Option<ContentHash> {
        self.sliced_vertex_hash
    }

    #[must_use]
    pub fn sliced_uv_hash(&self) -> Option<ContentHash> {
        self.sliced_uv_hash
    }

    /// What the attachment should be bound to in the given slicing state.
    #[must_use]
    pub fn expected_binding(&self, enabled: bool) -> Option<MeshBinding> {
        match (enabled, self.derived_id()) {
            (true, Some(id)) => Some(MeshBinding::Derived(id)),
            _ => self.original.map(MeshBinding::Asset),
        }
    }

    /// Whether `binding` refers to this detail's original or derived copy.
    #[must_use]
    pub fn matches(&self, binding: MeshBinding) -> bool {
        match binding {
            MeshBinding::Asset(id) => self.original == Some(id),
            MeshBinding::Derived(id) => self.derived_id() == Some(id),
        }
    }

    /// Identity of the original asset followed by the derived copy.
    #[must_use]
    pub fn identity_hash(&self) -> ContentHash {
        let original = self
            .original
            .map_or(ContentHash::INVALID, asset_identity_hash);
        let derived = self
            .derived_id()
            .map_or(ContentHash::INVALID, DerivedId::content_hash);
        original.appended(derived)
    }

    /// Brings the detail in line with the binding found on the attachment.
    ///
    /// `resolved` is the asset `current` stands for, with derived bindings
    /// of other details already mapped back to their original. A binding
    /// that is neither ours nor expected means the mesh was replaced: the
    /// new asset is adopted when it is readable (or absent) and a new
    /// derived copy is made. Otherwise a copy is made only if none exists.
    pub(crate) fn reconcile(
        &mut self,
        scene: &Scene,
        current: Option<MeshBinding>,
        resolved: Option<AssetId>,
        enabled: bool,
    ) -> Result<()> {
        let replaced = current != self.expected_binding(enabled)
            && current.map_or(true, |binding| !self.matches(binding));
        if replaced && (current.is_none() || resolved.is_some()) {
            let readable = match resolved {
                Some(id) => scene.asset(id)?.readable,
                None => true,
            };
            if readable {
                trace!(from = ?self.original, to = ?resolved, "mesh replaced");
                self.original = resolved;
                return self.allocate(scene);
            }
        }

        if self.derived.is_none() {
            self.allocate(scene)?;
        }
        Ok(())
    }

    fn allocate(&mut self, scene: &Scene) -> Result<()> {
        self.derived = None;
        self.sliced_vertex_hash = None;
        self.sliced_uv_hash = None;

        let Some(original) = self.original else {
            return Ok(());
        };
        let asset = scene.asset(original)?;
        if !asset.readable {
            warn!(asset = %asset.name, "source geometry is not cpu readable, leaving it unsliced");
            return Ok(());
        }
        let derived = DerivedGeometry::from_asset(original, asset);
        trace!(asset = %asset.name, derived = derived.id().get(), "allocated derived geometry");
        self.derived = Some(derived);
        Ok(())
    }

    /// Recomputes the source bounds in the controller's space. Bounds are
    /// kept from the last readable cycle while the source is not readable.
    pub(crate) fn refresh_bounds(
        &self,
        core: &mut DetailCore,
        scene: &Scene,
        root: NodeId,
    ) -> Result<()> {
        let Some(original) = self.original else {
            core.original_bounds = None;
            return Ok(());
        };
        let asset = scene.asset(original)?;
        if asset.readable {
            let matrix = scene.relative_matrix(core.node(), root)?;
            core.original_bounds = local_bounds(&asset.buffers.positions, &matrix);
        }
        Ok(())
    }

    // --- Bindings ---

    /// Binds the attachment to the derived copy, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or collider is missing.
    pub fn enable(&self, scene: &mut Scene, node: NodeId, slot: AttachmentRef) -> Result<()> {
        if let Some(id) = self.derived_id() {
            scene.set_mesh_binding(node, slot, Some(MeshBinding::Derived(id)))?;
        }
        Ok(())
    }

    /// Binds the attachment back to the original asset if it still shows
    /// our derived copy. A vanished attachment is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    pub fn disable(&self, scene: &mut Scene, node: NodeId, slot: AttachmentRef) -> Result<()> {
        let Ok(current) = scene.mesh_binding(node, slot) else {
            return Ok(());
        };
        if current.is_some() && current == self.derived_id().map(MeshBinding::Derived) {
            scene.set_mesh_binding(node, slot, self.original.map(MeshBinding::Asset))?;
        }
        Ok(())
    }

    /// Enables or disables the binding to match `enabled`.
    pub(crate) fn sync_binding(
        &self,
        scene: &mut Scene,
        node: NodeId,
        slot: AttachmentRef,
        enabled: bool,
    ) -> Result<()> {
        if enabled {
            self.enable(scene, node, slot)
        } else {
            self.disable(scene, node, slot)
        }
    }

    // --- Slicing ---

    /// Slices the source positions into the derived copy and returns the
    /// vertex hash, or `None` when there is nothing to slice.
    pub(crate) fn slice_vertices(
        &mut self,
        scene: &Scene,
        node: NodeId,
        frame: &SliceFrame,
        skip: bool,
        skip_unmodified: bool,
    ) -> Result<Option<ContentHash>> {
        let (Some(original), Some(derived)) = (self.original, self.derived.as_mut()) else {
            return Ok(None);
        };
        let asset = scene.asset(original)?;
        if !asset.readable {
            warn!(asset = %asset.name, "source geometry is not cpu readable, leaving it unsliced");
            return Ok(None);
        }

        let slicer = VertexSlicer {
            frame,
            to_root: scene.relative_matrix(node, frame.root)?,
            skip,
            skip_unmodified,
        };
        Ok(Some(slicer.apply(
            &asset.buffers.positions,
            asset_identity_hash(original),
            &mut derived.buffers.positions,
            self.sliced_vertex_hash,
        )))
    }

    /// Reprojects the UVs of the derived copy, whose positions must be
    /// sliced already, and returns the UV hash.
    pub(crate) fn slice_uvs(
        &mut self,
        scene: &Scene,
        node: NodeId,
        frame: &SliceFrame,
        settings: &UvMappingSettings,
        skip: bool,
        skip_unmodified: bool,
    ) -> Result<Option<ContentHash>> {
        let (Some(original), Some(derived)) = (self.original, self.derived.as_mut()) else {
            return Ok(None);
        };
        let asset = scene.asset(original)?;
        if !asset.readable {
            return Ok(None);
        }

        let materials = scene
            .node(node)?
            .mesh_renderer
            .as_ref()
            .map_or(&[][..], |renderer| renderer.materials.as_slice());
        let local_to_world = scene.local_to_world(node)?;
        let projector = UvProjector {
            settings,
            materials,
            local_to_world: &local_to_world,
            size: frame.size,
            complete: &frame.complete,
            skip,
            skip_unmodified,
        };
        Ok(Some(projector.project(
            &asset.buffers,
            asset_identity_hash(original),
            &mut derived.buffers,
            self.sliced_uv_hash,
        )))
    }

    /// Uploads the derived copy when either hash changed, or always when
    /// memoization is off. Returns whether an upload happened.
    pub(crate) fn commit_slice(
        &mut self,
        vertex_hash: ContentHash,
        uv_hash: Option<ContentHash>,
        skip_unmodified: bool,
    ) -> bool {
        let changed =
            Some(vertex_hash) != self.sliced_vertex_hash || uv_hash != self.sliced_uv_hash;
        if !changed && skip_unmodified {
            return false;
        }
        let Some(derived) = self.derived.as_mut() else {
            return false;
        };
        derived.upload();
        self.sliced_vertex_hash = Some(vertex_hash);
        self.sliced_uv_hash = uv_hash;
        true
    }

    // --- Finalization ---

    /// Turns the derived copy into a new scene asset and binds the
    /// attachment to it. Returns the derived id and the asset replacing it.
    pub(crate) fn commit_to_scene(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        slot: AttachmentRef,
        readable: bool,
    ) -> Result<Option<(DerivedId, AssetId)>> {
        let Some(derived) = self.derived.take() else {
            return Ok(None);
        };
        let id = derived.id();
        let name = scene.asset(derived.source()).map_or_else(
            |_| String::from("sliced"),
            |source| format!("{} (sliced)", source.name),
        );
        let asset = GeometryAsset::new(name, derived.into_buffers())?.with_readable(readable);
        let committed = scene.add_asset(asset);

        if scene.mesh_binding(node, slot)? == Some(MeshBinding::Derived(id)) {
            scene.set_mesh_binding(node, slot, Some(MeshBinding::Asset(committed)))?;
        }
        self.original = Some(committed);
        Ok(Some((id, committed)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn reconcile_allocates_for_readable_source() {
        let mut scene = Scene::new();
        let asset = fixtures::add_cube(&mut scene);
        let mut detail = MeshDetail::new(asset);

        detail
            .reconcile(&scene, Some(MeshBinding::Asset(asset)), Some(asset), true)
            .unwrap();
        let derived = detail.derived().unwrap();
        assert_eq!(derived.source(), asset);
        assert_eq!(
            detail.expected_binding(true),
            Some(MeshBinding::Derived(derived.id()))
        );
        assert_eq!(detail.expected_binding(false), Some(MeshBinding::Asset(asset)));
    }

    #[test]
    fn unreadable_source_gets_no_derived_copy() {
        let mut scene = Scene::new();
        let asset = fixtures::add_cube(&mut scene);
        scene.set_readable(asset, false).unwrap();
        let mut detail = MeshDetail::new(asset);

        detail
            .reconcile(&scene, Some(MeshBinding::Asset(asset)), Some(asset), true)
            .unwrap();
        assert!(detail.derived().is_none());

        scene.set_readable(asset, true).unwrap();
        detail
            .reconcile(&scene, Some(MeshBinding::Asset(asset)), Some(asset), true)
            .unwrap();
        assert!(detail.derived().is_some());
    }

    #[test]
    fn replaced_mesh_is_adopted() {
        let mut scene = Scene::new();
        let first = fixtures::add_cube(&mut scene);
        let second = fixtures::add_cube(&mut scene);
        let mut detail = MeshDetail::new(first);
        detail
            .reconcile(&scene, Some(MeshBinding::Asset(first)), Some(first), true)
            .unwrap();
        let old = detail.derived_id().unwrap();

        detail
            .reconcile(&scene, Some(MeshBinding::Asset(second)), Some(second), true)
            .unwrap();
        assert_eq!(detail.original(), Some(second));
        assert_ne!(detail.derived_id(), Some(old));
    }

    #[test]
    fn own_binding_is_not_a_replacement() {
        let mut scene = Scene::new();
        let asset = fixtures::add_cube(&mut scene);
        let mut detail = MeshDetail::new(asset);
        detail
            .reconcile(&scene, Some(MeshBinding::Asset(asset)), Some(asset), true)
            .unwrap();
        let id = detail.derived_id().unwrap();

        // Disabled state while still bound to the derived copy.
        detail
            .reconcile(&scene, Some(MeshBinding::Derived(id)), Some(asset), false)
            .unwrap();
        assert_eq!(detail.derived_id(), Some(id));
    }

    #[test]
    fn commit_uploads_only_on_change() {
        let mut scene = Scene::new();
        let asset = fixtures::add_cube(&mut scene);
        let mut detail = MeshDetail::new(asset);
        detail
            .reconcile(&scene, Some(MeshBinding::Asset(asset)), Some(asset), true)
            .unwrap();

        let hash = ContentHash::of_u64(3);
        assert!(detail.commit_slice(hash, None, true));
        assert!(!detail.commit_slice(hash, None, true));
        assert!(detail.commit_slice(hash, None, false));
        assert_eq!(detail.derived().unwrap().revision(), 2);
    }
}
