use tracing::trace;

use super::{component_base_hash, CommittedGeometry, ComponentContext, MeshSliceComponent, SliceComponent};
use crate::detail::collider::write_box;
use crate::detail::{
    BoxColliderDetail, ColliderDetail, Detail, DetailKey, DetailStore, ManagedColliderDetail,
    MeshDetail,
};
use crate::error::Result;
use crate::geometry::{AssetId, DerivedGeometry, DerivedId};
use crate::hash::ContentHash;
use crate::math::bounds::{encapsulate, to_root_space};
use crate::math::BoundingBox;
use crate::scene::{AttachmentRef, Collider, ColliderId, ColliderShape, MeshBinding, NodeId, Scene};
use crate::slicing::{slice_box, SliceFrame};

/// Slices the colliders below a controller.
///
/// Must run after the mesh component of the same controller: mesh colliders
/// share the derived geometry of the mesh detail on their node when there
/// is one.
#[derive(Debug, Clone)]
pub struct ColliderSliceComponent {
    /// Keep the source positions of owned mesh colliders.
    pub skip_vertices: bool,
    /// Leave colliders out of the complete bounds.
    pub skip_bounds: bool,
    enabled: bool,
    details: DetailStore<ColliderDetail>,
}

impl Default for ColliderSliceComponent {
    fn default() -> Self {
        Self {
            skip_vertices: false,
            skip_bounds: false,
            enabled: true,
            details: DetailStore::new(),
        }
    }
}

impl ColliderSliceComponent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn details(&self) -> &DetailStore<ColliderDetail> {
        &self.details
    }

    /// The detail tracking collider `id` on `node`.
    #[must_use]
    pub fn detail_for(&self, node: NodeId, id: ColliderId) -> Option<&Detail<ColliderDetail>> {
        self.details
            .find(node, AttachmentRef::Collider(id))
            .and_then(|key| self.details.get(key))
    }

    /// Looks up derived geometry owned by a mesh collider detail.
    #[must_use]
    pub fn derived(&self, id: DerivedId) -> Option<&DerivedGeometry> {
        self.details.iter().find_map(|(_, detail)| match detail.kind() {
            ColliderDetail::Mesh(owned) => owned.derived().filter(|d| d.id() == id),
            _ => None,
        })
    }

    /// Maps a binding back to the asset it stands for, looking at our own
    /// derived copies first and then at the sibling's.
    fn resolve(&self, binding: MeshBinding, sibling: Option<&MeshSliceComponent>) -> Option<AssetId> {
        let MeshBinding::Derived(id) = binding else {
            return binding.asset();
        };
        let own = self.details.iter().find_map(|(_, detail)| match detail.kind() {
            ColliderDetail::Mesh(owned) if owned.derived_id() == Some(id) => owned.original(),
            ColliderDetail::Managed(managed) if managed.derived == Some(id) => managed.original,
            _ => None,
        });
        own.or_else(|| sibling.and_then(|mesh| mesh.resolve(binding)))
    }

    // --- Gather by shape ---

    fn gather_collider(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        id: ColliderId,
        root: NodeId,
        ctx: &ComponentContext<'_>,
    ) -> Result<()> {
        let collider = *scene.collider(id)?;
        let slot = AttachmentRef::Collider(id);
        match collider.shape {
            ColliderShape::Mesh { mesh } => self.gather_mesh(scene, node, slot, mesh, root, ctx),
            ColliderShape::Box { .. } => self.gather_box(scene, node, slot, collider, root, ctx),
            ColliderShape::Sphere { .. } | ColliderShape::Capsule { .. } => {
                let shape = collider.shape.kind_name();
                let key = match self.details.find(node, slot) {
                    Some(key)
                        if matches!(
                            self.details.get(key).map(Detail::kind),
                            Some(ColliderDetail::Unsupported { shape: known }) if *known == shape
                        ) =>
                    {
                        key
                    }
                    _ => {
                        trace!(?node, shape, "tracking unsupported collider");
                        self.details
                            .insert(node, slot, ColliderDetail::Unsupported { shape })
                    }
                };
                self.details.keep(key);
                Ok(())
            }
        }
    }

    /// The sibling mesh detail a mesh collider can share, if sharing is
    /// possible this cycle.
    fn managing_detail(
        &self,
        scene: &Scene,
        node: NodeId,
        current: MeshBinding,
        resolved: Option<AssetId>,
        sibling: Option<&MeshSliceComponent>,
    ) -> Result<Option<(DetailKey, ManagedColliderDetail)>> {
        let Some(mesh) = sibling else {
            return Ok(None);
        };
        if self.enabled && !mesh.is_enabled() {
            return Ok(None);
        }
        let Some((key, detail)) = mesh.detail_for(node) else {
            return Ok(None);
        };
        if detail.core().is_pending_removal() {
            return Ok(None);
        }
        let renderer_enabled = scene
            .node(node)?
            .mesh_renderer
            .as_ref()
            .is_some_and(|renderer| renderer.enabled);
        if !renderer_enabled {
            return Ok(None);
        }

        let shared = detail.kind();
        let same_geometry = shared.matches(current)
            || (resolved.is_some() && resolved == shared.original());
        if !same_geometry {
            return Ok(None);
        }
        Ok(Some((
            key,
            ManagedColliderDetail {
                mesh_detail: key,
                original: shared.original(),
                derived: shared.derived_id(),
                last_vertex_hash: None,
            },
        )))
    }

    fn gather_mesh(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        slot: AttachmentRef,
        current: Option<MeshBinding>,
        root: NodeId,
        ctx: &ComponentContext<'_>,
    ) -> Result<()> {
        let Some(binding) = current else {
            return Ok(());
        };
        let resolved = self.resolve(binding, ctx.sibling);
        let existing = self.details.find(node, slot);

        if let Some((mesh_key, mut managed)) =
            self.managing_detail(scene, node, binding, resolved, ctx.sibling)?
        {
            let previous = existing.and_then(|key| self.details.get(key));
            match previous.map(Detail::kind) {
                Some(ColliderDetail::Managed(old))
                    if old.mesh_detail == mesh_key && old.derived == managed.derived =>
                {
                    managed.last_vertex_hash = old.last_vertex_hash;
                }
                Some(ColliderDetail::Mesh(owned)) => owned.disable(scene, node, slot)?,
                _ => {}
            }
            if !matches!(previous.map(Detail::kind), Some(ColliderDetail::Managed(_))) {
                trace!(?node, "sharing mesh collider geometry with the mesh detail");
            }

            let bounds = ctx
                .sibling
                .and_then(|mesh| mesh.details().get(mesh_key))
                .and_then(|detail| detail.core().original_bounds());
            if self.enabled {
                managed.enable(scene, node, slot)?;
            } else {
                managed.disable(scene, node, slot)?;
            }
            let key = self
                .details
                .insert(node, slot, ColliderDetail::Managed(managed));
            if let Some(detail) = self.details.get_mut(key) {
                detail.core.original_bounds = bounds;
            }
            self.details.keep(key);
            return Ok(());
        }

        // No sibling to share with: own a derived copy.
        let key = match existing.and_then(|key| self.details.get(key).map(|d| (key, d.kind()))) {
            Some((key, ColliderDetail::Mesh(_))) => key,
            previous => {
                if let Some((_, ColliderDetail::Managed(managed))) = previous {
                    managed.disable(scene, node, slot)?;
                }
                let current = scene.mesh_binding(node, slot)?;
                let Some(original) = current.and_then(|b| self.resolve(b, ctx.sibling)) else {
                    return Ok(());
                };
                trace!(?node, "tracking mesh collider");
                self.details
                    .insert(node, slot, ColliderDetail::Mesh(MeshDetail::new(original)))
            }
        };

        let current = scene.mesh_binding(node, slot)?;
        let resolved = current.and_then(|b| self.resolve(b, ctx.sibling));
        let enabled = self.enabled;
        let Some(Detail { core, kind }) = self.details.get_mut(key) else {
            return Ok(());
        };
        let ColliderDetail::Mesh(owned) = kind else {
            return Ok(());
        };
        owned.reconcile(scene, current, resolved, enabled)?;
        if owned.original().is_none() {
            return Ok(());
        }
        owned.refresh_bounds(core, scene, root)?;
        owned.sync_binding(scene, node, slot, enabled)?;
        self.details.keep(key);
        Ok(())
    }

    fn gather_box(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        slot: AttachmentRef,
        collider: Collider,
        root: NodeId,
        ctx: &ComponentContext<'_>,
    ) -> Result<()> {
        let Some(mut current) = collider.shape.as_box() else {
            return Ok(());
        };
        let existing = self
            .details
            .find(node, slot)
            .filter(|&key| matches!(self.details.get(key).map(Detail::kind), Some(ColliderDetail::Box(_))));

        let key = match existing {
            Some(key) => {
                if !self.enabled {
                    if let Some(ColliderDetail::Box(boxed)) =
                        self.details.get_mut(key).map(|d| &mut d.kind)
                    {
                        boxed.original = current;
                    }
                }
                key
            }
            None => {
                if self.enabled && collider.shape == ColliderShape::default_box() {
                    if let Some(fitted) = Self::fit_to_mesh(scene, node, ctx.sibling)? {
                        trace!(?node, "fitting default box collider to its mesh");
                        write_box(scene, slot, &fitted)?;
                        current = fitted;
                    }
                }
                trace!(?node, "tracking box collider");
                self.details.insert(
                    node,
                    slot,
                    ColliderDetail::Box(BoxColliderDetail {
                        original: current,
                        sliced: None,
                    }),
                )
            }
        };

        if let Some(detail) = self.details.get_mut(key) {
            if let ColliderDetail::Box(boxed) = &detail.kind {
                let bounds = to_root_space(scene, &boxed.original, node, root)?;
                detail.core.original_bounds = Some(bounds);
            }
        }
        self.details.keep(key);
        Ok(())
    }

    /// Local bounds of the source mesh of the sibling detail on `node`.
    fn fit_to_mesh(
        scene: &Scene,
        node: NodeId,
        sibling: Option<&MeshSliceComponent>,
    ) -> Result<Option<BoundingBox>> {
        let original = sibling
            .and_then(|mesh| mesh.detail_for(node))
            .and_then(|(_, detail)| detail.kind().original());
        let Some(original) = original else {
            return Ok(None);
        };
        let asset = scene.asset(original)?;
        if !asset.readable {
            return Ok(None);
        }
        Ok(asset.buffers.bounds())
    }

    fn detail_hash(
        detail: &Detail<ColliderDetail>,
        scene: &Scene,
        sibling: Option<&MeshSliceComponent>,
    ) -> Result<ContentHash> {
        let mut hash = detail.core().base_hash(scene)?;
        let slot = detail.core().slot();
        let collider_enabled = match slot.collider() {
            Some(id) => scene.collider(id)?.enabled,
            None => false,
        };
        let binding = scene.mesh_binding(detail.node(), slot)?;
        let binding_hash = binding.map_or(ContentHash::INVALID, MeshBinding::content_hash);

        match detail.kind() {
            ColliderDetail::Mesh(owned) => {
                hash.append(owned.identity_hash());
                hash.append(binding_hash);
                hash.append(ContentHash::of_flag(collider_enabled, 5));
            }
            ColliderDetail::Managed(managed) => {
                let shared = sibling
                    .and_then(|mesh| mesh.details().get(managed.mesh_detail))
                    .map_or(ContentHash::INVALID, |d| d.core().hash());
                hash.append(shared);
                hash.append(ContentHash::of_flag(collider_enabled, 5));
                hash.append(binding_hash);
            }
            ColliderDetail::Box(boxed) => {
                hash.append(ContentHash::of_bounds(&boxed.original));
                hash.append(ContentHash::of_flag(collider_enabled, 5));
            }
            ColliderDetail::Unsupported { shape } => {
                hash.append(ContentHash::of_bytes("shape", shape.as_bytes()));
            }
        }
        Ok(hash)
    }

    fn enable_detail(
        detail: &Detail<ColliderDetail>,
        scene: &mut Scene,
    ) -> Result<()> {
        let (node, slot) = (detail.node(), detail.core().slot());
        match detail.kind() {
            ColliderDetail::Mesh(owned) => owned.enable(scene, node, slot),
            ColliderDetail::Managed(managed) => managed.enable(scene, node, slot),
            ColliderDetail::Box(boxed) => boxed.enable(scene, slot),
            ColliderDetail::Unsupported { .. } => Ok(()),
        }
    }
}

impl SliceComponent for ColliderSliceComponent {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn pre_gather(&mut self) {
        self.details.mark_all();
    }

    fn gather(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        root: NodeId,
        ctx: &ComponentContext<'_>,
    ) -> Result<()> {
        let colliders = scene.node(node)?.colliders.clone();
        for id in colliders {
            self.gather_collider(scene, node, id, root, ctx)?;
        }
        Ok(())
    }

    fn post_gather(&mut self, scene: &mut Scene, ctx: &ComponentContext<'_>) -> Result<ContentHash> {
        let mut hash = component_base_hash(self.enabled, self.skip_bounds);
        hash.append(ContentHash::of_flag(self.skip_vertices, 3));

        for purged in self.details.sweep() {
            trace!(node = ?purged.node(), kind = purged.kind().kind_name(), "purging collider detail");
            purged
                .kind()
                .disable(scene, purged.node(), purged.core().slot())?;
        }

        for (_, detail) in self.details.iter_mut() {
            let detail_hash = Self::detail_hash(detail, scene, ctx.sibling)?;
            detail.core.hash = detail_hash;
            hash.append(detail_hash);
        }
        Ok(hash)
    }

    fn calculate_bounds(&self) -> Option<BoundingBox> {
        if self.skip_bounds {
            return None;
        }
        self.details
            .iter()
            .fold(None, |acc, (_, detail)| {
                encapsulate(acc, detail.core().original_bounds())
            })
    }

    fn slice(&mut self, scene: &mut Scene, frame: &SliceFrame, ctx: &ComponentContext<'_>) -> Result<()> {
        let skip_unmodified = ctx.settings.skip_unmodified;
        for (_, detail) in self.details.iter_mut() {
            let node = detail.core.node();
            let slot = detail.core.slot();
            match &mut detail.kind {
                ColliderDetail::Mesh(owned) => {
                    let Some(vertex_hash) =
                        owned.slice_vertices(scene, node, frame, self.skip_vertices, skip_unmodified)?
                    else {
                        continue;
                    };
                    if owned.commit_slice(vertex_hash, None, skip_unmodified) {
                        owned.enable(scene, node, slot)?;
                        trace!(?node, "uploaded sliced mesh collider");
                    }
                }
                ColliderDetail::Managed(managed) => {
                    let Some(shared) = ctx
                        .sibling
                        .and_then(|mesh| mesh.details().get(managed.mesh_detail))
                    else {
                        continue;
                    };
                    let vertex_hash = shared.kind().sliced_vertex_hash();
                    if skip_unmodified
                        && managed.last_vertex_hash.is_some()
                        && managed.last_vertex_hash == vertex_hash
                    {
                        continue;
                    }
                    managed.derived = shared.kind().derived_id();
                    managed.enable(scene, node, slot)?;
                    managed.last_vertex_hash = vertex_hash;
                }
                ColliderDetail::Box(boxed) => {
                    let sliced = slice_box(scene, &boxed.original, node, frame)?;
                    boxed.sliced = Some(sliced);
                    write_box(scene, slot, &sliced)?;
                }
                ColliderDetail::Unsupported { .. } => {}
            }
        }
        Ok(())
    }

    fn enable(&mut self, scene: &mut Scene, _ctx: &ComponentContext<'_>) -> Result<()> {
        self.enabled = true;
        for (_, detail) in self.details.iter() {
            Self::enable_detail(detail, scene)?;
        }
        Ok(())
    }

    fn disable(&mut self, scene: &mut Scene) -> Result<()> {
        self.enabled = false;
        for (_, detail) in self.details.iter() {
            detail
                .kind()
                .disable(scene, detail.node(), detail.core().slot())?;
        }
        Ok(())
    }

    fn finalize(
        &mut self,
        scene: &mut Scene,
        ctx: &ComponentContext<'_>,
        committed: &mut CommittedGeometry,
    ) -> Result<()> {
        self.enabled = true;
        let readable = ctx.settings.finalized_mesh_readable;
        for mut detail in self.details.drain() {
            Self::enable_detail(&detail, scene)?;
            let (node, slot) = (detail.node(), detail.core().slot());
            match &mut detail.kind {
                ColliderDetail::Mesh(owned) => {
                    if let Some((derived, asset)) = owned.commit_to_scene(scene, node, slot, readable)? {
                        committed.insert(derived, asset);
                    }
                }
                ColliderDetail::Managed(managed) => {
                    let Some(derived) = managed.derived else {
                        continue;
                    };
                    if scene.mesh_binding(node, slot)? != Some(MeshBinding::Derived(derived)) {
                        continue;
                    }
                    let replacement = committed
                        .get(&derived)
                        .copied()
                        .or(managed.original)
                        .map(MeshBinding::Asset);
                    scene.set_mesh_binding(node, slot, replacement)?;
                }
                ColliderDetail::Box(_) | ColliderDetail::Unsupported { .. } => {}
            }
        }
        Ok(())
    }
}
