use tracing::trace;

use super::{component_base_hash, CommittedGeometry, ComponentContext, SliceComponent};
use crate::detail::{Detail, DetailKey, DetailStore, MeshDetail};
use crate::error::Result;
use crate::geometry::{AssetId, DerivedGeometry, DerivedId, Material, UvMappingSettings};
use crate::hash::ContentHash;
use crate::math::bounds::encapsulate;
use crate::math::BoundingBox;
use crate::scene::{AttachmentRef, MeshBinding, NodeId, Scene};
use crate::slicing::SliceFrame;

const SLOT: AttachmentRef = AttachmentRef::MeshFilter;

/// Slices the rendered meshes below a controller.
///
/// A node is tracked when it has a mesh filter and an enabled renderer.
#[derive(Debug, Clone)]
pub struct MeshSliceComponent {
    /// Keep the source positions instead of slicing them.
    pub skip_vertices: bool,
    /// Keep the source UVs instead of reprojecting them.
    pub skip_uvs: bool,
    /// Leave this component's meshes out of the complete bounds.
    pub skip_bounds: bool,
    pub uv_mapping: UvMappingSettings,
    enabled: bool,
    details: DetailStore<MeshDetail>,
}

impl Default for MeshSliceComponent {
    fn default() -> Self {
        Self {
            skip_vertices: false,
            skip_uvs: true,
            skip_bounds: false,
            uv_mapping: UvMappingSettings::default(),
            enabled: true,
            details: DetailStore::new(),
        }
    }
}

impl MeshSliceComponent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn details(&self) -> &DetailStore<MeshDetail> {
        &self.details
    }

    /// The detail tracking the mesh filter of `node`.
    #[must_use]
    pub fn detail_for(&self, node: NodeId) -> Option<(DetailKey, &Detail<MeshDetail>)> {
        let key = self.details.find(node, SLOT)?;
        Some((key, self.details.get(key)?))
    }

    /// Maps a binding back to the asset it stands for. Derived bindings
    /// resolve to the original of the detail owning them.
    #[must_use]
    pub fn resolve(&self, binding: MeshBinding) -> Option<AssetId> {
        match binding {
            MeshBinding::Asset(id) => Some(id),
            MeshBinding::Derived(id) => self
                .details
                .iter()
                .find(|(_, detail)| detail.kind().derived_id() == Some(id))
                .and_then(|(_, detail)| detail.kind().original()),
        }
    }

    /// Looks up derived geometry owned by one of the details.
    #[must_use]
    pub fn derived(&self, id: DerivedId) -> Option<&DerivedGeometry> {
        self.details
            .iter()
            .find_map(|(_, detail)| detail.kind().derived().filter(|d| d.id() == id))
    }

    fn detail_hash(detail: &Detail<MeshDetail>, scene: &Scene) -> Result<ContentHash> {
        let mut hash = detail.core().base_hash(scene)?;
        hash.append(detail.kind().identity_hash());

        let data = scene.node(detail.node())?;
        let binding = data.mesh_filter.and_then(|filter| filter.mesh);
        hash.append(binding.map_or(ContentHash::INVALID, MeshBinding::content_hash));

        let renderer = data.mesh_renderer.as_ref();
        hash.append(ContentHash::of_flag(
            renderer.is_some_and(|r| r.enabled),
            5,
        ));
        for material in renderer.into_iter().flat_map(|r| &r.materials) {
            hash.append(
                material
                    .as_ref()
                    .map_or(ContentHash::INVALID, Material::content_hash),
            );
        }
        Ok(hash)
    }
}

impl SliceComponent for MeshSliceComponent {
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
        _ctx: &ComponentContext<'_>,
    ) -> Result<()> {
        let data = scene.node(node)?;
        let (Some(filter), Some(renderer)) = (data.mesh_filter, data.mesh_renderer.as_ref()) else {
            return Ok(());
        };
        if !renderer.enabled {
            return Ok(());
        }
        let current = filter.mesh;
        let resolved = current.and_then(|binding| self.resolve(binding));

        let key = match self.details.find(node, SLOT) {
            Some(key) => key,
            None => {
                let Some(original) = resolved else {
                    return Ok(());
                };
                trace!(?node, "tracking mesh");
                self.details.insert(node, SLOT, MeshDetail::new(original))
            }
        };
        let enabled = self.enabled;
        let Some(Detail { core, kind }) = self.details.get_mut(key) else {
            return Ok(());
        };

        kind.reconcile(scene, current, resolved, enabled)?;
        if kind.original().is_none() {
            return Ok(());
        }
        kind.refresh_bounds(core, scene, root)?;
        kind.sync_binding(scene, node, SLOT, enabled)?;
        self.details.keep(key);
        Ok(())
    }

    fn post_gather(&mut self, scene: &mut Scene, _ctx: &ComponentContext<'_>) -> Result<ContentHash> {
        let mut hash = component_base_hash(self.enabled, self.skip_bounds);
        hash.append(self.uv_mapping.content_hash());
        hash.append(ContentHash::of_flag(self.skip_vertices, 3));
        hash.append(ContentHash::of_flag(self.skip_uvs, 4));

        for purged in self.details.sweep() {
            trace!(node = ?purged.node(), "purging mesh detail");
            purged.kind().disable(scene, purged.node(), SLOT)?;
        }

        for (_, detail) in self.details.iter_mut() {
            let detail_hash = Self::detail_hash(detail, scene)?;
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
            let Some(vertex_hash) =
                detail
                    .kind
                    .slice_vertices(scene, node, frame, self.skip_vertices, skip_unmodified)?
            else {
                continue;
            };
            let uv_hash = detail.kind.slice_uvs(
                scene,
                node,
                frame,
                &self.uv_mapping,
                self.skip_uvs,
                skip_unmodified,
            )?;
            if detail.kind.commit_slice(vertex_hash, uv_hash, skip_unmodified) {
                trace!(
                    ?node,
                    revision = detail.kind.derived().map_or(0, DerivedGeometry::revision),
                    "uploaded sliced mesh"
                );
            }
        }
        Ok(())
    }

    fn enable(&mut self, scene: &mut Scene, _ctx: &ComponentContext<'_>) -> Result<()> {
        self.enabled = true;
        for (_, detail) in self.details.iter() {
            detail.kind().enable(scene, detail.node(), SLOT)?;
        }
        Ok(())
    }

    fn disable(&mut self, scene: &mut Scene) -> Result<()> {
        self.enabled = false;
        for (_, detail) in self.details.iter() {
            detail.kind().disable(scene, detail.node(), SLOT)?;
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
        for mut detail in self.details.drain() {
            let node = detail.node();
            detail.kind.enable(scene, node, SLOT)?;
            let readable = ctx.settings.finalized_mesh_readable;
            if let Some((derived, asset)) = detail.kind.commit_to_scene(scene, node, SLOT, readable)? {
                committed.insert(derived, asset);
            }
        }
        Ok(())
    }
}
