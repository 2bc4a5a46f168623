//! The slice controller: one per root node, driving its components and
//! modifiers through the gather, slice and modify cycle.

use tracing::{debug, info, trace};

use crate::component::{
    ColliderSliceComponent, CommittedGeometry, ComponentContext, MeshSliceComponent,
    SliceComponent,
};
use crate::detail::{ColliderDetail, DetailCounts};
use crate::error::{CycleError, Result, SlicerError};
use crate::geometry::MeshBuffers;
use crate::hash::ContentHash;
use crate::math::bounds::encapsulate;
use crate::math::BoundingBox;
use crate::modifier;
use crate::scene::{collect, MeshBinding, ModifierId, NodeId, Scene, Traversal};
use crate::settings::{SliceConfig, SlicerSettings};
use crate::slicing::SliceFrame;

/// Where a controller is in its cycle.
///
/// Every entry point takes `&mut self`, so a second cycle cannot start while
/// one is running; the [`CycleError::Reentrant`] check on the phase is a
/// state check and is not reachable through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Gather,
    Slice,
    Modify,
    /// Slicing was made permanent; the controller accepts no more cycles.
    Finalized,
}

/// What a tick or refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No cycle ran.
    Skipped,
    /// A cycle ran but nothing was recomputed.
    Unchanged,
    /// Geometry and modifiers were recomputed.
    Sliced,
}

/// Drives slicing of everything below one root node.
///
/// The controller owns its components. The scene owns the nodes, the
/// persistent [`SliceConfig`] (in the root's controller marker) and the
/// modifiers.
#[derive(Debug)]
pub struct SliceController {
    root: NodeId,
    mesh: Option<MeshSliceComponent>,
    collider: Option<ColliderSliceComponent>,
    phase: CyclePhase,
    modifiers: Vec<ModifierId>,
    modifier_nodes: Vec<NodeId>,
    ignored: Vec<NodeId>,
    complete_bounds: Option<BoundingBox>,
    sliced_bounds: Option<BoundingBox>,
    previous_hash: Option<ContentHash>,
}

impl SliceController {
    /// Roots a controller at `root` with a mesh and a collider component,
    /// storing `config` in the root's controller marker.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not in the scene.
    pub fn new(scene: &mut Scene, root: NodeId, config: SliceConfig) -> Result<Self> {
        scene.attach_controller(root, config)?;
        Ok(Self::with_root(root))
    }

    /// Roots a controller at `root`, keeping the config already stored
    /// there if the node carries a controller marker.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not in the scene.
    pub fn attach(scene: &mut Scene, root: NodeId) -> Result<Self> {
        if scene.controller_attachment(root)?.is_none() {
            scene.attach_controller(root, SliceConfig::default())?;
        }
        Ok(Self::with_root(root))
    }

    fn with_root(root: NodeId) -> Self {
        Self {
            root,
            mesh: Some(MeshSliceComponent::new()),
            collider: Some(ColliderSliceComponent::new()),
            phase: CyclePhase::Idle,
            modifiers: Vec::new(),
            modifier_nodes: Vec::new(),
            ignored: Vec::new(),
            complete_bounds: None,
            sliced_bounds: None,
            previous_hash: None,
        }
    }

    /// Replaces the mesh component.
    #[must_use]
    pub fn with_mesh_component(mut self, component: MeshSliceComponent) -> Self {
        self.mesh = Some(component);
        self
    }

    /// Replaces the collider component.
    #[must_use]
    pub fn with_collider_component(mut self, component: ColliderSliceComponent) -> Self {
        self.collider = Some(component);
        self
    }

    #[must_use]
    pub fn without_mesh_component(mut self) -> Self {
        self.mesh = None;
        self
    }

    #[must_use]
    pub fn without_collider_component(mut self) -> Self {
        self.collider = None;
        self
    }

    // --- Accessors ---

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Union of the source bounds of every detail, in root space, as of the
    /// last recomputing cycle.
    #[must_use]
    pub fn complete_bounds(&self) -> Option<BoundingBox> {
        self.complete_bounds
    }

    /// Where the complete bounds end up after slicing.
    #[must_use]
    pub fn sliced_bounds(&self) -> Option<BoundingBox> {
        self.sliced_bounds
    }

    /// Hash of the last cycle, `None` before the first.
    #[must_use]
    pub fn previous_hash(&self) -> Option<ContentHash> {
        self.previous_hash
    }

    /// Ignore markers found by the last cycle.
    #[must_use]
    pub fn ignored_nodes(&self) -> &[NodeId] {
        &self.ignored
    }

    /// Nodes whose modifiers the last cycle drove.
    #[must_use]
    pub fn modifier_nodes(&self) -> &[NodeId] {
        &self.modifier_nodes
    }

    #[must_use]
    pub fn mesh_component(&self) -> Option<&MeshSliceComponent> {
        self.mesh.as_ref()
    }

    /// Mutable access to the mesh component. Settings changed here are
    /// picked up by the next cycle's hash.
    pub fn mesh_component_mut(&mut self) -> Option<&mut MeshSliceComponent> {
        self.mesh.as_mut()
    }

    #[must_use]
    pub fn collider_component(&self) -> Option<&ColliderSliceComponent> {
        self.collider.as_ref()
    }

    pub fn collider_component_mut(&mut self) -> Option<&mut ColliderSliceComponent> {
        self.collider.as_mut()
    }

    /// Live details per kind.
    #[must_use]
    pub fn detail_counts(&self) -> DetailCounts {
        let mut counts = DetailCounts {
            mesh: self.mesh.as_ref().map_or(0, |mesh| mesh.details().len()),
            ..DetailCounts::default()
        };
        for (_, detail) in self.collider.iter().flat_map(|c| c.details().iter()) {
            match detail.kind() {
                ColliderDetail::Mesh(_) => counts.mesh_collider += 1,
                ColliderDetail::Managed(_) => counts.managed_collider += 1,
                ColliderDetail::Box(_) => counts.box_collider += 1,
                ColliderDetail::Unsupported { .. } => counts.unsupported_collider += 1,
            }
        }
        counts
    }

    /// The buffers a binding currently points at: a scene asset, or derived
    /// geometry owned by one of this controller's details.
    #[must_use]
    pub fn mesh_buffers<'a>(&'a self, scene: &'a Scene, binding: MeshBinding) -> Option<&'a MeshBuffers> {
        match binding {
            MeshBinding::Asset(id) => scene.asset(id).ok().map(|asset| &asset.buffers),
            MeshBinding::Derived(id) => self
                .mesh
                .as_ref()
                .and_then(|mesh| mesh.derived(id))
                .or_else(|| self.collider.as_ref().and_then(|c| c.derived(id)))
                .map(|derived| &derived.buffers),
        }
    }

    // --- Config ---

    /// The config stored in the root's controller marker.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::MissingRoot`] if the root or its marker is gone.
    pub fn config(&self, scene: &Scene) -> Result<SliceConfig> {
        scene
            .controller_attachment(self.root)
            .ok()
            .flatten()
            .map(|attachment| attachment.config)
            .ok_or_else(|| CycleError::MissingRoot.into())
    }

    /// Stores a new config and requests a refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is finalized or its root is gone.
    pub fn set_config(&self, scene: &mut Scene, config: SliceConfig) -> Result<()> {
        self.ensure_live()?;
        let attachment = scene
            .node_mut(self.root)
            .ok()
            .and_then(|data| data.controller.as_mut())
            .ok_or(CycleError::MissingRoot)?;
        attachment.config = config;
        attachment.refresh_requested = true;
        Ok(())
    }

    // --- Cycle entry points ---

    /// Per-frame entry point. Runs a cycle when `refresh_on_update` is set or
    /// a refresh was requested since the last cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is finalized or busy, its root is
    /// gone, or a scene lookup fails during the cycle.
    pub fn tick(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<CycleOutcome> {
        self.ensure_idle()?;
        let requested = scene
            .controller_attachment(self.root)
            .ok()
            .flatten()
            .ok_or(CycleError::MissingRoot)?
            .refresh_requested;
        if !settings.refresh_on_update && !requested {
            return Ok(CycleOutcome::Skipped);
        }
        self.run_cycle(scene, settings)
    }

    /// Flags this controller to run on its next tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is finalized or its root is gone.
    pub fn request_refresh(&self, scene: &mut Scene) -> Result<()> {
        self.ensure_live()?;
        scene
            .request_refresh(self.root)
            .map_err(|_| CycleError::MissingRoot.into())
    }

    /// Runs a cycle immediately, whatever the refresh policy.
    ///
    /// # Errors
    ///
    /// Same as [`tick`](Self::tick).
    pub fn refresh_now(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<CycleOutcome> {
        self.ensure_idle()?;
        self.run_cycle(scene, settings)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.phase == CyclePhase::Finalized {
            return Err(CycleError::Finalized.into());
        }
        Ok(())
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.phase {
            CyclePhase::Idle => Ok(()),
            CyclePhase::Finalized => Err(CycleError::Finalized.into()),
            CyclePhase::Gather | CyclePhase::Slice | CyclePhase::Modify => {
                Err(CycleError::Reentrant.into())
            }
        }
    }

    fn run_cycle(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<CycleOutcome> {
        let result = self.cycle(scene, settings);
        self.phase = CyclePhase::Idle;
        result
    }

    fn cycle(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<CycleOutcome> {
        let config = self.config(scene)?;
        if let Some(attachment) = scene.node_mut(self.root)?.controller.as_mut() {
            attachment.refresh_requested = false;
        }

        self.phase = CyclePhase::Gather;
        let walk = collect(scene, self.root)?;
        let mut hash = self.gather(scene, settings, &walk)?;
        hash.append(self.gather_modifiers(scene, walk.modifiers)?);
        hash.append(config.content_hash());
        self.ignored = walk.ignored;

        let changed = self.previous_hash != Some(hash) || !settings.skip_unmodified;
        if !changed {
            trace!(root = ?self.root, %hash, "cycle hash unchanged");
            return Ok(CycleOutcome::Unchanged);
        }

        self.complete_bounds = encapsulate(
            self.mesh.as_ref().and_then(SliceComponent::calculate_bounds),
            self.collider.as_ref().and_then(SliceComponent::calculate_bounds),
        );
        if let Some(attachment) = scene.node_mut(self.root)?.controller.as_mut() {
            attachment.complete_bounds = self.complete_bounds;
        }
        let Some(complete) = self.complete_bounds else {
            self.sliced_bounds = None;
            self.previous_hash = Some(hash);
            debug!(root = ?self.root, %hash, "nothing to slice");
            return Ok(CycleOutcome::Unchanged);
        };

        let frame = SliceFrame::new(self.root, &config, complete);
        self.sliced_bounds = Some(frame.sliced);

        self.phase = CyclePhase::Slice;
        if let Some(mesh) = self.mesh.as_mut().filter(|mesh| mesh.is_enabled()) {
            let ctx = ComponentContext { settings, sibling: None };
            mesh.slice(scene, &frame, &ctx)?;
        }
        if let Some(colliders) = self.collider.as_mut().filter(|c| c.is_enabled()) {
            let ctx = ComponentContext {
                settings,
                sibling: self.mesh.as_ref(),
            };
            colliders.slice(scene, &frame, &ctx)?;
        }

        self.phase = CyclePhase::Modify;
        for &id in &self.modifiers {
            modifier::modify(scene, id, &frame)?;
        }

        self.previous_hash = Some(hash);
        let counts = self.detail_counts();
        debug!(
            root = ?self.root,
            %hash,
            details = counts.total(),
            modifiers = self.modifiers.len(),
            "sliced"
        );
        Ok(CycleOutcome::Sliced)
    }

    /// Runs the gather phase of both components over the walked nodes and
    /// returns their combined hash.
    fn gather(&mut self, scene: &mut Scene, settings: &SlicerSettings, walk: &Traversal) -> Result<ContentHash> {
        let root = self.root;
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.pre_gather();
        }
        if let Some(colliders) = self.collider.as_mut() {
            colliders.pre_gather();
        }

        for &node in &walk.nodes {
            if let Some(mesh) = self.mesh.as_mut() {
                let ctx = ComponentContext { settings, sibling: None };
                mesh.gather(scene, node, root, &ctx)?;
            }
            if let Some(colliders) = self.collider.as_mut() {
                let ctx = ComponentContext {
                    settings,
                    sibling: self.mesh.as_ref(),
                };
                colliders.gather(scene, node, root, &ctx)?;
            }
        }

        let mut hash = ContentHash::INVALID;
        if let Some(mesh) = self.mesh.as_mut() {
            let ctx = ComponentContext { settings, sibling: None };
            hash.append(mesh.post_gather(scene, &ctx)?);
        }
        if let Some(colliders) = self.collider.as_mut() {
            let ctx = ComponentContext {
                settings,
                sibling: self.mesh.as_ref(),
            };
            hash.append(colliders.post_gather(scene, &ctx)?);
        }
        Ok(hash)
    }

    /// Disables modifiers that left the controller's scope, then gathers the
    /// current ones.
    fn gather_modifiers(&mut self, scene: &mut Scene, current: Vec<ModifierId>) -> Result<ContentHash> {
        for &stale in &self.modifiers {
            if !current.contains(&stale) && scene.contains_modifier(stale) {
                trace!(?stale, "modifier left the controller, disabling");
                modifier::disable(scene, stale)?;
            }
        }

        let mut hash = ContentHash::INVALID;
        self.modifier_nodes.clear();
        for &id in &current {
            hash.append(modifier::gather(scene, id)?);
            self.modifier_nodes.push(scene.modifier(id)?.node());
        }
        self.modifiers = current;
        Ok(hash)
    }

    // --- Lifecycle ---

    /// Binds every detail to its sliced state and re-enables modifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is finalized or busy, or the scene
    /// cannot be updated.
    pub fn enable_slicing(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<()> {
        self.ensure_idle()?;
        if let Some(mesh) = self.mesh.as_mut() {
            let ctx = ComponentContext { settings, sibling: None };
            mesh.enable(scene, &ctx)?;
        }
        if let Some(colliders) = self.collider.as_mut() {
            let ctx = ComponentContext {
                settings,
                sibling: self.mesh.as_ref(),
            };
            colliders.enable(scene, &ctx)?;
        }
        for &id in &self.modifiers {
            if scene.contains_modifier(id) {
                modifier::enable(scene, id)?;
            }
        }
        self.request_refresh(scene)
    }

    /// Binds every detail back to its original state and restores the
    /// originals of every modifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is finalized or busy, or the scene
    /// cannot be updated.
    pub fn disable_slicing(&mut self, scene: &mut Scene) -> Result<()> {
        self.ensure_idle()?;
        if let Some(mesh) = self.mesh.as_mut() {
            mesh.disable(scene)?;
        }
        if let Some(colliders) = self.collider.as_mut() {
            colliders.disable(scene)?;
        }
        for &id in &self.modifiers {
            if scene.contains_modifier(id) {
                modifier::disable(scene, id)?;
            }
        }
        self.request_refresh(scene)
    }

    /// Makes the current sliced state permanent.
    ///
    /// Derived geometry becomes scene assets, modifiers commit their sliced
    /// values and are removed, ignore markers below the root are cleared and
    /// the root's controller marker is removed. The controller accepts no
    /// further cycles.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is already finalized or busy, or
    /// the scene cannot be updated.
    pub fn finalize_slicing(&mut self, scene: &mut Scene, settings: &SlicerSettings) -> Result<()> {
        self.ensure_idle()?;
        let walk = collect(scene, self.root).map_err(|err| match err {
            SlicerError::Scene(_) => SlicerError::from(CycleError::MissingRoot),
            other => other,
        })?;

        let mut committed = CommittedGeometry::new();
        if let Some(mesh) = self.mesh.as_mut() {
            let ctx = ComponentContext { settings, sibling: None };
            mesh.finalize(scene, &ctx, &mut committed)?;
        }
        if let Some(colliders) = self.collider.as_mut() {
            let ctx = ComponentContext {
                settings,
                sibling: self.mesh.as_ref(),
            };
            colliders.finalize(scene, &ctx, &mut committed)?;
        }

        for &id in &walk.modifiers {
            modifier::finalize(scene, id)?;
        }
        for &node in &walk.ignored {
            scene.node_mut(node)?.ignore = false;
        }
        scene.node_mut(self.root)?.controller = None;

        self.modifiers.clear();
        self.modifier_nodes.clear();
        self.ignored.clear();
        self.phase = CyclePhase::Finalized;
        info!(root = ?self.root, assets = committed.len(), "slicing finalized");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::geometry::{GeometryAsset, MappingMode, UvMappingSettings};
    use crate::math::{Point3, Vector2, Vector3};
    use crate::modifier::ModifierKind;
    use crate::scene::{Collider, ColliderShape, Transform};
    use approx::assert_relative_eq;

    fn stretched(x: f64) -> SliceConfig {
        SliceConfig::default().with_size(Vector3::new(x, 1.0, 1.0))
    }

    fn binding(scene: &Scene, node: NodeId) -> MeshBinding {
        scene.node(node).unwrap().mesh_filter.unwrap().mesh.unwrap()
    }

    /// Root with one cube below it.
    fn cube_scene() -> (Scene, NodeId, NodeId, crate::geometry::AssetId) {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let cube = fixtures::add_cube(&mut scene);
        let node = fixtures::add_mesh_node(&mut scene, root, "cube", cube);
        (scene, root, node, cube)
    }

    fn max_x(buffers: &MeshBuffers) -> f64 {
        buffers.positions.iter().map(|p| p.x).fold(f64::MIN, f64::max)
    }

    #[test]
    fn second_cycle_with_unchanged_inputs_does_nothing() {
        let (mut scene, root, node, _) = cube_scene();
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();

        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        let MeshBinding::Derived(id) = binding(&scene, node) else {
            panic!("expected a derived binding");
        };
        let first = controller.mesh_component().unwrap().derived(id).unwrap().clone();
        assert_eq!(first.revision(), 1);
        assert_relative_eq!(max_x(&first.buffers), 1.0);

        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Unchanged);
        assert_eq!(binding(&scene, node), MeshBinding::Derived(id));
        let second = controller.mesh_component().unwrap().derived(id).unwrap();
        assert_eq!(second.revision(), first.revision());
        assert_eq!(second.buffers, first.buffers);
    }

    #[test]
    fn tick_runs_only_when_requested_or_always_refreshing() {
        let (mut scene, root, _, _) = cube_scene();
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();

        // A fresh attachment starts with a pending request.
        assert_eq!(controller.tick(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        assert_eq!(controller.tick(&mut scene, &settings).unwrap(), CycleOutcome::Skipped);

        controller.request_refresh(&mut scene).unwrap();
        assert_eq!(controller.tick(&mut scene, &settings).unwrap(), CycleOutcome::Unchanged);
        assert_eq!(controller.tick(&mut scene, &settings).unwrap(), CycleOutcome::Skipped);

        let always = SlicerSettings {
            refresh_on_update: true,
            ..SlicerSettings::default()
        };
        assert_eq!(controller.tick(&mut scene, &always).unwrap(), CycleOutcome::Unchanged);

        controller.set_config(&mut scene, stretched(3.0)).unwrap();
        assert_eq!(controller.tick(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
    }

    #[test]
    fn memoization_off_recomputes_every_cycle() {
        let (mut scene, root, node, _) = cube_scene();
        let settings = SlicerSettings::always_recompute();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();

        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);

        let MeshBinding::Derived(id) = binding(&scene, node) else {
            panic!("expected a derived binding");
        };
        let derived = controller.mesh_component().unwrap().derived(id).unwrap();
        assert_eq!(derived.revision(), 2);
    }

    #[test]
    fn disable_restores_originals_and_enable_rebinds() {
        let (mut scene, root, node, cube) = cube_scene();
        let boxed = scene
            .add_collider(node, Collider::new(ColliderShape::default_box()))
            .unwrap();
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();

        let sliced_binding = binding(&scene, node);
        let sliced_box = scene.collider(boxed).unwrap().shape.as_box().unwrap();
        assert_relative_eq!(sliced_box.size(), Vector3::new(2.0, 1.0, 1.0));

        controller.disable_slicing(&mut scene).unwrap();
        assert_eq!(binding(&scene, node), MeshBinding::Asset(cube));
        let restored = controller.mesh_buffers(&scene, binding(&scene, node)).unwrap();
        assert_eq!(restored, &fixtures::cube_buffers());
        let original_box = scene.collider(boxed).unwrap().shape.as_box().unwrap();
        assert_eq!(Some(original_box), ColliderShape::default_box().as_box());

        // A cycle while disabled keeps the originals bound.
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(binding(&scene, node), MeshBinding::Asset(cube));

        controller.enable_slicing(&mut scene, &settings).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(binding(&scene, node), sliced_binding);
        let rebound = controller.mesh_buffers(&scene, sliced_binding).unwrap();
        assert_relative_eq!(max_x(rebound), 1.0);
        let resliced = scene.collider(boxed).unwrap().shape.as_box().unwrap();
        assert_relative_eq!(resliced.size(), Vector3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn ignored_subtrees_are_left_alone() {
        let (mut scene, root, _, cube) = cube_scene();
        let ignored = scene.add_child(root, "ignored").unwrap();
        scene.node_mut(ignored).unwrap().ignore = true;
        let inner = scene.add_child(ignored, "inner").unwrap();
        let hidden = fixtures::add_mesh_node(&mut scene, inner, "hidden", cube);

        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();

        assert_eq!(controller.detail_counts().mesh, 1);
        assert_eq!(controller.ignored_nodes(), &[ignored]);
        assert_eq!(binding(&scene, hidden), MeshBinding::Asset(cube));
    }

    #[test]
    fn removed_nodes_are_purged_on_the_next_cycle() {
        let (mut scene, root, first, cube) = cube_scene();
        let second = fixtures::add_mesh_node(&mut scene, root, "second", cube);
        scene.node_mut(second).unwrap().transform = Transform::from_position(Vector3::new(2.0, 0.0, 0.0));

        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(controller.detail_counts().mesh, 2);

        let gone = binding(&scene, second);
        scene.remove_node(second).unwrap();
        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);

        assert_eq!(controller.detail_counts().mesh, 1);
        assert!(controller.mesh_buffers(&scene, gone).is_none());
        assert!(controller.mesh_component().unwrap().detail_for(first).is_some());
        let bounds = controller.complete_bounds().unwrap();
        assert_relative_eq!(bounds.size(), Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn clamped_textures_keep_their_uvs() {
        let mut scene = Scene::new();
        let root = scene.add_root("root");
        let quads = scene.add_asset(GeometryAsset::new("quads", fixtures::two_quads_buffers()).unwrap());
        let node = fixtures::add_mesh_node_with(
            &mut scene,
            root,
            "floor",
            quads,
            vec![Some(fixtures::tiling_material()), Some(fixtures::clamped_material())],
        );

        let mut mesh = MeshSliceComponent::new();
        mesh.skip_uvs = false;
        mesh.uv_mapping = UvMappingSettings::new(MappingMode::UvSpace);
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0))
            .unwrap()
            .with_mesh_component(mesh);
        controller.refresh_now(&mut scene, &settings).unwrap();

        let sliced = controller.mesh_buffers(&scene, binding(&scene, node)).unwrap();
        let source = fixtures::two_quads_buffers();
        let uvs = sliced.uv(0).unwrap();
        let original = source.uv(0).unwrap();

        assert_relative_eq!(uvs[1], Vector2::new(2.0, 0.0));
        assert_ne!(uvs[..4], original[..4]);
        assert_eq!(uvs[4..], original[4..]);
    }

    #[test]
    fn finalize_commits_geometry_and_detaches() {
        let (mut scene, root, node, cube) = cube_scene();
        let ignored = scene.add_child(root, "ignored").unwrap();
        scene.node_mut(ignored).unwrap().ignore = true;

        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();
        let assets = scene.asset_count();

        controller.finalize_slicing(&mut scene, &settings).unwrap();

        let MeshBinding::Asset(committed) = binding(&scene, node) else {
            panic!("finalized meshes bind a scene asset");
        };
        assert_ne!(committed, cube);
        assert_eq!(scene.asset_count(), assets + 1);
        let asset = scene.asset(committed).unwrap();
        assert!(!asset.readable);
        assert_relative_eq!(max_x(&asset.buffers), 1.0);

        assert!(scene.controller_attachment(root).unwrap().is_none());
        assert!(!scene.node(ignored).unwrap().ignore);
        assert_eq!(controller.phase(), CyclePhase::Finalized);
        assert_eq!(controller.detail_counts().total(), 0);
        assert!(matches!(
            controller.refresh_now(&mut scene, &settings),
            Err(SlicerError::Cycle(CycleError::Finalized))
        ));
    }

    #[test]
    fn modifiers_leaving_scope_are_restored() {
        let (mut scene, root, _, _) = cube_scene();
        let pillar = scene.add_child(root, "pillar").unwrap();
        let scaled = scene.add_modifier(pillar, ModifierKind::scale()).unwrap();

        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(controller.modifier_nodes(), &[pillar]);
        assert_relative_eq!(scene.node(pillar).unwrap().transform.scale, Vector3::new(2.0, 1.0, 1.0));

        scene.set_parent(pillar, None).unwrap();
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert!(controller.modifier_nodes().is_empty());
        assert!(!scene.modifier(scaled).unwrap().is_enabled());
        assert_relative_eq!(scene.node(pillar).unwrap().transform.scale, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn outer_controller_resizes_a_nested_one() {
        let (mut scene, outer_root, _, cube) = cube_scene();
        let nested_root = scene.add_child(outer_root, "nested").unwrap();
        let nested_cube = fixtures::add_mesh_node(&mut scene, nested_root, "inner", cube);
        scene.add_modifier(nested_root, ModifierKind::controller()).unwrap();

        let settings = SlicerSettings::default();
        let mut outer = SliceController::new(&mut scene, outer_root, stretched(3.0)).unwrap();
        let mut nested = SliceController::attach(&mut scene, nested_root).unwrap();

        // The nested controller has not published bounds yet.
        outer.refresh_now(&mut scene, &settings).unwrap();
        assert_relative_eq!(nested.config(&scene).unwrap().size(), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(outer.detail_counts().mesh, 1);

        nested.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(outer.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        assert_relative_eq!(nested.config(&scene).unwrap().size(), Vector3::new(3.0, 1.0, 1.0));

        assert_eq!(nested.tick(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        let inner = nested.mesh_buffers(&scene, binding(&scene, nested_cube)).unwrap();
        assert_relative_eq!(max_x(inner), 1.5);
        assert_relative_eq!(inner.positions[0], Point3::new(-1.5, -0.5, -0.5));
    }

    #[test]
    fn ticking_alone_resizes_a_nested_controller() {
        let (mut scene, outer_root, _, cube) = cube_scene();
        let nested_root = scene.add_child(outer_root, "nested").unwrap();
        let nested_cube = fixtures::add_mesh_node(&mut scene, nested_root, "inner", cube);
        scene.add_modifier(nested_root, ModifierKind::controller()).unwrap();

        let settings = SlicerSettings::default();
        let mut outer = SliceController::new(&mut scene, outer_root, stretched(3.0)).unwrap();
        let mut nested = SliceController::attach(&mut scene, nested_root).unwrap();

        // Outer runs first each frame, before the nested one has bounds.
        for _ in 0..5 {
            outer.tick(&mut scene, &settings).unwrap();
            nested.tick(&mut scene, &settings).unwrap();
        }

        assert_relative_eq!(nested.config(&scene).unwrap().size(), Vector3::new(3.0, 1.0, 1.0));
        let inner = nested.mesh_buffers(&scene, binding(&scene, nested_cube)).unwrap();
        assert_relative_eq!(max_x(inner), 1.5);
        assert_eq!(outer.tick(&mut scene, &settings).unwrap(), CycleOutcome::Skipped);
        assert_eq!(nested.tick(&mut scene, &settings).unwrap(), CycleOutcome::Skipped);
    }

    #[test]
    fn zero_scale_node_does_not_block_its_siblings() {
        let (mut scene, root, flat, cube) = cube_scene();
        let normal = fixtures::add_mesh_node(&mut scene, root, "normal", cube);
        scene.node_mut(flat).unwrap().transform =
            Transform::default().with_scale(Vector3::new(0.0, 1.0, 1.0));

        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();

        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        let sliced = controller.mesh_buffers(&scene, binding(&scene, normal)).unwrap();
        assert_relative_eq!(max_x(sliced), 1.0);
        let untouched = controller.mesh_buffers(&scene, binding(&scene, flat)).unwrap();
        assert_relative_eq!(max_x(untouched), 0.5);

        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Unchanged);
    }

    #[test]
    fn components_are_optional_and_configurable() {
        let (mut scene, root, node, _) = cube_scene();
        let boxed = scene
            .add_collider(node, Collider::new(ColliderShape::default_box()))
            .unwrap();
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0))
            .unwrap()
            .without_collider_component();
        assert!(controller.collider_component().is_none());

        controller.refresh_now(&mut scene, &settings).unwrap();
        let untouched = scene.collider(boxed).unwrap().shape.as_box();
        assert_eq!(untouched, ColliderShape::default_box().as_box());

        controller.mesh_component_mut().unwrap().skip_vertices = true;
        assert_eq!(controller.refresh_now(&mut scene, &settings).unwrap(), CycleOutcome::Sliced);
        let kept = controller.mesh_buffers(&scene, binding(&scene, node)).unwrap();
        assert_relative_eq!(max_x(kept), 0.5);

        let (mut scene, root, node, cube) = cube_scene();
        let boxed = scene
            .add_collider(node, Collider::new(ColliderShape::default_box()))
            .unwrap();
        let mut colliders = ColliderSliceComponent::new();
        colliders.skip_bounds = true;
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0))
            .unwrap()
            .without_mesh_component()
            .with_collider_component(colliders);
        assert!(controller.mesh_component().is_none());

        controller.refresh_now(&mut scene, &settings).unwrap();
        assert!(controller.complete_bounds().is_none());

        controller.collider_component_mut().unwrap().skip_bounds = false;
        controller.refresh_now(&mut scene, &settings).unwrap();
        assert_eq!(controller.detail_counts().box_collider, 1);
        assert_eq!(binding(&scene, node), MeshBinding::Asset(cube));
        let sliced = scene.collider(boxed).unwrap().shape.as_box().unwrap();
        assert_relative_eq!(sliced.size(), Vector3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn missing_root_is_reported() {
        let (mut scene, root, _, _) = cube_scene();
        let settings = SlicerSettings::default();
        let mut controller = SliceController::new(&mut scene, root, SliceConfig::default()).unwrap();
        scene.remove_node(root).unwrap();

        assert!(matches!(
            controller.refresh_now(&mut scene, &settings),
            Err(SlicerError::Cycle(CycleError::MissingRoot))
        ));
        assert_eq!(controller.phase(), CyclePhase::Idle);
    }

    #[test]
    fn cycles_are_logged() {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("slicer=trace")
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (mut scene, root, _, _) = cube_scene();
        let mut controller = SliceController::new(&mut scene, root, stretched(2.0)).unwrap();
        let outcome = controller
            .refresh_now(&mut scene, &SlicerSettings::default())
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Sliced);
    }
}
