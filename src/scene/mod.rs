//! The host scene graph: a node hierarchy with attached meshes, colliders,
//! modifiers and controller markers.

pub mod attachment;
pub mod node;
pub mod traversal;

pub use attachment::{
    asset_identity_hash, AttachmentRef, Collider, ColliderId, ColliderShape, ControllerAttachment, MeshBinding,
    MeshFilter, MeshRenderer, ModifierId,
};
pub use node::{NodeData, NodeId, Transform};
pub use traversal::{collect, Traversal};

use slotmap::SlotMap;

use crate::error::{Result, SceneError};
use crate::geometry::{AssetId, GeometryAsset};
use crate::math::Matrix4;
use crate::modifier::{ModifierKind, SliceModifier};
use crate::settings::SliceConfig;

/// Central arena that owns every node, asset, collider and modifier.
///
/// Entities reference each other via typed IDs (generational indices), so a
/// removed entity's ID simply stops resolving.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, NodeData>,
    assets: SlotMap<AssetId, GeometryAsset>,
    colliders: SlotMap<ColliderId, Collider>,
    modifiers: SlotMap<ModifierId, SliceModifier>,
}

impl Scene {
    /// Creates a new, empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Node operations ---

    /// Inserts a parentless node and returns its ID.
    pub fn add_root(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.insert(NodeData::new(name))
    }

    /// Inserts a node under `parent` and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` does not exist.
    pub fn add_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::NodeNotFound.into());
        }
        let mut data = NodeData::new(name);
        data.parent = Some(parent);
        let id = self.nodes.insert(data);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Returns `true` if the node exists.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns a reference to the node data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(id).ok_or_else(|| SceneError::NodeNotFound.into())
    }

    /// Returns a mutable reference to the node data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::NodeNotFound.into())
    }

    /// Returns the children of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.children())
    }

    /// Returns the parent of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent())
    }

    /// Removes a node, its whole subtree and everything attached to them.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let parent = self.parent(id)?;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.nodes.remove(current) {
                for collider in data.colliders {
                    self.colliders.remove(collider);
                }
                for modifier in data.modifiers {
                    self.modifiers.remove(modifier);
                }
                stack.extend(data.children);
            }
        }
        Ok(())
    }

    /// Moves `id` under `new_parent`, keeping its local transform.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is missing or if `new_parent` lies in
    /// the subtree of `id`.
    pub fn set_parent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> Result<()> {
        let old_parent = self.parent(id)?;
        if let Some(target) = new_parent {
            let mut cursor = Some(target);
            while let Some(current) = cursor {
                if current == id {
                    return Err(SceneError::InvalidHierarchy(
                        "a node cannot be moved under its own descendant".into(),
                    )
                    .into());
                }
                cursor = self.parent(current)?;
            }
        }

        if let Some(old) = old_parent {
            self.node_mut(old)?.children.retain(|&c| c != id);
        }
        if let Some(target) = new_parent {
            self.node_mut(target)?.children.push(id);
        }
        self.node_mut(id)?.parent = new_parent;
        Ok(())
    }

    /// Iterates every node in the scene.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes.iter()
    }

    // --- Transforms ---

    /// Returns the matrix mapping the node's local space to world space.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or one of its ancestors is missing.
    pub fn local_to_world(&self, id: NodeId) -> Result<Matrix4> {
        let mut matrix = Matrix4::identity();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let data = self.node(current)?;
            matrix = data.transform.matrix() * matrix;
            cursor = data.parent;
        }
        Ok(matrix)
    }

    /// Returns the matrix mapping world space to the node's local space.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing or its world matrix is
    /// singular (a zero scale somewhere up the chain).
    pub fn world_to_local(&self, id: NodeId) -> Result<Matrix4> {
        self.local_to_world(id)?
            .try_inverse()
            .ok_or_else(|| SceneError::NonInvertibleTransform.into())
    }

    /// Returns `inverse(rootToWorld) * childToWorld`, mapping `child`'s local
    /// space into `root`'s local space.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is missing or `root` is not invertible.
    pub fn relative_matrix(&self, child: NodeId, root: NodeId) -> Result<Matrix4> {
        Ok(self.world_to_local(root)? * self.local_to_world(child)?)
    }

    // --- Asset operations ---

    /// Inserts a geometry asset and returns its ID.
    pub fn add_asset(&mut self, asset: GeometryAsset) -> AssetId {
        self.assets.insert(asset)
    }

    /// Returns a reference to the asset, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset is not in the scene.
    pub fn asset(&self, id: AssetId) -> Result<&GeometryAsset> {
        self.assets
            .get(id)
            .ok_or_else(|| SceneError::AssetNotFound.into())
    }

    /// Changes whether the asset's buffers are CPU readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset is not in the scene.
    pub fn set_readable(&mut self, id: AssetId, readable: bool) -> Result<()> {
        self.assets
            .get_mut(id)
            .ok_or(SceneError::AssetNotFound)?
            .readable = readable;
        Ok(())
    }

    /// Returns the number of assets in the scene.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    // --- Collider operations ---

    /// Attaches a collider to a node and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn add_collider(&mut self, node: NodeId, collider: Collider) -> Result<ColliderId> {
        if !self.nodes.contains_key(node) {
            return Err(SceneError::NodeNotFound.into());
        }
        let id = self.colliders.insert(collider);
        self.node_mut(node)?.colliders.push(id);
        Ok(id)
    }

    /// Returns a reference to the collider, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the collider is not in the scene.
    pub fn collider(&self, id: ColliderId) -> Result<&Collider> {
        self.colliders
            .get(id)
            .ok_or_else(|| SceneError::ColliderNotFound.into())
    }

    /// Returns a mutable reference to the collider, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the collider is not in the scene.
    pub fn collider_mut(&mut self, id: ColliderId) -> Result<&mut Collider> {
        self.colliders
            .get_mut(id)
            .ok_or_else(|| SceneError::ColliderNotFound.into())
    }

    /// Detaches and destroys a collider.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or collider is missing.
    pub fn remove_collider(&mut self, node: NodeId, id: ColliderId) -> Result<()> {
        self.colliders
            .remove(id)
            .ok_or(SceneError::ColliderNotFound)?;
        self.node_mut(node)?.colliders.retain(|&c| c != id);
        Ok(())
    }

    // --- Modifier operations ---

    /// Attaches a modifier to a node, capturing the node's current value as
    /// the modifier's original.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn add_modifier(&mut self, node: NodeId, kind: ModifierKind) -> Result<ModifierId> {
        let data = self.node(node)?;
        let modifier = SliceModifier::capture(node, kind, data);
        let id = self.modifiers.insert(modifier);
        self.node_mut(node)?.modifiers.push(id);
        Ok(id)
    }

    /// Returns `true` if the modifier exists.
    #[must_use]
    pub fn contains_modifier(&self, id: ModifierId) -> bool {
        self.modifiers.contains_key(id)
    }

    /// Returns a reference to the modifier, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the modifier is not in the scene.
    pub fn modifier(&self, id: ModifierId) -> Result<&SliceModifier> {
        self.modifiers
            .get(id)
            .ok_or_else(|| SceneError::ModifierNotFound.into())
    }

    /// Returns a mutable reference to the modifier, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the modifier is not in the scene.
    pub fn modifier_mut(&mut self, id: ModifierId) -> Result<&mut SliceModifier> {
        self.modifiers
            .get_mut(id)
            .ok_or_else(|| SceneError::ModifierNotFound.into())
    }

    /// Detaches and destroys a modifier without restoring its node.
    ///
    /// # Errors
    ///
    /// Returns an error if the modifier is not in the scene.
    pub fn remove_modifier(&mut self, id: ModifierId) -> Result<SliceModifier> {
        let modifier = self
            .modifiers
            .remove(id)
            .ok_or(SceneError::ModifierNotFound)?;
        if let Some(node) = self.nodes.get_mut(modifier.node()) {
            node.modifiers.retain(|&m| m != id);
        }
        Ok(modifier)
    }

    // --- Mesh bindings ---

    /// Returns the mesh binding held by an attachment slot.
    ///
    /// A missing mesh filter or a non-mesh collider reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or collider is missing.
    pub fn mesh_binding(&self, node: NodeId, slot: AttachmentRef) -> Result<Option<MeshBinding>> {
        match slot {
            AttachmentRef::MeshFilter => Ok(self.node(node)?.mesh_filter.and_then(|f| f.mesh)),
            AttachmentRef::Collider(id) => match self.collider(id)?.shape {
                ColliderShape::Mesh { mesh } => Ok(mesh),
                _ => Ok(None),
            },
        }
    }

    /// Rebinds an attachment slot. Slots that cannot hold a mesh are left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or collider is missing.
    pub fn set_mesh_binding(
        &mut self,
        node: NodeId,
        slot: AttachmentRef,
        binding: Option<MeshBinding>,
    ) -> Result<()> {
        match slot {
            AttachmentRef::MeshFilter => {
                if let Some(filter) = self.node_mut(node)?.mesh_filter.as_mut() {
                    filter.mesh = binding;
                }
            }
            AttachmentRef::Collider(id) => {
                if let ColliderShape::Mesh { mesh } = &mut self.collider_mut(id)?.shape {
                    *mesh = binding;
                }
            }
        }
        Ok(())
    }

    // --- Controller markers ---

    /// Marks `node` as a controller root, replacing any previous config.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn attach_controller(&mut self, node: NodeId, config: SliceConfig) -> Result<()> {
        self.node_mut(node)?.controller = Some(ControllerAttachment::new(config));
        Ok(())
    }

    /// Returns the controller marker of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn controller_attachment(&self, node: NodeId) -> Result<Option<&ControllerAttachment>> {
        Ok(self.node(node)?.controller.as_ref())
    }

    /// Flags the controller rooted at `node` to run on its next tick.
    ///
    /// Does nothing if no controller is rooted there.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not in the scene.
    pub fn request_refresh(&mut self, node: NodeId) -> Result<()> {
        if let Some(attachment) = self.node_mut(node)?.controller.as_mut() {
            attachment.refresh_requested = true;
        }
        Ok(())
    }
}
