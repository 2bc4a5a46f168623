//! Details: one tracked mesh or collider and its cached slicing state.
//!
//! Every detail is a shared [`DetailCore`] plus a kind-specific payload.
//! Components keep their details in a [`DetailStore`], which implements the
//! per-cycle mark and sweep.

pub mod collider;
pub mod mesh;
pub mod store;

pub use collider::{BoxColliderDetail, ColliderDetail, ManagedColliderDetail};
pub use mesh::MeshDetail;
pub use store::{DetailKey, DetailStore};

use slotmap::Key;

use crate::error::Result;
use crate::hash::ContentHash;
use crate::math::BoundingBox;
use crate::scene::{AttachmentRef, NodeId, Scene};

/// State every detail carries regardless of kind.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailCore {
    node: NodeId,
    slot: AttachmentRef,
    pub(crate) pending_removal: bool,
    /// Bounds of the source geometry in the controller's local space.
    pub(crate) original_bounds: Option<BoundingBox>,
    pub(crate) hash: ContentHash,
}

impl DetailCore {
    pub(crate) fn new(node: NodeId, slot: AttachmentRef) -> Self {
        Self {
            node,
            slot,
            pending_removal: false,
            original_bounds: None,
            hash: ContentHash::INVALID,
        }
    }

    /// The tracked node.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The attachment on the node this detail tracks.
    #[must_use]
    pub fn slot(&self) -> AttachmentRef {
        self.slot
    }

    #[must_use]
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }

    #[must_use]
    pub fn original_bounds(&self) -> Option<BoundingBox> {
        self.original_bounds
    }

    /// The hash computed by the last `post_gather`.
    #[must_use]
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Identity of the tracked item followed by the node's world matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing.
    pub fn base_hash(&self, scene: &Scene) -> Result<ContentHash> {
        let node = ContentHash::of_bytes("node", &self.node.data().as_ffi().to_le_bytes());
        Ok(node
            .appended(self.slot.content_hash())
            .appended(ContentHash::of_matrix4(&scene.local_to_world(self.node)?)))
    }
}

/// A tracked item: the shared core and a kind payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail<K> {
    pub(crate) core: DetailCore,
    pub(crate) kind: K,
}

impl<K> Detail<K> {
    #[must_use]
    pub fn core(&self) -> &DetailCore {
        &self.core
    }

    #[must_use]
    pub fn kind(&self) -> &K {
        &self.kind
    }

    #[must_use]
    pub fn node(&self) -> NodeId {
        self.core.node
    }
}

/// Number of live details per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailCounts {
    pub mesh: usize,
    pub mesh_collider: usize,
    pub managed_collider: usize,
    pub box_collider: usize,
    pub unsupported_collider: usize,
}

impl DetailCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.mesh
            + self.mesh_collider
            + self.managed_collider
            + self.box_collider
            + self.unsupported_collider
    }
}
