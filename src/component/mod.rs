//! Slice components: the per-controller owners of details.
//!
//! A controller drives every component through the same cycle:
//! [`pre_gather`](SliceComponent::pre_gather), one
//! [`gather`](SliceComponent::gather) per discovered node,
//! [`post_gather`](SliceComponent::post_gather),
//! [`calculate_bounds`](SliceComponent::calculate_bounds) and, when the
//! cycle hash changed, [`slice`](SliceComponent::slice).

pub mod collider;
pub mod mesh;

pub use collider::ColliderSliceComponent;
pub use mesh::MeshSliceComponent;

use std::collections::HashMap;

use crate::error::Result;
use crate::geometry::{AssetId, DerivedId};
use crate::hash::ContentHash;
use crate::math::BoundingBox;
use crate::scene::{NodeId, Scene};
use crate::settings::SlicerSettings;
use crate::slicing::SliceFrame;

/// What a component may look at besides the scene.
#[derive(Debug, Clone, Copy)]
pub struct ComponentContext<'a> {
    pub settings: &'a SlicerSettings,
    /// The mesh component of the same controller. Colliders share its
    /// derived geometry; it is always processed first.
    pub sibling: Option<&'a MeshSliceComponent>,
}

/// Derived geometry committed by finalization, keyed by the derived id it
/// replaces.
pub type CommittedGeometry = HashMap<DerivedId, AssetId>;

/// The cycle protocol shared by mesh and collider components.
pub trait SliceComponent {
    /// Whether slicing is currently applied.
    fn is_enabled(&self) -> bool;

    /// Marks every detail pending removal.
    fn pre_gather(&mut self);

    /// Finds or creates the details of `node` and refreshes their cached
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene lookup fails.
    fn gather(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        root: NodeId,
        ctx: &ComponentContext<'_>,
    ) -> Result<()>;

    /// Purges details that were not rediscovered and returns the hash of
    /// the component and its surviving details.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene lookup fails.
    fn post_gather(&mut self, scene: &mut Scene, ctx: &ComponentContext<'_>) -> Result<ContentHash>;

    /// Union of the source bounds of every detail, in the controller's
    /// space. `None` when there is nothing to bound or bounds are skipped.
    fn calculate_bounds(&self) -> Option<BoundingBox>;

    /// Applies the slice transform to every detail.
    ///
    /// # Errors
    ///
    /// Returns an error if a scene lookup or transform fails.
    fn slice(&mut self, scene: &mut Scene, frame: &SliceFrame, ctx: &ComponentContext<'_>) -> Result<()>;

    /// Binds every detail to its sliced state.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    fn enable(&mut self, scene: &mut Scene, ctx: &ComponentContext<'_>) -> Result<()>;

    /// Binds every detail back to its original state.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    fn disable(&mut self, scene: &mut Scene) -> Result<()>;

    /// Makes the sliced state permanent and drops every detail.
    ///
    /// # Errors
    ///
    /// Returns an error if the scene cannot be updated.
    fn finalize(
        &mut self,
        scene: &mut Scene,
        ctx: &ComponentContext<'_>,
        committed: &mut CommittedGeometry,
    ) -> Result<()>;
}

/// Hash of the flags every component has.
pub(crate) fn component_base_hash(enabled: bool, skip_bounds: bool) -> ContentHash {
    ContentHash::of_flag(enabled, 1).appended(ContentHash::of_flag(skip_bounds, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_hash_tracks_both_flags() {
        let hashes = [
            component_base_hash(false, false),
            component_base_hash(true, false),
            component_base_hash(false, true),
            component_base_hash(true, true),
        ];
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
