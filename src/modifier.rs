//! Slice modifiers: non-geometry node properties driven by the slice
//! transform of the enclosing controller.
//!
//! A modifier lives in the scene arena next to the node it drives. The
//! controller reaches it by [`ModifierId`] and each operation copies the
//! modifier out, updates the scene, then writes the modifier back.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{Result, SceneError};
use crate::hash::ContentHash;
use crate::math::{slice_point_in_frame, Point3, Vector3, TOLERANCE};
use crate::scene::{ModifierId, NodeData, NodeId, Scene};
use crate::slicing::{slice_box, SliceFrame};

/// What a modifier drives, with the captured original and last sliced value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ModifierKind {
    /// Moves the node's local position as if `anchor` (in the node's
    /// rotated frame) were a vertex of the sliced geometry.
    Position {
        anchor: Vector3,
        original: Vector3,
        sliced: Vector3,
    },
    /// Multiplies the node's local scale by the controller size.
    Scale { original: Vector3, sliced: Vector3 },
    /// Drives the size and offset of a nested controller rooted at the node.
    Controller {
        original_size: Vector3,
        original_offset: Vector3,
        sliced_size: Vector3,
        sliced_offset: Vector3,
    },
}

impl ModifierKind {
    #[must_use]
    pub fn position(anchor: Vector3) -> Self {
        Self::Position {
            anchor,
            original: Vector3::zeros(),
            sliced: Vector3::zeros(),
        }
    }

    #[must_use]
    pub fn scale() -> Self {
        Self::Scale {
            original: Vector3::new(1.0, 1.0, 1.0),
            sliced: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    #[must_use]
    pub fn controller() -> Self {
        Self::Controller {
            original_size: Vector3::new(1.0, 1.0, 1.0),
            original_offset: Vector3::zeros(),
            sliced_size: Vector3::new(1.0, 1.0, 1.0),
            sliced_offset: Vector3::zeros(),
        }
    }

    /// Takes the node's current value as both original and sliced value.
    fn recapture(&mut self, data: &NodeData) {
        match self {
            Self::Position {
                original, sliced, ..
            } => {
                *original = data.transform.position;
                *sliced = *original;
            }
            Self::Scale { original, sliced } => {
                *original = data.transform.scale;
                *sliced = *original;
            }
            Self::Controller {
                original_size,
                original_offset,
                sliced_size,
                sliced_offset,
            } => {
                if let Some(attachment) = &data.controller {
                    *original_size = attachment.config.size();
                    *original_offset = attachment.config.offset();
                    *sliced_size = *original_size;
                    *sliced_offset = *original_offset;
                }
            }
        }
    }

    /// Makes the sliced value the new original.
    fn commit(&mut self) {
        match self {
            Self::Position {
                original, sliced, ..
            }
            | Self::Scale { original, sliced } => *original = *sliced,
            Self::Controller {
                original_size,
                original_offset,
                sliced_size,
                sliced_offset,
            } => {
                *original_size = *sliced_size;
                *original_offset = *sliced_offset;
            }
        }
    }

    fn content_hash(&self) -> ContentHash {
        match self {
            Self::Position {
                anchor, original, ..
            } => ContentHash::of_vector3(anchor).appended(ContentHash::of_vector3(original)),
            Self::Scale { original, .. } => ContentHash::of_vector3(original),
            Self::Controller {
                original_size,
                original_offset,
                ..
            } => ContentHash::of_vector3(original_size)
                .appended(ContentHash::of_vector3(original_offset)),
        }
    }
}

/// A modifier attached to one node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceModifier {
    node: NodeId,
    enabled: bool,
    kind: ModifierKind,
}

impl SliceModifier {
    /// Creates an enabled modifier whose original is the node's current value.
    #[must_use]
    pub fn capture(node: NodeId, mut kind: ModifierKind, data: &NodeData) -> Self {
        kind.recapture(data);
        Self {
            node,
            enabled: true,
            kind,
        }
    }

    /// The node this modifier drives.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn kind(&self) -> &ModifierKind {
        &self.kind
    }

    /// Digest of the enabled flag and the captured originals.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_flag(self.enabled, 1).appended(self.kind.content_hash())
    }
}

/// Refreshes a modifier for the current cycle and returns its hash.
///
/// While disabled the node's current value is re-captured as the original.
/// A controller modifier also hashes the bounds its nested controller
/// published, so that bounds appearing later trigger a new cycle.
///
/// # Errors
///
/// Returns an error if the modifier or its node is missing.
pub fn gather(scene: &mut Scene, id: ModifierId) -> Result<ContentHash> {
    let mut modifier = *scene.modifier(id)?;
    let data = scene.node(modifier.node)?;
    if !modifier.enabled {
        modifier.kind.recapture(data);
    }

    let mut hash = modifier.content_hash();
    if let ModifierKind::Controller { .. } = modifier.kind {
        let published = data
            .controller
            .as_ref()
            .and_then(|attachment| attachment.complete_bounds);
        hash.append(published.map_or(ContentHash::INVALID, |b| ContentHash::of_bounds(&b)));
    }

    if !modifier.enabled {
        *scene.modifier_mut(id)? = modifier;
    }
    Ok(hash)
}

/// Applies the slice transform of `frame` to the driven property.
///
/// Disabled modifiers are left alone. A controller modifier whose nested
/// controller has not published bounds yet does nothing.
///
/// # Errors
///
/// Returns an error if the modifier, its node or a transform is invalid.
pub fn modify(scene: &mut Scene, id: ModifierId, frame: &SliceFrame) -> Result<()> {
    let mut modifier = *scene.modifier(id)?;
    if !modifier.enabled {
        return Ok(());
    }
    let node = modifier.node;

    match &mut modifier.kind {
        ModifierKind::Position {
            anchor,
            original,
            sliced,
        } => {
            let parent = scene.parent(node)?.ok_or_else(|| {
                SceneError::InvalidHierarchy("a position modifier needs a parent node".into())
            })?;
            let to_root = scene.relative_matrix(parent, frame.root)?;
            let Some(from_root) = to_root.try_inverse() else {
                warn!(?node, "singular parent transform, position left as is");
                return Ok(());
            };

            let anchor_rotated = scene.node(node)?.transform.rotation * *anchor;
            let moved = slice_point_in_frame(
                &Point3::from(*original + anchor_rotated),
                &to_root,
                &from_root,
                &frame.params(),
            );
            *sliced = moved.coords - anchor_rotated;
            scene.node_mut(node)?.transform.position = *sliced;
        }
        ModifierKind::Scale { original, sliced } => {
            *sliced = original.component_mul(&frame.size);
            scene.node_mut(node)?.transform.scale = *sliced;
        }
        ModifierKind::Controller {
            sliced_size,
            sliced_offset,
            ..
        } => {
            let published = scene
                .controller_attachment(node)?
                .and_then(|attachment| attachment.complete_bounds);
            let Some(bounds) = published else {
                trace!(?node, "nested controller has no bounds yet");
                scene.request_refresh(frame.root)?;
                return Ok(());
            };

            let sliced = slice_box(scene, &bounds, node, frame)?;
            *sliced_size = bounds
                .size()
                .zip_map(&sliced.size(), |from, to| {
                    if from.abs() > TOLERANCE {
                        to / from
                    } else {
                        1.0
                    }
                });
            *sliced_offset = sliced.center - bounds.center;
            write_nested(scene, node, *sliced_size, *sliced_offset)?;
        }
    }

    *scene.modifier_mut(id)? = modifier;
    Ok(())
}

/// Re-applies the last sliced value.
///
/// # Errors
///
/// Returns an error if the modifier or its node is missing.
pub fn enable(scene: &mut Scene, id: ModifierId) -> Result<()> {
    let modifier = scene.modifier_mut(id)?;
    modifier.enabled = true;
    let modifier = *modifier;
    apply(scene, &modifier, false)
}

/// Restores the original value.
///
/// # Errors
///
/// Returns an error if the modifier or its node is missing.
pub fn disable(scene: &mut Scene, id: ModifierId) -> Result<()> {
    let modifier = scene.modifier_mut(id)?;
    modifier.enabled = false;
    let modifier = *modifier;
    apply(scene, &modifier, true)
}

/// Leaves the sliced value in place for good and detaches the modifier.
///
/// # Errors
///
/// Returns an error if the modifier or its node is missing.
pub fn finalize(scene: &mut Scene, id: ModifierId) -> Result<()> {
    enable(scene, id)?;
    scene.modifier_mut(id)?.kind.commit();
    scene.remove_modifier(id)?;
    Ok(())
}

fn apply(scene: &mut Scene, modifier: &SliceModifier, original: bool) -> Result<()> {
    let node = modifier.node;
    match modifier.kind {
        ModifierKind::Position {
            original: from,
            sliced,
            ..
        } => {
            scene.node_mut(node)?.transform.position = if original { from } else { sliced };
        }
        ModifierKind::Scale {
            original: from,
            sliced,
        } => {
            scene.node_mut(node)?.transform.scale = if original { from } else { sliced };
        }
        ModifierKind::Controller {
            original_size,
            original_offset,
            sliced_size,
            sliced_offset,
        } => {
            if original {
                write_nested(scene, node, original_size, original_offset)?;
            } else {
                write_nested(scene, node, sliced_size, sliced_offset)?;
            }
        }
    }
    Ok(())
}

fn write_nested(scene: &mut Scene, node: NodeId, size: Vector3, offset: Vector3) -> Result<()> {
    if let Some(attachment) = scene.node_mut(node)?.controller.as_mut() {
        attachment.config.set_size(size);
        attachment.config.set_offset(offset);
        attachment.refresh_requested = true;
    }
    Ok(())
}
