use serde::{Deserialize, Serialize};

use crate::math::{Matrix4, UnitQuaternion, Vector3};

use super::attachment::{ColliderId, ControllerAttachment, MeshFilter, MeshRenderer, ModifierId};

slotmap::new_key_type! {
    /// Unique identifier for a node in the scene.
    pub struct NodeId;
}

/// Local position, rotation and scale of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: UnitQuaternion,
    pub scale: Vector3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Creates a translation-only transform.
    #[must_use]
    pub fn from_position(position: Vector3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: UnitQuaternion) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vector3) -> Self {
        self.scale = scale;
        self
    }

    /// Returns `T * R * S`.
    #[must_use]
    pub fn matrix(&self) -> Matrix4 {
        Matrix4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

/// Data associated with a scene node.
///
/// Hierarchy links are maintained by [`Scene`](super::Scene); everything else
/// is freely editable by the host.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    /// Human readable name.
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Transform,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    /// Mesh binding used for rendering.
    pub mesh_filter: Option<MeshFilter>,
    /// Renderer drawing the mesh filter.
    pub mesh_renderer: Option<MeshRenderer>,
    /// Colliders attached to this node, in attachment order.
    pub colliders: Vec<ColliderId>,
    /// Slice modifiers attached to this node, in attachment order.
    pub modifiers: Vec<ModifierId>,
    /// Present when a slice controller is rooted at this node.
    pub controller: Option<ControllerAttachment>,
    /// Stops discovery below this node.
    pub ignore: bool,
}

impl NodeData {
    /// Creates a node with an identity transform and no attachments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the parent node, if any.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the children in insertion order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{transform_point, Point3};
    use approx::assert_relative_eq;

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let transform = Transform::from_position(Vector3::new(10.0, 0.0, 0.0))
            .with_rotation(UnitQuaternion::from_axis_angle(
                &Vector3::z_axis(),
                std::f64::consts::FRAC_PI_2,
            ))
            .with_scale(Vector3::new(2.0, 1.0, 1.0));

        let p = transform_point(&transform.matrix(), &Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(10.0, 2.0, 0.0), epsilon = 1e-12);
    }
}
