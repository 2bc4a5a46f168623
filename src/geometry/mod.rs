//! Geometry buffers: shared source assets and per-detail derived copies.

pub mod derived;
pub mod material;
pub mod uv;

pub use derived::{DerivedGeometry, DerivedId};
pub use material::{Material, Texture, WrapMode};
pub use uv::{MappingMode, UvMapping, UvMappingSettings};

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::math::bounds::local_bounds;
use crate::math::{BoundingBox, Matrix4, Point3, Vector2, Vector3, Vector4};

/// Number of UV channels a mesh can carry.
pub const UV_CHANNELS: usize = 8;

slotmap::new_key_type! {
    /// Unique identifier for a geometry asset in the scene.
    pub struct AssetId;
}

/// How the indices of a submesh are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    Triangles,
    Quads,
    Lines,
    LineStrip,
    Points,
}

/// One index range of a mesh, rendered with one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMesh {
    /// Vertex indices, interpreted according to `topology`.
    pub indices: Vec<u32>,
    /// Primitive topology of the indices.
    pub topology: Topology,
}

impl SubMesh {
    /// Creates a triangle submesh.
    #[must_use]
    pub fn triangles(indices: Vec<u32>) -> Self {
        Self {
            indices,
            topology: Topology::Triangles,
        }
    }

    /// Returns the smallest and largest referenced vertex, if any.
    #[must_use]
    pub fn vertex_range(&self) -> Option<(usize, usize)> {
        let min = self.indices.iter().min()?;
        let max = self.indices.iter().max()?;
        Some((*min as usize, *max as usize))
    }
}

/// Vertex and index buffers of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffers {
    /// Vertex positions in mesh-local space.
    pub positions: Vec<Point3>,
    /// Per-vertex normals, empty if absent.
    pub normals: Vec<Vector3>,
    /// Per-vertex tangents, empty if absent.
    pub tangents: Vec<Vector4>,
    /// Per-vertex RGBA colors, empty if absent.
    pub colors: Vec<Vector4>,
    /// UV channels; `None` means the channel is absent.
    pub uvs: [Option<Vec<Vector2>>; UV_CHANNELS],
    /// Index buffers, one per submesh.
    pub submeshes: Vec<SubMesh>,
}

impl MeshBuffers {
    /// Creates buffers with positions and one submesh, everything else absent.
    #[must_use]
    pub fn new(positions: Vec<Point3>, submeshes: Vec<SubMesh>) -> Self {
        Self {
            positions,
            submeshes,
            ..Self::default()
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns a UV channel, if present.
    #[must_use]
    pub fn uv(&self, channel: usize) -> Option<&[Vector2]> {
        self.uvs.get(channel)?.as_deref()
    }

    /// Sets a UV channel.
    ///
    /// # Errors
    ///
    /// Returns an error if `channel` is out of range.
    pub fn set_uv(&mut self, channel: usize, uvs: Option<Vec<Vector2>>) -> Result<()> {
        let slot = self
            .uvs
            .get_mut(channel)
            .ok_or(GeometryError::InvalidUvChannel(channel))?;
        *slot = uvs;
        Ok(())
    }

    /// Copies every UV channel from `source`.
    pub fn copy_uvs_from(&mut self, source: &Self) {
        self.uvs.clone_from(&source.uvs);
    }

    /// Checks that every attribute and index fits the vertex count.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        let expected = self.vertex_count();
        check_len("normals", expected, self.normals.len())?;
        check_len("tangents", expected, self.tangents.len())?;
        check_len("colors", expected, self.colors.len())?;
        for uvs in self.uvs.iter().flatten() {
            check_len("uvs", expected, uvs.len())?;
        }
        for (submesh, sm) in self.submeshes.iter().enumerate() {
            if let Some(&index) = sm.indices.iter().find(|&&i| i as usize >= expected) {
                return Err(GeometryError::IndexOutOfRange {
                    submesh,
                    index,
                    vertex_count: expected,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Bounds of the positions in mesh-local space.
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        local_bounds(&self.positions, &Matrix4::identity())
    }
}

fn check_len(attribute: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual == 0 || actual == expected {
        Ok(())
    } else {
        Err(GeometryError::BufferLengthMismatch {
            attribute,
            expected,
            actual,
        }
        .into())
    }
}

/// A shared source mesh. The engine only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryAsset {
    /// Human readable name.
    pub name: String,
    /// The mesh buffers.
    pub buffers: MeshBuffers,
    /// Whether the buffers are accessible to the CPU.
    pub readable: bool,
}

impl GeometryAsset {
    /// Creates a readable asset after validating its buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffers are inconsistent.
    pub fn new(name: impl Into<String>, buffers: MeshBuffers) -> Result<Self> {
        buffers.validate()?;
        Ok(Self {
            name: name.into(),
            buffers,
            readable: true,
        })
    }

    /// Returns the asset with its readability changed.
    #[must_use]
    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SlicerError;

    #[test]
    fn validate_rejects_short_attributes() {
        let mut buffers = MeshBuffers::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            vec![SubMesh::triangles(vec![0, 1, 2])],
        );
        assert!(buffers.validate().is_ok());

        buffers.normals = vec![Vector3::z(); 2];
        assert!(matches!(
            buffers.validate(),
            Err(SlicerError::Geometry(GeometryError::BufferLengthMismatch {
                attribute: "normals",
                ..
            }))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_indices() {
        let buffers = MeshBuffers::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![SubMesh::triangles(vec![0, 1, 2])],
        );
        assert!(matches!(
            buffers.validate(),
            Err(SlicerError::Geometry(GeometryError::IndexOutOfRange { index: 2, .. }))
        ));
    }

    #[test]
    fn uv_channels_are_bounded() {
        let mut buffers = MeshBuffers::default();
        assert!(buffers.set_uv(7, Some(vec![])).is_ok());
        assert!(buffers.set_uv(UV_CHANNELS, None).is_err());
        assert_eq!(buffers.uv(7), Some(&[][..]));
        assert!(buffers.uv(0).is_none());
    }

    #[test]
    fn submesh_vertex_range() {
        let sm = SubMesh::triangles(vec![4, 2, 9]);
        assert_eq!(sm.vertex_range(), Some((2, 9)));
        assert_eq!(SubMesh::triangles(vec![]).vertex_range(), None);
    }
}
