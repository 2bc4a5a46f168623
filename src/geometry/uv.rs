//! Planar UV reprojection of sliced geometry.
//!
//! Each triangle picks the configured mapping whose surface normal best
//! matches its own plane, then projects its vertices onto a texture basis
//! derived from that mapping. The result keeps texel density constant when
//! the geometry is stretched.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Material, MeshBuffers, SubMesh, Texture, Topology, UV_CHANNELS};
use crate::hash::ContentHash;
use crate::math::{transform_point, BoundingBox, Matrix4, Point3, Vector2, Vector3, TOLERANCE};

const RIGHT: Vector3 = Vector3::new(1.0, 0.0, 0.0);
const UP: Vector3 = Vector3::new(0.0, 1.0, 0.0);
const FORWARD: Vector3 = Vector3::new(0.0, 0.0, 1.0);
const BACK: Vector3 = Vector3::new(0.0, 0.0, -1.0);

/// Pairs a surface normal with the direction the texture runs along it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvMapping {
    pub surface_normal: Vector3,
    pub texture_direction: Vector3,
}

impl UvMapping {
    #[must_use]
    pub const fn new(surface_normal: Vector3, texture_direction: Vector3) -> Self {
        Self {
            surface_normal,
            texture_direction,
        }
    }

    /// The same mapping for the opposite facing surface.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self::new(-self.surface_normal, -self.texture_direction)
    }

    /// How well this mapping suits a plane; higher is better.
    #[must_use]
    pub fn fit_score(&self, plane_normal: &Vector3) -> f64 {
        plane_normal.dot(&self.surface_normal)
    }

    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_vector3(&self.texture_direction)
            .appended(ContentHash::of_vector3(&self.surface_normal))
    }
}

/// Which space UVs are computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MappingMode {
    /// Rescale the existing UVs by the slice size.
    #[default]
    UvSpace,
    /// Project vertices in the tracked node's local space.
    ObjectSpace,
    /// Project vertices in world space.
    WorldSpace,
}

impl MappingMode {
    fn tag(self) -> u64 {
        match self {
            Self::UvSpace => 0,
            Self::ObjectSpace => 1,
            Self::WorldSpace => 2,
        }
    }
}

/// Configuration of UV reprojection for one mesh component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvMappingSettings {
    pub mode: MappingMode,
    pub mappings: Vec<UvMapping>,
    /// Also consider every mapping's inverse when picking the best fit.
    pub generate_inverse_mappings: bool,
    pub uv_scale: Vector2,
    /// Added to every vertex before projection.
    pub surface_texture_offset: Vector3,
}

impl Default for UvMappingSettings {
    fn default() -> Self {
        Self::new(MappingMode::default())
    }
}

impl UvMappingSettings {
    /// Creates settings with the default mappings of `mode`.
    #[must_use]
    pub fn new(mode: MappingMode) -> Self {
        let mut settings = Self {
            mode,
            mappings: Vec::new(),
            generate_inverse_mappings: false,
            uv_scale: Vector2::new(1.0, 1.0),
            surface_texture_offset: Vector3::zeros(),
        };
        settings.reset();
        settings
    }

    /// Restores the default mappings, scale and offset for the current mode.
    pub fn reset(&mut self) {
        self.reset_mappings();
        self.uv_scale = Vector2::new(1.0, 1.0);
        self.surface_texture_offset = Vector3::zeros();
    }

    /// Restores only the default mappings for the current mode.
    pub fn reset_mappings(&mut self) {
        self.mappings = Self::default_mappings(self.mode).to_vec();
        if self.mode != MappingMode::UvSpace {
            self.generate_inverse_mappings = true;
        }
    }

    /// Returns `true` if the mappings are exactly the mode's defaults, in any order.
    #[must_use]
    pub fn are_mappings_default(&self) -> bool {
        let defaults = Self::default_mappings(self.mode);
        self.mappings.len() == defaults.len() && defaults.iter().all(|d| self.mappings.contains(d))
    }

    fn default_mappings(mode: MappingMode) -> &'static [UvMapping] {
        const UV_SPACE: [UvMapping; 2] = [UvMapping::new(RIGHT, RIGHT), UvMapping::new(FORWARD, UP)];
        const PROJECTED: [UvMapping; 3] = [
            UvMapping::new(UP, FORWARD),
            UvMapping::new(FORWARD, RIGHT),
            UvMapping::new(RIGHT, BACK),
        ];
        match mode {
            MappingMode::UvSpace => &UV_SPACE,
            MappingMode::ObjectSpace | MappingMode::WorldSpace => &PROJECTED,
        }
    }

    /// Picks the mapping whose normal best matches `plane_normal`.
    ///
    /// Falls back to `(forward, right)` when no mapping scores above -1.
    #[must_use]
    pub fn best_fit(&self, plane_normal: &Vector3) -> UvMapping {
        let mut best_score = -1.0;
        let mut best = None;
        for mapping in &self.mappings {
            let score = mapping.fit_score(plane_normal);
            if score > best_score {
                best_score = score;
                best = Some(*mapping);
            }
            if self.generate_inverse_mappings && -score > best_score {
                best_score = -score;
                best = Some(mapping.inverse());
            }
        }
        best.unwrap_or(UvMapping::new(FORWARD, RIGHT))
    }

    /// Projects one triangle onto the best fitting texture basis.
    ///
    /// `mesh_scale` is applied to each vertex before projection.
    #[must_use]
    pub fn map_triangle(&self, vertices: [Point3; 3], mesh_scale: &Vector3) -> [Vector2; 3] {
        let [v0, v1, v2] = vertices.map(|v| v + self.surface_texture_offset);

        let normal = normalized((v1 - v0).cross(&(v2 - v0)));
        let mapping = self.best_fit(&normal);
        let texture_v = normalized(normal.cross(&mapping.texture_direction));
        let texture_u = normalized(normal.cross(&texture_v));
        let origin_on_plane = normal * normal.dot(&v0.coords);

        [v0, v1, v2].map(|v| {
            let nv = v.coords.component_mul(mesh_scale) - origin_on_plane;
            Vector2::new(
                nv.dot(&texture_u) * self.uv_scale.x,
                nv.dot(&texture_v) * self.uv_scale.y,
            )
        })
    }

    /// Rescales existing UVs of a vertex range by the slice size.
    pub fn rescale_uvs(&self, uvs: &mut [Vector2], range: RangeInclusive<usize>, size: &Vector3) {
        let offset = self.surface_texture_offset.xy();
        for uv in uvs.iter_mut().take(range.end() + 1).skip(*range.start()) {
            let base = uv.component_mul(&self.uv_scale) + offset;
            *uv = self.mappings.iter().fold(Vector2::zeros(), |acc, mapping| {
                let weight = size.component_mul(&mapping.surface_normal).sum();
                acc + base.component_mul(&mapping.texture_direction.xy()) * weight
            });
        }
    }

    /// Digest of every setting, mappings last and in order.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        let mut hash = ContentHash::of_vector2(&self.uv_scale);
        hash.append(ContentHash::of_u64(self.mode.tag()));
        hash.append(ContentHash::of_flag(self.generate_inverse_mappings, 6));
        hash.append(ContentHash::of_vector3(&self.surface_texture_offset));
        for mapping in &self.mappings {
            hash.append(mapping.content_hash());
        }
        hash
    }
}

fn normalized(v: Vector3) -> Vector3 {
    v.try_normalize(TOLERANCE).unwrap_or_else(Vector3::zeros)
}

/// Whether a submesh can be reprojected: it needs a tiling texture and
/// triangle topology.
#[must_use]
pub fn is_valid_target(texture: Option<&Texture>, submesh: &SubMesh) -> bool {
    texture.is_some_and(Texture::is_tiling) && submesh.topology == Topology::Triangles
}

/// Everything UV reprojection of one detail needs besides the buffers.
#[derive(Debug, Clone, Copy)]
pub struct UvProjector<'a> {
    pub settings: &'a UvMappingSettings,
    /// Renderer materials, one per submesh.
    pub materials: &'a [Option<Material>],
    /// The tracked node's local-to-world matrix, used in world space mode.
    pub local_to_world: &'a Matrix4,
    pub size: Vector3,
    /// CompleteBounds of the controller.
    pub complete: &'a BoundingBox,
    /// Deliberately skip reprojection.
    pub skip: bool,
    /// Whether an unchanged `previous` hash short-circuits work.
    pub skip_unmodified: bool,
}

impl UvProjector<'_> {
    /// Rewrites the UV channels of `target` from `source`, whose positions
    /// must already be sliced.
    ///
    /// Returns [`ContentHash::SKIP_UVS`] when skipping, and
    /// [`ContentHash::INVALID`] with the source UVs restored when the
    /// materials do not line up with the submeshes.
    pub fn project(
        &self,
        source: &MeshBuffers,
        source_hash: ContentHash,
        target: &mut MeshBuffers,
        previous: Option<ContentHash>,
    ) -> ContentHash {
        if self.skip {
            if previous != Some(ContentHash::SKIP_UVS) || !self.skip_unmodified {
                target.copy_uvs_from(source);
            }
            return ContentHash::SKIP_UVS;
        }

        if self.materials.len() != source.submeshes.len() {
            warn!(
                materials = self.materials.len(),
                submeshes = source.submeshes.len(),
                "material count does not match submesh count, keeping original uvs"
            );
            target.copy_uvs_from(source);
            return ContentHash::INVALID;
        }

        let mut hash = ContentHash::of_vector3(&self.size)
            .appended(self.settings.content_hash())
            .appended(source_hash);
        if self.settings.mode == MappingMode::WorldSpace {
            hash.append(ContentHash::of_matrix4(self.local_to_world));
        }

        let mesh_scale = self
            .complete
            .size()
            .map(|s| if s.abs() > TOLERANCE { 1.0 / s } else { 1.0 });
        let positions: Vec<Point3> = match self.settings.mode {
            MappingMode::WorldSpace => target
                .positions
                .iter()
                .map(|p| transform_point(self.local_to_world, p))
                .collect(),
            MappingMode::ObjectSpace | MappingMode::UvSpace => target.positions.clone(),
        };

        for channel in 0..UV_CHANNELS {
            let Some(source_uvs) = source.uv(channel) else {
                continue;
            };
            let Some(first) = source_uvs.first() else {
                continue;
            };
            hash.append(ContentHash::of_vector2(first));

            let mut uvs = source_uvs.to_vec();
            for (submesh, material) in source.submeshes.iter().zip(self.materials) {
                let texture = material.as_ref().and_then(|m| m.texture.as_ref());
                if !is_valid_target(texture, submesh) {
                    continue;
                }
                let Some(texture) = texture else {
                    continue;
                };
                hash.append(texture.content_hash());

                match self.settings.mode {
                    MappingMode::UvSpace => {
                        if let Some((first, last)) = submesh.vertex_range() {
                            self.settings.rescale_uvs(&mut uvs, first..=last, &self.size);
                        }
                    }
                    MappingMode::ObjectSpace | MappingMode::WorldSpace => {
                        self.project_triangles(submesh, &positions, &mesh_scale, &mut uvs);
                    }
                }
            }
            target.uvs[channel] = Some(uvs);
        }

        hash
    }

    fn project_triangles(
        &self,
        submesh: &SubMesh,
        positions: &[Point3],
        mesh_scale: &Vector3,
        uvs: &mut [Vector2],
    ) {
        for triangle in submesh.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (Some(v0), Some(v1), Some(v2)) =
                (positions.get(i0), positions.get(i1), positions.get(i2))
            else {
                continue;
            };
            let mapped = self.settings.map_triangle([*v0, *v1, *v2], mesh_scale);
            for (index, uv) in [i0, i1, i2].into_iter().zip(mapped) {
                if let Some(slot) = uvs.get_mut(index) {
                    *slot = uv;
                }
            }
        }
    }
}
