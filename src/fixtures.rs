//! Small scenes shared by the test modules.

#![allow(clippy::unwrap_used)]

use crate::geometry::{AssetId, GeometryAsset, Material, MeshBuffers, SubMesh, Texture, WrapMode};
use crate::math::{Point3, Vector2};
use crate::scene::{MeshFilter, MeshRenderer, NodeId, Scene};

/// Corner `i` of the unit cube has x, y, z taken from bits 0, 1, 2 of `i`.
const CUBE_FACES: [[u32; 4]; 6] = [
    [0, 2, 4, 6],
    [1, 3, 5, 7],
    [0, 1, 4, 5],
    [2, 3, 6, 7],
    [0, 1, 2, 3],
    [4, 5, 6, 7],
];

/// A unit cube centered on the origin with one UV channel.
pub fn cube_buffers() -> MeshBuffers {
    let positions: Vec<Point3> = (0..8)
        .map(|i| {
            let axis = |bit: u32| if i & (1 << bit) == 0 { -0.5 } else { 0.5 };
            Point3::new(axis(0), axis(1), axis(2))
        })
        .collect();
    let indices = CUBE_FACES
        .iter()
        .flat_map(|&[a, b, c, d]| [a, b, d, a, d, c])
        .collect();

    let mut buffers = MeshBuffers::new(positions, vec![SubMesh::triangles(indices)]);
    buffers.uvs[0] = Some(
        buffers
            .positions
            .iter()
            .map(|p| Vector2::new(p.x + 0.5, p.y + 0.5))
            .collect(),
    );
    buffers
}

/// Two unit quads in the floor plane, one submesh each. The first spans
/// x in [-1, 0], the second x in [0, 1].
pub fn two_quads_buffers() -> MeshBuffers {
    let positions = vec![
        Point3::new(-1.0, 0.0, -0.5),
        Point3::new(0.0, 0.0, -0.5),
        Point3::new(0.0, 0.0, 0.5),
        Point3::new(-1.0, 0.0, 0.5),
        Point3::new(0.0, 0.0, -0.5),
        Point3::new(1.0, 0.0, -0.5),
        Point3::new(1.0, 0.0, 0.5),
        Point3::new(0.0, 0.0, 0.5),
    ];
    let mut buffers = MeshBuffers::new(
        positions,
        vec![
            SubMesh::triangles(vec![0, 2, 1, 0, 3, 2]),
            SubMesh::triangles(vec![4, 6, 5, 4, 7, 6]),
        ],
    );
    buffers.uvs[0] = Some(
        [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .cycle()
            .take(8)
            .map(|&(u, v)| Vector2::new(u, v))
            .collect(),
    );
    buffers
}

pub fn add_cube(scene: &mut Scene) -> AssetId {
    scene.add_asset(GeometryAsset::new("cube", cube_buffers()).unwrap())
}

pub fn tiling_material() -> Material {
    Material::new("tiling", Some(Texture::new("checker", WrapMode::Repeat)))
}

pub fn clamped_material() -> Material {
    Material::new("clamped", Some(Texture::new("decal", WrapMode::Clamp)))
}

/// Adds a child rendering `asset` with one tiling material per submesh.
pub fn add_mesh_node(scene: &mut Scene, parent: NodeId, name: &str, asset: AssetId) -> NodeId {
    let submeshes = scene.asset(asset).unwrap().buffers.submeshes.len();
    add_mesh_node_with(scene, parent, name, asset, vec![Some(tiling_material()); submeshes])
}

/// Adds a child rendering `asset` with the given materials.
pub fn add_mesh_node_with(
    scene: &mut Scene,
    parent: NodeId,
    name: &str,
    asset: AssetId,
    materials: Vec<Option<Material>>,
) -> NodeId {
    let node = scene.add_child(parent, name).unwrap();
    let data = scene.node_mut(node).unwrap();
    data.mesh_filter = Some(MeshFilter::new(asset));
    data.mesh_renderer = Some(MeshRenderer::new(materials));
    node
}
