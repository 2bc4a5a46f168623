use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::{AssetId, GeometryAsset, MeshBuffers};
use crate::hash::ContentHash;
use crate::math::BoundingBox;

static NEXT_DERIVED_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`DerivedGeometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DerivedId(u64);

impl DerivedId {
    fn next() -> Self {
        Self(NEXT_DERIVED_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Identity digest, used when the binding itself is hashed.
    #[must_use]
    pub fn content_hash(self) -> ContentHash {
        ContentHash::of_bytes("derived", &self.0.to_le_bytes())
    }
}

/// A mutable deep copy of a source asset, owned by exactly one detail.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedGeometry {
    id: DerivedId,
    source: AssetId,
    /// Working buffers; positions and UVs are rewritten by slicing.
    pub buffers: MeshBuffers,
    bounds: Option<BoundingBox>,
    revision: u64,
}

impl DerivedGeometry {
    /// Copies the buffers of `asset`, allocating a fresh id.
    #[must_use]
    pub fn from_asset(source: AssetId, asset: &GeometryAsset) -> Self {
        Self {
            id: DerivedId::next(),
            source,
            bounds: asset.buffers.bounds(),
            buffers: asset.buffers.clone(),
            revision: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> DerivedId {
        self.id
    }

    /// The asset these buffers were copied from.
    #[must_use]
    pub fn source(&self) -> AssetId {
        self.source
    }

    /// Mesh-local bounds as of the last upload.
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Number of uploads since allocation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Publishes the current buffers: recomputes bounds and bumps the revision.
    pub fn upload(&mut self) {
        self.bounds = self.buffers.bounds();
        self.revision += 1;
    }

    /// Consumes the geometry, returning its buffers.
    #[must_use]
    pub fn into_buffers(self) -> MeshBuffers {
        self.buffers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::geometry::SubMesh;
    use crate::math::Point3;
    use slotmap::SlotMap;

    #[test]
    fn copies_are_independent_and_uniquely_identified() {
        let mut assets: SlotMap<AssetId, GeometryAsset> = SlotMap::with_key();
        let asset = GeometryAsset::new(
            "tri",
            MeshBuffers::new(
                vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
                vec![SubMesh::triangles(vec![0, 1, 2])],
            ),
        )
        .unwrap();
        let id = assets.insert(asset);

        let mut a = DerivedGeometry::from_asset(id, &assets[id]);
        let b = DerivedGeometry::from_asset(id, &assets[id]);
        assert_ne!(a.id(), b.id());

        a.buffers.positions[1] = Point3::new(4.0, 0.0, 0.0);
        a.upload();
        assert_eq!(a.revision(), 1);
        assert_eq!(a.bounds().unwrap().max().x, 4.0);
        assert_eq!(assets[id].buffers.positions[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(b.revision(), 0);
    }
}
