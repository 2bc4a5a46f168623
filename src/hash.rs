//! Content hashing used for change detection.
//!
//! A [`ContentHash`] is a 128-bit digest (truncated BLAKE3). Digests are
//! combined by appending, and appending is order dependent:
//! `a.appended(b) != b.appended(a)` in general.

use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::math::{BoundingBox, Matrix4, Point3, Vector2, Vector3};

/// A 128-bit content digest.
///
/// The all-zero value is reserved as [`ContentHash::INVALID`] and never
/// produced by hashing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// The "no valid hash" marker.
    pub const INVALID: Self = Self([0; 16]);

    /// Marks that vertex slicing was deliberately skipped.
    pub const SKIP_VERTICES: Self = Self([
        0x53, 0x4b, 0x49, 0x50, 0x2d, 0x56, 0x45, 0x52, 0x54, 0x53, 0x00, 0x01, 0x72, 0x43, 0x9e,
        0x11,
    ]);

    /// Marks that UV slicing was deliberately skipped.
    pub const SKIP_UVS: Self = Self([
        0x53, 0x4b, 0x49, 0x50, 0x2d, 0x55, 0x56, 0x53, 0x00, 0x00, 0x00, 0x02, 0xf9, 0x51, 0x3c,
        0x60,
    ]);

    /// Returns the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns `false` for [`ContentHash::INVALID`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Hashes raw bytes under a domain label.
    #[must_use]
    pub fn of_bytes(domain: &str, bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        hasher.update(bytes);
        Self::finish(&hasher)
    }

    /// Hashes an integer.
    #[must_use]
    pub fn of_u64(value: u64) -> Self {
        Self::of_bytes("u64", &value.to_le_bytes())
    }

    /// Hashes a boolean flag shifted into its own bit position.
    ///
    /// Distinct flags use distinct shifts so that swapping two flags changes
    /// the digest.
    #[must_use]
    pub fn of_flag(value: bool, shift: u32) -> Self {
        let bits = u64::from(value) << shift;
        Self::of_bytes("flag", &bits.to_le_bytes())
    }

    /// Hashes a scalar by its bit pattern (`-0.0` and `0.0` hash equally).
    #[must_use]
    pub fn of_f64(value: f64) -> Self {
        Self::of_bytes("f64", &canonical_bits(value).to_le_bytes())
    }

    /// Hashes a 2D vector.
    #[must_use]
    pub fn of_vector2(v: &Vector2) -> Self {
        Self::of_floats("vec2", v.iter().copied())
    }

    /// Hashes a 3D vector.
    #[must_use]
    pub fn of_vector3(v: &Vector3) -> Self {
        Self::of_floats("vec3", v.iter().copied())
    }

    /// Hashes a 3D point.
    #[must_use]
    pub fn of_point3(p: &Point3) -> Self {
        Self::of_floats("vec3", p.coords.iter().copied())
    }

    /// Hashes a 4x4 matrix.
    #[must_use]
    pub fn of_matrix4(m: &Matrix4) -> Self {
        Self::of_floats("mat4", m.iter().copied())
    }

    /// Hashes a bounding box as `center` then `extents`.
    #[must_use]
    pub fn of_bounds(b: &BoundingBox) -> Self {
        Self::of_point3(&b.center).appended(Self::of_vector3(&b.extents))
    }

    /// Appends `other` to this digest.
    pub fn append(&mut self, other: Self) {
        *self = self.appended(other);
    }

    /// Returns this digest with `other` appended.
    #[must_use]
    pub fn appended(self, other: Self) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"append:");
        hasher.update(&self.0);
        hasher.update(&other.0);
        Self::finish(&hasher)
    }

    /// Appends every digest in argument order, starting from `INVALID`.
    #[must_use]
    pub fn combine(hashes: &[Self]) -> Self {
        hashes
            .iter()
            .fold(Self::INVALID, |acc, h| acc.appended(*h))
    }

    fn of_floats(domain: &str, values: impl Iterator<Item = f64>) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        for v in values {
            hasher.update(&canonical_bits(v).to_le_bytes());
        }
        Self::finish(&hasher)
    }

    fn finish(hasher: &Hasher) -> Self {
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        if bytes == [0; 16] {
            bytes[0] = 1;
        }
        Self(bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}
