use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::math::Vector3;

/// Engine-wide policy flags, passed explicitly into every controller call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicerSettings {
    /// When `true`, equal hashes short-circuit recomputation.
    ///
    /// Disabling it forces every cycle to recompute, which is useful when
    /// debugging change detection.
    pub skip_unmodified: bool,
    /// When `true`, every tick runs a cycle; otherwise only requested
    /// refreshes do.
    pub refresh_on_update: bool,
    /// Whether geometry committed by finalization stays CPU readable.
    pub finalized_mesh_readable: bool,
}

impl Default for SlicerSettings {
    fn default() -> Self {
        Self {
            skip_unmodified: true,
            refresh_on_update: false,
            finalized_mesh_readable: false,
        }
    }
}

impl SlicerSettings {
    /// Settings that disable memoization, for diagnostics.
    #[must_use]
    pub fn always_recompute() -> Self {
        Self {
            skip_unmodified: false,
            ..Self::default()
        }
    }
}

/// Per-controller slice parameters.
///
/// Thresholds are clamped into `[0, 1]` on every write and after
/// deserialization, so a stored config can never hold an out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSliceConfig", into = "RawSliceConfig")]
pub struct SliceConfig {
    size: Vector3,
    thresholds: Vector3,
    offset: Vector3,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            size: Vector3::new(1.0, 1.0, 1.0),
            thresholds: Vector3::new(1.0, 1.0, 1.0),
            offset: Vector3::zeros(),
        }
    }
}

impl SliceConfig {
    /// Creates a config, clamping the thresholds.
    #[must_use]
    pub fn new(size: Vector3, thresholds: Vector3, offset: Vector3) -> Self {
        Self {
            size,
            thresholds: clamp_thresholds(thresholds),
            offset,
        }
    }

    /// Final scale per axis.
    #[must_use]
    pub fn size(&self) -> Vector3 {
        self.size
    }

    /// Where the stretched region ends per axis, in `[0, 1]`.
    #[must_use]
    pub fn thresholds(&self) -> Vector3 {
        self.thresholds
    }

    /// Translation applied to the sliced region.
    #[must_use]
    pub fn offset(&self) -> Vector3 {
        self.offset
    }

    pub fn set_size(&mut self, size: Vector3) {
        self.size = size;
    }

    pub fn set_thresholds(&mut self, thresholds: Vector3) {
        self.thresholds = clamp_thresholds(thresholds);
    }

    pub fn set_offset(&mut self, offset: Vector3) {
        self.offset = offset;
    }

    /// Builder form of [`SliceConfig::set_size`].
    #[must_use]
    pub fn with_size(mut self, size: Vector3) -> Self {
        self.set_size(size);
        self
    }

    /// Builder form of [`SliceConfig::set_thresholds`].
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vector3) -> Self {
        self.set_thresholds(thresholds);
        self
    }

    /// Builder form of [`SliceConfig::set_offset`].
    #[must_use]
    pub fn with_offset(mut self, offset: Vector3) -> Self {
        self.set_offset(offset);
        self
    }

    /// Digest of size, thresholds and offset, in that order.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_vector3(&self.size)
            .appended(ContentHash::of_vector3(&self.thresholds))
            .appended(ContentHash::of_vector3(&self.offset))
    }
}

fn clamp_thresholds(thresholds: Vector3) -> Vector3 {
    thresholds.map(|t| if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) })
}

#[derive(Serialize, Deserialize)]
struct RawSliceConfig {
    size: Vector3,
    thresholds: Vector3,
    offset: Vector3,
}

impl From<RawSliceConfig> for SliceConfig {
    fn from(raw: RawSliceConfig) -> Self {
        Self::new(raw.size, raw.thresholds, raw.offset)
    }
}

impl From<SliceConfig> for RawSliceConfig {
    fn from(config: SliceConfig) -> Self {
        Self {
            size: config.size,
            thresholds: config.thresholds,
            offset: config.offset,
        }
    }
}
