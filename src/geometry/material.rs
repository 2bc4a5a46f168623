use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// How a texture is sampled outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    Mirror,
    MirrorOnce,
}

impl WrapMode {
    fn tag(self) -> u64 {
        match self {
            Self::Repeat => 0,
            Self::Clamp => 1,
            Self::Mirror => 2,
            Self::MirrorOnce => 3,
        }
    }
}

/// The main texture of a material, as far as UV reprojection cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

impl Texture {
    /// Creates a texture wrapping the same way on both axes.
    #[must_use]
    pub fn new(name: impl Into<String>, wrap: WrapMode) -> Self {
        Self {
            name: name.into(),
            wrap_u: wrap,
            wrap_v: wrap,
        }
    }

    /// Whether reprojected UVs tile correctly with this texture.
    ///
    /// Clamped and mirror-once textures do not tile, and mixed wrap modes
    /// would distort differently per axis.
    #[must_use]
    pub fn is_tiling(&self) -> bool {
        !matches!(self.wrap_u, WrapMode::Clamp | WrapMode::MirrorOnce) && self.wrap_u == self.wrap_v
    }

    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of_bytes("texture", self.name.as_bytes())
            .appended(ContentHash::of_u64(self.wrap_u.tag()))
            .appended(ContentHash::of_u64(self.wrap_v.tag()))
    }
}

/// A material bound to one submesh of a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub texture: Option<Texture>,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>, texture: Option<Texture>) -> Self {
        Self {
            name: name.into(),
            texture,
        }
    }

    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        let mut hash = ContentHash::of_bytes("material", self.name.as_bytes());
        if let Some(texture) = &self.texture {
            hash.append(texture.content_hash());
        }
        hash
    }
}
