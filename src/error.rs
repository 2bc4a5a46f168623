use thiserror::Error;

/// Top-level error type for the slicing engine.
#[derive(Debug, Error)]
pub enum SlicerError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Errors raised by the host scene graph.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene node not found")]
    NodeNotFound,

    #[error("collider not found")]
    ColliderNotFound,

    #[error("slice modifier not found")]
    ModifierNotFound,

    #[error("geometry asset not found")]
    AssetNotFound,

    #[error("world transform of node is not invertible")]
    NonInvertibleTransform,

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),
}

/// Errors raised by the controller's cycle state machine.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a slicing cycle is already running on this controller")]
    Reentrant,

    #[error("slicing has been finalized for this controller")]
    Finalized,

    #[error("the controller's root node no longer exists")]
    MissingRoot,
}

/// Errors related to geometry buffers.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("{attribute} has {actual} entries, expected {expected}")]
    BufferLengthMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("submesh {submesh} references vertex {index} but only {vertex_count} exist")]
    IndexOutOfRange {
        submesh: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("uv channel {0} is out of range")]
    InvalidUvChannel(usize),
}

/// Convenience type alias for results using [`SlicerError`].
pub type Result<T> = std::result::Result<T, SlicerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_their_context() {
        let err: SlicerError = GeometryError::BufferLengthMismatch {
            attribute: "normals",
            expected: 8,
            actual: 7,
        }
        .into();
        assert_eq!(err.to_string(), "normals has 7 entries, expected 8");

        let err: SlicerError = CycleError::Reentrant.into();
        assert!(err.to_string().contains("already running"));
    }
}
