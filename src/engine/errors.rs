use crate::engine::surface::SurfaceId;
use crate::render::backend::NativeSurfaceKey;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The renderer context has been torn down. Stop issuing calls; build a new coordinator
    /// to resume rendering.
    #[error("Renderer context is no longer valid")]
    ContextInvalid,

    #[error("Surface {0} has been retired")]
    SurfaceRetired(SurfaceId),

    #[error("Surface {0} not found")]
    SurfaceNotFound(SurfaceId),

    #[error("Surface {surface} is already bound to {bound}, refusing to bind {requested}")]
    DuplicateBind {
        surface: SurfaceId,
        bound: NativeSurfaceKey,
        requested: NativeSurfaceKey,
    },

    #[error("{native} is already bound to surface {owner}, cannot bind it to {requested}")]
    NativeInUse {
        native: NativeSurfaceKey,
        owner: SurfaceId,
        requested: SurfaceId,
    },

    #[error("Could not grow the touched surface buffer to {requested} entries")]
    CapacityGrowthFailure { requested: usize },

    #[error("Renderer error: {0}")]
    Renderer(#[source] anyhow::Error),
}

impl CoordinatorError {
    /// Errors that a surface controller treats as a lost race rather than a failure.
    pub fn is_surface_race(&self) -> bool {
        matches!(self, CoordinatorError::SurfaceRetired(_) | CoordinatorError::SurfaceNotFound(_))
    }
}
