pub mod backend;
pub mod context;

/// Rendering backends for the coordinator.
pub mod backends {
    pub mod null;
    /// Backend that records calls, for tracing and tests
    pub mod recording;
}

pub use context::{AttributeUpdate, ContextHandle, ContextId, RendererContext};
