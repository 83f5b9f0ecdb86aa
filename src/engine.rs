pub mod config;
pub mod controller;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod handle;
pub mod property;
pub mod queue;
pub mod frame;
pub mod surface;

pub use config::{ConfigError, CoordinatorConfig, CoordinatorConfigBuilder};
pub use controller::{AttributeKind, AttributeValue, VariableFontAttributes, VariableFontController};
pub use coordinator::Coordinator;
pub use errors::CoordinatorError;
pub use events::{CoordinatorEvent, LoopState, SurfaceEvent};
pub use handle::CoordinatorHandle;
pub use property::PropertyCell;
pub use queue::{RenderCallback, RenderQueue, RenderRequest, TouchedSurfaces};

/// Default capacity of the coordinator's event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;
