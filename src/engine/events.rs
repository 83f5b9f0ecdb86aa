//! Coordinator events and the host surface notifications it consumes.
//!
//! # Main Types
//!
//! - [`CoordinatorEvent`]: lifecycle and per-frame events broadcast to subscribers.
//! - [`LoopState`]: where the coordinator loop currently is.
//! - [`SurfaceEvent`]: window-system surface notifications fed in by the host.

use std::fmt::{Debug, Display};
use std::sync::Arc;
use crate::engine::frame::FrameTime;
use crate::engine::surface::SurfaceId;
use crate::render::backend::{NativeSurface, NativeSurfaceKey, SurfaceSize};
use crate::render::context::ContextId;

/// State of the coordinator loop.
///
/// `Starting → AwaitingFrame → Draining → Dispatching → AwaitingFrame → … → Stopped`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    /// Suspended until the next frame pulse
    AwaitingFrame,
    /// Running the render callbacks queued for this frame
    Draining,
    /// Issuing the batched render call
    Dispatching,
    Stopped,
}

impl Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Starting => write!(f, "Starting"),
            LoopState::AwaitingFrame => write!(f, "AwaitingFrame"),
            LoopState::Draining => write!(f, "Draining"),
            LoopState::Dispatching => write!(f, "Dispatching"),
            LoopState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// The coordinator loop is running
    LoopStarted { context: ContextId },
    SurfaceCreated { surface: SurfaceId, size: SurfaceSize },
    SurfaceResized { surface: SurfaceId, size: SurfaceSize },
    /// Native surface released, the surface itself stays live
    SurfaceDetached { surface: SurfaceId },
    SurfaceRetired { surface: SurfaceId },
    /// One render batch went out to the backend
    FrameDispatched {
        /// Frame pulse counter, starting at 1
        frame: u64,
        timestamp: FrameTime,
        surfaces: Vec<SurfaceId>,
    },
    LoopStopped,
    ContextDestroyed { context: ContextId },
}

/// Surface notifications from the host's window system.
#[derive(Clone)]
pub enum SurfaceEvent {
    /// A native surface became available. With `surface` set it is attached to that existing
    /// surface, otherwise a new surface is registered.
    Created {
        surface: Option<SurfaceId>,
        native: Arc<dyn NativeSurface>,
        width: u32,
        height: u32,
    },
    /// Dimensions of a native surface changed.
    Changed { native: NativeSurfaceKey, width: u32, height: u32 },
    /// The native surface is going away. Its surface stays live so it can be attached again.
    Destroyed { native: NativeSurfaceKey },
}

impl Debug for SurfaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceEvent::Created { surface, native, width, height } => f
                .debug_struct("Created")
                .field("surface", surface)
                .field("native", &native.key())
                .field("width", width)
                .field("height", height)
                .finish(),
            SurfaceEvent::Changed { native, width, height } => f
                .debug_struct("Changed")
                .field("native", native)
                .field("width", width)
                .field("height", height)
                .finish(),
            SurfaceEvent::Destroyed { native } => f.debug_struct("Destroyed").field("native", native).finish(),
        }
    }
}
