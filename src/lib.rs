//! Frame-driven render surface coordinator.
//!
//! A [`Coordinator`] owns a renderer context and a set of surfaces. UI code queues render
//! callbacks and writes surface attributes from any thread; a single loop, paced by a
//! [`FrameClock`](engine::frame::FrameClock), runs the queued callbacks at each frame and sends
//! the touched surfaces to the backend in one batch.
//!
//! ```no_run
//! use std::sync::Arc;
//! use render_coordinator::{AttributeValue, Coordinator};
//! use render_coordinator::engine::frame::IntervalFrameClock;
//! use render_coordinator::render::backend::RawNativeSurface;
//! use render_coordinator::render::backends::null::NullBackend;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! render_coordinator::init_logging();
//! let clock = IntervalFrameClock::new(std::time::Duration::from_millis(16));
//! let coordinator = Coordinator::new(None, Box::new(NullBackend::new()?), clock)?;
//! let (handle, _join) = coordinator.start();
//!
//! let surface = handle.create_surface(Arc::new(RawNativeSurface::new(0x1000)), 200, 100)?;
//! handle.set_attribute(surface, AttributeValue::Text("Hello".into()))?;
//! # Ok(()) }
//! ```

pub mod engine;
pub mod render;
pub mod util;

pub use engine::*;
pub use util::init_logging;
