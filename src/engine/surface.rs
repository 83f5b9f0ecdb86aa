//! Surface system: [`SurfaceRegistry`], [`SurfaceId`] and the per-surface bookkeeping types.

use std::fmt::Display;
use std::num::NonZeroU64;
use std::sync::Arc;
use crate::render::backend::{NativeSurfaceKey, SurfaceSize};

mod registry;
pub use registry::*;

/// Identifier of a surface. Ids are handed out in increasing order starting at 1; `0` is never
/// a valid id and is used by hosts as "no surface".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(NonZeroU64);

impl SurfaceId {
    /// Wraps a raw id. Returns `None` for the `0` sentinel.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> u64 {
        self.0.get()
    }
}

impl Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SurfaceState {
    /// Registered with the renderer context and eligible for render callbacks.
    Live,
    /// Cleaned up. Every further operation on the surface fails.
    Retired,
}

/// Called synchronously whenever a surface's dimensions are updated.
pub type ResizeListener = Arc<dyn Fn(SurfaceId, SurfaceSize) + Send + Sync>;

/// Point-in-time view of a live surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub size: SurfaceSize,
    /// Native surface currently bound, if any
    pub native: Option<NativeSurfaceKey>,
}
