//! Render request queue and the per-frame touched surface buffer.
//!
//! ```text
//!   any thread                          coordinator loop (frame N)
//!   ──────────                          ──────────────────────────
//!   enqueue ──► [ active list ]  ◄─swap─► [ scratch (empty) ]
//!                                               │
//!                                               ▼
//!                                  run callbacks, record surface ids
//!                                               │
//!                                               ▼
//!                                     [ touched surfaces ] ──► render_batch
//! ```
//!
//! The swap is the only point where producers and the loop meet: a callback that enqueues
//! while the loop is draining lands in the fresh active list and runs next frame.

use std::collections::HashSet;
use std::sync::Mutex;
use crate::engine::errors::CoordinatorError;
use crate::engine::frame::FrameTime;
use crate::engine::surface::SurfaceId;
use crate::util::lock;

/// One-shot callback run at the next frame boundary.
pub type RenderCallback = Box<dyn FnOnce(FrameTime) + Send>;

/// A callback bound to the surface it renders for.
pub struct RenderRequest {
    surface_id: SurfaceId,
    callback: RenderCallback,
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRequest")
            .field("surface_id", &self.surface_id)
            .finish_non_exhaustive()
    }
}

impl RenderRequest {
    pub fn new(surface_id: SurfaceId, callback: RenderCallback) -> Self {
        Self { surface_id, callback }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    /// Consumes the request, running its callback.
    pub fn run(self, frame: FrameTime) -> SurfaceId {
        (self.callback)(frame);
        self.surface_id
    }
}

/// Double-buffered list of pending render requests.
#[derive(Default)]
pub struct RenderQueue {
    active: Mutex<Vec<RenderRequest>>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback for the next frame. Safe to call from inside a running callback.
    pub fn enqueue(&self, surface_id: SurfaceId, callback: RenderCallback) {
        lock(&self.active).push(RenderRequest::new(surface_id, callback));
    }

    /// Takes every pending request, leaving an empty list behind.
    pub fn drain_for_frame(&self) -> Vec<RenderRequest> {
        self.swap_active(Vec::new())
    }

    /// Installs `scratch` as the new active list and returns the previous one. `scratch`
    /// should be empty; passing the list drained last frame keeps its allocation in use.
    pub fn swap_active(&self, scratch: Vec<RenderRequest>) -> Vec<RenderRequest> {
        debug_assert!(scratch.is_empty(), "scratch list must be empty before the swap");
        std::mem::replace(&mut *lock(&self.active), scratch)
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every pending request without running it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *lock(&self.active));
        dropped.len()
    }
}

/// Distinct surfaces touched by the callbacks of one frame, in first-touch order.
///
/// Capacity only grows: first to twice the current capacity, or to the exact need when
/// doubling is not enough. An id is never dropped for lack of room.
pub struct TouchedSurfaces {
    ids: Vec<SurfaceId>,
    seen: HashSet<SurfaceId>,
}

impl TouchedSurfaces {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ids.capacity()
    }

    /// Make room for at least `needed` ids.
    pub fn reserve_for(&mut self, needed: usize) -> Result<(), CoordinatorError> {
        let capacity = self.ids.capacity();
        if capacity >= needed {
            return Ok(());
        }

        let target = capacity.saturating_mul(2).max(needed);
        let growth_failed = |_| CoordinatorError::CapacityGrowthFailure { requested: target };
        self.ids.try_reserve_exact(target - self.ids.len()).map_err(growth_failed)?;
        self.seen.try_reserve(target - self.seen.len()).map_err(growth_failed)?;

        log::debug!("Touched surface buffer grew from {capacity} to {}", self.ids.capacity());
        Ok(())
    }

    /// Records a touched surface. Returns `false` if it was already recorded this frame.
    pub fn record(&mut self, id: SurfaceId) -> Result<bool, CoordinatorError> {
        if self.seen.contains(&id) {
            return Ok(false);
        }
        self.reserve_for(self.ids.len() + 1)?;
        self.seen.insert(id);
        self.ids.push(id);
        Ok(true)
    }

    /// Keeps only the ids for which `f` returns true.
    pub fn retain(&mut self, mut f: impl FnMut(SurfaceId) -> bool) {
        let seen = &mut self.seen;
        self.ids.retain(|id| {
            let keep = f(*id);
            if !keep {
                seen.remove(id);
            }
            keep
        });
    }

    pub fn as_slice(&self) -> &[SurfaceId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Empties the buffer, keeping its capacity.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.seen.clear();
    }
}
