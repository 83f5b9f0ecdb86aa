use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use crate::engine::errors::CoordinatorError;
use crate::engine::surface::{ResizeListener, SurfaceId, SurfaceInfo, SurfaceState};
use crate::render::backend::{NativeHandle, NativeSurface, NativeSurfaceKey, SurfaceSize};
use crate::render::context::ContextHandle;

struct BoundNative {
    surface: Arc<dyn NativeSurface>,
    handle: NativeHandle,
}

struct SurfaceEntry {
    /// Current dimensions in pixels
    size: SurfaceSize,
    /// Native surface and the backend handle created for it
    native: Option<BoundNative>,
    resize_listener: Option<ResizeListener>,
}

/// Owns every surface the coordinator knows about, keyed by [`SurfaceId`].
///
/// The registry allocates ids and creates/releases native handles through the renderer
/// context. Only live surfaces are kept. Ids are never reused, so an id below `next_id` that
/// is missing from the map belongs to a retired surface.
pub struct SurfaceRegistry {
    context: ContextHandle,
    /// Next id to hand out. Only advanced once a bind succeeded.
    next_id: NonZeroU64,
    surfaces: HashMap<SurfaceId, SurfaceEntry>,
    /// Which surface each bound native object belongs to
    by_native: HashMap<NativeSurfaceKey, SurfaceId>,
}

impl SurfaceRegistry {
    pub fn new(context: ContextHandle) -> Self {
        Self {
            context,
            next_id: NonZeroU64::MIN,
            surfaces: HashMap::new(),
            by_native: HashMap::new(),
        }
    }

    /// Registers a native surface and binds it with the renderer.
    ///
    /// Registering a native surface that is already bound returns the id it is bound to,
    /// without allocating a new id or creating a second handle.
    pub fn register(&mut self, native: Arc<dyn NativeSurface>, size: SurfaceSize) -> Result<SurfaceId, CoordinatorError> {
        self.context.ensure_valid()?;

        let key = native.key();
        if let Some(id) = self.by_native.get(&key) {
            log::debug!("{key} is already bound to surface {id}");
            return Ok(*id);
        }

        let id = SurfaceId(self.next_id);
        let handle = self.context.bind_surface(native.as_ref(), id, size)?;
        self.next_id = self.next_id.saturating_add(1);

        self.by_native.insert(key, id);
        self.surfaces.insert(id, SurfaceEntry {
            size,
            native: Some(BoundNative { surface: native, handle }),
            resize_listener: None,
        });

        log::info!("Surface {id} registered for {key} ({size})");
        Ok(id)
    }

    fn missing(&self, id: SurfaceId) -> CoordinatorError {
        if id.0 < self.next_id {
            CoordinatorError::SurfaceRetired(id)
        } else {
            CoordinatorError::SurfaceNotFound(id)
        }
    }

    fn live_entry_mut(&mut self, id: SurfaceId) -> Result<&mut SurfaceEntry, CoordinatorError> {
        if !self.surfaces.contains_key(&id) {
            return Err(self.missing(id));
        }
        self.surfaces.get_mut(&id).ok_or(CoordinatorError::SurfaceNotFound(id))
    }

    /// Fails unless `id` refers to a live surface.
    pub fn ensure_live(&self, id: SurfaceId) -> Result<(), CoordinatorError> {
        if self.surfaces.contains_key(&id) {
            Ok(())
        } else {
            Err(self.missing(id))
        }
    }

    /// Lifecycle state of `id`, or `None` if it was never handed out.
    pub fn state(&self, id: SurfaceId) -> Option<SurfaceState> {
        match self.ensure_live(id) {
            Ok(()) => Some(SurfaceState::Live),
            Err(CoordinatorError::SurfaceRetired(_)) => Some(SurfaceState::Retired),
            Err(_) => None,
        }
    }

    /// Updates the stored geometry and forwards it to the backend when a native surface is
    /// bound.
    ///
    /// Returns the resize listener, if any. The caller invokes it once it no longer holds the
    /// registry, so the listener is free to call back into the coordinator.
    pub fn resize(&mut self, id: SurfaceId, size: SurfaceSize) -> Result<Option<ResizeListener>, CoordinatorError> {
        let context = self.context.clone();
        let entry = self.live_entry_mut(id)?;

        if entry.size != size {
            if entry.native.is_some() {
                context.resize_surface(id, size)?;
            }
            log::debug!("Surface {id} resized from {} to {size}", entry.size);
            entry.size = size;
        }

        Ok(entry.resize_listener.clone())
    }

    pub fn set_resize_listener(&mut self, id: SurfaceId, listener: Option<ResizeListener>) -> Result<(), CoordinatorError> {
        self.live_entry_mut(id)?.resize_listener = listener;
        Ok(())
    }

    /// Binds a native surface to an existing surface id.
    ///
    /// Binding the object that is already bound is a no-op. Binding a different object while
    /// one is bound fails with [`CoordinatorError::DuplicateBind`], binding an object that
    /// belongs to another surface with [`CoordinatorError::NativeInUse`].
    pub fn attach_native(&mut self, id: SurfaceId, native: Arc<dyn NativeSurface>) -> Result<(), CoordinatorError> {
        self.context.ensure_valid()?;
        let key = native.key();

        if let Some(owner) = self.by_native.get(&key) {
            if *owner != id {
                return Err(CoordinatorError::NativeInUse { native: key, owner: *owner, requested: id });
            }
        }

        let context = self.context.clone();
        let entry = self.live_entry_mut(id)?;
        if let Some(bound) = &entry.native {
            let bound = bound.surface.key();
            if bound == key {
                return Ok(());
            }
            return Err(CoordinatorError::DuplicateBind { surface: id, bound, requested: key });
        }

        let handle = context.bind_surface(native.as_ref(), id, entry.size)?;
        entry.native = Some(BoundNative { surface: native, handle });
        self.by_native.insert(key, id);

        log::info!("Surface {id} attached to {key}");
        Ok(())
    }

    /// Releases the native handle of a surface but keeps the surface live. Returns `false`
    /// when nothing was bound.
    pub fn detach_native(&mut self, id: SurfaceId) -> Result<bool, CoordinatorError> {
        let context = self.context.clone();
        let entry = self.live_entry_mut(id)?;

        let Some(bound) = entry.native.take() else {
            return Ok(false);
        };
        let key = bound.surface.key();
        self.by_native.remove(&key);
        context.release_surface(id, bound.handle)?;

        log::info!("Surface {id} detached from {key}");
        Ok(true)
    }

    /// Removes a surface and releases its native handle.
    ///
    /// The surface is retired even if the backend fails to release the handle; that failure is
    /// logged.
    pub fn retire(&mut self, id: SurfaceId) -> Result<(), CoordinatorError> {
        let Some(entry) = self.surfaces.remove(&id) else {
            return Err(self.missing(id));
        };

        if let Some(bound) = entry.native {
            self.by_native.remove(&bound.surface.key());
            if let Err(e) = self.context.release_surface(id, bound.handle) {
                log::warn!("Releasing native handle of surface {id} failed: {e}");
            }
        }

        log::info!("Surface {id} retired");
        Ok(())
    }

    /// Surface is live and has a native handle, so it can be rendered.
    pub fn is_renderable(&self, id: SurfaceId) -> bool {
        self.surfaces.get(&id).is_some_and(|entry| entry.native.is_some())
    }

    /// Ids of all live surfaces, in ascending order.
    pub fn live_ids(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<SurfaceId> = self.surfaces.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of a live surface.
    pub fn info(&self, id: SurfaceId) -> Option<SurfaceInfo> {
        self.surfaces.get(&id).map(|entry| SurfaceInfo {
            id,
            size: entry.size,
            native: entry.native.as_ref().map(|bound| bound.surface.key()),
        })
    }

    /// Surface bound to the given native object, if any.
    pub fn find_by_native(&self, key: NativeSurfaceKey) -> Option<SurfaceId> {
        self.by_native.get(&key).copied()
    }

    pub fn context(&self) -> &ContextHandle {
        &self.context
    }
}
