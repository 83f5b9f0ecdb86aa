//! Renderer context: the capability through which the coordinator reaches the backend.
//!
//! A [`RendererContext`] wraps one [`RenderBackend`] for the lifetime of one coordinator.
//! Every call goes through [`ContextHandle`] and is checked against the context's liveness:
//! once [`RendererContext::destroy`] ran, all calls fail with
//! [`CoordinatorError::ContextInvalid`] instead of reaching a torn-down backend.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use crate::engine::errors::CoordinatorError;
use crate::engine::surface::SurfaceId;
use crate::render::backend::{NativeHandle, NativeSurface, RenderBackend, Rgba, SurfaceSize};
use crate::util::lock;

/// A unique identifier for a renderer context, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared reference to a renderer context.
pub type ContextHandle = Arc<RendererContext>;

/// Attribute values pushed to the backend for a variable font surface.
///
/// `text` is only set when the text actually changed since the last push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeUpdate<'a> {
    pub text: Option<&'a str>,
    pub size: f32,
    pub weight: f32,
}

pub struct RendererContext {
    /// ID of the context
    id: ContextId,
    /// Name of the backend, kept around for logging after the backend is gone
    backend_name: String,
    /// Cleared once by `destroy`. Checked without touching the backend lock, so liveness checks
    /// never wait behind a backend call.
    valid: AtomicBool,
    /// The backend itself. `None` once the context has been destroyed.
    backend: Mutex<Option<LiveBackend>>,
}

struct LiveBackend {
    backend: Box<dyn RenderBackend>,
    /// Surfaces holding a native handle right now
    bound: HashSet<SurfaceId>,
}

impl std::fmt::Debug for RendererContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererContext")
            .field("id", &self.id)
            .field("backend", &self.backend_name)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl RendererContext {
    /// Creates the context around `backend` and pushes the initial base colour.
    pub fn create(backend: Box<dyn RenderBackend>, base_color: Rgba) -> Result<ContextHandle, CoordinatorError> {
        let context = Arc::new(Self {
            id: ContextId::new(),
            backend_name: backend.name().to_string(),
            valid: AtomicBool::new(true),
            backend: Mutex::new(Some(LiveBackend { backend, bound: HashSet::new() })),
        });

        context.set_base_color(base_color)?;
        log::info!("Renderer context {} created with backend {}", context.id, context.backend_name);

        Ok(context)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Returns false once the context has been destroyed.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Fails with [`CoordinatorError::ContextInvalid`] if the context has been destroyed.
    pub fn ensure_valid(&self) -> Result<(), CoordinatorError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CoordinatorError::ContextInvalid)
        }
    }

    fn with_backend<R>(
        &self,
        f: impl FnOnce(&mut LiveBackend) -> Result<R, CoordinatorError>,
    ) -> Result<R, CoordinatorError> {
        let mut guard = lock(&self.backend);
        let live = guard.as_mut().ok_or(CoordinatorError::ContextInvalid)?;
        f(live)
    }

    pub fn bind_surface(
        &self,
        native: &dyn NativeSurface,
        id: SurfaceId,
        size: SurfaceSize,
    ) -> Result<NativeHandle, CoordinatorError> {
        log::debug!("Binding {} to surface {id} ({size})", native.key());
        self.with_backend(|live| {
            let handle = live.backend.bind_surface(native, id, size).map_err(CoordinatorError::Renderer)?;
            live.bound.insert(id);
            Ok(handle)
        })
    }

    /// Releases a native handle. The surface counts as unbound even if the backend fails.
    pub fn release_surface(&self, id: SurfaceId, handle: NativeHandle) -> Result<(), CoordinatorError> {
        self.with_backend(|live| {
            live.bound.remove(&id);
            live.backend.release_surface(id, handle).map_err(CoordinatorError::Renderer)
        })
    }

    pub fn resize_surface(&self, id: SurfaceId, size: SurfaceSize) -> Result<(), CoordinatorError> {
        self.with_backend(|live| live.backend.resize_surface(id, size).map_err(CoordinatorError::Renderer))
    }

    /// Pushes attribute values for a surface. The text is only re-shaped when present in
    /// `update`; size and weight are always sent. Fails with
    /// [`CoordinatorError::SurfaceNotFound`] when the surface holds no native handle.
    pub fn update_attributes(&self, id: SurfaceId, update: AttributeUpdate<'_>) -> Result<(), CoordinatorError> {
        self.with_backend(|live| {
            if !live.bound.contains(&id) {
                return Err(CoordinatorError::SurfaceNotFound(id));
            }
            let backend = &mut live.backend;
            if let Some(text) = update.text {
                backend.update_text(id, text).map_err(CoordinatorError::Renderer)?;
            }
            backend.update_parameters(id, update.size, update.weight).map_err(CoordinatorError::Renderer)
        })
    }

    pub fn set_base_color(&self, color: Rgba) -> Result<(), CoordinatorError> {
        self.with_backend(|live| live.backend.set_base_color(color).map_err(CoordinatorError::Renderer))
    }

    /// Renders a batch of surfaces in a single backend call and returns the ids it rendered.
    ///
    /// Ids whose native handle was released in the meantime are left out. When that leaves
    /// nothing of a non-empty batch, the backend is not called and `None` is returned.
    pub fn render_batch(&self, surfaces: &[SurfaceId]) -> Result<Option<Vec<SurfaceId>>, CoordinatorError> {
        self.with_backend(|live| {
            let batch: Vec<SurfaceId> = surfaces.iter().copied().filter(|id| live.bound.contains(id)).collect();
            if batch.is_empty() && !surfaces.is_empty() {
                log::debug!("Every surface of the batch was released before rendering");
                return Ok(None);
            }

            log::debug!("Rendering batch of {} surface(s) on context {}", batch.len(), self.id);
            live.backend.render_batch(&batch).map_err(CoordinatorError::Renderer)?;
            Ok(Some(batch))
        })
    }

    /// Destroys the backend. Returns `true` the first time, `false` on every later call.
    pub fn destroy(&self) -> bool {
        self.valid.store(false, Ordering::Release);
        let live = lock(&self.backend).take();
        match live {
            Some(mut live) => {
                live.backend.destroy();
                log::info!("Renderer context {} destroyed", self.id);
                true
            }
            None => false,
        }
    }
}

impl Drop for RendererContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
