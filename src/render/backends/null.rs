use std::collections::HashMap;
use crate::engine::surface::SurfaceId;
use crate::render::backend::{NativeHandle, NativeSurface, RenderBackend, Rgba, SurfaceSize};
use anyhow::{anyhow, Result};

/// Null backend renderer that does not perform any rendering.
///
/// It keeps enough bookkeeping to reject calls for surfaces it never bound, and counts frames
/// per surface so hosts can check that rendering happens at all.
#[derive(Default)]
pub struct NullBackend {
    surfaces: HashMap<SurfaceId, NullSurface>,
    next_handle: u64,
}

struct NullSurface {
    /// Size of the surface in pixels.
    size: SurfaceSize,
    /// Frame ID for the surface, used to track rendering frames.
    frame_id: u64,
}

impl NullBackend {
    /// Creates a new instance of the null backend.
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }

    /// Number of frames rendered for the surface.
    pub fn frame_id(&self, id: SurfaceId) -> Option<u64> {
        self.surfaces.get(&id).map(|s| s.frame_id)
    }

    pub fn surface_size(&self, id: SurfaceId) -> Option<SurfaceSize> {
        self.surfaces.get(&id).map(|s| s.size)
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut NullSurface> {
        self.surfaces
            .get_mut(&id)
            .ok_or_else(|| anyhow!("NullBackend has no surface {id}"))
    }
}

impl RenderBackend for NullBackend {
    fn name(&self) -> &str {
        "NullBackend"
    }

    fn bind_surface(&mut self, _native: &dyn NativeSurface, id: SurfaceId, size: SurfaceSize) -> Result<NativeHandle> {
        if self.surfaces.contains_key(&id) {
            return Err(anyhow!("NullBackend already has surface {id}"));
        }
        self.next_handle += 1;
        self.surfaces.insert(id, NullSurface { size, frame_id: 0 });
        Ok(NativeHandle::from_raw(self.next_handle))
    }

    fn release_surface(&mut self, id: SurfaceId, _handle: NativeHandle) -> Result<()> {
        self.surfaces
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("NullBackend has no surface {id}"))
    }

    fn resize_surface(&mut self, id: SurfaceId, size: SurfaceSize) -> Result<()> {
        self.surface_mut(id)?.size = size;
        Ok(())
    }

    fn update_text(&mut self, id: SurfaceId, _text: &str) -> Result<()> {
        self.surface_mut(id).map(|_| ())
    }

    fn update_parameters(&mut self, id: SurfaceId, _size: f32, _weight: f32) -> Result<()> {
        self.surface_mut(id).map(|_| ())
    }

    fn set_base_color(&mut self, _color: Rgba) -> Result<()> {
        Ok(())
    }

    fn render_batch(&mut self, surfaces: &[SurfaceId]) -> Result<()> {
        for id in surfaces {
            let s = self.surface_mut(*id)?;
            s.frame_id = s.frame_id.wrapping_add(1);
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.surfaces.clear();
    }
}
