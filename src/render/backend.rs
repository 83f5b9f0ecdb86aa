use std::any::Any;
use std::fmt::{Debug, Display};
use crate::engine::surface::SurfaceId;

/// Size of a surface in pixels. It's a simple struct to hold width and height.
#[derive(Clone, Copy, Debug, Default)]
#[derive(PartialEq, Eq)]
pub struct SurfaceSize { pub width: u32, pub height: u32 }

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Display for SurfaceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identity of the host-side object behind a native surface (a window, a `Surface`, a layer).
///
/// Two [`NativeSurface`] values with the same key refer to the same underlying object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeSurfaceKey(pub u64);

impl Display for NativeSurfaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native#{:x}", self.0)
    }
}

/// Host drawing target handed to the coordinator by the window system.
///
/// The coordinator never looks inside; backends downcast through [`NativeSurface::as_any`]
/// to get at the platform object they know how to bind.
pub trait NativeSurface: Any + Send + Sync {
    /// Stable identity of the underlying host object.
    fn key(&self) -> NativeSurfaceKey;
    fn as_any(&self) -> &dyn Any;
}

impl Debug for dyn NativeSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSurface").field("key", &self.key()).finish()
    }
}

/// Native surface that is nothing more than an integer handle owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawNativeSurface {
    pub raw: u64,
}

impl RawNativeSurface {
    pub fn new(raw: u64) -> Self {
        Self { raw }
    }
}

impl NativeSurface for RawNativeSurface {
    fn key(&self) -> NativeSurfaceKey {
        NativeSurfaceKey(self.raw)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Backend-side handle for a bound native surface. Opaque: only the backend that produced it
/// can interpret the bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// RGBA8 colour used as the clear colour of rendered surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([0xff, 0xff, 0xff, 0xff]);
    pub const BLACK: Rgba = Rgba([0x00, 0x00, 0x00, 0xff]);

    pub fn from_argb(argb: u32) -> Self {
        let [a, r, g, b] = argb.to_be_bytes();
        Rgba([r, g, b, a])
    }
}

/// Core backend interface. Implemented by the native renderer glue; every call is addressed
/// by [`SurfaceId`] and happens while the coordinator holds the context lock, so a backend
/// never sees two calls at once.
pub trait RenderBackend: Send {
    /// Name of the backend, used in log lines.
    fn name(&self) -> &str;

    /// Create the backend resources for `native` and return the handle for it.
    fn bind_surface(&mut self, native: &dyn NativeSurface, id: SurfaceId, size: SurfaceSize) -> anyhow::Result<NativeHandle>;

    /// Release everything that was created by [`RenderBackend::bind_surface`] for this surface.
    fn release_surface(&mut self, id: SurfaceId, handle: NativeHandle) -> anyhow::Result<()>;

    /// Surface dimensions changed.
    fn resize_surface(&mut self, id: SurfaceId, size: SurfaceSize) -> anyhow::Result<()>;

    /// Replace the text of a variable font surface. This is the expensive call: the backend
    /// re-shapes the text.
    fn update_text(&mut self, id: SurfaceId, text: &str) -> anyhow::Result<()>;

    /// Replace the cheap numeric parameters of a variable font surface.
    fn update_parameters(&mut self, id: SurfaceId, size: f32, weight: f32) -> anyhow::Result<()>;

    /// Colour the surfaces are cleared to before drawing.
    fn set_base_color(&mut self, color: Rgba) -> anyhow::Result<()>;

    /// Render every surface in `surfaces` in one go.
    fn render_batch(&mut self, surfaces: &[SurfaceId]) -> anyhow::Result<()>;

    /// Tear down the backend. Called exactly once, when the owning context is destroyed.
    fn destroy(&mut self);
}
