//! Backend that records every call it receives.
//!
//! Useful for hosts that want to trace what the coordinator asks of the renderer, and for
//! tests. Clones share the same log, so keep one clone around after boxing the other into a
//! coordinator.

use std::sync::{Arc, Mutex};
use anyhow::{anyhow, Result};
use crate::engine::surface::SurfaceId;
use crate::render::backend::{NativeHandle, NativeSurface, NativeSurfaceKey, RenderBackend, Rgba, SurfaceSize};
use crate::util::lock;

/// A single call as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    BindSurface { id: SurfaceId, native: NativeSurfaceKey, size: SurfaceSize },
    ReleaseSurface { id: SurfaceId },
    ResizeSurface { id: SurfaceId, size: SurfaceSize },
    UpdateText { id: SurfaceId, text: String },
    UpdateParameters { id: SurfaceId, size: f32, weight: f32 },
    SetBaseColor(Rgba),
    /// Surfaces of one batch, with the count as passed to the native side
    RenderBatch { surfaces: Vec<SurfaceId>, count: usize },
    Destroy,
}

#[derive(Default)]
struct Log {
    calls: Vec<BackendCall>,
    next_handle: u64,
    fail_next_bind: bool,
}

#[derive(Clone, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<Log>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.log).calls.clone()
    }

    pub fn clear(&self) {
        lock(&self.log).calls.clear();
    }

    /// All render batches so far, in order.
    pub fn render_batches(&self) -> Vec<Vec<SurfaceId>> {
        lock(&self.log)
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::RenderBatch { surfaces, .. } => Some(surfaces.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bind_count(&self) -> usize {
        lock(&self.log)
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::BindSurface { .. }))
            .count()
    }

    /// Make the next `bind_surface` call fail.
    pub fn fail_next_bind(&self) {
        lock(&self.log).fail_next_bind = true;
    }

    fn record(&self, call: BackendCall) {
        lock(&self.log).calls.push(call);
    }
}

impl RenderBackend for RecordingBackend {
    fn name(&self) -> &str {
        "RecordingBackend"
    }

    fn bind_surface(&mut self, native: &dyn NativeSurface, id: SurfaceId, size: SurfaceSize) -> Result<NativeHandle> {
        let mut log = lock(&self.log);
        if std::mem::take(&mut log.fail_next_bind) {
            return Err(anyhow!("bind of surface {id} rejected"));
        }
        log.next_handle += 1;
        log.calls.push(BackendCall::BindSurface { id, native: native.key(), size });
        Ok(NativeHandle::from_raw(log.next_handle))
    }

    fn release_surface(&mut self, id: SurfaceId, _handle: NativeHandle) -> Result<()> {
        self.record(BackendCall::ReleaseSurface { id });
        Ok(())
    }

    fn resize_surface(&mut self, id: SurfaceId, size: SurfaceSize) -> Result<()> {
        self.record(BackendCall::ResizeSurface { id, size });
        Ok(())
    }

    fn update_text(&mut self, id: SurfaceId, text: &str) -> Result<()> {
        self.record(BackendCall::UpdateText { id, text: text.to_string() });
        Ok(())
    }

    fn update_parameters(&mut self, id: SurfaceId, size: f32, weight: f32) -> Result<()> {
        self.record(BackendCall::UpdateParameters { id, size, weight });
        Ok(())
    }

    fn set_base_color(&mut self, color: Rgba) -> Result<()> {
        self.record(BackendCall::SetBaseColor(color));
        Ok(())
    }

    fn render_batch(&mut self, surfaces: &[SurfaceId]) -> Result<()> {
        self.record(BackendCall::RenderBatch { surfaces: surfaces.to_vec(), count: surfaces.len() });
        Ok(())
    }

    fn destroy(&mut self) {
        self.record(BackendCall::Destroy);
    }
}
