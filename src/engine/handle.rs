use std::sync::Arc;
use tokio::sync::broadcast;
use crate::engine::controller::{AttributeValue, VariableFontAttributes, VariableFontController};
use crate::engine::coordinator::Shared;
use crate::engine::errors::CoordinatorError;
use crate::engine::events::{CoordinatorEvent, LoopState, SurfaceEvent};
use crate::engine::frame::FrameTime;
use crate::engine::surface::{ResizeListener, SurfaceId, SurfaceInfo, SurfaceState};
use crate::render::backend::{NativeSurface, Rgba, SurfaceSize};
use crate::render::context::ContextId;
use crate::util::{catch_panic, lock};

/// Shuts the coordinator down once the last handle is gone.
struct ShutdownGuard {
    shared: Arc<Shared>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// Handle to a running coordinator. Cheap to clone; every method is non-blocking apart from
/// short critical sections and can be called from any thread.
///
/// Dropping the last clone shuts the coordinator down.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
    _guard: Arc<ShutdownGuard>,
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("context", &self.shared.context)
            .field("state", &self.loop_state())
            .finish()
    }
}

impl CoordinatorHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            _guard: Arc::new(ShutdownGuard { shared: shared.clone() }),
            shared,
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn context_id(&self) -> ContextId {
        self.shared.context.id()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn loop_state(&self) -> LoopState {
        *self.shared.state_tx.borrow()
    }

    /// Waits until the coordinator loop has stopped.
    pub async fn wait_stopped(&self) {
        let mut rx = self.shared.state_tx.subscribe();
        // The sender lives in `shared`, which we hold, so this only ends on `Stopped`.
        let _ = rx.wait_for(|state| *state == LoopState::Stopped).await;
    }

    /// Registers a native surface and returns its id.
    ///
    /// Registering a native surface that is already bound returns its existing id. Fails with
    /// [`CoordinatorError::ContextInvalid`] after shutdown, without allocating an id.
    pub fn create_surface(&self, native: Arc<dyn NativeSurface>, width: u32, height: u32) -> Result<SurfaceId, CoordinatorError> {
        let size = SurfaceSize::new(width, height);
        let (id, created) = {
            let mut registry = lock(&self.shared.registry);
            let existing = registry.find_by_native(native.key());
            let id = registry.register(native, size)?;
            (id, existing.is_none())
        };

        if created {
            self.shared.emit(CoordinatorEvent::SurfaceCreated { surface: id, size });
        }
        Ok(id)
    }

    /// Updates a surface's dimensions and calls its resize listener, even when the dimensions
    /// did not change.
    pub fn on_resize(&self, id: SurfaceId, width: u32, height: u32) -> Result<(), CoordinatorError> {
        let size = SurfaceSize::new(width, height);
        let listener = lock(&self.shared.registry).resize(id, size)?;

        if let Some(listener) = listener {
            catch_panic(|| listener(id, size));
        }
        self.shared.emit(CoordinatorEvent::SurfaceResized { surface: id, size });
        Ok(())
    }

    /// Sets (or clears, with `None`) the listener called on every resize of the surface.
    pub fn set_resize_listener<F>(&self, id: SurfaceId, listener: Option<F>) -> Result<(), CoordinatorError>
    where
        F: Fn(SurfaceId, SurfaceSize) + Send + Sync + 'static,
    {
        let listener = listener.map(|f| Arc::new(f) as ResizeListener);
        lock(&self.shared.registry).set_resize_listener(id, listener)
    }

    /// Retires a surface: its controller stops, its native handle is released and every later
    /// operation on it fails. Render callbacks already queued for it still run, but it is left
    /// out of the render batch.
    pub fn retire_surface(&self, id: SurfaceId) -> Result<(), CoordinatorError> {
        let controller = {
            let mut registry = lock(&self.shared.registry);
            registry.retire(id)?;
            lock(&self.shared.controllers).remove(&id)
        };
        drop(controller);

        self.shared.emit(CoordinatorEvent::SurfaceRetired { surface: id });
        Ok(())
    }

    /// Binds a native surface to an existing surface. Binding the same object again is a
    /// no-op; binding a different one while bound fails with
    /// [`CoordinatorError::DuplicateBind`], and one owned by another surface with
    /// [`CoordinatorError::NativeInUse`].
    pub fn attach_native(&self, id: SurfaceId, native: Arc<dyn NativeSurface>) -> Result<(), CoordinatorError> {
        let mut registry = lock(&self.shared.registry);
        let already_bound = registry.info(id).and_then(|info| info.native) == Some(native.key());
        registry.attach_native(id, native)?;

        if !already_bound {
            if let Some(controller) = lock(&self.shared.controllers).get(&id) {
                controller.invalidate();
            }
        }
        Ok(())
    }

    /// Releases a surface's native handle, keeping the surface live. Returns `false` when no
    /// native surface was bound.
    pub fn detach_native(&self, id: SurfaceId) -> Result<bool, CoordinatorError> {
        let detached = lock(&self.shared.registry).detach_native(id)?;
        if detached {
            self.shared.emit(CoordinatorEvent::SurfaceDetached { surface: id });
        }
        Ok(detached)
    }

    /// Applies a window-system surface notification. Returns the surface it concerned, or
    /// `None` for a notification about a native surface the coordinator does not know.
    pub fn handle_surface_event(&self, event: SurfaceEvent) -> Result<Option<SurfaceId>, CoordinatorError> {
        log::debug!("Surface event: {event:?}");

        match event {
            SurfaceEvent::Created { surface: Some(id), native, width, height } => {
                self.attach_native(id, native)?;
                self.on_resize(id, width, height)?;
                Ok(Some(id))
            }
            SurfaceEvent::Created { surface: None, native, width, height } => {
                self.create_surface(native, width, height).map(Some)
            }
            SurfaceEvent::Changed { native, width, height } => {
                let Some(id) = lock(&self.shared.registry).find_by_native(native) else {
                    log::warn!("Resize for unknown native surface {native}");
                    return Ok(None);
                };
                self.on_resize(id, width, height)?;
                Ok(Some(id))
            }
            SurfaceEvent::Destroyed { native } => {
                let Some(id) = lock(&self.shared.registry).find_by_native(native) else {
                    log::debug!("Native surface {native} was not bound");
                    return Ok(None);
                };
                self.detach_native(id)?;
                Ok(Some(id))
            }
        }
    }

    /// Queues `callback` to run once at the next frame boundary. The surface is part of that
    /// frame's render batch if it is still live and bound by then.
    pub fn on_render<F>(&self, id: SurfaceId, callback: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce(FrameTime) + Send + 'static,
    {
        self.shared.context.ensure_valid()?;
        lock(&self.shared.registry).ensure_live(id)?;
        self.shared.queue.enqueue(id, Box::new(callback));
        Ok(())
    }

    /// Hands a new attribute value to the surface's controller without blocking.
    ///
    /// A surface without a controller gets one, initialised from the configured defaults. A
    /// write to a retired surface is logged and dropped.
    pub fn set_attribute(&self, id: SurfaceId, value: AttributeValue) -> Result<(), CoordinatorError> {
        self.shared.context.ensure_valid()?;
        let registry = lock(&self.shared.registry);
        match registry.ensure_live(id) {
            Ok(()) => {}
            Err(CoordinatorError::SurfaceRetired(_)) => {
                log::warn!("Dropping {} update for retired surface {id}", value.kind());
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut controllers = lock(&self.shared.controllers);
        let controller = controllers.entry(id).or_insert_with(|| {
            let config = &self.shared.config;
            self.spawn_controller(id, VariableFontAttributes {
                text: config.default_text.clone(),
                size: config.default_font_size,
                weight: config.default_font_weight,
            })
        });
        controller.set(value);
        Ok(())
    }

    /// Turns a surface into a variable font surface with the given attributes.
    ///
    /// A surface that already has a controller gets the attributes as regular writes.
    pub fn make_variable_font_surface(
        &self,
        id: SurfaceId,
        text: impl Into<String>,
        size: f32,
        weight: f32,
    ) -> Result<(), CoordinatorError> {
        self.shared.context.ensure_valid()?;
        let registry = lock(&self.shared.registry);
        registry.ensure_live(id)?;

        let attributes = VariableFontAttributes { text: text.into(), size, weight };
        let mut controllers = lock(&self.shared.controllers);
        match controllers.get(&id) {
            Some(controller) => {
                controller.set(AttributeValue::Text(attributes.text));
                controller.set(AttributeValue::Size(attributes.size));
                controller.set(AttributeValue::Weight(attributes.weight));
            }
            None => {
                log::info!("Surface {id} is now a variable font surface");
                controllers.insert(id, self.spawn_controller(id, attributes));
            }
        }
        Ok(())
    }

    fn spawn_controller(&self, id: SurfaceId, initial: VariableFontAttributes) -> VariableFontController {
        VariableFontController::spawn(
            id,
            initial,
            self.shared.queue.clone(),
            self.shared.registry.clone(),
            self.shared.cancel.child_token(),
            &self.shared.runtime,
        )
    }

    /// Attribute state last folded in by the surface's controller, if it has one.
    pub fn attributes(&self, id: SurfaceId) -> Option<VariableFontAttributes> {
        lock(&self.shared.controllers).get(&id).map(|c| c.attributes())
    }

    /// Sets the colour the backend clears surfaces to.
    pub fn set_base_color(&self, color: Rgba) -> Result<(), CoordinatorError> {
        self.shared.context.set_base_color(color)
    }

    /// Snapshot of a live surface. `None` once the surface is retired.
    pub fn surface_info(&self, id: SurfaceId) -> Option<SurfaceInfo> {
        lock(&self.shared.registry).info(id)
    }

    /// Whether `id` is live or retired. `None` for ids this coordinator never handed out.
    pub fn surface_state(&self, id: SurfaceId) -> Option<SurfaceState> {
        lock(&self.shared.registry).state(id)
    }

    /// Ids of all live surfaces, in ascending order.
    pub fn live_surfaces(&self) -> Vec<SurfaceId> {
        lock(&self.shared.registry).live_ids()
    }

    /// Stops the loop, retires every live surface and destroys the renderer context. Render
    /// requests still queued are dropped without running.
    ///
    /// Idempotent: returns `false` if the coordinator was already shut down.
    pub fn shutdown(&self) -> bool {
        self.shared.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast::Receiver;
    use crate::engine::config::CoordinatorConfig;
    use crate::engine::coordinator::Coordinator;
    use crate::engine::frame::{FramePulser, ManualFrameClock};
    use crate::render::backend::{NativeHandle, NativeSurfaceKey, RawNativeSurface, RenderBackend};
    use crate::render::backends::recording::{BackendCall, RecordingBackend};

    fn start() -> (CoordinatorHandle, FramePulser, RecordingBackend) {
        let backend = RecordingBackend::new();
        let (clock, pulser) = ManualFrameClock::new();
        let coordinator = Coordinator::new(Some(CoordinatorConfig::default()), Box::new(backend.clone()), clock).unwrap();
        let (handle, _join) = coordinator.start();
        (handle, pulser, backend)
    }

    fn native(raw: u64) -> Arc<dyn NativeSurface> {
        Arc::new(RawNativeSurface::new(raw))
    }

    async fn next_batch(rx: &mut Receiver<CoordinatorEvent>) -> Vec<SurfaceId> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("no frame dispatched")
                .unwrap();
            if let CoordinatorEvent::FrameDispatched { surfaces, .. } = event {
                return surfaces;
            }
        }
    }

    fn text_updates(backend: &RecordingBackend, id: SurfaceId) -> Vec<String> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UpdateText { id: i, text } if i == id => Some(text),
                _ => None,
            })
            .collect()
    }

    fn parameter_updates(backend: &RecordingBackend, id: SurfaceId) -> Vec<(f32, f32)> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UpdateParameters { id: i, size, weight } if i == id => Some((size, weight)),
                _ => None,
            })
            .collect()
    }

    /// Records like [`RecordingBackend`] but takes its time over every render batch.
    struct SlowBackend {
        inner: RecordingBackend,
        rendering: Arc<AtomicBool>,
        delay: Duration,
    }

    impl RenderBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        fn bind_surface(&mut self, native: &dyn NativeSurface, id: SurfaceId, size: SurfaceSize) -> anyhow::Result<NativeHandle> {
            self.inner.bind_surface(native, id, size)
        }

        fn release_surface(&mut self, id: SurfaceId, handle: NativeHandle) -> anyhow::Result<()> {
            self.inner.release_surface(id, handle)
        }

        fn resize_surface(&mut self, id: SurfaceId, size: SurfaceSize) -> anyhow::Result<()> {
            self.inner.resize_surface(id, size)
        }

        fn update_text(&mut self, id: SurfaceId, text: &str) -> anyhow::Result<()> {
            self.inner.update_text(id, text)
        }

        fn update_parameters(&mut self, id: SurfaceId, size: f32, weight: f32) -> anyhow::Result<()> {
            self.inner.update_parameters(id, size, weight)
        }

        fn set_base_color(&mut self, color: Rgba) -> anyhow::Result<()> {
            self.inner.set_base_color(color)
        }

        fn render_batch(&mut self, surfaces: &[SurfaceId]) -> anyhow::Result<()> {
            self.rendering.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.rendering.store(false, Ordering::SeqCst);
            self.inner.render_batch(surfaces)
        }

        fn destroy(&mut self) {
            self.inner.destroy()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn writers_do_not_wait_for_a_render_in_progress() {
        let rendering = Arc::new(AtomicBool::new(false));
        let backend = SlowBackend {
            inner: RecordingBackend::new(),
            rendering: rendering.clone(),
            delay: Duration::from_millis(500),
        };
        let (clock, pulser) = ManualFrameClock::new();
        let coordinator = Coordinator::new(None, Box::new(backend), clock).unwrap();
        let (handle, _join) = coordinator.start();
        let id = handle.create_surface(native(1), 10, 10).unwrap();

        handle.on_render(id, |_| {}).unwrap();
        pulser.pulse();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !rendering.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("render batch never started");

        let h = handle.clone();
        let elapsed = tokio::task::spawn_blocking(move || {
            let started = std::time::Instant::now();
            h.set_attribute(id, AttributeValue::Size(12.0)).unwrap();
            h.on_render(id, |_| {}).unwrap();
            h.set_resize_listener(id, Some(|_, _| {})).unwrap();
            // same size, so the backend is not involved
            h.on_resize(id, 10, 10).unwrap();
            started.elapsed()
        })
        .await
        .unwrap();

        assert!(rendering.load(Ordering::SeqCst), "render batch finished before the writers ran");
        assert!(elapsed < Duration::from_millis(100), "writers blocked for {elapsed:?}");
    }

    #[tokio::test]
    async fn create_surface_twice_for_the_same_native_is_idempotent() {
        let (handle, _pulser, backend) = start();
        let mut events = handle.subscribe_events();
        let surface = native(7);

        let first = handle.create_surface(surface.clone(), 200, 100).unwrap();
        let second = handle.create_surface(surface, 200, 100).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.bind_count(), 1);
        assert_eq!(handle.live_surfaces(), vec![first]);
        assert_eq!(
            events.try_recv().unwrap(),
            CoordinatorEvent::SurfaceCreated { surface: first, size: SurfaceSize::new(200, 100) }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn attribute_writes_before_a_frame_apply_only_the_latest() {
        let (handle, pulser, backend) = start();
        let mut events = handle.subscribe_events();
        let s2 = handle.create_surface(native(2), 200, 100).unwrap();

        handle.set_attribute(s2, AttributeValue::Text("A".into())).unwrap();
        handle.set_attribute(s2, AttributeValue::Text("B".into())).unwrap();
        handle.set_attribute(s2, AttributeValue::Size(10.0)).unwrap();
        handle.set_attribute(s2, AttributeValue::Size(12.0)).unwrap();
        pulser.pulse();

        assert_eq!(next_batch(&mut events).await, vec![s2]);
        assert_eq!(text_updates(&backend, s2), vec!["B".to_string()]);
        assert_eq!(parameter_updates(&backend, s2), vec![(12.0, 400.0)]);
    }

    #[tokio::test]
    async fn retired_surface_runs_its_callback_but_leaves_the_batch() {
        let (handle, pulser, backend) = start();
        let mut events = handle.subscribe_events();
        let s3 = handle.create_surface(native(3), 10, 10).unwrap();
        let s4 = handle.create_surface(native(4), 10, 10).unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        handle.on_render(s3, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
        handle.on_render(s4, |_| {}).unwrap();
        handle.retire_surface(s3).unwrap();
        pulser.pulse();

        assert_eq!(next_batch(&mut events).await, vec![s4]);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(backend.render_batches(), vec![vec![s4]]);
    }

    #[tokio::test]
    async fn retired_surface_rejects_further_operations() {
        let (handle, _pulser, _backend) = start();
        let id = handle.create_surface(native(1), 10, 10).unwrap();
        handle.retire_surface(id).unwrap();

        assert!(matches!(handle.retire_surface(id), Err(CoordinatorError::SurfaceRetired(_))));
        assert!(matches!(handle.on_resize(id, 5, 5), Err(CoordinatorError::SurfaceRetired(_))));
        assert!(matches!(handle.on_render(id, |_| {}), Err(CoordinatorError::SurfaceRetired(_))));
        // attribute writes racing with retirement are dropped quietly
        assert!(handle.set_attribute(id, AttributeValue::Weight(700.0)).is_ok());
        assert!(handle.surface_info(id).is_none());
        assert_eq!(handle.surface_state(id), Some(SurfaceState::Retired));
    }

    #[tokio::test]
    async fn unknown_surface_is_reported() {
        let (handle, _pulser, _backend) = start();
        let bogus = SurfaceId::from_raw(99).unwrap();
        assert!(matches!(handle.on_render(bogus, |_| {}), Err(CoordinatorError::SurfaceNotFound(_))));
        assert!(matches!(
            handle.set_attribute(bogus, AttributeValue::Size(1.0)),
            Err(CoordinatorError::SurfaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_surface_after_shutdown_fails_and_allocates_nothing() {
        let (handle, _pulser, backend) = start();
        let first = handle.create_surface(native(1), 10, 10).unwrap();

        assert!(handle.shutdown());
        assert!(!handle.shutdown());

        assert!(matches!(handle.create_surface(native(2), 10, 10), Err(CoordinatorError::ContextInvalid)));
        assert!(matches!(handle.set_base_color(Rgba::BLACK), Err(CoordinatorError::ContextInvalid)));
        assert_eq!(backend.bind_count(), 1);
        assert_eq!(handle.surface_state(first), Some(SurfaceState::Retired));
        assert_eq!(handle.surface_state(SurfaceId::from_raw(2).unwrap()), None);
        assert!(handle.live_surfaces().is_empty());

        tokio::time::timeout(Duration::from_secs(2), handle.wait_stopped()).await.unwrap();
    }

    #[tokio::test]
    async fn resize_calls_listener_every_time() {
        let (handle, _pulser, backend) = start();
        let id = handle.create_surface(native(1), 200, 100).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle
            .set_resize_listener(id, Some(move |id, size| sink.lock().unwrap().push((id, size))))
            .unwrap();

        handle.on_resize(id, 400, 200).unwrap();
        handle.on_resize(id, 400, 200).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(id, SurfaceSize::new(400, 200)); 2]);
        assert_eq!(handle.surface_info(id).unwrap().size, SurfaceSize::new(400, 200));
        assert!(backend.calls().contains(&BackendCall::ResizeSurface { id, size: SurfaceSize::new(400, 200) }));
    }

    #[tokio::test]
    async fn surface_events_detach_and_reattach() {
        let (handle, pulser, backend) = start();
        let mut events = handle.subscribe_events();

        let id = handle
            .handle_surface_event(SurfaceEvent::Created { surface: None, native: native(1), width: 100, height: 50 })
            .unwrap()
            .unwrap();
        handle.make_variable_font_surface(id, "12:00", 32.0, 500.0).unwrap();

        handle.handle_surface_event(SurfaceEvent::Destroyed { native: NativeSurfaceKey(1) }).unwrap();
        assert_eq!(handle.surface_info(id).unwrap().native, None);
        assert_eq!(handle.surface_state(id), Some(SurfaceState::Live));

        // unknown natives are ignored
        assert_eq!(
            handle.handle_surface_event(SurfaceEvent::Changed { native: NativeSurfaceKey(9), width: 1, height: 1 }).unwrap(),
            None
        );

        handle
            .handle_surface_event(SurfaceEvent::Created { surface: Some(id), native: native(2), width: 120, height: 60 })
            .unwrap();
        let info = handle.surface_info(id).unwrap();
        assert_eq!(info.native, Some(NativeSurfaceKey(2)));
        assert_eq!(info.size, SurfaceSize::new(120, 60));

        pulser.pulse();
        assert_eq!(next_batch(&mut events).await, vec![id]);
        assert_eq!(text_updates(&backend, id), vec!["12:00".to_string()]);
        assert_eq!(parameter_updates(&backend, id), vec![(32.0, 500.0)]);
    }

    #[tokio::test]
    async fn attaching_a_second_native_is_rejected() {
        let (handle, _pulser, backend) = start();
        let id = handle.create_surface(native(1), 10, 10).unwrap();

        handle.attach_native(id, native(1)).unwrap();
        assert!(matches!(
            handle.attach_native(id, native(2)),
            Err(CoordinatorError::DuplicateBind { bound: NativeSurfaceKey(1), requested: NativeSurfaceKey(2), .. })
        ));
        assert_eq!(backend.bind_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_last_handle_shuts_down() {
        let backend = RecordingBackend::new();
        let (clock, _pulser) = ManualFrameClock::new();
        let coordinator = Coordinator::new(None, Box::new(backend.clone()), clock).unwrap();
        let (handle, join) = coordinator.start();
        handle.create_surface(native(1), 10, 10).unwrap();

        let clone = handle.clone();
        drop(handle);
        assert!(!clone.is_shut_down());
        drop(clone);

        tokio::time::timeout(Duration::from_secs(2), join).await.unwrap().unwrap();
        assert_eq!(backend.calls().last(), Some(&BackendCall::Destroy));
    }
}
