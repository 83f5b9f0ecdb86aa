//! Variable font surface controller.
//!
//! Each variable font surface gets a controller: three [`PropertyCell`]s (text, size, weight)
//! written from arbitrary UI call sites, and a consumer task that folds incoming values into
//! the surface's attribute state and schedules at most one render at a time.
//!
//! ```text
//!   set_attribute ─► [text] [size] [weight] ─► consumer task ─► schedule_render
//!                                                                    │ (guard)
//!                                                                    ▼
//!                                    render callback ◄── RenderQueue (next frame)
//!                                          │
//!                                          ▼
//!                         update_text (if dirty) + update_parameters
//! ```

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::engine::frame::FrameTime;
use crate::engine::property::PropertyCell;
use crate::engine::queue::RenderQueue;
use crate::engine::surface::{SurfaceId, SurfaceRegistry};
use crate::render::context::AttributeUpdate;
use crate::util::lock;

/// Attribute of a variable font surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Text,
    Size,
    Weight,
}

impl Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeKind::Text => write!(f, "text"),
            AttributeKind::Size => write!(f, "size"),
            AttributeKind::Weight => write!(f, "weight"),
        }
    }
}

/// New value for one attribute. The variant determines the [`AttributeKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    /// Font size in pixels
    Size(f32),
    /// Font weight axis value (100 thin .. 900 black)
    Weight(f32),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Text(_) => AttributeKind::Text,
            AttributeValue::Size(_) => AttributeKind::Size,
            AttributeValue::Weight(_) => AttributeKind::Weight,
        }
    }
}

/// Attribute state of a variable font surface as last folded in by its controller.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableFontAttributes {
    pub text: String,
    pub size: f32,
    pub weight: f32,
}

struct Attributes {
    current: VariableFontAttributes,
    /// Text changed since it was last pushed to the backend
    text_dirty: bool,
}

struct Cells {
    text: PropertyCell<String>,
    size: PropertyCell<f32>,
    weight: PropertyCell<f32>,
}

impl Cells {
    fn close(&self) {
        self.text.close();
        self.size.close();
        self.weight.close();
    }
}

struct Inner {
    surface_id: SurfaceId,
    cells: Cells,
    attributes: Mutex<Attributes>,
    /// A render for this surface is queued and has not run yet
    render_scheduled: AtomicBool,
    queue: Arc<RenderQueue>,
    registry: Arc<Mutex<SurfaceRegistry>>,
}

/// Drives the attributes of one variable font surface.
///
/// Dropping the controller retires it: the consumer task stops and later writes are refused.
pub struct VariableFontController {
    inner: Arc<Inner>,
    retired: CancellationToken,
    task: JoinHandle<()>,
}

impl VariableFontController {
    /// Starts a controller on `runtime` and queues a first render carrying `initial`.
    ///
    /// `retired` is cancelled when the surface goes away; it is usually a child of the
    /// coordinator's token so a coordinator shutdown stops every controller.
    pub(crate) fn spawn(
        surface_id: SurfaceId,
        initial: VariableFontAttributes,
        queue: Arc<RenderQueue>,
        registry: Arc<Mutex<SurfaceRegistry>>,
        retired: CancellationToken,
        runtime: &Handle,
    ) -> Self {
        let inner = Arc::new(Inner {
            surface_id,
            cells: Cells {
                text: PropertyCell::new(),
                size: PropertyCell::new(),
                weight: PropertyCell::new(),
            },
            attributes: Mutex::new(Attributes { current: initial, text_dirty: true }),
            render_scheduled: AtomicBool::new(false),
            queue,
            registry,
        });

        inner.schedule_render();
        let task = runtime.spawn(inner.clone().consume(retired.clone()));
        log::debug!("Variable font controller started for surface {surface_id}");

        Self { inner, retired, task }
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.inner.surface_id
    }

    /// Hands a new value to the controller. Never blocks; an unconsumed earlier value of the
    /// same attribute is discarded. Returns `false` once the controller is retired.
    pub fn set(&self, value: AttributeValue) -> bool {
        let cells = &self.inner.cells;
        match value {
            AttributeValue::Text(text) => cells.text.set(text),
            AttributeValue::Size(size) => cells.size.set(size),
            AttributeValue::Weight(weight) => cells.weight.set(weight),
        }
    }

    /// Marks the text dirty and schedules a render, so the full state reaches the backend
    /// again. Used after a native surface is (re)attached.
    pub fn invalidate(&self) {
        lock(&self.inner.attributes).text_dirty = true;
        self.inner.schedule_render();
    }

    pub fn attributes(&self) -> VariableFontAttributes {
        lock(&self.inner.attributes).current.clone()
    }

    pub fn is_render_scheduled(&self) -> bool {
        self.inner.render_scheduled.load(Ordering::Acquire)
    }

    pub fn retire(&self) {
        self.retired.cancel();
        self.inner.cells.close();
    }

    pub fn is_retired(&self) -> bool {
        self.retired.is_cancelled()
    }

    /// Consumer task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for VariableFontController {
    fn drop(&mut self) {
        self.retire();
    }
}

impl Inner {
    async fn consume(self: Arc<Self>, retired: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = retired.cancelled() => break,
                Some(text) = self.cells.text.recv() => self.apply(AttributeValue::Text(text)),
                Some(size) = self.cells.size.recv() => self.apply(AttributeValue::Size(size)),
                Some(weight) = self.cells.weight.recv() => self.apply(AttributeValue::Weight(weight)),
                else => break,
            }
            self.schedule_render();
        }

        self.cells.close();
        log::debug!("Variable font controller for surface {} stopped", self.surface_id);
    }

    fn apply(&self, value: AttributeValue) {
        let mut attributes = lock(&self.attributes);
        match value {
            AttributeValue::Text(text) => {
                attributes.current.text = text;
                attributes.text_dirty = true;
            }
            AttributeValue::Size(size) => attributes.current.size = size,
            AttributeValue::Weight(weight) => attributes.current.weight = weight,
        }
    }

    /// Folds in whatever is pending right now, so a render always pushes the latest values.
    fn drain_cells(&self) {
        if let Some(text) = self.cells.text.take() {
            self.apply(AttributeValue::Text(text));
        }
        if let Some(size) = self.cells.size.take() {
            self.apply(AttributeValue::Size(size));
        }
        if let Some(weight) = self.cells.weight.take() {
            self.apply(AttributeValue::Weight(weight));
        }
    }

    fn schedule_render(self: &Arc<Self>) {
        if self.render_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.clone();
        self.queue.enqueue(self.surface_id, Box::new(move |frame| inner.render(frame)));
    }

    fn render(&self, frame: FrameTime) {
        // Cleared first: a write landing while we render schedules the next frame.
        self.render_scheduled.store(false, Ordering::Release);
        self.drain_cells();

        let id = self.surface_id;
        let context = {
            let registry = lock(&self.registry);
            if let Err(e) = registry.ensure_live(id) {
                log::warn!("Dropping attribute update at {frame:?}: {e}");
                return;
            }
            if !registry.is_renderable(id) {
                log::debug!("Surface {id} has no native surface bound, keeping attributes pending");
                return;
            }
            registry.context().clone()
        };

        // A retire or detach racing with us from here on shows up as SurfaceNotFound.
        let mut attributes = lock(&self.attributes);
        let update = AttributeUpdate {
            text: attributes.text_dirty.then_some(attributes.current.text.as_str()),
            size: attributes.current.size,
            weight: attributes.current.weight,
        };
        match context.update_attributes(id, update) {
            Ok(()) => attributes.text_dirty = false,
            Err(e) if e.is_surface_race() => log::warn!("Dropping attribute update: {e}"),
            Err(e) => log::error!("Attribute update for surface {id} failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::render::backend::{NativeSurface, RawNativeSurface, Rgba, SurfaceSize};
    use crate::render::backends::recording::{BackendCall, RecordingBackend};
    use crate::render::context::RendererContext;

    struct Fixture {
        queue: Arc<RenderQueue>,
        registry: Arc<Mutex<SurfaceRegistry>>,
        backend: RecordingBackend,
        id: SurfaceId,
    }

    fn fixture() -> Fixture {
        let backend = RecordingBackend::new();
        let context = RendererContext::create(Box::new(backend.clone()), Rgba::WHITE).unwrap();
        let mut registry = SurfaceRegistry::new(context);
        let native: Arc<dyn NativeSurface> = Arc::new(RawNativeSurface::new(1));
        let id = registry.register(native, SurfaceSize::new(200, 100)).unwrap();
        backend.clear();

        Fixture {
            queue: Arc::new(RenderQueue::new()),
            registry: Arc::new(Mutex::new(registry)),
            backend,
            id,
        }
    }

    fn initial() -> VariableFontAttributes {
        VariableFontAttributes { text: "hi".into(), size: 24.0, weight: 400.0 }
    }

    fn spawn(f: &Fixture) -> VariableFontController {
        VariableFontController::spawn(
            f.id,
            initial(),
            f.queue.clone(),
            f.registry.clone(),
            CancellationToken::new(),
            &Handle::current(),
        )
    }

    fn run_frame(queue: &RenderQueue) -> usize {
        let requests = queue.drain_for_frame();
        let n = requests.len();
        for request in requests {
            request.run(FrameTime::default());
        }
        n
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        for _ in 0..200 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn first_render_pushes_initial_attributes() {
        let f = fixture();
        let controller = spawn(&f);
        assert!(controller.is_render_scheduled());

        assert_eq!(run_frame(&f.queue), 1);
        assert_eq!(
            f.backend.calls(),
            vec![
                BackendCall::UpdateText { id: f.id, text: "hi".into() },
                BackendCall::UpdateParameters { id: f.id, size: 24.0, weight: 400.0 },
            ]
        );
        assert!(!controller.is_render_scheduled());
    }

    #[tokio::test]
    async fn writes_before_a_frame_coalesce_into_one_render() {
        let f = fixture();
        let controller = spawn(&f);
        run_frame(&f.queue);
        f.backend.clear();

        controller.set(AttributeValue::Text("A".into()));
        controller.set(AttributeValue::Text("B".into()));
        controller.set(AttributeValue::Size(10.0));
        controller.set(AttributeValue::Size(12.0));

        // guard keeps it to a single queued request however the consumer interleaves
        wait_until(|| controller.is_render_scheduled()).await;
        assert_eq!(f.queue.len(), 1);

        run_frame(&f.queue);
        assert_eq!(
            f.backend.calls(),
            vec![
                BackendCall::UpdateText { id: f.id, text: "B".into() },
                BackendCall::UpdateParameters { id: f.id, size: 12.0, weight: 400.0 },
            ]
        );
        assert_eq!(controller.attributes().text, "B");
    }

    #[tokio::test]
    async fn numeric_change_skips_text_reshaping() {
        let f = fixture();
        let controller = spawn(&f);
        run_frame(&f.queue);
        f.backend.clear();

        controller.set(AttributeValue::Weight(700.0));
        wait_until(|| controller.is_render_scheduled()).await;
        run_frame(&f.queue);

        assert_eq!(
            f.backend.calls(),
            vec![BackendCall::UpdateParameters { id: f.id, size: 24.0, weight: 700.0 }]
        );
    }

    #[tokio::test]
    async fn render_after_retirement_is_dropped() {
        let f = fixture();
        let controller = spawn(&f);
        f.registry.lock().unwrap().retire(f.id).unwrap();
        f.backend.clear();

        // queued render still runs, but nothing reaches the backend
        assert_eq!(run_frame(&f.queue), 1);
        assert!(f.backend.calls().is_empty());
        drop(controller);
    }

    #[tokio::test]
    async fn retire_stops_the_consumer_and_refuses_writes() {
        let f = fixture();
        let controller = spawn(&f);
        controller.retire();

        assert!(controller.is_retired());
        assert!(!controller.set(AttributeValue::Size(1.0)));
        wait_until(|| controller.is_finished()).await;
    }

    #[tokio::test]
    async fn detached_surface_keeps_text_dirty_until_reattached() {
        let f = fixture();
        let controller = spawn(&f);
        f.registry.lock().unwrap().detach_native(f.id).unwrap();
        f.backend.clear();

        run_frame(&f.queue);
        assert!(f.backend.calls().is_empty());

        let native: Arc<dyn NativeSurface> = Arc::new(RawNativeSurface::new(2));
        f.registry.lock().unwrap().attach_native(f.id, native).unwrap();
        controller.invalidate();
        f.backend.clear();

        run_frame(&f.queue);
        assert_eq!(
            f.backend.calls(),
            vec![
                BackendCall::UpdateText { id: f.id, text: "hi".into() },
                BackendCall::UpdateParameters { id: f.id, size: 24.0, weight: 400.0 },
            ]
        );
    }
}
