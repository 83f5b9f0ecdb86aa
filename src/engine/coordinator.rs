use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::engine::config::CoordinatorConfig;
use crate::engine::controller::VariableFontController;
use crate::engine::errors::CoordinatorError;
use crate::engine::events::{CoordinatorEvent, LoopState};
use crate::engine::frame::{FrameClock, FrameTime};
use crate::engine::handle::CoordinatorHandle;
use crate::engine::queue::{RenderQueue, RenderRequest, TouchedSurfaces};
use crate::engine::surface::{SurfaceId, SurfaceRegistry};
use crate::render::backend::{RenderBackend, Rgba};
use crate::render::context::{ContextHandle, RendererContext};
use crate::util::{catch_panic, lock};

/// Frame-driven render coordinator.
///
/// Owns the renderer context, the surface registry and the render queue, and runs the loop
/// that turns queued render callbacks into one batched backend call per frame. Build it with
/// [`Coordinator::new`], then [`Coordinator::start`] it from within a tokio runtime.
pub struct Coordinator<C: FrameClock> {
    config: Arc<CoordinatorConfig>,
    context: ContextHandle,
    clock: C,
}

/// State shared between the loop, the handles and the surface controllers.
///
/// Lock order: `registry` before `controllers`. The context and queue locks are leaves.
pub(crate) struct Shared {
    pub(crate) config: Arc<CoordinatorConfig>,
    pub(crate) context: ContextHandle,
    pub(crate) registry: Arc<Mutex<SurfaceRegistry>>,
    pub(crate) queue: Arc<RenderQueue>,
    pub(crate) controllers: Mutex<HashMap<SurfaceId, VariableFontController>>,
    pub(crate) event_tx: broadcast::Sender<CoordinatorEvent>,
    pub(crate) state_tx: watch::Sender<LoopState>,
    /// Cancelled on shutdown. Controllers hold child tokens.
    pub(crate) cancel: CancellationToken,
    pub(crate) runtime: Handle,
    shut_down: AtomicBool,
}

impl<C: FrameClock> Coordinator<C> {
    /// Create a new coordinator around `backend`, paced by `clock`.
    ///
    /// If `config` is `None`, [`CoordinatorConfig::default`] is used.
    ///
    /// ```
    /// # use render_coordinator as rc;
    /// let backend = rc::render::backends::null::NullBackend::new().unwrap();
    /// let (clock, _pulser) = rc::engine::frame::ManualFrameClock::new();
    /// let coordinator = rc::Coordinator::new(None, Box::new(backend), clock).unwrap();
    /// ```
    pub fn new(config: Option<CoordinatorConfig>, backend: Box<dyn RenderBackend>, clock: C) -> Result<Self, CoordinatorError> {
        let config = config.unwrap_or_default();
        let context = RendererContext::create(backend, Rgba(config.base_color))?;

        Ok(Self {
            config: Arc::new(config),
            context,
            clock,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Spawns the coordinator loop and returns a handle to it with the loop's join handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (event_tx, _first_rx) = broadcast::channel(self.config.event_channel_capacity);
        let (state_tx, _state_rx) = watch::channel(LoopState::Starting);

        let shared = Arc::new(Shared {
            registry: Arc::new(Mutex::new(SurfaceRegistry::new(self.context.clone()))),
            queue: Arc::new(RenderQueue::new()),
            controllers: Mutex::new(HashMap::new()),
            config: self.config,
            context: self.context,
            event_tx,
            state_tx,
            cancel: CancellationToken::new(),
            runtime: Handle::current(),
            shut_down: AtomicBool::new(false),
        });

        let handle = CoordinatorHandle::new(shared.clone());
        let join_handle = tokio::spawn(run(shared, self.clock));

        (handle, join_handle)
    }
}

/// Runs until the coordinator is shut down or the frame clock closes.
async fn run<C: FrameClock>(shared: Arc<Shared>, mut clock: C) {
    let mut frame_loop = FrameLoop {
        touched: TouchedSurfaces::with_capacity(shared.config.touched_capacity),
        scratch: Vec::new(),
        frame: 0,
        shared,
    };
    let shared = frame_loop.shared.clone();

    log::info!("Coordinator loop started on context {}", shared.context.id());
    shared.emit(CoordinatorEvent::LoopStarted { context: shared.context.id() });

    loop {
        shared.set_state(LoopState::AwaitingFrame);

        let timestamp = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            frame = clock.next_frame() => match frame {
                Some(timestamp) => timestamp,
                None => {
                    log::info!("Frame clock closed, stopping coordinator loop");
                    break;
                }
            },
        };

        if shared.cancel.is_cancelled() {
            break;
        }

        match frame_loop.frame(timestamp) {
            Ok(()) => {}
            Err(CoordinatorError::ContextInvalid) if shared.cancel.is_cancelled() => break,
            Err(e @ (CoordinatorError::ContextInvalid | CoordinatorError::CapacityGrowthFailure { .. })) => {
                log::error!("Coordinator loop stopping: {e}");
                break;
            }
            Err(e) => log::error!("Frame {} failed: {e}", frame_loop.frame),
        }
    }

    shared.set_state(LoopState::Stopped);
    shared.emit(CoordinatorEvent::LoopStopped);
    log::info!("Coordinator loop stopped after {} frame(s)", frame_loop.frame);
}

/// Per-loop scratch state, reused across frames.
struct FrameLoop {
    shared: Arc<Shared>,
    touched: TouchedSurfaces,
    /// Empty list swapped in as the queue's next active list
    scratch: Vec<RenderRequest>,
    frame: u64,
}

impl FrameLoop {
    fn frame(&mut self, timestamp: FrameTime) -> Result<(), CoordinatorError> {
        self.frame += 1;
        let shared = self.shared.clone();

        shared.set_state(LoopState::Draining);
        let mut requests = shared.queue.swap_active(std::mem::take(&mut self.scratch));
        let result = self.drain(&mut requests, timestamp);
        requests.clear();
        self.scratch = requests;
        result?;

        if shared.cancel.is_cancelled() {
            self.touched.clear();
            return Ok(());
        }

        shared.set_state(LoopState::Dispatching);
        let result = self.dispatch(timestamp);
        self.touched.clear();
        result
    }

    fn drain(&mut self, requests: &mut Vec<RenderRequest>, timestamp: FrameTime) -> Result<(), CoordinatorError> {
        self.touched.reserve_for(requests.len())?;

        for request in requests.drain(..) {
            if self.shared.cancel.is_cancelled() {
                log::debug!("Shutdown requested, skipping remaining render callbacks");
                break;
            }
            let id = request.surface_id();
            if catch_panic(|| request.run(timestamp)).is_none() {
                log::warn!("Render callback for surface {id} panicked");
            }
            self.touched.record(id)?;
        }

        Ok(())
    }

    fn dispatch(&mut self, timestamp: FrameTime) -> Result<(), CoordinatorError> {
        let shared = &self.shared;
        {
            let registry = lock(&shared.registry);
            self.touched.retain(|id| registry.is_renderable(id));
        }

        if self.touched.is_empty() && !shared.config.dispatch_empty_frames {
            return Ok(());
        }

        // Surfaces released after the registry check are filtered out by the context itself.
        let Some(surfaces) = shared.context.render_batch(self.touched.as_slice())? else {
            return Ok(());
        };

        shared.emit(CoordinatorEvent::FrameDispatched {
            frame: self.frame,
            timestamp,
            surfaces,
        });
        Ok(())
    }
}

impl Shared {
    pub(crate) fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, state: LoopState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stops the loop, retires every live surface and destroys the renderer context.
    ///
    /// Returns `false` if the coordinator was already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        log::info!("Shutting down coordinator on context {}", self.context.id());

        self.cancel.cancel();

        let retired = {
            let mut registry = lock(&self.registry);
            let ids = registry.live_ids();
            for id in &ids {
                if let Err(e) = registry.retire(*id) {
                    log::warn!("Retiring surface {id} during shutdown failed: {e}");
                }
            }
            // Controllers go with the registry lock held, in lock order.
            lock(&self.controllers).clear();
            ids
        };
        for surface in retired {
            self.emit(CoordinatorEvent::SurfaceRetired { surface });
        }

        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!("Dropped {dropped} pending render request(s)");
        }

        if self.context.destroy() {
            self.emit(CoordinatorEvent::ContextDestroyed { context: self.context.id() });
        }
        true
    }
}
