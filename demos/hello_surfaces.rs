use render_coordinator::engine::frame::IntervalFrameClock;
use render_coordinator::render::backend::{RawNativeSurface, Rgba};
use render_coordinator::render::backends::null::NullBackend;
use render_coordinator::{AttributeValue, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorEvent, SurfaceEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), CoordinatorError> {
    render_coordinator::init_logging();

    // Configure the coordinator through the config builder. A 60Hz frame clock, and some
    // defaults for surfaces that get their attributes through `set_attribute`.
    let cfg = CoordinatorConfig::builder()
        .frame_interval_ms(16)
        .default_text("--:--")
        .default_font_size(48.0)
        .build()
        .expect("Configuration is not valid");

    // The NullBackend does not render anything, it only counts frames.
    let backend = NullBackend::new().expect("null backend");
    let clock = IntervalFrameClock::from_config(&cfg);

    let coordinator = Coordinator::new(Some(cfg), Box::new(backend), clock)?;
    let (handle, join_handle) = coordinator.start();

    // Only events sent from this point on are received.
    let mut event_rx = handle.subscribe_events();

    // The window system tells us about a surface, we register it.
    let clock_face = handle
        .handle_surface_event(SurfaceEvent::Created {
            surface: None,
            native: Arc::new(RawNativeSurface::new(0x1000)),
            width: 400,
            height: 120,
        })?
        .expect("surface created");
    handle.make_variable_font_surface(clock_face, "00:00", 64.0, 400.0)?;

    // A second, plain surface that we redraw ourselves.
    let canvas = handle.create_surface(Arc::new(RawNativeSurface::new(0x2000)), 200, 200)?;
    handle.set_resize_listener(canvas, Some(|id, size| log::info!("Surface {id} is now {size}")))?;
    handle.set_base_color(Rgba::from_argb(0xff20_2020))?;

    let events = tokio::spawn(async move {
        let mut frames = 0;
        while let Ok(event) = event_rx.recv().await {
            match event {
                CoordinatorEvent::FrameDispatched { surfaces, .. } => {
                    frames += 1;
                    log::debug!("Frame with {} surface(s)", surfaces.len());
                }
                CoordinatorEvent::LoopStopped => break,
                other => log::info!("Event: {other:?}"),
            }
        }
        frames
    });

    // Hammer the attributes far more often than once per frame; only the latest values make it
    // to the renderer.
    for second in 0..3u32 {
        for tick in 0..100u32 {
            handle.set_attribute(clock_face, AttributeValue::Text(format!("00:{second:02}")))?;
            handle.set_attribute(clock_face, AttributeValue::Weight(100.0 + (tick * 8) as f32))?;
            handle.on_render(canvas, |frame| log::trace!("Drawing canvas at {frame:?}"))?;
            sleep(Duration::from_millis(10)).await;
        }
        handle.on_resize(canvas, 200 + second * 10, 200)?;
    }

    handle.retire_surface(canvas)?;
    handle.shutdown();
    join_handle.await.expect("coordinator loop panicked");

    let frames = events.await.unwrap_or(0);
    log::info!("Dispatched {frames} frame(s)");

    Ok(())
}
