//! Frame loop that animates the wheel and paints each frame.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use wander_core::color::Color;
use wander_core::render::Bounds;
use wander_core::{SelectionWheel, SpinError, SpinResult, TickOutcome, WheelCanvas, WheelLayout};

/// Canvas that traces draw calls instead of rasterizing them.
#[derive(Debug, Default)]
pub struct TraceCanvas {
    pub frames: usize,
    pub wedges: usize,
    pub labels: usize,
    pub glows: usize,
    depth: usize,
}

impl WheelCanvas for TraceCanvas {
    fn push_rotation(&mut self, center: [f32; 2], degrees: f32) {
        self.depth += 1;
        self.frames += 1;
        tracing::trace!("[canvas] rotate {:.1} around ({:.0}, {:.0})", degrees, center[0], center[1]);
    }

    fn pop_rotation(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn fill_wedge(&mut self, _bounds: Bounds, start_degrees: f32, sweep_degrees: f32, color: Color) {
        self.wedges += 1;
        tracing::trace!("[canvas] wedge {:.1}+{:.1} {}", start_degrees, sweep_degrees, color.to_hex());
    }

    fn draw_text_on_arc(
        &mut self,
        text: &str,
        _bounds: Bounds,
        start_degrees: f32,
        _sweep_degrees: f32,
        _offset: f32,
        _color: Color,
    ) {
        self.labels += 1;
        tracing::trace!("[canvas] label {:?} at {:.1}", text, start_degrees);
    }

    fn stroke_glow(
        &mut self,
        _bounds: Bounds,
        start_degrees: f32,
        sweep_degrees: f32,
        width: f32,
        _color: Color,
    ) {
        self.glows += 1;
        tracing::trace!("[canvas] glow {:.1}+{:.1} width {}", start_degrees, sweep_degrees, width);
    }
}

/// Spins toward `target` and drives frames until the wheel settles or
/// `shutdown` flips to true. A shutdown mid-spin cancels the spin.
pub async fn drive_spin<C: WheelCanvas>(
    wheel: &mut SelectionWheel,
    target: usize,
    layout: &WheelLayout,
    canvas: &mut C,
    frame: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<SpinResult, SpinError> {
    let completion = wheel.spin(target);

    let mut interval = tokio::time::interval(frame);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    while wheel.is_spinning() {
        tokio::select! {
            now = interval.tick() => {
                let dt = now.saturating_duration_since(last).as_secs_f32();
                last = now;
                let outcome = wheel.tick(dt);
                if wheel.take_redraw() {
                    wheel.render(layout).paint(canvas);
                }
                if let TickOutcome::Finished { index, rotation } = outcome {
                    tracing::info!("[home] Wheel stopped on {} at {:.1} degrees", index, rotation);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    wheel.cancel_spin();
                    tracing::info!("[home] Spin cancelled by shutdown");
                }
            }
        }
    }

    completion.await
}
