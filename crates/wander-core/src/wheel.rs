//! Selection wheel: labeled segments, spin targeting and the spin driver.
//!
//! Angles follow screen drawing conventions: 0 degrees points right and
//! angles grow clockwise, so the pointer at the top of the widget sits at
//! 270 degrees. Segment `i` spans `[i * seg, (i + 1) * seg)` before the
//! wheel rotation is applied.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::animation::{EasingType, Tween};
use crate::color::{Color, Palette};

/// Full turns added to every spin.
pub const DEFAULT_EXTRA_TURNS: u32 = 5;

/// Spin duration in seconds.
pub const DEFAULT_SPIN_DURATION: f32 = 4.0;

/// Jitter bound as a fraction of one segment's width.
pub const DEFAULT_JITTER_FRACTION: f32 = 0.4;

/// Largest accepted jitter fraction; anything at or above half a segment
/// could land on a neighbor.
const MAX_JITTER_FRACTION: f32 = 0.49;

/// Most full turns a spin may add. Larger absolute rotations lose enough
/// `f32` precision to stop outside the target segment.
pub const MAX_EXTRA_TURNS: u32 = 100;

/// Pointer angle (top of the widget).
pub const DEFAULT_POINTER_DEGREES: f32 = 270.0;

/// Tunables for spin targeting and the palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub extra_turns: u32,
    /// Spin duration in seconds.
    pub spin_duration: f32,
    pub jitter_fraction: f32,
    pub pointer_degrees: f32,
    pub easing: EasingType,
    pub palette: Palette,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            extra_turns: DEFAULT_EXTRA_TURNS,
            spin_duration: DEFAULT_SPIN_DURATION,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            pointer_degrees: DEFAULT_POINTER_DEGREES,
            easing: EasingType::EaseOut,
            palette: Palette::default(),
        }
    }
}

impl WheelConfig {
    fn jitter_fraction(&self) -> f32 {
        self.jitter_fraction.clamp(0.0, MAX_JITTER_FRACTION)
    }

    /// Extra turns actually used, capped at [`MAX_EXTRA_TURNS`].
    pub fn effective_extra_turns(&self) -> u32 {
        self.extra_turns.min(MAX_EXTRA_TURNS)
    }
}

/// Callback fired once when a spin settles (or is skipped).
pub type SpinCallback = Box<dyn FnOnce() + Send + 'static>;

/// Result of a `spin_to` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinOutcome {
    /// Animation started; the callback fires from a later `tick`.
    Started,
    /// Empty wheel or index out of range; the callback already fired.
    Skipped,
    /// A spin is already in flight; the callback already fired and the
    /// running spin is untouched.
    Busy,
}

/// Result of advancing the spin driver by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Idle,
    Spinning { rotation: f32 },
    Finished { index: usize, rotation: f32 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpinError {
    #[error("Spin was cancelled before it settled")]
    Cancelled,
}

/// What a settled spin landed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinResult {
    /// `None` when the request was skipped.
    pub index: Option<usize>,
    pub label: Option<String>,
}

impl SpinResult {
    pub fn skipped() -> Self {
        Self {
            index: None,
            label: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.index.is_none()
    }
}

/// Single-shot completion of a spin started with [`SelectionWheel::spin`].
#[derive(Debug)]
pub struct SpinCompletion {
    rx: oneshot::Receiver<SpinResult>,
}

impl Future for SpinCompletion {
    type Output = Result<SpinResult, SpinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| SpinError::Cancelled))
    }
}

struct ActiveSpin {
    tween: Tween,
    target: usize,
    on_complete: Option<SpinCallback>,
}

impl fmt::Debug for ActiveSpin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSpin")
            .field("tween", &self.tween)
            .field("target", &self.target)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// A wheel of labeled, colored segments that spins onto a chosen target.
#[derive(Debug)]
pub struct SelectionWheel {
    config: WheelConfig,
    segments: Vec<String>,
    colors: Vec<Color>,
    rotation: f32,
    winning_index: Option<usize>,
    active: Option<ActiveSpin>,
    rng: ChaCha8Rng,
    needs_redraw: bool,
}

impl Default for SelectionWheel {
    fn default() -> Self {
        Self::new(WheelConfig::default())
    }
}

impl SelectionWheel {
    /// Creates an empty wheel with an OS-seeded jitter source.
    pub fn new(config: WheelConfig) -> Self {
        Self::with_rng(config, ChaCha8Rng::from_os_rng())
    }

    /// Creates an empty wheel with a caller-supplied jitter source.
    pub fn with_rng(config: WheelConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            segments: Vec::new(),
            colors: Vec::new(),
            rotation: 0.0,
            winning_index: None,
            active: None,
            rng,
            needs_redraw: false,
        }
    }

    /// Creates an empty wheel whose jitter is reproducible from `seed`.
    pub fn with_seed(config: WheelConfig, seed: u64) -> Self {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    /// Replaces all segments and recomputes their colors.
    pub fn set_segments<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments = labels.into_iter().map(Into::into).collect();
        self.colors = self.config.palette.assign(self.segments.len());
        self.winning_index = None;
        self.needs_redraw = true;

        tracing::debug!(
            "[wheel] Received {} segments ({} colors)",
            self.segments.len(),
            self.colors.len()
        );
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_colors(&self) -> &[Color] {
        &self.colors
    }

    /// Current rotation in degrees. Lies in `[0, 360)` whenever no spin is
    /// in flight.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn winning_index(&self) -> Option<usize> {
        self.winning_index
    }

    pub fn winning_label(&self) -> Option<&str> {
        self.winning_index
            .and_then(|i| self.segments.get(i))
            .map(String::as_str)
    }

    pub fn is_spinning(&self) -> bool {
        self.active.is_some()
    }

    /// Angular width of one segment, or `None` for an empty wheel.
    #[allow(clippy::cast_precision_loss)]
    pub fn segment_angle(&self) -> Option<f32> {
        if self.segments.is_empty() {
            None
        } else {
            Some(360.0 / self.segments.len() as f32)
        }
    }

    /// Unrotated `(start, sweep)` of segment `index` in degrees.
    #[allow(clippy::cast_precision_loss)]
    pub fn segment_span(&self, index: usize) -> Option<(f32, f32)> {
        let angle = self.segment_angle()?;
        (index < self.segments.len()).then(|| (index as f32 * angle, angle))
    }

    /// Index of the segment currently under the pointer.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn segment_under_pointer(&self) -> Option<usize> {
        let angle = self.segment_angle()?;
        let local = (self.config.pointer_degrees - self.rotation).rem_euclid(360.0);
        let index = (local / angle).floor() as usize;
        Some(index.min(self.segments.len() - 1))
    }

    /// Consumes the pending redraw request.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    /// Absolute rotation that parks the center of `target` under the pointer
    /// after the configured extra turns, shifted by `jitter` degrees.
    #[allow(clippy::cast_precision_loss)]
    pub fn target_rotation(&self, target: usize, jitter: f32) -> Option<f32> {
        let (start, angle) = self.segment_span(target)?;
        let extra = 360.0 * self.config.effective_extra_turns() as f32;
        let center_offset = self.config.pointer_degrees - start - angle / 2.0;
        Some(extra + center_offset + jitter)
    }

    /// Starts a spin onto `target`. `on_complete` runs exactly once: right
    /// away when the request is skipped, otherwise from the `tick` that
    /// settles the wheel.
    pub fn spin_to<F>(&mut self, target: usize, on_complete: F) -> SpinOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        if self.active.is_some() {
            tracing::warn!("[wheel] Spin requested while another spin is in flight");
            on_complete();
            return SpinOutcome::Busy;
        }

        let Some(angle) = self.segment_angle() else {
            on_complete();
            return SpinOutcome::Skipped;
        };
        if target >= self.segments.len() {
            tracing::debug!(
                "[wheel] Target {} out of range for {} segments",
                target,
                self.segments.len()
            );
            on_complete();
            return SpinOutcome::Skipped;
        }

        let bound = angle * self.config.jitter_fraction();
        let jitter = if bound > 0.0 {
            self.rng.random_range(-bound..=bound)
        } else {
            0.0
        };
        let Some(end) = self.target_rotation(target, jitter) else {
            on_complete();
            return SpinOutcome::Skipped;
        };

        tracing::debug!(
            "[wheel] Spinning to {} ({:?}) from {:.1} to {:.1}",
            target,
            self.segments[target],
            self.rotation,
            end
        );

        self.winning_index = None;
        self.needs_redraw = true;
        self.active = Some(ActiveSpin {
            tween: Tween::new(
                self.rotation,
                end,
                self.config.spin_duration,
                self.config.easing,
            ),
            target,
            on_complete: Some(Box::new(on_complete)),
        });
        SpinOutcome::Started
    }

    /// Starts a spin and returns a completion resolved by the spin driver.
    pub fn spin(&mut self, target: usize) -> SpinCompletion {
        let (tx, rx) = oneshot::channel();
        let label = self.segments.get(target).cloned();

        if self.active.is_some() || label.is_none() {
            let _ = tx.send(SpinResult::skipped());
            self.spin_to(target, || {});
        } else {
            self.spin_to(target, move || {
                let _ = tx.send(SpinResult {
                    index: Some(target),
                    label,
                });
            });
        }
        SpinCompletion { rx }
    }

    /// Advances the in-flight spin by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickOutcome {
        let Some(active) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };

        self.rotation = active.tween.advance(dt);
        self.needs_redraw = true;
        if !active.tween.is_finished() {
            return TickOutcome::Spinning {
                rotation: self.rotation,
            };
        }

        let Some(mut finished) = self.active.take() else {
            return TickOutcome::Idle;
        };
        self.rotation = normalize_degrees(self.rotation);
        self.winning_index = Some(finished.target);

        tracing::debug!(
            "[wheel] Settled on {} at {:.1} degrees",
            finished.target,
            self.rotation
        );

        if let Some(on_complete) = finished.on_complete.take() {
            on_complete();
        }
        TickOutcome::Finished {
            index: finished.target,
            rotation: self.rotation,
        }
    }

    /// Drops the in-flight spin without running its callback.
    pub fn cancel_spin(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        tracing::debug!("[wheel] Cancelled spin to {}", active.target);
        self.rotation = normalize_degrees(self.rotation);
        self.needs_redraw = true;
        true
    }
}

/// Wraps an angle into `[0, 360)`.
pub fn normalize_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const FRAME: f32 = 1.0 / 60.0;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn run_to_end(wheel: &mut SelectionWheel) -> TickOutcome {
        for _ in 0..10_000 {
            match wheel.tick(FRAME) {
                TickOutcome::Spinning { .. } => {}
                other => return other,
            }
        }
        panic!("spin never settled");
    }

    fn wheel(labels: &[&str], seed: u64) -> SelectionWheel {
        let mut wheel = SelectionWheel::with_seed(WheelConfig::default(), seed);
        wheel.set_segments(labels.iter().copied());
        wheel
    }

    #[test]
    fn test_segments_partition_circle() {
        for n in 1..=24 {
            let labels: Vec<String> = (0..n).map(|i| format!("seg{i}")).collect();
            let mut wheel = SelectionWheel::with_seed(WheelConfig::default(), 1);
            wheel.set_segments(labels);

            let mut expected_start = 0.0;
            for i in 0..n {
                let (start, sweep) = wheel.segment_span(i).unwrap();
                assert!((start - expected_start).abs() < 1e-3);
                assert!((sweep - 360.0 / n as f32).abs() < 1e-4);
                expected_start = start + sweep;
            }
            assert!((expected_start - 360.0).abs() < 1e-3);
            assert!(wheel.segment_span(n).is_none());
        }
    }

    #[test]
    fn test_set_segments_assigns_cycling_colors_and_clears_winner() {
        let mut wheel = wheel(&["Food", "Hiking", "Art"], 7);
        wheel.spin_to(2, || {});
        run_to_end(&mut wheel);
        assert_eq!(wheel.winning_index(), Some(2));

        let labels: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        wheel.set_segments(labels);
        assert_eq!(wheel.winning_index(), None);
        assert!(wheel.take_redraw());
        assert!(!wheel.take_redraw());

        let palette = Palette::default();
        let colors = wheel.segment_colors();
        assert_eq!(colors.len(), 20);
        for (i, color) in colors.iter().enumerate() {
            assert_eq!(*color, palette.color_for(i));
            if i + palette.len() < colors.len() {
                assert_eq!(*color, colors[i + palette.len()]);
            }
        }
    }

    #[test]
    fn test_three_segment_scenario() {
        let mut wheel = wheel(&["Food", "Hiking", "Art"], 42);
        assert_eq!(wheel.segment_angle(), Some(120.0));

        let (calls, cb) = counter();
        assert_eq!(wheel.spin_to(1, cb), SpinOutcome::Started);
        assert_eq!(wheel.winning_index(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let outcome = run_to_end(&mut wheel);
        assert!(matches!(outcome, TickOutcome::Finished { index: 1, .. }));
        assert_eq!(wheel.winning_index(), Some(1));
        assert_eq!(wheel.winning_label(), Some("Hiking"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Further ticks never re-fire the callback.
        assert_eq!(wheel.tick(FRAME), TickOutcome::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rotation = wheel.rotation();
        let (calls, cb) = counter();
        assert_eq!(wheel.spin_to(5, cb), SpinOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.winning_index(), Some(1));
        assert!((wheel.rotation() - rotation).abs() < f32::EPSILON);
        assert!(!wheel.is_spinning());
    }

    #[test]
    fn test_empty_wheel_completes_immediately() {
        let mut wheel = SelectionWheel::with_seed(WheelConfig::default(), 3);
        wheel.set_segments(Vec::<String>::new());

        let (calls, cb) = counter();
        assert_eq!(wheel.spin_to(0, cb), SpinOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.rotation(), 0.0);
        assert_eq!(wheel.winning_index(), None);
        assert_eq!(wheel.tick(FRAME), TickOutcome::Idle);
    }

    #[test]
    fn test_rotation_stays_bounded_and_lands_inside_target() {
        let labels: Vec<String> = (0..7).map(|i| format!("c{i}")).collect();
        let mut wheel = SelectionWheel::with_seed(WheelConfig::default(), 99);
        wheel.set_segments(labels);

        for round in 0..50 {
            let target = round % 7;
            let (calls, cb) = counter();
            wheel.spin_to(target, cb);
            run_to_end(&mut wheel);

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!((0.0..360.0).contains(&wheel.rotation()));
            assert_eq!(wheel.winning_index(), Some(target));
            assert_eq!(wheel.segment_under_pointer(), Some(target));
        }
    }

    #[test]
    fn test_jitter_varies_but_stays_within_segment() {
        let mut wheel = wheel(&["a", "b", "c", "d"], 5);
        let mut stops = Vec::new();
        for _ in 0..20 {
            wheel.spin_to(3, || {});
            run_to_end(&mut wheel);
            stops.push(wheel.rotation());
            assert_eq!(wheel.segment_under_pointer(), Some(3));
        }
        stops.dedup_by(|a, b| (*a - *b).abs() < 1e-3);
        assert!(stops.len() > 1, "jitter should vary the stopping angle");
    }

    #[test]
    fn test_rotation_monotonic_during_spin() {
        let mut wheel = wheel(&["a", "b", "c"], 11);
        wheel.spin_to(0, || {});
        let mut last = wheel.rotation();
        loop {
            match wheel.tick(FRAME) {
                TickOutcome::Spinning { rotation } => {
                    assert!(rotation >= last);
                    last = rotation;
                }
                TickOutcome::Finished { .. } => break,
                TickOutcome::Idle => panic!("spin ended without finishing"),
            }
        }
        assert!(last > 360.0 * DEFAULT_EXTRA_TURNS as f32 - 120.0);
    }

    #[test]
    fn test_target_rotation_without_jitter() {
        let wheel = wheel(&["Food", "Hiking", "Art"], 0);
        // 1800 + 270 - 120 - 60
        assert_eq!(wheel.target_rotation(1, 0.0), Some(1890.0));
        assert_eq!(wheel.target_rotation(3, 0.0), None);
    }

    #[test]
    fn test_busy_spin_fires_callback_and_keeps_running_spin() {
        let mut wheel = wheel(&["a", "b"], 8);
        let (first, cb) = counter();
        wheel.spin_to(0, cb);
        wheel.tick(FRAME);

        let (second, cb) = counter();
        assert_eq!(wheel.spin_to(1, cb), SpinOutcome::Busy);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        run_to_end(&mut wheel);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(wheel.winning_index(), Some(0));
    }

    #[test]
    fn test_cancel_drops_callback() {
        let mut wheel = wheel(&["a", "b", "c"], 2);
        let (calls, cb) = counter();
        wheel.spin_to(2, cb);
        for _ in 0..30 {
            wheel.tick(FRAME);
        }
        assert!(wheel.cancel_spin());
        assert!(!wheel.is_spinning());
        assert!((0.0..360.0).contains(&wheel.rotation()));
        assert_eq!(wheel.winning_index(), None);
        assert_eq!(wheel.tick(FRAME), TickOutcome::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!wheel.cancel_spin());
    }

    #[tokio::test]
    async fn test_spin_completion_resolves() {
        let mut wheel = wheel(&["Food", "Hiking", "Art"], 21);
        let completion = wheel.spin(2);
        run_to_end(&mut wheel);
        let result = completion.await.unwrap();
        assert_eq!(result.index, Some(2));
        assert_eq!(result.label.as_deref(), Some("Art"));
    }

    #[tokio::test]
    async fn test_spin_completion_skipped_and_cancelled() {
        let mut wheel = wheel(&["Food"], 4);
        let skipped = wheel.spin(9).await.unwrap();
        assert!(skipped.is_skipped());

        let completion = wheel.spin(0);
        wheel.tick(FRAME);
        wheel.cancel_spin();
        assert_eq!(completion.await, Err(SpinError::Cancelled));
    }

    #[test]
    fn test_huge_extra_turns_still_land_inside_target() {
        let config = WheelConfig {
            extra_turns: 4_000_000,
            ..WheelConfig::default()
        };
        assert_eq!(config.effective_extra_turns(), MAX_EXTRA_TURNS);

        let mut wheel = SelectionWheel::with_seed(config, 21);
        wheel.set_segments(["a", "b", "c", "d", "e", "f", "g", "h"]);
        for target in 0..8 {
            wheel.spin_to(target, || {});
            run_to_end(&mut wheel);
            assert_eq!(wheel.winning_index(), Some(target));
            assert_eq!(wheel.segment_under_pointer(), Some(target));
        }
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert!((normalize_degrees(725.0) - 5.0).abs() < 1e-4);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-4);
        assert!(normalize_degrees(-1e-9) < 360.0);
    }
}
