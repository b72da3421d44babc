//! Time-driven tweens used by the wheel spin.

use serde::{Deserialize, Serialize};

/// Easing type for tweens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EasingType {
    Linear,
    EaseIn,
    /// Decelerating curve; the default for spins.
    #[default]
    EaseOut,
    EaseInOut,
}

impl EasingType {
    /// Applies the easing function to a normalized time value (0.0 to 1.0).
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

/// An active scalar interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tween {
    start: f32,
    end: f32,
    duration: f32,
    elapsed: f32,
    easing: EasingType,
}

impl Tween {
    pub fn new(start: f32, end: f32, duration: f32, easing: EasingType) -> Self {
        Self {
            start,
            end,
            duration: duration.max(0.0),
            elapsed: 0.0,
            easing,
        }
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn end(&self) -> f32 {
        self.end
    }

    /// Normalized progress in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration > 0.0 {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Current interpolated value.
    pub fn value(&self) -> f32 {
        if self.is_finished() {
            return self.end;
        }
        let eased_t = self.easing.apply(self.progress());
        self.start + (self.end - self.start) * eased_t
    }

    /// Advances by `dt` seconds and returns the new value.
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
        self.value()
    }

    /// Returns true if the tween has completed.
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easing_functions() {
        assert!((EasingType::Linear.apply(0.5) - 0.5).abs() < 0.001);
        assert!((EasingType::EaseIn.apply(0.5) - 0.25).abs() < 0.001);
        assert!((EasingType::EaseOut.apply(0.5) - 0.75).abs() < 0.001);

        // EaseInOut at 0.5 should be 0.5
        assert!((EasingType::EaseInOut.apply(0.5) - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_ease_out_decelerates() {
        let steps: Vec<f32> = (0..=10)
            .map(|i| EasingType::EaseOut.apply(i as f32 / 10.0))
            .collect();
        let deltas: Vec<f32> = steps.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(deltas.iter().all(|d| *d > 0.0));
        assert!(deltas.windows(2).all(|w| w[1] < w[0]));
        assert!((steps[10] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_tween_reaches_end() {
        let mut tween = Tween::new(10.0, 370.0, 1.0, EasingType::EaseOut);
        let mut last = tween.value();
        for _ in 0..9 {
            let v = tween.advance(0.1);
            assert!(v >= last);
            last = v;
        }
        assert!(!tween.is_finished());
        assert!((tween.advance(0.5) - 370.0).abs() < f32::EPSILON);
        assert!(tween.is_finished());
    }

    #[test]
    fn test_zero_duration_finishes_immediately() {
        let tween = Tween::new(0.0, 90.0, 0.0, EasingType::Linear);
        assert!(tween.is_finished());
        assert!((tween.value() - 90.0).abs() < f32::EPSILON);
    }
}
