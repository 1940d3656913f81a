use std::time::Duration;
use std::time::Instant;

/// Converts wheel deltas into accelerated slice steps.
///
/// Consecutive events arriving faster than `streak_threshold` grow a streak
/// counter (capped at `streak_max`) that multiplies the base step, so rapid
/// scrubbing covers more slices per notch while slow scrolling stays precise.
pub struct ScrollAccelerator {
    base_step: i32,
    streak_threshold: Duration,
    streak_mult: f32,
    streak_max: u32,
    last_event: Option<Instant>,
    streak: u32,
}

impl Default for ScrollAccelerator {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(2), 0.01, 4)
    }
}

impl ScrollAccelerator {
    pub fn new(base_step: i32, streak_threshold: Duration, streak_mult: f32, streak_max: u32) -> Self {
        Self {
            base_step: base_step.max(1),
            streak_threshold,
            streak_mult,
            streak_max,
            last_event: None,
            streak: 0,
        }
    }

    /// Step count for a wheel event with the given angle delta
    /// (one standard notch is ±120; high-resolution wheels report fractions).
    pub fn step(&mut self, delta_y: i32, now: Instant) -> i32 {
        if delta_y == 0 {
            return 0;
        }

        let fast = self
            .last_event
            .is_some_and(|t| now.duration_since(t) < self.streak_threshold);
        self.last_event = Some(now);
        self.streak = if fast {
            (self.streak + 1).min(self.streak_max)
        } else {
            0
        };

        let ticks = delta_y.abs() as f32 / 120.0;
        let mult = 1.0 + self.streak as f32 * self.streak_mult;
        let magnitude = ((self.base_step as f32 * ticks * mult).round() as i32).max(1);
        if delta_y > 0 { magnitude } else { -magnitude }
    }
}
