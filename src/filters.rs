use std::time::{Duration, Instant};

use crate::color::Rgb;

pub const BRIGHTNESS_THROTTLE: Duration = Duration::from_millis(100);
pub const DEFAULT_COLOR_THRESHOLD: u16 = 15;

/// Minimum-interval gate for brightness writes coming from a live control.
#[derive(Debug, Clone)]
pub struct BrightnessThrottle {
    interval: Duration,
    last_forward: Option<Instant>,
}

impl BrightnessThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_forward: None,
        }
    }

    pub fn permits(&self, now: Instant) -> bool {
        self.last_forward
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Records a forwarded write and reports whether the live value may go out.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        if !self.permits(now) {
            return false;
        }
        self.last_forward = Some(now);
        true
    }

    /// Final writes bypass the gate but still restart the interval.
    pub fn record(&mut self, now: Instant) {
        self.last_forward = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_forward = None;
    }
}

impl Default for BrightnessThrottle {
    fn default() -> Self {
        Self::new(BRIGHTNESS_THROTTLE)
    }
}

/// Forwards a color only when it moved more than `threshold` (Manhattan distance)
/// away from the last forwarded color.
#[derive(Debug, Clone)]
pub struct ColorChangeFilter {
    threshold: u16,
    last_forwarded: Option<Rgb>,
}

impl ColorChangeFilter {
    pub fn new(threshold: u16) -> Self {
        Self {
            threshold,
            last_forwarded: None,
        }
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn last_forwarded(&self) -> Option<Rgb> {
        self.last_forwarded
    }

    pub fn accept(&mut self, color: Rgb) -> bool {
        let significant = self
            .last_forwarded
            .is_none_or(|last| last.manhattan_distance(color) > self.threshold);
        if significant {
            self.last_forwarded = Some(color);
        }
        significant
    }

    /// Sets the baseline without forwarding anything.
    pub fn mark(&mut self, color: Rgb) {
        self.last_forwarded = Some(color);
    }

    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }
}

impl Default for ColorChangeFilter {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR_THRESHOLD)
    }
}
