use super::Intent;
use crate::color::{MAX_DEVICE_LEVEL, Rgb};
use crate::device::DeviceState;

const MIN_PERCENT: f32 = 10.0;
const MIN_LEVEL: f32 = 25.0;
/// Hue at silence; louder moves toward red (0.0).
const QUIET_HUE: f32 = 0.7;

/// Maps the smoothed audio level onto brightness and hue.
#[derive(Debug, Clone, Default)]
pub struct MusicVisualizer {
    last_level: f32,
}

impl MusicVisualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_level(&self) -> f32 {
        self.last_level
    }

    pub fn on_level(&mut self, level: f32, device: &mut DeviceState) -> Intent {
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.last_level = level;

        let device_level = (level * f32::from(MAX_DEVICE_LEVEL)).max(MIN_LEVEL) as u8;
        let percent = (level * 100.0).max(MIN_PERCENT) as u8;
        let color = Rgb::from_hsv(QUIET_HUE - QUIET_HUE * level, 1.0, 1.0);

        device.set_brightness(percent);
        device.color = color;
        Intent::level_and_color(device_level, color)
    }
}
