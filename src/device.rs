use crate::color::Rgb;

pub const DEFAULT_BRIGHTNESS: u8 = 100;

/// What the engine believes the fixture is showing. The link has no read-back,
/// so this is the intended state, not a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub power: bool,
    /// 0..=100
    pub brightness: u8,
    pub color: Rgb,
}

impl DeviceState {
    pub fn set_brightness(&mut self, percent: u8) {
        self.brightness = percent.min(100);
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: false,
            brightness: DEFAULT_BRIGHTNESS,
            color: Rgb::WHITE,
        }
    }
}
