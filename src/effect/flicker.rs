use super::{Effect, Intent};
use crate::color::{MAX_DEVICE_LEVEL, Rgb, percent_to_level};
use crate::device::DeviceState;

const CANDLE_PERCENT: std::ops::RangeInclusive<u8> = 30..=80;
const CANDLE_RED: std::ops::RangeInclusive<u8> = 230..=255;
const CANDLE_GREEN: std::ops::RangeInclusive<u8> = 100..=160;
const CANDLE_BLUE: u8 = 10;

const STORM_BASE: Rgb = Rgb::new(50, 50, 180);
const STORM_BASE_LEVEL: u8 = 40;
const FLASH_CHANCE_PERCENT: u32 = 5;

/// Toggles power every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strobe;

impl Effect for Strobe {
    fn tick(&mut self, device: &mut DeviceState) -> Intent {
        device.power = !device.power;
        Intent::power(device.power)
    }
}

#[derive(Debug, Clone)]
pub struct Candlelight {
    rng: fastrand::Rng,
}

impl Candlelight {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for Candlelight {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Candlelight {
    fn tick(&mut self, _device: &mut DeviceState) -> Intent {
        let level = percent_to_level(self.rng.u8(CANDLE_PERCENT));
        let color = Rgb::new(
            self.rng.u8(CANDLE_RED),
            self.rng.u8(CANDLE_GREEN),
            CANDLE_BLUE,
        );
        Intent::level_and_color(level, color)
    }
}

/// Dim blue baseline with an occasional single-tick white flash.
#[derive(Debug, Clone)]
pub struct Thunderstorm {
    rng: fastrand::Rng,
}

impl Thunderstorm {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Default for Thunderstorm {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Thunderstorm {
    fn tick(&mut self, _device: &mut DeviceState) -> Intent {
        if self.rng.u32(0..100) < FLASH_CHANCE_PERCENT {
            Intent::level_and_color(MAX_DEVICE_LEVEL, Rgb::WHITE)
        } else {
            Intent::level_and_color(STORM_BASE_LEVEL, STORM_BASE)
        }
    }
}
