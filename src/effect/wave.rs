use std::f32::consts::TAU;

use super::{Effect, Intent};
use crate::color::{Rgb, unit_to_level};
use crate::device::DeviceState;

const PULSE_STEP: f32 = 0.1;
const BREATHE_STEP: f32 = 0.05;
/// Lowest multiplier of the swing, so the fixture never goes fully dark.
const FLOOR: f32 = 0.1;

/// Sinusoidal brightness over a fixed base color. Pulse and Breathe differ only
/// in step size and tick period.
#[derive(Debug, Clone)]
pub struct Wave {
    phase: f32,
    step: f32,
    base: Rgb,
}

impl Wave {
    pub fn new(step: f32, base: Rgb) -> Self {
        Self {
            phase: 0.0,
            step,
            base,
        }
    }

    pub fn pulse(base: Rgb) -> Self {
        Self::new(PULSE_STEP, base)
    }

    pub fn breathe(base: Rgb) -> Self {
        Self::new(BREATHE_STEP, base)
    }

    pub fn base(&self) -> Rgb {
        self.base
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn level_at(phase: f32) -> u8 {
        let unit = (phase.sin() + 1.0) / 2.0;
        unit_to_level(unit * (1.0 - FLOOR) + FLOOR)
    }
}

impl Effect for Wave {
    fn tick(&mut self, _device: &mut DeviceState) -> Intent {
        self.phase += self.step;
        if self.phase > TAU {
            self.phase -= TAU;
        }
        Intent::level_and_color(Self::level_at(self.phase), self.base)
    }
}
