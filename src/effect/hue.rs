use std::f32::consts::TAU;

use super::{Effect, Intent};
use crate::color::Rgb;
use crate::device::DeviceState;

const RAINBOW_STEP: f32 = 0.01;
const AURORA_STEP: f32 = 0.005;
const AURORA_CENTER: f32 = 0.5;
const AURORA_SWING: f32 = 0.2;

/// Full-saturation hue sweep; brightness is left alone.
#[derive(Debug, Clone, Default)]
pub struct Rainbow {
    hue: f32,
}

impl Rainbow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hue(hue: f32) -> Self {
        Self {
            hue: hue.rem_euclid(1.0),
        }
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }
}

impl Effect for Rainbow {
    fn tick(&mut self, _device: &mut DeviceState) -> Intent {
        self.hue += RAINBOW_STEP;
        if self.hue >= 1.0 {
            self.hue -= 1.0;
        }
        Intent::color(Rgb::from_hsv(self.hue, 1.0, 1.0))
    }
}

/// Slow swing around cyan between green-teal and blue-violet.
#[derive(Debug, Clone, Default)]
pub struct Aurora {
    phase: f32,
}

impl Aurora {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn hue(&self) -> f32 {
        AURORA_CENTER + AURORA_SWING * (TAU * self.phase).sin()
    }
}

impl Effect for Aurora {
    fn tick(&mut self, _device: &mut DeviceState) -> Intent {
        self.phase += AURORA_STEP;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        Intent::color(Rgb::from_hsv(self.hue(), 1.0, 1.0))
    }
}
