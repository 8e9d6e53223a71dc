//! Per-scene generators.
//!
//! Timer-driven scenes implement [`Effect`]; the two reactive scenes consume
//! capture samples instead. Every generator returns an [`Intent`]: the frames
//! the engine should try to send. Generators update the intended
//! [`DeviceState`] themselves where the scene owns it.

mod flicker;
mod hue;
mod mirror;
mod music;
mod wave;

use std::time::Duration;

pub use flicker::{Candlelight, Strobe, Thunderstorm};
pub use hue::{Aurora, Rainbow};
pub use mirror::ScreenMirror;
pub use music::MusicVisualizer;
pub use wave::Wave;

use crate::color::Rgb;
use crate::device::DeviceState;
use crate::mode::Mode;

/// Frames requested by one generator step, sent in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Intent {
    pub power: Option<bool>,
    /// Device level (0..=254).
    pub level: Option<u8>,
    pub color: Option<Rgb>,
}

impl Intent {
    pub const NONE: Self = Self {
        power: None,
        level: None,
        color: None,
    };

    pub fn power(on: bool) -> Self {
        Self {
            power: Some(on),
            ..Self::NONE
        }
    }

    pub fn color(color: Rgb) -> Self {
        Self {
            color: Some(color),
            ..Self::NONE
        }
    }

    pub fn level_and_color(level: u8, color: Rgb) -> Self {
        Self {
            power: None,
            level: Some(level),
            color: Some(color),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_none() && self.level.is_none() && self.color.is_none()
    }
}

pub trait Effect {
    fn tick(&mut self, device: &mut DeviceState) -> Intent;
}

/// Live generator for the active scene.
#[derive(Debug, Clone)]
pub enum EffectSlot {
    ScreenMirror(ScreenMirror),
    MusicVisualizer(MusicVisualizer),
    Rainbow(Rainbow),
    Pulse(Wave),
    Breathe(Wave),
    Strobe(Strobe),
    Candlelight(Candlelight),
    Aurora(Aurora),
    Thunderstorm(Thunderstorm),
}

impl EffectSlot {
    /// `None` for [`Mode::Manual`], which has no generator.
    pub fn for_mode(mode: Mode, device: &DeviceState, color_threshold: u16) -> Option<Self> {
        Some(match mode {
            Mode::Manual => return None,
            Mode::ScreenMirror => Self::ScreenMirror(ScreenMirror::new(color_threshold)),
            Mode::MusicVisualizer => Self::MusicVisualizer(MusicVisualizer::new()),
            Mode::Rainbow => Self::Rainbow(Rainbow::new()),
            Mode::Pulse => Self::Pulse(Wave::pulse(device.color)),
            Mode::Breathe => Self::Breathe(Wave::breathe(device.color)),
            Mode::Strobe => Self::Strobe(Strobe),
            Mode::Candlelight => Self::Candlelight(Candlelight::new()),
            Mode::Aurora => Self::Aurora(Aurora::new()),
            Mode::Thunderstorm => Self::Thunderstorm(Thunderstorm::new()),
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::ScreenMirror(_) => Mode::ScreenMirror,
            Self::MusicVisualizer(_) => Mode::MusicVisualizer,
            Self::Rainbow(_) => Mode::Rainbow,
            Self::Pulse(_) => Mode::Pulse,
            Self::Breathe(_) => Mode::Breathe,
            Self::Strobe(_) => Mode::Strobe,
            Self::Candlelight(_) => Mode::Candlelight,
            Self::Aurora(_) => Mode::Aurora,
            Self::Thunderstorm(_) => Mode::Thunderstorm,
        }
    }

    pub fn period(&self) -> Option<Duration> {
        self.mode().tick_period()
    }

    /// Timer step. Reactive slots have no timer and return an empty intent.
    pub fn tick(&mut self, device: &mut DeviceState) -> Intent {
        match self {
            Self::ScreenMirror(_) | Self::MusicVisualizer(_) => Intent::NONE,
            Self::Rainbow(fx) => fx.tick(device),
            Self::Pulse(fx) | Self::Breathe(fx) => fx.tick(device),
            Self::Strobe(fx) => fx.tick(device),
            Self::Candlelight(fx) => fx.tick(device),
            Self::Aurora(fx) => fx.tick(device),
            Self::Thunderstorm(fx) => fx.tick(device),
        }
    }

    pub fn on_screen_color(&mut self, color: Rgb, device: &mut DeviceState) -> Intent {
        match self {
            Self::ScreenMirror(mirror) => mirror.on_color(color, device),
            _ => Intent::NONE,
        }
    }

    pub fn on_audio_level(&mut self, level: f32, device: &mut DeviceState) -> Intent {
        match self {
            Self::MusicVisualizer(music) => music.on_level(level, device),
            _ => Intent::NONE,
        }
    }
}
