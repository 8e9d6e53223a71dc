use std::fmt;
use std::time::Duration;

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Mode {
    #[default]
    Manual,
    #[value(name = "screen", alias = "screen-mirror", alias = "mirror")]
    ScreenMirror,
    #[value(name = "music", alias = "music-visualizer", alias = "audio")]
    MusicVisualizer,
    Rainbow,
    Pulse,
    Breathe,
    Strobe,
    #[value(alias = "candle")]
    Candlelight,
    Aurora,
    #[value(alias = "storm", alias = "thunder")]
    Thunderstorm,
}

impl Mode {
    pub const ALL: [Mode; 10] = [
        Mode::Manual,
        Mode::ScreenMirror,
        Mode::MusicVisualizer,
        Mode::Rainbow,
        Mode::Pulse,
        Mode::Breathe,
        Mode::Strobe,
        Mode::Candlelight,
        Mode::Aurora,
        Mode::Thunderstorm,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::ScreenMirror => "Screen Mirror",
            Self::MusicVisualizer => "Music Visualizer",
            Self::Rainbow => "Rainbow",
            Self::Pulse => "Pulse",
            Self::Breathe => "Breathe",
            Self::Strobe => "Strobe",
            Self::Candlelight => "Candlelight",
            Self::Aurora => "Aurora",
            Self::Thunderstorm => "Thunderstorm",
        }
    }

    /// Anything other than manual control drives the light on its own.
    pub fn is_scene(self) -> bool {
        self != Self::Manual
    }

    /// Tick period for the timer-driven scenes.
    pub fn tick_period(self) -> Option<Duration> {
        let ms = match self {
            Self::Manual | Self::ScreenMirror | Self::MusicVisualizer => return None,
            Self::Pulse => 50,
            Self::Candlelight => 150,
            Self::Rainbow | Self::Breathe | Self::Strobe | Self::Aurora | Self::Thunderstorm => 100,
        };
        Some(Duration::from_millis(ms))
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|m| *m == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
