use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::engine::EngineSettings;
use crate::mode::Mode;
use crate::prefs::AppPrefs;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "lightsync",
    version,
    about = "Drive a Bluetooth LE smart light from your screen, your music, or built-in scenes"
)]
pub struct Config {
    #[arg(long, default_value_t = 15)]
    pub scan_timeout_secs: u64,

    /// Ignore peers whose advertised name does not contain this text.
    #[arg(long)]
    pub name_filter: Option<String>,

    #[arg(long, value_enum, default_value_t = AudioSource::System)]
    pub audio_source: AudioSource,

    #[arg(long)]
    pub audio_device: Option<String>,

    /// Display to mirror (0 = main display).
    #[arg(long, default_value_t = 0)]
    pub display: usize,

    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u16).range(1..=765))]
    pub color_threshold: u16,

    #[arg(long, value_enum)]
    pub start_mode: Option<Mode>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_reconnect: bool,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_scan: bool,

    #[arg(long, default_value_t = false)]
    pub list_displays: bool,

    #[arg(long, default_value_t = false)]
    pub list_audio_devices: bool,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long)]
    pub prefs: Option<PathBuf>,

    /// Use a simulated light and simulated capture instead of real hardware.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub capture_width: Option<u32>,

    #[arg(long)]
    pub capture_height: Option<u32>,

    #[arg(long)]
    pub capture_fps: Option<u32>,

    #[arg(long, action = clap::ArgAction::Set)]
    pub power_on_connect: Option<bool>,

    #[arg(long, action = clap::ArgAction::Set)]
    pub power_off_disconnect: Option<bool>,

    /// Write the capture/automation overrides back to the prefs file.
    #[arg(long, default_value_t = false)]
    pub save_prefs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioSource {
    #[value(alias = "microphone")]
    Mic,
    System,
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            scan_timeout: Duration::from_secs(self.scan_timeout_secs.max(1)),
            color_threshold: self.color_threshold,
            auto_reconnect: self.auto_reconnect,
            auto_scan: self.auto_scan,
            start_mode: self.start_mode,
            display: self.display,
            ..EngineSettings::default()
        }
    }

    /// Applies command-line overrides on top of persisted prefs. Returns true if anything changed.
    pub fn apply_overrides(&self, prefs: &mut AppPrefs) -> bool {
        let before = prefs.clone();
        if let Some(v) = self.capture_width.filter(|v| *v > 0) {
            prefs.capture_width = v;
        }
        if let Some(v) = self.capture_height.filter(|v| *v > 0) {
            prefs.capture_height = v;
        }
        if let Some(v) = self.capture_fps.filter(|v| *v > 0) {
            prefs.capture_fps = v;
        }
        if let Some(v) = self.power_on_connect {
            prefs.power_on_connect = v;
        }
        if let Some(v) = self.power_off_disconnect {
            prefs.power_off_disconnect = v;
        }
        *prefs != before
    }
}
