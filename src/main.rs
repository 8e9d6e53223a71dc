use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::{info, warn};

use lightsync::capture::audio::{SystemAudioCapture, list_input_devices};
use lightsync::capture::screen::{SystemScreenCapture, list_displays};
use lightsync::capture::sim::{SimAudioCapture, SimScreenCapture};
use lightsync::config::Config;
use lightsync::engine::{Collaborators, Engine};
use lightsync::event::EventSink;
use lightsync::link::btle::BtleLink;
use lightsync::link::sim::SimLink;
use lightsync::prefs::{AppPrefs, default_log_path, prefs_storage_path};
use lightsync::{app, runtime};

fn main() -> Result<()> {
    let cfg = Config::parse();
    if cfg.list_audio_devices {
        list_input_devices()?;
        return Ok(());
    }
    if cfg.list_displays {
        for d in list_displays()? {
            println!("{}: id={} {}x{}", d.index, d.id, d.width, d.height);
        }
        return Ok(());
    }

    let log_path = cfg.log_file.clone().or_else(default_log_path);
    init_logging(log_path.as_deref())?;

    let prefs_path = cfg.prefs.clone().or_else(prefs_storage_path);
    let mut prefs = match AppPrefs::load(prefs_path.as_deref()) {
        Ok(prefs) => prefs,
        Err(err) => {
            warn!("ignoring unreadable prefs: {err}");
            AppPrefs::default()
        }
    };
    if cfg.apply_overrides(&mut prefs) && cfg.save_prefs {
        prefs
            .save(prefs_path.as_deref())
            .context("save prefs")?;
    }

    let (sink, inbox) = EventSink::channel();
    let parts = if cfg.dry_run {
        info!("dry run: simulated light and capture");
        Collaborators {
            link: Box::new(SimLink::start(sink.clone())),
            screen: Box::new(SimScreenCapture),
            audio: Box::new(SimAudioCapture),
            sink: sink.clone(),
        }
    } else {
        Collaborators {
            link: Box::new(BtleLink::start(sink.clone(), cfg.name_filter.clone())?),
            screen: Box::new(SystemScreenCapture),
            audio: Box::new(SystemAudioCapture::new(
                cfg.audio_source,
                cfg.audio_device.clone(),
            )),
            sink: sink.clone(),
        }
    };

    let engine = Engine::new(cfg.engine_settings(), prefs, parts).with_prefs_path(prefs_path);
    let thread = runtime::spawn(engine, sink, inbox)?;
    let result = app::run(&thread.handle());
    thread.shutdown();
    result
}

/// Logs go to a file so they never tear the TUI.
fn init_logging(path: Option<&Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stderr);
    }
    builder.init();
    Ok(())
}
