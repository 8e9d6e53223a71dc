//! Synthetic capture sources for `--dry-run`.

use std::f32::consts::TAU;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use super::{
    AudioCapture, CaptureError, ScreenCapture, ScreenParams, Subscription, SubscriptionId,
    spawn_worker,
};
use crate::color::Rgb;
use crate::event::{EngineEvent, EventSink};

const AUDIO_INTERVAL: Duration = Duration::from_millis(40);
/// One full trip around the hue wheel, including a short dark stretch.
const SCREEN_CYCLE: Duration = Duration::from_secs(12);

/// Screen whose average color sweeps the hue wheel and dips to black once per cycle.
#[derive(Debug, Default)]
pub struct SimScreenCapture;

impl SimScreenCapture {
    pub fn color_at(elapsed: Duration) -> Rgb {
        let t = (elapsed.as_secs_f32() / SCREEN_CYCLE.as_secs_f32()).fract();
        if t > 0.9 {
            return Rgb::new(2, 2, 2);
        }
        Rgb::from_hsv(t / 0.9, 0.8, 0.9)
    }
}

impl ScreenCapture for SimScreenCapture {
    fn start(
        &mut self,
        id: SubscriptionId,
        params: &ScreenParams,
        sink: EventSink,
    ) -> Result<Subscription, CaptureError> {
        let interval = Duration::from_secs_f32(1.0 / params.fps.max(1) as f32);
        spawn_worker("lightsync-sim-screen", id, move |started, stop| {
            started.ok();
            let origin = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                let color = Self::color_at(origin.elapsed());
                if !sink.emit(EngineEvent::ScreenColor {
                    sub: id,
                    color: Some(color),
                }) {
                    break;
                }
                thread::sleep(interval);
            }
        })
    }
}

/// Audio level following a slow beat-like envelope.
#[derive(Debug, Default)]
pub struct SimAudioCapture;

impl SimAudioCapture {
    pub fn level_at(elapsed: Duration) -> f32 {
        let beat = (elapsed.as_secs_f32() * 2.0 * TAU).sin().max(0.0);
        let swell = 0.5 + 0.5 * (elapsed.as_secs_f32() * 0.25 * TAU).sin();
        (beat * swell).clamp(0.0, 1.0)
    }
}

impl AudioCapture for SimAudioCapture {
    fn start(&mut self, id: SubscriptionId, sink: EventSink) -> Result<Subscription, CaptureError> {
        spawn_worker("lightsync-sim-audio", id, move |started, stop| {
            started.ok();
            let origin = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                let level = Self::level_at(origin.elapsed());
                if !sink.emit(EngineEvent::AudioLevel { sub: id, level }) {
                    break;
                }
                thread::sleep(AUDIO_INTERVAL);
            }
        })
    }
}
