//! Audio level source for the music scene.
//!
//! Microphone input comes through `cpal`; system output on macOS comes through
//! ScreenCaptureKit. Either way mono samples cross a ring buffer to a meter
//! loop that reports one smoothed level per window.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use log::{info, warn};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};

#[cfg(target_os = "macos")]
use screencapturekit::cm::AudioBufferList;
#[cfg(target_os = "macos")]
use screencapturekit::prelude::*;

use super::{AudioCapture, CaptureError, Subscription, SubscriptionId, spawn_worker};
use crate::config::AudioSource;
use crate::event::{EngineEvent, EventSink};

pub const LEVEL_GAIN: f32 = 8.0;
/// Weight of the newest window in the running level.
pub const LEVEL_SMOOTHING: f32 = 0.4;
pub const LEVEL_INTERVAL: Duration = Duration::from_millis(40);

const SYSTEM_SAMPLE_RATE: u32 = 48_000;
const RING_SECONDS: usize = 2;

/// RMS meter over fixed windows with exponential smoothing.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    sum_sq: f32,
    count: u32,
    level: f32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: f32) {
        if sample.is_finite() {
            self.sum_sq += sample * sample;
            self.count += 1;
        }
    }

    /// Closes the window. `None` if no samples arrived since the last call.
    pub fn take(&mut self) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let rms = (self.sum_sq / self.count as f32).sqrt();
        let raw = (rms * LEVEL_GAIN).clamp(0.0, 1.0);
        self.level = LEVEL_SMOOTHING * raw + (1.0 - LEVEL_SMOOTHING) * self.level;
        self.sum_sq = 0.0;
        self.count = 0;
        Some(self.level)
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

pub struct SystemAudioCapture {
    source: AudioSource,
    device: Option<String>,
}

impl SystemAudioCapture {
    pub fn new(source: AudioSource, device: Option<String>) -> Self {
        Self { source, device }
    }
}

impl AudioCapture for SystemAudioCapture {
    fn start(&mut self, id: SubscriptionId, sink: EventSink) -> Result<Subscription, CaptureError> {
        let source = self.source;
        let device = self.device.clone();
        spawn_worker("lightsync-audio", id, move |started, stop| {
            let capacity = (SYSTEM_SAMPLE_RATE as usize).saturating_mul(RING_SECONDS);
            let (prod, mut cons) = HeapRb::<f32>::new(capacity).split();
            let backend = match open_backend(source, device.as_deref(), prod, id, &sink) {
                Ok(backend) => backend,
                Err(err) => {
                    started.fail(err);
                    return;
                }
            };
            started.ok();
            info!("audio meter running ({source:?})");
            meter_loop(&mut cons, stop, |level| {
                sink.emit(EngineEvent::AudioLevel { sub: id, level })
            });
            backend.stop();
        })
    }
}

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {name}")?;
    }
    Ok(())
}

enum AudioBackend {
    Cpal(cpal::Stream),
    #[cfg(target_os = "macos")]
    ScreenCaptureKit(SCStream),
}

impl AudioBackend {
    fn stop(self) {
        match self {
            Self::Cpal(stream) => {
                let _ = stream.pause();
            }
            #[cfg(target_os = "macos")]
            Self::ScreenCaptureKit(stream) => {
                let _ = stream.stop_capture();
            }
        }
    }
}

fn open_backend(
    source: AudioSource,
    device_query: Option<&str>,
    prod: ringbuf::HeapProd<f32>,
    id: SubscriptionId,
    sink: &EventSink,
) -> Result<AudioBackend, CaptureError> {
    match source {
        AudioSource::Mic => open_mic(device_query, prod, id, sink),
        AudioSource::System => open_system(prod),
    }
}

fn open_mic(
    device_query: Option<&str>,
    mut prod: ringbuf::HeapProd<f32>,
    id: SubscriptionId,
    sink: &EventSink,
) -> Result<AudioBackend, CaptureError> {
    let host = cpal::default_host();
    let device = select_mic_input_device(&host, device_query)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Start(format!("default input config: {e}")))?;
    let channels = (supported.channels() as usize).max(1);
    let config: cpal::StreamConfig = supported.clone().into();

    let err_sink = sink.clone();
    let err_fn = move |err: cpal::StreamError| {
        warn!("audio stream error: {err}");
        err_sink.emit(EngineEvent::CaptureFailed {
            sub: id,
            reason: format!("Audio capture failed: {err}"),
        });
    };

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
            err_fn,
            None,
        ),
        fmt => {
            return Err(CaptureError::Start(format!(
                "unsupported sample format: {fmt:?}"
            )));
        }
    }
    .map_err(|e| CaptureError::Start(format!("build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CaptureError::Start(format!("start input stream: {e}")))?;
    Ok(AudioBackend::Cpal(stream))
}

fn select_mic_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> Result<cpal::Device, CaptureError> {
    let Some(want) = device_query.map(str::to_lowercase) else {
        return host
            .default_input_device()
            .ok_or_else(|| CaptureError::NoDevice("default".to_string()));
    };
    host.input_devices()
        .map_err(|e| CaptureError::Start(format!("enumerate input devices: {e}")))?
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&want))
                .unwrap_or(false)
        })
        .ok_or(CaptureError::NoDevice(want))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks(channels) {
        let acc: f32 = frame.iter().map(|s| s.to_float_sample()).sum();
        let _ = prod.try_push(acc / channels as f32);
    }
}

fn meter_loop(
    cons: &mut ringbuf::HeapCons<f32>,
    stop: &AtomicBool,
    mut emit: impl FnMut(f32) -> bool,
) {
    let mut meter = LevelMeter::new();
    let mut window_start = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let mut got_any = false;
        while let Some(s) = cons.try_pop() {
            got_any = true;
            meter.push(s);
        }
        if window_start.elapsed() >= LEVEL_INTERVAL {
            window_start = Instant::now();
            if let Some(level) = meter.take() {
                if !emit(level) {
                    break;
                }
            }
        }
        if !got_any {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn open_system(_prod: ringbuf::HeapProd<f32>) -> Result<AudioBackend, CaptureError> {
    Err(CaptureError::Unsupported("system audio capture"))
}

#[cfg(target_os = "macos")]
fn open_system(prod: ringbuf::HeapProd<f32>) -> Result<AudioBackend, CaptureError> {
    // Needs Screen Recording permission for the hosting terminal.
    let content = SCShareableContent::get()
        .map_err(|e| CaptureError::Start(format!("shareable content: {e:?}")))?;
    let displays = content.displays();
    let display = displays.first().ok_or(CaptureError::NoDisplay(0))?;

    let filter = SCContentFilter::create()
        .with_display(display)
        .with_excluding_windows(&[])
        .build();
    // Video is unused here; keep it tiny but not throttled, or audio arrives in large chunks.
    let config = SCStreamConfiguration::new()
        .with_width(2)
        .with_height(2)
        .with_queue_depth(1)
        .with_fps(60)
        .with_captures_audio(true)
        .with_sample_rate(48_000)
        .with_channel_count(2);

    let mut stream = SCStream::new(&filter, &config);
    stream.add_output_handler(
        SystemAudioHandler {
            prod: std::sync::Mutex::new(prod),
        },
        SCStreamOutputType::Audio,
    );
    stream
        .start_capture()
        .map_err(|e| CaptureError::Start(format!("start system audio: {e:?}")))?;
    Ok(AudioBackend::ScreenCaptureKit(stream))
}

#[cfg(target_os = "macos")]
struct SystemAudioHandler {
    prod: std::sync::Mutex<ringbuf::HeapProd<f32>>,
}

#[cfg(target_os = "macos")]
impl SCStreamOutputTrait for SystemAudioHandler {
    fn did_output_sample_buffer(&self, sample: CMSampleBuffer, of_type: SCStreamOutputType) {
        if !matches!(of_type, SCStreamOutputType::Audio) {
            return;
        }
        let _ = sample.make_data_ready();
        let Some(fmt) = sample.format_description() else {
            return;
        };
        if fmt.audio_is_big_endian() {
            return;
        }
        let is_float = fmt.audio_is_float();
        let bits = fmt.audio_bits_per_channel().unwrap_or(32);
        let channels = fmt.audio_channel_count().unwrap_or(2).max(1) as usize;
        let Some(list) = sample.audio_buffer_list() else {
            return;
        };
        let Ok(mut prod) = self.prod.lock() else {
            return;
        };
        match (is_float, bits) {
            (true, 32) => push_buffers::<f32>(&list, channels, &mut prod, |s| s),
            (false, 16) => push_buffers::<i16>(&list, channels, &mut prod, |s| {
                f32::from(s) / 32768.0
            }),
            _ => {}
        }
    }
}

#[cfg(target_os = "macos")]
fn samples_of<T>(data: &[u8]) -> &[T] {
    // SAFETY: only plain sample types (f32/i16) are read; misaligned prefixes are rejected.
    let (head, body, _) = unsafe { data.align_to::<T>() };
    if head.is_empty() { body } else { &[] }
}

/// Mixes interleaved (one buffer) or planar (one buffer per channel) audio down to mono.
#[cfg(target_os = "macos")]
fn push_buffers<T: Copy>(
    list: &AudioBufferList,
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
    to_f32: impl Fn(T) -> f32,
) {
    if list.num_buffers() == 1 {
        let Some(buf) = list.get(0) else {
            return;
        };
        let samples = samples_of::<T>(buf.data());
        let stride = (buf.number_channels as usize).max(channels);
        for frame in samples.chunks_exact(stride) {
            let acc: f32 = frame.iter().take(channels).map(|s| to_f32(*s)).sum();
            let _ = prod.try_push((acc / channels as f32).clamp(-1.0, 1.0));
        }
        return;
    }

    let planes: Vec<&[T]> = list
        .iter()
        .map(|buf| samples_of::<T>(buf.data()))
        .filter(|plane| !plane.is_empty())
        .take(channels)
        .collect();
    if planes.is_empty() {
        return;
    }
    let frames = planes.iter().map(|p| p.len()).min().unwrap_or(0);
    for i in 0..frames {
        let acc: f32 = planes.iter().map(|p| to_f32(p[i])).sum();
        let _ = prod.try_push((acc / planes.len() as f32).clamp(-1.0, 1.0));
    }
}
