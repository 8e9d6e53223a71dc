//! Average screen color for the mirror scene (macOS ScreenCaptureKit).

use crate::color::Rgb;

use super::{CaptureError, ScreenCapture, ScreenParams, Subscription, SubscriptionId};
use crate::event::EventSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub index: usize,
    pub id: u32,
    pub width: u32,
    pub height: u32,
}

/// Mean color of a BGRA8 image. Rows may be padded past `width * 4` bytes.
pub fn average_bgra(data: &[u8], width: usize, height: usize, bytes_per_row: usize) -> Option<Rgb> {
    if width == 0 || height == 0 || bytes_per_row < width * 4 {
        return None;
    }
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    let mut pixels = 0u64;
    for row in data.chunks(bytes_per_row).take(height) {
        let Some(row) = row.get(..width * 4) else {
            break;
        };
        for px in row.chunks_exact(4) {
            b += u64::from(px[0]);
            g += u64::from(px[1]);
            r += u64::from(px[2]);
            pixels += 1;
        }
    }
    if pixels == 0 {
        return None;
    }
    Some(Rgb::new(
        (r / pixels) as u8,
        (g / pixels) as u8,
        (b / pixels) as u8,
    ))
}

#[derive(Debug, Default)]
pub struct SystemScreenCapture;

impl ScreenCapture for SystemScreenCapture {
    fn start(
        &mut self,
        id: SubscriptionId,
        params: &ScreenParams,
        sink: EventSink,
    ) -> Result<Subscription, CaptureError> {
        #[cfg(target_os = "macos")]
        {
            macos::start(id, *params, sink)
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = (id, params, sink);
            Err(CaptureError::Unsupported("screen capture"))
        }
    }
}

pub fn list_displays() -> Result<Vec<DisplayInfo>, CaptureError> {
    #[cfg(target_os = "macos")]
    {
        macos::list_displays()
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(CaptureError::Unsupported("display enumeration"))
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use log::{debug, warn};
    use screencapturekit::prelude::*;

    use super::{DisplayInfo, average_bgra};
    use crate::capture::{CaptureError, ScreenParams, Subscription, SubscriptionId, spawn_worker};
    use crate::event::{EngineEvent, EventSink};

    struct FrameHandler {
        id: SubscriptionId,
        sink: EventSink,
    }

    impl SCStreamOutputTrait for FrameHandler {
        fn did_output_sample_buffer(&self, sample: CMSampleBuffer, of_type: SCStreamOutputType) {
            if !matches!(of_type, SCStreamOutputType::Screen) {
                return;
            }
            let Some(pixels) = sample.image_buffer() else {
                return;
            };
            let (width, height, stride) =
                (pixels.width(), pixels.height(), pixels.bytes_per_row());
            let Ok(guard) = pixels.lock_read_only() else {
                return;
            };
            if let Some(color) = average_bgra(guard.as_slice(), width, height, stride) {
                self.sink.emit(EngineEvent::ScreenColor {
                    sub: self.id,
                    color: Some(color),
                });
            }
        }
    }

    pub(super) fn list_displays() -> Result<Vec<DisplayInfo>, CaptureError> {
        let content = SCShareableContent::get()
            .map_err(|e| CaptureError::Start(format!("shareable content: {e:?}")))?;
        Ok(content
            .displays()
            .iter()
            .enumerate()
            .map(|(index, d)| DisplayInfo {
                index,
                id: d.display_id(),
                width: d.width(),
                height: d.height(),
            })
            .collect())
    }

    pub(super) fn start(
        id: SubscriptionId,
        params: ScreenParams,
        sink: EventSink,
    ) -> Result<Subscription, CaptureError> {
        spawn_worker("lightsync-screen", id, move |started, stop: &AtomicBool| {
            let stream = match open_stream(id, params, sink.clone()) {
                Ok(stream) => stream,
                Err(err) => {
                    started.fail(err);
                    return;
                }
            };
            started.ok();
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(20));
            }
            if let Err(err) = stream.stop_capture() {
                warn!("stop screen capture: {err:?}");
            }
            debug!("screen capture {id} stopped");
        })
    }

    fn open_stream(
        id: SubscriptionId,
        params: ScreenParams,
        sink: EventSink,
    ) -> Result<SCStream, CaptureError> {
        let content = SCShareableContent::get()
            .map_err(|e| CaptureError::Start(format!("shareable content: {e:?}")))?;
        let displays = content.displays();
        let display = displays
            .get(params.display)
            .ok_or(CaptureError::NoDisplay(params.display))?;

        let filter = SCContentFilter::create()
            .with_display(display)
            .with_excluding_windows(&[])
            .build();
        let config = SCStreamConfiguration::new()
            .with_width(params.width.max(1))
            .with_height(params.height.max(1))
            .with_queue_depth(3)
            .with_fps(params.fps.max(1))
            .with_pixel_format(PixelFormat::BGRA);

        let mut stream = SCStream::new(&filter, &config);
        stream.add_output_handler(FrameHandler { id, sink }, SCStreamOutputType::Screen);
        stream
            .start_capture()
            .map_err(|e| CaptureError::Start(format!("start screen capture: {e:?}")))?;
        Ok(stream)
    }
}
