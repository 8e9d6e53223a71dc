//! Screen and audio sources the reactive scenes subscribe to.

pub mod audio;
pub mod screen;
pub mod sim;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::event::EventSink;

/// Tags every sample so the engine can drop samples from a cancelled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Live stream handle. Cancelling (or dropping) stops delivery before returning.
pub struct Subscription {
    id: SubscriptionId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenParams {
    pub display: usize,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    Unsupported(&'static str),
    NoDisplay(usize),
    NoDevice(String),
    Start(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(what) => write!(f, "{what} is not supported on this platform"),
            Self::NoDisplay(index) => write!(f, "display {index} not found"),
            Self::NoDevice(query) => write!(f, "no audio input matches '{query}'"),
            Self::Start(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CaptureError {}

pub trait ScreenCapture: Send {
    fn start(
        &mut self,
        id: SubscriptionId,
        params: &ScreenParams,
        sink: EventSink,
    ) -> Result<Subscription, CaptureError>;
}

pub trait AudioCapture: Send {
    fn start(&mut self, id: SubscriptionId, sink: EventSink)
    -> Result<Subscription, CaptureError>;
}

/// Handshake a worker uses to report whether its source came up.
pub(crate) struct Started(mpsc::Sender<Result<(), CaptureError>>);

impl Started {
    pub(crate) fn ok(&self) {
        let _ = self.0.send(Ok(()));
    }

    pub(crate) fn fail(&self, err: CaptureError) {
        let _ = self.0.send(Err(err));
    }
}

/// Runs a capture source on its own thread so platform stream objects never
/// leave the thread that created them. The returned subscription stops the
/// worker and joins it.
pub(crate) fn spawn_worker<F>(
    name: &str,
    id: SubscriptionId,
    body: F,
) -> Result<Subscription, CaptureError>
where
    F: FnOnce(Started, &AtomicBool) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(Started(tx), &worker_stop))
        .map_err(|err| CaptureError::Start(format!("spawn {name}: {err}")))?;

    match rx.recv() {
        Ok(Ok(())) => Ok(Subscription::new(id, move || {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        })),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => {
            let _ = handle.join();
            Err(CaptureError::Start(format!("{name} exited before starting")))
        }
    }
}
