//! Single-owner thread around [`Engine`].
//!
//! Commands, gateway events, capture samples and timer deadlines are all
//! handled on one thread, in arrival order. The front end talks to it through
//! an [`EngineHandle`] and reads the latest published [`Snapshot`].

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::engine::{Engine, Snapshot};
use crate::event::{Command, EventSink, Message};

/// Upper bound on how long shutdown waits for the power-off and disconnect.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct EngineHandle {
    sink: EventSink,
    snapshot: Arc<Mutex<Snapshot>>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) -> bool {
        self.sink.submit(command)
    }

    pub fn snapshot(&self) -> Snapshot {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub struct EngineThread {
    handle: EngineHandle,
    join: Option<JoinHandle<()>>,
}

impl EngineThread {
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Disconnects gracefully and waits for the engine thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.handle.send(Command::Shutdown);
        if join.join().is_err() {
            warn!("engine thread panicked");
        }
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Moves `engine` onto its own thread. `sink` must feed `inbox`.
pub fn spawn(engine: Engine, sink: EventSink, inbox: Receiver<Message>) -> Result<EngineThread> {
    let snapshot = Arc::new(Mutex::new(engine.snapshot()));
    let published = Arc::clone(&snapshot);
    let join = thread::Builder::new()
        .name("lightsync-engine".to_string())
        .spawn(move || run_loop(engine, inbox, &published))
        .context("spawn engine thread")?;
    Ok(EngineThread {
        handle: EngineHandle { sink, snapshot },
        join: Some(join),
    })
}

fn run_loop(mut engine: Engine, inbox: Receiver<Message>, snapshot: &Mutex<Snapshot>) {
    let mut shutdown_deadline: Option<Instant> = None;
    loop {
        engine.fire_due_timers(Instant::now());
        publish(&engine, snapshot);

        if let Some(deadline) = shutdown_deadline {
            if engine.is_quiescent() || Instant::now() >= deadline {
                break;
            }
        }

        let wake = match (engine.next_deadline(), shutdown_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let message = match wake {
            Some(at) => match inbox.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match inbox.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        let now = Instant::now();
        if matches!(message, Message::Command(Command::Shutdown)) {
            if shutdown_deadline.is_none() {
                info!("shutting down engine");
                shutdown_deadline = Some(now + SHUTDOWN_GRACE);
            }
        }
        engine.handle_message(message, now);
    }
    debug!("engine loop exited");
    publish(&engine, snapshot);
}

fn publish(engine: &Engine, snapshot: &Mutex<Snapshot>) {
    let next = engine.snapshot();
    match snapshot.lock() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}
