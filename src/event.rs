//! Messages that cross into the engine thread.

use std::sync::mpsc::{self, Receiver, Sender};

use log::trace;

use crate::capture::SubscriptionId;
use crate::color::Rgb;
use crate::link::{LinkEvent, PeerId};
use crate::mode::Mode;

/// Requests from the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(PeerId),
    ReconnectLast,
    Disconnect,
    SetMode(Mode),
    SetPower(bool),
    /// Throttled brightness from a control still being dragged.
    SetBrightnessLive(u8),
    /// Brightness at the end of an interaction; always forwarded.
    SetBrightness(u8),
    SetColor(Rgb),
    SelectDisplay(usize),
    Shutdown,
}

/// Asynchronous results from collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Link(LinkEvent),
    /// `None` when the stream ended on its own.
    ScreenColor {
        sub: SubscriptionId,
        color: Option<Rgb>,
    },
    AudioLevel {
        sub: SubscriptionId,
        level: f32,
    },
    CaptureFailed {
        sub: SubscriptionId,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Command(Command),
    Event(EngineEvent),
}

/// Cloneable producer side of the engine's inbox.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Message>,
}

impl EventSink {
    pub fn channel() -> (Self, Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Returns false once the engine has gone away.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.send(Message::Event(event))
    }

    pub fn link(&self, event: LinkEvent) -> bool {
        self.emit(EngineEvent::Link(event))
    }

    pub fn submit(&self, command: Command) -> bool {
        self.send(Message::Command(command))
    }

    fn send(&self, message: Message) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                trace!("engine inbox closed, dropping {:?}", err.0);
                false
            }
        }
    }
}
