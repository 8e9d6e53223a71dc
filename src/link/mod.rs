//! Transport seam between the engine and the radio.
//!
//! Gateway calls never block on the device; outcomes come back later as
//! [`LinkEvent`]s through the engine's [`EventSink`](crate::event::EventSink).

pub mod btle;
pub mod sim;

use std::fmt;

use uuid::Uuid;

use crate::protocol::Frame;

/// Characteristic every control frame is written to.
pub const CONTROL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b11);

/// Opaque, transport-assigned peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Resolved control channel on a connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub peer: PeerId,
    pub characteristic: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
}

impl AdapterState {
    pub fn is_usable(self) -> bool {
        self == Self::PoweredOn
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Unknown => "Initializing Bluetooth…",
            Self::PoweredOn => "Bluetooth is on",
            Self::PoweredOff => "Bluetooth is off",
            Self::Unauthorized => "Bluetooth access not authorized",
            Self::Unsupported => "Bluetooth is not supported on this machine",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Adapter(AdapterState),
    PeerDiscovered {
        id: PeerId,
        name: Option<String>,
        rssi: Option<i16>,
    },
    Connected(PeerId),
    ConnectFailed {
        peer: PeerId,
        reason: String,
    },
    ChannelFound(ChannelHandle),
    ChannelMissing(PeerId),
    Disconnected {
        peer: PeerId,
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    NoAdapter,
    UnknownPeer(PeerId),
    Transport(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapter => f.write_str("no Bluetooth adapter available"),
            Self::UnknownPeer(peer) => write!(f, "peer {peer} is not known to the adapter"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Everything the engine needs from a radio.
pub trait LinkGateway: Send {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    fn connect(&mut self, peer: &PeerId);
    fn discover_control_channel(&mut self, peer: &PeerId);
    /// Fire-and-forget.
    fn write(&mut self, channel: &ChannelHandle, frame: &Frame);
    fn disconnect(&mut self, peer: &PeerId);
}
