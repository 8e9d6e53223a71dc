//! Adapter and peer connection state.
//!
//! This module only tracks where the link is and which transitions are legal;
//! side effects (timers, gateway calls, mode teardown) belong to the engine.

use std::fmt;
use std::time::Instant;

use log::{debug, info};

use crate::link::{AdapterState, ChannelHandle, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disabled,
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Ready,
    Disconnecting,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Disconnecting => "disconnecting",
        }
    }

    /// A transport-level connection exists or is being set up.
    pub fn has_peer(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Discovering | Self::Ready | Self::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub id: PeerId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub last_seen: Instant,
}

impl DiscoveredPeer {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown device")
    }
}

#[derive(Debug, Default)]
pub struct Connection {
    state: ConnectionState,
    adapter: AdapterState,
    peers: Vec<DiscoveredPeer>,
    peer: Option<PeerId>,
    channel: Option<ChannelHandle>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn adapter(&self) -> AdapterState {
        self.adapter
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        &self.peers
    }

    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    pub fn find_peer(&self, id: &PeerId) -> Option<&DiscoveredPeer> {
        self.peers.iter().find(|p| &p.id == id)
    }

    /// Resolved only while `Ready`.
    pub fn channel(&self) -> Option<&ChannelHandle> {
        match self.state {
            ConnectionState::Ready => self.channel.as_ref(),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.channel().is_some()
    }

    fn transition(&mut self, to: ConnectionState) {
        if self.state != to {
            info!("connection {} -> {}", self.state, to);
            self.state = to;
        }
    }

    /// Adapter came up. Returns true when this left `Disabled`.
    pub fn adapter_on(&mut self) -> bool {
        self.adapter = AdapterState::PoweredOn;
        if self.state == ConnectionState::Disabled {
            self.transition(ConnectionState::Idle);
            return true;
        }
        false
    }

    /// Adapter went away: drop everything, including discovered peers.
    /// Returns the peer that was attached, if any.
    pub fn adapter_lost(&mut self, adapter: AdapterState) -> Option<PeerId> {
        self.adapter = adapter;
        self.peers.clear();
        self.channel = None;
        self.transition(ConnectionState::Disabled);
        self.peer.take()
    }

    pub fn begin_scan(&mut self) -> bool {
        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Scanning) {
            debug!("scan ignored while {}", self.state);
            return false;
        }
        self.peers.clear();
        self.transition(ConnectionState::Scanning);
        true
    }

    pub fn end_scan(&mut self) -> bool {
        if self.state != ConnectionState::Scanning {
            return false;
        }
        self.transition(ConnectionState::Idle);
        true
    }

    /// Upserts a sighting. Only accepted while scanning.
    pub fn record_peer(
        &mut self,
        id: PeerId,
        name: Option<String>,
        rssi: Option<i16>,
        now: Instant,
    ) -> bool {
        if self.state != ConnectionState::Scanning {
            return false;
        }
        match self.peers.iter_mut().find(|p| p.id == id) {
            Some(peer) => {
                if name.is_some() {
                    peer.name = name;
                }
                if rssi.is_some() {
                    peer.rssi = rssi;
                }
                peer.last_seen = now;
            }
            None => {
                debug!("discovered {id} ({})", name.as_deref().unwrap_or("unnamed"));
                self.peers.push(DiscoveredPeer {
                    id,
                    name,
                    rssi,
                    last_seen: now,
                });
            }
        }
        true
    }

    /// Connecting is only legal from `Idle`/`Scanning`; a peer already being
    /// connected or connected is refused.
    pub fn begin_connect(&mut self, peer: PeerId) -> bool {
        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Scanning) {
            debug!("connect to {peer} ignored while {}", self.state);
            return false;
        }
        self.peer = Some(peer);
        self.channel = None;
        self.transition(ConnectionState::Connecting);
        true
    }

    fn is_current(&self, peer: &PeerId) -> bool {
        self.peer.as_ref() == Some(peer)
    }

    pub fn connected(&mut self, peer: &PeerId) -> bool {
        if self.state != ConnectionState::Connecting || !self.is_current(peer) {
            return false;
        }
        self.transition(ConnectionState::Discovering);
        true
    }

    pub fn connect_failed(&mut self, peer: &PeerId) -> bool {
        if self.state != ConnectionState::Connecting || !self.is_current(peer) {
            return false;
        }
        self.peer = None;
        self.transition(ConnectionState::Idle);
        true
    }

    pub fn channel_found(&mut self, handle: ChannelHandle) -> bool {
        if self.state != ConnectionState::Discovering || !self.is_current(&handle.peer) {
            return false;
        }
        self.channel = Some(handle);
        self.transition(ConnectionState::Ready);
        true
    }

    pub fn begin_disconnect(&mut self) -> Option<PeerId> {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Discovering | ConnectionState::Ready
        ) {
            return None;
        }
        self.transition(ConnectionState::Disconnecting);
        self.peer.clone()
    }

    /// Transport reported the link gone. Ignored for peers we are not attached to.
    pub fn disconnected(&mut self, peer: &PeerId) -> bool {
        if !self.state.has_peer() || !self.is_current(peer) {
            return false;
        }
        self.peer = None;
        self.channel = None;
        self.transition(ConnectionState::Idle);
        true
    }
}
