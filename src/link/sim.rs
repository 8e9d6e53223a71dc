//! In-process gateway for `--dry-run`: one synthetic fixture, frames logged.

use log::{info, warn};

use super::{
    AdapterState, CONTROL_CHARACTERISTIC, ChannelHandle, LinkEvent, LinkGateway, PeerId,
};
use crate::event::EventSink;
use crate::protocol::{Command, Frame};

pub const SIM_PEER_ID: &str = "sim-00:11:22:33:44:55";
pub const SIM_PEER_NAME: &str = "Simulated Light";

pub struct SimLink {
    sink: EventSink,
    peer: PeerId,
    connected: bool,
    frames: u64,
}

impl SimLink {
    /// Reports a powered adapter immediately.
    pub fn start(sink: EventSink) -> Self {
        sink.link(LinkEvent::Adapter(AdapterState::PoweredOn));
        Self {
            sink,
            peer: PeerId::from(SIM_PEER_ID),
            connected: false,
            frames: 0,
        }
    }
}

impl LinkGateway for SimLink {
    fn start_scan(&mut self) {
        self.sink.link(LinkEvent::PeerDiscovered {
            id: self.peer.clone(),
            name: Some(SIM_PEER_NAME.to_string()),
            rssi: Some(-42),
        });
    }

    fn stop_scan(&mut self) {}

    fn connect(&mut self, peer: &PeerId) {
        if peer != &self.peer {
            self.sink.link(LinkEvent::ConnectFailed {
                peer: peer.clone(),
                reason: "no such simulated device".to_string(),
            });
            return;
        }
        self.connected = true;
        self.sink.link(LinkEvent::Connected(peer.clone()));
    }

    fn discover_control_channel(&mut self, peer: &PeerId) {
        if !self.connected {
            self.sink.link(LinkEvent::ChannelMissing(peer.clone()));
            return;
        }
        self.sink.link(LinkEvent::ChannelFound(ChannelHandle {
            peer: peer.clone(),
            characteristic: CONTROL_CHARACTERISTIC,
        }));
    }

    fn write(&mut self, channel: &ChannelHandle, frame: &Frame) {
        if !self.connected || channel.peer != self.peer {
            warn!("sim write on closed channel: {frame}");
            return;
        }
        self.frames += 1;
        match Command::decode(frame) {
            Some(command) => info!("sim write #{} {command:?} [{frame}]", self.frames),
            None => info!("sim write #{} [{frame}]", self.frames),
        }
    }

    fn disconnect(&mut self, peer: &PeerId) {
        self.connected = false;
        self.sink.link(LinkEvent::Disconnected {
            peer: peer.clone(),
            reason: None,
        });
    }
}
