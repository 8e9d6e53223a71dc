//! Bluetooth LE gateway on top of `btleplug`.
//!
//! The engine thread never awaits anything here: every call spawns onto a
//! private tokio runtime and the outcome comes back as a [`LinkEvent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, trace, warn};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{
    AdapterState, CONTROL_CHARACTERISTIC, ChannelHandle, LinkError, LinkEvent, LinkGateway,
    PeerId,
};
use crate::event::EventSink;
use crate::protocol::Frame;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);
const ADAPTER_POLL: Duration = Duration::from_millis(1000);

struct Shared {
    adapter: Option<Adapter>,
    name_filter: Option<String>,
    peripherals: Mutex<HashMap<PeerId, Peripheral>>,
    control: Mutex<Option<(PeerId, Peripheral, Characteristic)>>,
}

impl Shared {
    fn adapter(&self) -> Result<&Adapter, LinkError> {
        self.adapter.as_ref().ok_or(LinkError::NoAdapter)
    }

    fn cached(&self, peer: &PeerId) -> Option<Peripheral> {
        self.peripherals
            .lock()
            .ok()
            .and_then(|map| map.get(peer).cloned())
    }

    /// Looks in the scan cache first, then asks the adapter. The second path
    /// lets a persisted id reconnect without scanning.
    async fn resolve(&self, peer: &PeerId) -> Result<Peripheral, LinkError> {
        if let Some(p) = self.cached(peer) {
            return Ok(p);
        }
        let adapter = self.adapter()?;
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == peer.as_str())
            .ok_or_else(|| LinkError::UnknownPeer(peer.clone()))
    }

    fn set_control(&self, value: Option<(PeerId, Peripheral, Characteristic)>) {
        if let Ok(mut slot) = self.control.lock() {
            *slot = value;
        }
    }

    fn clear_control_for(&self, peer: &PeerId) {
        if let Ok(mut slot) = self.control.lock() {
            if slot.as_ref().is_some_and(|(id, _, _)| id == peer) {
                *slot = None;
            }
        }
    }

    fn matches_filter(&self, name: Option<&str>) -> bool {
        match (&self.name_filter, name) {
            (None, _) => true,
            (Some(filter), Some(name)) => name.to_lowercase().contains(&filter.to_lowercase()),
            (Some(_), None) => false,
        }
    }
}

pub struct BtleLink {
    runtime: Runtime,
    shared: Arc<Shared>,
    sink: EventSink,
    writer: mpsc::UnboundedSender<(ChannelHandle, Frame)>,
}

impl BtleLink {
    /// Opens the first adapter. A missing adapter is reported as
    /// [`AdapterState::Unsupported`] rather than failing start-up.
    pub fn start(sink: EventSink, name_filter: Option<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("lightsync-ble")
            .enable_all()
            .build()
            .context("build bluetooth runtime")?;

        let adapter = runtime.block_on(first_adapter());
        if let Err(err) = &adapter {
            warn!("bluetooth unavailable: {err}");
        }
        let shared = Arc::new(Shared {
            adapter: adapter.ok(),
            name_filter: name_filter.filter(|f| !f.trim().is_empty()),
            peripherals: Mutex::new(HashMap::new()),
            control: Mutex::new(None),
        });

        let (writer, frames) = mpsc::unbounded_channel();
        runtime.spawn(write_frames(Arc::clone(&shared), frames));
        match shared.adapter.clone() {
            Some(adapter) => {
                runtime.spawn(watch_adapter_state(adapter.clone(), sink.clone()));
                runtime.spawn(watch_central_events(adapter, Arc::clone(&shared), sink.clone()));
            }
            None => {
                sink.link(LinkEvent::Adapter(AdapterState::Unsupported));
            }
        }

        Ok(Self {
            runtime,
            shared,
            sink,
            writer,
        })
    }
}

impl LinkGateway for BtleLink {
    fn start_scan(&mut self) {
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            let result = match shared.adapter() {
                Ok(adapter) => adapter
                    .start_scan(ScanFilter::default())
                    .await
                    .map_err(|e| LinkError::Transport(e.to_string())),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => info!("scan started"),
                Err(err) => warn!("could not start scan: {err}"),
            }
        });
    }

    fn stop_scan(&mut self) {
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            if let Ok(adapter) = shared.adapter() {
                if let Err(err) = adapter.stop_scan().await {
                    debug!("stop scan: {err}");
                }
            }
        });
    }

    fn connect(&mut self, peer: &PeerId) {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink.clone();
        let peer = peer.clone();
        self.runtime.spawn(async move {
            let result = match shared.resolve(&peer).await {
                Ok(p) => match timeout(CONNECT_TIMEOUT, p.connect()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err(format!(
                        "timed out after {} s",
                        CONNECT_TIMEOUT.as_secs()
                    )),
                },
                Err(err) => Err(err.to_string()),
            };
            let event = match result {
                Ok(()) => LinkEvent::Connected(peer),
                Err(reason) => LinkEvent::ConnectFailed { peer, reason },
            };
            sink.link(event);
        });
    }

    fn discover_control_channel(&mut self, peer: &PeerId) {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink.clone();
        let peer = peer.clone();
        self.runtime.spawn(async move {
            let peripheral = match shared.resolve(&peer).await {
                Ok(p) => p,
                Err(err) => {
                    warn!("discovery on {peer}: {err}");
                    sink.link(LinkEvent::ChannelMissing(peer));
                    return;
                }
            };
            // BlueZ reports the connection before its GATT cache is populated.
            #[cfg(target_os = "linux")]
            tokio::time::sleep(Duration::from_millis(600)).await;

            match timeout(DISCOVERY_TIMEOUT, peripheral.discover_services()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("service discovery on {peer} failed: {err}");
                    sink.link(LinkEvent::ChannelMissing(peer));
                    return;
                }
                Err(_) => {
                    warn!(
                        "service discovery on {peer} timed out after {} s",
                        DISCOVERY_TIMEOUT.as_secs()
                    );
                    sink.link(LinkEvent::ChannelMissing(peer));
                    return;
                }
            }

            let control = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == CONTROL_CHARACTERISTIC);
            match control {
                Some(characteristic) => {
                    let handle = ChannelHandle {
                        peer: peer.clone(),
                        characteristic: characteristic.uuid,
                    };
                    shared.set_control(Some((peer, peripheral, characteristic)));
                    sink.link(LinkEvent::ChannelFound(handle));
                }
                None => {
                    sink.link(LinkEvent::ChannelMissing(peer));
                }
            };
        });
    }

    fn write(&mut self, channel: &ChannelHandle, frame: &Frame) {
        if self.writer.send((channel.clone(), *frame)).is_err() {
            warn!("bluetooth writer stopped, frame dropped");
        }
    }

    fn disconnect(&mut self, peer: &PeerId) {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink.clone();
        let peer = peer.clone();
        self.runtime.spawn(async move {
            shared.clear_control_for(&peer);
            let reason = match shared.resolve(&peer).await {
                Ok(p) => p.disconnect().await.err().map(|e| e.to_string()),
                Err(err) => Some(err.to_string()),
            };
            if let Some(reason) = &reason {
                debug!("disconnect {peer}: {reason}");
            }
            sink.link(LinkEvent::Disconnected { peer, reason: None });
        });
    }
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await.context("open bluetooth manager")?;
    let adapters = manager.adapters().await.context("list bluetooth adapters")?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::Error::new(LinkError::NoAdapter))
}

fn adapter_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// CoreBluetooth starts in an unknown state and only later reports power;
/// poll and forward changes.
async fn watch_adapter_state(adapter: Adapter, sink: EventSink) {
    let mut last: Option<AdapterState> = None;
    loop {
        let state = match adapter.adapter_state().await {
            Ok(state) => adapter_state(state),
            Err(err) => {
                warn!("adapter_state() failed: {err}");
                AdapterState::Unauthorized
            }
        };
        if last != Some(state) {
            info!("adapter state {state:?}");
            last = Some(state);
            if !sink.link(LinkEvent::Adapter(state)) {
                return;
            }
        }
        tokio::time::sleep(ADAPTER_POLL).await;
    }
}

async fn watch_central_events(adapter: Adapter, shared: Arc<Shared>, sink: EventSink) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(err) => {
            warn!("could not subscribe to adapter events: {err}");
            return;
        }
    };
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let props = peripheral.properties().await.ok().flatten();
                let name = props.as_ref().and_then(|p| p.local_name.clone());
                if !shared.matches_filter(name.as_deref()) {
                    continue;
                }
                let rssi = props.as_ref().and_then(|p| p.rssi);
                let peer = PeerId::new(id.to_string());
                if let Ok(mut map) = shared.peripherals.lock() {
                    map.insert(peer.clone(), peripheral);
                }
                let sent = sink.link(LinkEvent::PeerDiscovered {
                    id: peer,
                    name,
                    rssi,
                });
                if !sent {
                    return;
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                let peer = PeerId::new(id.to_string());
                shared.clear_control_for(&peer);
                info!("{peer} disconnected");
                sink.link(LinkEvent::Disconnected {
                    peer,
                    reason: Some("device went out of range or powered off".to_string()),
                });
            }
            _ => {}
        }
    }
}

/// Single ordered writer so frames reach the radio in the order the engine issued them.
async fn write_frames(
    shared: Arc<Shared>,
    mut frames: mpsc::UnboundedReceiver<(ChannelHandle, Frame)>,
) {
    while let Some((channel, frame)) = frames.recv().await {
        let target = shared.control.lock().ok().and_then(|slot| slot.clone());
        let Some((peer, peripheral, characteristic)) = target else {
            trace!("no control channel, dropping {frame}");
            continue;
        };
        if peer != channel.peer || characteristic.uuid != channel.characteristic {
            trace!("channel {} is stale, dropping {frame}", channel.peer);
            continue;
        }
        if let Err(err) = peripheral
            .write(&characteristic, frame.as_bytes(), WriteType::WithoutResponse)
            .await
        {
            warn!("write to {peer} failed: {err}");
        }
    }
}
