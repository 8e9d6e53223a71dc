//! The device control engine.
//!
//! [`Engine`] owns every piece of mutable state: connection, intended device
//! state, active mode and its live generator, and the timer table. It is driven
//! from a single thread (see [`crate::runtime`]) and every entry point takes the
//! current [`Instant`], so behaviour is fully deterministic under test.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::capture::{AudioCapture, ScreenCapture, ScreenParams, Subscription, SubscriptionId};
use crate::color::{Rgb, percent_to_level};
use crate::connection::{Connection, ConnectionState, DiscoveredPeer};
use crate::device::DeviceState;
use crate::effect::{EffectSlot, Intent};
use crate::event::{Command, EngineEvent, EventSink, Message};
use crate::filters::{BRIGHTNESS_THROTTLE, BrightnessThrottle, DEFAULT_COLOR_THRESHOLD};
use crate::link::{AdapterState, ChannelHandle, LinkEvent, LinkGateway, PeerId};
use crate::mode::Mode;
use crate::prefs::AppPrefs;
use crate::protocol;
use crate::timers::{TimerKind, TimerTable};

pub const SCAN_TIMEOUT: Duration = Duration::from_secs(15);
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(5);
pub const MIRROR_SETTLE: Duration = Duration::from_millis(250);
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scan_timeout: Duration,
    pub keep_alive_period: Duration,
    pub mirror_settle: Duration,
    pub disconnect_grace: Duration,
    pub brightness_throttle: Duration,
    pub color_threshold: u16,
    /// Connect as soon as the last used peer shows up in a scan.
    pub auto_reconnect: bool,
    /// Start scanning whenever the adapter becomes usable.
    pub auto_scan: bool,
    pub start_mode: Option<Mode>,
    pub display: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scan_timeout: SCAN_TIMEOUT,
            keep_alive_period: KEEP_ALIVE_PERIOD,
            mirror_settle: MIRROR_SETTLE,
            disconnect_grace: DISCONNECT_GRACE,
            brightness_throttle: BRIGHTNESS_THROTTLE,
            color_threshold: DEFAULT_COLOR_THRESHOLD,
            auto_reconnect: true,
            auto_scan: true,
            start_mode: None,
            display: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineFault {
    AdapterUnavailable(AdapterState),
    ConnectFailed(String),
    DiscoveryFailed,
    CaptureFailed(String),
}

impl fmt::Display for EngineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdapterUnavailable(state) => f.write_str(state.describe()),
            Self::ConnectFailed(reason) => write!(f, "Failed to connect: {reason}"),
            Self::DiscoveryFailed => f.write_str("Device not compatible"),
            Self::CaptureFailed(reason) => f.write_str(reason),
        }
    }
}

/// Read-only copy of engine state for the front end.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub state: ConnectionState,
    pub adapter: AdapterState,
    pub peers: Vec<DiscoveredPeer>,
    pub peer: Option<PeerId>,
    pub device: DeviceState,
    pub mode: Mode,
    pub status: String,
    pub fault: Option<EngineFault>,
    pub reconnect_candidate: Option<PeerId>,
    pub display: usize,
    pub frames_sent: u64,
}

/// Gateway, capture sources and the inbox they report back to.
pub struct Collaborators {
    pub link: Box<dyn LinkGateway>,
    pub screen: Box<dyn ScreenCapture>,
    pub audio: Box<dyn AudioCapture>,
    pub sink: EventSink,
}

/// Which parts of the intended state to re-send when falling back to Manual.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    color: bool,
    brightness: bool,
}

impl Baseline {
    const FULL: Self = Self {
        color: true,
        brightness: true,
    };
    const NONE: Self = Self {
        color: false,
        brightness: false,
    };
    const COLOR: Self = Self {
        color: true,
        brightness: false,
    };
    const BRIGHTNESS: Self = Self {
        color: false,
        brightness: true,
    };
}

/// Live handles of the active scene. Only one exists at a time.
struct LiveEffect {
    slot: EffectSlot,
    subscription: Option<Subscription>,
}

pub struct Engine {
    settings: EngineSettings,
    prefs: AppPrefs,
    prefs_path: Option<PathBuf>,
    link: Box<dyn LinkGateway>,
    screen: Box<dyn ScreenCapture>,
    audio: Box<dyn AudioCapture>,
    sink: EventSink,
    connection: Connection,
    device: DeviceState,
    mode: Mode,
    live: Option<LiveEffect>,
    timers: TimerTable,
    throttle: BrightnessThrottle,
    display: usize,
    next_subscription: u64,
    status: String,
    fault: Option<EngineFault>,
    reconnect_candidate: Option<PeerId>,
    frames_sent: u64,
}

impl Engine {
    pub fn new(settings: EngineSettings, prefs: AppPrefs, parts: Collaborators) -> Self {
        let reconnect_candidate = prefs.last_connected_peer.as_deref().map(PeerId::from);
        Self {
            throttle: BrightnessThrottle::new(settings.brightness_throttle),
            display: settings.display,
            settings,
            prefs,
            prefs_path: None,
            link: parts.link,
            screen: parts.screen,
            audio: parts.audio,
            sink: parts.sink,
            connection: Connection::new(),
            device: DeviceState::default(),
            mode: Mode::Manual,
            live: None,
            timers: TimerTable::new(),
            next_subscription: 0,
            status: AdapterState::Unknown.describe().to_string(),
            fault: None,
            reconnect_candidate,
            frames_sent: 0,
        }
    }

    /// Where `last_connected_peer` is written back. Without a path nothing is persisted.
    pub fn with_prefs_path(mut self, path: Option<PathBuf>) -> Self {
        self.prefs_path = path;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    pub fn peers(&self) -> &[DiscoveredPeer] {
        self.connection.peers()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn fault(&self) -> Option<&EngineFault> {
        self.fault.as_ref()
    }

    pub fn prefs(&self) -> &AppPrefs {
        &self.prefs
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn reconnect_candidate(&self) -> Option<&PeerId> {
        self.reconnect_candidate.as_ref()
    }

    pub fn active_subscription(&self) -> Option<SubscriptionId> {
        self.live
            .as_ref()
            .and_then(|live| live.subscription.as_ref())
            .map(Subscription::id)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// No transport connection exists and no teardown is pending.
    pub fn is_quiescent(&self) -> bool {
        !self.connection.state().has_peer() && !self.timers.is_armed(TimerKind::DisconnectGrace)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.connection.state(),
            adapter: self.connection.adapter(),
            peers: self.connection.peers().to_vec(),
            peer: self.connection.peer().cloned(),
            device: self.device,
            mode: self.mode,
            status: self.status.clone(),
            fault: self.fault.clone(),
            reconnect_candidate: self.reconnect_candidate.clone(),
            display: self.display,
            frames_sent: self.frames_sent,
        }
    }

    pub fn handle_message(&mut self, message: Message, now: Instant) {
        match message {
            Message::Command(command) => self.handle_command(command, now),
            Message::Event(event) => self.handle_event(event, now),
        }
    }

    pub fn handle_command(&mut self, command: Command, now: Instant) {
        debug!("command {command:?}");
        match command {
            Command::StartScan => self.start_scan(now),
            Command::StopScan => self.stop_scan(),
            Command::Connect(peer) => self.connect(peer, now),
            Command::ReconnectLast => self.reconnect_last(now),
            Command::Disconnect | Command::Shutdown => self.disconnect(now),
            Command::SetMode(mode) => self.set_mode(mode, now),
            Command::SetPower(on) => self.set_power(on, now),
            Command::SetBrightnessLive(percent) => self.set_brightness_live(percent, now),
            Command::SetBrightness(percent) => self.set_brightness(percent, now),
            Command::SetColor(color) => self.set_color(color, now),
            Command::SelectDisplay(index) => self.select_display(index, now),
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Link(event) => self.on_link_event(event, now),
            EngineEvent::ScreenColor { sub, color } => self.on_screen_color(sub, color, now),
            EngineEvent::AudioLevel { sub, level } => self.on_audio_level(sub, level),
            EngineEvent::CaptureFailed { sub, reason } => {
                if self.is_live_subscription(sub) {
                    self.capture_failed(reason, now);
                }
            }
        }
    }

    /// Runs every timer whose deadline has passed, earliest first.
    pub fn fire_due_timers(&mut self, now: Instant) {
        while let Some(kind) = self.timers.pop_due(now) {
            self.on_timer(kind, now);
        }
    }

    // ---- connection lifecycle ----

    pub fn start_scan(&mut self, now: Instant) {
        if !self.connection.begin_scan() {
            if self.connection.state() == ConnectionState::Disabled {
                self.status = self.connection.adapter().describe().to_string();
            }
            return;
        }
        self.fault = None;
        self.link.start_scan();
        self.timers
            .arm_once(TimerKind::ScanTimeout, now, self.settings.scan_timeout);
        self.status = "Scanning…".to_string();
    }

    pub fn stop_scan(&mut self) {
        if !self.connection.end_scan() {
            return;
        }
        self.timers.cancel(TimerKind::ScanTimeout);
        self.link.stop_scan();
        self.status = match self.connection.peers().len() {
            0 => "No devices found".to_string(),
            1 => "Found 1 device".to_string(),
            n => format!("Found {n} devices"),
        };
    }

    pub fn connect(&mut self, peer: PeerId, _now: Instant) {
        let was_scanning = self.connection.state() == ConnectionState::Scanning;
        if !self.connection.begin_connect(peer.clone()) {
            return;
        }
        if was_scanning {
            self.timers.cancel(TimerKind::ScanTimeout);
            self.link.stop_scan();
        }
        self.fault = None;
        self.status = format!("Connecting to {}…", self.peer_label(&peer));
        self.link.connect(&peer);
    }

    pub fn reconnect_last(&mut self, now: Instant) {
        match self.reconnect_candidate.clone() {
            Some(peer) => self.connect(peer, now),
            None => self.status = "No previous device to reconnect".to_string(),
        }
    }

    /// Two-phase when powering off on disconnect: the power-off frame goes out
    /// while still `Ready`, teardown and the transport disconnect follow after
    /// the grace delay.
    pub fn disconnect(&mut self, now: Instant) {
        let power_off = self.connection.is_ready() && self.prefs.power_off_disconnect;
        if power_off {
            self.apply_power(false);
        }
        if self.connection.begin_disconnect().is_none() {
            return;
        }
        self.timers.cancel(TimerKind::KeepAlive);
        self.status = "Disconnecting…".to_string();
        if power_off {
            self.timers
                .arm_once(TimerKind::DisconnectGrace, now, self.settings.disconnect_grace);
        } else {
            self.finish_disconnect();
        }
    }

    fn finish_disconnect(&mut self) {
        self.timers.cancel(TimerKind::DisconnectGrace);
        self.timers.cancel(TimerKind::KeepAlive);
        self.drop_to_manual();
        if let Some(peer) = self.connection.peer().cloned() {
            self.link.disconnect(&peer);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Adapter(state) if state.is_usable() => {
                if self.connection.adapter_on() {
                    self.fault = None;
                    self.status = "Bluetooth ready".to_string();
                    if self.settings.auto_scan {
                        self.start_scan(now);
                    }
                }
            }
            LinkEvent::Adapter(state) => self.adapter_lost(state),
            LinkEvent::PeerDiscovered { id, name, rssi } => {
                self.on_peer_discovered(id, name, rssi, now)
            }
            LinkEvent::Connected(peer) => {
                if !self.connection.connected(&peer) {
                    debug!("ignoring connect of {peer} while {}", self.connection.state());
                    return;
                }
                self.remember_peer(&peer);
                self.status = "Discovering services…".to_string();
                self.link.discover_control_channel(&peer);
            }
            LinkEvent::ConnectFailed { peer, reason } => {
                if !self.connection.connect_failed(&peer) {
                    return;
                }
                warn!("connect to {peer} failed: {reason}");
                let fault = EngineFault::ConnectFailed(reason);
                self.status = fault.to_string();
                self.fault = Some(fault);
            }
            LinkEvent::ChannelFound(handle) => self.on_channel_found(handle, now),
            LinkEvent::ChannelMissing(peer) => {
                if self.connection.state() != ConnectionState::Discovering
                    || self.connection.peer() != Some(&peer)
                {
                    return;
                }
                warn!("{peer} has no control characteristic");
                self.fault = Some(EngineFault::DiscoveryFailed);
                self.status = EngineFault::DiscoveryFailed.to_string();
            }
            LinkEvent::Disconnected { peer, reason } => self.on_disconnected(peer, reason),
        }
    }

    fn on_peer_discovered(
        &mut self,
        id: PeerId,
        name: Option<String>,
        rssi: Option<i16>,
        now: Instant,
    ) {
        if !self.connection.record_peer(id.clone(), name, rssi, now) {
            return;
        }
        let count = self.connection.peers().len();
        self.status = format!("Scanning… {count} found");

        if self.prefs.last_connected_peer.as_deref() == Some(id.as_str()) {
            self.reconnect_candidate = Some(id.clone());
            if self.settings.auto_reconnect {
                info!("last used device {id} is in range, reconnecting");
                self.connect(id, now);
            }
        }
    }

    fn on_channel_found(&mut self, handle: ChannelHandle, now: Instant) {
        if !self.connection.channel_found(handle) {
            return;
        }
        let label = self
            .connection
            .peer()
            .cloned()
            .map(|peer| self.peer_label(&peer))
            .unwrap_or_default();
        self.fault = None;
        self.status = format!("Connected to {label}");
        self.throttle.reset();

        if self.prefs.power_on_connect {
            self.apply_power(true);
        }
        self.send(protocol::Command::KeepAlive);
        self.timers
            .arm_periodic(TimerKind::KeepAlive, now, self.settings.keep_alive_period);

        if let Some(mode) = self.settings.start_mode {
            if self.mode == Mode::Manual {
                self.set_mode(mode, now);
            }
        }
    }

    fn on_disconnected(&mut self, peer: PeerId, reason: Option<String>) {
        let expected = self.connection.state() == ConnectionState::Disconnecting;
        if !self.connection.disconnected(&peer) {
            trace!("ignoring disconnect of {peer}");
            return;
        }
        self.timers.cancel(TimerKind::KeepAlive);
        self.timers.cancel(TimerKind::DisconnectGrace);
        self.drop_to_manual();
        if expected {
            self.status = "Disconnected".to_string();
        } else {
            let reason = reason.unwrap_or_else(|| "link dropped".to_string());
            warn!("lost connection to {peer}: {reason}");
            self.status = format!("Connection lost: {reason}");
        }
    }

    fn adapter_lost(&mut self, adapter: AdapterState) {
        if self.connection.state() == ConnectionState::Disabled {
            self.status = adapter.describe().to_string();
            if adapter != AdapterState::Unknown {
                self.fault = Some(EngineFault::AdapterUnavailable(adapter));
            }
            return;
        }
        warn!("adapter unavailable: {}", adapter.describe());
        self.stop_all_modes();
        self.mode = Mode::Manual;
        self.timers.clear();
        self.throttle.reset();
        if let Some(peer) = self.connection.adapter_lost(adapter) {
            self.link.disconnect(&peer);
        }
        self.device = DeviceState::default();
        self.status = adapter.describe().to_string();
        self.fault = Some(EngineFault::AdapterUnavailable(adapter));
    }

    fn remember_peer(&mut self, peer: &PeerId) {
        self.reconnect_candidate = Some(peer.clone());
        if self.prefs.last_connected_peer.as_deref() == Some(peer.as_str()) {
            return;
        }
        self.prefs.last_connected_peer = Some(peer.to_string());
        if let Err(err) =
            AppPrefs::store_last_connected_peer(self.prefs_path.as_deref(), peer.as_str())
        {
            warn!("could not persist last connected device: {err}");
        }
    }

    fn peer_label(&self, peer: &PeerId) -> String {
        self.connection
            .find_peer(peer)
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| peer.to_string())
    }

    // ---- mode engine ----

    pub fn set_mode(&mut self, mode: Mode, now: Instant) {
        self.switch_mode(mode, now, Baseline::FULL);
    }

    pub fn set_power(&mut self, on: bool, now: Instant) {
        let baseline = if on { Baseline::FULL } else { Baseline::NONE };
        self.exit_scene(now, baseline);
        self.apply_power(on);
    }

    pub fn set_color(&mut self, color: Rgb, now: Instant) {
        self.exit_scene(now, Baseline::BRIGHTNESS);
        self.device.color = color;
        self.send(protocol::Command::Color(color));
    }

    /// Always forwarded; restarts the live throttle interval.
    pub fn set_brightness(&mut self, percent: u8, now: Instant) {
        self.exit_scene(now, Baseline::COLOR);
        self.device.set_brightness(percent);
        self.throttle.record(now);
        self.send(protocol::Command::Brightness(percent_to_level(
            self.device.brightness,
        )));
    }

    /// Updates the intended state immediately, forwards at most once per
    /// throttle interval.
    pub fn set_brightness_live(&mut self, percent: u8, now: Instant) {
        self.exit_scene(now, Baseline::COLOR);
        self.device.set_brightness(percent);
        if self.throttle.try_pass(now) {
            self.send(protocol::Command::Brightness(percent_to_level(
                self.device.brightness,
            )));
        } else {
            trace!("live brightness {percent}% throttled");
        }
    }

    pub fn select_display(&mut self, index: usize, now: Instant) {
        if self.display == index {
            return;
        }
        self.display = index;
        info!("display {index} selected");
        if self.mode != Mode::ScreenMirror {
            return;
        }
        if let Some(live) = self.live.as_mut() {
            if let Some(sub) = live.subscription.take() {
                sub.cancel();
            }
        }
        self.timers
            .arm_once(TimerKind::MirrorSettle, now, self.settings.mirror_settle);
    }

    /// Touching a manual control leaves whatever scene is running.
    fn exit_scene(&mut self, now: Instant, baseline: Baseline) {
        if self.mode.is_scene() {
            self.switch_mode(Mode::Manual, now, baseline);
        }
    }

    fn switch_mode(&mut self, mode: Mode, now: Instant, baseline: Baseline) {
        if mode == self.mode {
            debug!("mode {mode} already active");
            return;
        }
        info!("mode {} -> {}", self.mode, mode);
        self.stop_all_modes();
        self.mode = mode;

        if mode.is_scene() && !self.device.power {
            self.apply_power(true);
        }

        let Some(slot) =
            EffectSlot::for_mode(mode, &self.device, self.settings.color_threshold)
        else {
            self.reassert(baseline);
            return;
        };
        let period = slot.period();
        self.live = Some(LiveEffect {
            slot,
            subscription: None,
        });

        match mode {
            Mode::ScreenMirror => {
                self.status = "Starting screen mirror…".to_string();
                self.timers
                    .arm_once(TimerKind::MirrorSettle, now, self.settings.mirror_settle);
            }
            Mode::MusicVisualizer => self.start_audio_stream(now),
            _ => {
                if let Some(period) = period {
                    self.timers.arm_periodic(TimerKind::Effect, now, period);
                }
            }
        }
    }

    /// Cancels the active generator's timers and stream. Safe from any mode.
    fn stop_all_modes(&mut self) {
        self.timers.cancel(TimerKind::Effect);
        self.timers.cancel(TimerKind::MirrorSettle);
        if let Some(live) = self.live.take() {
            debug!("stopping {}", live.slot.mode());
            if let Some(sub) = live.subscription {
                sub.cancel();
            }
        }
    }

    /// Back to Manual without sending anything.
    fn drop_to_manual(&mut self) {
        self.stop_all_modes();
        self.mode = Mode::Manual;
    }

    fn reassert(&mut self, baseline: Baseline) {
        if !self.device.power {
            return;
        }
        if baseline.color {
            self.send(protocol::Command::Color(self.device.color));
        }
        if baseline.brightness {
            self.send(protocol::Command::Brightness(percent_to_level(
                self.device.brightness,
            )));
        }
    }

    fn allocate_subscription(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }

    fn is_live_subscription(&self, sub: SubscriptionId) -> bool {
        self.active_subscription() == Some(sub)
    }

    fn attach_subscription(&mut self, sub: Subscription) {
        match self.live.as_mut() {
            Some(live) => live.subscription = Some(sub),
            None => sub.cancel(),
        }
    }

    fn start_screen_stream(&mut self, now: Instant) {
        let pending = self
            .live
            .as_ref()
            .is_some_and(|live| live.subscription.is_none());
        if self.mode != Mode::ScreenMirror || !pending {
            return;
        }
        let id = self.allocate_subscription();
        let params = ScreenParams {
            display: self.display,
            width: self.prefs.capture_width,
            height: self.prefs.capture_height,
            fps: self.prefs.capture_fps,
        };
        match self.screen.start(id, &params, self.sink.clone()) {
            Ok(sub) => {
                info!("screen capture {id} started on display {}", self.display);
                self.attach_subscription(sub);
                self.status = format!("Mirroring display {}", self.display);
            }
            Err(err) => self.capture_failed(format!("Screen capture failed: {err}"), now),
        }
    }

    fn start_audio_stream(&mut self, now: Instant) {
        let id = self.allocate_subscription();
        match self.audio.start(id, self.sink.clone()) {
            Ok(sub) => {
                info!("audio capture {id} started");
                self.attach_subscription(sub);
                self.status = "Listening to audio".to_string();
            }
            Err(err) => self.capture_failed(format!("Audio capture failed: {err}"), now),
        }
    }

    /// The owning generator aborts and control falls back to Manual.
    fn capture_failed(&mut self, reason: String, now: Instant) {
        warn!("{reason}");
        self.switch_mode(Mode::Manual, now, Baseline::FULL);
        self.status = reason.clone();
        self.fault = Some(EngineFault::CaptureFailed(reason));
    }

    fn on_screen_color(&mut self, sub: SubscriptionId, color: Option<Rgb>, now: Instant) {
        if !self.is_live_subscription(sub) {
            trace!("stale screen sample from {sub}");
            return;
        }
        let Some(color) = color else {
            self.capture_failed("Screen capture stopped".to_string(), now);
            return;
        };
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let intent = live.slot.on_screen_color(color, &mut self.device);
        self.dispatch(intent);
    }

    fn on_audio_level(&mut self, sub: SubscriptionId, level: f32) {
        if !self.is_live_subscription(sub) {
            trace!("stale audio sample from {sub}");
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let intent = live.slot.on_audio_level(level, &mut self.device);
        self.dispatch(intent);
    }

    fn tick_effect(&mut self) {
        let Some(live) = self.live.as_mut() else {
            self.timers.cancel(TimerKind::Effect);
            return;
        };
        let intent = live.slot.tick(&mut self.device);
        self.dispatch(intent);
    }

    fn on_timer(&mut self, kind: TimerKind, now: Instant) {
        trace!("timer {kind:?}");
        match kind {
            TimerKind::KeepAlive => {
                if self.connection.is_ready() {
                    self.send(protocol::Command::KeepAlive);
                } else {
                    self.timers.cancel(TimerKind::KeepAlive);
                }
            }
            TimerKind::ScanTimeout => {
                info!("scan timed out");
                self.stop_scan();
            }
            TimerKind::Effect => self.tick_effect(),
            TimerKind::MirrorSettle => self.start_screen_stream(now),
            TimerKind::DisconnectGrace => self.finish_disconnect(),
        }
    }

    // ---- link writes ----

    fn apply_power(&mut self, on: bool) {
        self.device.power = on;
        self.send(protocol::Command::Power(on));
    }

    fn dispatch(&mut self, intent: Intent) {
        if let Some(on) = intent.power {
            self.send(protocol::Command::Power(on));
        }
        if let Some(level) = intent.level {
            self.send(protocol::Command::Brightness(level));
        }
        if let Some(color) = intent.color {
            self.send(protocol::Command::Color(color));
        }
    }

    /// Writes are only issued while `Ready`; anything else is dropped, never queued.
    fn send(&mut self, command: protocol::Command) -> bool {
        let Some(channel) = self.connection.channel() else {
            trace!(
                "dropping {command:?} while {}",
                self.connection.state()
            );
            return false;
        };
        let frame = command.encode();
        trace!("write {command:?}: {frame}");
        self.link.write(channel, &frame);
        self.frames_sent += 1;
        true
    }
}
