use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use lightsync::capture::{
    AudioCapture, CaptureError, ScreenCapture, ScreenParams, Subscription, SubscriptionId,
};
use lightsync::color::{Rgb, percent_to_level};
use lightsync::config::Config;
use lightsync::connection::ConnectionState;
use lightsync::engine::{Collaborators, Engine, EngineFault, EngineSettings};
use lightsync::event::{self, EngineEvent, EventSink, Message};
use lightsync::link::{
    AdapterState, CONTROL_CHARACTERISTIC, ChannelHandle, LinkEvent, LinkGateway, PeerId,
};
use lightsync::mode::Mode;
use lightsync::prefs::AppPrefs;
use lightsync::protocol::{Command, Frame};
use lightsync::runtime;
use lightsync::timers::TimerKind;

const PEER: &str = "light-1";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartScan,
    StopScan,
    Connect(PeerId),
    Discover(PeerId),
    Write(Command),
    Disconnect(PeerId),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Call>>>);

impl Recorder {
    fn push(&self, call: Call) {
        self.0.lock().expect("recorder lock").push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.0.lock().expect("recorder lock").clone()
    }

    fn writes(&self) -> Vec<Command> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    fn clear(&self) {
        self.0.lock().expect("recorder lock").clear();
    }
}

struct FakeLink(Recorder);

impl LinkGateway for FakeLink {
    fn start_scan(&mut self) {
        self.0.push(Call::StartScan);
    }

    fn stop_scan(&mut self) {
        self.0.push(Call::StopScan);
    }

    fn connect(&mut self, peer: &PeerId) {
        self.0.push(Call::Connect(peer.clone()));
    }

    fn discover_control_channel(&mut self, peer: &PeerId) {
        self.0.push(Call::Discover(peer.clone()));
    }

    fn write(&mut self, channel: &ChannelHandle, frame: &Frame) {
        assert_eq!(channel.characteristic, CONTROL_CHARACTERISTIC);
        let cmd = Command::decode(frame).expect("engine only writes known frames");
        self.0.push(Call::Write(cmd));
    }

    fn disconnect(&mut self, peer: &PeerId) {
        self.0.push(Call::Disconnect(peer.clone()));
    }
}

/// Records started subscriptions and counts cancellations.
#[derive(Clone, Default)]
struct CaptureLog {
    started: Arc<Mutex<Vec<(SubscriptionId, Option<ScreenParams>)>>>,
    cancelled: Arc<AtomicUsize>,
    fail: bool,
}

impl CaptureLog {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn started(&self) -> Vec<(SubscriptionId, Option<ScreenParams>)> {
        self.started.lock().expect("capture lock").clone()
    }

    fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn open(
        &self,
        id: SubscriptionId,
        params: Option<ScreenParams>,
    ) -> Result<Subscription, CaptureError> {
        if self.fail {
            return Err(CaptureError::Unsupported("test capture"));
        }
        self.started.lock().expect("capture lock").push((id, params));
        let cancelled = Arc::clone(&self.cancelled);
        Ok(Subscription::new(id, move || {
            cancelled.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

struct FakeScreen(CaptureLog);

impl ScreenCapture for FakeScreen {
    fn start(
        &mut self,
        id: SubscriptionId,
        params: &ScreenParams,
        _sink: EventSink,
    ) -> Result<Subscription, CaptureError> {
        self.0.open(id, Some(*params))
    }
}

struct FakeAudio(CaptureLog);

impl AudioCapture for FakeAudio {
    fn start(&mut self, id: SubscriptionId, _sink: EventSink) -> Result<Subscription, CaptureError> {
        self.0.open(id, None)
    }
}

struct Harness {
    engine: Engine,
    link: Recorder,
    screen: CaptureLog,
    audio: CaptureLog,
    t0: Instant,
    _inbox: Receiver<Message>,
}

impl Harness {
    fn new() -> Self {
        Self::build(EngineSettings::default(), AppPrefs::default(), CaptureLog::default())
    }

    fn build(settings: EngineSettings, prefs: AppPrefs, audio: CaptureLog) -> Self {
        let (sink, inbox) = EventSink::channel();
        let link = Recorder::default();
        let screen = CaptureLog::default();
        let parts = Collaborators {
            link: Box::new(FakeLink(link.clone())),
            screen: Box::new(FakeScreen(screen.clone())),
            audio: Box::new(FakeAudio(audio.clone())),
            sink,
        };
        Self {
            engine: Engine::new(settings, prefs, parts),
            link,
            screen,
            audio,
            t0: Instant::now(),
            _inbox: inbox,
        }
    }

    /// Persist `last_connected_peer` to `path` on connect.
    fn persisting_to(self, path: PathBuf) -> Self {
        Self {
            engine: self.engine.with_prefs_path(Some(path)),
            ..self
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn link_event(&mut self, event: LinkEvent, ms: u64) {
        let now = self.at(ms);
        self.engine.handle_event(EngineEvent::Link(event), now);
    }

    fn tick(&mut self, ms: u64) {
        let now = self.at(ms);
        self.engine.fire_due_timers(now);
    }

    /// Adapter on, scan, connect and resolve the control channel at t0.
    fn ready(mut self) -> Self {
        let peer = PeerId::from(PEER);
        self.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
        self.link_event(
            LinkEvent::PeerDiscovered {
                id: peer.clone(),
                name: Some("Desk Lamp".to_string()),
                rssi: Some(-50),
            },
            0,
        );
        let t0 = self.t0;
        self.engine.connect(peer.clone(), t0);
        self.link_event(LinkEvent::Connected(peer.clone()), 0);
        self.link_event(
            LinkEvent::ChannelFound(ChannelHandle {
                peer,
                characteristic: CONTROL_CHARACTERISTIC,
            }),
            0,
        );
        assert_eq!(self.engine.state(), ConnectionState::Ready);
        self.link.clear();
        self
    }
}

fn peer() -> PeerId {
    PeerId::from(PEER)
}

fn scratch_prefs(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("lightsync-engine-{}-{name}", std::process::id()))
        .join("prefs.txt")
}

fn remove_scratch(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn adapter_power_on_starts_scan_and_timeout_stops_it() {
    let mut h = Harness::new();
    assert_eq!(h.engine.state(), ConnectionState::Disabled);

    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    assert_eq!(h.engine.state(), ConnectionState::Scanning);
    assert_eq!(h.link.calls(), vec![Call::StartScan]);

    h.tick(14_999);
    assert_eq!(h.engine.state(), ConnectionState::Scanning);
    h.tick(15_000);
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.link.calls(), vec![Call::StartScan, Call::StopScan]);
    assert_eq!(h.engine.status(), "No devices found");
}

#[test]
fn scanning_collects_peers_and_updates_rssi() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    for rssi in [-70, -55] {
        h.link_event(
            LinkEvent::PeerDiscovered {
                id: peer(),
                name: None,
                rssi: Some(rssi),
            },
            10,
        );
    }
    h.link_event(
        LinkEvent::PeerDiscovered {
            id: PeerId::from("light-2"),
            name: Some("Shelf".to_string()),
            rssi: None,
        },
        20,
    );
    let peers = h.engine.peers();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].rssi, Some(-55));
    assert_eq!(peers[1].display_name(), "Shelf");

    h.engine.stop_scan();
    assert_eq!(h.engine.status(), "Found 2 devices");
    assert!(!h.engine.timers().is_armed(TimerKind::ScanTimeout));
}

#[test]
fn adapter_unavailable_before_start_is_reported() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::Unauthorized), 0);
    assert_eq!(h.engine.state(), ConnectionState::Disabled);
    assert_eq!(
        h.engine.fault(),
        Some(&EngineFault::AdapterUnavailable(AdapterState::Unauthorized))
    );

    let now = h.at(10);
    h.engine.start_scan(now);
    assert!(h.link.calls().is_empty());
}

#[test]
fn ready_powers_on_and_sends_keep_alive_immediately() {
    let mut h = Harness::new();
    let peer = peer();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    let t0 = h.t0;
    h.engine.connect(peer.clone(), t0);
    h.link_event(LinkEvent::Connected(peer.clone()), 5);
    assert_eq!(h.engine.state(), ConnectionState::Discovering);
    h.link_event(
        LinkEvent::ChannelFound(ChannelHandle {
            peer: peer.clone(),
            characteristic: CONTROL_CHARACTERISTIC,
        }),
        10,
    );

    assert_eq!(
        h.link.calls(),
        vec![
            Call::StartScan,
            Call::StopScan,
            Call::Connect(peer.clone()),
            Call::Discover(peer.clone()),
            Call::Write(Command::Power(true)),
            Call::Write(Command::KeepAlive),
        ]
    );
    assert!(h.engine.device().power);
    assert_eq!(h.engine.reconnect_candidate(), Some(&peer));
    assert_eq!(h.engine.prefs().last_connected_peer.as_deref(), Some(PEER));
    assert_eq!(h.engine.status(), "Connected to light-1");
}

#[test]
fn keep_alive_repeats_every_period_while_ready() {
    let mut h = Harness::new().ready();
    h.tick(4_999);
    assert!(h.link.writes().is_empty());
    h.tick(5_000);
    assert_eq!(h.link.writes(), vec![Command::KeepAlive]);
    h.tick(10_000);
    assert_eq!(h.link.writes(), vec![Command::KeepAlive, Command::KeepAlive]);
}

#[test]
fn connect_is_a_no_op_while_a_connection_is_in_progress() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    let t0 = h.t0;
    h.engine.connect(peer(), t0);
    h.engine.connect(PeerId::from("light-2"), t0);
    let connects = h
        .link
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Connect(_)))
        .count();
    assert_eq!(connects, 1);
    assert_eq!(h.engine.state(), ConnectionState::Connecting);

    let mut h = Harness::new().ready();
    let now = h.at(100);
    h.engine.connect(PeerId::from("light-2"), now);
    assert!(h.link.calls().is_empty());
    assert_eq!(h.engine.state(), ConnectionState::Ready);
}

#[test]
fn connect_failure_returns_to_idle_with_fault() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    let t0 = h.t0;
    h.engine.connect(peer(), t0);
    h.link_event(
        LinkEvent::ConnectFailed {
            peer: peer(),
            reason: "timed out".to_string(),
        },
        10_000,
    );
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(
        h.engine.fault(),
        Some(&EngineFault::ConnectFailed("timed out".to_string()))
    );
    assert_eq!(h.engine.status(), "Failed to connect: timed out");
}

#[test]
fn missing_control_channel_is_a_discovery_fault() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    let t0 = h.t0;
    h.engine.connect(peer(), t0);
    h.link_event(LinkEvent::Connected(peer()), 5);
    h.link_event(LinkEvent::ChannelMissing(peer()), 10);
    assert_eq!(h.engine.fault(), Some(&EngineFault::DiscoveryFailed));
    assert!(h.link.writes().is_empty());
}

#[test]
fn auto_reconnect_connects_to_last_used_peer_when_seen() {
    let prefs = AppPrefs {
        last_connected_peer: Some(PEER.to_string()),
        ..AppPrefs::default()
    };
    let mut h = Harness::build(EngineSettings::default(), prefs, CaptureLog::default());
    assert_eq!(h.engine.reconnect_candidate(), Some(&peer()));

    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    h.link_event(
        LinkEvent::PeerDiscovered {
            id: peer(),
            name: None,
            rssi: Some(-60),
        },
        300,
    );
    assert_eq!(h.engine.state(), ConnectionState::Connecting);
    assert_eq!(
        h.link.calls(),
        vec![Call::StartScan, Call::StopScan, Call::Connect(peer())]
    );
}

#[test]
fn reconnect_last_without_history_only_sets_status() {
    let mut h = Harness::new();
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    h.link.clear();
    let now = h.at(1);
    h.engine.reconnect_last(now);
    assert!(h.link.calls().is_empty());
    assert_eq!(h.engine.status(), "No previous device to reconnect");
}

#[test]
fn set_color_sends_one_color_frame_and_stops_scene() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Rainbow, now);
    assert!(h.engine.timers().is_armed(TimerKind::Effect));

    let now = h.at(50);
    h.engine.set_color(Rgb::new(10, 20, 30), now);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert!(!h.engine.timers().is_armed(TimerKind::Effect));

    let colors: Vec<_> = h
        .link
        .writes()
        .into_iter()
        .filter(|c| matches!(c, Command::Color(_)))
        .collect();
    assert_eq!(colors, vec![Command::Color(Rgb::new(10, 20, 30))]);
    assert_eq!(h.engine.device().color, Rgb::new(10, 20, 30));

    h.link.clear();
    h.tick(1_000);
    assert!(h.link.writes().is_empty());
}

#[test]
fn rainbow_ticks_on_its_period() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Rainbow, now);
    assert!(h.link.writes().is_empty());

    h.tick(99);
    assert!(h.link.writes().is_empty());
    h.tick(100);
    let writes = h.link.writes();
    assert_eq!(writes.len(), 1);
    assert!(matches!(writes[0], Command::Color(_)));
    // procedural scenes do not overwrite the manual color
    assert_eq!(h.engine.device().color, Rgb::WHITE);
}

#[test]
fn duplicate_set_mode_does_not_restart() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Breathe, now);
    let deadline = h.engine.timers().deadline(TimerKind::Effect);
    let now = h.at(60);
    h.engine.set_mode(Mode::Breathe, now);
    assert_eq!(h.engine.timers().deadline(TimerKind::Effect), deadline);
    assert_eq!(h.engine.mode(), Mode::Breathe);
}

#[test]
fn scene_entry_powers_on_and_captures_base_color() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_color(Rgb::new(0, 0, 255), now);
    h.engine.set_power(false, now);
    h.link.clear();

    let now = h.at(10);
    h.engine.set_mode(Mode::Pulse, now);
    assert_eq!(h.link.writes(), vec![Command::Power(true)]);

    h.tick(60);
    let writes = h.link.writes();
    assert_eq!(writes.len(), 3);
    assert!(matches!(writes[1], Command::Brightness(_)));
    assert_eq!(writes[2], Command::Color(Rgb::new(0, 0, 255)));
}

#[test]
fn strobe_alternates_power_frames() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Strobe, now);
    h.tick(100);
    h.tick(200);
    assert_eq!(
        h.link.writes(),
        vec![Command::Power(false), Command::Power(true)]
    );
}

#[test]
fn leaving_a_scene_for_manual_reasserts_state() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Aurora, now);
    let now = h.at(30);
    h.engine.set_mode(Mode::Manual, now);
    assert_eq!(
        h.link.writes(),
        vec![Command::Color(Rgb::WHITE), Command::Brightness(254)]
    );
}

#[test]
fn live_brightness_is_throttled_but_final_always_sent() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_brightness_live(50, now);
    let now = h.at(50);
    h.engine.set_brightness_live(60, now);
    assert_eq!(h.engine.device().brightness, 60);
    assert_eq!(h.link.writes(), vec![Command::Brightness(percent_to_level(50))]);

    let now = h.at(60);
    h.engine.set_brightness(60, now);
    assert_eq!(
        h.link.writes(),
        vec![
            Command::Brightness(percent_to_level(50)),
            Command::Brightness(percent_to_level(60)),
        ]
    );

    // the final write restarted the interval
    let now = h.at(120);
    h.engine.set_brightness_live(70, now);
    assert_eq!(h.link.writes().len(), 2);
    let now = h.at(160);
    h.engine.set_brightness_live(75, now);
    assert_eq!(h.link.writes().len(), 3);
}

#[test]
fn writes_are_dropped_while_not_ready() {
    let mut h = Harness::new();
    let now = h.at(0);
    h.engine.set_color(Rgb::new(1, 2, 3), now);
    h.engine.set_power(true, now);
    h.engine.set_brightness(40, now);
    assert!(h.link.writes().is_empty());
    assert_eq!(h.engine.frames_sent(), 0);
    assert_eq!(h.engine.device().color, Rgb::new(1, 2, 3));
    assert_eq!(h.engine.device().brightness, 40);
}

#[test]
fn disconnect_powers_off_then_tears_down_after_grace() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Rainbow, now);
    let now = h.at(20);
    h.engine.disconnect(now);

    assert_eq!(h.engine.state(), ConnectionState::Disconnecting);
    assert_eq!(h.link.calls(), vec![Call::Write(Command::Power(false))]);
    assert!(!h.engine.timers().is_armed(TimerKind::KeepAlive));

    h.tick(169);
    assert_eq!(h.link.calls().len(), 1);
    h.tick(170);
    assert_eq!(
        h.link.calls(),
        vec![Call::Write(Command::Power(false)), Call::Disconnect(peer())]
    );
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert!(!h.engine.timers().is_armed(TimerKind::Effect));

    h.link_event(
        LinkEvent::Disconnected {
            peer: peer(),
            reason: None,
        },
        200,
    );
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.engine.status(), "Disconnected");
    assert!(h.engine.is_quiescent());
}

#[test]
fn disconnect_without_power_off_is_immediate() {
    let prefs = AppPrefs {
        power_off_disconnect: false,
        ..AppPrefs::default()
    };
    let mut h = Harness::build(EngineSettings::default(), prefs, CaptureLog::default()).ready();
    let now = h.at(0);
    h.engine.disconnect(now);
    assert_eq!(h.link.calls(), vec![Call::Disconnect(peer())]);
    assert!(!h.engine.timers().is_armed(TimerKind::DisconnectGrace));
}

#[test]
fn unexpected_disconnect_falls_back_to_manual() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::Candlelight, now);
    h.link_event(
        LinkEvent::Disconnected {
            peer: peer(),
            reason: Some("supervision timeout".to_string()),
        },
        10,
    );
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert_eq!(h.engine.status(), "Connection lost: supervision timeout");
    assert_eq!(h.engine.timers().armed_count(), 0);

    h.tick(6_000);
    assert!(h.link.writes().is_empty());
}

#[test]
fn disconnect_of_another_peer_is_ignored() {
    let mut h = Harness::new().ready();
    h.link_event(
        LinkEvent::Disconnected {
            peer: PeerId::from("someone-else"),
            reason: None,
        },
        10,
    );
    assert_eq!(h.engine.state(), ConnectionState::Ready);
}

#[test]
fn adapter_loss_tears_everything_down() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::MusicVisualizer, now);
    assert_eq!(h.audio.started().len(), 1);

    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOff), 10);
    assert_eq!(h.engine.state(), ConnectionState::Disabled);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert_eq!(h.audio.cancelled(), 1);
    assert_eq!(h.engine.timers().armed_count(), 0);
    assert!(h.engine.peers().is_empty());
    assert!(h.link.calls().contains(&Call::Disconnect(peer())));
    assert_eq!(
        h.engine.fault(),
        Some(&EngineFault::AdapterUnavailable(AdapterState::PoweredOff))
    );
    assert!(h.link.writes().is_empty());
}

#[test]
fn screen_mirror_starts_after_settle_and_powers_off_on_dark() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::ScreenMirror, now);
    assert!(h.screen.started().is_empty());

    h.tick(250);
    let started = h.screen.started();
    assert_eq!(started.len(), 1);
    let (sub, params) = started[0];
    assert_eq!(
        params,
        Some(ScreenParams {
            display: 0,
            width: 64,
            height: 36,
            fps: 10,
        })
    );
    assert_eq!(h.engine.active_subscription(), Some(sub));

    let now = h.at(300);
    h.engine.handle_event(
        EngineEvent::ScreenColor {
            sub,
            color: Some(Rgb::new(2, 2, 2)),
        },
        now,
    );
    assert_eq!(h.link.writes(), vec![Command::Power(false)]);

    let now = h.at(400);
    h.engine.handle_event(
        EngineEvent::ScreenColor {
            sub,
            color: Some(Rgb::new(1, 1, 1)),
        },
        now,
    );
    assert_eq!(h.link.writes(), vec![Command::Power(false)]);
    assert!(!h.engine.device().power);
}

#[test]
fn screen_mirror_forwards_bright_frames() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::ScreenMirror, now);
    h.tick(250);
    let sub = h.engine.active_subscription().expect("mirror subscription");

    let color = Rgb::new(200, 100, 50);
    let now = h.at(300);
    h.engine
        .handle_event(EngineEvent::ScreenColor { sub, color: Some(color) }, now);
    assert_eq!(
        h.link.writes(),
        vec![
            Command::Brightness(percent_to_level(78)),
            Command::Color(color),
        ]
    );
}

#[test]
fn stale_samples_are_ignored() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::MusicVisualizer, now);
    let old = h.engine.active_subscription().expect("audio subscription");

    let now = h.at(10);
    h.engine.set_mode(Mode::Rainbow, now);
    assert_eq!(h.audio.cancelled(), 1);
    assert_eq!(h.engine.active_subscription(), None);
    h.link.clear();

    let now = h.at(20);
    h.engine
        .handle_event(EngineEvent::AudioLevel { sub: old, level: 1.0 }, now);
    h.engine.handle_event(
        EngineEvent::ScreenColor {
            sub: SubscriptionId(999),
            color: Some(Rgb::WHITE),
        },
        now,
    );
    h.engine.handle_event(
        EngineEvent::CaptureFailed {
            sub: old,
            reason: "late".to_string(),
        },
        now,
    );
    assert!(h.link.writes().is_empty());
    assert_eq!(h.engine.mode(), Mode::Rainbow);
    assert_eq!(h.engine.fault(), None);
}

#[test]
fn music_levels_drive_brightness_and_color() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::MusicVisualizer, now);
    let sub = h.engine.active_subscription().expect("audio subscription");
    assert_eq!(h.engine.status(), "Listening to audio");

    let now = h.at(40);
    h.engine
        .handle_event(EngineEvent::AudioLevel { sub, level: 1.0 }, now);
    assert_eq!(
        h.link.writes(),
        vec![Command::Brightness(254), Command::Color(Rgb::new(255, 0, 0))]
    );
    assert_eq!(h.engine.device().brightness, 100);
}

#[test]
fn audio_start_failure_falls_back_to_manual() {
    let mut h =
        Harness::build(EngineSettings::default(), AppPrefs::default(), CaptureLog::failing())
            .ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::MusicVisualizer, now);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert!(matches!(h.engine.fault(), Some(EngineFault::CaptureFailed(_))));
    assert!(h.engine.status().starts_with("Audio capture failed"));
    assert_eq!(
        h.link.writes(),
        vec![Command::Color(Rgb::WHITE), Command::Brightness(254)]
    );
}

#[test]
fn capture_failure_event_cancels_stream_and_reverts() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::MusicVisualizer, now);
    let sub = h.engine.active_subscription().expect("audio subscription");

    let now = h.at(500);
    h.engine.handle_event(
        EngineEvent::CaptureFailed {
            sub,
            reason: "device unplugged".to_string(),
        },
        now,
    );
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert_eq!(h.audio.cancelled(), 1);
    assert_eq!(
        h.engine.fault(),
        Some(&EngineFault::CaptureFailed("device unplugged".to_string()))
    );
}

#[test]
fn screen_stream_ending_reverts_to_manual() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::ScreenMirror, now);
    h.tick(250);
    let sub = h.engine.active_subscription().expect("mirror subscription");

    let now = h.at(400);
    h.engine
        .handle_event(EngineEvent::ScreenColor { sub, color: None }, now);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert_eq!(h.engine.status(), "Screen capture stopped");
}

#[test]
fn selecting_a_display_restarts_the_mirror_stream() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::ScreenMirror, now);
    h.tick(250);

    let now = h.at(1_000);
    h.engine.select_display(1, now);
    assert_eq!(h.screen.cancelled(), 1);
    assert_eq!(h.engine.active_subscription(), None);

    h.tick(1_250);
    let started = h.screen.started();
    assert_eq!(started.len(), 2);
    assert_eq!(started[1].1.map(|p| p.display), Some(1));
    assert_ne!(started[0].0, started[1].0);
}

#[test]
fn start_mode_applies_once_ready() {
    let settings = EngineSettings {
        start_mode: Some(Mode::Rainbow),
        ..EngineSettings::default()
    };
    let h = Harness::build(settings, AppPrefs::default(), CaptureLog::default()).ready();
    assert_eq!(h.engine.mode(), Mode::Rainbow);
    assert!(h.engine.timers().is_armed(TimerKind::Effect));
}

#[test]
fn commands_route_through_handle_command() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine
        .handle_command(event::Command::SetMode(Mode::Thunderstorm), now);
    assert_eq!(h.engine.mode(), Mode::Thunderstorm);
    h.engine.handle_command(event::Command::SetPower(false), now);
    assert_eq!(h.engine.mode(), Mode::Manual);
    assert_eq!(h.link.writes().last(), Some(&Command::Power(false)));

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Ready);
    assert_eq!(snapshot.peer, Some(peer()));
    assert!(!snapshot.device.power);
}

#[test]
fn runtime_thread_processes_events_and_shuts_down() {
    let (sink, inbox) = EventSink::channel();
    let link = Recorder::default();
    let parts = Collaborators {
        link: Box::new(FakeLink(link.clone())),
        screen: Box::new(FakeScreen(CaptureLog::default())),
        audio: Box::new(FakeAudio(CaptureLog::default())),
        sink: sink.clone(),
    };
    let engine = Engine::new(EngineSettings::default(), AppPrefs::default(), parts);
    let engine_thread = runtime::spawn(engine, sink.clone(), inbox).expect("spawn engine");
    let handle = engine_thread.handle();

    assert!(sink.link(LinkEvent::Adapter(AdapterState::PoweredOn)));
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.snapshot().state != ConnectionState::Scanning {
        assert!(Instant::now() < deadline, "engine never started scanning");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(handle.send(event::Command::StopScan));
    engine_thread.shutdown();

    assert_eq!(link.calls(), vec![Call::StartScan, Call::StopScan]);
}

#[test]
fn auto_scan_off_waits_in_idle_for_explicit_scan() {
    let settings = EngineSettings {
        auto_scan: false,
        ..EngineSettings::default()
    };
    let mut h = Harness::build(settings, AppPrefs::default(), CaptureLog::default());
    h.link_event(LinkEvent::Adapter(AdapterState::PoweredOn), 0);
    assert_eq!(h.engine.state(), ConnectionState::Idle);
    assert!(h.link.calls().is_empty());

    let now = h.at(10);
    h.engine.start_scan(now);
    assert_eq!(h.engine.state(), ConnectionState::Scanning);
    assert_eq!(h.link.calls(), vec![Call::StartScan]);
}

#[test]
fn leaving_screen_mirror_before_settle_never_subscribes() {
    let mut h = Harness::new().ready();
    let now = h.at(0);
    h.engine.set_mode(Mode::ScreenMirror, now);
    let now = h.at(100);
    h.engine.set_mode(Mode::Rainbow, now);
    assert_eq!(h.engine.timers().deadline(TimerKind::MirrorSettle), None);

    h.tick(400);
    assert!(h.screen.started().is_empty());
    assert_eq!(h.engine.active_subscription(), None);
    assert_eq!(h.engine.mode(), Mode::Rainbow);
}

#[test]
fn connect_persists_peer_without_unsaved_overrides() {
    let path = scratch_prefs("overrides");
    AppPrefs::default().save(Some(&path)).expect("seed prefs");

    let cfg = Config::try_parse_from(["lightsync", "--capture-fps", "30"]).expect("flags parse");
    let mut prefs = AppPrefs::load(Some(&path)).expect("load prefs");
    assert!(cfg.apply_overrides(&mut prefs));
    assert_eq!(prefs.capture_fps, 30);

    let h = Harness::build(EngineSettings::default(), prefs, CaptureLog::default())
        .persisting_to(path.clone())
        .ready();
    assert_eq!(h.engine.prefs().capture_fps, 30);

    let on_disk = AppPrefs::load(Some(&path)).expect("reload prefs");
    assert_eq!(on_disk.capture_fps, AppPrefs::default().capture_fps);
    assert_eq!(on_disk.last_connected_peer.as_deref(), Some(PEER));
    remove_scratch(&path);
}

#[test]
fn connect_leaves_unparseable_prefs_file_alone() {
    let path = scratch_prefs("malformed");
    let dir = path.parent().expect("scratch dir");
    std::fs::create_dir_all(dir).expect("create scratch dir");
    let text = "capture_fps=fast\n";
    std::fs::write(&path, text).expect("write prefs");

    let h = Harness::new().persisting_to(path.clone()).ready();
    assert_eq!(h.engine.reconnect_candidate(), Some(&peer()));

    let kept = std::fs::read_to_string(&path).expect("read prefs");
    assert_eq!(kept, text);
    remove_scratch(&path);
}
