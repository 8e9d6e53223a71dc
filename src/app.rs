use std::io::BufWriter;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

use crate::color::Rgb;
use crate::connection::ConnectionState;
use crate::engine::Snapshot;
use crate::event::Command;
use crate::mode::Mode;
use crate::runtime::EngineHandle;
use crate::terminal::{TerminalGuard, draw_lines};

const FRAME: Duration = Duration::from_millis(50);
const BRIGHTNESS_STEP: u8 = 5;
/// Quiet time after the last brightness key before the final value is sent.
const BRIGHTNESS_SETTLE: Duration = Duration::from_millis(300);

const COLOR_PRESETS: [(&str, Rgb); 8] = [
    ("warm white", Rgb::new(255, 180, 100)),
    ("white", Rgb::WHITE),
    ("red", Rgb::new(255, 0, 0)),
    ("orange", Rgb::new(255, 120, 0)),
    ("green", Rgb::new(0, 255, 40)),
    ("cyan", Rgb::new(0, 220, 255)),
    ("blue", Rgb::new(0, 40, 255)),
    ("purple", Rgb::new(160, 0, 255)),
];

struct Ui {
    cursor: usize,
    show_help: bool,
    color_preset: usize,
    /// Brightness being dragged and when it last changed.
    pending_brightness: Option<(u8, Instant)>,
}

impl Ui {
    fn new() -> Self {
        Self {
            cursor: 0,
            show_help: false,
            color_preset: 0,
            pending_brightness: None,
        }
    }
}

pub fn run(engine: &EngineHandle) -> anyhow::Result<()> {
    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());
    let mut ui = Ui::new();

    loop {
        let snapshot = engine.snapshot();
        if !snapshot.peers.is_empty() {
            ui.cursor = ui.cursor.min(snapshot.peers.len() - 1);
        }

        let size = crossterm::terminal::size().context("get terminal size")?;
        let lines = if ui.show_help {
            help_lines()
        } else {
            hud_lines(&snapshot, &ui)
        };
        draw_lines(&mut out, &lines, size)?;

        if event::poll(FRAME)? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    if handle_key(k.code, k.modifiers, engine, &snapshot, &mut ui) {
                        flush_brightness(engine, &mut ui);
                        return Ok(());
                    }
                }
                Event::Resize(..) => {}
                _ => {}
            }
        }

        if let Some((_, at)) = ui.pending_brightness {
            if at.elapsed() >= BRIGHTNESS_SETTLE {
                flush_brightness(engine, &mut ui);
            }
        }
    }
}

fn flush_brightness(engine: &EngineHandle, ui: &mut Ui) {
    if let Some((percent, _)) = ui.pending_brightness.take() {
        engine.send(Command::SetBrightness(percent));
    }
}

fn handle_key(
    code: KeyCode,
    mods: KeyModifiers,
    engine: &EngineHandle,
    snapshot: &Snapshot,
    ui: &mut Ui,
) -> bool {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return true;
    }
    if ui.show_help {
        ui.show_help = false;
        return matches!(code, KeyCode::Char('q') | KeyCode::Char('Q'));
    }

    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Char('H') | KeyCode::F(1) => {
            ui.show_help = true;
        }
        KeyCode::Char('s') | KeyCode::Char('S') => {
            engine.send(Command::StartScan);
        }
        KeyCode::Char('x') | KeyCode::Char('X') => {
            engine.send(Command::StopScan);
        }
        KeyCode::Up => ui.cursor = ui.cursor.saturating_sub(1),
        KeyCode::Down => {
            if ui.cursor + 1 < snapshot.peers.len() {
                ui.cursor += 1;
            }
        }
        KeyCode::Enter => {
            if let Some(peer) = snapshot.peers.get(ui.cursor) {
                engine.send(Command::Connect(peer.id.clone()));
            }
        }
        KeyCode::Char('r') | KeyCode::Char('R') => {
            engine.send(Command::ReconnectLast);
        }
        KeyCode::Char('d') | KeyCode::Char('D') => {
            engine.send(Command::Disconnect);
        }
        KeyCode::Char('m') => {
            engine.send(Command::SetMode(snapshot.mode.next()));
        }
        KeyCode::Char('M') => {
            engine.send(Command::SetMode(snapshot.mode.prev()));
        }
        KeyCode::Char(c @ '0'..='9') => {
            let idx = c as usize - '0' as usize;
            if let Some(mode) = Mode::ALL.get(idx) {
                engine.send(Command::SetMode(*mode));
            }
        }
        KeyCode::Char('p') | KeyCode::Char('P') => {
            engine.send(Command::SetPower(!snapshot.device.power));
        }
        KeyCode::Left | KeyCode::Right => {
            let current = ui
                .pending_brightness
                .map(|(p, _)| p)
                .unwrap_or(snapshot.device.brightness);
            let next = if code == KeyCode::Right {
                current.saturating_add(BRIGHTNESS_STEP).min(100)
            } else {
                current.saturating_sub(BRIGHTNESS_STEP)
            };
            ui.pending_brightness = Some((next, Instant::now()));
            engine.send(Command::SetBrightnessLive(next));
        }
        KeyCode::Char('c') => {
            ui.color_preset = (ui.color_preset + 1) % COLOR_PRESETS.len();
            engine.send(Command::SetColor(COLOR_PRESETS[ui.color_preset].1));
        }
        KeyCode::Char('C') => {
            ui.color_preset = (ui.color_preset + COLOR_PRESETS.len() - 1) % COLOR_PRESETS.len();
            engine.send(Command::SetColor(COLOR_PRESETS[ui.color_preset].1));
        }
        KeyCode::Char(']') => {
            engine.send(Command::SelectDisplay(snapshot.display + 1));
        }
        KeyCode::Char('[') => {
            engine.send(Command::SelectDisplay(snapshot.display.saturating_sub(1)));
        }
        _ => {}
    }
    false
}

fn hud_lines(snapshot: &Snapshot, ui: &Ui) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "lightsync  |  link: {}  |  {}",
        snapshot.state,
        snapshot.adapter.describe()
    ));
    lines.push(format!("status: {}", snapshot.status));
    if let Some(fault) = &snapshot.fault {
        lines.push(format!("error: {fault}"));
    }
    lines.push(String::new());

    let target = snapshot
        .peer
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    let device = &snapshot.device;
    lines.push(format!(
        "device: {target}  power {}  brightness {}%  color {}  frames {}",
        if device.power { "ON" } else { "off" },
        device.brightness,
        device.color.to_hex(),
        snapshot.frames_sent,
    ));

    let modes = Mode::ALL
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if *m == snapshot.mode {
                format!("[{i} {}]", m.label())
            } else {
                format!(" {i} {} ", m.label())
            }
        })
        .collect::<Vec<_>>()
        .join("");
    lines.push(format!("mode: {modes}"));
    if snapshot.mode == Mode::ScreenMirror {
        lines.push(format!("display: {}", snapshot.display));
    }
    lines.push(String::new());

    match snapshot.state {
        ConnectionState::Scanning | ConnectionState::Idle if !snapshot.peers.is_empty() => {
            lines.push("devices (enter to connect):".to_string());
            for (i, peer) in snapshot.peers.iter().enumerate() {
                let marker = if i == ui.cursor { ">" } else { " " };
                let rssi = peer
                    .rssi
                    .map(|r| format!("{r} dBm"))
                    .unwrap_or_else(|| "? dBm".to_string());
                lines.push(format!(
                    " {marker} {}  ({})  {rssi}",
                    peer.display_name(),
                    peer.id
                ));
            }
        }
        ConnectionState::Idle => {
            if let Some(last) = &snapshot.reconnect_candidate {
                lines.push(format!("press r to reconnect to {last}"));
            }
        }
        _ => {}
    }

    lines.push(String::new());
    lines.push(
        "s scan  x stop  enter connect  r reconnect  d disconnect  m/M mode  p power  \
         ←/→ brightness  c color  h help  q quit"
            .to_string(),
    );
    lines
}

fn help_lines() -> Vec<String> {
    [
        "lightsync keys",
        "",
        "s        start scanning (stops after the scan timeout)",
        "x        stop scanning",
        "up/down  choose a device, enter to connect",
        "r        reconnect to the last used device",
        "d        disconnect (turns the light off first if configured)",
        "m / M    next / previous mode",
        "0-9      pick a mode directly",
        "p        toggle power",
        "←/→      brightness down/up (sent live, final value on release)",
        "c / C    next / previous color preset",
        "[ / ]    previous / next display for screen mirroring",
        "h or ?   toggle this help",
        "q or esc quit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
