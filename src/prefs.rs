use std::fmt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "lightsync";

/// Settings that survive restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPrefs {
    pub capture_width: u32,
    pub capture_height: u32,
    pub capture_fps: u32,
    pub power_on_connect: bool,
    pub power_off_disconnect: bool,
    pub last_connected_peer: Option<String>,
}

impl Default for AppPrefs {
    fn default() -> Self {
        Self {
            capture_width: 64,
            capture_height: 36,
            capture_fps: 10,
            power_on_connect: true,
            power_off_disconnect: true,
            last_connected_peer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefsError {
    Io(String),
    Parse { line: usize, message: String },
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
        }
    }
}

impl std::error::Error for PrefsError {}

impl AppPrefs {
    pub fn load(path: Option<&Path>) -> Result<Self, PrefsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(PrefsError::Io(err.to_string())),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, PrefsError> {
        let mut prefs = Self::default();
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(PrefsError::Parse {
                    line: line_no,
                    message: "expected <key>=<value>".to_string(),
                });
            };
            let key = key_raw.trim();
            let value = value_raw.trim();
            match key {
                "capture_width" => prefs.capture_width = parse_dimension(key, value, line_no)?,
                "capture_height" => prefs.capture_height = parse_dimension(key, value, line_no)?,
                "capture_fps" => prefs.capture_fps = parse_dimension(key, value, line_no)?,
                "power_on_connect" => prefs.power_on_connect = parse_flag(key, value, line_no)?,
                "power_off_disconnect" => {
                    prefs.power_off_disconnect = parse_flag(key, value, line_no)?
                }
                "last_connected_peer" => {
                    prefs.last_connected_peer = (!value.is_empty()).then(|| value.to_string());
                }
                _ => {}
            }
        }
        Ok(prefs)
    }

    pub fn render(&self) -> String {
        format!(
            "# lightsync prefs v1\n\
             capture_width={}\n\
             capture_height={}\n\
             capture_fps={}\n\
             power_on_connect={}\n\
             power_off_disconnect={}\n\
             last_connected_peer={}\n",
            self.capture_width,
            self.capture_height,
            self.capture_fps,
            self.power_on_connect,
            self.power_off_disconnect,
            self.last_connected_peer.as_deref().unwrap_or(""),
        )
    }

    pub fn save(&self, path: Option<&Path>) -> Result<(), PrefsError> {
        let Some(path) = path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.render()).map_err(|e| PrefsError::Io(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| PrefsError::Io(e.to_string()))
    }

    /// Rewrites only `last_connected_peer` in the file at `path`, keeping every
    /// other key as stored on disk. A file that fails to parse is left untouched.
    pub fn store_last_connected_peer(path: Option<&Path>, peer: &str) -> Result<(), PrefsError> {
        if path.is_none() {
            return Ok(());
        }
        let mut on_disk = Self::load(path)?;
        if on_disk.last_connected_peer.as_deref() == Some(peer) {
            return Ok(());
        }
        on_disk.last_connected_peer = Some(peer.to_string());
        on_disk.save(path)
    }
}

pub fn prefs_storage_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("prefs.txt"))
}

pub fn default_log_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("lightsync.log"))
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join(APP_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".config").join(APP_DIR))
}

fn parse_dimension(key: &str, raw: &str, line: usize) -> Result<u32, PrefsError> {
    match raw.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(PrefsError::Parse {
            line,
            message: format!("{key} must be a positive integer"),
        }),
    }
}

fn parse_flag(key: &str, raw: &str, line: usize) -> Result<bool, PrefsError> {
    parse_bool(raw).ok_or_else(|| PrefsError::Parse {
        line,
        message: format!("{key} must be true/false"),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
