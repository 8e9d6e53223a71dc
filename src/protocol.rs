//! Wire format of the fixture's control characteristic.
//!
//! Every write is a fixed 20-byte frame: head byte, command byte, up to 17
//! payload bytes, zero padding, and a trailing XOR of the first 19 bytes.

use std::fmt;

use crate::color::{MAX_DEVICE_LEVEL, Rgb};

pub const FRAME_LEN: usize = 20;
pub const MAX_PAYLOAD: usize = FRAME_LEN - 3;

pub const HEAD_COMMAND: u8 = 0x33;
pub const HEAD_KEEP_ALIVE: u8 = 0xAA;

pub const CMD_POWER: u8 = 0x01;
pub const CMD_BRIGHTNESS: u8 = 0x04;
pub const CMD_COLOR: u8 = 0x05;
pub const CMD_KEEP_ALIVE: u8 = 0x01;

/// Sub-mode byte selecting a plain RGB color.
pub const COLOR_MODE_MANUAL: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    PayloadTooLong { len: usize },
    BadLength { len: usize },
    BadChecksum { expected: u8, found: u8 },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLong { len } => {
                write!(f, "payload of {len} bytes exceeds {MAX_PAYLOAD}")
            }
            Self::BadLength { len } => write!(f, "frame must be {FRAME_LEN} bytes, got {len}"),
            Self::BadChecksum { expected, found } => {
                write!(f, "checksum mismatch: expected {expected:#04x}, found {found:#04x}")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub fn new(head: u8, cmd: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLong { len: payload.len() });
        }
        Ok(Self::seal(head, cmd, payload))
    }

    fn assemble<const N: usize>(head: u8, cmd: u8, payload: [u8; N]) -> Self {
        const { assert!(N <= MAX_PAYLOAD) };
        Self::seal(head, cmd, &payload)
    }

    fn seal(head: u8, cmd: u8, payload: &[u8]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = head;
        bytes[1] = cmd;
        bytes[2..2 + payload.len()].copy_from_slice(payload);
        bytes[FRAME_LEN - 1] = checksum(&bytes[..FRAME_LEN - 1]);
        Self(bytes)
    }

    /// Validates length and checksum of raw bytes read back from a fixture or a log.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| ProtocolError::BadLength { len: bytes.len() })?;
        let expected = checksum(&bytes[..FRAME_LEN - 1]);
        let found = bytes[FRAME_LEN - 1];
        if expected != found {
            return Err(ProtocolError::BadChecksum { expected, found });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn head(&self) -> u8 {
        self.0[0]
    }

    pub fn cmd(&self) -> u8 {
        self.0[1]
    }

    pub fn payload(&self) -> &[u8] {
        &self.0[2..FRAME_LEN - 1]
    }

    pub fn checksum(&self) -> u8 {
        self.0[FRAME_LEN - 1]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Logical commands the fixture understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Power(bool),
    /// Device level; values above 254 are clamped when encoding.
    Brightness(u8),
    Color(Rgb),
    KeepAlive,
}

impl Command {
    pub fn encode(self) -> Frame {
        match self {
            Self::Power(on) => Frame::assemble(HEAD_COMMAND, CMD_POWER, [u8::from(on)]),
            Self::Brightness(level) => {
                Frame::assemble(HEAD_COMMAND, CMD_BRIGHTNESS, [level.min(MAX_DEVICE_LEVEL)])
            }
            Self::Color(c) => {
                Frame::assemble(HEAD_COMMAND, CMD_COLOR, [COLOR_MODE_MANUAL, c.r, c.g, c.b])
            }
            Self::KeepAlive => Frame::assemble(HEAD_KEEP_ALIVE, CMD_KEEP_ALIVE, [0x01]),
        }
    }

    /// Inverse of [`Command::encode`] for frames this crate produces.
    pub fn decode(frame: &Frame) -> Option<Self> {
        let p = frame.payload();
        match (frame.head(), frame.cmd()) {
            (HEAD_KEEP_ALIVE, CMD_KEEP_ALIVE) => Some(Self::KeepAlive),
            (HEAD_COMMAND, CMD_POWER) => Some(Self::Power(p[0] != 0)),
            (HEAD_COMMAND, CMD_BRIGHTNESS) => Some(Self::Brightness(p[0])),
            (HEAD_COMMAND, CMD_COLOR) if p[0] == COLOR_MODE_MANUAL => {
                Some(Self::Color(Rgb::new(p[1], p[2], p[3])))
            }
            _ => None,
        }
    }
}
