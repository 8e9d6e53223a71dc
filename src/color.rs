/// Highest brightness level the fixture accepts on the wire.
pub const MAX_DEVICE_LEVEL: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Hue wraps into 0..1; saturation and value are clamped.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let h = fract01(h) * 6.0;
        let i = h.floor() as i32;
        let f = h - i as f32;
        let p = v * (1.0 - s);
        let q = v * (1.0 - f * s);
        let t = v * (1.0 - (1.0 - f) * s);
        let (r, g, b) = match i.rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0) as u8,
            g: (g.clamp(0.0, 1.0) * 255.0) as u8,
            b: (b.clamp(0.0, 1.0) * 255.0) as u8,
        }
    }

    pub fn max_channel(self) -> u8 {
        self.r.max(self.g).max(self.b)
    }

    /// Sum of absolute per-channel differences (0..=765).
    pub fn manhattan_distance(self, other: Self) -> u16 {
        u16::from(self.r.abs_diff(other.r))
            + u16::from(self.g.abs_diff(other.g))
            + u16::from(self.b.abs_diff(other.b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// `round(percent / 100 * 254)`, percent clamped to 0..=100.
pub fn percent_to_level(percent: u8) -> u8 {
    let pct = f32::from(percent.min(100));
    ((pct / 100.0) * f32::from(MAX_DEVICE_LEVEL)).round() as u8
}

pub fn level_to_percent(level: u8) -> u8 {
    let level = f32::from(level.min(MAX_DEVICE_LEVEL));
    ((level / f32::from(MAX_DEVICE_LEVEL)) * 100.0).round() as u8
}

/// Maps a 0..1 multiplier onto the device level range, rounding to nearest.
pub fn unit_to_level(unit: f32) -> u8 {
    (unit.clamp(0.0, 1.0) * f32::from(MAX_DEVICE_LEVEL)).round() as u8
}

fn fract01(x: f32) -> f32 {
    let f = x - x.floor();
    if f < 0.0 { f + 1.0 } else { f }
}
