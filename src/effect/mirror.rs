use super::Intent;
use crate::color::{Rgb, percent_to_level};
use crate::device::DeviceState;
use crate::filters::ColorChangeFilter;

/// Below this derived brightness the fixture is switched off.
pub const DARK_PERCENT: u8 = 3;
/// Brightness changes of this many percent or less are not forwarded.
const BRIGHTNESS_DEADBAND: u8 = 2;

/// Follows the screen's average color.
#[derive(Debug, Clone)]
pub struct ScreenMirror {
    colors: ColorChangeFilter,
    last_percent: Option<u8>,
}

impl ScreenMirror {
    pub fn new(color_threshold: u16) -> Self {
        Self {
            colors: ColorChangeFilter::new(color_threshold),
            last_percent: None,
        }
    }

    pub fn derived_percent(color: Rgb) -> u8 {
        ((f32::from(color.max_channel()) / 255.0) * 100.0).round() as u8
    }

    pub fn on_color(&mut self, color: Rgb, device: &mut DeviceState) -> Intent {
        let percent = Self::derived_percent(color);

        if percent < DARK_PERCENT {
            if !device.power {
                return Intent::NONE;
            }
            device.power = false;
            device.brightness = 0;
            device.color = Rgb::BLACK;
            self.last_percent = Some(0);
            self.colors.mark(Rgb::BLACK);
            return Intent::power(false);
        }

        let mut intent = Intent::NONE;
        if !device.power {
            device.power = true;
            intent.power = Some(true);
            self.last_percent = None;
            self.colors.reset();
        }

        if self
            .last_percent
            .is_none_or(|last| last.abs_diff(percent) > BRIGHTNESS_DEADBAND)
        {
            self.last_percent = Some(percent);
            device.set_brightness(percent);
            intent.level = Some(percent_to_level(percent));
        }

        if self.colors.accept(color) {
            device.color = color;
            intent.color = Some(color);
        }
        intent
    }
}
