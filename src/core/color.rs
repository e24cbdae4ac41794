//! Group color palette.
//!
//! Every group carries one of a small set of presets. Each preset pairs the
//! tab color with a contrasting color for the tab's close button.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Alpha applied to a group color when it tints an editor tab.
pub const TAB_TINT_ALPHA: u8 = 50;

/// 24-bit RGB color, stored as `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const WHITE: Rgb = Rgb(0xFFFFFF);

    pub fn red(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub fn green(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub fn blue(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn to_hex(self) -> String {
        format!("#{:06X}", self.0 & 0xFFFFFF)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Semi-transparent tab background derived from a group color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TabTint {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

pub fn tab_tint(color: Rgb) -> TabTint {
    TabTint {
        red: color.red(),
        green: color.green(),
        blue: color.blue(),
        alpha: TAB_TINT_ALPHA,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPreset {
    Blue,
    Green,
    Orange,
    Purple,
    Red,
    Cyan,
}

impl ColorPreset {
    pub const ALL: [ColorPreset; 6] = [
        ColorPreset::Blue,
        ColorPreset::Green,
        ColorPreset::Orange,
        ColorPreset::Purple,
        ColorPreset::Red,
        ColorPreset::Cyan,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ColorPreset::Blue => "Blue",
            ColorPreset::Green => "Green",
            ColorPreset::Orange => "Orange",
            ColorPreset::Purple => "Purple",
            ColorPreset::Red => "Red",
            ColorPreset::Cyan => "Cyan",
        }
    }

    pub fn main_color(self) -> Rgb {
        match self {
            ColorPreset::Blue => Rgb(0x4A90D9),
            ColorPreset::Green => Rgb(0x50A14F),
            ColorPreset::Orange => Rgb(0xD98C3F),
            ColorPreset::Purple => Rgb(0x9C6BBF),
            ColorPreset::Red => Rgb(0xD75F5F),
            ColorPreset::Cyan => Rgb(0x4DB6AC),
        }
    }

    pub fn close_button_color(self) -> Rgb {
        match self {
            ColorPreset::Orange | ColorPreset::Cyan => Rgb(0x2B2B2B),
            _ => Rgb::WHITE,
        }
    }

    pub fn find_by_rgb(color: Rgb) -> Option<ColorPreset> {
        Self::ALL.into_iter().find(|p| p.main_color() == color)
    }

    /// Case-insensitive lookup by display name.
    pub fn from_name(name: &str) -> Option<ColorPreset> {
        let wanted = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.display_name().eq_ignore_ascii_case(wanted))
    }

    /// Close button color for an arbitrary group color; white when the color
    /// is not one of the presets.
    pub fn close_button_color_for(color: Rgb) -> Rgb {
        Self::find_by_rgb(color)
            .map(ColorPreset::close_button_color)
            .unwrap_or(Rgb::WHITE)
    }
}

/// Round-robin default color assignment for new groups.
///
/// Owned by whoever creates groups; starts at the first preset and is not
/// persisted.
#[derive(Debug, Default, Clone)]
pub struct ColorRotation {
    next: usize,
}

impl ColorRotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: usize) -> Self {
        Self { next }
    }

    pub fn next_preset(&mut self) -> ColorPreset {
        let preset = ColorPreset::ALL[self.next % ColorPreset::ALL.len()];
        self.next = self.next.wrapping_add(1);
        preset
    }
}
