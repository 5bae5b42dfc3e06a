//! Color palette for the console.
//!
//! Maps alacritty's [`Color`] values to GPUI [`Hsla`]:
//!
//! | Terminal color | Source |
//! |----------------|--------|
//! | `Named` 0-15 | ANSI table, overridable from [`ColorConfig`] |
//! | `Named` fg/bg/cursor | palette defaults, overridable from [`ColorConfig`] |
//! | `Named` dim variants | base color at 70% lightness |
//! | `Indexed` 16-231 | 6×6×6 cube with levels `0, 95, 135, 175, 215, 255` |
//! | `Indexed` 232-255 | grayscale ramp `#080808` to `#eeeeee` |
//! | `Spec` | 24-bit RGB as sent |
//!
//! Colors the remote program sets at runtime (OSC 4/10/11) take precedence
//! over the palette.

use crate::config::ColorConfig;
use alacritty_terminal::term::color::Colors;
use alacritty_terminal::vte::ansi::{Color, NamedColor, Rgb};
use gpui::Hsla;

const DEFAULT_ANSI: [u32; 16] = [
    0x000000, 0xcc0000, 0x4e9a06, 0xc4a000, 0x3465a4, 0x75507b, 0x06989a, 0xd3d7cf,
    0x555753, 0xef2929, 0x8ae234, 0xfce94f, 0x729fcf, 0xad7fa8, 0x34e2e2, 0xeeeeec,
];

const DEFAULT_FOREGROUND: u32 = 0xd4d4d4;
const DEFAULT_BACKGROUND: u32 = 0x1e1e1e;
const DEFAULT_CURSOR: u32 = 0xffffff;

const CUBE_LEVELS: [u32; 6] = [0, 95, 135, 175, 215, 255];

/// Parses `#rrggbb` into a packed `0xrrggbb` value.
pub fn parse_hex(value: &str) -> Option<u32> {
    let digits = value.strip_prefix('#')?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn hsla(packed: u32) -> Hsla {
    gpui::rgb(packed).into()
}

fn rgb_hsla(rgb: Rgb) -> Hsla {
    hsla(u32::from(rgb.r) << 16 | u32::from(rgb.g) << 8 | u32::from(rgb.b))
}

fn dimmed(mut color: Hsla) -> Hsla {
    color.l *= 0.7;
    color
}

#[derive(Debug, Clone)]
pub struct ColorPalette {
    /// All 256 indexed colors; the first 16 are the ANSI colors.
    indexed: [Hsla; 256],
    foreground: Hsla,
    background: Hsla,
    cursor: Hsla,
}

impl Default for ColorPalette {
    fn default() -> Self {
        let mut indexed = [Hsla::default(); 256];
        for (slot, packed) in indexed.iter_mut().zip(DEFAULT_ANSI) {
            *slot = hsla(packed);
        }

        let mut index = 16;
        for r in CUBE_LEVELS {
            for g in CUBE_LEVELS {
                for b in CUBE_LEVELS {
                    indexed[index] = hsla(r << 16 | g << 8 | b);
                    index += 1;
                }
            }
        }
        for step in 0..24u32 {
            let gray = 8 + step * 10;
            indexed[232 + step as usize] = hsla(gray << 16 | gray << 8 | gray);
        }

        Self {
            indexed,
            foreground: hsla(DEFAULT_FOREGROUND),
            background: hsla(DEFAULT_BACKGROUND),
            cursor: hsla(DEFAULT_CURSOR),
        }
    }
}

impl ColorPalette {
    /// The default palette with the configured overrides applied.
    ///
    /// Values that are not valid `#rrggbb` are skipped; the config loader
    /// rejects them before this point.
    pub fn from_config(config: &ColorConfig) -> Self {
        let mut palette = Self::default();
        let pick = |value: &Option<String>| value.as_deref().and_then(parse_hex).map(hsla);

        if let Some(color) = pick(&config.foreground) {
            palette.foreground = color;
        }
        if let Some(color) = pick(&config.background) {
            palette.background = color;
        }
        if let Some(color) = pick(&config.cursor) {
            palette.cursor = color;
        }
        for (slot, value) in palette.indexed.iter_mut().zip(&config.ansi).take(16) {
            if let Some(packed) = parse_hex(value) {
                *slot = hsla(packed);
            }
        }
        palette
    }

    pub fn resolve(&self, color: Color, runtime: &Colors) -> Hsla {
        match color {
            Color::Spec(rgb) => rgb_hsla(rgb),
            Color::Indexed(index) => match runtime[index as usize] {
                Some(rgb) => rgb_hsla(rgb),
                None => self.indexed[index as usize],
            },
            Color::Named(named) => match runtime[named] {
                Some(rgb) => rgb_hsla(rgb),
                None => self.named(named),
            },
        }
    }

    fn named(&self, named: NamedColor) -> Hsla {
        let index = named as usize;
        if index < 16 {
            return self.indexed[index];
        }
        match named {
            NamedColor::Foreground | NamedColor::BrightForeground => self.foreground,
            NamedColor::Background => self.background,
            NamedColor::Cursor => self.cursor,
            NamedColor::DimForeground => dimmed(self.foreground),
            NamedColor::DimBlack => dimmed(self.indexed[0]),
            NamedColor::DimRed => dimmed(self.indexed[1]),
            NamedColor::DimGreen => dimmed(self.indexed[2]),
            NamedColor::DimYellow => dimmed(self.indexed[3]),
            NamedColor::DimBlue => dimmed(self.indexed[4]),
            NamedColor::DimMagenta => dimmed(self.indexed[5]),
            NamedColor::DimCyan => dimmed(self.indexed[6]),
            NamedColor::DimWhite => dimmed(self.indexed[7]),
            _ => self.foreground,
        }
    }

    pub fn foreground(&self) -> Hsla {
        self.foreground
    }

    pub fn background(&self) -> Hsla {
        self.background
    }

    pub fn cursor(&self) -> Hsla {
        self.cursor
    }
}
