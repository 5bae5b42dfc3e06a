//! Console configuration.
//!
//! Loaded from an optional TOML file; every field has a default, so an empty
//! file (or none at all) is a valid configuration.
//!
//! ```toml
//! endpoint = "wss://api.example.com/terminal"
//! font_family = "JetBrains Mono"
//! font_size = 13.0
//! padding = 8.0
//!
//! [colors]
//! background = "#1a1b26"
//! foreground = "#a9b1d6"
//! ansi = ["#15161e", "#f7768e"]
//! ```

use crate::colors::parse_hex;
use crate::surface::{CellSize, SurfaceOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    /// WebSocket endpoint of the remote shell service.
    pub endpoint: String,

    pub font_family: String,

    /// Font size in pixels.
    pub font_size: f32,

    /// Extra line height for fonts with tall glyphs.
    pub line_height_multiplier: f32,

    /// Padding around the grid in pixels.
    pub padding: f32,

    pub scrollback: usize,

    /// How long a fullscreen toggle animates before the grid is refitted.
    pub layout_settle_ms: u64,

    pub colors: ColorConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:3001/terminal".to_string(),
            font_family: "monospace".to_string(),
            font_size: 14.0,
            line_height_multiplier: 1.0,
            padding: 8.0,
            scrollback: 10_000,
            layout_settle_ms: 300,
            colors: ColorConfig::default(),
        }
    }
}

/// `#rrggbb` overrides applied on top of the default palette.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub cursor: Option<String>,

    /// Up to 16 ANSI colors, starting at black.
    pub ansi: Vec<String>,
}

impl ConsoleConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Loads `path` if given, the defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = url::Url::parse(&self.endpoint)
            .map(|url| url.scheme().to_string())
            .map_err(|err| invalid("endpoint", err.to_string()))?;
        if scheme != "ws" && scheme != "wss" {
            return Err(invalid("endpoint", format!("scheme `{scheme}` is not ws or wss")));
        }
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(invalid("font_size", "must be positive".to_string()));
        }
        if !(self.line_height_multiplier.is_finite() && self.line_height_multiplier >= 0.5) {
            return Err(invalid("line_height_multiplier", "must be at least 0.5".to_string()));
        }
        if !(self.padding.is_finite() && self.padding >= 0.0) {
            return Err(invalid("padding", "must not be negative".to_string()));
        }

        let named = [
            ("colors.foreground", &self.colors.foreground),
            ("colors.background", &self.colors.background),
            ("colors.cursor", &self.colors.cursor),
        ];
        for (field, value) in named {
            if let Some(value) = value {
                check_hex(field, value)?;
            }
        }
        if self.colors.ansi.len() > 16 {
            return Err(invalid("colors.ansi", "at most 16 colors".to_string()));
        }
        for value in &self.colors.ansi {
            check_hex("colors.ansi", value)?;
        }
        Ok(())
    }

    /// Surface options before the font cell has been measured.
    pub fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            cell: CellSize::new(
                self.font_size * 0.6,
                self.font_size * 1.4 * self.line_height_multiplier,
            ),
            padding: self.padding,
            scrollback: self.scrollback,
        }
    }

    pub fn layout_settle(&self) -> Duration {
        Duration::from_millis(self.layout_settle_ms)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn check_hex(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match parse_hex(value) {
        Some(_) => Ok(()),
        None => Err(invalid(field, format!("`{value}` is not a #rrggbb color"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(ConsoleConfig::parse("").unwrap(), ConsoleConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r##"
endpoint = "wss://api.example.com/terminal"
font_size = 13.0
layout_settle_ms = 150

[colors]
background = "#1a1b26"
ansi = ["#15161e", "#f7768e"]
"##
        )
        .unwrap();

        let config = ConsoleConfig::load(file.path()).unwrap();

        assert_eq!(config.endpoint, "wss://api.example.com/terminal");
        assert_eq!(config.font_size, 13.0);
        assert_eq!(config.font_family, "monospace");
        assert_eq!(config.layout_settle(), Duration::from_millis(150));
        assert_eq!(config.colors.background.as_deref(), Some("#1a1b26"));
        assert_eq!(config.colors.ansi.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");

        assert!(matches!(
            ConsoleConfig::load(&path),
            Err(ConfigError::Read { .. })
        ));
        assert_eq!(
            ConsoleConfig::load_or_default(None).unwrap(),
            ConsoleConfig::default()
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            ConsoleConfig::parse("fontsize = 12.0"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation() {
        let cases = [
            (r#"endpoint = "http://example.com""#, "endpoint"),
            ("font_size = 0.0", "font_size"),
            ("line_height_multiplier = 0.1", "line_height_multiplier"),
            ("padding = -1.0", "padding"),
            ("[colors]\ncursor = \"red\"", "colors.cursor"),
            ("[colors]\nansi = [\"#12345\"]", "colors.ansi"),
        ];
        for (text, expected) in cases {
            match ConsoleConfig::parse(text) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected, "{text}"),
                other => panic!("{text}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_surface_options() {
        let config = ConsoleConfig {
            font_size: 10.0,
            line_height_multiplier: 1.5,
            padding: 4.0,
            scrollback: 500,
            ..ConsoleConfig::default()
        };
        let options = config.surface_options();

        assert!((options.cell.width - 6.0).abs() < 1e-4);
        assert!((options.cell.height - 21.0).abs() < 1e-4);
        assert_eq!(options.padding, 4.0);
        assert_eq!(options.scrollback, 500);
    }
}
