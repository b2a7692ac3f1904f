//! Legacy `.conf` reader and TOML conversion.
//!
//! The pre-TOML format is line-based `key value` pairs with `#` comments:
//!
//! ```text
//! fps 144
//! shift 250
//! duration 1.2
//! easing expo
//! layer far.png 0.2 1.0
//! layer near.png 1.0 0.9 2.5
//! ```
//!
//! The runtime is TOML-only; this module exists so `convert-config` (and the
//! startup conversion offer) can migrate old installs.

use std::path::Path;

use crate::file::{FileConfig, GlobalSection, LayerEntry, RenderSection};
use crate::ConfigError;

/// Lines longer than this are skipped whole; the parser continues cleanly
/// past the overflow.
const MAX_LINE_LEN: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyConfig {
    pub fps: Option<u32>,
    pub shift: Option<f32>,
    pub duration: Option<f32>,
    pub easing: Option<String>,
    pub vsync: Option<bool>,
    pub idle_poll_rate: Option<f32>,
    pub scale: Option<f32>,
    pub layers: Vec<LegacyLayer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyLayer {
    pub image: String,
    pub shift: f32,
    pub opacity: f32,
    pub blur: f32,
}

impl LegacyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parses leniently: unknown keys and malformed lines are skipped, so a
    /// hand-edited config never hard-fails conversion.
    pub fn parse(text: &str) -> Self {
        let mut config = LegacyConfig::default();
        for raw_line in text.lines() {
            if raw_line.len() > MAX_LINE_LEN {
                tracing::warn!(len = raw_line.len(), "skipping overlong config line");
                continue;
            }
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            match key {
                "layer" => {
                    let Some(image) = tokens.next() else {
                        continue;
                    };
                    let shift = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(1.0);
                    let opacity = tokens
                        .next()
                        .and_then(|t| t.parse().ok())
                        .unwrap_or(1.0_f32)
                        .clamp(0.0, 1.0);
                    let blur = tokens
                        .next()
                        .and_then(|t| t.parse().ok())
                        .unwrap_or(0.0_f32)
                        .max(0.0);
                    config.layers.push(LegacyLayer {
                        image: image.to_string(),
                        shift,
                        opacity,
                        blur,
                    });
                }
                "fps" => config.fps = tokens.next().and_then(|t| t.parse().ok()),
                "shift" => config.shift = tokens.next().and_then(|t| t.parse().ok()),
                "duration" => config.duration = tokens.next().and_then(|t| t.parse().ok()),
                "easing" => config.easing = tokens.next().map(str::to_string),
                "vsync" => {
                    config.vsync = tokens
                        .next()
                        .and_then(|t| t.parse::<i32>().ok())
                        .map(|v| v != 0)
                }
                "idle_poll_rate" => {
                    config.idle_poll_rate = tokens.next().and_then(|t| t.parse().ok())
                }
                "scale" => config.scale = tokens.next().and_then(|t| t.parse().ok()),
                other => {
                    tracing::debug!(key = other, "ignoring unknown legacy config key");
                }
            }
        }
        config
    }
}

fn strip_comment(line: &str) -> &str {
    // `#` starts a comment at beginning of line or after whitespace.
    let bytes = line.as_bytes();
    for (index, &byte) in bytes.iter().enumerate() {
        if byte == b'#' && (index == 0 || bytes[index - 1].is_ascii_whitespace()) {
            return &line[..index];
        }
    }
    line
}

/// Converts a parsed legacy config into the TOML model.
pub fn convert_legacy(legacy: &LegacyConfig) -> FileConfig {
    let global = GlobalSection {
        fps: legacy.fps,
        shift: legacy.shift,
        duration: legacy.duration,
        easing: legacy.easing.clone(),
        vsync: legacy.vsync,
        idle_poll_rate: legacy.idle_poll_rate,
        ..GlobalSection::default()
    };
    let layers = legacy
        .layers
        .iter()
        .enumerate()
        .map(|(index, layer)| LayerEntry {
            image: layer.image.clone(),
            shift: layer.shift,
            opacity: layer.opacity,
            blur: layer.blur,
            tint: None,
            tint_strength: None,
            easing: None,
            delay: 0.0,
            duration: None,
            z: index as i32,
            fit: None,
            content_scale: legacy.scale.filter(|scale| *scale > 0.0).unwrap_or(1.0),
            align_x: 0.5,
            align_y: 0.5,
            overflow: None,
            tile_x: Default::default(),
            tile_y: Default::default(),
            margin_px_x: 0.0,
            margin_px_y: 0.0,
            hidden: false,
        })
        .collect();
    FileConfig {
        global,
        input: Default::default(),
        render: RenderSection::default(),
        layers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_config() {
        let legacy = LegacyConfig::parse(
            "# wallpaper\nfps 144\nshift 250\nduration 1.5\neasing expo\nvsync 1\nlayer far.png 0.2 1.0\nlayer near.png 1.0 0.9 2.5\n",
        );
        assert_eq!(legacy.fps, Some(144));
        assert_eq!(legacy.shift, Some(250.0));
        assert_eq!(legacy.vsync, Some(true));
        assert_eq!(legacy.layers.len(), 2);
        assert_eq!(legacy.layers[1].blur, 2.5);
    }

    #[test]
    fn inline_comments_stripped() {
        let legacy = LegacyConfig::parse("fps 60 # sixty\nshift 100\n");
        assert_eq!(legacy.fps, Some(60));
        assert_eq!(legacy.shift, Some(100.0));
    }

    #[test]
    fn overlong_line_skipped_parser_continues() {
        let long = "x".repeat(4096);
        let text = format!("fps 60\n{long}\nshift 90\n");
        let legacy = LegacyConfig::parse(&text);
        assert_eq!(legacy.fps, Some(60));
        assert_eq!(legacy.shift, Some(90.0));
    }

    #[test]
    fn unknown_keys_ignored() {
        let legacy = LegacyConfig::parse("wibble 7\nfps 75\n");
        assert_eq!(legacy.fps, Some(75));
    }

    #[test]
    fn conversion_preserves_order_as_z() {
        let legacy = LegacyConfig::parse("layer a.png 0.1\nlayer b.png 0.5\nlayer c.png 1.0\n");
        let file = convert_legacy(&legacy);
        assert_eq!(file.layers.len(), 3);
        assert_eq!(file.layers[0].z, 0);
        assert_eq!(file.layers[2].z, 2);
        // Converted output must parse back as valid TOML config.
        let toml = file.to_toml_string().unwrap();
        let reparsed = FileConfig::from_toml_str(&toml).unwrap();
        assert_eq!(reparsed.layers.len(), 3);
    }

    #[test]
    fn scale_becomes_content_scale() {
        let legacy = LegacyConfig::parse("scale 1.4\nlayer a.png\n");
        let file = convert_legacy(&legacy);
        assert_eq!(file.layers[0].content_scale, 1.4);
    }
}
