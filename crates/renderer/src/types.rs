//! Draw-parameter types shared with configuration and the control protocol.

use serde::{Deserialize, Serialize};

/// How a layer's image is mapped onto the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Fill the screen, ignoring aspect ratio; UVs span the whole image.
    Stretch,
    /// Scale so the image covers the screen, cropping overflow.
    #[default]
    Cover,
    /// Scale so the whole image is visible, letterboxed.
    Contain,
    /// Match the screen width, cropping or boxing vertically.
    FitWidth,
    /// Match the screen height, cropping or boxing horizontally.
    FitHeight,
}

impl FitMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stretch" => Some(FitMode::Stretch),
            "cover" => Some(FitMode::Cover),
            "contain" => Some(FitMode::Contain),
            "fit_width" | "fit-width" | "width" => Some(FitMode::FitWidth),
            "fit_height" | "fit-height" | "height" => Some(FitMode::FitHeight),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FitMode::Stretch => "stretch",
            FitMode::Cover => "cover",
            FitMode::Contain => "contain",
            FitMode::FitWidth => "fit_width",
            FitMode::FitHeight => "fit_height",
        }
    }
}

/// What happens when parallax pushes sampling past the image edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    /// Clamp to the edge pixel.
    #[default]
    RepeatEdge,
    /// Wrap around on both axes.
    Repeat,
    /// Wrap horizontally only.
    RepeatX,
    /// Wrap vertically only.
    RepeatY,
    /// Leave transparent borders instead of repeating.
    None,
    /// Defer to the global render default.
    Inherit,
}

impl OverflowMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "repeat_edge" | "repeat-edge" | "edge" => Some(OverflowMode::RepeatEdge),
            "repeat" => Some(OverflowMode::Repeat),
            "repeat_x" | "repeat-x" => Some(OverflowMode::RepeatX),
            "repeat_y" | "repeat-y" => Some(OverflowMode::RepeatY),
            "none" => Some(OverflowMode::None),
            "inherit" => Some(OverflowMode::Inherit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OverflowMode::RepeatEdge => "repeat_edge",
            OverflowMode::Repeat => "repeat",
            OverflowMode::RepeatX => "repeat_x",
            OverflowMode::RepeatY => "repeat_y",
            OverflowMode::None => "none",
            OverflowMode::Inherit => "inherit",
        }
    }
}

/// Per-axis tiling tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileMode {
    On,
    Off,
    #[default]
    Inherit,
}

impl TileMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "1" | "yes" => Some(TileMode::On),
            "off" | "false" | "0" | "no" => Some(TileMode::Off),
            "inherit" => Some(TileMode::Inherit),
            _ => None,
        }
    }

    pub fn resolve(self, default: bool) -> bool {
        match self {
            TileMode::On => true,
            TileMode::Off => false,
            TileMode::Inherit => default,
        }
    }
}

/// Multiplicative tint applied after sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tint {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    /// Blend factor in [0, 1]; 0 disables the tint.
    pub strength: f32,
}

impl Default for Tint {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 1.0,
            b: 1.0,
            strength: 0.0,
        }
    }
}

impl Tint {
    /// Parses `#RRGGBB` (or `RRGGBB`) into a tint with full strength.
    pub fn parse_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map(|v| v as f32 / 255.0)
        };
        Some(Self {
            r: channel(0..2).ok()?,
            g: channel(2..4).ok()?,
            b: channel(4..6).ok()?,
            strength: 1.0,
        })
    }
}

/// Everything `draw_layer` needs beyond offset/opacity/blur.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub fit: FitMode,
    pub content_scale: f32,
    pub align_x: f32,
    pub align_y: f32,
    pub overflow: OverflowMode,
    pub tile_x: bool,
    pub tile_y: bool,
    pub margin_px_x: f32,
    pub margin_px_y: f32,
    pub tint: Tint,
}

impl Default for DrawParams {
    fn default() -> Self {
        Self {
            fit: FitMode::Cover,
            content_scale: 1.0,
            align_x: 0.5,
            align_y: 0.5,
            overflow: OverflowMode::RepeatEdge,
            tile_x: false,
            tile_y: false,
            margin_px_x: 0.0,
            margin_px_y: 0.0,
            tint: Tint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_parse_accepts_aliases() {
        assert_eq!(FitMode::parse("fit-width"), Some(FitMode::FitWidth));
        assert_eq!(FitMode::parse("COVER"), Some(FitMode::Cover));
        assert_eq!(FitMode::parse("diagonal"), None);
    }

    #[test]
    fn tint_hex_parses() {
        let tint = Tint::parse_hex("#FF8000").unwrap();
        assert!((tint.r - 1.0).abs() < 1e-3);
        assert!((tint.g - 0.502).abs() < 1e-2);
        assert_eq!(tint.b, 0.0);
        assert_eq!(tint.strength, 1.0);
        assert!(Tint::parse_hex("#12345").is_none());
        assert!(Tint::parse_hex("zzzzzz").is_none());
    }

    #[test]
    fn tile_resolution() {
        assert!(TileMode::On.resolve(false));
        assert!(!TileMode::Off.resolve(true));
        assert!(TileMode::Inherit.resolve(true));
    }
}
