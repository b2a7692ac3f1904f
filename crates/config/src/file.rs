//! TOML file model.
//!
//! ```toml
//! [global]
//! fps = 144
//! shift = 250.0
//! duration = 1.2
//! easing = "expo"
//!
//! [input]
//! workspace_weight = 0.7
//! cursor_weight = 0.3
//!
//! [render]
//! overflow = "none"
//! tile_x = true
//!
//! [[layer]]
//! image = "mountains.png"
//! shift = 1.0
//! z = 0
//! ```

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use animation::Easing;
use renderer::{FitMode, OverflowMode, TileMode, Tint};
use workspace::MultiTagPolicy;

use crate::{ConfigError, LayerSpec, Overlay, ParallaxMode};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default, rename = "layer")]
    pub layers: Vec<LayerEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GlobalSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<f32>,
    #[serde(
        default,
        deserialize_with = "deserialize_seconds_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub easing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsync: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_poll_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallax_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail_strength: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadzone_px: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invert_x: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invert_y: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_offset_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_offset_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_policy: Option<MultiTagPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_x: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_y: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_px_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_px_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_callback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separable_blur: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_downscale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uniform_offset: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerEntry {
    pub image: String,
    #[serde(default = "default_shift_multiplier")]
    pub shift: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub blur: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tint_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub easing: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub delay: f32,
    #[serde(
        default,
        deserialize_with = "deserialize_seconds_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<f32>,
    #[serde(default)]
    pub z: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitMode>,
    #[serde(default = "default_content_scale")]
    pub content_scale: f32,
    #[serde(default = "default_align")]
    pub align_x: f32,
    #[serde(default = "default_align")]
    pub align_y: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowMode>,
    #[serde(default)]
    pub tile_x: TileMode,
    #[serde(default)]
    pub tile_y: TileMode,
    #[serde(default)]
    pub margin_px_x: f32,
    #[serde(default)]
    pub margin_px_y: f32,
    #[serde(default)]
    pub hidden: bool,
}

/// Accepts plain seconds (`1.5`) or a humantime string (`"1500ms"`).
fn deserialize_seconds_opt<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<f32>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("seconds as a number or a human-readable duration string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(|duration| Some(duration.as_secs_f32()))
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v as f32))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(v as f32))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(v as f32))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_seconds_opt(deserializer).map(|value| value.unwrap_or(0.0))
}

fn default_shift_multiplier() -> f32 {
    1.0
}

fn default_opacity() -> f32 {
    1.0
}

fn default_content_scale() -> f32 {
    1.0
}

fn default_align() -> f32 {
    0.5
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|err| ConfigError::Invalid(format!("serialization failed: {err}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.image.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "layer {index} has an empty image path"
                )));
            }
            if let Some(tint) = &layer.tint {
                if Tint::parse_hex(tint).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "layer {index} tint '{tint}' is not #RRGGBB"
                    )));
                }
            }
            if layer.content_scale <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "layer {index} content_scale must be positive"
                )));
            }
        }
        if let Some(mode) = &self.global.parallax_mode {
            if ParallaxMode::parse(mode).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown parallax_mode '{mode}'"
                )));
            }
        }
        Ok(())
    }

    pub fn to_overlay(&self) -> Overlay {
        let mut overlay = Overlay {
            target_fps: self.global.fps,
            shift_pixels: self.global.shift,
            duration: self.global.duration,
            easing: self.global.easing.as_deref().map(Easing::parse),
            vsync: self.global.vsync,
            debounce_ms: self.global.debounce_ms,
            idle_poll_rate: self.global.idle_poll_rate,
            accumulate: self.global.accumulate,
            trail_strength: self.global.trail_strength,
            parallax_mode: self
                .global
                .parallax_mode
                .as_deref()
                .and_then(ParallaxMode::parse),
            workspace_weight: self.input.workspace_weight,
            cursor_weight: self.input.cursor_weight,
            window_weight: self.input.window_weight,
            ema_alpha: self.input.ema_alpha,
            deadzone_px: self.input.deadzone_px,
            sensitivity_x: self.input.sensitivity_x,
            sensitivity_y: self.input.sensitivity_y,
            invert_x: self.input.invert_x,
            invert_y: self.input.invert_y,
            max_offset_x: self.input.max_offset_x,
            max_offset_y: self.input.max_offset_y,
            tag_policy: self.input.tag_policy,
            overflow: self.render.overflow,
            tile_x: self.render.tile_x,
            tile_y: self.render.tile_y,
            margin_px_x: self.render.margin_px_x,
            margin_px_y: self.render.margin_px_y,
            frame_callback: self.render.frame_callback,
            separable_blur: self.render.separable_blur,
            blur_downscale: self.render.blur_downscale,
            uniform_offset: self.render.uniform_offset,
            ..Overlay::default()
        };
        overlay.layers = self.layers.iter().map(LayerEntry::to_spec).collect();
        overlay
    }
}

impl LayerEntry {
    pub fn to_spec(&self) -> LayerSpec {
        let mut spec = LayerSpec::new(&self.image);
        spec.shift_multiplier = self.shift;
        spec.opacity = self.opacity;
        spec.blur = self.blur;
        spec.tint = self.tint.as_deref().and_then(Tint::parse_hex).map(|mut tint| {
            if let Some(strength) = self.tint_strength {
                tint.strength = strength;
            }
            tint
        });
        spec.easing = self.easing.as_deref().map(Easing::parse);
        spec.delay = self.delay.max(0.0);
        spec.duration = self.duration;
        spec.z = self.z;
        spec.fit = self.fit;
        spec.content_scale = self.content_scale;
        spec.align_x = self.align_x;
        spec.align_y = self.align_y;
        spec.overflow = self.overflow;
        spec.tile_x = self.tile_x;
        spec.tile_y = self.tile_y;
        spec.margin_px_x = self.margin_px_x;
        spec.margin_px_y = self.margin_px_y;
        spec.hidden = self.hidden;
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
[global]
fps = 144
shift = 250.0
duration = 1.2
easing = "expo"
vsync = true

[input]
workspace_weight = 0.7
cursor_weight = 0.3
ema_alpha = 0.2

[render]
overflow = "none"
tile_x = true

[[layer]]
image = "far.png"
shift = 0.2
z = 0

[[layer]]
image = "near.png"
shift = 1.0
opacity = 0.9
blur = 2.5
tint = "#204060"
tint_strength = 0.5
z = 10
fit = "contain"
"##;

    #[test]
    fn parses_sample_config() {
        let config = FileConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.global.fps, Some(144));
        assert_eq!(config.layers.len(), 2);
        let near = &config.layers[1];
        assert_eq!(near.z, 10);
        assert_eq!(near.fit, Some(FitMode::Contain));

        let overlay = config.to_overlay();
        assert_eq!(overlay.easing, Some(Easing::ExpoOut));
        assert_eq!(overlay.overflow, Some(OverflowMode::None));
        assert_eq!(overlay.layers.len(), 2);
        let tint = overlay.layers[1].tint.unwrap();
        assert_eq!(tint.strength, 0.5);
    }

    #[test]
    fn rejects_empty_image() {
        let err = FileConfig::from_toml_str(
            r#"
[[layer]]
image = ""
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_tint() {
        let err = FileConfig::from_toml_str(
            r#"
[[layer]]
image = "x.png"
tint = "blueish"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn round_trip_preserves_layers() {
        let config = FileConfig::from_toml_str(SAMPLE).unwrap();
        let dumped = config.to_toml_string().unwrap();
        let reparsed = FileConfig::from_toml_str(&dumped).unwrap();
        assert_eq!(reparsed.layers.len(), config.layers.len());
        assert_eq!(reparsed.global.fps, config.global.fps);
        assert_eq!(reparsed.layers[1].tint, config.layers[1].tint);
    }
}
