//! Daemon configuration: defaults, TOML file, environment and CLI overlays.
//!
//! Resolution is a single pass of per-field "present value wins":
//!
//! ```text
//!   Settings::default()  ⊕  FileConfig  ⊕  EnvOverlay  ⊕  CLI Overlay
//! ```
//!
//! Each source produces an [`Overlay`] whose `Option` fields override the
//! accumulated settings; absent fields preserve the lower layer. Validation
//! clamps rather than rejects wherever a sensible range exists, so a stray
//! `fps 10000` degrades to the supported ceiling instead of killing the
//! daemon.

mod file;
mod legacy;

pub use file::{FileConfig, LayerEntry};
pub use legacy::{convert_legacy, LegacyConfig};

use std::path::PathBuf;

use animation::Easing;
use renderer::{FitMode, OverflowMode, TileMode, Tint};
use workspace::MultiTagPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub const FPS_MIN: u32 = 30;
pub const FPS_MAX: u32 = 240;
pub const SHIFT_MAX: f32 = 1000.0;
pub const DURATION_MIN: f32 = 0.1;
pub const DURATION_MAX: f32 = 10.0;

/// The deprecated coarse parallax mode; superseded by per-source weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallaxMode {
    Workspace,
    Cursor,
    Hybrid,
}

impl ParallaxMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "workspace" => Some(ParallaxMode::Workspace),
            "cursor" | "mouse" => Some(ParallaxMode::Cursor),
            "hybrid" => Some(ParallaxMode::Hybrid),
            _ => None,
        }
    }
}

/// A layer as described by configuration or the `--layer` flag.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub image: PathBuf,
    pub shift_multiplier: f32,
    pub opacity: f32,
    pub blur: f32,
    pub tint: Option<Tint>,
    pub easing: Option<Easing>,
    pub delay: f32,
    pub duration: Option<f32>,
    pub z: i32,
    pub fit: Option<FitMode>,
    pub content_scale: f32,
    pub align_x: f32,
    pub align_y: f32,
    pub overflow: Option<OverflowMode>,
    pub tile_x: TileMode,
    pub tile_y: TileMode,
    pub margin_px_x: f32,
    pub margin_px_y: f32,
    pub hidden: bool,
}

impl LayerSpec {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            shift_multiplier: 1.0,
            opacity: 1.0,
            blur: 0.0,
            tint: None,
            easing: None,
            delay: 0.0,
            duration: None,
            z: 0,
            fit: None,
            content_scale: 1.0,
            align_x: 0.5,
            align_y: 0.5,
            overflow: None,
            tile_x: TileMode::Inherit,
            tile_y: TileMode::Inherit,
            margin_px_x: 0.0,
            margin_px_y: 0.0,
            hidden: false,
        }
    }

    /// Parses the CLI layer shorthand
    /// `image:shift:opacity:blur[:#RRGGBB[:strength]]`.
    pub fn parse_cli(spec: &str) -> Result<Self, ConfigError> {
        let mut parts = spec.split(':');
        let image = parts
            .next()
            .filter(|image| !image.is_empty())
            .ok_or_else(|| ConfigError::Invalid("--layer requires an image path".into()))?;
        let mut layer = LayerSpec::new(image);

        if let Some(shift) = parts.next() {
            layer.shift_multiplier = parse_f32(shift, "--layer shift")?;
        }
        if let Some(opacity) = parts.next() {
            layer.opacity = parse_f32(opacity, "--layer opacity")?.clamp(0.0, 1.0);
        }
        if let Some(blur) = parts.next() {
            layer.blur = parse_f32(blur, "--layer blur")?.max(0.0);
        }
        if let Some(tint) = parts.next() {
            let mut tint = Tint::parse_hex(tint).ok_or_else(|| {
                ConfigError::Invalid(format!("--layer tint '{tint}' is not #RRGGBB"))
            })?;
            if let Some(strength) = parts.next() {
                tint.strength = parse_f32(strength, "--layer tint strength")?.clamp(0.0, 1.0);
            }
            layer.tint = Some(tint);
        }
        Ok(layer)
    }
}

fn parse_f32(value: &str, what: &str) -> Result<f32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{what}: '{value}' is not a number")))
}

/// Fully-resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub target_fps: u32,
    pub shift_pixels: f32,
    pub duration: f32,
    pub easing: Easing,
    pub vsync: bool,

    pub workspace_weight: f32,
    pub cursor_weight: f32,
    pub window_weight: f32,
    pub ema_alpha: f32,
    pub deadzone_px: f32,
    pub sensitivity_x: f32,
    pub sensitivity_y: f32,
    pub invert_x: bool,
    pub invert_y: bool,
    pub max_offset_x: f32,
    pub max_offset_y: f32,
    pub tag_policy: MultiTagPolicy,

    pub overflow: OverflowMode,
    pub tile_x: bool,
    pub tile_y: bool,
    pub margin_px_x: f32,
    pub margin_px_y: f32,

    pub debounce_ms: u64,
    pub idle_poll_rate: f32,
    pub accumulate: bool,
    pub trail_strength: f32,

    pub frame_callback: bool,
    pub separable_blur: bool,
    pub blur_downscale: f32,
    pub uniform_offset: bool,

    pub layers: Vec<LayerSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_fps: 60,
            shift_pixels: 200.0,
            duration: 1.0,
            easing: Easing::ExpoOut,
            vsync: true,
            workspace_weight: 1.0,
            cursor_weight: 0.0,
            window_weight: 0.0,
            ema_alpha: 0.15,
            deadzone_px: 2.0,
            sensitivity_x: 1.0,
            sensitivity_y: 1.0,
            invert_x: false,
            invert_y: false,
            max_offset_x: 1000.0,
            max_offset_y: 1000.0,
            tag_policy: MultiTagPolicy::FirstSet,
            overflow: OverflowMode::RepeatEdge,
            tile_x: false,
            tile_y: false,
            margin_px_x: 0.0,
            margin_px_y: 0.0,
            debounce_ms: 10,
            idle_poll_rate: 0.0,
            accumulate: false,
            trail_strength: 0.85,
            frame_callback: false,
            separable_blur: false,
            blur_downscale: 1.0,
            uniform_offset: true,
            layers: Vec::new(),
        }
    }
}

/// One configuration source's contribution; `None` preserves lower layers.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub target_fps: Option<u32>,
    pub shift_pixels: Option<f32>,
    pub duration: Option<f32>,
    pub easing: Option<Easing>,
    pub vsync: Option<bool>,
    pub workspace_weight: Option<f32>,
    pub cursor_weight: Option<f32>,
    pub window_weight: Option<f32>,
    pub ema_alpha: Option<f32>,
    pub deadzone_px: Option<f32>,
    pub sensitivity_x: Option<f32>,
    pub sensitivity_y: Option<f32>,
    pub invert_x: Option<bool>,
    pub invert_y: Option<bool>,
    pub max_offset_x: Option<f32>,
    pub max_offset_y: Option<f32>,
    pub tag_policy: Option<MultiTagPolicy>,
    pub overflow: Option<OverflowMode>,
    pub tile_x: Option<bool>,
    pub tile_y: Option<bool>,
    pub margin_px_x: Option<f32>,
    pub margin_px_y: Option<f32>,
    pub debounce_ms: Option<u64>,
    pub idle_poll_rate: Option<f32>,
    pub accumulate: Option<bool>,
    pub trail_strength: Option<f32>,
    pub frame_callback: Option<bool>,
    pub separable_blur: Option<bool>,
    pub blur_downscale: Option<f32>,
    pub uniform_offset: Option<bool>,
    pub parallax_mode: Option<ParallaxMode>,
    pub layers: Vec<LayerSpec>,
}

impl Overlay {
    fn touches_weights(&self) -> bool {
        self.workspace_weight.is_some()
            || self.cursor_weight.is_some()
            || self.window_weight.is_some()
    }

    fn apply(&self, settings: &mut Settings) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    settings.$field = value;
                }
            };
        }
        take!(target_fps);
        take!(shift_pixels);
        take!(duration);
        take!(easing);
        take!(vsync);
        take!(workspace_weight);
        take!(cursor_weight);
        take!(window_weight);
        take!(ema_alpha);
        take!(deadzone_px);
        take!(sensitivity_x);
        take!(sensitivity_y);
        take!(invert_x);
        take!(invert_y);
        take!(max_offset_x);
        take!(max_offset_y);
        take!(tag_policy);
        take!(overflow);
        take!(tile_x);
        take!(tile_y);
        take!(margin_px_x);
        take!(margin_px_y);
        take!(debounce_ms);
        take!(idle_poll_rate);
        take!(accumulate);
        take!(trail_strength);
        take!(frame_callback);
        take!(separable_blur);
        take!(blur_downscale);
        take!(uniform_offset);
        if !self.layers.is_empty() {
            settings.layers = self.layers.clone();
        }
    }

    /// Reads the `HYPRLAX_*` environment.
    pub fn from_env() -> Self {
        let mut overlay = Overlay::default();
        overlay.target_fps = env_parse("HYPRLAX_RENDER_FPS");
        overlay.vsync = env_bool("HYPRLAX_RENDER_VSYNC");
        overlay.overflow =
            env_var("HYPRLAX_RENDER_OVERFLOW").and_then(|value| OverflowMode::parse(&value));
        overlay.tile_x = env_bool("HYPRLAX_RENDER_TILE_X");
        overlay.tile_y = env_bool("HYPRLAX_RENDER_TILE_Y");
        overlay.margin_px_x = env_parse("HYPRLAX_RENDER_MARGIN_PX_X");
        overlay.margin_px_y = env_parse("HYPRLAX_RENDER_MARGIN_PX_Y");
        overlay.duration = env_parse("HYPRLAX_ANIMATION_DURATION");
        overlay.easing =
            env_var("HYPRLAX_ANIMATION_EASING").map(|value| Easing::parse(&value));
        overlay.parallax_mode =
            env_var("HYPRLAX_PARALLAX_MODE").and_then(|value| ParallaxMode::parse(&value));
        if let Some(spec) = env_var("HYPRLAX_PARALLAX_INPUT") {
            parse_input_spec(&spec, &mut overlay);
        }
        overlay.cursor_weight = overlay
            .cursor_weight
            .or(env_parse("HYPRLAX_PARALLAX_SOURCES_CURSOR_WEIGHT"));
        overlay.workspace_weight = overlay
            .workspace_weight
            .or(env_parse("HYPRLAX_PARALLAX_SOURCES_WORKSPACE_WEIGHT"));
        overlay.window_weight = overlay
            .window_weight
            .or(env_parse("HYPRLAX_PARALLAX_SOURCES_WINDOW_WEIGHT"));
        overlay.frame_callback = env_bool("HYPRLAX_FRAME_CALLBACK");
        overlay.separable_blur = env_bool("HYPRLAX_SEPARABLE_BLUR");
        overlay.blur_downscale = env_parse("HYPRLAX_BLUR_DOWNSCALE");
        overlay.uniform_offset = env_bool("HYPRLAX_UNIFORM_OFFSET");
        // Renderer toggles from the GL era are recognized but have no
        // effect on the wgpu pipeline.
        for legacy in ["HYPRLAX_PERSISTENT_VBO", "HYPRLAX_NO_GLFINISH"] {
            if env_var(legacy).is_some() {
                tracing::debug!(var = legacy, "legacy renderer toggle has no effect");
            }
        }
        overlay
    }
}

/// Parses `--input`/`HYPRLAX_PARALLAX_INPUT` specs of the form
/// `workspace=0.7,cursor=0.3,window=0`.
pub fn parse_input_spec(spec: &str, overlay: &mut Overlay) {
    for part in spec.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let Ok(weight) = value.trim().parse::<f32>() else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "workspace" | "ws" => overlay.workspace_weight = Some(weight),
            "cursor" | "mouse" => overlay.cursor_weight = Some(weight),
            "window" | "win" => overlay.window_weight = Some(weight),
            _ => {}
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|value| value.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_var(key).map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

impl Settings {
    /// Single-pass precedence merge: defaults ⊕ file ⊕ env ⊕ cli.
    pub fn resolve(file: Option<&FileConfig>, env: &Overlay, cli: &Overlay) -> Settings {
        let mut settings = Settings::default();
        let file_overlay = file.map(FileConfig::to_overlay);
        if let Some(overlay) = &file_overlay {
            overlay.apply(&mut settings);
        }
        env.apply(&mut settings);
        cli.apply(&mut settings);

        let weights_touched = file_overlay
            .as_ref()
            .map(Overlay::touches_weights)
            .unwrap_or(false)
            || env.touches_weights()
            || cli.touches_weights();
        let mode = cli.parallax_mode.or(env.parallax_mode).or(file_overlay
            .as_ref()
            .and_then(|overlay| overlay.parallax_mode));
        match mode {
            Some(ParallaxMode::Workspace) => {
                settings.workspace_weight = 1.0;
                settings.cursor_weight = 0.0;
                settings.window_weight = 0.0;
            }
            Some(ParallaxMode::Cursor) => {
                settings.workspace_weight = 0.0;
                settings.cursor_weight = 1.0;
                settings.window_weight = 0.0;
            }
            Some(ParallaxMode::Hybrid) if !weights_touched => {
                settings.workspace_weight = 0.7;
                settings.cursor_weight = 0.3;
                settings.window_weight = 0.0;
            }
            _ => {}
        }
        if mode.is_some() {
            tracing::warn!("parallax_mode is deprecated; use input source weights instead");
        }

        settings.clamp();
        settings
    }

    /// Clamps every bounded field into its supported range.
    pub fn clamp(&mut self) {
        self.target_fps = self.target_fps.clamp(FPS_MIN, FPS_MAX);
        self.shift_pixels = self.shift_pixels.clamp(0.0, SHIFT_MAX);
        self.duration = self.duration.clamp(DURATION_MIN, DURATION_MAX);
        self.workspace_weight = self.workspace_weight.clamp(0.0, 1.0);
        self.cursor_weight = self.cursor_weight.clamp(0.0, 1.0);
        self.window_weight = self.window_weight.clamp(0.0, 1.0);
        self.ema_alpha = self.ema_alpha.clamp(0.01, 1.0);
        self.deadzone_px = self.deadzone_px.max(0.0);
        self.max_offset_x = self.max_offset_x.max(0.0);
        self.max_offset_y = self.max_offset_y.max(0.0);
        self.margin_px_x = self.margin_px_x.max(0.0);
        self.margin_px_y = self.margin_px_y.max(0.0);
        self.trail_strength = self.trail_strength.clamp(0.0, 1.0);
        self.blur_downscale = self.blur_downscale.clamp(0.1, 1.0);
        self.idle_poll_rate = self.idle_poll_rate.clamp(0.0, 60.0);
        for layer in &mut self.layers {
            layer.opacity = layer.opacity.clamp(0.0, 1.0);
            layer.blur = layer.blur.max(0.0);
            layer.content_scale = if layer.content_scale > 0.0 {
                layer.content_scale
            } else {
                1.0
            };
            layer.align_x = layer.align_x.clamp(0.0, 1.0);
            layer.align_y = layer.align_y.clamp(0.0, 1.0);
            if let Some(tint) = &mut layer.tint {
                tint.strength = tint.strength.clamp(0.0, 1.0);
            }
        }
    }
}

/// Default config file location: `$HOME/.config/hyprlax/hyprlax.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    let home = env_var("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("hyprlax")
            .join("hyprlax.toml"),
    )
}

/// Default legacy config location: `$HOME/.config/hyprlax/hyprlax.conf`.
pub fn default_legacy_path() -> Option<PathBuf> {
    let home = env_var("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("hyprlax")
            .join("hyprlax.conf"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_higher_sources_win() {
        let file: FileConfig = toml::from_str(
            r#"
[global]
fps = 120
shift = 300.0
duration = 2.0
"#,
        )
        .unwrap();
        let mut env = Overlay::default();
        env.shift_pixels = Some(400.0);
        let mut cli = Overlay::default();
        cli.duration = Some(0.5);

        let settings = Settings::resolve(Some(&file), &env, &cli);
        // file only
        assert_eq!(settings.target_fps, 120);
        // env over file
        assert_eq!(settings.shift_pixels, 400.0);
        // cli over both
        assert_eq!(settings.duration, 0.5);
        // default preserved where nothing set
        assert!(settings.vsync);
    }

    #[test]
    fn fps_clamps_into_range() {
        let mut cli = Overlay::default();
        cli.target_fps = Some(10_000);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.target_fps, FPS_MAX);

        cli.target_fps = Some(1);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.target_fps, FPS_MIN);
    }

    #[test]
    fn negative_shift_clamps_to_zero() {
        let mut cli = Overlay::default();
        cli.shift_pixels = Some(-50.0);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.shift_pixels, 0.0);
    }

    #[test]
    fn parallax_mode_workspace_forces_weights() {
        let mut cli = Overlay::default();
        cli.parallax_mode = Some(ParallaxMode::Workspace);
        cli.cursor_weight = Some(0.9);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.workspace_weight, 1.0);
        assert_eq!(settings.cursor_weight, 0.0);
    }

    #[test]
    fn parallax_mode_hybrid_respects_touched_weights() {
        let mut cli = Overlay::default();
        cli.parallax_mode = Some(ParallaxMode::Hybrid);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.workspace_weight, 0.7);
        assert_eq!(settings.cursor_weight, 0.3);

        cli.cursor_weight = Some(0.5);
        let settings = Settings::resolve(None, &Overlay::default(), &cli);
        assert_eq!(settings.cursor_weight, 0.5);
        assert_eq!(settings.workspace_weight, 1.0);
    }

    #[test]
    fn layer_cli_spec_parses_full_form() {
        let layer = LayerSpec::parse_cli("bg.png:1.5:0.8:2.0:#336699:0.4").unwrap();
        assert_eq!(layer.image, PathBuf::from("bg.png"));
        assert_eq!(layer.shift_multiplier, 1.5);
        assert_eq!(layer.opacity, 0.8);
        assert_eq!(layer.blur, 2.0);
        let tint = layer.tint.unwrap();
        assert!((tint.r - 0.2).abs() < 1e-2);
        assert_eq!(tint.strength, 0.4);
    }

    #[test]
    fn layer_cli_spec_rejects_bad_tint() {
        assert!(LayerSpec::parse_cli("bg.png:1:1:0:oops").is_err());
        assert!(LayerSpec::parse_cli("").is_err());
    }

    #[test]
    fn input_spec_parses_pairs() {
        let mut overlay = Overlay::default();
        parse_input_spec("workspace=0.6,cursor=0.4,window=0.1", &mut overlay);
        assert_eq!(overlay.workspace_weight, Some(0.6));
        assert_eq!(overlay.cursor_weight, Some(0.4));
        assert_eq!(overlay.window_weight, Some(0.1));
    }

    #[test]
    fn resolve_is_deterministic() {
        let file: FileConfig = toml::from_str(
            r#"
[global]
fps = 75

[[layer]]
image = "a.png"
shift = 0.5

[[layer]]
image = "b.png"
z = 2
"#,
        )
        .unwrap();
        let first = Settings::resolve(Some(&file), &Overlay::default(), &Overlay::default());
        let second = Settings::resolve(Some(&file), &Overlay::default(), &Overlay::default());
        assert_eq!(first, second);
        assert_eq!(first.layers.len(), 2);
        assert_eq!(first.layers[1].z, 2);
    }
}
