//! Command-line surface.
//!
//! `hyprlax [OPTIONS] [--layer spec…]` runs the daemon; `hyprlax ctl …`
//! talks to a running one; `hyprlax convert-config` migrates a legacy
//! `.conf` to TOML.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use config::{LayerSpec, Overlay, ParallaxMode};

#[derive(Parser, Debug)]
#[command(
    name = "hyprlax",
    author,
    version,
    about = "Parallax wallpaper daemon for Wayland compositors"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a command to the running daemon (add/remove/modify/list/…).
    #[command(trailing_var_arg = true, allow_hyphen_values = true)]
    Ctl {
        /// Command and arguments, forwarded verbatim.
        args: Vec<String>,
    },
    /// Convert a legacy .conf file to the TOML format.
    ConvertConfig {
        /// Source legacy config.
        src: PathBuf,
        /// Destination TOML path (defaults to the source with .toml).
        dst: Option<PathBuf>,
        /// Overwrite the destination without asking.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Target frames per second while animating (30-240).
    #[arg(short = 'f', long, value_name = "FPS")]
    pub fps: Option<u32>,

    /// Pixels of parallax shift between adjacent workspaces.
    #[arg(short = 's', long, value_name = "PX")]
    pub shift: Option<f32>,

    /// Animation duration in seconds (0.1-10).
    #[arg(short = 'd', long, value_name = "SECONDS")]
    pub duration: Option<f32>,

    /// Easing curve (linear, quad, cubic, quart, quint, sine, expo, circ,
    /// back, elastic, bounce, snap).
    #[arg(short = 'e', long, value_name = "NAME")]
    pub easing: Option<String>,

    /// Configuration file path (TOML; legacy .conf offered for conversion).
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short = 'D', long)]
    pub debug: bool,

    /// Tee logs to a file (default /tmp/hyprlax-<pid>.log).
    #[arg(short = 'L', long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    pub debug_log: Option<String>,

    /// Enable trace logging (implies --debug).
    #[arg(short = 'T', long)]
    pub trace: bool,

    /// Renderer backend name (auto).
    #[arg(short = 'r', long, value_name = "NAME")]
    pub renderer: Option<String>,

    /// Platform backend name (auto).
    #[arg(short = 'p', long, value_name = "NAME")]
    pub platform: Option<String>,

    /// Compositor backend (auto, hyprland, sway, wayfire, niri, river,
    /// generic).
    #[arg(short = 'C', long, value_name = "NAME")]
    pub compositor: Option<String>,

    /// Force vsync on.
    #[arg(long)]
    pub vsync: bool,

    /// Log verbosity: 0-4 or error/warn/info/debug/trace.
    #[arg(long, value_name = "LEVEL")]
    pub verbose: Option<String>,

    /// Deprecated parallax mode (workspace, cursor, hybrid); superseded by
    /// --input weights.
    #[arg(long, value_name = "MODE")]
    pub parallax: Option<String>,

    /// Input source weights, e.g. "workspace=0.7,cursor=0.3".
    #[arg(long, value_name = "SPEC")]
    pub input: Option<String>,

    /// Cursor source weight (0-1).
    #[arg(long, value_name = "WEIGHT")]
    pub mouse_weight: Option<f32>,

    /// Workspace source weight (0-1).
    #[arg(long, value_name = "WEIGHT")]
    pub workspace_weight: Option<f32>,

    /// Keep previous frames and fade them out (motion trails).
    #[arg(long)]
    pub accumulate: bool,

    /// Trail fade strength in [0,1]; higher fades faster.
    #[arg(long, value_name = "ALPHA")]
    pub trail_strength: Option<f32>,

    /// Overflow behaviour: repeat_edge, repeat, repeat_x, repeat_y, none.
    #[arg(long, value_name = "MODE")]
    pub overflow: Option<String>,

    /// Tile layers horizontally by default.
    #[arg(long)]
    pub tile_x: bool,

    /// Tile layers vertically by default.
    #[arg(long)]
    pub tile_y: bool,

    /// Disable horizontal tiling (overrides config).
    #[arg(long)]
    pub no_tile_x: bool,

    /// Disable vertical tiling (overrides config).
    #[arg(long)]
    pub no_tile_y: bool,

    /// Transparent margin on the x axis, in pixels.
    #[arg(long, value_name = "PX")]
    pub margin_px_x: Option<f32>,

    /// Transparent margin on the y axis, in pixels.
    #[arg(long, value_name = "PX")]
    pub margin_px_y: Option<f32>,

    /// Idle wakeup rate in Hz (0 disables idle polling).
    #[arg(long, value_name = "HZ")]
    pub idle_poll_rate: Option<f32>,

    /// Never prompt; refuse actions that would need interactive consent.
    #[arg(long)]
    pub non_interactive: bool,

    /// Add a layer: image:shift:opacity:blur[:#RRGGBB[:strength]].
    #[arg(long = "layer", value_name = "SPEC")]
    pub layers: Vec<String>,
}

impl RunArgs {
    /// Folds the CLI flags into a config overlay (the highest-precedence
    /// source).
    pub fn to_overlay(&self) -> Result<Overlay, config::ConfigError> {
        let mut overlay = Overlay::default();
        overlay.target_fps = self.fps;
        overlay.shift_pixels = self.shift;
        overlay.duration = self.duration;
        overlay.easing = self.easing.as_deref().map(animation::Easing::parse);
        if self.vsync {
            overlay.vsync = Some(true);
        }
        overlay.parallax_mode = self.parallax.as_deref().and_then(ParallaxMode::parse);
        if let Some(spec) = &self.input {
            config::parse_input_spec(spec, &mut overlay);
        }
        if let Some(weight) = self.mouse_weight {
            overlay.cursor_weight = Some(weight);
        }
        if let Some(weight) = self.workspace_weight {
            overlay.workspace_weight = Some(weight);
        }
        if self.accumulate {
            overlay.accumulate = Some(true);
        }
        overlay.trail_strength = self.trail_strength;
        if let Some(mode) = &self.overflow {
            overlay.overflow = Some(renderer::OverflowMode::parse(mode).ok_or_else(|| {
                config::ConfigError::Invalid(format!("unknown overflow mode '{mode}'"))
            })?);
        }
        if self.tile_x {
            overlay.tile_x = Some(true);
        }
        if self.no_tile_x {
            overlay.tile_x = Some(false);
        }
        if self.tile_y {
            overlay.tile_y = Some(true);
        }
        if self.no_tile_y {
            overlay.tile_y = Some(false);
        }
        overlay.margin_px_x = self.margin_px_x;
        overlay.margin_px_y = self.margin_px_y;
        overlay.idle_poll_rate = self.idle_poll_rate;

        let mut layers = Vec::new();
        for spec in &self.layers {
            layers.push(LayerSpec::parse_cli(spec)?);
        }
        overlay.layers = layers;
        Ok(overlay)
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_flags_fold_into_overlay() {
        let cli = Cli::parse_from([
            "hyprlax",
            "--fps",
            "120",
            "--shift",
            "300",
            "--easing",
            "sine",
            "--input",
            "workspace=0.6,cursor=0.4",
            "--layer",
            "bg.png:0.5:1.0:0",
        ]);
        let overlay = cli.run.to_overlay().unwrap();
        assert_eq!(overlay.target_fps, Some(120));
        assert_eq!(overlay.shift_pixels, Some(300.0));
        assert_eq!(overlay.easing, Some(animation::Easing::SineOut));
        assert_eq!(overlay.workspace_weight, Some(0.6));
        assert_eq!(overlay.cursor_weight, Some(0.4));
        assert_eq!(overlay.layers.len(), 1);
    }

    #[test]
    fn ctl_subcommand_captures_args() {
        let cli = Cli::parse_from(["hyprlax", "ctl", "list", "--json"]);
        match cli.command {
            Some(Command::Ctl { args }) => assert_eq!(args, ["list", "--json"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn no_tile_overrides_tile() {
        let cli = Cli::parse_from(["hyprlax", "--tile-x", "--no-tile-x"]);
        let overlay = cli.run.to_overlay().unwrap();
        assert_eq!(overlay.tile_x, Some(false));
    }

    #[test]
    fn bad_overflow_is_rejected() {
        let cli = Cli::parse_from(["hyprlax", "--overflow", "sideways"]);
        assert!(cli.run.to_overlay().is_err());
    }
}
