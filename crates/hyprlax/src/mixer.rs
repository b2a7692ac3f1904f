//! Input mixer: blends workspace, cursor and window sources into one offset.
//!
//! The workspace source is already smoothed by the animation engine; cursor
//! and window samples are normalized against the monitor, deadzoned, scaled
//! by sensitivity, smoothed with an exponential moving average and weighted.
//! The blended result is clamped to the configured maximum parallax offset.

use config::Settings;
use platform::MonitorDescriptor;

/// Per-monitor mixer state. Cursor and window tracks are independent EMAs.
#[derive(Debug, Default, Clone)]
pub struct InputMixer {
    cursor: SourceTrack,
    window: SourceTrack,
}

#[derive(Debug, Default, Clone)]
struct SourceTrack {
    /// Raw sample last accepted past the deadzone, in global pixels.
    last_raw: Option<(f64, f64)>,
    ema: (f32, f32),
    primed: bool,
}

impl SourceTrack {
    /// Feeds one raw global-space sample; returns true when the smoothed
    /// value moved.
    fn update(
        &mut self,
        sample: (f64, f64),
        monitor: &MonitorDescriptor,
        settings: &Settings,
    ) -> bool {
        let accepted = match self.last_raw {
            Some(last)
                if (sample.0 - last.0).abs() < settings.deadzone_px as f64
                    && (sample.1 - last.1).abs() < settings.deadzone_px as f64 =>
            {
                // Both axes within the deadzone: hold the previous sample.
                last
            }
            _ => {
                self.last_raw = Some(sample);
                sample
            }
        };

        let center_x = monitor.x as f64 + monitor.width as f64 / 2.0;
        let center_y = monitor.y as f64 + monitor.height as f64 / 2.0;
        let mut norm_x =
            (((accepted.0 - center_x) / (monitor.width as f64 / 2.0)) as f32).clamp(-1.0, 1.0);
        let mut norm_y =
            (((accepted.1 - center_y) / (monitor.height as f64 / 2.0)) as f32).clamp(-1.0, 1.0);
        norm_x *= settings.sensitivity_x;
        norm_y *= settings.sensitivity_y;
        if settings.invert_x {
            norm_x = -norm_x;
        }
        if settings.invert_y {
            norm_y = -norm_y;
        }

        let alpha = settings.ema_alpha;
        let previous = self.ema;
        if self.primed {
            self.ema.0 = self.ema.0 * (1.0 - alpha) + norm_x * alpha;
            self.ema.1 = self.ema.1 * (1.0 - alpha) + norm_y * alpha;
        } else {
            self.ema = (norm_x, norm_y);
            self.primed = true;
        }
        (self.ema.0 - previous.0).abs() > 1e-5 || (self.ema.1 - previous.1).abs() > 1e-5
    }

    fn offset(&self, settings: &Settings, weight: f32) -> (f32, f32) {
        if !self.primed || weight <= 0.0 {
            return (0.0, 0.0);
        }
        (
            self.ema.0 * settings.shift_pixels * weight,
            self.ema.1 * settings.shift_pixels * weight,
        )
    }
}

impl InputMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a cursor sample in global coordinates. Returns true when the
    /// smoothed cursor moved enough to warrant a redraw.
    pub fn update_cursor(
        &mut self,
        sample: (f64, f64),
        monitor: &MonitorDescriptor,
        settings: &Settings,
    ) -> bool {
        if settings.cursor_weight <= 0.0 {
            return false;
        }
        self.cursor.update(sample, monitor, settings)
    }

    /// Feeds the focused-window center in global coordinates.
    pub fn update_window(
        &mut self,
        center: (f64, f64),
        monitor: &MonitorDescriptor,
        settings: &Settings,
    ) -> bool {
        if settings.window_weight <= 0.0 {
            return false;
        }
        self.window.update(center, monitor, settings)
    }

    /// Blends all sources for one layer. `workspace` is the layer's animated
    /// workspace offset (already carrying its shift multiplier); the cursor
    /// and window contributions are scaled by `multiplier` so depth applies
    /// to every source.
    pub fn blend(&self, workspace: (f32, f32), multiplier: f32, settings: &Settings) -> (f32, f32) {
        let cursor = self.cursor.offset(settings, settings.cursor_weight);
        let window = self.window.offset(settings, settings.window_weight);
        let x = workspace.0 * settings.workspace_weight + (cursor.0 + window.0) * multiplier;
        let y = workspace.1 * settings.workspace_weight + (cursor.1 + window.1) * multiplier;
        (
            x.clamp(-settings.max_offset_x, settings.max_offset_x),
            y.clamp(-settings.max_offset_y, settings.max_offset_y),
        )
    }

    /// Blends with a neutral multiplier.
    pub fn mix(&self, workspace: (f32, f32), settings: &Settings) -> (f32, f32) {
        self.blend(workspace, 1.0, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MonitorDescriptor {
        MonitorDescriptor {
            name: "DP-1".into(),
            width: 1000,
            height: 1000,
            scale: 1,
            refresh_mhz: 60_000,
            x: 0,
            y: 0,
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.cursor_weight = 1.0;
        settings.workspace_weight = 1.0;
        settings.shift_pixels = 100.0;
        settings.ema_alpha = 1.0; // no smoothing unless a test wants it
        settings.deadzone_px = 2.0;
        settings
    }

    #[test]
    fn centered_cursor_contributes_nothing() {
        let mut mixer = InputMixer::new();
        mixer.update_cursor((500.0, 500.0), &monitor(), &settings());
        assert_eq!(mixer.mix((0.0, 0.0), &settings()), (0.0, 0.0));
    }

    #[test]
    fn right_edge_gives_full_shift() {
        let mut mixer = InputMixer::new();
        mixer.update_cursor((1000.0, 500.0), &monitor(), &settings());
        let (x, y) = mixer.mix((0.0, 0.0), &settings());
        assert!((x - 100.0).abs() < 1e-3);
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn deadzone_holds_small_movement() {
        let mut mixer = InputMixer::new();
        let settings = settings();
        mixer.update_cursor((600.0, 500.0), &monitor(), &settings);
        let before = mixer.mix((0.0, 0.0), &settings);
        let moved = mixer.update_cursor((601.0, 500.5), &monitor(), &settings);
        assert!(!moved);
        assert_eq!(mixer.mix((0.0, 0.0), &settings), before);
    }

    #[test]
    fn ema_smooths_towards_target() {
        let mut mixer = InputMixer::new();
        let mut settings = settings();
        settings.ema_alpha = 0.5;
        // First sample primes directly.
        mixer.update_cursor((1000.0, 500.0), &monitor(), &settings);
        let (full, _) = mixer.mix((0.0, 0.0), &settings);
        // Jump to center: one smoothing step covers half the distance.
        mixer.update_cursor((500.0, 500.0), &monitor(), &settings);
        let (half, _) = mixer.mix((0.0, 0.0), &settings);
        assert!((half - full / 2.0).abs() < 1e-3);
    }

    #[test]
    fn invert_flips_sign() {
        let mut mixer = InputMixer::new();
        let mut settings = settings();
        settings.invert_x = true;
        mixer.update_cursor((1000.0, 500.0), &monitor(), &settings);
        let (x, _) = mixer.mix((0.0, 0.0), &settings);
        assert!(x < 0.0);
    }

    #[test]
    fn weights_scale_sources() {
        let mut mixer = InputMixer::new();
        let mut settings = settings();
        settings.cursor_weight = 0.5;
        mixer.update_cursor((1000.0, 500.0), &monitor(), &settings);
        let (x, _) = mixer.mix((0.0, 0.0), &settings);
        assert!((x - 50.0).abs() < 1e-3);
    }

    #[test]
    fn workspace_weight_applies() {
        let mixer = InputMixer::new();
        let mut settings = settings();
        settings.workspace_weight = 0.25;
        let (x, _) = mixer.mix((400.0, 0.0), &settings);
        assert!((x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn output_clamps_to_max_offset() {
        let mut mixer = InputMixer::new();
        let mut settings = settings();
        settings.max_offset_x = 40.0;
        mixer.update_cursor((1000.0, 500.0), &monitor(), &settings);
        let (x, _) = mixer.mix((500.0, 0.0), &settings);
        assert_eq!(x, 40.0);
    }

    #[test]
    fn zero_weight_disables_cursor() {
        let mut mixer = InputMixer::new();
        let mut settings = settings();
        settings.cursor_weight = 0.0;
        let moved = mixer.update_cursor((1000.0, 500.0), &monitor(), &settings);
        assert!(!moved);
        assert_eq!(mixer.mix((0.0, 0.0), &settings), (0.0, 0.0));
    }
}
