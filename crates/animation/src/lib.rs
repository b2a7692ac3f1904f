//! Easing curves and per-axis animation state for the wallpaper engine.
//!
//! Every animated quantity in the daemon (a monitor's parallax offset, a
//! layer's private offset) is driven by an [`Animation`] per axis: a start
//! value, a target, a start instant and a duration, shaped by one of the
//! [`Easing`] curves. The event loop calls [`Animation::tick`] once per frame
//! and reads back [`Animation::value`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Catalog of easing curves mapping `t` in `[0, 1]` to an eased value.
///
/// The `*Out` family decelerates into the target, which is what a workspace
/// switch wants: fast departure, gentle settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    QuadOut,
    CubicOut,
    QuartOut,
    QuintOut,
    SineOut,
    #[default]
    ExpoOut,
    CircOut,
    BackOut,
    ElasticOut,
    BounceOut,
    Snap,
}

impl Easing {
    /// Parses the short names accepted on the CLI and in configs. Unknown
    /// names fall back to `Linear`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "linear" => Easing::Linear,
            "quad" | "quad_out" => Easing::QuadOut,
            "cubic" | "cubic_out" => Easing::CubicOut,
            "quart" | "quart_out" => Easing::QuartOut,
            "quint" | "quint_out" => Easing::QuintOut,
            "sine" | "sine_out" => Easing::SineOut,
            "expo" | "expo_out" => Easing::ExpoOut,
            "circ" | "circ_out" => Easing::CircOut,
            "back" | "back_out" => Easing::BackOut,
            "elastic" | "elastic_out" => Easing::ElasticOut,
            "bounce" | "bounce_out" => Easing::BounceOut,
            "snap" => Easing::Snap,
            _ => Easing::Linear,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::QuadOut => "quad",
            Easing::CubicOut => "cubic",
            Easing::QuartOut => "quart",
            Easing::QuintOut => "quint",
            Easing::SineOut => "sine",
            Easing::ExpoOut => "expo",
            Easing::CircOut => "circ",
            Easing::BackOut => "back",
            Easing::ElasticOut => "elastic",
            Easing::BounceOut => "bounce",
            Easing::Snap => "snap",
        }
    }

    /// Applies the curve to `t`, clamped to `[0, 1]` on entry.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
            Easing::QuartOut => 1.0 - (1.0 - t).powi(4),
            Easing::QuintOut => 1.0 - (1.0 - t).powi(5),
            Easing::SineOut => (t * std::f32::consts::FRAC_PI_2).sin(),
            Easing::ExpoOut => {
                if t >= 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f32.powf(-10.0 * t)
                }
            }
            Easing::CircOut => (1.0 - (t - 1.0) * (t - 1.0)).max(0.0).sqrt(),
            Easing::BackOut => {
                const C1: f32 = 1.70158;
                const C3: f32 = C1 + 1.0;
                1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0) * (t - 1.0)
            }
            Easing::ElasticOut => {
                const C4: f32 = std::f32::consts::TAU / 3.0;
                if t <= 0.0 {
                    0.0
                } else if t >= 1.0 {
                    1.0
                } else {
                    2.0_f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * C4).sin() + 1.0
                }
            }
            Easing::BounceOut => bounce_out(t),
            Easing::Snap => {
                // Near-instant settle with a short smoothstep tail.
                let t = (t * 4.0).min(1.0);
                t * t * (3.0 - 2.0 * t)
            }
        }
    }
}

fn bounce_out(t: f32) -> f32 {
    const N1: f32 = 7.5625;
    const D1: f32 = 2.75;
    if t < 1.0 / D1 {
        N1 * t * t
    } else if t < 2.0 / D1 {
        let t = t - 1.5 / D1;
        N1 * t * t + 0.75
    } else if t < 2.5 / D1 {
        let t = t - 2.25 / D1;
        N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / D1;
        N1 * t * t + 0.984375
    }
}

/// One axis of animated motion.
#[derive(Debug, Clone)]
pub struct Animation {
    start: f32,
    target: f32,
    current: f32,
    start_time: Instant,
    duration: Duration,
    easing: Easing,
    delay: Duration,
    active: bool,
}

impl Animation {
    pub fn new(value: f32, duration: Duration, easing: Easing) -> Self {
        Self {
            start: value,
            target: value,
            current: value,
            start_time: Instant::now(),
            duration,
            easing,
            delay: Duration::ZERO,
            active: false,
        }
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn set_easing(&mut self, easing: Easing) {
        self.easing = easing;
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Starts (or restarts) motion towards `target`. The current value
    /// becomes the new start so an in-flight animation bends smoothly.
    pub fn retarget(&mut self, now: Instant, target: f32) {
        self.start = self.current;
        self.target = target;
        self.start_time = now;
        self.active = (self.target - self.start).abs() > f32::EPSILON;
    }

    /// Adds `delta` to the current target, restarting from the present value.
    pub fn shift_target(&mut self, now: Instant, delta: f32) {
        let target = self.target + delta;
        self.retarget(now, target);
    }

    /// Jumps to `value` with no animation.
    pub fn warp(&mut self, value: f32) {
        self.start = value;
        self.target = value;
        self.current = value;
        self.active = false;
    }

    /// Advances the animation to `now`. Returns true while still in motion.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        let since_start = now.saturating_duration_since(self.start_time);
        if since_start < self.delay {
            return true;
        }
        let elapsed = since_start - self.delay;
        if self.duration.is_zero() || elapsed >= self.duration {
            self.current = self.target;
            self.active = false;
            return false;
        }
        let mut t = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        // Values this close to the end are visually settled; snapping avoids
        // a trailing frame of sub-pixel drift.
        if t > 0.995 {
            t = 1.0;
        }
        let eased = self.easing.apply(t);
        self.current = self.start + (self.target - self.start) * eased;
        if t >= 1.0 {
            self.active = false;
        }
        self.active
    }
}

/// An x/y pair of animations sharing duration and easing, the shape every
/// monitor and layer carries.
#[derive(Debug, Clone)]
pub struct AxisPair {
    pub x: Animation,
    pub y: Animation,
}

impl AxisPair {
    pub fn new(duration: Duration, easing: Easing) -> Self {
        Self {
            x: Animation::new(0.0, duration, easing),
            y: Animation::new(0.0, duration, easing),
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.x.set_duration(duration);
        self.y.set_duration(duration);
    }

    pub fn set_easing(&mut self, easing: Easing) {
        self.x.set_easing(easing);
        self.y.set_easing(easing);
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.x.set_delay(delay);
        self.y.set_delay(delay);
    }

    pub fn shift_target(&mut self, now: Instant, dx: f32, dy: f32) {
        if dx != 0.0 {
            self.x.shift_target(now, dx);
        }
        if dy != 0.0 {
            self.y.shift_target(now, dy);
        }
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let x_active = self.x.tick(now);
        let y_active = self.y.tick(now);
        x_active || y_active
    }

    pub fn is_active(&self) -> bool {
        self.x.is_active() || self.y.is_active()
    }

    pub fn value(&self) -> (f32, f32) {
        (self.x.value(), self.y.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_hit_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadOut,
            Easing::CubicOut,
            Easing::QuartOut,
            Easing::QuintOut,
            Easing::SineOut,
            Easing::ExpoOut,
            Easing::CircOut,
            Easing::BackOut,
            Easing::ElasticOut,
            Easing::BounceOut,
            Easing::Snap,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-4, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-4, "{easing:?} at 1");
        }
    }

    #[test]
    fn apply_clamps_input() {
        assert_eq!(Easing::Linear.apply(-3.0), 0.0);
        assert_eq!(Easing::Linear.apply(7.0), 1.0);
    }

    #[test]
    fn unknown_easing_falls_back_to_linear() {
        assert_eq!(Easing::parse("zigzag"), Easing::Linear);
        assert_eq!(Easing::parse("EXPO"), Easing::ExpoOut);
        assert_eq!(Easing::parse(" sine "), Easing::SineOut);
    }

    #[test]
    fn animation_reaches_target() {
        let start = Instant::now();
        let mut anim = Animation::new(0.0, Duration::from_millis(100), Easing::Linear);
        anim.retarget(start, 200.0);
        assert!(anim.is_active());

        assert!(anim.tick(start + Duration::from_millis(50)));
        let mid = anim.value();
        assert!(mid > 0.0 && mid < 200.0, "midpoint was {mid}");

        assert!(!anim.tick(start + Duration::from_millis(150)));
        assert_eq!(anim.value(), 200.0);
        assert!(!anim.is_active());
    }

    #[test]
    fn retarget_mid_flight_starts_from_current() {
        let start = Instant::now();
        let mut anim = Animation::new(0.0, Duration::from_millis(100), Easing::Linear);
        anim.retarget(start, 100.0);
        anim.tick(start + Duration::from_millis(50));
        let mid = anim.value();

        anim.retarget(start + Duration::from_millis(50), 0.0);
        anim.tick(start + Duration::from_millis(50));
        // New start equals the captured midpoint, not the old origin.
        assert!((anim.value() - mid).abs() < 1.0);
    }

    #[test]
    fn shift_target_accumulates() {
        let start = Instant::now();
        let mut anim = Animation::new(0.0, Duration::from_millis(10), Easing::Linear);
        anim.shift_target(start, 100.0);
        anim.shift_target(start, 100.0);
        assert_eq!(anim.target(), 200.0);
    }

    #[test]
    fn delay_holds_start_value() {
        let start = Instant::now();
        let mut anim = Animation::new(0.0, Duration::from_millis(100), Easing::Linear);
        anim.set_delay(Duration::from_millis(50));
        anim.retarget(start, 100.0);

        assert!(anim.tick(start + Duration::from_millis(25)));
        assert_eq!(anim.value(), 0.0);

        anim.tick(start + Duration::from_millis(100));
        assert!(anim.value() > 0.0);
    }

    #[test]
    fn zero_delta_does_not_activate() {
        let start = Instant::now();
        let mut pair = AxisPair::new(Duration::from_millis(100), Easing::Linear);
        pair.shift_target(start, 0.0, 0.0);
        assert!(!pair.is_active());
    }
}
