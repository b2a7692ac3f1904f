//! Monitor registry: one record per physical output.
//!
//! A monitor owns its render target, per-axis parallax animation, workspace
//! context (current and previous) and the frame-pacing flag. The registry
//! provides the workspace-change handler, including the atomic two-monitor
//! update used when a workspace is stolen or moved between outputs.

use std::time::Instant;

use animation::{AxisPair, Easing};
use config::Settings;
use platform::MonitorDescriptor;
use workspace::{offset_2d, MultiTagPolicy, WorkspaceContext};

use crate::layers::LayerSet;
use crate::mixer::InputMixer;

#[derive(Debug)]
pub struct Monitor {
    pub desc: MonitorDescriptor,
    pub target: Option<renderer::TargetId>,
    pub surface_size: Option<(u32, u32)>,
    pub anim: AxisPair,
    pub context: WorkspaceContext,
    pub previous_context: WorkspaceContext,
    /// At most one frame callback in flight; cleared only by FrameDone.
    pub frame_pending: bool,
    pub primary: bool,
    pub mixer: InputMixer,
    /// When set, this monitor draws its own stack instead of the global one.
    pub layer_override: Option<LayerSet>,
}

impl Monitor {
    pub fn new(desc: MonitorDescriptor, initial: WorkspaceContext, settings: &Settings) -> Self {
        let mut anim = AxisPair::new(
            std::time::Duration::from_secs_f32(settings.duration),
            settings.easing,
        );
        anim.set_easing(settings.easing);
        Self {
            desc,
            target: None,
            surface_size: None,
            anim,
            context: initial,
            previous_context: initial,
            frame_pending: false,
            primary: false,
            mixer: InputMixer::new(),
            layer_override: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Applies a context transition: computes the pixel delta, swaps the
    /// cached contexts and retargets the animation from the present value.
    pub fn apply_context(
        &mut self,
        new_context: WorkspaceContext,
        now: Instant,
        shift_pixels: f32,
        policy: MultiTagPolicy,
    ) {
        if new_context == self.context {
            return;
        }
        let delta = offset_2d(&self.context, &new_context, shift_pixels, policy);
        self.previous_context = self.context;
        self.context = new_context;
        self.anim.shift_target(now, delta.x, delta.y);
        tracing::debug!(
            monitor = %self.desc.name,
            from = %self.previous_context.describe(),
            to = %self.context.describe(),
            dx = delta.x,
            dy = delta.y,
            "workspace context applied"
        );
    }

    pub fn set_animation_defaults(&mut self, duration: f32, easing: Easing) {
        self.anim
            .set_duration(std::time::Duration::from_secs_f32(duration));
        self.anim.set_easing(easing);
    }
}

/// One context transition for one monitor. A multi-monitor change event
/// carries two of these and applies them without a render in between.
#[derive(Debug, Clone)]
pub struct ContextChange {
    pub monitor: String,
    pub new_context: WorkspaceContext,
}

#[derive(Debug, Default)]
pub struct MonitorRegistry {
    monitors: Vec<Monitor>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, monitor: Monitor) {
        if let Some(existing) = self
            .monitors
            .iter_mut()
            .find(|candidate| candidate.desc.name == monitor.desc.name)
        {
            // Hotplug re-realization: refresh geometry, keep state.
            existing.desc = monitor.desc;
            return;
        }
        self.monitors.push(monitor);
    }

    pub fn remove(&mut self, name: &str) -> Option<Monitor> {
        let index = self
            .monitors
            .iter()
            .position(|monitor| monitor.desc.name == name)?;
        Some(self.monitors.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Monitor> {
        self.monitors.iter().find(|monitor| monitor.desc.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Monitor> {
        self.monitors
            .iter_mut()
            .find(|monitor| monitor.desc.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Monitor> {
        self.monitors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// The primary monitor, falling back to the first realized one.
    pub fn primary(&self) -> Option<&Monitor> {
        self.monitors
            .iter()
            .find(|monitor| monitor.primary)
            .or_else(|| self.monitors.first())
    }

    pub fn any_active(&self) -> bool {
        self.monitors.iter().any(|monitor| {
            monitor.anim.is_active()
                || monitor
                    .layer_override
                    .as_ref()
                    .is_some_and(LayerSet::any_active)
        })
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let mut any_active = false;
        for monitor in &mut self.monitors {
            any_active |= monitor.anim.tick(now);
            if let Some(layers) = &mut monitor.layer_override {
                any_active |= layers.tick(now);
            }
        }
        any_active
    }

    /// Applies a set of context changes atomically: every monitor's context
    /// and animation target is updated before control returns, so no frame
    /// can observe half of a workspace steal.
    pub fn apply_changes(
        &mut self,
        changes: &[ContextChange],
        now: Instant,
        settings: &Settings,
    ) {
        for change in changes {
            if let Some(monitor) = self.get_mut(&change.monitor) {
                monitor.apply_context(
                    change.new_context,
                    now,
                    settings.shift_pixels,
                    settings.tag_policy,
                );
            } else {
                tracing::debug!(monitor = %change.monitor, "context change for unknown monitor");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn descriptor(name: &str) -> MonitorDescriptor {
        MonitorDescriptor {
            name: name.into(),
            width: 1920,
            height: 1080,
            scale: 1,
            refresh_mhz: 60_000,
            x: 0,
            y: 0,
        }
    }

    fn registry_with(names: &[&str]) -> MonitorRegistry {
        let settings = Settings::default();
        let mut registry = MonitorRegistry::new();
        for name in names {
            registry.insert(Monitor::new(
                descriptor(name),
                WorkspaceContext::GlobalNumeric(1),
                &settings,
            ));
        }
        registry
    }

    #[test]
    fn context_change_shifts_target() {
        let mut registry = registry_with(&["DP-1"]);
        let mut settings = Settings::default();
        settings.shift_pixels = 100.0;
        let now = Instant::now();

        registry.apply_changes(
            &[ContextChange {
                monitor: "DP-1".into(),
                new_context: WorkspaceContext::GlobalNumeric(3),
            }],
            now,
            &settings,
        );
        let monitor = registry.get("DP-1").unwrap();
        assert_eq!(monitor.anim.x.target(), 200.0);
        assert!(monitor.anim.is_active());
        assert_eq!(monitor.context, WorkspaceContext::GlobalNumeric(3));
        assert_eq!(monitor.previous_context, WorkspaceContext::GlobalNumeric(1));
    }

    #[test]
    fn identical_context_is_a_noop() {
        let mut registry = registry_with(&["DP-1"]);
        let settings = Settings::default();
        registry.apply_changes(
            &[ContextChange {
                monitor: "DP-1".into(),
                new_context: WorkspaceContext::GlobalNumeric(1),
            }],
            Instant::now(),
            &settings,
        );
        assert!(!registry.get("DP-1").unwrap().anim.is_active());
    }

    #[test]
    fn steal_updates_both_monitors_atomically() {
        let mut registry = registry_with(&["DP-1", "DP-2"]);
        let mut settings = Settings::default();
        settings.shift_pixels = 100.0;
        let now = Instant::now();

        registry.apply_changes(
            &[
                ContextChange {
                    monitor: "DP-1".into(),
                    new_context: WorkspaceContext::GlobalNumeric(4),
                },
                ContextChange {
                    monitor: "DP-2".into(),
                    new_context: WorkspaceContext::GlobalNumeric(2),
                },
            ],
            now,
            &settings,
        );
        assert_eq!(registry.get("DP-1").unwrap().context, WorkspaceContext::GlobalNumeric(4));
        assert_eq!(registry.get("DP-2").unwrap().context, WorkspaceContext::GlobalNumeric(2));
        assert!(registry.get("DP-1").unwrap().anim.is_active());
        assert!(registry.get("DP-2").unwrap().anim.is_active());
    }

    #[test]
    fn animation_settles_on_most_recent_context() {
        let mut registry = registry_with(&["DP-1"]);
        let mut settings = Settings::default();
        settings.shift_pixels = 100.0;
        settings.duration = 0.1;
        let start = Instant::now();

        for workspace in [2, 3, 5] {
            registry.apply_changes(
                &[ContextChange {
                    monitor: "DP-1".into(),
                    new_context: WorkspaceContext::GlobalNumeric(workspace),
                }],
                start,
                &settings,
            );
        }
        let monitor = registry.get_mut("DP-1").unwrap();
        monitor.anim.tick(start + Duration::from_secs(5));
        assert_eq!(monitor.context, WorkspaceContext::GlobalNumeric(5));
        // Accumulated delta: 1 -> 5 equals 400px regardless of intermediate hops.
        assert_eq!(monitor.anim.x.value(), 400.0);
    }

    #[test]
    fn hotplug_reinsert_keeps_context() {
        let mut registry = registry_with(&["DP-1"]);
        let settings = Settings::default();
        registry.apply_changes(
            &[ContextChange {
                monitor: "DP-1".into(),
                new_context: WorkspaceContext::GlobalNumeric(7),
            }],
            Instant::now(),
            &settings,
        );
        let mut updated = descriptor("DP-1");
        updated.width = 2560;
        registry.insert(Monitor::new(
            updated,
            WorkspaceContext::GlobalNumeric(1),
            &settings,
        ));
        let monitor = registry.get("DP-1").unwrap();
        assert_eq!(monitor.desc.width, 2560);
        assert_eq!(monitor.context, WorkspaceContext::GlobalNumeric(7));
    }

    #[test]
    fn primary_falls_back_to_first() {
        let registry = registry_with(&["DP-1", "DP-2"]);
        assert_eq!(registry.primary().unwrap().name(), "DP-1");
    }
}
