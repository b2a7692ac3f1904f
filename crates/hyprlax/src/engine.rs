//! Shared mutable state the control protocol and event loop both touch.
//!
//! The event loop is the only executor; control commands mutate this state
//! between frames and queue [`Effect`]s the daemon applies on its next
//! iteration (texture loads, timer re-arms, config reloads).

use config::Settings;
use workspace::WorkspaceModel;

use crate::layers::{AnimDefaults, LayerSet};
use crate::monitors::MonitorRegistry;

/// Deferred consequences of a control command.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Something visible changed; schedule a redraw.
    Render,
    /// Re-read the config file and replace the layer set.
    Reload,
    /// Target FPS changed; re-arm the frame timer.
    FpsChanged,
    /// Present-mode change for every render target.
    VsyncChanged(bool),
    /// A removed layer's texture should be released.
    ReleaseTexture(renderer::TextureHandle),
}

pub struct EngineState {
    pub settings: Settings,
    pub layers: LayerSet,
    pub monitors: MonitorRegistry,
    pub compositor_name: String,
    pub workspace_model: WorkspaceModel,
    pub effects: Vec<Effect>,
}

impl EngineState {
    pub fn new(settings: Settings, compositor_name: String, model: WorkspaceModel) -> Self {
        Self {
            settings,
            layers: LayerSet::new(),
            monitors: MonitorRegistry::new(),
            compositor_name,
            workspace_model: model,
            effects: Vec::new(),
        }
    }

    pub fn anim_defaults(&self) -> AnimDefaults {
        AnimDefaults {
            duration: std::time::Duration::from_secs_f32(self.settings.duration),
            easing: self.settings.easing,
        }
    }

    pub fn push_effect(&mut self, effect: Effect) {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Populates the layer set from resolved settings (startup and reload).
    pub fn load_layers_from_settings(&mut self) {
        let defaults = self.anim_defaults();
        let specs = self.settings.layers.clone();
        for spec in &specs {
            self.layers.add(spec, &defaults);
        }
    }
}
