//! The daemon: one value owning every subsystem, driven by one calloop.
//!
//! ```text
//!   wayland fd ──┐
//!   compositor fd┤                         ┌─ monitors + layers (engine)
//!   control fd ──┼──▶ calloop ──▶ Daemon ──┼─ renderer (wgpu targets)
//!   frame timer ─┤                         └─ platform (layer surfaces)
//!   cursor timer ┤
//!   debounce ────┘
//! ```
//!
//! Two states: IDLE blocks on the fds with every timer disarmed; ACTIVE
//! keeps a frame timer at the target FPS while any animation runs. Workspace
//! events are debounced (~10 ms, last-write-wins) before they touch monitor
//! state. Control commands run between frames only, because the loop is the
//! only executor.

use std::collections::HashMap;
use std::os::unix::io::{BorrowedFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use calloop::generic::Generic;
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopHandle, LoopSignal, Mode, PostAction, RegistrationToken};

use compositor::{Backend, WorkspaceChange};
use config::{FileConfig, Overlay, Settings};
use platform::{Platform, PlatformEvent};
use renderer::{
    DrawParams, FrameParams, LayerDraw, OverflowMode, RenderError, RenderOptions, Renderer,
};
use workspace::{tag_to_index, WorkspaceContext, WorkspaceModel};

use crate::control::server::{ControlInitError, ControlServer};
use crate::engine::{Effect, EngineState};
use crate::monitors::{ContextChange, Monitor};

/// How many cursor ticks between focused-window geometry polls; window
/// queries cost a compositor IPC round trip each.
const WINDOW_POLL_DIVISOR: u32 = 5;

pub struct Daemon {
    // Drop order is teardown order: renderer first, control server last so
    // the socket is unlinked after everything else quiesced.
    renderer: Renderer,
    compositor: Backend,
    platform: Platform,
    engine: EngineState,
    control: ControlServer,

    config_path: Option<PathBuf>,
    env_overlay: Overlay,
    cli_overlay: Overlay,

    handle: LoopHandle<'static, Daemon>,
    loop_signal: LoopSignal,
    frame_timer: Option<RegistrationToken>,
    cursor_timer: Option<RegistrationToken>,
    debounce_timer: Option<RegistrationToken>,
    pending_change: Option<WorkspaceChange>,
    /// Which monitor last showed each workspace, for steal detection on
    /// globally-numbered compositors.
    workspace_owners: HashMap<i32, String>,
    cursor_tick: u32,
    frame_callback_mode: bool,
    running: bool,
}

pub fn run(
    settings: Settings,
    config_path: Option<PathBuf>,
    env_overlay: Overlay,
    cli_overlay: Overlay,
    compositor_name: Option<&str>,
) -> Result<()> {
    let env = compositor::EnvSnapshot::from_env();
    let mut backend = Backend::create(compositor_name.unwrap_or("auto"), &env)
        .context("failed to select a compositor backend")?;
    tracing::info!(compositor = backend.name(), "selected compositor backend");
    backend
        .connect()
        .with_context(|| format!("failed to connect to {}", backend.name()))?;

    let mut platform = Platform::connect().context("failed to connect to Wayland")?;
    // Two roundtrips: globals first, then output geometry and names.
    platform.roundtrip()?;
    platform.roundtrip()?;
    platform.realize_pending();
    platform.set_global_cursor_follow(
        backend
            .capabilities()
            .contains(compositor::Caps::GLOBAL_CURSOR),
    );

    let renderer = Renderer::new(RenderOptions {
        vsync: settings.vsync,
        separable_blur: settings.separable_blur,
        blur_downscale: settings.blur_downscale,
        uniform_offset: settings.uniform_offset,
    });

    let model = backend.workspace_model();
    let frame_callback_mode = settings.frame_callback;
    let mut engine = EngineState::new(settings, backend.name().to_string(), model);
    engine.load_layers_from_settings();
    if engine.layers.is_empty() {
        tracing::warn!("no layers configured; the wallpaper will render the clear colour only");
    }

    let control = match ControlServer::bind() {
        Ok(control) => control,
        Err(ControlInitError::AlreadyRunning(path)) => {
            anyhow::bail!("another hyprlax instance is already running (socket {})", path.display());
        }
        Err(err) => return Err(err.into()),
    };

    let mut event_loop: EventLoop<'static, Daemon> =
        EventLoop::try_new().context("failed to create event loop")?;
    let handle = event_loop.handle();
    let loop_signal = event_loop.get_signal();

    let mut daemon = Daemon {
        renderer,
        compositor: backend,
        platform,
        engine,
        control,
        config_path,
        env_overlay,
        cli_overlay,
        handle: handle.clone(),
        loop_signal,
        frame_timer: None,
        cursor_timer: None,
        debounce_timer: None,
        pending_change: None,
        workspace_owners: HashMap::new(),
        cursor_tick: 0,
        frame_callback_mode,
        running: true,
    };

    // SIGINT/SIGTERM stop the loop; SIGPIPE is consumed so a vanished ctl
    // client cannot kill the daemon.
    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM, Signal::SIGPIPE])
        .context("failed to install signal handlers")?;
    handle
        .insert_source(signals, |event, _, daemon| match event.signal() {
            Signal::SIGPIPE => {}
            signal => {
                tracing::info!(?signal, "shutting down");
                daemon.running = false;
                daemon.loop_signal.stop();
            }
        })
        .map_err(|err| anyhow::anyhow!("failed to register signal source: {err}"))?;

    let wayland_fd = dup_fd(daemon.platform.event_fd()).context("failed to dup wayland fd")?;
    handle
        .insert_source(
            Generic::new(wayland_fd, Interest::READ, Mode::Level),
            |_, _, daemon: &mut Daemon| {
                if let Err(err) = daemon.platform.dispatch() {
                    tracing::error!(%err, "platform dispatch failed");
                    daemon.loop_signal.stop();
                }
                daemon.process_platform_events();
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| anyhow::anyhow!("failed to register wayland source: {err}"))?;

    if let Some(fd) = daemon.compositor.event_fd() {
        let fd = dup_fd(fd).context("failed to dup compositor fd")?;
        handle
            .insert_source(
                Generic::new(fd, Interest::READ, Mode::Level),
                |_, _, daemon: &mut Daemon| {
                    daemon.poll_compositor();
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|err| anyhow::anyhow!("failed to register compositor source: {err}"))?;
    } else {
        tracing::info!(
            compositor = daemon.compositor.name(),
            "compositor provides no event fd; workspace parallax disabled"
        );
    }

    let control_fd = dup_fd(daemon.control.fd()).context("failed to dup control fd")?;
    handle
        .insert_source(
            Generic::new(control_fd, Interest::READ, Mode::Level),
            |_, _, daemon: &mut Daemon| {
                if daemon.control.serve_ready(&mut daemon.engine) > 0 {
                    daemon.apply_effects();
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| anyhow::anyhow!("failed to register control source: {err}"))?;

    // Catch events that raced bootstrap, then draw the first frame.
    daemon.process_platform_events();
    daemon.render_all();
    daemon.arm_cursor_timer();

    let idle_timeout = if daemon.engine.settings.idle_poll_rate > 0.0 {
        Some(Duration::from_secs_f32(
            1.0 / daemon.engine.settings.idle_poll_rate,
        ))
    } else {
        None
    };

    tracing::info!(
        monitors = daemon.engine.monitors.len(),
        layers = daemon.engine.layers.len(),
        "hyprlax running"
    );
    event_loop
        .run(idle_timeout, &mut daemon, |daemon| {
            if !daemon.running {
                daemon.loop_signal.stop();
                return;
            }
            // Idle wakeups keep lazy compositors honest and flush any
            // buffered Wayland requests before blocking again.
            daemon.poll_compositor();
            daemon.platform.flush();
        })
        .map_err(|err| anyhow::anyhow!("event loop error: {err}"))?;

    tracing::info!("hyprlax exiting");
    Ok(())
}

fn dup_fd(fd: RawFd) -> std::io::Result<OwnedFd> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    rustix::io::fcntl_dupfd_cloexec(borrowed, 3).map_err(std::io::Error::from)
}

impl Daemon {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.engine.settings.target_fps as f64)
    }

    // -- state transitions -------------------------------------------------

    fn any_animation_active(&self) -> bool {
        self.engine.monitors.any_active() || self.engine.layers.any_active()
    }

    fn arm_frame_timer(&mut self) {
        if self.frame_timer.is_some() {
            return;
        }
        let interval = self.frame_interval();
        let token = self
            .handle
            .insert_source(Timer::from_duration(interval), |_, _, daemon: &mut Daemon| {
                daemon.on_frame_tick()
            })
            .expect("frame timer registration cannot fail");
        self.frame_timer = Some(token);
    }

    fn disarm_frame_timer(&mut self) {
        if let Some(token) = self.frame_timer.take() {
            self.handle.remove(token);
        }
    }

    fn rearm_frame_timer(&mut self) {
        if self.frame_timer.is_some() {
            self.disarm_frame_timer();
            self.arm_frame_timer();
        }
    }

    fn on_frame_tick(&mut self) -> TimeoutAction {
        let now = Instant::now();
        let monitors_active = self.engine.monitors.tick(now);
        let layers_active = self.engine.layers.tick(now);
        self.render_all();
        if monitors_active || layers_active {
            TimeoutAction::ToDuration(self.frame_interval())
        } else {
            // Transition to IDLE: the frame timer must not fire again.
            self.frame_timer = None;
            TimeoutAction::Drop
        }
    }

    fn arm_cursor_timer(&mut self) {
        let wanted = self.engine.settings.cursor_weight > 0.0
            || self.engine.settings.window_weight > 0.0;
        if !wanted || self.cursor_timer.is_some() {
            return;
        }
        let interval = self.frame_interval();
        let token = self
            .handle
            .insert_source(Timer::from_duration(interval), |_, _, daemon: &mut Daemon| {
                daemon.on_cursor_tick()
            })
            .expect("cursor timer registration cannot fail");
        self.cursor_timer = Some(token);
    }

    fn on_cursor_tick(&mut self) -> TimeoutAction {
        let settings = self.engine.settings.clone();
        if settings.cursor_weight <= 0.0 && settings.window_weight <= 0.0 {
            self.cursor_timer = None;
            return TimeoutAction::Drop;
        }

        let mut moved = false;
        if settings.cursor_weight > 0.0 {
            let sample = self
                .platform
                .pointer_position()
                .or_else(|| self.compositor.cursor_position());
            if let Some(sample) = sample {
                for monitor in self.engine.monitors.iter_mut() {
                    let desc = monitor.desc.clone();
                    moved |= monitor.mixer.update_cursor(sample, &desc, &settings);
                }
            }
        }

        self.cursor_tick = self.cursor_tick.wrapping_add(1);
        if settings.window_weight > 0.0 && self.cursor_tick % WINDOW_POLL_DIVISOR == 0 {
            if let Some(geometry) = self.compositor.active_window() {
                let center = (
                    geometry.x + geometry.width / 2.0,
                    geometry.y + geometry.height / 2.0,
                );
                for monitor in self.engine.monitors.iter_mut() {
                    let desc = monitor.desc.clone();
                    moved |= monitor.mixer.update_window(center, &desc, &settings);
                }
            }
        }

        if moved {
            self.render_all();
        }
        TimeoutAction::ToDuration(self.frame_interval())
    }

    // -- compositor events -------------------------------------------------

    fn poll_compositor(&mut self) {
        let mut events = Vec::new();
        if let Err(err) = self.compositor.poll(&mut events) {
            tracing::debug!(%err, "compositor poll failed");
            return;
        }
        for event in events {
            self.queue_workspace_change(event);
        }
    }

    /// Debounce: stash the change (last write wins) and arm the one-shot
    /// timer; bursts within the window collapse to a single transition.
    fn queue_workspace_change(&mut self, change: WorkspaceChange) {
        tracing::trace!(?change, "workspace change queued");
        self.pending_change = Some(change);
        if self.debounce_timer.is_none() {
            let window = Duration::from_millis(self.engine.settings.debounce_ms.max(1));
            let token = self
                .handle
                .insert_source(Timer::from_duration(window), |_, _, daemon: &mut Daemon| {
                    daemon.debounce_timer = None;
                    daemon.apply_pending_change();
                    TimeoutAction::Drop
                })
                .expect("debounce timer registration cannot fail");
            self.debounce_timer = Some(token);
        }
    }

    fn apply_pending_change(&mut self) {
        let Some(change) = self.pending_change.take() else {
            return;
        };
        let monitor_name = if change.monitor_name.is_empty() {
            match self.engine.monitors.primary() {
                Some(primary) => primary.name().to_string(),
                None => return,
            }
        } else {
            change.monitor_name.clone()
        };
        let new_context = context_from_change(self.engine.workspace_model, &change);
        let mut changes = vec![ContextChange {
            monitor: monitor_name.clone(),
            new_context,
        }];

        // A workspace jumping from monitor A to monitor B (sway/hyprland
        // "stealing") must retarget both monitors in one atomic pass.
        if self.engine.workspace_model == WorkspaceModel::GlobalNumeric {
            if let Some(previous_owner) = self.workspace_owners.get(&change.to_id) {
                if *previous_owner != monitor_name {
                    if let Some(stolen_from) = self.engine.monitors.get(previous_owner) {
                        tracing::debug!(
                            from = %previous_owner,
                            to = %monitor_name,
                            workspace = change.to_id,
                            "workspace stolen between monitors"
                        );
                        changes.push(ContextChange {
                            monitor: previous_owner.clone(),
                            new_context: stolen_from.previous_context,
                        });
                    }
                }
            }
            self.workspace_owners.insert(change.to_id, monitor_name);
        }

        let settings = self.engine.settings.clone();
        let now = Instant::now();

        // Layers carrying their own easing/duration/delay animate the delta
        // themselves rather than following the monitor animation.
        if let Some(target) = self.engine.monitors.get(&changes[0].monitor) {
            let delta = workspace::offset_2d(
                &target.context,
                &new_context,
                settings.shift_pixels,
                settings.tag_policy,
            );
            for layer in self.engine.layers.iter_mut() {
                if layer.has_custom_animation() {
                    layer.anim.shift_target(
                        now,
                        delta.x * layer.shift_multiplier,
                        delta.y * layer.shift_multiplier,
                    );
                }
            }
        }

        self.engine.monitors.apply_changes(&changes, now, &settings);
        if self.any_animation_active() {
            self.arm_frame_timer();
        }
        self.render_all();
    }

    // -- platform events ---------------------------------------------------

    fn process_platform_events(&mut self) {
        for event in self.platform.drain_events() {
            match event {
                PlatformEvent::OutputAdded(desc) | PlatformEvent::OutputUpdated(desc) => {
                    let initial = WorkspaceContext::initial(self.engine.workspace_model);
                    let settings = self.engine.settings.clone();
                    let monitor = Monitor::new(desc, initial, &settings);
                    self.engine.monitors.insert(monitor);
                }
                PlatformEvent::OutputRemoved { name }
                | PlatformEvent::SurfaceClosed { monitor: name } => {
                    if let Some(monitor) = self.engine.monitors.remove(&name) {
                        if let Some(target) = monitor.target {
                            self.renderer.destroy_target(target);
                        }
                        tracing::info!(monitor = %name, "monitor removed");
                    }
                }
                PlatformEvent::SurfaceConfigured {
                    monitor,
                    width,
                    height,
                } => {
                    self.configure_monitor_surface(&monitor, width, height);
                }
                PlatformEvent::FrameDone { monitor } => {
                    if let Some(record) = self.engine.monitors.get_mut(&monitor) {
                        record.frame_pending = false;
                    }
                    if self.frame_callback_mode && self.any_animation_active() {
                        self.render_monitor(&monitor);
                    }
                }
                PlatformEvent::PointerMotion { .. } | PlatformEvent::PointerLeft => {
                    // The cursor timer samples platform state at frame rate;
                    // raw motion events need no direct handling.
                }
            }
        }
    }

    fn configure_monitor_surface(&mut self, name: &str, width: u32, height: u32) {
        let Some(monitor) = self.engine.monitors.get_mut(name) else {
            tracing::debug!(monitor = name, "configure for unknown monitor");
            return;
        };
        monitor.surface_size = Some((width, height));
        match monitor.target {
            Some(target) => {
                if let Err(err) = self.renderer.resize_target(target, width, height) {
                    tracing::error!(%err, monitor = name, "failed to resize render target");
                }
            }
            None => {
                let Some(handle) = self.platform.surface_handle(name) else {
                    return;
                };
                match self.renderer.create_target(&handle, width, height) {
                    Ok(target) => {
                        if let Some(monitor) = self.engine.monitors.get_mut(name) {
                            monitor.target = Some(target);
                        }
                        tracing::info!(monitor = name, width, height, "render target ready");
                    }
                    Err(err) => {
                        tracing::error!(%err, monitor = name, "failed to create render target");
                        return;
                    }
                }
            }
        }
        self.render_monitor(name);
    }

    // -- rendering ---------------------------------------------------------

    fn render_all(&mut self) {
        let names: Vec<String> = self
            .engine
            .monitors
            .iter()
            .map(|monitor| monitor.name().to_string())
            .collect();
        for name in names {
            self.render_monitor(&name);
        }
    }

    fn render_monitor(&mut self, name: &str) {
        self.load_missing_textures();

        let settings = &self.engine.settings;
        let Some(monitor) = self.engine.monitors.get(name) else {
            return;
        };
        let Some(target) = monitor.target else {
            return;
        };
        if self.frame_callback_mode && monitor.frame_pending {
            return;
        }

        let (monitor_ws_x, monitor_ws_y) = monitor.anim.value();

        let layers = monitor.layer_override.as_ref().unwrap_or(&self.engine.layers);
        let mut draws = Vec::with_capacity(layers.len());
        for layer in layers.iter() {
            if layer.hidden {
                continue;
            }
            let Some(texture) = layer.texture else {
                continue;
            };
            let overflow = if layer.overflow == OverflowMode::Inherit {
                settings.overflow
            } else {
                layer.overflow
            };
            let tile_x = layer.tile_x.resolve(
                settings.tile_x || matches!(overflow, OverflowMode::Repeat | OverflowMode::RepeatX),
            );
            let tile_y = layer.tile_y.resolve(
                settings.tile_y || matches!(overflow, OverflowMode::Repeat | OverflowMode::RepeatY),
            );
            let workspace_component = if layer.has_custom_animation() {
                layer.anim.value()
            } else {
                (
                    monitor_ws_x * layer.shift_multiplier,
                    monitor_ws_y * layer.shift_multiplier,
                )
            };
            let (offset_x, offset_y) =
                monitor
                    .mixer
                    .blend(workspace_component, layer.shift_multiplier, settings);
            draws.push(LayerDraw {
                texture,
                offset_x: offset_x + layer.base_offset_x,
                offset_y: offset_y + layer.base_offset_y,
                opacity: layer.opacity,
                blur: layer.blur,
                params: DrawParams {
                    fit: layer.fit,
                    content_scale: layer.content_scale,
                    align_x: layer.align_x,
                    align_y: layer.align_y,
                    overflow,
                    tile_x,
                    tile_y,
                    margin_px_x: layer.margin_px_x.max(settings.margin_px_x),
                    margin_px_y: layer.margin_px_y.max(settings.margin_px_y),
                    tint: layer.tint,
                },
            });
        }

        let frame = FrameParams {
            clear: [0.0, 0.0, 0.0, 1.0],
            fade: settings
                .accumulate
                .then(|| [0.0, 0.0, 0.0, settings.trail_strength]),
        };

        match self.renderer.render(target, &frame, &draws) {
            Ok(()) => {
                if self.frame_callback_mode {
                    self.platform.request_frame(name);
                    if let Some(monitor) = self.engine.monitors.get_mut(name) {
                        monitor.frame_pending = true;
                    }
                }
            }
            Err(RenderError::Surface(
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
            )) => {
                // Reconfiguring against the last known size recovers the
                // swapchain; the next configure event will resize again.
                if let Some((width, height)) = self
                    .engine
                    .monitors
                    .get(name)
                    .and_then(|monitor| monitor.surface_size)
                {
                    let _ = self.renderer.resize_target(target, width, height);
                }
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                tracing::error!(monitor = name, "surface out of memory; dropping target");
                if let Some(monitor) = self.engine.monitors.get_mut(name) {
                    monitor.target = None;
                }
                self.renderer.destroy_target(target);
            }
            Err(err) => {
                tracing::warn!(%err, monitor = name, "frame render failed");
            }
        }
    }

    /// Lazily uploads textures for layers that still lack one. A bad image
    /// path marks the layer failed and the daemon carries on without it.
    fn load_missing_textures(&mut self) {
        load_set_textures(&mut self.renderer, &mut self.engine.layers);
        for monitor in self.engine.monitors.iter_mut() {
            if let Some(layers) = &mut monitor.layer_override {
                load_set_textures(&mut self.renderer, layers);
            }
        }
    }

    // -- control effects ---------------------------------------------------

    fn apply_effects(&mut self) {
        for effect in self.engine.take_effects() {
            match effect {
                Effect::Render => self.render_all(),
                Effect::Reload => self.reload_config(),
                Effect::FpsChanged => self.rearm_frame_timer(),
                Effect::VsyncChanged(vsync) => self.renderer.set_vsync(vsync),
                Effect::ReleaseTexture(texture) => self.renderer.drop_texture(texture),
            }
        }
        self.arm_cursor_timer();
        if self.any_animation_active() {
            self.arm_frame_timer();
        }
    }

    /// Re-reads the config file and replaces the layer set, keeping runtime
    /// monitor state intact.
    fn reload_config(&mut self) {
        let file = match &self.config_path {
            Some(path) => match FileConfig::load(path) {
                Ok(file) => Some(file),
                Err(err) => {
                    tracing::error!(%err, path = %path.display(), "config reload failed");
                    return;
                }
            },
            None => None,
        };
        let settings = Settings::resolve(file.as_ref(), &self.env_overlay, &self.cli_overlay);

        for layer in self.engine.layers.clear() {
            if let Some(texture) = layer.texture {
                self.renderer.drop_texture(texture);
            }
        }
        self.engine.settings = settings;
        self.engine.load_layers_from_settings();
        let (duration, easing) = (self.engine.settings.duration, self.engine.settings.easing);
        for monitor in self.engine.monitors.iter_mut() {
            monitor.set_animation_defaults(duration, easing);
        }
        self.renderer.set_vsync(self.engine.settings.vsync);
        self.rearm_frame_timer();
        self.render_all();
        tracing::info!(layers = self.engine.layers.len(), "configuration reloaded");
    }
}

fn load_set_textures(renderer: &mut Renderer, layers: &mut crate::layers::LayerSet) {
    for layer in layers.iter_mut() {
        if layer.texture.is_some() || layer.texture_failed {
            continue;
        }
        match renderer.load_texture(&layer.image) {
            Ok((handle, width, height)) => {
                layer.texture = Some(handle);
                layer.tex_size = Some((width, height));
            }
            Err(RenderError::NotReady) => return,
            Err(err) => {
                tracing::warn!(%err, layer = layer.id, "failed to load layer image");
                layer.texture_failed = true;
            }
        }
    }
}

/// Maps a normalized compositor event onto the engine's context model. A
/// `from` of -1 is irrelevant here: the monitor's cached context is always
/// the transition origin.
fn context_from_change(model: WorkspaceModel, change: &WorkspaceChange) -> WorkspaceContext {
    match model {
        WorkspaceModel::GlobalNumeric => WorkspaceContext::GlobalNumeric(change.to_id),
        WorkspaceModel::PerOutputNumeric => WorkspaceContext::PerOutputNumeric(change.to_id),
        WorkspaceModel::TagBased => {
            let visible = change.to_id.max(0) as u32;
            let focused_index = tag_to_index(visible);
            WorkspaceContext::TagBased {
                visible,
                focused: if focused_index >= 0 {
                    1 << focused_index
                } else {
                    0
                },
            }
        }
        WorkspaceModel::SetBased => WorkspaceContext::SetBased {
            set: 0,
            workspace: change.to_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_maps_onto_model_contexts() {
        let change = WorkspaceChange {
            from_id: 1,
            to_id: 0b0110,
            ..WorkspaceChange::default()
        };
        assert_eq!(
            context_from_change(WorkspaceModel::GlobalNumeric, &change),
            WorkspaceContext::GlobalNumeric(6)
        );
        assert_eq!(
            context_from_change(WorkspaceModel::TagBased, &change),
            WorkspaceContext::TagBased {
                visible: 0b0110,
                focused: 0b0010,
            }
        );
        assert_eq!(
            context_from_change(WorkspaceModel::SetBased, &change),
            WorkspaceContext::SetBased { set: 0, workspace: 6 }
        );
    }
}
