//! Wayland platform adapter.
//!
//! Owns the display connection and, per physical output, one background
//! layer surface: anchored to all four edges, exclusive zone -1, keyboard
//! interactivity none, and an empty input region so clicks fall through to
//! the desktop. Outputs are "realized" into monitor descriptors only once
//! their name, pixel dimensions, scale and refresh rate are all known, which
//! may lag the wl_output global by a roundtrip or two.
//!
//! The daemon multiplexes the connection fd itself; [`Platform::dispatch`]
//! performs the non-blocking read/dispatch cycle and queues
//! [`PlatformEvent`]s for the daemon to drain.

use std::collections::{HashMap, VecDeque};
use std::ffi::c_void;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr::NonNull;
use std::result::Result as StdResult;
use std::thread;
use std::time::Duration;

use smithay_client_toolkit::compositor::{CompositorHandler, CompositorState, Region};
use smithay_client_toolkit::output::{OutputHandler, OutputInfo, OutputState};
use smithay_client_toolkit::reexports::client::{
    globals::registry_queue_init,
    protocol::{wl_output, wl_pointer, wl_seat, wl_surface},
    Connection, EventQueue, Proxy, QueueHandle,
};
use smithay_client_toolkit::registry::{ProvidesRegistryState, RegistryState};
use smithay_client_toolkit::registry_handlers;
use smithay_client_toolkit::seat::pointer::{PointerEvent, PointerEventKind, PointerHandler};
use smithay_client_toolkit::seat::{Capability, SeatHandler, SeatState};
use smithay_client_toolkit::shell::wlr_layer::{
    Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
    LayerSurfaceConfigure,
};
use smithay_client_toolkit::shell::WaylandSurface;
use smithay_client_toolkit::{
    delegate_compositor, delegate_layer, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat,
};

const CONNECT_RETRIES: u32 = 150;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to connect to Wayland display: {0}")]
    NoDisplay(String),
    #[error("required Wayland global missing: {0}")]
    MissingGlobal(&'static str),
    #[error("wayland protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform capability bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformCaps(pub u64);

impl PlatformCaps {
    pub const LAYER_SHELL: PlatformCaps = PlatformCaps(1 << 0);
    pub const MULTI_OUTPUT: PlatformCaps = PlatformCaps(1 << 1);
    pub const EVENT_FD: PlatformCaps = PlatformCaps(1 << 2);
    pub const WINDOW_SIZE_QUERY: PlatformCaps = PlatformCaps(1 << 3);
    pub const SURFACE_COMMIT: PlatformCaps = PlatformCaps(1 << 4);
    pub const GLOBAL_CURSOR: PlatformCaps = PlatformCaps(1 << 5);
    pub const REALIZE_MONITORS: PlatformCaps = PlatformCaps(1 << 6);
    pub const SET_CONTEXT: PlatformCaps = PlatformCaps(1 << 7);

    pub const fn union(self, other: PlatformCaps) -> PlatformCaps {
        PlatformCaps(self.0 | other.0)
    }

    pub fn contains(self, other: PlatformCaps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PlatformCaps {
    type Output = PlatformCaps;
    fn bitor(self, rhs: PlatformCaps) -> PlatformCaps {
        self.union(rhs)
    }
}

/// A fully-realized physical output.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorDescriptor {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub scale: i32,
    pub refresh_mhz: i32,
    pub x: i32,
    pub y: i32,
}

impl MonitorDescriptor {
    pub fn refresh_hz(&self) -> f32 {
        self.refresh_mhz as f32 / 1000.0
    }
}

/// Events drained by the daemon's loop.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    OutputAdded(MonitorDescriptor),
    OutputUpdated(MonitorDescriptor),
    OutputRemoved { name: String },
    SurfaceConfigured { monitor: String, width: u32, height: u32 },
    FrameDone { monitor: String },
    PointerMotion { x: f64, y: f64 },
    PointerLeft,
    SurfaceClosed { monitor: String },
}

/// Raw display/surface pointers handed to the GPU layer.
pub struct RawSurfaceHandle {
    display: *mut c_void,
    surface: *mut c_void,
}

impl RawSurfaceHandle {
    fn new(conn: &Connection, layer_surface: &LayerSurface) -> Self {
        let display = conn.backend().display_ptr() as *mut c_void;
        let surface = layer_surface.wl_surface().id().as_ptr() as *mut c_void;
        Self { display, surface }
    }
}

impl raw_window_handle::HasDisplayHandle for RawSurfaceHandle {
    fn display_handle(
        &self,
    ) -> StdResult<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        let display =
            NonNull::new(self.display).ok_or(raw_window_handle::HandleError::Unavailable)?;
        let wayland = raw_window_handle::WaylandDisplayHandle::new(display);
        let raw = raw_window_handle::RawDisplayHandle::Wayland(wayland);
        Ok(unsafe { raw_window_handle::DisplayHandle::borrow_raw(raw) })
    }
}

impl raw_window_handle::HasWindowHandle for RawSurfaceHandle {
    fn window_handle(
        &self,
    ) -> StdResult<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        let surface =
            NonNull::new(self.surface).ok_or(raw_window_handle::HandleError::Unavailable)?;
        let wayland = raw_window_handle::WaylandWindowHandle::new(surface);
        let raw = raw_window_handle::RawWindowHandle::Wayland(wayland);
        Ok(unsafe { raw_window_handle::WindowHandle::borrow_raw(raw) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SurfaceKey(u64);

fn surface_key(surface: &wl_surface::WlSurface) -> SurfaceKey {
    SurfaceKey(surface.id().as_ptr() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OutputKey(u64);

fn output_key(output: &wl_output::WlOutput) -> OutputKey {
    OutputKey(output.id().as_ptr() as u64)
}

struct MonitorSurface {
    layer_surface: LayerSurface,
    output_key: OutputKey,
    monitor_name: String,
    configured_size: Option<(u32, u32)>,
}

pub struct Platform {
    conn: Connection,
    queue: EventQueue<PlatformState>,
    qh: QueueHandle<PlatformState>,
    pub state: PlatformState,
}

impl Platform {
    /// Connects to the display, tolerating session-startup races the same
    /// way compositor IPC connections do.
    pub fn connect() -> Result<Self> {
        let conn = connect_with_retry()?;
        let (globals, queue) = registry_queue_init::<PlatformState>(&conn)
            .map_err(|err| PlatformError::Protocol(format!("registry init: {err}")))?;
        let qh = queue.handle();

        let compositor = CompositorState::bind(&globals, &qh)
            .map_err(|_| PlatformError::MissingGlobal("wl_compositor"))?;
        let layer_shell = LayerShell::bind(&globals, &qh)
            .map_err(|_| PlatformError::MissingGlobal("zwlr_layer_shell_v1"))?;
        let registry_state = RegistryState::new(&globals);
        let output_state = OutputState::new(&globals, &qh);
        let seat_state = SeatState::new(&globals, &qh);

        let state = PlatformState {
            registry_state,
            output_state,
            seat_state,
            compositor,
            layer_shell,
            surfaces: HashMap::new(),
            realized: HashMap::new(),
            pointer_device: None,
            pointer: None,
            pointer_valid: false,
            global_cursor_follow: false,
            events: VecDeque::new(),
        };

        Ok(Self {
            conn,
            queue,
            qh,
            state,
        })
    }

    pub const fn capabilities() -> PlatformCaps {
        PlatformCaps::LAYER_SHELL
            .union(PlatformCaps::MULTI_OUTPUT)
            .union(PlatformCaps::EVENT_FD)
            .union(PlatformCaps::SURFACE_COMMIT)
            .union(PlatformCaps::REALIZE_MONITORS)
    }

    /// Readiness fd for the daemon's multiplexer.
    pub fn event_fd(&self) -> RawFd {
        self.conn.backend().poll_fd().as_raw_fd()
    }

    /// Non-blocking read + dispatch cycle; call when the fd signals.
    pub fn dispatch(&mut self) -> Result<()> {
        if let Some(guard) = self.queue.prepare_read() {
            let _ = guard.read();
        }
        self.queue
            .dispatch_pending(&mut self.state)
            .map_err(|err| PlatformError::Protocol(format!("dispatch: {err}")))?;
        self.flush();
        Ok(())
    }

    /// Blocking roundtrip, used during bootstrap only.
    pub fn roundtrip(&mut self) -> Result<()> {
        self.queue
            .roundtrip(&mut self.state)
            .map_err(|err| PlatformError::Protocol(format!("roundtrip: {err}")))?;
        Ok(())
    }

    pub fn flush(&self) {
        let _ = self.conn.flush();
    }

    pub fn drain_events(&mut self) -> Vec<PlatformEvent> {
        self.state.events.drain(..).collect()
    }

    /// Force-finalizes outputs whose geometry has arrived since they were
    /// first seen. The bootstrap calls this before the first render so no
    /// monitor is left half-realized.
    pub fn realize_pending(&mut self) {
        let outputs: Vec<_> = self.state.output_state.outputs().collect();
        for output in outputs {
            self.state.try_realize(&self.conn, &self.qh, &output);
        }
    }

    pub fn monitors(&self) -> Vec<MonitorDescriptor> {
        self.state.realized.values().cloned().collect()
    }

    pub fn surface_handle(&self, monitor: &str) -> Option<RawSurfaceHandle> {
        self.state
            .surface_for_monitor(monitor)
            .map(|surface| RawSurfaceHandle::new(&self.conn, &surface.layer_surface))
    }

    pub fn surface_size(&self, monitor: &str) -> Option<(u32, u32)> {
        self.state
            .surface_for_monitor(monitor)
            .and_then(|surface| surface.configured_size)
    }

    /// Commits the monitor's surface.
    pub fn commit(&self, monitor: &str) {
        if let Some(surface) = self.state.surface_for_monitor(monitor) {
            surface.layer_surface.commit();
        }
        self.flush();
    }

    /// Requests a frame callback and commits; the daemon's `frame_pending`
    /// flag pairs with the eventual [`PlatformEvent::FrameDone`].
    pub fn request_frame(&self, monitor: &str) {
        if let Some(surface) = self.state.surface_for_monitor(monitor) {
            let wl_surface = surface.layer_surface.wl_surface();
            wl_surface.frame(&self.qh, wl_surface.clone());
            surface.layer_surface.commit();
        }
        self.flush();
    }

    /// When enabled, a pointer leave keeps the last sample valid so a
    /// compositor-side cursor query can take over.
    pub fn set_global_cursor_follow(&mut self, enabled: bool) {
        self.state.global_cursor_follow = enabled;
    }

    pub fn pointer_position(&self) -> Option<(f64, f64)> {
        self.state.pointer.filter(|_| self.state.pointer_valid)
    }
}

fn connect_with_retry() -> Result<Connection> {
    let mut waited = false;
    for attempt in 0..=CONNECT_RETRIES {
        match Connection::connect_to_env() {
            Ok(conn) => {
                if waited {
                    tracing::info!(retries = attempt, "connected to Wayland after {attempt} retries");
                }
                return Ok(conn);
            }
            Err(err) => {
                if attempt == CONNECT_RETRIES {
                    return Err(PlatformError::NoDisplay(err.to_string()));
                }
                if !waited {
                    tracing::info!("waiting for Wayland display…");
                    waited = true;
                }
                thread::sleep(CONNECT_DELAY);
            }
        }
    }
    unreachable!("retry loop returns on the final attempt")
}

pub struct PlatformState {
    registry_state: RegistryState,
    output_state: OutputState,
    seat_state: SeatState,
    compositor: CompositorState,
    layer_shell: LayerShell,
    surfaces: HashMap<SurfaceKey, MonitorSurface>,
    realized: HashMap<OutputKey, MonitorDescriptor>,
    pointer_device: Option<wl_pointer::WlPointer>,
    pointer: Option<(f64, f64)>,
    pointer_valid: bool,
    global_cursor_follow: bool,
    events: VecDeque<PlatformEvent>,
}

impl PlatformState {
    fn surface_for_monitor(&self, monitor: &str) -> Option<&MonitorSurface> {
        self.surfaces
            .values()
            .find(|surface| surface.monitor_name == monitor)
    }

    /// Realizes an output once its info is complete and ensures its layer
    /// surface exists. Safe to call repeatedly; re-realization on hotplug
    /// updates geometry in place.
    fn try_realize(
        &mut self,
        conn: &Connection,
        qh: &QueueHandle<PlatformState>,
        output: &wl_output::WlOutput,
    ) {
        let Some(info) = self.output_state.info(output) else {
            return;
        };
        let Some(descriptor) = descriptor_from_info(&info) else {
            tracing::debug!(output = ?info.name, "output not yet realizable");
            return;
        };

        let key = output_key(output);
        let known = self.realized.get(&key);
        let changed = known.map(|prev| prev != &descriptor).unwrap_or(true);
        let newly_realized = known.is_none();
        if changed {
            self.realized.insert(key, descriptor.clone());
            if newly_realized {
                tracing::info!(
                    monitor = %descriptor.name,
                    width = descriptor.width,
                    height = descriptor.height,
                    scale = descriptor.scale,
                    refresh_hz = descriptor.refresh_hz(),
                    "realized output"
                );
                self.events
                    .push_back(PlatformEvent::OutputAdded(descriptor.clone()));
            } else {
                self.events
                    .push_back(PlatformEvent::OutputUpdated(descriptor.clone()));
            }
        }

        self.ensure_surface(conn, qh, output, &descriptor);
    }

    fn ensure_surface(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<PlatformState>,
        output: &wl_output::WlOutput,
        descriptor: &MonitorDescriptor,
    ) {
        let key = output_key(output);
        if let Some(existing) = self
            .surfaces
            .values_mut()
            .find(|surface| surface.output_key == key)
        {
            existing.monitor_name = descriptor.name.clone();
            return;
        }

        let wl_surface = self.compositor.create_surface(qh);
        let layer_surface = self.layer_shell.create_layer_surface(
            qh,
            wl_surface,
            Layer::Background,
            Some("hyprlax".to_string()),
            Some(output),
        );
        layer_surface.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer_surface.set_exclusive_zone(-1);

        // An empty input region makes the wallpaper click-through.
        match Region::new(&self.compositor) {
            Ok(region) => {
                layer_surface
                    .wl_surface()
                    .set_input_region(Some(region.wl_region()));
            }
            Err(err) => {
                tracing::warn!(%err, "failed to create empty input region");
            }
        }
        layer_surface.commit();

        let surface_id = surface_key(layer_surface.wl_surface());
        self.surfaces.insert(
            surface_id,
            MonitorSurface {
                layer_surface,
                output_key: key,
                monitor_name: descriptor.name.clone(),
                configured_size: None,
            },
        );
    }

    /// Converts a surface-local pointer sample into global coordinates.
    fn global_pointer(&self, surface: &wl_surface::WlSurface, position: (f64, f64)) -> Option<(f64, f64)> {
        let key = surface_key(surface);
        let monitor_surface = self.surfaces.get(&key)?;
        let descriptor = self.realized.get(&monitor_surface.output_key)?;
        Some((
            descriptor.x as f64 + position.0,
            descriptor.y as f64 + position.1,
        ))
    }
}

fn descriptor_from_info(info: &OutputInfo) -> Option<MonitorDescriptor> {
    let name = info.name.clone()?;
    let mode = info.modes.iter().find(|mode| mode.current)?;
    let (x, y) = info.logical_position.unwrap_or(info.location);
    Some(MonitorDescriptor {
        name,
        width: mode.dimensions.0.max(1) as u32,
        height: mode.dimensions.1.max(1) as u32,
        scale: info.scale_factor.max(1),
        refresh_mhz: mode.refresh_rate,
        x,
        y,
    })
}

impl CompositorHandler for PlatformState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        let key = surface_key(surface);
        if let Some(monitor_surface) = self.surfaces.get(&key) {
            self.events.push_back(PlatformEvent::FrameDone {
                monitor: monitor_surface.monitor_name.clone(),
            });
        }
    }
}

impl OutputHandler for PlatformState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, conn: &Connection, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        self.try_realize(conn, qh, &output);
    }

    fn update_output(
        &mut self,
        conn: &Connection,
        qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        self.try_realize(conn, qh, &output);
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        let key = output_key(&output);
        if let Some(descriptor) = self.realized.remove(&key) {
            self.events.push_back(PlatformEvent::OutputRemoved {
                name: descriptor.name,
            });
        }
        self.surfaces.retain(|_, surface| surface.output_key != key);
    }
}

impl LayerShellHandler for PlatformState {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        let key = surface_key(layer.wl_surface());
        if let Some(surface) = self.surfaces.remove(&key) {
            self.events.push_back(PlatformEvent::SurfaceClosed {
                monitor: surface.monitor_name,
            });
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let key = surface_key(layer.wl_surface());
        let Some(surface) = self.surfaces.get_mut(&key) else {
            return;
        };
        let (mut width, mut height) = configure.new_size;
        if width == 0 || height == 0 {
            if let Some(descriptor) = self.realized.get(&surface.output_key) {
                width = descriptor.width;
                height = descriptor.height;
            } else {
                return;
            }
        }
        surface.configured_size = Some((width, height));
        tracing::debug!(monitor = %surface.monitor_name, width, height, "layer surface configured");
        self.events.push_back(PlatformEvent::SurfaceConfigured {
            monitor: surface.monitor_name.clone(),
            width,
            height,
        });
    }
}

impl SeatHandler for PlatformState {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer {
            match self.seat_state.get_pointer(qh, &seat) {
                Ok(pointer) => self.pointer_device = Some(pointer),
                Err(err) => tracing::warn!(%err, "failed to acquire pointer"),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer {
            self.pointer_device = None;
            self.pointer_valid = false;
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}
}

impl PointerHandler for PlatformState {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            match event.kind {
                PointerEventKind::Enter { .. } | PointerEventKind::Motion { .. } => {
                    if let Some(global) = self.global_pointer(&event.surface, event.position) {
                        self.pointer = Some(global);
                        self.pointer_valid = true;
                        self.events.push_back(PlatformEvent::PointerMotion {
                            x: global.0,
                            y: global.1,
                        });
                    }
                }
                PointerEventKind::Leave { .. } => {
                    // With global cursor follow the compositor query keeps
                    // supplying positions, so the sample stays valid.
                    if !self.global_cursor_follow {
                        self.pointer_valid = false;
                        self.events.push_back(PlatformEvent::PointerLeft);
                    }
                }
                _ => {}
            }
        }
    }
}

impl ProvidesRegistryState for PlatformState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

delegate_compositor!(PlatformState);
delegate_output!(PlatformState);
delegate_layer!(PlatformState);
delegate_seat!(PlatformState);
delegate_pointer!(PlatformState);
delegate_registry!(PlatformState);
