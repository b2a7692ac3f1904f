//! Compositor adapters normalizing five workspace models into one event.
//!
//! Each supported compositor speaks a different IPC dialect (line-oriented
//! sockets, i3 framed messages, NDJSON subprocesses, length-prefixed JSON, a
//! Wayland protocol extension). The adapters translate all of them into
//! [`WorkspaceChange`] events that the daemon feeds to its animation engine,
//! and expose a readiness fd so the event loop can block on all of them at
//! once.
//!
//! ```text
//!   Hyprland .socket2.sock ──┐
//!   sway IPC ────────────────┤
//!   niri msg event-stream ───┼──▶ Backend::poll ──▶ Vec<WorkspaceChange>
//!   wayfire IPC ─────────────┤
//!   zriver_status_manager ───┘
//! ```

mod generic;
mod hyprland;
mod niri;
mod retry;
mod river;
mod sway;
mod wayfire;

pub use generic::GenericWayland;
pub use hyprland::Hyprland;
pub use niri::Niri;
pub use retry::connect_with_retry;
pub use river::River;
pub use sway::Sway;
pub use wayfire::Wayfire;

use std::collections::HashMap;
use std::fmt;
use std::os::unix::io::RawFd;

use workspace::WorkspaceModel;

#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("no compositor detected")]
    NoCompositor,
    #[error("unknown compositor '{0}'")]
    UnknownName(String),
    #[error("compositor connection unavailable: {0}")]
    NoDisplay(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompositorError>;

/// One normalized workspace transition.
///
/// 1D backends zero the 2D pair; 2D backends fill both the encoded 1D ids
/// and the coordinates. `from_*` fields are `-1` when the source genuinely
/// cannot know the prior position (the engine then falls back to the
/// monitor's cached context). `monitor_name` is empty when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkspaceChange {
    pub from_id: i32,
    pub to_id: i32,
    pub from_x: i32,
    pub from_y: i32,
    pub to_x: i32,
    pub to_y: i32,
    pub monitor_name: String,
}

/// Focused-window geometry in global compositor space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub workspace_id: i32,
    pub monitor_id: i32,
    pub monitor_name: String,
    pub floating: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceInfo {
    pub id: i32,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MonitorInfo {
    pub id: i32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub scale: f64,
    pub primary: bool,
}

/// Compositor capability bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Caps(pub u64);

impl Caps {
    pub const GLOBAL_CURSOR: Caps = Caps(1 << 0);
    pub const WS_GLOBAL_NUMERIC: Caps = Caps(1 << 1);
    pub const WS_PER_OUTPUT_NUMERIC: Caps = Caps(1 << 2);
    pub const WS_TAG_BASED: Caps = Caps(1 << 3);
    pub const WS_SET_BASED: Caps = Caps(1 << 4);

    pub const fn union(self, other: Caps) -> Caps {
        Caps(self.0 | other.0)
    }

    pub fn contains(self, other: Caps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Caps {
    type Output = Caps;
    fn bitor(self, rhs: Caps) -> Caps {
        self.union(rhs)
    }
}

/// Environment snapshot used for detection, injectable in tests.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_env() -> Self {
        const KEYS: &[&str] = &[
            "HYPRLAND_INSTANCE_SIGNATURE",
            "WAYLAND_DISPLAY",
            "XDG_RUNTIME_DIR",
            "XDG_CURRENT_DESKTOP",
            "XDG_SESSION_TYPE",
            "NIRI_SOCKET",
            "SWAYSOCK",
            "I3SOCK",
        ];
        let mut vars = HashMap::new();
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                if !value.is_empty() {
                    vars.insert((*key).to_string(), value);
                }
            }
        }
        Self { vars }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn desktop_contains(&self, needle: &str) -> bool {
        self.get("XDG_CURRENT_DESKTOP")
            .map(|desktop| desktop.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    pub fn runtime_dir(&self) -> Option<&str> {
        self.get("XDG_RUNTIME_DIR")
    }
}

/// Common contract every backend fulfils.
pub trait Adapter {
    fn name(&self) -> &'static str;

    /// Establishes the event transport, retrying through compositor startup
    /// races where applicable.
    fn connect(&mut self) -> Result<()>;

    /// Drains pending events, pushing normalized changes. A healthy "no
    /// events right now" is `Ok` with nothing pushed.
    fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()>;

    /// Readiness fd for the event loop, if the transport has one.
    fn event_fd(&self) -> Option<RawFd>;

    fn capabilities(&self) -> Caps;

    fn workspace_model(&self) -> WorkspaceModel;

    fn send_command(&mut self, _command: &str) -> Result<String> {
        Err(CompositorError::Protocol(
            "compositor does not accept commands".into(),
        ))
    }

    fn cursor_position(&mut self) -> Option<(f64, f64)> {
        None
    }

    fn active_window(&mut self) -> Option<WindowGeometry> {
        None
    }

    fn supports_blur(&self) -> bool {
        false
    }

    fn supports_transparency(&self) -> bool {
        true
    }

    fn supports_animations(&self) -> bool {
        false
    }

    fn list_workspaces(&mut self) -> Vec<WorkspaceInfo> {
        Vec::new()
    }

    fn list_monitors(&mut self) -> Vec<MonitorInfo> {
        Vec::new()
    }
}

/// Sealed sum of the supported backends.
pub enum Backend {
    Hyprland(Hyprland),
    Sway(Sway),
    Niri(Niri),
    Wayfire(Wayfire),
    River(River),
    Generic(GenericWayland),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.name()).finish()
    }
}

macro_rules! delegate {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            Backend::Hyprland($inner) => $body,
            Backend::Sway($inner) => $body,
            Backend::Niri($inner) => $body,
            Backend::Wayfire($inner) => $body,
            Backend::River($inner) => $body,
            Backend::Generic($inner) => $body,
        }
    };
}

impl Backend {
    /// Auto-detects the running compositor. First positive wins, in the
    /// order Hyprland, Wayfire, Niri, Sway, River, generic Wayland.
    pub fn detect(env: &EnvSnapshot) -> Result<Backend> {
        if Hyprland::detect(env) {
            Ok(Backend::Hyprland(Hyprland::new(env)?))
        } else if Wayfire::detect(env) {
            Ok(Backend::Wayfire(Wayfire::new(env)?))
        } else if Niri::detect(env) {
            Ok(Backend::Niri(Niri::new()))
        } else if Sway::detect(env) {
            Ok(Backend::Sway(Sway::new(env)?))
        } else if River::detect(env) {
            Ok(Backend::River(River::new()))
        } else if GenericWayland::detect(env) {
            Ok(Backend::Generic(GenericWayland::new()))
        } else {
            Err(CompositorError::NoCompositor)
        }
    }

    /// Creates a backend by name; `auto` runs detection. Unknown names fail.
    pub fn create(name: &str, env: &EnvSnapshot) -> Result<Backend> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Backend::detect(env),
            "hyprland" => Ok(Backend::Hyprland(Hyprland::new(env)?)),
            "sway" => Ok(Backend::Sway(Sway::new(env)?)),
            "niri" => Ok(Backend::Niri(Niri::new())),
            "wayfire" => Ok(Backend::Wayfire(Wayfire::new(env)?)),
            "river" => Ok(Backend::River(River::new())),
            "generic" | "wayland" => Ok(Backend::Generic(GenericWayland::new())),
            other => Err(CompositorError::UnknownName(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        delegate!(self, inner => inner.name())
    }

    pub fn connect(&mut self) -> Result<()> {
        delegate!(self, inner => inner.connect())
    }

    pub fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()> {
        delegate!(self, inner => inner.poll(events))
    }

    pub fn event_fd(&self) -> Option<RawFd> {
        delegate!(self, inner => inner.event_fd())
    }

    /// Static capabilities normalized against actual function presence: a
    /// backend that answers cursor queries advertises the cursor bit even
    /// when it did not declare it.
    pub fn capabilities(&self) -> Caps {
        let caps = delegate!(self, inner => inner.capabilities());
        if self.has_cursor_query() {
            caps | Caps::GLOBAL_CURSOR
        } else {
            caps
        }
    }

    fn has_cursor_query(&self) -> bool {
        matches!(self, Backend::Hyprland(_))
    }

    pub fn workspace_model(&self) -> WorkspaceModel {
        delegate!(self, inner => inner.workspace_model())
    }

    pub fn send_command(&mut self, command: &str) -> Result<String> {
        delegate!(self, inner => inner.send_command(command))
    }

    pub fn cursor_position(&mut self) -> Option<(f64, f64)> {
        delegate!(self, inner => inner.cursor_position())
    }

    pub fn active_window(&mut self) -> Option<WindowGeometry> {
        delegate!(self, inner => inner.active_window())
    }

    pub fn supports_blur(&self) -> bool {
        delegate!(self, inner => inner.supports_blur())
    }

    pub fn supports_transparency(&self) -> bool {
        delegate!(self, inner => inner.supports_transparency())
    }

    pub fn supports_animations(&self) -> bool {
        delegate!(self, inner => inner.supports_animations())
    }

    pub fn list_workspaces(&mut self) -> Vec<WorkspaceInfo> {
        delegate!(self, inner => inner.list_workspaces())
    }

    pub fn list_monitors(&mut self) -> Vec<MonitorInfo> {
        delegate!(self, inner => inner.list_monitors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_order_prefers_hyprland() {
        let env = EnvSnapshot::default()
            .with("HYPRLAND_INSTANCE_SIGNATURE", "abc123")
            .with("XDG_RUNTIME_DIR", "/tmp")
            .with("NIRI_SOCKET", "/tmp/niri.sock")
            .with("SWAYSOCK", "/tmp/sway.sock");
        let backend = Backend::detect(&env).unwrap();
        assert_eq!(backend.name(), "hyprland");
    }

    #[test]
    fn detection_falls_back_to_generic() {
        let env = EnvSnapshot::default().with("WAYLAND_DISPLAY", "wayland-1");
        let backend = Backend::detect(&env).unwrap();
        assert_eq!(backend.name(), "generic");
    }

    #[test]
    fn nothing_detected_errors() {
        let env = EnvSnapshot::default();
        assert!(matches!(
            Backend::detect(&env),
            Err(CompositorError::NoCompositor)
        ));
    }

    #[test]
    fn named_creation_rejects_unknown() {
        let env = EnvSnapshot::default();
        assert!(matches!(
            Backend::create("kwin", &env),
            Err(CompositorError::UnknownName(_))
        ));
    }

    #[test]
    fn named_creation_maps_aliases() {
        let env = EnvSnapshot::default()
            .with("XDG_RUNTIME_DIR", "/tmp")
            .with("WAYLAND_DISPLAY", "wayland-1")
            .with("HYPRLAND_INSTANCE_SIGNATURE", "sig");
        assert_eq!(Backend::create("wayland", &env).unwrap().name(), "generic");
        assert_eq!(Backend::create("hyprland", &env).unwrap().name(), "hyprland");
    }

    #[test]
    fn cursor_capability_forced_for_hyprland() {
        let env = EnvSnapshot::default()
            .with("XDG_RUNTIME_DIR", "/tmp")
            .with("HYPRLAND_INSTANCE_SIGNATURE", "sig");
        let backend = Backend::create("hyprland", &env).unwrap();
        assert!(backend.capabilities().contains(Caps::GLOBAL_CURSOR));
    }
}
