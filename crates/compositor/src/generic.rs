//! Fallback adapter for unrecognized Wayland compositors.
//!
//! Detection is an environment sniff only. There is no event transport, so
//! the wallpaper sits on a single fixed workspace and parallax comes from
//! the cursor and window sources alone.

use std::os::unix::io::RawFd;

use workspace::WorkspaceModel;

use crate::{Adapter, Caps, EnvSnapshot, Result, WorkspaceChange};

pub struct GenericWayland;

impl GenericWayland {
    pub fn detect(env: &EnvSnapshot) -> bool {
        env.get("WAYLAND_DISPLAY").is_some()
            || env
                .get("XDG_SESSION_TYPE")
                .map(|session| session == "wayland")
                .unwrap_or(false)
    }

    pub fn new() -> Self {
        Self
    }
}

impl Default for GenericWayland {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for GenericWayland {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn poll(&mut self, _events: &mut Vec<WorkspaceChange>) -> Result<()> {
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        None
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_GLOBAL_NUMERIC
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::GlobalNumeric
    }
}
