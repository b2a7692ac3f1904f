//! Hyprland adapter.
//!
//! Hyprland exposes two UNIX sockets under
//! `$XDG_RUNTIME_DIR/hypr/<instance>/`: `.socket.sock` answers one-shot
//! commands (NUL-terminated request, short JSON reply) and `.socket2.sock`
//! streams events as `event>>data` lines. Workspaces are a single global
//! numeric sequence.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use workspace::WorkspaceModel;

use crate::retry::connect_with_retry;
use crate::{
    Adapter, Caps, CompositorError, EnvSnapshot, MonitorInfo, Result, WindowGeometry,
    WorkspaceChange, WorkspaceInfo,
};

/// Monitor names at or above this length are considered garbage and dropped.
const MAX_MONITOR_NAME: usize = 64;

const CONNECT_RETRIES: u32 = 150;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

pub struct Hyprland {
    command_path: PathBuf,
    event_path: PathBuf,
    stream: Option<UnixStream>,
    decoder: EventDecoder,
    has_split_monitor_plugin: bool,
}

impl Hyprland {
    pub fn detect(env: &EnvSnapshot) -> bool {
        env.get("HYPRLAND_INSTANCE_SIGNATURE").is_some() || env.desktop_contains("hyprland")
    }

    pub fn new(env: &EnvSnapshot) -> Result<Self> {
        let runtime_dir = env
            .runtime_dir()
            .ok_or_else(|| CompositorError::NoDisplay("XDG_RUNTIME_DIR not set".into()))?;
        let signature = env.get("HYPRLAND_INSTANCE_SIGNATURE").ok_or_else(|| {
            CompositorError::NoDisplay("HYPRLAND_INSTANCE_SIGNATURE not set".into())
        })?;
        let base = PathBuf::from(runtime_dir).join("hypr").join(signature);
        Ok(Self {
            command_path: base.join(".socket.sock"),
            event_path: base.join(".socket2.sock"),
            stream: None,
            decoder: EventDecoder::default(),
            has_split_monitor_plugin: false,
        })
    }

    pub fn has_split_monitor_plugin(&self) -> bool {
        self.has_split_monitor_plugin
    }

    /// One-shot command over a fresh socket. Hyprland closes the connection
    /// after replying, and some commands legitimately produce no output, so
    /// the response wait is bounded rather than blocking.
    fn command(&self, command: &str) -> Result<String> {
        let mut stream = UnixStream::connect(&self.command_path)
            .map_err(|err| CompositorError::NoDisplay(format!("hyprland command socket: {err}")))?;
        stream.write_all(command.as_bytes())?;
        stream.write_all(&[0])?;

        stream.set_nonblocking(true)?;
        let mut response = Vec::new();
        let mut chunk = [0u8; 4096];
        for _ in 0..5 {
            let mut fds = [rustix::event::PollFd::new(
                &stream,
                rustix::event::PollFlags::IN,
            )];
            match rustix::event::poll(&mut fds, 10) {
                Ok(0) | Err(_) => continue,
                Ok(_) => {}
            }
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => response.extend_from_slice(&chunk[..n]),
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                }
            }
            if !response.is_empty() {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    fn json_command<T: for<'de> Deserialize<'de>>(&self, command: &str) -> Option<T> {
        let response = self.command(command).ok()?;
        if response.is_empty() {
            return None;
        }
        match serde_json::from_str(&response) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(%command, %err, "hyprland reply did not parse");
                None
            }
        }
    }
}

impl Adapter for Hyprland {
    fn name(&self) -> &'static str {
        "hyprland"
    }

    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = connect_with_retry(&self.event_path, "Hyprland", CONNECT_RETRIES, CONNECT_DELAY)?;
        stream.set_nonblocking(true)?;
        self.stream = Some(stream);

        #[derive(Deserialize)]
        struct ActiveWorkspace {
            id: i32,
        }
        if let Some(active) = self.json_command::<ActiveWorkspace>("j/activeworkspace") {
            self.decoder.current_workspace = active.id;
        }

        // The split-monitor-workspaces plugin changes workspace numbering;
        // record its presence as a capability flag only.
        if let Ok(plugins) = self.command("j/plugins") {
            self.has_split_monitor_plugin = plugins.contains("split-monitor-workspaces");
            if self.has_split_monitor_plugin {
                tracing::debug!("detected split-monitor-workspaces plugin");
            }
        }
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            // Disconnected: silent no-events until a reconnect succeeds.
            if let Ok(stream) = UnixStream::connect(&self.event_path) {
                stream.set_nonblocking(true)?;
                self.stream = Some(stream);
            }
            return Ok(());
        };

        let mut chunk = [0u8; 4096];
        let mut disconnected = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!("hyprland event socket closed");
                    disconnected = true;
                    break;
                }
                Ok(n) => self
                    .decoder
                    .feed(&String::from_utf8_lossy(&chunk[..n]), events),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(%err, "hyprland event read failed");
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.stream = None;
        }
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|stream| stream.as_raw_fd())
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_GLOBAL_NUMERIC | Caps::GLOBAL_CURSOR
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::GlobalNumeric
    }

    fn send_command(&mut self, command: &str) -> Result<String> {
        self.command(command)
    }

    fn cursor_position(&mut self) -> Option<(f64, f64)> {
        #[derive(Deserialize)]
        struct CursorPos {
            x: f64,
            y: f64,
        }
        let pos = self.json_command::<CursorPos>("j/cursorpos")?;
        Some((pos.x, pos.y))
    }

    fn active_window(&mut self) -> Option<WindowGeometry> {
        #[derive(Deserialize)]
        struct WorkspaceRef {
            id: i32,
        }
        #[derive(Deserialize)]
        struct ActiveWindow {
            // Windowless responses are `{}`; require the class field so they
            // map to "no data" rather than a zeroed geometry.
            #[allow(dead_code)]
            class: String,
            at: [f64; 2],
            size: [f64; 2],
            workspace: WorkspaceRef,
            #[serde(default)]
            monitor: i32,
            #[serde(default, rename = "monitorName")]
            monitor_name: String,
            #[serde(default)]
            floating: bool,
        }
        let window = self.json_command::<ActiveWindow>("j/activewindow")?;
        Some(WindowGeometry {
            x: window.at[0],
            y: window.at[1],
            width: window.size[0],
            height: window.size[1],
            workspace_id: window.workspace.id,
            monitor_id: window.monitor,
            monitor_name: window.monitor_name,
            floating: window.floating,
        })
    }

    fn supports_blur(&self) -> bool {
        true
    }

    fn supports_animations(&self) -> bool {
        true
    }

    fn list_workspaces(&mut self) -> Vec<WorkspaceInfo> {
        #[derive(Deserialize)]
        struct Workspace {
            id: i32,
            #[serde(default)]
            name: String,
        }
        let current = self.decoder.current_workspace;
        self.json_command::<Vec<Workspace>>("j/workspaces")
            .unwrap_or_default()
            .into_iter()
            .map(|ws| WorkspaceInfo {
                id: ws.id,
                name: ws.name,
                active: ws.id == current,
            })
            .collect()
    }

    fn list_monitors(&mut self) -> Vec<MonitorInfo> {
        #[derive(Deserialize)]
        struct Monitor {
            id: i32,
            name: String,
            x: i32,
            y: i32,
            width: i32,
            height: i32,
            #[serde(default = "default_scale")]
            scale: f64,
            #[serde(default)]
            focused: bool,
        }
        fn default_scale() -> f64 {
            1.0
        }
        self.json_command::<Vec<Monitor>>("j/monitors")
            .unwrap_or_default()
            .into_iter()
            .map(|monitor| MonitorInfo {
                id: monitor.id,
                name: monitor.name,
                x: monitor.x,
                y: monitor.y,
                width: monitor.width,
                height: monitor.height,
                scale: monitor.scale,
                primary: monitor.focused,
            })
            .collect()
    }
}

/// Line decoder for the `.socket2.sock` stream, separated from socket I/O so
/// tests can inject event text directly.
#[derive(Debug)]
pub struct EventDecoder {
    pending: String,
    current_workspace: i32,
    monitor_name: String,
    workspace_owner: HashMap<i32, String>,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            pending: String::new(),
            current_workspace: 1,
            monitor_name: String::new(),
            workspace_owner: HashMap::new(),
        }
    }
}

impl EventDecoder {
    #[cfg(test)]
    pub fn with_state(current_workspace: i32, monitor_name: &str) -> Self {
        Self {
            current_workspace,
            monitor_name: monitor_name.to_string(),
            ..Self::default()
        }
    }

    /// Which monitor last claimed a workspace, for steal detection.
    pub fn workspace_owner(&self, workspace: i32) -> Option<&str> {
        self.workspace_owner.get(&workspace).map(String::as_str)
    }

    pub fn feed(&mut self, text: &str, events: &mut Vec<WorkspaceChange>) {
        self.pending.push_str(text);
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            self.handle_line(line.trim_end_matches('\n'), events);
        }
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<WorkspaceChange>) {
        if let Some(data) = line.strip_prefix("workspace>>") {
            let Ok(new_workspace) = data.trim().parse::<i32>() else {
                tracing::debug!(%line, "unparseable workspace event");
                return;
            };
            if new_workspace == self.current_workspace {
                return;
            }
            events.push(WorkspaceChange {
                from_id: self.current_workspace,
                to_id: new_workspace,
                from_x: 0,
                from_y: 0,
                to_x: 0,
                to_y: 0,
                monitor_name: self.monitor_name.clone(),
            });
            tracing::debug!(
                from = self.current_workspace,
                to = new_workspace,
                "workspace change"
            );
            self.current_workspace = new_workspace;
        } else if let Some(data) = line.strip_prefix("focusedmon>>") {
            // `focusedmon` caches the monitor for later workspace events but
            // must never emit a change itself.
            let Some((name, workspace)) = data.split_once(',') else {
                return;
            };
            if !name.is_empty() && name.len() < MAX_MONITOR_NAME {
                self.monitor_name = name.to_string();
                if let Ok(workspace) = workspace.trim().parse::<i32>() {
                    self.workspace_owner
                        .insert(workspace, self.monitor_name.clone());
                }
                tracing::debug!(monitor = %self.monitor_name, "monitor focus changed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut EventDecoder, text: &str) -> Vec<WorkspaceChange> {
        let mut events = Vec::new();
        decoder.feed(text, &mut events);
        events
    }

    #[test]
    fn focusedmon_then_workspace_yields_one_event() {
        let mut decoder = EventDecoder::default();
        let events = drain(&mut decoder, "focusedmon>>DP-3,3\nworkspace>>4\n");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.from_id, 1);
        assert_eq!(event.to_id, 4);
        assert_eq!(event.monitor_name, "DP-3");
        assert_eq!((event.from_x, event.from_y, event.to_x, event.to_y), (0, 0, 0, 0));
    }

    #[test]
    fn focusedmon_alone_emits_nothing() {
        let mut decoder = EventDecoder::default();
        assert!(drain(&mut decoder, "focusedmon>>DP-1,2\nfocusedmon>>DP-2,5\n").is_empty());
    }

    #[test]
    fn oversized_monitor_name_is_dropped() {
        let mut decoder = EventDecoder::default();
        let long_name = "A".repeat(200);
        let events = drain(&mut decoder, &format!("focusedmon>>{long_name},5\nworkspace>>6\n"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_id, 6);
        assert_eq!(events[0].monitor_name, "");
    }

    #[test]
    fn same_workspace_is_suppressed() {
        let mut decoder = EventDecoder::with_state(4, "DP-1");
        assert!(drain(&mut decoder, "workspace>>4\n").is_empty());
    }

    #[test]
    fn partial_lines_reassemble() {
        let mut decoder = EventDecoder::default();
        assert!(drain(&mut decoder, "worksp").is_empty());
        let events = drain(&mut decoder, "ace>>2\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_id, 2);
    }

    #[test]
    fn workspace_owner_tracked_from_focusedmon() {
        let mut decoder = EventDecoder::default();
        drain(&mut decoder, "focusedmon>>HDMI-A-1,7\n");
        assert_eq!(decoder.workspace_owner(7), Some("HDMI-A-1"));
    }
}
