//! Wayfire adapter.
//!
//! Wayfire's IPC socket lives at `$XDG_RUNTIME_DIR/wayfire-$WAYLAND_DISPLAY.sock`
//! and speaks length-prefixed JSON (u32 little-endian length, then the
//! payload). Workspaces form a 2D grid inside workspace sets; the grid
//! position is reported directly as `x`/`y` in `workspace-changed` events.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use workspace::WorkspaceModel;

use crate::retry::connect_with_retry;
use crate::{Adapter, Caps, CompositorError, EnvSnapshot, Result, WorkspaceChange};

const CONNECT_RETRIES: u32 = 30;
const CONNECT_DELAY: Duration = Duration::from_millis(500);

/// Grid columns assumed when flattening the 2D position into the 1D id.
const GRID_WIDTH: i32 = 3;

pub struct Wayfire {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    frames: LengthDecoder,
    decoder: EventDecoder,
}

impl Wayfire {
    pub fn detect(env: &EnvSnapshot) -> bool {
        if env.desktop_contains("wayfire") {
            return true;
        }
        // Env alone is ambiguous; probe for the socket.
        Self::socket_path(env)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    fn socket_path(env: &EnvSnapshot) -> Option<PathBuf> {
        let runtime_dir = env.runtime_dir()?;
        let display = env.get("WAYLAND_DISPLAY")?;
        Some(PathBuf::from(runtime_dir).join(format!("wayfire-{display}.sock")))
    }

    pub fn new(env: &EnvSnapshot) -> Result<Self> {
        let socket_path = Self::socket_path(env).ok_or_else(|| {
            CompositorError::NoDisplay("XDG_RUNTIME_DIR or WAYLAND_DISPLAY not set".into())
        })?;
        Ok(Self {
            socket_path,
            stream: None,
            frames: LengthDecoder::default(),
            decoder: EventDecoder::default(),
        })
    }
}

impl Adapter for Wayfire {
    fn name(&self) -> &'static str {
        "wayfire"
    }

    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut stream =
            connect_with_retry(&self.socket_path, "Wayfire", CONNECT_RETRIES, CONNECT_DELAY)?;
        let watch = serde_json::json!({
            "method": "window-rules/events/watch",
            "data": { "events": ["workspace-changed", "wset-workspace-changed"] },
        });
        stream.write_all(&encode_message(&watch.to_string()))?;
        stream.set_nonblocking(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut chunk = [0u8; 8192];
        let mut disconnected = false;
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!("wayfire socket closed");
                    disconnected = true;
                    break;
                }
                Ok(n) => self.frames.feed(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(%err, "wayfire read failed");
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.stream = None;
        }
        while let Some(payload) = self.frames.next_message() {
            self.decoder.handle_payload(&payload, events);
        }
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|stream| stream.as_raw_fd())
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_SET_BASED
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::SetBased
    }

    fn send_command(&mut self, command: &str) -> Result<String> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(CompositorError::NoDisplay("wayfire not connected".into()));
        };
        stream.write_all(&encode_message(command))?;
        // Bounded wait for the reply frame; commands that produce no output
        // are valid.
        let mut chunk = [0u8; 8192];
        for _ in 0..5 {
            let mut fds = [rustix::event::PollFd::new(
                &*stream,
                rustix::event::PollFlags::IN,
            )];
            match rustix::event::poll(&mut fds, 10) {
                Ok(0) | Err(_) => continue,
                Ok(_) => {}
            }
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => self.frames.feed(&chunk[..n]),
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(err.into()),
                }
            }
            if let Some(payload) = self.frames.next_message() {
                return Ok(String::from_utf8_lossy(&payload).into_owned());
            }
        }
        Ok(String::new())
    }

    fn supports_blur(&self) -> bool {
        true
    }

    fn supports_animations(&self) -> bool {
        true
    }
}

fn encode_message(payload: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(4 + payload.len());
    message.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    message.extend_from_slice(payload.as_bytes());
    message
}

/// Reassembles length-prefixed JSON messages.
#[derive(Debug, Default)]
pub struct LengthDecoder {
    buf: Vec<u8>,
}

impl LengthDecoder {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = u32::from_le_bytes(self.buf[..4].try_into().unwrap()) as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        let payload = self.buf[4..4 + len].to_vec();
        self.buf.drain(..4 + len);
        Some(payload)
    }
}

/// Workspace-event decoder tracking the grid position and active set.
#[derive(Debug, Default)]
pub struct EventDecoder {
    current_x: i32,
    current_y: i32,
    current_set: i32,
}

impl EventDecoder {
    pub fn handle_payload(&mut self, payload: &[u8], events: &mut Vec<WorkspaceChange>) {
        #[derive(Deserialize)]
        struct WayfireEvent {
            event: String,
            #[serde(default)]
            x: Option<i32>,
            #[serde(default)]
            y: Option<i32>,
            #[serde(default)]
            wset: Option<i32>,
            #[serde(default)]
            output: Option<String>,
        }

        let event: WayfireEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%err, "ignoring wayfire message");
                return;
            }
        };
        if event.event != "workspace-changed" && event.event != "wset-workspace-changed" {
            return;
        }

        let new_x = event.x.unwrap_or(self.current_x);
        let new_y = event.y.unwrap_or(self.current_y);
        let new_set = event.wset.unwrap_or(self.current_set);

        if new_set != self.current_set {
            // A set switch is a teleport; snap state without animating.
            self.current_set = new_set;
            self.current_x = new_x;
            self.current_y = new_y;
            return;
        }
        if new_x == self.current_x && new_y == self.current_y {
            return;
        }

        events.push(WorkspaceChange {
            from_id: self.current_y * GRID_WIDTH + self.current_x,
            to_id: new_y * GRID_WIDTH + new_x,
            from_x: self.current_x,
            from_y: self.current_y,
            to_x: new_x,
            to_y: new_y,
            monitor_name: event.output.unwrap_or_default(),
        });
        tracing::debug!(
            from_x = self.current_x,
            from_y = self.current_y,
            to_x = new_x,
            to_y = new_y,
            "wayfire workspace change"
        );
        self.current_x = new_x;
        self.current_y = new_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(json: &str) -> Vec<u8> {
        encode_message(json)
    }

    #[test]
    fn length_framing_reassembles() {
        let mut frames = LengthDecoder::default();
        let message = framed(r#"{"event":"workspace-changed","x":1,"y":0}"#);
        frames.feed(&message[..3]);
        assert!(frames.next_message().is_none());
        frames.feed(&message[3..]);
        assert_eq!(
            frames.next_message().unwrap(),
            br#"{"event":"workspace-changed","x":1,"y":0}"#
        );
    }

    #[test]
    fn grid_move_produces_two_axis_event() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(br#"{"event":"workspace-changed","x":1,"y":1}"#, &mut events);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!((event.from_x, event.from_y), (0, 0));
        assert_eq!((event.to_x, event.to_y), (1, 1));
        assert_eq!(event.from_id, 0);
        assert_eq!(event.to_id, 4);
    }

    #[test]
    fn same_position_suppressed() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(br#"{"event":"workspace-changed","x":0,"y":0}"#, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn set_switch_snaps_without_event() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(
            br#"{"event":"wset-workspace-changed","wset":2,"x":2,"y":0}"#,
            &mut events,
        );
        assert!(events.is_empty());
        // A later move within the new set animates from the snapped position.
        decoder.handle_payload(br#"{"event":"workspace-changed","x":2,"y":1}"#, &mut events);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].from_x, events[0].from_y), (2, 0));
    }

    #[test]
    fn unrelated_events_ignored() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(br#"{"event":"view-mapped","x":5,"y":5}"#, &mut events);
        assert!(events.is_empty());
    }
}
