//! Sway adapter speaking the i3 IPC protocol.
//!
//! Messages are framed as `"i3-ipc"` + u32 payload length + u32 type, both
//! little-endian, followed by a JSON payload. Events carry the high bit in
//! the type field. Workspaces are global numeric, shared with i3.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use workspace::WorkspaceModel;

use crate::retry::connect_with_retry;
use crate::{
    Adapter, Caps, CompositorError, EnvSnapshot, MonitorInfo, Result, WorkspaceChange,
    WorkspaceInfo,
};

const MAGIC: &[u8; 6] = b"i3-ipc";
const HEADER_LEN: usize = 6 + 4 + 4;

const MSG_RUN_COMMAND: u32 = 0;
const MSG_GET_WORKSPACES: u32 = 1;
const MSG_SUBSCRIBE: u32 = 2;
const MSG_GET_OUTPUTS: u32 = 3;
const EVENT_BIT: u32 = 0x8000_0000;
const EVENT_WORKSPACE: u32 = EVENT_BIT;

const CONNECT_RETRIES: u32 = 30;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

pub struct Sway {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
    frames: FrameDecoder,
    decoder: EventDecoder,
}

impl Sway {
    pub fn detect(env: &EnvSnapshot) -> bool {
        env.get("SWAYSOCK").is_some() || env.desktop_contains("sway")
    }

    pub fn new(env: &EnvSnapshot) -> Result<Self> {
        let socket_path = env
            .get("SWAYSOCK")
            .or_else(|| env.get("I3SOCK"))
            .ok_or_else(|| CompositorError::NoDisplay("SWAYSOCK not set".into()))?;
        Ok(Self {
            socket_path: PathBuf::from(socket_path),
            stream: None,
            frames: FrameDecoder::default(),
            decoder: EventDecoder::default(),
        })
    }

    /// One-shot request over a dedicated connection, so replies never
    /// interleave with the subscribed event stream.
    fn request(&self, msg_type: u32, payload: &str) -> Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .map_err(|err| CompositorError::NoDisplay(format!("sway command socket: {err}")))?;
        stream.write_all(&encode_frame(msg_type, payload.as_bytes()))?;

        let mut decoder = FrameDecoder::default();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(CompositorError::Protocol("sway closed mid-reply".into()));
            }
            decoder.feed(&chunk[..n]);
            if let Some((_, payload)) = decoder.next_frame() {
                return Ok(payload);
            }
        }
    }
}

impl Adapter for Sway {
    fn name(&self) -> &'static str {
        "sway"
    }

    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut stream =
            connect_with_retry(&self.socket_path, "sway", CONNECT_RETRIES, CONNECT_DELAY)?;
        stream.write_all(&encode_frame(MSG_SUBSCRIBE, br#"["workspace"]"#))?;

        // The subscribe ack arrives before any event; consume it so the
        // event decoder only ever sees events.
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(CompositorError::Protocol(
                    "sway closed during subscribe".into(),
                ));
            }
            self.frames.feed(&chunk[..n]);
            if let Some((msg_type, payload)) = self.frames.next_frame() {
                if msg_type == MSG_SUBSCRIBE && !payload_reports_success(&payload) {
                    return Err(CompositorError::Protocol(
                        "sway rejected workspace subscription".into(),
                    ));
                }
                break;
            }
        }

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
                    tracing::debug!("sway event socket closed");
                    disconnected = true;
                    break;
                }
                Ok(n) => self.frames.feed(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(%err, "sway event read failed");
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.stream = None;
        }
        while let Some((msg_type, payload)) = self.frames.next_frame() {
            if msg_type == EVENT_WORKSPACE {
                self.decoder.handle_payload(&payload, events);
            }
        }
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|stream| stream.as_raw_fd())
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_GLOBAL_NUMERIC
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::GlobalNumeric
    }

    fn send_command(&mut self, command: &str) -> Result<String> {
        let payload = self.request(MSG_RUN_COMMAND, command)?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    fn list_workspaces(&mut self) -> Vec<WorkspaceInfo> {
        #[derive(Deserialize)]
        struct Workspace {
            #[serde(default)]
            num: Option<i32>,
            #[serde(default)]
            name: String,
            #[serde(default)]
            focused: bool,
        }
        let Ok(payload) = self.request(MSG_GET_WORKSPACES, "") else {
            return Vec::new();
        };
        serde_json::from_slice::<Vec<Workspace>>(&payload)
            .unwrap_or_default()
            .into_iter()
            .map(|ws| WorkspaceInfo {
                id: ws.num.unwrap_or(-1),
                name: ws.name,
                active: ws.focused,
            })
            .collect()
    }

    fn list_monitors(&mut self) -> Vec<MonitorInfo> {
        #[derive(Deserialize)]
        struct Rect {
            x: i32,
            y: i32,
            width: i32,
            height: i32,
        }
        #[derive(Deserialize)]
        struct Output {
            name: String,
            rect: Rect,
            #[serde(default)]
            scale: Option<f64>,
            #[serde(default)]
            focused: bool,
            #[serde(default)]
            active: bool,
        }
        let Ok(payload) = self.request(MSG_GET_OUTPUTS, "") else {
            return Vec::new();
        };
        serde_json::from_slice::<Vec<Output>>(&payload)
            .unwrap_or_default()
            .into_iter()
            .filter(|output| output.active)
            .enumerate()
            .map(|(index, output)| MonitorInfo {
                id: index as i32,
                name: output.name,
                x: output.rect.x,
                y: output.rect.y,
                width: output.rect.width,
                height: output.rect.height,
                scale: output.scale.unwrap_or(1.0),
                primary: output.focused,
            })
            .collect()
    }
}

fn payload_reports_success(payload: &[u8]) -> bool {
    #[derive(Deserialize)]
    struct Ack {
        success: bool,
    }
    serde_json::from_slice::<Ack>(payload)
        .map(|ack| ack.success)
        .unwrap_or(false)
}

pub fn encode_frame(msg_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&msg_type.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Incremental i3 frame reassembly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Option<(u32, Vec<u8>)> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            if &self.buf[..6] != MAGIC {
                // Resynchronize on the next magic; a malformed stream must
                // not wedge the decoder.
                match self.buf[1..]
                    .windows(MAGIC.len())
                    .position(|window| window == MAGIC)
                {
                    Some(pos) => {
                        self.buf.drain(..=pos);
                        continue;
                    }
                    None => {
                        self.buf.clear();
                        return None;
                    }
                }
            }
            let len = u32::from_le_bytes(self.buf[6..10].try_into().unwrap()) as usize;
            let msg_type = u32::from_le_bytes(self.buf[10..14].try_into().unwrap());
            if self.buf.len() < HEADER_LEN + len {
                return None;
            }
            let payload = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
            self.buf.drain(..HEADER_LEN + len);
            return Some((msg_type, payload));
        }
    }
}

/// Workspace-event decoder, fed decoded frame payloads.
#[derive(Debug)]
pub struct EventDecoder {
    current_workspace: i32,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            current_workspace: 1,
        }
    }
}

impl EventDecoder {
    pub fn handle_payload(&mut self, payload: &[u8], events: &mut Vec<WorkspaceChange>) {
        #[derive(Deserialize)]
        struct WorkspaceRef {
            #[serde(default)]
            num: Option<i32>,
            #[serde(default)]
            output: Option<String>,
        }
        #[derive(Deserialize)]
        struct WorkspaceEvent {
            change: String,
            #[serde(default)]
            current: Option<WorkspaceRef>,
            #[serde(default)]
            old: Option<WorkspaceRef>,
        }

        let event: WorkspaceEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%err, "sway workspace event did not parse");
                return;
            }
        };
        if event.change != "focus" {
            return;
        }
        let Some(current) = event.current else {
            return;
        };
        let Some(to_id) = current.num else {
            // Named workspaces without a number carry no spatial position.
            return;
        };
        if to_id == self.current_workspace {
            return;
        }
        let from_id = event
            .old
            .and_then(|old| old.num)
            .unwrap_or(self.current_workspace);
        events.push(WorkspaceChange {
            from_id,
            to_id,
            from_x: 0,
            from_y: 0,
            to_x: 0,
            to_y: 0,
            monitor_name: current.output.unwrap_or_default(),
        });
        self.current_workspace = to_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = encode_frame(MSG_SUBSCRIBE, br#"["workspace"]"#);
        let mut decoder = FrameDecoder::default();
        decoder.feed(&frame[..7]);
        assert!(decoder.next_frame().is_none());
        decoder.feed(&frame[7..]);
        let (msg_type, payload) = decoder.next_frame().unwrap();
        assert_eq!(msg_type, MSG_SUBSCRIBE);
        assert_eq!(payload, br#"["workspace"]"#);
    }

    #[test]
    fn garbage_resynchronizes() {
        let mut decoder = FrameDecoder::default();
        decoder.feed(b"noise");
        decoder.feed(&encode_frame(MSG_RUN_COMMAND, b"{}"));
        let (msg_type, payload) = decoder.next_frame().unwrap();
        assert_eq!(msg_type, MSG_RUN_COMMAND);
        assert_eq!(payload, b"{}");
    }

    #[test]
    fn focus_event_maps_to_change() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(
            br#"{"change":"focus","current":{"num":3,"output":"DP-1"},"old":{"num":1}}"#,
            &mut events,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from_id, 1);
        assert_eq!(events[0].to_id, 3);
        assert_eq!(events[0].monitor_name, "DP-1");
    }

    #[test]
    fn non_focus_changes_ignored() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(
            br#"{"change":"rename","current":{"num":3},"old":null}"#,
            &mut events,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn repeated_focus_suppressed() {
        let mut decoder = EventDecoder::default();
        let mut events = Vec::new();
        decoder.handle_payload(
            br#"{"change":"focus","current":{"num":2},"old":{"num":1}}"#,
            &mut events,
        );
        decoder.handle_payload(
            br#"{"change":"focus","current":{"num":2},"old":{"num":1}}"#,
            &mut events,
        );
        assert_eq!(events.len(), 1);
    }
}
