//! Niri adapter.
//!
//! Niri has no long-lived event socket; instead `niri msg --json
//! event-stream` is spawned as a child process and emits one JSON object per
//! stdout line. Workspaces are per-output and arranged in a 2D scrolling
//! layout; the column/row position is folded into the compatibility 1D id as
//! `row * 1000 + column`.
//!
//! Niri reports window positions and focus separately: `WindowsChanged`
//! carries positions, `WindowFocusChanged` only an id. The decoder caches
//! positions so a focus change can be resolved to coordinates.

use std::collections::HashMap;
use std::io::Read;
use std::os::unix::io::{AsFd, AsRawFd, RawFd};
use std::process::{Child, Command, Stdio};

use serde::Deserialize;
use workspace::{encode_scroll_position, WorkspaceModel};

use crate::{Adapter, Caps, CompositorError, EnvSnapshot, Result, WorkspaceChange};

pub struct Niri {
    child: Option<Child>,
    decoder: StreamDecoder,
}

impl Niri {
    pub fn detect(env: &EnvSnapshot) -> bool {
        env.get("NIRI_SOCKET").is_some() || env.desktop_contains("niri")
    }

    pub fn new() -> Self {
        Self {
            child: None,
            decoder: StreamDecoder::default(),
        }
    }
}

impl Default for Niri {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for Niri {
    fn name(&self) -> &'static str {
        "niri"
    }

    fn connect(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let child = Command::new("niri")
            .args(["msg", "--json", "event-stream"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| CompositorError::NoDisplay(format!("failed to spawn niri msg: {err}")))?;

        let stdout = child
            .stdout
            .as_ref()
            .ok_or_else(|| CompositorError::Protocol("niri child has no stdout".into()))?;
        let fd = stdout.as_fd();
        let flags = rustix::fs::fcntl_getfl(fd).map_err(std::io::Error::from)?;
        rustix::fs::fcntl_setfl(fd, flags | rustix::fs::OFlags::NONBLOCK)
            .map_err(std::io::Error::from)?;

        self.child = Some(child);
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let Some(stdout) = child.stdout.as_mut() else {
            return Ok(());
        };

        let mut chunk = [0u8; 8192];
        let mut eof = false;
        loop {
            match stdout.read(&mut chunk) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => self
                    .decoder
                    .feed(&String::from_utf8_lossy(&chunk[..n]), events),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::debug!(%err, "niri event-stream read failed");
                    eof = true;
                    break;
                }
            }
        }
        if eof {
            // The stream is not respawned; the adapter degrades to a silent
            // no-events state.
            tracing::warn!("niri event stream ended");
            self.shutdown_child();
        }
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.child
            .as_ref()
            .and_then(|child| child.stdout.as_ref())
            .map(|stdout| stdout.as_raw_fd())
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_PER_OUTPUT_NUMERIC
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::PerOutputNumeric
    }

    fn supports_animations(&self) -> bool {
        true
    }
}

impl Niri {
    fn shutdown_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Some(pid) = rustix::process::Pid::from_raw(child.id() as i32) {
                let _ = rustix::process::kill_process(pid, rustix::process::Signal::Term);
            }
            let _ = child.wait();
        }
    }
}

impl Drop for Niri {
    fn drop(&mut self) {
        self.shutdown_child();
    }
}

#[derive(Debug, Deserialize)]
struct NiriWindow {
    id: u64,
    #[serde(default)]
    pos_in_scrolling_layout: Option<[i32; 2]>,
}

/// The subset of niri events the daemon cares about. Lines carrying other
/// event kinds fail the enum match and are dropped at debug level, which is
/// also how unknown future events are tolerated.
#[derive(Debug, Deserialize)]
enum NiriEvent {
    WindowsChanged {
        windows: Vec<NiriWindow>,
    },
    WindowOpenedOrChanged {
        window: NiriWindow,
    },
    WindowClosed {
        id: u64,
    },
    WindowFocusChanged {
        #[serde(default)]
        id: Option<u64>,
    },
    WorkspaceActivated {
        id: u64,
    },
}

/// NDJSON decoder with the window-position cache.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: String,
    windows: HashMap<u64, (i32, i32)>,
    current_encoded: Option<i32>,
}

impl StreamDecoder {
    pub fn feed(&mut self, text: &str, events: &mut Vec<WorkspaceChange>) {
        self.pending.push_str(text);
        while let Some(newline) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=newline).collect();
            let line = line.trim();
            if !line.is_empty() {
                self.handle_line(line, events);
            }
        }
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<WorkspaceChange>) {
        let event: NiriEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(%err, "ignoring niri event line");
                return;
            }
        };
        match event {
            NiriEvent::WindowsChanged { windows } => {
                self.windows.clear();
                for window in windows {
                    if let Some([column, row]) = window.pos_in_scrolling_layout {
                        self.windows.insert(window.id, (column, row));
                    }
                }
            }
            NiriEvent::WindowOpenedOrChanged { window } => {
                if let Some([column, row]) = window.pos_in_scrolling_layout {
                    self.windows.insert(window.id, (column, row));
                }
            }
            NiriEvent::WindowClosed { id } => {
                self.windows.remove(&id);
            }
            NiriEvent::WindowFocusChanged { id } => {
                let Some(id) = id else {
                    return;
                };
                let Some(&(column, row)) = self.windows.get(&id) else {
                    tracing::trace!(window = id, "focus change for unknown window");
                    return;
                };
                self.emit(column, row, events);
            }
            NiriEvent::WorkspaceActivated { id } => {
                // A vertical workspace switch keeps the current column.
                let column = self.current_encoded.map(|enc| enc % 1000).unwrap_or(0);
                self.emit(column, id as i32, events);
            }
        }
    }

    fn emit(&mut self, column: i32, row: i32, events: &mut Vec<WorkspaceChange>) {
        let encoded = encode_scroll_position(column, row);
        if self.current_encoded == Some(encoded) {
            return;
        }
        let (from_id, from_x, from_y) = match self.current_encoded {
            Some(previous) => (previous, previous % 1000, previous / 1000),
            // Focus-follows-window: the prior position is genuinely unknown.
            None => (-1, -1, -1),
        };
        events.push(WorkspaceChange {
            from_id,
            to_id: encoded,
            from_x,
            from_y,
            to_x: column,
            to_y: row,
            monitor_name: String::new(),
        });
        tracing::trace!(column, row, "niri position change");
        self.current_encoded = Some(encoded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut StreamDecoder, text: &str) -> Vec<WorkspaceChange> {
        let mut events = Vec::new();
        decoder.feed(text, &mut events);
        events
    }

    #[test]
    fn focus_resolves_through_window_cache() {
        let mut decoder = StreamDecoder::default();
        // State update alone produces nothing.
        let first = drain(
            &mut decoder,
            "{\"WindowsChanged\":{\"windows\":[{\"id\":5,\"pos_in_scrolling_layout\":[2,1]}]}}\n",
        );
        assert!(first.is_empty());

        let second = drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":5}}\n");
        assert_eq!(second.len(), 1);
        let event = &second[0];
        assert_eq!((event.to_x, event.to_y), (2, 1));
        assert_eq!((event.from_x, event.from_y), (-1, -1));
        assert_eq!(event.to_id, 1002);
    }

    #[test]
    fn focus_on_unknown_window_is_silent() {
        let mut decoder = StreamDecoder::default();
        assert!(drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":99}}\n").is_empty());
    }

    #[test]
    fn null_focus_is_silent() {
        let mut decoder = StreamDecoder::default();
        assert!(drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":null}}\n").is_empty());
    }

    #[test]
    fn repeated_focus_same_position_suppressed() {
        let mut decoder = StreamDecoder::default();
        drain(
            &mut decoder,
            "{\"WindowsChanged\":{\"windows\":[{\"id\":1,\"pos_in_scrolling_layout\":[0,1]},{\"id\":2,\"pos_in_scrolling_layout\":[0,1]}]}}\n",
        );
        let first = drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":1}}\n");
        assert_eq!(first.len(), 1);
        let second = drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":2}}\n");
        assert!(second.is_empty());
    }

    #[test]
    fn workspace_activation_keeps_column() {
        let mut decoder = StreamDecoder::default();
        drain(
            &mut decoder,
            "{\"WindowsChanged\":{\"windows\":[{\"id\":1,\"pos_in_scrolling_layout\":[2,1]}]}}\n",
        );
        drain(&mut decoder, "{\"WindowFocusChanged\":{\"id\":1}}\n");
        let events = drain(&mut decoder, "{\"WorkspaceActivated\":{\"id\":3}}\n");
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].to_x, events[0].to_y), (2, 3));
        assert_eq!(events[0].from_id, 1002);
    }

    #[test]
    fn unknown_event_kinds_tolerated() {
        let mut decoder = StreamDecoder::default();
        let events = drain(
            &mut decoder,
            "{\"KeyboardLayoutsChanged\":{\"keyboard_layouts\":{}}}\nnot json at all\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn split_reads_reassemble() {
        let mut decoder = StreamDecoder::default();
        drain(
            &mut decoder,
            "{\"WindowsChanged\":{\"windows\":[{\"id\":7,\"pos_in_scrolling_layout\":[1,0]}]}}\n{\"WindowFocus",
        );
        let events = drain(&mut decoder, "Changed\":{\"id\":7}}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to_x, 1);
    }
}
