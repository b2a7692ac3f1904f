//! River adapter.
//!
//! River has no IPC socket; status information is published through the
//! `zriver_status_manager_v1` Wayland protocol extension, vendored as XML and
//! generated at compile time. Each output reports a `focused_tags` bitmask;
//! the seat reports which output holds focus. Tag masks ride in the
//! normalized event's id fields so the engine can apply multi-tag policy.

use std::os::unix::io::{AsRawFd, RawFd};
use std::thread;
use std::time::Duration;

use wayland_client::protocol::{wl_output, wl_registry, wl_seat};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle};
use workspace::WorkspaceModel;

use crate::{Adapter, Caps, CompositorError, EnvSnapshot, Result, WorkspaceChange};

use protocol::zriver_output_status_v1::{self, ZriverOutputStatusV1};
use protocol::zriver_seat_status_v1::{self, ZriverSeatStatusV1};
use protocol::zriver_status_manager_v1::ZriverStatusManagerV1;

pub mod protocol {
    #![allow(missing_docs, non_upper_case_globals)]

    use wayland_client;
    use wayland_client::protocol::*;

    pub mod __interfaces {
        use wayland_client::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/river-status-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_client_code!("protocols/river-status-unstable-v1.xml");
}

const CONNECT_RETRIES: u32 = 150;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

pub struct River {
    conn: Option<Connection>,
    queue: Option<EventQueue<State>>,
    state: State,
}

impl River {
    pub fn detect(env: &EnvSnapshot) -> bool {
        env.desktop_contains("river")
    }

    pub fn new() -> Self {
        Self {
            conn: None,
            queue: None,
            state: State::default(),
        }
    }
}

impl Default for River {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for River {
    fn name(&self) -> &'static str {
        "river"
    }

    fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = connect_display_with_retry()?;
        let mut queue = conn.new_event_queue();
        let qh = queue.handle();
        let display = conn.display();
        display.get_registry(&qh, ());

        // First roundtrip announces globals, second delivers output names
        // and the initial tag state.
        queue
            .roundtrip(&mut self.state)
            .map_err(|err| CompositorError::Protocol(format!("river registry roundtrip: {err}")))?;
        self.state.bind_pending(&qh);
        queue
            .roundtrip(&mut self.state)
            .map_err(|err| CompositorError::Protocol(format!("river status roundtrip: {err}")))?;

        if self.state.manager.is_none() {
            return Err(CompositorError::NoDisplay(
                "compositor does not expose zriver_status_manager_v1".into(),
            ));
        }
        // The initial focused_tags burst reflects current state, not a
        // transition the wallpaper should animate.
        self.state.events.clear();

        self.conn = Some(conn);
        self.queue = Some(queue);
        Ok(())
    }

    fn poll(&mut self, events: &mut Vec<WorkspaceChange>) -> Result<()> {
        let (Some(conn), Some(queue)) = (self.conn.as_ref(), self.queue.as_mut()) else {
            return Ok(());
        };
        let _ = conn.flush();
        if let Some(guard) = queue.prepare_read() {
            let _ = guard.read();
        }
        queue
            .dispatch_pending(&mut self.state)
            .map_err(|err| CompositorError::Protocol(format!("river dispatch: {err}")))?;
        let qh = queue.handle();
        self.state.bind_pending(&qh);
        events.append(&mut self.state.events);
        Ok(())
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.conn
            .as_ref()
            .map(|conn| conn.backend().poll_fd().as_raw_fd())
    }

    fn capabilities(&self) -> Caps {
        Caps::WS_TAG_BASED
    }

    fn workspace_model(&self) -> WorkspaceModel {
        WorkspaceModel::TagBased
    }
}

struct OutputEntry {
    output: Option<wl_output::WlOutput>,
    global_name: u32,
    name: Option<String>,
    status: Option<ZriverOutputStatusV1>,
    focused_tags: u32,
}

struct State {
    manager: Option<ZriverStatusManagerV1>,
    seat: Option<wl_seat::WlSeat>,
    seat_status: Option<ZriverSeatStatusV1>,
    outputs: Vec<OutputEntry>,
    focused_output: Option<u32>,
    events: Vec<WorkspaceChange>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            manager: None,
            seat: None,
            seat_status: None,
            outputs: Vec::new(),
            focused_output: None,
            events: Vec::new(),
        }
    }
}

impl State {
    /// Creates status objects for globals that arrived since the last pass.
    fn bind_pending(&mut self, qh: &QueueHandle<State>) {
        let Some(manager) = self.manager.as_ref() else {
            return;
        };
        for entry in &mut self.outputs {
            if entry.status.is_none() {
                if let Some(output) = entry.output.as_ref() {
                    entry.status =
                        Some(manager.get_river_output_status(output, qh, entry.global_name));
                }
            }
        }
        if self.seat_status.is_none() {
            if let Some(seat) = self.seat.as_ref() {
                self.seat_status = Some(manager.get_river_seat_status(seat, qh, ()));
            }
        }
    }

    fn handle_focused_tags(&mut self, global_name: u32, tags: u32) {
        let Some(entry) = self
            .outputs
            .iter_mut()
            .find(|entry| entry.global_name == global_name)
        else {
            return;
        };
        if entry.focused_tags == tags {
            return;
        }
        let previous = entry.focused_tags;
        entry.focused_tags = tags;
        tracing::debug!(
            output = entry.name.as_deref().unwrap_or(""),
            from = format_args!("{previous:#x}"),
            to = format_args!("{tags:#x}"),
            focused = self.focused_output == Some(global_name),
            "river tags changed"
        );
        self.events.push(WorkspaceChange {
            from_id: previous as i32,
            to_id: tags as i32,
            from_x: 0,
            from_y: 0,
            to_x: 0,
            to_y: 0,
            monitor_name: entry.name.clone().unwrap_or_default(),
        });
    }
}

fn connect_display_with_retry() -> Result<Connection> {
    let mut waited = false;
    for attempt in 0..=CONNECT_RETRIES {
        match Connection::connect_to_env() {
            Ok(conn) => {
                if waited {
                    tracing::info!(retries = attempt, "connected to river after {attempt} retries");
                }
                return Ok(conn);
            }
            Err(err) => {
                if attempt == CONNECT_RETRIES {
                    return Err(CompositorError::NoDisplay(format!(
                        "wayland display unavailable: {err}"
                    )));
                }
                if !waited {
                    tracing::info!("waiting for river…");
                    waited = true;
                }
                thread::sleep(CONNECT_DELAY);
            }
        }
    }
    unreachable!("retry loop returns on the final attempt")
}

impl Dispatch<wl_registry::WlRegistry, ()> for State {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<State>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => match interface.as_str() {
                "zriver_status_manager_v1" => {
                    state.manager = Some(registry.bind::<ZriverStatusManagerV1, _, _>(
                        name,
                        version.min(4),
                        qh,
                        (),
                    ));
                }
                "wl_output" => {
                    let output =
                        registry.bind::<wl_output::WlOutput, _, _>(name, version.min(4), qh, name);
                    state.outputs.push(OutputEntry {
                        output: Some(output),
                        global_name: name,
                        name: None,
                        status: None,
                        focused_tags: 1,
                    });
                }
                "wl_seat" => {
                    if state.seat.is_none() {
                        state.seat = Some(registry.bind::<wl_seat::WlSeat, _, _>(
                            name,
                            version.min(5),
                            qh,
                            (),
                        ));
                    }
                }
                _ => {}
            },
            wl_registry::Event::GlobalRemove { name } => {
                state.outputs.retain(|entry| {
                    if entry.global_name == name {
                        if let Some(status) = &entry.status {
                            status.destroy();
                        }
                        false
                    } else {
                        true
                    }
                });
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_output::WlOutput, u32> for State {
    fn event(
        state: &mut Self,
        _output: &wl_output::WlOutput,
        event: wl_output::Event,
        data: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<State>,
    ) {
        if let wl_output::Event::Name { name } = event {
            if let Some(entry) = state
                .outputs
                .iter_mut()
                .find(|entry| entry.global_name == *data)
            {
                entry.name = Some(name);
            }
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for State {
    fn event(
        _state: &mut Self,
        _seat: &wl_seat::WlSeat,
        _event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<State>,
    ) {
    }
}

impl Dispatch<ZriverStatusManagerV1, ()> for State {
    fn event(
        _state: &mut Self,
        _manager: &ZriverStatusManagerV1,
        _event: <ZriverStatusManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<State>,
    ) {
    }
}

impl Dispatch<ZriverOutputStatusV1, u32> for State {
    fn event(
        state: &mut Self,
        _status: &ZriverOutputStatusV1,
        event: zriver_output_status_v1::Event,
        data: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<State>,
    ) {
        if let zriver_output_status_v1::Event::FocusedTags { tags } = event {
            state.handle_focused_tags(*data, tags);
        }
    }
}

impl Dispatch<ZriverSeatStatusV1, ()> for State {
    fn event(
        state: &mut Self,
        _status: &ZriverSeatStatusV1,
        event: zriver_seat_status_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<State>,
    ) {
        if let zriver_seat_status_v1::Event::FocusedOutput { output } = event {
            state.focused_output = output.map(|output| {
                output
                    .data::<u32>()
                    .copied()
                    .unwrap_or_default()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_change_emits_mask_transition() {
        let mut state = State::default();
        state.outputs.push(OutputEntry {
            output: None,
            global_name: 7,
            name: Some("DP-2".into()),
            status: None,
            focused_tags: 0b0001,
        });
        state.handle_focused_tags(7, 0b0100);
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].from_id, 0b0001);
        assert_eq!(state.events[0].to_id, 0b0100);
        assert_eq!(state.events[0].monitor_name, "DP-2");

        // Unchanged mask is suppressed.
        state.handle_focused_tags(7, 0b0100);
        assert_eq!(state.events.len(), 1);
    }
}
