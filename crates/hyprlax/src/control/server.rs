//! Control-socket server half.
//!
//! A non-blocking `UnixListener` bound to the per-user socket path. The
//! event loop watches the listener fd and calls [`ControlServer::serve_ready`]
//! when it signals; each connection carries exactly one request and receives
//! exactly one reply. Commands therefore only ever run between frames.

use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::engine::EngineState;

use super::commands::{dispatch, parse_request};
use super::{server_socket_path, MAX_COMMAND_LEN};

#[derive(Debug, thiserror::Error)]
pub enum ControlInitError {
    #[error("another hyprlax instance already owns {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to bind control socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    /// Binds the discovered per-user socket path.
    pub fn bind() -> Result<Self, ControlInitError> {
        Self::bind_at(server_socket_path())
    }

    /// Binds a specific path, replacing a stale socket file. A connectable
    /// socket means a live daemon owns the path.
    pub fn bind_at(path: PathBuf) -> Result<Self, ControlInitError> {
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(ControlInitError::AlreadyRunning(path));
            }
            // Stale socket from a crashed instance.
            let _ = std::fs::remove_file(&path);
        }

        let listener = UnixListener::bind(&path).map_err(|source| ControlInitError::Bind {
            path: path.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ControlInitError::Bind {
                path: path.clone(),
                source,
            })?;
        if let Err(err) =
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
        {
            tracing::warn!(%err, path = %path.display(), "failed to restrict socket permissions");
        }
        tracing::info!(path = %path.display(), "control socket listening");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }

    /// Accepts and serves every pending connection. Returns the number of
    /// commands processed.
    pub fn serve_ready(&self, state: &mut EngineState) -> usize {
        let mut served = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(err) = serve_connection(stream, state) {
                        tracing::debug!(%err, "control connection failed");
                    }
                    served += 1;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(%err, "control accept failed");
                    break;
                }
            }
        }
        served
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn serve_connection(mut stream: UnixStream, state: &mut EngineState) -> std::io::Result<()> {
    // Clients send one short line; bound the read so a stalled peer cannot
    // wedge the daemon.
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    stream.set_write_timeout(Some(Duration::from_millis(200)))?;

    let mut buffer = Vec::with_capacity(256);
    let mut chunk = [0u8; 1024];
    let deadline = Instant::now() + Duration::from_millis(250);
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.contains(&b'\n') || buffer.len() > MAX_COMMAND_LEN {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                if Instant::now() >= deadline {
                    break;
                }
            }
            Err(err) => return Err(err),
        }
    }

    let line = String::from_utf8_lossy(&buffer);
    let line = line.trim_end_matches('\n').trim();
    tracing::debug!(command = %line, "control request");

    let reply = match parse_request(line) {
        Ok(request) => dispatch(request, state),
        Err(reply) => reply,
    };
    stream.write_all(reply.to_wire().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Settings;
    use workspace::WorkspaceModel;

    fn state() -> EngineState {
        EngineState::new(
            Settings::default(),
            "test".into(),
            WorkspaceModel::GlobalNumeric,
        )
    }

    fn roundtrip(server: &ControlServer, state: &mut EngineState, command: &str) -> String {
        let mut client = UnixStream::connect(server.path()).unwrap();
        client.write_all(command.as_bytes()).unwrap();
        client.write_all(b"\n").unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();
        assert!(server.serve_ready(state) > 0);
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        reply
    }

    #[test]
    fn add_list_modify_remove_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let server = ControlServer::bind_at(dir.path().join("hyprlax-test.sock")).unwrap();
        let mut state = state();

        let reply = roundtrip(&server, &mut state, "add /tmp/img.png scale=1.5 opacity=0.8 z=2");
        assert_eq!(reply, "Layer added with ID: 1\n");

        let reply = roundtrip(&server, &mut state, "modify 1 opacity 0.5");
        assert_eq!(reply, "Layer 1 modified\n");

        let reply = roundtrip(&server, &mut state, "list");
        assert!(reply.contains("ID: 1"));
        assert!(reply.contains("Opacity: 0.50"));

        let reply = roundtrip(&server, &mut state, "remove 1");
        assert_eq!(reply, "Layer 1 removed\n");

        let reply = roundtrip(&server, &mut state, "list");
        assert_eq!(reply, "\n");
    }

    #[test]
    fn socket_permissions_are_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyprlax-perm.sock");
        let _server = ControlServer::bind_at(path.clone()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn second_instance_refused_then_rebindable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyprlax-single.sock");

        let first = ControlServer::bind_at(path.clone()).unwrap();
        let err = ControlServer::bind_at(path.clone()).unwrap_err();
        assert!(matches!(err, ControlInitError::AlreadyRunning(_)));

        drop(first);
        assert!(!path.exists());
        let _second = ControlServer::bind_at(path).unwrap();
    }

    #[test]
    fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyprlax-stale.sock");
        // A bound-then-dead socket file with no listener behind it.
        {
            let listener = UnixListener::bind(&path).unwrap();
            drop(listener);
        }
        assert!(path.exists());
        let _server = ControlServer::bind_at(path).unwrap();
    }

    #[test]
    fn error_replies_carry_code() {
        let dir = tempfile::tempdir().unwrap();
        let server = ControlServer::bind_at(dir.path().join("hyprlax-err.sock")).unwrap();
        let mut state = state();
        let reply = roundtrip(&server, &mut state, "bogus");
        assert!(reply.starts_with("Error(2):"), "got: {reply}");
    }
}
