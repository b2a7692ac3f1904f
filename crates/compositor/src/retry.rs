//! Socket connection with startup-race tolerance.

use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::{CompositorError, Result};

/// Connects to `path`, retrying while the socket does not exist yet or the
/// peer is not accepting. Compositors create their IPC sockets a beat after
/// the session starts, so a daemon launched from an autostart file races
/// them.
///
/// Errors other than `ENOENT`/`ECONNREFUSED` propagate immediately. One
/// "waiting" line is logged on the first retry and one "connected" line on a
/// delayed success.
pub fn connect_with_retry(
    path: &Path,
    label: &str,
    max_retries: u32,
    delay: Duration,
) -> Result<UnixStream> {
    let mut waited = false;
    for attempt in 0..=max_retries {
        match UnixStream::connect(path) {
            Ok(stream) => {
                if waited {
                    tracing::info!(
                        compositor = label,
                        retries = attempt,
                        "connected after {attempt} retries"
                    );
                }
                return Ok(stream);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                if attempt == max_retries {
                    return Err(CompositorError::NoDisplay(format!(
                        "{label} socket at {} not ready after {} attempts: {err}",
                        path.display(),
                        max_retries + 1
                    )));
                }
                if !waited {
                    tracing::info!(compositor = label, path = %path.display(), "waiting for {label}…");
                    waited = true;
                }
                thread::sleep(delay);
            }
            Err(err) => return Err(err.into()),
        }
    }
    unreachable!("retry loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn connects_to_listening_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        assert!(connect_with_retry(&path, "test", 0, Duration::ZERO).is_ok());
    }

    #[test]
    fn missing_socket_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let err = connect_with_retry(&path, "test", 2, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, CompositorError::NoDisplay(_)));
    }
}
