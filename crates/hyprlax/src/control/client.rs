//! `hyprlax ctl` client: discovers the daemon socket, sends one command,
//! prints the reply and maps errors to a non-zero exit code.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use super::client_candidate_paths;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not find a running hyprlax daemon (tried {tried} sockets)")]
    NoDaemon { tried: usize },
    #[error("control request failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Connects to the first responsive candidate socket.
fn connect() -> Result<(UnixStream, PathBuf), ClientError> {
    let candidates = client_candidate_paths();
    let tried = candidates.len();
    for path in candidates {
        match UnixStream::connect(&path) {
            Ok(stream) => return Ok((stream, path)),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "control socket candidate failed");
            }
        }
    }
    Err(ClientError::NoDaemon { tried })
}

/// Sends one raw command line and returns the daemon's reply.
pub fn send_command(line: &str) -> Result<String, ClientError> {
    let (mut stream, path) = connect()?;
    tracing::debug!(path = %path.display(), command = line, "sending control command");
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    stream.write_all(line.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.shutdown(std::net::Shutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}

/// Runs a ctl invocation end to end. Returns the process exit code.
pub fn run(args: &[String]) -> u8 {
    if args.is_empty() {
        eprintln!("usage: hyprlax ctl <command> [args…] [--json]");
        return 1;
    }
    let json_mode = args.iter().any(|arg| arg == "--json");
    let line = args.join(" ");

    let reply = match send_command(&line) {
        Ok(reply) => reply,
        Err(err) => {
            if json_mode {
                println!(
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": "Failed to connect to hyprlax daemon. Is it running?",
                    })
                );
            } else {
                eprintln!("{err}");
            }
            return 1;
        }
    };

    let trimmed = reply.trim_end();
    let failed = is_error_reply(trimmed);
    if json_mode && !looks_like_json(trimmed) {
        // Wrap plain replies so scripted callers always get JSON.
        let wrapped = if failed {
            let (code, message) = split_error(trimmed);
            serde_json::json!({ "ok": false, "code": code, "error": message })
        } else {
            serde_json::json!({ "ok": true, "output": trimmed })
        };
        println!("{wrapped}");
    } else if !trimmed.is_empty() {
        println!("{trimmed}");
    }

    u8::from(failed)
}

fn looks_like_json(reply: &str) -> bool {
    reply.starts_with('{') || reply.starts_with('[')
}

fn is_error_reply(reply: &str) -> bool {
    reply.starts_with("Error(")
        || reply.starts_with("error:")
        || reply.contains("\"ok\":false")
        || reply.contains("\"ok\": false")
}

/// Splits `Error(<code>): message` into its parts; code 0 when unparseable.
fn split_error(reply: &str) -> (u32, String) {
    if let Some(rest) = reply.strip_prefix("Error(") {
        if let Some((code, message)) = rest.split_once("):") {
            if let Ok(code) = code.parse() {
                return (code, message.trim().to_string());
            }
        }
    }
    (0, reply.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reply_detection() {
        assert!(is_error_reply("Error(3): Layer 7 not found"));
        assert!(is_error_reply("{\"ok\":false,\"code\":2,\"error\":\"x\"}"));
        assert!(!is_error_reply("Layer added with ID: 1"));
    }

    #[test]
    fn error_split_extracts_code() {
        let (code, message) = split_error("Error(4): unknown property 'x'");
        assert_eq!(code, 4);
        assert_eq!(message, "unknown property 'x'");
        let (code, _) = split_error("weird");
        assert_eq!(code, 0);
    }
}
