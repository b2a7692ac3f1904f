//! Runtime control protocol over a per-user UNIX socket.
//!
//! One newline-terminated ASCII request per connection, one reply, close.
//! The server half lives in [`server`], the `hyprlax ctl` client in
//! [`client`], and the shared command grammar in [`commands`].

pub mod client;
pub mod commands;
pub mod server;

use std::path::PathBuf;

pub const MAX_COMMAND_LEN: usize = 4096;
pub const MAX_PROP_LEN: usize = 64;
pub const MAX_VALUE_LEN: usize = 512;

/// Stable error codes surfaced as `Error(<code>): …` or `"code":N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    BadRequest = 1,
    UnknownCommand = 2,
    UnknownLayer = 3,
    UnknownProperty = 4,
    InvalidValue = 5,
    TooLarge = 6,
    Internal = 7,
}

/// Optional socket-name suffix for test isolation, restricted to
/// `[A-Za-z0-9_-]` and prefixed with `-` when present.
pub fn socket_suffix() -> String {
    let raw = std::env::var("HYPRLAX_SOCKET_SUFFIX")
        .or_else(|_| std::env::var("HYPRLAX_TEST_SUFFIX"))
        .unwrap_or_default();
    sanitize_suffix(&raw)
}

pub fn sanitize_suffix(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let filtered: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-')
        .collect();
    if filtered.is_empty() {
        String::new()
    } else {
        format!("-{filtered}")
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".into())
}

/// Preferred server socket path: signature-qualified under the runtime dir
/// when running inside Hyprland, the legacy /tmp path otherwise.
pub fn server_socket_path() -> PathBuf {
    let user = current_user();
    let suffix = socket_suffix();
    if let (Ok(runtime_dir), Ok(signature)) = (
        std::env::var("XDG_RUNTIME_DIR"),
        std::env::var("HYPRLAND_INSTANCE_SIGNATURE"),
    ) {
        if !runtime_dir.is_empty() && !signature.is_empty() {
            return PathBuf::from(runtime_dir)
                .join(format!("hyprlax-{user}-{signature}{suffix}.sock"));
        }
    }
    legacy_socket_path(&user, &suffix)
}

fn legacy_socket_path(user: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/hyprlax-{user}{suffix}.sock"))
}

/// Candidate paths a client tries, most specific first: the
/// signature-qualified path, then any `hyprlax-<user>-*.sock` in the
/// runtime dir, then the legacy /tmp path.
pub fn client_candidate_paths() -> Vec<PathBuf> {
    let user = current_user();
    let suffix = socket_suffix();
    let mut candidates = Vec::new();

    if let (Ok(runtime_dir), Ok(signature)) = (
        std::env::var("XDG_RUNTIME_DIR"),
        std::env::var("HYPRLAND_INSTANCE_SIGNATURE"),
    ) {
        if !runtime_dir.is_empty() && !signature.is_empty() {
            candidates.push(
                PathBuf::from(&runtime_dir)
                    .join(format!("hyprlax-{user}-{signature}{suffix}.sock")),
            );
        }
    }
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        if let Ok(entries) = std::fs::read_dir(&runtime_dir) {
            let prefix = format!("hyprlax-{user}-");
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.starts_with(&prefix) && name.ends_with(".sock") {
                    let path = entry.path();
                    if !candidates.contains(&path) {
                        candidates.push(path);
                    }
                }
            }
        }
    }
    candidates.push(legacy_socket_path(&user, &suffix));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_sanitized() {
        assert_eq!(sanitize_suffix(""), "");
        assert_eq!(sanitize_suffix("test1"), "-test1");
        assert_eq!(sanitize_suffix("a/b!c"), "-abc");
        assert_eq!(sanitize_suffix("!!!"), "");
        assert_eq!(sanitize_suffix("under_score-dash"), "-under_score-dash");
    }
}
