//! Tracing initialisation with the CLI/env verbosity controls.

use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;

/// Level resolution order: `--trace` > `--debug` > `--verbose` >
/// `HYPRLAX_TRACE`/`HYPRLAX_DEBUG`/`HYPRLAX_VERBOSE` > default.
fn resolve_level(args: &RunArgs) -> &'static str {
    fn env_set(key: &str) -> bool {
        std::env::var(key)
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false)
    }
    fn verbose_level(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "error" => Some("error"),
            "1" | "warn" => Some("warn"),
            "2" | "info" => Some("info"),
            "3" | "debug" => Some("debug"),
            "4" | "trace" => Some("trace"),
            _ => None,
        }
    }

    if args.trace || env_set("HYPRLAX_TRACE") {
        return "trace";
    }
    if args.debug || env_set("HYPRLAX_DEBUG") {
        return "debug";
    }
    if let Some(level) = args.verbose.as_deref().and_then(verbose_level) {
        return level;
    }
    if let Some(level) = std::env::var("HYPRLAX_VERBOSE")
        .ok()
        .as_deref()
        .and_then(verbose_level)
    {
        return level;
    }
    "info"
}

/// Initialises the global subscriber. Quiet defaults for the GPU and
/// Wayland stacks; `RUST_LOG` still wins when set.
pub fn init(args: &RunArgs) {
    let level = resolve_level(args);
    let default_filter = format!(
        "warn,hyprlax={level},compositor={level},platform={level},renderer={level},config={level},workspace={level},animation={level},naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,smithay_client_toolkit=error"
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let log_file = resolve_log_file(args);
    match log_file {
        Some(path) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(file)
                        .init();
                    eprintln!("hyprlax: logging to {}", path.display());
                }
                Err(err) => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_target(false)
                        .init();
                    tracing::warn!(%err, path = %path.display(), "failed to open log file");
                }
            }
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }
}

/// Picks a log file: an explicit `--debug-log` target, its pid-qualified
/// default, or the stderr fallback when stderr is wired to /dev/null (the
/// usual fate of autostarted daemons).
fn resolve_log_file(args: &RunArgs) -> Option<std::path::PathBuf> {
    if let Some(target) = &args.debug_log {
        if target.is_empty() {
            return Some(std::path::PathBuf::from(format!(
                "/tmp/hyprlax-{}.log",
                std::process::id()
            )));
        }
        return Some(std::path::PathBuf::from(target));
    }
    if stderr_is_null() {
        return Some(std::path::PathBuf::from("/tmp/hyprlax-stderr.log"));
    }
    None
}

fn stderr_is_null() -> bool {
    std::fs::read_link("/proc/self/fd/2")
        .map(|target| target == std::path::Path::new("/dev/null"))
        .unwrap_or(false)
}
