//! Legacy-config conversion flow and config-path resolution.
//!
//! The runtime is TOML-only. A `--config foo.conf` (or a default legacy
//! path with no TOML beside it) triggers a conversion offer: interactive
//! sessions are prompted, automation consents through `--yes`,
//! `HYPRLAX_ASSUME_YES`, or is refused with exit code 3.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use config::{convert_legacy, FileConfig, LegacyConfig};

pub const EXIT_CONVERT_IO: u8 = 2;
pub const EXIT_REFUSED: u8 = 3;

#[derive(Debug, Clone, Copy)]
pub struct Consent {
    pub assume_yes: bool,
    pub non_interactive: bool,
}

impl Consent {
    pub fn from_env(cli_yes: bool, cli_non_interactive: bool) -> Self {
        let env_yes = std::env::var("HYPRLAX_ASSUME_YES")
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false);
        let env_non_interactive = std::env::var("HYPRLAX_NONINTERACTIVE")
            .map(|value| !value.is_empty() && value != "0")
            .unwrap_or(false);
        Self {
            assume_yes: cli_yes || env_yes,
            non_interactive: cli_non_interactive || env_non_interactive,
        }
    }

    /// Whether the given question may proceed. Prompts only on a real TTY.
    fn confirmed(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        if self.non_interactive || !std::io::stdin().is_terminal() {
            return false;
        }
        eprint!("{question} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

/// `hyprlax convert-config <src> [dst] [--yes]`. Returns the exit code.
pub fn run_convert(src: &Path, dst: Option<&Path>, consent: Consent) -> u8 {
    let dst_owned;
    let dst = match dst {
        Some(dst) => dst,
        None => {
            dst_owned = src.with_extension("toml");
            &dst_owned
        }
    };

    if dst.exists() && !consent.confirmed(&format!("Overwrite {}?", dst.display())) {
        eprintln!("refusing to overwrite {}", dst.display());
        return EXIT_REFUSED;
    }

    match convert_file(src, dst) {
        Ok(layers) => {
            println!(
                "Converted {} -> {} ({layers} layer{})",
                src.display(),
                dst.display(),
                if layers == 1 { "" } else { "s" }
            );
            0
        }
        Err(err) => {
            eprintln!("conversion failed: {err}");
            EXIT_CONVERT_IO
        }
    }
}

fn convert_file(src: &Path, dst: &Path) -> Result<usize, config::ConfigError> {
    let legacy = LegacyConfig::load(src)?;
    let file = convert_legacy(&legacy);
    let toml = file.to_toml_string()?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dst, toml)?;
    Ok(file.layers.len())
}

/// Resolves which TOML config the daemon should load, converting legacy
/// configs on the way. `Err(code)` aborts startup with that exit code.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    consent: Consent,
) -> Result<Option<PathBuf>, u8> {
    if let Some(path) = explicit {
        if path.extension().is_some_and(|ext| ext == "conf") {
            return convert_on_startup(path, consent).map(Some);
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(toml_path) = config::default_config_path() {
        if toml_path.exists() {
            return Ok(Some(toml_path));
        }
    }
    if let Some(legacy_path) = config::default_legacy_path() {
        if legacy_path.exists() {
            return convert_on_startup(&legacy_path, consent).map(Some);
        }
    }
    Ok(None)
}

fn convert_on_startup(legacy_path: &Path, consent: Consent) -> Result<PathBuf, u8> {
    let dst = legacy_path.with_extension("toml");
    if dst.exists() {
        tracing::info!(
            legacy = %legacy_path.display(),
            toml = %dst.display(),
            "TOML config already present; ignoring legacy file"
        );
        return Ok(dst);
    }
    if !consent.confirmed(&format!(
        "Convert legacy config {} to {}?",
        legacy_path.display(),
        dst.display()
    )) {
        tracing::error!(
            legacy = %legacy_path.display(),
            "legacy config requires conversion; re-run with --yes or HYPRLAX_ASSUME_YES=1"
        );
        return Err(EXIT_REFUSED);
    }
    match convert_file(legacy_path, &dst) {
        Ok(layers) => {
            tracing::info!(
                toml = %dst.display(),
                layers,
                "converted legacy configuration"
            );
            Ok(dst)
        }
        Err(err) => {
            eprintln!("conversion failed: {err}");
            Err(EXIT_CONVERT_IO)
        }
    }
}

/// Verifies the resolved path parses before the daemon commits to it.
pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>, config::ConfigError> {
    match path {
        Some(path) => Ok(Some(FileConfig::load(path)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consent(yes: bool) -> Consent {
        Consent {
            assume_yes: yes,
            non_interactive: true,
        }
    }

    #[test]
    fn convert_writes_toml() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hyprlax.conf");
        std::fs::write(&src, "fps 120\nshift 300\nlayer a.png 0.5 1.0\n").unwrap();
        let code = run_convert(&src, None, consent(true));
        assert_eq!(code, 0);
        let dst = dir.path().join("hyprlax.toml");
        let file = FileConfig::load(&dst).unwrap();
        assert_eq!(file.global.fps, Some(120));
        assert_eq!(file.layers.len(), 1);
    }

    #[test]
    fn refuses_overwrite_without_consent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hyprlax.conf");
        let dst = dir.path().join("hyprlax.toml");
        std::fs::write(&src, "fps 60\n").unwrap();
        std::fs::write(&dst, "existing").unwrap();
        let code = run_convert(&src, None, consent(false));
        assert_eq!(code, EXIT_REFUSED);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "existing");
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("absent.conf");
        let code = run_convert(&src, None, consent(true));
        assert_eq!(code, EXIT_CONVERT_IO);
    }

    #[test]
    fn startup_resolution_prefers_existing_toml() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("wall.conf");
        let toml = dir.path().join("wall.toml");
        std::fs::write(&legacy, "fps 60\n").unwrap();
        std::fs::write(&toml, "[global]\nfps = 90\n").unwrap();
        let resolved = resolve_config_path(Some(&legacy), consent(false)).unwrap();
        assert_eq!(resolved, Some(toml));
    }

    #[test]
    fn startup_conversion_refusal_exits_3() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("wall.conf");
        std::fs::write(&legacy, "fps 60\n").unwrap();
        let result = resolve_config_path(Some(&legacy), consent(false));
        assert_eq!(result, Err(EXIT_REFUSED));
    }
}
