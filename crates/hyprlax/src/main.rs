//! Entry point: parses the CLI, initialises tracing, and dispatches to the
//! daemon, the `ctl` client, or the config converter.

mod cli;
mod control;
mod convert;
mod daemon;
mod engine;
mod layers;
mod logging;
mod mixer;
mod monitors;

use std::process::ExitCode;

use cli::Command;
use config::{Overlay, Settings};
use convert::Consent;

fn main() -> ExitCode {
    let cli = cli::parse();

    match cli.command {
        Some(Command::Ctl { args }) => ExitCode::from(control::client::run(&args)),
        Some(Command::ConvertConfig { src, dst, yes }) => {
            let consent = Consent::from_env(yes, cli.run.non_interactive);
            ExitCode::from(convert::run_convert(&src, dst.as_deref(), consent))
        }
        None => run_daemon(cli.run),
    }
}

fn run_daemon(args: cli::RunArgs) -> ExitCode {
    logging::init(&args);

    let consent = Consent::from_env(false, args.non_interactive);
    let config_path = match convert::resolve_config_path(args.config.as_deref(), consent) {
        Ok(path) => path,
        Err(code) => return ExitCode::from(code),
    };

    let file = match convert::load_file_config(config_path.as_deref()) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            return ExitCode::from(1);
        }
    };

    let cli_overlay = match args.to_overlay() {
        Ok(overlay) => overlay,
        Err(err) => {
            tracing::error!(%err, "invalid command line");
            return ExitCode::from(1);
        }
    };
    for (flag, value, supported) in [
        ("--renderer", args.renderer.as_deref(), "wgpu"),
        ("--platform", args.platform.as_deref(), "wayland"),
    ] {
        if let Some(name) = value {
            if !matches!(name, "auto") && name != supported {
                tracing::error!("{flag} {name} is not supported (available: auto, {supported})");
                return ExitCode::from(1);
            }
        }
    }

    let env_overlay = Overlay::from_env();
    let settings = Settings::resolve(file.as_ref(), &env_overlay, &cli_overlay);
    tracing::debug!(
        fps = settings.target_fps,
        shift = settings.shift_pixels,
        duration = settings.duration,
        easing = settings.easing.name(),
        layers = settings.layers.len(),
        "resolved settings"
    );

    match daemon::run(
        settings,
        config_path,
        env_overlay,
        cli_overlay,
        args.compositor.as_deref(),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("hyprlax: {err:#}");
            ExitCode::from(1)
        }
    }
}
