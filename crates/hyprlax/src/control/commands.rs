//! Control-protocol grammar and dispatch.
//!
//! Requests are newline-terminated ASCII lines of space-separated tokens.
//! Replies are plain text, or structured JSON when the request carried
//! `--json` (honoured for `list` and `status`; errors are structured in
//! both framings).

use animation::Easing;
use config::{LayerSpec, Settings, DURATION_MAX, DURATION_MIN, FPS_MAX, FPS_MIN, SHIFT_MAX};
use renderer::OverflowMode;
use workspace::MultiTagPolicy;

use crate::engine::{Effect, EngineState};
use crate::layers::{PropertyChange, PropertyError};

use super::{ErrorCode, MAX_COMMAND_LEN, MAX_PROP_LEN, MAX_VALUE_LEN};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Add {
        image: String,
        props: Vec<(String, String)>,
    },
    Remove {
        id: u32,
    },
    Modify {
        id: u32,
        prop: String,
        value: String,
    },
    List {
        long: bool,
        json: bool,
        filter: Option<String>,
    },
    Clear,
    Front { id: u32 },
    Back { id: u32 },
    Up { id: u32 },
    Down { id: u32 },
    Set { prop: String, value: String },
    Get { prop: String },
    Status { json: bool },
    Reload,
    DiagTexinfo { id: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Json(serde_json::Value),
    Error { code: ErrorCode, message: String },
}

impl Reply {
    fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }

    /// Wire form, newline-terminated.
    pub fn to_wire(&self) -> String {
        match self {
            Reply::Text(text) => {
                if text.is_empty() {
                    String::from("\n")
                } else {
                    format!("{text}\n")
                }
            }
            Reply::Json(value) => format!("{value}\n"),
            Reply::Error { code, message } => format!("Error({}): {message}\n", *code as u32),
        }
    }
}

pub fn parse_request(line: &str) -> Result<Request, Reply> {
    if line.len() > MAX_COMMAND_LEN {
        return Err(Reply::error(ErrorCode::TooLarge, "command too long"));
    }
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(Reply::error(ErrorCode::BadRequest, "no command specified"));
    }
    let json = tokens.iter().any(|token| *token == "--json");
    let long = tokens.iter().any(|token| *token == "--long");
    let filter = tokens
        .iter()
        .position(|token| *token == "--filter")
        .and_then(|position| tokens.get(position + 1).map(|token| token.to_string()));
    if let Some(position) = tokens.iter().position(|token| *token == "--filter") {
        // Remove the flag and its argument before positional parsing.
        tokens.drain(position..(position + 2).min(tokens.len()));
    }
    tokens.retain(|token| *token != "--json" && *token != "--long");

    let command = tokens[0];
    let parse_id = |token: Option<&&str>| -> Result<u32, Reply> {
        token
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| Reply::error(ErrorCode::BadRequest, "layer id required"))
    };

    match command {
        "add" => {
            let Some(image) = tokens.get(1) else {
                return Err(Reply::error(ErrorCode::BadRequest, "image path required"));
            };
            let mut props = Vec::new();
            let mut rest = tokens[2..].iter();
            while let Some(token) = rest.next() {
                let (prop, value) = match token.split_once('=') {
                    Some((prop, value)) => (prop.to_string(), value.to_string()),
                    None => {
                        let Some(value) = rest.next() else {
                            return Err(Reply::error(
                                ErrorCode::BadRequest,
                                format!("property '{token}' has no value"),
                            ));
                        };
                        (token.to_string(), value.to_string())
                    }
                };
                validate_prop_value(&prop, &value)?;
                props.push((prop, value));
            }
            Ok(Request::Add {
                image: image.to_string(),
                props,
            })
        }
        "remove" | "rm" => Ok(Request::Remove {
            id: parse_id(tokens.get(1))?,
        }),
        "modify" | "mod" => {
            let id = parse_id(tokens.get(1))?;
            let (Some(prop), Some(value)) = (tokens.get(2), tokens.get(3)) else {
                return Err(Reply::error(
                    ErrorCode::BadRequest,
                    "usage: modify <id> <property> <value>",
                ));
            };
            validate_prop_value(prop, value)?;
            Ok(Request::Modify {
                id,
                prop: prop.to_string(),
                value: value.to_string(),
            })
        }
        "list" | "ls" => Ok(Request::List { long, json, filter }),
        "clear" => Ok(Request::Clear),
        "front" => Ok(Request::Front {
            id: parse_id(tokens.get(1))?,
        }),
        "back" => Ok(Request::Back {
            id: parse_id(tokens.get(1))?,
        }),
        "up" => Ok(Request::Up {
            id: parse_id(tokens.get(1))?,
        }),
        "down" => Ok(Request::Down {
            id: parse_id(tokens.get(1))?,
        }),
        "set" => {
            let (Some(prop), Some(value)) = (tokens.get(1), tokens.get(2)) else {
                return Err(Reply::error(
                    ErrorCode::BadRequest,
                    "usage: set <property> <value>",
                ));
            };
            validate_prop_value(prop, value)?;
            Ok(Request::Set {
                prop: prop.to_string(),
                value: value.to_string(),
            })
        }
        "get" => {
            let Some(prop) = tokens.get(1) else {
                return Err(Reply::error(ErrorCode::BadRequest, "usage: get <property>"));
            };
            if prop.len() > MAX_PROP_LEN {
                return Err(Reply::error(ErrorCode::TooLarge, "property name too long"));
            }
            Ok(Request::Get {
                prop: prop.to_string(),
            })
        }
        "status" => Ok(Request::Status { json }),
        "reload" => Ok(Request::Reload),
        "diag" => match tokens.get(1) {
            Some(&"texinfo") => Ok(Request::DiagTexinfo {
                id: parse_id(tokens.get(2))?,
            }),
            _ => Err(Reply::error(
                ErrorCode::BadRequest,
                "usage: diag texinfo <id>",
            )),
        },
        other => Err(Reply::error(
            ErrorCode::UnknownCommand,
            format!("unknown command '{other}'"),
        )),
    }
}

fn validate_prop_value(prop: &str, value: &str) -> Result<(), Reply> {
    if prop.len() > MAX_PROP_LEN {
        return Err(Reply::error(ErrorCode::TooLarge, "property name too long"));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(Reply::error(ErrorCode::TooLarge, "property value too long"));
    }
    Ok(())
}

/// Executes a request against the engine. Runs between frames only.
pub fn dispatch(request: Request, state: &mut EngineState) -> Reply {
    match request {
        Request::Add { image, props } => {
            let spec = LayerSpec::new(&image);
            let defaults = state.anim_defaults();
            let id = state.layers.add(&spec, &defaults);
            let mut z_changed = false;
            let mut failure = None;
            if let Some(layer) = state.layers.find_mut(id) {
                for (prop, value) in &props {
                    match layer.set_property(prop, value) {
                        Ok(PropertyChange::ZOrder) => z_changed = true,
                        Ok(PropertyChange::Plain) => {}
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }
            if let Some(err) = failure {
                state.layers.remove(id);
                return property_error_reply(err);
            }
            if z_changed {
                state.layers.sort();
            }
            state.push_effect(Effect::Render);
            Reply::Text(format!("Layer added with ID: {id}"))
        }
        Request::Remove { id } => match state.layers.remove(id) {
            Some(layer) => {
                if let Some(texture) = layer.texture {
                    state.push_effect(Effect::ReleaseTexture(texture));
                }
                state.push_effect(Effect::Render);
                Reply::Text(format!("Layer {id} removed"))
            }
            None => Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found")),
        },
        Request::Modify { id, prop, value } => {
            let Some(layer) = state.layers.find_mut(id) else {
                return Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found"));
            };
            match layer.set_property(&prop, &value) {
                Ok(change) => {
                    if change == PropertyChange::ZOrder {
                        state.layers.sort();
                    }
                    state.push_effect(Effect::Render);
                    Reply::Text(format!("Layer {id} modified"))
                }
                Err(err) => property_error_reply(err),
            }
        }
        Request::List { long, json, filter } => list_layers(state, long, json, filter.as_deref()),
        Request::Clear => {
            for layer in state.layers.clear() {
                if let Some(texture) = layer.texture {
                    state.push_effect(Effect::ReleaseTexture(texture));
                }
            }
            state.push_effect(Effect::Render);
            Reply::Text("All layers cleared".into())
        }
        Request::Front { id } => z_reply(state.layers.to_front(id), id, state),
        Request::Back { id } => z_reply(state.layers.to_back(id), id, state),
        Request::Up { id } => z_reply(state.layers.raise(id), id, state),
        Request::Down { id } => z_reply(state.layers.lower(id), id, state),
        Request::Set { prop, value } => set_global(state, &prop, &value),
        Request::Get { prop } => get_global(state, &prop),
        Request::Status { json } => status(state, json),
        Request::Reload => {
            state.push_effect(Effect::Reload);
            Reply::Text("Configuration reload scheduled".into())
        }
        Request::DiagTexinfo { id } => match state.layers.find(id) {
            Some(layer) => {
                let (loaded, dims) = match (layer.texture, layer.tex_size) {
                    (Some(_), Some((width, height))) => (true, format!("{width}x{height}")),
                    _ => (false, "-".into()),
                };
                Reply::Text(format!(
                    "Layer {id}: path={} texture_loaded={loaded} dims={dims} failed={}",
                    layer.image.display(),
                    layer.texture_failed
                ))
            }
            None => Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found")),
        },
    }
}

fn property_error_reply(err: PropertyError) -> Reply {
    let code = match &err {
        PropertyError::Unknown(_) => ErrorCode::UnknownProperty,
        PropertyError::Invalid { .. } => ErrorCode::InvalidValue,
        PropertyError::Immutable(_) => ErrorCode::InvalidValue,
    };
    Reply::error(code, err.to_string())
}

fn z_reply(found: bool, id: u32, state: &mut EngineState) -> Reply {
    if found {
        state.push_effect(Effect::Render);
        Reply::Text(format!("Layer {id} moved"))
    } else {
        Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found"))
    }
}

fn list_layers(state: &EngineState, long: bool, json: bool, filter: Option<&str>) -> Reply {
    let layers: Vec<_> = state
        .layers
        .iter()
        .filter(|layer| {
            filter
                .map(|filter| {
                    layer.image.display().to_string().contains(filter)
                        || layer.id.to_string() == filter
                })
                .unwrap_or(true)
        })
        .collect();

    if json {
        let entries: Vec<serde_json::Value> = layers
            .iter()
            .map(|layer| {
                serde_json::json!({
                    "id": layer.id,
                    "path": layer.image.display().to_string(),
                    "shift": layer.shift_multiplier,
                    "opacity": layer.opacity,
                    "blur": layer.blur,
                    "z": layer.z,
                    "fit": layer.fit.name(),
                    "hidden": layer.hidden,
                })
            })
            .collect();
        return Reply::Json(serde_json::json!({ "ok": true, "layers": entries }));
    }

    let mut lines = Vec::new();
    for layer in layers {
        let mut line = format!(
            "ID: {} | Path: {} | Shift: {:.2} | Opacity: {:.2} | Blur: {:.1} | Z: {}",
            layer.id,
            layer.image.display(),
            layer.shift_multiplier,
            layer.opacity,
            layer.blur,
            layer.z
        );
        if long {
            line.push_str(&format!(
                " | Fit: {} | Scale: {:.2} | Align: {:.2},{:.2} | Overflow: {} | Hidden: {}",
                layer.fit.name(),
                layer.content_scale,
                layer.align_x,
                layer.align_y,
                layer.overflow.name(),
                if layer.hidden { "yes" } else { "no" }
            ));
        }
        lines.push(line);
    }
    Reply::Text(lines.join("\n"))
}

fn set_global(state: &mut EngineState, prop: &str, value: &str) -> Reply {
    if let Some(rest) = prop.strip_prefix("layer.") {
        let Some((id, layer_prop)) = rest.split_once('.') else {
            return Reply::error(ErrorCode::BadRequest, "usage: set layer.<id>.<prop> <value>");
        };
        let Ok(id) = id.parse::<u32>() else {
            return Reply::error(ErrorCode::BadRequest, format!("bad layer id '{id}'"));
        };
        let Some(layer) = state.layers.find_mut(id) else {
            return Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found"));
        };
        return match layer.set_property(layer_prop, value) {
            Ok(change) => {
                if change == PropertyChange::ZOrder {
                    state.layers.sort();
                }
                state.push_effect(Effect::Render);
                Reply::Text(format!("layer.{id}.{layer_prop} = {value}"))
            }
            Err(err) => property_error_reply(err),
        };
    }

    let parse_f32 = |value: &str| -> Result<f32, Reply> {
        value.trim().parse().map_err(|_| {
            Reply::error(
                ErrorCode::InvalidValue,
                format!("'{value}' is not a number"),
            )
        })
    };
    let parse_bool = |value: &str| matches!(value.trim(), "1" | "true" | "yes" | "on");

    let reply = match prop {
        "fps" => {
            let fps: u32 = match value.trim().parse() {
                Ok(fps) => fps,
                Err(_) => {
                    return Reply::error(
                        ErrorCode::InvalidValue,
                        format!("'{value}' is not an integer"),
                    )
                }
            };
            state.settings.target_fps = fps.clamp(FPS_MIN, FPS_MAX);
            state.push_effect(Effect::FpsChanged);
            format!("fps = {}", state.settings.target_fps)
        }
        // `shift` is a percentage of the primary monitor's width when a
        // monitor is known, raw pixels otherwise; `shift_pixels` is always
        // pixels.
        "shift" => {
            let raw = match parse_f32(value) {
                Ok(raw) => raw,
                Err(reply) => return reply,
            };
            let pixels = match state.monitors.primary() {
                Some(primary) => raw / 100.0 * primary.desc.width as f32,
                None => raw,
            };
            state.settings.shift_pixels = pixels.clamp(0.0, SHIFT_MAX);
            format!("shift_pixels = {:.1}", state.settings.shift_pixels)
        }
        "shift_pixels" => {
            let pixels = match parse_f32(value) {
                Ok(pixels) => pixels,
                Err(reply) => return reply,
            };
            state.settings.shift_pixels = pixels.clamp(0.0, SHIFT_MAX);
            format!("shift_pixels = {:.1}", state.settings.shift_pixels)
        }
        "duration" => {
            let duration = match parse_f32(value) {
                Ok(duration) => duration,
                Err(reply) => return reply,
            };
            state.settings.duration = duration.clamp(DURATION_MIN, DURATION_MAX);
            let (duration, easing) = (state.settings.duration, state.settings.easing);
            for monitor in state.monitors.iter_mut() {
                monitor.set_animation_defaults(duration, easing);
            }
            format!("duration = {:.2}", state.settings.duration)
        }
        "easing" => {
            state.settings.easing = Easing::parse(value);
            let (duration, easing) = (state.settings.duration, state.settings.easing);
            for monitor in state.monitors.iter_mut() {
                monitor.set_animation_defaults(duration, easing);
            }
            format!("easing = {}", state.settings.easing.name())
        }
        "vsync" => {
            let vsync = parse_bool(value);
            state.settings.vsync = vsync;
            state.push_effect(Effect::VsyncChanged(vsync));
            format!("vsync = {vsync}")
        }
        "parallax.max_offset_x" => match parse_f32(value) {
            Ok(max) => {
                state.settings.max_offset_x = max.max(0.0);
                format!("parallax.max_offset_x = {:.1}", state.settings.max_offset_x)
            }
            Err(reply) => return reply,
        },
        "parallax.max_offset_y" => match parse_f32(value) {
            Ok(max) => {
                state.settings.max_offset_y = max.max(0.0);
                format!("parallax.max_offset_y = {:.1}", state.settings.max_offset_y)
            }
            Err(reply) => return reply,
        },
        "input.workspace_weight" | "input.cursor_weight" | "input.window_weight"
        | "input.ema_alpha" | "input.deadzone_px" | "input.sensitivity_x"
        | "input.sensitivity_y" => {
            let parsed = match parse_f32(value) {
                Ok(parsed) => parsed,
                Err(reply) => return reply,
            };
            let settings = &mut state.settings;
            match prop {
                "input.workspace_weight" => settings.workspace_weight = parsed.clamp(0.0, 1.0),
                "input.cursor_weight" => settings.cursor_weight = parsed.clamp(0.0, 1.0),
                "input.window_weight" => settings.window_weight = parsed.clamp(0.0, 1.0),
                "input.ema_alpha" => settings.ema_alpha = parsed.clamp(0.01, 1.0),
                "input.deadzone_px" => settings.deadzone_px = parsed.max(0.0),
                "input.sensitivity_x" => settings.sensitivity_x = parsed,
                "input.sensitivity_y" => settings.sensitivity_y = parsed,
                _ => unreachable!(),
            }
            state.push_effect(Effect::Render);
            format!("{prop} = {parsed}")
        }
        "input.invert_x" => {
            state.settings.invert_x = parse_bool(value);
            format!("input.invert_x = {}", state.settings.invert_x)
        }
        "input.invert_y" => {
            state.settings.invert_y = parse_bool(value);
            format!("input.invert_y = {}", state.settings.invert_y)
        }
        "input.tag_policy" => match MultiTagPolicy::parse(value) {
            Some(policy) => {
                state.settings.tag_policy = policy;
                format!("input.tag_policy = {value}")
            }
            None => {
                return Reply::error(
                    ErrorCode::InvalidValue,
                    format!("unknown tag policy '{value}'"),
                )
            }
        },
        "render.overflow" => match OverflowMode::parse(value) {
            Some(overflow) => {
                state.settings.overflow = overflow;
                state.push_effect(Effect::Render);
                format!("render.overflow = {}", overflow.name())
            }
            None => {
                return Reply::error(
                    ErrorCode::InvalidValue,
                    format!("unknown overflow mode '{value}'"),
                )
            }
        },
        "render.tile_x" => {
            state.settings.tile_x = parse_bool(value);
            state.push_effect(Effect::Render);
            format!("render.tile_x = {}", state.settings.tile_x)
        }
        "render.tile_y" => {
            state.settings.tile_y = parse_bool(value);
            state.push_effect(Effect::Render);
            format!("render.tile_y = {}", state.settings.tile_y)
        }
        "render.margin_px_x" => match parse_f32(value) {
            Ok(margin) => {
                state.settings.margin_px_x = margin.max(0.0);
                state.push_effect(Effect::Render);
                format!("render.margin_px_x = {:.0}", state.settings.margin_px_x)
            }
            Err(reply) => return reply,
        },
        "render.margin_px_y" => match parse_f32(value) {
            Ok(margin) => {
                state.settings.margin_px_y = margin.max(0.0);
                state.push_effect(Effect::Render);
                format!("render.margin_px_y = {:.0}", state.settings.margin_px_y)
            }
            Err(reply) => return reply,
        },
        other => {
            return Reply::error(
                ErrorCode::UnknownProperty,
                format!("unknown property '{other}'"),
            )
        }
    };
    Reply::Text(reply)
}

fn get_global(state: &EngineState, prop: &str) -> Reply {
    if let Some(rest) = prop.strip_prefix("layer.") {
        let Some((id, layer_prop)) = rest.split_once('.') else {
            return Reply::error(ErrorCode::BadRequest, "usage: get layer.<id>.<prop>");
        };
        let Ok(id) = id.parse::<u32>() else {
            return Reply::error(ErrorCode::BadRequest, format!("bad layer id '{id}'"));
        };
        let Some(layer) = state.layers.find(id) else {
            return Reply::error(ErrorCode::UnknownLayer, format!("Layer {id} not found"));
        };
        return match layer.get_property(layer_prop) {
            Some(value) => Reply::Text(value),
            None => Reply::error(
                ErrorCode::UnknownProperty,
                format!("unknown property '{layer_prop}'"),
            ),
        };
    }

    let settings: &Settings = &state.settings;
    let value = match prop {
        "fps" => settings.target_fps.to_string(),
        "shift" => match state.monitors.primary() {
            // With a realized monitor, shift reads back as percent of width.
            Some(primary) => format!(
                "{:.1}%",
                settings.shift_pixels / primary.desc.width as f32 * 100.0
            ),
            None => format!("{:.1}", settings.shift_pixels),
        },
        "shift_pixels" => format!("{:.1}", settings.shift_pixels),
        "duration" => format!("{:.2}", settings.duration),
        "easing" => settings.easing.name().to_string(),
        "vsync" => settings.vsync.to_string(),
        "parallax.max_offset_x" => format!("{:.1}", settings.max_offset_x),
        "parallax.max_offset_y" => format!("{:.1}", settings.max_offset_y),
        "input.workspace_weight" => format!("{:.2}", settings.workspace_weight),
        "input.cursor_weight" => format!("{:.2}", settings.cursor_weight),
        "input.window_weight" => format!("{:.2}", settings.window_weight),
        "input.ema_alpha" => format!("{:.2}", settings.ema_alpha),
        "input.deadzone_px" => format!("{:.1}", settings.deadzone_px),
        "input.sensitivity_x" => format!("{:.2}", settings.sensitivity_x),
        "input.sensitivity_y" => format!("{:.2}", settings.sensitivity_y),
        "input.invert_x" => settings.invert_x.to_string(),
        "input.invert_y" => settings.invert_y.to_string(),
        "render.overflow" => settings.overflow.name().to_string(),
        "render.tile_x" => settings.tile_x.to_string(),
        "render.tile_y" => settings.tile_y.to_string(),
        "render.margin_px_x" => format!("{:.0}", settings.margin_px_x),
        "render.margin_px_y" => format!("{:.0}", settings.margin_px_y),
        other => {
            return Reply::error(
                ErrorCode::UnknownProperty,
                format!("unknown property '{other}'"),
            )
        }
    };
    Reply::Text(value)
}

fn status(state: &EngineState, json: bool) -> Reply {
    if json {
        let monitors: Vec<serde_json::Value> = state
            .monitors
            .iter()
            .map(|monitor| {
                let (x, y) = monitor.anim.value();
                serde_json::json!({
                    "name": monitor.desc.name,
                    "width": monitor.desc.width,
                    "height": monitor.desc.height,
                    "scale": monitor.desc.scale,
                    "refresh_hz": monitor.desc.refresh_hz(),
                    "workspace": monitor.context.describe(),
                    "offset": [x, y],
                    "animating": monitor.anim.is_active(),
                })
            })
            .collect();
        return Reply::Json(serde_json::json!({
            "ok": true,
            "version": env!("CARGO_PKG_VERSION"),
            "compositor": state.compositor_name,
            "workspace_model": state.workspace_model.name(),
            "fps": state.settings.target_fps,
            "layers": state.layers.len(),
            "monitors": monitors,
        }));
    }

    let mut lines = vec![
        format!("hyprlax {}", env!("CARGO_PKG_VERSION")),
        format!("Compositor: {}", state.compositor_name),
        format!("Workspace model: {}", state.workspace_model.name()),
        format!("Target FPS: {}", state.settings.target_fps),
        format!("Layers: {}", state.layers.len()),
        format!("Monitors: {}", state.monitors.len()),
    ];
    for monitor in state.monitors.iter() {
        let (x, y) = monitor.anim.value();
        lines.push(format!(
            "  {} {}x{}@{:.1}Hz scale={} ws={} offset=({:.1},{:.1}){}",
            monitor.desc.name,
            monitor.desc.width,
            monitor.desc.height,
            monitor.desc.refresh_hz(),
            monitor.desc.scale,
            monitor.context.describe(),
            x,
            y,
            if monitor.anim.is_active() {
                " [animating]"
            } else {
                ""
            }
        ));
    }
    Reply::Text(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspace::WorkspaceModel;

    fn state() -> EngineState {
        EngineState::new(
            Settings::default(),
            "hyprland".into(),
            WorkspaceModel::GlobalNumeric,
        )
    }

    fn run(state: &mut EngineState, line: &str) -> Reply {
        match parse_request(line) {
            Ok(request) => dispatch(request, state),
            Err(reply) => reply,
        }
    }

    #[test]
    fn add_modify_remove_round_trip() {
        let mut state = state();
        let reply = run(&mut state, "add /tmp/img.png scale=1.5 opacity=0.8 z=2");
        assert_eq!(reply, Reply::Text("Layer added with ID: 1".into()));

        let reply = run(&mut state, "modify 1 opacity 0.5");
        assert_eq!(reply, Reply::Text("Layer 1 modified".into()));

        let Reply::Text(listing) = run(&mut state, "list") else {
            panic!("expected text listing");
        };
        assert!(listing.contains("ID: 1"));
        assert!(listing.contains("/tmp/img.png"));
        assert!(listing.contains("Opacity: 0.50"));

        let reply = run(&mut state, "remove 1");
        assert_eq!(reply, Reply::Text("Layer 1 removed".into()));

        let Reply::Text(listing) = run(&mut state, "list") else {
            panic!("expected text listing");
        };
        assert!(listing.is_empty());
    }

    #[test]
    fn add_then_get_returns_value() {
        let mut state = state();
        run(&mut state, "add /tmp/a.png scale=1.5 align_x=0.25");
        let reply = run(&mut state, "get layer.1.scale");
        assert_eq!(reply, Reply::Text("1.50".into()));
        let reply = run(&mut state, "get layer.1.align_x");
        assert_eq!(reply, Reply::Text("0.25".into()));
    }

    #[test]
    fn modify_z_changes_list_order() {
        let mut state = state();
        run(&mut state, "add /tmp/a.png z=0");
        run(&mut state, "add /tmp/b.png z=1");
        run(&mut state, "modify 1 z 5");
        let Reply::Text(listing) = run(&mut state, "list") else {
            panic!("expected text listing");
        };
        let first_line = listing.lines().next().unwrap();
        assert!(first_line.contains("ID: 2"), "got: {first_line}");
    }

    #[test]
    fn unknown_command_and_property_have_stable_codes() {
        let mut state = state();
        let reply = run(&mut state, "frobnicate");
        assert_eq!(
            reply.to_wire(),
            "Error(2): unknown command 'frobnicate'\n"
        );
        run(&mut state, "add /tmp/a.png");
        let reply = run(&mut state, "modify 1 wobble 3");
        assert!(matches!(
            reply,
            Reply::Error {
                code: ErrorCode::UnknownProperty,
                ..
            }
        ));
    }

    #[test]
    fn oversized_value_rejected() {
        let mut state = state();
        let long_value = "x".repeat(600);
        let reply = run(&mut state, &format!("set easing {long_value}"));
        assert!(matches!(
            reply,
            Reply::Error {
                code: ErrorCode::TooLarge,
                ..
            }
        ));
    }

    #[test]
    fn set_fps_clamps_and_flags_timer() {
        let mut state = state();
        let reply = run(&mut state, "set fps 999");
        assert_eq!(reply, Reply::Text("fps = 240".into()));
        assert!(state.effects.contains(&Effect::FpsChanged));
    }

    #[test]
    fn shift_is_pixels_without_monitors() {
        let mut state = state();
        run(&mut state, "set shift 150");
        assert_eq!(state.settings.shift_pixels, 150.0);
        let reply = run(&mut state, "get shift");
        assert_eq!(reply, Reply::Text("150.0".into()));
    }

    #[test]
    fn json_list_is_structured() {
        let mut state = state();
        run(&mut state, "add /tmp/a.png opacity=0.5");
        let Reply::Json(value) = run(&mut state, "list --json") else {
            panic!("expected json");
        };
        assert_eq!(value["ok"], true);
        assert_eq!(value["layers"][0]["id"], 1);
    }

    #[test]
    fn status_reports_compositor() {
        let mut state = state();
        let Reply::Text(text) = run(&mut state, "status") else {
            panic!("expected text");
        };
        assert!(text.contains("Compositor: hyprland"));
        assert!(text.contains("Workspace model: global_numeric"));
    }

    #[test]
    fn clear_empties_set() {
        let mut state = state();
        run(&mut state, "add /tmp/a.png");
        run(&mut state, "add /tmp/b.png");
        let reply = run(&mut state, "clear");
        assert_eq!(reply, Reply::Text("All layers cleared".into()));
        assert!(state.layers.is_empty());
    }

    #[test]
    fn reload_queues_effect() {
        let mut state = state();
        run(&mut state, "reload");
        assert!(state.effects.contains(&Effect::Reload));
    }
}
