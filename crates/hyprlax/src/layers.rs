//! Layer records and the z-ordered layer set.
//!
//! Layer ids are monotonically assigned u32s that are never reused within a
//! process, so control-socket clients can hold on to them across mutations.
//! The set keeps its backing Vec sorted by `(z, insertion)` — a stable sort
//! key — and every mutation that touches `z` re-sorts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use animation::{AxisPair, Easing};
use config::LayerSpec;
use renderer::{FitMode, OverflowMode, TextureHandle, TileMode, Tint};

#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("unknown property '{0}'")]
    Unknown(String),
    #[error("invalid value for '{prop}': {reason}")]
    Invalid { prop: String, reason: String },
    #[error("property '{0}' is immutable")]
    Immutable(String),
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub id: u32,
    pub image: PathBuf,
    pub texture: Option<TextureHandle>,
    pub tex_size: Option<(u32, u32)>,
    pub texture_failed: bool,

    pub shift_multiplier: f32,
    pub opacity: f32,
    pub blur: f32,
    pub tint: Tint,

    pub base_offset_x: f32,
    pub base_offset_y: f32,

    pub fit: FitMode,
    pub content_scale: f32,
    pub align_x: f32,
    pub align_y: f32,
    pub overflow: OverflowMode,
    pub tile_x: TileMode,
    pub tile_y: TileMode,
    pub margin_px_x: f32,
    pub margin_px_y: f32,

    pub z: i32,
    pub hidden: bool,

    pub easing: Option<Easing>,
    pub duration: Option<f32>,
    pub delay: f32,
    pub anim: AxisPair,

    insertion: u64,
}

impl Layer {
    fn from_spec(id: u32, insertion: u64, spec: &LayerSpec, defaults: &AnimDefaults) -> Self {
        let duration = spec
            .duration
            .map(Duration::from_secs_f32)
            .unwrap_or(defaults.duration);
        let easing = spec.easing.unwrap_or(defaults.easing);
        let mut anim = AxisPair::new(duration, easing);
        anim.set_delay(Duration::from_secs_f32(spec.delay.max(0.0)));
        Self {
            id,
            image: spec.image.clone(),
            texture: None,
            tex_size: None,
            texture_failed: false,
            shift_multiplier: spec.shift_multiplier,
            opacity: spec.opacity.clamp(0.0, 1.0),
            blur: spec.blur.max(0.0),
            tint: spec.tint.unwrap_or_default(),
            base_offset_x: 0.0,
            base_offset_y: 0.0,
            fit: spec.fit.unwrap_or_default(),
            content_scale: if spec.content_scale > 0.0 {
                spec.content_scale
            } else {
                1.0
            },
            align_x: spec.align_x.clamp(0.0, 1.0),
            align_y: spec.align_y.clamp(0.0, 1.0),
            overflow: spec.overflow.unwrap_or(OverflowMode::Inherit),
            tile_x: spec.tile_x,
            tile_y: spec.tile_y,
            margin_px_x: spec.margin_px_x.max(0.0),
            margin_px_y: spec.margin_px_y.max(0.0),
            z: spec.z,
            hidden: spec.hidden,
            easing: spec.easing,
            duration: spec.duration,
            delay: spec.delay.max(0.0),
            anim,
            insertion,
        }
    }

    /// A layer with its own easing, duration or delay animates workspace
    /// deltas itself instead of following the monitor's animation.
    pub fn has_custom_animation(&self) -> bool {
        self.easing.is_some() || self.duration.is_some() || self.delay > 0.0
    }

    /// Mutates one property from its control-protocol string form. `z`
    /// changes are reported to the caller so the set can re-sort.
    pub fn set_property(&mut self, prop: &str, value: &str) -> Result<PropertyChange, PropertyError> {
        let parse_f32 = |prop: &str, value: &str| -> Result<f32, PropertyError> {
            value.trim().parse().map_err(|_| PropertyError::Invalid {
                prop: prop.to_string(),
                reason: format!("'{value}' is not a number"),
            })
        };
        match prop {
            "scale" | "shift" | "shift_multiplier" => {
                self.shift_multiplier = parse_f32(prop, value)?;
            }
            "opacity" => self.opacity = parse_f32(prop, value)?.clamp(0.0, 1.0),
            "blur" => self.blur = parse_f32(prop, value)?.max(0.0),
            "x" => self.base_offset_x = parse_f32(prop, value)?,
            "y" => self.base_offset_y = parse_f32(prop, value)?,
            "z" => {
                self.z = value.trim().parse().map_err(|_| PropertyError::Invalid {
                    prop: prop.into(),
                    reason: format!("'{value}' is not an integer"),
                })?;
                return Ok(PropertyChange::ZOrder);
            }
            "fit" => {
                self.fit = FitMode::parse(value).ok_or_else(|| PropertyError::Invalid {
                    prop: prop.into(),
                    reason: format!("unknown fit mode '{value}'"),
                })?;
            }
            "content_scale" => {
                let scale = parse_f32(prop, value)?;
                if scale <= 0.0 {
                    return Err(PropertyError::Invalid {
                        prop: prop.into(),
                        reason: "content_scale must be positive".into(),
                    });
                }
                self.content_scale = scale;
            }
            "align_x" => self.align_x = parse_f32(prop, value)?.clamp(0.0, 1.0),
            "align_y" => self.align_y = parse_f32(prop, value)?.clamp(0.0, 1.0),
            "overflow" => {
                self.overflow = OverflowMode::parse(value).ok_or_else(|| PropertyError::Invalid {
                    prop: prop.into(),
                    reason: format!("unknown overflow mode '{value}'"),
                })?;
            }
            "tile.x" | "tile_x" => {
                self.tile_x = TileMode::parse(value).ok_or_else(|| PropertyError::Invalid {
                    prop: prop.into(),
                    reason: format!("'{value}' is not a tile mode"),
                })?;
            }
            "tile.y" | "tile_y" => {
                self.tile_y = TileMode::parse(value).ok_or_else(|| PropertyError::Invalid {
                    prop: prop.into(),
                    reason: format!("'{value}' is not a tile mode"),
                })?;
            }
            "margin.x" | "margin_px_x" => self.margin_px_x = parse_f32(prop, value)?.max(0.0),
            "margin.y" | "margin_px_y" => self.margin_px_y = parse_f32(prop, value)?.max(0.0),
            "tint" => {
                let strength = self.tint.strength;
                let mut tint =
                    Tint::parse_hex(value).ok_or_else(|| PropertyError::Invalid {
                        prop: prop.into(),
                        reason: format!("'{value}' is not #RRGGBB"),
                    })?;
                if strength > 0.0 {
                    tint.strength = strength;
                }
                self.tint = tint;
            }
            "tint_strength" => self.tint.strength = parse_f32(prop, value)?.clamp(0.0, 1.0),
            "hidden" => {
                self.hidden = matches!(value.trim(), "1" | "true" | "yes" | "on");
            }
            "easing" => {
                let easing = Easing::parse(value);
                self.easing = Some(easing);
                self.anim.set_easing(easing);
            }
            "duration" => {
                let duration = parse_f32(prop, value)?;
                if duration <= 0.0 {
                    return Err(PropertyError::Invalid {
                        prop: prop.into(),
                        reason: "duration must be positive".into(),
                    });
                }
                self.duration = Some(duration);
                self.anim.set_duration(Duration::from_secs_f32(duration));
            }
            "delay" => {
                let delay = parse_f32(prop, value)?.max(0.0);
                self.delay = delay;
                self.anim.set_delay(Duration::from_secs_f32(delay));
            }
            "image" | "path" => return Err(PropertyError::Immutable(prop.into())),
            other => return Err(PropertyError::Unknown(other.into())),
        }
        Ok(PropertyChange::Plain)
    }

    pub fn get_property(&self, prop: &str) -> Option<String> {
        let value = match prop {
            "scale" | "shift" | "shift_multiplier" => format!("{:.2}", self.shift_multiplier),
            "opacity" => format!("{:.2}", self.opacity),
            "blur" => format!("{:.2}", self.blur),
            "x" => format!("{:.2}", self.base_offset_x),
            "y" => format!("{:.2}", self.base_offset_y),
            "z" => self.z.to_string(),
            "fit" => self.fit.name().to_string(),
            "content_scale" => format!("{:.2}", self.content_scale),
            "align_x" => format!("{:.2}", self.align_x),
            "align_y" => format!("{:.2}", self.align_y),
            "overflow" => self.overflow.name().to_string(),
            "tile.x" | "tile_x" => format!("{:?}", self.tile_x).to_lowercase(),
            "tile.y" | "tile_y" => format!("{:?}", self.tile_y).to_lowercase(),
            "margin.x" | "margin_px_x" => format!("{:.0}", self.margin_px_x),
            "margin.y" | "margin_px_y" => format!("{:.0}", self.margin_px_y),
            "tint" => format!(
                "#{:02X}{:02X}{:02X}",
                (self.tint.r * 255.0) as u8,
                (self.tint.g * 255.0) as u8,
                (self.tint.b * 255.0) as u8
            ),
            "tint_strength" => format!("{:.2}", self.tint.strength),
            "hidden" => (self.hidden as u8).to_string(),
            "easing" => self
                .easing
                .map(|easing| easing.name().to_string())
                .unwrap_or_else(|| "inherit".into()),
            "duration" => self
                .duration
                .map(|duration| format!("{duration:.2}"))
                .unwrap_or_else(|| "inherit".into()),
            "delay" => format!("{:.2}", self.delay),
            "image" | "path" => self.image.display().to_string(),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    Plain,
    ZOrder,
}

/// Animation defaults inherited by layers that do not override them.
#[derive(Debug, Clone, Copy)]
pub struct AnimDefaults {
    pub duration: Duration,
    pub easing: Easing,
}

/// Z-ordered collection of layers with stable, never-reused ids.
#[derive(Debug)]
pub struct LayerSet {
    layers: Vec<Layer>,
    next_id: u32,
    next_insertion: u64,
}

impl LayerSet {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            next_id: 1,
            next_insertion: 0,
        }
    }

    pub fn add(&mut self, spec: &LayerSpec, defaults: &AnimDefaults) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let insertion = self.next_insertion;
        self.next_insertion += 1;
        self.layers.push(Layer::from_spec(id, insertion, spec, defaults));
        self.sort();
        id
    }

    pub fn remove(&mut self, id: u32) -> Option<Layer> {
        let index = self.layers.iter().position(|layer| layer.id == id)?;
        Some(self.layers.remove(index))
    }

    /// Removes every layer, returning them so textures can be released.
    pub fn clear(&mut self) -> Vec<Layer> {
        std::mem::take(&mut self.layers)
    }

    pub fn find(&self, id: u32) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id == id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in draw order (back to front).
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers.iter_mut()
    }

    /// Re-sorts after a z mutation. Stable: equal z keeps insertion order.
    pub fn sort(&mut self) {
        self.layers.sort_by_key(|layer| (layer.z, layer.insertion));
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        let mut any_active = false;
        for layer in &mut self.layers {
            any_active |= layer.anim.tick(now);
        }
        any_active
    }

    pub fn any_active(&self) -> bool {
        self.layers.iter().any(|layer| layer.anim.is_active())
    }

    /// Moves a layer to the front (highest z) of the stack.
    pub fn to_front(&mut self, id: u32) -> bool {
        let Some(max_z) = self.layers.iter().map(|layer| layer.z).max() else {
            return false;
        };
        let Some(layer) = self.find_mut(id) else {
            return false;
        };
        layer.z = max_z + 1;
        self.sort();
        true
    }

    pub fn to_back(&mut self, id: u32) -> bool {
        let Some(min_z) = self.layers.iter().map(|layer| layer.z).min() else {
            return false;
        };
        let Some(layer) = self.find_mut(id) else {
            return false;
        };
        layer.z = min_z - 1;
        self.sort();
        true
    }

    /// Swaps z with the next layer above; no-op at the top.
    pub fn raise(&mut self, id: u32) -> bool {
        let Some(position) = self.layers.iter().position(|layer| layer.id == id) else {
            return false;
        };
        if position + 1 >= self.layers.len() {
            return true;
        }
        let above_z = self.layers[position + 1].z;
        let own_z = self.layers[position].z;
        self.layers[position].z = above_z;
        self.layers[position + 1].z = own_z;
        // Same z after swap means the pair relies on insertion order; nudge
        // instead so the move is observable.
        if above_z == own_z {
            self.layers[position].z = own_z + 1;
        }
        self.sort();
        true
    }

    pub fn lower(&mut self, id: u32) -> bool {
        let Some(position) = self.layers.iter().position(|layer| layer.id == id) else {
            return false;
        };
        if position == 0 {
            return true;
        }
        let below_z = self.layers[position - 1].z;
        let own_z = self.layers[position].z;
        self.layers[position].z = below_z;
        self.layers[position - 1].z = own_z;
        if below_z == own_z {
            self.layers[position].z = own_z - 1;
        }
        self.sort();
        true
    }
}

impl Default for LayerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> AnimDefaults {
        AnimDefaults {
            duration: Duration::from_secs(1),
            easing: Easing::Linear,
        }
    }

    fn spec(image: &str, z: i32) -> LayerSpec {
        let mut spec = LayerSpec::new(image);
        spec.z = z;
        spec
    }

    #[test]
    fn ids_are_monotonic_and_not_reused() {
        let mut set = LayerSet::new();
        let a = set.add(&spec("a.png", 0), &defaults());
        let b = set.add(&spec("b.png", 0), &defaults());
        assert_eq!((a, b), (1, 2));
        set.remove(a);
        let c = set.add(&spec("c.png", 0), &defaults());
        assert_eq!(c, 3);
    }

    #[test]
    fn draw_order_sorted_by_z_then_insertion() {
        let mut set = LayerSet::new();
        set.add(&spec("mid.png", 5), &defaults());
        set.add(&spec("back.png", 0), &defaults());
        set.add(&spec("front.png", 10), &defaults());
        set.add(&spec("mid2.png", 5), &defaults());
        let order: Vec<_> = set.iter().map(|layer| layer.image.display().to_string()).collect();
        assert_eq!(order, ["back.png", "mid.png", "mid2.png", "front.png"]);
    }

    #[test]
    fn modify_z_resorts() {
        let mut set = LayerSet::new();
        let a = set.add(&spec("a.png", 0), &defaults());
        let _b = set.add(&spec("b.png", 1), &defaults());
        let change = set.find_mut(a).unwrap().set_property("z", "5").unwrap();
        assert_eq!(change, PropertyChange::ZOrder);
        set.sort();
        let order: Vec<_> = set.iter().map(|layer| layer.id).collect();
        assert_eq!(order, [2, 1]);
    }

    #[test]
    fn opacity_clamps_on_write() {
        let mut set = LayerSet::new();
        let id = set.add(&spec("a.png", 0), &defaults());
        let layer = set.find_mut(id).unwrap();
        layer.set_property("opacity", "3.5").unwrap();
        assert_eq!(layer.opacity, 1.0);
        layer.set_property("opacity", "-1").unwrap();
        assert_eq!(layer.opacity, 0.0);
    }

    #[test]
    fn image_is_immutable() {
        let mut set = LayerSet::new();
        let id = set.add(&spec("a.png", 0), &defaults());
        let err = set
            .find_mut(id)
            .unwrap()
            .set_property("image", "b.png")
            .unwrap_err();
        assert!(matches!(err, PropertyError::Immutable(_)));
    }

    #[test]
    fn unknown_property_errors() {
        let mut set = LayerSet::new();
        let id = set.add(&spec("a.png", 0), &defaults());
        assert!(matches!(
            set.find_mut(id).unwrap().set_property("wobble", "1"),
            Err(PropertyError::Unknown(_))
        ));
    }

    #[test]
    fn property_round_trip() {
        let mut set = LayerSet::new();
        let id = set.add(&spec("a.png", 0), &defaults());
        let layer = set.find_mut(id).unwrap();
        layer.set_property("scale", "1.5").unwrap();
        layer.set_property("align_x", "0.25").unwrap();
        layer.set_property("tint", "#336699").unwrap();
        assert_eq!(layer.get_property("scale").unwrap(), "1.50");
        assert_eq!(layer.get_property("align_x").unwrap(), "0.25");
        assert_eq!(layer.get_property("tint").unwrap(), "#336699");
    }

    #[test]
    fn z_shortcuts() {
        let mut set = LayerSet::new();
        let a = set.add(&spec("a.png", 0), &defaults());
        let b = set.add(&spec("b.png", 1), &defaults());
        let c = set.add(&spec("c.png", 2), &defaults());

        set.to_front(a);
        let order: Vec<_> = set.iter().map(|layer| layer.id).collect();
        assert_eq!(order, [b, c, a]);

        set.to_back(a);
        let order: Vec<_> = set.iter().map(|layer| layer.id).collect();
        assert_eq!(order, [a, b, c]);

        set.raise(a);
        let order: Vec<_> = set.iter().map(|layer| layer.id).collect();
        assert_eq!(order, [b, a, c]);

        set.lower(a);
        let order: Vec<_> = set.iter().map(|layer| layer.id).collect();
        assert_eq!(order, [a, b, c]);
    }
}
