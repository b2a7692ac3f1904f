//! Workspace-context models and parallax offset computation.
//!
//! Compositors disagree about what a "workspace" is: Hyprland and Sway use a
//! global numeric id, Niri numbers per output (with a 2D scrolling layout),
//! River composes a bitmask of tags, and Wayfire arranges a 2D grid inside
//! workspace sets. [`WorkspaceContext`] is the sum type over those models and
//! [`offset_2d`] turns a `from -> to` transition into a pixel delta for the
//! animation engine.

use serde::{Deserialize, Serialize};

/// Which workspace model a compositor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceModel {
    GlobalNumeric,
    PerOutputNumeric,
    TagBased,
    SetBased,
}

impl WorkspaceModel {
    pub fn name(self) -> &'static str {
        match self {
            WorkspaceModel::GlobalNumeric => "global_numeric",
            WorkspaceModel::PerOutputNumeric => "per_output_numeric",
            WorkspaceModel::TagBased => "tag_based",
            WorkspaceModel::SetBased => "set_based",
        }
    }
}

/// A position within a compositor's workspace model at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceContext {
    GlobalNumeric(i32),
    PerOutputNumeric(i32),
    TagBased { visible: u32, focused: u32 },
    SetBased { set: i32, workspace: i32 },
}

impl WorkspaceContext {
    pub fn model(&self) -> WorkspaceModel {
        match self {
            WorkspaceContext::GlobalNumeric(_) => WorkspaceModel::GlobalNumeric,
            WorkspaceContext::PerOutputNumeric(_) => WorkspaceModel::PerOutputNumeric,
            WorkspaceContext::TagBased { .. } => WorkspaceModel::TagBased,
            WorkspaceContext::SetBased { .. } => WorkspaceModel::SetBased,
        }
    }

    /// Initial context for a model, used before the first compositor event.
    pub fn initial(model: WorkspaceModel) -> Self {
        match model {
            WorkspaceModel::GlobalNumeric => WorkspaceContext::GlobalNumeric(1),
            WorkspaceModel::PerOutputNumeric => WorkspaceContext::PerOutputNumeric(1),
            WorkspaceModel::TagBased => WorkspaceContext::TagBased {
                visible: 1,
                focused: 1,
            },
            WorkspaceModel::SetBased => WorkspaceContext::SetBased { set: 0, workspace: 0 },
        }
    }

    /// Human-readable form for `status` output and debug logs.
    pub fn describe(&self) -> String {
        match self {
            WorkspaceContext::GlobalNumeric(id) | WorkspaceContext::PerOutputNumeric(id) => {
                format!("workspace:{id}")
            }
            WorkspaceContext::TagBased { visible, focused } => {
                format!("tags:{visible:#x}(focus:{})", tag_to_index(*focused))
            }
            WorkspaceContext::SetBased { set, workspace } => {
                format!("set:{set},ws:{workspace}")
            }
        }
    }

    /// Ordering used to pick an animation direction when only a comparison is
    /// needed. Contexts of different models compare by model tag.
    pub fn compare(&self, other: &WorkspaceContext) -> std::cmp::Ordering {
        use WorkspaceContext::*;
        match (self, other) {
            (GlobalNumeric(a), GlobalNumeric(b)) => a.cmp(b),
            (PerOutputNumeric(a), PerOutputNumeric(b)) => a.cmp(b),
            (TagBased { focused: a, .. }, TagBased { focused: b, .. }) => {
                tag_to_index(*a).cmp(&tag_to_index(*b))
            }
            (SetBased { set: sa, workspace: wa }, SetBased { set: sb, workspace: wb }) => {
                sa.cmp(sb).then(wa.cmp(wb))
            }
            _ => (self.model() as u8).cmp(&(other.model() as u8)),
        }
    }
}

/// How to reduce a multi-tag bitmask to a single index for parallax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiTagPolicy {
    /// Use the highest set bit of the visible mask.
    Highest,
    /// Use the lowest set bit of the visible mask.
    Lowest,
    /// Use the focused tag as reported by the compositor.
    #[default]
    FirstSet,
    /// Suppress parallax entirely while more than one tag is visible.
    NoParallax,
}

impl MultiTagPolicy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "highest" => Some(MultiTagPolicy::Highest),
            "lowest" => Some(MultiTagPolicy::Lowest),
            "first_set" | "first-set" | "focused" => Some(MultiTagPolicy::FirstSet),
            "no_parallax" | "no-parallax" | "none" => Some(MultiTagPolicy::NoParallax),
            _ => None,
        }
    }
}

/// A 2D pixel delta produced by a workspace transition.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

/// Columns assumed when decoding Wayfire's grid from a linear workspace id.
const SET_GRID_COLUMNS: i32 = 3;

/// Column stride of the encoded Niri position (`row * 1000 + col`); must
/// exceed any plausible column count.
pub const SCROLL_ENCODE_COLUMNS: i32 = 1000;

/// Encodes a Niri scrolling-layout position into the compatibility 1D id.
pub fn encode_scroll_position(column: i32, row: i32) -> i32 {
    row * SCROLL_ENCODE_COLUMNS + column
}

/// Decodes the compatibility 1D id back into `(column, row)`.
pub fn decode_scroll_position(id: i32) -> (i32, i32) {
    (id % SCROLL_ENCODE_COLUMNS, id / SCROLL_ENCODE_COLUMNS)
}

/// Index (0-based) of the lowest set bit, or -1 for an empty mask.
pub fn tag_to_index(mask: u32) -> i32 {
    if mask == 0 {
        return -1;
    }
    mask.trailing_zeros() as i32
}

/// Bit for a 0-based tag index; out-of-range indices yield 0.
pub fn index_to_tag(index: i32) -> u32 {
    if !(0..32).contains(&index) {
        return 0;
    }
    1u32 << index
}

pub fn count_tags(mask: u32) -> u32 {
    mask.count_ones()
}

fn highest_set_bit(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        1u32 << (31 - mask.leading_zeros())
    }
}

fn lowest_set_bit(mask: u32) -> u32 {
    mask & mask.wrapping_neg()
}

/// Reduces a tag context to the single tag the policy selects.
fn policy_tag(visible: u32, focused: u32, policy: MultiTagPolicy) -> u32 {
    match policy {
        MultiTagPolicy::Highest => highest_set_bit(visible),
        MultiTagPolicy::Lowest => lowest_set_bit(visible),
        MultiTagPolicy::FirstSet | MultiTagPolicy::NoParallax => focused,
    }
}

/// 1D pixel delta for a workspace transition. Model mismatches yield 0.
pub fn offset_1d(
    from: &WorkspaceContext,
    to: &WorkspaceContext,
    shift_pixels: f32,
    policy: MultiTagPolicy,
) -> f32 {
    use WorkspaceContext::*;
    let delta = match (from, to) {
        (GlobalNumeric(a), GlobalNumeric(b)) | (PerOutputNumeric(a), PerOutputNumeric(b)) => b - a,
        (
            TagBased {
                visible: fv,
                focused: ff,
            },
            TagBased {
                visible: tv,
                focused: tf,
            },
        ) => {
            if policy == MultiTagPolicy::NoParallax && (count_tags(*fv) > 1 || count_tags(*tv) > 1)
            {
                return 0.0;
            }
            tag_to_index(policy_tag(*tv, *tf, policy)) - tag_to_index(policy_tag(*fv, *ff, policy))
        }
        (
            SetBased {
                set: fs,
                workspace: fw,
            },
            SetBased {
                set: ts,
                workspace: tw,
            },
        ) => {
            // Crossing a set boundary is a teleport, not a slide.
            if fs != ts {
                0
            } else {
                tw - fw
            }
        }
        _ => 0,
    };
    delta as f32 * shift_pixels
}

/// 2D pixel delta for a workspace transition. 1D models populate only x.
pub fn offset_2d(
    from: &WorkspaceContext,
    to: &WorkspaceContext,
    shift_pixels: f32,
    policy: MultiTagPolicy,
) -> Offset {
    use WorkspaceContext::*;
    if from.model() != to.model() {
        tracing::debug!(from = %from.describe(), to = %to.describe(), "workspace model mismatch; no offset");
        return Offset::default();
    }

    let offset = match (from, to) {
        (
            SetBased {
                set: fs,
                workspace: fw,
            },
            SetBased {
                set: ts,
                workspace: tw,
            },
        ) => {
            if fs != ts {
                Offset::default()
            } else {
                let (fx, fy) = (fw % SET_GRID_COLUMNS, fw / SET_GRID_COLUMNS);
                let (tx, ty) = (tw % SET_GRID_COLUMNS, tw / SET_GRID_COLUMNS);
                Offset {
                    x: (tx - fx) as f32 * shift_pixels,
                    y: (ty - fy) as f32 * shift_pixels,
                }
            }
        }
        (PerOutputNumeric(f), PerOutputNumeric(t)) => {
            let (fx, fy) = decode_scroll_position(*f);
            let (tx, ty) = decode_scroll_position(*t);
            Offset {
                x: (tx - fx) as f32 * shift_pixels,
                y: (ty - fy) as f32 * shift_pixels,
            }
        }
        _ => Offset {
            x: offset_1d(from, to, shift_pixels, policy),
            y: 0.0,
        },
    };

    tracing::debug!(
        model = from.model().name(),
        from = %from.describe(),
        to = %to.describe(),
        dx = offset.x,
        dy = offset.y,
        "computed workspace offset"
    );
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_delta_scales_by_shift() {
        let from = WorkspaceContext::GlobalNumeric(3);
        let to = WorkspaceContext::GlobalNumeric(5);
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::default());
        assert_eq!(offset.x, 200.0);
        assert_eq!(offset.y, 0.0);
    }

    #[test]
    fn backwards_switch_is_negative() {
        let from = WorkspaceContext::GlobalNumeric(5);
        let to = WorkspaceContext::GlobalNumeric(2);
        assert_eq!(
            offset_1d(&from, &to, 50.0, MultiTagPolicy::default()),
            -150.0
        );
    }

    #[test]
    fn set_mismatch_yields_zero() {
        let from = WorkspaceContext::SetBased { set: 1, workspace: 0 };
        let to = WorkspaceContext::SetBased { set: 2, workspace: 4 };
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::default());
        assert_eq!(offset, Offset::default());
    }

    #[test]
    fn set_grid_decodes_two_axes() {
        // 3x3 grid: ws 0 is (0,0), ws 4 is (1,1).
        let from = WorkspaceContext::SetBased { set: 1, workspace: 0 };
        let to = WorkspaceContext::SetBased { set: 1, workspace: 4 };
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::default());
        assert_eq!(offset.x, 100.0);
        assert_eq!(offset.y, 100.0);
    }

    #[test]
    fn scroll_encoding_round_trips() {
        let id = encode_scroll_position(2, 1);
        assert_eq!(id, 1002);
        assert_eq!(decode_scroll_position(id), (2, 1));
    }

    #[test]
    fn per_output_decodes_rows_and_columns() {
        let from = WorkspaceContext::PerOutputNumeric(encode_scroll_position(0, 0));
        let to = WorkspaceContext::PerOutputNumeric(encode_scroll_position(2, 1));
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::default());
        assert_eq!(offset.x, 200.0);
        assert_eq!(offset.y, 100.0);
    }

    #[test]
    fn no_parallax_policy_suppresses_multi_tag() {
        let from = WorkspaceContext::TagBased {
            visible: 0b11,
            focused: 0b01,
        };
        let to = WorkspaceContext::TagBased {
            visible: 0b100,
            focused: 0b100,
        };
        assert_eq!(
            offset_1d(&from, &to, 100.0, MultiTagPolicy::NoParallax),
            0.0
        );
    }

    #[test]
    fn highest_policy_prefers_highest_bit() {
        // Visible tags 1 and 4 (bits 0 and 3): highest must pick bit 3.
        let from = WorkspaceContext::TagBased {
            visible: 0b1001,
            focused: 0b0001,
        };
        let to = WorkspaceContext::TagBased {
            visible: 0b10000,
            focused: 0b10000,
        };
        // From index 3 to index 4: one workspace to the right.
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::Highest);
        assert_eq!(offset.x, 100.0);
    }

    #[test]
    fn lowest_policy_uses_lowest_bit() {
        let from = WorkspaceContext::TagBased {
            visible: 0b1100,
            focused: 0b1000,
        };
        let to = WorkspaceContext::TagBased {
            visible: 0b0001,
            focused: 0b0001,
        };
        // From index 2 to index 0.
        let offset = offset_2d(&from, &to, 100.0, MultiTagPolicy::Lowest);
        assert_eq!(offset.x, -200.0);
    }

    #[test]
    fn model_mismatch_is_inert() {
        let from = WorkspaceContext::GlobalNumeric(1);
        let to = WorkspaceContext::TagBased {
            visible: 1,
            focused: 1,
        };
        assert_eq!(
            offset_2d(&from, &to, 100.0, MultiTagPolicy::default()),
            Offset::default()
        );
    }

    #[test]
    fn tag_helpers() {
        assert_eq!(tag_to_index(0), -1);
        assert_eq!(tag_to_index(0b1000), 3);
        assert_eq!(index_to_tag(3), 0b1000);
        assert_eq!(index_to_tag(40), 0);
        assert_eq!(count_tags(0b1011), 3);
    }
}
