//! Pure fit/alignment arithmetic.
//!
//! Given screen and texture dimensions plus the draw parameters, compute the
//! NDC rectangle the quad occupies and the UV window it samples. Parallax is
//! a UV-space translation derived from a pixel offset, so the conversion
//! factor is also produced here.

use crate::types::{DrawParams, FitMode};

/// Where a layer lands on screen and in the texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// x0, y0, x1, y1 in NDC (-1..1, y up).
    pub rect: [f32; 4],
    /// u0, v0, u1, v1.
    pub uv: [f32; 4],
    /// UV units per screen pixel, per axis; multiplying a pixel offset by
    /// this applies the parallax translation exactly once.
    pub uv_per_px: [f32; 2],
}

pub fn compute_placement(
    screen_w: f32,
    screen_h: f32,
    tex_w: f32,
    tex_h: f32,
    params: &DrawParams,
) -> Placement {
    let screen_w = screen_w.max(1.0);
    let screen_h = screen_h.max(1.0);
    let tex_w = tex_w.max(1.0);
    let tex_h = tex_h.max(1.0);
    let content_scale = if params.content_scale > 0.0 {
        params.content_scale
    } else {
        1.0
    };

    let sx = screen_w / tex_w;
    let sy = screen_h / tex_h;

    let mut rect = [-1.0, -1.0, 1.0, 1.0];
    let mut uv = [0.0, 0.0, 1.0, 1.0];

    match params.fit {
        FitMode::Stretch => {
            // Content scale still zooms about the alignment point.
            if content_scale != 1.0 {
                let window = 1.0 / content_scale;
                let off_u = (1.0 - window) * params.align_x;
                let off_v = (1.0 - window) * params.align_y;
                uv = [off_u, off_v, off_u + window, off_v + window];
            }
        }
        FitMode::Cover | FitMode::FitWidth | FitMode::FitHeight => {
            let scale = match params.fit {
                FitMode::Cover => sx.max(sy),
                FitMode::FitWidth => sx,
                FitMode::FitHeight => sy,
                _ => unreachable!(),
            } * content_scale;
            // The visible UV window is the screen expressed in scaled
            // texture space, placed by alignment.
            let window_u = (screen_w / (scale * tex_w)).min(1.0);
            let window_v = (screen_h / (scale * tex_h)).min(1.0);
            let off_u = (1.0 - window_u) * params.align_x;
            let off_v = (1.0 - window_v) * params.align_y;
            uv = [off_u, off_v, off_u + window_u, off_v + window_v];

            // A forced axis may leave the screen only partially covered on
            // the other axis; shrink the quad there instead of stretching.
            let covered_w = (scale * tex_w).min(screen_w);
            let covered_h = (scale * tex_h).min(screen_h);
            if covered_w < screen_w || covered_h < screen_h {
                rect = aligned_rect(covered_w, covered_h, screen_w, screen_h, params);
            }
        }
        FitMode::Contain => {
            let scale = sx.min(sy) * content_scale;
            let covered_w = (scale * tex_w).min(screen_w);
            let covered_h = (scale * tex_h).min(screen_h);
            rect = aligned_rect(covered_w, covered_h, screen_w, screen_h, params);
        }
    }

    if params.margin_px_x > 0.0 || params.margin_px_y > 0.0 {
        let inset_x = (params.margin_px_x / screen_w) * 2.0;
        let inset_y = (params.margin_px_y / screen_h) * 2.0;
        rect[0] += inset_x;
        rect[2] -= inset_x;
        rect[1] += inset_y;
        rect[3] -= inset_y;
        if rect[0] > rect[2] {
            rect[0] = 0.0;
            rect[2] = 0.0;
        }
        if rect[1] > rect[3] {
            rect[1] = 0.0;
            rect[3] = 0.0;
        }
    }

    let uv_per_px = [
        (uv[2] - uv[0]) / screen_w,
        (uv[3] - uv[1]) / screen_h,
    ];

    Placement { rect, uv, uv_per_px }
}

fn aligned_rect(covered_w: f32, covered_h: f32, screen_w: f32, screen_h: f32, params: &DrawParams) -> [f32; 4] {
    let frac_w = covered_w / screen_w;
    let frac_h = covered_h / screen_h;
    // align 0 = left/top, 1 = right/bottom; NDC y points up.
    let x0 = -1.0 + (1.0 - frac_w) * 2.0 * params.align_x;
    let y1 = 1.0 - (1.0 - frac_h) * 2.0 * params.align_y;
    [x0, y1 - frac_h * 2.0, x0 + frac_w * 2.0, y1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DrawParams;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn stretch_spans_everything() {
        let p = compute_placement(1920.0, 1080.0, 800.0, 600.0, &DrawParams::default_with(FitMode::Stretch));
        assert_eq!(p.rect, [-1.0, -1.0, 1.0, 1.0]);
        assert_eq!(p.uv, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn cover_crops_the_larger_axis() {
        // Square texture on a 2:1 screen: scale is width-driven, so the UV
        // window is full width and half height, centered.
        let p = compute_placement(2000.0, 1000.0, 1000.0, 1000.0, &DrawParams::default_with(FitMode::Cover));
        assert_eq!(p.rect, [-1.0, -1.0, 1.0, 1.0]);
        assert!(close(p.uv[2] - p.uv[0], 1.0));
        assert!(close(p.uv[3] - p.uv[1], 0.5));
        assert!(close(p.uv[1], 0.25));
    }

    #[test]
    fn cover_content_scale_shrinks_window() {
        let base = compute_placement(1000.0, 1000.0, 1000.0, 1000.0, &DrawParams::default_with(FitMode::Cover));
        let mut params = DrawParams::default_with(FitMode::Cover);
        params.content_scale = 2.0;
        let zoomed = compute_placement(1000.0, 1000.0, 1000.0, 1000.0, &params);
        assert!(close(base.uv[2] - base.uv[0], 1.0));
        assert!(close(zoomed.uv[2] - zoomed.uv[0], 0.5));
        // Offset translation compensates for the zoom.
        assert!(close(zoomed.uv_per_px[0], base.uv_per_px[0] / 2.0));
    }

    #[test]
    fn contain_letterboxes() {
        // Square texture on a wide screen letterboxes horizontally.
        let p = compute_placement(2000.0, 1000.0, 500.0, 500.0, &DrawParams::default_with(FitMode::Contain));
        assert_eq!(p.uv, [0.0, 0.0, 1.0, 1.0]);
        assert!(close(p.rect[0], -0.5));
        assert!(close(p.rect[2], 0.5));
        assert!(close(p.rect[1], -1.0));
        assert!(close(p.rect[3], 1.0));
    }

    #[test]
    fn contain_alignment_places_box() {
        let mut params = DrawParams::default_with(FitMode::Contain);
        params.align_x = 0.0;
        let p = compute_placement(2000.0, 1000.0, 500.0, 500.0, &params);
        assert!(close(p.rect[0], -1.0));
        assert!(close(p.rect[2], 0.0));
    }

    #[test]
    fn fit_width_forces_horizontal_cover() {
        // Tall texture, wide screen: width fit crops vertically.
        let p = compute_placement(2000.0, 1000.0, 1000.0, 2000.0, &DrawParams::default_with(FitMode::FitWidth));
        assert!(close(p.uv[2] - p.uv[0], 1.0));
        assert!(close(p.uv[3] - p.uv[1], 0.25));
        assert_eq!(p.rect, [-1.0, -1.0, 1.0, 1.0]);
    }

    #[test]
    fn fit_height_may_underfill_width() {
        // Narrow texture, height fit: quad shrinks horizontally.
        let p = compute_placement(2000.0, 1000.0, 500.0, 1000.0, &DrawParams::default_with(FitMode::FitHeight));
        assert!(close(p.rect[2] - p.rect[0], 1.0));
        assert_eq!(p.uv, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn margins_inset_the_quad() {
        let mut params = DrawParams::default_with(FitMode::Stretch);
        params.margin_px_x = 100.0;
        let p = compute_placement(1000.0, 1000.0, 1000.0, 1000.0, &params);
        assert!(close(p.rect[0], -0.8));
        assert!(close(p.rect[2], 0.8));
    }

    impl DrawParams {
        fn default_with(fit: FitMode) -> Self {
            Self {
                fit,
                ..Self::default()
            }
        }
    }
}
