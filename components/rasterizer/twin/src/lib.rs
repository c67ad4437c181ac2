//! Triangle rasterizer: edge-function coverage test with a top-left fill
//! rule, perspective-correct attribute interpolation, and unconditional
//! depth write (no depth test — see the integration crate's design notes).
//!
//! Screen-space vertex coordinates are quantized to [`Q12_4`] before the
//! edge function runs, so coverage is decided in exact integer arithmetic
//! rather than drifting with `f32` rounding. Varyings are interpolated in
//! plain `f32` after perspective division, which is precise enough for a
//! rasterizer that already only promises approximate parity with real
//! silicon.

use gs_twin_core::{Vec2, Vec4};
use qfixed::Q12_4;

/// A post-perspective-divide vertex ready for rasterization: screen-space
/// position, `1/w`, and every varying already divided by `w` so the
/// rasterizer can interpolate `attr/w` and `1/w` independently and recover
/// the perspective-correct value at the end.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenVertex {
    pub x: Q12_4,
    pub y: Q12_4,
    pub inv_w: f32,
    pub depth: f32,
    pub color_over_w: [f32; 4],
    pub tex_coord0_over_w: [f32; 2],
    pub tex_coord1_over_w: [f32; 2],
    pub tex_coord2_over_w: [f32; 2],
}

/// One rasterized fragment: integer pixel coordinates plus interpolated,
/// perspective-corrected varyings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    pub x: i32,
    pub y: i32,
    pub depth: f32,
    pub color: Vec4,
    pub tex_coord0: Vec2,
    pub tex_coord1: Vec2,
    pub tex_coord2: Vec2,
}

/// Inclusive scissor rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scissor {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

fn orient2d(ax: i64, ay: i64, bx: i64, by: i64, cx: i64, cy: i64) -> i64 {
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

/// Top-left fill rule classification for an edge from `a` to `b`: a
/// horizontal edge pointing right, or any edge pointing downward.
fn is_top_left(ax: i64, ay: i64, bx: i64, by: i64) -> bool {
    let dy = by - ay;
    let dx = bx - ax;
    (dy == 0 && dx > 0) || dy < 0
}

fn covered(edge: i64, top_left: bool) -> bool {
    edge > 0 || (edge == 0 && top_left)
}

fn lerp3(w0: f32, w1: f32, w2: f32, a0: f32, a1: f32, a2: f32) -> f32 {
    w0 * a0 + w1 * a1 + w2 * a2
}

/// Rasterize one triangle, calling `emit` for every covered pixel within
/// `scissor`. Winding order is not enforced — a zero-area or
/// negative-area edge function simply covers no pixels.
pub fn rasterize(v0: ScreenVertex, v1: ScreenVertex, v2: ScreenVertex, scissor: Scissor, mut emit: impl FnMut(Fragment)) {
    let (x0, y0) = (v0.x.0 as i64, v0.y.0 as i64);
    let (x1, y1) = (v1.x.0 as i64, v1.y.0 as i64);
    let (x2, y2) = (v2.x.0 as i64, v2.y.0 as i64);

    let area = orient2d(x0, y0, x1, y1, x2, y2);
    if area == 0 {
        return;
    }

    let tl01 = is_top_left(x0, y0, x1, y1);
    let tl12 = is_top_left(x1, y1, x2, y2);
    let tl20 = is_top_left(x2, y2, x0, y0);

    let min_x = x0.min(x1).min(x2);
    let max_x = x0.max(x1).max(x2);
    let min_y = y0.min(y1).min(y2);
    let max_y = y0.max(y1).max(y2);

    let px_min = (min_x.div_euclid(Q12_4::ONE as i64)).max(scissor.x0 as i64);
    let px_max = (max_x.div_euclid(Q12_4::ONE as i64) + 1).min(scissor.x1 as i64);
    let py_min = (min_y.div_euclid(Q12_4::ONE as i64)).max(scissor.y0 as i64);
    let py_max = (max_y.div_euclid(Q12_4::ONE as i64) + 1).min(scissor.y1 as i64);

    let half_pixel = (Q12_4::ONE as i64) / 2;
    let area_f = area as f32;

    for py in py_min..py_max {
        for px in px_min..px_max {
            let sx = px * Q12_4::ONE as i64 + half_pixel;
            let sy = py * Q12_4::ONE as i64 + half_pixel;

            let w0 = orient2d(x1, y1, x2, y2, sx, sy);
            let w1 = orient2d(x2, y2, x0, y0, sx, sy);
            let w2 = orient2d(x0, y0, x1, y1, sx, sy);

            let (w0, w1, w2, e01, e12, e20) = if area < 0 {
                (-w0, -w1, -w2, !tl12, !tl20, !tl01)
            } else {
                (w0, w1, w2, tl12, tl20, tl01)
            };

            if !(covered(w0, e01) && covered(w1, e12) && covered(w2, e20)) {
                continue;
            }

            let b0 = w0 as f32 / area_f.abs();
            let b1 = w1 as f32 / area_f.abs();
            let b2 = w2 as f32 / area_f.abs();

            let inv_w = lerp3(b0, b1, b2, v0.inv_w, v1.inv_w, v2.inv_w);
            if inv_w == 0.0 {
                continue;
            }
            let w = 1.0 / inv_w;

            let depth = lerp3(b0, b1, b2, v0.depth, v1.depth, v2.depth);

            let color = Vec4::new(
                qfixed::Float24::from_f32(lerp3(b0, b1, b2, v0.color_over_w[0], v1.color_over_w[0], v2.color_over_w[0]) * w),
                qfixed::Float24::from_f32(lerp3(b0, b1, b2, v0.color_over_w[1], v1.color_over_w[1], v2.color_over_w[1]) * w),
                qfixed::Float24::from_f32(lerp3(b0, b1, b2, v0.color_over_w[2], v1.color_over_w[2], v2.color_over_w[2]) * w),
                qfixed::Float24::from_f32(lerp3(b0, b1, b2, v0.color_over_w[3], v1.color_over_w[3], v2.color_over_w[3]) * w),
            );

            let tc = |a: [f32; 2], b: [f32; 2], c: [f32; 2]| {
                Vec2::new(
                    qfixed::Float24::from_f32(lerp3(b0, b1, b2, a[0], b[0], c[0]) * w),
                    qfixed::Float24::from_f32(lerp3(b0, b1, b2, a[1], b[1], c[1]) * w),
                )
            };

            emit(Fragment {
                x: px as i32,
                y: py as i32,
                depth,
                color,
                tex_coord0: tc(v0.tex_coord0_over_w, v1.tex_coord0_over_w, v2.tex_coord0_over_w),
                tex_coord1: tc(v0.tex_coord1_over_w, v1.tex_coord1_over_w, v2.tex_coord1_over_w),
                tex_coord2: tc(v0.tex_coord2_over_w, v1.tex_coord2_over_w, v2.tex_coord2_over_w),
            });
        }
    }
}
