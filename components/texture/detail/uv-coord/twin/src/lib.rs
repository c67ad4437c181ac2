//! Texture coordinate wrapping: maps an interpolated `(u, v)` in `[0, 1)`
//! (or beyond, for `Repeat`) down to an integer texel index in `0..size`.
use gpu_registers::WrapMode;

/// Wrap a single axis coordinate to an integer texel index.
///
/// `coord` is expected in texel units (already multiplied by `size`), since
/// the caller (the texture sampler) is the one that knows the texture's
/// dimensions and whether `u` or `v` needs that scale applied first.
pub fn wrap_texel(coord: i32, size: u32) -> u32 {
    let size = size as i32;
    if size <= 0 {
        return 0;
    }
    coord.rem_euclid(size) as u32
}

/// Clamp a single axis coordinate to `0..size`, for `ClampToEdge`.
pub fn clamp_texel(coord: i32, size: u32) -> u32 {
    coord.clamp(0, size as i32 - 1).max(0) as u32
}

/// Apply the configured wrap mode to a texel coordinate.
pub fn apply_wrap(coord: i32, size: u32, mode: WrapMode) -> u32 {
    match mode {
        WrapMode::Repeat => wrap_texel(coord, size),
        WrapMode::ClampToEdge => clamp_texel(coord, size),
    }
}

/// Convert a normalized `(u, v)` in `Float24`-derived `f32` to integer
/// texel coordinates for a `width x height` texture, applying wrap modes
/// per axis. Uses nearest-texel sampling (no filtering).
pub fn uv_to_texel(u: f32, v: f32, width: u32, height: u32, wrap_u: WrapMode, wrap_v: WrapMode) -> (u32, u32) {
    let tx = (u * width as f32).floor() as i32;
    let ty = (v * height as f32).floor() as i32;
    (apply_wrap(tx, width, wrap_u), apply_wrap(ty, height, wrap_v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_wraps_negative_and_overflow() {
        assert_eq!(wrap_texel(-1, 8), 7);
        assert_eq!(wrap_texel(8, 8), 0);
        assert_eq!(wrap_texel(3, 8), 3);
    }

    #[test]
    fn clamp_saturates_at_edges() {
        assert_eq!(clamp_texel(-5, 8), 0);
        assert_eq!(clamp_texel(99, 8), 7);
    }

    #[test]
    fn uv_to_texel_nearest() {
        let (tx, ty) = uv_to_texel(0.99, 0.01, 8, 8, WrapMode::ClampToEdge, WrapMode::ClampToEdge);
        assert_eq!(tx, 7);
        assert_eq!(ty, 0);
    }
}
