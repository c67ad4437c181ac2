//! Fixed-function 6-stage color/alpha combiner (TEV).
//!
//! Each stage independently combines up to three color sources and three
//! alpha sources with one of a handful of fixed operators, feeding the
//! result into the next stage as [`Source::Previous`].
use gs_twin_core::Vec4;
use qfixed::Float24;

pub const STAGE_COUNT: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    PrimaryColor,
    Texture0,
    Texture1,
    Texture2,
    Constant,
    Previous,
}

impl Source {
    pub fn decode(raw: u32) -> Option<Source> {
        Some(match raw {
            0 => Source::PrimaryColor,
            1 => Source::Texture0,
            2 => Source::Texture1,
            3 => Source::Texture2,
            4 => Source::Constant,
            5 => Source::Previous,
            _ => return None,
        })
    }
}

/// Per-source modifier applied to a color source before it reaches the
/// combine operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorModifier {
    SourceColor,
    /// Broadcasts the source's alpha lane into all three color lanes.
    SourceAlpha,
}

impl ColorModifier {
    pub fn decode(raw: u32) -> Option<ColorModifier> {
        Some(match raw {
            0 => ColorModifier::SourceColor,
            1 => ColorModifier::SourceAlpha,
            _ => return None,
        })
    }

    fn apply(self, v: Vec4) -> Vec4 {
        match self {
            ColorModifier::SourceColor => v,
            ColorModifier::SourceAlpha => Vec4::splat(v.w),
        }
    }
}

/// Per-source modifier applied to an alpha source before it reaches the
/// combine operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaModifier {
    SourceAlpha,
    OneMinusSourceAlpha,
}

impl AlphaModifier {
    pub fn decode(raw: u32) -> Option<AlphaModifier> {
        Some(match raw {
            0 => AlphaModifier::SourceAlpha,
            1 => AlphaModifier::OneMinusSourceAlpha,
            _ => return None,
        })
    }

    fn apply(self, v: Vec4) -> Float24 {
        match self {
            AlphaModifier::SourceAlpha => v.w,
            AlphaModifier::OneMinusSourceAlpha => Float24::from_f32(1.0) - v.w,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineOp {
    Replace,
    Modulate,
    Add,
    Lerp,
}

impl CombineOp {
    pub fn decode(raw: u32) -> Option<CombineOp> {
        Some(match raw {
            0 => CombineOp::Replace,
            1 => CombineOp::Modulate,
            2 => CombineOp::Add,
            3 => CombineOp::Lerp,
            _ => return None,
        })
    }
}

/// The operand vectors every source name resolves against for one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CombinerInputs {
    pub primary_color: Vec4,
    pub texture0: Vec4,
    pub texture1: Vec4,
    pub texture2: Vec4,
    pub constant: Vec4,
}

impl CombinerInputs {
    fn resolve(self, source: Source, previous: Vec4) -> Vec4 {
        match source {
            Source::PrimaryColor => self.primary_color,
            Source::Texture0 => self.texture0,
            Source::Texture1 => self.texture1,
            Source::Texture2 => self.texture2,
            Source::Constant => self.constant,
            Source::Previous => previous,
        }
    }
}

/// Resolve a raw source encoding, logging and falling back to zero on an
/// unrecognized value rather than panicking. For callers building a stage
/// config out of raw register bitfields rather than already-decoded
/// [`Source`] values.
pub fn resolve_raw(inputs: CombinerInputs, previous: Vec4, raw_source: u32) -> Vec4 {
    match Source::decode(raw_source) {
        Some(source) => inputs.resolve(source, previous),
        None => {
            log::warn!("color combiner: unrecognized source encoding {raw_source}, treating as zero");
            Vec4::ZERO
        }
    }
}

fn combine(op: CombineOp, a: Vec4, b: Vec4, c: Vec4) -> Vec4 {
    let op4 = |f: fn(Float24, Float24, Float24) -> Float24| Vec4::new(f(a.x, b.x, c.x), f(a.y, b.y, c.y), f(a.z, b.z, c.z), f(a.w, b.w, c.w));
    match op {
        CombineOp::Replace => a,
        CombineOp::Modulate => op4(|a, b, _| a * b),
        CombineOp::Add => op4(|a, b, _| a + b),
        CombineOp::Lerp => op4(|a, b, c| a * c + b * (Float24::from_f32(1.0) - c)),
    }
}

/// One TEV stage's source selection and operator, for color and alpha
/// independently. Sources beyond what an operator needs are ignored
/// (`Replace` only reads `[0]`, `Modulate`/`Add` read `[0]` and `[1]`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageConfig {
    pub color_sources: [Source; 3],
    pub color_modifiers: [ColorModifier; 3],
    pub color_op: CombineOp,
    pub alpha_sources: [Source; 3],
    pub alpha_modifiers: [AlphaModifier; 3],
    pub alpha_op: CombineOp,
}

/// Evaluate one stage, given the `previous` stage's output (the first
/// stage's `previous` is whatever the caller seeds, conventionally black).
pub fn run_stage(stage: &StageConfig, inputs: CombinerInputs, previous: Vec4) -> Vec4 {
    let c = [
        stage.color_modifiers[0].apply(inputs.resolve(stage.color_sources[0], previous)),
        stage.color_modifiers[1].apply(inputs.resolve(stage.color_sources[1], previous)),
        stage.color_modifiers[2].apply(inputs.resolve(stage.color_sources[2], previous)),
    ];
    let a = [
        Vec4::splat(stage.alpha_modifiers[0].apply(inputs.resolve(stage.alpha_sources[0], previous))),
        Vec4::splat(stage.alpha_modifiers[1].apply(inputs.resolve(stage.alpha_sources[1], previous))),
        Vec4::splat(stage.alpha_modifiers[2].apply(inputs.resolve(stage.alpha_sources[2], previous))),
    ];
    let color = combine(stage.color_op, c[0], c[1], c[2]);
    let alpha = combine(stage.alpha_op, a[0], a[1], a[2]);
    Vec4::new(color.x, color.y, color.z, alpha.w)
}

/// Run all [`STAGE_COUNT`] stages in order, threading `Previous` through.
pub fn run_pipeline(stages: &[StageConfig; STAGE_COUNT], inputs: CombinerInputs) -> Vec4 {
    let mut previous = Vec4::ZERO;
    for stage in stages {
        previous = run_stage(stage, inputs, previous);
    }
    previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_vec(v: f32) -> Vec4 {
        Vec4::splat(Float24::from_f32(v))
    }

    const NO_COLOR_MODS: [ColorModifier; 3] = [ColorModifier::SourceColor; 3];
    const NO_ALPHA_MODS: [AlphaModifier; 3] = [AlphaModifier::SourceAlpha; 3];

    #[test]
    fn replace_passes_through_first_source() {
        let inputs = CombinerInputs { primary_color: const_vec(0.5), ..Default::default() };
        let stage = StageConfig {
            color_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Replace,
            alpha_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Replace,
        };
        let out = run_stage(&stage, inputs, Vec4::ZERO);
        assert_eq!(out.x.to_f32(), 0.5);
    }

    #[test]
    fn modulate_multiplies_sources() {
        let inputs = CombinerInputs { primary_color: const_vec(0.5), texture0: const_vec(0.5), ..Default::default() };
        let stage = StageConfig {
            color_sources: [Source::PrimaryColor, Source::Texture0, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Modulate,
            alpha_sources: [Source::PrimaryColor, Source::Texture0, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Modulate,
        };
        let out = run_stage(&stage, inputs, Vec4::ZERO);
        assert!((out.x.to_f32() - 0.25).abs() < 1e-3);
    }

    #[test]
    fn unrecognized_source_resolves_to_zero() {
        let inputs = CombinerInputs::default();
        let out = resolve_raw(inputs, const_vec(1.0), 99);
        assert_eq!(out, Vec4::ZERO);
    }

    #[test]
    fn previous_threads_between_stages() {
        let inputs = CombinerInputs { primary_color: const_vec(0.25), ..Default::default() };
        let stage0 = StageConfig {
            color_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Replace,
            alpha_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Replace,
        };
        let previous_after_stage0 = run_stage(&stage0, inputs, Vec4::ZERO);

        let stage1 = StageConfig {
            color_sources: [Source::Previous, Source::Previous, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Add,
            alpha_sources: [Source::Previous, Source::Previous, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Add,
        };
        let out = run_stage(&stage1, inputs, previous_after_stage0);
        assert!((out.x.to_f32() - 0.5).abs() < 1e-2);
    }

    #[test]
    fn six_stage_pipeline_runs_without_panicking() {
        let inputs = CombinerInputs { primary_color: const_vec(0.25), ..Default::default() };
        let stage = StageConfig {
            color_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Replace,
            alpha_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Replace,
        };
        let stages = [stage; STAGE_COUNT];
        let out = run_pipeline(&stages, inputs);
        assert_eq!(out.x.to_f32(), 0.25);
    }

    #[test]
    fn source_alpha_modifier_broadcasts_alpha_into_color_lanes() {
        let texture = Vec4::new(Float24::from_f32(0.1), Float24::from_f32(0.2), Float24::from_f32(0.3), Float24::from_f32(0.9));
        let inputs = CombinerInputs { texture0: texture, ..Default::default() };
        let stage = StageConfig {
            color_sources: [Source::Texture0, Source::Previous, Source::Previous],
            color_modifiers: [ColorModifier::SourceAlpha, ColorModifier::SourceColor, ColorModifier::SourceColor],
            color_op: CombineOp::Replace,
            alpha_sources: [Source::Texture0, Source::Previous, Source::Previous],
            alpha_modifiers: NO_ALPHA_MODS,
            alpha_op: CombineOp::Replace,
        };
        let out = run_stage(&stage, inputs, Vec4::ZERO);
        assert_eq!(out.x.to_f32(), 0.9);
        assert_eq!(out.y.to_f32(), 0.9);
        assert_eq!(out.z.to_f32(), 0.9);
    }

    #[test]
    fn one_minus_source_alpha_modifier_inverts_alpha() {
        let primary = Vec4::new(Float24::from_f32(1.0), Float24::from_f32(1.0), Float24::from_f32(1.0), Float24::from_f32(0.4));
        let inputs = CombinerInputs { primary_color: primary, ..Default::default() };
        let stage = StageConfig {
            color_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            color_modifiers: NO_COLOR_MODS,
            color_op: CombineOp::Replace,
            alpha_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
            alpha_modifiers: [AlphaModifier::OneMinusSourceAlpha, AlphaModifier::SourceAlpha, AlphaModifier::SourceAlpha],
            alpha_op: CombineOp::Replace,
        };
        let out = run_stage(&stage, inputs, Vec4::ZERO);
        assert!((out.w.to_f32() - 0.6).abs() < 1e-3);
    }
}
