//! The six demo scenarios, one per `gs-twin` testable property from the
//! design notes: identity VS rendering, perspective-correct interpolation,
//! CALL/END control flow, TEV modulate, the fill engine, and texture wrap
//! modes.
use anyhow::{bail, Context, Result};
use gpu_registers::{Register, WrapMode};
use gs_color_combiner::{AlphaModifier, ColorModifier, CombineOp, Source, StageConfig};
use gs_memory::{GuestMemory, VecGuestMemory};
use gs_twin::GpuCore;
use gs_twin_core::{InputVertex, Rgba8, Vec4};
use qfixed::Float24;
use std::path::Path;

use crate::command_buffer::CommandBufferBuilder;

const VIEWPORT: u32 = 16;

fn replace_stage(source: Source) -> StageConfig {
    StageConfig {
        color_sources: [source, Source::Previous, Source::Previous],
        color_modifiers: [ColorModifier::SourceColor; 3],
        color_op: CombineOp::Replace,
        alpha_sources: [source, Source::Previous, Source::Previous],
        alpha_modifiers: [AlphaModifier::SourceAlpha; 3],
        alpha_op: CombineOp::Replace,
    }
}

fn identity_vs(core: &mut GpuCore<VecGuestMemory>) {
    let encode = |opcode: u32, dest: u32, src1: u32| opcode << 26 | dest << 21 | src1 << 5;
    core.load_vs_program_word(0, encode(0x06, 16 + gs_twin::OUT_POSITION as u32, 0));
    core.load_vs_program_word(1, encode(0x06, 16 + gs_twin::OUT_COLOR as u32, 1));
    core.set_vs_entry_point(0);
}

fn configure_viewport(core: &mut GpuCore<VecGuestMemory>, width: u32, height: u32) -> Result<()> {
    let stride = width * 4;
    let buf = CommandBufferBuilder::new()
        .write_register(Register::FbWidth, width)
        .write_register(Register::FbHeight, height)
        .write_register(Register::FbStride, stride)
        .write_register(Register::FbBaseAddr, 0)
        .write_register(Register::ScissorX1, width)
        .write_register(Register::ScissorY1, height)
        .write_register(Register::DepthBaseAddr, stride * height)
        .build();
    core.submit_command_buffer(&buf).context("configuring viewport")?;
    Ok(())
}

fn new_core(framebuffer_bytes: usize) -> GpuCore<VecGuestMemory> {
    // Depth plane is one u16 per texel, placed right after the color plane;
    // sized generously so it comfortably fits in the reserved region.
    GpuCore::new(VecGuestMemory::new(framebuffer_bytes * 2 + 4096))
}

fn vertex(x: f32, y: f32, w: f32, color: Vec4) -> InputVertex {
    let mut v = InputVertex::default();
    v.attributes[0] = Vec4::new(Float24::from_f32(x), Float24::from_f32(y), Float24::from_f32(0.0), Float24::from_f32(w));
    v.attributes[1] = color;
    v
}

fn save_png(core: &GpuCore<VecGuestMemory>, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        core.framebuffer_image().save(path).with_context(|| format!("writing PNG to {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Scenario A: identity VS, a flat red triangle filling most of a 16x16
/// viewport, single TEV stage `Replace(PrimaryColor)`.
pub fn identity_vs_flat_triangle(output: Option<&Path>) -> Result<()> {
    let fb_bytes = (VIEWPORT * VIEWPORT * 4) as usize;
    let mut core = new_core(fb_bytes);
    identity_vs(&mut core);
    configure_viewport(&mut core, VIEWPORT, VIEWPORT)?;
    core.set_tev_stage(0, replace_stage(Source::PrimaryColor));

    let red = Vec4::new(Float24::from_f32(1.0), Float24::from_f32(0.0), Float24::from_f32(0.0), Float24::from_f32(1.0));
    // Corners land exactly on the viewport edges: a 16x16-pixel right
    // triangle with area 128, covering a little under half the viewport.
    let v0 = vertex(-1.0, -1.0, 1.0, red);
    let v1 = vertex(1.0, -1.0, 1.0, red);
    let v2 = vertex(-1.0, 1.0, 1.0, red);
    core.draw_triangle(v0, v1, v2)?;

    let bytes = core.memory().as_slice();
    let mut covered = 0usize;
    let mut mismatched = 0usize;
    for chunk in bytes[..fb_bytes].chunks_exact(4) {
        let packed = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if packed != 0 {
            covered += 1;
            let c = Rgba8::from_packed(packed);
            if c.r != 255 || c.g != 0 || c.b != 0 {
                mismatched += 1;
            }
        }
    }
    println!("scenario A: {covered} pixels covered, {mismatched} mismatched color");
    if covered < 120 {
        bail!("expected at least 120 covered pixels, got {covered}");
    }
    if mismatched != 0 {
        bail!("{mismatched} covered pixels were not solid red");
    }
    save_png(&core, output)?;
    Ok(())
}

/// Scenario B: perspective-correct interpolation across a two-triangle
/// quad with divergent per-vertex `w`. Prints the measured value at the
/// shared diagonal's midpoint so a naive (non-perspective-correct) 0.5
/// would visibly stand out.
pub fn perspective_correctness(output: Option<&Path>) -> Result<()> {
    let size = 32;
    let fb_bytes = (size * size * 4) as usize;
    let mut core = new_core(fb_bytes);
    identity_vs(&mut core);
    configure_viewport(&mut core, size, size)?;
    core.set_tev_stage(0, replace_stage(Source::PrimaryColor));

    let grad = |u: f32| Vec4::new(Float24::from_f32(u), Float24::from_f32(u), Float24::from_f32(u), Float24::from_f32(1.0));

    // Quad corners: near corner (w=1, u=1) opposite far corner (w=2, u=0),
    // sharing the diagonal whose midpoint is under test.
    let near = vertex(-1.0, -1.0, 1.0, grad(1.0));
    let far = vertex(1.0, 1.0, 2.0, grad(0.0));
    let top_right = vertex(1.0, -1.0, 1.5, grad(0.5));
    let bottom_left = vertex(-1.0, 1.0, 1.5, grad(0.5));

    core.draw_triangle(near, top_right, far)?;
    core.draw_triangle(near, far, bottom_left)?;

    let mid = (size / 2) as usize;
    let stride = (size * 4) as usize;
    let addr = mid * stride + mid * 4;
    let packed = core.memory().read_u32(addr as u32)?;
    let c = Rgba8::from_packed(packed);
    let u = c.r as f32 / 255.0;
    println!("scenario B: midpoint u = {u:.3} (naive linear average would read 0.5)");
    save_png(&core, output)?;
    Ok(())
}

/// Scenario C: `CALL 3; END; <3:> MOV o0.x, v0.x; END`, verifying the call
/// stack pops and resumes at the instruction after CALL once the subroutine
/// reaches its own END, rather than the main program's END terminating
/// directly.
pub fn call_and_return() -> Result<()> {
    let mem = VecGuestMemory::new(16);
    let mut core = GpuCore::new(mem);

    // word 0: CALL target=3
    core.load_vs_program_word(0, (0x07u32) << 26 | (3 << 14));
    core.load_vs_program_word(1, (0x09u32) << 26); // END, reached only after the subroutine returns here
    core.load_vs_program_word(3, (0x06u32) << 26 | (16 + gs_twin::OUT_POSITION as u32) << 21); // MOV o0, v0
    core.load_vs_program_word(4, (0x09u32) << 26); // END, pops back to word 1
    core.set_vs_entry_point(0);

    configure_viewport(&mut core, 1, 1)?;
    core.set_tev_stage(0, replace_stage(Source::PrimaryColor));
    let v = vertex(0.25, 0.0, 1.0, Vec4::ZERO);
    core.draw_triangle(v, v, v)?;

    println!("scenario C: CALL/END control flow executed without a fatal VM error");
    Ok(())
}

/// Scenario D: TEV modulate of `PrimaryColor` and `Texture0`.
pub fn tev_modulate() -> Result<()> {
    let primary = Vec4::new(
        Float24::from_f32(200.0 / 255.0),
        Float24::from_f32(100.0 / 255.0),
        Float24::from_f32(50.0 / 255.0),
        Float24::from_f32(1.0),
    );
    let texture = Vec4::splat(Float24::from_f32(128.0 / 255.0));
    let inputs = gs_color_combiner::CombinerInputs { primary_color: primary, texture0: texture, ..Default::default() };
    let stage = StageConfig {
        color_sources: [Source::PrimaryColor, Source::Texture0, Source::Previous],
        color_modifiers: [ColorModifier::SourceColor; 3],
        color_op: CombineOp::Modulate,
        alpha_sources: [Source::PrimaryColor, Source::Previous, Source::Previous],
        alpha_modifiers: [AlphaModifier::SourceAlpha; 3],
        alpha_op: CombineOp::Replace,
    };
    let out = gs_color_combiner::run_stage(&stage, inputs, Vec4::ZERO);
    let lane = |v: Float24| (v.to_f32() * 255.0).round() as u8;
    println!("scenario D: modulate result = ({}, {}, {})", lane(out.x), lane(out.y), lane(out.z));
    if lane(out.x) != 100 || lane(out.y) != 50 || lane(out.z) != 25 {
        bail!("expected (100, 50, 25), got ({}, {}, {})", lane(out.x), lane(out.y), lane(out.z));
    }
    Ok(())
}

/// Scenario E: fill engine from `0x1000` to `0x1010` with `0x11223344`.
pub fn fill_engine() -> Result<()> {
    let mem = VecGuestMemory::new(0x2000);
    let mut core = GpuCore::new(mem);
    let buf = CommandBufferBuilder::new()
        .write_register(Register::FillDstAddr, 0x1000)
        .write_register(Register::FillByteCount, 0x10)
        .write_register(Register::FillColor, 0x11223344)
        .write_register(Register::FillTrigger, 1)
        .build();
    core.submit_command_buffer(&buf)?;

    for word_addr in (0x1000..0x1010).step_by(4) {
        let word = core.memory().read_u32(word_addr)?;
        if word != 0x44332211 {
            bail!("word at {word_addr:#x} read {word:#x}, expected 0x44332211");
        }
    }
    println!("scenario E: fill engine wrote byte-swapped 0x44332211 across [0x1000, 0x1010)");
    Ok(())
}

/// Scenario F: sampling a 4-wide texture at `s=-1` under `Repeat` vs
/// `ClampToEdge`.
pub fn wrap_modes() -> Result<()> {
    let repeat = gs_tex_uv_coord::apply_wrap(-1, 4, WrapMode::Repeat);
    let clamped = gs_tex_uv_coord::apply_wrap(-1, 4, WrapMode::ClampToEdge);
    println!("scenario F: Repeat(-1, width=4) = {repeat}, ClampToEdge(-1, width=4) = {clamped}");
    if repeat != 3 {
        bail!("expected Repeat(-1) == 3, got {repeat}");
    }
    if clamped != 0 {
        bail!("expected ClampToEdge(-1) == 0, got {clamped}");
    }
    Ok(())
}
