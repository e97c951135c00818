//! Software implementations of the built-in shader templates.
//!
//! Each kernel mirrors the WGSL template of the same name in `src/shaders/`.
//! Kernels read their parameters by declared name once per draw, then
//! evaluate every output pixel at its texel center.
//!
//! Every built-in lists the parameters and input count it reads.
//! [`Builtin::check`] holds a program to that list when it is prepared, so a
//! misspelled or mistyped parameter fails at pipeline construction instead
//! of reading a silent zero.

use std::f32::consts::SQRT_2;

use glam::{Vec2, Vec3, Vec4};

use super::image::{Image, LUMA, luminance};
use crate::renderer::graph::params::{ParamKind, ParamValue};
use crate::renderer::graph::program::ShaderProgram;
use crate::renderer::graph::target_pool::FilterMode;

use ParamKind::{Float as F, Vec2 as V2, Vec3 as V3};

/// A bound input texture.
pub(crate) struct Texture<'a> {
    pub(crate) image: &'a Image,
    pub(crate) filter: FilterMode,
}

impl Texture<'_> {
    #[inline]
    fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filter {
            FilterMode::Linear => self.image.sample(uv),
            FilterMode::Nearest => self.image.sample_nearest(uv),
        }
    }
}

pub(crate) struct KernelArgs<'a> {
    pub(crate) program: &'a ShaderProgram,
    pub(crate) params: &'a [ParamValue],
    pub(crate) inputs: &'a [Texture<'a>],
    pub(crate) size: (u32, u32),
}

impl KernelArgs<'_> {
    fn value(&self, name: &str) -> Option<ParamValue> {
        self.program
            .param_index(name)
            .and_then(|i| self.params.get(i))
            .copied()
    }

    fn float(&self, name: &str) -> f32 {
        self.value(name).and_then(|v| v.as_f32()).unwrap_or(0.0)
    }

    fn vec2(&self, name: &str) -> Vec2 {
        self.value(name).and_then(|v| v.as_vec2()).unwrap_or(Vec2::ZERO)
    }

    fn vec3(&self, name: &str) -> Vec3 {
        self.value(name).and_then(|v| v.as_vec3()).unwrap_or(Vec3::ZERO)
    }

    fn input(&self, index: usize) -> &Texture<'_> {
        &self.inputs[index]
    }

    fn render(&self, mut shade: impl FnMut(Vec2, u32, u32) -> Vec4) -> Image {
        let (width, height) = self.size;
        let texel = Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);
        Image::from_fn(width, height, |x, y| {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) * texel;
            shade(uv, x, y)
        })
    }
}

pub(crate) type Kernel = fn(&KernelArgs<'_>) -> Image;

/// A built-in kernel and the interface it expects from its program.
pub(crate) struct Builtin {
    pub(crate) kernel: Kernel,
    params: &'static [(&'static str, ParamKind)],
    inputs: usize,
}

impl Builtin {
    const fn new(kernel: Kernel, inputs: usize, params: &'static [(&'static str, ParamKind)]) -> Self {
        Self {
            kernel,
            params,
            inputs,
        }
    }

    /// Verifies that `program` declares every parameter this kernel reads,
    /// with the same kind, and at least as many inputs as it samples.
    pub(crate) fn check(&self, program: &ShaderProgram) -> Result<(), String> {
        for &(name, kind) in self.params {
            let Some(decl) = program.params().iter().find(|d| d.name == name) else {
                return Err(format!(
                    "program '{}' does not declare parameter '{name}' read by template '{}'",
                    program.name(),
                    program.template()
                ));
            };
            if decl.kind != kind {
                return Err(format!(
                    "parameter '{name}' of program '{}' is {:?}, template '{}' reads {kind:?}",
                    program.name(),
                    decl.kind,
                    program.template()
                ));
            }
        }
        if program.inputs().len() < self.inputs {
            return Err(format!(
                "program '{}' declares {} inputs, template '{}' samples {}",
                program.name(),
                program.inputs().len(),
                program.template(),
                self.inputs
            ));
        }
        Ok(())
    }
}

/// Kernel implementing `template`, if it is a built-in.
pub(crate) fn builtin(template: &str) -> Option<Builtin> {
    let builtin = match template {
        "blit" => Builtin::new(blit, 1, &[]),
        "bloom_threshold" => Builtin::new(bloom_threshold, 1, &[("threshold", F)]),
        "bloom_downsample" => Builtin::new(bloom_downsample, 1, &[("texel_size", V2)]),
        "bloom_upsample" => Builtin::new(bloom_upsample, 2, &[("spread", F), ("texel_size", V2)]),
        "bloom_composite" => Builtin::new(bloom_composite, 2, &[("intensity", F)]),
        "god_rays_occlusion" => {
            Builtin::new(god_rays_occlusion, 2, &[("threshold", F), ("sky_depth", F)])
        }
        "god_rays_march" => Builtin::new(
            god_rays_march,
            1,
            &[
                ("light_position", V2),
                ("steps", F),
                ("density", F),
                ("decay", F),
                ("weight", F),
                ("exposure", F),
                ("scattering", F),
            ],
        ),
        "god_rays_composite" => {
            Builtin::new(god_rays_composite, 2, &[("intensity", F), ("tint", V3)])
        }
        "dof_coc" => Builtin::new(
            dof_coc,
            1,
            &[("focus_distance", F), ("focus_range", F), ("max_coc", F)],
        ),
        "dof_blur" => Builtin::new(dof_blur, 2, &[("direction", V2), ("taps", F)]),
        "dof_composite" => Builtin::new(dof_composite, 3, &[]),
        "glare_bright" => Builtin::new(glare_bright, 1, &[("threshold", F)]),
        "glare_streak" => Builtin::new(
            glare_streak,
            1,
            &[("direction", V2), ("samples", F), ("attenuation", F)],
        ),
        "glare_starburst" => Builtin::new(
            glare_starburst,
            1,
            &[("ghosts", F), ("spacing", F), ("ghost_intensity", F)],
        ),
        "glare_composite" => Builtin::new(glare_composite, 2, &[("intensity", F), ("tint", V3)]),
        "film_grain" => Builtin::new(
            film_grain,
            1,
            &[
                ("time", F),
                ("intensity", F),
                ("grain_size", F),
                ("response", F),
                ("chroma", F),
                ("dust_density", F),
            ],
        ),
        "color_grading" => Builtin::new(
            color_grading,
            1,
            &[
                ("exposure", F),
                ("contrast", F),
                ("saturation", F),
                ("lift", V3),
                ("gamma", V3),
                ("gain", V3),
                ("vignette", F),
                ("vignette_radius", F),
                ("warmth", F),
            ],
        ),
        _ => return None,
    };
    Some(builtin)
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0).max(1e-6)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Four bilinear taps at the corners of a `2·texel` box.
#[inline]
fn box4(source: &Texture<'_>, uv: Vec2, texel: Vec2) -> Vec4 {
    (source.sample(uv + Vec2::new(-texel.x, -texel.y))
        + source.sample(uv + Vec2::new(texel.x, -texel.y))
        + source.sample(uv + Vec2::new(-texel.x, texel.y))
        + source.sample(uv + Vec2::new(texel.x, texel.y)))
        * 0.25
}

/// PCG hash; identical in `common.wgsl`.
#[inline]
pub(crate) fn pcg(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Uniform noise in `[0, 1)` for an integer cell and seed.
#[inline]
pub(crate) fn hash3(x: u32, y: u32, seed: u32) -> f32 {
    let h = pcg(x ^ pcg(y ^ pcg(seed)));
    (h >> 8) as f32 / 16_777_216.0
}

// ─── Utility ──────────────────────────────────────────────────────────────────

fn blit(a: &KernelArgs<'_>) -> Image {
    let source = a.input(0);
    a.render(|uv, _, _| source.sample(uv))
}

// ─── Bloom ────────────────────────────────────────────────────────────────────

fn bloom_threshold(a: &KernelArgs<'_>) -> Image {
    let threshold = a.float("threshold");
    let scene = a.input(0);
    a.render(|uv, _, _| {
        let color = scene.sample(uv);
        if luminance(color) > threshold {
            color
        } else {
            Vec4::ZERO
        }
    })
}

fn bloom_downsample(a: &KernelArgs<'_>) -> Image {
    let texel = a.vec2("texel_size");
    let source = a.input(0);
    a.render(|uv, _, _| box4(source, uv, texel))
}

fn bloom_upsample(a: &KernelArgs<'_>) -> Image {
    let spread = a.float("spread");
    let texel = a.vec2("texel_size");
    let (base, coarse) = (a.input(0), a.input(1));
    a.render(|uv, _, _| base.sample(uv) + box4(coarse, uv, texel * 0.5) * spread)
}

fn bloom_composite(a: &KernelArgs<'_>) -> Image {
    let intensity = a.float("intensity");
    let (scene, bloom) = (a.input(0), a.input(1));
    a.render(|uv, _, _| {
        let base = scene.sample(uv);
        let glow = bloom.sample(uv);
        (base.truncate() + glow.truncate() * intensity)
            .clamp(Vec3::ZERO, Vec3::ONE)
            .extend(base.w)
    })
}

// ─── God rays ─────────────────────────────────────────────────────────────────

fn god_rays_occlusion(a: &KernelArgs<'_>) -> Image {
    let threshold = a.float("threshold");
    let sky_depth = a.float("sky_depth");
    let (scene, depth) = (a.input(0), a.input(1));
    a.render(|uv, _, _| {
        let color = scene.sample(uv);
        if depth.sample(uv).x >= sky_depth && luminance(color) > threshold {
            color
        } else {
            Vec4::ZERO
        }
    })
}

fn god_rays_march(a: &KernelArgs<'_>) -> Image {
    let light = a.vec2("light_position");
    let steps = a.float("steps").max(1.0) as u32;
    let density = a.float("density");
    let decay = a.float("decay");
    let weight = a.float("weight");
    let exposure = a.float("exposure") * a.float("scattering");
    let occlusion = a.input(0);

    a.render(|uv, _, _| {
        let delta = (uv - light) * density / steps as f32;
        let mut coord = uv;
        let mut illumination = 1.0;
        let mut sum = Vec4::ZERO;
        for _ in 0..steps {
            coord -= delta;
            sum += occlusion.sample(coord) * illumination * weight;
            illumination *= decay;
        }
        sum * exposure
    })
}

fn god_rays_composite(a: &KernelArgs<'_>) -> Image {
    let intensity = a.float("intensity");
    let tint = a.vec3("tint");
    let (scene, rays) = (a.input(0), a.input(1));
    a.render(|uv, _, _| {
        let base = scene.sample(uv);
        (base.truncate() + rays.sample(uv).truncate() * tint * intensity).extend(base.w)
    })
}

// ─── Depth of field ───────────────────────────────────────────────────────────

fn dof_coc(a: &KernelArgs<'_>) -> Image {
    let focus = a.float("focus_distance");
    let range = a.float("focus_range").max(1e-4);
    let max_coc = a.float("max_coc");
    let depth = a.input(0);
    a.render(|uv, _, _| {
        let d = depth.sample(uv).x;
        let coc = (((d - focus).abs() / range) * max_coc).clamp(0.0, 1.0);
        Vec4::new(coc, 0.0, 0.0, 1.0)
    })
}

fn dof_blur(a: &KernelArgs<'_>) -> Image {
    let direction = a.vec2("direction");
    let half = (a.float("taps").max(1.0) as i32) / 2;
    let (source, coc) = (a.input(0), a.input(1));

    a.render(|uv, _, _| {
        let radius = coc.sample(uv).x;
        if half == 0 || radius <= 0.0 {
            return source.sample(uv);
        }
        let mut sum = Vec4::ZERO;
        let mut total = 0.0;
        for i in -half..=half {
            let t = i as f32 / half as f32;
            let w = (-2.0 * t * t).exp();
            sum += source.sample(uv + direction * (t * radius)) * w;
            total += w;
        }
        sum / total
    })
}

fn dof_composite(a: &KernelArgs<'_>) -> Image {
    let (scene, blurred, coc) = (a.input(0), a.input(1), a.input(2));
    a.render(|uv, _, _| {
        let base = scene.sample(uv);
        let t = coc.sample(uv).x.clamp(0.0, 1.0);
        base.truncate()
            .lerp(blurred.sample(uv).truncate(), t)
            .extend(base.w)
    })
}

// ─── Lens glare ───────────────────────────────────────────────────────────────

fn glare_bright(a: &KernelArgs<'_>) -> Image {
    let threshold = a.float("threshold");
    let scene = a.input(0);
    a.render(|uv, _, _| {
        let color = scene.sample(uv);
        let l = luminance(color);
        if l > threshold {
            color * ((l - threshold) / l)
        } else {
            Vec4::ZERO
        }
    })
}

fn glare_streak(a: &KernelArgs<'_>) -> Image {
    let direction = a.vec2("direction");
    let samples = a.float("samples").max(0.0) as i32;
    let attenuation = a.float("attenuation").clamp(0.0, 1.0);
    let source = a.input(0);

    a.render(|uv, _, _| {
        let mut sum = Vec4::ZERO;
        let mut total = 0.0;
        for i in -samples..=samples {
            let w = attenuation.powi(i.abs());
            sum += source.sample(uv + direction * i as f32) * w;
            total += w;
        }
        sum / total
    })
}

fn glare_starburst(a: &KernelArgs<'_>) -> Image {
    let ghosts = a.float("ghosts").max(0.0) as u32;
    let spacing = a.float("spacing");
    let strength = a.float("ghost_intensity");
    let source = a.input(0);
    let center = Vec2::splat(0.5);

    a.render(|uv, _, _| {
        let base = source.sample(uv);
        if ghosts == 0 {
            return base;
        }
        let step = (center - uv) * spacing;
        let mut sum = Vec4::ZERO;
        for i in 1..=ghosts {
            let coord = uv + step * i as f32;
            let falloff = (1.0 - (coord - center).length() * SQRT_2).max(0.0);
            sum += source.sample(coord) * falloff;
        }
        base + sum * (strength / ghosts as f32)
    })
}

fn glare_composite(a: &KernelArgs<'_>) -> Image {
    let intensity = a.float("intensity");
    let tint = a.vec3("tint");
    let (scene, glare) = (a.input(0), a.input(1));
    a.render(|uv, _, _| {
        let base = scene.sample(uv);
        (base.truncate() + glare.sample(uv).truncate() * tint * intensity).extend(base.w)
    })
}

// ─── Film grain ───────────────────────────────────────────────────────────────

fn film_grain(a: &KernelArgs<'_>) -> Image {
    let frame = (a.float("time").max(0.0) * 24.0) as u32;
    let intensity = a.float("intensity");
    let grain_size = a.float("grain_size").max(1.0);
    let response = a.float("response");
    let chroma = a.float("chroma");
    let dust = a.float("dust_density");
    let scene = a.input(0);

    a.render(|uv, x, y| {
        let base = scene.sample(uv);
        let cx = (x as f32 / grain_size) as u32;
        let cy = (y as f32 / grain_size) as u32;
        let amount = intensity * (1.0 - response * luminance(base)).max(0.0);

        let mut rgb = base.truncate() + Vec3::splat((hash3(cx, cy, frame) - 0.5) * amount);
        if chroma > 0.0 {
            let noise = Vec3::new(
                hash3(cx, cy, frame ^ 0x68e3_1da4),
                hash3(cx, cy, frame ^ 0xb529_7a4d),
                hash3(cx, cy, frame ^ 0x1b56_c4e9),
            ) - 0.5;
            rgb += noise * (amount * chroma);
        }
        if dust > 0.0 && hash3(x, y, frame.wrapping_add(0x9e37_79b9)) < dust * 0.002 {
            rgb *= 0.6;
        }
        rgb.max(Vec3::ZERO).extend(base.w)
    })
}

// ─── Color grading ────────────────────────────────────────────────────────────

fn color_grading(a: &KernelArgs<'_>) -> Image {
    let exposure = a.float("exposure").exp2();
    let contrast = a.float("contrast");
    let saturation = a.float("saturation");
    let lift = a.vec3("lift");
    let gamma = a.vec3("gamma").max(Vec3::splat(1e-3));
    let gain = a.vec3("gain");
    let vignette = a.float("vignette");
    let vignette_radius = a.float("vignette_radius");
    let warmth = a.float("warmth");
    let scene = a.input(0);

    a.render(|uv, _, _| {
        let base = scene.sample(uv);
        let mut rgb = base.truncate() * exposure;
        rgb = ((rgb - 0.5) * contrast + 0.5).max(Vec3::ZERO);
        rgb = Vec3::splat(rgb.dot(LUMA)).lerp(rgb, saturation).max(Vec3::ZERO);
        rgb = gain * (rgb + lift * (Vec3::ONE - rgb));
        rgb = rgb.max(Vec3::ZERO);
        rgb = Vec3::new(
            rgb.x.powf(1.0 / gamma.x),
            rgb.y.powf(1.0 / gamma.y),
            rgb.z.powf(1.0 / gamma.z),
        );
        rgb += Vec3::new(warmth, warmth * 0.5, -warmth) * 0.1;

        let d = (uv - 0.5).length() * SQRT_2;
        rgb *= 1.0 - vignette * smoothstep(vignette_radius, 1.0, d);
        rgb.clamp(Vec3::ZERO, Vec3::ONE).extend(base.w)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_in_range() {
        let a = hash3(3, 7, 11);
        assert_eq!(a, hash3(3, 7, 11));
        assert!((0.0..1.0).contains(&a));
        assert_ne!(hash3(3, 7, 11), hash3(3, 7, 12));
    }

    #[test]
    fn smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
    }

    #[test]
    fn every_builtin_template_resolves() {
        for name in [
            "blit",
            "bloom_threshold",
            "bloom_downsample",
            "bloom_upsample",
            "bloom_composite",
            "film_grain",
            "color_grading",
        ] {
            assert!(builtin(name).is_some(), "{name}");
        }
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn misspelled_parameter_is_rejected() {
        let Some(threshold) = builtin("bloom_threshold") else {
            panic!("bloom_threshold is a built-in");
        };
        let good = ShaderProgram::new("t", "bloom_threshold")
            .input("scene")
            .param("threshold", 0.85);
        assert!(threshold.check(&good).is_ok());

        let typo = ShaderProgram::new("t", "bloom_threshold")
            .input("scene")
            .param("treshold", 0.85);
        let err = threshold.check(&typo).unwrap_err();
        assert!(err.contains("'threshold'"), "{err}");
    }

    #[test]
    fn wrong_kind_and_missing_input_are_rejected() {
        let Some(composite) = builtin("god_rays_composite") else {
            panic!("god_rays_composite is a built-in");
        };
        let scalar_tint = ShaderProgram::new("c", "god_rays_composite")
            .input("scene")
            .input("rays")
            .param("intensity", 1.0)
            .param("tint", 1.0);
        assert!(composite.check(&scalar_tint).is_err());

        let one_input = ShaderProgram::new("c", "god_rays_composite")
            .input("scene")
            .param("intensity", 1.0)
            .param("tint", Vec3::ONE);
        assert!(composite.check(&one_input).is_err());
    }
}
