//! Shader Template Manager
//!
//! Expands the WGSL template of a [`ShaderProgram`] with minijinja and caches
//! the compiled `wgpu::ShaderModule`s by the hash of their final source.
//!
//! Templates live in `src/shaders/` and are embedded with rust-embed. Shared
//! snippets live in `src/shaders/chunks/` and are pulled in with
//! `{$ include "name" $}`.
//!
//! The binding block of every program is generated from its declaration, so
//! a template can never disagree with the pass that uses it:
//!
//! ```text
//! @group(0) @binding(0..n)  var t_<input>: texture_2d<f32>;   one per input
//! @group(0) @binding(n)     var s_linear: sampler;
//! @group(0) @binding(n + 1) var<uniform> params: Params;      if any params
//! ```

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::OnceLock;

use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{HaloError, Result};
use crate::renderer::graph::program::ShaderProgram;

#[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
const SHADER_DIR: &str = "src/shaders";

pub static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/shaders"]
struct ShaderAssets;

pub fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        match SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
        {
            Ok(syntax) => env.set_syntax(syntax),
            Err(err) => log::error!("Failed to configure shader template syntax: {err}"),
        }

        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);

        env.set_loader(shader_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    };

    // Hot path for shader editing: prefer the on-disk copy in debug builds.
    #[cfg(all(debug_assertions, not(target_arch = "wasm32")))]
    {
        let path = std::path::Path::new(SHADER_DIR).join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("Failed to read {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

#[derive(Serialize)]
struct ProgramContext<'a> {
    program: &'a str,
    binding_code: String,
    has_params: bool,
}

/// Binding slot of the sampler for a program with `input_count` inputs.
#[inline]
#[must_use]
pub fn sampler_binding(input_count: usize) -> u32 {
    input_count as u32
}

/// Binding slot of the uniform block for a program with `input_count` inputs.
#[inline]
#[must_use]
pub fn uniform_binding(input_count: usize) -> u32 {
    input_count as u32 + 1
}

/// Generates the `@group(0)` declarations of `program`.
#[must_use]
pub fn binding_code(program: &ShaderProgram) -> String {
    let mut code = String::new();
    for (i, input) in program.inputs().iter().enumerate() {
        let _ = writeln!(
            code,
            "@group(0) @binding({i}) var t_{input}: texture_2d<f32>;"
        );
    }
    let _ = writeln!(
        code,
        "@group(0) @binding({}) var s_linear: sampler;",
        sampler_binding(program.inputs().len())
    );

    if !program.params().is_empty() {
        code.push_str("\nstruct Params {\n");
        for decl in program.params() {
            let _ = writeln!(code, "    {}: {},", decl.name, decl.kind.wgsl_type());
        }
        code.push_str("};\n");
        let _ = writeln!(
            code,
            "@group(0) @binding({}) var<uniform> params: Params;",
            uniform_binding(program.inputs().len())
        );
    }
    code
}

/// Expands the template of `program` into final WGSL.
pub fn generate_program_source(program: &ShaderProgram) -> Result<String> {
    let env = get_env();
    let template = env.get_template(program.template()).map_err(|e| {
        HaloError::Backend(format!(
            "shader template '{}' not found: {e}",
            program.template()
        ))
    })?;

    let ctx = ProgramContext {
        program: program.name(),
        binding_code: binding_code(program),
        has_params: !program.params().is_empty(),
    };
    let source = template.render(&ctx).map_err(|e| {
        HaloError::Backend(format!(
            "shader template '{}' failed to render: {e}",
            program.template()
        ))
    })?;

    Ok(format!(
        "// === Auto-generated post-process shader: {} ===\n{source}",
        program.name()
    ))
}

// ─── ShaderManager ────────────────────────────────────────────────────────────

/// Shader module cache.
///
/// Deduplicates compiled `wgpu::ShaderModule`s by hashing the **final** WGSL
/// source with xxh3-128, so programs that expand to the same code share one
/// module.
#[derive(Default)]
pub struct ShaderManager {
    module_cache: FxHashMap<u128, wgpu::ShaderModule>,
}

impl ShaderManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `program` (or returns the cached module).
    ///
    /// Returns `(module, source_hash)`.
    pub fn get_or_compile_program(
        &mut self,
        device: &wgpu::Device,
        program: &ShaderProgram,
    ) -> Result<(&wgpu::ShaderModule, u128)> {
        let source = generate_program_source(program)?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("Generated shader '{}':\n{source}", program.name());
        }

        let hash = xxh3_128(source.as_bytes());
        let module = self.module_cache.entry(hash).or_insert_with(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Post Shader {}", program.name())),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });

        Ok((module, hash))
    }

    #[must_use]
    pub fn module_count(&self) -> usize {
        self.module_cache.len()
    }
}
