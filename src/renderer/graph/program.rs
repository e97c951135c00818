//! Shader program declarations
//!
//! A [`ShaderProgram`] is the contract between a pass and its shader body:
//! the template that implements it, the parameters it reads (name, type,
//! default) and the textures it samples. Pipelines are validated against
//! these declarations at build time, so a pass can never bind a parameter
//! the program does not declare.

use rustc_hash::FxHashMap;

use super::params::{ParamKind, ParamValue};
use crate::errors::{HaloError, Result};

/// Declared parameter of a program.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDecl {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
}

/// Declaration of one shader program.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderProgram {
    name: &'static str,
    template: &'static str,
    params: Vec<ParamDecl>,
    inputs: Vec<&'static str>,
}

impl ShaderProgram {
    /// Starts a declaration. `template` names the WGSL template (and the
    /// software kernel) implementing the program body.
    #[must_use]
    pub fn new(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            params: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Declares a texture input. Inputs bind in declaration order.
    #[must_use]
    pub fn input(mut self, name: &'static str) -> Self {
        self.inputs.push(name);
        self
    }

    /// Declares a parameter with its default value.
    #[must_use]
    pub fn param(mut self, name: &'static str, default: impl Into<ParamValue>) -> Self {
        let default = default.into();
        self.params.push(ParamDecl {
            name,
            kind: default.kind(),
            default,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn template(&self) -> &'static str {
        self.template
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[&'static str] {
        &self.inputs
    }

    #[must_use]
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    #[must_use]
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| *i == name)
    }

    /// Default values in declaration order.
    #[must_use]
    pub fn default_values(&self) -> Vec<ParamValue> {
        self.params.iter().map(|p| p.default).collect()
    }
}

/// Identifier assigned by a [`ProgramRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ProgramId(u32);

impl ProgramId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registry of all programs used by the pipelines of one effect stack.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: Vec<ShaderProgram>,
    by_name: FxHashMap<&'static str, ProgramId>,
}

impl ProgramRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a program, returning the existing id when an identical
    /// declaration is already present.
    pub fn register(&mut self, program: ShaderProgram) -> Result<ProgramId> {
        if let Some(&id) = self.by_name.get(program.name) {
            if self.programs[id.index()] == program {
                return Ok(id);
            }
            return Err(HaloError::ProgramConflict(program.name.to_string()));
        }

        let id = ProgramId(self.programs.len() as u32);
        self.by_name.insert(program.name, id);
        self.programs.push(program);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: ProgramId) -> Option<&ShaderProgram> {
        self.programs.get(id.index())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ProgramId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
