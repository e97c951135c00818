//! Pass parameters
//!
//! Parameters are typed scalars or small vectors with a stable name. Names
//! are resolved against the program's declarations exactly once, when the
//! pipeline is built; per-frame writes go through a [`ParamSlot`].

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Type of a declared parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ParamKind {
    Float,
    Vec2,
    Vec3,
}

impl ParamKind {
    /// WGSL type name.
    #[must_use]
    pub const fn wgsl_type(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
        }
    }

    /// `(size, alignment)` in bytes under WGSL uniform layout rules.
    #[must_use]
    pub const fn uniform_layout(self) -> (usize, usize) {
        match self {
            Self::Float => (4, 4),
            Self::Vec2 => (8, 8),
            Self::Vec3 => (12, 16),
        }
    }
}

/// A parameter value.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
}

impl ParamValue {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Float(_) => ParamKind::Float,
            Self::Vec2(_) => ParamKind::Vec2,
            Self::Vec3(_) => ParamKind::Vec3,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Self::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    /// Components as a flat slice-friendly array (unused lanes are zero).
    #[must_use]
    pub fn components(&self) -> ([f32; 3], usize) {
        match self {
            Self::Float(v) => ([*v, 0.0, 0.0], 1),
            Self::Vec2(v) => ([v.x, v.y, 0.0], 2),
            Self::Vec3(v) => ([v.x, v.y, v.z], 3),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

/// Pre-resolved location of one parameter inside a built pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ParamSlot {
    pub(crate) pass: u16,
    pub(crate) index: u16,
    pub(crate) kind: ParamKind,
}

impl ParamSlot {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        self.kind
    }
}

/// Packs parameter values into a byte buffer following WGSL uniform layout.
///
/// The result is padded to a multiple of 16 bytes.
pub fn pack_uniforms(values: &[ParamValue], out: &mut Vec<u8>) {
    out.clear();
    for value in values {
        let (_, align) = value.kind().uniform_layout();
        let offset = out.len().next_multiple_of(align);
        out.resize(offset, 0);
        let (lanes, count) = value.components();
        out.extend_from_slice(bytemuck::cast_slice(&lanes[..count]));
    }
    let padded = out.len().next_multiple_of(16).max(16);
    out.resize(padded, 0);
}
