//! Quality Tiers
//!
//! Constrained devices get a cheaper pipeline topology. Instead of a
//! "mobile" flag threaded through every effect constructor, one pure
//! selector turns the viewport width (or an explicit device class) into a
//! single immutable [`TierParams`] bundle that every pipeline reads while it
//! is being built.
//!
//! Tiers are discrete on purpose: a pipeline's stage count never changes
//! between frames, only on an explicit rebuild.
//!
//! # Tier Table
//!
//! | Setting                  | `High` | `Medium` | `Low` |
//! |--------------------------|--------|----------|-------|
//! | Bloom pyramid levels     | 6      | 6        | 6     |
//! | Blur kernel taps         | 13     | 9        | 5     |
//! | God-ray mask divisor     | 2      | 2        | 4     |
//! | God-ray march steps      | 24     | 18       | 12    |
//! | God-ray scattering scale | 1.0    | 0.85     | 0.7   |
//! | Glare streak samples     | 16     | 12       | 8     |
//! | Glare starburst pass     | ✅     | ✅       | ❌    |
//! | Grain chroma noise       | ✅     | ✅       | ❌    |
//! | Grain dust scale         | 1.0    | 0.75     | 0.5   |
//! | Star count scale         | 1.0    | 0.75     | 0.5   |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use halo::renderer::quality::{select_tier, QualityTier};
//!
//! let params = select_tier(400);
//! assert_eq!(params.tier, QualityTier::Low);
//! assert_eq!(params.god_rays.steps, 12);
//! ```

use serde::{Deserialize, Serialize};

/// Discrete quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum QualityTier {
    Low,
    Medium,
    #[default]
    High,
}

/// Explicit device class reported by the host, bypassing width detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

/// Viewport widths (in pixels) separating the tiers.
///
/// A width strictly below `low_max_width` selects [`QualityTier::Low`],
/// below `medium_max_width` selects [`QualityTier::Medium`], anything else
/// [`QualityTier::High`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub low_max_width: u32,
    pub medium_max_width: u32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            low_max_width: 768,
            medium_max_width: 1280,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-family settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomTier {
    /// Number of downsample (and upsample) stages.
    pub levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlurTier {
    /// Taps per separable blur direction (odd).
    pub kernel_taps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GodRaysTier {
    /// The occlusion and march targets are `viewport / resolution_divisor`.
    pub resolution_divisor: u32,
    pub steps: u32,
    /// Multiplier applied to the configured scattering strength.
    pub scattering_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlareTier {
    pub streak_samples: u32,
    /// Whether the starburst convolution pass exists at all.
    pub starburst: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrainTier {
    /// Whether the chroma-noise term runs.
    pub chroma_noise: bool,
    pub dust_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleTier {
    /// Multiplier for decorative star/particle counts (consumed by the host).
    pub star_count_scale: f32,
}

/// The immutable parameter bundle of one tier.
///
/// Consumed once per pipeline build. Hosts that want to tune one effect
/// independently can start from [`TierParams::for_tier`] and override
/// individual fields before handing the bundle to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierParams {
    pub tier: QualityTier,
    pub bloom: BloomTier,
    pub blur: BlurTier,
    pub god_rays: GodRaysTier,
    pub glare: GlareTier,
    pub grain: GrainTier,
    pub particles: ParticleTier,
}

impl TierParams {
    /// The canonical settings of `tier`.
    #[must_use]
    pub const fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::High => Self {
                tier,
                bloom: BloomTier { levels: 6 },
                blur: BlurTier { kernel_taps: 13 },
                god_rays: GodRaysTier {
                    resolution_divisor: 2,
                    steps: 24,
                    scattering_scale: 1.0,
                },
                glare: GlareTier {
                    streak_samples: 16,
                    starburst: true,
                },
                grain: GrainTier {
                    chroma_noise: true,
                    dust_scale: 1.0,
                },
                particles: ParticleTier {
                    star_count_scale: 1.0,
                },
            },
            QualityTier::Medium => Self {
                tier,
                bloom: BloomTier { levels: 6 },
                blur: BlurTier { kernel_taps: 9 },
                god_rays: GodRaysTier {
                    resolution_divisor: 2,
                    steps: 18,
                    scattering_scale: 0.85,
                },
                glare: GlareTier {
                    streak_samples: 12,
                    starburst: true,
                },
                grain: GrainTier {
                    chroma_noise: true,
                    dust_scale: 0.75,
                },
                particles: ParticleTier {
                    star_count_scale: 0.75,
                },
            },
            QualityTier::Low => Self {
                tier,
                bloom: BloomTier { levels: 6 },
                blur: BlurTier { kernel_taps: 5 },
                god_rays: GodRaysTier {
                    resolution_divisor: 4,
                    steps: 12,
                    scattering_scale: 0.7,
                },
                glare: GlareTier {
                    streak_samples: 8,
                    starburst: false,
                },
                grain: GrainTier {
                    chroma_noise: false,
                    dust_scale: 0.5,
                },
                particles: ParticleTier {
                    star_count_scale: 0.5,
                },
            },
        }
    }
}

impl Default for TierParams {
    fn default() -> Self {
        Self::for_tier(QualityTier::High)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Selects the tier for a viewport width using the default thresholds.
#[must_use]
pub fn select_tier(viewport_width: u32) -> TierParams {
    select_tier_with(viewport_width, &TierThresholds::default())
}

/// Selects the tier for a viewport width using custom thresholds.
#[must_use]
pub fn select_tier_with(viewport_width: u32, thresholds: &TierThresholds) -> TierParams {
    let tier = if viewport_width < thresholds.low_max_width {
        QualityTier::Low
    } else if viewport_width < thresholds.medium_max_width {
        QualityTier::Medium
    } else {
        QualityTier::High
    };
    TierParams::for_tier(tier)
}

/// Selects the tier from an explicit device class.
#[must_use]
pub fn select_tier_for_device(device: DeviceClass) -> TierParams {
    TierParams::for_tier(match device {
        DeviceClass::Mobile => QualityTier::Low,
        DeviceClass::Tablet => QualityTier::Medium,
        DeviceClass::Desktop => QualityTier::High,
    })
}
