//! Kinds of render passes a program can be generated for.

use crate::light::{LightKind, LightVariant};
use serde::Serialize;
use std::fmt;

/// The lighting pass a draw belongs to.
///
/// Ambient and simple passes do not light surfaces. Every light pass lights
/// with one light of its kind, either sampling the light's shadow map or
/// not.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RenderPassKind {
    AmbientPass,
    SimplePass,
    DirectionalLightPass,
    DirectionalLightPassNoShadow,
    PointLightPass,
    PointLightPassNoShadow,
    SpotLightPass,
    SpotLightPassNoShadow,
}

/// How fragments are combined with what is already in the render target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Blending {
    None,
    Alpha,
    Additive,
}

/// Fixed-function pipeline state appropriate for a render pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PipelineStateHints {
    pub depth_test: bool,
    pub depth_write: bool,
    pub blending: Blending,
}

impl RenderPassKind {
    pub const ALL: [Self; 8] = [
        Self::AmbientPass,
        Self::SimplePass,
        Self::DirectionalLightPass,
        Self::DirectionalLightPassNoShadow,
        Self::PointLightPass,
        Self::PointLightPassNoShadow,
        Self::SpotLightPass,
        Self::SpotLightPassNoShadow,
    ];

    /// Whether the pass renders without per-fragment lighting.
    pub const fn is_ambient_only(&self) -> bool {
        matches!(self, Self::AmbientPass | Self::SimplePass)
    }

    /// Returns the light variant the pass lights with, or [`None`] for
    /// ambient-only passes.
    pub const fn light_variant(&self) -> Option<LightVariant> {
        let (kind, shadowed) = match self {
            Self::AmbientPass | Self::SimplePass => return None,
            Self::DirectionalLightPass => (LightKind::Directional, true),
            Self::DirectionalLightPassNoShadow => (LightKind::Directional, false),
            Self::PointLightPass => (LightKind::Point, true),
            Self::PointLightPassNoShadow => (LightKind::Point, false),
            Self::SpotLightPass => (LightKind::Spot, true),
            Self::SpotLightPassNoShadow => (LightKind::Spot, false),
        };
        Some(LightVariant { kind, shadowed })
    }

    pub const fn is_shadowed(&self) -> bool {
        matches!(
            self,
            Self::DirectionalLightPass | Self::PointLightPass | Self::SpotLightPass
        )
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::AmbientPass => "AmbientPass",
            Self::SimplePass => "SimplePass",
            Self::DirectionalLightPass => "DirectionalLightPass",
            Self::DirectionalLightPassNoShadow => "DirectionalLightPassNoShadow",
            Self::PointLightPass => "PointLightPass",
            Self::PointLightPassNoShadow => "PointLightPassNoShadow",
            Self::SpotLightPass => "SpotLightPass",
            Self::SpotLightPassNoShadow => "SpotLightPassNoShadow",
        }
    }

    /// Returns the pipeline state for drawing in the pass. Light passes add
    /// their contribution on top of the ambient pass, whose depth they test
    /// against without writing.
    pub const fn pipeline_state(&self, material_blending: bool) -> PipelineStateHints {
        if self.is_ambient_only() {
            PipelineStateHints {
                depth_test: true,
                depth_write: !material_blending,
                blending: if material_blending {
                    Blending::Alpha
                } else {
                    Blending::None
                },
            }
        } else {
            PipelineStateHints {
                depth_test: true,
                depth_write: false,
                blending: Blending::Additive,
            }
        }
    }
}

impl fmt::Display for RenderPassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
