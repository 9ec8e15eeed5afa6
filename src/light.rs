//! Light sources, their uniform data and the shader code lighting surfaces
//! with them.

mod block;
mod generator;
mod storage;

pub use block::{
    DirectionalLightUniform, PointLightUniform, ShadowableDirectionalLightUniform,
    ShadowableSpotLightUniform, SpotLightUniform, light_uniform_block, shadow_map_sampler,
};
pub use generator::LightGenerator;
pub use storage::{DirectionalLight, Light, LightId, LightStorage, PointLight, SpotLight};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Set holding the resources of the light a pass is lit by.
pub const LIGHT_SET: u32 = 1;
/// Binding of the light uniform block within [`LIGHT_SET`].
pub const LIGHT_BINDING: u32 = 0;
/// Binding of the shadow map within [`LIGHT_SET`].
pub const SHADOW_MAP_BINDING: u32 = 1;

/// A type of light source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// A type of light source together with whether its shadows are rendered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LightVariant {
    pub kind: LightKind,
    pub shadowed: bool,
}

/// Where the lighting equation is evaluated.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LightingModel {
    #[default]
    PerFragment,
    /// Light terms are computed for each vertex and interpolated.
    PerVertex,
}

/// The configuration of the lights in a scene that affects generated
/// programs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LightSetShape {
    pub enabled: bool,
    pub model: LightingModel,
    pub shadow_mapping: bool,
}

impl LightKind {
    pub const ALL: [Self; 3] = [Self::Directional, Self::Point, Self::Spot];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Directional => "DirectionalLight",
            Self::Point => "PointLight",
            Self::Spot => "SpotLight",
        }
    }
}

impl fmt::Display for LightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl LightVariant {
    pub const fn new(kind: LightKind, shadowed: bool) -> Self {
        Self { kind, shadowed }
    }

    /// Whether lighting with this variant samples a shadow map when shadow
    /// mapping is enabled as given.
    pub const fn samples_shadow_map(&self, shadow_mapping: bool) -> bool {
        self.shadowed && shadow_mapping
    }

    /// Whether the uniform data of the light includes the transform into
    /// the space of its shadow map. Point lights are sampled by direction
    /// and need none.
    pub const fn has_light_matrix(&self, shadow_mapping: bool) -> bool {
        self.samples_shadow_map(shadow_mapping) && !matches!(self.kind, LightKind::Point)
    }

    /// Returns the identifier of the buffer holding the uniform data of all
    /// lights of this variant.
    pub fn buffer_identifier(&self) -> String {
        if self.shadowed {
            format!("Shadowed{}", self.kind)
        } else {
            self.kind.to_string()
        }
    }

    /// Returns the structural identifier of the light set layout.
    pub fn set_identifier(&self, shadow_mapping: bool) -> String {
        if self.samples_shadow_map(shadow_mapping) {
            format!("{}+ShadowMap", self.kind)
        } else {
            self.kind.to_string()
        }
    }
}

impl fmt::Display for LightVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.buffer_identifier())
    }
}

impl LightSetShape {
    /// A light set without lights.
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            model: LightingModel::PerFragment,
            shadow_mapping: false,
        }
    }

    pub const fn new(model: LightingModel, shadow_mapping: bool) -> Self {
        Self {
            enabled: true,
            model,
            shadow_mapping,
        }
    }
}

impl Default for LightSetShape {
    fn default() -> Self {
        Self::new(LightingModel::default(), false)
    }
}

impl fmt::Display for LightSetShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            return f.write_str("Unlit");
        }
        write!(f, "{:?}", self.model)?;
        if self.shadow_mapping {
            f.write_str("+ShadowMapping")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_identifier_includes_shadow_map_only_when_sampled() {
        let variant = LightVariant::new(LightKind::Spot, true);
        assert_eq!(variant.set_identifier(true), "SpotLight+ShadowMap");
        assert_eq!(variant.set_identifier(false), "SpotLight");
        assert_eq!(
            LightVariant::new(LightKind::Spot, false).set_identifier(true),
            "SpotLight"
        );
    }

    #[test]
    fn point_lights_have_no_light_matrix() {
        assert!(!LightVariant::new(LightKind::Point, true).has_light_matrix(true));
        assert!(LightVariant::new(LightKind::Directional, true).has_light_matrix(true));
        assert!(!LightVariant::new(LightKind::Directional, true).has_light_matrix(false));
    }
}
