//! What contributors know about the program being generated.

use crate::{
    geometry::GeometryDescription,
    light::{LightGenerator, LightSetShape},
    material::Material,
    render_pass::RenderPassKind,
    synthesis::MatrixMode,
};
use serde::Serialize;

/// Which surface normals the vertex stage passes on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NormalMode {
    None,
    /// The world space normal, `svNormalWorldSpace`.
    Normal,
    /// The world space tangent frame, `svWorldTBNMatrix`, for normal
    /// mapping.
    TangentSpace,
}

/// The state shared by the contributors to one program.
#[derive(Copy, Clone, Debug)]
pub struct GenerationContext<'a> {
    pub pass: RenderPassKind,
    pub geometry: &'a GeometryDescription,
    /// Generator for the light of the pass, for light passes with lighting
    /// enabled.
    pub light: Option<LightGenerator>,
    pub normal_mode: NormalMode,
}

/// Whether surface normals are synthesized for a material in a pass.
/// Ambient-only passes skip them unless the material reflects its
/// environment.
pub fn normal_synthesis_enabled(has_reflection: bool, pass: RenderPassKind) -> bool {
    has_reflection || !pass.is_ambient_only()
}

impl<'a> GenerationContext<'a> {
    pub fn new(
        pass: RenderPassKind,
        geometry: &'a GeometryDescription,
        material: Option<&Material>,
        light_shape: LightSetShape,
    ) -> Self {
        let light = pass
            .light_variant()
            .filter(|_| light_shape.enabled)
            .map(|variant| LightGenerator::new(variant, light_shape));

        let has_reflection = material.is_some_and(Material::has_reflection);
        let normal_mode = if !normal_synthesis_enabled(has_reflection, pass) {
            NormalMode::None
        } else if material.is_some_and(Material::has_normal_map) {
            NormalMode::TangentSpace
        } else {
            NormalMode::Normal
        };

        Self {
            pass,
            geometry,
            light,
            normal_mode,
        }
    }

    /// Returns how the vertex stage obtains its matrices. World space
    /// quantities are only made available when something needs them.
    pub fn matrix_mode(&self) -> MatrixMode {
        if self.normal_mode != NormalMode::None || self.light.is_some() {
            MatrixMode::Advanced
        } else {
            MatrixMode::ModelViewProjection
        }
    }
}
