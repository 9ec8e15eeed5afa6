//! Standard rules for the fragment stage.

use crate::{
    glsl::{GlslType, variable},
    synthesis::{SynthesisGraph, SynthesisRule},
    view,
};
use anyhow::Result;

/// Variables a fragment stage can only obtain from the vertex stage.
const INTERSTAGE_VARIABLES: [(&str, GlslType); 12] = [
    (variable::POSITION_WORLD_SPACE, GlslType::Vec4),
    (variable::POSITION_VIEW_SPACE, GlslType::Vec4),
    (variable::POSITION_LIGHT_SPACE, GlslType::Vec4),
    (variable::NORMAL_WORLD_SPACE, GlslType::Vec3),
    (variable::TANGENT_WORLD_SPACE, GlslType::Vec3),
    (variable::BINORMAL_WORLD_SPACE, GlslType::Vec3),
    (variable::WORLD_TBN_MATRIX, GlslType::Mat3),
    (variable::COLOR, GlslType::Vec4),
    (variable::PRIMARY_2D_TEXTURE_COORDINATES, GlslType::Vec2),
    (variable::PRIMARY_3D_TEXTURE_COORDINATES, GlslType::Vec3),
    (variable::SECONDARY_2D_TEXTURE_COORDINATES, GlslType::Vec2),
    (variable::SECONDARY_3D_TEXTURE_COORDINATES, GlslType::Vec3),
];

/// Registers rules receiving the interstage variables from the vertex stage
/// and the rule computing the view direction in the given fragment stage
/// graph.
///
/// # Errors
/// Returns an error if a rule conflicts with one already registered.
pub fn register_fragment_rules(graph: &mut SynthesisGraph) -> Result<()> {
    for (name, glsl_type) in INTERSTAGE_VARIABLES {
        graph.register(SynthesisRule::from_previous_stage(name, glsl_type))?;
    }
    graph.register(
        SynthesisRule::computed(
            variable::VIEW_DIRECTION_WORLD_SPACE,
            GlslType::Vec3,
            "normalize(ubView.positionWorldSpace.xyz - svPositionWorldSpace.xyz)",
        )
        .with_prerequisites(&[variable::POSITION_WORLD_SPACE])
        .with_declaration(view::view_uniform_block()?),
    )
}

/// Returns the rule for the shading normal of a surface without a normal
/// map, which is the interpolated world space normal.
pub fn surface_normal_rule() -> SynthesisRule {
    SynthesisRule::computed(
        variable::SURFACE_NORMAL,
        GlslType::Vec3,
        "normalize(svNormalWorldSpace)",
    )
    .with_prerequisites(&[variable::NORMAL_WORLD_SPACE])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        declaration::StageInput,
        geometry::{GeometryDescription, GeometryFlags},
        glsl::Interpolation,
        stage::{GlslHeader, ShaderStage, ShaderStageKind},
        synthesis::Scope,
    };

    fn graph() -> SynthesisGraph {
        let mut graph = SynthesisGraph::new(
            ShaderStageKind::Fragment,
            &GeometryDescription::new("mesh", GeometryFlags::NORMALS),
        );
        register_fragment_rules(&mut graph).unwrap();
        graph.register(surface_normal_rule()).unwrap();
        graph
    }

    fn stage_with_inputs(inputs: &[(&str, GlslType)]) -> ShaderStage {
        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        for (location, &(name, glsl_type)) in inputs.iter().enumerate() {
            stage
                .declare(StageInput::new(
                    location as u32,
                    glsl_type,
                    name,
                    Interpolation::Smooth,
                ))
                .unwrap();
        }
        stage.declare_default_output_fragment().unwrap();
        stage
    }

    #[test]
    fn surface_normal_is_normalized_interpolated_normal() {
        let graph = graph();
        let mut stage = stage_with_inputs(&[(variable::NORMAL_WORLD_SPACE, GlslType::Vec3)]);
        graph
            .synthesize(&mut stage, variable::SURFACE_NORMAL, Scope::Local)
            .unwrap();
        let source = stage.finish().unwrap().source().to_string();
        assert!(source.contains("\tconst vec3 svSurfaceNormal = normalize(svNormalWorldSpace);\n"));
    }

    #[test]
    fn view_direction_declares_view_block() {
        let graph = graph();
        let mut stage = stage_with_inputs(&[(variable::POSITION_WORLD_SPACE, GlslType::Vec4)]);
        graph
            .synthesize(&mut stage, variable::VIEW_DIRECTION_WORLD_SPACE, Scope::Local)
            .unwrap();
        assert!(stage.uniform_block(0, 0).is_some());
    }

    #[test]
    fn interstage_variable_missing_from_vertex_stage_fails() {
        let graph = graph();
        let mut stage = stage_with_inputs(&[]);
        assert!(
            graph
                .synthesize(&mut stage, variable::SURFACE_NORMAL, Scope::Local)
                .is_err()
        );
    }
}
