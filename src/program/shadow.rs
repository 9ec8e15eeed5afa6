//! Depth-only program rendering shadow casters into a shadow map.

use crate::{
    binding::{SetAssignment, SetKind},
    code::CodeZone,
    geometry::{GeometryDescription, GeometryFlags},
    glsl::builtin,
    light::LightSetShape,
    program::ProgramCacheKey,
    render_pass::{Blending, PipelineStateHints, RenderPassKind},
    stage::{GeneratedShader, GlslHeader, ShaderStage, ShaderStageKind},
    synthesis::{self, MatrixMode, Scope, SynthesisGraph},
    view,
};
use anyhow::Result;

pub(super) const SHADOW_CASTING_NAME: &str = "ShadowCasting";

pub(super) const SHADOW_CASTING_PIPELINE_STATE: PipelineStateHints = PipelineStateHints {
    depth_test: true,
    depth_write: true,
    blending: Blending::None,
};

pub(super) fn shadow_casting_cache_key(instanced: bool) -> ProgramCacheKey {
    ProgramCacheKey {
        name: SHADOW_CASTING_NAME.to_string(),
        pass: RenderPassKind::SimplePass,
        material: Some("DepthOnly".to_string()),
        light_shape: LightSetShape::disabled(),
        geometry: GeometryFlags::empty(),
        instanced,
    }
}

/// Returns the sets of the shadow casting program. Only instanced casters
/// read the projection from the view block.
pub(super) fn shadow_casting_sets(instanced: bool) -> Vec<SetAssignment> {
    if instanced {
        vec![SetAssignment::new(SetKind::PerView, view::VIEW_SET_IDENTIFIER)]
    } else {
        Vec::new()
    }
}

/// Generates the stages of the shadow casting program. The vertex stage
/// only computes the clip-space position and the fragment stage writes the
/// depth of the fragment.
pub(super) fn generate_shadow_casting_shaders(
    header: GlslHeader,
    instanced: bool,
) -> Result<(GeneratedShader, GeneratedShader)> {
    let geometry = GeometryDescription::new("ShadowCaster", GeometryFlags::empty());
    let mode = if instanced {
        MatrixMode::Advanced
    } else {
        MatrixMode::ModelViewProjection
    };

    let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry);
    synthesis::register_vertex_rules(&mut graph, mode, instanced)?;

    let mut vertex = ShaderStage::new(ShaderStageKind::Vertex, SHADOW_CASTING_NAME, header.clone());
    graph.synthesize(&mut vertex, builtin::POSITION, Scope::Local)?;
    let vertex = vertex.finish()?;

    let mut fragment = ShaderStage::new(ShaderStageKind::Fragment, SHADOW_CASTING_NAME, header);
    fragment.connect_from_previous_stage(&vertex)?;
    fragment
        .code(CodeZone::Output)
        .line(format!("{} = gl_FragCoord.z;", builtin::FRAGMENT_DEPTH));
    let fragment = fragment.finish()?;

    vertex.check_interface_with(&fragment)?;
    Ok((vertex, fragment))
}
