//! Program drawing a textured quad directly in screen space.

use crate::{
    code::CodeZone,
    declaration::{Function, PushConstantBlock, Sampler},
    geometry::{GeometryDescription, GeometryFlags, VertexAttribute},
    glsl::{GlslType, SamplerType, block, builtin, sampler, variable},
    light::LightSetShape,
    program::ProgramCacheKey,
    render_pass::{Blending, PipelineStateHints, RenderPassKind},
    stage::{GeneratedShader, GlslHeader, ShaderStage, ShaderStageKind},
    synthesis::{Scope, SynthesisGraph, SynthesisRule},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub(super) const OVERLAY_NAME: &str = "Overlay";

/// Identifier of the layout of the set holding the overlay texture.
pub(super) const OVERLAY_SET_IDENTIFIER: &str = "OverlayTexture";

pub(super) const OVERLAY_PIPELINE_STATE: PipelineStateHints = PipelineStateHints {
    depth_test: false,
    depth_write: false,
    blending: Blending::Alpha,
};

/// Conversion applied to the sampled overlay color before output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ColorConversion {
    #[default]
    None,
    LinearToSrgb,
    SrgbToLinear,
}

impl ColorConversion {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::LinearToSrgb => "LinearToSRGB",
            Self::SrgbToLinear => "SRGBToLinear",
        }
    }

    /// Returns the function performing the conversion, if any.
    fn function(&self) -> Option<Function> {
        match self {
            Self::None => None,
            Self::LinearToSrgb => Some(Function::new(
                "vec4",
                "toSRGBColor",
                &[("vec4", "color")],
                |code| {
                    code.line("vec3 low = color.rgb * 12.92;")
                        .line("vec3 high = 1.055 * pow(color.rgb, vec3(1.0 / 2.4)) - 0.055;")
                        .line("return vec4(mix(high, low, lessThanEqual(color.rgb, vec3(0.0031308))), color.a);");
                },
            )),
            Self::SrgbToLinear => Some(Function::new(
                "vec4",
                "toLinearColor",
                &[("vec4", "color")],
                |code| {
                    code.line("vec3 low = color.rgb / 12.92;")
                        .line("vec3 high = pow((color.rgb + 0.055) / 1.055, vec3(2.4));")
                        .line("return vec4(mix(high, low, lessThanEqual(color.rgb, vec3(0.04045))), color.a);");
                },
            )),
        }
    }
}

impl fmt::Display for ColorConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(super) fn overlay_cache_key(conversion: ColorConversion) -> ProgramCacheKey {
    ProgramCacheKey {
        name: OVERLAY_NAME.to_string(),
        pass: RenderPassKind::SimplePass,
        material: Some(format!("Overlay[{}]", conversion)),
        light_shape: LightSetShape::disabled(),
        geometry: GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
        instanced: false,
    }
}

fn overlay_block() -> Result<PushConstantBlock> {
    PushConstantBlock::new(block::OVERLAY_TYPE, block::OVERLAY)
        .with_member(GlslType::Mat4, "transformationMatrix")
}

/// Generates the stages of the overlay program. Vertex positions are
/// transformed by the matrix in `pcOverlay` and the texture in set zero is
/// drawn with the given conversion.
pub(super) fn generate_overlay_shaders(
    header: GlslHeader,
    conversion: ColorConversion,
) -> Result<(GeneratedShader, GeneratedShader)> {
    let geometry = GeometryDescription::new(
        "OverlayQuad",
        GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
    );

    let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry);
    graph.register(
        SynthesisRule::builtin(
            builtin::POSITION,
            GlslType::Vec4,
            "pcOverlay.transformationMatrix * vec4(vaVertex, 1.0)",
        )
        .with_declaration(overlay_block()?)
        .with_declaration(VertexAttribute::Position.declaration()),
    )?;
    graph.register(
        SynthesisRule::computed(
            variable::PRIMARY_2D_TEXTURE_COORDINATES,
            GlslType::Vec2,
            VertexAttribute::Primary2DTextureCoordinates.name(),
        )
        .with_declaration(VertexAttribute::Primary2DTextureCoordinates.declaration())
        .requiring(GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES),
    )?;

    let mut vertex = ShaderStage::new(ShaderStageKind::Vertex, OVERLAY_NAME, header.clone());
    graph.synthesize(&mut vertex, builtin::POSITION, Scope::Local)?;
    graph.synthesize(
        &mut vertex,
        variable::PRIMARY_2D_TEXTURE_COORDINATES,
        Scope::Exported,
    )?;
    let vertex = vertex.finish()?;

    let mut fragment = ShaderStage::new(ShaderStageKind::Fragment, OVERLAY_NAME, header);
    fragment.connect_from_previous_stage(&vertex)?;
    fragment.declare_default_output_fragment()?;
    fragment.declare(Sampler::new(0, 0, SamplerType::Sampler2D, sampler::PRIMARY))?;

    let mut color = format!(
        "texture({}, {})",
        sampler::PRIMARY,
        variable::PRIMARY_2D_TEXTURE_COORDINATES
    );
    if let Some(function) = conversion.function() {
        color = format!("{}({})", function.name(), color);
        fragment.declare(function)?;
    }
    fragment
        .code(CodeZone::Output)
        .line(format!("{} = {};", variable::OUTPUT_FRAGMENT, color));
    let fragment = fragment.finish()?;

    vertex.check_interface_with(&fragment)?;
    Ok((vertex, fragment))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        layout_cache::DescriptionOnlyFactory,
        program::{GeneratorConfig, ProgramGenerator},
    };
    use std::sync::Arc;

    fn generator() -> ProgramGenerator {
        ProgramGenerator::new(
            GeneratorConfig::default(),
            Arc::new(DescriptionOnlyFactory::new()),
        )
        .unwrap()
    }

    #[test]
    fn overlay_program_samples_texture_in_set_zero() {
        let program = generator()
            .obtain_overlay_program(ColorConversion::None)
            .unwrap();
        let sampler = program.fragment().samplers().next().unwrap();
        assert_eq!(sampler.name(), "suPrimary");
        assert_eq!(sampler.resource_binding().set, 0);
        assert_eq!(sampler.resource_binding().binding, 0);
        assert!(
            program
                .vertex()
                .source()
                .contains("gl_Position = pcOverlay.transformationMatrix * vec4(vaVertex, 1.0);")
        );
        assert_eq!(program.layout().set_layouts[0].identifier, OVERLAY_SET_IDENTIFIER);
        assert_eq!(program.layout().push_constant_size(), 64);
        assert_eq!(program.pipeline_state(), OVERLAY_PIPELINE_STATE);
    }

    #[test]
    fn srgb_conversion_declares_and_calls_function() {
        let program = generator()
            .obtain_overlay_program(ColorConversion::LinearToSrgb)
            .unwrap();
        let source = program.fragment().source();
        assert!(source.contains("vec4 toSRGBColor(vec4 color)"));
        assert!(source.contains(
            "svOutputFragment = toSRGBColor(texture(suPrimary, svPrimary2DTextureCoordinates));"
        ));
        assert!(!source.contains("toLinearColor"));
    }

    #[test]
    fn conversions_give_separate_cached_programs() {
        let generator = generator();
        let none = generator.obtain_overlay_program(ColorConversion::None).unwrap();
        let linear = generator
            .obtain_overlay_program(ColorConversion::SrgbToLinear)
            .unwrap();
        let none_again = generator.obtain_overlay_program(ColorConversion::None).unwrap();
        assert!(!Arc::ptr_eq(&none, &linear));
        assert!(Arc::ptr_eq(&none, &none_again));
        assert_eq!(generator.program_cache().len(), 2);
        assert!(linear.fragment().source().contains("toLinearColor("));
    }
}
