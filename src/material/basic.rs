//! Single-colored materials, optionally textured and modulated by vertex
//! colors.

use crate::{
    declaration::{Sampler, UniformBlock},
    glsl::{GlslType, block, sampler, variable},
    material::{MATERIAL_BINDING, MATERIAL_SET, emit_output, texture_coordinates},
    program::GenerationContext,
    resource::{TextureHandle, TextureKind},
    stage::ShaderStage,
    synthesis::{Scope, SynthesisGraph},
    uniform::UniformMirror,
};
use anyhow::{Result, bail};
use bytemuck::{Pod, Zeroable};
use nalgebra::Vector4;
use std::mem;

#[derive(Clone, Debug, PartialEq)]
pub struct BasicMaterial {
    color: Vector4<f32>,
    texture: Option<(TextureHandle, TextureKind)>,
    vertex_color: bool,
    shininess: f32,
    opacity: f32,
    auto_illumination: f32,
    blending: bool,
}

/// Uniform data of a [`BasicMaterial`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct BasicMaterialUniform {
    pub color: Vector4<f32>,
    pub shininess: f32,
    pub opacity: f32,
    pub auto_illumination: f32,
    // Padding to make size multiple of 16-bytes
    pub _padding: f32,
}

/// Returns the declaration of the `ubMaterial` block of basic materials.
///
/// # Errors
/// Returns an error if the block can not be built.
pub fn basic_material_block() -> Result<UniformBlock> {
    UniformBlock::new(
        MATERIAL_SET,
        MATERIAL_BINDING,
        block::BASIC_MATERIAL_TYPE,
        block::MATERIAL,
    )
    .with_member(GlslType::Vec4, "color")?
    .with_member(GlslType::Float, "shininess")?
    .with_member(GlslType::Float, "opacity")?
    .with_member(GlslType::Float, "autoIllumination")
    .map(UniformBlock::with_dynamic_offset)
}

impl BasicMaterial {
    pub fn new(color: Vector4<f32>) -> Self {
        Self {
            color,
            texture: None,
            vertex_color: false,
            shininess: 0.0,
            opacity: 1.0,
            auto_illumination: 0.0,
            blending: false,
        }
    }

    /// Multiplies the color with the given texture.
    ///
    /// # Errors
    /// Returns an error if the texture is a cube map.
    pub fn with_texture(mut self, handle: TextureHandle, kind: TextureKind) -> Result<Self> {
        if kind == TextureKind::Cube {
            bail!("Basic material can not be textured with a cube map");
        }
        self.texture = Some((handle, kind));
        Ok(self)
    }

    /// Multiplies the color with the color of each vertex.
    pub fn with_vertex_color(mut self) -> Self {
        self.vertex_color = true;
        self
    }

    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.shininess = shininess;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_auto_illumination(mut self, amount: f32) -> Self {
        self.auto_illumination = amount;
        self
    }

    pub fn with_blending(mut self, blending: bool) -> Self {
        self.blending = blending;
        self
    }

    pub fn color(&self) -> &Vector4<f32> {
        &self.color
    }

    pub fn texture(&self) -> Option<(TextureHandle, TextureKind)> {
        self.texture
    }

    pub fn uses_vertex_color(&self) -> bool {
        self.vertex_color
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }

    pub fn blending(&self) -> bool {
        self.blending
    }

    /// Returns e.g. `BasicMaterial[Color+Texture2D+VertexColor]`.
    pub fn structural_identifier(&self) -> String {
        let mut parts = vec!["Color"];
        if let Some((_, kind)) = self.texture {
            parts.push(kind.name());
        }
        if self.vertex_color {
            parts.push("VertexColor");
        }
        let mut identifier = format!("BasicMaterial[{}]", parts.join("+"));
        if self.blending {
            identifier.push_str("+Blending");
        }
        identifier
    }

    pub fn uniform(&self) -> BasicMaterialUniform {
        BasicMaterialUniform {
            color: self.color,
            shininess: self.shininess,
            opacity: self.opacity,
            auto_illumination: self.auto_illumination,
            _padding: 0.0,
        }
    }

    pub fn samplers(&self) -> Vec<Sampler> {
        self.texture
            .map(|(_, kind)| {
                Sampler::new(
                    MATERIAL_SET,
                    MATERIAL_BINDING + 1,
                    kind.sampler_type(),
                    sampler::PRIMARY,
                )
            })
            .into_iter()
            .collect()
    }

    pub(super) fn generate_vertex_code(
        &self,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        if let Some((_, kind)) = self.texture {
            graph.synthesize(stage, texture_coordinates(kind), Scope::Exported)?;
        }
        if self.vertex_color {
            graph.synthesize(stage, variable::COLOR, Scope::Exported)?;
        }
        Ok(())
    }

    pub(super) fn generate_fragment_code(
        &self,
        context: &GenerationContext<'_>,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        let mut factors = Vec::with_capacity(3);
        if let Some((_, kind)) = self.texture {
            let coordinates = texture_coordinates(kind);
            graph.synthesize(stage, coordinates, Scope::Local)?;
            factors.push(format!("texture({}, {})", sampler::PRIMARY, coordinates));
        }
        factors.push(format!("{}.color", block::MATERIAL));
        if self.vertex_color {
            graph.synthesize(stage, variable::COLOR, Scope::Local)?;
            factors.push(variable::COLOR.to_string());
        }
        let surface_color = factors.join(" * ");

        if context.pass.is_ambient_only() {
            emit_output(stage, &surface_color, self.blending);
        } else {
            stage
                .code(crate::code::CodeZone::Main)
                .line(format!("vec4 surfaceColor = {};", surface_color));
            let specular = if self.shininess > 0.0 {
                format!(
                    " + {0}.rgb * pow({0}.a, ubMaterial.shininess)",
                    variable::LIGHT_SPECULAR
                )
            } else {
                String::new()
            };
            emit_output(
                stage,
                &format!(
                    "vec4({}.rgb * surfaceColor.rgb{}, surfaceColor.a)",
                    variable::LIGHT_DIFFUSE,
                    specular
                ),
                self.blending,
            );
        }
        Ok(())
    }
}

impl UniformMirror for BasicMaterialUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("color", mem::offset_of!(Self, color)),
            ("shininess", mem::offset_of!(Self, shininess)),
            ("opacity", mem::offset_of!(Self, opacity)),
            ("autoIllumination", mem::offset_of!(Self, auto_illumination)),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{GeometryDescription, GeometryFlags},
        material::Material,
        resource::{TextureRegistry, TextureResource},
        stage::ShaderStageKind,
        synthesis::{self, MatrixMode},
    };

    #[test]
    fn basic_material_block_layout_matches_mirror() {
        let layout = basic_material_block().unwrap().layout();
        assert_eq!(layout.offset_of("autoIllumination"), Some(24));
        assert_eq!(layout.size(), 32);
        assert_eq!(mem::size_of::<BasicMaterialUniform>(), 32);
        layout.verify_mirror::<BasicMaterialUniform>().unwrap();
    }

    #[test]
    fn structural_identifier_reflects_options() {
        let mut textures = TextureRegistry::new();
        let handle = textures.insert(TextureResource::new("grass", TextureKind::Texture2D));
        let material = BasicMaterial::new(Vector4::new(0.0, 1.0, 0.0, 1.0))
            .with_texture(handle, TextureKind::Texture2D)
            .unwrap()
            .with_vertex_color();
        assert_eq!(
            material.structural_identifier(),
            "BasicMaterial[Color+Texture2D+VertexColor]"
        );
        assert_eq!(
            BasicMaterial::new(Vector4::zeros()).structural_identifier(),
            "BasicMaterial[Color]"
        );
    }

    #[test]
    fn texturing_with_cube_map_fails() {
        let mut textures = TextureRegistry::new();
        let handle = textures.insert(TextureResource::new("sky", TextureKind::Cube));
        assert!(
            BasicMaterial::new(Vector4::zeros())
                .with_texture(handle, TextureKind::Cube)
                .is_err()
        );
    }

    #[test]
    fn vertex_color_on_geometry_without_colors_fails() {
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let context = GenerationContext {
            pass: crate::render_pass::RenderPassKind::AmbientPass,
            geometry: &geometry,
            light: None,
            normal_mode: crate::program::NormalMode::None,
        };
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, &geometry);
        synthesis::register_vertex_rules(&mut graph, MatrixMode::ModelViewProjection, false)
            .unwrap();
        let mut stage = ShaderStage::new(
            ShaderStageKind::Vertex,
            "test",
            crate::stage::GlslHeader::default(),
        );

        let material = Material::from(BasicMaterial::new(Vector4::zeros()).with_vertex_color());
        let error = material
            .generate_vertex_code(&context, &graph, &mut stage)
            .unwrap_err();
        let message = format!("{:#}", error);
        assert!(message.contains("BasicMaterial[Color+VertexColor]"));
        assert!(message.contains("plain"));
    }

    #[test]
    fn sampler_is_bound_after_block() {
        let mut textures = TextureRegistry::new();
        let handle = textures.insert(TextureResource::new("noise", TextureKind::Texture3D));
        let material = BasicMaterial::new(Vector4::zeros())
            .with_texture(handle, TextureKind::Texture3D)
            .unwrap();
        assert_eq!(
            material.samplers()[0].to_string(),
            "layout(set = 2, binding = 1) uniform sampler3D suPrimary;"
        );
    }
}
