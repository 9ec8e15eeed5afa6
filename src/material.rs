//! Materials, their uniform data and the shader code shading surfaces with
//! them.

mod basic;
mod standard;
mod storage;

pub use basic::{BasicMaterial, BasicMaterialUniform, basic_material_block};
pub use standard::{StandardMaterial, StandardMaterialUniform, standard_material_block};
pub use storage::{MaterialHandle, MaterialStorage};

use crate::{
    declaration::{Declaration, Sampler, UniformBlock},
    glsl::{sampler, variable},
    program::GenerationContext,
    resource::{TextureHandle, TextureKind},
    stage::ShaderStage,
    synthesis::{self, SynthesisGraph, SynthesisRule},
};
use anyhow::{Context, Result};
use nalgebra::Vector4;
use saphir_utils::stringhash_newtype;
use serde::Serialize;
use std::fmt;

/// Set holding the resources of the material of the model being drawn.
pub const MATERIAL_SET: u32 = 2;
/// Binding of the material uniform block within [`MATERIAL_SET`]. Samplers
/// follow at the next bindings.
pub const MATERIAL_BINDING: u32 = 0;

stringhash_newtype!(
    /// Identifier for the structure of a material, shared by all materials
    /// with the same kinds of components. Wraps a
    /// [`StringHash`](saphir_utils::StringHash).
    [pub] MaterialId
);

/// A surface property of a [`StandardMaterial`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MaterialSlot {
    Ambient,
    Diffuse,
    Specular,
    Opacity,
    AutoIllumination,
    Normal,
    Reflection,
}

/// The value filling a [`MaterialSlot`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Component {
    Value(f32),
    Color(Vector4<f32>),
    Texture {
        handle: TextureHandle,
        kind: TextureKind,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    Standard(StandardMaterial),
    Basic(BasicMaterial),
}

impl MaterialSlot {
    /// All slots in the order their components are iterated.
    pub const ALL: [Self; 7] = [
        Self::Ambient,
        Self::Diffuse,
        Self::Specular,
        Self::Opacity,
        Self::AutoIllumination,
        Self::Normal,
        Self::Reflection,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ambient => "Ambient",
            Self::Diffuse => "Diffuse",
            Self::Specular => "Specular",
            Self::Opacity => "Opacity",
            Self::AutoIllumination => "AutoIllumination",
            Self::Normal => "Normal",
            Self::Reflection => "Reflection",
        }
    }

    /// Returns the name of the sampler for a texture in this slot.
    pub const fn sampler_name(&self) -> &'static str {
        match self {
            Self::Ambient => sampler::AMBIENT,
            Self::Diffuse => sampler::DIFFUSE,
            Self::Specular => sampler::SPECULAR,
            Self::Opacity => sampler::OPACITY,
            Self::AutoIllumination => sampler::AUTO_ILLUMINATION,
            Self::Normal => sampler::NORMAL,
            Self::Reflection => sampler::REFLECTION,
        }
    }

    /// Returns the name of the color member of the material block for
    /// slots holding a color.
    pub const fn color_member(&self) -> Option<&'static str> {
        match self {
            Self::Ambient => Some("ambientColor"),
            Self::Diffuse => Some("diffuseColor"),
            Self::Specular => Some("specularColor"),
            Self::AutoIllumination => Some("autoIlluminationColor"),
            Self::Opacity | Self::Normal | Self::Reflection => None,
        }
    }

    /// Whether the slot can hold the given component.
    pub fn accepts(&self, component: &Component) -> bool {
        match (self, component) {
            (Self::Ambient | Self::Diffuse | Self::Specular | Self::AutoIllumination, _) => true,
            (Self::Opacity, Component::Value(_) | Component::Texture { .. }) => true,
            (
                Self::Normal,
                Component::Texture {
                    kind: TextureKind::Texture2D,
                    ..
                },
            ) => true,
            (
                Self::Reflection,
                Component::Texture {
                    kind: TextureKind::Cube,
                    ..
                },
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MaterialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Component {
    /// Returns the name of the kind of component, as used in structural
    /// identifiers.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "Value",
            Self::Color(_) => "Color",
            Self::Texture { kind, .. } => kind.name(),
        }
    }

    pub fn texture(&self) -> Option<(TextureHandle, TextureKind)> {
        match *self {
            Self::Texture { handle, kind } => Some((handle, kind)),
            _ => None,
        }
    }

    /// Returns the color written to the uniform block for the component.
    /// Textures are looked up in the shader and get white.
    pub fn uniform_color(&self) -> Vector4<f32> {
        match *self {
            Self::Value(value) => Vector4::new(value, value, value, 1.0),
            Self::Color(color) => color,
            Self::Texture { .. } => Vector4::new(1.0, 1.0, 1.0, 1.0),
        }
    }
}

impl Material {
    /// Returns the identifier for the structure of the material, which
    /// decides its uniform block, sampler bindings and generated code.
    pub fn structural_identifier(&self) -> String {
        match self {
            Self::Standard(material) => material.structural_identifier(),
            Self::Basic(material) => material.structural_identifier(),
        }
    }

    /// Whether the material has no components. A basic material always has
    /// its color.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Standard(material) => material.is_empty(),
            Self::Basic(_) => false,
        }
    }

    pub fn id(&self) -> MaterialId {
        MaterialId(saphir_utils::StringHash::of_owned(
            self.structural_identifier(),
        ))
    }

    /// Returns the declaration of the `ubMaterial` block.
    ///
    /// # Errors
    /// Returns an error if the block can not be built.
    pub fn uniform_block(&self) -> Result<UniformBlock> {
        match self {
            Self::Standard(_) => standard_material_block(),
            Self::Basic(_) => basic_material_block(),
        }
    }

    /// Returns the samplers of the material's textures, at consecutive
    /// bindings after the uniform block.
    pub fn samplers(&self) -> Vec<Sampler> {
        match self {
            Self::Standard(material) => material.samplers(),
            Self::Basic(material) => material.samplers(),
        }
    }

    /// Returns the handles of all textures the material reads.
    pub fn textures(&self) -> Vec<TextureHandle> {
        match self {
            Self::Standard(material) => material
                .components()
                .filter_map(|(_, component)| component.texture())
                .map(|(handle, _)| handle)
                .collect(),
            Self::Basic(material) => material
                .texture()
                .map(|(handle, _)| handle)
                .into_iter()
                .collect(),
        }
    }

    /// Returns the bytes of the uniform data of the material.
    pub fn uniform_bytes(&self) -> Vec<u8> {
        match self {
            Self::Standard(material) => bytemuck::bytes_of(&material.uniform()).to_vec(),
            Self::Basic(material) => bytemuck::bytes_of(&material.uniform()).to_vec(),
        }
    }

    /// Whether the material reflects its environment, which needs surface
    /// normals in every pass.
    pub fn has_reflection(&self) -> bool {
        match self {
            Self::Standard(material) => material.component(MaterialSlot::Reflection).is_some(),
            Self::Basic(_) => false,
        }
    }

    pub fn has_normal_map(&self) -> bool {
        match self {
            Self::Standard(material) => material.component(MaterialSlot::Normal).is_some(),
            Self::Basic(_) => false,
        }
    }

    /// Whether lit surfaces get specular highlights.
    pub fn has_specular(&self) -> bool {
        match self {
            Self::Standard(material) => material.component(MaterialSlot::Specular).is_some(),
            Self::Basic(material) => material.shininess() > 0.0,
        }
    }

    /// Whether the material is drawn blended with what is behind it.
    pub fn blending(&self) -> bool {
        match self {
            Self::Standard(material) => material.blending(),
            Self::Basic(material) => material.blending(),
        }
    }

    /// Returns the rule for the shading normal of the surface in the
    /// fragment stage.
    pub fn surface_normal_rule(&self) -> Result<SynthesisRule> {
        match self {
            Self::Standard(material) if self.has_normal_map() => material.normal_map_rule(),
            _ => Ok(synthesis::surface_normal_rule()),
        }
    }

    /// Exports what the fragment stage needs from the vertex stage to shade
    /// with the material.
    ///
    /// # Errors
    /// Returns an error naming the material if the geometry can not provide
    /// what the material needs.
    pub fn generate_vertex_code(
        &self,
        context: &GenerationContext<'_>,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        match self {
            Self::Standard(material) => material.generate_vertex_code(graph, stage),
            Self::Basic(material) => material.generate_vertex_code(graph, stage),
        }
        .with_context(|| {
            format!(
                "Material `{}` can not be applied to geometry `{}`",
                self.structural_identifier(),
                context.geometry.name()
            )
        })
    }

    /// Declares the uniform block and samplers of the material in the given
    /// stage. Declarations already made are skipped.
    ///
    /// # Errors
    /// Returns an error if a declaration conflicts with an existing one.
    pub fn declare_resources(&self, stage: &mut ShaderStage) -> Result<()> {
        declare_once(stage, self.uniform_block()?)?;
        for sampler in self.samplers() {
            declare_once(stage, sampler)?;
        }
        Ok(())
    }

    /// Declares the resources of the material and emits the computation of
    /// `svOutputFragment`. In light passes the light terms must already
    /// be available.
    ///
    /// # Errors
    /// Returns an error naming the material if a needed variable can not be
    /// synthesized or a declaration conflicts with an existing one.
    pub fn generate_fragment_code(
        &self,
        context: &GenerationContext<'_>,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        self.declare_resources(stage)
            .and_then(|()| match self {
                Self::Standard(material) => material.generate_fragment_code(context, graph, stage),
                Self::Basic(material) => material.generate_fragment_code(context, graph, stage),
            })
            .with_context(|| {
                format!(
                    "Failed to shade with material `{}` on geometry `{}`",
                    self.structural_identifier(),
                    context.geometry.name()
                )
            })
    }
}

impl From<StandardMaterial> for Material {
    fn from(material: StandardMaterial) -> Self {
        Self::Standard(material)
    }
}

impl From<BasicMaterial> for Material {
    fn from(material: BasicMaterial) -> Self {
        Self::Basic(material)
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.structural_identifier())
    }
}

/// Returns the variable holding the coordinates a texture of the given kind
/// is looked up with.
fn texture_coordinates(kind: TextureKind) -> &'static str {
    match kind {
        TextureKind::Texture2D => variable::PRIMARY_2D_TEXTURE_COORDINATES,
        TextureKind::Texture3D | TextureKind::Cube => variable::PRIMARY_3D_TEXTURE_COORDINATES,
    }
}

fn declare_once(stage: &mut ShaderStage, declaration: impl Into<Declaration>) -> Result<()> {
    let declaration = declaration.into();
    if stage.contains_declaration(&declaration) {
        Ok(())
    } else {
        stage.declare(declaration)
    }
}

/// Emits `svOutputFragment = <color>;`, followed by a discard of fully
/// transparent fragments for blended materials.
fn emit_output(stage: &mut ShaderStage, color: &str, blending: bool) {
    let mut code = stage.code(crate::code::CodeZone::Output);
    code.line(format!("{} = {};", variable::OUTPUT_FRAGMENT, color));
    if blending {
        code.line(format!(
            "if ({}.a <= 0.0) {{ discard; }}",
            variable::OUTPUT_FRAGMENT
        ));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::{TextureRegistry, TextureResource};

    fn texture(kind: TextureKind) -> Component {
        let mut textures = TextureRegistry::new();
        Component::Texture {
            handle: textures.insert(TextureResource::new("texture", kind)),
            kind,
        }
    }

    #[test]
    fn color_slots_accept_every_component() {
        for slot in [
            MaterialSlot::Ambient,
            MaterialSlot::Diffuse,
            MaterialSlot::Specular,
            MaterialSlot::AutoIllumination,
        ] {
            assert!(slot.accepts(&Component::Value(0.5)));
            assert!(slot.accepts(&Component::Color(Vector4::zeros())));
            assert!(slot.accepts(&texture(TextureKind::Texture3D)));
        }
    }

    #[test]
    fn special_slots_only_accept_their_components() {
        assert!(MaterialSlot::Opacity.accepts(&Component::Value(0.5)));
        assert!(!MaterialSlot::Opacity.accepts(&Component::Color(Vector4::zeros())));
        assert!(MaterialSlot::Normal.accepts(&texture(TextureKind::Texture2D)));
        assert!(!MaterialSlot::Normal.accepts(&texture(TextureKind::Cube)));
        assert!(!MaterialSlot::Normal.accepts(&Component::Value(1.0)));
        assert!(MaterialSlot::Reflection.accepts(&texture(TextureKind::Cube)));
        assert!(!MaterialSlot::Reflection.accepts(&texture(TextureKind::Texture2D)));
    }

    #[test]
    fn value_component_gives_gray_uniform_color() {
        assert_eq!(
            Component::Value(0.25).uniform_color(),
            Vector4::new(0.25, 0.25, 0.25, 1.0)
        );
    }
}
