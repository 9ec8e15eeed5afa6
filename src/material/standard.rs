//! Materials built from per-slot components.

use crate::{
    code::CodeZone,
    declaration::{Sampler, UniformBlock},
    glsl::{GlslType, block, sampler, variable},
    material::{
        Component, MATERIAL_BINDING, MATERIAL_SET, MaterialSlot, emit_output, texture_coordinates,
    },
    program::GenerationContext,
    resource::{TextureHandle, TextureKind},
    stage::ShaderStage,
    synthesis::{Scope, SynthesisGraph, SynthesisRule},
    uniform::UniformMirror,
};
use anyhow::{Result, anyhow, bail};
use bytemuck::{Pod, Zeroable};
use nalgebra::Vector4;
use std::{collections::BTreeMap, mem};

/// A material whose surface properties are each given by a
/// [`Component`] in a [`MaterialSlot`].
///
/// Two materials with components of the same kinds in the same slots have
/// the same structural identifier, uniform block and sampler bindings, and
/// share programs and descriptor set layouts.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardMaterial {
    components: BTreeMap<MaterialSlot, Component>,
    shininess: f32,
    auto_illumination_amount: f32,
    normal_scale: f32,
    reflection_amount: f32,
    blending: bool,
}

/// Uniform data of a [`StandardMaterial`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct StandardMaterialUniform {
    pub ambient_color: Vector4<f32>,
    pub diffuse_color: Vector4<f32>,
    pub specular_color: Vector4<f32>,
    pub auto_illumination_color: Vector4<f32>,
    pub shininess: f32,
    pub opacity: f32,
    pub auto_illumination_amount: f32,
    pub normal_scale: f32,
    pub reflection_amount: f32,
    // Padding to make size multiple of 16-bytes
    pub _padding: [f32; 3],
}

const BLACK: &str = "vec4(0.0, 0.0, 0.0, 1.0)";

/// Returns the declaration of the `ubMaterial` block of standard materials.
///
/// # Errors
/// Returns an error if the block can not be built.
pub fn standard_material_block() -> Result<UniformBlock> {
    UniformBlock::new(
        MATERIAL_SET,
        MATERIAL_BINDING,
        block::STANDARD_MATERIAL_TYPE,
        block::MATERIAL,
    )
    .with_member(GlslType::Vec4, "ambientColor")?
    .with_member(GlslType::Vec4, "diffuseColor")?
    .with_member(GlslType::Vec4, "specularColor")?
    .with_member(GlslType::Vec4, "autoIlluminationColor")?
    .with_member(GlslType::Float, "shininess")?
    .with_member(GlslType::Float, "opacity")?
    .with_member(GlslType::Float, "autoIlluminationAmount")?
    .with_member(GlslType::Float, "normalScale")?
    .with_member(GlslType::Float, "reflectionAmount")
    .map(UniformBlock::with_dynamic_offset)
}

impl StandardMaterial {
    /// Creates a material without components. Components must be added
    /// before the material can be registered.
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
            shininess: 32.0,
            auto_illumination_amount: 1.0,
            normal_scale: 1.0,
            reflection_amount: 0.5,
            blending: false,
        }
    }

    /// Puts the given component in the given slot, replacing any component
    /// already there.
    ///
    /// # Errors
    /// Returns an error if the slot can not hold the component.
    pub fn with_component(mut self, slot: MaterialSlot, component: Component) -> Result<Self> {
        self.set_component(slot, component)?;
        Ok(self)
    }

    /// See [`Self::with_component`].
    ///
    /// # Errors
    /// Returns an error if the slot can not hold the component.
    pub fn set_component(&mut self, slot: MaterialSlot, component: Component) -> Result<()> {
        if !slot.accepts(&component) {
            bail!(
                "{} slot of material can not hold a {} component",
                slot,
                component.kind_name()
            );
        }
        self.components.insert(slot, component);
        Ok(())
    }

    pub fn with_shininess(mut self, shininess: f32) -> Self {
        self.shininess = shininess;
        self
    }

    pub fn with_auto_illumination_amount(mut self, amount: f32) -> Self {
        self.auto_illumination_amount = amount;
        self
    }

    pub fn with_normal_scale(mut self, scale: f32) -> Self {
        self.normal_scale = scale;
        self
    }

    pub fn with_reflection_amount(mut self, amount: f32) -> Self {
        self.reflection_amount = amount;
        self
    }

    pub fn with_blending(mut self, blending: bool) -> Self {
        self.blending = blending;
        self
    }

    pub fn component(&self, slot: MaterialSlot) -> Option<&Component> {
        self.components.get(&slot)
    }

    /// Returns the present components in slot order.
    pub fn components(&self) -> impl Iterator<Item = (MaterialSlot, &Component)> {
        self.components.iter().map(|(&slot, component)| (slot, component))
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }

    pub fn blending(&self) -> bool {
        self.blending
    }

    /// Returns e.g. `StandardMaterial[DiffuseTexture2D+SpecularColor]`, with
    /// `+Blending` appended for blended materials.
    pub fn structural_identifier(&self) -> String {
        let components: Vec<_> = self
            .components()
            .map(|(slot, component)| format!("{}{}", slot, component.kind_name()))
            .collect();
        let mut identifier = format!("StandardMaterial[{}]", components.join("+"));
        if self.blending {
            identifier.push_str("+Blending");
        }
        identifier
    }

    pub fn uniform(&self) -> StandardMaterialUniform {
        let color = |slot| {
            self.component(slot)
                .map_or_else(Vector4::zeros, Component::uniform_color)
        };
        let opacity = match self.component(MaterialSlot::Opacity) {
            Some(&Component::Value(opacity)) => opacity,
            _ => 1.0,
        };
        StandardMaterialUniform {
            ambient_color: color(MaterialSlot::Ambient),
            diffuse_color: color(MaterialSlot::Diffuse),
            specular_color: color(MaterialSlot::Specular),
            auto_illumination_color: color(MaterialSlot::AutoIllumination),
            shininess: self.shininess,
            opacity,
            auto_illumination_amount: self.auto_illumination_amount,
            normal_scale: self.normal_scale,
            reflection_amount: self.reflection_amount,
            _padding: [0.0; 3],
        }
    }

    /// Returns the samplers of the texture components, bound after the
    /// uniform block in slot order.
    pub fn samplers(&self) -> Vec<Sampler> {
        self.textures()
            .zip(MATERIAL_BINDING + 1..)
            .map(|((slot, _, kind), binding)| {
                Sampler::new(
                    MATERIAL_SET,
                    binding,
                    kind.sampler_type(),
                    slot.sampler_name(),
                )
            })
            .collect()
    }

    pub(super) fn normal_map_rule(&self) -> Result<SynthesisRule> {
        let normal_map = self
            .samplers()
            .into_iter()
            .find(|sampler| sampler.name() == sampler::NORMAL)
            .ok_or_else(|| anyhow!("{} has no normal map", self.structural_identifier()))?;

        Ok(SynthesisRule::computed(
            variable::SURFACE_NORMAL,
            GlslType::Vec3,
            "normalize(svWorldTBNMatrix * ((texture(suNormal, svPrimary2DTextureCoordinates).xyz * 2.0 - 1.0) * vec3(ubMaterial.normalScale, ubMaterial.normalScale, 1.0)))",
        )
        .with_prerequisites(&[
            variable::WORLD_TBN_MATRIX,
            variable::PRIMARY_2D_TEXTURE_COORDINATES,
        ])
        .with_declaration(standard_material_block()?)
        .with_declaration(normal_map))
    }

    pub(super) fn generate_vertex_code(
        &self,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        for (slot, _, kind) in self.textures() {
            if slot != MaterialSlot::Reflection {
                graph.synthesize(stage, texture_coordinates(kind), Scope::Exported)?;
            }
        }
        if self.component(MaterialSlot::Reflection).is_some() {
            graph.synthesize(stage, variable::POSITION_WORLD_SPACE, Scope::Exported)?;
        }
        Ok(())
    }

    pub(super) fn generate_fragment_code(
        &self,
        context: &GenerationContext<'_>,
        graph: &SynthesisGraph,
        stage: &mut ShaderStage,
    ) -> Result<()> {
        for (slot, _, kind) in self.textures() {
            if slot != MaterialSlot::Reflection {
                graph.synthesize(stage, texture_coordinates(kind), Scope::Local)?;
            }
        }
        if context.pass.is_ambient_only() {
            self.generate_ambient_color(graph, stage)
        } else {
            self.generate_lit_color(stage);
            Ok(())
        }
    }

    fn generate_ambient_color(&self, graph: &SynthesisGraph, stage: &mut ShaderStage) -> Result<()> {
        let base = self
            .color_expression(MaterialSlot::Ambient)
            .or_else(|| self.color_expression(MaterialSlot::Diffuse))
            .unwrap_or_else(|| BLACK.to_string());
        let auto_illumination = self.color_expression(MaterialSlot::AutoIllumination);
        let reflection = self.component(MaterialSlot::Reflection).is_some();
        let opacity = self.opacity_expression();

        if auto_illumination.is_none() && !reflection && opacity.is_none() {
            emit_output(stage, &base, self.blending);
            return Ok(());
        }

        if reflection {
            graph.synthesize(stage, variable::VIEW_DIRECTION_WORLD_SPACE, Scope::Local)?;
            graph.synthesize(stage, variable::SURFACE_NORMAL, Scope::Local)?;
        }

        {
            let mut code = stage.code(CodeZone::Main);
            code.line(format!("vec4 surfaceColor = {};", base));
            if let Some(auto_illumination) = auto_illumination {
                code.line(format!(
                    "surfaceColor.rgb += {}.rgb * ubMaterial.autoIlluminationAmount;",
                    auto_illumination
                ));
            }
            if reflection {
                code.line(
                    "surfaceColor.rgb = mix(surfaceColor.rgb, texture(suReflection, reflect(-svViewDirectionWorldSpace, svSurfaceNormal)).rgb, ubMaterial.reflectionAmount);",
                );
            }
            if let Some(opacity) = opacity {
                code.line(format!("surfaceColor.a = {};", opacity));
            }
        }
        emit_output(stage, "surfaceColor", self.blending);
        Ok(())
    }

    fn generate_lit_color(&self, stage: &mut ShaderStage) {
        let mut terms = Vec::with_capacity(2);
        if let Some(diffuse) = self.color_expression(MaterialSlot::Diffuse) {
            terms.push(format!("{}.rgb * {}.rgb", variable::LIGHT_DIFFUSE, diffuse));
        }
        if let Some(specular) = self.color_expression(MaterialSlot::Specular) {
            terms.push(format!(
                "{0}.rgb * pow({0}.a, ubMaterial.shininess) * {1}.rgb",
                variable::LIGHT_SPECULAR,
                specular
            ));
        }
        let rgb = if terms.is_empty() {
            "vec3(0.0)".to_string()
        } else {
            terms.join(" + ")
        };
        let alpha = self
            .opacity_expression()
            .unwrap_or_else(|| "1.0".to_string());
        emit_output(stage, &format!("vec4({}, {})", rgb, alpha), self.blending);
    }

    fn textures(&self) -> impl Iterator<Item = (MaterialSlot, TextureHandle, TextureKind)> {
        self.components().filter_map(|(slot, component)| {
            component
                .texture()
                .map(|(handle, kind)| (slot, handle, kind))
        })
    }

    fn color_expression(&self, slot: MaterialSlot) -> Option<String> {
        let component = self.component(slot)?;
        match (component, slot.color_member()) {
            (Component::Texture { kind, .. }, _) => Some(format!(
                "texture({}, {})",
                slot.sampler_name(),
                texture_coordinates(*kind)
            )),
            (_, Some(member)) => Some(format!("{}.{}", block::MATERIAL, member)),
            (_, None) => None,
        }
    }

    fn opacity_expression(&self) -> Option<String> {
        match self.component(MaterialSlot::Opacity)? {
            Component::Texture { kind, .. } => Some(format!(
                "texture({}, {}).r",
                sampler::OPACITY,
                texture_coordinates(*kind)
            )),
            _ => Some(format!("{}.opacity", block::MATERIAL)),
        }
    }
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformMirror for StandardMaterialUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("ambientColor", mem::offset_of!(Self, ambient_color)),
            ("diffuseColor", mem::offset_of!(Self, diffuse_color)),
            ("specularColor", mem::offset_of!(Self, specular_color)),
            ("autoIlluminationColor", mem::offset_of!(Self, auto_illumination_color)),
            ("shininess", mem::offset_of!(Self, shininess)),
            ("opacity", mem::offset_of!(Self, opacity)),
            ("autoIlluminationAmount", mem::offset_of!(Self, auto_illumination_amount)),
            ("normalScale", mem::offset_of!(Self, normal_scale)),
            ("reflectionAmount", mem::offset_of!(Self, reflection_amount)),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        declaration::StageInput,
        geometry::{GeometryDescription, GeometryFlags},
        glsl::Interpolation,
        program::{GenerationContext, NormalMode},
        render_pass::RenderPassKind,
        resource::{TextureRegistry, TextureResource},
        stage::{GlslHeader, ShaderStageKind},
        synthesis,
    };
    use approx::assert_abs_diff_eq;

    fn texture(textures: &mut TextureRegistry, name: &str, kind: TextureKind) -> Component {
        Component::Texture {
            handle: textures.insert(TextureResource::new(name, kind)),
            kind,
        }
    }

    fn diffuse_color_material() -> StandardMaterial {
        StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                Component::Color(Vector4::new(0.8, 0.1, 0.1, 1.0)),
            )
            .unwrap()
    }

    fn fragment_source(
        material: &StandardMaterial,
        pass: RenderPassKind,
        inputs: &[(&str, GlslType)],
    ) -> String {
        let geometry = GeometryDescription::new(
            "mesh",
            GeometryFlags::NORMALS | GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
        );
        let context = GenerationContext {
            pass,
            geometry: &geometry,
            light: None,
            normal_mode: NormalMode::None,
        };
        let mut graph = SynthesisGraph::new(ShaderStageKind::Fragment, &geometry);
        synthesis::register_fragment_rules(&mut graph).unwrap();
        graph.register(synthesis::surface_normal_rule()).unwrap();

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
        let material = crate::material::Material::from(material.clone());
        material
            .generate_fragment_code(&context, &graph, &mut stage)
            .unwrap();
        stage.finish().unwrap().source().to_string()
    }

    #[test]
    fn material_block_layout_matches_mirror() {
        let layout = standard_material_block().unwrap().layout();
        let offsets: Vec<_> = [
            "ambientColor",
            "diffuseColor",
            "specularColor",
            "autoIlluminationColor",
            "shininess",
            "opacity",
            "autoIlluminationAmount",
            "normalScale",
            "reflectionAmount",
        ]
        .into_iter()
        .map(|name| layout.offset_of(name).unwrap())
        .collect();
        assert_eq!(offsets, [0, 16, 32, 48, 64, 68, 72, 76, 80]);
        assert_eq!(layout.size(), 96);
        assert_eq!(mem::size_of::<StandardMaterialUniform>(), 96);
        layout.verify_mirror::<StandardMaterialUniform>().unwrap();
    }

    #[test]
    fn structural_identifier_lists_components_in_slot_order() {
        let mut textures = TextureRegistry::new();
        let material = StandardMaterial::new()
            .with_component(MaterialSlot::Opacity, Component::Value(0.5))
            .unwrap()
            .with_component(
                MaterialSlot::Specular,
                Component::Color(Vector4::new(1.0, 1.0, 1.0, 1.0)),
            )
            .unwrap()
            .with_component(
                MaterialSlot::Diffuse,
                texture(&mut textures, "bricks", TextureKind::Texture2D),
            )
            .unwrap();
        assert_eq!(
            material.structural_identifier(),
            "StandardMaterial[DiffuseTexture2D+SpecularColor+OpacityValue]"
        );
        assert_eq!(
            material.with_blending(true).structural_identifier(),
            "StandardMaterial[DiffuseTexture2D+SpecularColor+OpacityValue]+Blending"
        );
    }

    #[test]
    fn materials_with_same_structure_gives_same_bindings() {
        let mut textures = TextureRegistry::new();
        let make = |textures: &mut TextureRegistry, name: &str| {
            StandardMaterial::new()
                .with_component(
                    MaterialSlot::Diffuse,
                    texture(textures, name, TextureKind::Texture2D),
                )
                .unwrap()
                .with_component(
                    MaterialSlot::Reflection,
                    texture(textures, "sky", TextureKind::Cube),
                )
                .unwrap()
        };
        let a = make(&mut textures, "bricks");
        let b = make(&mut textures, "stones");
        assert_ne!(a, b);
        assert_eq!(a.structural_identifier(), b.structural_identifier());
        assert_eq!(a.samplers(), b.samplers());
    }

    #[test]
    fn samplers_follow_uniform_block_in_slot_order() {
        let mut textures = TextureRegistry::new();
        let material = StandardMaterial::new()
            .with_component(
                MaterialSlot::Normal,
                texture(&mut textures, "normals", TextureKind::Texture2D),
            )
            .unwrap()
            .with_component(MaterialSlot::Ambient, Component::Value(0.1))
            .unwrap()
            .with_component(
                MaterialSlot::Diffuse,
                texture(&mut textures, "bricks", TextureKind::Texture3D),
            )
            .unwrap();
        let samplers: Vec<_> = material.samplers().iter().map(ToString::to_string).collect();
        assert_eq!(
            samplers,
            [
                "layout(set = 2, binding = 1) uniform sampler3D suDiffuse;",
                "layout(set = 2, binding = 2) uniform sampler2D suNormal;",
            ]
        );
    }

    #[test]
    fn putting_value_in_normal_slot_fails() {
        assert!(
            StandardMaterial::new()
                .with_component(MaterialSlot::Normal, Component::Value(1.0))
                .is_err()
        );
    }

    #[test]
    fn uniform_gives_white_for_textures_and_black_for_missing_slots() {
        let mut textures = TextureRegistry::new();
        let uniform = StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                texture(&mut textures, "bricks", TextureKind::Texture2D),
            )
            .unwrap()
            .with_component(MaterialSlot::Opacity, Component::Value(0.25))
            .unwrap()
            .with_shininess(8.0)
            .uniform();
        assert_eq!(uniform.diffuse_color, Vector4::new(1.0, 1.0, 1.0, 1.0));
        assert_eq!(uniform.ambient_color, Vector4::zeros());
        assert_abs_diff_eq!(uniform.opacity, 0.25);
        assert_abs_diff_eq!(uniform.shininess, 8.0);
    }

    #[test]
    fn ambient_pass_with_only_diffuse_color_outputs_diffuse_member() {
        let source = fragment_source(&diffuse_color_material(), RenderPassKind::AmbientPass, &[]);
        assert!(source.contains("\tsvOutputFragment = ubMaterial.diffuseColor;\n"));
        assert!(!source.contains("surfaceColor"));
        assert!(!source.contains("svSurfaceNormal"));
    }

    #[test]
    fn ambient_component_takes_precedence_over_diffuse() {
        let material = diffuse_color_material()
            .with_component(MaterialSlot::Ambient, Component::Value(0.2))
            .unwrap();
        let source = fragment_source(&material, RenderPassKind::SimplePass, &[]);
        assert!(source.contains("\tsvOutputFragment = ubMaterial.ambientColor;\n"));
    }

    #[test]
    fn opacity_texture_replaces_alpha() {
        let mut textures = TextureRegistry::new();
        let material = diffuse_color_material()
            .with_component(
                MaterialSlot::Opacity,
                texture(&mut textures, "mask", TextureKind::Texture2D),
            )
            .unwrap()
            .with_blending(true);
        let source = fragment_source(
            &material,
            RenderPassKind::AmbientPass,
            &[(variable::PRIMARY_2D_TEXTURE_COORDINATES, GlslType::Vec2)],
        );
        assert!(source.contains("\tvec4 surfaceColor = ubMaterial.diffuseColor;\n"));
        assert!(source.contains(
            "\tsurfaceColor.a = texture(suOpacity, svPrimary2DTextureCoordinates).r;\n"
        ));
        assert!(source.contains("\tsvOutputFragment = surfaceColor;\n"));
        assert!(source.contains("\tif (svOutputFragment.a <= 0.0) { discard; }\n"));
    }

    #[test]
    fn texture_without_coordinates_in_fragment_stage_fails() {
        let mut textures = TextureRegistry::new();
        let material = StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                texture(&mut textures, "bricks", TextureKind::Texture2D),
            )
            .unwrap();
        let geometry = GeometryDescription::new("bare", GeometryFlags::empty());
        let context = GenerationContext {
            pass: RenderPassKind::AmbientPass,
            geometry: &geometry,
            light: None,
            normal_mode: NormalMode::None,
        };
        let mut graph = SynthesisGraph::new(ShaderStageKind::Fragment, &geometry);
        synthesis::register_fragment_rules(&mut graph).unwrap();
        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        stage.declare_default_output_fragment().unwrap();

        let error = crate::material::Material::from(material)
            .generate_fragment_code(&context, &graph, &mut stage)
            .unwrap_err();
        let message = format!("{:#}", error);
        assert!(message.contains("StandardMaterial[DiffuseTexture2D]"));
        assert!(message.contains("bare"));
    }

    #[test]
    fn normal_map_rule_requires_normal_texture() {
        assert!(diffuse_color_material().normal_map_rule().is_err());

        let mut textures = TextureRegistry::new();
        let material = diffuse_color_material()
            .with_component(
                MaterialSlot::Normal,
                texture(&mut textures, "normals", TextureKind::Texture2D),
            )
            .unwrap();
        let rule = material.normal_map_rule().unwrap();
        assert_eq!(rule.name(), variable::SURFACE_NORMAL);
        assert!(
            rule.prerequisites()
                .iter()
                .any(|name| name == variable::WORLD_TBN_MATRIX)
        );
    }
}
