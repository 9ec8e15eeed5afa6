//! Shader code lighting a surface with a single light.

use crate::{
    declaration::{Sampler, UniformBlock},
    glsl::{GlslType, variable},
    light::{LightKind, LightSetShape, LightVariant, LightingModel, block},
    stage::ShaderStage,
    synthesis::{Scope, SynthesisGraph, SynthesisRule},
};
use anyhow::{Context, Result};

/// Contributes the declarations and instructions evaluating the light of
/// one light pass.
///
/// The light terms are made available as `svLightDiffuse`, with the light
/// color in `rgb`, and `svLightSpecular`, with the light color in `rgb` and
/// the cosine between the view direction and the reflected light in `a`.
/// Depending on the [`LightingModel`] they are computed in the vertex stage
/// and interpolated, or computed in the fragment stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LightGenerator {
    variant: LightVariant,
    shape: LightSetShape,
}

impl LightGenerator {
    pub fn new(variant: LightVariant, shape: LightSetShape) -> Self {
        Self { variant, shape }
    }

    pub fn variant(&self) -> LightVariant {
        self.variant
    }

    pub fn shape(&self) -> LightSetShape {
        self.shape
    }

    /// Whether the generated code samples the shadow map of the light.
    pub fn samples_shadow_map(&self) -> bool {
        self.variant.samples_shadow_map(self.shape.shadow_mapping)
    }

    /// Returns the identifier of the descriptor set layout holding the
    /// resources of the light.
    pub fn set_identifier(&self) -> String {
        self.variant.set_identifier(self.shape.shadow_mapping)
    }

    /// Returns the declaration of the `ubLight` block.
    ///
    /// # Errors
    /// Returns an error if the block can not be built.
    pub fn light_block(&self) -> Result<UniformBlock> {
        block::light_uniform_block(self.variant, self.shape.shadow_mapping)
    }

    /// Returns the declaration of the shadow map, if it is sampled.
    pub fn shadow_map_sampler(&self) -> Option<Sampler> {
        self.samples_shadow_map()
            .then(|| block::shadow_map_sampler(self.variant.kind))
    }

    /// Adds what the vertex stage must provide for the lighting. In the
    /// per-vertex model the light terms are computed here and exported,
    /// otherwise the positions needed to compute them per fragment are
    /// exported.
    ///
    /// The graph must hold the standard vertex rules with world-space
    /// quantities available.
    ///
    /// # Errors
    /// Returns an error if a rule conflicts with an existing one or if a
    /// needed variable can not be synthesized.
    pub fn generate_vertex_code(
        &self,
        graph: &mut SynthesisGraph,
        stage: &mut ShaderStage,
        specular: bool,
    ) -> Result<()> {
        if self.variant.has_light_matrix(self.shape.shadow_mapping) {
            graph.register(
                SynthesisRule::computed(
                    variable::POSITION_LIGHT_SPACE,
                    GlslType::Vec4,
                    "ubLight.lightMatrix * svPositionWorldSpace",
                )
                .with_prerequisites(&[variable::POSITION_WORLD_SPACE])
                .with_declaration(self.light_block()?),
            )?;
        }

        match self.shape.model {
            LightingModel::PerFragment => {
                if self.variant.kind != LightKind::Directional || specular {
                    graph.synthesize(stage, variable::POSITION_WORLD_SPACE, Scope::Exported)?;
                }
                if self.variant.has_light_matrix(self.shape.shadow_mapping) {
                    graph.synthesize(stage, variable::POSITION_LIGHT_SPACE, Scope::Exported)?;
                }
            }
            LightingModel::PerVertex => {
                self.register_lighting_rules(graph, variable::NORMAL_WORLD_SPACE)?;
                graph.synthesize(stage, variable::LIGHT_DIFFUSE, Scope::Exported)?;
                if specular {
                    graph.synthesize(stage, variable::LIGHT_SPECULAR, Scope::Exported)?;
                }
            }
        }
        Ok(())
    }

    /// Makes the light terms available as locals in the fragment stage.
    ///
    /// In the per-fragment model the graph must hold a rule for
    /// `svSurfaceNormal`, which the diffuse and specular terms are computed
    /// with.
    ///
    /// # Errors
    /// Returns an error if a rule conflicts with an existing one or if a
    /// needed variable can not be synthesized.
    pub fn generate_fragment_code(
        &self,
        graph: &mut SynthesisGraph,
        stage: &mut ShaderStage,
        specular: bool,
    ) -> Result<()> {
        match self.shape.model {
            LightingModel::PerFragment => {
                self.register_lighting_rules(graph, variable::SURFACE_NORMAL)?;
            }
            LightingModel::PerVertex => {
                graph.register(SynthesisRule::from_previous_stage(
                    variable::LIGHT_DIFFUSE,
                    GlslType::Vec4,
                ))?;
                graph.register(SynthesisRule::from_previous_stage(
                    variable::LIGHT_SPECULAR,
                    GlslType::Vec4,
                ))?;
            }
        }
        graph
            .synthesize(stage, variable::LIGHT_DIFFUSE, Scope::Local)
            .with_context(|| format!("Failed to light surface with {}", self.variant))?;
        if specular {
            graph
                .synthesize(stage, variable::LIGHT_SPECULAR, Scope::Local)
                .with_context(|| format!("Failed to light surface with {}", self.variant))?;
        }
        Ok(())
    }

    fn register_lighting_rules(&self, graph: &mut SynthesisGraph, normal: &str) -> Result<()> {
        let light_block = self.light_block()?;

        match self.variant.kind {
            LightKind::Directional => {
                graph.register(
                    SynthesisRule::computed(
                        variable::LIGHT_DIRECTION,
                        GlslType::Vec3,
                        "normalize(ubLight.directionWorldSpace.xyz)",
                    )
                    .with_declaration(light_block.clone()),
                )?;
            }
            LightKind::Point | LightKind::Spot => {
                graph.register(
                    SynthesisRule::computed(
                        variable::LIGHT_VECTOR,
                        GlslType::Vec3,
                        "svPositionWorldSpace.xyz - ubLight.positionWorldSpace.xyz",
                    )
                    .with_prerequisites(&[variable::POSITION_WORLD_SPACE])
                    .with_declaration(light_block.clone()),
                )?;
                graph.register(
                    SynthesisRule::computed(
                        variable::LIGHT_DIRECTION,
                        GlslType::Vec3,
                        "normalize(svLightVector)",
                    )
                    .with_prerequisites(&[variable::LIGHT_VECTOR]),
                )?;
                graph.register(
                    SynthesisRule::computed(
                        variable::LIGHT_ATTENUATION,
                        GlslType::Float,
                        "max(0.0, 1.0 - dot(svLightVector / ubLight.radius, svLightVector / ubLight.radius))",
                    )
                    .with_prerequisites(&[variable::LIGHT_VECTOR])
                    .with_declaration(light_block.clone()),
                )?;
            }
        }

        let mut intensity_factors = Vec::new();
        if self.variant.kind != LightKind::Directional {
            intensity_factors.push(variable::LIGHT_ATTENUATION);
        }

        if self.variant.kind == LightKind::Spot {
            graph.register(
                SynthesisRule::computed(
                    variable::SPOT_FACTOR,
                    GlslType::Float,
                    "clamp((dot(svLightDirection, normalize(ubLight.directionWorldSpace.xyz)) - ubLight.outerCosAngle) / (ubLight.innerCosAngle - ubLight.outerCosAngle), 0.0, 1.0)",
                )
                .with_prerequisites(&[variable::LIGHT_DIRECTION])
                .with_declaration(light_block.clone()),
            )?;
            intensity_factors.push(variable::SPOT_FACTOR);
        }

        if let Some(shadow_map) = self.shadow_map_sampler() {
            // Shadow maps have a single level, so the lookup is valid in any stage
            let shadow_factor = match self.variant.kind {
                LightKind::Point => SynthesisRule::computed(
                    variable::SHADOW_FACTOR,
                    GlslType::Float,
                    "step(length(svLightVector) / ubLight.radius, textureLod(suShadowMap, svLightVector, 0.0).r + 0.005)",
                )
                .with_prerequisites(&[variable::LIGHT_VECTOR]),
                LightKind::Directional | LightKind::Spot => SynthesisRule::computed(
                    variable::SHADOW_FACTOR,
                    GlslType::Float,
                    "textureLod(suShadowMap, svPositionLightSpace.xyz / svPositionLightSpace.w, 0.0)",
                )
                .with_prerequisites(&[variable::POSITION_LIGHT_SPACE]),
            };
            graph.register(shadow_factor.with_declaration(shadow_map))?;
            intensity_factors.push(variable::SHADOW_FACTOR);
        }

        let intensity = if intensity_factors.is_empty() {
            "1.0".to_string()
        } else {
            intensity_factors.join(" * ")
        };
        graph.register(
            SynthesisRule::computed(variable::LIGHT_INTENSITY, GlslType::Float, intensity)
                .with_prerequisites(&intensity_factors),
        )?;

        graph.register(
            SynthesisRule::computed(
                variable::DIFFUSE_FACTOR,
                GlslType::Float,
                format!("max(dot(-svLightDirection, {}), 0.0)", normal),
            )
            .with_prerequisites(&[variable::LIGHT_DIRECTION, normal]),
        )?;
        graph.register(
            SynthesisRule::computed(
                variable::REFLECTED_LIGHT,
                GlslType::Vec3,
                format!("reflect(svLightDirection, {})", normal),
            )
            .with_prerequisites(&[variable::LIGHT_DIRECTION, normal]),
        )?;
        graph.register(
            SynthesisRule::computed(
                variable::SPECULAR_COSINE,
                GlslType::Float,
                "max(dot(svViewDirectionWorldSpace, svReflectedLight), 0.0)",
            )
            .with_prerequisites(&[
                variable::VIEW_DIRECTION_WORLD_SPACE,
                variable::REFLECTED_LIGHT,
            ]),
        )?;

        graph.register(
            SynthesisRule::computed(
                variable::LIGHT_DIFFUSE,
                GlslType::Vec4,
                "vec4(svLightIntensity * svDiffuseFactor * ubLight.diffuseColor.rgb, 1.0)",
            )
            .with_prerequisites(&[variable::LIGHT_INTENSITY, variable::DIFFUSE_FACTOR])
            .with_declaration(light_block.clone()),
        )?;
        graph.register(
            SynthesisRule::computed(
                variable::LIGHT_SPECULAR,
                GlslType::Vec4,
                "vec4(svLightIntensity * ubLight.specularColor.rgb, svSpecularCosine)",
            )
            .with_prerequisites(&[variable::LIGHT_INTENSITY, variable::SPECULAR_COSINE])
            .with_declaration(light_block),
        )
    }
}
