//! Assembly of programs from materials, lights, geometry and passes.

use crate::{
    binding::{self, SetAssignment, SetKind},
    code::CodeZone,
    geometry::GeometryDescription,
    glsl::{builtin, variable},
    layout_cache::{DescriptorSetLayoutCache, LayoutFactory},
    light::LightSetShape,
    material::Material,
    program::{
        GenerationContext, GeneratorConfig, NormalMode, Program, ProgramCache, ProgramCacheKey,
        dump,
        overlay::{self, ColorConversion},
        shadow,
    },
    render_pass::{PipelineStateHints, RenderPassKind},
    stage::{GeneratedShader, ShaderStage, ShaderStageKind},
    synthesis::{self, Scope, SynthesisGraph},
    view,
};
use anyhow::{Context, Result, bail};
use std::sync::Arc;

/// Color written by programs without a material.
const MISSING_MATERIAL_COLOR: &str = "vec4(1.0, 0.0, 1.0, 1.0)";

/// What to generate a program for.
#[derive(Copy, Clone, Debug)]
pub struct ProgramRequest<'a> {
    /// Name of the program, used for the stages and in messages.
    pub name: &'a str,
    pub pass: RenderPassKind,
    pub material: Option<&'a Material>,
    pub geometry: &'a GeometryDescription,
    /// Whether model matrices are per-instance vertex attributes.
    pub instanced: bool,
}

/// Generator of programs, sharing descriptor set layouts between programs
/// and caching every generated program.
#[derive(Debug)]
pub struct ProgramGenerator {
    config: GeneratorConfig,
    layout_cache: Arc<DescriptorSetLayoutCache>,
    programs: ProgramCache,
}

impl<'a> ProgramRequest<'a> {
    pub fn new(
        name: &'a str,
        pass: RenderPassKind,
        material: Option<&'a Material>,
        geometry: &'a GeometryDescription,
    ) -> Self {
        Self {
            name,
            pass,
            material,
            geometry,
            instanced: false,
        }
    }

    pub fn instanced(mut self) -> Self {
        self.instanced = true;
        self
    }
}

impl ProgramGenerator {
    /// Creates a generator with the given configuration, creating layout
    /// objects with the given factory.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: GeneratorConfig, factory: Arc<dyn LayoutFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            layout_cache: Arc::new(DescriptorSetLayoutCache::new(factory)),
            programs: ProgramCache::new(),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn layout_cache(&self) -> &Arc<DescriptorSetLayoutCache> {
        &self.layout_cache
    }

    pub fn program_cache(&self) -> &ProgramCache {
        &self.programs
    }

    /// Returns the key the program for the given request is cached under.
    pub fn cache_key(&self, request: &ProgramRequest<'_>) -> ProgramCacheKey {
        ProgramCacheKey {
            name: request.name.to_string(),
            pass: request.pass,
            material: request.material.map(Material::structural_identifier),
            light_shape: self.light_set_shape(request.pass),
            geometry: request.geometry.flags(),
            instanced: request.instanced,
        }
    }

    /// Returns the cached program for the given request, generating and
    /// caching it if it does not exist.
    ///
    /// # Errors
    /// See [`generate_program`](Self::generate_program).
    pub fn obtain_program(&self, request: &ProgramRequest<'_>) -> Result<Arc<Program>> {
        let key = self.cache_key(request);
        if let Some(program) = self.programs.get(&key) {
            log::trace!("Using cached program {}", key);
            return Ok(program);
        }
        log::debug!("No cached program for {}", key);
        let program = self.generate_program(request)?;
        Ok(self.programs.insert(program))
    }

    /// Generates the program for the given request without consulting or
    /// filling the program cache. Layouts are still shared through the
    /// layout cache.
    ///
    /// # Errors
    /// Returns an error if
    /// - the material has no components.
    /// - the pass lights surfaces but lighting is disabled.
    /// - the geometry lacks a capability the material or light needs.
    /// - the stages do not agree on resources or interface variables.
    /// - a layout object can not be created.
    /// - the source can not be written to the configured dump directory.
    ///
    /// On failure no layout created for the program stays cached.
    pub fn generate_program(&self, request: &ProgramRequest<'_>) -> Result<Program> {
        let context = self.context(request);
        let program = with_debug_logging!("Generating program `{}` for {}", request.name, request.pass;
            self.generate_shaders(request, &context).and_then(|(vertex, fragment)| {
                let pipeline_state = request
                    .pass
                    .pipeline_state(request.material.is_some_and(Material::blending));
                self.assemble_program(
                    self.cache_key(request),
                    vertex,
                    fragment,
                    &set_assignments(request, &context),
                    pipeline_state,
                )
            })
        );
        program.with_context(|| {
            format!(
                "Failed to generate program `{}` for {}",
                request.name, request.pass
            )
        })
    }

    /// Returns the cached program drawing a textured screen-space quad with
    /// the given color conversion, generating it if needed.
    ///
    /// # Errors
    /// Returns an error if the program can not be generated or dumped.
    pub fn obtain_overlay_program(&self, conversion: ColorConversion) -> Result<Arc<Program>> {
        let key = overlay::overlay_cache_key(conversion);
        if let Some(program) = self.programs.get(&key) {
            log::trace!("Using cached program {}", key);
            return Ok(program);
        }
        let program = with_debug_logging!("Generating overlay program with {} conversion", conversion;
            overlay::generate_overlay_shaders(self.config.glsl_header(), conversion).and_then(
                |(vertex, fragment)| {
                    self.assemble_program(
                        key,
                        vertex,
                        fragment,
                        &[SetAssignment::new(
                            SetKind::PerView,
                            overlay::OVERLAY_SET_IDENTIFIER,
                        )],
                        overlay::OVERLAY_PIPELINE_STATE,
                    )
                }
            )
        );
        let program = program.context("Failed to generate overlay program")?;
        Ok(self.programs.insert(program))
    }

    /// Returns the cached depth-only program rendering shadow casters into a
    /// shadow map, generating it if needed. Instanced casters read their
    /// model matrices from vertex attributes.
    ///
    /// # Errors
    /// Returns an error if the program can not be generated or dumped.
    pub fn obtain_shadow_casting_program(&self, instanced: bool) -> Result<Arc<Program>> {
        let key = shadow::shadow_casting_cache_key(instanced);
        if let Some(program) = self.programs.get(&key) {
            log::trace!("Using cached program {}", key);
            return Ok(program);
        }
        let program = with_debug_logging!("Generating shadow casting program (instanced: {})", instanced;
            shadow::generate_shadow_casting_shaders(self.config.glsl_header(), instanced).and_then(
                |(vertex, fragment)| {
                    self.assemble_program(
                        key,
                        vertex,
                        fragment,
                        &shadow::shadow_casting_sets(instanced),
                        shadow::SHADOW_CASTING_PIPELINE_STATE,
                    )
                }
            )
        );
        let program = program.context("Failed to generate shadow casting program")?;
        Ok(self.programs.insert(program))
    }

    fn light_set_shape(&self, pass: RenderPassKind) -> LightSetShape {
        if pass.is_ambient_only() {
            LightSetShape::disabled()
        } else {
            self.config.light_set_shape()
        }
    }

    fn context<'r>(&self, request: &ProgramRequest<'r>) -> GenerationContext<'r> {
        GenerationContext::new(
            request.pass,
            request.geometry,
            request.material,
            self.light_set_shape(request.pass),
        )
    }

    fn generate_shaders(
        &self,
        request: &ProgramRequest<'_>,
        context: &GenerationContext<'_>,
    ) -> Result<(GeneratedShader, GeneratedShader)> {
        if let Some(material) = request.material.filter(|material| material.is_empty()) {
            bail!("Can not generate program for {} without components", material);
        }
        if request.pass.light_variant().is_some() && context.light.is_none() {
            bail!("{} lights surfaces, but lighting is disabled", request.pass);
        }

        let specular = request.material.is_some_and(Material::has_specular);

        let vertex = self
            .generate_vertex_stage(request, context, specular)
            .with_context(|| {
                format!(
                    "Failed to generate vertex stage for geometry `{}`",
                    request.geometry.name()
                )
            })?;
        let fragment = self
            .generate_fragment_stage(request, context, specular, &vertex)
            .with_context(|| {
                format!(
                    "Failed to generate fragment stage for geometry `{}`",
                    request.geometry.name()
                )
            })?;

        vertex.check_interface_with(&fragment)?;
        Ok((vertex, fragment))
    }

    fn generate_vertex_stage(
        &self,
        request: &ProgramRequest<'_>,
        context: &GenerationContext<'_>,
        specular: bool,
    ) -> Result<GeneratedShader> {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Vertex, request.geometry);
        synthesis::register_vertex_rules(&mut graph, context.matrix_mode(), request.instanced)?;

        let mut stage = ShaderStage::new(
            ShaderStageKind::Vertex,
            request.name,
            self.config.glsl_header(),
        );
        graph.synthesize(&mut stage, builtin::POSITION, Scope::Local)?;

        match context.normal_mode {
            NormalMode::None => {}
            NormalMode::Normal => {
                graph.synthesize(&mut stage, variable::NORMAL_WORLD_SPACE, Scope::Exported)?;
            }
            NormalMode::TangentSpace => {
                graph.synthesize(&mut stage, variable::WORLD_TBN_MATRIX, Scope::Exported)?;
            }
        }

        if let Some(light) = context.light {
            light.generate_vertex_code(&mut graph, &mut stage, specular)?;
        }
        if let Some(material) = request.material {
            material.generate_vertex_code(context, &graph, &mut stage)?;
        }

        stage.finish()
    }

    fn generate_fragment_stage(
        &self,
        request: &ProgramRequest<'_>,
        context: &GenerationContext<'_>,
        specular: bool,
        vertex: &GeneratedShader,
    ) -> Result<GeneratedShader> {
        let mut graph = SynthesisGraph::new(ShaderStageKind::Fragment, request.geometry);
        synthesis::register_fragment_rules(&mut graph)?;
        graph.register(match request.material {
            Some(material) => material.surface_normal_rule()?,
            None => synthesis::surface_normal_rule(),
        })?;

        let mut stage = ShaderStage::new(
            ShaderStageKind::Fragment,
            request.name,
            self.config.glsl_header(),
        );
        stage.connect_from_previous_stage(vertex)?;
        stage.declare_default_output_fragment()?;

        // Material resources come first so they get the lowest bindings of
        // their set regardless of what the light pulls in.
        if let Some(material) = request.material {
            material.declare_resources(&mut stage)?;
        }
        if let Some(light) = context.light {
            light.generate_fragment_code(&mut graph, &mut stage, specular)?;
        }
        match request.material {
            Some(material) => material.generate_fragment_code(context, &graph, &mut stage)?,
            None => {
                stage.code(CodeZone::Output).line(format!(
                    "{} = {};",
                    variable::OUTPUT_FRAGMENT,
                    MISSING_MATERIAL_COLOR
                ));
            }
        }

        stage.finish()
    }

    /// Lays out the resources of the given stages, dumps their source if
    /// configured, obtains the descriptor set layouts from the cache and
    /// creates the pipeline layout. Layouts created by this call are removed
    /// again if a later step fails, unless another caller obtained them in
    /// the meantime.
    fn assemble_program(
        &self,
        key: ProgramCacheKey,
        vertex: GeneratedShader,
        fragment: GeneratedShader,
        sets: &[SetAssignment],
        pipeline_state: PipelineStateHints,
    ) -> Result<Program> {
        let layout = binding::allocate_pipeline_layout(&[&vertex, &fragment], sets)?;

        if let Some(directory) = &self.config.source_dump_directory {
            dump::dump_shaders(&key, [&vertex, &fragment], directory)?;
        }

        let mut set_layouts = Vec::with_capacity(layout.set_layouts.len());
        let mut created = Vec::new();

        let result = layout
            .set_layouts
            .iter()
            .try_for_each(|description| {
                let (set_layout, was_created) = self.layout_cache.get_or_create(description)?;
                if was_created {
                    created.push(set_layout.identifier());
                }
                set_layouts.push(set_layout);
                Ok(())
            })
            .and_then(|()| {
                let handles: Vec<_> = set_layouts.iter().map(|layout| layout.handle()).collect();
                self.layout_cache
                    .factory()
                    .create_pipeline_layout(&handles, &layout.push_constant_ranges)
            });

        match result {
            Ok(pipeline_layout) => Ok(Program {
                key,
                vertex,
                fragment,
                layout,
                set_layouts,
                pipeline_layout,
                pipeline_state,
            }),
            Err(error) => {
                drop(set_layouts);
                for identifier in created {
                    if self.layout_cache.remove_if_unused(identifier) {
                        log::debug!("Removed descriptor set layout `{}`", identifier);
                    }
                }
                Err(error)
            }
        }
    }
}

/// Returns the sets enabled for a program, with the identifiers their
/// layouts are shared under.
fn set_assignments(request: &ProgramRequest<'_>, context: &GenerationContext<'_>) -> Vec<SetAssignment> {
    let mut sets = vec![SetAssignment::new(
        SetKind::PerView,
        view::VIEW_SET_IDENTIFIER,
    )];
    if let Some(light) = context.light {
        sets.push(SetAssignment::new(SetKind::PerLight, light.set_identifier()));
    }
    if let Some(material) = request.material {
        sets.push(SetAssignment::new(
            SetKind::PerModelLayer,
            material.structural_identifier(),
        ));
    }
    sets
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        binding::{DescriptorSetLayoutDescription, EMPTY_SET_IDENTIFIER, PushConstantRange},
        declaration::{Declaration, InterfaceDirection},
        geometry::GeometryFlags,
        layout_cache::{DescriptionOnlyFactory, GpuLayoutHandle},
        light::LightingModel,
        material::{BasicMaterial, Component, MaterialSlot, StandardMaterial},
        resource::{TextureKind, TextureRegistry, TextureResource},
    };
    use nalgebra::Vector4;
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    struct FailingPipelineLayoutFactory {
        inner: DescriptionOnlyFactory,
    }

    impl LayoutFactory for FailingPipelineLayoutFactory {
        fn create_descriptor_set_layout(
            &self,
            description: &DescriptorSetLayoutDescription,
        ) -> Result<GpuLayoutHandle> {
            self.inner.create_descriptor_set_layout(description)
        }

        fn create_pipeline_layout(
            &self,
            _set_layouts: &[GpuLayoutHandle],
            _push_constant_ranges: &[PushConstantRange],
        ) -> Result<GpuLayoutHandle> {
            bail!("Out of pipeline layouts")
        }
    }

    fn generator() -> ProgramGenerator {
        ProgramGenerator::new(
            GeneratorConfig::default(),
            Arc::new(DescriptionOnlyFactory::new()),
        )
        .unwrap()
    }

    fn red_diffuse() -> Material {
        StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                Component::Color(Vector4::new(1.0, 0.0, 0.0, 1.0)),
            )
            .unwrap()
            .into()
    }

    fn texture(textures: &mut TextureRegistry, kind: TextureKind) -> Component {
        let handle = textures.insert(TextureResource::new("texture", kind));
        Component::Texture { handle, kind }
    }

    fn textured_diffuse(textures: &mut TextureRegistry) -> Material {
        StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                texture(textures, TextureKind::Texture2D),
            )
            .unwrap()
            .into()
    }

    fn full_material(textures: &mut TextureRegistry) -> Material {
        StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                texture(textures, TextureKind::Texture2D),
            )
            .unwrap()
            .with_component(
                MaterialSlot::Specular,
                Component::Color(Vector4::new(1.0, 1.0, 1.0, 1.0)),
            )
            .unwrap()
            .with_component(MaterialSlot::Normal, texture(textures, TextureKind::Texture2D))
            .unwrap()
            .with_component(MaterialSlot::Reflection, texture(textures, TextureKind::Cube))
            .unwrap()
            .with_component(MaterialSlot::Opacity, Component::Value(0.5))
            .unwrap()
            .into()
    }

    fn full_geometry() -> GeometryDescription {
        GeometryDescription::new("full", GeometryFlags::all())
    }

    fn count(source: &str, pattern: &str) -> usize {
        source.matches(pattern).count()
    }

    #[test]
    fn ambient_pass_with_diffuse_color_gives_minimal_program() {
        let generator = generator();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let program = generator
            .generate_program(&ProgramRequest::new(
                "mesh",
                RenderPassKind::AmbientPass,
                Some(&material),
                &geometry,
            ))
            .unwrap();

        let fragment = program.fragment();
        let blocks: Vec<_> = fragment.uniform_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].instance_name(), "ubMaterial");
        assert_eq!((blocks[0].set(), blocks[0].binding()), (2, 0));
        assert_eq!(fragment.samplers().count(), 0);
        assert!(
            fragment
                .source()
                .contains("svOutputFragment = ubMaterial.diffuseColor;")
        );
        assert!(!fragment.source().contains("svSurfaceNormal"));
        assert!(!program.vertex().source().contains("svNormalWorldSpace"));

        let layout = program.layout();
        assert_eq!(layout.set_layouts.len(), 3);
        assert_eq!(layout.set_layouts[0].identifier, EMPTY_SET_IDENTIFIER);
        assert_eq!(layout.set_layouts[1].identifier, EMPTY_SET_IDENTIFIER);
        assert_eq!(
            layout.set_layouts[2].identifier,
            "StandardMaterial[DiffuseColor]"
        );
    }

    #[test]
    fn directional_light_pass_with_diffuse_texture_gives_lit_program() {
        let generator = generator();
        let mut textures = TextureRegistry::new();
        let material = textured_diffuse(&mut textures);
        let geometry = GeometryDescription::new(
            "textured",
            GeometryFlags::NORMALS | GeometryFlags::PRIMARY_2D_TEXTURE_COORDINATES,
        );
        let program = generator
            .generate_program(&ProgramRequest::new(
                "mesh",
                RenderPassKind::DirectionalLightPass,
                Some(&material),
                &geometry,
            ))
            .unwrap();

        let fragment = program.fragment();
        assert_eq!(fragment.samplers().count(), 1);
        let diffuse = fragment
            .samplers()
            .find(|sampler| sampler.name() == "suDiffuse")
            .unwrap();
        assert_eq!(diffuse.resource_binding().set, 2);
        assert_eq!(diffuse.resource_binding().binding, 1);
        assert!(
            fragment
                .source()
                .contains("svSurfaceNormal = normalize(svNormalWorldSpace);")
        );
        assert!(fragment.source().contains("svLightDiffuse"));
        assert!(fragment.uniform_blocks().any(|block| block.instance_name() == "ubLight"));
        assert!(program.vertex().source().contains("svNormalWorldSpace = "));
    }

    #[test]
    fn every_variable_is_computed_once() {
        let generator = generator();
        let mut textures = TextureRegistry::new();
        let material = full_material(&mut textures);
        let geometry = full_geometry();
        for pass in RenderPassKind::ALL {
            let program = generator
                .generate_program(&ProgramRequest::new("mesh", pass, Some(&material), &geometry))
                .unwrap();
            for shader in [program.vertex(), program.fragment()] {
                for name in [
                    "svPositionWorldSpace = ",
                    "svWorldTBNMatrix = ",
                    "svPrimary2DTextureCoordinates = ",
                    "svSurfaceNormal = ",
                    "svViewDirectionWorldSpace = ",
                    "svLightDiffuse = ",
                    "svLightSpecular = ",
                ] {
                    assert!(
                        count(shader.source(), name) <= 1,
                        "`{}` assigned more than once in {} stage for {}",
                        name,
                        shader.kind(),
                        pass
                    );
                }
            }
        }
    }

    #[test]
    fn generating_twice_gives_identical_programs() {
        let mut textures = TextureRegistry::new();
        let material = full_material(&mut textures);
        let geometry = full_geometry();
        for pass in RenderPassKind::ALL {
            let request = ProgramRequest::new("mesh", pass, Some(&material), &geometry);
            let first = generator().generate_program(&request).unwrap();
            let second = generator().generate_program(&request).unwrap();
            assert_eq!(first.vertex().source(), second.vertex().source());
            assert_eq!(first.fragment().source(), second.fragment().source());
            assert_eq!(first.layout(), second.layout());
        }
    }

    #[test]
    fn programs_have_no_binding_or_location_collisions() {
        let mut textures = TextureRegistry::new();
        let materials = [
            red_diffuse(),
            full_material(&mut textures),
            BasicMaterial::new(Vector4::new(1.0, 1.0, 1.0, 1.0))
                .with_vertex_color()
                .with_shininess(8.0)
                .into(),
        ];
        let geometry = full_geometry();

        for shape in [
            (LightingModel::PerFragment, false),
            (LightingModel::PerFragment, true),
            (LightingModel::PerVertex, true),
        ] {
            let generator = ProgramGenerator::new(
                GeneratorConfig {
                    lighting_model: shape.0,
                    shadow_mapping: shape.1,
                    ..Default::default()
                },
                Arc::new(DescriptionOnlyFactory::new()),
            )
            .unwrap();

            for material in &materials {
                for pass in RenderPassKind::ALL {
                    let program = generator
                        .generate_program(&ProgramRequest::new(
                            "mesh",
                            pass,
                            Some(material),
                            &geometry,
                        ))
                        .unwrap();

                    for shader in [program.vertex(), program.fragment()] {
                        let mut bindings = HashSet::new();
                        let mut locations = HashSet::new();
                        for declaration in shader.declarations() {
                            if let Some(binding) = declaration.resource_binding() {
                                assert!(bindings.insert(binding), "{:?} bound twice", binding);
                            }
                            if let Some((direction, range)) = declaration.interface_locations()
                            {
                                for location in range {
                                    assert!(
                                        locations.insert((direction, location)),
                                        "{:?} location {} used twice",
                                        direction,
                                        location
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn fragment_inputs_match_vertex_outputs() {
        let generator = generator();
        let mut textures = TextureRegistry::new();
        let material = full_material(&mut textures);
        let geometry = full_geometry();
        for pass in RenderPassKind::ALL {
            let program = generator
                .generate_program(&ProgramRequest::new("mesh", pass, Some(&material), &geometry))
                .unwrap();
            let outputs: Vec<_> = program
                .vertex()
                .declarations()
                .iter()
                .filter(|declaration| matches!(declaration, Declaration::StageOutput(_)))
                .filter_map(Declaration::interface_locations)
                .collect();
            let inputs: Vec<_> = program
                .fragment()
                .declarations()
                .iter()
                .filter(|declaration| matches!(declaration, Declaration::StageInput(_)))
                .filter_map(Declaration::interface_locations)
                .collect();
            assert_eq!(outputs.len(), inputs.len());
            for ((out_direction, out_range), (in_direction, in_range)) in
                outputs.iter().zip(&inputs)
            {
                assert_eq!(*out_direction, InterfaceDirection::Out);
                assert_eq!(*in_direction, InterfaceDirection::In);
                assert_eq!(out_range, in_range);
            }
            for output in program.vertex().stage_outputs() {
                assert!(
                    program
                        .fragment()
                        .stage_inputs()
                        .any(|input| *input == output.matching_input())
                );
            }
        }
    }

    #[test]
    fn obtaining_program_twice_gives_cached_program() {
        let generator = generator();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let request =
            ProgramRequest::new("mesh", RenderPassKind::PointLightPass, Some(&material), &geometry);
        let first = generator.obtain_program(&request).unwrap();
        let second = generator.obtain_program(&request).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(generator.program_cache().len(), 1);
    }

    #[test]
    fn materials_with_same_structure_share_layouts() {
        let generator = generator();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let first = red_diffuse();
        let second: Material = StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                Component::Color(Vector4::new(0.0, 0.0, 1.0, 1.0)),
            )
            .unwrap()
            .into();
        let a = generator
            .obtain_program(&ProgramRequest::new(
                "a",
                RenderPassKind::AmbientPass,
                Some(&first),
                &geometry,
            ))
            .unwrap();
        let b = generator
            .obtain_program(&ProgramRequest::new(
                "b",
                RenderPassKind::AmbientPass,
                Some(&second),
                &geometry,
            ))
            .unwrap();
        assert!(Arc::ptr_eq(&a.set_layouts()[2], &b.set_layouts()[2]));
    }

    #[test]
    fn new_scene_generation_drops_light_pass_programs() {
        let generator = generator();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        generator.program_cache().sync_scene_generation(0);
        for pass in [RenderPassKind::AmbientPass, RenderPassKind::SpotLightPass] {
            generator
                .obtain_program(&ProgramRequest::new("mesh", pass, Some(&material), &geometry))
                .unwrap();
        }
        assert_eq!(generator.program_cache().sync_scene_generation(1), 1);
        assert_eq!(generator.program_cache().len(), 1);
    }

    #[test]
    fn missing_normals_in_light_pass_fails_without_caching() {
        let generator = generator();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("flat", GeometryFlags::empty());
        let error = generator
            .obtain_program(&ProgramRequest::new(
                "mesh",
                RenderPassKind::PointLightPass,
                Some(&material),
                &geometry,
            ))
            .unwrap_err();
        assert!(format!("{:#}", error).contains("flat"));
        assert!(generator.program_cache().is_empty());
        assert!(generator.layout_cache().is_empty());
    }

    #[test]
    fn failing_pipeline_layout_creation_removes_created_set_layouts() {
        let generator = ProgramGenerator::new(
            GeneratorConfig::default(),
            Arc::new(FailingPipelineLayoutFactory::default()),
        )
        .unwrap();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        assert!(
            generator
                .obtain_program(&ProgramRequest::new(
                    "mesh",
                    RenderPassKind::DirectionalLightPass,
                    Some(&material),
                    &geometry,
                ))
                .is_err()
        );
        assert!(generator.layout_cache().is_empty());
        assert!(generator.program_cache().is_empty());
    }

    #[test]
    fn material_without_components_fails_without_caching() {
        let generator = generator();
        let material: Material = StandardMaterial::new().into();
        let geometry = full_geometry();
        for pass in RenderPassKind::ALL {
            assert!(
                generator
                    .obtain_program(&ProgramRequest::new("mesh", pass, Some(&material), &geometry))
                    .is_err()
            );
        }
        assert!(generator.program_cache().is_empty());
        assert!(generator.layout_cache().is_empty());
    }

    #[test]
    fn failing_source_dump_leaves_no_layouts_cached() {
        let file = std::env::temp_dir().join(format!("saphir_dump_file_{}", std::process::id()));
        std::fs::write(&file, "").unwrap();
        let generator = ProgramGenerator::new(
            GeneratorConfig {
                source_dump_directory: Some(file.join("shaders")),
                ..Default::default()
            },
            Arc::new(DescriptionOnlyFactory::new()),
        )
        .unwrap();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);

        let result = generator.obtain_program(&ProgramRequest::new(
            "mesh",
            RenderPassKind::DirectionalLightPass,
            Some(&material),
            &geometry,
        ));
        let overlay = generator.obtain_overlay_program(ColorConversion::None);
        std::fs::remove_file(&file).unwrap();

        assert!(result.is_err());
        assert!(overlay.is_err());
        assert!(generator.layout_cache().is_empty());
        assert!(generator.program_cache().is_empty());
    }

    #[test]
    fn light_pass_with_lighting_disabled_fails() {
        let generator = ProgramGenerator::new(
            GeneratorConfig {
                lighting: false,
                ..Default::default()
            },
            Arc::new(DescriptionOnlyFactory::new()),
        )
        .unwrap();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        assert!(
            generator
                .generate_program(&ProgramRequest::new(
                    "mesh",
                    RenderPassKind::PointLightPass,
                    Some(&material),
                    &geometry,
                ))
                .is_err()
        );
        assert!(
            generator
                .generate_program(&ProgramRequest::new(
                    "mesh",
                    RenderPassKind::AmbientPass,
                    Some(&material),
                    &geometry,
                ))
                .is_ok()
        );
    }

    #[test]
    fn program_without_material_outputs_fallback_color() {
        let generator = generator();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let program = generator
            .generate_program(&ProgramRequest::new(
                "mesh",
                RenderPassKind::PointLightPassNoShadow,
                None,
                &geometry,
            ))
            .unwrap();
        assert!(
            program
                .fragment()
                .source()
                .contains("svOutputFragment = vec4(1.0, 0.0, 1.0, 1.0);")
        );
        assert_eq!(program.layout().set_layouts.len(), 2);
    }

    #[test]
    fn instanced_request_reads_model_matrix_attribute() {
        let generator = generator();
        let material = red_diffuse();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let program = generator
            .generate_program(
                &ProgramRequest::new("mesh", RenderPassKind::AmbientPass, Some(&material), &geometry)
                    .instanced(),
            )
            .unwrap();
        assert!(program.vertex().source().contains("vaModelMatrix"));
        assert_eq!(count(program.vertex().source(), "gl_Position = "), 1);
    }

    #[test]
    fn blending_material_gives_alpha_blending_in_ambient_pass() {
        let generator = generator();
        let material: Material = StandardMaterial::new()
            .with_component(MaterialSlot::Opacity, Component::Value(0.5))
            .unwrap()
            .with_blending(true)
            .into();
        let geometry = GeometryDescription::new("plain", GeometryFlags::NORMALS);
        let program = generator
            .generate_program(&ProgramRequest::new(
                "mesh",
                RenderPassKind::AmbientPass,
                Some(&material),
                &geometry,
            ))
            .unwrap();
        assert_eq!(
            program.pipeline_state().blending,
            crate::render_pass::Blending::Alpha
        );
    }
}
