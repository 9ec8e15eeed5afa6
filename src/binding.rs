//! Descriptor set and push constant layouts derived from generated shaders.
//!
//! Resources are grouped into sets with fixed indices, listed in the
//! canonical order [`SetKind::PerView`], [`SetKind::PerLight`],
//! [`SetKind::PerModelLayer`]. A pipeline layout built from the
//! [`PipelineLayoutDescription`] returned by [`allocate_pipeline_layout`]
//! therefore always agrees with the bindings the shaders declare.

use crate::{
    declaration::{PushConstantBlock, ResourceBinding, Sampler, UniformBlock},
    glsl::SamplerType,
    stage::GeneratedShader,
};
use anyhow::{Context, Result, bail};
use bitflags::bitflags;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};

bitflags! {
    /// The shader stages a resource is visible to.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX                  = 0x01;
        const TESSELLATION_CONTROL    = 0x02;
        const TESSELLATION_EVALUATION = 0x04;
        const GEOMETRY                = 0x08;
        const FRAGMENT                = 0x10;
    }
}

/// Stages every descriptor binding is visible to. Set layouts are shared
/// between programs by structural identifier, so visibility can not depend
/// on which stages of a particular program read a resource.
pub const DESCRIPTOR_STAGES: ShaderStageFlags =
    ShaderStageFlags::VERTEX.union(ShaderStageFlags::FRAGMENT);

/// Identifier of the layout standing in for a set without resources.
pub const EMPTY_SET_IDENTIFIER: &str = "Empty";

/// A logical group of resources with a fixed set index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SetKind {
    PerView,
    PerLight,
    PerModelLayer,
}

/// A set enabled for a generation pass, with the structural identifier its
/// layout is shared under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetAssignment {
    pub kind: SetKind,
    pub identifier: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DescriptorType {
    UniformBuffer,
    /// A uniform buffer bound at an offset given when the set is bound.
    UniformBufferDynamic,
    CombinedImageSampler(SamplerType),
}

/// One binding in a descriptor set layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub name: String,
    pub descriptor_type: DescriptorType,
    pub stage_flags: ShaderStageFlags,
}

/// The bindings of one descriptor set layout, in ascending binding order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct DescriptorSetLayoutDescription {
    pub identifier: String,
    pub bindings: Vec<DescriptorBinding>,
}

/// A byte range of push constants and the stages reading it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PushConstantRange {
    pub name: String,
    pub stage_flags: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// Everything needed to create a pipeline layout: one descriptor set layout
/// per set index from zero up to the highest enabled set, and the push
/// constant ranges.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PipelineLayoutDescription {
    pub set_layouts: Vec<DescriptorSetLayoutDescription>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl SetKind {
    pub const ALL: [Self; 3] = [Self::PerView, Self::PerLight, Self::PerModelLayer];

    /// Returns the fixed set index.
    pub const fn index(&self) -> u32 {
        match self {
            Self::PerView => 0,
            Self::PerLight => 1,
            Self::PerModelLayer => 2,
        }
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.index() == index)
    }
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PerView => "PerView",
            Self::PerLight => "PerLight",
            Self::PerModelLayer => "PerModelLayer",
        };
        f.write_str(name)
    }
}

impl SetAssignment {
    pub fn new(kind: SetKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl DescriptorType {
    fn of_uniform_block(block: &UniformBlock) -> Self {
        if block.has_dynamic_offset() {
            Self::UniformBufferDynamic
        } else {
            Self::UniformBuffer
        }
    }
}

impl DescriptorSetLayoutDescription {
    /// Creates the description of a layout without bindings.
    pub fn empty() -> Self {
        Self {
            identifier: EMPTY_SET_IDENTIFIER.to_string(),
            bindings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|entry| entry.binding == binding)
    }
}

impl PipelineLayoutDescription {
    /// Returns the layout of the set with the given index.
    pub fn set_layout(&self, set: u32) -> Option<&DescriptorSetLayoutDescription> {
        self.set_layouts.get(set as usize)
    }

    /// Returns the total number of bytes of push constants.
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_ranges
            .iter()
            .map(|range| range.offset + range.size)
            .max()
            .unwrap_or(0)
    }
}

struct CollectedResource {
    name: String,
    descriptor_type: DescriptorType,
    declaration: BoundDeclaration,
    declaring_stages: ShaderStageFlags,
}

/// The full declaration of a resource, which must be identical in every
/// stage declaring it.
#[derive(Clone, Debug, PartialEq, Eq)]
enum BoundDeclaration {
    Block(UniformBlock),
    Sampler(Sampler),
}

/// Assigns the resources and push constant blocks declared by the given
/// shaders to a pipeline layout.
///
/// Resources are merged across stages by set and binding. Every enabled set
/// gets a layout with the identifier it was assigned, or an empty layout if
/// no shader declares anything in it, as does every set index below the
/// highest enabled set. Push constant blocks are merged across stages by
/// instance name and laid out back to back in the order they are first
/// declared.
///
/// # Errors
/// Returns an error if
/// - two sets are assigned the same kind.
/// - a resource is declared in a set that is not enabled.
/// - stages declare different resources at the same set and binding.
/// - stages declare different push constant blocks with the same name.
/// - a push constant block does not start at the offset of its range.
pub fn allocate_pipeline_layout(
    shaders: &[&GeneratedShader],
    sets: &[SetAssignment],
) -> Result<PipelineLayoutDescription> {
    let mut identifiers = BTreeMap::new();
    for assignment in sets {
        if identifiers
            .insert(assignment.kind.index(), assignment.identifier.as_str())
            .is_some()
        {
            bail!("Set {} enabled twice", assignment.kind);
        }
    }

    let resources = collect_resources(shaders)?;

    for binding in resources.keys() {
        if !identifiers.contains_key(&binding.set) {
            let resource = &resources[binding];
            bail!(
                "`{}` is declared in set {} which is not enabled",
                resource.name,
                SetKind::from_index(binding.set)
                    .map_or_else(|| binding.set.to_string(), |kind| kind.to_string())
            );
        }
    }

    let n_sets = identifiers.keys().next_back().map_or(0, |&set| set + 1);
    let set_layouts = (0..n_sets)
        .map(|set| {
            let bindings: Vec<_> = resources
                .iter()
                .filter(|(binding, _)| binding.set == set)
                .map(|(binding, resource)| DescriptorBinding {
                    binding: binding.binding,
                    name: resource.name.clone(),
                    descriptor_type: resource.descriptor_type,
                    stage_flags: DESCRIPTOR_STAGES,
                })
                .collect();
            match identifiers.get(&set) {
                Some(identifier) if !bindings.is_empty() => DescriptorSetLayoutDescription {
                    identifier: identifier.to_string(),
                    bindings,
                },
                _ => DescriptorSetLayoutDescription::empty(),
            }
        })
        .collect();

    let push_constant_ranges = allocate_push_constant_ranges(shaders)?;

    Ok(PipelineLayoutDescription {
        set_layouts,
        push_constant_ranges,
    })
}

fn collect_resources(
    shaders: &[&GeneratedShader],
) -> Result<BTreeMap<ResourceBinding, CollectedResource>> {
    let mut resources: BTreeMap<ResourceBinding, CollectedResource> = BTreeMap::new();

    for shader in shaders {
        let stage = shader.kind().flags();
        let declared = shader
            .uniform_blocks()
            .map(|block| {
                (
                    block.resource_binding(),
                    block.instance_name(),
                    DescriptorType::of_uniform_block(block),
                    BoundDeclaration::Block(block.clone()),
                )
            })
            .chain(shader.samplers().map(|sampler| {
                (
                    sampler.resource_binding(),
                    sampler.name(),
                    DescriptorType::CombinedImageSampler(sampler.sampler_type()),
                    BoundDeclaration::Sampler(sampler.clone()),
                )
            }));

        for (binding, name, descriptor_type, declaration) in declared {
            match resources.get_mut(&binding) {
                Some(existing) => {
                    if existing.name != name || existing.descriptor_type != descriptor_type {
                        bail!(
                            "`{}` in {} stage `{}` and `{}` are both bound at set {} binding {}",
                            name,
                            shader.kind(),
                            shader.name(),
                            existing.name,
                            binding.set,
                            binding.binding
                        );
                    }
                    if existing.declaration != declaration {
                        bail!(
                            "`{}` in {} stage `{}` differs from its declaration in another stage",
                            name,
                            shader.kind(),
                            shader.name()
                        );
                    }
                    existing.declaring_stages |= stage;
                }
                None => {
                    resources.insert(
                        binding,
                        CollectedResource {
                            name: name.to_string(),
                            descriptor_type,
                            declaration,
                            declaring_stages: stage,
                        },
                    );
                }
            }
        }
    }

    for resource in resources.values() {
        if !DESCRIPTOR_STAGES.contains(resource.declaring_stages) {
            bail!(
                "`{}` is declared in stages {:?} outside of descriptor visibility",
                resource.name,
                resource.declaring_stages
            );
        }
    }

    Ok(resources)
}

fn allocate_push_constant_ranges(shaders: &[&GeneratedShader]) -> Result<Vec<PushConstantRange>> {
    let mut ranges: Vec<(PushConstantBlock, PushConstantRange)> = Vec::new();
    let mut offset = 0;

    for shader in shaders {
        for block in shader.push_constant_blocks() {
            let stage = shader.kind().flags();
            if let Some((existing, range)) = ranges
                .iter_mut()
                .find(|(existing, _)| existing.instance_name() == block.instance_name())
            {
                if existing != block {
                    bail!(
                        "Push constant block `{}` in {} stage `{}` differs from the one in another stage",
                        block.instance_name(),
                        shader.kind(),
                        shader.name()
                    );
                }
                range.stage_flags |= stage;
                continue;
            }

            if block.base_offset() != offset {
                bail!(
                    "Push constant block `{}` starts at offset {} but its range starts at {}",
                    block.instance_name(),
                    block.base_offset(),
                    offset
                );
            }
            let size = u32::try_from(block.layout().size()).with_context(|| {
                format!(
                    "Push constant block `{}` is too large",
                    block.instance_name()
                )
            })?;

            ranges.push((
                block.clone(),
                PushConstantRange {
                    name: block.instance_name().to_string(),
                    stage_flags: stage,
                    offset,
                    size,
                },
            ));
            offset += size;
        }
    }

    Ok(ranges.into_iter().map(|(_, range)| range).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        code::CodeZone,
        declaration::Sampler,
        glsl::GlslType,
        stage::{GlslHeader, ShaderStage, ShaderStageKind},
    };

    fn vertex_shader(declare: impl FnOnce(&mut ShaderStage)) -> GeneratedShader {
        let mut stage = ShaderStage::new(ShaderStageKind::Vertex, "test", GlslHeader::default());
        declare(&mut stage);
        stage.code(CodeZone::Output).line("gl_Position = vec4(0.0);");
        stage.finish().unwrap()
    }

    fn fragment_shader(declare: impl FnOnce(&mut ShaderStage)) -> GeneratedShader {
        let mut stage = ShaderStage::new(ShaderStageKind::Fragment, "test", GlslHeader::default());
        declare(&mut stage);
        stage.declare_default_output_fragment().unwrap();
        stage.finish().unwrap()
    }

    fn material_block() -> UniformBlock {
        UniformBlock::new(2, 0, "MaterialBlock", "ubMaterial")
            .with_member(GlslType::Vec4, "diffuseColor")
            .unwrap()
            .with_dynamic_offset()
    }

    fn matrices_block() -> PushConstantBlock {
        PushConstantBlock::new("MatricesBlock", "pcMatrices")
            .with_member(GlslType::Mat4, "modelViewProjectionMatrix")
            .unwrap()
    }

    #[test]
    fn set_indices_are_fixed() {
        assert_eq!(SetKind::PerView.index(), 0);
        assert_eq!(SetKind::PerLight.index(), 1);
        assert_eq!(SetKind::PerModelLayer.index(), 2);
        assert_eq!(SetKind::from_index(2), Some(SetKind::PerModelLayer));
        assert_eq!(SetKind::from_index(3), None);
    }

    #[test]
    fn unused_sets_below_highest_enabled_set_get_empty_layouts() {
        let vertex = vertex_shader(|stage| stage.declare(matrices_block()).unwrap());
        let fragment = fragment_shader(|stage| stage.declare(material_block()).unwrap());
        let layout = allocate_pipeline_layout(
            &[&vertex, &fragment],
            &[
                SetAssignment::new(SetKind::PerView, "View"),
                SetAssignment::new(SetKind::PerModelLayer, "StandardMaterial[DiffuseColor]"),
            ],
        )
        .unwrap();

        assert_eq!(layout.set_layouts.len(), 3);
        assert!(layout.set_layouts[0].is_empty());
        assert_eq!(layout.set_layouts[0].identifier, EMPTY_SET_IDENTIFIER);
        assert!(layout.set_layouts[1].is_empty());
        assert_eq!(
            layout.set_layouts[2].identifier,
            "StandardMaterial[DiffuseColor]"
        );
        assert_eq!(
            layout.set_layouts[2].bindings,
            vec![DescriptorBinding {
                binding: 0,
                name: "ubMaterial".to_string(),
                descriptor_type: DescriptorType::UniformBufferDynamic,
                stage_flags: DESCRIPTOR_STAGES,
            }]
        );
    }

    #[test]
    fn resources_are_merged_across_stages_in_binding_order() {
        let light_block = UniformBlock::new(1, 0, "PointLightBlock", "ubLight")
            .with_member(GlslType::Vec4, "diffuseColor")
            .unwrap();
        let vertex = vertex_shader(|stage| stage.declare(light_block.clone()).unwrap());
        let fragment = fragment_shader(|stage| {
            stage
                .declare(Sampler::new(1, 1, SamplerType::SamplerCube, "suShadowMap"))
                .unwrap();
            stage.declare(light_block).unwrap();
        });
        let layout = allocate_pipeline_layout(
            &[&vertex, &fragment],
            &[
                SetAssignment::new(SetKind::PerView, "View"),
                SetAssignment::new(SetKind::PerLight, "PointLight+ShadowMap"),
            ],
        )
        .unwrap();

        let bindings: Vec<_> = layout.set_layouts[1]
            .bindings
            .iter()
            .map(|binding| (binding.binding, binding.name.as_str()))
            .collect();
        assert_eq!(bindings, vec![(0, "ubLight"), (1, "suShadowMap")]);
    }

    #[test]
    fn resource_in_disabled_set_fails() {
        let vertex = vertex_shader(|_| {});
        let fragment = fragment_shader(|stage| stage.declare(material_block()).unwrap());
        assert!(
            allocate_pipeline_layout(
                &[&vertex, &fragment],
                &[SetAssignment::new(SetKind::PerView, "View")]
            )
            .is_err()
        );
    }

    #[test]
    fn different_resources_at_same_binding_in_different_stages_fails() {
        let vertex = vertex_shader(|stage| stage.declare(material_block()).unwrap());
        let fragment = fragment_shader(|stage| {
            stage
                .declare(Sampler::new(2, 0, SamplerType::Sampler2D, "suDiffuse"))
                .unwrap();
        });
        assert!(
            allocate_pipeline_layout(
                &[&vertex, &fragment],
                &[SetAssignment::new(SetKind::PerModelLayer, "Material")]
            )
            .is_err()
        );
    }

    #[test]
    fn same_block_with_different_members_in_different_stages_fails() {
        let vertex = vertex_shader(|stage| stage.declare(material_block()).unwrap());
        let fragment = fragment_shader(|stage| {
            stage
                .declare(
                    UniformBlock::new(2, 0, "MaterialBlock", "ubMaterial")
                        .with_member(GlslType::Vec4, "diffuseColor")
                        .unwrap()
                        .with_member(GlslType::Float, "shininess")
                        .unwrap()
                        .with_dynamic_offset(),
                )
                .unwrap();
        });
        let error = allocate_pipeline_layout(
            &[&vertex, &fragment],
            &[SetAssignment::new(SetKind::PerModelLayer, "Material")],
        )
        .unwrap_err();
        assert!(error.to_string().contains("differs from its declaration"));
    }

    #[test]
    fn enabling_set_twice_fails() {
        let vertex = vertex_shader(|_| {});
        assert!(
            allocate_pipeline_layout(
                &[&vertex],
                &[
                    SetAssignment::new(SetKind::PerView, "View"),
                    SetAssignment::new(SetKind::PerView, "OtherView"),
                ]
            )
            .is_err()
        );
    }

    #[test]
    fn push_constant_ranges_accumulate_offsets() {
        let vertex = vertex_shader(|stage| stage.declare(matrices_block()).unwrap());
        let fragment = fragment_shader(|stage| {
            stage
                .declare(
                    PushConstantBlock::new("ExposureBlock", "pcExposure")
                        .with_member(GlslType::Float, "exposure")
                        .unwrap()
                        .with_base_offset(64),
                )
                .unwrap();
        });
        let layout = allocate_pipeline_layout(&[&vertex, &fragment], &[]).unwrap();
        assert_eq!(
            layout.push_constant_ranges,
            vec![
                PushConstantRange {
                    name: "pcMatrices".to_string(),
                    stage_flags: ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: 64,
                },
                PushConstantRange {
                    name: "pcExposure".to_string(),
                    stage_flags: ShaderStageFlags::FRAGMENT,
                    offset: 64,
                    size: 4,
                },
            ]
        );
        assert_eq!(layout.push_constant_size(), 68);
        assert!(layout.set_layouts.is_empty());
    }

    #[test]
    fn push_constant_block_shared_by_stages_gets_one_range() {
        let vertex = vertex_shader(|stage| stage.declare(matrices_block()).unwrap());
        let fragment = fragment_shader(|stage| stage.declare(matrices_block()).unwrap());
        let layout = allocate_pipeline_layout(&[&vertex, &fragment], &[]).unwrap();
        assert_eq!(layout.push_constant_ranges.len(), 1);
        assert_eq!(
            layout.push_constant_ranges[0].stage_flags,
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn push_constant_block_at_wrong_offset_fails() {
        let vertex = vertex_shader(|stage| {
            stage
                .declare(matrices_block().with_base_offset(16))
                .unwrap();
        });
        assert!(allocate_pipeline_layout(&[&vertex], &[]).is_err());
    }
}
