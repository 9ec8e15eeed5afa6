//! Uniform blocks holding the data of a single light, and their CPU-side
//! mirrors.

use crate::{
    declaration::{Sampler, UniformBlock},
    glsl::{GlslType, SamplerType, block, sampler},
    light::{LIGHT_BINDING, LIGHT_SET, LightKind, LightVariant, SHADOW_MAP_BINDING},
    uniform::UniformMirror,
};
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector4};
use std::mem;

/// Uniform data of a directional light that casts no shadows.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct DirectionalLightUniform {
    pub diffuse_color: Vector4<f32>,
    pub specular_color: Vector4<f32>,
    pub direction_world_space: Vector4<f32>,
    pub direction_view_space: Vector4<f32>,
}

/// Uniform data of a directional light with the transform into the space of
/// its shadow map.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct ShadowableDirectionalLightUniform {
    pub light: DirectionalLightUniform,
    pub light_matrix: Matrix4<f32>,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct PointLightUniform {
    pub diffuse_color: Vector4<f32>,
    pub specular_color: Vector4<f32>,
    pub position_world_space: Vector4<f32>,
    pub position_view_space: Vector4<f32>,
    pub radius: f32,
    // Padding to make size multiple of 16-bytes
    pub _padding: [f32; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct SpotLightUniform {
    pub diffuse_color: Vector4<f32>,
    pub specular_color: Vector4<f32>,
    pub position_world_space: Vector4<f32>,
    pub position_view_space: Vector4<f32>,
    pub direction_world_space: Vector4<f32>,
    pub direction_view_space: Vector4<f32>,
    pub radius: f32,
    pub inner_cos_angle: f32,
    pub outer_cos_angle: f32,
    // Padding to make size multiple of 16-bytes
    pub _padding: f32,
}

/// Uniform data of a spot light with the transform into the space of its
/// shadow map.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct ShadowableSpotLightUniform {
    pub light: SpotLightUniform,
    pub light_matrix: Matrix4<f32>,
}

/// Returns the declaration of the `ubLight` block for the given light
/// variant. The light matrix is only included when the variant samples a
/// shadow map that needs it.
///
/// # Errors
/// Returns an error if the block can not be built.
pub fn light_uniform_block(variant: LightVariant, shadow_mapping: bool) -> Result<UniformBlock> {
    let type_name = match variant.kind {
        LightKind::Directional => block::DIRECTIONAL_LIGHT_TYPE,
        LightKind::Point => block::POINT_LIGHT_TYPE,
        LightKind::Spot => block::SPOT_LIGHT_TYPE,
    };
    let mut light_block = UniformBlock::new(LIGHT_SET, LIGHT_BINDING, type_name, block::LIGHT)
        .with_member(GlslType::Vec4, "diffuseColor")?
        .with_member(GlslType::Vec4, "specularColor")?
        .with_dynamic_offset();

    match variant.kind {
        LightKind::Directional => {
            light_block.add_member(GlslType::Vec4, "directionWorldSpace")?;
            light_block.add_member(GlslType::Vec4, "directionViewSpace")?;
        }
        LightKind::Point => {
            light_block.add_member(GlslType::Vec4, "positionWorldSpace")?;
            light_block.add_member(GlslType::Vec4, "positionViewSpace")?;
            light_block.add_member(GlslType::Float, "radius")?;
        }
        LightKind::Spot => {
            light_block.add_member(GlslType::Vec4, "positionWorldSpace")?;
            light_block.add_member(GlslType::Vec4, "positionViewSpace")?;
            light_block.add_member(GlslType::Vec4, "directionWorldSpace")?;
            light_block.add_member(GlslType::Vec4, "directionViewSpace")?;
            light_block.add_member(GlslType::Float, "radius")?;
            light_block.add_member(GlslType::Float, "innerCosAngle")?;
            light_block.add_member(GlslType::Float, "outerCosAngle")?;
        }
    }

    if variant.has_light_matrix(shadow_mapping) {
        light_block.add_member(GlslType::Mat4, "lightMatrix")?;
    }
    Ok(light_block)
}

/// Returns the declaration of the shadow map of the given kind of light.
pub fn shadow_map_sampler(kind: LightKind) -> Sampler {
    let sampler_type = match kind {
        LightKind::Directional | LightKind::Spot => SamplerType::Sampler2DShadow,
        LightKind::Point => SamplerType::SamplerCube,
    };
    Sampler::new(LIGHT_SET, SHADOW_MAP_BINDING, sampler_type, sampler::SHADOW_MAP)
}

impl UniformMirror for DirectionalLightUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("diffuseColor", mem::offset_of!(Self, diffuse_color)),
            ("specularColor", mem::offset_of!(Self, specular_color)),
            ("directionWorldSpace", mem::offset_of!(Self, direction_world_space)),
            ("directionViewSpace", mem::offset_of!(Self, direction_view_space)),
        ]
    }
}

impl UniformMirror for ShadowableDirectionalLightUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        let mut offsets = DirectionalLightUniform::member_offsets();
        offsets.push(("lightMatrix", mem::offset_of!(Self, light_matrix)));
        offsets
    }
}

impl UniformMirror for PointLightUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("diffuseColor", mem::offset_of!(Self, diffuse_color)),
            ("specularColor", mem::offset_of!(Self, specular_color)),
            ("positionWorldSpace", mem::offset_of!(Self, position_world_space)),
            ("positionViewSpace", mem::offset_of!(Self, position_view_space)),
            ("radius", mem::offset_of!(Self, radius)),
        ]
    }
}

impl UniformMirror for SpotLightUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("diffuseColor", mem::offset_of!(Self, diffuse_color)),
            ("specularColor", mem::offset_of!(Self, specular_color)),
            ("positionWorldSpace", mem::offset_of!(Self, position_world_space)),
            ("positionViewSpace", mem::offset_of!(Self, position_view_space)),
            ("directionWorldSpace", mem::offset_of!(Self, direction_world_space)),
            ("directionViewSpace", mem::offset_of!(Self, direction_view_space)),
            ("radius", mem::offset_of!(Self, radius)),
            ("innerCosAngle", mem::offset_of!(Self, inner_cos_angle)),
            ("outerCosAngle", mem::offset_of!(Self, outer_cos_angle)),
        ]
    }
}

impl UniformMirror for ShadowableSpotLightUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        let mut offsets = SpotLightUniform::member_offsets();
        offsets.push(("lightMatrix", mem::offset_of!(Self, light_matrix)));
        offsets
    }
}
