//! Uniform data shared by everything rendered from one view.

use crate::{
    declaration::UniformBlock,
    glsl::{GlslType, block},
    uniform::UniformMirror,
};
use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use std::mem;

/// Set holding the per-view resources.
pub const VIEW_SET: u32 = 0;
/// Binding of the view uniform block within [`VIEW_SET`].
pub const VIEW_BINDING: u32 = 0;
/// Identifier of the layout of [`VIEW_SET`].
pub const VIEW_SET_IDENTIFIER: &str = "View";

/// Per-view data passed to the GPU in the `ubView` uniform block.
///
/// The field order and padding must match [`view_uniform_block`], which is
/// checked by [`BlockLayout::verify_mirror`](crate::uniform::BlockLayout::verify_mirror).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct ViewUniform {
    projection_matrix: Matrix4<f32>,
    position_world_space: Vector4<f32>,
    velocity: Vector4<f32>,
    /// Near distance, far distance, aspect ratio and vertical field of view.
    view_properties: Vector4<f32>,
    ambient_light_color: Vector4<f32>,
    ambient_light_intensity: f32,
    // Padding to make size multiple of 16-bytes
    _padding: [f32; 3],
}

/// Returns the declaration of the `ubView` uniform block.
///
/// # Errors
/// Returns an error if the block can not be built.
pub fn view_uniform_block() -> Result<UniformBlock> {
    UniformBlock::new(VIEW_SET, VIEW_BINDING, block::VIEW_TYPE, block::VIEW)
        .with_member(GlslType::Mat4, "projectionMatrix")?
        .with_member(GlslType::Vec4, "positionWorldSpace")?
        .with_member(GlslType::Vec4, "velocity")?
        .with_member(GlslType::Vec4, "viewProperties")?
        .with_member(GlslType::Vec4, "ambientLightColor")?
        .with_member(GlslType::Float, "ambientLightIntensity")
}

impl ViewUniform {
    /// Creates the uniform for a camera at the given world space position
    /// with the given projection.
    pub fn new(
        projection_matrix: Matrix4<f32>,
        camera_position: &Point3<f32>,
        camera_velocity: &Vector3<f32>,
        view_properties: Vector4<f32>,
    ) -> Self {
        Self {
            projection_matrix,
            position_world_space: camera_position.to_homogeneous(),
            velocity: camera_velocity.push(0.0),
            view_properties,
            ambient_light_color: Vector4::new(1.0, 1.0, 1.0, 1.0),
            ambient_light_intensity: 0.0,
            _padding: [0.0; 3],
        }
    }

    /// Sets the color and intensity of the light reaching every surface
    /// regardless of orientation.
    pub fn set_ambient_light(&mut self, color: &Vector3<f32>, intensity: f32) {
        self.ambient_light_color = color.push(1.0);
        self.ambient_light_intensity = intensity;
    }

    pub fn projection_matrix(&self) -> &Matrix4<f32> {
        &self.projection_matrix
    }

    pub fn position_world_space(&self) -> &Vector4<f32> {
        &self.position_world_space
    }
}

impl UniformMirror for ViewUniform {
    fn member_offsets() -> Vec<(&'static str, usize)> {
        vec![
            ("projectionMatrix", mem::offset_of!(Self, projection_matrix)),
            ("positionWorldSpace", mem::offset_of!(Self, position_world_space)),
            ("velocity", mem::offset_of!(Self, velocity)),
            ("viewProperties", mem::offset_of!(Self, view_properties)),
            ("ambientLightColor", mem::offset_of!(Self, ambient_light_color)),
            (
                "ambientLightIntensity",
                mem::offset_of!(Self, ambient_light_intensity),
            ),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn view_block_has_expected_offsets() {
        let layout = view_uniform_block().unwrap().layout();
        let offsets: Vec<_> = layout.members().iter().map(|member| member.offset).collect();
        assert_eq!(offsets, vec![0, 64, 80, 96, 112, 128]);
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn view_uniform_mirrors_view_block() {
        view_uniform_block()
            .unwrap()
            .layout()
            .verify_mirror::<ViewUniform>()
            .unwrap();
    }

    #[test]
    fn camera_position_is_homogeneous_point() {
        let uniform = ViewUniform::new(
            Matrix4::identity(),
            &Point3::new(1.0, 2.0, 3.0),
            &Vector3::zeros(),
            Vector4::new(0.1, 100.0, 1.0, 1.0),
        );
        assert_eq!(uniform.position_world_space(), &Vector4::new(1.0, 2.0, 3.0, 1.0));
    }
}
