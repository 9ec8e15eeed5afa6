//! Storage of the lights in a scene.

use crate::{
    light::{
        DirectionalLightUniform, LightKind, LightVariant, PointLightUniform,
        ShadowableDirectionalLightUniform, ShadowableSpotLightUniform, SpotLightUniform,
    },
    uniform::SharedUniformBufferRegistry,
};
use anyhow::{Result, anyhow, bail};
use bytemuck::{Pod, Zeroable};
use nalgebra::{Isometry3, Matrix4, Point3, UnitVector3, Vector3};
use saphir_utils::StringHash;
use std::{collections::HashMap, fmt};

/// Identifier for a light in a [`LightStorage`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct LightId(u32);

/// A light infinitely far away, shining in one direction.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    pub diffuse_color: Vector3<f32>,
    pub specular_color: Vector3<f32>,
    pub direction: UnitVector3<f32>,
    /// Transform from world space into the clip space of the shadow map, for
    /// lights casting shadows.
    pub shadow_transform: Option<Matrix4<f32>>,
}

/// A light shining in all directions from a point, reaching out to a finite
/// radius.
#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub diffuse_color: Vector3<f32>,
    pub specular_color: Vector3<f32>,
    pub position: Point3<f32>,
    pub radius: f32,
    pub casts_shadows: bool,
}

/// A light shining in a cone from a point. The light falls off between the
/// inner and outer angle of the cone.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    pub diffuse_color: Vector3<f32>,
    pub specular_color: Vector3<f32>,
    pub position: Point3<f32>,
    pub direction: UnitVector3<f32>,
    pub radius: f32,
    /// Half-angles of the cone in radians.
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub shadow_transform: Option<Matrix4<f32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

/// Container for all lights in a scene.
///
/// The uniform data of every light is kept in a shared uniform buffer for
/// its [`LightVariant`], where the light owns a stable slot. Each buffer
/// holds a bounded number of lights. Every change to the set of lights or
/// their properties bumps the scene generation, which programs generated for
/// the previous state of the scene can be checked against.
#[derive(Debug)]
pub struct LightStorage {
    uniform_buffers: SharedUniformBufferRegistry<LightId>,
    lights: HashMap<LightId, Light>,
    view_transform: Isometry3<f32>,
    max_lights_per_type: usize,
    light_id_counter: u32,
    generation: u64,
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Light {
    pub fn kind(&self) -> LightKind {
        match self {
            Self::Directional(_) => LightKind::Directional,
            Self::Point(_) => LightKind::Point,
            Self::Spot(_) => LightKind::Spot,
        }
    }

    /// Returns the variant of the light, which decides the layout of its
    /// uniform data.
    pub fn variant(&self) -> LightVariant {
        let shadowed = match self {
            Self::Directional(light) => light.shadow_transform.is_some(),
            Self::Point(light) => light.casts_shadows,
            Self::Spot(light) => light.shadow_transform.is_some(),
        };
        LightVariant::new(self.kind(), shadowed)
    }

    /// Checks that the properties of the light are physically meaningful.
    ///
    /// # Errors
    /// Returns an error if a radius is not positive or if the cone angles of
    /// a spot light are not ordered within a half turn.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Directional(_) => Ok(()),
            Self::Point(light) => validate_radius(light.radius),
            Self::Spot(light) => {
                validate_radius(light.radius)?;
                if !(0.0 <= light.inner_angle
                    && light.inner_angle < light.outer_angle
                    && light.outer_angle < std::f32::consts::FRAC_PI_2)
                {
                    bail!(
                        "Invalid spot light cone angles {} and {}",
                        light.inner_angle,
                        light.outer_angle
                    );
                }
                Ok(())
            }
        }
    }

    /// Returns the bytes of the uniform data of the light, with view space
    /// quantities computed with the given view transform.
    pub fn uniform_bytes(&self, view_transform: &Isometry3<f32>) -> Vec<u8> {
        match self {
            Self::Directional(light) => {
                let uniform = DirectionalLightUniform {
                    diffuse_color: light.diffuse_color.push(1.0),
                    specular_color: light.specular_color.push(1.0),
                    direction_world_space: light.direction.to_homogeneous(),
                    direction_view_space: view_transform
                        .transform_vector(&light.direction)
                        .to_homogeneous(),
                };
                match light.shadow_transform {
                    Some(light_matrix) => bytemuck::bytes_of(&ShadowableDirectionalLightUniform {
                        light: uniform,
                        light_matrix,
                    })
                    .to_vec(),
                    None => bytemuck::bytes_of(&uniform).to_vec(),
                }
            }
            Self::Point(light) => bytemuck::bytes_of(&PointLightUniform {
                diffuse_color: light.diffuse_color.push(1.0),
                specular_color: light.specular_color.push(1.0),
                position_world_space: light.position.to_homogeneous(),
                position_view_space: view_transform
                    .transform_point(&light.position)
                    .to_homogeneous(),
                radius: light.radius,
                _padding: [0.0; 3],
            })
            .to_vec(),
            Self::Spot(light) => {
                let uniform = SpotLightUniform {
                    diffuse_color: light.diffuse_color.push(1.0),
                    specular_color: light.specular_color.push(1.0),
                    position_world_space: light.position.to_homogeneous(),
                    position_view_space: view_transform
                        .transform_point(&light.position)
                        .to_homogeneous(),
                    direction_world_space: light.direction.to_homogeneous(),
                    direction_view_space: view_transform
                        .transform_vector(&light.direction)
                        .to_homogeneous(),
                    radius: light.radius,
                    inner_cos_angle: light.inner_angle.cos(),
                    outer_cos_angle: light.outer_angle.cos(),
                    _padding: 0.0,
                };
                match light.shadow_transform {
                    Some(light_matrix) => bytemuck::bytes_of(&ShadowableSpotLightUniform {
                        light: uniform,
                        light_matrix,
                    })
                    .to_vec(),
                    None => bytemuck::bytes_of(&uniform).to_vec(),
                }
            }
        }
    }
}

fn validate_radius(radius: f32) -> Result<()> {
    if radius > 0.0 && radius.is_finite() {
        Ok(())
    } else {
        Err(anyhow!("Invalid light radius {}", radius))
    }
}

impl LightStorage {
    /// Creates a new empty light storage whose buffers place lights at
    /// multiples of `block_aligned_size` and hold at most
    /// `max_lights_per_type` lights each.
    pub fn new(block_aligned_size: usize, max_lights_per_type: usize) -> Self {
        Self {
            uniform_buffers: SharedUniformBufferRegistry::new(
                block_aligned_size,
                max_lights_per_type,
            ),
            lights: HashMap::new(),
            view_transform: Isometry3::identity(),
            max_lights_per_type,
            light_id_counter: 0,
            generation: 0,
        }
    }

    /// Returns the scene generation, which changes whenever a light is added,
    /// updated or removed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn max_lights_per_type(&self) -> usize {
        self.max_lights_per_type
    }

    /// Returns the total number of lights.
    pub fn n_lights(&self) -> usize {
        self.lights.len()
    }

    /// Returns the number of lights of the given variant.
    pub fn n_lights_of_variant(&self, variant: LightVariant) -> usize {
        self.uniform_buffers
            .with_buffer(buffer_identifier(variant), |buffer| buffer.n_elements())
            .unwrap_or(0)
    }

    pub fn light(&self, light_id: LightId) -> Option<&Light> {
        self.lights.get(&light_id)
    }

    /// Returns the slot of the light with the given ID in the buffer of its
    /// variant.
    pub fn light_slot(&self, light_id: LightId) -> Option<usize> {
        let variant = self.lights.get(&light_id)?.variant();
        self.uniform_buffers
            .with_buffer(buffer_identifier(variant), |buffer| buffer.slot(light_id))
            .flatten()
    }

    /// Returns the byte offset of the uniform data of the light with the
    /// given ID in the buffer of its variant.
    pub fn light_offset(&self, light_id: LightId) -> Option<usize> {
        let variant = self.lights.get(&light_id)?.variant();
        self.uniform_buffers
            .with_buffer(buffer_identifier(variant), |buffer| {
                buffer.slot(light_id).map(|slot| buffer.element_offset(slot))
            })
            .flatten()
    }

    /// Calls the given closure with the raw bytes of the buffer holding the
    /// lights of the given variant, if there are any.
    pub fn with_buffer_bytes<R>(
        &self,
        variant: LightVariant,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Option<R> {
        self.uniform_buffers
            .with_buffer(buffer_identifier(variant), |buffer| f(buffer.raw_bytes()))
    }

    /// Adds the given light to the storage.
    ///
    /// # Returns
    /// A new [`LightId`] representing the added light.
    ///
    /// # Errors
    /// Returns an error if the light is invalid or if the storage already
    /// holds the maximum number of lights of its variant.
    pub fn add_light(&mut self, light: Light) -> Result<LightId> {
        light.validate()?;
        let variant = light.variant();

        if self.n_lights_of_variant(variant) >= self.max_lights_per_type {
            log::warn!(
                "Rejecting {} light: limit of {} reached",
                variant,
                self.max_lights_per_type
            );
            bail!(
                "Can not add more than {} lights of type {}",
                self.max_lights_per_type,
                variant
            );
        }

        let light_id = self.create_new_light_id()?;
        let bytes = light.uniform_bytes(&self.view_transform);
        let identifier = buffer_identifier(variant);

        let slot = self
            .uniform_buffers
            .register(identifier, bytes.len(), light_id)?;
        self.uniform_buffers.write(identifier, slot, &bytes)?;

        log::debug!("Added {} light {} in slot {}", variant, light_id, slot);
        self.lights.insert(light_id, light);
        self.generation += 1;
        Ok(light_id)
    }

    /// Replaces the properties of the light with the given ID.
    ///
    /// # Errors
    /// Returns an error if no light with the ID exists, if the new light is
    /// invalid or if it is of a different variant than the old one.
    pub fn update_light(&mut self, light_id: LightId, light: Light) -> Result<()> {
        light.validate()?;
        let existing = self
            .lights
            .get_mut(&light_id)
            .ok_or_else(|| anyhow!("No light with ID {}", light_id))?;

        let variant = existing.variant();
        if light.variant() != variant {
            bail!(
                "Can not change light {} from {} to {}",
                light_id,
                variant,
                light.variant()
            );
        }

        let identifier = buffer_identifier(variant);
        let slot = self
            .uniform_buffers
            .with_buffer(identifier, |buffer| buffer.slot(light_id))
            .flatten()
            .ok_or_else(|| anyhow!("Light {} has no uniform slot", light_id))?;
        self.uniform_buffers
            .write(identifier, slot, &light.uniform_bytes(&self.view_transform))?;

        *existing = light;
        self.generation += 1;
        Ok(())
    }

    /// Removes the light with the given ID from the storage. The slots of
    /// other lights are not affected.
    ///
    /// # Errors
    /// Returns an error if no light with the ID exists.
    pub fn remove_light(&mut self, light_id: LightId) -> Result<Light> {
        let light = self
            .lights
            .remove(&light_id)
            .ok_or_else(|| anyhow!("No light with ID {}", light_id))?;
        self.uniform_buffers
            .deregister(buffer_identifier(light.variant()), light_id)?;
        self.generation += 1;
        Ok(light)
    }

    /// Sets the transform from world to view space and rewrites the view
    /// space quantities of every light. This does not change which programs
    /// are needed, so the scene generation is unaffected.
    ///
    /// # Errors
    /// Returns an error if the uniform data of a light can not be written.
    pub fn set_view_transform(&mut self, view_transform: Isometry3<f32>) -> Result<()> {
        self.view_transform = view_transform;
        for (&light_id, light) in &self.lights {
            let identifier = buffer_identifier(light.variant());
            let slot = self
                .uniform_buffers
                .with_buffer(identifier, |buffer| buffer.slot(light_id))
                .flatten()
                .ok_or_else(|| anyhow!("Light {} has no uniform slot", light_id))?;
            self.uniform_buffers
                .write(identifier, slot, &light.uniform_bytes(&view_transform))?;
        }
        Ok(())
    }

    fn create_new_light_id(&mut self) -> Result<LightId> {
        let light_id = LightId(self.light_id_counter);
        self.light_id_counter = self
            .light_id_counter
            .checked_add(1)
            .ok_or_else(|| anyhow!("Ran out of light IDs"))?;
        Ok(light_id)
    }
}

fn buffer_identifier(variant: LightVariant) -> StringHash {
    StringHash::of_owned(variant.buffer_identifier())
}
