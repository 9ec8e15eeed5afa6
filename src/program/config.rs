//! Configuration of program generation.

use crate::{
    light::{LightSetShape, LightingModel},
    stage::GlslHeader,
};
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration options for program generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// The GLSL version in the `#version` line.
    pub glsl_version: u32,
    pub profile: String,
    /// Extension names paired with their behavior, e.g. `enable`.
    pub extensions: Vec<(String, String)>,
    /// The alignment of elements in shared uniform buffers, as reported by
    /// the device for uniform buffer offsets.
    pub block_aligned_size: usize,
    pub max_lights_per_type: usize,
    /// Whether light passes are generated at all.
    pub lighting: bool,
    pub lighting_model: LightingModel,
    /// Whether shadowed light passes sample shadow maps.
    pub shadow_mapping: bool,
    /// Directory to write the source of every generated stage to.
    pub source_dump_directory: Option<PathBuf>,
}

impl GeneratorConfig {
    /// Checks that the configuration can be used for generation.
    ///
    /// # Errors
    /// Returns an error if the block aligned size is not a non-zero power of
    /// two or if no lights are allowed.
    pub fn validate(&self) -> Result<()> {
        if !self.block_aligned_size.is_power_of_two() {
            bail!(
                "Block aligned size must be a non-zero power of two, got {}",
                self.block_aligned_size
            );
        }
        if self.max_lights_per_type == 0 {
            bail!("Maximum number of lights per type must be positive");
        }
        Ok(())
    }

    pub fn glsl_header(&self) -> GlslHeader {
        GlslHeader {
            version: self.glsl_version,
            profile: self.profile.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Returns the shape of the light set programs are generated for.
    pub fn light_set_shape(&self) -> LightSetShape {
        if self.lighting {
            LightSetShape::new(self.lighting_model, self.shadow_mapping)
        } else {
            LightSetShape::disabled()
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let header = GlslHeader::default();
        Self {
            glsl_version: header.version,
            profile: header.profile,
            extensions: header.extensions,
            block_aligned_size: 256,
            max_lights_per_type: 64,
            lighting: true,
            lighting_model: LightingModel::PerFragment,
            shadow_mapping: false,
            source_dump_directory: None,
        }
    }
}
