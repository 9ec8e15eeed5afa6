//! Samplers and interface variables.

use crate::{
    declaration::ResourceBinding,
    glsl::{GlslType, Interpolation, SamplerType},
};
use std::{fmt, ops::Range};

/// A combined image sampler bound at a set and binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sampler {
    set: u32,
    binding: u32,
    sampler_type: SamplerType,
    name: String,
}

/// A per-vertex attribute read by the vertex stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InputAttribute {
    location: u32,
    glsl_type: GlslType,
    name: String,
}

/// A variable passed in from the previous stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageInput {
    location: u32,
    glsl_type: GlslType,
    name: String,
    interpolation: Interpolation,
}

/// A variable passed on to the next stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StageOutput {
    location: u32,
    glsl_type: GlslType,
    name: String,
    interpolation: Interpolation,
}

/// A color output of the fragment stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputFragment {
    location: u32,
    glsl_type: GlslType,
    name: String,
}

impl Sampler {
    pub fn new(set: u32, binding: u32, sampler_type: SamplerType, name: impl Into<String>) -> Self {
        Self {
            set,
            binding,
            sampler_type,
            name: name.into(),
        }
    }

    pub fn sampler_type(&self) -> SamplerType {
        self.sampler_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_binding(&self) -> ResourceBinding {
        ResourceBinding {
            set: self.set,
            binding: self.binding,
        }
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout(set = {}, binding = {}) uniform {} {};",
            self.set, self.binding, self.sampler_type, self.name
        )
    }
}

impl InputAttribute {
    pub fn new(location: u32, glsl_type: GlslType, name: impl Into<String>) -> Self {
        Self {
            location,
            glsl_type,
            name: name.into(),
        }
    }

    pub fn glsl_type(&self) -> GlslType {
        self.glsl_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locations(&self) -> Range<u32> {
        self.location..self.location + self.glsl_type.location_count()
    }
}

impl fmt::Display for InputAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout(location = {}) in {} {};",
            self.location, self.glsl_type, self.name
        )
    }
}

impl StageInput {
    pub fn new(
        location: u32,
        glsl_type: GlslType,
        name: impl Into<String>,
        interpolation: Interpolation,
    ) -> Self {
        Self {
            location,
            glsl_type,
            name: name.into(),
            interpolation,
        }
    }

    pub fn location(&self) -> u32 {
        self.location
    }

    pub fn glsl_type(&self) -> GlslType {
        self.glsl_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn locations(&self) -> Range<u32> {
        self.location..self.location + self.glsl_type.location_count()
    }
}

impl fmt::Display for StageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout(location = {}) {}in {} {};",
            self.location,
            self.interpolation.qualifier(),
            self.glsl_type,
            self.name
        )
    }
}

impl StageOutput {
    pub fn new(
        location: u32,
        glsl_type: GlslType,
        name: impl Into<String>,
        interpolation: Interpolation,
    ) -> Self {
        Self {
            location,
            glsl_type,
            name: name.into(),
            interpolation,
        }
    }

    pub fn location(&self) -> u32 {
        self.location
    }

    pub fn glsl_type(&self) -> GlslType {
        self.glsl_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn locations(&self) -> Range<u32> {
        self.location..self.location + self.glsl_type.location_count()
    }

    /// Returns the input the next stage must declare to receive this output.
    pub fn matching_input(&self) -> StageInput {
        StageInput::new(
            self.location,
            self.glsl_type,
            self.name.clone(),
            self.interpolation,
        )
    }
}

impl fmt::Display for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout(location = {}) {}out {} {};",
            self.location,
            self.interpolation.qualifier(),
            self.glsl_type,
            self.name
        )
    }
}

impl OutputFragment {
    pub fn new(location: u32, glsl_type: GlslType, name: impl Into<String>) -> Self {
        Self {
            location,
            glsl_type,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locations(&self) -> Range<u32> {
        self.location..self.location + self.glsl_type.location_count()
    }
}

impl fmt::Display for OutputFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "layout(location = {}) out {} {};",
            self.location, self.glsl_type, self.name
        )
    }
}
