//! Generation of complete programs: both shader stages, their pipeline
//! layout and the layout objects created for it.

mod cache;
mod config;
mod context;
mod dump;
mod generator;
mod overlay;
mod shadow;

pub use cache::{ProgramCache, ProgramCacheKey};
pub use config::GeneratorConfig;
pub use context::{GenerationContext, NormalMode, normal_synthesis_enabled};
pub use dump::{dump_program, dump_path};
pub use generator::{ProgramGenerator, ProgramRequest};
pub use overlay::ColorConversion;

use crate::{
    binding::PipelineLayoutDescription,
    layout_cache::{DescriptorSetLayout, GpuLayoutHandle},
    render_pass::PipelineStateHints,
    stage::GeneratedShader,
};
use std::sync::Arc;

/// A generated vertex and fragment shader pair with everything needed to
/// create a pipeline for it.
#[derive(Debug)]
pub struct Program {
    key: ProgramCacheKey,
    vertex: GeneratedShader,
    fragment: GeneratedShader,
    layout: PipelineLayoutDescription,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pipeline_layout: GpuLayoutHandle,
    pipeline_state: PipelineStateHints,
}

impl Program {
    pub fn key(&self) -> &ProgramCacheKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn vertex(&self) -> &GeneratedShader {
        &self.vertex
    }

    pub fn fragment(&self) -> &GeneratedShader {
        &self.fragment
    }

    /// Returns the description of the pipeline layout the shaders were
    /// generated for.
    pub fn layout(&self) -> &PipelineLayoutDescription {
        &self.layout
    }

    /// Returns the descriptor set layouts in set order.
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.set_layouts
    }

    pub fn pipeline_layout(&self) -> GpuLayoutHandle {
        self.pipeline_layout
    }

    pub fn pipeline_state(&self) -> PipelineStateHints {
        self.pipeline_state
    }
}
