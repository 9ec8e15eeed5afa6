//! Declarations placed at global scope in a shader stage.

mod block;
mod function;
mod variable;

pub use block::{BlockMember, InterfaceBlock, PushConstantBlock, UniformBlock};
pub use function::Function;
pub use variable::{InputAttribute, OutputFragment, Sampler, StageInput, StageOutput};

use serde::Serialize;
use std::{fmt, ops::Range};

/// Anything a shader stage can declare outside of its `main` function.
#[derive(Clone, Debug, PartialEq)]
pub enum Declaration {
    Function(Function),
    UniformBlock(UniformBlock),
    InputBlock(InterfaceBlock),
    OutputBlock(InterfaceBlock),
    PushConstantBlock(PushConstantBlock),
    Sampler(Sampler),
    StageInput(StageInput),
    StageOutput(StageOutput),
    InputAttribute(InputAttribute),
    OutputFragment(OutputFragment),
}

/// The kind of a [`Declaration`]. Declarations are emitted grouped by
/// category, in the order the categories are listed here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclarationCategory {
    Function,
    UniformBlock,
    InputBlock,
    OutputBlock,
    PushConstantBlock,
    Sampler,
    StageInput,
    StageOutput,
    InputAttribute,
    OutputFragment,
}

/// Whether an interface variable is read from or written to by a stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceDirection {
    In,
    Out,
}

/// The descriptor set and binding a resource is bound at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceBinding {
    pub set: u32,
    pub binding: u32,
}

impl DeclarationCategory {
    pub const ALL: [Self; 10] = [
        Self::Function,
        Self::UniformBlock,
        Self::InputBlock,
        Self::OutputBlock,
        Self::PushConstantBlock,
        Self::Sampler,
        Self::StageInput,
        Self::StageOutput,
        Self::InputAttribute,
        Self::OutputFragment,
    ];
}

impl Declaration {
    /// Returns the name the declaration introduces into the shader. For
    /// blocks this is the instance name.
    pub fn name(&self) -> &str {
        match self {
            Self::Function(function) => function.name(),
            Self::UniformBlock(block) => block.instance_name(),
            Self::InputBlock(block) | Self::OutputBlock(block) => block.instance_name(),
            Self::PushConstantBlock(block) => block.instance_name(),
            Self::Sampler(sampler) => sampler.name(),
            Self::StageInput(input) => input.name(),
            Self::StageOutput(output) => output.name(),
            Self::InputAttribute(attribute) => attribute.name(),
            Self::OutputFragment(fragment) => fragment.name(),
        }
    }

    /// Returns the type name of a block declaration.
    pub fn block_type_name(&self) -> Option<&str> {
        match self {
            Self::UniformBlock(block) => Some(block.type_name()),
            Self::InputBlock(block) | Self::OutputBlock(block) => Some(block.type_name()),
            Self::PushConstantBlock(block) => Some(block.type_name()),
            _ => None,
        }
    }

    /// Returns the names of the members of a block declaration.
    pub fn member_names(&self) -> Vec<&str> {
        let members = match self {
            Self::UniformBlock(block) => block.members(),
            Self::InputBlock(block) | Self::OutputBlock(block) => block.members(),
            Self::PushConstantBlock(block) => block.members(),
            _ => return Vec::new(),
        };
        members.iter().map(BlockMember::name).collect()
    }

    pub fn category(&self) -> DeclarationCategory {
        match self {
            Self::Function(_) => DeclarationCategory::Function,
            Self::UniformBlock(_) => DeclarationCategory::UniformBlock,
            Self::InputBlock(_) => DeclarationCategory::InputBlock,
            Self::OutputBlock(_) => DeclarationCategory::OutputBlock,
            Self::PushConstantBlock(_) => DeclarationCategory::PushConstantBlock,
            Self::Sampler(_) => DeclarationCategory::Sampler,
            Self::StageInput(_) => DeclarationCategory::StageInput,
            Self::StageOutput(_) => DeclarationCategory::StageOutput,
            Self::InputAttribute(_) => DeclarationCategory::InputAttribute,
            Self::OutputFragment(_) => DeclarationCategory::OutputFragment,
        }
    }

    /// Returns the descriptor set and binding of a uniform block or sampler.
    pub fn resource_binding(&self) -> Option<ResourceBinding> {
        match self {
            Self::UniformBlock(block) => Some(block.resource_binding()),
            Self::Sampler(sampler) => Some(sampler.resource_binding()),
            _ => None,
        }
    }

    /// Returns the direction and the range of locations occupied by an
    /// interface declaration.
    pub fn interface_locations(&self) -> Option<(InterfaceDirection, Range<u32>)> {
        match self {
            Self::InputAttribute(attribute) => {
                Some((InterfaceDirection::In, attribute.locations()))
            }
            Self::StageInput(input) => Some((InterfaceDirection::In, input.locations())),
            Self::InputBlock(block) => Some((InterfaceDirection::In, block.locations())),
            Self::StageOutput(output) => Some((InterfaceDirection::Out, output.locations())),
            Self::OutputBlock(block) => Some((InterfaceDirection::Out, block.locations())),
            Self::OutputFragment(fragment) => {
                Some((InterfaceDirection::Out, fragment.locations()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(function) => fmt::Display::fmt(function, f),
            Self::UniformBlock(block) => fmt::Display::fmt(block, f),
            Self::InputBlock(block) => block.fmt_with_direction(f, "in"),
            Self::OutputBlock(block) => block.fmt_with_direction(f, "out"),
            Self::PushConstantBlock(block) => fmt::Display::fmt(block, f),
            Self::Sampler(sampler) => fmt::Display::fmt(sampler, f),
            Self::StageInput(input) => fmt::Display::fmt(input, f),
            Self::StageOutput(output) => fmt::Display::fmt(output, f),
            Self::InputAttribute(attribute) => fmt::Display::fmt(attribute, f),
            Self::OutputFragment(fragment) => fmt::Display::fmt(fragment, f),
        }
    }
}

impl From<Function> for Declaration {
    fn from(function: Function) -> Self {
        Self::Function(function)
    }
}

impl From<UniformBlock> for Declaration {
    fn from(block: UniformBlock) -> Self {
        Self::UniformBlock(block)
    }
}

impl From<PushConstantBlock> for Declaration {
    fn from(block: PushConstantBlock) -> Self {
        Self::PushConstantBlock(block)
    }
}

impl From<Sampler> for Declaration {
    fn from(sampler: Sampler) -> Self {
        Self::Sampler(sampler)
    }
}

impl From<StageInput> for Declaration {
    fn from(input: StageInput) -> Self {
        Self::StageInput(input)
    }
}

impl From<StageOutput> for Declaration {
    fn from(output: StageOutput) -> Self {
        Self::StageOutput(output)
    }
}

impl From<InputAttribute> for Declaration {
    fn from(attribute: InputAttribute) -> Self {
        Self::InputAttribute(attribute)
    }
}

impl From<OutputFragment> for Declaration {
    fn from(fragment: OutputFragment) -> Self {
        Self::OutputFragment(fragment)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::glsl::{GlslType, Interpolation, SamplerType};

    #[test]
    fn declaration_categories_are_ordered_for_emission() {
        assert!(DeclarationCategory::Function < DeclarationCategory::UniformBlock);
        assert!(DeclarationCategory::PushConstantBlock < DeclarationCategory::Sampler);
        assert!(DeclarationCategory::StageOutput < DeclarationCategory::InputAttribute);
    }

    #[test]
    fn matrix_stage_output_occupies_one_location_per_column() {
        let declaration = Declaration::from(StageOutput::new(
            2,
            GlslType::Mat3,
            "svWorldTBNMatrix",
            Interpolation::Smooth,
        ));
        assert_eq!(
            declaration.interface_locations(),
            Some((InterfaceDirection::Out, 2..5))
        );
    }

    #[test]
    fn sampler_reports_its_resource_binding() {
        let declaration = Declaration::from(Sampler::new(2, 1, SamplerType::Sampler2D, "suDiffuse"));
        assert_eq!(
            declaration.resource_binding(),
            Some(ResourceBinding { set: 2, binding: 1 })
        );
        assert_eq!(declaration.interface_locations(), None);
        assert_eq!(
            declaration.to_string(),
            "layout(set = 2, binding = 1) uniform sampler2D suDiffuse;"
        );
    }
}
