//! Uniform, push constant and interface blocks.

use crate::{
    declaration::ResourceBinding,
    glsl::{self, GlslType, MemoryLayout},
    uniform::BlockLayout,
};
use anyhow::{Result, bail};
use std::{fmt, ops::Range};

/// A named member of a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockMember {
    glsl_type: GlslType,
    name: String,
}

/// A block of uniforms backed by a uniform buffer. Members are laid out
/// according to std140.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformBlock {
    set: u32,
    binding: u32,
    type_name: String,
    instance_name: String,
    members: Vec<BlockMember>,
    dynamic_offset: bool,
}

/// A block of push constants. Members are laid out according to std430,
/// starting at the base offset of the block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantBlock {
    type_name: String,
    instance_name: String,
    members: Vec<BlockMember>,
    base_offset: u32,
}

/// A block of interstage variables occupying consecutive locations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceBlock {
    location: u32,
    type_name: String,
    instance_name: String,
    members: Vec<BlockMember>,
}

impl BlockMember {
    pub fn new(glsl_type: GlslType, name: impl Into<String>) -> Self {
        Self {
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
}

impl UniformBlock {
    /// Creates a new uniform block without members at the given set and
    /// binding.
    pub fn new(
        set: u32,
        binding: u32,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            set,
            binding,
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            members: Vec::new(),
            dynamic_offset: false,
        }
    }

    /// Adds a member with the given type and name to the block and returns
    /// the block.
    ///
    /// # Errors
    /// See [`add_member`](Self::add_member).
    pub fn with_member(mut self, glsl_type: GlslType, name: impl Into<String>) -> Result<Self> {
        self.add_member(glsl_type, name)?;
        Ok(self)
    }

    /// Marks the block as being bound with a dynamic offset into a buffer
    /// shared by many blocks.
    pub fn with_dynamic_offset(mut self) -> Self {
        self.dynamic_offset = true;
        self
    }

    /// Appends a member with the given type and name to the block.
    ///
    /// # Errors
    /// Returns an error if the name is not a valid identifier or if the
    /// block already has a member with the same name.
    pub fn add_member(&mut self, glsl_type: GlslType, name: impl Into<String>) -> Result<()> {
        push_member(&mut self.members, &self.type_name, glsl_type, name.into())
    }

    pub fn set(&self) -> u32 {
        self.set
    }

    pub fn binding(&self) -> u32 {
        self.binding
    }

    pub fn resource_binding(&self) -> ResourceBinding {
        ResourceBinding {
            set: self.set,
            binding: self.binding,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn members(&self) -> &[BlockMember] {
        &self.members
    }

    /// Whether the block is bound with a dynamic offset.
    pub fn has_dynamic_offset(&self) -> bool {
        self.dynamic_offset
    }

    /// Computes the std140 memory layout of the block.
    pub fn layout(&self) -> BlockLayout {
        BlockLayout::compute(MemoryLayout::Std140, &self.members)
    }

    /// Returns the expression referring to the member with the given name,
    /// e.g. `ubMaterial.diffuseColor`.
    pub fn member_reference(&self, name: &str) -> String {
        format!("{}.{}", self.instance_name, name)
    }
}

impl fmt::Display for UniformBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "layout(set = {}, binding = {}, std140) uniform {}",
            self.set, self.binding, self.type_name
        )?;
        fmt_members(f, &self.members, None)?;
        write!(f, "}} {};", self.instance_name)
    }
}

impl PushConstantBlock {
    /// Creates a new push constant block without members starting at offset
    /// zero.
    pub fn new(type_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            members: Vec::new(),
            base_offset: 0,
        }
    }

    /// Adds a member with the given type and name to the block and returns
    /// the block.
    ///
    /// # Errors
    /// See [`UniformBlock::add_member`].
    pub fn with_member(mut self, glsl_type: GlslType, name: impl Into<String>) -> Result<Self> {
        self.add_member(glsl_type, name)?;
        Ok(self)
    }

    /// Makes the block start at the given byte offset into the push constant
    /// range of the pipeline.
    pub fn with_base_offset(mut self, base_offset: u32) -> Self {
        self.base_offset = base_offset;
        self
    }

    /// Appends a member with the given type and name to the block.
    ///
    /// # Errors
    /// See [`UniformBlock::add_member`].
    pub fn add_member(&mut self, glsl_type: GlslType, name: impl Into<String>) -> Result<()> {
        push_member(&mut self.members, &self.type_name, glsl_type, name.into())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn members(&self) -> &[BlockMember] {
        &self.members
    }

    pub fn base_offset(&self) -> u32 {
        self.base_offset
    }

    /// Computes the std430 memory layout of the block, with offsets relative
    /// to the base offset.
    pub fn layout(&self) -> BlockLayout {
        BlockLayout::compute(MemoryLayout::Std430, &self.members)
    }

    pub fn member_reference(&self, name: &str) -> String {
        format!("{}.{}", self.instance_name, name)
    }
}

impl fmt::Display for PushConstantBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layout(push_constant) uniform {}", self.type_name)?;
        let first_offset = (self.base_offset > 0).then_some(self.base_offset);
        fmt_members(f, &self.members, first_offset)?;
        write!(f, "}} {};", self.instance_name)
    }
}

impl InterfaceBlock {
    /// Creates a new interface block without members starting at the given
    /// location.
    pub fn new(
        location: u32,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            location,
            type_name: type_name.into(),
            instance_name: instance_name.into(),
            members: Vec::new(),
        }
    }

    /// Adds a member with the given type and name to the block and returns
    /// the block.
    ///
    /// # Errors
    /// See [`UniformBlock::add_member`].
    pub fn with_member(mut self, glsl_type: GlslType, name: impl Into<String>) -> Result<Self> {
        push_member(&mut self.members, &self.type_name, glsl_type, name.into())?;
        Ok(self)
    }

    pub fn location(&self) -> u32 {
        self.location
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn members(&self) -> &[BlockMember] {
        &self.members
    }

    /// Returns the range of locations occupied by the members.
    pub fn locations(&self) -> Range<u32> {
        let count: u32 = self
            .members
            .iter()
            .map(|member| member.glsl_type.location_count())
            .sum();
        self.location..self.location + count
    }

    pub(super) fn fmt_with_direction(
        &self,
        f: &mut fmt::Formatter<'_>,
        direction: &str,
    ) -> fmt::Result {
        writeln!(
            f,
            "layout(location = {}) {} {}",
            self.location, direction, self.type_name
        )?;
        fmt_members(f, &self.members, None)?;
        write!(f, "}} {};", self.instance_name)
    }
}

fn push_member(
    members: &mut Vec<BlockMember>,
    block_name: &str,
    glsl_type: GlslType,
    name: String,
) -> Result<()> {
    if !glsl::is_valid_identifier(&name) {
        bail!("Invalid member name `{}` in block `{}`", name, block_name);
    }
    if members.iter().any(|member| member.name == name) {
        bail!("Member `{}` declared twice in block `{}`", name, block_name);
    }
    members.push(BlockMember::new(glsl_type, name));
    Ok(())
}

fn fmt_members(
    f: &mut fmt::Formatter<'_>,
    members: &[BlockMember],
    first_offset: Option<u32>,
) -> fmt::Result {
    writeln!(f, "{{")?;
    for (idx, member) in members.iter().enumerate() {
        match first_offset {
            Some(offset) if idx == 0 => writeln!(
                f,
                "\tlayout(offset = {}) {} {};",
                offset, member.glsl_type, member.name
            )?,
            _ => writeln!(f, "\t{} {};", member.glsl_type, member.name)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uniform_block_renders_with_set_binding_and_layout() {
        let block = UniformBlock::new(2, 0, "MaterialBlock", "ubMaterial")
            .with_member(GlslType::Vec4, "diffuseColor")
            .unwrap()
            .with_member(GlslType::Float, "shininess")
            .unwrap();
        assert_eq!(
            block.to_string(),
            "layout(set = 2, binding = 0, std140) uniform MaterialBlock\n{\n\tvec4 diffuseColor;\n\tfloat shininess;\n} ubMaterial;"
        );
        assert_eq!(block.member_reference("shininess"), "ubMaterial.shininess");
    }

    #[test]
    fn adding_duplicate_member_fails() {
        let mut block = UniformBlock::new(0, 0, "ViewBlock", "ubView");
        block.add_member(GlslType::Mat4, "projectionMatrix").unwrap();
        assert!(block.add_member(GlslType::Vec4, "projectionMatrix").is_err());
        assert_eq!(block.members().len(), 1);
    }

    #[test]
    fn adding_reserved_member_name_fails() {
        let mut block = PushConstantBlock::new("MatricesBlock", "pcMatrices");
        assert!(block.add_member(GlslType::Mat4, "uniform").is_err());
    }

    #[test]
    fn push_constant_block_with_base_offset_renders_member_offset() {
        let block = PushConstantBlock::new("OverlayBlock", "pcOverlay")
            .with_member(GlslType::Mat4, "transformationMatrix")
            .unwrap()
            .with_base_offset(64);
        assert_eq!(
            block.to_string(),
            "layout(push_constant) uniform OverlayBlock\n{\n\tlayout(offset = 64) mat4 transformationMatrix;\n} pcOverlay;"
        );
    }

    #[test]
    fn interface_block_spans_member_locations() {
        let block = InterfaceBlock::new(3, "VertexData", "vdOut")
            .with_member(GlslType::Mat3, "tbn")
            .unwrap()
            .with_member(GlslType::Vec2, "uv")
            .unwrap();
        assert_eq!(block.locations(), 3..7);
    }
}
