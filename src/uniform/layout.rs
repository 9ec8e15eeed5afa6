//! Computation of block member offsets.

use crate::{
    declaration::BlockMember,
    glsl::{GlslType, MemoryLayout},
};
use anyhow::{Result, bail};
use bytemuck::Pod;
use std::mem;

/// The location and extent of a block member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberLayout {
    pub name: String,
    pub glsl_type: GlslType,
    pub offset: usize,
    pub size: usize,
}

/// The memory layout of all members of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    memory_layout: MemoryLayout,
    members: Vec<MemberLayout>,
    size: usize,
}

/// A CPU-side struct whose bytes are copied verbatim into a uniform block.
///
/// Implementors list the byte offset of the field mirroring each block
/// member, so that [`BlockLayout::verify_mirror`] can check that the struct
/// matches the block.
pub trait UniformMirror: Pod {
    /// Returns the name of each block member paired with the byte offset of
    /// the mirroring field.
    fn member_offsets() -> Vec<(&'static str, usize)>;
}

impl BlockLayout {
    /// Lays out the given members in order under the given rules.
    pub fn compute(memory_layout: MemoryLayout, members: &[BlockMember]) -> Self {
        let mut offset: usize = 0;
        let mut max_alignment = 4;
        let mut member_layouts = Vec::with_capacity(members.len());

        for member in members {
            let glsl_type = member.glsl_type();
            let alignment = glsl_type.alignment(memory_layout);
            max_alignment = max_alignment.max(alignment);

            offset = offset.next_multiple_of(alignment);
            let size = glsl_type.size(memory_layout);

            member_layouts.push(MemberLayout {
                name: member.name().to_string(),
                glsl_type,
                offset,
                size,
            });
            offset += size;
        }

        let size = offset.next_multiple_of(memory_layout.block_alignment(max_alignment));

        Self {
            memory_layout,
            members: member_layouts,
            size,
        }
    }

    pub fn memory_layout(&self) -> MemoryLayout {
        self.memory_layout
    }

    pub fn members(&self) -> &[MemberLayout] {
        &self.members
    }

    /// Returns the total size of the block in bytes, including trailing
    /// padding.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|member| member.name == name)
    }

    /// Returns the byte offset of the member with the given name.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.member(name).map(|member| member.offset)
    }

    /// Returns the offset of the member with the given name in units of
    /// 32-bit floats, for writing into a flat `f32` array.
    pub fn float_offset_of(&self, name: &str) -> Option<usize> {
        self.offset_of(name).map(|offset| offset / mem::size_of::<f32>())
    }

    /// Checks that the given CPU-side struct has the size of the block and
    /// a field at the offset of every member.
    ///
    /// # Errors
    /// Returns an error describing the first mismatch found.
    pub fn verify_mirror<T: UniformMirror>(&self) -> Result<()> {
        let mirror_size = mem::size_of::<T>();
        if mirror_size != self.size {
            bail!(
                "Uniform struct has size {} but block has size {}",
                mirror_size,
                self.size
            );
        }
        let offsets = T::member_offsets();
        for member in &self.members {
            match offsets.iter().find(|(name, _)| *name == member.name) {
                Some(&(_, offset)) if offset == member.offset => {}
                Some(&(_, offset)) => bail!(
                    "Uniform struct has member `{}` at offset {} but block has it at {}",
                    member.name,
                    offset,
                    member.offset
                ),
                None => bail!("Uniform struct is missing member `{}`", member.name),
            }
        }
        if let Some((name, _)) = offsets
            .iter()
            .find(|(name, _)| self.member(name).is_none())
        {
            bail!("Uniform struct has member `{}` not present in block", name);
        }
        Ok(())
    }
}
