//! Texture resources referenced by materials.

use crate::glsl::SamplerType;
use anyhow::{Result, bail};
use saphir_utils::{ArenaHandle, GenerationalArena};
use serde::Serialize;
use std::fmt;

/// The dimensionality of a texture, which decides the sampler type and the
/// texture coordinates needed to sample it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TextureKind {
    Texture2D,
    Texture3D,
    Cube,
}

/// Handle to a texture in a [`TextureRegistry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(ArenaHandle);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureResource {
    name: String,
    kind: TextureKind,
}

/// Textures shared between materials.
///
/// A texture stays alive for as long as anything retains it. Inserting a
/// texture counts as the first reference.
#[derive(Debug, Default)]
pub struct TextureRegistry {
    textures: GenerationalArena<TextureResource>,
}

impl TextureKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Texture2D => "Texture2D",
            Self::Texture3D => "Texture3D",
            Self::Cube => "TextureCube",
        }
    }

    /// Returns the type of sampler the texture is read through.
    pub const fn sampler_type(&self) -> SamplerType {
        match self {
            Self::Texture2D => SamplerType::Sampler2D,
            Self::Texture3D => SamplerType::Sampler3D,
            Self::Cube => SamplerType::SamplerCube,
        }
    }
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture {}", self.0)
    }
}

impl TextureResource {
    pub fn new(name: impl Into<String>, kind: TextureKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Adds the given texture with a reference count of one.
    pub fn insert(&mut self, texture: TextureResource) -> TextureHandle {
        log::debug!("Adding texture `{}`", texture.name);
        TextureHandle(self.textures.insert(texture))
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&TextureResource> {
        self.textures.get(handle.0)
    }

    pub fn ref_count(&self, handle: TextureHandle) -> Option<u32> {
        self.textures.ref_count(handle.0)
    }

    /// Adds a reference to the given texture.
    ///
    /// # Errors
    /// Returns an error if the texture has been removed.
    pub fn retain(&mut self, handle: TextureHandle) -> Result<()> {
        if !self.textures.contains(handle.0) {
            bail!("Tried to retain missing {}", handle);
        }
        self.textures.retain(handle.0);
        Ok(())
    }

    /// Drops a reference to the given texture, removing it when no
    /// references remain.
    ///
    /// # Errors
    /// Returns an error if the texture has been removed.
    pub fn release(&mut self, handle: TextureHandle) -> Result<()> {
        if !self.textures.contains(handle.0) {
            bail!("Tried to release missing {}", handle);
        }
        if let Some(texture) = self.textures.release(handle.0) {
            log::debug!("Removed texture `{}`", texture.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn texture_lives_until_last_release() {
        let mut textures = TextureRegistry::new();
        let handle = textures.insert(TextureResource::new("bricks", TextureKind::Texture2D));
        textures.retain(handle).unwrap();
        assert_eq!(textures.ref_count(handle), Some(2));

        textures.release(handle).unwrap();
        assert!(textures.get(handle).is_some());
        textures.release(handle).unwrap();
        assert!(textures.get(handle).is_none());
        assert!(textures.is_empty());
    }

    #[test]
    fn releasing_removed_texture_fails() {
        let mut textures = TextureRegistry::new();
        let handle = textures.insert(TextureResource::new("sky", TextureKind::Cube));
        textures.release(handle).unwrap();
        assert!(textures.release(handle).is_err());
        assert!(textures.retain(handle).is_err());
    }

    #[test]
    fn reused_location_does_not_revive_old_handle() {
        let mut textures = TextureRegistry::new();
        let old = textures.insert(TextureResource::new("a", TextureKind::Texture2D));
        textures.release(old).unwrap();
        let new = textures.insert(TextureResource::new("b", TextureKind::Texture3D));
        assert_ne!(old, new);
        assert!(textures.get(old).is_none());
        assert_eq!(textures.get(new).map(TextureResource::kind), Some(TextureKind::Texture3D));
    }
}
