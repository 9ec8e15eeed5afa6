//! Storage of the materials in a scene.

use crate::{
    material::{Material, MaterialId},
    resource::TextureRegistry,
    uniform::SharedUniformBufferRegistry,
};
use anyhow::{Result, anyhow, bail};
use bytemuck::{Pod, Zeroable};
use std::{collections::HashMap, fmt};

/// Handle to a material in a [`MaterialStorage`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct MaterialHandle(u32);

/// Container for all materials in a scene.
///
/// Materials with the same [`MaterialId`] share a uniform buffer, in which
/// each material owns a stable slot. A registered material holds a
/// reference to every texture it reads.
#[derive(Debug)]
pub struct MaterialStorage {
    uniform_buffers: SharedUniformBufferRegistry<MaterialHandle>,
    materials: HashMap<MaterialHandle, Material>,
    handle_counter: u32,
}

impl fmt::Display for MaterialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material {}", self.0)
    }
}

impl MaterialStorage {
    /// Creates a new empty material storage whose buffers place materials at
    /// multiples of `block_aligned_size` and hold at most `max_materials`
    /// materials of each structure.
    pub fn new(block_aligned_size: usize, max_materials: usize) -> Self {
        Self {
            uniform_buffers: SharedUniformBufferRegistry::new(block_aligned_size, max_materials),
            materials: HashMap::new(),
            handle_counter: 0,
        }
    }

    pub fn n_materials(&self) -> usize {
        self.materials.len()
    }

    /// Returns the number of distinct material structures in use, each
    /// backed by its own buffer.
    pub fn n_buffers(&self) -> usize {
        self.uniform_buffers.n_buffers()
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(&handle)
    }

    pub fn material_slot(&self, handle: MaterialHandle) -> Option<usize> {
        let id = self.materials.get(&handle)?.id();
        self.uniform_buffers
            .with_buffer(id.0, |buffer| buffer.slot(handle))
            .flatten()
    }

    /// Returns the byte offset of the uniform data of the material in the
    /// buffer of its structure.
    pub fn material_offset(&self, handle: MaterialHandle) -> Option<usize> {
        let id = self.materials.get(&handle)?.id();
        self.uniform_buffers
            .with_buffer(id.0, |buffer| {
                buffer.slot(handle).map(|slot| buffer.element_offset(slot))
            })
            .flatten()
    }

    /// Calls the given closure with the raw bytes of the buffer holding the
    /// materials with the given structure, if there are any.
    pub fn with_buffer_bytes<R>(&self, id: MaterialId, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.uniform_buffers
            .with_buffer(id.0, |buffer| f(buffer.raw_bytes()))
    }

    /// Adds the given material to the storage and retains its textures.
    ///
    /// # Errors
    /// Returns an error if the material has no components, if one of its
    /// textures is missing from the registry, or if the buffer for its
    /// structure is full. Nothing is retained on failure.
    pub fn register(
        &mut self,
        material: Material,
        textures: &mut TextureRegistry,
    ) -> Result<MaterialHandle> {
        if material.is_empty() {
            bail!("Can not register material without components");
        }

        let texture_handles = material.textures();
        for (idx, &texture) in texture_handles.iter().enumerate() {
            if let Err(error) = textures.retain(texture) {
                for &retained in &texture_handles[..idx] {
                    textures.release(retained)?;
                }
                return Err(error.context(format!("Failed to register {}", material)));
            }
        }

        let handle = self.create_new_handle()?;
        let id = material.id();
        let bytes = material.uniform_bytes();

        let registered = self
            .uniform_buffers
            .register(id.0, bytes.len(), handle)
            .and_then(|slot| {
                self.uniform_buffers
                    .write(id.0, slot, &bytes)
                    .map(|()| slot)
                    .or_else(|error| {
                        self.uniform_buffers.deregister(id.0, handle)?;
                        Err(error)
                    })
            });

        match registered {
            Ok(slot) => {
                log::debug!("Registered {} as {} in slot {}", material, handle, slot);
                self.materials.insert(handle, material);
                Ok(handle)
            }
            Err(error) => {
                for &texture in &texture_handles {
                    textures.release(texture)?;
                }
                Err(error.context(format!("Failed to register {}", material)))
            }
        }
    }

    /// Rewrites the uniform data of the material with the given handle. The
    /// new material must have the same structure.
    ///
    /// # Errors
    /// Returns an error if the handle is unknown or the structure differs.
    pub fn update(&mut self, handle: MaterialHandle, material: Material) -> Result<()> {
        let existing = self
            .materials
            .get_mut(&handle)
            .ok_or_else(|| anyhow!("No {}", handle))?;
        if existing.id() != material.id() {
            bail!("Can not change {} from {} to {}", handle, existing, material);
        }
        if existing.textures() != material.textures() {
            bail!("Can not change the textures of {}", handle);
        }

        let id = material.id();
        let slot = self
            .uniform_buffers
            .with_buffer(id.0, |buffer| buffer.slot(handle))
            .flatten()
            .ok_or_else(|| anyhow!("{} has no uniform slot", handle))?;
        self.uniform_buffers
            .write(id.0, slot, &material.uniform_bytes())?;
        *existing = material;
        Ok(())
    }

    /// Removes the material with the given handle and releases its
    /// textures. The slots of other materials are not affected.
    ///
    /// # Errors
    /// Returns an error if the handle is unknown.
    pub fn deregister(
        &mut self,
        handle: MaterialHandle,
        textures: &mut TextureRegistry,
    ) -> Result<Material> {
        let material = self
            .materials
            .remove(&handle)
            .ok_or_else(|| anyhow!("No {}", handle))?;
        self.uniform_buffers.deregister(material.id().0, handle)?;
        for texture in material.textures() {
            textures.release(texture)?;
        }
        log::debug!("Deregistered {}", handle);
        Ok(material)
    }

    fn create_new_handle(&mut self) -> Result<MaterialHandle> {
        let handle = MaterialHandle(self.handle_counter);
        self.handle_counter = self
            .handle_counter
            .checked_add(1)
            .ok_or_else(|| anyhow!("Ran out of material handles"))?;
        Ok(handle)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        material::{
            BasicMaterial, Component, MaterialSlot, StandardMaterial, StandardMaterialUniform,
        },
        resource::{TextureKind, TextureResource},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector4;

    fn colored(r: f32) -> Material {
        StandardMaterial::new()
            .with_component(
                MaterialSlot::Diffuse,
                Component::Color(Vector4::new(r, 0.0, 0.0, 1.0)),
            )
            .unwrap()
            .into()
    }

    fn textured(textures: &mut TextureRegistry) -> Material {
        let kind = TextureKind::Texture2D;
        let handle = textures.insert(TextureResource::new("bricks", kind));
        StandardMaterial::new()
            .with_component(MaterialSlot::Diffuse, Component::Texture { handle, kind })
            .unwrap()
            .into()
    }

    #[test]
    fn registering_material_without_components_fails() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        assert!(
            storage
                .register(StandardMaterial::new().into(), &mut textures)
                .is_err()
        );
        assert_eq!(storage.n_buffers(), 0);
    }

    #[test]
    fn same_structure_shares_buffer_with_stable_slots() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        let a = storage.register(colored(0.1), &mut textures).unwrap();
        let b = storage.register(colored(0.2), &mut textures).unwrap();
        let c = storage.register(colored(0.3), &mut textures).unwrap();
        assert_eq!(storage.n_buffers(), 1);

        storage.deregister(b, &mut textures).unwrap();
        let d = storage.register(colored(0.4), &mut textures).unwrap();
        assert_eq!(storage.material_slot(a), Some(0));
        assert_eq!(storage.material_slot(c), Some(2));
        assert_eq!(storage.material_slot(d), Some(1));
        assert_eq!(storage.material_offset(d), Some(256));
    }

    #[test]
    fn different_structures_use_separate_buffers() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        storage.register(colored(0.1), &mut textures).unwrap();
        let basic = storage
            .register(
                BasicMaterial::new(Vector4::new(1.0, 1.0, 1.0, 1.0)).into(),
                &mut textures,
            )
            .unwrap();
        assert_eq!(storage.n_buffers(), 2);
        assert_eq!(storage.material_slot(basic), Some(0));
    }

    #[test]
    fn registered_material_data_is_written_to_its_slot() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        storage.register(colored(0.1), &mut textures).unwrap();
        let material = colored(0.7);
        let id = material.id();
        let handle = storage.register(material, &mut textures).unwrap();
        let offset = storage.material_offset(handle).unwrap();

        let uniform: StandardMaterialUniform = storage
            .with_buffer_bytes(id, |bytes| {
                bytemuck::pod_read_unaligned(
                    &bytes[offset..offset + std::mem::size_of::<StandardMaterialUniform>()],
                )
            })
            .unwrap();
        assert_abs_diff_eq!(uniform.diffuse_color.x, 0.7);
        assert_abs_diff_eq!(uniform.opacity, 1.0);
    }

    #[test]
    fn material_keeps_textures_alive_until_deregistered() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        let material = textured(&mut textures);
        let texture = material.textures()[0];

        let handle = storage.register(material, &mut textures).unwrap();
        assert_eq!(textures.ref_count(texture), Some(2));

        storage.deregister(handle, &mut textures).unwrap();
        assert_eq!(textures.ref_count(texture), Some(1));
        assert_eq!(storage.n_buffers(), 0);
    }

    #[test]
    fn failed_registration_releases_retained_textures() {
        let mut storage = MaterialStorage::new(256, 1);
        let mut textures = TextureRegistry::new();
        let first = textured(&mut textures);
        let texture = first.textures()[0];
        let second = first.clone();

        storage.register(first, &mut textures).unwrap();
        assert!(storage.register(second, &mut textures).is_err());
        assert_eq!(textures.ref_count(texture), Some(2));
    }

    #[test]
    fn updating_material_to_other_structure_fails() {
        let mut storage = MaterialStorage::new(256, 8);
        let mut textures = TextureRegistry::new();
        let handle = storage.register(colored(0.1), &mut textures).unwrap();
        assert!(storage.update(handle, colored(0.9)).is_ok());
        assert!(
            storage
                .update(handle, BasicMaterial::new(Vector4::zeros()).into())
                .is_err()
        );
    }
}
