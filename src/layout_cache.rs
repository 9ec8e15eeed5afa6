//! Cache of descriptor set layouts shared by structural identifier.

use crate::binding::{DescriptorSetLayoutDescription, PushConstantRange};
use anyhow::{Result, bail};
use nohash_hasher::IntMap;
use parking_lot::RwLock;
use saphir_utils::StringHash;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Opaque handle to a layout object created by a [`LayoutFactory`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GpuLayoutHandle(u64);

/// Creator of the GPU objects backing layout descriptions. Failures model
/// exhaustion of GPU resources.
pub trait LayoutFactory: fmt::Debug + Send + Sync {
    fn create_descriptor_set_layout(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> Result<GpuLayoutHandle>;

    fn create_pipeline_layout(
        &self,
        set_layouts: &[GpuLayoutHandle],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<GpuLayoutHandle>;
}

/// A [`LayoutFactory`] that creates no GPU objects and just hands out
/// unique handles.
#[derive(Debug, Default)]
pub struct DescriptionOnlyFactory {
    next_handle: AtomicU64,
}

/// A created descriptor set layout.
#[derive(Debug, PartialEq, Eq)]
pub struct DescriptorSetLayout {
    identifier: StringHash,
    description: DescriptorSetLayoutDescription,
    handle: GpuLayoutHandle,
}

/// Cache of [`DescriptorSetLayout`]s keyed by the hash of the structural
/// identifier of their description.
///
/// Layouts are never modified after creation. Every object sharing a
/// structural identifier shares one layout.
#[derive(Debug)]
pub struct DescriptorSetLayoutCache {
    factory: Arc<dyn LayoutFactory>,
    layouts: RwLock<IntMap<u64, Arc<DescriptorSetLayout>>>,
}

impl GpuLayoutHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl DescriptionOnlyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> GpuLayoutHandle {
        GpuLayoutHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }
}

impl LayoutFactory for DescriptionOnlyFactory {
    fn create_descriptor_set_layout(
        &self,
        _description: &DescriptorSetLayoutDescription,
    ) -> Result<GpuLayoutHandle> {
        Ok(self.next())
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[GpuLayoutHandle],
        _push_constant_ranges: &[PushConstantRange],
    ) -> Result<GpuLayoutHandle> {
        Ok(self.next())
    }
}

impl DescriptorSetLayout {
    pub fn identifier(&self) -> StringHash {
        self.identifier
    }

    pub fn description(&self) -> &DescriptorSetLayoutDescription {
        &self.description
    }

    pub fn handle(&self) -> GpuLayoutHandle {
        self.handle
    }
}

impl DescriptorSetLayoutCache {
    /// Creates an empty cache creating layouts with the given factory.
    pub fn new(factory: Arc<dyn LayoutFactory>) -> Self {
        Self {
            factory,
            layouts: RwLock::new(IntMap::default()),
        }
    }

    pub fn factory(&self) -> &dyn LayoutFactory {
        self.factory.as_ref()
    }

    /// Returns the layout for the identifier of the given description,
    /// creating it if it does not exist.
    ///
    /// # Returns
    /// The layout, and whether it was created by this call.
    ///
    /// # Errors
    /// Returns an error if a layout with the same identifier but a different
    /// description exists, or if the factory fails.
    pub fn get_or_create(
        &self,
        description: &DescriptorSetLayoutDescription,
    ) -> Result<(Arc<DescriptorSetLayout>, bool)> {
        let identifier = StringHash::of_owned(description.identifier.as_str());

        // First try to get with read lock
        {
            let layouts = self.layouts.read();
            if let Some(layout) = layouts.get(&identifier.hash_value()) {
                return Self::checked_existing(layout, description).map(|layout| (layout, false));
            }
        }

        let mut layouts = self.layouts.write();

        // Check again in case another thread created it while we waited for
        // the write lock
        if let Some(layout) = layouts.get(&identifier.hash_value()) {
            return Self::checked_existing(layout, description).map(|layout| (layout, false));
        }

        let handle = self.factory.create_descriptor_set_layout(description)?;
        log::debug!(
            "Created descriptor set layout `{}` with {} bindings",
            identifier,
            description.bindings.len()
        );
        let layout = Arc::new(DescriptorSetLayout {
            identifier,
            description: description.clone(),
            handle,
        });
        layouts.insert(identifier.hash_value(), Arc::clone(&layout));
        Ok((layout, true))
    }

    /// Returns the layout with the given identifier if it exists.
    pub fn get(&self, identifier: StringHash) -> Option<Arc<DescriptorSetLayout>> {
        self.layouts.read().get(&identifier.hash_value()).cloned()
    }

    /// Removes the layout with the given identifier if it is not referenced
    /// outside of the cache.
    ///
    /// # Returns
    /// Whether the layout was removed.
    pub fn remove_if_unused(&self, identifier: StringHash) -> bool {
        let mut layouts = self.layouts.write();
        match layouts.get(&identifier.hash_value()) {
            Some(layout) if Arc::strong_count(layout) == 1 => {
                layouts.remove(&identifier.hash_value());
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.layouts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every layout not referenced outside of the cache.
    ///
    /// # Returns
    /// The number of removed layouts.
    pub fn release_unused(&self) -> usize {
        let mut layouts = self.layouts.write();
        let n_layouts = layouts.len();
        layouts.retain(|_, layout| Arc::strong_count(layout) > 1);
        n_layouts - layouts.len()
    }

    fn checked_existing(
        layout: &Arc<DescriptorSetLayout>,
        description: &DescriptorSetLayoutDescription,
    ) -> Result<Arc<DescriptorSetLayout>> {
        if layout.description != *description {
            bail!(
                "Descriptor set layout `{}` already exists with different bindings",
                layout.identifier
            );
        }
        log::trace!("Reusing descriptor set layout `{}`", layout.identifier);
        Ok(Arc::clone(layout))
    }
}
