//! Uniform buffers holding the blocks of many objects in fixed slots.

use anyhow::{Result, anyhow, bail};
use bytemuck::Pod;
use parking_lot::Mutex;
use saphir_utils::{SlotAllocator, SlotRemapping, StringHash};
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt::Debug,
    hash::Hash,
};

/// A CPU-side buffer of uniform blocks that share a layout, where every
/// registered key owns one block-aligned slot.
///
/// A block is bound by offsetting into the buffer by
/// [`element_offset`](Self::element_offset) of its slot. Slots are stable:
/// removing a key never moves other keys, and the lowest freed slot is
/// reused first. The buffer grows on demand up to a maximum number of
/// elements and is never shrunk. Compaction only happens through an explicit
/// call to [`defragment`](Self::defragment).
#[derive(Debug)]
pub struct SharedUniformBuffer<K> {
    identifier: StringHash,
    element_size: usize,
    block_aligned_size: usize,
    max_elements: usize,
    slots: SlotAllocator<K>,
    data: Vec<u8>,
    capacity: usize,
    reallocation_count: usize,
}

/// Registry of [`SharedUniformBuffer`]s keyed by the identifier of the
/// uniform layout they hold.
///
/// A buffer is created when the first key is registered for its identifier
/// and destroyed when its last key is deregistered.
///
/// # Concurrency
/// All buffers live behind a single lock, which is held for the duration of
/// each method call.
#[derive(Debug)]
pub struct SharedUniformBufferRegistry<K> {
    block_aligned_size: usize,
    max_elements: usize,
    buffers: Mutex<HashMap<StringHash, SharedUniformBuffer<K>>>,
}

impl<K> SharedUniformBuffer<K>
where
    K: Copy + Hash + Eq + Debug,
{
    /// Creates a new empty buffer for elements of the given size, each
    /// placed at a multiple of `block_aligned_size`.
    ///
    /// # Errors
    /// Returns an error if the block aligned size is not a power of two, if
    /// the element size is zero or exceeds the block aligned size, or if
    /// `max_elements` is zero.
    pub fn new(
        identifier: StringHash,
        element_size: usize,
        block_aligned_size: usize,
        max_elements: usize,
    ) -> Result<Self> {
        if !block_aligned_size.is_power_of_two() {
            bail!(
                "Block alignment {} of shared uniform buffer `{}` is not a power of two",
                block_aligned_size,
                identifier
            );
        }
        if element_size == 0 {
            bail!("Shared uniform buffer `{}` has zero-sized elements", identifier);
        }
        if element_size > block_aligned_size {
            bail!(
                "Element size {} of shared uniform buffer `{}` exceeds the block alignment {}",
                element_size,
                identifier,
                block_aligned_size
            );
        }
        if max_elements == 0 {
            bail!("Shared uniform buffer `{}` can hold no elements", identifier);
        }
        Ok(Self {
            identifier,
            element_size,
            block_aligned_size,
            max_elements,
            slots: SlotAllocator::new(),
            data: Vec::new(),
            capacity: 0,
            reallocation_count: 0,
        })
    }

    pub fn identifier(&self) -> StringHash {
        self.identifier
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn block_aligned_size(&self) -> usize {
        self.block_aligned_size
    }

    pub fn max_elements(&self) -> usize {
        self.max_elements
    }

    /// Returns the number of elements the buffer can hold before it has to
    /// grow.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of times the buffer has grown.
    pub fn reallocation_count(&self) -> usize {
        self.reallocation_count
    }

    /// Returns the number of elements currently in the buffer.
    pub fn n_elements(&self) -> usize {
        self.slots.n_occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    /// Returns the slot of the element for the given key.
    pub fn slot(&self, key: K) -> Option<usize> {
        self.slots.slot(key)
    }

    /// Returns the byte offset of the given slot in the buffer.
    pub fn element_offset(&self, slot: usize) -> usize {
        slot * self.block_aligned_size
    }

    /// Returns the raw bytes of the whole buffer, including unoccupied slots.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the bytes of the element in the given slot.
    pub fn element_bytes(&self, slot: usize) -> Option<&[u8]> {
        self.slots.key_at_slot(slot)?;
        let offset = self.element_offset(slot);
        Some(&self.data[offset..offset + self.element_size])
    }

    /// Adds an element for the given key and returns its slot. The element
    /// data is zeroed. Adding a key that is already present returns its
    /// existing slot.
    ///
    /// # Errors
    /// Returns an error if the buffer already holds its maximum number of
    /// elements.
    pub fn add_element(&mut self, key: K) -> Result<usize> {
        if let Some(slot) = self.slots.slot(key) {
            return Ok(slot);
        }
        if self.slots.n_occupied() >= self.max_elements {
            bail!(
                "Shared uniform buffer `{}` is full ({} elements)",
                self.identifier,
                self.max_elements
            );
        }
        let slot = self.slots.allocate(key);
        if slot >= self.capacity {
            self.grow();
        }
        Ok(slot)
    }

    /// Removes the element for the given key and returns the slot it had.
    /// The slot is zeroed and becomes available for reuse.
    ///
    /// # Errors
    /// Returns an error if there is no element for the key.
    pub fn remove_element(&mut self, key: K) -> Result<usize> {
        let slot = self.slots.free(key).ok_or_else(|| {
            anyhow!(
                "No element for {:?} in shared uniform buffer `{}`",
                key,
                self.identifier
            )
        })?;
        let offset = self.element_offset(slot);
        self.data[offset..offset + self.block_aligned_size].fill(0);
        Ok(slot)
    }

    /// Copies the given bytes into the element in the given slot.
    ///
    /// # Errors
    /// Returns an error if the slot is not occupied or if the data is larger
    /// than an element.
    pub fn write_element_data(&mut self, slot: usize, data: &[u8]) -> Result<()> {
        if self.slots.key_at_slot(slot).is_none() {
            bail!(
                "Slot {} of shared uniform buffer `{}` is not occupied",
                slot,
                self.identifier
            );
        }
        if data.len() > self.element_size {
            bail!(
                "Tried to write {} bytes into element of size {} in shared uniform buffer `{}`",
                data.len(),
                self.element_size,
                self.identifier
            );
        }
        let offset = self.element_offset(slot);
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies the given uniform into the element in the given slot.
    ///
    /// # Errors
    /// See [`write_element_data`](Self::write_element_data).
    pub fn write_element<U: Pod>(&mut self, slot: usize, uniform: &U) -> Result<()> {
        self.write_element_data(slot, bytemuck::bytes_of(uniform))
    }

    /// Moves elements from the highest slots into freed lower slots so that
    /// the occupied slots become contiguous from zero.
    ///
    /// # Returns
    /// The keys whose slots changed. Anything holding on to old slots must be
    /// updated.
    pub fn defragment(&mut self) -> Vec<SlotRemapping<K>> {
        let remappings = self.slots.defragment();
        for remapping in &remappings {
            let old_offset = self.element_offset(remapping.old_slot);
            let new_offset = self.element_offset(remapping.new_slot);
            self.data
                .copy_within(old_offset..old_offset + self.block_aligned_size, new_offset);
            self.data[old_offset..old_offset + self.block_aligned_size].fill(0);
        }
        if !remappings.is_empty() {
            log::debug!(
                "Defragmented shared uniform buffer `{}` ({} elements moved)",
                self.identifier,
                remappings.len()
            );
        }
        remappings
    }

    fn grow(&mut self) {
        // Add one before doubling to avoid getting stuck at zero
        let new_capacity = ((self.capacity + 1) * 2).min(self.max_elements);
        self.data.resize(new_capacity * self.block_aligned_size, 0);
        self.capacity = new_capacity;
        self.reallocation_count += 1;
        log::debug!(
            "Grew shared uniform buffer `{}` to {} elements",
            self.identifier,
            new_capacity
        );
    }
}

impl<K> SharedUniformBufferRegistry<K>
where
    K: Copy + Hash + Eq + Debug,
{
    /// Creates a new empty registry whose buffers place elements at
    /// multiples of `block_aligned_size` and hold at most `max_elements`
    /// each.
    pub fn new(block_aligned_size: usize, max_elements: usize) -> Self {
        Self {
            block_aligned_size,
            max_elements,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of buffers currently alive.
    pub fn n_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn contains_buffer(&self, identifier: StringHash) -> bool {
        self.buffers.lock().contains_key(&identifier)
    }

    /// Adds an element for the given key to the buffer with the given
    /// identifier, creating the buffer if needed, and returns the slot.
    ///
    /// # Errors
    /// Returns an error if an existing buffer for the identifier has a
    /// different element size, or if the element can not be added.
    pub fn register(&self, identifier: StringHash, element_size: usize, key: K) -> Result<usize> {
        let mut buffers = self.buffers.lock();
        let buffer = match buffers.entry(identifier) {
            Entry::Occupied(entry) => {
                let buffer = entry.into_mut();
                if buffer.element_size() != element_size {
                    bail!(
                        "Shared uniform buffer `{}` holds elements of size {}, not {}",
                        identifier,
                        buffer.element_size(),
                        element_size
                    );
                }
                buffer
            }
            Entry::Vacant(entry) => {
                log::debug!("Creating shared uniform buffer `{}`", identifier);
                entry.insert(SharedUniformBuffer::new(
                    identifier,
                    element_size,
                    self.block_aligned_size,
                    self.max_elements,
                )?)
            }
        };
        buffer.add_element(key)
    }

    /// Removes the element for the given key from the buffer with the given
    /// identifier. The buffer is destroyed if this was its last element.
    ///
    /// # Errors
    /// Returns an error if there is no such buffer or element.
    pub fn deregister(&self, identifier: StringHash, key: K) -> Result<()> {
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .get_mut(&identifier)
            .ok_or_else(|| anyhow!("No shared uniform buffer `{}`", identifier))?;
        buffer.remove_element(key)?;
        if buffer.is_empty() {
            log::debug!("Destroying shared uniform buffer `{}`", identifier);
            buffers.remove(&identifier);
        }
        Ok(())
    }

    /// Copies the given bytes into the element in the given slot of the
    /// buffer with the given identifier.
    ///
    /// # Errors
    /// Returns an error if there is no such buffer, or see
    /// [`SharedUniformBuffer::write_element_data`].
    pub fn write(&self, identifier: StringHash, slot: usize, data: &[u8]) -> Result<()> {
        self.buffers
            .lock()
            .get_mut(&identifier)
            .ok_or_else(|| anyhow!("No shared uniform buffer `{}`", identifier))?
            .write_element_data(slot, data)
    }

    /// Calls the given closure with the buffer for the given identifier, if
    /// it exists.
    pub fn with_buffer<R>(
        &self,
        identifier: StringHash,
        f: impl FnOnce(&SharedUniformBuffer<K>) -> R,
    ) -> Option<R> {
        self.buffers.lock().get(&identifier).map(f)
    }

    /// Calls the given closure with mutable access to the buffer for the
    /// given identifier, if it exists.
    pub fn with_buffer_mut<R>(
        &self,
        identifier: StringHash,
        f: impl FnOnce(&mut SharedUniformBuffer<K>) -> R,
    ) -> Option<R> {
        self.buffers.lock().get_mut(&identifier).map(f)
    }
}
