//! Allocation of stable integer slots for keyed objects.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    hash::Hash,
};

/// Allocator assigning each registered key an integer slot.
///
/// A slot stays with its key until the key is freed. Freeing a key never
/// moves other keys; the freed slot is handed out again before any slot past
/// the current end, lowest freed slot first. Slots are only compacted by an
/// explicit call to [`defragment`](Self::defragment).
#[derive(Clone, Debug)]
pub struct SlotAllocator<K> {
    keys_at_slots: Vec<Option<K>>,
    slots_for_keys: HashMap<K, usize>,
    free_slots: BTreeSet<usize>,
}

/// A key that was moved to a different slot by
/// [`SlotAllocator::defragment`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRemapping<K> {
    pub key: K,
    pub old_slot: usize,
    pub new_slot: usize,
}

impl<K> SlotAllocator<K>
where
    K: Copy + Hash + Eq + Debug,
{
    /// Creates a new allocator with no slots.
    pub fn new() -> Self {
        Self {
            keys_at_slots: Vec::new(),
            slots_for_keys: HashMap::new(),
            free_slots: BTreeSet::new(),
        }
    }

    /// Returns the number of keys currently holding a slot.
    pub fn n_occupied(&self) -> usize {
        self.slots_for_keys.len()
    }

    /// Whether no key currently holds a slot.
    pub fn is_empty(&self) -> bool {
        self.slots_for_keys.is_empty()
    }

    /// Returns the number of slots that have ever been handed out and not
    /// compacted away, including freed ones. All slots lie below this number.
    pub fn slot_count(&self) -> usize {
        self.keys_at_slots.len()
    }

    /// Whether the given key holds a slot.
    pub fn contains_key(&self, key: K) -> bool {
        self.slots_for_keys.contains_key(&key)
    }

    /// Returns the slot of the given key, or [`None`] if the key has no slot.
    pub fn slot(&self, key: K) -> Option<usize> {
        self.slots_for_keys.get(&key).copied()
    }

    /// Returns the key holding the given slot, or [`None`] if the slot is
    /// free or out of range.
    pub fn key_at_slot(&self, slot: usize) -> Option<K> {
        self.keys_at_slots.get(slot).copied().flatten()
    }

    /// Assigns a slot to the given key and returns it. If the key already
    /// holds a slot, that slot is returned and nothing changes.
    pub fn allocate(&mut self, key: K) -> usize {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        let slot = if let Some(slot) = self.free_slots.pop_first() {
            self.keys_at_slots[slot] = Some(key);
            slot
        } else {
            self.keys_at_slots.push(Some(key));
            self.keys_at_slots.len() - 1
        };
        self.slots_for_keys.insert(key, slot);
        slot
    }

    /// Frees the slot of the given key and returns it, or returns [`None`]
    /// if the key holds no slot.
    pub fn free(&mut self, key: K) -> Option<usize> {
        let slot = self.slots_for_keys.remove(&key)?;
        self.keys_at_slots[slot] = None;
        self.free_slots.insert(slot);
        Some(slot)
    }

    /// Returns an iterator over each occupied slot and its key, in ascending
    /// slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, K)> + '_ {
        self.keys_at_slots
            .iter()
            .enumerate()
            .filter_map(|(slot, key)| key.map(|key| (slot, key)))
    }

    /// Moves keys from the highest occupied slots into the lowest free slots
    /// until the occupied slots form a contiguous range starting at zero.
    ///
    /// # Returns
    /// The keys that moved, with their old and new slots.
    pub fn defragment(&mut self) -> Vec<SlotRemapping<K>> {
        let mut remappings = Vec::new();

        while let Some(free_slot) = self.free_slots.pop_first() {
            while matches!(self.keys_at_slots.last(), Some(None)) {
                self.keys_at_slots.pop();
            }
            if free_slot >= self.keys_at_slots.len() {
                continue;
            }
            let old_slot = self.keys_at_slots.len() - 1;
            let Some(key) = self.keys_at_slots.pop().flatten() else {
                continue;
            };
            self.keys_at_slots[free_slot] = Some(key);
            self.slots_for_keys.insert(key, free_slot);
            remappings.push(SlotRemapping {
                key,
                old_slot,
                new_slot: free_slot,
            });
        }
        while matches!(self.keys_at_slots.last(), Some(None)) {
            self.keys_at_slots.pop();
        }

        remappings
    }
}

impl<K> Default for SlotAllocator<K>
where
    K: Copy + Hash + Eq + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
