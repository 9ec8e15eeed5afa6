//! An arena of reference counted values addressed by generational handles.

use std::{collections::VecDeque, fmt};

/// An arena storing values in a [`Vec`] and handing out [`ArenaHandle`]s
/// that stay valid for as long as the value is alive.
///
/// Each value carries a reference count that starts at one when the value is
/// inserted. Users sharing a value call [`retain`](Self::retain) and
/// [`release`](Self::release); the value is dropped and its location freed
/// for reuse when the count reaches zero.
///
/// Every location has a generation that is advanced whenever the location is
/// reused, so handles to a removed value never resolve to the value that
/// replaced it.
#[derive(Clone, Debug)]
pub struct GenerationalArena<T> {
    entries: Vec<ArenaEntry<T>>,
    free_list: VecDeque<usize>,
}

/// A handle to a value in a [`GenerationalArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaHandle {
    generation: u32,
    idx: u32,
}

#[derive(Clone, Debug)]
struct ArenaEntry<T> {
    generation: u32,
    ref_count: u32,
    value: Option<T>,
}

impl<T> GenerationalArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    /// Returns the number of live values in the arena.
    pub fn len(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }

    /// Whether the arena has no live values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the given handle refers to a live value.
    pub fn contains(&self, handle: ArenaHandle) -> bool {
        self.live_entry(handle).is_some()
    }

    /// Returns a reference to the value for the given handle, or [`None`] if
    /// the value has been removed.
    pub fn get(&self, handle: ArenaHandle) -> Option<&T> {
        self.live_entry(handle)
            .and_then(|entry| entry.value.as_ref())
    }

    /// Returns a mutable reference to the value for the given handle, or
    /// [`None`] if the value has been removed.
    pub fn get_mut(&mut self, handle: ArenaHandle) -> Option<&mut T> {
        self.entries
            .get_mut(handle.idx())
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    /// Returns the current reference count of the value for the given
    /// handle, or [`None`] if the value has been removed.
    pub fn ref_count(&self, handle: ArenaHandle) -> Option<u32> {
        self.live_entry(handle).map(|entry| entry.ref_count)
    }

    /// Inserts the given value with a reference count of one. A freed
    /// location is reused if one is available.
    pub fn insert(&mut self, value: T) -> ArenaHandle {
        if let Some(free_idx) = self.free_list.pop_front() {
            let entry = &mut self.entries[free_idx];
            entry.generation += 1;
            entry.ref_count = 1;
            entry.value = Some(value);
            ArenaHandle::new(entry.generation, free_idx)
        } else {
            let idx = self.entries.len();
            self.entries.push(ArenaEntry {
                generation: 0,
                ref_count: 1,
                value: Some(value),
            });
            ArenaHandle::new(0, idx)
        }
    }

    /// Increments the reference count of the value for the given handle and
    /// returns the new count.
    ///
    /// # Panics
    /// If the handle does not refer to a live value.
    pub fn retain(&mut self, handle: ArenaHandle) -> u32 {
        let entry = self
            .live_entry_mut(handle)
            .expect("Tried to retain a removed arena value");
        entry.ref_count += 1;
        entry.ref_count
    }

    /// Decrements the reference count of the value for the given handle. If
    /// the count reaches zero, the value is removed and returned.
    ///
    /// # Panics
    /// If the handle does not refer to a live value.
    pub fn release(&mut self, handle: ArenaHandle) -> Option<T> {
        let entry = self
            .live_entry_mut(handle)
            .expect("Tried to release a removed arena value");
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            self.remove(handle)
        } else {
            None
        }
    }

    /// Removes the value for the given handle regardless of its reference
    /// count and returns it, or returns [`None`] if it was already removed.
    pub fn remove(&mut self, handle: ArenaHandle) -> Option<T> {
        let entry = self.live_entry_mut(handle)?;
        entry.ref_count = 0;
        let value = entry.value.take();
        self.free_list.push_back(handle.idx());
        value
    }

    /// Returns an iterator over the handles and values of all live values in
    /// order of location.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaHandle, &T)> {
        self.entries.iter().enumerate().filter_map(|(idx, entry)| {
            entry
                .value
                .as_ref()
                .map(|value| (ArenaHandle::new(entry.generation, idx), value))
        })
    }

    fn live_entry(&self, handle: ArenaHandle) -> Option<&ArenaEntry<T>> {
        self.entries
            .get(handle.idx())
            .filter(|entry| entry.generation == handle.generation && entry.value.is_some())
    }

    fn live_entry_mut(&mut self, handle: ArenaHandle) -> Option<&mut ArenaEntry<T>> {
        self.entries
            .get_mut(handle.idx())
            .filter(|entry| entry.generation == handle.generation && entry.value.is_some())
    }
}

impl<T> Default for GenerationalArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaHandle {
    fn new(generation: u32, idx: usize) -> Self {
        Self {
            generation,
            idx: idx as u32,
        }
    }

    /// Returns the location of the value in the arena.
    pub fn idx(&self) -> usize {
        self.idx as usize
    }

    /// Returns the generation of the location when the handle was created.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ArenaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.idx, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_arena_works() {
        let arena = GenerationalArena::<f32>::new();
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn inserting_into_empty_arena_works() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert("diffuse.png");

        assert_eq!(handle.idx(), 0);
        assert_eq!(handle.generation(), 0);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(handle), Some(&"diffuse.png"));
        assert_eq!(arena.ref_count(handle), Some(1));
    }

    #[test]
    fn releasing_only_reference_removes_value() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert(1.0);

        assert_eq!(arena.release(handle), Some(1.0));
        assert!(arena.is_empty());
        assert!(!arena.contains(handle));
        assert_eq!(arena.get(handle), None);
        assert_eq!(arena.get_mut(handle), None);
    }

    #[test]
    fn retained_value_survives_one_release() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert(1.0);

        assert_eq!(arena.retain(handle), 2);
        assert_eq!(arena.release(handle), None);
        assert_eq!(arena.ref_count(handle), Some(1));
        assert_eq!(arena.get(handle), Some(&1.0));

        assert_eq!(arena.release(handle), Some(1.0));
        assert!(!arena.contains(handle));
    }

    #[test]
    #[should_panic]
    fn retaining_removed_value_fails() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert(1.0);
        arena.remove(handle);
        arena.retain(handle);
    }

    #[test]
    #[should_panic]
    fn releasing_removed_value_fails() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert(1.0);
        arena.remove(handle);
        arena.release(handle);
    }

    #[test]
    fn removing_twice_gives_none() {
        let mut arena = GenerationalArena::new();
        let handle = arena.insert(1.0);
        assert_eq!(arena.remove(handle), Some(1.0));
        assert_eq!(arena.remove(handle), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn inserting_after_remove_reuses_location_with_new_generation() {
        let mut arena = GenerationalArena::new();
        let first = arena.insert(0.0);
        let second = arena.insert(1.0);
        arena.remove(first);

        let third = arena.insert(2.0);
        assert_eq!(third.idx(), first.idx());
        assert_eq!(third.generation(), 1);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(third), Some(&2.0));
        assert_eq!(arena.get(second), Some(&1.0));

        let fourth = arena.insert(3.0);
        assert_eq!(fourth.idx(), 2);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn iterating_skips_removed_values() {
        let mut arena = GenerationalArena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        arena.remove(b);

        let live: Vec<_> = arena.iter().collect();
        assert_eq!(live, vec![(a, &'a'), (c, &'c')]);
    }
}
