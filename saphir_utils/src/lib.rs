//! General utilities for shader program generation.

#[macro_use]
mod macros;

mod generational_arena;
mod hash;
mod slot_allocator;

pub use generational_arena::{ArenaHandle, GenerationalArena};
pub use hash::{StringHash, compute_hash_str_64};
pub use slot_allocator::{SlotAllocator, SlotRemapping};
