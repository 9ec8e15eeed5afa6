//! Cache of generated programs.

use crate::{
    geometry::GeometryFlags, light::LightSetShape, program::Program,
    render_pass::RenderPassKind,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::Arc,
};
use xxhash_rust::xxh3::xxh3_64;

/// Everything that decides the content of a generated program.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramCacheKey {
    pub name: String,
    pub pass: RenderPassKind,
    /// Structural identifier of the material, if any.
    pub material: Option<String>,
    pub light_shape: LightSetShape,
    pub geometry: GeometryFlags,
    pub instanced: bool,
}

/// Programs shared by everything drawn with the same [`ProgramCacheKey`].
///
/// Programs for light passes depend on the lights in the scene, and are
/// dropped when [`sync_scene_generation`](Self::sync_scene_generation) sees
/// a new scene generation.
#[derive(Debug, Default)]
pub struct ProgramCache {
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    programs: HashMap<ProgramCacheKey, Arc<Program>>,
    scene_generation: Option<u64>,
}

impl ProgramCacheKey {
    /// Returns a canonical text form of the key, which is stable across
    /// runs.
    pub fn canonical_text(&self) -> String {
        format!(
            "{}|{}|{}|{}|{:#06x}|{}",
            self.name,
            self.pass,
            self.material.as_deref().unwrap_or("NoMaterial"),
            self.light_shape,
            self.geometry.bits(),
            if self.instanced { "Instanced" } else { "Single" }
        )
    }

    /// Returns a hash of the canonical text of the key.
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.canonical_text().as_bytes())
    }
}

impl fmt::Display for ProgramCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_text())
    }
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ProgramCacheKey) -> Option<Arc<Program>> {
        self.state.lock().programs.get(key).cloned()
    }

    pub fn contains(&self, key: &ProgramCacheKey) -> bool {
        self.state.lock().programs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds the given program under its key, unless a program with the same
    /// key is already cached.
    ///
    /// # Returns
    /// The cached program for the key.
    pub fn insert(&self, program: Program) -> Arc<Program> {
        match self.state.lock().programs.entry(program.key().clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(program))),
        }
    }

    /// Records the given scene generation. If it differs from the last one
    /// seen, every cached light pass program is dropped.
    ///
    /// # Returns
    /// The number of dropped programs.
    pub fn sync_scene_generation(&self, generation: u64) -> usize {
        let mut state = self.state.lock();
        if state.scene_generation == Some(generation) {
            return 0;
        }
        let previous = state.scene_generation.replace(generation);
        if previous.is_none() {
            return 0;
        }
        let n_programs = state.programs.len();
        state
            .programs
            .retain(|key, _| key.pass.is_ambient_only());
        let n_dropped = n_programs - state.programs.len();
        if n_dropped > 0 {
            log::debug!(
                "Dropped {} light pass programs for scene generation {}",
                n_dropped,
                generation
            );
        }
        n_dropped
    }

    pub fn clear(&self) {
        self.state.lock().programs.clear();
    }
}
