//! Hashing of strings that can be turned back into the hashed string.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::{
    cmp,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
};

/// A 64-bit hash of a string.
///
/// This object remembers the original string and can be formatted into it by
/// means of the [`Display`](fmt::Display) trait. Comparison and hashing only
/// involve the hash value, so a hash of a literal and a hash of an owned
/// string with the same content are equal.
#[derive(Copy, Clone, Debug)]
pub struct StringHash {
    string_hash: u64,
    string: Option<&'static str>,
}

lazy_static! {
    static ref STRING_HASH_REGISTRY: Mutex<HashMap<u64, String>> = Mutex::new(HashMap::new());
}

/// Computes the 64-bit FNV-1a hash of the given string at compile time.
pub const fn compute_hash_str_64(string: &str) -> u64 {
    const_fnv1a_hash::fnv1a_hash_str_64(string)
}

impl StringHash {
    /// Creates a hash of the given string literal. This method
    /// is evaluated at compile time.
    pub const fn of_literal(string: &'static str) -> Self {
        Self {
            string_hash: compute_hash_str_64(string),
            string: Some(string),
        }
    }

    /// Creates a hash of the given string.
    ///
    /// The string and associated hash are inserted into a global registry so
    /// that the string can be looked up when the hash is displayed.
    ///
    /// # Concurrency
    /// The method has to temporarily acquire a lock on the global string
    /// registry in order to record the hash and string pair.
    pub fn of_owned(string: impl Into<String>) -> Self {
        let string = string.into();
        let string_hash = compute_hash_str_64(&string);

        STRING_HASH_REGISTRY
            .lock()
            .entry(string_hash)
            .or_insert(string);

        Self {
            string_hash,
            string: None,
        }
    }

    /// Returns the raw hash value.
    pub const fn hash_value(&self) -> u64 {
        self.string_hash
    }
}

impl fmt::Display for StringHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.string {
            Some(string) => write!(f, "{}", string),
            None => match STRING_HASH_REGISTRY.lock().get(&self.string_hash) {
                Some(string) => write!(f, "{}", string),
                None => write!(f, "#{:016x}", self.string_hash),
            },
        }
    }
}

impl PartialEq for StringHash {
    fn eq(&self, other: &Self) -> bool {
        self.string_hash == other.string_hash
    }
}

impl Eq for StringHash {}

impl Ord for StringHash {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.string_hash.cmp(&other.string_hash)
    }
}

impl PartialOrd for StringHash {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for StringHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.string_hash.hash(state);
    }
}
