//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are randomly seeded, which would make
//! iteration order, and therefore anything derived from it, vary between runs of the same model.
//!
//! `HashMap<K, V, S>` does not have a `new` method by default. Use `HashMap::default()` to create
//! a new hashmap with the default hasher, or bring the `HashMapExt` / `HashSetExt` traits into
//! scope.
//!
//! The `hash_str` free function is used to derive independent random number streams from one
//! trajectory seed in `crate::random`.

use std::hash::{BuildHasher, Hasher};

use rustc_hash::{FxBuildHasher, FxHasher};

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;

/// Provides `new` and `with_capacity` for the deterministic `HashMap`.
pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::with_hasher(FxBuildHasher)
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

/// Provides `new` and `with_capacity` for the deterministic `HashSet`.
pub trait HashSetExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::with_hasher(FxBuildHasher)
    }

    fn with_capacity(capacity: usize) -> Self {
        HashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
    }
}

/// A convenience method to compute the hash of a `&str`.
pub fn hash_str(data: &str) -> u64 {
    let mut hasher: FxHasher = FxBuildHasher.build_hasher();
    hasher.write(data.as_bytes());
    hasher.finish()
}
