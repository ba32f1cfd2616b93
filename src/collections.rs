//! Shared collection aliases, following the teacher crate's convention of
//! centralizing hasher choice in one place (`route3_core::collections`)
//! rather than scattering `HashMap<K, V, RandomState>` everywhere.

use std::hash::BuildHasherDefault;

use ahash::AHasher;
pub use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

pub type AHashMap<K, V> = HashMap<K, V, BuildHasherDefault<AHasher>>;
pub type AHashSet<V> = HashSet<V, BuildHasherDefault<AHasher>>;
pub type AIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<AHasher>>;

/// Design Notes §9: "hand-grown per-cell variable-length lists with
/// realloc for every congestion add/remove" are replaced with a
/// small-vector carrying inline capacity for the common case (most cells
/// host 0-4 traversing paths), only spilling to the heap for crowded
/// cells. `InlineVec` is shared by both the congestion list and the
/// path-center list in `grid::Cell`.
pub type InlineVec<T> = SmallVec<[T; 4]>;
