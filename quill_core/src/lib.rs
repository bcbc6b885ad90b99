#![deny(clippy::all)]

pub mod binary;
pub mod chunk;
pub mod constants;
pub mod import;
pub mod symbol;
pub mod utils;

use fnv::FnvBuildHasher;

/// The hash map used throughout quill
pub type Map<K, V> = hashbrown::HashMap<K, V, FnvBuildHasher>;

/// The hash set used throughout quill
pub type Set<K> = hashbrown::HashSet<K, FnvBuildHasher>;
