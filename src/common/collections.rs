//! Hash collections used throughout the crate. FxHash is faster than the
//! default SipHash for the small integer and string keys we index by.

pub use std::collections::hash_map;
pub use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;
