//! Fast hash map alias for per-source bookkeeping.
//!
//! Work queues, activity snapshots and the in-memory stores are all keyed by
//! short source identifiers, hashed with `rustc-hash`.
//!
//! # Examples
//!
//! ```
//! use lt_core::{FxHashMap, SourceId, fx_hash_map};
//!
//! let mut offsets: FxHashMap<SourceId, u64> = fx_hash_map();
//! offsets.insert(SourceId::new("server-1"), 4096);
//! assert_eq!(offsets.get(&SourceId::new("server-1")), Some(&4096));
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_map_keyed_by_string() {
        let mut map: FxHashMap<String, u64> = fx_hash_map();
        map.insert("alpha".to_owned(), 1);
        map.insert("bravo".to_owned(), 2);
        assert_eq!(map.get("alpha"), Some(&1));
        assert_eq!(map.get("charlie"), None);
    }
}
