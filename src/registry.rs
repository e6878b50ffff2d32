//! Content-addressed resource caches.
//!
//! Every shared resource (fonts, alpha states, images) is looked up by a key
//! before an object id is spent on it. The first lookup allocates the id and
//! a page-level resource name; later lookups return the same pair. Iteration
//! follows insertion order so flushed output is reproducible.

use crate::error::Result;
use crate::object::ObjectRef;
use crate::writer::ObjectSink;
use indexmap::IndexMap;
use std::hash::Hash;

/// One cached resource.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Indirect object id reserved for the resource
    pub id: ObjectRef,
    /// Name used in page /Resources dictionaries
    pub name: String,
    /// Builder state carried until flush
    pub value: V,
}

/// Outcome of [`ResourceCache::lookup_or_allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The key was already known
    Hit(ObjectRef),
    /// A new id was allocated for the key
    Allocated(ObjectRef),
}

impl Lookup {
    /// The id regardless of whether it was new.
    pub fn id(self) -> ObjectRef {
        match self {
            Lookup::Hit(id) | Lookup::Allocated(id) => id,
        }
    }

    /// Whether this lookup created the entry.
    pub fn is_new(self) -> bool {
        matches!(self, Lookup::Allocated(_))
    }
}

/// Map from resource key to reserved object id, resource name and value.
#[derive(Debug, Clone)]
pub struct ResourceCache<K, V = ()> {
    prefix: &'static str,
    entries: IndexMap<K, CacheEntry<V>>,
}

impl<K: Hash + Eq, V> ResourceCache<K, V> {
    /// Create an empty cache; resource names are `prefix` followed by a counter.
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            entries: IndexMap::new(),
        }
    }

    /// Look up an existing entry.
    pub fn get(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Look up an existing entry mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut CacheEntry<V>> {
        self.entries.get_mut(key)
    }

    /// Whether the key has an entry.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Return the entry for `key`, creating it with `make` if needed.
    ///
    /// The id is allocated only after `make` succeeds, so a failed build
    /// leaves no dangling id behind. The flag is true when the entry is new.
    pub fn lookup_or_insert_with<F>(
        &mut self,
        key: K,
        sink: &mut dyn ObjectSink,
        make: F,
    ) -> Result<(&mut CacheEntry<V>, bool)>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(index) = self.entries.get_index_of(&key) {
            return Ok((&mut self.entries[index], false));
        }
        let value = make()?;
        let id = sink.allocate()?;
        let name = format!("{}{}", self.prefix, self.entries.len() + 1);
        let (index, _) = self.entries.insert_full(key, CacheEntry { id, name, value });
        Ok((&mut self.entries[index], true))
    }

    /// Number of cached resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &CacheEntry<V>)> {
        self.entries.iter()
    }

    /// Consume the cache, yielding entries in insertion order.
    pub fn into_entries(self) -> impl Iterator<Item = (K, CacheEntry<V>)> {
        self.entries.into_iter()
    }
}

impl<K: Hash + Eq, V: Default> ResourceCache<K, V> {
    /// Return the id for `key`, allocating one on first use.
    pub fn lookup_or_allocate(&mut self, key: K, sink: &mut dyn ObjectSink) -> Result<Lookup> {
        let (entry, created) = self.lookup_or_insert_with(key, sink, || Ok(V::default()))?;
        Ok(if created {
            Lookup::Allocated(entry.id)
        } else {
            Lookup::Hit(entry.id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::writer::MemorySink;
    use proptest::prelude::*;

    #[test]
    fn test_same_key_same_id() {
        let mut sink = MemorySink::new();
        let mut cache: ResourceCache<String> = ResourceCache::new("F");
        let a = cache.lookup_or_allocate("cmr10".to_string(), &mut sink).unwrap();
        let b = cache.lookup_or_allocate("cmr10".to_string(), &mut sink).unwrap();
        assert!(a.is_new());
        assert_eq!(b, Lookup::Hit(a.id()));
        assert_eq!(sink.allocated(), 1);
    }

    #[test]
    fn test_resource_names_follow_insertion() {
        let mut sink = MemorySink::new();
        let mut cache: ResourceCache<u16> = ResourceCache::new("gs");
        cache.lookup_or_allocate(500, &mut sink).unwrap();
        cache.lookup_or_allocate(250, &mut sink).unwrap();
        let names: Vec<_> = cache.iter().map(|(k, e)| (*k, e.name.clone())).collect();
        assert_eq!(names, vec![(500, "gs1".to_string()), (250, "gs2".to_string())]);
    }

    #[test]
    fn test_failed_build_allocates_nothing() {
        let mut sink = MemorySink::new();
        let mut cache: ResourceCache<&str, u8> = ResourceCache::new("Fm");
        let result = cache.lookup_or_insert_with("broken.eps", &mut sink, || {
            Err(Error::ImageImport("no page".to_string()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert_eq!(sink.allocated(), 0);
    }

    proptest! {
        #[test]
        fn prop_distinct_keys_never_collide(keys in proptest::collection::vec(0u16..50, 1..40)) {
            let mut sink = MemorySink::new();
            let mut cache: ResourceCache<u16> = ResourceCache::new("R");
            let mut seen = std::collections::HashMap::new();
            for k in &keys {
                let id = cache.lookup_or_allocate(*k, &mut sink).unwrap().id();
                if let Some(prev) = seen.insert(*k, id) {
                    prop_assert_eq!(prev, id);
                }
            }
            let distinct: std::collections::HashSet<_> = seen.values().collect();
            prop_assert_eq!(distinct.len(), seen.len());
            prop_assert_eq!(cache.len(), seen.len());
        }
    }
}
