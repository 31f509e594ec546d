//! Per-instance keyed storage.
//!
//! [`InstanceStorage`] lets a combiner carry values it never declared as
//! fields. It lives inside the combiner's [`Pipeline`](crate::Pipeline)
//! record, so everything stored here is released when the combiner is
//! dropped. The storage never points back at its owner.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

type Slot = Arc<dyn Any + Send + Sync>;

/// A typed key into [`InstanceStorage`].
///
/// Keys are compared by name. Declare them as constants:
///
/// ```ignore
/// const RETRIES: StorageKey<AtomicU32> = StorageKey::new("search.retries");
/// ```
pub struct StorageKey<V> {
    name: &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> StorageKey<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for StorageKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for StorageKey<V> {}

impl<V> fmt::Debug for StorageKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorageKey").field(&self.name).finish()
    }
}

/// Keyed, type-erased values attached to one combiner instance.
///
/// Absence of a key is the normal state before first use, never an error.
/// Reads with a default evaluate the default at most once per key.
#[derive(Default)]
pub struct InstanceStorage {
    slots: DashMap<&'static str, Slot>,
}

impl InstanceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the value under `key`, if one of type `V` is stored.
    pub fn get<V>(&self, key: &StorageKey<V>) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        // Clone the slot out so the shard lock is released before downcasting.
        let slot = self.slots.get(key.name)?.value().clone();
        slot.downcast::<V>().ok()
    }

    /// Read the value under `key`, storing `default()` first if absent.
    ///
    /// Repeated calls return the same `Arc` until the key is overwritten. A
    /// value of another type stored under the same name is replaced.
    ///
    /// `default` runs while the key's shard is locked and must not touch this
    /// storage.
    pub fn get_or_insert_with<V, F>(&self, key: &StorageKey<V>, default: F) -> Arc<V>
    where
        V: Any + Send + Sync,
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        match self.slots.entry(key.name) {
            Entry::Occupied(mut entry) => match entry.get().clone().downcast::<V>() {
                Ok(value) => value,
                Err(_) => {
                    tracing::trace!(key = key.name, "replacing storage slot of another type");
                    let value = Arc::new(default());
                    entry.insert(value.clone());
                    value
                }
            },
            Entry::Vacant(entry) => {
                let value = Arc::new(default());
                entry.insert(value.clone());
                value
            }
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn set<V>(&self, key: &StorageKey<V>, value: V) -> Arc<V>
    where
        V: Any + Send + Sync,
    {
        let value = Arc::new(value);
        self.slots.insert(key.name, value.clone());
        value
    }

    /// Remove the value under `key`. Returns whether anything was stored.
    pub fn remove<V>(&self, key: &StorageKey<V>) -> bool {
        self.slots.remove(key.name).is_some()
    }

    pub fn contains<V>(&self, key: &StorageKey<V>) -> bool {
        self.slots.contains_key(key.name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for InstanceStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&'static str> = self.slots.iter().map(|slot| *slot.key()).collect();
        keys.sort_unstable();
        f.debug_struct("InstanceStorage").field("keys", &keys).finish()
    }
}
