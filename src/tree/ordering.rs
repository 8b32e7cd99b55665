//! Key extraction and comparison
//!
//! Every tree orders its values by `compare(key_of(a), key_of(b))`. The pair
//! is fixed when the tree is created and shared (cheaply cloned) with trees
//! parsed from the same file.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Comparator<K> = Arc<dyn Fn(&K, &K) -> Ordering + Send + Sync>;
type KeyAccessor<V, K> = Arc<dyn Fn(&V) -> &K + Send + Sync>;

fn identity<V>(value: &V) -> &V {
    value
}

/// Comparator plus key accessor
pub struct KeyOrdering<V, K: ?Sized = V> {
    compare: Comparator<K>,
    key_of: KeyAccessor<V, K>,
}

impl<V: Ord + 'static> KeyOrdering<V, V> {
    /// Values are their own keys, ordered by `Ord`
    pub fn natural() -> Self {
        Self {
            compare: Arc::new(|a: &V, b: &V| a.cmp(b)),
            key_of: Arc::new(identity::<V>),
        }
    }
}

impl<V: Ord + 'static> Default for KeyOrdering<V, V> {
    fn default() -> Self {
        Self::natural()
    }
}

impl<V, K: Ord + ?Sized + 'static> KeyOrdering<V, K> {
    /// Order values by a key borrowed from them, using the key's `Ord`
    pub fn by_key<F>(key_of: F) -> Self
    where
        F: Fn(&V) -> &K + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(|a: &K, b: &K| a.cmp(b)),
            key_of: Arc::new(key_of),
        }
    }
}

impl<V, K: ?Sized> KeyOrdering<V, K> {
    pub fn new<F, C>(key_of: F, compare: C) -> Self
    where
        F: Fn(&V) -> &K + Send + Sync + 'static,
        C: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Self { compare: Arc::new(compare), key_of: Arc::new(key_of) }
    }

    /// Same key accessor, different comparator
    pub fn with_comparator<C>(self, compare: C) -> Self
    where
        C: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Self { compare: Arc::new(compare), key_of: self.key_of }
    }

    pub fn key_of<'v>(&self, value: &'v V) -> &'v K {
        (self.key_of)(value)
    }

    pub fn compare_keys(&self, a: &K, b: &K) -> Ordering {
        (self.compare)(a, b)
    }

    /// `compare(key_of(value), key)`
    pub fn compare_key(&self, value: &V, key: &K) -> Ordering {
        (self.compare)((self.key_of)(value), key)
    }

    pub fn compare_values(&self, a: &V, b: &V) -> Ordering {
        (self.compare)((self.key_of)(a), (self.key_of)(b))
    }
}

impl<V, K: ?Sized> Clone for KeyOrdering<V, K> {
    fn clone(&self) -> Self {
        Self { compare: Arc::clone(&self.compare), key_of: Arc::clone(&self.key_of) }
    }
}

impl<V, K: ?Sized> fmt::Debug for KeyOrdering<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyOrdering").finish_non_exhaustive()
    }
}
