//! Normalized attribute sets used as series identity.
//!
//! A metric data point carries an unordered bag of key/value string pairs.
//! Two points with the same pairs in any order must resolve to the same
//! series, so attributes are sorted by key (ordinal comparison) before
//! they are used as a map key. The sorted scratch buffer probes the
//! dimension map without allocating; a durable [`AttributeSet`] is only
//! allocated when a new series is inserted.

use smallvec::SmallVec;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One attribute key/value pair
pub type KeyValue = (String, String);

/// Sorted, immutable attribute pairs identifying one series.
///
/// Equality and hashing delegate to the underlying slice so a sorted
/// `&[KeyValue]` view can probe a map keyed by `AttributeSet` without
/// constructing one.
#[derive(Debug, Clone)]
pub struct AttributeSet(Arc<[KeyValue]>);

impl AttributeSet {
    /// Creates a durable attribute set from an already-sorted slice
    pub fn from_sorted(pairs: &[KeyValue]) -> Self {
        debug_assert!(pairs.windows(2).all(|w| w[0] <= w[1]));
        Self(Arc::from(pairs))
    }

    /// Returns the sorted pairs
    pub fn pairs(&self) -> &[KeyValue] {
        &self.0
    }

    /// Looks up the value for an attribute key
    pub fn value_of(&self, key: &str) -> Option<&str> {
        attribute_value(&self.0, key)
    }

    /// Returns true if the set has no attributes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of attribute pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AttributeSet {}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with the hash of the borrowed slice view.
        self.0[..].hash(state);
    }
}

impl Borrow<[KeyValue]> for AttributeSet {
    fn borrow(&self) -> &[KeyValue] {
        &self.0
    }
}

/// Looks up the value for a key in sorted attribute pairs
pub fn attribute_value<'a>(pairs: &'a [KeyValue], key: &str) -> Option<&'a str> {
    pairs
        .binary_search_by(|(k, _)| k.as_str().cmp(key))
        .ok()
        .map(|i| pairs[i].1.as_str())
}

/// Reusable buffer for normalizing attribute pairs on the ingest hot path.
///
/// The buffer is cleared and refilled for every data point in a batch, so
/// the backing allocation is reused across the whole batch. Never expose
/// the buffer beyond the resolution call that filled it.
#[derive(Debug, Default)]
pub struct AttributeScratch {
    buf: SmallVec<[KeyValue; 8]>,
}

impl AttributeScratch {
    /// Creates an empty scratch buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `pairs` into the buffer, sorts them by key, and returns the
    /// normalized view
    pub fn normalize(&mut self, pairs: &[KeyValue]) -> &[KeyValue] {
        self.buf.clear();
        self.buf.extend(pairs.iter().cloned());
        // Ordinal sort; value as a tiebreak keeps duplicate keys deterministic.
        self.buf.sort_unstable();
        &self.buf
    }
}
