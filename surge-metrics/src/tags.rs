use crate::key::KeyId;
use smallvec::SmallVec;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series rarely carry more than a couple of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 2]>,
}

impl TagSet {
    /// Builds a tag set from pairs that are already sorted by key.
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let idx = self.tags.partition_point(|(k, _)| *k < key);
        self.tags
            .get(idx)
            .and_then(|(k, v)| (*k == key).then_some(*v))
    }
}
