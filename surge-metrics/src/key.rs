use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id used for metric names and tag keys/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: HashMap<Arc<str>, KeyId>,
    names: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.table.read().ids.get(s) {
            return *id;
        }

        let mut table = self.table.write();
        // Another writer may have won the race between the read and write locks.
        if let Some(id) = table.ids.get(s) {
            return *id;
        }

        let id = KeyId(u32::try_from(table.names.len()).unwrap_or(u32::MAX));
        let s: Arc<str> = Arc::from(s);
        table.names.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().names.get(id.0 as usize).cloned()
    }
}
