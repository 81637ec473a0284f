// Deduplicated, date-scoped event list
//
// Holds one entry per identity key, newest first. Poll snapshots replace it wholesale,
// pushes insert one entry at a time.

use crate::event::{Activity, Anomaly, EventKey, NaturalKey};
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Anything that can sit in a live list
pub trait Identified: Clone + Send + Sync + 'static {
    fn key(&self) -> EventKey;
    fn occurred_at(&self) -> NaiveDateTime;
    /// Server id used by targeted updates (acknowledge)
    fn server_id(&self) -> Option<&str>;
}

impl Identified for Activity {
    fn key(&self) -> EventKey {
        Activity::key(self)
    }

    fn occurred_at(&self) -> NaiveDateTime {
        self.at
    }

    fn server_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Identified for Anomaly {
    fn key(&self) -> EventKey {
        Anomaly::key(self)
    }

    fn occurred_at(&self) -> NaiveDateTime {
        self.at
    }

    fn server_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Set of event keys honoring `EventKey::same_event`
#[derive(Debug, Default, Clone)]
pub struct KeyIndex {
    ids: HashSet<String>,
    naturals: HashSet<NaturalKey>,
    // natural keys of entries without a server id
    idless: HashSet<NaturalKey>,
}

impl KeyIndex {
    pub fn contains(&self, key: &EventKey) -> bool {
        match &key.id {
            Some(id) => self.ids.contains(id) || self.idless.contains(&key.natural),
            None => self.naturals.contains(&key.natural),
        }
    }

    pub fn insert(&mut self, key: EventKey) {
        match key.id {
            Some(id) => {
                self.ids.insert(id);
            }
            None => {
                self.idless.insert(key.natural.clone());
            }
        }
        self.naturals.insert(key.natural);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.naturals.clear();
        self.idless.clear();
    }
}

/// Result of a snapshot replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub kept: usize,
    /// Snapshot entries colliding with an earlier entry of the same snapshot
    pub collapsed: usize,
}

#[derive(Debug, Clone)]
pub struct LiveList<T: Identified> {
    items: Vec<T>,
    index: KeyIndex,
}

impl<T: Identified> LiveList<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: KeyIndex::default(),
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.index.contains(key)
    }

    /// Overwrite with an authoritative snapshot, re-sorted newest first
    pub fn replace(&mut self, snapshot: Vec<T>) -> ReplaceOutcome {
        self.items.clear();
        self.index.clear();

        let total = snapshot.len();
        for item in snapshot {
            let key = item.key();
            if self.index.contains(&key) {
                continue;
            }
            self.index.insert(key);
            self.items.push(item);
        }
        self.items
            .sort_by(|a, b| b.occurred_at().cmp(&a.occurred_at()));

        ReplaceOutcome {
            kept: self.items.len(),
            collapsed: total - self.items.len(),
        }
    }

    /// Insert a pushed entry unless an entry with the same identity exists.
    ///
    /// Returns false when the entry was already present. A push newer than every
    /// entry lands at the front.
    pub fn insert(&mut self, item: T) -> bool {
        let key = item.key();
        if self.index.contains(&key) {
            return false;
        }
        let at = item.occurred_at();
        let pos = self.items.partition_point(|e| e.occurred_at() > at);
        self.index.insert(key);
        self.items.insert(pos, item);
        true
    }

    /// Apply `f` to the entry with server id `id`; identity fields must not change
    pub fn modify(&mut self, id: &str, f: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|e| e.server_id() == Some(id)) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Identified> Default for LiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}
