use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::engine::{HandleKind, LoadHandle, LoadStatus, Object, ObjectAddr};
use crate::rtti::ResourceType;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EntryId(u64);

/// A succeeded handle whose result is still owned by a caller.
#[derive(Clone, Debug)]
pub struct Entry<H> {
    pub key: EntryId,
    pub id: Arc<str>,
    pub kind: HandleKind,
    pub handle: H,
    /// What the handle resolved to: the asset, or the prefab a component was
    /// taken from.
    pub result: Object,
}

/// Every handle that still has to be released, in registration order.
///
/// One lock guards the whole collection and is never held across an engine
/// call.
#[derive(Debug)]
pub struct HandleRegistry<H> {
    entries: Mutex<Vec<Entry<H>>>,
    key_counter: AtomicU64,
}

impl<H> Default for HandleRegistry<H> {
    fn default() -> Self {
        HandleRegistry {
            entries: Mutex::new(Vec::new()),
            key_counter: AtomicU64::new(0),
        }
    }
}

impl<H: LoadHandle> HandleRegistry<H> {
    pub fn new() -> HandleRegistry<H> {
        HandleRegistry::default()
    }

    /// Loading the same identifier twice registers it twice.
    pub fn add(&self, id: Arc<str>, handle: H, result: Object) -> EntryId {
        debug_assert_eq!(handle.status(), LoadStatus::Succeeded);

        let key = EntryId(self.key_counter.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            key,
            kind: handle.kind(),
            id,
            handle,
            result,
        };

        trace!(id = %entry.id, kind = ?entry.kind, "registered");
        self.entries.lock().push(entry);
        key
    }

    /// Removes the earliest registered entry whose result is `target`. When
    /// `component` is given, a prefab entry whose component of that type is
    /// `target` matches as well; `component_of` is asked for it outside the
    /// lock.
    ///
    /// Engines may hand out the same object for several loads, so one call
    /// removes at most one entry.
    pub fn remove_matching<F>(
        &self,
        target: ObjectAddr,
        component: Option<ResourceType>,
        component_of: F,
    ) -> Option<Entry<H>>
    where
        F: Fn(&Object, ResourceType) -> Option<Object>,
    {
        let mut candidates = Vec::new();

        {
            let entries = self.entries.lock();
            for entry in entries.iter() {
                if ObjectAddr::of(&entry.result) == target {
                    candidates.push((entry.key, None));
                } else if component.is_some() && entry.kind == HandleKind::Prefab {
                    candidates.push((entry.key, Some(entry.result.clone())));
                }
            }
        }

        let mut matched = SmallVec::<[EntryId; 1]>::new();
        for (key, prefab) in candidates {
            let found = match (prefab, component) {
                (None, _) => true,
                (Some(prefab), Some(component)) => component_of(&prefab, component)
                    .map_or(false, |found| ObjectAddr::of(&found) == target),
                (Some(_), None) => false,
            };

            if found {
                matched.push(key);
            }
        }

        if matched.is_empty() {
            return None;
        }

        // Entries taken concurrently are skipped; the earliest survivor wins.
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|entry| matched.contains(&entry.key))?;
        let entry = entries.remove(index);
        trace!(id = %entry.id, "unregistered");
        Some(entry)
    }

    /// Takes every entry, leaving the registry empty.
    pub fn remove_all(&self) -> Vec<Entry<H>> {
        let entries = std::mem::take(&mut *self.entries.lock());
        trace!(count = entries.len(), "unregistered all");
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<Arc<str>> {
        self.entries.lock().iter().map(|e| e.id.clone()).collect()
    }

    pub fn count(&self, id: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| &*e.id == id)
            .count()
    }
}
