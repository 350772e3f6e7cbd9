use chrono::{DateTime, Utc};
use cinelist_model::{CollectionId, ListItem, MovieId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

/// A local edit not yet confirmed by a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Upsert(ListItem),
    Remove(MovieId),
}

impl Mutation {
    pub fn movie_id(&self) -> MovieId {
        match self {
            Mutation::Upsert(item) => item.movie_id,
            Mutation::Remove(id) => *id,
        }
    }

    /// Applies the mutation to an ordered item list.
    pub(crate) fn apply_to(&self, items: &mut Vec<ListItem>) {
        match self {
            Mutation::Upsert(item) => {
                match items.iter_mut().find(|i| i.movie_id == item.movie_id) {
                    Some(existing) => *existing = item.clone(),
                    None => items.push(item.clone()),
                }
            }
            Mutation::Remove(id) => items.retain(|i| i.movie_id != *id),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingMutation {
    seq: u64,
    mutation: Mutation,
}

/// Pending mutations captured at the start of a sync job.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingSnapshot {
    pub(crate) mutations: Vec<Mutation>,
    /// Highest sequence number included in `mutations`.
    pub(crate) through_seq: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    items: Vec<ListItem>,
    pending: Vec<PendingMutation>,
    next_seq: u64,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Local copy of one collection.
///
/// User edits apply immediately and are queued as pending mutations until a
/// sync commits them. Subscribers see the item list after every change.
#[derive(Debug)]
pub struct CollectionStore {
    id: CollectionId,
    inner: Mutex<StoreInner>,
    items_tx: watch::Sender<Vec<ListItem>>,
}

impl CollectionStore {
    pub fn new(id: CollectionId) -> Self {
        Self::with_items(id, Vec::new())
    }

    /// Store seeded with previously persisted items. Seeded items are not
    /// pending; the next sync treats them as a mirror of the remote copy.
    pub fn with_items(id: CollectionId, items: Vec<ListItem>) -> Self {
        let (items_tx, _) = watch::channel(items.clone());
        Self {
            id,
            inner: Mutex::new(StoreInner {
                items,
                next_seq: 1,
                ..StoreInner::default()
            }),
            items_tx,
        }
    }

    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    /// Adds `item`, or replaces the entry with the same movie id.
    pub fn add(&self, mut item: ListItem) {
        let items = {
            let mut inner = self.inner.lock();
            if let Some(existing) =
                inner.items.iter().find(|i| i.movie_id == item.movie_id)
            {
                item.added_at = existing.added_at;
            }
            item.touch();
            let mutation = Mutation::Upsert(item);
            mutation.apply_to(&mut inner.items);
            inner.queue(mutation);
            inner.items.clone()
        };
        trace!(collection = %self.id, "queued upsert");
        self.items_tx.send_replace(items);
    }

    /// Removes the entry for `movie_id`. Returns false when there was none.
    pub fn remove(&self, movie_id: MovieId) -> bool {
        let items = {
            let mut inner = self.inner.lock();
            if !inner.items.iter().any(|i| i.movie_id == movie_id) {
                return false;
            }
            let mutation = Mutation::Remove(movie_id);
            mutation.apply_to(&mut inner.items);
            inner.queue(mutation);
            inner.items.clone()
        };
        trace!(collection = %self.id, %movie_id, "queued removal");
        self.items_tx.send_replace(items);
        true
    }

    pub fn items(&self) -> Vec<ListItem> {
        self.inner.lock().items.clone()
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.inner.lock().items.iter().any(|i| i.movie_id == movie_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_synced_at
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ListItem>> {
        self.items_tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> PendingSnapshot {
        let inner = self.inner.lock();
        PendingSnapshot {
            mutations: inner.pending.iter().map(|p| p.mutation.clone()).collect(),
            through_seq: inner.pending.last().map_or(0, |p| p.seq),
        }
    }

    /// Replaces the local items with a reconciled list. Mutations queued
    /// after `through_seq` are reapplied on top and stay pending.
    pub(crate) fn commit(
        &self,
        merged: Vec<ListItem>,
        through_seq: u64,
        synced_at: DateTime<Utc>,
    ) {
        let items = {
            let mut inner = self.inner.lock();
            inner.pending.retain(|p| p.seq > through_seq);
            let mut items = merged;
            for pending in &inner.pending {
                pending.mutation.apply_to(&mut items);
            }
            inner.items = items;
            inner.last_synced_at = Some(synced_at);
            debug!(
                collection = %self.id,
                items = inner.items.len(),
                still_pending = inner.pending.len(),
                "committed synced collection"
            );
            inner.items.clone()
        };
        self.items_tx.send_replace(items);
    }
}

impl StoreInner {
    fn queue(&mut self, mutation: Mutation) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingMutation { seq, mutation });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_apply_locally_and_queue() {
        let store = CollectionStore::new(CollectionId::watchlist());
        store.add(ListItem::new(603u64, "The Matrix"));
        store.add(ListItem::new(13u64, "Forrest Gump"));
        assert!(store.remove(MovieId(13)));
        assert!(!store.remove(MovieId(13)));

        assert!(store.contains(MovieId(603)));
        assert!(!store.contains(MovieId(13)));
        assert_eq!(store.pending_count(), 3);
    }

    #[test]
    fn re_adding_keeps_original_added_at() {
        let store = CollectionStore::new(CollectionId::watchlist());
        store.add(ListItem::new(603u64, "The Matrix"));
        let first = store.items()[0].added_at;
        store.add(ListItem::new(603u64, "The Matrix (1999)"));

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].added_at, first);
        assert_eq!(items[0].title, "The Matrix (1999)");
    }

    #[test]
    fn commit_keeps_mutations_queued_after_the_snapshot() {
        let store = CollectionStore::new(CollectionId::watched());
        store.add(ListItem::new(1u64, "One"));
        let snapshot = store.snapshot();

        store.add(ListItem::new(2u64, "Two"));
        store.commit(
            vec![ListItem::new(1u64, "One"), ListItem::new(3u64, "Three")],
            snapshot.through_seq,
            Utc::now(),
        );

        let ids: Vec<u64> = store.items().iter().map(|i| i.movie_id.0).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(store.pending_count(), 1);
        assert!(store.last_synced_at().is_some());
    }

    #[test]
    fn subscribers_see_every_change() {
        let store = CollectionStore::new(CollectionId::watchlist());
        let mut rx = store.subscribe();
        store.add(ListItem::new(7u64, "Se7en"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
