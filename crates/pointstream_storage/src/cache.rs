use crate::{HierarchyStore, NodeId, SmallKeyHashMap};

/// Tracks which nodes hold decoded buffers and evicts the least recently used ones to keep the
/// total resident point count under a budget.
///
/// Entries can be pinned while a consumer is reading a node's buffer; pinned entries never
/// evict, so when everything resident is pinned the cache may temporarily exceed its budget.
/// Eviction drops a node's buffer but never its metadata.
pub struct NodeCache {
    entries: SmallKeyHashMap<NodeId, Slot>,
    order: LruList<NodeId>,
    resident_points: u64,
    budget: u64,
}

struct Slot {
    list_index: usize,
    num_points: u64,
    pins: u32,
}

impl NodeCache {
    pub fn new(budget: u64) -> Self {
        Self {
            entries: SmallKeyHashMap::default(),
            order: LruList::new(),
            resident_points: 0,
            budget,
        }
    }

    #[inline]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
    }

    /// Total points across all resident buffers, pinned included.
    #[inline]
    pub fn resident_points(&self) -> u64 {
        self.resident_points
    }

    /// The number of resident nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Track a newly loaded node as most recently used. Re-inserting an already resident node
    /// just refreshes its recency and size.
    pub fn insert(&mut self, id: NodeId, num_points: u64) {
        let Self { entries, order, .. } = self;
        match entries.get_mut(&id) {
            Some(slot) => {
                order.move_to_front(slot.list_index);
                self.resident_points += num_points;
                self.resident_points -= slot.num_points;
                slot.num_points = num_points;
            }
            None => {
                let list_index = order.push_front(id);
                entries.insert(
                    id,
                    Slot {
                        list_index,
                        num_points,
                        pins: 0,
                    },
                );
                self.resident_points += num_points;
            }
        }
    }

    /// Mark a resident node as most recently used. Returns `false` if the node is not resident.
    pub fn touch(&mut self, id: NodeId) -> bool {
        let Self { entries, order, .. } = self;
        match entries.get(&id) {
            Some(slot) => {
                order.move_to_front(slot.list_index);
                true
            }
            None => false,
        }
    }

    /// Hold a node's buffer resident. Pins nest; each `pin` needs a matching `unpin`.
    pub fn pin(&mut self, id: NodeId) -> bool {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                slot.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, id: NodeId) {
        if let Some(slot) = self.entries.get_mut(&id) {
            debug_assert!(slot.pins > 0);
            slot.pins = slot.pins.saturating_sub(1);
        }
    }

    /// Stop tracking a node without touching its buffer. Used when a load fails after the entry
    /// was created or when the caller drops a node out-of-band.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(slot) = self.entries.remove(&id) {
            self.order.remove(slot.list_index);
            self.resident_points -= slot.num_points;
        }
    }

    /// Evict least-recently-used unpinned nodes until the resident total fits the budget.
    /// Evicted nodes have their buffers dropped in `store`; their metadata survives.
    ///
    /// Returns the evicted ids, oldest first.
    pub fn enforce_budget(&mut self, store: &mut HierarchyStore) -> Vec<NodeId> {
        let mut evicted = Vec::new();

        // Walk from the LRU end, skipping pinned entries.
        let mut index = self.order.back();
        while self.resident_points > self.budget && !self.order.is_sentinel(index) {
            let id = *self.order.value(index);
            let prev = self.order.prev(index);

            let slot = &self.entries[&id];
            if slot.pins == 0 {
                let slot = self.entries.remove(&id).unwrap();
                self.order.remove(slot.list_index);
                self.resident_points -= slot.num_points;
                if let Some(node) = store.node_mut(id) {
                    node.unload();
                }
                evicted.push(id);
            }

            index = prev;
        }

        if !evicted.is_empty() {
            log::debug!(
                "evicted {} nodes; {} points resident of {} budgeted",
                evicted.len(),
                self.resident_points,
                self.budget
            );
        }

        evicted
    }

    /// Resident ids from most to least recently used.
    pub fn iter_mru(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter_front_to_back()
    }
}

/// Doubly-linked list using Vec as storage.
///
/// Free and occupied cells are each linked into a cyclic list with one auxiliary cell.
/// Cell #0 is on the list of free cells, cell #1 is on the list of occupied cells.
struct LruList<T> {
    entries: Vec<ListEntry<T>>,
}

struct ListEntry<T> {
    value: Option<T>,
    next: usize,
    prev: usize,
}

impl<T> LruList<T> {
    const FREE: usize = 0;
    const OCCUPIED: usize = 1;

    fn new() -> LruList<T> {
        let mut entries = Vec::with_capacity(2);
        entries.push(ListEntry::<T> {
            value: None,
            next: 0,
            prev: 0,
        });
        entries.push(ListEntry::<T> {
            value: None,
            next: 1,
            prev: 1,
        });

        LruList { entries }
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.entries[index].prev;
        let next = self.entries[index].next;
        self.entries[prev].next = next;
        self.entries[next].prev = prev;
    }

    fn link_after(&mut self, index: usize, prev: usize) {
        let next = self.entries[prev].next;
        self.entries[index].prev = prev;
        self.entries[index].next = next;
        self.entries[prev].next = index;
        self.entries[next].prev = index;
    }

    fn move_to_front(&mut self, index: usize) {
        self.unlink(index);
        self.link_after(index, Self::OCCUPIED);
    }

    fn push_front(&mut self, value: T) -> usize {
        if self.entries[Self::FREE].next == Self::FREE {
            self.entries.push(ListEntry::<T> {
                value: None,
                next: Self::FREE,
                prev: Self::FREE,
            });
            self.entries[Self::FREE].next = self.entries.len() - 1;
        }
        let index = self.entries[Self::FREE].next;
        self.entries[index].value = Some(value);
        self.unlink(index);
        self.link_after(index, Self::OCCUPIED);

        index
    }

    fn remove(&mut self, index: usize) -> T {
        self.unlink(index);
        self.link_after(index, Self::FREE);

        self.entries[index].value.take().expect("invalid index")
    }

    fn back(&self) -> usize {
        self.entries[Self::OCCUPIED].prev
    }

    fn prev(&self, index: usize) -> usize {
        self.entries[index].prev
    }

    fn is_sentinel(&self, index: usize) -> bool {
        index == Self::OCCUPIED
    }

    fn value(&self, index: usize) -> &T {
        self.entries[index].value.as_ref().expect("invalid index")
    }

    fn iter_front_to_back(&self) -> impl Iterator<Item = T> + '_
    where
        T: Copy,
    {
        let mut index = self.entries[Self::OCCUPIED].next;
        std::iter::from_fn(move || {
            if index == Self::OCCUPIED {
                return None;
            }
            let value = *self.value(index);
            index = self.entries[index].next;

            Some(value)
        })
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatasetMeta;

    use pretty_assertions::assert_eq;

    fn test_store() -> HierarchyStore {
        let json = r#"{
            "version": "1.7",
            "octreeDir": "data",
            "boundingBox": {"lx": 0.0, "ly": 0.0, "lz": 0.0, "ux": 8.0, "uy": 8.0, "uz": 8.0},
            "pointAttributes": ["POSITION_CARTESIAN"],
            "spacing": 1.0,
            "scale": 0.001,
            "hierarchyStepSize": 4
        }"#;
        let meta = DatasetMeta::from_json("base", json).unwrap();
        let mut store = HierarchyStore::new(&meta);

        // Root with all eight children known.
        let mut chunk = vec![0xffu8];
        chunk.extend_from_slice(&800u32.to_le_bytes());
        for _ in 0..8 {
            chunk.push(0);
            chunk.extend_from_slice(&100u32.to_le_bytes());
        }
        store.apply_chunk(NodeId::ROOT, &chunk).unwrap();

        store
    }

    #[test]
    fn eviction_is_lru_and_respects_budget() {
        let mut store = test_store();
        let mut cache = NodeCache::new(250);

        let a = NodeId::ROOT.child(0);
        let b = NodeId::ROOT.child(1);
        let c = NodeId::ROOT.child(2);
        cache.insert(a, 100);
        cache.insert(b, 100);
        assert_eq!(cache.enforce_budget(&mut store), vec![]);

        // Touch `a` so `b` becomes the LRU, then overflow.
        assert!(cache.touch(a));
        cache.insert(c, 100);
        assert_eq!(cache.enforce_budget(&mut store), vec![b]);

        assert_eq!(cache.resident_points(), 200);
        assert!(cache.contains(a));
        assert!(!cache.contains(b));
        assert_eq!(cache.iter_mru().collect::<Vec<_>>(), vec![c, a]);
    }

    #[test]
    fn pinned_nodes_are_skipped() {
        let mut store = test_store();
        let mut cache = NodeCache::new(150);

        let a = NodeId::ROOT.child(0);
        let b = NodeId::ROOT.child(1);
        cache.insert(a, 100);
        cache.insert(b, 100);

        // `a` is the LRU but pinned, so `b` goes instead.
        assert!(cache.pin(a));
        assert_eq!(cache.enforce_budget(&mut store), vec![b]);
        assert!(cache.contains(a));

        cache.unpin(a);
        cache.set_budget(0);
        assert_eq!(cache.enforce_budget(&mut store), vec![a]);
        assert_eq!(cache.resident_points(), 0);
    }

    #[test]
    fn all_pinned_cache_may_exceed_budget() {
        let mut store = test_store();
        let mut cache = NodeCache::new(50);

        let a = NodeId::ROOT.child(0);
        let b = NodeId::ROOT.child(1);
        cache.insert(a, 100);
        cache.insert(b, 100);
        cache.pin(a);
        cache.pin(b);

        assert_eq!(cache.enforce_budget(&mut store), vec![]);
        assert_eq!(cache.resident_points(), 200);
    }

    #[test]
    fn eviction_unloads_buffers_but_keeps_metadata() {
        let mut store = test_store();
        let mut cache = NodeCache::new(0);

        let a = NodeId::ROOT.child(0);
        cache.insert(a, 100);
        cache.enforce_budget(&mut store);

        let node = store.node(a).unwrap();
        assert!(!node.is_loaded());
        assert_eq!(node.num_points(), 100);
    }

    #[test]
    fn random_workload_never_exceeds_budget() {
        use rand::prelude::*;

        let mut store = test_store();
        let mut cache = NodeCache::new(250);
        let mut rng = StdRng::seed_from_u64(4);
        let children: Vec<NodeId> = (0..8).map(|o| NodeId::ROOT.child(o)).collect();

        for _ in 0..1000 {
            let id = *children.choose(&mut rng).unwrap();
            match rng.gen_range(0..3) {
                0 => cache.insert(id, rng.gen_range(1..=100)),
                1 => {
                    cache.touch(id);
                }
                _ => cache.remove(id),
            }
            cache.enforce_budget(&mut store);
            assert!(cache.resident_points() <= cache.budget());
        }
    }

    #[test]
    fn reinsert_refreshes_size() {
        let mut store = test_store();
        let mut cache = NodeCache::new(1000);

        let a = NodeId::ROOT.child(0);
        cache.insert(a, 100);
        cache.insert(a, 60);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resident_points(), 60);
        assert_eq!(cache.enforce_budget(&mut store), vec![]);
    }
}
