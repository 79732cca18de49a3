use crate::{
    DatasetMeta, HierarchyStore, LoadError, LoadScheduler, NodeCache, NodeId, OctreeNode,
    PointFormat, StandardBinaryDecoder,
};

use std::sync::Arc;

/// Tunables for one streaming octree.
#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    /// Eviction starts once more than this many points are resident.
    pub point_budget: u64,
    /// Decode contexts per point format; also bounds concurrent decodes.
    pub decode_workers: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            point_budget: 1_000_000,
            decode_workers: 2,
        }
    }
}

/// A streaming point cloud octree: node metadata, resident buffers, and the machinery that
/// fetches and decodes more of both on demand.
///
/// All methods run on one cooperative thread. Fetch and decode happen on worker threads, but
/// their results only become visible through [`pump`](Self::pump).
pub struct Octree {
    meta: Arc<DatasetMeta>,
    store: HierarchyStore,
    cache: NodeCache,
    scheduler: LoadScheduler,
}

impl Octree {
    pub fn new(
        meta: DatasetMeta,
        fetcher: Arc<dyn crate::Fetcher>,
        config: StreamConfig,
    ) -> Self {
        let meta = Arc::new(meta);
        let store = HierarchyStore::new(&meta);
        let cache = NodeCache::new(config.point_budget);
        let mut scheduler = LoadScheduler::new(Arc::clone(&meta), fetcher);
        scheduler.register_decoder(PointFormat::Binary, config.decode_workers, || {
            Box::new(StandardBinaryDecoder::default())
        });

        Self {
            meta,
            store,
            cache,
            scheduler,
        }
    }

    #[inline]
    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    #[inline]
    pub fn store(&self) -> &HierarchyStore {
        &self.store
    }

    #[inline]
    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    #[inline]
    pub fn root(&self) -> &OctreeNode {
        self.store.root()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&OctreeNode> {
        self.store.node(id)
    }

    /// Begin loading a node's points, fetching its hierarchy chunk first when needed. No-op for
    /// nodes already loaded, loading, or failed.
    pub fn load(&mut self, id: NodeId) {
        let Self {
            store, scheduler, ..
        } = self;
        scheduler.load(store, id);
    }

    /// Fetch descendant-existence information below a boundary node without loading points.
    pub fn expand(&mut self, id: NodeId) {
        let Self {
            store, scheduler, ..
        } = self;
        scheduler.expand(store, id);
    }

    /// Drain completed fetch/decode work into node and cache state. Returns the number of
    /// events handled; zero means nothing finished since the last call.
    pub fn pump(&mut self) -> usize {
        let Self {
            store,
            cache,
            scheduler,
            ..
        } = self;
        scheduler.pump(store, cache)
    }

    /// Mark a resident node as recently used so it evicts last.
    pub fn touch(&mut self, id: NodeId) {
        self.cache.touch(id);
    }

    /// Hold a node's buffer resident across eviction. Pins nest.
    pub fn pin(&mut self, id: NodeId) -> bool {
        self.cache.pin(id)
    }

    /// Release one pin. Over-budget residency from pinning is reclaimed here.
    pub fn unpin(&mut self, id: NodeId) {
        let Self { store, cache, .. } = self;
        cache.unpin(id);
        cache.enforce_budget(store);
    }

    /// Allow a failed node to be retried.
    pub fn reset_failed(&mut self, id: NodeId) {
        if let Some(node) = self.store.node_mut(id) {
            node.reset_failed();
        }
    }

    /// Decode failures since the last drain.
    pub fn drain_errors(&mut self) -> Vec<LoadError> {
        self.scheduler.drain_errors()
    }

    /// Whether no fetch or decode is in flight. Queued-but-undecoded payloads count as in
    /// flight, so idle means every requested load has fully resolved.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }
}
