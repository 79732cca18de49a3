use crate::{ChildMask, Children, DatasetMeta, NodeId, OctreeNode, SmallKeyHashMap};

use pointstream_core::Aabb3;

use std::collections::VecDeque;
use thiserror::Error;

/// One record of a hierarchy chunk: the child-existence bitmask and point count of a single node.
pub const HIERARCHY_RECORD_BYTES: usize = 5;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum HierarchyError {
    #[error("hierarchy chunk length {len} is not a whole number of {HIERARCHY_RECORD_BYTES}-byte records")]
    Truncated { len: usize },
    #[error("hierarchy chunk rooted at unknown node {0}")]
    UnknownRoot(NodeId),
}

/// Owns all octree node metadata, keyed by location code in a flat hash map.
///
/// Node metadata is created on first mention: the root at construction, everything else by
/// hierarchy-chunk expansion at step boundaries. Metadata persists for the octree's lifetime;
/// only decoded buffers come and go.
pub struct HierarchyStore {
    nodes: SmallKeyHashMap<NodeId, OctreeNode>,
    root_bounds: Aabb3,
    root_spacing: f64,
    step: u8,
}

impl HierarchyStore {
    pub fn new(meta: &DatasetMeta) -> Self {
        let mut nodes = SmallKeyHashMap::default();
        nodes.insert(
            NodeId::ROOT,
            OctreeNode::new_unknown(NodeId::ROOT, meta.bounding_box, meta.spacing),
        );

        Self {
            nodes,
            root_bounds: meta.bounding_box,
            root_spacing: meta.spacing,
            step: meta.hierarchy_step.max(1),
        }
    }

    #[inline]
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Number of nodes with allocated metadata.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut OctreeNode> {
        self.nodes.get_mut(&id)
    }

    #[inline]
    pub fn root(&self) -> &OctreeNode {
        // The root is inserted at construction and never removed.
        &self.nodes[&NodeId::ROOT]
    }

    /// Whether `id` sits at a hierarchy-chunk boundary.
    #[inline]
    pub fn is_boundary(&self, id: NodeId) -> bool {
        id.level() % self.step == 0
    }

    /// Whether loading `id` must fetch its hierarchy chunk first: it is a boundary node whose
    /// descendant-existence information has not resolved yet.
    pub fn needs_expansion(&self, id: NodeId) -> bool {
        if !self.is_boundary(id) {
            return false;
        }
        match self.node(id) {
            Some(node) => node.children() == Children::Unknown,
            None => false,
        }
    }

    /// The ids of the known children of `id`, in octant order. Empty while the sibling set is
    /// unknown, so callers naturally treat unexpanded boundary nodes as provisional leaves.
    pub fn known_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
        let mask = self
            .node(id)
            .map(|n| n.known_child_mask())
            .unwrap_or(ChildMask::EMPTY);

        mask.octants().map(move |octant| id.child(octant))
    }

    /// Apply a hierarchy chunk rooted at `chunk_root`: a breadth-first run of
    /// (child bitmask, point count) records covering the next `step` levels.
    ///
    /// Creates descendant metadata as records are consumed. Nodes surfacing at the bottom level
    /// of the chunk are allocated in `Unknown` state; their own records arrive with their own
    /// chunk. Returns the number of records applied.
    pub fn apply_chunk(
        &mut self,
        chunk_root: NodeId,
        bytes: &[u8],
    ) -> Result<usize, HierarchyError> {
        if bytes.len() % HIERARCHY_RECORD_BYTES != 0 {
            return Err(HierarchyError::Truncated { len: bytes.len() });
        }
        if !self.nodes.contains_key(&chunk_root) {
            return Err(HierarchyError::UnknownRoot(chunk_root));
        }

        let bottom = chunk_root.level().saturating_add(self.step);
        let mut records = bytes.chunks_exact(HIERARCHY_RECORD_BYTES);
        let mut queue = VecDeque::new();
        queue.push_back(chunk_root);

        let mut applied = 0;
        while let Some(id) = queue.pop_front() {
            let record = match records.next() {
                Some(r) => r,
                None => break,
            };
            let mask = ChildMask(record[0]);
            let num_points =
                u64::from(u32::from_le_bytes([record[1], record[2], record[3], record[4]]));

            let parent_bounds = match self.node(id) {
                Some(node) => *node.bounds(),
                None => continue,
            };
            if let Some(node) = self.node_mut(id) {
                node.apply_record(mask, num_points);
            }

            for octant in mask.octants() {
                let child = id.child(octant);
                let bounds = parent_bounds.child_octant(octant);
                let spacing = self.root_spacing / f64::from(1u32 << child.level().min(31));
                self.nodes
                    .entry(child)
                    .or_insert_with(|| OctreeNode::new_unknown(child, bounds, spacing));
                if child.level() < bottom {
                    queue.push_back(child);
                }
            }
            applied += 1;
        }

        log::debug!(
            "applied hierarchy chunk at {}: {} records, {} nodes known",
            chunk_root,
            applied,
            self.nodes.len()
        );

        Ok(applied)
    }

    /// The bounding box of the whole octree.
    #[inline]
    pub fn root_bounds(&self) -> &Aabb3 {
        &self.root_bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeState;

    use pretty_assertions::assert_eq;

    fn test_meta(step: u8) -> DatasetMeta {
        let json = format!(
            r#"{{
                "version": "1.7",
                "octreeDir": "data",
                "boundingBox": {{"lx": 0.0, "ly": 0.0, "lz": 0.0, "ux": 8.0, "uy": 8.0, "uz": 8.0}},
                "pointAttributes": ["POSITION_CARTESIAN"],
                "spacing": 1.0,
                "scale": 0.001,
                "hierarchyStepSize": {}
            }}"#,
            step
        );
        DatasetMeta::from_json("base", &json).unwrap()
    }

    fn record(mask: u8, num_points: u32) -> Vec<u8> {
        let mut r = vec![mask];
        r.extend_from_slice(&num_points.to_le_bytes());
        r
    }

    #[test]
    fn chunk_expansion_is_breadth_first() {
        let meta = test_meta(2);
        let mut store = HierarchyStore::new(&meta);

        // Root has children 0 and 5; r0 has child 3; r5 is a leaf. Records in BFS order:
        // r, r0, r5. The bottom level (2) node r03 surfaces without a record.
        let mut chunk = record(0b0010_0001, 100);
        chunk.extend(record(0b0000_1000, 50));
        chunk.extend(record(0, 60));

        assert_eq!(store.apply_chunk(NodeId::ROOT, &chunk), Ok(3));

        let root = store.root();
        assert_eq!(root.state(), NodeState::MetadataKnown);
        assert_eq!(root.num_points(), 100);

        let r0 = NodeId::from_name("r0").unwrap();
        let r5 = NodeId::from_name("r5").unwrap();
        let r03 = NodeId::from_name("r03").unwrap();
        assert_eq!(store.node(r0).unwrap().num_points(), 50);
        assert_eq!(store.node(r5).unwrap().num_points(), 60);
        assert_eq!(
            store.known_children(NodeId::ROOT).collect::<Vec<_>>(),
            vec![r0, r5]
        );

        // The bottom-row node exists but its own record is pending.
        let bottom = store.node(r03).unwrap();
        assert_eq!(bottom.state(), NodeState::Unknown);
        assert_eq!(bottom.children(), Children::Unknown);
        assert!(store.needs_expansion(r03));
        assert!(!store.needs_expansion(r0));
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let meta = test_meta(2);
        let mut store = HierarchyStore::new(&meta);

        assert_eq!(
            store.apply_chunk(NodeId::ROOT, &[1, 2, 3]),
            Err(HierarchyError::Truncated { len: 3 })
        );
    }

    #[test]
    fn expanded_children_get_subdivided_bounds() {
        let meta = test_meta(2);
        let mut store = HierarchyStore::new(&meta);

        let chunk = record(0b0001_0000, 10);
        store.apply_chunk(NodeId::ROOT, &chunk).unwrap();

        let child = store.node(NodeId::ROOT.child(4)).unwrap();
        assert_eq!(child.bounds().min.x, 4.0);
        assert_eq!(child.bounds().max.x, 8.0);
        assert_eq!(child.bounds().max.y, 4.0);
        assert_eq!(child.spacing(), 0.5);
    }

    #[test]
    fn unexpanded_boundary_node_reports_no_children() {
        let meta = test_meta(2);
        let store = HierarchyStore::new(&meta);

        assert!(store.needs_expansion(NodeId::ROOT));
        assert_eq!(store.known_children(NodeId::ROOT).count(), 0);
    }
}
