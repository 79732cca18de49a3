use crate::CountingFetcher;

use pointstream_core::Aabb3;
use pointstream_storage::{
    AttributeKind, DatasetMeta, NodeId, Octree, StreamConfig, HIERARCHY_RECORD_BYTES,
};

use glam::DVec3;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Builds a synthetic dataset: a descriptor, hierarchy chunks, and binary point payloads, all
/// held in memory and served by url.
///
/// Nodes are declared by name with world-coordinate points; ancestors are created implicitly.
/// Non-position attributes are filled with fixed values, so tests can assert on them.
pub struct CloudBuilder {
    bounds: Aabb3,
    spacing: f64,
    scale: f64,
    step: u8,
    version: &'static str,
    attributes: Vec<&'static str>,
    nodes: BTreeMap<NodeId, Vec<DVec3>>,
}

pub const TEST_COLOR: [u8; 4] = [100, 150, 200, 255];
pub const TEST_INTENSITY: u16 = 1000;
pub const TEST_CLASSIFICATION: u8 = 2;

impl CloudBuilder {
    pub fn new(bounds: Aabb3) -> Self {
        Self {
            bounds,
            spacing: 1.0,
            scale: 0.001,
            step: 2,
            version: "1.7",
            attributes: vec!["POSITION_CARTESIAN"],
            nodes: BTreeMap::new(),
        }
    }

    pub fn spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn hierarchy_step(mut self, step: u8) -> Self {
        self.step = step;
        self
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn attributes(mut self, names: &[&'static str]) -> Self {
        self.attributes = names.to_vec();
        self
    }

    /// Declare a node by name, e.g. `"r03"`, with world-coordinate points inside its cube.
    pub fn node(mut self, name: &str, points: Vec<DVec3>) -> Self {
        let id = NodeId::from_name(name).expect("bad node name");
        self.nodes.insert(id, points);
        self
    }

    pub fn build(mut self) -> TestCloud {
        // Every ancestor of a declared node exists, points or not.
        let declared: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in declared {
            let mut current = id;
            while let Some(parent) = current.parent() {
                self.nodes.entry(parent).or_insert_with(Vec::new);
                current = parent;
            }
        }

        let json = format!(
            r#"{{
                "version": "{}",
                "octreeDir": "data",
                "boundingBox": {{"lx": {}, "ly": {}, "lz": {}, "ux": {}, "uy": {}, "uz": {}}},
                "pointAttributes": [{}],
                "spacing": {},
                "scale": {},
                "hierarchyStepSize": {}
            }}"#,
            self.version,
            self.bounds.min.x,
            self.bounds.min.y,
            self.bounds.min.z,
            self.bounds.max.x,
            self.bounds.max.y,
            self.bounds.max.z,
            self.attributes
                .iter()
                .map(|a| format!("\"{}\"", a))
                .collect::<Vec<_>>()
                .join(", "),
            self.spacing,
            self.scale,
            self.step,
        );
        let meta = DatasetMeta::from_json("memory:/cloud", &json).expect("bad test descriptor");

        let mut files = HashMap::new();
        for (&id, points) in &self.nodes {
            files.insert(meta.point_url(id), self.encode_points(&meta, id, points));
            if id.level() % self.step == 0 {
                files.insert(meta.hierarchy_url(id), self.encode_chunk(id));
            }
        }

        TestCloud { meta, files }
    }

    fn child_mask(&self, id: NodeId) -> u8 {
        let mut mask = 0u8;
        for octant in 0..8 {
            if self.nodes.contains_key(&id.child(octant)) {
                mask |= 1 << octant;
            }
        }
        mask
    }

    fn encode_chunk(&self, chunk_root: NodeId) -> Vec<u8> {
        let bottom = chunk_root.level() + self.step;
        let mut bytes = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(chunk_root);

        while let Some(id) = queue.pop_front() {
            let mask = self.child_mask(id);
            let num_points = self.nodes[&id].len() as u32;
            bytes.push(mask);
            bytes.extend_from_slice(&num_points.to_le_bytes());

            for octant in 0..8 {
                if mask & (1 << octant) != 0 {
                    let child = id.child(octant);
                    if child.level() < bottom {
                        queue.push_back(child);
                    }
                }
            }
        }
        debug_assert_eq!(bytes.len() % HIERARCHY_RECORD_BYTES, 0);

        bytes
    }

    fn encode_points(&self, meta: &DatasetMeta, id: NodeId, points: &[DVec3]) -> Vec<u8> {
        let node_min = meta.node_bounds(id).min;
        let mut bytes = Vec::new();
        for p in points {
            for attr in meta.layout.attributes() {
                match attr.kind {
                    AttributeKind::Position => {
                        let local = (*p - node_min) / self.scale;
                        assert!(
                            local.min_element() >= 0.0,
                            "point {:?} lies outside node {}",
                            p,
                            id
                        );
                        for c in [local.x, local.y, local.z] {
                            bytes.extend_from_slice(&(c.round() as u32).to_le_bytes());
                        }
                    }
                    AttributeKind::Color => bytes.extend_from_slice(&TEST_COLOR),
                    AttributeKind::Intensity => {
                        bytes.extend_from_slice(&TEST_INTENSITY.to_le_bytes())
                    }
                    AttributeKind::Classification => bytes.push(TEST_CLASSIFICATION),
                    AttributeKind::Normal => bytes.extend_from_slice(&[0u8; 12]),
                }
            }
        }

        bytes
    }
}

/// A complete in-memory dataset, ready to stream from.
pub struct TestCloud {
    pub meta: DatasetMeta,
    pub files: HashMap<String, Vec<u8>>,
}

impl TestCloud {
    pub fn fetcher(&self) -> Arc<CountingFetcher> {
        Arc::new(CountingFetcher::new(self.files.clone()))
    }

    /// An octree streaming this dataset, plus the fetcher for asserting on network traffic.
    pub fn octree(&self, config: StreamConfig) -> (Octree, Arc<CountingFetcher>) {
        let fetcher = self.fetcher();
        let octree = Octree::new(self.meta.clone(), fetcher.clone(), config);

        (octree, fetcher)
    }
}
