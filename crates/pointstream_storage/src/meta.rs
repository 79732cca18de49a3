use crate::{LayoutError, NodeId, PointLayout};

use pointstream_core::Aabb3;

use glam::DVec3;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// A dataset format version, e.g. `1.7`. Storage layout details changed across versions, so
/// loaders branch on ordering comparisons.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(s: &str) -> Result<Self, MetaError> {
        let mut parts = s.splitn(2, '.');
        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = match parts.next() {
            Some(p) => p.parse().ok(),
            None => Some(0),
        };

        match (major, minor) {
            (Some(major), Some(minor)) => Ok(Self { major, minor }),
            _ => Err(MetaError::BadVersion(s.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which decoder family a dataset's payloads require.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PointFormat {
    /// The classic interleaved binary format.
    Binary,
    Las,
    Laz,
}

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("malformed dataset descriptor: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("unparsable format version: {0}")]
    BadVersion(String),
    #[error("hierarchy step size must be at least 1")]
    ZeroStep,
}

#[derive(Deserialize)]
struct RawBox {
    lx: f64,
    ly: f64,
    lz: f64,
    ux: f64,
    uy: f64,
    uz: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAttributes {
    Format(String),
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    version: String,
    octree_dir: String,
    bounding_box: RawBox,
    point_attributes: RawAttributes,
    spacing: f64,
    scale: f64,
    hierarchy_step_size: u8,
}

/// Read-only description of a dataset: where it lives, how the octree is cubed up, and what each
/// point record contains. Parsed once from the JSON descriptor next to the data.
#[derive(Clone, Debug)]
pub struct DatasetMeta {
    pub version: Version,
    pub base_url: String,
    pub octree_dir: String,
    pub bounding_box: Aabb3,
    pub layout: PointLayout,
    pub format: PointFormat,
    pub spacing: f64,
    pub scale: f64,
    pub offset: DVec3,
    pub hierarchy_step: u8,
}

impl DatasetMeta {
    /// Parse the dataset descriptor, resolving data locations relative to `base_url`.
    pub fn from_json(base_url: &str, json: &str) -> Result<Self, MetaError> {
        let raw: RawMeta = serde_json::from_str(json)?;
        let version = Version::parse(&raw.version)?;
        if raw.hierarchy_step_size == 0 {
            return Err(MetaError::ZeroStep);
        }

        let (layout, format) = match raw.point_attributes {
            RawAttributes::List(names) => (PointLayout::from_names(&names)?, PointFormat::Binary),
            RawAttributes::Format(f) => {
                let format = if f.eq_ignore_ascii_case("laz") {
                    PointFormat::Laz
                } else {
                    PointFormat::Las
                };
                (PointLayout::las_default(), format)
            }
        };

        let bounding_box = Aabb3::new(
            DVec3::new(raw.bounding_box.lx, raw.bounding_box.ly, raw.bounding_box.lz),
            DVec3::new(raw.bounding_box.ux, raw.bounding_box.uy, raw.bounding_box.uz),
        );

        Ok(Self {
            version,
            base_url: base_url.trim_end_matches('/').to_string(),
            octree_dir: raw.octree_dir,
            offset: bounding_box.min,
            bounding_box,
            layout,
            format,
            spacing: raw.spacing,
            scale: raw.scale,
            hierarchy_step: raw.hierarchy_step_size,
        })
    }

    fn node_path(&self, id: NodeId) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.octree_dir,
            id.storage_dir(self.hierarchy_step),
            id.name()
        )
    }

    /// Where this node's point payload lives. Version 1.4 moved payloads to `.bin` files.
    pub fn point_url(&self, id: NodeId) -> String {
        let path = self.node_path(id);
        if self.version >= Version::new(1, 4) {
            path + ".bin"
        } else {
            path
        }
    }

    /// Where the hierarchy chunk rooted at `id` lives.
    pub fn hierarchy_url(&self, id: NodeId) -> String {
        self.node_path(id) + ".hrc"
    }

    /// The bounding box of any node, derived from the root box by octant subdivision.
    pub fn node_bounds(&self, id: NodeId) -> Aabb3 {
        id.bounds(&self.bounding_box)
    }

    /// Expected spacing between points at a node's level: halves with every level of detail.
    pub fn node_spacing(&self, id: NodeId) -> f64 {
        self.spacing / f64::from(1u32 << id.level().min(31))
    }
}
