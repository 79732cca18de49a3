use crate::PointBuffer;

use pointstream_core::Aabb3;

use glam::DVec3;
use std::fmt;

/// The identity of an octree node: its path of child indices from the root, packed into a `u64`
/// location code.
///
/// Three bits per level plus a sentinel bit, so the root is `0b1` and child `c` of node `n` is
/// `(n << 3) | c`. Small, `Copy`, and cheap to hash, which is what lets node metadata live in a
/// flat hash map instead of a pointer tree. Supports up to [`NodeId::MAX_LEVEL`] levels.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(u64);

impl NodeId {
    pub const ROOT: Self = NodeId(1);
    pub const MAX_LEVEL: u8 = 20;

    /// The id of child `octant` (0..8) of this node.
    #[inline]
    pub fn child(self, octant: u8) -> Self {
        debug_assert!(octant < 8);
        debug_assert!(self.level() < Self::MAX_LEVEL);

        NodeId((self.0 << 3) | u64::from(octant))
    }

    #[inline]
    pub fn parent(self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Some(NodeId(self.0 >> 3))
        }
    }

    #[inline]
    pub fn is_root(self) -> bool {
        self.0 == 1
    }

    /// Depth below the root; the root is level 0.
    #[inline]
    pub fn level(self) -> u8 {
        ((63 - self.0.leading_zeros()) / 3) as u8
    }

    /// The child index of this node within its parent. Meaningless for the root.
    #[inline]
    pub fn octant(self) -> u8 {
        (self.0 & 7) as u8
    }

    /// Child indices from the root down to this node.
    pub fn path(self) -> impl Iterator<Item = u8> {
        let code = self.0;
        let level = self.level();
        (0..level)
            .rev()
            .map(move |shift| ((code >> (3 * shift)) & 7) as u8)
    }

    /// The canonical node name, e.g. `r` for the root and `r0462` for the node reached through
    /// child indices 0, 4, 6, 2.
    pub fn name(self) -> String {
        let mut name = String::with_capacity(1 + self.level() as usize);
        name.push('r');
        for octant in self.path() {
            name.push((b'0' + octant) as char);
        }
        name
    }

    /// Parse a canonical node name back into an id.
    pub fn from_name(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        if chars.next() != Some('r') {
            return None;
        }

        let mut id = Self::ROOT;
        for c in chars {
            let octant = c.to_digit(8)?;
            id = id.child(octant as u8);
        }
        Some(id)
    }

    /// The storage directory for this node's files: the full groups of `step` path digits become
    /// nested subdirectories, so `r0462` with step 2 lives under `r/04/`.
    pub fn storage_dir(self, step: u8) -> String {
        let digits: String = self.path().map(|o| (b'0' + o) as char).collect();
        let step = step.max(1) as usize;

        let mut dir = String::from("r");
        let full_groups = digits.len() / step;
        for i in 0..full_groups {
            dir.push('/');
            dir.push_str(&digits[i * step..(i + 1) * step]);
        }
        dir
    }

    /// The bounding box of this node inside `root_bounds`, derived by repeated octant subdivision
    /// along the path.
    pub fn bounds(self, root_bounds: &Aabb3) -> Aabb3 {
        let mut bounds = *root_bounds;
        for octant in self.path() {
            bounds = bounds.child_octant(octant);
        }
        bounds
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "NodeId({})", self.name())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Which children of a node exist, one bit per octant.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChildMask(pub u8);

impl ChildMask {
    pub const EMPTY: Self = ChildMask(0);

    #[inline]
    pub fn contains(self, octant: u8) -> bool {
        self.0 & (1 << octant) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// The set octant indices in increasing order.
    pub fn octants(self) -> impl Iterator<Item = u8> {
        let mask = self.0;
        (0..8).filter(move |i| mask & (1 << i) != 0)
    }
}

/// The load lifecycle of a node.
///
/// `Unknown` means the node's identity was allocated by a parent's child mask but its own
/// hierarchy record has not arrived yet; such nodes sit at the bottom of a hierarchy chunk and
/// get their metadata when their own chunk is fetched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    Unknown,
    MetadataKnown,
    Loading,
    Loaded,
    Failed,
}

/// Descendant-existence knowledge for a node. Until the covering hierarchy chunk resolves, the
/// sibling set below this node is entirely unknown and traversal treats the node as a
/// provisional leaf; it is never exposed partially.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Children {
    Unknown,
    Known(ChildMask),
}

/// Metadata for one octree node. The decoded payload is owned here iff the state is `Loaded`;
/// metadata itself persists for the octree's lifetime.
#[derive(Debug)]
pub struct OctreeNode {
    id: NodeId,
    state: NodeState,
    children: Children,
    num_points: u64,
    bounds: Aabb3,
    spacing: f64,
    buffer: Option<PointBuffer>,
    tight_bounds: Option<Aabb3>,
    mean: Option<DVec3>,
    record_applied: bool,
}

impl OctreeNode {
    pub(crate) fn new_unknown(id: NodeId, bounds: Aabb3, spacing: f64) -> Self {
        Self {
            id,
            state: NodeState::Unknown,
            children: Children::Unknown,
            num_points: 0,
            bounds,
            spacing,
            buffer: None,
            tight_bounds: None,
            mean: None,
            record_applied: false,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.state == NodeState::Loaded
    }

    #[inline]
    pub fn children(&self) -> Children {
        self.children
    }

    /// The child mask, or the empty mask while the sibling set is still unknown.
    #[inline]
    pub fn known_child_mask(&self) -> ChildMask {
        match self.children {
            Children::Known(mask) => mask,
            Children::Unknown => ChildMask::EMPTY,
        }
    }

    /// Point count from hierarchy metadata, replaced by the decoded count once loaded.
    #[inline]
    pub fn num_points(&self) -> u64 {
        self.num_points
    }

    #[inline]
    pub fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    /// Estimated spacing between points at this node's level of detail.
    #[inline]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// The decoded buffer; `Some` iff the node is `Loaded`.
    #[inline]
    pub fn buffer(&self) -> Option<&PointBuffer> {
        self.buffer.as_ref()
    }

    /// Tight bounding box of the decoded points, normalized to the origin.
    #[inline]
    pub fn tight_bounds(&self) -> Option<&Aabb3> {
        self.tight_bounds.as_ref()
    }

    /// Mean decoded position, in node-local coordinates.
    #[inline]
    pub fn mean(&self) -> Option<DVec3> {
        self.mean
    }

    pub(crate) fn apply_record(&mut self, mask: ChildMask, num_points: u64) {
        self.children = Children::Known(mask);
        // Decoded counts are authoritative once the payload arrived.
        if self.state != NodeState::Loaded {
            self.num_points = num_points;
        }
        self.record_applied = true;
        if self.state == NodeState::Unknown {
            self.state = NodeState::MetadataKnown;
        }
    }

    pub(crate) fn mark_loading(&mut self) {
        debug_assert!(matches!(
            self.state,
            NodeState::Unknown | NodeState::MetadataKnown
        ));
        self.state = NodeState::Loading;
    }

    pub(crate) fn complete_load(
        &mut self,
        buffer: PointBuffer,
        tight_bounds: Aabb3,
        mean: DVec3,
        estimated_spacing: Option<f64>,
    ) {
        self.num_points = buffer.num_points() as u64;
        self.buffer = Some(buffer);
        self.tight_bounds = Some(tight_bounds);
        self.mean = Some(mean);
        if let Some(spacing) = estimated_spacing {
            self.spacing = spacing;
        }
        self.state = NodeState::Loaded;
    }

    /// Drop the decoded payload; the node becomes loadable again.
    pub(crate) fn unload(&mut self) {
        self.buffer = None;
        self.tight_bounds = None;
        self.mean = None;
        self.state = NodeState::MetadataKnown;
    }

    /// Back out of a failed fetch: the node returns to whichever retriable state it was in.
    pub(crate) fn revert_unloaded(&mut self) {
        self.buffer = None;
        self.state = if self.record_applied {
            NodeState::MetadataKnown
        } else {
            NodeState::Unknown
        };
    }

    pub(crate) fn mark_failed(&mut self) {
        self.buffer = None;
        self.tight_bounds = None;
        self.mean = None;
        self.state = NodeState::Failed;
    }

    /// Make a permanently failed node retriable again.
    pub(crate) fn reset_failed(&mut self) {
        if self.state == NodeState::Failed {
            self.revert_unloaded();
        }
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

    use glam::DVec3;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_round_trips_through_name() {
        let id = NodeId::ROOT.child(0).child(4).child(6).child(2);

        assert_eq!(id.level(), 4);
        assert_eq!(id.name(), "r0462");
        assert_eq!(NodeId::from_name("r0462"), Some(id));
        assert_eq!(id.path().collect::<Vec<_>>(), vec![0, 4, 6, 2]);
        assert_eq!(id.parent().map(|p| p.name()), Some("r046".to_string()));
    }

    #[test]
    fn root_has_level_zero_and_no_parent() {
        assert_eq!(NodeId::ROOT.level(), 0);
        assert_eq!(NodeId::ROOT.parent(), None);
        assert_eq!(NodeId::ROOT.name(), "r");
        assert_eq!(NodeId::from_name("r"), Some(NodeId::ROOT));
    }

    #[test]
    fn from_name_rejects_garbage() {
        assert_eq!(NodeId::from_name("x012"), None);
        assert_eq!(NodeId::from_name("r8"), None);
        assert_eq!(NodeId::from_name(""), None);
    }

    #[test]
    fn storage_dir_groups_full_steps_only() {
        let id = NodeId::from_name("r04621").unwrap();

        assert_eq!(id.storage_dir(2), "r/04/62");
        assert_eq!(id.storage_dir(5), "r/04621");
        assert_eq!(id.storage_dir(7), "r");
        assert_eq!(NodeId::ROOT.storage_dir(5), "r");
    }

    #[test]
    fn bounds_follow_octant_subdivision() {
        let root = Aabb3::new(DVec3::ZERO, DVec3::splat(8.0));

        // Octant 0b100 is the upper half in x only.
        let child = NodeId::ROOT.child(4).bounds(&root);
        assert_eq!(child.min, DVec3::new(4.0, 0.0, 0.0));
        assert_eq!(child.max, DVec3::new(8.0, 4.0, 4.0));

        let grandchild = NodeId::ROOT.child(4).child(0).bounds(&root);
        assert_eq!(grandchild.min, DVec3::new(4.0, 0.0, 0.0));
        assert_eq!(grandchild.max, DVec3::new(6.0, 2.0, 2.0));
    }

    #[test]
    fn child_mask_octants() {
        let mask = ChildMask(0b1010_0001);

        assert_eq!(mask.octants().collect::<Vec<_>>(), vec![0, 5, 7]);
        assert_eq!(mask.len(), 3);
        assert!(mask.contains(5));
        assert!(!mask.contains(1));
    }
}
