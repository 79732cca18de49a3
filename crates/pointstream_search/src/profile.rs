//! Cross-section ("profile") extraction: collect every point inside a vertical corridor swept
//! along a polyline, streaming octree nodes in as needed.
//!
//! A query runs cooperatively. Each [`ProfileQuery::step`] advances a best-first traversal by a
//! few nodes, harvests the points of the nodes it visited, and reports batches through the
//! progress callback once enough have accumulated. Coarse levels arrive first, so consumers see
//! a low-density result immediately that densifies over time.

use crate::{Traversal, TraversalStatus};

use pointstream_core::{Aabb3, Plane};
use pointstream_storage::{AttributeKind, DecodedAttribute, ElementType, NodeId, Octree};

use glam::DVec3;
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProfileError {
    #[error("a profile needs at least two waypoints")]
    TooFewWaypoints,
    #[error("profile width must be positive")]
    NonPositiveWidth,
    #[error("consecutive waypoints coincide in the horizontal plane")]
    DegenerateSegment,
}

/// One leg of the polyline, with the planes used to clip points against its corridor.
#[derive(Clone, Debug)]
pub struct ProfileSegment {
    pub start: DVec3,
    pub end: DVec3,
    /// Horizontal unit direction from start to end.
    pub dir: DVec3,
    /// Horizontal length of the leg.
    pub length: f64,
    /// Vertical plane through the leg; distance to it measures sideways offset.
    pub cut_plane: Plane,
    /// Perpendicular plane through the midpoint; distance to it measures along-leg overshoot.
    pub half_plane: Plane,
    /// Cumulative horizontal length of all earlier legs.
    pub offset: f64,
}

/// A polyline corridor: vertical slabs of the given width around each leg.
#[derive(Clone, Debug)]
pub struct Profile {
    segments: Vec<ProfileSegment>,
    width: f64,
}

impl Profile {
    pub fn new(waypoints: &[DVec3], width: f64) -> Result<Self, ProfileError> {
        if waypoints.len() < 2 {
            return Err(ProfileError::TooFewWaypoints);
        }
        if width <= 0.0 {
            return Err(ProfileError::NonPositiveWidth);
        }

        let mut segments = Vec::with_capacity(waypoints.len() - 1);
        let mut offset = 0.0;
        for pair in waypoints.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let mut flat = end - start;
            flat.z = 0.0;
            let length = flat.length();
            if length == 0.0 {
                return Err(ProfileError::DegenerateSegment);
            }
            let dir = flat / length;

            let center = (start + end) * 0.5;
            segments.push(ProfileSegment {
                start,
                end,
                dir,
                length,
                cut_plane: Plane::from_normal_and_point(DVec3::Z.cross(dir), start),
                half_plane: Plane::from_normal_and_point(dir, center),
                offset,
            });
            offset += length;
        }

        Ok(Self { segments, width })
    }

    #[inline]
    pub fn segments(&self) -> &[ProfileSegment] {
        &self.segments
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Conservative box test: could any point inside `bounds` fall in the corridor?
    pub fn intersects_bounds(&self, bounds: &Aabb3) -> bool {
        let sphere = bounds.bounding_sphere();
        self.segments.iter().any(|seg| {
            seg.cut_plane.distance(sphere.center) < sphere.radius + self.width / 2.0
                && seg.half_plane.distance(sphere.center) < sphere.radius + seg.length / 2.0
        })
    }

    /// Exact point test against one leg's corridor. The corridor is unbounded vertically.
    #[inline]
    pub fn contains_point(&self, seg: &ProfileSegment, p: DVec3) -> bool {
        seg.cut_plane.distance(p) < self.width / 2.0 && seg.half_plane.distance(p) < seg.length / 2.0
    }
}

/// A column of one attribute's values for collected points, widened per the decoded layout.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl AttributeData {
    fn new(element: ElementType) -> Self {
        match element {
            ElementType::U8 => AttributeData::U8(Vec::new()),
            ElementType::U16 => AttributeData::U16(Vec::new()),
            ElementType::U32 => AttributeData::U32(Vec::new()),
            ElementType::F32 => AttributeData::F32(Vec::new()),
            ElementType::F64 => AttributeData::F64(Vec::new()),
        }
    }

    /// Append one point's native-endian element bytes.
    fn extend_from_bytes(&mut self, bytes: &[u8]) {
        match self {
            AttributeData::U8(v) => v.extend_from_slice(bytes),
            AttributeData::U16(v) => {
                for c in bytes.chunks_exact(2) {
                    v.push(u16::from_ne_bytes([c[0], c[1]]));
                }
            }
            AttributeData::U32(v) => {
                for c in bytes.chunks_exact(4) {
                    v.push(u32::from_ne_bytes([c[0], c[1], c[2], c[3]]));
                }
            }
            AttributeData::F32(v) => {
                for c in bytes.chunks_exact(4) {
                    v.push(f32::from_ne_bytes([c[0], c[1], c[2], c[3]]));
                }
            }
            AttributeData::F64(v) => {
                for c in bytes.chunks_exact(8) {
                    v.push(f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]));
                }
            }
        }
    }

    pub fn len_values(&self) -> usize {
        match self {
            AttributeData::U8(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::F32(v) => v.len(),
            AttributeData::F64(v) => v.len(),
        }
    }
}

/// Points collected for one leg of the profile.
#[derive(Clone, Debug)]
pub struct SegmentPoints {
    /// World-space positions.
    pub positions: Vec<DVec3>,
    /// Distance along the whole polyline, measured horizontally.
    pub mileage: Vec<f64>,
    /// Non-position attribute columns, in decoded layout order.
    pub attributes: Vec<(AttributeKind, AttributeData)>,
    pub bounds: Aabb3,
}

impl SegmentPoints {
    fn new(template: &[DecodedAttribute]) -> Self {
        Self {
            positions: Vec::new(),
            mileage: Vec::new(),
            attributes: template
                .iter()
                .map(|a| (a.attribute.kind, AttributeData::new(a.attribute.element)))
                .collect(),
            bounds: Aabb3::EMPTY,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// One batch of collected profile points. Batches are incremental; consumers concatenate them.
#[derive(Clone, Debug)]
pub struct ProfileData {
    pub segments: Vec<SegmentPoints>,
    pub bounds: Aabb3,
}

impl ProfileData {
    fn new(num_segments: usize, template: &[DecodedAttribute]) -> Self {
        Self {
            segments: (0..num_segments).map(|_| SegmentPoints::new(template)).collect(),
            bounds: Aabb3::EMPTY,
        }
    }

    pub fn num_points(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }
}

/// Final accounting for a finished query.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProfileSummary {
    pub total_points: u64,
    pub nodes_visited: u64,
    pub deepest_level: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryState {
    Running,
    Finished,
    Cancelled,
}

type ProgressFn = Box<dyn FnMut(ProfileData)>;
type FinishFn = Box<dyn FnOnce(ProfileSummary)>;
type CancelFn = Box<dyn FnOnce()>;

pub struct ProfileQueryBuilder {
    profile: Profile,
    max_depth: u8,
    nodes_per_step: usize,
    flush_threshold: usize,
    on_progress: Option<ProgressFn>,
    on_finish: Option<FinishFn>,
    on_cancel: Option<CancelFn>,
}

impl ProfileQueryBuilder {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            max_depth: NodeId::MAX_LEVEL,
            nodes_per_step: 1,
            flush_threshold: 100,
            on_progress: None,
            on_finish: None,
            on_cancel: None,
        }
    }

    /// Never descend below this octree level.
    pub fn max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Nodes harvested per tick. Small values keep ticks short.
    pub fn nodes_per_step(mut self, nodes_per_step: usize) -> Self {
        self.nodes_per_step = nodes_per_step.max(1);
        self
    }

    /// Collected points are reported once more than this many are pending.
    pub fn flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    pub fn on_progress(mut self, f: impl FnMut(ProfileData) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnOnce(ProfileSummary) + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    pub fn build(self, octree: &Octree) -> ProfileQuery {
        let mut traversal = Traversal::new();
        traversal.set_max_depth(self.max_depth);

        let template: Vec<DecodedAttribute> = octree
            .meta()
            .layout
            .decoded()
            .attributes()
            .iter()
            .filter(|a| a.attribute.kind != AttributeKind::Position)
            .copied()
            .collect();
        let pending = ProfileData::new(self.profile.segments().len(), &template);

        ProfileQuery {
            profile: self.profile,
            traversal,
            template,
            pending,
            pending_points: 0,
            nodes_per_step: self.nodes_per_step,
            flush_threshold: self.flush_threshold,
            seeded: false,
            cancel_requested: false,
            deepest_level: 0,
            total_points: 0,
            nodes_visited: 0,
            state: QueryState::Running,
            on_progress: self.on_progress,
            on_finish: self.on_finish,
            on_cancel: self.on_cancel,
        }
    }
}

/// A running profile extraction.
///
/// Drive it by calling [`step`](Self::step) every tick, interleaved with `Octree::pump`. The
/// query pins nodes only for the duration of a single harvest, so it never wedges the cache.
pub struct ProfileQuery {
    profile: Profile,
    traversal: Traversal,
    template: Vec<DecodedAttribute>,
    pending: ProfileData,
    pending_points: usize,
    nodes_per_step: usize,
    flush_threshold: usize,
    seeded: bool,
    cancel_requested: bool,
    deepest_level: u8,
    total_points: u64,
    nodes_visited: u64,
    state: QueryState,
    on_progress: Option<ProgressFn>,
    on_finish: Option<FinishFn>,
    on_cancel: Option<CancelFn>,
}

impl ProfileQuery {
    #[inline]
    pub fn state(&self) -> QueryState {
        self.state
    }

    /// The deepest octree level a harvested node had.
    #[inline]
    pub fn deepest_level(&self) -> u8 {
        self.deepest_level
    }

    #[inline]
    pub fn nodes_visited(&self) -> u64 {
        self.nodes_visited
    }

    /// Advance the query by one tick.
    pub fn step(&mut self, octree: &mut Octree) -> QueryState {
        if self.state != QueryState::Running {
            return self.state;
        }
        if !self.seeded {
            // The root always enters the frontier; acceptance gates only its descendants.
            self.traversal.push(NodeId::ROOT, f64::INFINITY);
            self.seeded = true;
        }

        let profile = &self.profile;
        let mut visited = Vec::new();
        let status = self.traversal.step(
            octree,
            self.nodes_per_step,
            |octree, id| match octree.node(id) {
                Some(node) => profile.intersects_bounds(node.bounds()),
                None => false,
            },
            |octree, id| match octree.node(id) {
                Some(node) => node.bounds().bounding_sphere().radius,
                None => 0.0,
            },
            |octree, id| {
                octree.pin(id);
                visited.push(id);
            },
        );

        for id in visited {
            self.harvest(octree, id);
            octree.unpin(id);
        }

        if self.pending_points > self.flush_threshold {
            self.flush();
        }

        if status == TraversalStatus::Complete {
            self.flush();
            if let Some(on_finish) = self.on_finish.take() {
                on_finish(ProfileSummary {
                    total_points: self.total_points,
                    nodes_visited: self.nodes_visited,
                    deepest_level: self.deepest_level,
                });
            }
            log::debug!(
                "profile finished: {} points from {} nodes",
                self.total_points,
                self.nodes_visited
            );
            self.state = QueryState::Finished;
        }

        self.state
    }

    /// Stop descending: finish the levels already reached, then complete. Harmless to call more
    /// than once; later calls do nothing.
    pub fn finish_level_then_cancel(&mut self) {
        if self.cancel_requested || self.state != QueryState::Running {
            return;
        }
        self.cancel_requested = true;
        self.traversal.set_max_depth(self.deepest_level);
        log::debug!("profile winding down at level {}", self.deepest_level);
    }

    /// Stop immediately. Pending unreported points are discarded.
    pub fn cancel(&mut self) {
        if self.state != QueryState::Running {
            return;
        }
        self.traversal.clear();
        self.state = QueryState::Cancelled;
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }

    fn harvest(&mut self, octree: &Octree, id: NodeId) {
        let node = match octree.node(id) {
            Some(node) => node,
            None => return,
        };
        let buffer = match node.buffer() {
            Some(buffer) => buffer,
            None => return,
        };
        let node_min = node.bounds().min;

        self.nodes_visited += 1;
        self.deepest_level = self.deepest_level.max(id.level());

        for i in 0..buffer.num_points() {
            let local = buffer.position(i);
            let p = node_min
                + DVec3::new(f64::from(local[0]), f64::from(local[1]), f64::from(local[2]));

            for (s, seg) in self.profile.segments.iter().enumerate() {
                if !self.profile.contains_point(seg, p) {
                    continue;
                }
                let out = &mut self.pending.segments[s];
                out.positions.push(p);
                out.mileage.push(seg.offset + seg.dir.dot(p - seg.start));
                out.bounds.expand_by_point(p);
                for ((_, column), attr) in out.attributes.iter_mut().zip(&self.template) {
                    column.extend_from_bytes(buffer.element_bytes(i, attr));
                }
                self.pending.bounds.expand_by_point(p);
                self.pending_points += 1;
                self.total_points += 1;
            }
        }
    }

    fn flush(&mut self) {
        if self.pending_points == 0 {
            return;
        }
        let batch = std::mem::replace(
            &mut self.pending,
            ProfileData::new(self.profile.segments().len(), &self.template),
        );
        self.pending_points = 0;
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(batch);
        }
    }
}

/// Handle for one query registered in a [`QuerySet`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct QueryId(u64);

/// A set of concurrent profile queries stepped round-robin, in insertion order.
#[derive(Default)]
pub struct QuerySet {
    queries: IndexMap<u64, ProfileQuery>,
    next_id: u64,
}

impl QuerySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: ProfileQuery) -> QueryId {
        let id = self.next_id;
        self.next_id += 1;
        self.queries.insert(id, query);

        QueryId(id)
    }

    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut ProfileQuery> {
        self.queries.get_mut(&id.0)
    }

    pub fn cancel(&mut self, id: QueryId) {
        if let Some(query) = self.queries.get_mut(&id.0) {
            query.cancel();
        }
        self.queries.shift_remove(&id.0);
    }

    /// Step every query once, dropping the ones that finish or get cancelled.
    pub fn step_all(&mut self, octree: &mut Octree) {
        self.queries
            .retain(|_, query| query.step(octree) == QueryState::Running);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
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
    use pointstream_storage::StreamConfig;

    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use utilities::{CloudBuilder, TEST_INTENSITY};

    fn corridor() -> Profile {
        Profile::new(&[DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0)], 2.0).unwrap()
    }

    fn run_to_completion(query: &mut ProfileQuery, octree: &mut Octree) {
        for _ in 0..1000 {
            if query.step(octree) != QueryState::Running {
                return;
            }
            octree.pump();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        panic!("query did not finish");
    }

    #[test]
    fn corridor_clips_points_and_measures_mileage() {
        let bounds = Aabb3::new(DVec3::splat(-2.0), DVec3::splat(6.0));
        let cloud = CloudBuilder::new(bounds)
            .attributes(&["POSITION_CARTESIAN", "INTENSITY"])
            .node(
                "r",
                vec![
                    DVec3::new(1.0, 0.5, 0.0),   // inside
                    DVec3::new(1.0, 1.5, 0.0),   // too far sideways
                    DVec3::new(-0.5, 0.0, 0.0),  // behind the start
                    DVec3::new(1.0, -1.5, 0.0),  // too far the other way
                ],
            )
            .build();
        let (mut octree, _) = cloud.octree(StreamConfig::default());

        let batches = Rc::new(RefCell::new(Vec::new()));
        let summary = Rc::new(RefCell::new(None));
        let mut query = ProfileQueryBuilder::new(corridor())
            .on_progress({
                let batches = batches.clone();
                move |data| batches.borrow_mut().push(data)
            })
            .on_finish({
                let summary = summary.clone();
                move |s| *summary.borrow_mut() = Some(s)
            })
            .build(&octree);

        run_to_completion(&mut query, &mut octree);

        let batches = batches.borrow();
        assert_eq!(batches.len(), 1);
        let segment = &batches[0].segments[0];
        assert_eq!(segment.positions, vec![DVec3::new(1.0, 0.5, 0.0)]);
        assert_eq!(segment.mileage, vec![1.0]);
        assert_eq!(segment.bounds.min, DVec3::new(1.0, 0.5, 0.0));
        assert_eq!(segment.bounds.max, DVec3::new(1.0, 0.5, 0.0));
        assert_eq!(
            segment.attributes[0],
            (
                AttributeKind::Intensity,
                AttributeData::F32(vec![f32::from(TEST_INTENSITY)])
            )
        );

        assert_eq!(
            *summary.borrow(),
            Some(ProfileSummary {
                total_points: 1,
                nodes_visited: 1,
                deepest_level: 0
            })
        );
    }

    #[test]
    fn descends_into_intersecting_subtrees_only() {
        let bounds = Aabb3::new(DVec3::splat(-8.0), DVec3::splat(8.0));
        // r4 straddles the corridor; r22 is a far-corner grandchild whose cube cannot reach it,
        // even by the conservative sphere test.
        let cloud = CloudBuilder::new(bounds)
            .node("r", vec![DVec3::new(1.0, -0.5, -1.0)])
            .node("r4", vec![DVec3::new(2.0, -0.25, -2.0)])
            .node("r2", vec![])
            .node("r22", vec![DVec3::new(-6.0, 6.0, -6.0)])
            .build();
        let (mut octree, fetcher) = cloud.octree(StreamConfig::default());

        let collected = Rc::new(RefCell::new(Vec::new()));
        let mut query = ProfileQueryBuilder::new(corridor())
            .nodes_per_step(4)
            .on_progress({
                let collected = collected.clone();
                move |data| {
                    collected
                        .borrow_mut()
                        .extend(data.segments[0].positions.iter().copied())
                }
            })
            .build(&octree);

        run_to_completion(&mut query, &mut octree);

        let mut points = collected.borrow().clone();
        points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
        assert_eq!(
            points,
            vec![DVec3::new(1.0, -0.5, -1.0), DVec3::new(2.0, -0.25, -2.0)]
        );
        // The corridor misses r22 entirely, so its payload was never requested.
        let r22 = pointstream_storage::NodeId::from_name("r22").unwrap();
        assert_eq!(fetcher.fetch_count(&cloud.meta.point_url(r22)), 0);
    }

    #[test]
    fn cancel_is_immediate_and_wind_down_is_idempotent() {
        let bounds = Aabb3::new(DVec3::splat(-2.0), DVec3::splat(6.0));
        let cloud = CloudBuilder::new(bounds)
            .node("r", vec![DVec3::new(1.0, 0.0, 0.0)])
            .build();
        let (mut octree, _) = cloud.octree(StreamConfig::default());

        let cancelled = Rc::new(RefCell::new(0));
        let mut query = ProfileQueryBuilder::new(corridor())
            .on_cancel({
                let cancelled = cancelled.clone();
                move || *cancelled.borrow_mut() += 1
            })
            .build(&octree);

        query.step(&mut octree);
        query.finish_level_then_cancel();
        query.finish_level_then_cancel();

        query.cancel();
        assert_eq!(query.state(), QueryState::Cancelled);
        assert_eq!(*cancelled.borrow(), 1);

        // Further steps and cancels are inert.
        assert_eq!(query.step(&mut octree), QueryState::Cancelled);
        query.cancel();
        assert_eq!(*cancelled.borrow(), 1);
    }

    #[test]
    fn wind_down_caps_depth_at_levels_already_served() {
        let bounds = Aabb3::new(DVec3::splat(-8.0), DVec3::splat(8.0));
        let cloud = CloudBuilder::new(bounds)
            .node("r", vec![DVec3::new(1.0, -0.5, 0.0)])
            .node("r4", vec![DVec3::new(2.0, -0.25, 0.0)])
            .node("r44", vec![DVec3::new(2.5, -0.25, 0.0)])
            .build();
        let (mut octree, _) = cloud.octree(StreamConfig::default());

        let total = Rc::new(RefCell::new(None));
        let mut query = ProfileQueryBuilder::new(corridor())
            .on_finish({
                let total = total.clone();
                move |s| *total.borrow_mut() = Some(s)
            })
            .build(&octree);

        // Let only the root get harvested, then wind down.
        while query.nodes_visited() == 0 && query.state() == QueryState::Running {
            query.step(&mut octree);
            octree.pump();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        query.finish_level_then_cancel();
        run_to_completion(&mut query, &mut octree);

        let summary = (*total.borrow()).unwrap();
        assert_eq!(summary.deepest_level, 0);
        assert_eq!(summary.nodes_visited, 1);
    }

    #[test]
    fn degenerate_profiles_are_rejected() {
        assert_eq!(
            Profile::new(&[DVec3::ZERO], 1.0).unwrap_err(),
            ProfileError::TooFewWaypoints
        );
        assert_eq!(
            Profile::new(&[DVec3::ZERO, DVec3::X], 0.0).unwrap_err(),
            ProfileError::NonPositiveWidth
        );
        // Purely vertical legs have no horizontal direction.
        assert_eq!(
            Profile::new(&[DVec3::ZERO, DVec3::new(0.0, 0.0, 5.0)], 1.0).unwrap_err(),
            ProfileError::DegenerateSegment
        );
    }

    #[test]
    fn mileage_accumulates_across_segments() {
        let profile = Profile::new(
            &[
                DVec3::ZERO,
                DVec3::new(10.0, 0.0, 0.0),
                DVec3::new(10.0, 10.0, 0.0),
            ],
            2.0,
        )
        .unwrap();

        let second = &profile.segments()[1];
        assert_eq!(second.offset, 10.0);
        let p = DVec3::new(10.2, 3.0, -1.0);
        assert!(profile.contains_point(second, p));
        assert_eq!(second.offset + second.dir.dot(p - second.start), 13.0);
    }
}
