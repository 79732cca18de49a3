use crate::{Traversal, TraversalStatus};

use pointstream_storage::{NodeId, Octree};

/// Collects the set of loaded nodes a camera-style refinement would draw, best first.
///
/// This is the rendering-side counterpart of a profile query: seed it with the root weighted by
/// projected importance, then call [`run`](Self::run) every frame. Nodes already resident are
/// appended to the visible list immediately; the rest stream in over subsequent frames.
pub struct VisibilityPass {
    traversal: Traversal,
    visible: Vec<NodeId>,
}

impl VisibilityPass {
    pub fn new(max_depth: u8) -> Self {
        let mut traversal = Traversal::new();
        traversal.set_max_depth(max_depth);

        Self {
            traversal,
            visible: Vec::new(),
        }
    }

    /// Start a fresh frame: clear the collected set and seed the frontier.
    pub fn restart(&mut self, seed_weight: f64) {
        self.traversal.clear();
        self.visible.clear();
        self.traversal.push(NodeId::ROOT, seed_weight);
    }

    /// Advance by up to `budget` nodes. `accept` culls subtrees, `weight` ranks refinement
    /// order. Returns `Complete` once the accepted frontier is exhausted.
    pub fn run(
        &mut self,
        octree: &mut Octree,
        budget: usize,
        accept: impl FnMut(&Octree, NodeId) -> bool,
        weight: impl FnMut(&Octree, NodeId) -> f64,
    ) -> TraversalStatus {
        let Self { traversal, visible } = self;

        traversal.step(octree, budget, accept, weight, |octree, id| {
            octree.pin(id);
            visible.push(id);
        })
    }

    /// Loaded nodes collected so far, in the order they were reached.
    #[inline]
    pub fn visible(&self) -> &[NodeId] {
        &self.visible
    }

    /// Release the pins taken while collecting. Call once the frame is done with the buffers.
    pub fn release(&mut self, octree: &mut Octree) {
        for &id in &self.visible {
            octree.unpin(id);
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
    use pointstream_core::Aabb3;
    use pointstream_storage::StreamConfig;
    use utilities::CloudBuilder;

    #[test]
    fn collects_loaded_nodes_best_first() {
        let bounds = Aabb3::new(DVec3::splat(-8.0), DVec3::splat(8.0));
        let cloud = CloudBuilder::new(bounds)
            .node("r", vec![DVec3::new(1.0, 1.0, 1.0)])
            .node("r0", vec![DVec3::new(-6.0, -6.0, -6.0)])
            .node("r7", vec![DVec3::new(6.0, 6.0, 6.0)])
            .build();
        let (mut octree, _) = cloud.octree(StreamConfig::default());

        let mut pass = VisibilityPass::new(4);
        pass.restart(f64::INFINITY);

        for _ in 0..1000 {
            let status = pass.run(
                &mut octree,
                8,
                |_, _| true,
                |octree, id| octree.node(id).map_or(0.0, |n| n.spacing()),
            );
            if status == TraversalStatus::Complete {
                break;
            }
            octree.pump();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        // The root is always first; the leaves' relative order depends on load completion.
        let mut names: Vec<String> = pass.visible().iter().map(|id| id.name()).collect();
        assert_eq!(names[0], "r");
        names.sort();
        assert_eq!(names, vec!["r", "r0", "r7"]);
        pass.release(&mut octree);
    }
}
