use float_ord::FloatOrd;
use pointstream_storage::{NodeId, NodeState, Octree};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One queued node. Max-heap order: heaviest weight first, and among equal weights the earliest
/// enqueued, so a node that waits on a load cannot be starved by later arrivals of equal weight.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
struct Candidate {
    weight: FloatOrd<f64>,
    seq: Reverse<u64>,
    id: NodeId,
}

/// What a traversal tick accomplished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraversalStatus {
    /// The frontier is exhausted; stepping again does nothing.
    Complete,
    /// The per-tick budget ran out, or nodes are still waiting on loads.
    Yielded,
}

/// Best-first descent over a streaming octree, spread across cooperative ticks.
///
/// Each [`step`](Self::step) pops up to `budget` nodes in descending weight order. A popped node
/// that is not resident has its load requested and goes back into the queue at its original
/// weight and arrival order; it will be popped again on a later tick, once `Octree::pump` has
/// made it resident. Loaded nodes are visited and their accepted children join the frontier.
///
/// The traversal holds no references into the octree between ticks, only node ids, so the cache
/// is free to evict anything between steps.
pub struct Traversal {
    queue: BinaryHeap<Candidate>,
    next_seq: u64,
    max_depth: u8,
}

impl Traversal {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            max_depth: NodeId::MAX_LEVEL,
        }
    }

    /// Put a node on the frontier.
    pub fn push(&mut self, id: NodeId, weight: f64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Candidate {
            weight: FloatOrd(weight),
            seq: Reverse(seq),
            id,
        });
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Stop descending below `max_depth`. Takes effect on the next tick; already queued deeper
    /// nodes are dropped as they surface.
    pub fn set_max_depth(&mut self, max_depth: u8) {
        self.max_depth = max_depth;
    }

    /// Drop the whole frontier.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Run one tick: pop up to `budget` nodes, visiting those that are resident.
    ///
    /// `accept` gates which nodes enter the frontier at all (beyond the seeds); `weight` orders
    /// them; `visit` runs once per popped resident node, which is touched in the cache first.
    pub fn step(
        &mut self,
        octree: &mut Octree,
        budget: usize,
        mut accept: impl FnMut(&Octree, NodeId) -> bool,
        mut weight: impl FnMut(&Octree, NodeId) -> f64,
        mut visit: impl FnMut(&mut Octree, NodeId),
    ) -> TraversalStatus {
        // Candidates waiting on loads go back in after the loop so one stalled node cannot eat
        // the whole budget by being re-popped within a single tick.
        let mut stalled = Vec::new();

        for _ in 0..budget {
            let candidate = match self.queue.pop() {
                Some(c) => c,
                None => break,
            };
            let id = candidate.id;
            if id.level() > self.max_depth {
                continue;
            }

            let state = match octree.node(id) {
                Some(node) => node.state(),
                None => continue,
            };
            match state {
                NodeState::Failed => continue,
                NodeState::Loaded => {
                    octree.touch(id);
                    visit(octree, id);
                    self.push_children(octree, id, &mut accept, &mut weight);
                }
                NodeState::Unknown | NodeState::MetadataKnown | NodeState::Loading => {
                    octree.load(id);
                    stalled.push(candidate);
                }
            }
        }

        for candidate in stalled {
            self.queue.push(candidate);
        }

        if self.queue.is_empty() {
            TraversalStatus::Complete
        } else {
            TraversalStatus::Yielded
        }
    }

    fn push_children(
        &mut self,
        octree: &Octree,
        id: NodeId,
        accept: &mut impl FnMut(&Octree, NodeId) -> bool,
        weight: &mut impl FnMut(&Octree, NodeId) -> f64,
    ) {
        if id.level() >= self.max_depth {
            return;
        }
        let children: Vec<NodeId> = octree.store().known_children(id).collect();
        for child in children {
            if accept(octree, child) {
                let w = weight(octree, child);
                self.push(child, w);
            }
        }
    }
}

impl Default for Traversal {
    fn default() -> Self {
        Self::new()
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

    use pretty_assertions::assert_eq;

    #[test]
    fn heavier_candidates_pop_first() {
        let mut traversal = Traversal::new();
        traversal.push(NodeId::ROOT.child(0), 1.0);
        traversal.push(NodeId::ROOT.child(1), 8.0);
        traversal.push(NodeId::ROOT.child(2), 4.0);

        let order: Vec<NodeId> = std::iter::from_fn(|| traversal.queue.pop().map(|c| c.id)).collect();
        assert_eq!(
            order,
            vec![
                NodeId::ROOT.child(1),
                NodeId::ROOT.child(2),
                NodeId::ROOT.child(0)
            ]
        );
    }

    #[test]
    fn equal_weights_pop_in_arrival_order() {
        let mut traversal = Traversal::new();
        for octant in [3u8, 1, 4, 2] {
            traversal.push(NodeId::ROOT.child(octant), 2.5);
        }

        let order: Vec<NodeId> = std::iter::from_fn(|| traversal.queue.pop().map(|c| c.id)).collect();
        assert_eq!(
            order,
            vec![
                NodeId::ROOT.child(3),
                NodeId::ROOT.child(1),
                NodeId::ROOT.child(4),
                NodeId::ROOT.child(2)
            ]
        );
    }

    #[test]
    fn requeued_candidate_keeps_its_arrival_order() {
        let mut traversal = Traversal::new();
        traversal.push(NodeId::ROOT.child(0), 1.0);
        let first = traversal.queue.pop().unwrap();
        traversal.push(NodeId::ROOT.child(1), 1.0);

        // Re-push the popped candidate as `step` does for a node waiting on a load.
        traversal.queue.push(first);

        assert_eq!(traversal.queue.pop().unwrap().id, NodeId::ROOT.child(0));
        assert_eq!(traversal.queue.pop().unwrap().id, NodeId::ROOT.child(1));
    }
}
