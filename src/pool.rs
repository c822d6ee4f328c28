//! The arena that owns every node.
//!
//! Nodes refer to each other by [`NodeId`] instead of by pointer, so a thread
//! is simply a handle into the same pool tagged by a flag bit. Any number of
//! trees can live in one pool; a tree is nothing more than an
//! `Option<NodeId>` root held by the caller.
use core::ops::{Index, IndexMut};
use slab::Slab;

use crate::node::{IsNext, Node, NodeId};

/// Storage for the nodes of one or more trees.
pub struct Pool<Element> {
    slab: Slab<Node<Element>>,
}

impl<Element> Default for Pool<Element> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<Element> Pool<Element> {
    #[inline]
    pub const fn new() -> Self {
        Self { slab: Slab::new() }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slab: Slab::with_capacity(capacity),
        }
    }

    /// Allocate a detached node holding `element`. The node can then be
    /// linked into a tree by one of the insertion operations.
    #[inline]
    pub fn alloc(&mut self, element: Element) -> NodeId {
        NodeId(self.slab.insert(Node::new(element)))
    }

    /// Release a node, returning its payload.
    ///
    /// The node must not be linked in any tree anymore.
    ///
    /// # Panics
    ///
    /// Panics if `id` doesn't refer to an allocated node.
    #[inline]
    #[track_caller]
    pub fn release(&mut self, id: NodeId) -> Element {
        self.slab.remove(id.0).element
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node<Element>> {
        self.slab.get(id.0)
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<Element>> {
        self.slab.get_mut(id.0)
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.slab.contains(id.0)
    }

    /// The number of allocated nodes, linked or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// An exclusive upper bound of the slot indices in use. Useful for sizing
    /// per-node side tables.
    #[inline]
    pub(crate) fn slot_bound(&self) -> usize {
        self.slab.capacity()
    }

    /// Borrow two distinct nodes mutably at once.
    #[inline]
    #[track_caller]
    pub(crate) fn pair_mut(
        &mut self,
        a: NodeId,
        b: NodeId,
    ) -> (&mut Node<Element>, &mut Node<Element>) {
        debug_assert_ne!(a, b);
        self.slab
            .get2_mut(a.0, b.0)
            .expect("pair_mut on a released or aliased node")
    }

    /// The child of `id` on `side`, which the red-black invariants guarantee
    /// to exist.
    #[inline]
    #[track_caller]
    pub(crate) fn real_child(&self, id: NodeId, side: IsNext) -> NodeId {
        self[id]
            .child(side)
            .expect("expected a subtree, found a thread")
    }

    #[inline]
    pub(crate) fn is_red(&self, id: NodeId) -> bool {
        self[id].is_red()
    }

    /// Like [`Self::is_red`], but a thread counts as a black nil leaf.
    #[inline]
    pub(crate) fn is_red_child(&self, id: NodeId, side: IsNext) -> bool {
        self[id].child(side).map_or(false, |child| self.is_red(child))
    }

    /// Determine which side of `parent` the subtree `child` hangs off.
    #[inline]
    pub(crate) fn side_of(&self, parent: NodeId, child: NodeId) -> IsNext {
        let parent = &self[parent];
        if parent.child(crate::node::PREV) == Some(child) {
            crate::node::PREV
        } else {
            debug_assert_eq!(
                parent.child(crate::node::NEXT),
                Some(child),
                "the parent doesn't know about its child (stack probably wrong)"
            );
            crate::node::NEXT
        }
    }
}

impl<Element> Index<NodeId> for Pool<Element> {
    type Output = Node<Element>;

    #[inline]
    #[track_caller]
    fn index(&self, id: NodeId) -> &Self::Output {
        &self.slab[id.0]
    }
}

impl<Element> IndexMut<NodeId> for Pool<Element> {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        &mut self.slab[id.0]
    }
}

impl<Element: core::fmt::Debug> core::fmt::Debug for Pool<Element> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(self.slab.iter().map(|(i, node)| (NodeId(i), node)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NEXT, PREV};

    #[test]
    fn alloc_release() {
        let mut pool = Pool::new();
        let a = pool.alloc("a");
        let b = pool.alloc("b");
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[a].element, "a");

        assert_eq!(pool.release(a), "a");
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
        assert!(pool.get(a).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn released_slots_are_reused_with_a_fresh_header() {
        let mut pool = Pool::new();
        let a = pool.alloc(1);
        pool[a].clear_thread(PREV);
        pool.release(a);

        let b = pool.alloc(2);
        assert_eq!(a, b);
        assert!(pool[b].is_thread(PREV));
        assert!(pool[b].is_thread(NEXT));
    }

    #[test]
    fn pair_mut_swaps_payloads() {
        let mut pool = Pool::new();
        let a = pool.alloc(1);
        let b = pool.alloc(2);
        let (na, nb) = pool.pair_mut(a, b);
        core::mem::swap(&mut na.element, &mut nb.element);
        assert_eq!(pool[a].element, 2);
        assert_eq!(pool[b].element, 1);
    }
}
