//! Conversion between trees and sorted lists of nodes.
use alloc::vec::Vec;
use core::iter::FusedIterator;

use crate::{
    node::{Color, IsNext, NodeId, NEXT, PREV},
    pool::Pool,
};

/// A singly linked list of nodes chained through their `next` links, as
/// produced by [`Pool::merge`] and [`Pool::make_list`].
///
/// The nodes of a list belong to no tree. Pass the list to
/// [`Pool::build_tree`] to get a tree back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeList {
    pub head: Option<NodeId>,
    pub len: usize,
}

impl NodeList {
    #[inline]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<Element> Pool<Element> {
    /// Take a tree apart into a list of its nodes in order. The tree is left
    /// empty.
    pub fn make_list(&mut self, tree: &mut Option<NodeId>) -> NodeList {
        let mut list = NodeList::new();

        // Walk backwards. `prev` never looks at the bigger nodes, which are
        // the ones already rechained.
        let mut cur = self.last(tree.take());
        while let Some(node) = cur {
            cur = self.prev(node);

            let header = &mut self[node];
            header.reset_header();
            header.set_link(NEXT, list.head);
            list.head = Some(node);
            list.len += 1;
        }

        log::trace!("made a list of {} nodes", list.len);
        list
    }

    /// Iterate over the nodes of a list.
    pub fn list_iter(&self, list: &NodeList) -> ListIter<'_, Element> {
        ListIter {
            pool: self,
            cur: list.head,
            remaining: list.len,
        }
    }

    /// Build a balanced tree from a list in linear time. The list order is
    /// taken as the in-order sequence and isn't checked against any
    /// comparator.
    ///
    /// All levels but the deepest are full, and only the nodes on the deepest
    /// level are red (unless it's the root).
    pub fn build_tree(&mut self, list: NodeList) -> Option<NodeId> {
        let mut ids = Vec::with_capacity(list.len);
        let mut cur = list.head;
        while let Some(node) = cur {
            ids.push(node);
            cur = self[node].link(NEXT);
        }
        debug_assert_eq!(ids.len(), list.len, "the list length is out of sync");

        let n = ids.len();
        if n == 0 {
            return None;
        }
        let deepest = (usize::BITS - n.leading_zeros() - 1) as usize;

        // (start, end, depth, where to hang the subtree)
        let mut work: Vec<(usize, usize, usize, Option<(NodeId, IsNext)>)> =
            Vec::with_capacity(2 * deepest + 2);
        work.push((0, n, 0, None));
        let mut root = None;

        while let Some((start, end, depth, parent)) = work.pop() {
            let mid = start + (end - start - 1) / 2;
            let node = ids[mid];

            let header = &mut self[node];
            header.reset_header();
            if depth == deepest && depth != 0 {
                header.set_color(Color::Red);
            }

            if mid > start {
                header.clear_thread(PREV);
                work.push((start, mid, depth + 1, Some((node, PREV))));
            } else {
                header.set_link(PREV, mid.checked_sub(1).map(|i| ids[i]));
            }

            if mid + 1 < end {
                header.clear_thread(NEXT);
                work.push((mid + 1, end, depth + 1, Some((node, NEXT))));
            } else {
                header.set_link(NEXT, ids.get(mid + 1).copied());
            }

            match parent {
                Some((parent, side)) => self[parent].set_link(side, Some(node)),
                None => root = Some(node),
            }
        }

        log::trace!("built a tree of {} nodes, {} levels", n, deepest + 1);
        root
    }
}

/// An iterator over the nodes of a [`NodeList`], created by
/// [`Pool::list_iter`].
#[derive(Debug)]
pub struct ListIter<'a, Element> {
    pool: &'a Pool<Element>,
    cur: Option<NodeId>,
    remaining: usize,
}

impl<'a, Element> Iterator for ListIter<'a, Element> {
    type Item = (NodeId, &'a Element);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.cur?;
        self.remaining -= 1;
        self.cur = self.pool[node].link(NEXT);
        Some((node, &self.pool[node].element))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<Element> FusedIterator for ListIter<'_, Element> {}
