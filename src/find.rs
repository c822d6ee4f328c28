//! Lookups and in-order navigation. None of these modify the tree.
use core::{cmp::Ordering, iter::FusedIterator};

use crate::{
    node::{IsNext, NodeId, NEXT, PREV},
    pool::Pool,
};

/// The relation between the key and the node to find.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Find {
    /// An element equal to the key. If there are several, the last one.
    Eq,
    /// The biggest element less than the key.
    Lt,
    /// The smallest element greater than the key.
    Gt,
    /// The biggest element less than or equal to the key.
    Le,
    /// The smallest element greater than or equal to the key.
    Ge,
}

impl<Element> Pool<Element> {
    /// Find a node. `cmp` compares the key with the given element.
    ///
    /// For [`Find::Le`] (and [`Find::Lt`]), the last of several qualifying
    /// equal elements is returned, so stepping [`Self::next`] from the result
    /// never yields an element equal to it. Likewise [`Find::Ge`] and
    /// [`Find::Gt`] return the first one.
    pub fn find(
        &self,
        tree: Option<NodeId>,
        how: Find,
        mut cmp: impl FnMut(&Element) -> Ordering,
    ) -> Option<NodeId> {
        let root = tree?;

        // Which way an equal element sends the descent
        let eq_goes_next = match how {
            Find::Eq => return self.find_eq(root, cmp),
            Find::Lt | Find::Ge => false,
            Find::Gt | Find::Le => true,
        };

        let (node, side) = self.descend(root, |element| match cmp(element) {
            Ordering::Less => PREV,
            Ordering::Greater => NEXT,
            Ordering::Equal => eq_goes_next,
        });

        // `node` is the neighbor of the key on the side `!side`, and its
        // thread on `side` points to the neighbor on the other side
        let wants_smaller = matches!(how, Find::Lt | Find::Le);
        if wants_smaller == (side == NEXT) {
            Some(node)
        } else {
            self[node].link(side)
        }
    }

    fn find_eq(&self, root: NodeId, mut cmp: impl FnMut(&Element) -> Ordering) -> Option<NodeId> {
        let mut node = root;
        let mut found_eq = false;
        loop {
            let ord = cmp(&self[node].element);
            if ord == Ordering::Less {
                match self[node].child(PREV) {
                    Some(prev) => node = prev,
                    // The predecessor is the last equal node we passed
                    None if found_eq => return self[node].link(PREV),
                    None => return None,
                }
            } else {
                match self[node].child(NEXT) {
                    Some(next) => {
                        found_eq |= ord == Ordering::Equal;
                        node = next;
                    }
                    None => return (ord == Ordering::Equal).then(|| node),
                }
            }
        }
    }

    /// Follow the links chosen by `side_of` until a thread is reached.
    /// Returns the last node and the side of the thread.
    fn descend(
        &self,
        root: NodeId,
        mut side_of: impl FnMut(&Element) -> IsNext,
    ) -> (NodeId, IsNext) {
        let mut node = root;
        loop {
            let side = side_of(&self[node].element);
            match self[node].child(side) {
                Some(child) => node = child,
                None => return (node, side),
            }
        }
    }

    /// The leftmost or rightmost node of a subtree.
    fn extreme(&self, mut node: NodeId, side: IsNext) -> NodeId {
        while let Some(child) = self[node].child(side) {
            node = child;
        }
        node
    }

    #[inline]
    pub fn first(&self, tree: Option<NodeId>) -> Option<NodeId> {
        tree.map(|root| self.extreme(root, PREV))
    }

    #[inline]
    pub fn last(&self, tree: Option<NodeId>) -> Option<NodeId> {
        tree.map(|root| self.extreme(root, NEXT))
    }

    /// The in-order neighbor of `node` on the given side. O(1) amortized
    /// when used to iterate.
    #[inline]
    pub fn step(&self, node: NodeId, side: IsNext) -> Option<NodeId> {
        match self[node].child(side) {
            Some(child) => Some(self.extreme(child, !side)),
            None => self[node].link(side),
        }
    }

    /// The in-order successor of `node`.
    #[inline]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        self.step(node, NEXT)
    }

    /// The in-order predecessor of `node`.
    #[inline]
    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        self.step(node, PREV)
    }

    /// The `n`-th node in order. Takes linear time.
    pub fn get_nth(&self, tree: Option<NodeId>, n: usize) -> Option<NodeId> {
        self.iter(tree).nth(n).map(|(node, _)| node)
    }

    /// Count the nodes of a tree. Takes linear time.
    pub fn len_of(&self, tree: Option<NodeId>) -> usize {
        self.iter(tree).count()
    }

    /// Iterate over the nodes of a tree in order.
    pub fn iter(&self, tree: Option<NodeId>) -> Iter<'_, Element> {
        Iter {
            pool: self,
            front: self.first(tree),
            back: self.last(tree),
        }
    }

    /// Determine whether two trees hold equal sequences according to `eq`.
    pub fn equal(
        &self,
        a: Option<NodeId>,
        b: Option<NodeId>,
        mut eq: impl FnMut(&Element, &Element) -> bool,
    ) -> bool {
        let mut a = self.iter(a);
        let mut b = self.iter(b);
        loop {
            match (a.next(), b.next()) {
                (Some((_, x)), Some((_, y))) if eq(x, y) => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

/// An iterator over the nodes of a tree in order, created by [`Pool::iter`].
#[derive(Debug)]
pub struct Iter<'a, Element> {
    pool: &'a Pool<Element>,
    front: Option<NodeId>,
    back: Option<NodeId>,
}

impl<Element> Clone for Iter<'_, Element> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool,
            front: self.front,
            back: self.back,
        }
    }
}

impl<'a, Element> Iter<'a, Element> {
    #[inline]
    fn advance(&mut self, side: IsNext) -> Option<(NodeId, &'a Element)> {
        let (cur, other) = if side {
            (self.front?, self.back)
        } else {
            (self.back?, self.front)
        };
        if Some(cur) == other {
            self.front = None;
            self.back = None;
        } else if side {
            self.front = self.pool.next(cur);
        } else {
            self.back = self.pool.prev(cur);
        }
        Some((cur, &self.pool[cur].element))
    }
}

impl<'a, Element> Iterator for Iter<'a, Element> {
    type Item = (NodeId, &'a Element);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.advance(NEXT)
    }
}

impl<Element> DoubleEndedIterator for Iter<'_, Element> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.advance(PREV)
    }
}

impl<Element> FusedIterator for Iter<'_, Element> {}
