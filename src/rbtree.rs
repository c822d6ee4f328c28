//! Threaded [red-black][1] [tree][2] insertion and deletion
//!
//! [1]: https://en.wikipedia.org/wiki/Red%E2%80%93black_tree
//! [2]: https://en.wikipedia.org/wiki/Threaded_binary_tree
//!
//! Nodes have no parent links. Every mutation first records the path from
//! the root to the point of interest in a [`PathStack`] and then rebalances
//! bottom-up by popping it.
//!
//! # Panic Safety
//!
//! [`Callback::cmp_element`], [`Callback::move_element`] and
//! [`Callback::replace_element`] are only called while the tree is
//! consistent, so a panic in them leaves the tree intact.
use core::{cmp::Ordering, mem::swap};

use crate::{
    node::{Color, Flags, IsNext, NodeId, NEXT, PREV},
    pool::Pool,
    stack::PathStack,
};

/// Element operations supplied by the user of a tree.
pub trait Callback<Element> {
    /// Determine the ordering between a new `Element` and an existing
    /// `Element`. Must be a strict weak order consistent over the lifetime
    /// of the tree.
    fn cmp_element(&mut self, new_element: &Element, existing_element: &Element) -> Ordering;

    /// Move the payload of `src` to `dst`. Used when a node with two
    /// subtrees is deleted: its in-order successor's payload is moved into
    /// it and the successor is unlinked instead. Whatever is left in `src`
    /// is returned to the caller with the unlinked node.
    #[inline]
    fn move_element(&mut self, dst: &mut Element, src: &mut Element) {
        swap(dst, src);
    }

    /// Called by [`Pool::insert`] when an equal element already exists.
    /// `new` belongs to the node that stays unlinked.
    #[inline]
    fn replace_element(&mut self, existing: &mut Element, new: &mut Element) {
        swap(existing, new);
    }

    /// Duplicate an element for [`Pool::copy`] and non-destructive merges.
    fn copy_element(&mut self, element: &Element) -> Element;

    /// Dispose an element whose node was released by the engine.
    #[inline]
    fn free_element(&mut self, element: Element) {
        drop(element);
    }
}

impl<Element, T: Callback<Element> + ?Sized> Callback<Element> for &mut T {
    #[inline]
    fn cmp_element(&mut self, new_element: &Element, existing_element: &Element) -> Ordering {
        (**self).cmp_element(new_element, existing_element)
    }
    #[inline]
    fn move_element(&mut self, dst: &mut Element, src: &mut Element) {
        (**self).move_element(dst, src)
    }
    #[inline]
    fn replace_element(&mut self, existing: &mut Element, new: &mut Element) {
        (**self).replace_element(existing, new)
    }
    #[inline]
    fn copy_element(&mut self, element: &Element) -> Element {
        (**self).copy_element(element)
    }
    #[inline]
    fn free_element(&mut self, element: Element) {
        (**self).free_element(element)
    }
}

/// Uses [`Ord`] and [`Clone`].
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultCallback;

impl<Element: Ord + Clone> Callback<Element> for DefaultCallback {
    #[inline]
    fn cmp_element(&mut self, e1: &Element, e2: &Element) -> Ordering {
        e1.cmp(e2)
    }
    #[inline]
    fn copy_element(&mut self, element: &Element) -> Element {
        element.clone()
    }
}

/// Where a descent stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Track {
    /// Found an equal node. It's on the top of the stack.
    Equal(NodeId),
    /// Reached the given thread of the node on the top of the stack.
    Boundary(IsNext),
}

impl<Element> Pool<Element> {
    /// Insert `new` into a tree, or replace an equal element.
    ///
    /// If the tree contains an element equal to `new`'s (the last one, if
    /// there are many), [`Callback::replace_element`] is called on it and
    /// its node is returned. `new` stays unlinked in this case. Otherwise
    /// `new` is linked and `None` is returned.
    pub fn insert(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: &mut Option<NodeId>,
        new: NodeId,
    ) -> Option<NodeId> {
        let Some(root) = *tree else {
            self.init_root(tree, new);
            return None;
        };

        let mut stack = PathStack::new();
        let track = self.track_eq(root, &mut stack, |existing| {
            callback.cmp_element(&self[new].element, existing)
        });

        match track {
            Track::Equal(existing) => {
                let (existing_node, new_node) = self.pair_mut(existing, new);
                callback.replace_element(&mut existing_node.element, &mut new_node.element);
                Some(existing)
            }
            Track::Boundary(side) => {
                self.link_at(tree, &mut stack, new, side);
                None
            }
        }
    }

    /// Insert `new` into a tree. Equal elements are kept, and `new` is placed
    /// after all of them, i.e., duplicates are sorted in insertion order.
    pub fn add(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: &mut Option<NodeId>,
        new: NodeId,
    ) {
        let Some(root) = *tree else {
            self.init_root(tree, new);
            return;
        };

        let mut stack = PathStack::new();
        let side = self.track_neq(root, &mut stack, |existing| {
            callback.cmp_element(&self[new].element, existing) != Ordering::Less
        });
        self.link_at(tree, &mut stack, new, side);
    }

    /// Link `new` immediately after `existing`, or at the front if
    /// `existing` is `None`.
    ///
    /// The caller is responsible for keeping the order. Debug builds check
    /// that `new` sorts neither before `existing` nor after its successor.
    pub fn add_after(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: &mut Option<NodeId>,
        new: NodeId,
        existing: Option<NodeId>,
    ) {
        let Some(root) = *tree else {
            assert!(existing.is_none(), "the tree doesn't contain the existing node");
            self.init_root(tree, new);
            return;
        };

        let mut stack = PathStack::new();
        let mut node = root;

        if let Some(existing) = existing {
            self.track_node(root, &mut stack, &mut callback, existing);

            if cfg!(debug_assertions) {
                assert_ne!(
                    callback.cmp_element(&self[new].element, &self[existing].element),
                    Ordering::Less,
                    "the new element sorts before {}",
                    existing
                );
                if let Some(next) = self.next(existing) {
                    assert_ne!(
                        callback.cmp_element(&self[new].element, &self[next].element),
                        Ordering::Greater,
                        "the new element sorts after {}",
                        next
                    );
                }
            }

            match self[existing].child(NEXT) {
                None => {
                    self.link_at(tree, &mut stack, new, NEXT);
                    return;
                }
                Some(next) => node = next,
            }
        } else if cfg!(debug_assertions) {
            let first = self.first(Some(root)).unwrap_or(root);
            assert_ne!(
                callback.cmp_element(&self[new].element, &self[first].element),
                Ordering::Greater,
                "the new element sorts after the first element {}",
                first
            );
        }

        // Link at the lowest position of the subtree
        stack.push(node);
        while let Some(prev) = self[node].child(PREV) {
            node = prev;
            stack.push(node);
        }
        self.link_at(tree, &mut stack, new, PREV);
    }

    /// Remove the last node equal to the key. `cmp` compares the key with
    /// the given element.
    ///
    /// Returns the node that was actually unlinked, which the caller should
    /// release. It's not necessarily the node that held the matching
    /// element; see [`Self::remove_node`].
    pub fn remove(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: &mut Option<NodeId>,
        cmp: impl FnMut(&Element) -> Ordering,
    ) -> Option<NodeId> {
        let root = (*tree)?;
        let mut stack = PathStack::new();
        match self.track_eq(root, &mut stack, cmp) {
            Track::Equal(_) => Some(self.unlink_with_move(&mut callback, tree, &mut stack)),
            Track::Boundary(_) => None,
        }
    }

    /// Remove `node` from a tree.
    ///
    /// If `node` has two subtrees, its successor's payload is moved into it
    /// by [`Callback::move_element`] and the successor is unlinked instead.
    /// Returns the node that was actually unlinked. With the default
    /// `move_element`, that node holds the removed element.
    ///
    /// # Panics
    ///
    /// Panics if `node` isn't in the tree.
    pub fn remove_node(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: &mut Option<NodeId>,
        node: NodeId,
    ) -> NodeId {
        let Some(root) = *tree else {
            panic!("removing {} from an empty tree", node);
        };
        let mut stack = PathStack::new();
        self.track_node(root, &mut stack, &mut callback, node);
        self.unlink_with_move(&mut callback, tree, &mut stack)
    }

    fn init_root(&mut self, tree: &mut Option<NodeId>, new: NodeId) {
        self[new].reset_header();
        *tree = Some(new);
    }

    /// Descend from `root` looking for an element equal to the key,
    /// recording the path. `cmp` compares the key with a given element.
    ///
    /// When there are several equal elements, the last one is found.
    pub(crate) fn track_eq(
        &self,
        root: NodeId,
        stack: &mut PathStack,
        mut cmp: impl FnMut(&Element) -> Ordering,
    ) -> Track {
        debug_assert!(stack.is_empty());
        let mut node = root;
        let mut found_eq = false;
        loop {
            stack.push(node);
            let ord = cmp(&self[node].element);
            let header = &self[node];
            if ord == Ordering::Less {
                match header.child(PREV) {
                    Some(prev) => node = prev,
                    None if found_eq => {
                        // The predecessor is the last equal node we passed
                        let Some(eq) = header.link(PREV) else {
                            unreachable!()
                        };
                        while stack.peek() != Some(eq) {
                            stack.pop_without_use();
                        }
                        return Track::Equal(eq);
                    }
                    None => return Track::Boundary(PREV),
                }
            } else {
                match header.child(NEXT) {
                    Some(next) => {
                        found_eq |= ord == Ordering::Equal;
                        node = next;
                    }
                    None if ord == Ordering::Equal => return Track::Equal(node),
                    None => return Track::Boundary(NEXT),
                }
            }
        }
    }

    /// Descend from `root` taking the `next` branch whenever `go_next`
    /// returns `true`, recording the path. Returns which thread of the last
    /// node was reached.
    pub(crate) fn track_neq(
        &self,
        root: NodeId,
        stack: &mut PathStack,
        mut go_next: impl FnMut(&Element) -> bool,
    ) -> IsNext {
        debug_assert!(stack.is_empty());
        let mut node = root;
        loop {
            stack.push(node);
            let side = go_next(&self[node].element);
            match self[node].child(side) {
                Some(child) => node = child,
                None => return side,
            }
        }
    }

    /// Move the path on `stack` from `node` to its predecessor and return
    /// the predecessor.
    fn track_prev(&self, stack: &mut PathStack, node: NodeId) -> Option<NodeId> {
        debug_assert_eq!(stack.peek(), Some(node));
        match self[node].child(PREV) {
            None => {
                let target = self[node].link(PREV);
                while stack.peek() != target {
                    stack.pop()?;
                }
                target
            }
            Some(mut node) => {
                stack.push(node);
                while let Some(next) = self[node].child(NEXT) {
                    node = next;
                    stack.push(node);
                }
                Some(node)
            }
        }
    }

    /// Record the path from `root` to `target`.
    fn track_node(
        &self,
        root: NodeId,
        stack: &mut PathStack,
        callback: &mut impl Callback<Element>,
        target: NodeId,
    ) {
        let key = &self[target].element;
        self.track_neq(root, stack, |existing| {
            callback.cmp_element(key, existing) != Ordering::Less
        });

        // We are past all elements equal to `target`. Walk back through them.
        let mut node = stack.peek();
        while node != Some(target) {
            let Some(current) = node else {
                panic!("the tree doesn't contain {}", target);
            };
            node = self.track_prev(stack, current);
        }
    }

    /// Rotate the subtree rooted at `node` so that its child on the side `up`
    /// becomes the new subtree root, which is returned. The caller has to
    /// update the link in `node`'s parent.
    ///
    /// ```text
    ///        node  (up = PREV)   ret
    ///        /  \                / \
    ///      ret   c     ==>      a  node
    ///      / \                     /  \
    ///     a   b                   b    c
    /// ```
    ///
    /// If `b` is empty, `ret`'s `next` thread (pointing to `node`) becomes a
    /// real link and `node`'s `prev` link becomes a thread to `ret`.
    pub(crate) fn rotate(&mut self, node: NodeId, up: IsNext) -> NodeId {
        let down = !up;
        let ret = self.real_child(node, up);
        if self[ret].is_thread(down) {
            rb_check!(
                self,
                node,
                self[ret].link(down) == Some(node),
                "bogus thread pointer in {}",
                ret
            );
            self[ret].clear_thread(down);
            self[node].set_thread(up);
        } else {
            let inner = self[ret].link(down);
            self[node].set_link(up, inner);
            self[ret].set_link(down, Some(node));
        }
        ret
    }

    /// Point `parent`'s link to `old` at `new` instead.
    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let side = self.side_of(parent, old);
        self[parent].set_link(side, Some(new));
    }

    /// Link `new` as a leaf at the given thread of the node on the top of
    /// `stack` and rebalance.
    pub(crate) fn link_at(
        &mut self,
        tree: &mut Option<NodeId>,
        stack: &mut PathStack,
        new: NodeId,
        side: IsNext,
    ) {
        let Some(parent) = stack.peek() else {
            self.init_root(tree, new);
            return;
        };
        rb_check!(
            self,
            parent,
            self[parent].is_thread(side),
            "cannot link at an interior link"
        );

        let thread = self[parent].link(side);
        let new_node = &mut self[new];
        new_node.set_flags(Flags::RED | Flags::LONE);
        new_node.set_link(side, thread);
        new_node.set_link(!side, Some(parent));

        let parent_node = &mut self[parent];
        parent_node.clear_thread(side);
        parent_node.set_link(side, Some(new));

        *tree = Some(self.rebalance_after_add(new, stack));
    }

    /// Restore the invariants after linking the red leaf `node`, whose
    /// ancestors are on `stack`. Returns the new root. The stack is emptied.
    fn rebalance_after_add(&mut self, mut node: NodeId, stack: &mut PathStack) -> NodeId {
        let Some(mut parent) = stack.pop() else {
            crate::check::fatal(self, node, format_args!("no parent on stack"));
        };
        let mut grandparent = stack.pop();
        let mut top = grandparent.unwrap_or(parent);

        while self.is_red(parent) {
            // The root is black, so a red node has a parent
            let Some(gp) = grandparent else {
                crate::check::fatal(self, parent, format_args!("no parent for red node"));
            };
            let parent_side = self.side_of(gp, parent);
            let uncle = self[gp].child(!parent_side);

            if let Some(uncle) = uncle.filter(|&uncle| self.is_red(uncle)) {
                //        gp(B)                 *gp(R)
                //       /    \                /    \
                //  parent(R) uncle(R)  ==> parent(B) uncle(B)
                //     |                       |
                //  *node(R)                 node(R)
                self[parent].set_color(Color::Black);
                self[uncle].set_color(Color::Black);
                let Some(next_parent) = stack.pop() else {
                    // `gp` is the root. Leave it black.
                    top = gp;
                    break;
                };
                self[gp].set_color(Color::Red);
                node = gp;
                parent = next_parent;
                grandparent = stack.pop();
                top = grandparent.unwrap_or(parent);
                continue;
            }

            if self[parent].child(!parent_side) == Some(node) {
                //        gp(B)                    gp(B)
                //       /    \                   /    \
                //  parent(R) uncle(B)  ==>   node(R)  uncle(B)
                //       \                     /
                //      *node(R)          *parent(R)
                parent = self.rotate(parent, !parent_side);
                self[gp].set_link(parent_side, Some(parent));
            }

            //        gp(B)                   parent(B)
            //       /    \                   /     \
            //  parent(R) uncle(B)  ==>   node(R)   gp(R)
            //     /                                   \
            //  *node(R)                              uncle(B)
            self.rotate(gp, parent_side);
            self[gp].set_color(Color::Red);
            self[parent].set_color(Color::Black);
            top = match stack.pop() {
                Some(ggp) => {
                    self.replace_child(ggp, gp, parent);
                    ggp
                }
                None => parent,
            };
            break;
        }

        let root = stack.root().unwrap_or(top);
        stack.free();
        rb_check!(self, root, !self.is_red(root), "root node not black");
        root
    }

    /// Unlink the node on the top of `stack`. If it has two subtrees, the
    /// payload of its successor is moved into it and the successor is
    /// unlinked instead. Returns the unlinked node, which is detached and
    /// can be released or reused.
    fn unlink_with_move(
        &mut self,
        callback: &mut impl Callback<Element>,
        tree: &mut Option<NodeId>,
        stack: &mut PathStack,
    ) -> NodeId {
        let Some(node) = stack.pop() else {
            panic!("no node to delete on the stack");
        };

        // `child` is what now fills the slot `unlink` was removed from, if
        // it's a real subtree. `side` says which slot of the node on the top
        // of the stack that is.
        let unlink;
        let child;
        let side;

        if self[node].is_thread(PREV) || self[node].is_thread(NEXT) {
            unlink = node;
            let (only_child, slot) = self.simple_unlink(stack, unlink);
            child = only_child;
            side = slot;
        } else {
            // Find the leftmost node of the next subtree
            let mut parent = node;
            stack.push(node);
            let mut cur = self.real_child(node, NEXT);
            while let Some(prev) = self[cur].child(PREV) {
                parent = cur;
                stack.push(cur);
                cur = prev;
            }
            unlink = cur;

            let (dst, src) = self.pair_mut(node, unlink);
            callback.move_element(&mut dst.element, &mut src.element);

            // `unlink`'s `prev` is a thread to `node`
            let pred = self[unlink].link(PREV);
            let unlink_next = self[unlink].link(NEXT);
            let next_child = self[unlink].child(NEXT);

            if let Some(next_child) = next_child {
                rb_check!(
                    self,
                    parent,
                    self[next_child].is_thread(PREV),
                    "expected a prev thread in {}; tree is unbalanced",
                    next_child
                );
                self[next_child].set_link(PREV, pred);
            }

            if parent == node {
                if next_child.is_none() {
                    self[parent].set_thread(NEXT);
                }
                self[parent].set_link(NEXT, unlink_next);
                side = NEXT;
            } else {
                if next_child.is_none() {
                    self[parent].set_thread(PREV);
                    self[parent].set_link(PREV, pred);
                } else {
                    self[parent].set_link(PREV, next_child);
                }
                side = PREV;
            }
            child = next_child;
        }

        if !self.is_red(unlink) {
            *tree = self.rebalance_after_delete(child, side, stack);
        }
        stack.free();

        self[unlink].reset_header();
        unlink
    }

    /// Unlink a node having at most one subtree. Its parent is on the top of
    /// `stack` (if it isn't the root).
    fn simple_unlink(&mut self, stack: &PathStack, unlink: NodeId) -> (Option<NodeId>, IsNext) {
        let parent = stack.peek();
        let side = parent.map_or(PREV, |parent| self.side_of(parent, unlink));

        let child_side = match (self[unlink].child(PREV), self[unlink].child(NEXT)) {
            (None, None) => {
                // A leaf. The parent's link becomes a thread to whatever
                // `unlink` was threaded to on the same side.
                if let Some(parent) = parent {
                    let thread = self[unlink].link(side);
                    self[parent].set_thread(side);
                    self[parent].set_link(side, thread);
                }
                return (None, side);
            }
            (Some(_), None) => PREV,
            (None, Some(_)) => NEXT,
            (Some(_), Some(_)) => unreachable!(),
        };

        // The only child must be a red leaf, or else the tree is
        // unbalanced. Its thread pointing back to `unlink` now has to skip
        // it.
        let child = self.real_child(unlink, child_side);
        rb_check!(
            self,
            unlink,
            self[child].is_thread(!child_side),
            "expected a thread in {}; tree is unbalanced",
            child
        );
        let thread = self[unlink].link(!child_side);
        self[child].set_link(!child_side, thread);

        if let Some(parent) = parent {
            self[parent].set_link(side, Some(child));
        }
        (Some(child), side)
    }

    /// Restore the invariants after a black node was unlinked from the slot
    /// `side` of the node on the top of `stack`. `node` is the subtree now
    /// occupying that slot (`None` for a thread). Returns the new root.
    fn rebalance_after_delete(
        &mut self,
        mut node: Option<NodeId>,
        mut side: IsNext,
        stack: &mut PathStack,
    ) -> Option<NodeId> {
        let Some(mut parent) = stack.pop() else {
            // The unlinked node was the root
            if let Some(node) = node {
                self[node].set_color(Color::Black);
            }
            return node;
        };

        let mut top;
        loop {
            top = parent;

            if let Some(node) = node.filter(|&node| self.is_red(node)) {
                self[node].set_color(Color::Black);
                break;
            }

            // The slot `side` lacks one black node. Since it used to hold at
            // least one, the sibling subtree can't be empty.
            rb_check!(
                self,
                parent,
                self[parent].child(!side).is_some(),
                "the sibling is empty; tree was unbalanced"
            );
            let mut sibling = self.real_child(parent, !side);
            let mut parent_red = self.is_red(parent);

            if self.is_red(sibling) {
                //    parent(B)                  sibling(B)
                //    /    \                     /    \
                // *node   sibling(R)   ==>  parent(R)  (B)
                //          /   \             /   \
                //        (B)   (B)       *node   (B)
                self[parent].set_color(Color::Red);
                self[sibling].set_color(Color::Black);
                self.rotate(parent, !side);
                match stack.peek() {
                    Some(gp) => {
                        self.replace_child(gp, parent, sibling);
                        top = gp;
                    }
                    None => top = sibling,
                }
                stack.push(sibling);

                rb_check!(
                    self,
                    parent,
                    self[parent].child(!side).is_some(),
                    "the sibling is empty; tree was unbalanced"
                );
                sibling = self.real_child(parent, !side);
                parent_red = true;
            }

            let near_red = self.is_red_child(sibling, side);
            let far_red = self.is_red_child(sibling, !side);

            if !near_red && !far_red {
                self[sibling].set_color(Color::Red);
                if parent_red {
                    //    parent(R)                parent(B)
                    //    /    \                   /    \
                    // *node   sibling(B)   ==>  node   sibling(R)
                    self[parent].set_color(Color::Black);
                    break;
                }

                //    parent(B)               *parent
                //    /    \                  /    \
                // *node   sibling(B)   ==>  node   sibling(R)
                node = Some(parent);
                match stack.pop() {
                    Some(grandparent) => {
                        side = self.side_of(grandparent, parent);
                        parent = grandparent;
                        continue;
                    }
                    None => break,
                }
            }

            if !far_red {
                //    parent                    parent
                //    /    \                    /    \
                // *node   sibling(B)   ==>  *node   near(B)
                //          /                           \
                //       near(R)                      sibling(R)
                self[sibling].set_color(Color::Red);
                sibling = self.rotate(sibling, side);
                self[parent].set_link(!side, Some(sibling));
                self[sibling].set_color(Color::Black);
            }

            //    parent(?)                  sibling(?)
            //    /    \                     /    \
            // *node   sibling(B)   ==>  parent(B)  far(B)
            //           \                /
            //           far(R)        node
            self.rotate(parent, !side);
            match stack.pop() {
                Some(gp) => {
                    self.replace_child(gp, parent, sibling);
                    top = gp;
                    if self.is_red(parent) {
                        self[sibling].set_color(Color::Red);
                        self[parent].set_color(Color::Black);
                    }
                }
                None => {
                    // `parent` was the root, which is always black
                    debug_assert!(!self.is_red(parent));
                    top = sibling;
                }
            }
            let far = self.real_child(sibling, !side);
            self[far].set_color(Color::Black);
            break;
        }

        let root = stack.root().unwrap_or(top);
        rb_check!(self, root, !self.is_red(root), "root node not black");
        Some(root)
    }
}

#[cfg(test)]
mod tests;
