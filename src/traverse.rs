//! Depth-first traversal without recursion, and the whole-tree operations
//! built on it: copying, freeing and dumping.
//!
//! Every walk has the same shape. For each node:
//!
//! ```text
//! enter
//! prev_leaf | prev_subtree (then the prev subtree is walked)
//! between
//! next_leaf | next_subtree (then the next subtree is walked)
//! leave
//! ```
//!
//! `between` therefore fires in sorted order.
use core::{fmt, ops::ControlFlow};

use crate::{
    node::{IsNext, NodeId, NEXT, PREV},
    pool::Pool,
    rbtree::Callback,
    stack::PathStack,
    utils::panicking::abort_on_unwind,
};

/// One step of a [`Walk`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    Enter(NodeId),
    PrevLeaf(NodeId),
    PrevSubtree(NodeId),
    Between(NodeId),
    NextLeaf(NodeId),
    NextSubtree(NodeId),
    Leave(NodeId),
}

impl Event {
    #[inline]
    pub fn node(self) -> NodeId {
        match self {
            Self::Enter(n)
            | Self::PrevLeaf(n)
            | Self::PrevSubtree(n)
            | Self::Between(n)
            | Self::NextLeaf(n)
            | Self::NextSubtree(n)
            | Self::Leave(n) => n,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum State {
    Enter(NodeId),
    AfterEnter(NodeId),
    Between(NodeId),
    AfterBetween(NodeId),
    Leave(NodeId),
    AfterLeave(NodeId),
    Done,
}

/// The traversal state machine. It holds no borrow of the pool between
/// steps, so the consumer of an event may modify the pool (e.g., release the
/// node that was just left) as long as the links the walk still needs stay
/// intact.
///
/// A node's links are read on the step *after* the one reporting
/// [`Event::Enter`] (for `prev`) or [`Event::Between`] (for `next`). After
/// [`Event::Leave`] only the ancestors' links are read.
#[derive(Debug)]
pub struct Walk {
    stack: PathStack,
    state: State,
}

impl Walk {
    pub fn new(tree: Option<NodeId>) -> Self {
        Self {
            stack: PathStack::new(),
            state: tree.map_or(State::Done, State::Enter),
        }
    }

    /// The number of ancestors of the node of the most recent event.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn step<Element>(&mut self, pool: &Pool<Element>) -> Option<Event> {
        loop {
            match self.state {
                State::Enter(node) => {
                    self.state = State::AfterEnter(node);
                    return Some(Event::Enter(node));
                }
                State::AfterEnter(node) => {
                    return Some(if let Some(child) = pool[node].child(PREV) {
                        self.stack.push(node);
                        self.state = State::Enter(child);
                        Event::PrevSubtree(node)
                    } else {
                        self.state = State::Between(node);
                        Event::PrevLeaf(node)
                    });
                }
                State::Between(node) => {
                    self.state = State::AfterBetween(node);
                    return Some(Event::Between(node));
                }
                State::AfterBetween(node) => {
                    return Some(if let Some(child) = pool[node].child(NEXT) {
                        self.stack.push(node);
                        self.state = State::Enter(child);
                        Event::NextSubtree(node)
                    } else {
                        self.state = State::Leave(node);
                        Event::NextLeaf(node)
                    });
                }
                State::Leave(node) => {
                    self.state = State::AfterLeave(node);
                    return Some(Event::Leave(node));
                }
                State::AfterLeave(last) => {
                    self.state = match self.stack.pop() {
                        None => State::Done,
                        Some(parent) if pool[parent].child(PREV) == Some(last) => {
                            State::Between(parent)
                        }
                        Some(parent) => State::Leave(parent),
                    };
                }
                State::Done => return None,
            }
        }
    }
}

/// Hooks for [`Pool::traverse`]. Every hook may stop the walk early by
/// returning [`ControlFlow::Break`].
#[allow(unused_variables)]
pub trait Visitor<Element> {
    type Break;

    #[inline]
    fn enter(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    /// `node`'s `prev` link is a thread.
    #[inline]
    fn prev_leaf(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    /// `node`'s `prev` link is a subtree, which is walked next.
    #[inline]
    fn prev_subtree(
        &mut self,
        pool: &mut Pool<Element>,
        node: NodeId,
    ) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    /// Called in sorted order.
    #[inline]
    fn between(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    #[inline]
    fn next_leaf(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    #[inline]
    fn next_subtree(
        &mut self,
        pool: &mut Pool<Element>,
        node: NodeId,
    ) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
    /// The last hook called for `node`. The visitor may release `node` here.
    #[inline]
    fn leave(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        ControlFlow::Continue(())
    }
}

impl<Element> Pool<Element> {
    /// Walk the tree, calling the visitor's hooks.
    pub fn traverse<V: Visitor<Element> + ?Sized>(
        &mut self,
        tree: Option<NodeId>,
        visitor: &mut V,
    ) -> ControlFlow<V::Break> {
        let mut walk = Walk::new(tree);
        while let Some(event) = walk.step(self) {
            match event {
                Event::Enter(node) => visitor.enter(self, node)?,
                Event::PrevLeaf(node) => visitor.prev_leaf(self, node)?,
                Event::PrevSubtree(node) => visitor.prev_subtree(self, node)?,
                Event::Between(node) => visitor.between(self, node)?,
                Event::NextLeaf(node) => visitor.next_leaf(self, node)?,
                Event::NextSubtree(node) => visitor.next_subtree(self, node)?,
                Event::Leave(node) => visitor.leave(self, node)?,
            }
        }
        ControlFlow::Continue(())
    }

    /// Create a structurally identical copy of a tree in the same pool and
    /// return its root. The payloads are produced by
    /// [`Callback::copy_element`].
    pub fn copy(
        &mut self,
        mut callback: impl Callback<Element>,
        tree: Option<NodeId>,
    ) -> Option<NodeId> {
        let source = tree?;
        let copy = self.alloc_copy(&mut callback, source);

        let mut copier = Copier {
            callback,
            targets: PathStack::new(),
            target: copy,
            prev_target: None,
            pending_next: None,
            count: 1,
        };
        if let ControlFlow::Break(never) = self.traverse(tree, &mut copier) {
            match never {}
        }

        if let Some(pending) = copier.pending_next {
            self[pending].set_link(NEXT, None);
        }
        log::trace!("copied a tree of {} nodes", copier.count);

        Some(copy)
    }

    fn alloc_copy(&mut self, callback: &mut impl Callback<Element>, source: NodeId) -> NodeId {
        let element = callback.copy_element(&self[source].element);
        let flags = self[source].flags();
        let new = self.alloc(element);
        self[new].set_flags(flags);
        new
    }

    /// Release every node of a tree, handing each element to
    /// [`Callback::free_element`]. `*tree` is set to `None`.
    ///
    /// `free_element` must not panic; if it does, the process is aborted.
    pub fn free(&mut self, callback: impl Callback<Element>, tree: &mut Option<NodeId>) {
        let mut freer = Freer { callback, count: 0 };
        if let ControlFlow::Break(never) = self.traverse(tree.take(), &mut freer) {
            match never {}
        }
        log::trace!("freed a tree of {} nodes", freer.count);
    }

    /// Write an indented dump of the tree structure. Each line shows a node
    /// with its color, its links and its element.
    pub fn dump(&self, tree: Option<NodeId>, out: &mut impl fmt::Write) -> fmt::Result
    where
        Element: fmt::Debug,
    {
        self.write_tree(tree, out, Some(<Element as fmt::Debug>::fmt), usize::MAX)
    }

    /// Dump at most `limit` nodes, optionally printing the elements too.
    pub(crate) fn write_tree(
        &self,
        tree: Option<NodeId>,
        out: &mut impl fmt::Write,
        fmt_element: Option<fn(&Element, &mut fmt::Formatter<'_>) -> fmt::Result>,
        limit: usize,
    ) -> fmt::Result {
        if tree.is_none() {
            return writeln!(out, "nil");
        }

        let mut walk = Walk::new(tree);
        let mut count = 0;
        while let Some(event) = walk.step(self) {
            let Event::Enter(node) = event else { continue };
            if count == limit {
                return writeln!(out, "...");
            }
            count += 1;

            let Some(header) = self.get(node) else {
                writeln!(out, "{:indent$}{} <released>", "", node, indent = walk.depth() * 2)?;
                return Ok(());
            };
            write!(
                out,
                "{:indent$}{} {:?} prev={}{} next={}{}",
                "",
                node,
                header.color(),
                LinkDisplay(header.link(PREV)),
                if header.is_thread(PREV) { "~" } else { "" },
                LinkDisplay(header.link(NEXT)),
                if header.is_thread(NEXT) { "~" } else { "" },
                indent = walk.depth() * 2,
            )?;
            if let Some(fmt_element) = fmt_element {
                write!(out, " {:?}", ElementDisplay(&header.element, fmt_element))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

struct LinkDisplay(Option<NodeId>);

impl fmt::Display for LinkDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(node) => fmt::Display::fmt(&node, f),
            None => f.write_str("nil"),
        }
    }
}

struct ElementDisplay<'a, Element>(
    &'a Element,
    fn(&Element, &mut fmt::Formatter<'_>) -> fmt::Result,
);

impl<Element> fmt::Debug for ElementDisplay<'_, Element> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.1)(self.0, f)
    }
}

/// Builds the copy in lockstep with the walk over the source. `target` is
/// the copy of the node the walk is at; `targets` holds the copies of its
/// ancestors.
struct Copier<C> {
    callback: C,
    targets: PathStack,
    target: NodeId,
    /// The copy of the last node passed in order, i.e., where a `prev`
    /// thread has to point.
    prev_target: Option<NodeId>,
    /// A copy whose `next` thread still waits for its successor.
    pending_next: Option<NodeId>,
    count: usize,
}

impl<C> Copier<C> {
    fn descend<Element>(&mut self, pool: &mut Pool<Element>, source: NodeId, side: IsNext)
    where
        C: Callback<Element>,
    {
        let source_child = pool.real_child(source, side);
        let new = pool.alloc_copy(&mut self.callback, source_child);
        pool[self.target].set_link(side, Some(new));
        self.targets.push(self.target);
        self.target = new;
        self.count += 1;
    }
}

impl<Element, C: Callback<Element>> Visitor<Element> for Copier<C> {
    type Break = core::convert::Infallible;

    fn prev_leaf(&mut self, pool: &mut Pool<Element>, _: NodeId) -> ControlFlow<Self::Break> {
        pool[self.target].set_link(PREV, self.prev_target);
        ControlFlow::Continue(())
    }

    fn prev_subtree(
        &mut self,
        pool: &mut Pool<Element>,
        node: NodeId,
    ) -> ControlFlow<Self::Break> {
        self.descend(pool, node, PREV);
        ControlFlow::Continue(())
    }

    fn between(&mut self, pool: &mut Pool<Element>, _: NodeId) -> ControlFlow<Self::Break> {
        self.prev_target = Some(self.target);
        if let Some(pending) = self.pending_next.take() {
            pool[pending].set_link(NEXT, Some(self.target));
        }
        ControlFlow::Continue(())
    }

    fn next_leaf(&mut self, _: &mut Pool<Element>, _: NodeId) -> ControlFlow<Self::Break> {
        self.pending_next = Some(self.target);
        ControlFlow::Continue(())
    }

    fn next_subtree(
        &mut self,
        pool: &mut Pool<Element>,
        node: NodeId,
    ) -> ControlFlow<Self::Break> {
        self.descend(pool, node, NEXT);
        ControlFlow::Continue(())
    }

    fn leave(&mut self, _: &mut Pool<Element>, _: NodeId) -> ControlFlow<Self::Break> {
        if let Some(parent) = self.targets.pop() {
            self.target = parent;
        }
        ControlFlow::Continue(())
    }
}

struct Freer<C> {
    callback: C,
    count: usize,
}

impl<Element, C: Callback<Element>> Visitor<Element> for Freer<C> {
    type Break = core::convert::Infallible;

    fn leave(&mut self, pool: &mut Pool<Element>, node: NodeId) -> ControlFlow<Self::Break> {
        let element = pool.release(node);
        abort_on_unwind(|| self.callback.free_element(element));
        self.count += 1;
        ControlFlow::Continue(())
    }
}
