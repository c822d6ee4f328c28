//! Node header: the color and thread bits plus the two links every node
//! carries.
//!
//! A link is either a real child or a *thread*. A thread is used wherever the
//! link would otherwise be nil, and it points to the in-order predecessor
//! (`prev`) or successor (`next`) of the node. More specifically, a `next`
//! thread points to the closest ancestor whose `prev` subtree contains the
//! node, and vice versa:
//!
//! ```text
//!          p <.                                  .> p
//!         /    .                                .    \
//!        a      .                              .      a
//!         \      .                            .      /
//!          b      . <- next          prev -> .      b
//!         / \     .    thread         thread  .    / \
//!           ...   .                            .  ...
//!             \  .                              .  /
//!              c.                                .c
//! ```
//!
//! The first node's `prev` thread and the last node's `next` thread are
//! empty.
use bitflags::bitflags;
use core::fmt;

/// Selects one of the two links of a node. `false` is `prev`, `true` is
/// `next`, so the mirror image of a side is simply `!side`.
pub type IsNext = bool;

/// The link towards smaller elements.
pub const PREV: IsNext = false;
/// The link towards bigger elements.
pub const NEXT: IsNext = true;

/// A handle to a node slot in a [`Pool`](crate::Pool).
///
/// Handles stay valid until the node is released. Using a handle after that
/// is a programming error and will panic (or, if the slot was reused, refer
/// to an unrelated node).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The slot index inside the pool.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
}

bitflags! {
    /// The flag bits of a node header.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub(crate) struct Flags: u8 {
        const RED         = 1 << 0;
        const THREAD_PREV = 1 << 1;
        const THREAD_NEXT = 1 << 2;
    }
}

impl Flags {
    /// The flags a freshly initialized root has: black, both links threaded.
    pub(crate) const LONE: Self = Self::THREAD_PREV.union(Self::THREAD_NEXT);

    #[inline]
    pub(crate) const fn thread(side: IsNext) -> Self {
        if side {
            Self::THREAD_NEXT
        } else {
            Self::THREAD_PREV
        }
    }
}

/// A node.
///
/// The header (`links` and `flags`) is only manipulated by the tree
/// operations. The payload is the public [`Node::element`].
#[derive(Debug)]
pub struct Node<Element> {
    links: [Option<NodeId>; 2],
    flags: Flags,
    pub element: Element,
}

impl<Element> Node<Element> {
    /// Construct a detached node. It's colored black and both of its links
    /// are empty threads, which is exactly the shape of a one-node tree.
    #[inline]
    pub const fn new(element: Element) -> Self {
        Self {
            links: [None, None],
            flags: Flags::LONE,
            element,
        }
    }

    #[inline]
    pub fn color(&self) -> Color {
        if self.flags.contains(Flags::RED) {
            Color::Red
        } else {
            Color::Black
        }
    }

    #[inline]
    pub fn set_color(&mut self, color: Color) {
        self.flags.set(Flags::RED, color == Color::Red);
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.flags.contains(Flags::RED)
    }

    /// Whether the given link is a thread (as opposed to a real subtree).
    #[inline]
    pub fn is_thread(&self, side: IsNext) -> bool {
        self.flags.contains(Flags::thread(side))
    }

    #[inline]
    pub fn set_thread(&mut self, side: IsNext) {
        self.flags.insert(Flags::thread(side));
    }

    #[inline]
    pub fn clear_thread(&mut self, side: IsNext) {
        self.flags.remove(Flags::thread(side));
    }

    /// The raw link value, regardless of whether it's a thread.
    #[inline]
    pub fn link(&self, side: IsNext) -> Option<NodeId> {
        self.links[side as usize]
    }

    /// The child on the given side, or `None` if that link is a thread.
    #[inline]
    pub fn child(&self, side: IsNext) -> Option<NodeId> {
        if self.is_thread(side) {
            None
        } else {
            self.links[side as usize]
        }
    }

    #[inline]
    pub(crate) fn set_link(&mut self, side: IsNext, link: Option<NodeId>) {
        self.links[side as usize] = link;
    }

    #[inline]
    pub(crate) fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub(crate) fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    /// Reset the header to the one-node-tree shape.
    #[inline]
    pub(crate) fn reset_header(&mut self) {
        self.links = [None, None];
        self.flags = Flags::LONE;
    }
}
