//! The path stack: records the ancestors of the node an operation is
//! currently looking at, since nodes don't know their parents.
//!
//! The stack is a chain of fixed-size slices. The first slice lives inline
//! in [`PathStack`] itself, so paths through trees of moderate size never
//! touch the allocator. Overflow slices are boxed and released again as
//! soon as they become empty.
use alloc::boxed::Box;

use crate::node::NodeId;

/// The number of entries in one slice of a [`PathStack`].
pub const SLICE_LEN: usize = 20;

const FILLER: NodeId = NodeId(usize::MAX);

struct Slice {
    up: Option<Box<Slice>>,
    entries: [NodeId; SLICE_LEN],
}

/// A stack of node handles, ordered from the root (bottom) towards the
/// current node (top).
pub struct PathStack {
    base: [NodeId; SLICE_LEN],
    /// Overflow slices, topmost first.
    spill: Option<Box<Slice>>,
    /// The number of spilled slices.
    depth: usize,
    /// The number of entries used in the topmost slice. Only the inline
    /// slice can be empty.
    ssp: usize,
}

impl Default for PathStack {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PathStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PathStack {
    #[inline]
    pub const fn new() -> Self {
        Self {
            base: [FILLER; SLICE_LEN],
            spill: None,
            depth: 0,
            ssp: 0,
        }
    }

    #[inline]
    fn top_slice(&self) -> &[NodeId; SLICE_LEN] {
        match &self.spill {
            Some(slice) => &slice.entries,
            None => &self.base,
        }
    }

    #[inline]
    fn top_slice_mut(&mut self) -> &mut [NodeId; SLICE_LEN] {
        match &mut self.spill {
            Some(slice) => &mut slice.entries,
            None => &mut self.base,
        }
    }

    pub fn push(&mut self, node: NodeId) {
        if self.ssp == SLICE_LEN {
            self.spill = Some(Box::new(Slice {
                up: self.spill.take(),
                entries: [FILLER; SLICE_LEN],
            }));
            self.depth += 1;
            self.ssp = 0;
            log::trace!("path stack spilled into slice {}", self.depth);
        }
        let ssp = self.ssp;
        self.top_slice_mut()[ssp] = node;
        self.ssp += 1;
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        if self.ssp == 0 {
            debug_assert!(self.spill.is_none());
            return None;
        }

        self.ssp -= 1;
        let node = self.top_slice()[self.ssp];

        if self.ssp == 0 {
            if let Some(slice) = self.spill.take() {
                self.spill = slice.up;
                self.depth -= 1;
                self.ssp = SLICE_LEN;
            }
        }

        Some(node)
    }

    /// Pop the top entry, which must exist.
    #[inline]
    #[track_caller]
    pub fn pop_without_use(&mut self) {
        let popped = self.pop();
        debug_assert!(popped.is_some(), "popped an empty stack");
    }

    #[inline]
    pub fn peek(&self) -> Option<NodeId> {
        (self.ssp > 0).then(|| self.top_slice()[self.ssp - 1])
    }

    /// Replace the top entry.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty.
    #[inline]
    #[track_caller]
    pub fn poke(&mut self, node: NodeId) {
        assert_ne!(self.ssp, 0, "poked an empty stack");
        let ssp = self.ssp;
        self.top_slice_mut()[ssp - 1] = node;
    }

    /// The bottom entry, i.e., the first node pushed.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        (!self.is_empty()).then(|| self.base[0])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.depth * SLICE_LEN + self.ssp
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ssp == 0
    }

    /// Discard every entry and release the overflow slices.
    pub fn free(&mut self) {
        let mut spill = self.spill.take();
        while let Some(slice) = spill {
            spill = slice.up;
        }
        self.depth = 0;
        self.ssp = 0;
    }

    /// Iterate over the entries from the top to the bottom.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        let ssp = self.ssp;
        core::iter::successors(self.spill.as_deref(), |slice| slice.up.as_deref())
            .map(|slice| &slice.entries)
            .chain(core::iter::once(&self.base))
            .enumerate()
            .flat_map(move |(i, entries)| {
                let len = if i == 0 { ssp } else { SLICE_LEN };
                entries[..len].iter().rev().copied()
            })
    }
}

impl Drop for PathStack {
    #[inline]
    fn drop(&mut self) {
        // Unlink the slices one by one so that a long chain doesn't recurse
        // in the compiler-generated drop glue
        self.free();
    }
}
