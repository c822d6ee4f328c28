//! Whole-tree consistency checking.
use alloc::string::String;
use core::fmt;

use crate::{
    node::{NodeId, NEXT, PREV},
    pool::Pool,
    traverse::{Event, Walk},
    utils::panicking::abort_on_unwind,
};

/// An invariant violation found by [`Pool::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("root {0} is red")]
    RedRoot(NodeId),
    #[error("red node {parent} has a red child {child}")]
    RedChild { parent: NodeId, child: NodeId },
    #[error(
        "a path ending at {node} crosses {found} black nodes, \
        but other paths cross {expected}"
    )]
    Unbalanced {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    #[error("the {side} thread of {node} points to {found:?} instead of {expected:?}")]
    BadThread {
        node: NodeId,
        side: &'static str,
        found: Option<NodeId>,
        expected: Option<NodeId>,
    },
    #[error("{0} is reachable through more than one path")]
    Cycle(NodeId),
    #[error("{0} refers to a released slot")]
    Dangling(NodeId),
}

impl<Element> Pool<Element> {
    /// Verify the red-black invariants and the threads of a tree.
    ///
    /// The walk is iterative and never panics, even on a corrupted tree. It
    /// doesn't look at elements, so the order of elements isn't verified.
    pub fn check(&self, tree: Option<NodeId>) -> Result<(), CheckError> {
        let Some(root) = tree else { return Ok(()) };
        if !self.contains(root) {
            return Err(CheckError::Dangling(root));
        }
        if self.is_red(root) {
            return Err(CheckError::RedRoot(root));
        }

        let mut visited = vec![false; self.slot_bound()];
        let mut black_height: Option<usize> = None;
        let mut blacks = 0usize;
        let mut last: Option<NodeId> = None;
        let mut pending_next: Option<NodeId> = None;

        let mut walk = Walk::new(tree);
        while let Some(event) = walk.step(self) {
            match event {
                Event::Enter(node) => {
                    let Some(header) = self.get(node) else {
                        return Err(CheckError::Dangling(node));
                    };
                    if core::mem::replace(&mut visited[node.index()], true) {
                        return Err(CheckError::Cycle(node));
                    }
                    if !header.is_red() {
                        blacks += 1;
                    }
                }
                Event::PrevSubtree(node) | Event::NextSubtree(node) => {
                    let side = matches!(event, Event::NextSubtree(_));
                    let child = self.real_child(node, side);
                    if !self.contains(child) {
                        return Err(CheckError::Dangling(child));
                    }
                    if self.is_red(node) && self.is_red(child) {
                        return Err(CheckError::RedChild {
                            parent: node,
                            child,
                        });
                    }
                }
                Event::PrevLeaf(node) | Event::NextLeaf(node) => {
                    match black_height {
                        None => black_height = Some(blacks),
                        Some(expected) if expected != blacks => {
                            return Err(CheckError::Unbalanced {
                                node,
                                expected,
                                found: blacks,
                            });
                        }
                        Some(_) => {}
                    }

                    if matches!(event, Event::PrevLeaf(_)) {
                        let found = self[node].link(PREV);
                        if found != last {
                            return Err(CheckError::BadThread {
                                node,
                                side: "prev",
                                found,
                                expected: last,
                            });
                        }
                    } else {
                        pending_next = Some(node);
                    }
                }
                Event::Between(node) => {
                    if let Some(pending) = pending_next.take() {
                        let found = self[pending].link(NEXT);
                        if found != Some(node) {
                            return Err(CheckError::BadThread {
                                node: pending,
                                side: "next",
                                found,
                                expected: Some(node),
                            });
                        }
                    }
                    last = Some(node);
                }
                Event::Leave(node) => {
                    if !self.is_red(node) {
                        blacks -= 1;
                    }
                }
            }
        }

        if let Some(pending) = pending_next {
            let found = self[pending].link(NEXT);
            if found.is_some() {
                return Err(CheckError::BadThread {
                    node: pending,
                    side: "next",
                    found,
                    expected: None,
                });
            }
        }

        Ok(())
    }

    /// Like [`Self::check`], but panics with a dump of the tree on failure.
    #[track_caller]
    pub fn assert_valid(&self, tree: Option<NodeId>) {
        if let Err(e) = self.check(tree) {
            let mut dump = String::new();
            let _ = self.write_tree(tree, &mut dump, None, self.len());
            panic!("{}\n{}", e, dump);
        }
    }
}

/// Log the subtree rooted at `node` and abort. Used by the debug-only local
/// checks, which detect corruption in the middle of an operation.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fatal<Element>(pool: &Pool<Element>, node: NodeId, msg: fmt::Arguments<'_>) -> ! {
    let mut dump = String::new();
    let _ = pool.write_tree(Some(node), &mut dump, None, pool.len());
    log::error!("{} (at {})\n{}", msg, node, dump);
    abort_on_unwind(|| -> ! { panic!("corrupted red-black tree: {} (at {})", msg, node) })
}
