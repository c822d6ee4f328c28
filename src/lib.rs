#![doc = include_str!("../README.md")]
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

#[macro_use]
extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[macro_use]
mod macros;

pub mod build;
pub mod check;
pub mod find;
pub mod merge;
pub mod node;
pub mod pool;
pub mod rbtree;
pub mod stack;
pub mod traverse;
mod utils {
    pub mod panicking;
}

pub use self::{
    build::{ListIter, NodeList},
    check::CheckError,
    find::{Find, Iter},
    merge::{MergeOp, MergePolicy},
    node::{Color, IsNext, Node, NodeId, NEXT, PREV},
    pool::Pool,
    rbtree::{Callback, DefaultCallback},
    stack::PathStack,
    traverse::{Event, Visitor, Walk},
};
