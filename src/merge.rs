//! Linear-time merging of two trees, driven by a set-operation policy.
use bitflags::bitflags;
use core::cmp::Ordering;

use crate::{
    build::NodeList,
    node::{NodeId, NEXT},
    pool::Pool,
    rbtree::Callback,
    utils::panicking::abort_on_unwind_if,
};

bitflags! {
    /// What to do with the current element(s) of a merge step.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct MergeOp: u8 {
        /// Emit A's element into the result and advance A.
        const KEEP_A = 1 << 0;
        /// Advance A without emitting.
        const DROP_A = 1 << 1;
        /// Emit B's element into the result and advance B.
        const KEEP_B = 1 << 2;
        /// Advance B without emitting.
        const DROP_B = 1 << 3;
    }
}

/// How to combine two trees. Each field selects the [`MergeOp`] for one of
/// the three possible outcomes of comparing the current elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MergePolicy {
    /// A's element has no equal counterpart in B.
    pub a_only: MergeOp,
    /// The elements are equal. With both `KEEP_A` and `KEEP_B`, B's element
    /// is emitted and A's is compared again with the next one from B.
    pub both: MergeOp,
    /// B's element has no equal counterpart in A.
    pub b_only: MergeOp,
    /// Consume A: its emitted nodes are moved into the result instead of
    /// copied, its dropped nodes are released, and its root is reset.
    pub destroy_a: bool,
    /// Like `destroy_a`, for B.
    pub destroy_b: bool,
}

impl MergePolicy {
    const fn new(a_only: MergeOp, both: MergeOp, b_only: MergeOp) -> Self {
        Self {
            a_only,
            both,
            b_only,
            destroy_a: false,
            destroy_b: false,
        }
    }

    /// A ∩ B, taking equal elements from B.
    pub const INTERSECTION: Self = Self::new(
        MergeOp::DROP_A,
        MergeOp::DROP_A.union(MergeOp::KEEP_B),
        MergeOp::DROP_B,
    );
    /// A ∩ B, taking equal elements from A.
    pub const INTERSECTION_LEFT: Self = Self::new(
        MergeOp::DROP_A,
        MergeOp::DROP_B.union(MergeOp::KEEP_A),
        MergeOp::DROP_B,
    );
    /// A ∪ B, taking equal elements from B.
    pub const UNION: Self = Self::new(
        MergeOp::KEEP_A,
        MergeOp::DROP_A.union(MergeOp::KEEP_B),
        MergeOp::KEEP_B,
    );
    /// A ∪ B, taking equal elements from A.
    pub const UNION_LEFT: Self = Self::new(
        MergeOp::KEEP_A,
        MergeOp::DROP_B.union(MergeOp::KEEP_A),
        MergeOp::KEEP_B,
    );
    /// Elements present in exactly one of the trees.
    pub const SYMMETRIC_DIFFERENCE: Self = Self::new(
        MergeOp::KEEP_A,
        MergeOp::DROP_A.union(MergeOp::DROP_B),
        MergeOp::KEEP_B,
    );
    /// A ∖ B.
    pub const DIFFERENCE: Self = Self::new(MergeOp::KEEP_A, MergeOp::DROP_A, MergeOp::DROP_B);
    /// Everything from both trees. Equal elements from A precede B's.
    pub const ADD: Self = Self::new(
        MergeOp::KEEP_A,
        MergeOp::KEEP_A.union(MergeOp::KEEP_B),
        MergeOp::KEEP_B,
    );

    /// Consume A.
    #[inline]
    pub const fn destroy_a(mut self) -> Self {
        self.destroy_a = true;
        self
    }

    /// Consume B.
    #[inline]
    pub const fn destroy_b(mut self) -> Self {
        self.destroy_b = true;
        self
    }

    /// Check that every step of a merge with this policy makes progress and
    /// that `a_only` and `b_only` only touch their own side.
    pub const fn is_valid(&self) -> bool {
        let a = MergeOp::KEEP_A.union(MergeOp::DROP_A);
        let b = MergeOp::KEEP_B.union(MergeOp::DROP_B);
        self.a_only.intersects(a)
            && !self.a_only.intersects(b)
            && self.b_only.intersects(b)
            && !self.b_only.intersects(a)
            && !self.both.is_empty()
    }
}

/// One of the two inputs of a merge.
struct Side {
    /// The current element, walking from the last one down.
    cur: Option<NodeId>,
    destroy: bool,
}

impl<Element> Pool<Element> {
    /// Merge two trees into a list in `O(|a| + |b|)` time. The result is in
    /// sorted order and can be turned into a tree with [`Pool::build_tree`].
    ///
    /// Both trees are walked backwards. A side marked destructive in
    /// `policy` is consumed: afterwards its root is `None` and each of its
    /// nodes is either in the result or released through
    /// [`Callback::free_element`]. The other side is left intact; the
    /// elements it contributes are duplicated with
    /// [`Callback::copy_element`].
    ///
    /// While a destructive side is being consumed, a panic in any callback
    /// aborts the process.
    pub fn merge(
        &mut self,
        mut callback: impl Callback<Element>,
        a: &mut Option<NodeId>,
        b: &mut Option<NodeId>,
        policy: MergePolicy,
    ) -> NodeList {
        assert!(policy.is_valid(), "invalid merge policy: {:?}", policy);
        debug_assert!(a.is_none() || *a != *b, "cannot merge a tree with itself");

        let guarded = policy.destroy_a || policy.destroy_b;
        let mut a_side = Side {
            cur: self.last(*a),
            destroy: policy.destroy_a,
        };
        let mut b_side = Side {
            cur: self.last(*b),
            destroy: policy.destroy_b,
        };
        if policy.destroy_a {
            *a = None;
        }
        if policy.destroy_b {
            *b = None;
        }

        let mut list = NodeList::new();

        loop {
            let op = match (a_side.cur, b_side.cur) {
                (None, None) => break,
                (Some(_), None) => policy.a_only & MergeOp::KEEP_A | MergeOp::DROP_A,
                (None, Some(_)) => policy.b_only & MergeOp::KEEP_B | MergeOp::DROP_B,
                (Some(x), Some(y)) => {
                    let ord = abort_on_unwind_if(guarded, || {
                        callback.cmp_element(&self[x].element, &self[y].element)
                    });
                    // Walking backwards, the bigger element is the one
                    // without a counterpart
                    match ord {
                        Ordering::Greater => policy.a_only,
                        Ordering::Less => policy.b_only,
                        Ordering::Equal => policy.both,
                    }
                }
            };

            if b_side.cur.is_some() {
                if op.contains(MergeOp::KEEP_B) {
                    self.merge_emit(&mut callback, &mut b_side, &mut list, guarded);
                } else if op.contains(MergeOp::DROP_B) {
                    self.merge_drop(&mut callback, &mut b_side, guarded);
                }
            }

            if a_side.cur.is_some() {
                if op.contains(MergeOp::KEEP_A) {
                    if !op.contains(MergeOp::KEEP_B) {
                        self.merge_emit(&mut callback, &mut a_side, &mut list, guarded);
                    }
                } else if op.contains(MergeOp::DROP_A) {
                    self.merge_drop(&mut callback, &mut a_side, guarded);
                }
            }
        }

        log::trace!("merged into a list of {} nodes", list.len);
        list
    }

    fn merge_emit(
        &mut self,
        callback: &mut impl Callback<Element>,
        side: &mut Side,
        list: &mut NodeList,
        guarded: bool,
    ) {
        let Some(node) = side.cur else { return };
        side.cur = self.prev(node);

        let emitted = if side.destroy {
            node
        } else {
            let element =
                abort_on_unwind_if(guarded, || callback.copy_element(&self[node].element));
            self.alloc(element)
        };
        self[emitted].set_thread(NEXT);
        self[emitted].set_link(NEXT, list.head);
        list.head = Some(emitted);
        list.len += 1;
    }

    fn merge_drop(&mut self, callback: &mut impl Callback<Element>, side: &mut Side, guarded: bool) {
        let Some(node) = side.cur else { return };
        side.cur = self.prev(node);

        if side.destroy {
            let element = self.release(node);
            abort_on_unwind_if(guarded, || callback.free_element(element));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbtree::DefaultCallback;
    use quickcheck_macros::quickcheck;
    use std::{collections::BTreeSet, prelude::v1::*};

    /// Ordered by `.0` only; `.1` tells the elements apart.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Tagged(u32, char);

    struct TaggedCallback;

    impl Callback<Tagged> for TaggedCallback {
        fn cmp_element(&mut self, e1: &Tagged, e2: &Tagged) -> Ordering {
            e1.0.cmp(&e2.0)
        }
        fn copy_element(&mut self, element: &Tagged) -> Tagged {
            *element
        }
    }

    fn build(pool: &mut Pool<Tagged>, tag: char, keys: &[u32]) -> Option<NodeId> {
        let mut tree = None;
        for &key in keys {
            let node = pool.alloc(Tagged(key, tag));
            pool.add(TaggedCallback, &mut tree, node);
        }
        tree
    }

    fn contents(pool: &Pool<Tagged>, tree: Option<NodeId>) -> Vec<Tagged> {
        pool.iter(tree).map(|(_, &e)| e).collect()
    }

    const A: &[u32] = &[1, 4, 5, 5, 7, 15, 15];
    const B: &[u32] = &[1, 1, 4, 5, 7];

    fn merged(policy: MergePolicy) -> Vec<(u32, char)> {
        let mut pool = Pool::new();
        let mut a = build(&mut pool, 'a', A);
        let mut b = build(&mut pool, 'b', B);
        let before_a = contents(&pool, a);
        let before_b = contents(&pool, b);

        let list = pool.merge(TaggedCallback, &mut a, &mut b, policy);
        let result: Vec<_> = pool
            .list_iter(&list)
            .map(|(_, e)| (e.0, e.1))
            .collect();
        assert_eq!(result.len(), list.len);

        // The inputs are untouched
        assert_eq!(contents(&pool, a), before_a);
        assert_eq!(contents(&pool, b), before_b);
        pool.assert_valid(a);
        pool.assert_valid(b);

        result
    }

    fn keys(result: &[(u32, char)]) -> Vec<u32> {
        result.iter().map(|e| e.0).collect()
    }

    fn tree_keys(pool: &Pool<Tagged>, tree: Option<NodeId>) -> Vec<u32> {
        pool.iter(tree).map(|(_, e)| e.0).collect()
    }

    #[test]
    fn add_keeps_everything() {
        let result = merged(MergePolicy::ADD);
        assert_eq!(
            result,
            vec![
                (1, 'a'),
                (1, 'b'),
                (1, 'b'),
                (4, 'a'),
                (4, 'b'),
                (5, 'a'),
                (5, 'a'),
                (5, 'b'),
                (7, 'a'),
                (7, 'b'),
                (15, 'a'),
                (15, 'a'),
            ]
        );
    }

    #[test]
    fn set_operations() {
        let union = merged(MergePolicy::UNION);
        assert_eq!(keys(&union), vec![1, 1, 4, 5, 5, 7, 15, 15]);
        assert!(union.iter().filter(|e| e.0 == 4 || e.0 == 7).all(|e| e.1 == 'b'));

        let union_left = merged(MergePolicy::UNION_LEFT);
        assert_eq!(keys(&union_left), vec![1, 1, 4, 5, 5, 7, 15, 15]);
        assert!(union_left
            .iter()
            .filter(|e| e.0 == 4 || e.0 == 7)
            .all(|e| e.1 == 'a'));

        let intersection = merged(MergePolicy::INTERSECTION);
        assert_eq!(intersection, vec![(1, 'b'), (4, 'b'), (5, 'b'), (7, 'b')]);

        let intersection_left = merged(MergePolicy::INTERSECTION_LEFT);
        assert_eq!(
            intersection_left,
            vec![(1, 'a'), (4, 'a'), (5, 'a'), (7, 'a')]
        );

        let xor = merged(MergePolicy::SYMMETRIC_DIFFERENCE);
        assert_eq!(keys(&xor), vec![1, 5, 15, 15]);

        // Every 5 in A has a counterpart in B as far as sets go
        let difference = merged(MergePolicy::DIFFERENCE);
        assert_eq!(difference, vec![(15, 'a'), (15, 'a')]);
    }

    #[test]
    fn destructive() {
        let mut pool = Pool::new();
        let mut a = build(&mut pool, 'a', A);
        let mut b = build(&mut pool, 'b', B);
        let a_nodes: Vec<_> = pool.iter(a).map(|(n, _)| n).collect();
        let b_nodes: Vec<_> = pool.iter(b).map(|(n, _)| n).collect();
        let allocated = pool.len();

        let list = pool.merge(
            TaggedCallback,
            &mut a,
            &mut b,
            MergePolicy::UNION.destroy_a().destroy_b(),
        );
        assert_eq!(a, None);
        assert_eq!(b, None);

        // No copies were made, and the dropped nodes are gone
        let result: Vec<_> = pool.list_iter(&list).map(|(n, _)| n).collect();
        assert_eq!(result.len(), 8);
        assert_eq!(pool.len(), allocated - (A.len() + B.len() - 8));
        for node in &result {
            assert!(a_nodes.contains(node) || b_nodes.contains(node));
        }

        let tree = pool.build_tree(list);
        pool.assert_valid(tree);
        assert_eq!(tree_keys(&pool, tree), vec![1, 1, 4, 5, 5, 7, 15, 15]);
    }

    #[test]
    fn one_side_destructive() {
        let mut pool = Pool::new();
        let mut a = build(&mut pool, 'a', A);
        let mut b = build(&mut pool, 'b', B);
        let before_b = contents(&pool, b);

        let list = pool.merge(
            TaggedCallback,
            &mut a,
            &mut b,
            MergePolicy::DIFFERENCE.destroy_a(),
        );
        assert_eq!(a, None);
        assert_eq!(contents(&pool, b), before_b);
        pool.assert_valid(b);

        let mut tree = pool.build_tree(list);
        assert_eq!(tree_keys(&pool, tree), vec![15, 15]);

        pool.free(TaggedCallback, &mut tree);
        pool.free(TaggedCallback, &mut b);
        assert!(pool.is_empty());
    }

    #[test]
    fn empty_inputs() {
        let mut pool: Pool<u32> = Pool::new();
        let list = pool.merge(DefaultCallback, &mut None, &mut None, MergePolicy::UNION);
        assert_eq!(list.len, 0);
        assert_eq!(list.head, None);

        let mut a = None;
        for i in 0..10 {
            let node = pool.alloc(i);
            pool.add(DefaultCallback, &mut a, node);
        }
        let list = pool.merge(DefaultCallback, &mut a, &mut None, MergePolicy::UNION);
        assert_eq!(
            pool.list_iter(&list).map(|(_, &e)| e).collect::<Vec<_>>(),
            (0..10).collect::<Vec<_>>()
        );
        let list = pool.merge(DefaultCallback, &mut a, &mut None, MergePolicy::INTERSECTION);
        assert_eq!(list.len, 0);
    }

    #[test]
    fn predefined_policies_are_valid() {
        for policy in [
            MergePolicy::UNION,
            MergePolicy::UNION_LEFT,
            MergePolicy::INTERSECTION,
            MergePolicy::INTERSECTION_LEFT,
            MergePolicy::SYMMETRIC_DIFFERENCE,
            MergePolicy::DIFFERENCE,
            MergePolicy::ADD,
        ] {
            assert!(policy.is_valid(), "{:?}", policy);
            assert!(policy.destroy_a().destroy_b().is_valid());
        }
        assert!(!MergePolicy {
            a_only: MergeOp::KEEP_B,
            ..MergePolicy::UNION
        }
        .is_valid());
    }

    #[test]
    #[should_panic(expected = "invalid merge policy")]
    fn stalling_policy_is_rejected() {
        let mut pool = Pool::new();
        let mut a = build(&mut pool, 'a', &[5]);
        let mut b = build(&mut pool, 'b', &[3]);
        let policy = MergePolicy {
            a_only: MergeOp::empty(),
            ..MergePolicy::UNION
        };
        let _ = pool.merge(TaggedCallback, &mut a, &mut b, policy);
    }

    #[quickcheck]
    fn qc_set_policies(a: Vec<u8>, b: Vec<u8>, destroy: u8) {
        let set_a: BTreeSet<u8> = a.iter().copied().collect();
        let set_b: BTreeSet<u8> = b.iter().copied().collect();
        log::info!("a = {:?}, b = {:?}", set_a, set_b);

        let cases: [(MergePolicy, Vec<u8>); 4] = [
            (MergePolicy::UNION, set_a.union(&set_b).copied().collect()),
            (
                MergePolicy::INTERSECTION,
                set_a.intersection(&set_b).copied().collect(),
            ),
            (
                MergePolicy::DIFFERENCE,
                set_a.difference(&set_b).copied().collect(),
            ),
            (
                MergePolicy::SYMMETRIC_DIFFERENCE,
                set_a.symmetric_difference(&set_b).copied().collect(),
            ),
        ];

        for (policy, expected) in cases {
            let mut policy = policy;
            if destroy & 1 != 0 {
                policy = policy.destroy_a();
            }
            if destroy & 2 != 0 {
                policy = policy.destroy_b();
            }
            log::debug!("{:?}", policy);

            let mut pool = Pool::new();
            let mut ta = None;
            let mut tb = None;
            for &x in &set_a {
                let node = pool.alloc(x);
                pool.add(DefaultCallback, &mut ta, node);
            }
            for &x in &set_b {
                let node = pool.alloc(x);
                pool.add(DefaultCallback, &mut tb, node);
            }

            let list = pool.merge(DefaultCallback, &mut ta, &mut tb, policy);
            let mut tree = pool.build_tree(list);
            pool.assert_valid(tree);
            let got: Vec<_> = pool.iter(tree).map(|(_, &x)| x).collect();
            assert_eq!(got, expected);

            assert_eq!(ta.is_none(), policy.destroy_a || set_a.is_empty());
            assert_eq!(tb.is_none(), policy.destroy_b || set_b.is_empty());
            pool.free(DefaultCallback, &mut tree);
            pool.free(DefaultCallback, &mut ta);
            pool.free(DefaultCallback, &mut tb);
            assert!(pool.is_empty());
        }
    }
}
