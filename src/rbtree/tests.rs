use super::*;
use quickcheck_macros::quickcheck;
use rand::{rngs::StdRng, Rng, SeedableRng};

use std::{collections::BTreeSet, prelude::v1::*};

use crate::find::Find;

/// `.1` is a serial number, so among equal `.0`s the derived order is the
/// insertion order, which is what [`Pool::add`] maintains.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
struct TestElement(u8, usize);

struct TestCallback;

impl Callback<TestElement> for TestCallback {
    fn cmp_element(&mut self, e1: &TestElement, e2: &TestElement) -> Ordering {
        e1.0.cmp(&e2.0)
    }

    fn copy_element(&mut self, element: &TestElement) -> TestElement {
        *element
    }
}

fn last_equal(expected: &BTreeSet<TestElement>, key: u8) -> Option<TestElement> {
    expected
        .range(TestElement(key, 0)..=TestElement(key, usize::MAX))
        .next_back()
        .copied()
}

/// Validate the tree and compare its sequence with `expected`, both ways.
fn check_tree(pool: &Pool<TestElement>, tree: Option<NodeId>, expected: &BTreeSet<TestElement>) {
    {
        let mut st = String::new();
        pool.dump(tree, &mut st).unwrap();
        log::trace!("Tree = \n{}", st);
    }

    pool.assert_valid(tree);

    let expected: Vec<_> = expected.iter().cloned().collect();

    let tree_elements: Vec<_> = pool.iter(tree).map(|(_, &e)| e).collect();
    assert_eq!(tree_elements, expected);

    let mut tree_elements: Vec<_> = pool.iter(tree).rev().map(|(_, &e)| e).collect();
    tree_elements.reverse();
    assert_eq!(tree_elements, expected);
}

#[quickcheck]
fn qc_rbtree(cmds: Vec<u8>) {
    let mut cmds = cmds.into_iter();
    let mut pool = Pool::new();
    let mut live = Vec::<NodeId>::new();
    let mut expected = BTreeSet::new();
    let mut serial = 0;
    let mut tree = None;

    log::info!("Command: {:?}", cmds);

    (|| -> Option<()> {
        while let Some(cmd) = cmds.next() {
            match cmd % 4 {
                0 if !live.is_empty() => {
                    let i = cmds.next()? as usize % live.len();
                    let node = live[i];
                    let element = pool[node].element;
                    log::debug!("Remove {:?} at {}", element, node);

                    let unlinked = pool.remove_node(TestCallback, &mut tree, node);
                    let i = live.iter().position(|&n| n == unlinked).unwrap();
                    live.swap_remove(i);
                    assert_eq!(pool.release(unlinked), element);

                    expected.remove(&element);
                }
                1 => {
                    let key = cmds.next()? % 32;
                    log::debug!("Remove key {}", key);

                    let unlinked = pool.remove(TestCallback, &mut tree, |e| key.cmp(&e.0));
                    let removed = last_equal(&expected, key);
                    match (unlinked, removed) {
                        (Some(unlinked), Some(removed)) => {
                            let i = live.iter().position(|&n| n == unlinked).unwrap();
                            live.swap_remove(i);
                            assert_eq!(pool.release(unlinked), removed);
                            expected.remove(&removed);
                        }
                        (None, None) => {}
                        other => core::panic!("got {:?}", other),
                    }
                }
                2 => {
                    let element = TestElement(cmds.next()? % 32, serial);
                    serial += 1;
                    let new = pool.alloc(element);
                    log::debug!("Insert or replace {:?} as {}", element, new);

                    match pool.insert(TestCallback, &mut tree, new) {
                        Some(existing) => {
                            let replaced = last_equal(&expected, element.0).unwrap();
                            assert_eq!(pool[existing].element, element);
                            assert_eq!(pool.release(new), replaced);
                            expected.remove(&replaced);
                        }
                        None => {
                            assert_eq!(last_equal(&expected, element.0), None);
                            live.push(new);
                        }
                    }
                    // The newest serial sorts last among equals, right where
                    // the replaced element was
                    expected.insert(element);
                }
                _ => {
                    let element = TestElement(cmds.next()? % 32, serial);
                    serial += 1;
                    let new = pool.alloc(element);
                    log::debug!("Add {:?} as {}", element, new);

                    pool.add(TestCallback, &mut tree, new);
                    live.push(new);
                    expected.insert(element);
                }
            }

            check_tree(&pool, tree, &expected);
            assert_eq!(pool.len(), live.len());
        }

        Some(())
    })();
}

#[quickcheck]
fn qc_add_after(cmds: Vec<u8>) {
    // Elements are all equal, so any position is a valid one
    let mut pool = Pool::new();
    let mut tree = None;
    let mut order: Vec<NodeId> = Vec::new();

    log::info!("Command: {:?}", cmds);

    for (i, cmd) in cmds.into_iter().enumerate() {
        let new = pool.alloc(TestElement(0, i));
        let pos = cmd as usize % (order.len() + 1);
        let existing = pos.checked_sub(1).map(|p| order[p]);
        log::debug!("Add {} after {:?}", new, existing);

        pool.add_after(TestCallback, &mut tree, new, existing);
        order.insert(pos, new);

        pool.assert_valid(tree);
        let nodes: Vec<_> = pool.iter(tree).map(|(n, _)| n).collect();
        assert_eq!(nodes, order);
    }
}

const SCENARIO: &[u8] = &[1, 1, 2, 4, 5, 5, 7, 8, 11, 14, 15, 15];

fn build_scenario(pool: &mut Pool<TestElement>) -> Option<NodeId> {
    let mut tree = None;
    for (i, &key) in SCENARIO.iter().enumerate() {
        let node = pool.alloc(TestElement(key, i));
        pool.add(TestCallback, &mut tree, node);
        pool.assert_valid(tree);
    }
    tree
}

fn keys(pool: &Pool<TestElement>, tree: Option<NodeId>) -> Vec<u8> {
    pool.iter(tree).map(|(_, e)| e.0).collect()
}

#[test]
fn scenario() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    assert_eq!(keys(&pool, tree), SCENARIO);

    let found = |pool: &Pool<TestElement>, how, key: u8| {
        pool.find(tree, how, |e| key.cmp(&e.0)).map(|n| pool[n].element.0)
    };
    assert_eq!(found(&pool, Find::Eq, 5), Some(5));
    assert_eq!(found(&pool, Find::Lt, 5), Some(4));
    assert_eq!(found(&pool, Find::Gt, 5), Some(7));
    assert_eq!(found(&pool, Find::Le, 6), Some(5));
    assert_eq!(found(&pool, Find::Ge, 6), Some(7));

    for _ in 0..2 {
        let node = pool.remove(TestCallback, &mut tree, |e| 5u8.cmp(&e.0)).unwrap();
        assert_eq!(pool.release(node).0, 5);
        pool.assert_valid(tree);
    }
    assert_eq!(pool.remove(TestCallback, &mut tree, |e| 5u8.cmp(&e.0)), None);
    assert_eq!(keys(&pool, tree), [1, 1, 2, 4, 7, 8, 11, 14, 15, 15]);
}

#[test]
fn remove_takes_the_last_duplicate() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);

    // The second 15 was added last
    let node = pool.remove(TestCallback, &mut tree, |e| 15u8.cmp(&e.0)).unwrap();
    assert_eq!(pool.release(node), TestElement(15, 11));
    let node = pool.remove(TestCallback, &mut tree, |e| 1u8.cmp(&e.0)).unwrap();
    assert_eq!(pool.release(node), TestElement(1, 1));
    pool.assert_valid(tree);
}

#[test]
fn remove_specific_duplicates() {
    let mut pool = Pool::new();
    let mut tree = None;
    let nodes: Vec<_> = (0..20)
        .map(|i| {
            let node = pool.alloc(TestElement(7, i));
            pool.add(TestCallback, &mut tree, node);
            node
        })
        .collect();

    let mut expected: BTreeSet<_> = (0..20).map(|i| TestElement(7, i)).collect();
    for i in [10, 0, 19, 5, 6, 7] {
        let element = TestElement(7, i);
        // The payload may have been moved to another node; look it up
        let node = pool
            .iter(tree)
            .find(|&(_, &e)| e == element)
            .map(|(n, _)| n)
            .unwrap();
        let unlinked = pool.remove_node(TestCallback, &mut tree, node);
        assert_eq!(pool.release(unlinked), element);
        expected.remove(&element);
        check_tree(&pool, tree, &expected);
    }
    assert_eq!(pool.len(), 14);
    assert!(nodes.iter().filter(|&&n| pool.contains(n)).count() == 14);
}

#[test]
fn add_then_remove_round_trip() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    let before: Vec<_> = pool.iter(tree).map(|(_, &e)| e).collect();

    for key in [0, 1, 5, 9, 15, 16] {
        let new = pool.alloc(TestElement(key, 100));
        pool.add(TestCallback, &mut tree, new);
        pool.assert_valid(tree);

        // `new` is the last of its run, so removing by key takes it back out
        let unlinked = pool.remove(TestCallback, &mut tree, |e| key.cmp(&e.0)).unwrap();
        assert_eq!(pool.release(unlinked), TestElement(key, 100));
        pool.assert_valid(tree);

        let after: Vec<_> = pool.iter(tree).map(|(_, &e)| e).collect();
        assert_eq!(after, before);
    }
}

#[test]
fn insert_replaces_in_place() {
    let mut pool = Pool::new();
    let mut tree = None;
    let a = pool.alloc(TestElement(3, 0));
    let b = pool.alloc(TestElement(3, 1));
    assert_eq!(pool.insert(TestCallback, &mut tree, a), None);
    assert_eq!(pool.insert(TestCallback, &mut tree, b), Some(a));

    assert_eq!(pool[a].element, TestElement(3, 1));
    assert_eq!(pool.release(b), TestElement(3, 0));
    assert_eq!(pool.len_of(tree), 1);
}

#[test]
fn remove_everything() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    while let Some(root) = tree {
        let unlinked = pool.remove_node(TestCallback, &mut tree, root);
        pool.release(unlinked);
        pool.assert_valid(tree);
    }
    assert!(pool.is_empty());
    assert_eq!(pool.remove(TestCallback, &mut tree, |e| 1u8.cmp(&e.0)), None);
}

#[test]
#[should_panic]
fn remove_node_not_in_tree() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    let stray = pool.alloc(TestElement(5, 99));
    pool.remove_node(TestCallback, &mut tree, stray);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "sorts before")]
fn add_after_rejects_smaller_element() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    // The first 8 of the scenario, followed by 11
    let existing = pool.find(tree, Find::Eq, |e| 8u8.cmp(&e.0)).unwrap();
    let new = pool.alloc(TestElement(7, 99));
    pool.add_after(TestCallback, &mut tree, new, Some(existing));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "sorts after")]
fn add_after_rejects_element_past_successor() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    let existing = pool.find(tree, Find::Eq, |e| 8u8.cmp(&e.0)).unwrap();
    let new = pool.alloc(TestElement(12, 99));
    pool.add_after(TestCallback, &mut tree, new, Some(existing));
}

#[test]
fn add_after_between_neighbors() {
    let mut pool = Pool::new();
    let mut tree = build_scenario(&mut pool);
    let existing = pool.find(tree, Find::Eq, |e| 8u8.cmp(&e.0)).unwrap();
    let new = pool.alloc(TestElement(9, 99));
    pool.add_after(TestCallback, &mut tree, new, Some(existing));
    pool.assert_valid(tree);
    assert_eq!(pool.next(existing), Some(new));
    assert_eq!(
        keys(&pool, tree),
        [1, 1, 2, 4, 5, 5, 7, 8, 9, 11, 14, 15, 15]
    );
}

#[test]
fn seeded_random_workload() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut pool = Pool::new();
    let mut tree = None;
    let mut expected = BTreeSet::new();

    for serial in 0..2000 {
        if rng.gen_bool(0.6) || expected.is_empty() {
            let element = TestElement(rng.gen_range(0..=255), serial);
            let node = pool.alloc(element);
            pool.add(TestCallback, &mut tree, node);
            expected.insert(element);
        } else {
            let key = rng.gen();
            let removed = last_equal(&expected, key);
            let unlinked = pool.remove(TestCallback, &mut tree, |e| key.cmp(&e.0));
            assert_eq!(unlinked.map(|n| pool.release(n)), removed);
            if let Some(removed) = removed {
                expected.remove(&removed);
            }
        }

        if serial % 100 == 0 {
            check_tree(&pool, tree, &expected);
        }
    }
    check_tree(&pool, tree, &expected);

    pool.free(TestCallback, &mut tree);
    assert!(pool.is_empty());
}
