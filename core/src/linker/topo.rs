//! Dependency ordering of constant initializers.

use alloc::collections::BinaryHeap;
use core::cmp::Reverse;

use crate::{Vec, vec};

/// Orders `count` nodes so every node comes after the nodes it depends on.
///
/// `edges[i]` lists the nodes `i` depends on. Whenever several nodes are
/// ready, the lowest index goes first, so independent nodes keep their
/// declaration order. On a cycle, returns the nodes that could not be
/// ordered, ascending.
pub(crate) fn sort(count: usize, edges: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (node, deps) in edges.iter().enumerate() {
        for &dep in deps {
            in_degree[node] += 1;
            dependents[dep].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&node| in_degree[node] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(count);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|&node| in_degree[node] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_come_first() {
        // 0 needs 2, 2 needs 1.
        let edges = vec![vec![2], vec![], vec![1]];
        assert_eq!(sort(3, &edges), Ok(vec![1, 2, 0]));
    }

    #[test]
    fn released_nodes_go_before_later_ones() {
        // 0 needs 1; 2 is free but declared after 0.
        let edges = vec![vec![1], vec![], vec![]];
        assert_eq!(sort(3, &edges), Ok(vec![1, 0, 2]));
    }

    #[test]
    fn independent_nodes_keep_their_order() {
        let edges = vec![vec![], vec![], vec![]];
        assert_eq!(sort(3, &edges), Ok(vec![0, 1, 2]));
    }

    #[test]
    fn duplicate_edges_are_counted_once_each() {
        let edges = vec![vec![], vec![0, 0]];
        assert_eq!(sort(2, &edges), Ok(vec![0, 1]));
    }

    #[test]
    fn cycle_reports_every_stuck_node() {
        // 0 <-> 1 is a cycle; 2 depends on it; 3 is free.
        let edges = vec![vec![1], vec![0], vec![0], vec![]];
        assert_eq!(sort(4, &edges), Err(vec![0, 1, 2]));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let edges = vec![vec![0]];
        assert_eq!(sort(1, &edges), Err(vec![0]));
    }
}
