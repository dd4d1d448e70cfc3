//! Spanning-tree repair of a head assignment.
//!
//! When local repairs are not enough, a legal assignment is rebuilt from
//! scratch: the probability matrix is augmented with a virtual super-root
//! whose outgoing edges carry the self-attachment (root) probabilities, and
//! a maximum spanning arborescence of the augmented graph is decoded back
//! into per-token heads. Maximizing attachment probability is the same as
//! minimizing the conventional negated-cost formulation.
//!
//! References:
//! - Kübler, McDonald and Nivre, 2009, "Dependency Parsing", pp. 47

use std::collections::HashMap;

use ndarray::Array2;
use ordered_float::OrderedFloat;

/// Maximum spanning arborescence of a dense directed graph by
/// Chu–Liu/Edmonds' algorithm.
///
/// `scores[(parent, child)]` is the weight of the edge from `parent` to
/// `child`. Returns the parent of every vertex; the root has none. Ties are
/// broken toward the lowest parent index.
pub fn maximum_arborescence(scores: &Array2<f32>, root_vertex: usize) -> Vec<Option<usize>> {
    assert_eq!(
        scores.nrows(),
        scores.ncols(),
        "score matrix must be square, got ({}, {})",
        scores.nrows(),
        scores.ncols()
    );
    let mut scores = scores.clone();
    let mut active = vec![true; scores.nrows()];
    grow(&mut scores, root_vertex, &mut active)
}

fn grow(scores: &mut Array2<f32>, root: usize, active: &mut [bool]) -> Vec<Option<usize>> {
    let parents = best_parents(scores, root, active);
    let cycle = match find_cycle(&parents, active) {
        Some(cycle) => cycle,
        None => return parents,
    };
    let (incoming, outgoing) = contract_cycle(scores, &parents, active, &cycle);
    let contracted = grow(scores, root, active);
    expand_cycle(parents, contracted, cycle, incoming, outgoing)
}

/// Picks the highest-scoring active parent for every active non-root vertex.
fn best_parents(scores: &Array2<f32>, root: usize, active: &[bool]) -> Vec<Option<usize>> {
    let n = scores.nrows();
    let mut parents = vec![None; n];
    for child in 0..n {
        if !active[child] || child == root {
            continue;
        }
        let mut best = None;
        let mut best_score = OrderedFloat(::std::f32::NEG_INFINITY);
        for parent in 0..n {
            if !active[parent] || parent == child {
                continue;
            }
            let score = OrderedFloat(scores[[parent, child]]);
            if best.is_none() || score > best_score {
                best = Some(parent);
                best_score = score;
            }
        }
        parents[child] = best;
    }
    parents
}

/// Finds a cycle in the parent assignment among active vertices, if any.
fn find_cycle(parents: &[Option<usize>], active: &[bool]) -> Option<Vec<usize>> {
    const UNVISITED: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let n = parents.len();
    let mut state = vec![UNVISITED; n];
    let mut position = vec![0usize; n];
    for start in 0..n {
        if !active[start] || state[start] != UNVISITED {
            continue;
        }
        let mut path = vec![];
        let mut node = start;
        loop {
            state[node] = ON_PATH;
            position[node] = path.len();
            path.push(node);
            match parents[node] {
                Some(parent) if state[parent] == ON_PATH => {
                    return Some(path[position[parent]..].to_vec());
                }
                Some(parent) if state[parent] == UNVISITED => node = parent,
                _ => break,
            }
        }
        for &visited in &path {
            state[visited] = DONE;
        }
    }
    None
}

/// Contracts a cycle into its first vertex, rescoring the contraction's
/// incoming and outgoing edges and recording which member each replaced edge
/// actually touches.
fn contract_cycle(
    scores: &mut Array2<f32>,
    parents: &[Option<usize>],
    active: &mut [bool],
    cycle: &[usize],
) -> (HashMap<usize, usize>, HashMap<usize, usize>) {
    let n = scores.nrows();
    let representative = cycle[0];
    let mut in_cycle = vec![false; n];
    for &v in cycle {
        in_cycle[v] = true;
    }
    // Breaking the cycle at member v forfeits v's cycle edge, so an edge
    // u -> v is worth the cycle total minus that edge plus u -> v itself.
    let cycle_score: f32 = cycle
        .iter()
        .map(|&v| scores[[parents[v].unwrap(), v]])
        .sum();

    let mut incoming = HashMap::new();
    let mut outgoing = HashMap::new();
    for u in 0..n {
        if !active[u] || in_cycle[u] {
            continue;
        }
        let mut best_in = cycle[0];
        let mut best_in_score = OrderedFloat(::std::f32::NEG_INFINITY);
        let mut best_out = cycle[0];
        let mut best_out_score = OrderedFloat(::std::f32::NEG_INFINITY);
        for (k, &v) in cycle.iter().enumerate() {
            let enter =
                OrderedFloat(scores[[u, v]] + cycle_score - scores[[parents[v].unwrap(), v]]);
            if k == 0 || enter > best_in_score {
                best_in = v;
                best_in_score = enter;
            }
            let leave = OrderedFloat(scores[[v, u]]);
            if k == 0 || leave > best_out_score {
                best_out = v;
                best_out_score = leave;
            }
        }
        scores[[u, representative]] = best_in_score.into_inner();
        incoming.insert(u, best_in);
        scores[[representative, u]] = best_out_score.into_inner();
        outgoing.insert(u, best_out);
    }
    for &v in cycle {
        if v != representative {
            active[v] = false;
        }
    }
    (incoming, outgoing)
}

/// Expands a contracted cycle back into the spanning arborescence of the
/// reduced graph.
fn expand_cycle(
    cycle_parents: Vec<Option<usize>>,
    contracted: Vec<Option<usize>>,
    cycle: Vec<usize>,
    incoming: HashMap<usize, usize>,
    outgoing: HashMap<usize, usize>,
) -> Vec<Option<usize>> {
    let representative = cycle[0];
    let mut parents = contracted;
    for v in 0..parents.len() {
        if v != representative && parents[v] == Some(representative) {
            parents[v] = Some(outgoing[&v]);
        }
    }
    // The member through which the external parent enters keeps that edge;
    // the rest of the cycle keeps its internal parents.
    let external = parents[representative];
    for &v in &cycle {
        parents[v] = cycle_parents[v];
    }
    if let Some(u) = external {
        parents[incoming[&u]] = Some(u);
    }
    parents
}

/// Rebuilds a legal single-rooted assignment over the first `length` tokens
/// from the masked probability matrix.
///
/// An arborescence from the super-root may legally use several root edges;
/// when that happens the tree is re-grown once per candidate root with the
/// other root edges suppressed, and the highest-scoring tree wins, lowest
/// candidate index on ties.
pub fn spanning_heads(probs: &Array2<f32>, length: usize) -> Vec<usize> {
    if length == 0 {
        return vec![];
    }
    if length == 1 {
        return vec![0];
    }
    let augmented = augment(probs, length);
    let parents = maximum_arborescence(&augmented, 0);
    let root_edges = (1..=length)
        .filter(|&v| parents[v] == Some(0))
        .count();
    if root_edges == 1 {
        return decode_parents(&parents, length);
    }

    let mut best: Option<(Vec<usize>, f32)> = None;
    for candidate in 0..length {
        let mut constrained = augmented.clone();
        for child in 0..length {
            if child != candidate {
                constrained[[0, child + 1]] = ::std::f32::NEG_INFINITY;
            }
        }
        let parents = maximum_arborescence(&constrained, 0);
        let total: f32 = (1..=length)
            .map(|v| augmented[[parents[v].unwrap(), v]])
            .sum();
        let better = match best {
            Some((_, best_total)) => total > best_total,
            None => true,
        };
        if better {
            best = Some((decode_parents(&parents, length), total));
        }
    }
    best.unwrap().0
}

/// Augmented `(length + 1)²` matrix in `(parent, child)` orientation: row 0
/// is the super-root carrying the diagonal (root) probabilities, and the
/// diagonal of the inner block is zeroed.
fn augment(probs: &Array2<f32>, length: usize) -> Array2<f32> {
    let mut augmented = Array2::<f32>::zeros((length + 1, length + 1));
    for i in 0..length {
        augmented[[0, i + 1]] = probs[[i, i]];
        for j in 0..length {
            if i != j {
                augmented[[j + 1, i + 1]] = probs[[i, j]];
            }
        }
    }
    augmented
}

fn decode_parents(parents: &[Option<usize>], length: usize) -> Vec<usize> {
    (0..length)
        .map(|i| match parents[i + 1] {
            Some(0) | None => i,
            Some(parent) => parent - 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::is_wellformed;
    use ndarray::arr2;

    #[test]
    fn test_maximum_arborescence_chain() {
        let scores = arr2(&[
            [0.0, 0.9, 0.1],
            [0.0, 0.0, 0.8],
            [0.0, 0.2, 0.0],
        ]);
        let parents = maximum_arborescence(&scores, 0);
        assert_eq!(parents, vec![None, Some(0), Some(1)]);
    }

    #[test]
    fn test_maximum_arborescence_breaks_cycle() {
        // 1 and 2 prefer each other; the cheapest entry into the cycle wins
        let scores = arr2(&[
            [0.0, 0.3, 0.2],
            [0.0, 0.0, 0.9],
            [0.0, 0.8, 0.0],
        ]);
        let parents = maximum_arborescence(&scores, 0);
        assert_eq!(parents, vec![None, Some(0), Some(1)]);
    }

    #[test]
    fn test_spanning_heads_two_cycle() {
        let probs = arr2(&[
            [0.9, 0.05, 0.05],
            [0.1, 0.1, 0.8],
            [0.1, 0.8, 0.1],
        ]);
        let heads = spanning_heads(&probs, 3);
        assert_eq!(heads, vec![0, 0, 1]);
        assert!(is_wellformed(&heads, 3));
    }

    #[test]
    fn test_spanning_heads_trivial_lengths() {
        let probs = Array2::<f32>::zeros((1, 1));
        assert_eq!(spanning_heads(&probs, 0), Vec::<usize>::new());
        assert_eq!(spanning_heads(&probs, 1), vec![0]);
    }
}
