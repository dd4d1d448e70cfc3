//! Exact cycle detection and greedy cycle resolution.
//!
//! A head assignment is a functional graph: every token has exactly one
//! outgoing edge `i -> heads[i]`. Each nontrivial strongly connected
//! component of such a graph is a simple cycle, so the SCC search reduces to
//! following successor pointers with path coloring.
//!
//! Self-loops are never followed: the root's self-attachment is the one
//! legal loop in a finished parse and must never be treated as a cycle. Any
//! other token, the first included, can sit on a cycle.

use ndarray::Array2;

use graph::argmax_row;

/// Cycle counts produced by a resolver run, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub cycles: usize,
    pub length2_cycles: usize,
}

impl CycleStats {
    pub fn any(&self) -> bool {
        self.cycles > 0 || self.length2_cycles > 0
    }
}

/// Finds all nontrivial strongly connected components of the assignment over
/// the first `length` tokens.
///
/// Every returned component is a simple cycle, listed in head order starting
/// from its first-visited node. Self-loops and edges into padding are not
/// followed.
pub fn nontrivial_sccs(heads: &[usize], length: usize) -> Vec<Vec<usize>> {
    const UNVISITED: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNVISITED; length];
    let mut position = vec![0usize; length];
    let mut components = vec![];
    for start in 0..length {
        if state[start] != UNVISITED {
            continue;
        }
        let mut path = vec![];
        let mut node = start;
        loop {
            state[node] = ON_PATH;
            position[node] = path.len();
            path.push(node);
            let next = heads[node];
            if next == node || next >= length || state[next] == DONE {
                break;
            }
            if state[next] == ON_PATH {
                components.push(path[position[next]..].to_vec());
                break;
            }
            node = next;
        }
        for &visited in &path {
            state[visited] = DONE;
        }
    }
    components
}

/// Breaks every cycle in the assignment by greedy local rerouting.
///
/// For each cycle: collect the set of nodes transitively dependent on it,
/// zero the probabilities of attaching into that set (so no repair can
/// re-enter the cycle or hang a node below itself), then reroute the single
/// member whose best remaining head has the highest probability ratio
/// relative to its current head. One edge changes per cycle; the walk
/// repeats until no nontrivial SCC remains.
///
/// The probability matrix is a working copy; the zeroed entries stay zeroed
/// for subsequent repairs, as do the updated reverse edges.
pub fn resolve_cycles(heads: &mut [usize], probs: &mut Array2<f32>, length: usize) -> CycleStats {
    let mut stats = CycleStats::default();
    if length == 0 {
        return stats;
    }
    let mut children: Vec<Vec<usize>> = vec![vec![]; length];
    for i in 0..length {
        let head = heads[i];
        if head != i && head < length {
            children[head].push(i);
        }
    }
    loop {
        let components = nontrivial_sccs(heads, length);
        if components.is_empty() {
            break;
        }
        for component in &components {
            if component.len() == 2 {
                stats.length2_cycles += 1;
            } else {
                stats.cycles += 1;
            }

            // Transitive closure of incoming edges, starting from the cycle.
            let mut dependent = vec![false; length];
            let mut to_visit = component.clone();
            while let Some(node) = to_visit.pop() {
                if dependent[node] {
                    continue;
                }
                dependent[node] = true;
                to_visit.extend_from_slice(&children[node]);
            }

            // Current head probabilities, read before zeroing: the current
            // head of a cycle node is itself part of the dependent set.
            let old_head_probs: Vec<f32> = component
                .iter()
                .map(|&v| probs[[v, heads[v]]])
                .collect();
            for &v in component {
                for d in 0..length {
                    if dependent[d] {
                        probs[[v, d]] = 0.0;
                    }
                }
            }

            let mut change = None;
            let mut best_ratio = ::std::f32::NEG_INFINITY;
            for (k, &v) in component.iter().enumerate() {
                let alt = argmax_row(probs, v, |j| j < length);
                let ratio = probs[[v, alt]] / old_head_probs[k];
                if change.is_none() || ratio > best_ratio {
                    best_ratio = ratio;
                    change = Some((v, alt));
                }
            }
            if let Some((v, new_head)) = change {
                let old_head = heads[v];
                children[old_head].retain(|&c| c != v);
                if new_head != v {
                    children[new_head].push(v);
                }
                heads[v] = new_head;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::is_wellformed;
    use ndarray::arr2;

    #[test]
    fn test_nontrivial_sccs() {
        assert!(nontrivial_sccs(&[0, 0, 1], 3).is_empty());
        assert_eq!(nontrivial_sccs(&[0, 2, 1], 3), vec![vec![1, 2]]);
        assert_eq!(nontrivial_sccs(&[0, 2, 3, 1], 4), vec![vec![1, 2, 3]]);
        // token 0 is an ordinary node when the root sits elsewhere
        assert_eq!(nontrivial_sccs(&[2, 0, 1, 3], 4), vec![vec![0, 2, 1]]);
        // the root self-loop is not a cycle
        assert!(nontrivial_sccs(&[0, 0], 2).is_empty());
    }

    #[test]
    fn test_resolve_two_cycle() {
        let mut heads = vec![0, 2, 1];
        let mut probs = arr2(&[
            [0.9, 0.05, 0.05],
            [0.1, 0.1, 0.8],
            [0.1, 0.8, 0.1],
        ]);
        let stats = resolve_cycles(&mut heads, &mut probs, 3);
        // both members tie at ratio 0.1/0.8; the lower index moves
        assert_eq!(heads, vec![0, 0, 1]);
        assert_eq!(stats, CycleStats { cycles: 0, length2_cycles: 1 });
        assert!(is_wellformed(&heads, 3));
    }

    #[test]
    fn test_resolve_three_cycle_breaks_highest_ratio_edge() {
        // cycle 1 -> 2 -> 3 -> 1; token 2 has the best escape ratio 0.3/0.6
        let mut heads = vec![0, 2, 3, 1];
        let mut probs = arr2(&[
            [0.9, 0.0, 0.0, 0.0],
            [0.2, 0.0, 0.7, 0.1],
            [0.3, 0.1, 0.0, 0.6],
            [0.1, 0.8, 0.1, 0.0],
        ]);
        let stats = resolve_cycles(&mut heads, &mut probs, 4);
        assert_eq!(heads, vec![0, 2, 0, 1]);
        assert_eq!(stats, CycleStats { cycles: 1, length2_cycles: 0 });
        assert!(is_wellformed(&heads, 4));
    }

    #[test]
    fn test_resolve_cycle_through_first_token() {
        // root is token 3; the cycle 0 -> 2 -> 1 -> 0 passes through token 0
        let mut heads = vec![2, 0, 1, 3];
        let mut probs = arr2(&[
            [0.1, 0.1, 0.7, 0.1],
            [0.7, 0.1, 0.1, 0.1],
            [0.1, 0.7, 0.1, 0.1],
            [0.1, 0.1, 0.1, 0.7],
        ]);
        let stats = resolve_cycles(&mut heads, &mut probs, 4);
        assert_eq!(heads, vec![3, 0, 1, 3]);
        assert_eq!(stats, CycleStats { cycles: 1, length2_cycles: 0 });
        assert!(is_wellformed(&heads, 4));
    }

    #[test]
    fn test_resolve_is_noop_on_wellformed_assignment() {
        let mut heads = vec![0, 0, 1, 2];
        let mut probs = Array2::<f32>::zeros((4, 4));
        let stats = resolve_cycles(&mut heads, &mut probs, 4);
        assert_eq!(heads, vec![0, 0, 1, 2]);
        assert!(!stats.any());
    }
}
