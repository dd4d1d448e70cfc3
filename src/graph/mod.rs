//! Graph algorithms over head assignments and score matrices.
//!
//! A head assignment maps every token to the index of its head; the root
//! token is its own head. Score matrices are indexed `scores[dependent][head]`
//! and hold non-negative attachment probabilities.
//!
//! References:
//! - https://github.com/tdozat/Parser-v2/blob/6229befd7ab72565569d9f8aaa98401e8112971d/parser/misc/mst.py

use ndarray::Array2;

pub mod cycle;
pub mod mst;
pub mod spectral;

/// Result of a cycle test over a head assignment.
///
/// Length-2 cycles collapse to a single undirected edge and are invisible to
/// the Laplacian trace/rank test, so they are reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub has_cycle: bool,
    pub has_length2_cycle: bool,
}

impl CycleReport {
    pub fn any(&self) -> bool {
        self.has_cycle || self.has_length2_cycle
    }
}

/// Counts the valid tokens of a sentence.
///
/// Masks are contiguous prefixes: padding only follows real tokens.
pub fn valid_length(mask: &[bool]) -> usize {
    let length = mask.iter().filter(|&&keep| keep).count();
    debug_assert!(
        mask[..length].iter().all(|&keep| keep),
        "mask must be a contiguous prefix of valid tokens"
    );
    length
}

/// Copies a score matrix with the columns of padding tokens zeroed so that an
/// invalid head can never win an argmax.
pub fn masked_probs<V: AsRef<[f32]>>(scores: &[V], mask: &[bool]) -> Array2<f32> {
    let n = scores.len();
    let mut probs = Array2::<f32>::zeros((n, n));
    for (i, row) in scores.iter().enumerate() {
        let row = row.as_ref();
        for j in 0..n {
            if mask[j] {
                probs[[i, j]] = row[j];
            }
        }
    }
    probs
}

/// Initial head assignment by per-row argmax over valid heads
///
/// Ties are broken by the lowest index. Rows of padding tokens still decode
/// but carry no meaning; callers ignore everything past the valid length.
///
/// scores: 2D array [dependents, heads]
pub fn greedy_heads<V: AsRef<[f32]>>(scores: &[V], mask: &[bool]) -> Vec<usize> {
    let probs = masked_probs(scores, mask);
    argmax_heads(&probs)
}

/// Per-row argmax over an already masked probability matrix.
pub(crate) fn argmax_heads(probs: &Array2<f32>) -> Vec<usize> {
    (0..probs.nrows())
        .map(|i| argmax_row(probs, i, |_| true))
        .collect()
}

/// Lowest-index argmax over the columns of row `i` admitted by `admit`.
pub(crate) fn argmax_row<F>(probs: &Array2<f32>, i: usize, admit: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut best = 0;
    let mut best_prob = ::std::f32::NEG_INFINITY;
    for j in 0..probs.ncols() {
        if !admit(j) {
            continue;
        }
        let p = probs[[i, j]];
        if p > best_prob {
            best = j;
            best_prob = p;
        }
    }
    best
}

/// Checks that an assignment is a single-rooted spanning tree over the first
/// `length` tokens: exactly one self-attached root, all heads in range, and
/// every token reaching the root.
pub fn is_wellformed(heads: &[usize], length: usize) -> bool {
    if length == 0 {
        return true;
    }
    let mut root = None;
    for i in 0..length {
        if heads[i] >= length {
            return false;
        }
        if heads[i] == i {
            if root.is_some() {
                return false;
            }
            root = Some(i);
        }
    }
    let root = match root {
        Some(r) => r,
        None => return false,
    };
    for i in 0..length {
        let mut node = i;
        let mut steps = 0;
        while node != root {
            node = heads[node];
            steps += 1;
            if steps > length {
                return false;
            }
        }
    }
    true
}

/// Directed adjacency of the assignment as 0/1 rows, for diagnostics dumps.
pub fn adjacency_rows(heads: &[usize], length: usize) -> Vec<Vec<u8>> {
    let mut rows = vec![vec![0u8; length]; length];
    for i in 0..length {
        rows[i][heads[i]] = 1;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greedy_heads() {
        let scores = vec![
            vec![0.9, 0.05, 0.05],
            vec![0.1, 0.1, 0.8],
            vec![0.1, 0.8, 0.1],
        ];
        let mask = vec![true, true, true];
        assert_eq!(greedy_heads(&scores, &mask), vec![0, 2, 1]);
    }

    #[test]
    fn test_greedy_heads_masked() {
        // the padding column must never be selected even when it scores high
        let scores = vec![
            vec![0.5, 0.1, 0.9],
            vec![0.6, 0.2, 0.9],
            vec![0.1, 0.1, 0.9],
        ];
        let mask = vec![true, true, false];
        assert_eq!(greedy_heads(&scores, &mask)[..2], [0, 0]);
    }

    #[test]
    fn test_greedy_ties_prefer_lowest_index() {
        let scores = vec![vec![0.5, 0.5], vec![0.4, 0.4]];
        let mask = vec![true, true];
        assert_eq!(greedy_heads(&scores, &mask), vec![0, 0]);
    }

    #[test]
    fn test_is_wellformed() {
        assert!(is_wellformed(&[0, 0, 1], 3));
        assert!(is_wellformed(&[0], 1));
        assert!(!is_wellformed(&[0, 2, 1], 3)); // 2-cycle
        assert!(!is_wellformed(&[0, 1, 0], 3)); // two roots
        assert!(!is_wellformed(&[1, 2, 1], 3)); // no root
    }
}
