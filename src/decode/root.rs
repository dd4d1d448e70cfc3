//! Enforcement of the unique-root invariant on a head assignment.

use ndarray::Array2;

use graph::argmax_row;

/// What the root normalizer did to the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootRepair {
    /// Exactly one root was already present.
    None,
    /// No token was self-attached; this one was promoted.
    Promoted(usize),
    /// Several tokens were self-attached; all but `kept` were rerouted.
    Demoted { kept: usize, rerouted: usize },
}

/// Repairs the root count of an assignment in place.
///
/// With no root, the token whose self-attachment probability is highest
/// relative to its chosen head is promoted. With several, each root's
/// self-score is zeroed and its best alternative head recomputed; the root
/// with the minimum alternative/self ratio keeps the root position and the
/// others take their alternatives. Ties resolve to the lowest index.
///
/// The zeroed self-scores stay zeroed in the working matrix, so a later
/// spanning-tree rebuild cannot resurrect a demoted root.
pub fn normalize_roots(heads: &mut [usize], probs: &mut Array2<f32>, length: usize) -> RootRepair {
    if length == 0 {
        return RootRepair::None;
    }
    let roots: Vec<usize> = (0..length).filter(|&i| heads[i] == i).collect();
    match roots.len() {
        1 => RootRepair::None,
        0 => {
            let mut new_root = 0;
            let mut best_ratio = ::std::f32::NEG_INFINITY;
            for i in 0..length {
                let ratio = probs[[i, i]] / probs[[i, heads[i]]];
                if ratio > best_ratio {
                    best_ratio = ratio;
                    new_root = i;
                }
            }
            heads[new_root] = new_root;
            RootRepair::Promoted(new_root)
        }
        _ => {
            let mut kept = roots[0];
            let mut min_ratio = ::std::f32::INFINITY;
            let mut alternatives = Vec::with_capacity(roots.len());
            for &root in &roots {
                let root_prob = probs[[root, root]];
                probs[[root, root]] = 0.0;
                let alternative = argmax_row(probs, root, |j| j < length);
                let ratio = probs[[root, alternative]] / root_prob;
                alternatives.push(alternative);
                if ratio < min_ratio {
                    min_ratio = ratio;
                    kept = root;
                }
            }
            for (k, &root) in roots.iter().enumerate() {
                heads[root] = alternatives[k];
            }
            heads[kept] = kept;
            RootRepair::Demoted {
                kept: kept,
                rerouted: roots.len() - 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_single_root_is_untouched() {
        let mut heads = vec![0, 0, 1];
        let mut probs = arr2(&[[0.9, 0.05, 0.05], [0.6, 0.2, 0.2], [0.1, 0.8, 0.1]]);
        assert_eq!(normalize_roots(&mut heads, &mut probs, 3), RootRepair::None);
        assert_eq!(heads, vec![0, 0, 1]);
    }

    #[test]
    fn test_promotes_most_confident_root() {
        // nobody self-attaches; ratios are 0.125 each, lowest index wins
        let mut heads = vec![1, 2, 1];
        let mut probs = arr2(&[[0.1, 0.8, 0.1], [0.1, 0.1, 0.8], [0.1, 0.8, 0.1]]);
        let repair = normalize_roots(&mut heads, &mut probs, 3);
        assert_eq!(repair, RootRepair::Promoted(0));
        assert_eq!(heads, vec![0, 2, 1]);
    }

    #[test]
    fn test_demotes_all_but_least_escapable_root() {
        // token 1 has the lower alternative/self ratio and stays root
        let mut heads = vec![0, 1, 0];
        let mut probs = arr2(&[[0.6, 0.2, 0.2], [0.05, 0.9, 0.05], [0.7, 0.2, 0.1]]);
        let repair = normalize_roots(&mut heads, &mut probs, 3);
        assert_eq!(repair, RootRepair::Demoted { kept: 1, rerouted: 1 });
        assert_eq!(heads, vec![1, 1, 0]);
        // the demoted root's self-score is gone from the working matrix
        assert_eq!(probs[[0, 0]], 0.0);
    }
}
