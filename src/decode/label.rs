//! Edge-label assignment with the unique-ROOT-label invariant.
//!
//! Mirrors the root normalizer at the label layer: exactly one token may
//! carry the ROOT dependency label, enforced by the same confidence-ratio
//! rule used for heads.

use ndarray::Array2;

use graph::valid_length;

/// Positions of the special labels in the label vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelIndices {
    /// Padding label; its probability column is zeroed before any argmax.
    pub pad: usize,
    /// The ROOT dependency label.
    pub root: usize,
}

impl Default for LabelIndices {
    fn default() -> Self {
        LabelIndices { pad: 0, root: 1 }
    }
}

/// Picks one label per token from a `[tokens, labels]` probability matrix.
///
/// The padding label is excluded by zeroing its column. When
/// `ensure_single_root` is set, exactly one valid token ends up labeled
/// ROOT: a missing ROOT goes to the token with the highest ROOT
/// probability, and surplus ROOTs keep only the one with the minimum
/// alternative/ROOT ratio, the rest taking their best non-ROOT label.
pub fn label_argmax<V: AsRef<[f32]>>(
    label_probs: &[V],
    mask: &[bool],
    indices: LabelIndices,
    ensure_single_root: bool,
) -> Vec<usize> {
    if label_probs.is_empty() {
        return vec![];
    }
    let length = valid_length(mask);
    let num_labels = label_probs[0].as_ref().len();
    let mut probs = Array2::<f32>::zeros((label_probs.len(), num_labels));
    for (i, row) in label_probs.iter().enumerate() {
        let row = row.as_ref();
        for j in 0..num_labels {
            if j != indices.pad {
                probs[[i, j]] = row[j];
            }
        }
    }
    let mut preds: Vec<usize> = (0..probs.nrows()).map(|i| argmax(&probs, i)).collect();
    if !ensure_single_root || length == 0 {
        return preds;
    }

    let roots: Vec<usize> = (0..length).filter(|&i| preds[i] == indices.root).collect();
    if roots.is_empty() {
        let mut best_token = 0;
        let mut best_prob = ::std::f32::NEG_INFINITY;
        for i in 0..length {
            if probs[[i, indices.root]] > best_prob {
                best_prob = probs[[i, indices.root]];
                best_token = i;
            }
        }
        preds[best_token] = indices.root;
    } else if roots.len() > 1 {
        let mut kept = roots[0];
        let mut min_ratio = ::std::f32::INFINITY;
        let mut alternatives = Vec::with_capacity(roots.len());
        for &token in &roots {
            let root_prob = probs[[token, indices.root]];
            probs[[token, indices.root]] = 0.0;
            let alternative = argmax(&probs, token);
            let ratio = probs[[token, alternative]] / root_prob;
            alternatives.push(alternative);
            if ratio < min_ratio {
                min_ratio = ratio;
                kept = token;
            }
        }
        for (k, &token) in roots.iter().enumerate() {
            preds[token] = alternatives[k];
        }
        preds[kept] = indices.root;
    }
    preds
}

fn argmax(probs: &Array2<f32>, i: usize) -> usize {
    let mut best = 0;
    let mut best_prob = ::std::f32::NEG_INFINITY;
    for j in 0..probs.ncols() {
        if probs[[i, j]] > best_prob {
            best_prob = probs[[i, j]];
            best = j;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [bool; 3] = [true, true, true];

    #[test]
    fn test_pad_label_is_never_chosen() {
        let probs = vec![
            vec![0.9, 0.05, 0.05],
            vec![0.9, 0.02, 0.08],
            vec![0.9, 0.01, 0.09],
        ];
        let preds = label_argmax(&probs, &MASK, LabelIndices::default(), false);
        assert_eq!(preds, vec![1, 2, 2]);
    }

    #[test]
    fn test_missing_root_label_is_added() {
        let probs = vec![
            vec![0.0, 0.4, 0.6],
            vec![0.0, 0.2, 0.8],
            vec![0.0, 0.1, 0.9],
        ];
        let preds = label_argmax(&probs, &MASK, LabelIndices::default(), true);
        assert_eq!(preds, vec![1, 2, 2]);
    }

    #[test]
    fn test_surplus_root_labels_are_rerouted() {
        // token 1 keeps ROOT (ratio 0.1/0.9 beats 0.4/0.6)
        let probs = vec![
            vec![0.0, 0.6, 0.4],
            vec![0.0, 0.9, 0.1],
            vec![0.0, 0.1, 0.9],
        ];
        let preds = label_argmax(&probs, &MASK, LabelIndices::default(), true);
        assert_eq!(preds, vec![2, 1, 2]);
    }
}
