extern crate arbor;
extern crate ndarray;
extern crate rand;

use arbor::graph::cycle::nontrivial_sccs;
use arbor::graph::mst::spanning_heads;
use arbor::graph::spectral::{cycle_report, DecompositionPolicy};
use arbor::graph::{is_wellformed, masked_probs};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// The spectral and the exact cycle detector agree on random functional
/// graphs, including ones whose cycles pass through token 0. Agreement is
/// mathematically exact; the allowance covers rank decisions at the
/// floating-point tolerance.
#[test]
fn test_spectral_agrees_with_exact_detector() {
    let mut rng = StdRng::seed_from_u64(42);
    let trials = 500;
    let mut agreements = 0;
    for _ in 0..trials {
        let n = rng.gen_range(2..=8);
        let heads: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let exact = !nontrivial_sccs(&heads, n).is_empty();
        let spectral = cycle_report(&heads, n, DecompositionPolicy::GenericCpu)
            .map(|report| report.any())
            .unwrap_or(!exact);
        if exact == spectral {
            agreements += 1;
        }
    }
    assert!(
        agreements * 100 >= trials * 99,
        "detectors agreed on only {} of {} graphs",
        agreements,
        trials
    );
}

fn tree_score(probs: &Array2<f32>, heads: &[usize]) -> f32 {
    heads.iter().enumerate().map(|(i, &h)| probs[[i, h]]).sum()
}

/// Best single-rooted spanning tree by exhaustive enumeration of all head
/// vectors in base `n`.
fn brute_force_best(probs: &Array2<f32>, n: usize) -> f32 {
    let mut best = ::std::f32::NEG_INFINITY;
    let mut heads = vec![0usize; n];
    loop {
        if is_wellformed(&heads, n) {
            let score = tree_score(probs, &heads);
            if score > best {
                best = score;
            }
        }
        let mut pos = 0;
        loop {
            if pos == n {
                return best;
            }
            heads[pos] += 1;
            if heads[pos] < n {
                break;
            }
            heads[pos] = 0;
            pos += 1;
        }
    }
}

/// The spanning-tree rebuild matches the optimum found by exhaustive search.
#[test]
fn test_spanning_heads_is_optimal_on_small_graphs() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in 2..=5 {
        for _ in 0..10 {
            let scores: Vec<Vec<f32>> = (0..n)
                .map(|_| (0..n).map(|_| rng.gen::<f32>()).collect())
                .collect();
            let mask = vec![true; n];
            let probs = masked_probs(&scores, &mask);
            let heads = spanning_heads(&probs, n);
            assert!(is_wellformed(&heads, n), "not a tree: {:?}", heads);
            let found = tree_score(&probs, &heads);
            let best = brute_force_best(&probs, n);
            assert!(
                (found - best).abs() <= 1e-4 * best.abs().max(1.0),
                "n={}: found {} but the optimum is {}",
                n,
                found,
                best
            );
        }
    }
}
