//! Approximate cycle detection through the graph Laplacian.
//!
//! The undirected version of a head assignment over `n` tokens is a forest
//! exactly when its edge count equals the numerical rank of its Laplacian,
//! so `0.5 * trace(L) >= rank(L) + 1` signals a cycle. A pair of mutual
//! heads collapses to a single undirected edge and has to be tested
//! separately through the directed adjacency.
//!
//! This test is a diagnostic: it can misjudge near the rank tolerance, and
//! the decomposition can fail to converge. The exact detector in
//! `graph::cycle` stays authoritative.

use std::error;
use std::fmt;

use nalgebra::linalg::SVD;
use nalgebra::DMatrix;
use ndarray::Array2;

use graph::{argmax_heads, valid_length, CycleReport};

/// Iteration budget for one decomposition; exceeding it is reported as
/// non-convergence rather than looping forever.
const MAX_SVD_ITERATIONS: usize = 1000;

/// Where the singular value decomposition runs.
///
/// Accelerator SVD kernels have shown instability on the near-singular
/// Laplacians this test produces, so decompositions are kept on a plain CPU
/// path even when the surrounding scoring pipeline runs elsewhere. `Ambient`
/// is accepted from callers that manage their own compute placement; it
/// routes through the same CPU implementation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompositionPolicy {
    GenericCpu,
    Ambient,
}

impl Default for DecompositionPolicy {
    fn default() -> Self {
        DecompositionPolicy::GenericCpu
    }
}

#[derive(Debug)]
pub enum NumericalError {
    /// The SVD did not converge within the iteration budget.
    SvdNonConvergence { size: usize },
}

impl fmt::Display for NumericalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NumericalError::SvdNonConvergence { size } => {
                write!(f, "SVD did not converge for a {}x{} Laplacian", size, size)
            }
        }
    }
}

impl error::Error for NumericalError {}

/// Laplacian of the undirected assignment graph over the first `length`
/// tokens. Self-loops (the root) and edges into padding contribute nothing.
pub fn laplacian(heads: &[usize], length: usize) -> DMatrix<f32> {
    let mut lap = DMatrix::<f32>::zeros(length, length);
    for i in 0..length {
        let head = heads[i];
        if head != i && head < length {
            lap[(i, head)] = -1.0;
            lap[(head, i)] = -1.0;
        }
    }
    for i in 0..length {
        let degree = -lap.row(i).sum();
        lap[(i, i)] = degree;
    }
    lap
}

/// Singular values of a matrix, in nalgebra's descending order.
pub fn singular_values(
    matrix: &DMatrix<f32>,
    policy: DecompositionPolicy,
) -> Result<Vec<f32>, NumericalError> {
    match policy {
        // Both policies resolve to the CPU decomposition in this build.
        DecompositionPolicy::GenericCpu | DecompositionPolicy::Ambient => {}
    }
    match SVD::try_new(
        matrix.clone(),
        false,
        false,
        ::std::f32::EPSILON,
        MAX_SVD_ITERATIONS,
    ) {
        Some(svd) => Ok(svd.singular_values.iter().cloned().collect()),
        None => Err(NumericalError::SvdNonConvergence { size: matrix.nrows() }),
    }
}

/// Spectral cycle test over a head assignment restricted to `length` tokens.
///
/// The rank tolerance is `length * machine_epsilon`, scaled by the dimension
/// only and not by the largest singular value; this deviates from the usual
/// matrix-rank convention and is kept for compatibility with existing
/// models.
pub fn cycle_report(
    heads: &[usize],
    length: usize,
    policy: DecompositionPolicy,
) -> Result<CycleReport, NumericalError> {
    if length == 0 {
        return Ok(CycleReport::default());
    }
    let lap = laplacian(heads, length);
    let trace: f32 = (0..length).map(|i| lap[(i, i)]).sum();
    let values = singular_values(&lap, policy)?;
    let tolerance = length as f32 * ::std::f32::EPSILON;
    let rank = values.iter().filter(|&&v| v > tolerance).count();
    let has_cycle = 0.5 * trace >= (rank + 1) as f32;

    // adjacency AND adjacency-transpose: i -> j with j -> i
    let has_length2_cycle = (0..length).any(|i| {
        let head = heads[i];
        head > i && head < length && heads[head] == i
    });

    Ok(CycleReport {
        has_cycle: has_cycle,
        has_length2_cycle: has_length2_cycle,
    })
}

/// Batched form of the spectral test for use inside a training loop.
///
/// Each sentence's adjacency is derived from its score matrix by masked
/// argmax (indicator multiplication, no per-element branching) and tested
/// independently; sentences share no state, so a failed decomposition only
/// poisons its own report.
pub fn batch_cycle_reports(
    scores: &[Array2<f32>],
    masks: &[Vec<bool>],
    policy: DecompositionPolicy,
) -> Vec<Result<CycleReport, NumericalError>> {
    scores
        .iter()
        .zip(masks)
        .map(|(matrix, mask)| {
            let n = matrix.nrows();
            let mut probs = matrix.clone();
            for j in 0..n {
                let keep = if mask[j] { 1.0 } else { 0.0 };
                for i in 0..n {
                    probs[[i, j]] *= keep;
                }
            }
            let heads = argmax_heads(&probs);
            cycle_report(&heads, valid_length(mask), policy)
        })
        .collect()
}
