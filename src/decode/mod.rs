//! Per-sentence decoding: from a head-attachment probability matrix to a
//! well-formed dependency tree.
//!
//! The pipeline is greedy argmax, root normalization, cycle detection (an
//! exact SCC search, optionally cross-checked by the spectral test) and
//! repair. Decoding never fails outward: structural violations are repaired
//! locally or by a spanning-tree rebuild, and numerical trouble only
//! degrades the diagnostics. Sentences share no state, so batches decode
//! independently.
//!
//! References:
//! - https://github.com/tdozat/Parser-v2/blob/6229befd7ab72565569d9f8aaa98401e8112971d/parser/misc/mst.py

use std::error;
use std::fmt;

use ndarray::Array2;
use slog::{Discard, Logger};

use graph;
use graph::cycle;
use graph::mst;
use graph::spectral::{self, DecompositionPolicy};

pub use self::label::{label_argmax, LabelIndices};
pub use self::root::{normalize_roots, RootRepair};

mod label;
mod root;

/// Whether a call happens under training or inference.
///
/// Threaded through explicitly; repairs only apply at inference time, while
/// training consumes the raw argmax plus diagnostics. Training returns
/// before cycle detection, so only the root counter is populated there;
/// training loops that want cycle statistics use
/// `graph::spectral::batch_cycle_reports`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Training,
    Inference,
}

/// How structural violations are repaired.
///
/// `Local` and the spanning variants implement the same contract with
/// different tie-break behavior; outputs can legitimately differ on
/// sentences with near-tied attachment probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    /// Break each cycle at its highest-ratio edge (`graph::cycle`).
    Local,
    /// Rebuild the whole tree from the score matrix when a cycle is found.
    Spanning,
    /// Rebuild unconditionally, ignoring the detectors.
    AlwaysSpanning,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Repair violations at inference time; otherwise return the raw argmax.
    pub ensure_tree: bool,
    /// Run the spectral test next to the exact one and log disagreements.
    pub spectral_check: bool,
    pub repair: RepairStrategy,
    pub policy: DecompositionPolicy,
    pub labels: LabelIndices,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ensure_tree: true,
            spectral_check: true,
            repair: RepairStrategy::Local,
            policy: DecompositionPolicy::GenericCpu,
            labels: LabelIndices::default(),
        }
    }
}

/// Monitoring counters accumulated while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub root_count_violations: usize,
    pub cycle_count: usize,
    pub length2_cycle_count: usize,
    pub detector_disagreements: usize,
}

impl Diagnostics {
    pub fn merge(&mut self, other: &Diagnostics) {
        self.root_count_violations += other.root_count_violations;
        self.cycle_count += other.cycle_count;
        self.length2_cycle_count += other.length2_cycle_count;
        self.detector_disagreements += other.detector_disagreements;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Head index per token; the root token points at itself. Entries past
    /// the valid length are meaningless.
    pub heads: Vec<usize>,
    pub diagnostics: Diagnostics,
}

/// A malformed target tree. Unlike inference-time violations this is a hard
/// error: it indicates broken training data, not a decoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetError {
    RootCount { roots: usize },
    HeadOutOfRange { token: usize, head: usize, length: usize },
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TargetError::RootCount { roots } => {
                write!(f, "target tree has {} roots, expected exactly 1", roots)
            }
            TargetError::HeadOutOfRange { token, head, length } => write!(
                f,
                "target head {} of token {} is outside the sentence of length {}",
                head, token, length
            ),
        }
    }
}

impl error::Error for TargetError {}

/// Validates a gold head assignment before it is used as a training target.
pub fn validate_target_heads(heads: &[usize], length: usize) -> Result<(), TargetError> {
    let mut roots = 0;
    for i in 0..length {
        if heads[i] >= length {
            return Err(TargetError::HeadOutOfRange {
                token: i,
                head: heads[i],
                length: length,
            });
        }
        if heads[i] == i {
            roots += 1;
        }
    }
    if length > 0 && roots != 1 {
        return Err(TargetError::RootCount { roots: roots });
    }
    Ok(())
}

pub struct Decoder {
    config: Config,
    logger: Logger,
}

impl Decoder {
    pub fn new(config: Config) -> Self {
        Decoder::with_logger(config, Logger::root(Discard, o!()))
    }

    pub fn with_logger(config: Config, logger: Logger) -> Self {
        Decoder {
            config: config,
            logger: logger,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Decodes one sentence into a head assignment.
    ///
    /// `scores[i][j]` is the probability of token `i` attaching to head `j`;
    /// self-attachment means root. The mask marks valid tokens as a
    /// contiguous prefix. At inference time with `ensure_tree` the result is
    /// always a single-rooted spanning tree over the valid tokens.
    pub fn decode<V: AsRef<[f32]>>(&self, scores: &[V], mask: &[bool], mode: Mode) -> DecodeOutput {
        let length = graph::valid_length(mask);
        let mut probs = graph::masked_probs(scores, mask);
        let mut heads = graph::argmax_heads(&probs);
        let mut diagnostics = Diagnostics::default();
        if length == 0 {
            return DecodeOutput {
                heads: heads,
                diagnostics: diagnostics,
            };
        }

        let roots = (0..length).filter(|&i| heads[i] == i).count();
        if roots != 1 {
            diagnostics.root_count_violations += 1;
        }

        if mode == Mode::Training || !self.config.ensure_tree {
            return DecodeOutput {
                heads: heads,
                diagnostics: diagnostics,
            };
        }

        match normalize_roots(&mut heads, &mut probs, length) {
            RootRepair::None => {}
            repair => {
                trace!(self.logger, "root count repaired"; "repair" => format!("{:?}", repair));
            }
        }

        let components = cycle::nontrivial_sccs(&heads, length);
        let has_cycle = !components.is_empty();

        if self.config.spectral_check {
            match spectral::cycle_report(&heads, length, self.config.policy) {
                Ok(report) => {
                    if report.any() != has_cycle {
                        diagnostics.detector_disagreements += 1;
                        warn!(self.logger, "cycle detectors disagree";
                              "spectral_cycle" => report.has_cycle,
                              "spectral_length2" => report.has_length2_cycle,
                              "exact_sccs" => components.len());
                        for row in graph::adjacency_rows(&heads, length) {
                            debug!(self.logger, "adjacency: {:?}", row);
                        }
                    }
                }
                // The exact detector stays authoritative; losing the
                // spectral diagnostic is not a decoding failure.
                Err(err) => warn!(self.logger, "spectral cycle check skipped: {}", err),
            }
        }

        match self.config.repair {
            RepairStrategy::Local => {
                if has_cycle {
                    let stats = cycle::resolve_cycles(&mut heads, &mut probs, length);
                    diagnostics.cycle_count += stats.cycles;
                    diagnostics.length2_cycle_count += stats.length2_cycles;
                }
            }
            RepairStrategy::Spanning => {
                if has_cycle {
                    count_components(&components, &mut diagnostics);
                    self.rebuild(&mut heads, &probs, length);
                }
            }
            RepairStrategy::AlwaysSpanning => {
                count_components(&components, &mut diagnostics);
                self.rebuild(&mut heads, &probs, length);
            }
        }
        debug_assert!(graph::is_wellformed(&heads, length));

        DecodeOutput {
            heads: heads,
            diagnostics: diagnostics,
        }
    }

    /// Decodes a batch of sentences. Sentences are independent; diagnostics
    /// are reported per sentence and can be folded with
    /// [`Diagnostics::merge`].
    pub fn decode_batch<V, S, M>(&self, scores: &[S], masks: &[M], mode: Mode) -> Vec<DecodeOutput>
    where
        V: AsRef<[f32]>,
        S: AsRef<[V]>,
        M: AsRef<[bool]>,
    {
        scores
            .iter()
            .zip(masks)
            .map(|(sentence, mask)| self.decode(sentence.as_ref(), mask.as_ref(), mode))
            .collect()
    }

    /// Picks edge labels for a decoded sentence, enforcing the unique ROOT
    /// label at inference time.
    pub fn decode_labels<V: AsRef<[f32]>>(
        &self,
        label_probs: &[V],
        mask: &[bool],
        mode: Mode,
    ) -> Vec<usize> {
        let ensure = mode == Mode::Inference && self.config.ensure_tree;
        label_argmax(label_probs, mask, self.config.labels, ensure)
    }

    fn rebuild(&self, heads: &mut [usize], probs: &Array2<f32>, length: usize) {
        let rebuilt = mst::spanning_heads(probs, length);
        heads[..length].copy_from_slice(&rebuilt);
    }
}

fn count_components(components: &[Vec<usize>], diagnostics: &mut Diagnostics) {
    for component in components {
        if component.len() == 2 {
            diagnostics.length2_cycle_count += 1;
        } else {
            diagnostics.cycle_count += 1;
        }
    }
}
