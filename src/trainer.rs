//! Greedy merge learning over a corpus of raw sequences.
//!
//! Identical framed sequences are collapsed into a single [`TrainingState`] entry carrying their
//! summed frequency. Each iteration selects the adjacent pair with the highest aggregate
//! frequency, rewrites every entry, and records the pair as the next [`MergeRule`].
//!
//! Pair counts are kept current with per-entry deltas instead of a fresh rescan, but the
//! rewrite still visits every entry, so one iteration costs O(total tokens in the state) and a
//! full run O(merges × corpus size). That ceiling is fine for small alphabets and corpora of
//! moderate size.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::config::{BoundaryStyle, IngestConfig, TrainerBuilder, TrainerConfig};
use crate::corpus::load_fasta_corpus;
use crate::error::Result;
use crate::metrics::{sample_rss_kb, IterationMetrics, StopReason, TrainingMetrics};
use crate::model::{BpeModel, MergeRule};
use crate::symbol::{Pair, SymbolId, SymbolTable};

pub(crate) mod word;

use word::Word;

/// High-level façade configuring and executing merge learning runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts {
    /// Trained model.
    pub model: BpeModel,
    /// Detailed metrics captured during training.
    pub metrics: TrainingMetrics,
    /// Distinct tokens of the final training state, sorted.
    pub learned_tokens: Vec<String>,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Trains a model on the FASTA records found under `inputs`.
    pub fn train_from_paths<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        ingest: &IngestConfig,
    ) -> Result<TrainerArtifacts> {
        let records = load_fasta_corpus(inputs, ingest)?;
        let sequences: Vec<&str> = records.iter().map(|r| r.sequence.as_str()).collect();
        self.train_from_sequences(&sequences)
    }

    /// Trains a model from in-memory sequences.
    ///
    /// An empty corpus is not an error: it yields an empty rule list.
    pub fn train_from_sequences<S: AsRef<str>>(
        &self,
        sequences: &[S],
    ) -> Result<TrainerArtifacts> {
        self.cfg.validate()?;
        Ok(self.run(sequences))
    }

    fn run<S: AsRef<str>>(&self, sequences: &[S]) -> TrainerArtifacts {
        let training_start = Instant::now();
        let mut state = TrainingState::from_corpus(sequences, self.cfg.boundary);
        let mut metrics = TrainingMetrics::new(self.cfg.num_merges.min(16_384));
        metrics.distinct_entries = state.len();
        if self.cfg.show_progress {
            info!(
                "learning up to {} merges from {} sequences ({} distinct)",
                self.cfg.num_merges,
                sequences.len(),
                state.len()
            );
        }

        let mut pair_counts = state.pair_counts();
        let mut merges: Vec<MergeRule> = Vec::with_capacity(self.cfg.num_merges.min(16_384));

        while merges.len() < self.cfg.num_merges {
            let iteration_start = Instant::now();
            let Some((best_pair, frequency)) = select_best_pair(&pair_counts, &state.symbols)
            else {
                metrics.stop_reason = StopReason::PairsExhausted;
                break;
            };

            let replacement = state.symbols.intern_concat(best_pair.0, best_pair.1);
            let adjustments = state.merge(best_pair, replacement);
            for (pair, delta) in adjustments.deltas {
                apply_delta(&mut pair_counts, pair, delta);
            }

            let rule = MergeRule::new(
                state.symbols.resolve(best_pair.0),
                state.symbols.resolve(best_pair.1),
            );
            debug!("merge {:>6}: {rule} (freq {frequency})", merges.len() + 1);
            merges.push(rule);
            let iteration = merges.len();

            if self.cfg.show_progress && iteration % self.cfg.progress_interval == 0 {
                info!(
                    "iter {:>6} freq {:>8} merges {:>8} distinct_pairs {:>8} symbols {:>8}",
                    iteration,
                    frequency,
                    adjustments.merges,
                    pair_counts.len(),
                    state.symbols.len()
                );
            }

            metrics.iterations.push(IterationMetrics {
                iteration,
                best_frequency: frequency,
                merges_applied: adjustments.merges,
                distinct_pairs: pair_counts.len(),
                elapsed_iteration: iteration_start.elapsed(),
                elapsed_total: training_start.elapsed(),
                rss_kb: sample_rss_kb(),
            });
        }

        metrics.total_duration = training_start.elapsed();
        if self.cfg.show_progress {
            info!(
                "learned {} merges in {:.2?} ({:?})",
                merges.len(),
                metrics.total_duration,
                metrics.stop_reason
            );
        }

        TrainerArtifacts {
            model: BpeModel::new(merges, self.cfg.boundary),
            metrics,
            learned_tokens: state.distinct_tokens(),
        }
    }
}

/// Learns up to `max_merges` rules from `corpus` with the default framing and no logging.
#[must_use]
pub fn learn<S: AsRef<str>>(corpus: &[S], max_merges: usize) -> Vec<MergeRule> {
    let cfg = TrainerConfig {
        num_merges: max_merges,
        show_progress: false,
        ..TrainerConfig::default()
    };
    Trainer::new(cfg).run(corpus).model.into_merges()
}

#[derive(Debug, Clone)]
struct VocabularyEntry {
    word: Word,
    frequency: usize,
}

/// Working set of the learner: distinct framed sequences with their corpus frequency.
#[derive(Debug, Clone)]
pub struct TrainingState {
    symbols: SymbolTable,
    entries: Vec<VocabularyEntry>,
}

impl TrainingState {
    /// Frames every sequence and collapses identical token lists into one entry.
    #[must_use]
    pub fn from_corpus<S: AsRef<str>>(sequences: &[S], boundary: BoundaryStyle) -> Self {
        let mut symbols = SymbolTable::new();
        let mut index: FxHashMap<Vec<SymbolId>, usize> = FxHashMap::default();
        let mut entries: Vec<VocabularyEntry> = Vec::new();
        for sequence in sequences {
            let framed = symbols.frame(sequence.as_ref(), boundary);
            match index.entry(framed) {
                Entry::Occupied(slot) => entries[*slot.get()].frequency += 1,
                Entry::Vacant(slot) => {
                    entries.push(VocabularyEntry {
                        word: Word::from_symbols(slot.key().clone()),
                        frequency: 1,
                    });
                    slot.insert(entries.len() - 1);
                }
            }
        }
        Self { symbols, entries }
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the corpus was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current token lists with their frequencies, in first-seen order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<&str>, usize)> {
        self.entries
            .iter()
            .map(|entry| {
                let tokens = entry
                    .word
                    .symbols()
                    .iter()
                    .map(|&id| self.symbols.resolve(id))
                    .collect();
                (tokens, entry.frequency)
            })
            .collect()
    }

    /// Aggregate frequency of the adjacent pair `(left, right)`, from a full rescan.
    #[must_use]
    pub fn pair_frequency(&self, left: &str, right: &str) -> usize {
        match (self.symbols.get(left), self.symbols.get(right)) {
            (Some(left), Some(right)) => self
                .pair_counts()
                .get(&(left, right))
                .copied()
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Every adjacent pair with its aggregate frequency, sorted by pair text.
    #[must_use]
    pub fn pair_statistics(&self) -> Vec<(MergeRule, usize)> {
        let mut stats: Vec<(MergeRule, usize)> = self
            .pair_counts()
            .into_iter()
            .map(|((left, right), count)| {
                (
                    MergeRule::new(self.symbols.resolve(left), self.symbols.resolve(right)),
                    count,
                )
            })
            .collect();
        stats.sort();
        stats
    }

    /// Sorted distinct tokens across all entries.
    #[must_use]
    pub fn distinct_tokens(&self) -> Vec<String> {
        let mut seen = vec![false; self.symbols.len()];
        for entry in &self.entries {
            for &id in entry.word.symbols() {
                seen[id] = true;
            }
        }
        let mut tokens: Vec<String> = seen
            .iter()
            .enumerate()
            .filter(|(_, &present)| present)
            .map(|(id, _)| self.symbols.resolve(id).to_owned())
            .collect();
        tokens.sort();
        tokens
    }

    fn pair_counts(&self) -> FxHashMap<Pair, usize> {
        let mut counts = FxHashMap::default();
        for entry in &self.entries {
            entry
                .word
                .for_each_pair(|pair| *counts.entry(pair).or_insert(0) += entry.frequency);
        }
        counts
    }

    fn merge(&mut self, pair: Pair, replacement: SymbolId) -> MergeAdjustments {
        self.entries
            .par_iter_mut()
            .map(|entry| {
                let outcome = entry.word.merge(pair, replacement);
                let weight = entry.frequency as i64;
                let mut local = MergeAdjustments {
                    merges: outcome.merges,
                    ..MergeAdjustments::default()
                };
                for (pair_key, delta) in outcome.deltas {
                    *local.deltas.entry(pair_key).or_insert(0) += delta * weight;
                }
                local
            })
            .reduce(MergeAdjustments::default, |mut acc, mut local| {
                acc.merges += local.merges;
                for (pair_key, delta) in local.deltas.drain() {
                    *acc.deltas.entry(pair_key).or_insert(0) += delta;
                }
                acc
            })
    }
}

#[derive(Default)]
struct MergeAdjustments {
    deltas: FxHashMap<Pair, i64>,
    merges: usize,
}

/// Candidate ordering: higher frequency wins, equal frequencies fall back to the
/// lexicographically smaller `(left, right)` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PairScore<'a> {
    frequency: usize,
    left: &'a str,
    right: &'a str,
    pair: Pair,
}

impl Ord for PairScore<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frequency
            .cmp(&other.frequency)
            .then_with(|| (other.left, other.right).cmp(&(self.left, self.right)))
    }
}

impl PartialOrd for PairScore<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn select_best_pair(
    pair_counts: &FxHashMap<Pair, usize>,
    symbols: &SymbolTable,
) -> Option<(Pair, usize)> {
    pair_counts
        .iter()
        .filter(|(_, &count)| count > 0)
        .map(|(&pair, &frequency)| PairScore {
            frequency,
            left: symbols.resolve(pair.0),
            right: symbols.resolve(pair.1),
            pair,
        })
        .max()
        .map(|score| (score.pair, score.frequency))
}

fn apply_delta(pair_counts: &mut FxHashMap<Pair, usize>, pair: Pair, delta: i64) {
    match delta.cmp(&0) {
        Ordering::Greater => {
            *pair_counts.entry(pair).or_insert(0) += delta.unsigned_abs() as usize;
        }
        Ordering::Less => {
            if let Entry::Occupied(mut occupied) = pair_counts.entry(pair) {
                let new_value = occupied
                    .get()
                    .saturating_sub(delta.unsigned_abs() as usize);
                if new_value == 0 {
                    occupied.remove();
                } else {
                    *occupied.get_mut() = new_value;
                }
            }
        }
        Ordering::Equal => {}
    }
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE model with {} merges", self.model.merges().len())?;
        writeln!(f, "Learned tokens: {}", self.learned_tokens.len())?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{apply, MergeTokenizer};
    use crate::symbol::unframe;

    fn trainer(num_merges: usize, boundary: BoundaryStyle) -> Trainer {
        let cfg = TrainerConfig::builder()
            .num_merges(num_merges)
            .boundary(boundary)
            .show_progress(false)
            .build()
            .unwrap();
        Trainer::new(cfg)
    }

    fn pairs(rules: &[MergeRule]) -> Vec<(&str, &str)> {
        rules
            .iter()
            .map(|r| (r.left.as_str(), r.right.as_str()))
            .collect()
    }

    #[test]
    fn run_of_identical_residues_breaks_ties_lexicographically() {
        let trainer = trainer(2, BoundaryStyle::EndOfWord);
        let state = TrainingState::from_corpus(&["AAAA"], BoundaryStyle::EndOfWord);
        assert_eq!(state.pair_frequency("A", "A"), 3);

        // After (A, A) the entry reads `AA AA </w>`: (AA, AA) and (AA, </w>) tie at 1 and
        // "</w>" sorts before "AA".
        let artefacts = trainer.train_from_sequences(&["AAAA"]).unwrap();
        assert_eq!(
            pairs(artefacts.model.merges()),
            vec![("A", "A"), ("AA", "</w>")]
        );
        assert_eq!(artefacts.model.encode("AAAA"), ["AA", "AA</w>"]);
        assert_eq!(artefacts.learned_tokens, ["AA", "AA</w>"]);
        assert_eq!(artefacts.metrics.stop_reason, StopReason::MaxMergesReached);
    }

    #[test]
    fn identical_sequences_collapse_into_one_entry() {
        let state =
            TrainingState::from_corpus(&["ACG", "ACG", "TT"], BoundaryStyle::Sentinels);
        assert_eq!(state.len(), 2);
        let entries = state.entries();
        assert_eq!(entries[0], (vec!["<s>", "A", "C", "G", "</s>"], 2));
        assert_eq!(state.pair_frequency("A", "C"), 2);
        assert_eq!(state.pair_frequency("T", "T"), 1);
        assert_eq!(state.pair_frequency("G", "T"), 0);
    }

    #[test]
    fn frequency_weighting_drives_selection() {
        // (G, T) appears once per sequence but in three copies; (A, A) twice in one.
        let artefacts = trainer(1, BoundaryStyle::None)
            .train_from_sequences(&["GT", "GT", "GT", "AAA"])
            .unwrap();
        assert_eq!(pairs(artefacts.model.merges()), vec![("G", "T")]);
        assert_eq!(artefacts.metrics.iterations[0].best_frequency, 3);
    }

    #[test]
    fn empty_corpus_learns_nothing() {
        let corpus: [&str; 0] = [];
        let artefacts = trainer(10, BoundaryStyle::Sentinels)
            .train_from_sequences(&corpus)
            .unwrap();
        assert!(artefacts.model.merges().is_empty());
        assert_eq!(artefacts.metrics.stop_reason, StopReason::PairsExhausted);
        assert!(artefacts.learned_tokens.is_empty());
    }

    #[test]
    fn zero_merges_keeps_character_tokens() {
        let artefacts = trainer(0, BoundaryStyle::Sentinels)
            .train_from_sequences(&["ACGT"])
            .unwrap();
        assert!(artefacts.model.merges().is_empty());
        assert_eq!(
            artefacts.model.encode("ACGT"),
            ["<s>", "A", "C", "G", "T", "</s>"]
        );
        assert_eq!(artefacts.metrics.stop_reason, StopReason::MaxMergesReached);
    }

    #[test]
    fn training_stops_when_pairs_are_exhausted() {
        let artefacts = trainer(50, BoundaryStyle::None)
            .train_from_sequences(&["AC", "G"])
            .unwrap();
        assert_eq!(pairs(artefacts.model.merges()), vec![("A", "C")]);
        assert_eq!(artefacts.metrics.stop_reason, StopReason::PairsExhausted);
        assert_eq!(artefacts.learned_tokens, ["AC", "G"]);
    }

    #[test]
    fn learning_is_deterministic() {
        let corpus = ["ACGTACGT", "ACGGT", "TTGACA", "ACGTACGT", "GGGCCC"];
        let first = learn(&corpus, 12);
        for _ in 0..3 {
            assert_eq!(learn(&corpus, 12), first);
        }
        let tokenizer = MergeTokenizer::new(&first, BoundaryStyle::Sentinels);
        for seq in corpus {
            assert_eq!(tokenizer.encode(seq), apply(seq, &first));
        }
    }

    #[test]
    fn replay_reproduces_final_training_state() {
        let corpus = ["ACGTACGT", "ACGGT", "TTGACA", "GGGCCC"];
        let artefacts = trainer(9, BoundaryStyle::Sentinels)
            .train_from_sequences(&corpus)
            .unwrap();
        let mut replayed: Vec<String> = corpus
            .iter()
            .flat_map(|seq| artefacts.model.encode(seq))
            .collect();
        replayed.sort();
        replayed.dedup();
        assert_eq!(replayed, artefacts.learned_tokens);
    }

    #[test]
    fn incremental_counts_match_full_rescan() {
        let corpus = ["AAAAAC", "CAAAC", "ACACAC", "AAAAAC"];
        let mut state = TrainingState::from_corpus(&corpus, BoundaryStyle::Sentinels);
        let mut counts = state.pair_counts();
        for _ in 0..6 {
            let Some((pair, _)) = select_best_pair(&counts, &state.symbols) else {
                break;
            };
            let replacement = state.symbols.intern_concat(pair.0, pair.1);
            for (key, delta) in state.merge(pair, replacement).deltas {
                apply_delta(&mut counts, key, delta);
            }
            assert_eq!(counts, state.pair_counts());
        }
    }

    #[test]
    fn tokens_reconstruct_the_input() {
        let corpus = ["GATTACA", "CATTAG", "GATTACA"];
        let rules = learn(&corpus, 20);
        for seq in corpus.iter().chain(["NNGATTX"].iter()) {
            let tokens = apply(seq, &rules);
            assert_eq!(unframe(&tokens, BoundaryStyle::Sentinels), *seq);
        }
    }

    #[test]
    fn pair_statistics_lists_every_pair() {
        let state = TrainingState::from_corpus(&["AC"], BoundaryStyle::EndOfWord);
        let stats = state.pair_statistics();
        assert_eq!(
            stats,
            vec![
                (MergeRule::new("A", "C"), 1),
                (MergeRule::new("C", "</w>"), 1)
            ]
        );
    }
}
