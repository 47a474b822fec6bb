//! Distance-weighted co-occurrence statistics over token streams.
//!
//! Each stream is first mapped to vocabulary ids; tokens outside the vocabulary are dropped and
//! do not occupy window slots. Every pair of positions at distance `1..=window_size` in the
//! filtered stream adds `1 / distance` to the unordered id pair, stored once as `(min, max)`.

use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::CooccurrenceConfig;
use crate::error::Result;
use crate::vocab::{TokenId, TokenVocabulary};

/// Unordered id pair stored as `(min, max)`.
pub type IdPair = (TokenId, TokenId);

/// Symmetric sparse table of accumulated co-occurrence weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CooccurrenceTable {
    weights: FxHashMap<IdPair, f64>,
}

impl CooccurrenceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `weight` to the unordered pair `{a, b}`. Non-positive weights are ignored.
    pub fn add(&mut self, a: TokenId, b: TokenId, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        *self.weights.entry(ordered(a, b)).or_insert(0.0) += weight;
    }

    /// Accumulated weight of `{a, b}` regardless of argument order; `0.0` when absent.
    #[must_use]
    pub fn weight(&self, a: TokenId, b: TokenId) -> f64 {
        self.weights.get(&ordered(a, b)).copied().unwrap_or(0.0)
    }

    /// Number of stored (unordered) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns true when nothing was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Iterates stored pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (IdPair, f64)> + '_ {
        self.weights.iter().map(|(&pair, &weight)| (pair, weight))
    }

    /// Sum of every stored weight.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Folds another partial table into this one by pair-keyed summation.
    pub fn merge(&mut self, other: CooccurrenceTable) {
        if self.weights.len() < other.weights.len() {
            let mine = std::mem::replace(&mut self.weights, other.weights);
            self.merge_weights(mine);
        } else {
            self.merge_weights(other.weights);
        }
    }

    fn merge_weights(&mut self, weights: FxHashMap<IdPair, f64>) {
        for (pair, weight) in weights {
            *self.weights.entry(pair).or_insert(0.0) += weight;
        }
    }

    fn accumulate(&mut self, ids: &[TokenId], window_size: usize) {
        for (i, &center) in ids.iter().enumerate() {
            let end = ids.len().min(i.saturating_add(window_size).saturating_add(1));
            for (j, &context) in ids.iter().enumerate().take(end).skip(i + 1) {
                self.add(center, context, 1.0 / (j - i) as f64);
            }
        }
    }

    /// Rows sorted by descending weight (ties by ascending id pair), optionally truncated.
    #[must_use]
    pub fn rows(&self, vocab: &TokenVocabulary, top_n: Option<usize>) -> Vec<CooccurrenceRow> {
        let mut sorted: Vec<(IdPair, f64)> = self.iter().collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = top_n {
            sorted.truncate(limit);
        }
        sorted
            .into_iter()
            .map(|((id_a, id_b), weight)| CooccurrenceRow {
                token_a: vocab.token(id_a).unwrap_or_default().to_owned(),
                token_b: vocab.token(id_b).unwrap_or_default().to_owned(),
                id_a,
                id_b,
                weight,
            })
            .collect()
    }

    /// Dense symmetric view over the `max_tokens` most frequent vocabulary tokens.
    #[must_use]
    pub fn dense(&self, vocab: &TokenVocabulary, max_tokens: usize) -> DenseMatrix {
        let ids = vocab.most_frequent(max_tokens);
        let values = ids
            .iter()
            .map(|&row| ids.iter().map(|&col| self.weight(row, col)).collect())
            .collect();
        let tokens = ids
            .iter()
            .map(|&id| vocab.token(id).unwrap_or_default().to_owned())
            .collect();
        DenseMatrix {
            tokens,
            ids,
            values,
        }
    }

    /// Shape and sparsity of the full `vocab_size × vocab_size` matrix this table represents.
    #[must_use]
    pub fn stats(&self, vocab_size: usize) -> MatrixStats {
        let non_zero: usize = self
            .weights
            .keys()
            .map(|&(a, b)| if a == b { 1 } else { 2 })
            .sum();
        let total = vocab_size * vocab_size;
        let sparsity = if total == 0 {
            100.0
        } else {
            (1.0 - non_zero as f64 / total as f64) * 100.0
        };
        MatrixStats {
            shape: (vocab_size, vocab_size),
            non_zero,
            sparsity,
        }
    }
}

fn ordered(a: TokenId, b: TokenId) -> IdPair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One exported co-occurrence entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooccurrenceRow {
    /// Token text of the smaller id.
    pub token_a: String,
    /// Token text of the larger id.
    pub token_b: String,
    /// Smaller id.
    pub id_a: TokenId,
    /// Larger id.
    pub id_b: TokenId,
    /// Accumulated weight.
    pub weight: f64,
}

/// Dense sub-matrix restricted to a subset of tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DenseMatrix {
    /// Row/column labels.
    pub tokens: Vec<String>,
    /// Row/column ids.
    pub ids: Vec<TokenId>,
    /// Square matrix of weights, `values[i][j] == values[j][i]`.
    pub values: Vec<Vec<f64>>,
}

/// Summary of the full co-occurrence matrix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MatrixStats {
    /// Rows and columns.
    pub shape: (usize, usize),
    /// Non-zero cells counting both triangles.
    pub non_zero: usize,
    /// Share of zero cells in percent.
    pub sparsity: f64,
}

/// Accumulates windowed co-occurrence weights across all `streams`, sequentially.
#[must_use]
pub fn compute<T, S>(
    streams: &[T],
    vocab: &TokenVocabulary,
    window_size: usize,
) -> CooccurrenceTable
where
    T: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut table = CooccurrenceTable::new();
    for stream in streams {
        let ids = vocab.encode_stream(stream.as_ref());
        table.accumulate(&ids, window_size);
    }
    table
}

/// Same result as [`compute`] up to float rounding, with one partial table per worker.
#[must_use]
pub fn compute_parallel<T, S>(
    streams: &[T],
    vocab: &TokenVocabulary,
    window_size: usize,
) -> CooccurrenceTable
where
    T: AsRef<[S]> + Sync,
    S: AsRef<str>,
{
    streams
        .par_iter()
        .fold(CooccurrenceTable::new, |mut table, stream| {
            let ids = vocab.encode_stream(stream.as_ref());
            table.accumulate(&ids, window_size);
            table
        })
        .reduce(CooccurrenceTable::new, |mut acc, partial| {
            acc.merge(partial);
            acc
        })
}

/// Everything derived from one co-occurrence pass over a set of token streams.
#[derive(Debug, Clone)]
pub struct CooccurrenceAnalysis {
    /// Vocabulary the table is keyed by.
    pub vocab: TokenVocabulary,
    /// Full sparse table.
    pub table: CooccurrenceTable,
    /// Heaviest pairs, truncated to the configured limit.
    pub rows: Vec<CooccurrenceRow>,
    /// Dense view over the most frequent tokens.
    pub dense: DenseMatrix,
    /// Shape and sparsity of the full matrix.
    pub stats: MatrixStats,
}

/// Builds the vocabulary and co-occurrence table for `streams` as configured by `cfg`.
pub fn analyze<T, S>(streams: &[T], cfg: &CooccurrenceConfig) -> Result<CooccurrenceAnalysis>
where
    T: AsRef<[S]> + Sync,
    S: AsRef<str>,
{
    cfg.validate()?;
    let vocab = TokenVocabulary::build(streams, cfg.min_count)?;
    info!(
        "vocabulary: {} token(s) with count >= {}",
        vocab.len(),
        cfg.min_count
    );
    let table = if cfg.parallel {
        compute_parallel(streams, &vocab, cfg.window_size)
    } else {
        compute(streams, &vocab, cfg.window_size)
    };
    let stats = table.stats(vocab.len());
    info!(
        "co-occurrence: {} pair(s), {:.2}% sparse",
        table.len(),
        stats.sparsity
    );
    let rows = table.rows(&vocab, cfg.top_pairs);
    let dense = table.dense(&vocab, cfg.dense_size);
    Ok(CooccurrenceAnalysis {
        vocab,
        table,
        rows,
        dense,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn vocab_of(streams: &[Vec<&str>]) -> TokenVocabulary {
        TokenVocabulary::build(streams, 1).unwrap()
    }

    #[test]
    fn three_tokens_window_two() {
        let streams = vec![vec!["x", "y", "z"]];
        let vocab = vocab_of(&streams);
        let table = compute(&streams, &vocab, 2);
        let (x, y, z) = (
            vocab.id("x").unwrap(),
            vocab.id("y").unwrap(),
            vocab.id("z").unwrap(),
        );
        assert_eq!(table.len(), 3);
        assert!(close(table.weight(x, y), 1.0));
        assert!(close(table.weight(x, z), 0.5));
        assert!(close(table.weight(y, z), 1.0));
    }

    #[test]
    fn window_one_only_weights_neighbours() {
        let streams = vec![vec!["a", "b", "c", "d"]];
        let vocab = vocab_of(&streams);
        let table = compute(&streams, &vocab, 1);
        assert_eq!(table.len(), 3);
        for (_, weight) in table.iter() {
            assert!(close(weight, 1.0));
        }
        assert_eq!(table.weight(0, 2), 0.0);
        assert_eq!(table.weight(0, 3), 0.0);
    }

    #[test]
    fn order_of_encounter_does_not_matter() {
        let forward = vec![vec!["a", "b"]];
        let backward = vec![vec!["b", "a"]];
        let vocab = vocab_of(&forward);
        let f = compute(&forward, &vocab, 3);
        let b = compute(&backward, &vocab, 3);
        assert_eq!(f, b);
        assert!(close(f.weight(1, 0), f.weight(0, 1)));
    }

    #[test]
    fn unknown_tokens_do_not_occupy_slots() {
        let training = vec![vec!["a", "b"]];
        let vocab = vocab_of(&training);
        let streams = vec![vec!["a", "N", "N", "b"]];
        let table = compute(&streams, &vocab, 1);
        assert!(close(table.weight(0, 1), 1.0));
    }

    #[test]
    fn repeated_token_accumulates_on_diagonal() {
        let streams = vec![vec!["a", "a", "b"]];
        let vocab = vocab_of(&streams);
        let table = compute(&streams, &vocab, 2);
        assert!(close(table.weight(0, 0), 1.0));
        assert!(close(table.weight(0, 1), 1.5));
        let stats = table.stats(vocab.len());
        assert_eq!(stats.shape, (2, 2));
        assert_eq!(stats.non_zero, 3);
        assert!(close(stats.sparsity, 25.0));
    }

    #[test]
    fn oversized_window_spans_whole_stream() {
        let streams = vec![vec!["x", "y", "z"]];
        let vocab = vocab_of(&streams);
        let bounded = compute(&streams, &vocab, 2);
        for table in [
            compute(&streams, &vocab, usize::MAX),
            compute_parallel(&streams, &vocab, usize::MAX),
        ] {
            assert_eq!(table.len(), bounded.len());
            for (pair, weight) in bounded.iter() {
                assert!(close(weight, table.weight(pair.0, pair.1)));
            }
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let streams: Vec<Vec<String>> = (0..64)
            .map(|i| {
                (0..40)
                    .map(|j| ["A", "CG", "T", "GGA", "C"][(i * 7 + j * 3) % 5].to_string())
                    .collect()
            })
            .collect();
        let vocab = TokenVocabulary::build(&streams, 1).unwrap();
        let sequential = compute(&streams, &vocab, 4);
        let parallel = compute_parallel(&streams, &vocab, 4);
        assert_eq!(sequential.len(), parallel.len());
        for (pair, weight) in sequential.iter() {
            assert!(close(weight, parallel.weight(pair.0, pair.1)));
        }
    }

    #[test]
    fn rows_sort_by_weight_and_truncate() {
        let streams = vec![vec!["x", "y", "z"]];
        let vocab = vocab_of(&streams);
        let table = compute(&streams, &vocab, 2);
        let rows = table.rows(&vocab, Some(2));
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].token_a.as_str(), rows[0].token_b.as_str()), ("x", "y"));
        assert_eq!((rows[1].token_a.as_str(), rows[1].token_b.as_str()), ("y", "z"));
        let all = table.rows(&vocab, None);
        assert!(close(all[2].weight, 0.5));
    }

    #[test]
    fn dense_view_is_symmetric() {
        let streams = vec![vec!["x", "y", "z", "y"]];
        let vocab = vocab_of(&streams);
        let table = compute(&streams, &vocab, 2);
        let dense = table.dense(&vocab, 2);
        assert_eq!(dense.tokens, ["y", "x"]);
        assert!(close(dense.values[0][1], dense.values[1][0]));
        assert!(close(dense.values[0][1], 1.0));
    }

    #[test]
    fn analyze_applies_config() {
        let streams = vec![vec!["x", "y", "z"], vec!["x", "y"]];
        let cfg = CooccurrenceConfig::builder()
            .window_size(2)
            .min_count(2)
            .top_pairs(Some(5))
            .dense_size(1)
            .parallel(true)
            .build()
            .unwrap();
        let analysis = analyze(&streams, &cfg).unwrap();
        assert_eq!(analysis.vocab.tokens(), ["x", "y"]);
        assert_eq!(analysis.rows.len(), 1);
        assert!(close(analysis.rows[0].weight, 2.0));
        assert_eq!(analysis.dense.tokens, ["x"]);
        assert_eq!(analysis.stats.non_zero, 2);
    }

    #[test]
    fn empty_vocabulary_is_fully_sparse() {
        let table = CooccurrenceTable::new();
        let stats = table.stats(0);
        assert_eq!(stats.non_zero, 0);
        assert!(close(stats.sparsity, 100.0));
        assert!(close(table.total_weight(), 0.0));
    }
}
