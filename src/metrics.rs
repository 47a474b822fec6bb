//! Metrics describing training runs and the token streams they produce.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Reason a training run terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of merges was learned.
    MaxMergesReached,
    /// No adjacent pairs remained anywhere in the training state.
    PairsExhausted,
}

/// Metrics captured for each merge iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationMetrics {
    /// Sequential iteration number (1-indexed).
    pub iteration: usize,
    /// Aggregate frequency of the selected pair.
    pub best_frequency: usize,
    /// Occurrences replaced across distinct training entries (not weighted by frequency).
    pub merges_applied: usize,
    /// Count of distinct pairs remaining after the iteration.
    pub distinct_pairs: usize,
    /// Execution time for the iteration.
    pub elapsed_iteration: Duration,
    /// Total time elapsed since training started.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics produced by a training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Number of distinct framed sequences after collapsing duplicates.
    pub distinct_entries: usize,
    /// Per-iteration snapshots accrued during training.
    pub iterations: Vec<IterationMetrics>,
    /// Total duration of the training session.
    pub total_duration: Duration,
    /// Reason training terminated.
    pub stop_reason: StopReason,
}

impl TrainingMetrics {
    /// Creates an empty metrics container with pre-allocated capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            distinct_entries: 0,
            iterations: Vec::with_capacity(capacity),
            total_duration: Duration::ZERO,
            stop_reason: StopReason::MaxMergesReached,
        }
    }
}

/// Ratio of raw characters to emitted tokens, `0.0` when no tokens were emitted.
#[must_use]
pub fn compression_ratio(original_chars: usize, tokens: usize) -> f64 {
    if tokens == 0 {
        0.0
    } else {
        original_chars as f64 / tokens as f64
    }
}

/// Corpus-wide totals for an encoding pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EncodingSummary {
    /// Number of encoded sequences.
    pub sequences: usize,
    /// Characters across all raw sequences.
    pub original_chars: usize,
    /// Tokens across all encoded streams, sentinels included.
    pub encoded_tokens: usize,
}

impl EncodingSummary {
    /// Accumulates one raw sequence and its token stream.
    pub fn record(&mut self, sequence: &str, tokens: usize) {
        self.sequences += 1;
        self.original_chars += sequence.chars().count();
        self.encoded_tokens += tokens;
    }

    /// Average compression ratio over the whole corpus.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.original_chars, self.encoded_tokens)
    }
}

/// Marginal frequency of a single token across a set of streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenFrequency {
    /// Token text.
    pub token: String,
    /// Number of occurrences.
    pub count: usize,
    /// Share of all token occurrences in `[0, 1]`.
    pub frequency: f64,
}

impl TokenFrequency {
    /// Share of all token occurrences as a percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.frequency * 100.0
    }
}

/// Counts every token across `streams`, most frequent first (ties by token text).
#[must_use]
pub fn marginal_frequencies<T, S>(streams: &[T]) -> Vec<TokenFrequency>
where
    T: AsRef<[S]>,
    S: AsRef<str>,
{
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    let mut total = 0usize;
    for stream in streams {
        for token in stream.as_ref() {
            *counts.entry(token.as_ref()).or_insert(0) += 1;
            total += 1;
        }
    }
    let mut stats: Vec<TokenFrequency> = counts
        .into_iter()
        .map(|(token, count)| TokenFrequency {
            token: token.to_owned(),
            count,
            frequency: if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            },
        })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.token.cmp(&b.token)));
    stats
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
