use crate::symbol::{Pair, SymbolId};

/// Outcome of merging a specific pair within a [`Word`].
#[derive(Debug, Default)]
pub(crate) struct MergeOutcome {
    /// Number of pair occurrences replaced inside the word.
    pub merges: usize,
    /// Pair count deltas emitted by the merge. Negative values represent removals,
    /// positive values represent newly formed adjacent pairs.
    pub deltas: Vec<(Pair, i64)>,
}

/// Token list of a single framed sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct Word {
    symbols: Vec<SymbolId>,
}

impl Word {
    pub(crate) fn from_symbols(symbols: Vec<SymbolId>) -> Self {
        Self { symbols }
    }

    pub(crate) fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }

    /// Returns true when the word contains at least two symbols.
    pub(crate) fn has_pairs(&self) -> bool {
        self.symbols.len() >= 2
    }

    /// Invokes the provided closure for each adjacent symbol pair.
    pub(crate) fn for_each_pair<F>(&self, mut f: F)
    where
        F: FnMut(Pair),
    {
        for window in self.symbols.windows(2) {
            f((window[0], window[1]));
        }
    }

    /// Replaces every left-to-right, non-overlapping occurrence of `pair` with `replacement`
    /// and reports how the adjacent pair counts of this word changed.
    pub(crate) fn merge(&mut self, pair: Pair, replacement: SymbolId) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        self.compact(pair, replacement, |prev, next| {
            if let Some(prev) = prev {
                outcome.deltas.push(((prev, pair.0), -1));
            }
            outcome.deltas.push((pair, -1));
            if let Some(next) = next {
                outcome.deltas.push(((pair.1, next), -1));
            }
            if let Some(prev) = prev {
                outcome.deltas.push(((prev, replacement), 1));
            }
            if let Some(next) = next {
                outcome.deltas.push(((replacement, next), 1));
            }
            outcome.merges += 1;
        });
        outcome
    }

    /// Same replacement as [`Word::merge`] without delta bookkeeping.
    pub(crate) fn replace(&mut self, pair: Pair, replacement: SymbolId) -> usize {
        let mut merges = 0usize;
        self.compact(pair, replacement, |_, _| merges += 1);
        merges
    }

    /// Single in-place pass; `on_merge` receives the neighbours of each replaced occurrence
    /// as they look at that moment (the left neighbour may itself be a fresh replacement).
    fn compact<F>(&mut self, pair: Pair, replacement: SymbolId, mut on_merge: F)
    where
        F: FnMut(Option<SymbolId>, Option<SymbolId>),
    {
        let original_len = self.symbols.len();
        if original_len < 2 {
            return;
        }

        let mut read = 0usize;
        let mut write = 0usize;
        while read < original_len {
            if read + 1 < original_len
                && self.symbols[read] == pair.0
                && self.symbols[read + 1] == pair.1
            {
                let prev = if write > 0 {
                    Some(self.symbols[write - 1])
                } else {
                    None
                };
                let next = if read + 2 < original_len {
                    Some(self.symbols[read + 2])
                } else {
                    None
                };
                on_merge(prev, next);
                self.symbols[write] = replacement;
                write += 1;
                read += 2;
            } else {
                if write != read {
                    self.symbols[write] = self.symbols[read];
                }
                write += 1;
                read += 1;
            }
        }
        self.symbols.truncate(write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn net(deltas: &[(Pair, i64)]) -> FxHashMap<Pair, i64> {
        let mut out = FxHashMap::default();
        for &(pair, delta) in deltas {
            *out.entry(pair).or_insert(0) += delta;
        }
        out.retain(|_, delta| *delta != 0);
        out
    }

    #[test]
    fn merge_replaces_all_pairs() {
        let mut word = Word::from_symbols(vec![1, 2, 1, 2, 3]);
        assert!(word.has_pairs());
        let result = word.merge((1, 2), 99);
        assert_eq!(result.merges, 2);
        assert_eq!(word.symbols(), &[99, 99, 3]);
        assert!(result.deltas.contains(&((1, 2), -1)));
    }

    #[test]
    fn merge_of_run_is_left_to_right() {
        let mut word = Word::from_symbols(vec![1, 1, 1]);
        let outcome = word.merge((1, 1), 7);
        assert_eq!(outcome.merges, 1);
        assert_eq!(word.symbols(), &[7, 1]);
        let deltas = net(&outcome.deltas);
        assert_eq!(deltas.get(&(1, 1)), Some(&-2));
        assert_eq!(deltas.get(&(7, 1)), Some(&1));
    }

    #[test]
    fn merge_deltas_match_recount() {
        let mut word = Word::from_symbols(vec![1, 1, 1, 1, 5]);
        let mut before = FxHashMap::default();
        word.for_each_pair(|pair| *before.entry(pair).or_insert(0i64) += 1);
        let outcome = word.merge((1, 1), 9);
        let mut after = FxHashMap::default();
        word.for_each_pair(|pair| *after.entry(pair).or_insert(0i64) += 1);

        let mut expected = after.clone();
        for (pair, count) in before {
            *expected.entry(pair).or_insert(0) -= count;
        }
        expected.retain(|_, delta| *delta != 0);
        assert_eq!(net(&outcome.deltas), expected);
        assert_eq!(word.symbols(), &[9, 9, 5]);
    }

    #[test]
    fn replace_ignores_absent_pair() {
        let mut word = Word::from_symbols(vec![1, 2, 3]);
        assert_eq!(word.replace((3, 1), 4), 0);
        assert_eq!(word.symbols().len(), 3);
    }

    #[test]
    fn enumerate_pairs_in_order() {
        let word = Word::from_symbols(vec![1, 2, 3]);
        let mut collected = Vec::new();
        word.for_each_pair(|pair| collected.push(pair));
        assert_eq!(collected, vec![(1, 2), (2, 3)]);
    }
}
