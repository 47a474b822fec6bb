//! Dense token ids over the tokens observed in a set of token streams.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqBpeError};

/// Dense identifier assigned to a surviving vocabulary token.
pub type TokenId = u32;

/// Bidirectional token ↔ id mapping filtered by a minimum count.
///
/// Ids follow the lexicographic order of the surviving tokens, so two builds over the same
/// filtered set agree on every id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenVocabulary {
    token_to_id: FxHashMap<String, TokenId>,
    id_to_token: Vec<String>,
    counts: FxHashMap<String, usize>,
    min_count: usize,
}

impl TokenVocabulary {
    /// Counts every token across `streams` and keeps those seen at least `min_count` times.
    pub fn build<T, S>(streams: &[T], min_count: usize) -> Result<Self>
    where
        T: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        for stream in streams {
            for token in stream.as_ref() {
                let token = token.as_ref();
                match counts.get_mut(token) {
                    Some(count) => *count += 1,
                    None => {
                        counts.insert(token.to_owned(), 1);
                    }
                }
            }
        }
        Self::from_counts(counts, min_count)
    }

    /// Builds the vocabulary from precomputed raw counts.
    pub fn from_counts(counts: FxHashMap<String, usize>, min_count: usize) -> Result<Self> {
        let mut id_to_token: Vec<String> = counts
            .iter()
            .filter(|(_, &count)| count >= min_count)
            .map(|(token, _)| token.clone())
            .collect();
        id_to_token.sort_unstable();
        let token_to_id = id_to_token
            .iter()
            .enumerate()
            .map(|(idx, token)| {
                TokenId::try_from(idx)
                    .map(|id| (token.clone(), id))
                    .map_err(|_| SeqBpeError::Internal("vocabulary size exceeded u32::MAX".into()))
            })
            .collect::<Result<FxHashMap<_, _>>>()?;
        Ok(Self {
            token_to_id,
            id_to_token,
            counts,
            min_count,
        })
    }

    /// Id of `token`, if it survived filtering.
    #[must_use]
    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.token_to_id.get(token).copied()
    }

    /// Token text for `id`.
    #[must_use]
    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Surviving tokens in id order.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.id_to_token
    }

    /// Number of surviving tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// Returns true when no token met the threshold.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// Raw occurrence count of `token`, including filtered tokens.
    #[must_use]
    pub fn count(&self, token: &str) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Raw (pre-filter) counts of every observed token.
    #[must_use]
    pub fn counts(&self) -> &FxHashMap<String, usize> {
        &self.counts
    }

    /// Threshold used to build the vocabulary.
    #[must_use]
    pub fn min_count(&self) -> usize {
        self.min_count
    }

    /// Maps a token stream to ids, silently dropping tokens outside the vocabulary.
    #[must_use]
    pub fn encode_stream<S: AsRef<str>>(&self, stream: &[S]) -> Vec<TokenId> {
        stream
            .iter()
            .filter_map(|token| self.id(token.as_ref()))
            .collect()
    }

    /// Ids of up to `k` vocabulary tokens with the highest raw counts (ties by token text).
    #[must_use]
    pub fn most_frequent(&self, k: usize) -> Vec<TokenId> {
        let mut ranked: Vec<(usize, &str, TokenId)> = self
            .id_to_token
            .iter()
            .zip(0..)
            .map(|(token, id)| (self.count(token), token.as_str(), id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        ranked.into_iter().take(k).map(|(_, _, id)| id).collect()
    }

    /// Snapshot suitable for persisting next to co-occurrence output.
    #[must_use]
    pub fn artifact(&self, window_size: usize) -> VocabularyArtifact {
        VocabularyArtifact {
            token_to_id: self
                .token_to_id
                .iter()
                .map(|(token, &id)| (token.clone(), id))
                .collect(),
            id_to_token: self
                .id_to_token
                .iter()
                .zip(0..)
                .map(|(token, id)| (id, token.clone()))
                .collect(),
            token_counts: self
                .counts
                .iter()
                .map(|(token, &count)| (token.clone(), count))
                .collect(),
            vocab_size: self.len(),
            window_size,
            min_count: self.min_count,
        }
    }

    /// Rebuilds the vocabulary from a persisted artifact.
    ///
    /// Ids are recomputed from the stored counts and threshold and must agree with the stored
    /// mapping.
    pub fn from_artifact(artifact: &VocabularyArtifact) -> Result<Self> {
        let counts: FxHashMap<String, usize> = artifact
            .token_counts
            .iter()
            .map(|(token, &count)| (token.clone(), count))
            .collect();
        let vocab = Self::from_counts(counts, artifact.min_count)?;
        let consistent = vocab.len() == artifact.vocab_size
            && vocab.len() == artifact.token_to_id.len()
            && artifact
                .token_to_id
                .iter()
                .all(|(token, &id)| vocab.id(token) == Some(id));
        if !consistent {
            return Err(SeqBpeError::InvalidConfig(
                "vocabulary artifact ids do not match its counts and min_count".into(),
            ));
        }
        Ok(vocab)
    }
}

/// Serialisable record of a vocabulary and the settings used to build and apply it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VocabularyArtifact {
    /// Token text to id.
    pub token_to_id: BTreeMap<String, TokenId>,
    /// Id to token text.
    pub id_to_token: BTreeMap<TokenId, String>,
    /// Raw counts of every observed token, filtered or not.
    pub token_counts: BTreeMap<String, usize>,
    /// Number of surviving tokens.
    pub vocab_size: usize,
    /// Co-occurrence window the vocabulary was used with.
    pub window_size: usize,
    /// Minimum count threshold.
    pub min_count: usize,
}
