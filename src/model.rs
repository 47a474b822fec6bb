//! Merge rules, trained models, and the replaying tokenizer.

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::BoundaryStyle;
use crate::error::{Result, SeqBpeError};
use crate::serialization::{load_model, model_json, save_model};
use crate::symbol::{Pair, SymbolId, SymbolTable};
use crate::trainer::word::Word;

/// A learned `(left, right) -> left + right` substitution.
///
/// Serialises as a two-element array so persisted rule lists read `[["A", "C"], ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct MergeRule {
    /// Left-hand symbol.
    pub left: String,
    /// Right-hand symbol.
    pub right: String,
}

impl MergeRule {
    /// Creates a rule from its two symbols.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// The symbol minted by this rule.
    #[must_use]
    pub fn merged(&self) -> String {
        let mut merged = String::with_capacity(self.left.len() + self.right.len());
        merged.push_str(&self.left);
        merged.push_str(&self.right);
        merged
    }
}

impl From<(String, String)> for MergeRule {
    fn from((left, right): (String, String)) -> Self {
        Self { left, right }
    }
}

impl From<MergeRule> for (String, String) {
    fn from(rule: MergeRule) -> Self {
        (rule.left, rule.right)
    }
}

impl fmt::Display for MergeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' + '{}' -> '{}'", self.left, self.right, self.merged())
    }
}

/// Trained model: the ordered merge list plus the framing it was learned with.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpeModel {
    boundary: BoundaryStyle,
    merges: Vec<MergeRule>,
}

impl BpeModel {
    /// Constructs a model from rules in learned order.
    pub fn new(merges: Vec<MergeRule>, boundary: BoundaryStyle) -> Self {
        Self { boundary, merges }
    }

    /// Returns the merge rules in learned order.
    #[must_use]
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// Consumes the model, returning its rules.
    #[must_use]
    pub fn into_merges(self) -> Vec<MergeRule> {
        self.merges
    }

    /// Returns the framing applied before replaying rules.
    #[must_use]
    pub fn boundary(&self) -> BoundaryStyle {
        self.boundary
    }

    /// Builds a reusable [`MergeTokenizer`] for this model.
    #[must_use]
    pub fn tokenizer(&self) -> MergeTokenizer {
        MergeTokenizer::new(&self.merges, self.boundary)
    }

    /// Encodes one raw sequence; convenience wrapper around [`BpeModel::tokenizer`].
    #[must_use]
    pub fn encode(&self, sequence: &str) -> Vec<String> {
        self.tokenizer().encode(sequence)
    }

    /// Creates a derived model keeping only the first `merges` rules.
    pub fn truncated(&self, merges: usize) -> Result<Self> {
        if merges > self.merges.len() {
            return Err(SeqBpeError::InvalidConfig(format!(
                "requested {merges} merges but the model only has {}",
                self.merges.len()
            )));
        }
        Ok(Self::new(self.merges[..merges].to_vec(), self.boundary))
    }

    /// Serialises the model to disk as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<()> {
        save_model(self, path, pretty)
    }

    /// Loads a model previously written by [`BpeModel::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_model(path)
    }

    /// Serialises the model to a JSON string.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        model_json(self, pretty)
    }
}

/// Compiled rule list that replays merges on arbitrary sequences.
///
/// Rule symbols are interned once at construction. Symbols met only at encode time (residues
/// never seen in training) get handles past the end of the table and therefore never match.
#[derive(Debug, Clone)]
pub struct MergeTokenizer {
    symbols: SymbolTable,
    rules: Vec<(Pair, SymbolId)>,
    boundary: BoundaryStyle,
}

impl MergeTokenizer {
    /// Compiles `rules` for sequences framed with `boundary`.
    #[must_use]
    pub fn new(rules: &[MergeRule], boundary: BoundaryStyle) -> Self {
        let mut symbols = SymbolTable::new();
        let compiled = rules
            .iter()
            .map(|rule| {
                let left = symbols.intern(&rule.left);
                let right = symbols.intern(&rule.right);
                let merged = symbols.intern_concat(left, right);
                ((left, right), merged)
            })
            .collect();
        Self {
            symbols,
            rules: compiled,
            boundary,
        }
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when no rules are compiled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Framing used by [`MergeTokenizer::encode`].
    #[must_use]
    pub fn boundary(&self) -> BoundaryStyle {
        self.boundary
    }

    /// Frames `sequence` and replays every rule in order.
    #[must_use]
    pub fn encode(&self, sequence: &str) -> Vec<String> {
        self.encode_prefix(sequence, self.rules.len())
    }

    /// Frames `sequence` and replays only the first `limit` rules.
    #[must_use]
    pub fn encode_prefix(&self, sequence: &str, limit: usize) -> Vec<String> {
        let mut local = LocalSymbols::new(&self.symbols);
        let mut word = Word::from_symbols(local.frame(sequence, self.boundary));
        for &(pair, merged) in self.rules.iter().take(limit) {
            if !word.has_pairs() {
                break;
            }
            word.replace(pair, merged);
        }
        word.symbols()
            .iter()
            .map(|&id| local.resolve(id).to_owned())
            .collect()
    }
}

/// Replays `rules` on `sequence` using the default [`BoundaryStyle`].
#[must_use]
pub fn apply(sequence: &str, rules: &[MergeRule]) -> Vec<String> {
    MergeTokenizer::new(rules, BoundaryStyle::default()).encode(sequence)
}

/// Read-only view of a shared table extended with symbols local to one encode call.
struct LocalSymbols<'a> {
    base: &'a SymbolTable,
    extra: Vec<String>,
    extra_ids: FxHashMap<String, SymbolId>,
}

impl<'a> LocalSymbols<'a> {
    fn new(base: &'a SymbolTable) -> Self {
        Self {
            base,
            extra: Vec::new(),
            extra_ids: FxHashMap::default(),
        }
    }

    fn lookup(&mut self, symbol: &str) -> SymbolId {
        if let Some(id) = self.base.get(symbol) {
            return id;
        }
        if let Some(&id) = self.extra_ids.get(symbol) {
            return id;
        }
        let id = self.base.len() + self.extra.len();
        self.extra.push(symbol.to_owned());
        self.extra_ids.insert(symbol.to_owned(), id);
        id
    }

    fn frame(&mut self, sequence: &str, boundary: BoundaryStyle) -> Vec<SymbolId> {
        crate::symbol::frame(sequence, boundary)
            .iter()
            .map(|symbol| self.lookup(symbol))
            .collect()
    }

    fn resolve(&self, id: SymbolId) -> &str {
        if id < self.base.len() {
            self.base.resolve(id)
        } else {
            &self.extra[id - self.base.len()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::unframe;

    fn rules(pairs: &[(&str, &str)]) -> Vec<MergeRule> {
        pairs.iter().map(|&(l, r)| MergeRule::new(l, r)).collect()
    }

    #[test]
    fn apply_replays_in_order() {
        let rules = rules(&[("A", "A"), ("AA", "A")]);
        assert_eq!(apply("AAAAA", &rules), ["<s>", "AA", "AAA", "</s>"]);
    }

    #[test]
    fn order_is_load_bearing() {
        let forward = rules(&[("A", "C"), ("AC", "G")]);
        let reversed = rules(&[("AC", "G"), ("A", "C")]);
        assert_eq!(apply("ACG", &forward), ["<s>", "ACG", "</s>"]);
        assert_eq!(apply("ACG", &reversed), ["<s>", "AC", "G", "</s>"]);
    }

    #[test]
    fn unseen_symbols_pass_through() {
        let tokenizer = MergeTokenizer::new(&rules(&[("A", "C")]), BoundaryStyle::EndOfWord);
        assert_eq!(tokenizer.encode("NACN"), ["N", "AC", "N", "</w>"]);
        assert_eq!(tokenizer.encode(""), ["</w>"]);
    }

    #[test]
    fn merged_text_never_matches_as_substring() {
        // "AC" inside "GAC" must not be merged with a following "G" by rule (AC, G).
        let tokenizer = MergeTokenizer::new(
            &rules(&[("G", "A"), ("GA", "C"), ("AC", "G")]),
            BoundaryStyle::None,
        );
        assert_eq!(tokenizer.encode("GACG"), ["GAC", "G"]);
    }

    #[test]
    fn prefixes_refine_monotonically() {
        let rules = rules(&[("A", "C"), ("G", "T"), ("AC", "GT"), ("ACGT", "</s>")]);
        let tokenizer = MergeTokenizer::new(&rules, BoundaryStyle::Sentinels);
        let mut previous = usize::MAX;
        for limit in 0..=rules.len() {
            let tokens = tokenizer.encode_prefix("ACGTACGT", limit);
            assert!(tokens.len() <= previous);
            assert_eq!(unframe(&tokens, BoundaryStyle::Sentinels), "ACGTACGT");
            previous = tokens.len();
        }
        assert_eq!(previous, 3);
    }

    #[test]
    fn truncated_model_keeps_prefix() {
        let model = BpeModel::new(rules(&[("A", "C"), ("AC", "G")]), BoundaryStyle::Sentinels);
        let prefix = model.truncated(1).expect("prefix");
        assert_eq!(prefix.merges(), &model.merges()[..1]);
        assert!(model.truncated(3).is_err());
    }

    #[test]
    fn rules_serialize_as_pairs() {
        let model = BpeModel::new(rules(&[("A", "</s>")]), BoundaryStyle::Sentinels);
        let json = model.to_json(false).expect("json");
        assert_eq!(json, r#"{"boundary":"sentinels","merges":[["A","</s>"]]}"#);
    }

    #[test]
    fn rule_display_shows_merge() {
        assert_eq!(MergeRule::new("A", "C").to_string(), "'A' + 'C' -> 'AC'");
    }
}
