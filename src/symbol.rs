//! Symbol interning and sequence framing.
//!
//! Every merge mints a new symbol that is the concatenation of two existing ones. Symbols are
//! interned once into a [`SymbolTable`] and referenced by dense [`SymbolId`] handles, so pairs
//! hash and compare as two integers however long the merged text grows.

use rustc_hash::FxHashMap;

use crate::config::BoundaryStyle;

/// Dense handle referencing an interned symbol.
pub type SymbolId = usize;
/// Adjacent symbol pair encoded as `(left, right)` handles.
pub type Pair = (SymbolId, SymbolId);

/// Bidirectional interner mapping symbol text to [`SymbolId`] handles.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    ids: FxHashMap<String, SymbolId>,
    symbols: Vec<String>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `symbol`, interning it on first use.
    pub fn intern(&mut self, symbol: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(symbol) {
            return id;
        }
        let id = self.symbols.len();
        self.symbols.push(symbol.to_owned());
        self.ids.insert(symbol.to_owned(), id);
        id
    }

    /// Interns the concatenation of two existing symbols.
    pub fn intern_concat(&mut self, left: SymbolId, right: SymbolId) -> SymbolId {
        let (l, r) = (&self.symbols[left], &self.symbols[right]);
        let mut merged = String::with_capacity(l.len() + r.len());
        merged.push_str(l);
        merged.push_str(r);
        self.intern(&merged)
    }

    /// Looks up an already interned symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SymbolId> {
        self.ids.get(symbol).copied()
    }

    /// Returns the text behind `id`, or `None` when this table never issued it.
    #[must_use]
    pub fn text(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get(id).map(String::as_str)
    }

    /// Text of a handle issued by this table.
    pub(crate) fn resolve(&self, id: SymbolId) -> &str {
        &self.symbols[id]
    }

    /// Number of distinct interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true when nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Splits `sequence` into single-character symbols wrapped in the markers of `boundary`.
    pub fn frame(&mut self, sequence: &str, boundary: BoundaryStyle) -> Vec<SymbolId> {
        let mut framed = Vec::with_capacity(sequence.len() + 2);
        if let Some(start) = boundary.start_marker() {
            framed.push(self.intern(start));
        }
        let mut buf = [0u8; 4];
        for ch in sequence.chars() {
            framed.push(self.intern(ch.encode_utf8(&mut buf)));
        }
        if let Some(end) = boundary.end_marker() {
            framed.push(self.intern(end));
        }
        framed
    }
}

/// Frames `sequence` as owned strings without interning.
#[must_use]
pub fn frame(sequence: &str, boundary: BoundaryStyle) -> Vec<String> {
    let mut framed = Vec::with_capacity(sequence.len() + 2);
    framed.extend(boundary.start_marker().map(str::to_owned));
    framed.extend(sequence.chars().map(String::from));
    framed.extend(boundary.end_marker().map(str::to_owned));
    framed
}

/// Concatenates a token stream and strips the framing markers, recovering the raw sequence.
#[must_use]
pub fn unframe<S: AsRef<str>>(tokens: &[S], boundary: BoundaryStyle) -> String {
    let joined: String = tokens.iter().map(AsRef::as_ref).collect();
    let mut text = joined.as_str();
    if let Some(start) = boundary.start_marker() {
        text = text.strip_prefix(start).unwrap_or(text);
    }
    if let Some(end) = boundary.end_marker() {
        text = text.strip_suffix(end).unwrap_or(text);
    }
    text.to_owned()
}
