//! Configuration builders controlling training, co-occurrence analysis, and corpus ingestion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqBpeError};

/// Marker inserted before each framed sequence in [`BoundaryStyle::Sentinels`] mode.
pub const SEQUENCE_START: &str = "<s>";
/// Marker appended to each framed sequence in [`BoundaryStyle::Sentinels`] mode.
pub const SEQUENCE_END: &str = "</s>";
/// Marker appended to each framed word in [`BoundaryStyle::EndOfWord`] mode.
pub const WORD_END: &str = "</w>";

/// How raw sequences are framed with sentinel symbols before learning and encoding.
///
/// Sentinels are ordinary symbols as far as merging is concerned, so the end marker may be
/// merged into the last residue (`A</s>`), but no pair can ever span two sequences.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStyle {
    /// `<s>` before and `</s>` after every sequence.
    #[default]
    Sentinels,
    /// `</w>` after every sequence, nothing before.
    EndOfWord,
    /// No framing at all.
    None,
}

impl BoundaryStyle {
    /// Marker placed before the first symbol, if any.
    #[must_use]
    pub fn start_marker(self) -> Option<&'static str> {
        match self {
            Self::Sentinels => Some(SEQUENCE_START),
            Self::EndOfWord | Self::None => None,
        }
    }

    /// Marker placed after the last symbol, if any.
    #[must_use]
    pub fn end_marker(self) -> Option<&'static str> {
        match self {
            Self::Sentinels => Some(SEQUENCE_END),
            Self::EndOfWord => Some(WORD_END),
            Self::None => None,
        }
    }
}

impl fmt::Display for BoundaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sentinels => "sentinels",
            Self::EndOfWord => "end-of-word",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Configuration for greedy merge learning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerConfig {
    /// Upper bound on learned merge rules; training may stop earlier when pairs run out.
    pub num_merges: usize,
    /// Framing applied to every training sequence.
    pub boundary: BoundaryStyle,
    /// Enables periodic progress logging through the `log` facade.
    pub show_progress: bool,
    /// Number of merges between two progress log lines.
    pub progress_interval: usize,
}

impl TrainerConfig {
    /// Returns a builder initialised with [`TrainerConfig::default`].
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Validates the invariants required for training.
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval == 0 {
            return Err(SeqBpeError::InvalidConfig(
                "progress_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_merges: 1000,
            boundary: BoundaryStyle::default(),
            show_progress: true,
            progress_interval: 100,
        }
    }
}

/// Builder for [`TrainerConfig`].
#[derive(Debug, Default, Clone)]
pub struct TrainerBuilder {
    cfg: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder with [`TrainerConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of merges to learn.
    #[must_use]
    pub fn num_merges(mut self, value: usize) -> Self {
        self.cfg.num_merges = value;
        self
    }

    /// Sets the sequence framing.
    #[must_use]
    pub fn boundary(mut self, value: BoundaryStyle) -> Self {
        self.cfg.boundary = value;
        self
    }

    /// Enables or disables progress logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Sets how many merges pass between progress log lines.
    #[must_use]
    pub fn progress_interval(mut self, value: usize) -> Self {
        self.cfg.progress_interval = value;
        self
    }

    /// Finalises the builder, returning a validated [`TrainerConfig`].
    pub fn build(self) -> Result<TrainerConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration for vocabulary filtering and windowed co-occurrence statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CooccurrenceConfig {
    /// Maximum positional distance (in filtered tokens) that still counts as co-occurring.
    pub window_size: usize,
    /// Tokens seen fewer times than this are excluded from the vocabulary.
    pub min_count: usize,
    /// Keep only the heaviest N pairs when exporting; `None` keeps every pair.
    pub top_pairs: Option<usize>,
    /// Number of most frequent tokens included in the dense matrix view.
    pub dense_size: usize,
    /// Accumulates per-worker partial tables with rayon.
    pub parallel: bool,
}

impl CooccurrenceConfig {
    /// Returns a builder initialised with [`CooccurrenceConfig::default`].
    #[must_use]
    pub fn builder() -> CooccurrenceBuilder {
        CooccurrenceBuilder::default()
    }

    /// Validates the invariants required for co-occurrence analysis.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(SeqBpeError::InvalidConfig(
                "window_size must be greater than zero".into(),
            ));
        }
        if self.min_count == 0 {
            return Err(SeqBpeError::InvalidConfig(
                "min_count must be greater than zero".into(),
            ));
        }
        if self.top_pairs == Some(0) {
            return Err(SeqBpeError::InvalidConfig(
                "top_pairs must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CooccurrenceConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            min_count: 1,
            top_pairs: Some(10_000),
            dense_size: 50,
            parallel: false,
        }
    }
}

/// Builder for [`CooccurrenceConfig`].
#[derive(Debug, Default, Clone)]
pub struct CooccurrenceBuilder {
    cfg: CooccurrenceConfig,
}

impl CooccurrenceBuilder {
    /// Creates a builder with [`CooccurrenceConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context window size.
    #[must_use]
    pub fn window_size(mut self, value: usize) -> Self {
        self.cfg.window_size = value;
        self
    }

    /// Sets the minimum token count.
    #[must_use]
    pub fn min_count(mut self, value: usize) -> Self {
        self.cfg.min_count = value;
        self
    }

    /// Limits exported pairs to the heaviest `value` entries.
    #[must_use]
    pub fn top_pairs(mut self, value: Option<usize>) -> Self {
        self.cfg.top_pairs = value;
        self
    }

    /// Sets the dense matrix size.
    #[must_use]
    pub fn dense_size(mut self, value: usize) -> Self {
        self.cfg.dense_size = value;
        self
    }

    /// Enables or disables parallel accumulation.
    #[must_use]
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.cfg.parallel = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`CooccurrenceConfig`].
    pub fn build(self) -> Result<CooccurrenceConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration controlling how sequence files are discovered and read from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Enables recursive directory traversal.
    pub recursive: bool,
    /// Follows symlinks encountered during traversal.
    pub follow_symlinks: bool,
    /// Uppercases sequence residues while parsing.
    pub uppercase: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_symlinks: false,
            uppercase: false,
        }
    }
}

impl IngestConfig {
    /// Returns a builder initialised with [`IngestConfig::default`].
    #[must_use]
    pub fn builder() -> IngestBuilder {
        IngestBuilder::default()
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug, Default, Clone)]
pub struct IngestBuilder {
    cfg: IngestConfig,
}

impl IngestBuilder {
    /// Creates a new builder with [`IngestConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables recursive directory traversal.
    #[must_use]
    pub fn recursive(mut self, enabled: bool) -> Self {
        self.cfg.recursive = enabled;
        self
    }

    /// Enables or disables following of symlinks when traversing directories.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.cfg.follow_symlinks = enabled;
        self
    }

    /// Enables or disables uppercasing of residues.
    #[must_use]
    pub fn uppercase(mut self, enabled: bool) -> Self {
        self.cfg.uppercase = enabled;
        self
    }

    /// Finalises the builder, returning the [`IngestConfig`].
    pub fn build(self) -> IngestConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accepts_zero_merges() {
        let cfg = TrainerConfig::builder()
            .num_merges(0)
            .show_progress(false)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.num_merges, 0);
        assert_eq!(cfg.boundary, BoundaryStyle::Sentinels);
    }

    #[test]
    fn validate_rejects_zero_progress_interval() {
        let cfg = TrainerConfig {
            progress_interval: 0,
            ..TrainerConfig::default()
        };
        let err = cfg.validate().expect_err("validation should fail");
        assert!(matches!(
            err,
            SeqBpeError::InvalidConfig(message) if message.contains("progress_interval")
        ));
    }

    #[test]
    fn cooccurrence_builder_rejects_zero_window() {
        let err = CooccurrenceConfig::builder()
            .window_size(0)
            .build()
            .expect_err("zero window is invalid");
        assert!(matches!(
            err,
            SeqBpeError::InvalidConfig(message) if message.contains("window_size")
        ));
    }

    #[test]
    fn boundary_markers_match_style() {
        assert_eq!(BoundaryStyle::Sentinels.start_marker(), Some("<s>"));
        assert_eq!(BoundaryStyle::Sentinels.end_marker(), Some("</s>"));
        assert_eq!(BoundaryStyle::EndOfWord.start_marker(), None);
        assert_eq!(BoundaryStyle::EndOfWord.end_marker(), Some("</w>"));
        assert_eq!(BoundaryStyle::None.end_marker(), None);
    }

    #[test]
    fn boundary_serializes_as_snake_case() {
        let json = serde_json::to_string(&BoundaryStyle::EndOfWord).expect("serialize");
        assert_eq!(json, "\"end_of_word\"");
    }

    #[test]
    fn ingest_builder_overrides_defaults() {
        let cfg = IngestConfig::builder()
            .recursive(false)
            .follow_symlinks(true)
            .uppercase(true)
            .build();
        assert!(!cfg.recursive);
        assert!(cfg.follow_symlinks);
        assert!(cfg.uppercase);
    }
}
