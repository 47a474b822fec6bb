//! Byte pair encoding (BPE) for biological sequences, plus token co-occurrence statistics.
//!
//! The crate exposes both a library API and a `seqbpe` command line interface. Typical usage
//! loads FASTA records, learns an ordered list of merge rules, encodes every sequence with the
//! resulting model, and then derives a windowed co-occurrence table over the encoded streams.
//!
//! ```no_run
//! use seqbpe::{cooccurrence, CooccurrenceConfig, IngestConfig, Trainer, TrainerConfig};
//!
//! # fn main() -> seqbpe::Result<()> {
//! let trainer_cfg = TrainerConfig::builder()
//!     .num_merges(500)
//!     .show_progress(false)
//!     .build()?;
//! let trainer = Trainer::new(trainer_cfg);
//! let artifacts = trainer.train_from_paths(&["proteins.fasta"], &IngestConfig::default())?;
//! artifacts.model.save("output/model.json", true)?;
//!
//! let tokenizer = artifacts.model.tokenizer();
//! let streams: Vec<Vec<String>> = ["MKTAYIAK", "MKTLLV"]
//!     .iter()
//!     .map(|seq| tokenizer.encode(seq))
//!     .collect();
//! let analysis = cooccurrence::analyze(&streams, &CooccurrenceConfig::default())?;
//! println!("{} co-occurring pairs", analysis.table.len());
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library portion
//! only can disable default features to avoid the CLI dependencies:
//! `seqbpe = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions,
    clippy::cast_precision_loss
)]

pub mod config;
pub mod cooccurrence;
pub mod corpus;
pub mod error;
pub mod metrics;
pub mod model;
pub mod serialization;
pub mod symbol;
pub mod trainer;
pub mod vocab;

pub use config::{
    BoundaryStyle, CooccurrenceBuilder, CooccurrenceConfig, IngestBuilder, IngestConfig,
    TrainerBuilder, TrainerConfig,
};
pub use cooccurrence::{CooccurrenceAnalysis, CooccurrenceTable};
pub use corpus::FastaRecord;
pub use error::{Result, SeqBpeError};
pub use metrics::{IterationMetrics, StopReason, TokenFrequency, TrainingMetrics};
pub use model::{apply, BpeModel, MergeRule, MergeTokenizer};
pub use trainer::{learn, Trainer, TrainerArtifacts, TrainingState};
pub use vocab::{TokenId, TokenVocabulary, VocabularyArtifact};
