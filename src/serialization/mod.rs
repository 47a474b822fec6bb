//! Persistence of models, vocabularies, and tabular or textual outputs.

pub mod csv;
pub mod json;
pub mod text;

pub use self::csv::{
    read_encoded_streams, save_cooccurrence_rows, save_dense_matrix, save_encoded_results,
    save_marginal_frequencies, EncodedRecord,
};
pub use self::json::{load_model, load_vocabulary, model_json, save_model, save_vocabulary};
pub use self::text::{alternating_case, space_joined};
