//! JSON persistence for trained models and vocabulary artifacts.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SeqBpeError};
use crate::model::BpeModel;
use crate::vocab::VocabularyArtifact;

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

/// Creates the parent directory of `path` when it does not exist yet.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|err| SeqBpeError::io(err, Some(parent.to_path_buf()))),
        _ => Ok(()),
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path, pretty: bool) -> Result<()> {
    let json = to_json(value, pretty)?;
    ensure_parent(path)?;
    fs::write(path, json).map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))?;
    serde_json::from_str(&raw).map_err(|err| {
        SeqBpeError::Serialization(format!("{}: {err}", path.display()))
    })
}

/// Serialises the model; merge rules keep their learned order.
pub fn model_json(model: &BpeModel, pretty: bool) -> Result<String> {
    to_json(model, pretty)
}

/// Persists the model as JSON, creating parent directories as needed.
pub fn save_model<P: AsRef<Path>>(model: &BpeModel, path: P, pretty: bool) -> Result<()> {
    write_json(model, path.as_ref(), pretty)
}

/// Loads a model written by [`save_model`].
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    read_json(path.as_ref())
}

/// Persists a vocabulary artifact as pretty JSON.
pub fn save_vocabulary<P: AsRef<Path>>(artifact: &VocabularyArtifact, path: P) -> Result<()> {
    write_json(artifact, path.as_ref(), true)
}

/// Loads a vocabulary artifact written by [`save_vocabulary`].
pub fn load_vocabulary<P: AsRef<Path>>(path: P) -> Result<VocabularyArtifact> {
    read_json(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryStyle;
    use crate::model::MergeRule;
    use crate::vocab::TokenVocabulary;
    use tempfile::tempdir;

    #[test]
    fn model_survives_disk_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("model.json");
        let model = BpeModel::new(
            vec![MergeRule::new("G", "T"), MergeRule::new("A", "C")],
            BoundaryStyle::EndOfWord,
        );
        save_model(&model, &path, true).expect("save");
        let restored = load_model(&path).expect("load");
        assert_eq!(restored, model);
        assert_eq!(restored.merges()[0], MergeRule::new("G", "T"));
    }

    #[test]
    fn malformed_model_is_a_serialization_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        fs::write(&path, r#"{"boundary":"sentinels","merges":[["A"]]}"#).expect("write");
        assert!(matches!(load_model(&path), Err(SeqBpeError::Serialization(_))));
    }

    #[test]
    fn vocabulary_artifact_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("vocab.json");
        let vocab = TokenVocabulary::build(&[vec!["AC", "GT", "AC"]], 1).expect("vocab");
        save_vocabulary(&vocab.artifact(3), &path).expect("save");
        let artifact = load_vocabulary(&path).expect("load");
        assert_eq!(artifact.window_size, 3);
        assert_eq!(TokenVocabulary::from_artifact(&artifact).expect("rebuild"), vocab);
    }
}
