//! Facilities for discovering input files and loading sequence corpora.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{Result, SeqBpeError};

/// One FASTA record: the header without its leading `>` and the concatenated residues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Header text, empty for residues that precede any header line.
    pub header: String,
    /// Sequence lines trimmed and joined.
    pub sequence: String,
}

/// Parses FASTA text.
///
/// Lines are trimmed; blank lines are ignored. Records whose sequence ends up empty are dropped.
pub fn parse_fasta(text: &str, uppercase: bool) -> Vec<FastaRecord> {
    let mut records = Vec::new();
    let mut header: Option<String> = None;
    let mut sequence = String::new();
    let mut dropped = 0usize;

    let mut flush = |header: Option<String>, sequence: &mut String| {
        if sequence.is_empty() {
            if header.is_some() {
                dropped += 1;
            }
            return;
        }
        records.push(FastaRecord {
            header: header.unwrap_or_default(),
            sequence: std::mem::take(sequence),
        });
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('>') {
            flush(header.take(), &mut sequence);
            header = Some(rest.trim().to_owned());
        } else if uppercase {
            sequence.push_str(&line.to_uppercase());
        } else {
            sequence.push_str(line);
        }
    }
    flush(header, &mut sequence);

    if dropped > 0 {
        warn!("dropped {dropped} FASTA record(s) without sequence data");
    }
    records
}

/// Splits plain text on whitespace; every word becomes one raw sequence.
pub fn parse_words(text: &str, uppercase: bool) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            if uppercase {
                word.to_uppercase()
            } else {
                word.to_owned()
            }
        })
        .collect()
}

/// Discovers files rooted at the provided input paths according to the ingest configuration.
///
/// Directories are traversed recursively by default; set [`IngestConfig::recursive`] to `false`
/// to limit discovery to the first level. Symlink traversal is controlled through
/// [`IngestConfig::follow_symlinks`]. Paths are returned sorted within each directory so the
/// corpus order does not depend on the filesystem.
pub fn collect_paths<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if !path.exists() {
            return Err(SeqBpeError::InvalidConfig(format!(
                "input path {path:?} does not exist"
            )));
        }
        let metadata = path
            .symlink_metadata()
            .map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))?;
        if metadata.is_dir() || (cfg.follow_symlinks && path.is_dir()) {
            let depth = if cfg.recursive { usize::MAX } else { 1 };
            let walker = WalkDir::new(path)
                .follow_links(cfg.follow_symlinks)
                .max_depth(depth)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(|err| SeqBpeError::Internal(err.to_string()))?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if metadata.is_file() || path.is_file() {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(SeqBpeError::InvalidConfig(
            "no files discovered in provided inputs".into(),
        ));
    }
    Ok(files)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))
}

/// Loads every FASTA record found under `inputs`, in discovery order.
pub fn load_fasta_corpus<P: AsRef<Path>>(
    inputs: &[P],
    cfg: &IngestConfig,
) -> Result<Vec<FastaRecord>> {
    let mut records = Vec::new();
    for path in collect_paths(inputs, cfg)? {
        let parsed = parse_fasta(&read_text(&path)?, cfg.uppercase);
        debug!("{}: {} record(s)", path.display(), parsed.len());
        records.extend(parsed);
    }
    Ok(records)
}

/// Loads whitespace-separated words found under `inputs`, in discovery order.
pub fn load_word_corpus<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<String>> {
    let mut words = Vec::new();
    for path in collect_paths(inputs, cfg)? {
        words.extend(parse_words(&read_text(&path)?, cfg.uppercase));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_fasta_joins_lines_and_drops_empty_records() {
        let text = ">seq1 sample\nACGT\n  ACG \n\n>empty\n>seq2\nttaa\n";
        let records = parse_fasta(text, false);
        assert_eq!(
            records,
            vec![
                FastaRecord {
                    header: "seq1 sample".into(),
                    sequence: "ACGTACG".into(),
                },
                FastaRecord {
                    header: "seq2".into(),
                    sequence: "ttaa".into(),
                },
            ]
        );
        let upper = parse_fasta(text, true);
        assert_eq!(upper[1].sequence, "TTAA");
    }

    #[test]
    fn parse_fasta_accepts_headerless_residues() {
        let records = parse_fasta("ACGT\n>named\nGG", false);
        assert_eq!(records[0].header, "");
        assert_eq!(records[0].sequence, "ACGT");
        assert_eq!(records[1].header, "named");
        assert!(parse_fasta("", false).is_empty());
    }

    #[test]
    fn parse_words_splits_on_whitespace() {
        assert_eq!(parse_words(" low lower\n\tnewest ", false), ["low", "lower", "newest"]);
        assert_eq!(parse_words("ab", true), ["AB"]);
    }

    #[test]
    fn collect_paths_discovers_files_recursively() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("create nested directory");
        let file_a = dir.path().join("a.fasta");
        let file_b = nested.join("b.fasta");
        fs::write(&file_a, ">a\nAC\n").expect("write a");
        fs::write(&file_b, ">b\nGT\n").expect("write b");

        let mut paths = collect_paths(&[dir.path()], &IngestConfig::default()).expect("collect");
        paths.sort();
        assert_eq!(paths, vec![file_a.clone(), file_b]);

        let shallow = IngestConfig {
            recursive: false,
            ..IngestConfig::default()
        };
        let paths = collect_paths(&[dir.path()], &shallow).expect("collect shallow");
        assert_eq!(paths, vec![file_a]);
    }

    #[test]
    fn missing_input_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.fasta");
        assert!(matches!(
            collect_paths(&[missing], &IngestConfig::default()),
            Err(SeqBpeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_fasta_corpus_reads_all_files() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("1.fa"), ">x\nac\n>y\nGT").expect("write");
        fs::write(dir.path().join("2.fa"), ">z\nTT").expect("write");
        let cfg = IngestConfig {
            uppercase: true,
            ..IngestConfig::default()
        };
        let records = load_fasta_corpus(&[dir.path()], &cfg).expect("load");
        let sequences: Vec<&str> = records.iter().map(|r| r.sequence.as_str()).collect();
        assert_eq!(sequences, ["AC", "GT", "TT"]);
    }

    #[test]
    fn load_word_corpus_reads_words() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("corpus.txt");
        fs::write(&file, "low lowest\nnewer").expect("write");
        let words = load_word_corpus(&[file], &IngestConfig::default()).expect("load");
        assert_eq!(words, ["low", "lowest", "newer"]);
    }
}
