//! Minimal RFC 4180 style CSV reading and writing for the tabular outputs.
//!
//! Fields containing a comma, quote, or line break are quoted with doubled inner quotes. The reader
//! accepts the same dialect, including quoted fields spanning several lines.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cooccurrence::{CooccurrenceRow, DenseMatrix};
use crate::error::{Result, SeqBpeError};
use crate::metrics::{compression_ratio, TokenFrequency};
use crate::serialization::json::ensure_parent;

/// Header of the per-sequence encoding table.
pub const ENCODED_HEADER: [&str; 6] = [
    "sequence_id",
    "original_sequence",
    "bpe_encoded",
    "original_length",
    "encoded_tokens",
    "compression_ratio",
];

/// Column read back by [`parse_encoded_streams`].
pub const ENCODED_COLUMN: &str = "bpe_encoded";

/// Quotes `field` when it would otherwise break the record structure.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn write_record<W, I, S>(writer: &mut W, fields: I) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for (idx, field) in fields.into_iter().enumerate() {
        if idx > 0 {
            writer.write_all(b",")?;
        }
        writer.write_all(escape_field(field.as_ref()).as_bytes())?;
    }
    writer.write_all(b"\n")
}

/// Parses CSV text into records. Empty lines outside quotes are skipped.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut quote_line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            '"' => {
                return Err(SeqBpeError::parse("csv", line, "unexpected quote in field"));
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if !record.is_empty() || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                line += 1;
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err(SeqBpeError::parse("csv", quote_line, "unterminated quoted field"));
    }
    if !record.is_empty() || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))?;
    Ok(BufWriter::new(file))
}

fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let mut writer = create(path)?;
    body(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))
}

/// One encoded sequence as exported to the results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// FASTA header or other identifier.
    pub sequence_id: String,
    /// Raw residues.
    pub original_sequence: String,
    /// Encoded stream including boundary markers.
    pub tokens: Vec<String>,
}

impl EncodedRecord {
    /// Characters per emitted token, `0.0` for an empty stream.
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.original_sequence.chars().count(), self.tokens.len())
    }
}

/// Writes the per-sequence encoding table.
pub fn write_encoded_results<W: Write>(
    writer: &mut W,
    records: &[EncodedRecord],
) -> std::io::Result<()> {
    write_record(writer, ENCODED_HEADER)?;
    for record in records {
        write_record(
            writer,
            [
                record.sequence_id.clone(),
                record.original_sequence.clone(),
                record.tokens.join(" "),
                record.original_sequence.chars().count().to_string(),
                record.tokens.len().to_string(),
                format!("{:.2}", record.compression_ratio()),
            ],
        )?;
    }
    Ok(())
}

/// Saves the per-sequence encoding table to `path`.
pub fn save_encoded_results<P: AsRef<Path>>(path: P, records: &[EncodedRecord]) -> Result<()> {
    write_file(path.as_ref(), |w| write_encoded_results(w, records))
}

/// Extracts the space-separated token streams of the `bpe_encoded` column.
pub fn parse_encoded_streams(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = parse_records(text)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| SeqBpeError::parse("encoded csv", 1, "missing header row"))?;
    let column = header
        .iter()
        .position(|name| name.trim() == ENCODED_COLUMN)
        .ok_or_else(|| {
            SeqBpeError::parse("encoded csv", 1, format!("no `{ENCODED_COLUMN}` column"))
        })?;
    records
        .enumerate()
        .map(|(idx, record)| {
            record
                .get(column)
                .map(|cell| cell.split_whitespace().map(str::to_owned).collect())
                .ok_or_else(|| {
                    SeqBpeError::parse(
                        "encoded csv",
                        idx + 2,
                        format!("record has {} field(s), expected {}", record.len(), column + 1),
                    )
                })
        })
        .collect()
}

/// Loads the token streams written by [`save_encoded_results`].
pub fn read_encoded_streams<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|err| SeqBpeError::io(err, Some(path.to_path_buf())))?;
    parse_encoded_streams(&text)
}

/// Writes `token,count,frequency,percentage` rows.
pub fn write_marginal_frequencies<W: Write>(
    writer: &mut W,
    stats: &[TokenFrequency],
) -> std::io::Result<()> {
    write_record(writer, ["token", "count", "frequency", "percentage"])?;
    for stat in stats {
        write_record(
            writer,
            [
                stat.token.clone(),
                stat.count.to_string(),
                format!("{:.6}", stat.frequency),
                format!("{:.2}", stat.percentage()),
            ],
        )?;
    }
    Ok(())
}

/// Saves marginal token frequencies to `path`.
pub fn save_marginal_frequencies<P: AsRef<Path>>(path: P, stats: &[TokenFrequency]) -> Result<()> {
    write_file(path.as_ref(), |w| write_marginal_frequencies(w, stats))
}

/// Writes sparse co-occurrence rows.
pub fn write_cooccurrence_rows<W: Write>(
    writer: &mut W,
    rows: &[CooccurrenceRow],
) -> std::io::Result<()> {
    write_record(
        writer,
        ["token1", "token2", "token1_id", "token2_id", "cooccurrence_count"],
    )?;
    for row in rows {
        write_record(
            writer,
            [
                row.token_a.clone(),
                row.token_b.clone(),
                row.id_a.to_string(),
                row.id_b.to_string(),
                format!("{:.4}", row.weight),
            ],
        )?;
    }
    Ok(())
}

/// Saves sparse co-occurrence rows to `path`.
pub fn save_cooccurrence_rows<P: AsRef<Path>>(path: P, rows: &[CooccurrenceRow]) -> Result<()> {
    write_file(path.as_ref(), |w| write_cooccurrence_rows(w, rows))
}

/// Writes a labelled square matrix; the first column holds row labels.
pub fn write_dense_matrix<W: Write>(writer: &mut W, matrix: &DenseMatrix) -> std::io::Result<()> {
    write_record(
        writer,
        std::iter::once("token").chain(matrix.tokens.iter().map(String::as_str)),
    )?;
    for (label, values) in matrix.tokens.iter().zip(&matrix.values) {
        write_record(
            writer,
            std::iter::once(label.clone()).chain(values.iter().map(|v| format!("{v:.4}"))),
        )?;
    }
    Ok(())
}

/// Saves a dense matrix to `path`.
pub fn save_dense_matrix<P: AsRef<Path>>(path: P, matrix: &DenseMatrix) -> Result<()> {
    write_file(path.as_ref(), |w| write_dense_matrix(w, matrix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F>(body: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut buffer = Vec::new();
        body(&mut buffer).expect("write");
        String::from_utf8(buffer).expect("utf8")
    }

    #[test]
    fn fields_are_quoted_only_when_needed() {
        assert_eq!(escape_field("ACGT"), "ACGT");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn parser_handles_quotes_and_line_endings() {
        let text = "a,\"b,c\",\"d\"\"e\"\r\n\n\"multi\nline\",x\n,";
        let records = parse_records(text).expect("parse");
        assert_eq!(
            records,
            vec![
                vec!["a", "b,c", "d\"e"],
                vec!["multi\nline", "x"],
                vec!["", ""],
            ]
        );
        assert!(matches!(
            parse_records("a,\"open\n"),
            Err(SeqBpeError::Parse { line: 1, .. })
        ));
        assert!(parse_records("a\"b").is_err());
    }

    #[test]
    fn encoded_results_round_trip_through_the_token_column() {
        let records = vec![
            EncodedRecord {
                sequence_id: "seq1, sample".into(),
                original_sequence: "ACGT".into(),
                tokens: vec!["<s>".into(), "ACGT".into(), "</s>".into()],
            },
            EncodedRecord {
                sequence_id: "seq2".into(),
                original_sequence: "AAAAAA".into(),
                tokens: vec!["<s>".into(), "AAA".into(), "AAA".into(), "</s>".into()],
            },
        ];
        let text = render(|w| write_encoded_results(w, &records));
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(ENCODED_HEADER.join(",").as_str())
        );
        assert_eq!(lines.next(), Some("\"seq1, sample\",ACGT,<s> ACGT </s>,4,3,1.33"));
        assert_eq!(lines.next(), Some("seq2,AAAAAA,<s> AAA AAA </s>,6,4,1.50"));

        let streams = parse_encoded_streams(&text).expect("streams");
        assert_eq!(streams[1], ["<s>", "AAA", "AAA", "</s>"]);
    }

    #[test]
    fn encoded_streams_require_the_token_column() {
        assert!(parse_encoded_streams("id,tokens\n1,A B\n").is_err());
        assert!(parse_encoded_streams("").is_err());
        assert!(parse_encoded_streams("id,bpe_encoded\n1\n").is_err());
    }

    #[test]
    fn marginal_rows_are_rounded() {
        let stats = vec![TokenFrequency {
            token: "AC".into(),
            count: 1,
            frequency: 1.0 / 3.0,
        }];
        let text = render(|w| write_marginal_frequencies(w, &stats));
        assert_eq!(text, "token,count,frequency,percentage\nAC,1,0.333333,33.33\n");
    }

    #[test]
    fn dense_matrix_has_labels() {
        let matrix = DenseMatrix {
            tokens: vec!["A".into(), "C".into()],
            ids: vec![0, 1],
            values: vec![vec![0.0, 1.5], vec![1.5, 0.0]],
        };
        let text = render(|w| write_dense_matrix(w, &matrix));
        assert_eq!(text, "token,A,C\nA,0.0000,1.5000\nC,1.5000,0.0000\n");
    }

    #[test]
    fn cooccurrence_rows_use_four_decimals() {
        let rows = vec![CooccurrenceRow {
            token_a: "x".into(),
            token_b: "z".into(),
            id_a: 0,
            id_b: 2,
            weight: 0.5,
        }];
        let text = render(|w| write_cooccurrence_rows(w, &rows));
        assert_eq!(
            text,
            "token1,token2,token1_id,token2_id,cooccurrence_count\nx,z,0,2,0.5000\n"
        );
    }
}
