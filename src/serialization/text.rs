//! Plain-text renderings of token streams.

use std::io::Write;

/// Renders tokens separated by single spaces.
pub fn space_joined<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut out = String::new();
    for (idx, token) in tokens.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        out.push_str(token.as_ref());
    }
    out
}

/// Concatenates tokens, uppercasing even positions and lowercasing odd ones, so token
/// boundaries stay visible without separators.
pub fn alternating_case<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .enumerate()
        .map(|(idx, token)| {
            if idx % 2 == 0 {
                token.as_ref().to_uppercase()
            } else {
                token.as_ref().to_lowercase()
            }
        })
        .collect()
}

/// Writes one space-joined line per stream.
pub fn write_token_lines<W, T, S>(writer: &mut W, streams: &[T]) -> std::io::Result<()>
where
    W: Write,
    T: AsRef<[S]>,
    S: AsRef<str>,
{
    for stream in streams {
        writeln!(writer, "{}", space_joined(stream.as_ref()))?;
    }
    Ok(())
}

/// Writes one alternating-case line per stream.
pub fn write_alternating_lines<W, T, S>(writer: &mut W, streams: &[T]) -> std::io::Result<()>
where
    W: Write,
    T: AsRef<[S]>,
    S: AsRef<str>,
{
    for stream in streams {
        writeln!(writer, "{}", alternating_case(stream.as_ref()))?;
    }
    Ok(())
}
