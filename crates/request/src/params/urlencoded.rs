//! Strict `application/x-www-form-urlencoded` decoding.
//!
//! Unlike lenient form parsers, a `%` that is not followed by two hex digits is an
//! error, and the decoded bytes must be valid in the chosen charset.

use crate::encoding::Charset;
use crate::error::ParameterError;

/// Iterator over the decoded `name=value` pairs of an urlencoded input.
///
/// Empty segments are skipped, a segment without `=` yields an empty value.
#[derive(Debug)]
pub(crate) struct FormPairs<'a> {
    segments: std::slice::Split<'a, u8, fn(&u8) -> bool>,
    charset: Charset,
    source_name: &'static str,
}

impl<'a> FormPairs<'a> {
    pub(crate) fn new(input: &'a [u8], charset: Charset, source_name: &'static str) -> Self {
        let is_separator: fn(&u8) -> bool = |b| *b == b'&';
        Self { segments: input.split(is_separator), charset, source_name }
    }

    fn decode(&self, raw: &[u8]) -> Result<String, ParameterError> {
        let bytes = percent_decode(raw).map_err(|reason| ParameterError::malformed_encoding(self.source_name, reason))?;
        self.charset
            .decode(&bytes)
            .map(std::borrow::Cow::into_owned)
            .ok_or(ParameterError::UndecodableBytes { charset: self.charset.name() })
    }
}

impl Iterator for FormPairs<'_> {
    type Item = Result<(String, String), ParameterError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let segment = self.segments.next()?;
            if segment.is_empty() {
                continue;
            }

            let (raw_name, raw_value) = match segment.iter().position(|b| *b == b'=') {
                Some(pos) => (&segment[..pos], &segment[pos + 1..]),
                None => (segment, &[][..]),
            };

            let pair = self.decode(raw_name).and_then(|name| Ok((name, self.decode(raw_value)?)));
            return Some(pair);
        }
    }
}

fn percent_decode(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = input.get(i + 1).copied().and_then(hex_value);
                let lo = input.get(i + 2).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                    _ => return Err(format!("invalid escape at offset {i}")),
                }
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
