//! Integer literal parsing: decimal, hex, binary, C-style char literals and
//! string literals (packed little-endian into a single integer).

use crate::error::{ParseError, Pos};
use pest::iterators::Pair;

use crate::parser::Rule;

pub fn process_number(pair: Pair<Rule>, pos: Pos) -> Result<i64, ParseError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::hex_num => i64::from_str_radix(&inner.as_str()[2..], 16)
            .map_err(|e| ParseError::Int(e, pos)),
        Rule::bin_num => {
            i64::from_str_radix(&inner.as_str()[2..], 2).map_err(|e| ParseError::Int(e, pos))
        }
        Rule::dec_num => inner
            .as_str()
            .parse::<i64>()
            .map_err(|e| ParseError::Int(e, pos)),
        Rule::char_lit => Ok(process_char(strip_quotes(inner.as_str()))),
        Rule::string_lit => process_string(strip_quotes(inner.as_str()), pos),
        _ => unreachable!(),
    }
}

/// Strips the surrounding `'...'`/`"..."` delimiters from a matched literal.
fn strip_quotes(s: &str) -> &str {
    &s[1..s.len() - 1]
}

fn unescape(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('r') => out.push(b'\r'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some('\'') => out.push(b'\''),
                Some('"') => out.push(b'"'),
                Some(other) => out.push(other as u8),
                None => {}
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

/// `'x'` yields the integer value of the (possibly escaped) byte.
fn process_char(raw: &str) -> i64 {
    // raw is the content between the surrounding quotes.
    let bytes = unescape(raw);
    bytes.first().copied().unwrap_or(0) as i64
}

/// `"AB"` packs bytes little-endian: `b0 | (b1 << 8) | ...`, matching the
/// reference assembler's treatment of string literals as one big integer.
/// Unlike the reference's Python bignums, the packed value lives in an
/// `i64`, so a literal wider than 8 bytes is rejected rather than silently
/// losing its high bytes.
fn process_string(raw: &str, pos: Pos) -> Result<i64, ParseError> {
    let bytes = unescape(raw);
    if bytes.len() > 8 {
        return Err(ParseError::StringLiteralTooWide(pos, bytes.len()));
    }
    let mut value: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    Ok(value)
}
