//! The text "card deck" format, one record per card group:
//!
//! ```text
//! <T> <decimal word count>
//! <hex base address>
//! <hex word> <hex word> ... (up to 8 per line)
//! ```
//!
//! `T` is a single-letter record kind. This crate only knows the grammar;
//! `w56-asm` decides what a `Code` record means versus a `Literal` one, and
//! `w56-cardotron` reads decks of these records as punched card input.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Code,
    Literal,
    Modify,
    Unresolved,
    Binary,
}

impl RecordKind {
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            RecordKind::Code => 'C',
            RecordKind::Literal => 'L',
            RecordKind::Modify => 'M',
            RecordKind::Unresolved => 'U',
            RecordKind::Binary => 'B',
        }
    }

    #[must_use]
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'C' => Some(RecordKind::Code),
            'L' => Some(RecordKind::Literal),
            'M' => Some(RecordKind::Modify),
            'U' => Some(RecordKind::Unresolved),
            'B' => Some(RecordKind::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    pub kind: RecordKind,
    pub base_addr: u32,
    pub words: Vec<u32>,
}

/// Words printed per line of the card body.
const WORDS_PER_LINE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardFormatError {
    UnexpectedEof,
    BadHeader(String),
    UnknownKind(char),
    BadLength(String),
    BadBaseAddr(String),
    BadWord(String),
    LengthMismatch { expected: usize, got: usize },
}

impl fmt::Display for CardFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardFormatError::UnexpectedEof => write!(f, "unexpected end of deck"),
            CardFormatError::BadHeader(line) => write!(f, "malformed header: {line:?}"),
            CardFormatError::UnknownKind(c) => write!(f, "unknown record kind {c:?}"),
            CardFormatError::BadLength(s) => write!(f, "bad word count {s:?}"),
            CardFormatError::BadBaseAddr(s) => write!(f, "bad base address {s:?}"),
            CardFormatError::BadWord(s) => write!(f, "bad word {s:?}"),
            CardFormatError::LengthMismatch { expected, got } => {
                write!(f, "header declared {expected} words, found {got}")
            }
        }
    }
}

impl std::error::Error for CardFormatError {}

#[must_use]
pub fn write_record(record: &CardRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("<{}> {}\n", record.kind.tag(), record.words.len()));
    out.push_str(&format!("0x{:08X}\n", record.base_addr));
    for chunk in record.words.chunks(WORDS_PER_LINE) {
        let line: Vec<String> = chunk.iter().map(|w| format!("0x{w:08X}")).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

#[must_use]
pub fn write_deck(records: &[CardRecord]) -> String {
    records.iter().map(write_record).collect()
}

/// Parse every record in `text`. Blank lines between records are tolerated;
/// blank lines inside a record's word body are not.
pub fn parse_deck(text: &str) -> Result<Vec<CardRecord>, CardFormatError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let mut records = Vec::new();
    loop {
        let Some(header) = lines.next() else {
            break;
        };
        records.push(parse_record(header, &mut lines)?);
    }
    Ok(records)
}

/// Parses a hex literal, with or without a `0x`/`0X` prefix.
fn parse_hex(tok: &str) -> Option<u32> {
    let digits = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")).unwrap_or(tok);
    u32::from_str_radix(digits, 16).ok()
}

/// Reads the header line: skip to `<`, read the type flag, skip to `>`,
/// read the decimal length that follows.
fn parse_header(header: &str) -> Result<(RecordKind, usize), CardFormatError> {
    let after_open = header
        .split_once('<')
        .map(|(_, rest)| rest)
        .ok_or_else(|| CardFormatError::BadHeader(header.to_string()))?;
    let mut chars = after_open.chars();
    let tag = chars.next().ok_or_else(|| CardFormatError::BadHeader(header.to_string()))?;
    let kind = RecordKind::from_tag(tag).ok_or(CardFormatError::UnknownKind(tag))?;
    let after_close = chars
        .as_str()
        .split_once('>')
        .map(|(_, rest)| rest)
        .ok_or_else(|| CardFormatError::BadHeader(header.to_string()))?;
    let len_str = after_close.trim();
    let len: usize = len_str
        .parse()
        .map_err(|_| CardFormatError::BadLength(len_str.to_string()))?;
    Ok((kind, len))
}

fn parse_record<'a>(
    header: &str,
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<CardRecord, CardFormatError> {
    let (kind, len) = parse_header(header)?;

    let base_line = lines.next().ok_or(CardFormatError::UnexpectedEof)?;
    let base_addr =
        parse_hex(base_line.trim()).ok_or_else(|| CardFormatError::BadBaseAddr(base_line.to_string()))?;

    let mut words = Vec::with_capacity(len);
    while words.len() < len {
        let line = lines.next().ok_or(CardFormatError::UnexpectedEof)?;
        for token in line.split_whitespace() {
            let word = parse_hex(token).ok_or_else(|| CardFormatError::BadWord(token.to_string()))?;
            words.push(word);
        }
    }
    if words.len() != len {
        return Err(CardFormatError::LengthMismatch {
            expected: len,
            got: words.len(),
        });
    }
    Ok(CardRecord {
        kind,
        base_addr,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_single_record() {
        let record = CardRecord {
            kind: RecordKind::Code,
            base_addr: 0x100,
            words: vec![1, 2, 3],
        };
        let text = write_record(&record);
        let parsed = parse_deck(&text).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn wraps_at_eight_words_per_line() {
        let record = CardRecord {
            kind: RecordKind::Binary,
            base_addr: 0,
            words: (0..10).collect(),
        };
        let text = write_record(&record);
        let body_lines: Vec<&str> = text.lines().skip(2).collect();
        assert_eq!(body_lines.len(), 2);
        assert_eq!(body_lines[0].split_whitespace().count(), 8);
        assert_eq!(body_lines[1].split_whitespace().count(), 2);
    }

    #[test]
    fn parses_multiple_records_back_to_back() {
        let a = CardRecord {
            kind: RecordKind::Code,
            base_addr: 0,
            words: vec![0xDEAD_BEEF],
        };
        let b = CardRecord {
            kind: RecordKind::Literal,
            base_addr: 0x10,
            words: vec![1, 2],
        };
        let text = write_deck(&[a.clone(), b.clone()]);
        assert_eq!(parse_deck(&text).unwrap(), vec![a, b]);
    }

    #[test]
    fn rejects_unknown_kind_tag() {
        let err = parse_deck("<Z> 1\n0x0\n0x1\n").unwrap_err();
        assert_eq!(err, CardFormatError::UnknownKind('Z'));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = parse_deck("<C> 2\n0x0\n0x1 0x2 0x3\n").unwrap_err();
        assert!(matches!(err, CardFormatError::LengthMismatch { .. }));
    }

    #[test]
    fn header_tolerates_leading_noise_before_the_angle_bracket() {
        let text = "garbage <C> 1\n0x0\n0x2A\n";
        let records = parse_deck(text).unwrap();
        assert_eq!(records[0].words, vec![0x2A]);
    }
}
