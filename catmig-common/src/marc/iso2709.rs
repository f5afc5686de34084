//! ISO 2709 binary record codec
//!
//! Thin sequential decoder/encoder. An undecodable record is surfaced as a
//! [`DecodeFailure`] carrying its raw bytes so callers can archive it and move on.

use std::io::{BufRead, Write};

use super::record::{is_control_tag, Leader, Subfield, TaggedField, TaggedRecord, LEADER_LEN};
use crate::{Error, Result};

pub const RECORD_TERMINATOR: u8 = 0x1D;
pub const FIELD_TERMINATOR: u8 = 0x1E;
pub const SUBFIELD_DELIMITER: u8 = 0x1F;

const DIRECTORY_ENTRY_LEN: usize = 12;

/// Raw bytes of a record that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub raw: Vec<u8>,
    pub reason: String,
}

/// One item read from a record file
#[derive(Debug, Clone)]
pub enum Decoded {
    Record(TaggedRecord),
    Failure(DecodeFailure),
}

/// Lazy reader over a stream of ISO 2709 records
pub struct Iso2709Reader<R> {
    inner: R,
    done: bool,
}

impl<R: BufRead> Iso2709Reader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }
}

impl<R: BufRead> Iterator for Iso2709Reader<R> {
    type Item = Result<Decoded>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut raw = Vec::new();
        match self.inner.read_until(RECORD_TERMINATOR, &mut raw) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                // Trailing newlines or padding after the last record
                if raw.iter().all(|b| b.is_ascii_whitespace()) {
                    self.done = true;
                    return None;
                }
                Some(Ok(match decode(&raw) {
                    Ok(record) => Decoded::Record(record),
                    Err(e) => Decoded::Failure(DecodeFailure {
                        raw,
                        reason: e.to_string(),
                    }),
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(Error::Io(e)))
            }
        }
    }
}

fn parse_number(bytes: &[u8], what: &str) -> Result<usize> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| Error::Decode(format!("invalid {what}: {:?}", String::from_utf8_lossy(bytes))))
}

/// Decode one record (with or without its terminator)
pub fn decode(raw: &[u8]) -> Result<TaggedRecord> {
    let raw = raw.strip_suffix(&[RECORD_TERMINATOR]).unwrap_or(raw);
    if raw.len() < LEADER_LEN {
        return Err(Error::Decode(format!("record shorter than leader ({} bytes)", raw.len())));
    }

    let leader = Leader::new(String::from_utf8_lossy(&raw[..LEADER_LEN]).into_owned());
    let base = parse_number(&raw[12..17], "base address")?;
    if base <= LEADER_LEN || base > raw.len() {
        return Err(Error::Decode(format!("base address {base} out of range")));
    }

    // Directory runs from the leader to the field terminator before base
    let directory = &raw[LEADER_LEN..base - 1];
    if directory.len() % DIRECTORY_ENTRY_LEN != 0 {
        return Err(Error::Decode(format!(
            "directory length {} is not a multiple of {DIRECTORY_ENTRY_LEN}",
            directory.len()
        )));
    }

    let mut fields = Vec::with_capacity(directory.len() / DIRECTORY_ENTRY_LEN);
    for entry in directory.chunks(DIRECTORY_ENTRY_LEN) {
        let tag = String::from_utf8_lossy(&entry[..3]).into_owned();
        let length = parse_number(&entry[3..7], "field length")?;
        let start = parse_number(&entry[7..12], "field start")?;

        let from = base + start;
        let to = from + length;
        if to > raw.len() {
            return Err(Error::Decode(format!("field {tag} runs past end of record")));
        }
        let data = &raw[from..to];
        let data = data.strip_suffix(&[FIELD_TERMINATOR]).unwrap_or(data);

        if is_control_tag(&tag) {
            fields.push(TaggedField::control(tag, String::from_utf8_lossy(data).into_owned()));
            continue;
        }

        if data.len() < 2 {
            return Err(Error::Decode(format!("data field {tag} missing indicators")));
        }
        let indicators = [data[0] as char, data[1] as char];
        let subfields = data[2..]
            .split(|b| *b == SUBFIELD_DELIMITER)
            .skip(1)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| {
                let text = String::from_utf8_lossy(chunk);
                let mut chars = text.chars();
                let code = chars.next().unwrap_or(' ');
                Subfield::new(code, chars.as_str())
            })
            .collect();
        fields.push(TaggedField::data(tag, indicators, subfields));
    }

    Ok(TaggedRecord::with_fields(leader, fields))
}

/// Largest field length a directory entry can express
const MAX_FIELD_LEN: usize = 9_999;
/// Largest record length, field start and base address the format can express
const MAX_OFFSET: usize = 99_999;

/// Encode a record, rewriting the leader's length and base address
///
/// Records whose fields or total size overflow the fixed-width directory and
/// leader counters are rejected with [`Error::InvalidInput`].
pub fn encode(record: &TaggedRecord) -> Result<Vec<u8>> {
    let mut directory = Vec::new();
    let mut data = Vec::new();

    for field in record.fields() {
        let start = data.len();
        match field {
            TaggedField::Control { value, .. } => data.extend_from_slice(value.as_bytes()),
            TaggedField::Data {
                indicators,
                subfields,
                ..
            } => {
                let mut buf = [0u8; 4];
                data.extend_from_slice(indicators[0].encode_utf8(&mut buf).as_bytes());
                data.extend_from_slice(indicators[1].encode_utf8(&mut buf).as_bytes());
                for subfield in subfields {
                    data.push(SUBFIELD_DELIMITER);
                    data.extend_from_slice(subfield.code.encode_utf8(&mut buf).as_bytes());
                    data.extend_from_slice(subfield.value.as_bytes());
                }
            }
        }
        data.push(FIELD_TERMINATOR);
        let len = data.len() - start;
        if len > MAX_FIELD_LEN || start > MAX_OFFSET {
            return Err(Error::InvalidInput(format!(
                "field {} too large to encode ({len} bytes at offset {start})",
                field.tag()
            )));
        }
        directory.extend_from_slice(format!("{:0>3.3}{len:04}{start:05}", field.tag()).as_bytes());
    }
    directory.push(FIELD_TERMINATOR);

    let base = LEADER_LEN + directory.len();
    let total = base + data.len() + 1;
    if total > MAX_OFFSET {
        return Err(Error::InvalidInput(format!(
            "record too large to encode ({total} bytes)"
        )));
    }

    let mut leader: Vec<u8> = record.leader().as_str().bytes().take(LEADER_LEN).collect();
    leader.resize(LEADER_LEN, b' ');
    leader[..5].copy_from_slice(format!("{total:05}").as_bytes());
    leader[12..17].copy_from_slice(format!("{base:05}").as_bytes());

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&leader);
    out.extend_from_slice(&directory);
    out.extend_from_slice(&data);
    out.push(RECORD_TERMINATOR);
    Ok(out)
}

/// Write encoded records to any byte sink
pub struct Iso2709Writer<W> {
    inner: W,
}

impl<W: Write> Iso2709Writer<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write(&mut self, record: &TaggedRecord) -> Result<()> {
        self.inner.write_all(&encode(record)?)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
