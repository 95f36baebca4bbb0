//! Envelope codec: the addressed-message format exchanged between rounds.
//!
//! An envelope is a top-level object keyed by the decimal party id of each
//! recipient:
//!
//! ```text
//! {"2":{"From":1,"To":2,"Data":"..."},"3":{"From":1,"To":3,"Data":"..."}}
//! ```
//!
//! Payloads that are already a balanced object or array are written as-is.
//! Anything else is written as an escaped string literal and unescaped again
//! on extraction, so arbitrary bytes survive a round trip. Valid UTF-8 is
//! written as JSON text; bytes that are not UTF-8 use a `\xHH` escape, which
//! keeps `\uXXXX` meaning a code point as in any other JSON producer.

mod scan;

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RouterError;
use crate::types::PartyId;

use scan::{is_structured, object_members};

/// Codec-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Envelope is well formed but has no entry for this party.
    #[error("no entry addressed to party {party}")]
    NotFound { party: PartyId },
    /// Unbalanced delimiters, bad literal, or trailing garbage.
    #[error("malformed envelope at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

impl From<EnvelopeError> for RouterError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Malformed { offset, reason } => RouterError::EnvelopeParse {
                offset,
                reason: reason.to_string(),
            },
            EnvelopeError::NotFound { party } => RouterError::EnvelopeParse {
                offset: 0,
                reason: format!("no entry addressed to party {party}"),
            },
        }
    }
}

/// Which envelope convention the producing engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeFormat {
    /// v1: `{"<id>": <payload>}`, the payload is the whole entry value.
    #[default]
    AddressedMap,
    /// v2: same addressing, but the payload is the string in the entry's `"data"` member.
    DataField,
}

impl EnvelopeFormat {
    pub fn version(self) -> u8 {
        match self {
            EnvelopeFormat::AddressedMap => 1,
            EnvelopeFormat::DataField => 2,
        }
    }

    /// Extract the payload addressed to `target` under this format.
    pub fn extract(self, bytes: &[u8], target: PartyId) -> Result<Vec<u8>, EnvelopeError> {
        let entry = extract(bytes, target)?;
        match self {
            EnvelopeFormat::AddressedMap => Ok(entry),
            EnvelopeFormat::DataField => data_member(&entry),
        }
    }
}

/// One party's per-round output, keyed by recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    entries: BTreeMap<PartyId, Vec<u8>>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address `payload` to `to`, returning any payload it replaces.
    pub fn insert(&mut self, to: PartyId, payload: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.entries.insert(to, payload.into())
    }

    pub fn get(&self, to: PartyId) -> Option<&[u8]> {
        self.entries.get(&to).map(Vec::as_slice)
    }

    pub fn recipients(&self) -> impl Iterator<Item = PartyId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    /// Parse a full envelope. Duplicate or non-numeric keys are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut entries = BTreeMap::new();
        for (key, value) in object_members(bytes)? {
            let party = party_key(bytes, key.clone())?.ok_or(EnvelopeError::Malformed {
                offset: key.start,
                reason: "envelope key is not a party id",
            })?;
            if entries.insert(party, value_bytes(bytes, value)?).is_some() {
                return Err(EnvelopeError::Malformed {
                    offset: key.start,
                    reason: "duplicate party key",
                });
            }
        }
        Ok(Envelope { entries })
    }
}

impl FromIterator<(PartyId, Vec<u8>)> for Envelope {
    fn from_iter<I: IntoIterator<Item = (PartyId, Vec<u8>)>>(iter: I) -> Self {
        Envelope {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Serialize an envelope. Entries are written in ascending party order.
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    let hint: usize = envelope.entries.values().map(|p| p.len() + 16).sum();
    let mut out = Vec::with_capacity(hint + 2);
    out.push(b'{');
    for (i, (party, payload)) in envelope.entries.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.push(b'"');
        out.extend_from_slice(party.to_string().as_bytes());
        out.extend_from_slice(b"\":");
        write_value(&mut out, payload);
    }
    out.push(b'}');
    out
}

/// Find the payload addressed to `target`.
///
/// Only top-level keys are compared, so an id that appears inside a sibling
/// payload never matches. Keys that are not party ids are skipped.
pub fn extract(bytes: &[u8], target: PartyId) -> Result<Vec<u8>, EnvelopeError> {
    for (key, value) in object_members(bytes)? {
        if party_key(bytes, key)? == Some(target) {
            return value_bytes(bytes, value);
        }
    }
    Err(EnvelopeError::NotFound { party: target })
}

/// Party ids addressed by an encoded envelope, in wire order.
pub fn recipients(bytes: &[u8]) -> Result<Vec<PartyId>, EnvelopeError> {
    let mut parties = Vec::new();
    for (key, _) in object_members(bytes)? {
        if let Some(party) = party_key(bytes, key)? {
            parties.push(party);
        }
    }
    Ok(parties)
}

/// Join already-extracted payloads into one array, preserving order.
pub fn aggregate<I, P>(payloads: I) -> Vec<u8>
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut out = vec![b'['];
    for (i, payload) in payloads.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_value(&mut out, payload.as_ref());
    }
    out.push(b']');
    out
}

fn write_value(out: &mut Vec<u8>, payload: &[u8]) {
    if is_structured(payload) {
        out.extend_from_slice(payload);
    } else {
        write_string(out, payload);
    }
}

fn write_string(out: &mut Vec<u8>, raw: &[u8]) {
    out.push(b'"');
    for chunk in raw.utf8_chunks() {
        for ch in chunk.valid().chars() {
            match ch {
                '"' => out.extend_from_slice(b"\\\""),
                '\\' => out.extend_from_slice(b"\\\\"),
                '\n' => out.extend_from_slice(b"\\n"),
                '\r' => out.extend_from_slice(b"\\r"),
                '\t' => out.extend_from_slice(b"\\t"),
                c if c.is_control() => out.extend_from_slice(format!("\\u{:04x}", u32::from(c)).as_bytes()),
                c => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        for b in chunk.invalid() {
            out.extend_from_slice(format!("\\x{b:02x}").as_bytes());
        }
    }
    out.push(b'"');
}

/// Payload bytes for a value span: strings are unescaped, structures copied verbatim.
fn value_bytes(bytes: &[u8], span: Range<usize>) -> Result<Vec<u8>, EnvelopeError> {
    let raw = &bytes[span.clone()];
    if raw.first() == Some(&b'"') {
        decode_string(raw, span.start)
    } else {
        Ok(raw.to_vec())
    }
}

/// A key names a party only in canonical decimal form, so `"+1"` or `"01"`
/// never alias party 1.
fn party_key(bytes: &[u8], span: Range<usize>) -> Result<Option<PartyId>, EnvelopeError> {
    let key = decode_string(&bytes[span.clone()], span.start)?;
    Ok(std::str::from_utf8(&key)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .and_then(PartyId::new)
        .filter(|party| party.to_string().as_bytes() == key.as_slice()))
}

/// Fixed-width hex digits at `at`, or `None` if any is missing or not hex.
fn hex_at(inner: &[u8], at: usize, width: usize) -> Option<u32> {
    let digits = inner.get(at..at + width)?;
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(std::str::from_utf8(digits).ok()?, 16).ok()
}

/// Unescape a string literal (quotes included). `\uXXXX` (surrogate pairs
/// included) becomes UTF-8; `\xHH` is one raw byte.
fn decode_string(literal: &[u8], offset: usize) -> Result<Vec<u8>, EnvelopeError> {
    let malformed = |at: usize, reason| EnvelopeError::Malformed {
        offset: offset + at,
        reason,
    };
    // The scanner only hands out spans that include both quotes.
    let inner = &literal[1..literal.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;

    while i < inner.len() {
        let b = inner[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = *inner.get(i + 1).ok_or(malformed(i, "dangling escape"))?;
        i += 2;
        match esc {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'u' => {
                let mut code = hex_at(inner, i, 4).ok_or(malformed(i, "bad unicode escape"))?;
                i += 4;
                if (0xd800..0xdc00).contains(&code) {
                    let low = inner
                        .get(i..i + 2)
                        .filter(|esc| *esc == b"\\u")
                        .and_then(|_| hex_at(inner, i + 2, 4))
                        .filter(|low| (0xdc00..0xe000).contains(low))
                        .ok_or(malformed(i, "unpaired surrogate"))?;
                    i += 6;
                    code = 0x10000 + ((code - 0xd800) << 10) + (low - 0xdc00);
                }
                let ch = char::from_u32(code).ok_or(malformed(i, "unpaired surrogate"))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            b'x' => {
                let byte = hex_at(inner, i, 2).ok_or(malformed(i, "bad byte escape"))?;
                i += 2;
                out.push(byte as u8);
            }
            _ => return Err(malformed(i, "unknown escape")),
        }
    }
    Ok(out)
}

/// Pull the `"data"` string out of a v2 entry.
fn data_member(entry: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    for (key, value) in object_members(entry)? {
        if decode_string(&entry[key.clone()], key.start)? == b"data" {
            if entry[value.start] != b'"' {
                return Err(EnvelopeError::Malformed {
                    offset: value.start,
                    reason: "data member is not a string",
                });
            }
            return decode_string(&entry[value.clone()], value.start);
        }
    }
    Err(EnvelopeError::Malformed {
        offset: 0,
        reason: "entry has no data member",
    })
}
