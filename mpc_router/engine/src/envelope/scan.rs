//! Depth-tracking scanner over the nested-brace envelope format.
//!
//! The scanner never interprets payload contents. It only finds where a value
//! starts and ends, honoring string literals so that braces quoted inside a
//! payload do not move the depth.

use std::ops::Range;

use super::EnvelopeError;

pub(crate) struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Scanner { bytes, pos: 0 }
    }

    fn malformed(&self, reason: &'static str) -> EnvelopeError {
        EnvelopeError::Malformed {
            offset: self.pos,
            reason,
        }
    }

    pub(crate) fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume `byte` if it is next.
    pub(crate) fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, byte: u8, reason: &'static str) -> Result<(), EnvelopeError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.malformed(reason))
        }
    }

    /// True once only whitespace remains.
    pub(crate) fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.bytes.len()
    }

    /// Span of a string literal, quotes included.
    pub(crate) fn string(&mut self) -> Result<Range<usize>, EnvelopeError> {
        let start = self.pos;
        self.expect(b'"', "expected a string")?;

        let mut escaped = false;
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                return Ok(start..self.pos);
            }
        }

        Err(EnvelopeError::Malformed {
            offset: start,
            reason: "unterminated string",
        })
    }

    /// Span of the next value: object, array, string, or bare scalar.
    pub(crate) fn value(&mut self) -> Result<Range<usize>, EnvelopeError> {
        let start = self.pos;
        match self.peek() {
            Some(b'{') | Some(b'[') => {
                self.nested()?;
                Ok(start..self.pos)
            }
            Some(b'"') => self.string(),
            None | Some(b'}') | Some(b']') | Some(b',') | Some(b':') => {
                Err(self.malformed("expected a value"))
            }
            Some(_) => {
                while let Some(b) = self.peek() {
                    if b.is_ascii_whitespace()
                        || matches!(b, b',' | b':' | b'}' | b']' | b'{' | b'[' | b'"')
                    {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(start..self.pos)
            }
        }
    }

    /// Walk a brace or bracket structure to its matching close.
    ///
    /// `closers.len()` is the depth. The walk only succeeds when the depth
    /// returns to zero; running out of input first is an error, so a caller
    /// never sees a partial span.
    fn nested(&mut self) -> Result<(), EnvelopeError> {
        let start = self.pos;
        let mut closers: Vec<u8> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;

            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }

            match b {
                b'"' => in_string = true,
                b'{' => closers.push(b'}'),
                b'[' => closers.push(b']'),
                b'}' | b']' => {
                    if closers.pop() != Some(b) {
                        self.pos -= 1;
                        return Err(self.malformed("mismatched closing delimiter"));
                    }
                    if closers.is_empty() {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        Err(EnvelopeError::Malformed {
            offset: start,
            reason: "unbalanced delimiters",
        })
    }
}

/// Parse `bytes` as exactly one object and return each member's key and value span.
///
/// Only top-level members are reported; keys nested inside a value are never
/// visible to callers.
pub(crate) fn object_members(
    bytes: &[u8],
) -> Result<Vec<(Range<usize>, Range<usize>)>, EnvelopeError> {
    let mut scanner = Scanner::new(bytes);
    scanner.skip_ws();
    scanner.expect(b'{', "expected '{'")?;

    let mut members = Vec::new();
    scanner.skip_ws();
    if !scanner.eat(b'}') {
        loop {
            scanner.skip_ws();
            let key = scanner.string()?;
            scanner.skip_ws();
            scanner.expect(b':', "expected ':' after key")?;
            scanner.skip_ws();
            let value = scanner.value()?;
            members.push((key, value));

            scanner.skip_ws();
            if scanner.eat(b',') {
                continue;
            }
            scanner.expect(b'}', "expected ',' or '}'")?;
            break;
        }
    }

    if !scanner.at_end() {
        return Err(scanner.malformed("trailing bytes after envelope"));
    }
    Ok(members)
}

/// Whether `payload` is exactly one balanced object or array with nothing around it.
pub(crate) fn is_structured(payload: &[u8]) -> bool {
    if !matches!(payload.first(), Some(b'{') | Some(b'[')) {
        return false;
    }
    let mut scanner = Scanner::new(payload);
    scanner
        .value()
        .is_ok_and(|span| span.end == payload.len())
}
