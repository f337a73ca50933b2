//! BER → DER re-encoding for CMS envelopes.
//!
//! Signing tools often emit BER rather than DER: indefinite lengths, long
//! length forms with leading zeros, and `eContent` split into a constructed
//! OCTET STRING of segments. [`to_der`] rewrites such input with minimal
//! definite lengths and joins segmented strings, so the `der` crate can
//! decode the result. DER input comes back unchanged.

use thiserror::Error;

const CONSTRUCTED: u8 = 0x20;
const CLASS_MASK: u8 = 0xC0;
const TAG_NUMBER_MASK: u8 = 0x1F;

/// Universal string types that BER allows to be sent in segments. BIT STRING
/// is left out: its segments each carry an unused-bits octet.
const SEGMENTABLE: &[u8] = &[4, 12, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 30];

/// Maximum nesting of constructed values.
pub const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BerError {
    #[error("unexpected end of data at offset {0}")]
    Truncated(usize),
    #[error("value at offset {0} runs past its enclosing value")]
    Overrun(usize),
    #[error("indefinite length on a primitive value at offset {0}")]
    IndefinitePrimitive(usize),
    #[error("length at offset {0} is too large")]
    LengthOverflow(usize),
    #[error("segment of the string at offset {0} has a different type")]
    BadSegment(usize),
    #[error("values nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("{0} trailing byte(s) after the value")]
    TrailingData(usize),
}

/// Re-encode one BER value as DER.
pub fn to_der(input: &[u8]) -> Result<Vec<u8>, BerError> {
    let mut reader = Reader { input, pos: 0 };
    let element = reader.element(0)?;
    if reader.pos != input.len() {
        return Err(BerError::TrailingData(input.len() - reader.pos));
    }
    let mut out = Vec::with_capacity(input.len());
    element.encode(&mut out);
    Ok(out)
}

/// A decoded value: identifier octets plus DER content octets.
struct Element {
    identifier: Vec<u8>,
    content: Vec<u8>,
}

impl Element {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.identifier);
        push_length(out, self.content.len());
        out.extend_from_slice(&self.content);
    }
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn is_segmentable(first: u8) -> bool {
    first & CLASS_MASK == 0 && SEGMENTABLE.contains(&(first & TAG_NUMBER_MASK))
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, BerError> {
        let b = *self.input.get(self.pos).ok_or(BerError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BerError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.input.len())
            .ok_or(BerError::Truncated(self.input.len()))?;
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn identifier(&mut self) -> Result<&'a [u8], BerError> {
        let start = self.pos;
        let first = self.byte()?;
        if first & TAG_NUMBER_MASK == TAG_NUMBER_MASK {
            // High tag number form: base-128 digits, last one without 0x80.
            while self.byte()? & 0x80 != 0 {}
        }
        Ok(&self.input[start..self.pos])
    }

    /// `None` for the indefinite form.
    fn length(&mut self) -> Result<Option<usize>, BerError> {
        let at = self.pos;
        let first = self.byte()?;
        if first < 0x80 {
            return Ok(Some(first as usize));
        }
        if first == 0x80 {
            return Ok(None);
        }
        let mut len = 0usize;
        for &b in self.take((first & 0x7F) as usize)? {
            len = len
                .checked_mul(256)
                .and_then(|l| l.checked_add(b as usize))
                .ok_or(BerError::LengthOverflow(at))?;
        }
        Ok(Some(len))
    }

    fn at_end_of_contents(&self) -> bool {
        self.input.get(self.pos..self.pos + 2) == Some(&[0u8, 0][..])
    }

    fn element(&mut self, depth: usize) -> Result<Element, BerError> {
        if depth > MAX_DEPTH {
            return Err(BerError::TooDeep);
        }
        let offset = self.pos;
        let identifier = self.identifier()?;
        let length = self.length()?;
        let first = identifier[0];

        if first & CONSTRUCTED == 0 {
            let len = length.ok_or(BerError::IndefinitePrimitive(offset))?;
            return Ok(Element {
                identifier: identifier.to_vec(),
                content: self.take(len)?.to_vec(),
            });
        }

        let mut children = Vec::new();
        match length {
            Some(len) => {
                let end = self
                    .pos
                    .checked_add(len)
                    .filter(|&end| end <= self.input.len())
                    .ok_or(BerError::Truncated(self.input.len()))?;
                while self.pos < end {
                    let child_at = self.pos;
                    children.push(self.element(depth + 1)?);
                    if self.pos > end {
                        return Err(BerError::Overrun(child_at));
                    }
                }
            }
            None => {
                while !self.at_end_of_contents() {
                    children.push(self.element(depth + 1)?);
                }
                self.pos += 2;
            }
        }

        let mut content = Vec::new();
        if is_segmentable(first) {
            let primitive = first & !CONSTRUCTED;
            for child in children {
                if child.identifier != [primitive] {
                    return Err(BerError::BadSegment(offset));
                }
                content.extend(child.content);
            }
            return Ok(Element {
                identifier: vec![primitive],
                content,
            });
        }
        for child in &children {
            child.encode(&mut content);
        }
        Ok(Element {
            identifier: identifier.to_vec(),
            content,
        })
    }
}
