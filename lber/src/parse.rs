//! BER decoding.
//!
//! The teacher (`lber::parse`, pre-rewrite) built its tag/length parser on
//! `nom`'s bit-level combinators. This crate has no text grammar to share
//! with a combinator library, so the same three-step shape — identifier
//! octet, length, content — is hand-rolled directly over a byte slice; it
//! reads the same way but without the `nom::IResult` plumbing.

use byteorder::{BigEndian, ByteOrder};

use crate::error::BerError;
use crate::tag::{TagClass, Tlv, Value};

/// Decode an unsigned big-endian integer from raw content octets. LDAP
/// message IDs and most lengths fit comfortably in a `u64`; the codec is
/// liberal in what it accepts, including non-minimal encodings.
pub fn read_uint(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    BigEndian::read_uint(bytes, bytes.len().min(8))
}

/// Decode a signed big-endian (two's complement) integer.
pub fn read_int(bytes: &[u8]) -> Result<i64, BerError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(BerError::IntegerOutOfRange);
    }
    Ok(BigEndian::read_int(bytes, bytes.len()))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BerError> {
        if self.buf.len() < self.pos + n {
            return Err(BerError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_one(&mut self) -> Result<u8, BerError> {
        Ok(self.take(1)?[0])
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Read one identifier-octet + length header. Returns `(class, tag number,
/// constructed flag, content length)`.
fn read_header(cur: &mut Cursor) -> Result<(TagClass, u32, bool, u64), BerError> {
    let ident = cur.take_one()?;
    let class = TagClass::from_bits(ident);
    let constructed = ident & 0b0010_0000 != 0;
    let tag_bits = ident & 0b0001_1111;
    let tag = if tag_bits == 0x1f {
        // High-tag-number form: a base-128 continuation sequence. LDAP
        // never needs it, but decoding it instead of rejecting it keeps
        // the codec liberal, per spec.
        let mut value: u32 = 0;
        loop {
            let b = cur.take_one()?;
            value = (value << 7) | (b & 0x7f) as u32;
            if b & 0x80 == 0 {
                break;
            }
        }
        value
    } else {
        tag_bits as u32
    };

    let len_byte = cur.take_one()?;
    let len = if len_byte & 0x80 == 0 {
        len_byte as u64
    } else {
        let n = len_byte & 0x7f;
        if n == 0 {
            return Err(BerError::IndefiniteLength);
        }
        if n > 8 {
            return Err(BerError::MalformedHeader);
        }
        read_uint(cur.take(n as usize)?)
    };
    Ok((class, tag, constructed, len))
}

/// Decode one full `Tlv` (header + content, recursing into constructed
/// values) starting at the current cursor position.
fn read_tlv(cur: &mut Cursor) -> Result<Tlv, BerError> {
    let (class, tag, constructed, len) = read_header(cur)?;
    let len = usize::try_from(len).map_err(|_| BerError::MalformedHeader)?;
    if len > cur.remaining() {
        return Err(BerError::Truncated);
    }
    let value = if constructed {
        let content = cur.take(len)?;
        let mut inner_cur = Cursor::new(content);
        let mut items = Vec::new();
        while inner_cur.remaining() > 0 {
            items.push(read_tlv(&mut inner_cur)?);
        }
        Value::Constructed(items)
    } else {
        Value::Primitive(cur.take(len)?.to_vec())
    };
    Ok(Tlv { class, tag, value })
}

/// Decode a single `Tlv` from a byte slice that contains exactly one
/// encoded value (as delivered by [`crate::frame::read_frame`]). Trailing
/// bytes are an error: a frame must contain exactly one message.
pub fn parse_tlv(buf: &[u8]) -> Result<Tlv, BerError> {
    let mut cur = Cursor::new(buf);
    let tlv = read_tlv(&mut cur)?;
    if cur.remaining() != 0 {
        return Err(BerError::MalformedHeader);
    }
    Ok(tlv)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tag::Tag;
    use crate::write;

    #[test]
    fn primitive_round_trip() {
        let tlv = Tag::OctetString(b"Hello World!".to_vec()).into_tlv();
        let mut buf = Vec::new();
        write::encode(&tlv, &mut buf);
        let decoded = parse_tlv(&buf).unwrap();
        assert_eq!(decoded, tlv);
    }

    #[test]
    fn constructed_round_trip() {
        let tlv = Tag::Sequence(vec![Tag::OctetString(b"Hello World!".to_vec())]).into_tlv();
        let mut buf = Vec::new();
        write::encode(&tlv, &mut buf);
        let decoded = parse_tlv(&buf).unwrap();
        assert_eq!(decoded, tlv);
    }

    #[test]
    fn long_form_length() {
        let payload = vec![b'x'; 300];
        let tlv = Tag::OctetString(payload.clone()).into_tlv();
        let mut buf = Vec::new();
        write::encode(&tlv, &mut buf);
        assert_eq!(buf[1] & 0x80, 0x80);
        let decoded = parse_tlv(&buf).unwrap();
        assert_eq!(decoded.into_primitive().unwrap(), payload);
    }

    #[test]
    fn indefinite_length_is_fatal() {
        let buf = [0x30, 0x80];
        assert!(matches!(parse_tlv(&buf), Err(BerError::IndefiniteLength)));
    }

    #[test]
    fn truncated_is_an_error() {
        let buf = [0x04, 0x05, b'a', b'b'];
        assert!(matches!(parse_tlv(&buf), Err(BerError::Truncated)));
    }

    #[test]
    fn non_minimal_integer_decodes_liberally() {
        assert_eq!(read_int(&[0x00, 0x00, 0x01]).unwrap(), 1);
        assert_eq!(read_int(&[0xff, 0xff, 0xff]).unwrap(), -1);
    }
}
