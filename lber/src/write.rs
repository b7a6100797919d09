//! BER encoding.
//!
//! Mirrors the teacher's `write::encode_into(&mut BytesMut, StructureTag)`
//! entry point, generalized to take a `Tlv` tree built from [`crate::Tag`].

use byteorder::{BigEndian, ByteOrder};

use crate::tag::{Tlv, Value};

fn write_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let nbytes = std::mem::size_of::<usize>() - (len as u64).leading_zeros() as usize / 8;
    let nbytes = nbytes.max(1);
    let mut len_bytes = vec![0u8; nbytes];
    BigEndian::write_uint(&mut len_bytes, len as u64, nbytes);
    out.push(0x80 | nbytes as u8);
    out.extend_from_slice(&len_bytes);
}

fn write_identifier(tlv: &Tlv, out: &mut Vec<u8>) {
    let constructed_bit = if tlv.is_constructed() { 0b0010_0000 } else { 0 };
    if tlv.tag < 0x1f {
        out.push(tlv.class.to_bits() | constructed_bit | tlv.tag as u8);
    } else {
        out.push(tlv.class.to_bits() | constructed_bit | 0x1f);
        let mut n = tlv.tag;
        let mut rev = vec![(n & 0x7f) as u8];
        n >>= 7;
        while n > 0 {
            rev.push(0x80 | (n & 0x7f) as u8);
            n >>= 7;
        }
        rev.reverse();
        out.extend_from_slice(&rev);
    }
}

/// Encode one `Tlv`, appending bytes to `out`. Sequence/set lengths are
/// computed by encoding into a scratch buffer first (the "backpatch" the
/// spec calls for, done here by composition rather than in-place rewrite,
/// since content length isn't known until the inner values are rendered).
pub fn encode(tlv: &Tlv, out: &mut Vec<u8>) {
    match &tlv.value {
        Value::Primitive(bytes) => {
            write_identifier(tlv, out);
            write_length(bytes.len(), out);
            out.extend_from_slice(bytes);
        }
        Value::Constructed(items) => {
            let mut body = Vec::new();
            for item in items {
                encode(item, &mut body);
            }
            write_identifier(tlv, out);
            write_length(body.len(), out);
            out.extend_from_slice(&body);
        }
    }
}

/// Encode a `Tlv` into a freshly allocated buffer.
pub fn encode_to_vec(tlv: &Tlv) -> Vec<u8> {
    let mut out = Vec::new();
    encode(tlv, &mut out);
    out
}
