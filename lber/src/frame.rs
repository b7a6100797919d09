//! The length-delimited frame reader described in spec §4.1.
//!
//! Reading happens in two steps so that a single oversized or malformed
//! length never causes an unbounded allocation: the header is decoded from
//! a small fixed read, then exactly that many content bytes are read.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::BerError;

/// Universal constructed SEQUENCE tag: `0x30`. Every outer LDAPMessage is
/// tagged this way; anything else is a fatal framing error.
pub const SEQUENCE_TAG: u8 = 0x30;

/// Default per-message size cap (16 MiB), matching spec §4.1.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read exactly one framed LDAP message (tag + length + body) from `r`,
/// returning the full encoded bytes (ready to hand to [`crate::parse::parse_tlv`]).
///
/// Returns `Ok(None)` if the stream is closed before any byte of a new
/// message has been read (clean EOF between messages). Any other failure,
/// including EOF in the middle of a message, is `Err` and fatal to the
/// connection per spec §4.1/§7.
pub async fn read_frame<R: AsyncRead + Unpin>(
    r: &mut R,
    max_len: usize,
) -> Result<Option<Vec<u8>>, BerError> {
    let mut tag_buf = [0u8; 1];
    let n = r
        .read(&mut tag_buf)
        .await
        .map_err(|_| BerError::Truncated)?;
    if n == 0 {
        return Ok(None);
    }
    if tag_buf[0] != SEQUENCE_TAG {
        return Err(BerError::NotASequence(tag_buf[0]));
    }

    let mut len_byte = [0u8; 1];
    r.read_exact(&mut len_byte)
        .await
        .map_err(|_| BerError::Truncated)?;
    let body_len: usize = if len_byte[0] & 0x80 == 0 {
        len_byte[0] as usize
    } else {
        let n_len_bytes = len_byte[0] & 0x7f;
        if n_len_bytes == 0 {
            return Err(BerError::IndefiniteLength);
        }
        if n_len_bytes as usize > std::mem::size_of::<usize>() {
            return Err(BerError::TooLarge { cap: max_len });
        }
        let mut len_bytes = vec![0u8; n_len_bytes as usize];
        r.read_exact(&mut len_bytes)
            .await
            .map_err(|_| BerError::Truncated)?;
        len_bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize)
    };

    if body_len > max_len {
        return Err(BerError::TooLarge { cap: max_len });
    }

    let mut header = Vec::with_capacity(2 + body_len);
    header.push(tag_buf[0]);
    header.push(len_byte[0]);
    // Re-serialize the long-form length bytes we already consumed above;
    // simplest is to just recompute them rather than carry a second buffer.
    if len_byte[0] & 0x80 != 0 {
        let n_len_bytes = len_byte[0] & 0x7f;
        let mut rem = body_len;
        let mut len_bytes = vec![0u8; n_len_bytes as usize];
        for i in (0..n_len_bytes as usize).rev() {
            len_bytes[i] = (rem & 0xff) as u8;
            rem >>= 8;
        }
        header.extend_from_slice(&len_bytes);
    }

    let mut body = vec![0u8; body_len];
    r.read_exact(&mut body)
        .await
        .map_err(|_| BerError::Truncated)?;
    header.extend_from_slice(&body);
    Ok(Some(header))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tag::Tag;
    use crate::write;

    #[tokio::test]
    async fn reads_one_message() {
        let tlv = Tag::Sequence(vec![Tag::Integer(1), Tag::OctetString(b"hi".to_vec())]).into_tlv();
        let bytes = write::encode_to_vec(&tlv);
        let mut cursor = std::io::Cursor::new(bytes.clone());
        let frame = read_frame(&mut cursor, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, bytes);
    }

    #[tokio::test]
    async fn eof_between_messages_is_clean() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn oversized_message_is_rejected() {
        let tlv = Tag::OctetString(vec![0u8; 128]).into_tlv();
        let bytes = write::encode_to_vec(&tlv);
        let mut cursor = std::io::Cursor::new(bytes);
        let err = read_frame(&mut cursor, 32).await.unwrap_err();
        assert!(matches!(err, BerError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn wrong_outer_tag_is_fatal() {
        let mut cursor = std::io::Cursor::new(vec![0x31u8, 0x00]);
        let err = read_frame(&mut cursor, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, BerError::NotASequence(0x31)));
    }
}
