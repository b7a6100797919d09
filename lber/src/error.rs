use thiserror::Error;

/// Failure modes of the BER codec.
///
/// These map directly to the fatal/non-fatal distinction in the framing and
/// parsing rules: callers decide, based on the kind and on whether a
/// message-id was already recovered, whether to close the connection or
/// report `ProtocolError` and keep serving.
#[derive(Debug, Error)]
pub enum BerError {
    #[error("unexpected end of input while decoding a BER value")]
    Truncated,
    #[error("indefinite-length encoding is not supported")]
    IndefiniteLength,
    #[error("BER message exceeds the configured size cap of {cap} bytes")]
    TooLarge { cap: usize },
    #[error("outer tag 0x{0:02x} is not a universal constructed SEQUENCE")]
    NotASequence(u8),
    #[error("malformed tag/length header")]
    MalformedHeader,
    #[error("unexpected tag: wanted {wanted}, got class={class:?} tag={tag}")]
    UnexpectedTag {
        wanted: &'static str,
        class: crate::tag::TagClass,
        tag: u32,
    },
    #[error("expected a primitive value")]
    ExpectedPrimitive,
    #[error("expected a constructed value")]
    ExpectedConstructed,
    #[error("value is not valid UTF-8")]
    InvalidUtf8,
    #[error("integer value out of range")]
    IntegerOutOfRange,
}
