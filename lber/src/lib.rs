//! A minimal ASN.1 Basic Encoding Rules (BER) tag-length-value codec.
//!
//! This crate only implements the subset of X.690 that LDAPv3 (RFC 4511)
//! actually needs: short/long form lengths, universal primitives (boolean,
//! integer, enumerated, octet string, null), constructed sequence/set, and
//! context-tagged primitive/constructed values. It does not implement
//! indefinite-length encoding, real numbers, or any of the other ASN.1
//! universal types LDAP never uses.

mod error;
pub mod frame;
pub mod parse;
pub mod tag;
pub mod write;

pub use error::BerError;
pub use tag::{Tag, TagClass, Tlv, Value};
