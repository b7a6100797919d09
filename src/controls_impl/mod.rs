//! Control VALUE payload codecs (spec §4.6, §4.7).
//!
//! The control envelope itself — OID, criticality, opaque value bytes —
//! is already decoded by [`crate::message::Control`] as part of the
//! message parser; this module only reaches inside that opaque `value`
//! for the two controls this core understands on the wire.

pub mod paged_results;

use lber::parse::{parse_tlv, read_int};
use lber::tag::{Tag, Tlv};
use lber::write::encode_to_vec;

use crate::error::LdapError;

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
pub const PERSISTENT_SEARCH_OID: &str = "2.16.840.1.113730.3.4.3";
pub const ENTRY_CHANGE_NOTIFICATION_OID: &str = "2.16.840.1.113730.3.4.7";

fn malformed() -> LdapError {
    LdapError::Protocol("malformed control value".to_string())
}

/// `realSearchControlValue ::= SEQUENCE { size INTEGER, cookie OCTET STRING }`
/// (RFC 2696 §3). Used both for the client's request value and, with
/// `size` reinterpreted as an estimate, the server's response value.
pub fn decode_paged_results_value(value: &[u8]) -> Result<(i64, Vec<u8>), LdapError> {
    let tlv = parse_tlv(value).map_err(|_| malformed())?;
    let children = tlv.as_constructed().ok_or_else(malformed)?;
    let (size_tlv, cookie_tlv) = match children {
        [a, b] => (a, b),
        _ => return Err(malformed()),
    };
    let size = read_int(size_tlv.as_primitive().ok_or_else(malformed)?).map_err(|_| malformed())?;
    let cookie = cookie_tlv.as_primitive().ok_or_else(malformed)?.to_vec();
    Ok((size, cookie))
}

pub fn encode_paged_results_value(size: i64, cookie: &[u8]) -> Vec<u8> {
    let tlv = Tag::Sequence(vec![Tag::Integer(size), Tag::OctetString(cookie.to_vec())]).into_tlv();
    encode_to_vec(&tlv)
}

/// `PersistentSearch ::= SEQUENCE { changeTypes INTEGER, changesOnly
/// BOOLEAN, returnECs BOOLEAN }` (draft-ietf-ldapext-psearch §5).
#[derive(Clone, Copy, Debug)]
pub struct PersistentSearchRequest {
    pub change_types: u32,
    pub changes_only: bool,
    pub return_ecs: bool,
}

pub fn decode_persistent_search_value(value: &[u8]) -> Result<PersistentSearchRequest, LdapError> {
    let tlv = parse_tlv(value).map_err(|_| malformed())?;
    let children = tlv.as_constructed().ok_or_else(malformed)?;
    let (change_types_tlv, changes_only_tlv, return_ecs_tlv) = match children {
        [a, b, c] => (a, b, c),
        _ => return Err(malformed()),
    };
    let change_types =
        read_int(change_types_tlv.as_primitive().ok_or_else(malformed)?).map_err(|_| malformed())? as u32;
    let changes_only = changes_only_tlv.as_primitive().ok_or_else(malformed)?.first().copied().unwrap_or(0) != 0;
    let return_ecs = return_ecs_tlv.as_primitive().ok_or_else(malformed)?.first().copied().unwrap_or(0) != 0;
    Ok(PersistentSearchRequest {
        change_types,
        changes_only,
        return_ecs,
    })
}

/// `EntryChangeNotification ::= SEQUENCE { changeType ENUMERATED,
/// previousDN LDAPDN OPTIONAL, changeNumber INTEGER OPTIONAL }`
/// (draft-ietf-ldapext-psearch §6). This core never assigns change
/// numbers, so that field is always omitted.
pub fn encode_entry_change_notification(change_type: u32, previous_dn: Option<&str>) -> Vec<u8> {
    let mut inner = vec![Tag::Enumerated(change_type as i64)];
    if let Some(dn) = previous_dn {
        inner.push(Tag::OctetString(dn.as_bytes().to_vec()));
    }
    let tlv = Tag::Sequence(inner).into_tlv();
    encode_to_vec(&tlv)
}

/// The control value as an opaque `[0] OCTET STRING` envelope, used when
/// a handler needs to hand the undecoded bytes elsewhere (e.g. back to a
/// test that wants to round-trip it without going through `message.rs`).
pub fn wrap_raw(bytes: Vec<u8>) -> Tlv {
    Tag::ContextPrimitive(0, bytes).into_tlv()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paged_results_value_round_trips() {
        let encoded = encode_paged_results_value(25, b"cookie-bytes");
        let (size, cookie) = decode_paged_results_value(&encoded).unwrap();
        assert_eq!(size, 25);
        assert_eq!(cookie, b"cookie-bytes");
    }

    #[test]
    fn persistent_search_value_decodes() {
        let tlv = Tag::Sequence(vec![Tag::Integer(15), Tag::Boolean(true), Tag::Boolean(false)]).into_tlv();
        let encoded = encode_to_vec(&tlv);
        let req = decode_persistent_search_value(&encoded).unwrap();
        assert_eq!(req.change_types, 15);
        assert!(req.changes_only);
        assert!(!req.return_ecs);
    }

    #[test]
    fn entry_change_notification_encodes_previous_dn_when_present() {
        let encoded = encode_entry_change_notification(8, Some("cn=old,dc=example,dc=com"));
        let tlv = parse_tlv(&encoded).unwrap();
        assert_eq!(tlv.as_constructed().unwrap().len(), 2);
    }

    #[test]
    fn malformed_value_is_rejected() {
        assert!(decode_paged_results_value(&[0xff]).is_err());
    }
}
