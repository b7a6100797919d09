//! The typed LDAP message layer.
//!
//! Maps between [`lber::Tlv`] and the closed union of RFC 4511 v3
//! operations. Protocol-op application tag numbers follow RFC 4511 §4.2's
//! PROTOCOL-OP assignment (`bind.rs` tag 0, `unbind.rs` tag 2, search
//! request/entry/done tags 3/4/5, `modify.rs` tag 6/7, `add.rs` tag 8/9,
//! `delete.rs` tag 10/11, `modifydn.rs` tag 12/13, `compare.rs` tag 14/15,
//! `abandon.rs` tag 16, extended tag 23/24).

use lber::tag::{Tag as BerTag, TagClass, Tlv};
use lber::write;

use crate::entry::{Entry, ModOp, Modification};
use crate::filter::{self, Filter};
use crate::result::LdapResult;
use crate::result_code::ResultCode;
use crate::search::Scope;

pub const TAG_BIND_REQUEST: u32 = 0;
pub const TAG_BIND_RESPONSE: u32 = 1;
pub const TAG_UNBIND_REQUEST: u32 = 2;
pub const TAG_SEARCH_REQUEST: u32 = 3;
pub const TAG_SEARCH_RESULT_ENTRY: u32 = 4;
pub const TAG_SEARCH_RESULT_DONE: u32 = 5;
pub const TAG_MODIFY_REQUEST: u32 = 6;
pub const TAG_MODIFY_RESPONSE: u32 = 7;
pub const TAG_ADD_REQUEST: u32 = 8;
pub const TAG_ADD_RESPONSE: u32 = 9;
pub const TAG_DEL_REQUEST: u32 = 10;
pub const TAG_DEL_RESPONSE: u32 = 11;
pub const TAG_MODIFY_DN_REQUEST: u32 = 12;
pub const TAG_MODIFY_DN_RESPONSE: u32 = 13;
pub const TAG_COMPARE_REQUEST: u32 = 14;
pub const TAG_COMPARE_RESPONSE: u32 = 15;
pub const TAG_ABANDON_REQUEST: u32 = 16;
pub const TAG_EXTENDED_REQUEST: u32 = 23;
pub const TAG_EXTENDED_RESPONSE: u32 = 24;

/// An (OID, criticality, opaque value) control.
#[derive(Clone, Debug)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub enum AuthChoice {
    Simple(String),
    Sasl,
}

#[derive(Clone, Debug)]
pub struct BindRequest {
    pub version: u8,
    pub name: String,
    pub auth: AuthChoice,
}

#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: Scope,
    pub size_limit: i64,
    pub time_limit: i64,
    pub types_only: bool,
    pub filter: Filter,
    pub attributes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ModifyDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CompareRequest {
    pub dn: String,
    pub attribute: String,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ExtendedRequest {
    pub oid: String,
    pub value: Option<Vec<u8>>,
}

/// The closed union of RFC 4511 v3 protocol operations (spec §3).
#[derive(Clone, Debug)]
pub enum ProtocolOp {
    BindRequest(BindRequest),
    BindResponse(LdapResult),
    UnbindRequest,
    SearchRequest(SearchRequest),
    SearchResultEntry { dn: String, attributes: Vec<(String, Vec<Vec<u8>>)> },
    SearchResultDone(LdapResult),
    ModifyRequest { dn: String, changes: Vec<Modification> },
    ModifyResponse(LdapResult),
    AddRequest(Entry),
    AddResponse(LdapResult),
    DelRequest(String),
    DelResponse(LdapResult),
    ModifyDnRequest(ModifyDnRequest),
    ModifyDnResponse(LdapResult),
    CompareRequest(CompareRequest),
    CompareResponse(LdapResult),
    AbandonRequest(i32),
    ExtendedRequest(ExtendedRequest),
    ExtendedResponse {
        result: LdapResult,
        oid: Option<String>,
        value: Option<Vec<u8>>,
    },
}

#[derive(Clone, Debug)]
pub struct Message {
    pub id: i32,
    pub op: ProtocolOp,
    pub controls: Vec<Control>,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageDecodeError {
    #[error(transparent)]
    Ber(#[from] lber::BerError),
    #[error(transparent)]
    Filter(#[from] filter::FilterDecodeError),
    #[error("malformed LDAP message")]
    Malformed,
    #[error("unsupported or unimplemented protocol operation (tag {0})")]
    UnsupportedOp(u32),
}

type DResult<T> = Result<T, MessageDecodeError>;

fn octet_string(tlv: &Tlv) -> DResult<Vec<u8>> {
    tlv.as_primitive()
        .map(|b| b.to_vec())
        .ok_or(MessageDecodeError::Malformed)
}

fn utf8(tlv: &Tlv) -> DResult<String> {
    Ok(String::from_utf8_lossy(&octet_string(tlv)?).into_owned())
}

fn int(tlv: &Tlv) -> DResult<i64> {
    let bytes = tlv.as_primitive().ok_or(MessageDecodeError::Malformed)?;
    lber::parse::read_int(bytes).map_err(Into::into)
}

fn boolean(tlv: &Tlv) -> DResult<bool> {
    let bytes = tlv.as_primitive().ok_or(MessageDecodeError::Malformed)?;
    Ok(bytes.first().copied().unwrap_or(0) != 0)
}

fn children(tlv: &Tlv) -> DResult<&[Tlv]> {
    tlv.as_constructed().ok_or(MessageDecodeError::Malformed)
}

/// Decode the full outer `LDAPMessage` SEQUENCE from an already-framed
/// buffer (the bytes [`lber::frame::read_frame`] returned).
///
/// A failure here (malformed envelope, unreadable message-id) is fatal to
/// the connection — there's no id to reply against. A failure decoding the
/// operation body itself is recoverable (the id is already known), so
/// callers that need to distinguish the two should use
/// [`decode_message_parts`] instead and turn an inner failure into a
/// `ProtocolError` response tagged with the returned id.
pub fn decode_message(buf: &[u8]) -> DResult<Message> {
    let (id, _request_tag, op, controls) = decode_message_parts(buf)?;
    Ok(Message {
        id,
        op: op?,
        controls,
    })
}

/// Like [`decode_message`], but keeps an operation-body decode failure
/// alongside the message-id and the raw request application tag instead of
/// discarding them (§4.2's error policy: a malformed envelope is fatal, a
/// malformed known-id operation is not — the tag lets the caller reply
/// `ProtocolError` in the right response shape via
/// [`response_tag_for_request`] without knowing the concrete operation).
pub fn decode_message_parts(buf: &[u8]) -> DResult<(i32, u32, DResult<ProtocolOp>, Vec<Control>)> {
    let tlv = lber::parse::parse_tlv(buf)?;
    let items = children(&tlv)?;
    if items.len() < 2 {
        return Err(MessageDecodeError::Malformed);
    }
    let id = int(&items[0])? as i32;
    let request_tag = items[1].tag;
    let op = decode_op(&items[1]);
    let controls = match items.get(2) {
        Some(t) if t.matches(TagClass::Context, 0) => decode_controls(t)?,
        _ => Vec::new(),
    };
    Ok((id, request_tag, op, controls))
}

fn decode_controls(tlv: &Tlv) -> DResult<Vec<Control>> {
    let mut out = Vec::new();
    for item in children(tlv)? {
        let parts = children(item)?;
        let oid = parts.first().map(utf8).ok_or(MessageDecodeError::Malformed)??;
        let mut rest = parts.iter().skip(1);
        let mut critical = false;
        let mut value = None;
        if let Some(next) = rest.next() {
            if next.class == TagClass::Universal && next.tag == lber::tag::universal::BOOLEAN {
                critical = boolean(next)?;
                if let Some(v) = rest.next() {
                    value = Some(octet_string(v)?);
                }
            } else {
                value = Some(octet_string(next)?);
            }
        }
        out.push(Control {
            oid,
            critical,
            value,
        });
    }
    Ok(out)
}

fn decode_op(tlv: &Tlv) -> DResult<ProtocolOp> {
    if tlv.class != TagClass::Application {
        return Err(MessageDecodeError::Malformed);
    }
    match tlv.tag {
        TAG_BIND_REQUEST => decode_bind_request(tlv),
        TAG_UNBIND_REQUEST => Ok(ProtocolOp::UnbindRequest),
        TAG_SEARCH_REQUEST => decode_search_request(tlv),
        TAG_MODIFY_REQUEST => decode_modify_request(tlv),
        TAG_ADD_REQUEST => decode_add_request(tlv),
        TAG_DEL_REQUEST => Ok(ProtocolOp::DelRequest(utf8(tlv)?)),
        TAG_MODIFY_DN_REQUEST => decode_modify_dn_request(tlv),
        TAG_COMPARE_REQUEST => decode_compare_request(tlv),
        TAG_ABANDON_REQUEST => Ok(ProtocolOp::AbandonRequest(int(tlv)? as i32)),
        TAG_EXTENDED_REQUEST => decode_extended_request(tlv),
        other => Err(MessageDecodeError::UnsupportedOp(other)),
    }
}

fn decode_bind_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let version = int(items.first().ok_or(MessageDecodeError::Malformed)?)? as u8;
    let name = utf8(items.get(1).ok_or(MessageDecodeError::Malformed)?)?;
    let auth_tlv = items.get(2).ok_or(MessageDecodeError::Malformed)?;
    let auth = match auth_tlv.tag {
        0 => AuthChoice::Simple(utf8(auth_tlv)?),
        3 => AuthChoice::Sasl,
        _ => return Err(MessageDecodeError::Malformed),
    };
    Ok(ProtocolOp::BindRequest(BindRequest {
        version,
        name,
        auth,
    }))
}

fn decode_search_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let base_dn = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let scope = match int(items.get(1).ok_or(MessageDecodeError::Malformed)?)? {
        0 => Scope::Base,
        1 => Scope::OneLevel,
        2 => Scope::Subtree,
        _ => return Err(MessageDecodeError::Malformed),
    };
    // items[2] is derefAliases: not meaningful without alias support, ignored.
    let size_limit = int(items.get(3).ok_or(MessageDecodeError::Malformed)?)?;
    let time_limit = int(items.get(4).ok_or(MessageDecodeError::Malformed)?)?;
    let types_only = boolean(items.get(5).ok_or(MessageDecodeError::Malformed)?)?;
    let filter = filter::decode(items.get(6).ok_or(MessageDecodeError::Malformed)?)?;
    let attributes = match items.get(7) {
        Some(t) => children(t)?.iter().map(utf8).collect::<DResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(ProtocolOp::SearchRequest(SearchRequest {
        base_dn,
        scope,
        size_limit,
        time_limit,
        types_only,
        filter,
        attributes,
    }))
}

fn decode_modify_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let dn = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let mut changes = Vec::new();
    for change in children(items.get(1).ok_or(MessageDecodeError::Malformed)?)? {
        let parts = children(change)?;
        let op = match int(parts.first().ok_or(MessageDecodeError::Malformed)?)? {
            0 => ModOp::Add,
            1 => ModOp::Delete,
            2 => ModOp::Replace,
            _ => return Err(MessageDecodeError::Malformed),
        };
        let attr_parts = children(parts.get(1).ok_or(MessageDecodeError::Malformed)?)?;
        let attribute = utf8(attr_parts.first().ok_or(MessageDecodeError::Malformed)?)?;
        let values = match attr_parts.get(1) {
            Some(set) => children(set)?.iter().map(octet_string).collect::<DResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        changes.push(Modification {
            op,
            attribute,
            values,
        });
    }
    Ok(ProtocolOp::ModifyRequest { dn, changes })
}

fn decode_add_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let dn = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let mut entry = Entry::new(dn);
    for attr in children(items.get(1).ok_or(MessageDecodeError::Malformed)?)? {
        let parts = children(attr)?;
        let name = utf8(parts.first().ok_or(MessageDecodeError::Malformed)?)?;
        let values = match parts.get(1) {
            Some(set) => children(set)?.iter().map(octet_string).collect::<DResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        entry.set_attr(&name, values);
    }
    Ok(ProtocolOp::AddRequest(entry))
}

fn decode_modify_dn_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let dn = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let new_rdn = utf8(items.get(1).ok_or(MessageDecodeError::Malformed)?)?;
    let delete_old_rdn = boolean(items.get(2).ok_or(MessageDecodeError::Malformed)?)?;
    let new_superior = match items.get(3) {
        Some(t) => Some(utf8(t)?),
        None => None,
    };
    Ok(ProtocolOp::ModifyDnRequest(ModifyDnRequest {
        dn,
        new_rdn,
        delete_old_rdn,
        new_superior,
    }))
}

fn decode_compare_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let dn = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let ava = children(items.get(1).ok_or(MessageDecodeError::Malformed)?)?;
    let attribute = utf8(ava.first().ok_or(MessageDecodeError::Malformed)?)?;
    let value = octet_string(ava.get(1).ok_or(MessageDecodeError::Malformed)?)?;
    Ok(ProtocolOp::CompareRequest(CompareRequest {
        dn,
        attribute,
        value,
    }))
}

fn decode_extended_request(tlv: &Tlv) -> DResult<ProtocolOp> {
    let items = children(tlv)?;
    let oid = utf8(items.first().ok_or(MessageDecodeError::Malformed)?)?;
    let value = match items.get(1) {
        Some(t) => Some(octet_string(t)?),
        None => None,
    };
    Ok(ProtocolOp::ExtendedRequest(ExtendedRequest { oid, value }))
}

// --- Encoding -------------------------------------------------------------

fn result_tags(result: &LdapResult) -> Vec<BerTag> {
    vec![
        BerTag::Enumerated(result.code.code() as i64),
        BerTag::OctetString(result.matched_dn.clone().into_bytes()),
        BerTag::OctetString(result.message.clone().into_bytes()),
    ]
}

fn encode_controls(controls: &[Control]) -> Option<BerTag> {
    if controls.is_empty() {
        return None;
    }
    Some(BerTag::ContextConstructed(
        0,
        controls
            .iter()
            .map(|c| {
                let mut seq = vec![BerTag::OctetString(c.oid.clone().into_bytes())];
                if c.critical {
                    seq.push(BerTag::Boolean(true));
                }
                if let Some(v) = &c.value {
                    seq.push(BerTag::OctetString(v.clone()));
                }
                BerTag::Sequence(seq)
            })
            .collect(),
    ))
}

fn wrap_message(id: i32, op_tag: BerTag, controls: &[Control]) -> Vec<u8> {
    let mut seq = vec![BerTag::Integer(id as i64), op_tag];
    if let Some(ctrls) = encode_controls(controls) {
        seq.push(ctrls);
    }
    let tlv = BerTag::Sequence(seq).into_tlv();
    write::encode_to_vec(&tlv)
}

fn op_seq(app_tag: u32, inner: Vec<BerTag>) -> BerTag {
    let tlv = BerTag::Sequence(inner).into_tlv();
    let lber::tag::Value::Constructed(items) = tlv.value else {
        unreachable!()
    };
    BerTag::Raw(Tlv {
        class: TagClass::Application,
        tag: app_tag,
        value: lber::tag::Value::Constructed(items),
    })
}

pub fn encode_bind_response(id: i32, result: &LdapResult, controls: &[Control]) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_BIND_RESPONSE, result_tags(result)), controls)
}

pub fn encode_search_result_entry(
    id: i32,
    dn: &str,
    attributes: &[(String, Vec<Vec<u8>>)],
) -> Vec<u8> {
    let attrs = attributes
        .iter()
        .map(|(name, values)| {
            BerTag::Sequence(vec![
                BerTag::OctetString(name.clone().into_bytes()),
                BerTag::Set(values.iter().map(|v| BerTag::OctetString(v.clone())).collect()),
            ])
        })
        .collect();
    wrap_message(
        id,
        op_seq(
            TAG_SEARCH_RESULT_ENTRY,
            vec![BerTag::OctetString(dn.to_string().into_bytes()), BerTag::Sequence(attrs)],
        ),
        &[],
    )
}

/// Like [`encode_search_result_entry`], but attaches per-message controls
/// (spec §4.7: the EntryChangeNotification control rides on the
/// `SearchResultEntry` it describes, not on a later response).
pub fn encode_search_result_entry_with_controls(
    id: i32,
    dn: &str,
    attributes: &[(String, Vec<Vec<u8>>)],
    controls: &[Control],
) -> Vec<u8> {
    let attrs = attributes
        .iter()
        .map(|(name, values)| {
            BerTag::Sequence(vec![
                BerTag::OctetString(name.clone().into_bytes()),
                BerTag::Set(values.iter().map(|v| BerTag::OctetString(v.clone())).collect()),
            ])
        })
        .collect();
    wrap_message(
        id,
        op_seq(
            TAG_SEARCH_RESULT_ENTRY,
            vec![BerTag::OctetString(dn.to_string().into_bytes()), BerTag::Sequence(attrs)],
        ),
        controls,
    )
}

pub fn encode_search_result_done(id: i32, result: &LdapResult, controls: &[Control]) -> Vec<u8> {
    wrap_message(
        id,
        op_seq(TAG_SEARCH_RESULT_DONE, result_tags(result)),
        controls,
    )
}

pub fn encode_modify_response(id: i32, result: &LdapResult) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_MODIFY_RESPONSE, result_tags(result)), &[])
}

pub fn encode_add_response(id: i32, result: &LdapResult) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_ADD_RESPONSE, result_tags(result)), &[])
}

pub fn encode_del_response(id: i32, result: &LdapResult) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_DEL_RESPONSE, result_tags(result)), &[])
}

pub fn encode_modify_dn_response(id: i32, result: &LdapResult) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_MODIFY_DN_RESPONSE, result_tags(result)), &[])
}

pub fn encode_compare_response(id: i32, result: &LdapResult) -> Vec<u8> {
    wrap_message(id, op_seq(TAG_COMPARE_RESPONSE, result_tags(result)), &[])
}

/// The response application tag for a given request application tag, used
/// to reply `ProtocolError` to a request whose body failed to decode
/// without knowing its concrete type (§4.2's "respond ProtocolError and
/// continue" path). Requests with no response shape (Unbind, Abandon) and
/// unrecognized tags return `None` — the caller closes the connection
/// instead of replying.
pub fn response_tag_for_request(request_tag: u32) -> Option<u32> {
    match request_tag {
        TAG_BIND_REQUEST => Some(TAG_BIND_RESPONSE),
        TAG_SEARCH_REQUEST => Some(TAG_SEARCH_RESULT_DONE),
        TAG_MODIFY_REQUEST => Some(TAG_MODIFY_RESPONSE),
        TAG_ADD_REQUEST => Some(TAG_ADD_RESPONSE),
        TAG_DEL_REQUEST => Some(TAG_DEL_RESPONSE),
        TAG_MODIFY_DN_REQUEST => Some(TAG_MODIFY_DN_RESPONSE),
        TAG_COMPARE_REQUEST => Some(TAG_COMPARE_RESPONSE),
        TAG_EXTENDED_REQUEST => Some(TAG_EXTENDED_RESPONSE),
        _ => None,
    }
}

/// Encode a bare `ProtocolError` response of the given response shape, with
/// no matched-DN and the given diagnostic message.
pub fn encode_protocol_error(id: i32, response_tag: u32, diagnostic: &str) -> Vec<u8> {
    let result = LdapResult::new(ResultCode::ProtocolError, diagnostic);
    wrap_message(id, op_seq(response_tag, result_tags(&result)), &[])
}

pub fn encode_extended_response(
    id: i32,
    result: &LdapResult,
    oid: Option<&str>,
    value: Option<&[u8]>,
) -> Vec<u8> {
    let mut tags = result_tags(result);
    if let Some(oid) = oid {
        tags.push(BerTag::ContextPrimitive(10, oid.to_string().into_bytes()));
    }
    if let Some(value) = value {
        tags.push(BerTag::ContextPrimitive(11, value.to_vec()));
    }
    wrap_message(id, op_seq(TAG_EXTENDED_RESPONSE, tags), &[])
}
