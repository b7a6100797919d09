//! PasswordModify ([RFC 3062](https://tools.ietf.org/html/rfc3062)), spec §4.10.

use async_trait::async_trait;

use lber::parse::parse_tlv;
use lber::tag::{Tag, TagClass, Tlv};
use lber::write::encode_to_vec;

use crate::connection::Connection;
use crate::entry::{ModOp, Modification};
use crate::error::LdapError;
use crate::extended::{ExtendedHandler, ExtendedResponse, PostAction};
use crate::password;

pub const PASSMOD_OID: &str = "1.3.6.1.4.1.4203.1.11.1";

/// `PasswdModifyRequestValue ::= SEQUENCE { userIdentity [0] OCTET STRING
/// OPTIONAL, oldPasswd [1] OCTET STRING OPTIONAL, newPasswd [2] OCTET STRING
/// OPTIONAL }` (RFC 3062 §1).
#[derive(Default)]
struct Request {
    user_identity: Option<String>,
    old_passwd: Option<String>,
    new_passwd: Option<String>,
}

fn malformed() -> LdapError {
    LdapError::Protocol("malformed password modify request value".to_string())
}

fn tagged_string(children: &[Tlv], tag: u32) -> Result<Option<String>, LdapError> {
    let Some(tlv) = children.iter().find(|t| t.matches(TagClass::Context, tag)) else {
        return Ok(None);
    };
    let bytes = tlv.as_primitive().ok_or_else(malformed)?;
    String::from_utf8(bytes.to_vec()).map(Some).map_err(|_| malformed())
}

fn decode_request(value: Option<&[u8]>) -> Result<Request, LdapError> {
    let Some(value) = value else {
        return Ok(Request::default());
    };
    if value.is_empty() {
        return Ok(Request::default());
    }
    let tlv = parse_tlv(value).map_err(|_| malformed())?;
    let children = tlv.as_constructed().ok_or_else(malformed)?;
    Ok(Request {
        user_identity: tagged_string(children, 0)?,
        old_passwd: tagged_string(children, 1)?,
        new_passwd: tagged_string(children, 2)?,
    })
}

fn encode_response(generated: &str) -> Vec<u8> {
    let tlv = Tag::Sequence(vec![Tag::ContextPrimitive(0, generated.as_bytes().to_vec())]).into_tlv();
    encode_to_vec(&tlv)
}

pub struct PasswordModify;

#[async_trait]
impl ExtendedHandler for PasswordModify {
    fn oid(&self) -> &str {
        PASSMOD_OID
    }

    async fn handle(
        &self,
        conn: &Connection,
        value: Option<Vec<u8>>,
    ) -> Result<(ExtendedResponse, PostAction), LdapError> {
        if conn.settings.password_modify_requires_tls && !conn.is_tls() {
            return Err(LdapError::ConfidentialityRequired(
                "PasswordModify requires a TLS-protected connection",
            ));
        }

        let bind_dn = conn.bind_dn();
        if bind_dn.is_empty() {
            return Err(LdapError::UnwillingToPerform(
                "anonymous connections cannot modify a password".into(),
            ));
        }

        let req = decode_request(value.as_deref())?;
        let target_dn = req.user_identity.clone().unwrap_or_else(|| bind_dn.clone());
        let is_self_change = target_dn == bind_dn;

        if !is_self_change && !conn.settings.admin_dns.contains(&bind_dn) {
            return Err(LdapError::InsufficientAccessRights);
        }

        let entry = conn
            .backend
            .get_entry(&target_dn)
            .await?
            .ok_or(LdapError::NoSuchObject)?;

        if is_self_change {
            let Some(old_passwd) = req.old_passwd.as_deref() else {
                return Err(LdapError::UnwillingToPerform(
                    "self password change requires oldPasswd".into(),
                ));
            };
            let stored = entry
                .attr("userPassword")
                .and_then(|values| values.first())
                .and_then(|v| std::str::from_utf8(v).ok())
                .ok_or(LdapError::InvalidCredentials)?;
            if !password::verify(stored, old_passwd) {
                return Err(LdapError::InvalidCredentials);
            }
        }

        let (new_passwd, response_value) = match req.new_passwd {
            Some(ref new_passwd) => {
                if new_passwd.len() < conn.settings.min_password_length {
                    return Err(LdapError::ConstraintViolation(format!(
                        "new password must be at least {} characters",
                        conn.settings.min_password_length
                    )));
                }
                (new_passwd.clone(), None)
            }
            None => {
                let generated = password::generate(conn.settings.generated_password_length);
                let value = encode_response(&generated);
                (generated, Some(value))
            }
        };

        let hashed = password::hash(&new_passwd, conn.settings.generated_password_scheme);
        let changes = vec![Modification {
            op: ModOp::Replace,
            attribute: "userPassword".to_string(),
            values: vec![hashed.into_bytes()],
        }];
        conn.backend.modify_entry(&target_dn, &changes).await?;

        let response = match response_value {
            Some(bytes) => ExtendedResponse::with_value(bytes),
            None => ExtendedResponse::empty(),
        };
        Ok((response, PostAction::None))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oid_matches_rfc_3062() {
        assert_eq!(PasswordModify.oid(), "1.3.6.1.4.1.4203.1.11.1");
    }

    #[test]
    fn decodes_full_request() {
        let tlv = Tag::Sequence(vec![
            Tag::ContextPrimitive(0, b"uid=alice,dc=example,dc=com".to_vec()),
            Tag::ContextPrimitive(1, b"old".to_vec()),
            Tag::ContextPrimitive(2, b"new".to_vec()),
        ])
        .into_tlv();
        let encoded = encode_to_vec(&tlv);
        let req = decode_request(Some(&encoded)).unwrap();
        assert_eq!(req.user_identity.as_deref(), Some("uid=alice,dc=example,dc=com"));
        assert_eq!(req.old_passwd.as_deref(), Some("old"));
        assert_eq!(req.new_passwd.as_deref(), Some("new"));
    }

    #[test]
    fn absent_value_is_all_none() {
        let req = decode_request(None).unwrap();
        assert!(req.user_identity.is_none());
        assert!(req.old_passwd.is_none());
        assert!(req.new_passwd.is_none());
    }
}
