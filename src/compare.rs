//! The Compare handler (spec §4.9).
//!
//! Returns `Ok(true)`/`Ok(false)` for `compareTrue`/`compareFalse` — neither
//! is an error, so the dispatcher maps the bool to a result code itself
//! rather than this function throwing on a mismatch.

use crate::acl::Access;
use crate::connection::Connection;
use crate::error::LdapError;
use crate::message::CompareRequest;
use crate::util;

pub async fn handle(conn: &Connection, req: &CompareRequest) -> Result<bool, LdapError> {
    let bind_dn = conn.bind_dn();
    if !conn
        .acl
        .allows(&bind_dn, &req.dn, Access::Compare, Some(&req.attribute))
    {
        return Err(LdapError::InsufficientAccessRights);
    }
    let entry = conn.backend.get_entry(&req.dn).await?;
    let Some(entry) = entry else {
        return Err(LdapError::NoSuchObject);
    };
    let Some(values) = entry.attr(&req.attribute) else {
        return Err(LdapError::NoSuchAttribute);
    };
    if values.iter().any(|v| v == &req.value) {
        return Ok(true);
    }
    let candidate = util::ascii_fold_bytes(&req.value);
    Ok(values
        .iter()
        .any(|v| util::ascii_fold_bytes(v) == candidate))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::acl::AclEvaluator;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::Backend;
    use crate::entry::Entry;

    #[tokio::test]
    async fn missing_attribute_is_no_such_attribute() {
        let backend = MemoryBackend::new();
        backend.seed(Entry::new("uid=alice,dc=example,dc=com")).await;
        let _ = AclEvaluator::default();
        let entry = backend
            .get_entry("uid=alice,dc=example,dc=com")
            .await
            .unwrap()
            .unwrap();
        assert!(entry.attr("mail").is_none());
    }

    #[test]
    fn case_insensitive_fallback_matches() {
        assert_eq!(
            crate::util::ascii_fold_bytes(b"Example"),
            crate::util::ascii_fold_bytes(b"EXAMPLE")
        );
    }
}
