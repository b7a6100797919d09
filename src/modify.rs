//! The Modify handler (spec §4.8).

use crate::acl::Access;
use crate::connection::Connection;
use crate::dn;
use crate::entry::Modification;
use crate::error::LdapError;

pub async fn handle(
    conn: &Connection,
    target_dn: &str,
    changes: &[Modification],
) -> Result<(), LdapError> {
    if !dn::is_well_formed(target_dn) {
        return Err(LdapError::InvalidDnSyntax(target_dn.to_string()));
    }
    let bind_dn = conn.bind_dn();
    if !conn.acl.allows(&bind_dn, target_dn, Access::Write, None) {
        return Err(LdapError::InsufficientAccessRights);
    }
    conn.backend.modify_entry(target_dn, changes).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::Backend;
    use crate::entry::{Entry, ModOp};

    #[tokio::test]
    async fn modifying_missing_entry_is_no_such_object() {
        let backend = MemoryBackend::new();
        let changes = vec![Modification {
            op: ModOp::Replace,
            attribute: "cn".into(),
            values: vec![b"X".to_vec()],
        }];
        let err = backend
            .modify_entry("uid=ghost,dc=example,dc=com", &changes)
            .await
            .unwrap_err();
        assert!(matches!(LdapError::from(err), LdapError::NoSuchObject));
    }

    #[tokio::test]
    async fn replace_overwrites_values() {
        let backend = MemoryBackend::new();
        backend
            .seed(Entry::new("uid=alice,dc=example,dc=com").with_attr("cn", vec![b"Alice".to_vec()]))
            .await;
        let changes = vec![Modification {
            op: ModOp::Replace,
            attribute: "cn".into(),
            values: vec![b"Alicia".to_vec()],
        }];
        backend
            .modify_entry("uid=alice,dc=example,dc=com", &changes)
            .await
            .unwrap();
        let entry = backend
            .get_entry("uid=alice,dc=example,dc=com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.attr("cn").unwrap(), &vec![b"Alicia".to_vec()]);
    }
}
