//! The ModifyDN handler (spec §4.8).

use crate::acl::Access;
use crate::connection::Connection;
use crate::dn;
use crate::error::LdapError;
use crate::message::ModifyDnRequest;

pub async fn handle(conn: &Connection, req: &ModifyDnRequest) -> Result<(), LdapError> {
    if !dn::is_well_formed(&req.dn) {
        return Err(LdapError::InvalidDnSyntax(req.dn.clone()));
    }
    if req.new_rdn.is_empty() {
        return Err(LdapError::InvalidDnSyntax(req.new_rdn.clone()));
    }
    let bind_dn = conn.bind_dn();
    if !conn.acl.allows(&bind_dn, &req.dn, Access::Write, None) {
        return Err(LdapError::InsufficientAccessRights);
    }
    conn.backend
        .modify_dn(
            &req.dn,
            &req.new_rdn,
            req.delete_old_rdn,
            req.new_superior.as_deref(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::Backend;
    use crate::entry::Entry;

    #[tokio::test]
    async fn renaming_a_leaf_moves_it() {
        let backend = MemoryBackend::new();
        backend.seed(Entry::new("dc=example,dc=com")).await;
        backend
            .seed(Entry::new("uid=alice,dc=example,dc=com"))
            .await;
        backend
            .modify_dn("uid=alice,dc=example,dc=com", "uid=alicia", false, None)
            .await
            .unwrap();
        assert!(backend
            .get_entry("uid=alicia,dc=example,dc=com")
            .await
            .unwrap()
            .is_some());
        assert!(backend
            .get_entry("uid=alice,dc=example,dc=com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn renaming_into_an_existing_dn_fails() {
        let backend = MemoryBackend::new();
        backend.seed(Entry::new("uid=alice,dc=example,dc=com")).await;
        backend.seed(Entry::new("uid=bob,dc=example,dc=com")).await;
        let err = backend
            .modify_dn("uid=alice,dc=example,dc=com", "uid=bob", false, None)
            .await
            .unwrap_err();
        assert!(matches!(LdapError::from(err), LdapError::EntryAlreadyExists));
    }
}
