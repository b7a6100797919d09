//! The Delete handler (spec §4.8).

use crate::acl::Access;
use crate::connection::Connection;
use crate::dn;
use crate::error::LdapError;

pub async fn handle(conn: &Connection, dn: &str) -> Result<(), LdapError> {
    if !dn::is_well_formed(dn) {
        return Err(LdapError::InvalidDnSyntax(dn.to_string()));
    }
    let bind_dn = conn.bind_dn();
    if !conn.acl.allows(&bind_dn, dn, Access::Delete, None) {
        return Err(LdapError::InsufficientAccessRights);
    }
    conn.backend.delete_entry(dn).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::Backend;
    use crate::entry::Entry;

    #[tokio::test]
    async fn deleting_a_parent_with_children_fails() {
        let backend = MemoryBackend::new();
        backend.seed(Entry::new("dc=example,dc=com")).await;
        backend.seed(Entry::new("ou=people,dc=example,dc=com")).await;
        let err = backend.delete_entry("dc=example,dc=com").await.unwrap_err();
        assert!(matches!(LdapError::from(err), LdapError::NotAllowedOnNonLeaf));
    }

    #[tokio::test]
    async fn deleting_unknown_dn_is_no_such_object() {
        let backend = MemoryBackend::new();
        let err = backend.delete_entry("dc=nope,dc=com").await.unwrap_err();
        assert!(matches!(LdapError::from(err), LdapError::NoSuchObject));
    }
}
