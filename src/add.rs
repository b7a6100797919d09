//! The Add handler (spec §4.8).
//!
//! Syntax and ACL are checked here; existence of the parent, existence of
//! the entry itself, and the at-least-one-`objectClass` rule are the
//! backend's job (spec §6) and arrive back through `From<BackendError>`.

use crate::acl::Access;
use crate::connection::Connection;
use crate::dn;
use crate::entry::Entry;
use crate::error::LdapError;

pub async fn handle(conn: &Connection, entry: Entry) -> Result<(), LdapError> {
    if !dn::is_well_formed(&entry.dn) {
        return Err(LdapError::InvalidDnSyntax(entry.dn.clone()));
    }
    let bind_dn = conn.bind_dn();
    if !conn.acl.allows(&bind_dn, &entry.dn, Access::Add, None) {
        return Err(LdapError::InsufficientAccessRights);
    }
    conn.backend.add_entry(entry).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::Backend;

    #[test]
    fn rejects_malformed_dn() {
        assert!(!dn::is_well_formed("not a dn at all"));
    }

    #[tokio::test]
    async fn backend_rejects_duplicate_entries() {
        let backend = MemoryBackend::new();
        backend.seed(Entry::new("dc=example,dc=com")).await;
        let entry =
            Entry::new("dc=example,dc=com").with_attr("objectclass", vec![b"dcObject".to_vec()]);
        let err = backend.add_entry(entry).await.unwrap_err();
        assert!(matches!(LdapError::from(err), LdapError::EntryAlreadyExists));
    }
}
