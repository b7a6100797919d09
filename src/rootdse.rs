//! The RootDSE provider (§4.5 "RootDSE"): the synthesized entry returned by
//! a Base-scope search against the empty DN.

use crate::entry::Entry;

pub const VENDOR_NAME: &str = "ldapd";
pub const VENDOR_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SUPPORTED_LDAP_VERSION: &str = "3";

/// Control OIDs this core recognizes on the wire (§6).
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
pub const PERSISTENT_SEARCH_OID: &str = "2.16.840.1.113730.3.4.3";
pub const ENTRY_CHANGE_NOTIFICATION_OID: &str = "2.16.840.1.113730.3.4.7";

/// Build the RootDSE entry. `naming_contexts` are the base DNs this server
/// serves; `extended_oids` is the extended dispatcher's
/// `SupportedOIDs()` (§4.10). Every attribute here is operational except
/// `objectClass` (§4.5).
pub fn build(naming_contexts: &[String], extended_oids: &[String]) -> Entry {
    let mut entry = Entry::new("");
    entry.set_attr("objectclass", vec![b"top".to_vec()]);
    entry.set_attr(
        "namingcontexts",
        naming_contexts.iter().map(|nc| nc.clone().into_bytes()).collect(),
    );
    entry.set_attr(
        "supportedldapversion",
        vec![SUPPORTED_LDAP_VERSION.as_bytes().to_vec()],
    );
    entry.set_attr(
        "supportedcontrol",
        vec![
            PAGED_RESULTS_OID.as_bytes().to_vec(),
            PERSISTENT_SEARCH_OID.as_bytes().to_vec(),
            ENTRY_CHANGE_NOTIFICATION_OID.as_bytes().to_vec(),
        ],
    );
    entry.set_attr(
        "supportedextension",
        extended_oids.iter().map(|oid| oid.clone().into_bytes()).collect(),
    );
    entry.set_attr("supportedfeatures", Vec::new());
    entry.set_attr("vendorname", vec![VENDOR_NAME.as_bytes().to_vec()]);
    entry.set_attr("vendorversion", vec![VENDOR_VERSION.as_bytes().to_vec()]);
    entry
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::search::{select_attributes, OPERATIONAL_ATTRS};

    #[test]
    fn every_attribute_but_object_class_is_operational() {
        let entry = build(&["dc=example,dc=com".to_string()], &[]);
        for name in entry.attribute_names() {
            if name != "objectclass" {
                assert!(
                    OPERATIONAL_ATTRS.contains(&name),
                    "{name} should be in the operational set"
                );
            }
        }
    }

    #[test]
    fn default_selection_returns_only_object_class() {
        let entry = build(&["dc=example,dc=com".to_string()], &[]);
        let selected = select_attributes(&entry, &[], false);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "objectclass");
    }

    #[test]
    fn plus_returns_naming_contexts() {
        let entry = build(&["dc=example,dc=com".to_string()], &[]);
        let selected = select_attributes(&entry, &["+".to_string()], false);
        assert!(selected.iter().any(|(n, _)| n == "namingcontexts"));
    }
}
