//! The search pipeline (spec §4.5): scope evaluation, filter evaluation,
//! attribute selection, and size/time limits. RootDSE and paged/persistent
//! search live in [`crate::rootdse`] and [`crate::controls_impl`]
//! respectively; this module is the shared core both build on.

use std::time::{Duration, Instant};

use crate::acl::{Access, AclEvaluator};
use crate::backend::Backend;
use crate::entry::Entry;
use crate::error::LdapError;
use crate::message::SearchRequest;
use crate::result::LdapResult;
use crate::result_code::ResultCode;

/// Search extent (spec §3, §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}

/// The closed set of operational attribute names (spec §4.5). Any
/// requested name matching this set (case-insensitively) is operational,
/// never returned unless `+` or the name itself is requested.
pub const OPERATIONAL_ATTRS: &[&str] = &[
    "createtimestamp",
    "modifytimestamp",
    "creatorsname",
    "modifiersname",
    "entrydn",
    "entryuuid",
    "subschemasubentry",
    "hassubordinates",
    "numsubordinates",
    "structuralobjectclass",
    "namingcontexts",
    "supportedcontrol",
    "supportedextension",
    "supportedfeatures",
    "supportedldapversion",
    "supportedsaslmechanisms",
    "pwdchangedtime",
    "pwdaccountlockedtime",
    "vendorname",
    "vendorversion",
];

pub fn is_operational(attr: &str) -> bool {
    OPERATIONAL_ATTRS.contains(&attr.to_ascii_lowercase().as_str())
}

/// RFC 4511 §4.5.1.8 attribute selection, resolved against a concrete
/// entry. `types_only` truncates every selected value list to empty.
pub fn select_attributes(
    entry: &Entry,
    requested: &[String],
    types_only: bool,
) -> Vec<(String, Vec<Vec<u8>>)> {
    let requested_lower: Vec<String> = requested.iter().map(|a| a.to_ascii_lowercase()).collect();
    if requested_lower.iter().any(|a| a == "1.1") {
        return Vec::new();
    }
    let want_all_user = requested.is_empty() || requested_lower.iter().any(|a| a == "*");
    let want_all_operational = requested_lower.iter().any(|a| a == "+");
    let named: Vec<&String> = requested_lower
        .iter()
        .filter(|a| a.as_str() != "*" && a.as_str() != "+" && a.as_str() != "1.1")
        .collect();

    let mut out = Vec::new();
    for (name, values) in entry.iter() {
        let operational = is_operational(name);
        let explicitly_named = named.iter().any(|n| n.as_str() == name);
        let selected = explicitly_named
            || (!operational && want_all_user)
            || (operational && want_all_operational);
        if selected {
            let values = if types_only { Vec::new() } else { values.to_vec() };
            out.push((name.to_string(), values));
        }
    }
    out
}

/// The outcome of a single evaluate() call: ready-to-encode entries plus
/// the terminating result.
pub struct SearchOutcome {
    pub entries: Vec<(String, Vec<(String, Vec<Vec<u8>>)>)>,
    pub result: LdapResult,
}

/// Run the full scope→filter→ACL→attribute-selection→limits pipeline
/// against the backend (spec §4.5). Used directly by a plain search and by
/// the paged-results manager, which materializes the whole outcome up
/// front on the first page (spec §4.6).
pub async fn evaluate(
    backend: &dyn Backend,
    acl: &AclEvaluator,
    bind_dn: &str,
    req: &SearchRequest,
    server_max_size: i64,
    server_max_time: Duration,
) -> Result<SearchOutcome, LdapError> {
    if !acl.allows(bind_dn, &req.base_dn, Access::Search, None) {
        return Err(LdapError::InsufficientAccessRights);
    }

    if matches!(req.scope, Scope::Base) && backend.get_entry(&req.base_dn).await?.is_none() {
        return Err(LdapError::NoSuchObject);
    }

    let candidates = backend.search_by_dn(&req.base_dn, req.scope).await?;

    let effective_size_limit = match (req.size_limit, server_max_size) {
        (0, 0) => i64::MAX,
        (0, s) => s,
        (r, 0) => r,
        (r, s) => r.min(s),
    };
    let time_budget = if req.time_limit > 0 {
        Duration::from_secs(req.time_limit as u64).min(server_max_time)
    } else {
        server_max_time
    };
    let deadline = Instant::now() + time_budget;

    let mut entries = Vec::new();
    let mut size_exceeded = false;
    let mut time_exceeded = false;

    for entry in candidates {
        if Instant::now() >= deadline {
            time_exceeded = true;
            break;
        }
        if !req.filter.matches(&entry) {
            continue;
        }
        if entries.len() as i64 >= effective_size_limit {
            size_exceeded = true;
            break;
        }
        let selected = select_attributes(&entry, &req.attributes, req.types_only)
            .into_iter()
            .filter(|(attr, _)| acl.allows(bind_dn, &entry.dn, Access::Read, Some(attr)))
            .collect();
        entries.push((entry.dn.clone(), selected));
    }

    let result = if time_exceeded {
        LdapResult::new(ResultCode::TimeLimitExceeded, "search time limit exceeded")
    } else if size_exceeded {
        LdapResult::new(ResultCode::SizeLimitExceeded, "search size limit exceeded")
    } else {
        LdapResult::success()
    };

    Ok(SearchOutcome { entries, result })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_attributes_empty_list_means_all_user_attrs() {
        let entry = Entry::new("dn")
            .with_attr("cn", vec![b"x".to_vec()])
            .with_attr("createtimestamp", vec![b"20240101000000Z".to_vec()]);
        let out = select_attributes(&entry, &[], false);
        assert!(out.iter().any(|(n, _)| n == "cn"));
        assert!(!out.iter().any(|(n, _)| n == "createtimestamp"));
    }

    #[test]
    fn select_attributes_plus_means_operational_only() {
        let entry = Entry::new("dn")
            .with_attr("cn", vec![b"x".to_vec()])
            .with_attr("createtimestamp", vec![b"20240101000000Z".to_vec()]);
        let out = select_attributes(&entry, &["+".to_string()], false);
        assert!(out.iter().any(|(n, _)| n == "createtimestamp"));
        assert!(!out.iter().any(|(n, _)| n == "cn"));
    }

    #[test]
    fn select_attributes_named_operational_is_included_even_without_plus() {
        let entry = Entry::new("dn").with_attr("entrydn", vec![b"dn".to_vec()]);
        let out = select_attributes(&entry, &["entryDN".to_string()], false);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn select_attributes_one_dot_one_means_none() {
        let entry = Entry::new("dn").with_attr("cn", vec![b"x".to_vec()]);
        let out = select_attributes(&entry, &["1.1".to_string()], false);
        assert!(out.is_empty());
    }

    #[test]
    fn types_only_empties_value_lists() {
        let entry = Entry::new("dn").with_attr("cn", vec![b"x".to_vec()]);
        let out = select_attributes(&entry, &[], true);
        assert_eq!(out[0].1, Vec::<Vec<u8>>::new());
    }
}
