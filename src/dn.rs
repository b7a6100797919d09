//! Distinguished Name handling (spec §3, §9 "case-insensitivity is
//! everywhere implicit in the source; it must be made explicit").
//!
//! A DN is compared case-insensitively after trimming, per spec. This
//! module makes that one explicit operation (`normalize`) instead of
//! scattering ad hoc `.to_lowercase()` calls through every handler.

/// ASCII-fold a string: only bytes in `A-Z` are touched, matching spec §9's
/// "no locale-dependent folding".
fn ascii_fold(s: &str) -> String {
    s.bytes()
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

/// Normalize a DN for comparison and storage keying: trim surrounding
/// whitespace, then ASCII-fold. Idempotent and case-insensitive, per the
/// invariant in spec §8: `normalize(normalize(x)) == normalize(x)` and
/// `normalize(lower(x)) == normalize(upper(x))`.
pub fn normalize(dn: &str) -> String {
    ascii_fold(dn.trim())
}

/// Split a DN into its leftmost RDN and the parent DN (the substring after
/// the first *unescaped* comma), per spec §3. Returns `None` for a
/// single-component (root) DN.
pub fn split_rdn(dn: &str) -> (String, Option<String>) {
    let bytes = dn.as_bytes();
    let mut i = 0;
    let mut escaped = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if !escaped => escaped = true,
            b',' if !escaped => {
                let rdn = dn[..i].trim().to_string();
                let parent = dn[i + 1..].trim().to_string();
                return (rdn, Some(parent));
            }
            _ => escaped = false,
        }
        i += 1;
    }
    (dn.trim().to_string(), None)
}

/// Parent DN, normalized, or `None` for a root DN.
pub fn parent(dn: &str) -> Option<String> {
    split_rdn(dn).1.map(|p| normalize(&p))
}

/// `true` if `descendant` is `base` or is nested under it (spec §4.5
/// Subtree scope): compares normalized DNs, walking up `descendant`'s
/// parent chain.
pub fn is_in_subtree(base_norm: &str, descendant: &str) -> bool {
    let descendant_norm = normalize(descendant);
    if descendant_norm == base_norm {
        return true;
    }
    let mut cur = descendant.to_string();
    while let Some(p) = parent(&cur) {
        if p == base_norm {
            return true;
        }
        cur = p;
    }
    false
}

/// `true` if `dn` is an immediate child of `base` (spec §4.5 OneLevel).
pub fn is_immediate_child(base_norm: &str, dn: &str) -> bool {
    parent(dn).as_deref() == Some(base_norm)
}

/// Case-insensitive, well-formedness check for a DN (spec §4.8: "non-empty
/// DN, well-formed RDN"). Minimal per spec §1's schema non-goal: requires a
/// non-empty string whose every RDN component contains an `=`.
pub fn is_well_formed(dn: &str) -> bool {
    if dn.trim().is_empty() {
        return false;
    }
    let (rdn, rest) = split_rdn(dn);
    if !rdn.contains('=') || rdn.split('=').next().unwrap_or("").trim().is_empty() {
        return false;
    }
    match rest {
        Some(rest) if !rest.trim().is_empty() => is_well_formed(&rest),
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_is_idempotent_and_case_insensitive() {
        let dn = " UID=Alice, OU=Users,DC=Example,DC=COM ";
        assert_eq!(normalize(dn), normalize(&normalize(dn)));
        assert_eq!(
            normalize("uid=alice,ou=users,dc=example,dc=com"),
            normalize("UID=ALICE,OU=USERS,DC=EXAMPLE,DC=COM")
        );
    }

    #[test]
    fn parent_of_root_dn_is_none() {
        assert_eq!(parent("dc=com"), None);
    }

    #[test]
    fn parent_splits_on_first_unescaped_comma() {
        assert_eq!(
            parent("cn=Doe\\, John,ou=users,dc=example,dc=com"),
            Some(normalize("ou=users,dc=example,dc=com"))
        );
    }

    #[test]
    fn subtree_and_onelevel() {
        let base = normalize("ou=users,dc=example,dc=com");
        assert!(is_in_subtree(&base, "ou=users,dc=example,dc=com"));
        assert!(is_in_subtree(
            &base,
            "uid=alice,ou=users,dc=example,dc=com"
        ));
        assert!(!is_in_subtree(&base, "dc=example,dc=com"));
        assert!(is_immediate_child(
            &base,
            "uid=alice,ou=users,dc=example,dc=com"
        ));
        assert!(!is_immediate_child(
            &base,
            "cn=x,uid=alice,ou=users,dc=example,dc=com"
        ));
    }
}
