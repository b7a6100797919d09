//! The ACL evaluator (spec §4.12).
//!
//! First-match-wins over an ordered rule list, per spec §9's explicit
//! resolution of the "rule ordering vs specificity" open question: this
//! core does not attempt most-specific-wins.

use crate::dn;

/// The access kinds an operation can request (spec §4.12).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Search,
    Read,
    Write,
    Compare,
    Add,
    Delete,
    All,
}

/// Who a rule applies to (spec §4.12).
#[derive(Clone, Debug)]
pub enum Subject {
    Dn(String),
    Any,
    Authenticated,
    SelfDn,
}

/// A DN-pattern target. `*` matches every DN; anything else must match the
/// normalized DN or be an ancestor DN of it (a rule on `dc=example,dc=com`
/// applies to everything under it), mirroring how real LDAP ACL engines
/// scope a target without a full schema-aware subtree matcher.
#[derive(Clone, Debug)]
pub enum Target {
    Any,
    Subtree(String),
}

#[derive(Clone, Debug)]
pub struct AclRule {
    pub target: Target,
    pub subject: Subject,
    pub access: Vec<Access>,
    /// `None` means the rule applies to every attribute; `Some` restricts
    /// it to the named attributes (spec §4.12, scenario 3).
    pub attributes: Option<Vec<String>>,
}

impl AclRule {
    fn target_matches(&self, target_dn_norm: &str) -> bool {
        match &self.target {
            Target::Any => true,
            Target::Subtree(base) => dn::is_in_subtree(base, target_dn_norm),
        }
    }

    fn subject_matches(&self, bind_dn: &str, target_dn_norm: &str) -> bool {
        match &self.subject {
            Subject::Any => true,
            Subject::Authenticated => !bind_dn.is_empty(),
            Subject::SelfDn => !bind_dn.is_empty() && dn::normalize(bind_dn) == target_dn_norm,
            Subject::Dn(d) => dn::normalize(bind_dn) == dn::normalize(d),
        }
    }

    fn access_matches(&self, access: Access) -> bool {
        self.access.contains(&Access::All) || self.access.contains(&access)
    }

    fn attribute_matches(&self, attribute: Option<&str>) -> bool {
        match (&self.attributes, attribute) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(list), Some(attr)) => list.iter().any(|a| a.eq_ignore_ascii_case(attr)),
        }
    }
}

/// Default policy when no rule matches (spec §4.12).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

pub struct AclEvaluator {
    rules: Vec<AclRule>,
    default: DefaultPolicy,
}

impl AclEvaluator {
    pub fn new(rules: Vec<AclRule>, default: DefaultPolicy) -> AclEvaluator {
        AclEvaluator { rules, default }
    }

    /// First matching rule decides. `attribute` is `None` for the
    /// whole-operation check and `Some` for the per-attribute filtering
    /// pass a search response goes through (spec §4.12).
    pub fn allows(&self, bind_dn: &str, target_dn: &str, access: Access, attribute: Option<&str>) -> bool {
        let target_norm = dn::normalize(target_dn);
        for rule in &self.rules {
            if rule.target_matches(&target_norm)
                && rule.subject_matches(bind_dn, &target_norm)
                && rule.access_matches(access)
                && rule.attribute_matches(attribute)
            {
                return true;
            }
        }
        self.default == DefaultPolicy::Allow
    }
}

impl Default for AclEvaluator {
    /// A reasonably safe out-of-the-box policy: default-deny, with a single
    /// rule granting authenticated binds full search+read.
    fn default() -> AclEvaluator {
        AclEvaluator::new(
            vec![AclRule {
                target: Target::Any,
                subject: Subject::Authenticated,
                access: vec![Access::Search, Access::Read, Access::Compare],
                attributes: None,
            }],
            DefaultPolicy::Deny,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_deny_blocks_anonymous() {
        let acl = AclEvaluator::new(
            vec![AclRule {
                target: Target::Any,
                subject: Subject::Dn("cn=admin,dc=example,dc=com".into()),
                access: vec![Access::All],
                attributes: None,
            }],
            DefaultPolicy::Deny,
        );
        assert!(!acl.allows("", "uid=alice,dc=example,dc=com", Access::Search, None));
        assert!(acl.allows(
            "cn=admin,dc=example,dc=com",
            "uid=alice,dc=example,dc=com",
            Access::Search,
            None
        ));
    }

    #[test]
    fn attribute_restriction_filters_userpassword() {
        let acl = AclEvaluator::new(
            vec![AclRule {
                target: Target::Any,
                subject: Subject::Authenticated,
                access: vec![Access::Search, Access::Read],
                attributes: Some(vec!["uid".into(), "cn".into(), "mail".into(), "objectclass".into()]),
            }],
            DefaultPolicy::Deny,
        );
        assert!(acl.allows("uid=bob,dc=example,dc=com", "x", Access::Read, Some("cn")));
        assert!(!acl.allows(
            "uid=bob,dc=example,dc=com",
            "x",
            Access::Read,
            Some("userPassword")
        ));
    }

    #[test]
    fn self_subject_matches_own_dn_only() {
        let acl = AclEvaluator::new(
            vec![AclRule {
                target: Target::Any,
                subject: Subject::SelfDn,
                access: vec![Access::Write],
                attributes: None,
            }],
            DefaultPolicy::Deny,
        );
        assert!(acl.allows(
            "uid=alice,dc=example,dc=com",
            "uid=alice,dc=example,dc=com",
            Access::Write,
            None
        ));
        assert!(!acl.allows(
            "uid=alice,dc=example,dc=com",
            "uid=bob,dc=example,dc=com",
            Access::Write,
            None
        ));
    }
}
