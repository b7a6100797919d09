//! On-disk configuration (spec §6 "Configuration").
//!
//! Layered the way the teacher's sibling projects do it: a TOML file via
//! the `config` crate, overridable by `LDAPD_*` environment variables, with
//! every field falling back to [`ServerConfig::default`] when absent. The
//! wire-level types ([`crate::acl`], [`crate::password::Scheme`]) are kept
//! out of here except where they derive `Deserialize` directly; anything
//! that needs translating (ACL rule subjects/targets) gets its own
//! config-shaped type and a `From` conversion.

use std::path::PathBuf;

use serde::Deserialize;

use crate::acl::{Access, AclRule, DefaultPolicy, Subject, Target};
use crate::password::Scheme;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectConfig {
    Any,
    Authenticated,
    #[serde(rename = "self")]
    SelfDn,
    Dn(String),
}

impl From<&SubjectConfig> for Subject {
    fn from(s: &SubjectConfig) -> Subject {
        match s {
            SubjectConfig::Any => Subject::Any,
            SubjectConfig::Authenticated => Subject::Authenticated,
            SubjectConfig::SelfDn => Subject::SelfDn,
            SubjectConfig::Dn(dn) => Subject::Dn(dn.clone()),
        }
    }
}

/// An ACL rule as it appears in the config file. `target` is `None` or
/// `"*"` for [`Target::Any`]; anything else names the subtree base DN.
#[derive(Debug, Clone, Deserialize)]
pub struct AclRuleConfig {
    pub target: Option<String>,
    pub subject: SubjectConfig,
    pub access: Vec<String>,
    pub attributes: Option<Vec<String>>,
}

impl AclRuleConfig {
    fn to_rule(&self) -> AclRule {
        let target = match self.target.as_deref() {
            None | Some("*") => Target::Any,
            Some(base) => Target::Subtree(base.to_string()),
        };
        let access = self
            .access
            .iter()
            .filter_map(|a| match a.to_ascii_lowercase().as_str() {
                "search" => Some(Access::Search),
                "read" => Some(Access::Read),
                "write" => Some(Access::Write),
                "compare" => Some(Access::Compare),
                "add" => Some(Access::Add),
                "delete" => Some(Access::Delete),
                "all" => Some(Access::All),
                _ => None,
            })
            .collect();
        AclRule {
            target,
            subject: Subject::from(&self.subject),
            access,
            attributes: self.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicyConfig {
    Allow,
    Deny,
}

impl From<DefaultPolicyConfig> for DefaultPolicy {
    fn from(p: DefaultPolicyConfig) -> DefaultPolicy {
        match p {
            DefaultPolicyConfig::Allow => DefaultPolicy::Allow,
            DefaultPolicyConfig::Deny => DefaultPolicy::Deny,
        }
    }
}

/// The whole server config blob. Write it as TOML and `ServerConfig::load`
/// will find it; every field has a safe default so a config-less run still
/// comes up (listening on loopback, default-deny ACLs, anonymous binds on).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Plaintext listener address, e.g. `"127.0.0.1:3890"`.
    pub listen_address: String,
    /// Implicit-TLS (`ldaps`) listener address. `None` disables it.
    pub listen_tls_address: Option<String>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    /// StartTLS is offered whenever `tls_cert_path`/`tls_key_path` are set,
    /// regardless of whether `listen_tls_address` is also set.
    pub naming_contexts: Vec<String>,
    pub anonymous_binds_allowed: bool,
    /// Bypasses the backend and ACLs entirely on a DN match (spec §4.4).
    pub root_dn: Option<String>,
    /// Scheme-prefixed, as produced by [`crate::password::hash`].
    pub root_password_hash: Option<String>,
    pub admin_dns: Vec<String>,
    pub size_limit: i64,
    pub time_limit_secs: u64,
    pub generated_password_length: usize,
    pub generated_password_scheme: Scheme,
    pub password_modify_requires_tls: bool,
    pub min_password_length: usize,
    pub paged_results_max_concurrent: usize,
    pub paged_results_ttl_secs: u64,
    pub acl_default: DefaultPolicyConfig,
    pub acl_rules: Vec<AclRuleConfig>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            listen_address: "127.0.0.1:3890".to_string(),
            listen_tls_address: None,
            tls_cert_path: None,
            tls_key_path: None,
            naming_contexts: vec!["dc=example,dc=com".to_string()],
            anonymous_binds_allowed: true,
            root_dn: None,
            root_password_hash: None,
            admin_dns: vec![],
            size_limit: 1000,
            time_limit_secs: 30,
            generated_password_length: 16,
            generated_password_scheme: Scheme::Ssha512,
            password_modify_requires_tls: true,
            min_password_length: 8,
            paged_results_max_concurrent: 100,
            paged_results_ttl_secs: 300,
            acl_default: DefaultPolicyConfig::Deny,
            acl_rules: vec![AclRuleConfig {
                target: None,
                subject: SubjectConfig::Authenticated,
                access: vec!["search".to_string(), "read".to_string(), "compare".to_string()],
                attributes: None,
            }],
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build the ACL rule list this config describes, in file order (the
    /// evaluator is first-match-wins, so order here is significant).
    pub fn acl_rules(&self) -> Vec<AclRule> {
        self.acl_rules.iter().map(AclRuleConfig::to_rule).collect()
    }

    pub fn acl_default(&self) -> DefaultPolicy {
        self.acl_default.into()
    }

    /// Load from `path` if given, else from `./ldapd.toml` if it exists,
    /// else fall back to [`ServerConfig::default`] entirely. Environment
    /// variables prefixed `LDAPD_` (e.g. `LDAPD_LISTEN_ADDRESS`) override
    /// whatever the file or default set.
    pub fn load(path: Option<&str>) -> Result<ServerConfig, config::ConfigError> {
        let mut builder = config::Config::builder();
        match path {
            Some(p) => {
                builder = builder.add_source(config::File::new(p, config::FileFormat::Toml));
            }
            None => {
                if std::path::Path::new("ldapd.toml").exists() {
                    builder = builder
                        .add_source(config::File::new("ldapd.toml", config::FileFormat::Toml));
                }
            }
        }
        builder = builder.add_source(config::Environment::with_prefix("LDAPD").separator("_"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_has_sane_anonymous_access() {
        let cfg = ServerConfig::default();
        assert!(cfg.anonymous_binds_allowed);
        assert_eq!(cfg.acl_default(), DefaultPolicy::Deny);
        assert_eq!(cfg.acl_rules().len(), 1);
    }

    #[test]
    fn acl_rule_config_translates_target_and_subject() {
        let rule = AclRuleConfig {
            target: Some("dc=example,dc=com".to_string()),
            subject: SubjectConfig::Dn("cn=admin,dc=example,dc=com".to_string()),
            access: vec!["all".to_string()],
            attributes: None,
        }
        .to_rule();
        match rule.target {
            Target::Subtree(ref base) => assert_eq!(base, "dc=example,dc=com"),
            Target::Any => panic!("expected a subtree target"),
        }
        assert_eq!(rule.access, vec![Access::All]);
    }

    #[test]
    fn wildcard_target_is_any() {
        let rule = AclRuleConfig {
            target: Some("*".to_string()),
            subject: SubjectConfig::Any,
            access: vec!["search".to_string()],
            attributes: None,
        }
        .to_rule();
        assert!(matches!(rule.target, Target::Any));
    }
}
