//! Operation results (spec §3 "Operation Result").

use crate::error::LdapError;
use crate::result_code::ResultCode;

/// (result-code; matched-DN; diagnostic-message), attached to every
/// non-streaming response and to the final `*Done`/`*Response` of a
/// streaming one.
#[derive(Clone, Debug)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapResult {
    pub fn success() -> LdapResult {
        LdapResult {
            code: ResultCode::Success,
            matched_dn: String::new(),
            message: String::new(),
        }
    }

    pub fn new(code: ResultCode, message: impl Into<String>) -> LdapResult {
        LdapResult {
            code,
            matched_dn: String::new(),
            message: message.into(),
        }
    }

    pub fn with_matched(mut self, matched_dn: impl Into<String>) -> LdapResult {
        self.matched_dn = matched_dn.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}

impl From<&LdapError> for LdapResult {
    fn from(e: &LdapError) -> LdapResult {
        let (code, message) = e.to_result();
        LdapResult::new(code, message)
    }
}

impl From<LdapError> for LdapResult {
    fn from(e: LdapError) -> LdapResult {
        LdapResult::from(&e)
    }
}
