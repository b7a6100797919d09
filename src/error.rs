//! Protocol/backend/ACL-level errors (spec §7).
//!
//! `lber::BerError` stays inside the codec crate; this enum is the one
//! level up, used by every handler to report a result without hand-rolling
//! a `(ResultCode, String)` pair at each call site. `From<BackendError>`
//! implements the "pattern-match on the backend's error text/kind" mapping
//! spec §7 calls for.

use thiserror::Error;

use crate::backend::BackendError;
use crate::result_code::ResultCode;

#[derive(Debug, Error)]
pub enum LdapError {
    #[error("{0}")]
    Protocol(String),
    #[error("internal error: {0}")]
    Operations(String),
    #[error("no such object")]
    NoSuchObject,
    #[error("no such attribute")]
    NoSuchAttribute,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("insufficient access rights")]
    InsufficientAccessRights,
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("object class violation: {0}")]
    ObjectClassViolation(String),
    #[error("not allowed on non-leaf entry")]
    NotAllowedOnNonLeaf,
    #[error("entry already exists")]
    EntryAlreadyExists,
    #[error("invalid DN syntax: {0}")]
    InvalidDnSyntax(String),
    #[error("confidentiality required: {0}")]
    ConfidentialityRequired(&'static str),
    #[error("stronger authentication required")]
    StrongerAuthRequired,
    #[error("authentication method not supported")]
    AuthMethodNotSupported,
    #[error("inappropriate authentication")]
    InappropriateAuthentication,
    #[error("size limit exceeded")]
    SizeLimitExceeded,
    #[error("time limit exceeded")]
    TimeLimitExceeded,
    #[error("unwilling to perform: {0}")]
    UnwillingToPerform(String),
    #[error("unavailable: {0}")]
    Unavailable(&'static str),
    #[error("busy: {0}")]
    Busy(&'static str),
}

impl LdapError {
    /// Map to the wire result code and a diagnostic message, per spec §7's
    /// table. Never leaks anything beyond what the variant itself states.
    pub fn to_result(&self) -> (ResultCode, String) {
        use LdapError::*;
        let code = match self {
            Protocol(_) => ResultCode::ProtocolError,
            Operations(_) => ResultCode::OperationsError,
            NoSuchObject => ResultCode::NoSuchObject,
            NoSuchAttribute => ResultCode::NoSuchAttribute,
            InvalidCredentials => ResultCode::InvalidCredentials,
            InsufficientAccessRights => ResultCode::InsufficientAccessRights,
            ConstraintViolation(_) => ResultCode::ConstraintViolation,
            ObjectClassViolation(_) => ResultCode::ObjectClassViolation,
            NotAllowedOnNonLeaf => ResultCode::NotAllowedOnNonLeaf,
            EntryAlreadyExists => ResultCode::EntryAlreadyExists,
            InvalidDnSyntax(_) => ResultCode::InvalidDNSyntax,
            ConfidentialityRequired(_) => ResultCode::ConfidentialityRequired,
            StrongerAuthRequired => ResultCode::StrongerAuthRequired,
            AuthMethodNotSupported => ResultCode::AuthMethodNotSupported,
            InappropriateAuthentication => ResultCode::InappropriateAuthentication,
            SizeLimitExceeded => ResultCode::SizeLimitExceeded,
            TimeLimitExceeded => ResultCode::TimeLimitExceeded,
            UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
            Unavailable(_) => ResultCode::Unavailable,
            Busy(_) => ResultCode::Busy,
        };
        (code, self.to_string())
    }
}

/// Backend errors are pattern-matched by kind (spec §6, §7); unmatched kinds
/// fall back to `OperationsError`.
impl From<BackendError> for LdapError {
    fn from(e: BackendError) -> LdapError {
        match e {
            BackendError::NotFound => LdapError::NoSuchObject,
            BackendError::ParentNotFound => LdapError::NoSuchObject,
            BackendError::AlreadyExists => LdapError::EntryAlreadyExists,
            BackendError::HasChildren => LdapError::NotAllowedOnNonLeaf,
            BackendError::SchemaViolation(msg) => LdapError::ObjectClassViolation(msg),
            BackendError::RequiredAttributeMissing(attr) => {
                LdapError::ObjectClassViolation(format!("missing required attribute {attr}"))
            }
            BackendError::Constraint(msg) => LdapError::ConstraintViolation(msg),
            BackendError::Invalid(msg) => LdapError::Operations(msg),
            BackendError::Io(msg) => LdapError::Operations(msg),
        }
    }
}
