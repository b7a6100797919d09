//! The `Backend` trait (spec §1, §6): the core's only view of the storage
//! engine. Spec §1 treats the storage engine as an external collaborator
//! "specified only by the interfaces the core consumes" — this trait *is*
//! that interface; everything in `memory` is a reference implementation the
//! core doesn't otherwise depend on.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::entry::{Entry, Modification};
use crate::search::Scope;

pub mod memory;

/// Backend failure kinds, pattern-matched into [`crate::error::LdapError`]
/// per spec §6/§7.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found")]
    NotFound,
    #[error("parent not found")]
    ParentNotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("has children")]
    HasChildren,
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("required attribute missing: {0}")]
    RequiredAttributeMissing(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("backend I/O error: {0}")]
    Io(String),
}

/// The kind of change a persistent-search subscriber cares about (spec
/// §4.7's changeTypes bitmask, modeled as a real enum instead of the raw
/// bit values so handlers can match on it).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
    ModifyDn,
}

/// One change-notification event delivered to a persistent-search
/// subscriber (spec §4.7). Delete events carry only the DN.
#[derive(Clone, Debug)]
pub enum ChangeEvent {
    Added(Entry),
    Deleted(String),
    Modified(Entry),
    Renamed(Entry),
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Added(_) => ChangeKind::Add,
            ChangeEvent::Deleted(_) => ChangeKind::Delete,
            ChangeEvent::Modified(_) => ChangeKind::Modify,
            ChangeEvent::Renamed(_) => ChangeKind::ModifyDn,
        }
    }

    pub fn dn(&self) -> &str {
        match self {
            ChangeEvent::Added(e) | ChangeEvent::Modified(e) | ChangeEvent::Renamed(e) => &e.dn,
            ChangeEvent::Deleted(dn) => dn,
        }
    }
}

/// A subscription to the backend's change-notification stream, scoped to a
/// base DN/scope (spec §4.7).
pub struct Watch {
    pub id: u64,
    pub receiver: mpsc::Receiver<ChangeEvent>,
}

/// The storage engine's contract, consumed by the dispatch core (spec §6).
///
/// Every method is async: a real backend may do its own I/O. The core never
/// holds a lock across one of these calls (spec §5).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_entry(&self, dn: &str) -> Result<Option<Entry>, BackendError>;

    async fn add_entry(&self, entry: Entry) -> Result<(), BackendError>;

    async fn delete_entry(&self, dn: &str) -> Result<(), BackendError>;

    async fn has_children(&self, dn: &str) -> Result<bool, BackendError>;

    async fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
    ) -> Result<(), BackendError>;

    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Enumerate entries within `scope` of `base_dn`. `Base` scope that
    /// misses returns an empty vector; the search pipeline distinguishes
    /// "no matches" from "no such object" via a prior [`Backend::get_entry`]
    /// call, per spec §4.5.
    async fn search_by_dn(&self, base_dn: &str, scope: Scope) -> Result<Vec<Entry>, BackendError>;

    /// Subscribe to changes within `scope` of `base_dn` (spec §4.7).
    async fn watch(&self, base_dn: &str, scope: Scope) -> Watch;

    async fn unwatch(&self, id: u64);
}
