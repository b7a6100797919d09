//! The extended-operation dispatcher (spec §4.10, §4.11).
//!
//! Request/response bodies for Bind/Search/mutations/Compare form a closed
//! set of PDU shapes (spec §3); extended operations don't — any OID can
//! show up, and the core only ships handlers for the ones spec §4.10
//! names. So this is the one dispatch point in the core built on dynamic
//! dispatch: an OID-keyed registry of [`ExtendedHandler`] trait objects,
//! matching how the request itself already carries its OID as data rather
//! than as a closed enum variant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::connection::Connection;
use crate::error::LdapError;

/// The body of a successful extended response: the RFC 4511 §4.12
/// `responseName`/`responseValue` pair. `None` for `oid` means "reuse the
/// request's OID", which every handler in this core does.
pub struct ExtendedResponse {
    pub oid: Option<String>,
    pub value: Option<Vec<u8>>,
}

impl ExtendedResponse {
    pub fn empty() -> ExtendedResponse {
        ExtendedResponse { oid: None, value: None }
    }

    pub fn with_value(value: Vec<u8>) -> ExtendedResponse {
        ExtendedResponse {
            oid: None,
            value: Some(value),
        }
    }
}

/// A side effect the dispatch loop must carry out after writing the
/// response — currently only StartTLS needs one, since upgrading the
/// transport requires the read half the handler itself never owns (spec
/// §4.10: "write success before the handshake").
#[derive(Debug, PartialEq, Eq)]
pub enum PostAction {
    None,
    UpgradeTls,
}

#[async_trait]
pub trait ExtendedHandler: Send + Sync {
    fn oid(&self) -> &str;

    async fn handle(
        &self,
        conn: &Connection,
        value: Option<Vec<u8>>,
    ) -> Result<(ExtendedResponse, PostAction), LdapError>;
}

/// OID-keyed, idempotent-replace registry (spec §4.11's design note).
/// Registering the same OID twice silently replaces the old handler —
/// there's no "already registered" error, matching how a server would
/// reload extended-operation modules without having to track prior state.
#[derive(Default)]
pub struct ExtendedRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ExtendedHandler>>>,
}

impl ExtendedRegistry {
    pub fn new() -> ExtendedRegistry {
        ExtendedRegistry::default()
    }

    pub async fn register(&self, handler: Arc<dyn ExtendedHandler>) {
        let oid = handler.oid().to_string();
        self.handlers.write().await.insert(oid, handler);
    }

    /// Sorted, for a stable `supportedExtension` attribute in the
    /// RootDSE (spec §4.5).
    pub async fn supported_oids(&self) -> Vec<String> {
        let mut oids: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        oids.sort();
        oids
    }

    pub async fn dispatch(
        &self,
        conn: &Connection,
        oid: &str,
        value: Option<Vec<u8>>,
    ) -> Result<(ExtendedResponse, PostAction), LdapError> {
        let handler = self.handlers.read().await.get(oid).cloned();
        match handler {
            Some(handler) => handler.handle(conn, value).await,
            None => Err(LdapError::Protocol(
                "unsupported extended operation".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ExtendedHandler for Echo {
        fn oid(&self) -> &str {
            "1.2.3.4"
        }

        async fn handle(
            &self,
            _conn: &Connection,
            value: Option<Vec<u8>>,
        ) -> Result<(ExtendedResponse, PostAction), LdapError> {
            Ok((ExtendedResponse::with_value(value.unwrap_or_default()), PostAction::None))
        }
    }

    #[tokio::test]
    async fn supported_oids_lists_registered_handlers() {
        let registry = ExtendedRegistry::new();
        registry.register(Arc::new(Echo)).await;
        assert_eq!(registry.supported_oids().await, vec!["1.2.3.4".to_string()]);
    }

    #[tokio::test]
    async fn re_registering_the_same_oid_replaces_the_handler() {
        let registry = ExtendedRegistry::new();
        registry.register(Arc::new(Echo)).await;
        registry.register(Arc::new(Echo)).await;
        assert_eq!(registry.supported_oids().await.len(), 1);
    }
}
