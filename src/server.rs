//! The accept loop and per-connection dispatch (spec §4.2, §4.3).
//!
//! `Server` bundles every piece of shared state a connection needs
//! (backend, ACL evaluator, extended registry, paged-results manager,
//! connection settings) and owns the listener(s). Each accepted socket gets
//! its own [`Connection`] and a dedicated task running [`serve_connection`];
//! nothing here blocks another connection's progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::ReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use lber::frame::{read_frame, DEFAULT_MAX_MESSAGE_SIZE};

use crate::acl::AclEvaluator;
use crate::backend::Backend;
use crate::connection::{reply_protocol_error, Connection, ConnSettings};
use crate::controls_impl::paged_results::PagedResultsManager;
use crate::controls_impl::{
    decode_paged_results_value, decode_persistent_search_value, encode_paged_results_value,
    PAGED_RESULTS_OID, PERSISTENT_SEARCH_OID,
};
use crate::entry::Entry;
use crate::error::LdapError;
use crate::exop_impl::{passmod::PasswordModify, starttls::StartTls, whoami::WhoAmI};
use crate::extended::{ExtendedRegistry, PostAction};
use crate::message::{self, Control, Message, ProtocolOp};
use crate::persistent_search;
use crate::result::LdapResult;
use crate::result_code::ResultCode;
use crate::rootdse;
use crate::search::{self, Scope};
use crate::stream::Stream;
use crate::{add, bind, compare, delete, modify, modifydn};

/// Shared, immutable-after-construction server state, cloned (as `Arc`s)
/// into every connection.
pub struct Server {
    backend: Arc<dyn Backend>,
    acl: Arc<AclEvaluator>,
    extended: Arc<ExtendedRegistry>,
    paged: Arc<PagedResultsManager>,
    settings: Arc<ConnSettings>,
    next_conn_id: AtomicU64,
}

impl Server {
    pub async fn new(
        backend: Arc<dyn Backend>,
        acl: AclEvaluator,
        paged: PagedResultsManager,
        settings: ConnSettings,
    ) -> Server {
        let extended = ExtendedRegistry::new();
        extended.register(Arc::new(WhoAmI)).await;
        extended.register(Arc::new(StartTls)).await;
        extended.register(Arc::new(PasswordModify)).await;
        Server {
            backend,
            acl: Arc::new(acl),
            extended: Arc::new(extended),
            paged: Arc::new(paged),
            settings: Arc::new(settings),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Accept plain-TCP connections forever. A connection whose
    /// [`ConnSettings::tls_acceptor`] is set may still upgrade in place via
    /// StartTLS (spec §4.10); this listener itself never runs the TLS
    /// handshake up front.
    pub async fn serve_plain(self: &Arc<Server>, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (tcp, peer) = listener.accept().await?;
            let server = Arc::clone(self);
            tokio::spawn(async move {
                server.accept_plain(tcp, peer).await;
            });
        }
    }

    /// Accept connections that are TLS from the first byte (the `ldaps`
    /// convention), using `acceptor` rather than this connection's
    /// StartTLS path. Requires `settings.tls_acceptor` to already be set
    /// (the same acceptor is reused, spec §6 "TLS configuration").
    pub async fn serve_tls(
        self: &Arc<Server>,
        listener: TcpListener,
        acceptor: TlsAcceptor,
    ) -> std::io::Result<()> {
        loop {
            let (tcp, peer) = listener.accept().await?;
            let server = Arc::clone(self);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                server.accept_tls(tcp, peer, acceptor).await;
            });
        }
    }

    async fn accept_plain(self: Arc<Server>, tcp: TcpStream, peer: std::net::SocketAddr) {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (conn, read_half) = Connection::new(
            id,
            peer,
            Stream::Plain(tcp),
            Arc::clone(&self.backend),
            Arc::clone(&self.acl),
            Arc::clone(&self.extended),
            Arc::clone(&self.paged),
            Arc::clone(&self.settings),
        );
        conn.logger.info("connection accepted");
        serve_connection(conn, read_half).await;
    }

    async fn accept_tls(
        self: Arc<Server>,
        tcp: TcpStream,
        peer: std::net::SocketAddr,
        acceptor: TlsAcceptor,
    ) {
        let tls = match acceptor.accept(tcp).await {
            Ok(tls) => tls,
            Err(e) => {
                log::warn!(target: "ldapd::conn", "peer={peer} TLS handshake failed: {e}");
                return;
            }
        };
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (conn, read_half) = Connection::new(
            id,
            peer,
            Stream::Tls(Box::new(tls)),
            Arc::clone(&self.backend),
            Arc::clone(&self.acl),
            Arc::clone(&self.extended),
            Arc::clone(&self.paged),
            Arc::clone(&self.settings),
        );
        conn.logger.info("connection accepted (implicit TLS)");
        serve_connection(conn, read_half).await;
    }
}

/// Drive one connection's read/dispatch/write loop until EOF, a fatal
/// framing error, or UnbindRequest (spec §4.3).
async fn serve_connection(conn: Arc<Connection>, mut read_half: ReadHalf<Stream>) {
    loop {
        let frame = read_frame(&mut read_half, DEFAULT_MAX_MESSAGE_SIZE).await;
        let bytes = match frame {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                conn.logger.warn(&format!("framing error: {e}"));
                break;
            }
        };

        let (id, request_tag, op_result, controls) = match message::decode_message_parts(&bytes) {
            Ok(parts) => parts,
            Err(e) => {
                conn.logger.warn(&format!("malformed message envelope: {e}"));
                break;
            }
        };
        conn.record_message_id(id);

        let op = match op_result {
            Ok(op) => op,
            Err(e) => {
                conn.logger.warn(&format!("malformed operation body: {e}"));
                if reply_protocol_error(&conn, id, request_tag, &e.to_string())
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        if matches!(op, ProtocolOp::UnbindRequest) {
            conn.logger.info("unbind");
            break;
        }

        let new_read_half = match dispatch(&conn, read_half, id, op, controls).await {
            Ok(read_half) => read_half,
            Err(e) => {
                conn.logger.warn(&format!("connection terminated: {e}"));
                break;
            }
        };
        read_half = new_read_half;
    }

    conn.abandon.cancel_all().await;
    drop(conn.take_stream(read_half).await);
    conn.logger.info("connection closed");
}

/// Dispatch one decoded operation and write its response(s). Returns the
/// read half back to the caller — StartTLS is the only operation that
/// needs to swap it out for a fresh one wrapping the upgraded stream.
async fn dispatch(
    conn: &Arc<Connection>,
    read_half: ReadHalf<Stream>,
    id: i32,
    op: ProtocolOp,
    controls: Vec<Control>,
) -> Result<ReadHalf<Stream>, LdapError> {
    match op {
        ProtocolOp::BindRequest(req) => {
            let started = std::time::Instant::now();
            let outcome = bind::handle(conn, &req).await;
            let result = match &outcome {
                Ok(_) => LdapResult::success(),
                Err(e) => LdapResult::from(e),
            };
            if let Ok(outcome) = &outcome {
                if result.is_success() {
                    conn.set_identity(outcome.bind_dn.clone(), outcome.authenticated);
                }
            }
            conn.logger.operation("bind", id, started, result.code.description());
            conn.write_frame(message::encode_bind_response(id, &result, &[])).await?;
        }

        ProtocolOp::SearchRequest(req) => {
            // Spawned rather than awaited inline (spec §4.3 "dispatch
            // asynchronously" for long-running operations): the read loop
            // must stay free to receive a subsequent AbandonRequest for
            // this message-id while the search is still emitting entries.
            let conn = Arc::clone(conn);
            tokio::spawn(async move {
                if let Err(e) = handle_search(&conn, id, &req, &controls).await {
                    conn.logger.warn(&format!("search (id={id}) ended in error: {e}"));
                }
            });
        }

        ProtocolOp::AddRequest(entry) => {
            let started = std::time::Instant::now();
            let result = to_ldap_result(add::handle(conn, entry).await);
            conn.logger.operation("add", id, started, result.code.description());
            conn.write_frame(message::encode_add_response(id, &result)).await?;
        }

        ProtocolOp::DelRequest(dn) => {
            let started = std::time::Instant::now();
            let result = to_ldap_result(delete::handle(conn, &dn).await);
            conn.logger.operation("delete", id, started, result.code.description());
            conn.write_frame(message::encode_del_response(id, &result)).await?;
        }

        ProtocolOp::ModifyRequest { dn, changes } => {
            let started = std::time::Instant::now();
            let result = to_ldap_result(modify::handle(conn, &dn, &changes).await);
            conn.logger.operation("modify", id, started, result.code.description());
            conn.write_frame(message::encode_modify_response(id, &result)).await?;
        }

        ProtocolOp::ModifyDnRequest(req) => {
            let started = std::time::Instant::now();
            let result = to_ldap_result(modifydn::handle(conn, &req).await);
            conn.logger.operation("moddn", id, started, result.code.description());
            conn.write_frame(message::encode_modify_dn_response(id, &result)).await?;
        }

        ProtocolOp::CompareRequest(req) => {
            let started = std::time::Instant::now();
            let result = match compare::handle(conn, &req).await {
                Ok(true) => LdapResult::new(ResultCode::CompareTrue, ""),
                Ok(false) => LdapResult::new(ResultCode::CompareFalse, ""),
                Err(e) => LdapResult::from(&e),
            };
            conn.logger.operation("compare", id, started, result.code.description());
            conn.write_frame(message::encode_compare_response(id, &result)).await?;
        }

        ProtocolOp::AbandonRequest(target_id) => {
            conn.logger.debug(&format!("abandon message_id={target_id}"));
            conn.abandon.abandon(target_id).await;
        }

        ProtocolOp::ExtendedRequest(req) => {
            return handle_extended(conn, read_half, id, &req.oid, req.value).await;
        }

        ProtocolOp::UnbindRequest => unreachable!("handled by the caller"),

        // Response-only shapes never arrive as requests.
        ProtocolOp::BindResponse(_)
        | ProtocolOp::SearchResultEntry { .. }
        | ProtocolOp::SearchResultDone(_)
        | ProtocolOp::ModifyResponse(_)
        | ProtocolOp::AddResponse(_)
        | ProtocolOp::DelResponse(_)
        | ProtocolOp::ModifyDnResponse(_)
        | ProtocolOp::CompareResponse(_)
        | ProtocolOp::ExtendedResponse { .. } => {
            return Err(LdapError::Protocol("client sent a response-only PDU shape".to_string()));
        }
    }
    Ok(read_half)
}

fn to_ldap_result(outcome: Result<(), LdapError>) -> LdapResult {
    match outcome {
        Ok(()) => LdapResult::success(),
        Err(e) => LdapResult::from(&e),
    }
}

/// Extended-operation dispatch (spec §4.10). StartTLS is the one handler
/// that needs the read half back — `PostAction::UpgradeTls` tells us to
/// write the success response first, then run the handshake, per spec
/// §4.10's "write success before the handshake".
async fn handle_extended(
    conn: &Arc<Connection>,
    read_half: ReadHalf<Stream>,
    id: i32,
    oid: &str,
    value: Option<Vec<u8>>,
) -> Result<ReadHalf<Stream>, LdapError> {
    let started = std::time::Instant::now();
    match conn.extended.dispatch(conn, oid, value).await {
        Ok((response, action)) => {
            let result = LdapResult::success();
            conn.logger.operation("extended", id, started, result.code.description());
            conn.write_frame(message::encode_extended_response(
                id,
                &result,
                response.oid.as_deref().or(Some(oid)),
                response.value.as_deref(),
            ))
            .await?;
            match action {
                PostAction::None => Ok(read_half),
                PostAction::UpgradeTls => conn.upgrade_tls(read_half).await,
            }
        }
        Err(e) => {
            let result = LdapResult::from(&e);
            conn.logger.operation("extended", id, started, result.code.description());
            conn.write_frame(message::encode_extended_response(id, &result, None, None)).await?;
            Ok(read_half)
        }
    }
}

/// RootDSE (empty base DN, Base scope) never touches the backend (spec
/// §4.5); everything else goes through [`search::evaluate`], optionally
/// wrapped by paged results or handed off entirely to persistent search.
async fn handle_search(
    conn: &Arc<Connection>,
    id: i32,
    req: &crate::message::SearchRequest,
    controls: &[Control],
) -> Result<(), LdapError> {
    let started = std::time::Instant::now();

    let persistent = controls.iter().find(|c| c.oid == PERSISTENT_SEARCH_OID);
    if let Some(control) = persistent {
        let value = control.value.clone().unwrap_or_default();
        let psearch = decode_persistent_search_value(&value)?;
        let guard = conn.abandon.register(id).await;
        let outcome = persistent_search::run(conn, id, req, psearch, guard.cancel.clone()).await;
        conn.logger
            .operation("persistent-search", id, started, match &outcome {
                Ok(()) => "abandoned",
                Err(_) => "error",
            });
        // Per draft-ietf-ldapext-psearch, a persistent search only ever
        // ends by abandon or connection close; it never gets a
        // SearchResultDone.
        return outcome;
    }

    if req.base_dn.is_empty() && matches!(req.scope, Scope::Base) {
        return handle_rootdse_search(conn, id, req).await;
    }

    // Registered so an AbandonRequest racing in on the (now-free) read loop
    // can stop this search from emitting further entries and suppress its
    // SearchResultDone (spec §4.11, §8 scenario 8). The guard unregisters
    // itself on drop, whichever way this function returns.
    let guard = conn.abandon.register(id).await;

    let paged = controls.iter().find(|c| c.oid == PAGED_RESULTS_OID);
    if let Some(control) = paged {
        let outcome = handle_paged_search(conn, id, req, control, &guard).await;
        let code = outcome.as_ref().map(|_| ResultCode::Success).unwrap_or_else(|e| e.to_result().0);
        conn.logger.operation("search (paged)", id, started, code.description());
        return match outcome {
            Ok(()) => Ok(()),
            Err(_) if guard.is_cancelled() => {
                conn.logger.debug(&format!("search id={id} abandoned"));
                Ok(())
            }
            Err(e) => {
                let result = LdapResult::from(&e);
                conn.write_frame(message::encode_search_result_done(id, &result, &[])).await
            }
        };
    }

    let outcome = search::evaluate(
        conn.backend.as_ref(),
        conn.acl.as_ref(),
        &conn.bind_dn(),
        req,
        conn.settings.server_max_size_limit,
        conn.settings.server_max_time_limit,
    )
    .await;
    let result = match outcome {
        Ok(outcome) => {
            for (dn, attrs) in &outcome.entries {
                if guard.is_cancelled() {
                    conn.logger.debug(&format!("search id={id} abandoned, entries suppressed"));
                    return Ok(());
                }
                conn.write_frame(message::encode_search_result_entry(id, dn, attrs)).await?;
            }
            outcome.result
        }
        Err(e) => LdapResult::from(&e),
    };
    if guard.is_cancelled() {
        conn.logger.debug(&format!("search id={id} abandoned before SearchResultDone"));
        return Ok(());
    }
    conn.logger.operation("search", id, started, result.code.description());
    conn.write_frame(message::encode_search_result_done(id, &result, &[])).await
}

async fn handle_rootdse_search(
    conn: &Arc<Connection>,
    id: i32,
    req: &crate::message::SearchRequest,
) -> Result<(), LdapError> {
    let oids = conn.extended.supported_oids().await;
    let entry = rootdse::build(&conn.settings.naming_contexts, &oids);
    if req.filter.matches(&entry) {
        let selected = search::select_attributes(&entry, &req.attributes, req.types_only);
        conn.write_frame(message::encode_search_result_entry(id, &entry.dn, &selected)).await?;
    }
    conn.write_frame(message::encode_search_result_done(id, &LdapResult::success(), &[])).await
}

/// Paged results (RFC 2696, spec §4.6): the first page runs the full
/// pipeline once and hands the remainder to [`PagedResultsManager`];
/// continuation pages just drain it. `entries` is rebuilt as synthetic
/// [`Entry`] values so the manager's cursor, which is search-result-shape
/// agnostic, can store and replay already-selected attribute lists.
async fn empty_paged_done(conn: &Arc<Connection>, id: i32) -> Result<(), LdapError> {
    let response_control = Control {
        oid: PAGED_RESULTS_OID.to_string(),
        critical: false,
        value: Some(encode_paged_results_value(0, &[])),
    };
    conn.write_frame(message::encode_search_result_done(id, &LdapResult::success(), &[response_control]))
        .await
}

async fn handle_paged_search(
    conn: &Arc<Connection>,
    id: i32,
    req: &crate::message::SearchRequest,
    control: &Control,
    guard: &crate::abandon::OpGuard<'_>,
) -> Result<(), LdapError> {
    let value = control.value.clone().unwrap_or_default();
    let (requested_size, cookie) = decode_paged_results_value(&value)?;
    let filter_canonical = req.filter.canonical();

    let (page, out_cookie) = if cookie.is_empty() {
        if requested_size == 0 {
            // A client may abandon its own not-yet-started cursor with an
            // empty cookie and size 0; there's nothing to discard yet.
            return empty_paged_done(conn, id).await;
        }
        let outcome = search::evaluate(
            conn.backend.as_ref(),
            conn.acl.as_ref(),
            &conn.bind_dn(),
            req,
            conn.settings.server_max_size_limit,
            conn.settings.server_max_time_limit,
        )
        .await?;
        let entries: std::collections::VecDeque<Entry> = outcome
            .entries
            .iter()
            .map(|(dn, attrs)| {
                let mut e = Entry::new(dn.clone());
                for (name, values) in attrs {
                    e.set_attr(name, values.clone());
                }
                e
            })
            .collect();
        conn.paged.start(
            requested_size as usize,
            &req.base_dn,
            req.scope,
            &filter_canonical,
            req.types_only,
            entries,
        )?
    } else if requested_size == 0 {
        conn.paged.discard(&cookie);
        return empty_paged_done(conn, id).await;
    } else {
        conn.paged.resume(
            &cookie,
            requested_size as usize,
            &req.base_dn,
            req.scope,
            &filter_canonical,
            req.types_only,
        )?
    };

    for entry in &page {
        if guard.is_cancelled() {
            return Ok(());
        }
        let attrs: Vec<(String, Vec<Vec<u8>>)> =
            entry.iter().map(|(n, v)| (n.to_string(), v.to_vec())).collect();
        conn.write_frame(message::encode_search_result_entry(id, &entry.dn, &attrs)).await?;
    }

    if guard.is_cancelled() {
        return Ok(());
    }

    let response_value = encode_paged_results_value(0, &out_cookie);
    let response_control = Control {
        oid: PAGED_RESULTS_OID.to_string(),
        critical: false,
        value: Some(response_value),
    };
    conn.write_frame(message::encode_search_result_done(id, &LdapResult::success(), &[response_control]))
        .await
}
