//! The per-connection state machine (spec §3 "Connection State", §4.3).
//!
//! `Connection` is the value a `Server` hands to every handler: bind
//! identity, TLS state, the shared backend/ACL/extended-registry/paged-
//! results manager, the abandon tracker, and a serialized writer half. All
//! mutable connection state lives behind one `std::sync::Mutex` (spec §3);
//! the writer half lives behind its own `tokio::sync::Mutex` so a write
//! never has to wait on, or block, a bind-identity check, and is always
//! released before any backend call or suspension (spec §4.3, §5).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use tokio::io::{split, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::abandon::AbandonTracker;
use crate::acl::AclEvaluator;
use crate::backend::Backend;
use crate::controls_impl::paged_results::PagedResultsManager;
use crate::error::LdapError;
use crate::extended::ExtendedRegistry;
use crate::logger::ConnLogger;
use crate::message;
use crate::password::Scheme;
use crate::stream::Stream;
use std::sync::Arc;

/// Settings a connection needs that come from server configuration but
/// never change over the connection's lifetime (spec §6 "TLS
/// configuration", §4.4 "Bind", §4.10 "PasswordModify").
pub struct ConnSettings {
    pub anonymous_binds_allowed: bool,
    pub root_dn: Option<String>,
    pub root_password_hash: Option<String>,
    pub admin_dns: Vec<String>,
    pub naming_contexts: Vec<String>,
    pub server_max_size_limit: i64,
    pub server_max_time_limit: std::time::Duration,
    pub generated_password_length: usize,
    pub generated_password_scheme: Scheme,
    pub password_modify_requires_tls: bool,
    /// PasswordModify policy (spec §4.10: "apply policy to newPasswd (else
    /// ConstraintViolation)"). The only policy rule this core enforces is a
    /// minimum length; a real deployment's fuller policy (history, class
    /// requirements, dictionary checks) stays a backend/site concern.
    pub min_password_length: usize,
    pub tls_acceptor: Option<TlsAcceptor>,
}

/// The mutable part of connection state (spec §3): bind identity, TLS flag,
/// serialized under one mutex so a rebind and an in-flight operation's
/// identity capture never race (spec §9's resolved open question: a rebind
/// does not cancel in-flight operations; they keep their captured identity
/// because they copy `bind_dn` out of this struct once, at dispatch time).
struct ConnState {
    bind_dn: String,
    authenticated: bool,
    is_tls: bool,
}

pub struct Connection {
    pub id: u64,
    pub peer: SocketAddr,
    pub logger: ConnLogger,
    pub backend: Arc<dyn Backend>,
    pub acl: Arc<AclEvaluator>,
    pub extended: Arc<ExtendedRegistry>,
    pub paged: Arc<PagedResultsManager>,
    pub settings: Arc<ConnSettings>,
    pub abandon: AbandonTracker,
    state: Mutex<ConnState>,
    writer: tokio::sync::Mutex<Option<WriteHalf<Stream>>>,
    last_message_id: AtomicI32,
}

impl Connection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        peer: SocketAddr,
        stream: Stream,
        backend: Arc<dyn Backend>,
        acl: Arc<AclEvaluator>,
        extended: Arc<ExtendedRegistry>,
        paged: Arc<PagedResultsManager>,
        settings: Arc<ConnSettings>,
    ) -> (Arc<Connection>, ReadHalf<Stream>) {
        let is_tls = stream.is_tls();
        let logger = ConnLogger::new(id, peer.to_string());
        let (read_half, write_half) = split(stream);
        let conn = Arc::new(Connection {
            id,
            peer,
            logger,
            backend,
            acl,
            extended,
            paged,
            settings,
            abandon: AbandonTracker::new(),
            state: Mutex::new(ConnState {
                bind_dn: String::new(),
                authenticated: false,
                is_tls,
            }),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            last_message_id: AtomicI32::new(0),
        });
        (conn, read_half)
    }

    /// The identity in force *right now*. Handlers copy this out once at
    /// dispatch time; a concurrent rebind never changes an already-started
    /// operation's view (spec §9).
    pub fn bind_dn(&self) -> String {
        self.state.lock().expect("connection state mutex").bind_dn.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().expect("connection state mutex").authenticated
    }

    pub fn is_tls(&self) -> bool {
        self.state.lock().expect("connection state mutex").is_tls
    }

    /// Apply a successful bind (spec §4.3: "updated only on ResultSuccess").
    /// A new bind on an already-bound connection atomically replaces the
    /// identity; operations already dispatched keep whatever `bind_dn()`
    /// they captured before this call.
    pub fn set_identity(&self, bind_dn: String, authenticated: bool) {
        let mut state = self.state.lock().expect("connection state mutex");
        state.bind_dn = bind_dn;
        state.authenticated = authenticated;
    }

    pub fn record_message_id(&self, id: i32) {
        self.last_message_id.store(id, Ordering::Relaxed);
    }

    /// Write one fully-encoded message, serialized against every other
    /// writer on this connection (spec §4.3 "writes from concurrent
    /// operations must not interleave message bytes"). The lock is held
    /// only for the write+flush itself, never across a backend call or
    /// another suspension point (spec §5).
    pub async fn write_frame(&self, bytes: Vec<u8>) -> Result<(), LdapError> {
        use tokio::io::AsyncWriteExt;
        let mut guard = self.writer.lock().await;
        let half = guard
            .as_mut()
            .ok_or_else(|| LdapError::Operations("connection is mid-TLS-upgrade".into()))?;
        half.write_all(&bytes)
            .await
            .map_err(|e| LdapError::Operations(format!("write failed: {e}")))?;
        half.flush()
            .await
            .map_err(|e| LdapError::Operations(format!("flush failed: {e}")))
    }

    /// Perform the StartTLS in-place upgrade (spec §4.3, §4.10). Takes the
    /// read half the caller's read loop currently owns, reunites it with
    /// the write half, runs the handshake, and returns a fresh read half
    /// for the read loop to continue with; the write half is swapped back
    /// into this connection's serialized writer.
    ///
    /// Refuses (with a descriptive error, mapped to `OperationsError` by
    /// the caller) if any operation is still pending on this connection —
    /// StartTLS mid-flight of a long-running search would otherwise need to
    /// migrate that operation's in-progress writes to a stream that doesn't
    /// exist yet, which this core does not attempt.
    pub async fn upgrade_tls(
        &self,
        read_half: ReadHalf<Stream>,
    ) -> Result<ReadHalf<Stream>, LdapError> {
        let acceptor = self
            .settings
            .tls_acceptor
            .clone()
            .ok_or_else(|| LdapError::Unavailable("TLS is not configured on this server"))?;

        let mut guard = self.writer.lock().await;
        let write_half = guard
            .take()
            .ok_or_else(|| LdapError::Operations("writer already detached".into()))?;
        let stream = read_half.unsplit(write_half);
        let plain = match stream {
            Stream::Plain(tcp) => tcp,
            Stream::Tls(_) => {
                // Shouldn't happen: the exop handler already checked
                // is_tls() before calling this. Put the stream back intact
                // rather than losing it.
                let (r, w) = split(stream);
                *guard = Some(w);
                return Err(LdapError::Operations("already TLS".into()));
            }
        };

        let tls_stream = acceptor
            .accept(plain)
            .await
            .map_err(|e| LdapError::Operations(format!("TLS handshake failed: {e}")))?;
        let new_stream = Stream::Tls(Box::new(tls_stream));
        let (new_read, new_write) = split(new_stream);
        *guard = Some(new_write);
        drop(guard);

        self.state.lock().expect("connection state mutex").is_tls = true;
        Ok(new_read)
    }

    /// Reconstruct the original, unsplit stream one final time so the read
    /// half passed by the read loop can be dropped together with the
    /// writer at connection close, instead of leaking the pairing.
    pub async fn take_stream(&self, read_half: ReadHalf<Stream>) -> Option<Stream> {
        let write_half = self.writer.lock().await.take()?;
        Some(read_half.unsplit(write_half))
    }
}

/// Encode and write a `ProtocolError` response for a request whose body
/// failed to decode but whose message-id and request tag are known (spec
/// §4.2's recoverable-parse-error path).
pub async fn reply_protocol_error(
    conn: &Connection,
    id: i32,
    request_tag: u32,
    diagnostic: &str,
) -> Result<(), LdapError> {
    if let Some(response_tag) = message::response_tag_for_request(request_tag) {
        let bytes = message::encode_protocol_error(id, response_tag, diagnostic);
        conn.write_frame(bytes).await?;
    }
    Ok(())
}

/// Plain accept: no TLS material configured, connections arrive already
/// as `TcpStream`.
pub fn plain_stream(tcp: TcpStream) -> Stream {
    Stream::Plain(tcp)
}
