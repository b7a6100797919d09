//! A minimal client harness for the integration tests: encodes requests and
//! decodes responses at the raw BER level, the way a real LDAP client would,
//! since the server itself only ever decodes requests and encodes
//! responses (it never needs the reverse).

use std::sync::Arc;

use lber::tag::{Tag as BerTag, TagClass, Tlv};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ldapd::acl::AclEvaluator;
use ldapd::backend::memory::MemoryBackend;
use ldapd::connection::ConnSettings;
use ldapd::controls_impl::paged_results::PagedResultsManager;
use ldapd::password::{self, Scheme};
use ldapd::server::Server;

/// Wraps an application-tagged, constructed op body the way every LDAP
/// request/response does, then the envelope `SEQUENCE { id, op }`.
fn envelope(id: i64, app_tag: u32, inner: Vec<BerTag>) -> Vec<u8> {
    let op = Tlv {
        class: TagClass::Application,
        tag: app_tag,
        value: lber::tag::Value::Constructed(inner.into_iter().map(BerTag::into_tlv).collect()),
    };
    let tlv = BerTag::Sequence(vec![BerTag::Integer(id), BerTag::Raw(op)]).into_tlv();
    lber::write::encode_to_vec(&tlv)
}

pub const TAG_BIND_REQUEST: u32 = 0;
pub const TAG_UNBIND_REQUEST: u32 = 2;
pub const TAG_SEARCH_REQUEST: u32 = 3;
pub const TAG_SEARCH_RESULT_ENTRY: u32 = 4;
pub const TAG_SEARCH_RESULT_DONE: u32 = 5;
pub const TAG_DEL_REQUEST: u32 = 10;

pub fn bind_request(id: i64, name: &str, password: &str) -> Vec<u8> {
    envelope(
        id,
        TAG_BIND_REQUEST,
        vec![
            BerTag::Integer(3),
            BerTag::OctetString(name.as_bytes().to_vec()),
            BerTag::ContextPrimitive(0, password.as_bytes().to_vec()),
        ],
    )
}

pub fn unbind_request(id: i64) -> Vec<u8> {
    let tlv = BerTag::Sequence(vec![
        BerTag::Integer(id),
        BerTag::Raw(Tlv {
            class: TagClass::Application,
            tag: TAG_UNBIND_REQUEST,
            value: lber::tag::Value::Primitive(Vec::new()),
        }),
    ])
    .into_tlv();
    lber::write::encode_to_vec(&tlv)
}

pub fn del_request(id: i64, dn: &str) -> Vec<u8> {
    let tlv = BerTag::Sequence(vec![
        BerTag::Integer(id),
        BerTag::Raw(Tlv {
            class: TagClass::Application,
            tag: TAG_DEL_REQUEST,
            value: lber::tag::Value::Primitive(dn.as_bytes().to_vec()),
        }),
    ])
    .into_tlv();
    lber::write::encode_to_vec(&tlv)
}

/// `filter` is an already-built `present` filter body (`[7] attrName`), the
/// only filter shape these tests need.
pub fn search_request(
    id: i64,
    base_dn: &str,
    scope: i64,
    size_limit: i64,
    filter_attr: &str,
    attributes: Vec<&str>,
) -> Vec<u8> {
    envelope(
        id,
        TAG_SEARCH_REQUEST,
        vec![
            BerTag::OctetString(base_dn.as_bytes().to_vec()),
            BerTag::Enumerated(scope),
            BerTag::Enumerated(0),
            BerTag::Integer(size_limit),
            BerTag::Integer(0),
            BerTag::Boolean(false),
            BerTag::ContextPrimitive(7, filter_attr.as_bytes().to_vec()),
            BerTag::Sequence(attributes.into_iter().map(|a| BerTag::OctetString(a.as_bytes().to_vec())).collect()),
        ],
    )
}

/// Reads one framed message and returns its parsed top-level `Tlv`
/// alongside the message id.
pub async fn read_response(stream: &mut TcpStream) -> (i64, Tlv) {
    let frame = lber::frame::read_frame(stream, lber::frame::DEFAULT_MAX_MESSAGE_SIZE)
        .await
        .unwrap()
        .expect("connection closed before a response arrived");
    let tlv = lber::parse::parse_tlv(&frame).unwrap();
    let items = tlv.into_constructed().unwrap();
    let id = lber::parse::read_int(items[0].as_primitive().unwrap()).unwrap();
    (id, items[1].clone())
}

/// Every response op this server sends carries its result as the first
/// three children: `resultCode ENUMERATED`, `matchedDN`, `diagnosticMessage`.
pub fn result_code(op: &Tlv) -> i64 {
    let children = op.as_constructed().unwrap();
    lber::parse::read_int(children[0].as_primitive().unwrap()).unwrap()
}

pub async fn write_request(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
    stream.flush().await.unwrap();
}

/// Spins up a real `Server` on loopback with a seeded `MemoryBackend` and an
/// ACL policy permissive enough to exercise search/add/delete, and returns
/// the listener address to connect to.
pub async fn spawn_server(acl: AclEvaluator, seed: Vec<ldapd::entry::Entry>) -> std::net::SocketAddr {
    let backend = MemoryBackend::new();
    for entry in seed {
        backend.seed(entry).await;
    }
    let settings = ConnSettings {
        anonymous_binds_allowed: true,
        root_dn: Some("cn=admin,dc=example,dc=com".to_string()),
        root_password_hash: Some(password::hash("rootpw", Scheme::Ssha256)),
        admin_dns: vec!["cn=admin,dc=example,dc=com".to_string()],
        naming_contexts: vec!["dc=example,dc=com".to_string()],
        server_max_size_limit: 1000,
        server_max_time_limit: std::time::Duration::from_secs(30),
        generated_password_length: 12,
        generated_password_scheme: Scheme::Ssha256,
        password_modify_requires_tls: false,
        min_password_length: 8,
        tls_acceptor: None,
    };
    let paged = PagedResultsManager::new(Default::default());
    let server = Arc::new(Server::new(backend, acl, paged, settings).await);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve_plain(listener).await;
    });
    addr
}

pub async fn connect(addr: std::net::SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}
