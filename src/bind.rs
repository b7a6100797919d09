//! The Bind handler (spec §4.4).
//!
//! Anonymous and simple auth only (SASL is a Non-goal, spec §1); a
//! configured root DN is checked before falling through to the backend.
//! Every failure path — unknown DN, wrong password, missing
//! `userPassword` — collapses to the same [`LdapError::InvalidCredentials`]
//! so a client can never distinguish "no such DN" from "wrong password".

use crate::connection::Connection;
use crate::dn;
use crate::error::LdapError;
use crate::message::{AuthChoice, BindRequest};
use crate::password;

/// The identity a successful bind establishes. The caller (the dispatch
/// loop) applies this to the connection only after confirming the result
/// is `Success` (spec §4.3: "updated only on ResultSuccess").
pub struct BindOutcome {
    pub bind_dn: String,
    pub authenticated: bool,
}

pub async fn handle(conn: &Connection, req: &BindRequest) -> Result<BindOutcome, LdapError> {
    if req.version != 3 {
        return Err(LdapError::Protocol("unsupported protocol version, only LDAPv3 is accepted".to_string()));
    }

    let password = match &req.auth {
        AuthChoice::Sasl => return Err(LdapError::AuthMethodNotSupported),
        AuthChoice::Simple(password) => password,
    };

    if req.name.is_empty() && password.is_empty() {
        return if conn.settings.anonymous_binds_allowed {
            Ok(BindOutcome {
                bind_dn: String::new(),
                authenticated: false,
            })
        } else {
            Err(LdapError::InappropriateAuthentication)
        };
    }

    // RFC 4513 §5.1.2: a non-empty name with an empty password is an
    // "unauthenticated bind", which a server must reject unless it's
    // explicitly configured to accept it. This core never is.
    if password.is_empty() {
        return Err(LdapError::InvalidCredentials);
    }

    // Root-DN shortcut (spec §9: the comparison is normalized on both
    // sides, matching the source's prior behavior).
    if let (Some(root_dn), Some(root_hash)) =
        (&conn.settings.root_dn, &conn.settings.root_password_hash)
    {
        if dn::normalize(&req.name) == dn::normalize(root_dn) {
            return if password::verify(root_hash, password) {
                Ok(BindOutcome {
                    bind_dn: req.name.clone(),
                    authenticated: true,
                })
            } else {
                Err(LdapError::InvalidCredentials)
            };
        }
    }

    let entry = conn.backend.get_entry(&req.name).await?;
    let Some(entry) = entry else {
        return Err(LdapError::InvalidCredentials);
    };
    let Some(stored) = entry.attr("userpassword").and_then(|v| v.first()) else {
        return Err(LdapError::InvalidCredentials);
    };
    let stored = String::from_utf8_lossy(stored);
    if password::verify(&stored, password) {
        Ok(BindOutcome {
            bind_dn: req.name.clone(),
            authenticated: true,
        })
    } else {
        Err(LdapError::InvalidCredentials)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::acl::AclEvaluator;
    use crate::backend::memory::MemoryBackend;
    use crate::connection::ConnSettings;
    use crate::controls_impl::paged_results::PagedResultsManager;
    use crate::entry::Entry;
    use crate::extended::ExtendedRegistry;
    use crate::stream::Stream;
    use std::sync::Arc;
    use tokio::net::{TcpListener, TcpStream};

    async fn test_connection(settings: ConnSettings) -> Arc<Connection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, client) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (tcp, peer) = accepted.unwrap();
        drop(client.unwrap());
        let backend = MemoryBackend::new();
        backend
            .seed(
                Entry::new("uid=alice,dc=example,dc=com")
                    .with_attr("objectclass", vec![b"person".to_vec()])
                    .with_attr("userpassword", vec![password::hash("hunter2", password::Scheme::Ssha256).into_bytes()]),
            )
            .await;
        let (conn, _read) = Connection::new(
            1,
            peer,
            Stream::Plain(tcp),
            backend,
            Arc::new(AclEvaluator::default()),
            Arc::new(ExtendedRegistry::new()),
            Arc::new(PagedResultsManager::new(Default::default())),
            Arc::new(settings),
        );
        conn
    }

    fn settings(anonymous: bool) -> ConnSettings {
        ConnSettings {
            anonymous_binds_allowed: anonymous,
            root_dn: Some("cn=admin,dc=example,dc=com".into()),
            root_password_hash: Some(password::hash("rootpw", password::Scheme::Ssha256)),
            admin_dns: vec![],
            naming_contexts: vec!["dc=example,dc=com".into()],
            server_max_size_limit: 1000,
            server_max_time_limit: std::time::Duration::from_secs(30),
            generated_password_length: 12,
            generated_password_scheme: password::Scheme::Ssha256,
            password_modify_requires_tls: false,
            min_password_length: 8,
            tls_acceptor: None,
        }
    }

    #[tokio::test]
    async fn anonymous_bind_succeeds_when_allowed() {
        let conn = test_connection(settings(true)).await;
        let req = BindRequest {
            version: 3,
            name: String::new(),
            auth: AuthChoice::Simple(String::new()),
        };
        let out = handle(&conn, &req).await.unwrap();
        assert!(!out.authenticated);
    }

    #[tokio::test]
    async fn anonymous_bind_rejected_when_disallowed() {
        let conn = test_connection(settings(false)).await;
        let req = BindRequest {
            version: 3,
            name: String::new(),
            auth: AuthChoice::Simple(String::new()),
        };
        assert!(matches!(
            handle(&conn, &req).await,
            Err(LdapError::InappropriateAuthentication)
        ));
    }

    #[tokio::test]
    async fn unknown_dn_and_wrong_password_both_map_to_invalid_credentials() {
        let conn = test_connection(settings(true)).await;
        let unknown = BindRequest {
            version: 3,
            name: "uid=ghost,dc=example,dc=com".into(),
            auth: AuthChoice::Simple("whatever".into()),
        };
        let wrong_pw = BindRequest {
            version: 3,
            name: "uid=alice,dc=example,dc=com".into(),
            auth: AuthChoice::Simple("wrong".into()),
        };
        let e1 = handle(&conn, &unknown).await.unwrap_err();
        let e2 = handle(&conn, &wrong_pw).await.unwrap_err();
        assert_eq!(e1.to_result().0 as u32, e2.to_result().0 as u32);
        assert_eq!(e1.to_string(), e2.to_string());
    }

    #[tokio::test]
    async fn correct_password_succeeds() {
        let conn = test_connection(settings(true)).await;
        let req = BindRequest {
            version: 3,
            name: "uid=alice,dc=example,dc=com".into(),
            auth: AuthChoice::Simple("hunter2".into()),
        };
        let out = handle(&conn, &req).await.unwrap();
        assert!(out.authenticated);
        assert_eq!(out.bind_dn, "uid=alice,dc=example,dc=com");
    }

    #[tokio::test]
    async fn sasl_is_unsupported() {
        let conn = test_connection(settings(true)).await;
        let req = BindRequest {
            version: 3,
            name: "uid=alice,dc=example,dc=com".into(),
            auth: AuthChoice::Sasl,
        };
        assert!(matches!(
            handle(&conn, &req).await,
            Err(LdapError::AuthMethodNotSupported)
        ));
    }
}
