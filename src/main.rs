//! Binary entrypoint: wires CLI + config + logging + backend + server
//! together and runs the accept loops until shutdown (spec §6).

use std::io::BufReader;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use ldapd::acl::AclEvaluator;
use ldapd::backend::memory::MemoryBackend;
use ldapd::cli::Cli;
use ldapd::config::ServerConfig;
use ldapd::connection::ConnSettings;
use ldapd::controls_impl::paged_results::{PagedResultsConfig, PagedResultsManager};
use ldapd::server::Server;

fn init_logging(cfg: &ServerConfig, debug: bool) {
    let level = if debug { "debug" } else { cfg.log_level.as_str() };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn build_tls_acceptor(cfg: &ServerConfig) -> std::io::Result<Option<TlsAcceptor>> {
    let (Some(cert_path), Some(key_path)) = (&cfg.tls_cert_path, &cfg.tls_key_path) else {
        return Ok(None);
    };
    let cert_file = std::fs::File::open(cert_path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))?
        .into_iter()
        .map(rustls::Certificate)
        .collect::<Vec<_>>();
    let key_file = std::fs::File::open(key_path)?;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file))?;
    let key = keys
        .pop()
        .map(rustls::PrivateKey)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no private key found"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(TlsAcceptor::from(Arc::new(tls_config))))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let cfg = ServerConfig::load(cli.config.as_deref())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    init_logging(&cfg, cli.debug);

    let tls_acceptor = build_tls_acceptor(&cfg)?;

    let settings = ConnSettings {
        anonymous_binds_allowed: cfg.anonymous_binds_allowed,
        root_dn: cfg.root_dn.clone(),
        root_password_hash: cfg.root_password_hash.clone(),
        admin_dns: cfg.admin_dns.clone(),
        naming_contexts: cfg.naming_contexts.clone(),
        server_max_size_limit: cfg.size_limit,
        server_max_time_limit: std::time::Duration::from_secs(cfg.time_limit_secs),
        generated_password_length: cfg.generated_password_length,
        generated_password_scheme: cfg.generated_password_scheme,
        password_modify_requires_tls: cfg.password_modify_requires_tls,
        min_password_length: cfg.min_password_length,
        tls_acceptor: tls_acceptor.clone(),
    };
    let acl = AclEvaluator::new(cfg.acl_rules(), cfg.acl_default());
    let paged = PagedResultsManager::new(PagedResultsConfig {
        max_concurrent_states: cfg.paged_results_max_concurrent,
        ttl: std::time::Duration::from_secs(cfg.paged_results_ttl_secs),
    });
    let backend = MemoryBackend::new();

    let server = Arc::new(Server::new(backend, acl, paged, settings).await);

    let listen_addr = cli.listen.clone().unwrap_or_else(|| cfg.listen_address.clone());
    let plain_listener = TcpListener::bind(&listen_addr).await?;
    log::info!("listening for plaintext LDAP on {listen_addr}");
    let plain_server = Arc::clone(&server);
    let plain_task = tokio::spawn(async move { plain_server.serve_plain(plain_listener).await });

    let tls_addr = cli.listen_tls.clone().or_else(|| cfg.listen_tls_address.clone());
    let tls_task = match (tls_addr, tls_acceptor) {
        (Some(addr), Some(acceptor)) => {
            let tls_listener = TcpListener::bind(&addr).await?;
            log::info!("listening for implicit-TLS LDAP on {addr}");
            let tls_server = Arc::clone(&server);
            Some(tokio::spawn(
                async move { tls_server.serve_tls(tls_listener, acceptor).await },
            ))
        }
        (Some(_), None) => {
            log::warn!("listen_tls_address set without tls_cert_path/tls_key_path, ignoring");
            None
        }
        (None, _) => None,
    };

    tokio::select! {
        res = plain_task => {
            if let Ok(Err(e)) = res {
                log::error!("plaintext listener exited: {e}");
            }
        }
        _ = async {
            if let Some(task) = tls_task {
                let _ = task.await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
