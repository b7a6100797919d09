//! Command-line parsing (spec §6 "Configuration").
//!
//! Kept deliberately thin: everything that can live in the config file does;
//! the CLI only carries what you'd want to override for a single run
//! (config path, listener addresses, log verbosity) without editing a file.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ldapd", about = "An LDAPv3 directory server core")]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `./ldapd.toml` if present.
    #[arg(short, long, env = "LDAPD_CONFIG")]
    pub config: Option<String>,

    /// Override the plaintext listener address from the config file.
    #[arg(long, env = "LDAPD_LISTEN")]
    pub listen: Option<String>,

    /// Override the implicit-TLS listener address from the config file.
    #[arg(long, env = "LDAPD_LISTEN_TLS")]
    pub listen_tls: Option<String>,

    /// Raise the log level to `debug` regardless of the config file.
    #[arg(short, long)]
    pub debug: bool,
}
