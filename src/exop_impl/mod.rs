//! Concrete [`crate::extended::ExtendedHandler`] implementations (spec
//! §4.10): WhoAmI, StartTLS, and PasswordModify. `server.rs` registers all
//! three on every [`crate::extended::ExtendedRegistry`] it builds.

pub mod passmod;
pub mod starttls;
pub mod whoami;

pub use passmod::PasswordModify;
pub use starttls::StartTls;
pub use whoami::WhoAmI;
