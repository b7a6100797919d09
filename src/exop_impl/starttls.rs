//! StartTLS ([RFC 4511 §4.14](https://tools.ietf.org/html/rfc4511#section-4.14)), spec §4.10.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::LdapError;
use crate::extended::{ExtendedHandler, ExtendedResponse, PostAction};

pub const STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";

pub struct StartTls;

#[async_trait]
impl ExtendedHandler for StartTls {
    fn oid(&self) -> &str {
        STARTTLS_OID
    }

    /// Returns success with no value; the actual handshake happens after the
    /// caller writes this response, via `PostAction::UpgradeTls` (spec §4.10
    /// requires the response to precede the TLS records on the wire).
    async fn handle(
        &self,
        conn: &Connection,
        _value: Option<Vec<u8>>,
    ) -> Result<(ExtendedResponse, PostAction), LdapError> {
        if conn.is_tls() {
            return Err(LdapError::Operations("connection is already TLS".into()));
        }
        if conn.settings.tls_acceptor.is_none() {
            return Err(LdapError::Unavailable("TLS is not configured on this server"));
        }
        Ok((ExtendedResponse::empty(), PostAction::UpgradeTls))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oid_matches_rfc_4511() {
        assert_eq!(StartTls.oid(), "1.3.6.1.4.1.1466.20037");
    }
}
