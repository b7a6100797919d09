//! WhoAmI ([RFC 4532](https://tools.ietf.org/html/rfc4532)), spec §4.10.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::LdapError;
use crate::extended::{ExtendedHandler, ExtendedResponse, PostAction};

pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

pub struct WhoAmI;

#[async_trait]
impl ExtendedHandler for WhoAmI {
    fn oid(&self) -> &str {
        WHOAMI_OID
    }

    /// Anonymous connections get an empty response value; everyone else
    /// gets their bind DN as a `dn:`-form authzId (spec §4.10).
    async fn handle(
        &self,
        conn: &Connection,
        _value: Option<Vec<u8>>,
    ) -> Result<(ExtendedResponse, PostAction), LdapError> {
        let bind_dn = conn.bind_dn();
        let response = if bind_dn.is_empty() {
            ExtendedResponse::empty()
        } else {
            ExtendedResponse::with_value(format!("dn:{bind_dn}").into_bytes())
        };
        Ok((response, PostAction::None))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oid_matches_rfc_4532() {
        assert_eq!(WhoAmI.oid(), "1.3.6.1.4.1.4203.1.11.3");
    }
}
