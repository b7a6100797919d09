//! Persistent search streaming (draft-ietf-ldapext-psearch, spec §4.7).
//!
//! Unlike a plain search, this never terminates on its own — it runs until
//! the client abandons it or the connection drops. The dispatch loop hands
//! off to [`run`] once it's decided a `SearchRequest` carries the control
//! and registered the operation with the abandon tracker; everything below
//! that point is this module's job.

use crate::acl::Access;
use crate::backend::ChangeEvent;
use crate::connection::Connection;
use crate::controls_impl::{encode_entry_change_notification, PersistentSearchRequest};
use crate::entry::Entry;
use crate::error::LdapError;
use crate::message::{self, Control, SearchRequest};
use crate::search::select_attributes;

/// changeTypes bit values (draft-ietf-ldapext-psearch §5).
const CHANGE_ADD: u32 = 1;
const CHANGE_DELETE: u32 = 2;
const CHANGE_MODIFY: u32 = 4;
const CHANGE_MODDN: u32 = 8;

fn change_type_enum(event: &ChangeEvent) -> u32 {
    // draft-ietf-ldapext-psearch §6 EntryChangeNotification.changeType
    // ENUMERATED values, distinct from the changeTypes bitmask above.
    match event {
        ChangeEvent::Added(_) => 1,
        ChangeEvent::Deleted(_) => 2,
        ChangeEvent::Modified(_) => 4,
        ChangeEvent::Renamed(_) => 8,
    }
}

fn wants(req: &PersistentSearchRequest, event: &ChangeEvent) -> bool {
    let bit = match event {
        ChangeEvent::Added(_) => CHANGE_ADD,
        ChangeEvent::Deleted(_) => CHANGE_DELETE,
        ChangeEvent::Modified(_) => CHANGE_MODIFY,
        ChangeEvent::Renamed(_) => CHANGE_MODDN,
    };
    req.change_types & bit != 0
}

fn entry_of(event: &ChangeEvent) -> Option<&Entry> {
    match event {
        ChangeEvent::Added(e) | ChangeEvent::Modified(e) | ChangeEvent::Renamed(e) => Some(e),
        ChangeEvent::Deleted(_) => None,
    }
}

fn emit_change_notification(
    psearch: &PersistentSearchRequest,
    event: &ChangeEvent,
) -> Option<Vec<Control>> {
    if !psearch.return_ecs {
        return None;
    }
    // This core never tracks an entry's pre-rename DN once the backend has
    // already renamed it, so previousDN is always omitted (the field is
    // OPTIONAL).
    let ec_value = encode_entry_change_notification(change_type_enum(event), None);
    Some(vec![Control {
        oid: crate::controls_impl::ENTRY_CHANGE_NOTIFICATION_OID.to_string(),
        critical: false,
        value: Some(ec_value),
    }])
}

/// Stream `SearchResultEntry`s for one persistent search to completion
/// (abandon or connection close). Never returns a `SearchResultDone` —
/// RFC 4511 gives that PDU no meaning for an operation the client itself
/// has to cut short, and the dispatch loop knows not to send one.
pub async fn run(
    conn: &Connection,
    message_id: i32,
    req: &SearchRequest,
    psearch: PersistentSearchRequest,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<(), LdapError> {
    let bind_dn = conn.bind_dn();
    if !conn.acl.allows(&bind_dn, &req.base_dn, Access::Search, None) {
        return Err(LdapError::InsufficientAccessRights);
    }

    if !psearch.changes_only {
        let candidates = conn.backend.search_by_dn(&req.base_dn, req.scope).await?;
        for entry in &candidates {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !req.filter.matches(entry) {
                continue;
            }
            let selected: Vec<(String, Vec<Vec<u8>>)> = select_attributes(entry, &req.attributes, req.types_only)
                .into_iter()
                .filter(|(attr, _)| conn.acl.allows(&bind_dn, &entry.dn, Access::Read, Some(attr)))
                .collect();
            let bytes = message::encode_search_result_entry(message_id, &entry.dn, &selected);
            conn.write_frame(bytes).await?;
        }
    }

    let mut watch = conn.backend.watch(&req.base_dn, req.scope).await;
    let watch_id = watch.id;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = watch.receiver.recv() => {
                let Some(event) = event else { break };
                if !wants(&psearch, &event) {
                    continue;
                }

                // Delete events carry only the DN (spec §4.7): there is no
                // entry left to filter-match or attribute-select against,
                // so a delete is reported whenever its DN is read-visible.
                let Some(entry) = entry_of(&event) else {
                    let dn = event.dn();
                    if !conn.acl.allows(&bind_dn, dn, Access::Read, None) {
                        continue;
                    }
                    let bytes = match emit_change_notification(&psearch, &event) {
                        Some(controls) => message::encode_search_result_entry_with_controls(message_id, dn, &[], &controls),
                        None => message::encode_search_result_entry(message_id, dn, &[]),
                    };
                    conn.write_frame(bytes).await?;
                    continue;
                };
                if !req.filter.matches(entry) {
                    continue;
                }
                if !conn.acl.allows(&bind_dn, &entry.dn, Access::Read, None) {
                    continue;
                }
                let selected: Vec<(String, Vec<Vec<u8>>)> = select_attributes(entry, &req.attributes, req.types_only)
                    .into_iter()
                    .filter(|(attr, _)| conn.acl.allows(&bind_dn, &entry.dn, Access::Read, Some(attr)))
                    .collect();
                let bytes = match emit_change_notification(&psearch, &event) {
                    Some(controls) => message::encode_search_result_entry_with_controls(message_id, &entry.dn, &selected, &controls),
                    None => message::encode_search_result_entry(message_id, &entry.dn, &selected),
                };
                conn.write_frame(bytes).await?;
            }
        }
    }
    conn.backend.unwatch(watch_id).await;
    Ok(())
}
