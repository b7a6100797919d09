//! The Paged Results control (RFC 2696, spec §4.6).
//!
//! A cursor keyed by a server-chosen id, carried to the client as an
//! opaque cookie. The manager never re-runs a search on a later page —
//! the first page computes the full, already scope/filter/ACL-applied
//! result set once and the cursor just drains it. Continuation requests
//! are checked against the parameters that produced the cursor (spec §9's
//! resolved open question: a changed base DN, scope, filter, or
//! types-only flag invalidates the cookie rather than silently resuming
//! against the old parameters).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entry::Entry;
use crate::error::LdapError;
use crate::search::Scope;

const COOKIE_VERSION: u8 = 0x01;
const COOKIE_ID_LEN: usize = 8;

pub struct PagedResultsConfig {
    pub max_concurrent_states: usize,
    pub ttl: Duration,
}

impl Default for PagedResultsConfig {
    fn default() -> PagedResultsConfig {
        PagedResultsConfig {
            max_concurrent_states: 100,
            ttl: Duration::from_secs(300),
        }
    }
}

/// The parameters a continuation page must still match (spec §4.6).
#[derive(Clone, PartialEq, Eq)]
struct PageParams {
    base_dn: String,
    scope: Scope,
    filter_canonical: String,
    types_only: bool,
}

impl PageParams {
    fn matches(&self, base_dn: &str, scope: Scope, filter_canonical: &str, types_only: bool) -> bool {
        self.base_dn == base_dn
            && self.scope == scope
            && self.filter_canonical == filter_canonical
            && self.types_only == types_only
    }
}

struct PagedState {
    params: PageParams,
    remaining: std::collections::VecDeque<Entry>,
    created: Instant,
}

/// Thread-safe cursor table. One instance is shared server-wide (spec
/// §4.6); every paged search on every connection draws from the same id
/// space and the same concurrency cap.
pub struct PagedResultsManager {
    config: PagedResultsConfig,
    states: Mutex<HashMap<u64, PagedState>>,
    next_id: AtomicU64,
}

fn invalid_cookie() -> LdapError {
    LdapError::UnwillingToPerform("invalid or expired paged-results cookie".into())
}

fn encode_cookie(id: u64) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let len = id_bytes.len() as u16;
    let mut out = Vec::with_capacity(3 + id_bytes.len());
    out.push(COOKIE_VERSION);
    out.push((len >> 8) as u8);
    out.push((len & 0xFF) as u8);
    out.extend_from_slice(&id_bytes);
    out
}

fn decode_cookie(cookie: &[u8]) -> Result<u64, LdapError> {
    if cookie.len() != 3 + COOKIE_ID_LEN || cookie[0] != COOKIE_VERSION {
        return Err(invalid_cookie());
    }
    let len = ((cookie[1] as usize) << 8) | cookie[2] as usize;
    if len != COOKIE_ID_LEN {
        return Err(invalid_cookie());
    }
    let mut buf = [0u8; COOKIE_ID_LEN];
    buf.copy_from_slice(&cookie[3..3 + COOKIE_ID_LEN]);
    Ok(u64::from_be_bytes(buf))
}

impl PagedResultsManager {
    pub fn new(config: PagedResultsConfig) -> PagedResultsManager {
        PagedResultsManager {
            config,
            states: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn evict_expired(&self, states: &mut HashMap<u64, PagedState>) {
        let ttl = self.config.ttl;
        let now = Instant::now();
        states.retain(|_, s| now.duration_since(s.created) < ttl);
    }

    /// First page: `entries` is the full, already-evaluated result set.
    /// Drains up to `page_size` entries and, if anything remains, stores
    /// the rest under a fresh id. Returns the page plus the cookie to
    /// hand back (empty once the set is exhausted in one page).
    pub fn start(
        &self,
        page_size: usize,
        base_dn: &str,
        scope: Scope,
        filter_canonical: &str,
        types_only: bool,
        mut entries: std::collections::VecDeque<Entry>,
    ) -> Result<(Vec<Entry>, Vec<u8>), LdapError> {
        let page_size = page_size.max(1);
        let page: Vec<Entry> = entries.drain(..entries.len().min(page_size)).collect();
        if entries.is_empty() {
            return Ok((page, Vec::new()));
        }

        let mut states = self.states.lock().expect("paged results mutex");
        self.evict_expired(&mut states);
        if states.len() >= self.config.max_concurrent_states {
            return Err(LdapError::Busy("too many concurrent paged-results cursors"));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        states.insert(
            id,
            PagedState {
                params: PageParams {
                    base_dn: base_dn.to_string(),
                    scope,
                    filter_canonical: filter_canonical.to_string(),
                    types_only,
                },
                remaining: entries,
                created: Instant::now(),
            },
        );
        Ok((page, encode_cookie(id)))
    }

    /// A continuation page. The cookie must name a still-live cursor whose
    /// stored parameters match exactly; any mismatch (changed search,
    /// expired TTL, garbled cookie) is `UnwillingToPerform` rather than a
    /// silent reset, so a client can't be fooled into resuming a different
    /// search than the one it thinks it's paging through.
    pub fn resume(
        &self,
        cookie: &[u8],
        page_size: usize,
        base_dn: &str,
        scope: Scope,
        filter_canonical: &str,
        types_only: bool,
    ) -> Result<(Vec<Entry>, Vec<u8>), LdapError> {
        let id = decode_cookie(cookie)?;
        let page_size = page_size.max(1);

        let mut states = self.states.lock().expect("paged results mutex");
        self.evict_expired(&mut states);
        let state = states.get_mut(&id).ok_or_else(invalid_cookie)?;
        if !state.params.matches(base_dn, scope, filter_canonical, types_only) {
            states.remove(&id);
            return Err(LdapError::UnwillingToPerform(
                "paged-results cookie parameters changed".into(),
            ));
        }

        let take = state.remaining.len().min(page_size);
        let page: Vec<Entry> = state.remaining.drain(..take).collect();
        if state.remaining.is_empty() {
            states.remove(&id);
            Ok((page, Vec::new()))
        } else {
            Ok((page, encode_cookie(id)))
        }
    }

    /// Abandon a cursor explicitly (spec §4.6: a client may send a final
    /// page request with `size=0` to discard its cursor early).
    pub fn discard(&self, cookie: &[u8]) {
        if let Ok(id) = decode_cookie(cookie) {
            self.states.lock().expect("paged results mutex").remove(&id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    fn entries(n: usize) -> VecDeque<Entry> {
        (0..n).map(|i| Entry::new(format!("uid=u{i},dc=example,dc=com"))).collect()
    }

    #[test]
    fn exhausting_in_one_page_returns_empty_cookie() {
        let mgr = PagedResultsManager::new(PagedResultsConfig::default());
        let (page, cookie) = mgr
            .start(10, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false, entries(3))
            .unwrap();
        assert_eq!(page.len(), 3);
        assert!(cookie.is_empty());
    }

    #[test]
    fn paging_through_multiple_requests() {
        let mgr = PagedResultsManager::new(PagedResultsConfig::default());
        let (page1, cookie1) = mgr
            .start(2, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false, entries(5))
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert!(!cookie1.is_empty());

        let (page2, cookie2) = mgr
            .resume(&cookie1, 2, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false)
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert!(!cookie2.is_empty());

        let (page3, cookie3) = mgr
            .resume(&cookie2, 2, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false)
            .unwrap();
        assert_eq!(page3.len(), 1);
        assert!(cookie3.is_empty());
    }

    #[test]
    fn changed_parameters_invalidate_the_cookie() {
        let mgr = PagedResultsManager::new(PagedResultsConfig::default());
        let (_, cookie) = mgr
            .start(2, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false, entries(5))
            .unwrap();
        let err = mgr
            .resume(&cookie, 2, "dc=example,dc=com", Scope::Subtree, "(objectclass=person)", false)
            .unwrap_err();
        assert!(matches!(err, LdapError::UnwillingToPerform(_)));
    }

    #[test]
    fn garbled_cookie_is_rejected() {
        let mgr = PagedResultsManager::new(PagedResultsConfig::default());
        let err = mgr
            .resume(&[0xff, 0, 1, 2], 2, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false)
            .unwrap_err();
        assert!(matches!(err, LdapError::UnwillingToPerform(_)));
    }

    #[test]
    fn max_concurrent_states_is_enforced() {
        let mgr = PagedResultsManager::new(PagedResultsConfig {
            max_concurrent_states: 1,
            ttl: Duration::from_secs(300),
        });
        mgr.start(1, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false, entries(3))
            .unwrap();
        let err = mgr
            .start(1, "dc=example,dc=com", Scope::Subtree, "(objectclass=*)", false, entries(3))
            .unwrap_err();
        assert!(matches!(err, LdapError::Busy(_)));
    }
}
