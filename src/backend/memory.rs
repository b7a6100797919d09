//! A reference, in-memory [`Backend`] implementation (SPEC_FULL §C):
//! supplemental, not part of the core's contract, so the crate is runnable
//! and testable without an external store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use super::{Backend, BackendError, ChangeEvent, Watch};
use crate::dn;
use crate::entry::{Entry, ModOp, Modification};
use crate::search::Scope;

struct Subscriber {
    id: u64,
    base_norm: String,
    scope: Scope,
    sender: mpsc::Sender<ChangeEvent>,
}

/// A flat, mutex-guarded map of normalized DN to entry, plus a list of
/// persistent-search subscribers. Good enough for tests and small
/// deployments; a production backend would be a real storage engine behind
/// the same trait.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_watch_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Arc<MemoryBackend> {
        Arc::new(MemoryBackend::default())
    }

    /// Seed an entry directly, bypassing ACL/parent checks — used by
    /// startup data loading and by tests.
    pub async fn seed(&self, entry: Entry) {
        let key = dn::normalize(&entry.dn);
        self.entries.write().await.insert(key, entry);
    }

    async fn notify(&self, event: ChangeEvent) {
        let dn_norm = dn::normalize(event.dn());
        let mut subs = self.subscribers.write().await;
        subs.retain(|sub| {
            let in_scope = match sub.scope {
                Scope::Base => dn_norm == sub.base_norm,
                Scope::OneLevel => dn::is_immediate_child(&sub.base_norm, &dn_norm),
                Scope::Subtree => dn::is_in_subtree(&sub.base_norm, &dn_norm),
            };
            if !in_scope {
                return true;
            }
            // Slow consumers drop the event rather than block the backend
            // (spec §5's `drop-newest` policy); a full channel just skips
            // this subscriber for this event.
            sub.sender.try_send(event.clone()).is_ok() || !sub.sender.is_closed()
        });
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_entry(&self, dn: &str) -> Result<Option<Entry>, BackendError> {
        let key = dn::normalize(dn);
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn add_entry(&self, entry: Entry) -> Result<(), BackendError> {
        if !entry.has_object_class() {
            return Err(BackendError::RequiredAttributeMissing("objectClass".into()));
        }
        let key = dn::normalize(&entry.dn);
        if let Some(parent) = dn::parent(&entry.dn) {
            let entries = self.entries.read().await;
            if !entries.contains_key(&parent) {
                return Err(BackendError::ParentNotFound);
            }
        }
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&key) {
                return Err(BackendError::AlreadyExists);
            }
            entries.insert(key, entry.clone());
        }
        self.notify(ChangeEvent::Added(entry)).await;
        Ok(())
    }

    async fn delete_entry(&self, dn: &str) -> Result<(), BackendError> {
        let key = dn::normalize(dn);
        if self.has_children(dn).await? {
            return Err(BackendError::HasChildren);
        }
        let removed = {
            let mut entries = self.entries.write().await;
            entries.remove(&key)
        };
        if removed.is_none() {
            return Err(BackendError::NotFound);
        }
        self.notify(ChangeEvent::Deleted(dn::normalize(dn))).await;
        Ok(())
    }

    async fn has_children(&self, dn: &str) -> Result<bool, BackendError> {
        let key = dn::normalize(dn);
        let entries = self.entries.read().await;
        Ok(entries.keys().any(|k| dn::is_immediate_child(&key, k)))
    }

    async fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
    ) -> Result<(), BackendError> {
        let key = dn::normalize(dn);
        let updated = {
            let mut entries = self.entries.write().await;
            let entry = entries.get_mut(&key).ok_or(BackendError::NotFound)?;
            for m in modifications {
                apply_modification(entry, m)?;
            }
            if !entry.has_object_class() {
                return Err(BackendError::RequiredAttributeMissing("objectClass".into()));
            }
            entry.clone()
        };
        self.notify(ChangeEvent::Modified(updated)).await;
        Ok(())
    }

    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> Result<(), BackendError> {
        let key = dn::normalize(dn);
        let new_parent = match new_superior {
            Some(s) => dn::normalize(s),
            None => dn::parent(dn).unwrap_or_default(),
        };
        let new_dn = if new_parent.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{new_parent}")
        };
        let new_key = dn::normalize(&new_dn);

        if self.has_children(dn).await? {
            return Err(BackendError::HasChildren);
        }

        let renamed = {
            let mut entries = self.entries.write().await;
            if new_superior.is_some() && !entries.contains_key(&new_parent) {
                return Err(BackendError::ParentNotFound);
            }
            if entries.contains_key(&new_key) {
                return Err(BackendError::AlreadyExists);
            }
            let mut entry = entries.remove(&key).ok_or(BackendError::NotFound)?;
            if delete_old_rdn {
                let (old_rdn, _) = dn::split_rdn(dn);
                if let Some((attr, val)) = old_rdn.split_once('=') {
                    if let Some(values) = entry.attr_mut(attr.trim()).iter().position(|v| {
                        v.as_slice() == val.trim().as_bytes()
                    }) {
                        entry.attr_mut(attr.trim()).remove(values);
                    }
                }
            }
            entry.dn = new_dn;
            entries.insert(new_key, entry.clone());
            entry
        };
        self.notify(ChangeEvent::Renamed(renamed)).await;
        Ok(())
    }

    async fn search_by_dn(&self, base_dn: &str, scope: Scope) -> Result<Vec<Entry>, BackendError> {
        let base_norm = dn::normalize(base_dn);
        let entries = self.entries.read().await;
        let mut out: Vec<Entry> = match scope {
            Scope::Base => entries.get(&base_norm).cloned().into_iter().collect(),
            Scope::OneLevel => entries
                .values()
                .filter(|e| dn::is_immediate_child(&base_norm, &e.dn))
                .cloned()
                .collect(),
            Scope::Subtree => entries
                .values()
                .filter(|e| dn::is_in_subtree(&base_norm, &e.dn))
                .cloned()
                .collect(),
        };
        out.sort_by(|a, b| a.dn.cmp(&b.dn));
        Ok(out)
    }

    async fn watch(&self, base_dn: &str, scope: Scope) -> Watch {
        let (tx, rx) = mpsc::channel(256);
        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.push(Subscriber {
            id,
            base_norm: dn::normalize(base_dn),
            scope,
            sender: tx,
        });
        Watch { id, receiver: rx }
    }

    async fn unwatch(&self, id: u64) {
        self.subscribers.write().await.retain(|s| s.id != id);
    }
}

fn apply_modification(entry: &mut Entry, m: &Modification) -> Result<(), BackendError> {
    match m.op {
        ModOp::Add => {
            let existing = entry.attr_mut(&m.attribute);
            for v in &m.values {
                if !existing.contains(v) {
                    existing.push(v.clone());
                }
            }
        }
        ModOp::Delete => {
            if m.values.is_empty() {
                entry.remove_attr(&m.attribute);
            } else {
                let existing = entry.attr_mut(&m.attribute);
                existing.retain(|v| !m.values.contains(v));
            }
        }
        ModOp::Replace => {
            if m.values.is_empty() {
                entry.remove_attr(&m.attribute);
            } else {
                entry.set_attr(&m.attribute, m.values.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn alice() -> Entry {
        Entry::new("uid=alice,ou=users,dc=example,dc=com")
            .with_attr("objectclass", vec![b"person".to_vec()])
            .with_attr("uid", vec![b"alice".to_vec()])
            .with_attr("cn", vec![b"Alice Smith".to_vec()])
    }

    #[tokio::test]
    async fn add_requires_parent_and_object_class() {
        let be = MemoryBackend::new();
        let err = be.add_entry(alice()).await.unwrap_err();
        assert!(matches!(err, BackendError::ParentNotFound));

        be.seed(Entry::new("ou=users,dc=example,dc=com").with_attr(
            "objectclass",
            vec![b"organizationalUnit".to_vec()],
        ))
        .await;
        be.add_entry(alice()).await.unwrap();
        assert!(be
            .add_entry(alice())
            .await
            .is_err_and(|e| matches!(e, BackendError::AlreadyExists)));
    }

    #[tokio::test]
    async fn delete_refuses_non_leaf() {
        let be = MemoryBackend::new();
        be.seed(Entry::new("dc=example,dc=com").with_attr("objectclass", vec![b"domain".to_vec()]))
            .await;
        be.seed(
            Entry::new("ou=users,dc=example,dc=com")
                .with_attr("objectclass", vec![b"organizationalUnit".to_vec()]),
        )
        .await;
        let err = be.delete_entry("dc=example,dc=com").await.unwrap_err();
        assert!(matches!(err, BackendError::HasChildren));
    }

    #[tokio::test]
    async fn modify_add_delete_replace() {
        let be = MemoryBackend::new();
        be.seed(alice()).await;
        let dn = "uid=alice,ou=users,dc=example,dc=com";
        be.modify_entry(
            dn,
            &[Modification {
                op: ModOp::Add,
                attribute: "mail".into(),
                values: vec![b"alice@example.com".to_vec()],
            }],
        )
        .await
        .unwrap();
        let entry = be.get_entry(dn).await.unwrap().unwrap();
        assert_eq!(entry.attr("mail").unwrap(), &vec![b"alice@example.com".to_vec()]);

        be.modify_entry(
            dn,
            &[Modification {
                op: ModOp::Replace,
                attribute: "mail".into(),
                values: vec![],
            }],
        )
        .await
        .unwrap();
        assert!(be.get_entry(dn).await.unwrap().unwrap().attr("mail").is_none());
    }
}
