//! The directory `Entry` record (spec §3).

use std::collections::BTreeMap;

/// Attribute values are opaque octet strings on the wire; the core never
/// interprets them beyond byte/ASCII-fold comparison.
pub type Values = Vec<Vec<u8>>;

/// A directory entry: a DN plus a case-insensitive map from attribute name
/// to an ordered list of values. Attribute names are stored lowercased so
/// lookup is a plain map access; [`Entry::attr`] lowercases the query name
/// to match.
#[derive(Clone, Debug, Default)]
pub struct Entry {
    pub dn: String,
    attrs: BTreeMap<String, Values>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Entry {
        Entry {
            dn: dn.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, values: Vec<Vec<u8>>) -> Entry {
        self.set_attr(name, values);
        self
    }

    pub fn set_attr(&mut self, name: &str, values: Vec<Vec<u8>>) {
        self.attrs.insert(name.to_ascii_lowercase(), values);
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Values> {
        self.attrs.remove(&name.to_ascii_lowercase())
    }

    pub fn attr(&self, name: &str) -> Option<&Values> {
        self.attrs.get(&name.to_ascii_lowercase())
    }

    pub fn attr_mut(&mut self, name: &str) -> &mut Values {
        self.attrs.entry(name.to_ascii_lowercase()).or_default()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Iterate all (lowercased attribute name, values) pairs, in a stable
    /// order (the map is sorted by key).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Values)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(|k| k.as_str())
    }

    /// spec §3 invariant: every entry has at least one `objectClass` value.
    pub fn has_object_class(&self) -> bool {
        self.has_attr("objectclass")
    }
}

/// A modification to apply to an entry (spec §3 "Modification").
#[derive(Clone, Debug)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: String,
    pub values: Vec<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}
