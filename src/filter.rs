//! Search filters (spec §3 "Filter", §4.5 "Filter evaluation").
//!
//! The teacher's `filter.rs` parsed the RFC 4515 *string* representation of
//! a filter for client-side use (`nom` combinators over `(uid=alice)`
//! syntax). A server never sees that text form — filters arrive BER-encoded
//! as part of a SearchRequest — so this module instead decodes the filter
//! CHOICE directly from a [`lber::Tlv`] and evaluates it against an
//! [`Entry`].

use lber::tag::{TagClass, Tlv};

use crate::entry::Entry;

const AND: u32 = 0;
const OR: u32 = 1;
const NOT: u32 = 2;
const EQUALITY: u32 = 3;
const SUBSTRINGS: u32 = 4;
const GREATER_OR_EQUAL: u32 = 5;
const LESS_OR_EQUAL: u32 = 6;
const PRESENT: u32 = 7;
const APPROX_MATCH: u32 = 8;

const SUB_INITIAL: u32 = 0;
const SUB_ANY: u32 = 1;
const SUB_FINAL: u32 = 2;

/// A recursive filter tree (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(String, Vec<u8>),
    GreaterOrEqual(String, Vec<u8>),
    LessOrEqual(String, Vec<u8>),
    ApproxMatch(String, Vec<u8>),
    Present(String),
    Substrings {
        attribute: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        finale: Option<Vec<u8>>,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("malformed search filter")]
pub struct FilterDecodeError;

/// Decode a filter CHOICE from its context-tagged `Tlv`.
pub fn decode(tlv: &Tlv) -> Result<Filter, FilterDecodeError> {
    if tlv.class != TagClass::Context {
        return Err(FilterDecodeError);
    }
    match tlv.tag {
        AND => Ok(Filter::And(decode_seq(tlv)?)),
        OR => Ok(Filter::Or(decode_seq(tlv)?)),
        NOT => {
            let inner = tlv
                .as_constructed()
                .and_then(|c| c.first())
                .ok_or(FilterDecodeError)?;
            Ok(Filter::Not(Box::new(decode(inner)?)))
        }
        EQUALITY => decode_av(tlv).map(|(a, v)| Filter::Equality(a, v)),
        GREATER_OR_EQUAL => decode_av(tlv).map(|(a, v)| Filter::GreaterOrEqual(a, v)),
        LESS_OR_EQUAL => decode_av(tlv).map(|(a, v)| Filter::LessOrEqual(a, v)),
        APPROX_MATCH => decode_av(tlv).map(|(a, v)| Filter::ApproxMatch(a, v)),
        PRESENT => {
            let bytes = tlv.as_primitive().ok_or(FilterDecodeError)?;
            Ok(Filter::Present(
                String::from_utf8_lossy(bytes).into_owned(),
            ))
        }
        SUBSTRINGS => decode_substrings(tlv),
        _ => Err(FilterDecodeError),
    }
}

fn decode_seq(tlv: &Tlv) -> Result<Vec<Filter>, FilterDecodeError> {
    let items = tlv.as_constructed().ok_or(FilterDecodeError)?;
    items.iter().map(decode).collect()
}

fn decode_av(tlv: &Tlv) -> Result<(String, Vec<u8>), FilterDecodeError> {
    let items = tlv.as_constructed().ok_or(FilterDecodeError)?;
    let attr = items
        .first()
        .and_then(|t| t.as_primitive())
        .ok_or(FilterDecodeError)?;
    let val = items
        .get(1)
        .and_then(|t| t.as_primitive())
        .ok_or(FilterDecodeError)?;
    Ok((String::from_utf8_lossy(attr).into_owned(), val.to_vec()))
}

fn decode_substrings(tlv: &Tlv) -> Result<Filter, FilterDecodeError> {
    let items = tlv.as_constructed().ok_or(FilterDecodeError)?;
    let attribute = items
        .first()
        .and_then(|t| t.as_primitive())
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .ok_or(FilterDecodeError)?;
    let subs = items
        .get(1)
        .and_then(|t| t.as_constructed())
        .ok_or(FilterDecodeError)?;
    let mut initial = None;
    let mut any = Vec::new();
    let mut finale = None;
    for s in subs {
        let bytes = s.as_primitive().ok_or(FilterDecodeError)?.to_vec();
        match s.tag {
            SUB_INITIAL => initial = Some(bytes),
            SUB_ANY => any.push(bytes),
            SUB_FINAL => finale = Some(bytes),
            _ => return Err(FilterDecodeError),
        }
    }
    Ok(Filter::Substrings {
        attribute,
        initial,
        any,
        finale,
    })
}

fn ascii_fold(b: &[u8]) -> Vec<u8> {
    b.iter().map(|c| c.to_ascii_lowercase()).collect()
}

fn contains_fold(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

impl Filter {
    /// Evaluate this filter against `entry`. Pure: equal filter trees over
    /// equal entries yield equal booleans (spec §8). A missing attribute on
    /// an atom evaluates to `false`, never an error (spec §4.5).
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(subs) => subs.iter().all(|f| f.matches(entry)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => entry.has_attr(attr),
            Filter::Equality(attr, val) => entry
                .attr(attr)
                .map(|values| values.iter().any(|v| ascii_fold(v) == ascii_fold(val)))
                .unwrap_or(false),
            // Approximate match falls back to equality (spec §4.5: "unless
            // a matching rule is configured", which this core never does).
            Filter::ApproxMatch(attr, val) => {
                Filter::Equality(attr.clone(), val.clone()).matches(entry)
            }
            Filter::GreaterOrEqual(attr, val) => entry
                .attr(attr)
                .map(|values| values.iter().any(|v| ascii_fold(v) >= ascii_fold(val)))
                .unwrap_or(false),
            Filter::LessOrEqual(attr, val) => entry
                .attr(attr)
                .map(|values| values.iter().any(|v| ascii_fold(v) <= ascii_fold(val)))
                .unwrap_or(false),
            Filter::Substrings {
                attribute,
                initial,
                any,
                finale,
            } => entry
                .attr(attribute)
                .map(|values| values.iter().any(|v| substrings_match(v, initial, any, finale)))
                .unwrap_or(false),
        }
    }

    /// Canonical string form, used by the paged-results cursor to verify
    /// that a subsequent page request still names the same filter (spec
    /// §4.6). Deliberately simple and deterministic, not RFC 4515 syntax.
    pub fn canonical(&self) -> String {
        match self {
            Filter::And(subs) => format!("(&{})", subs.iter().map(Filter::canonical).collect::<String>()),
            Filter::Or(subs) => format!("(|{})", subs.iter().map(Filter::canonical).collect::<String>()),
            Filter::Not(inner) => format!("(!{})", inner.canonical()),
            Filter::Present(attr) => format!("({}=*)", attr.to_ascii_lowercase()),
            Filter::Equality(attr, val) => {
                format!("({}={})", attr.to_ascii_lowercase(), hex(val))
            }
            Filter::ApproxMatch(attr, val) => {
                format!("({}~={})", attr.to_ascii_lowercase(), hex(val))
            }
            Filter::GreaterOrEqual(attr, val) => {
                format!("({}>={})", attr.to_ascii_lowercase(), hex(val))
            }
            Filter::LessOrEqual(attr, val) => {
                format!("({}<={})", attr.to_ascii_lowercase(), hex(val))
            }
            Filter::Substrings {
                attribute,
                initial,
                any,
                finale,
            } => format!(
                "({}={}*{}*{})",
                attribute.to_ascii_lowercase(),
                initial.as_deref().map(hex).unwrap_or_default(),
                any.iter().map(hex).collect::<Vec<_>>().join("*"),
                finale.as_deref().map(hex).unwrap_or_default(),
            ),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn substrings_match(
    value: &[u8],
    initial: &Option<Vec<u8>>,
    any: &[Vec<u8>],
    finale: &Option<Vec<u8>>,
) -> bool {
    let value = ascii_fold(value);
    let mut cursor = 0usize;

    if let Some(initial) = initial {
        let initial = ascii_fold(initial);
        if !value[cursor..].starts_with(initial.as_slice()) {
            return false;
        }
        cursor += initial.len();
    }

    for fragment in any {
        let fragment = ascii_fold(fragment);
        match contains_fold(&value[cursor..], &fragment) {
            Some(offset) => cursor += offset + fragment.len(),
            None => return false,
        }
    }

    if let Some(finale) = finale {
        let finale = ascii_fold(finale);
        if value.len() < cursor + finale.len() || value[value.len() - finale.len()..] != finale[..]
        {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry() -> Entry {
        Entry::new("uid=alice,ou=users,dc=example,dc=com")
            .with_attr("objectclass", vec![b"person".to_vec()])
            .with_attr("cn", vec![b"Alice Smith".to_vec()])
    }

    #[test]
    fn present_and_equality_are_case_insensitive() {
        assert!(Filter::Present("objectClass".into()).matches(&entry()));
        assert!(Filter::Equality("CN".into(), b"alice smith".to_vec()).matches(&entry()));
        assert!(!Filter::Present("mail".into()).matches(&entry()));
    }

    #[test]
    fn missing_attribute_is_false_not_error() {
        assert!(!Filter::Equality("mail".into(), b"x".to_vec()).matches(&entry()));
    }

    #[test]
    fn substrings_initial_any_final() {
        let f = Filter::Substrings {
            attribute: "cn".into(),
            initial: Some(b"Ali".to_vec()),
            any: vec![b"e S".to_vec()],
            finale: Some(b"ith".to_vec()),
        };
        assert!(f.matches(&entry()));
    }

    #[test]
    fn and_or_not_compose() {
        let f = Filter::And(vec![
            Filter::Present("cn".into()),
            Filter::Not(Box::new(Filter::Present("mail".into()))),
        ]);
        assert!(f.matches(&entry()));
    }

    #[test]
    fn purity_equal_trees_equal_entries_equal_result() {
        let f1 = Filter::Equality("cn".into(), b"Alice Smith".to_vec());
        let f2 = Filter::Equality("cn".into(), b"Alice Smith".to_vec());
        assert_eq!(f1.matches(&entry()), f2.matches(&entry()));
    }
}
