//! The in-memory representation of a decoded (or to-be-encoded) BER value.
//!
//! `Tlv` is the teacher's `StructureTag`/`PL` pair collapsed into a single
//! struct with an explicit `Value` enum, since the server only ever needs
//! the decoded tree, never the nom `Consumer` machinery the teacher used to
//! build it incrementally.

/// The class bits of a BER identifier octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TagClass {
    Universal,
    Application,
    Context,
    Private,
}

impl TagClass {
    pub(crate) fn from_bits(bits: u8) -> TagClass {
        match bits & 0b1100_0000 {
            0b0000_0000 => TagClass::Universal,
            0b0100_0000 => TagClass::Application,
            0b1000_0000 => TagClass::Context,
            _ => TagClass::Private,
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            TagClass::Universal => 0b0000_0000,
            TagClass::Application => 0b0100_0000,
            TagClass::Context => 0b1000_0000,
            TagClass::Private => 0b1100_0000,
        }
    }
}

/// Universal tag numbers used by LDAP.
pub mod universal {
    pub const BOOLEAN: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const OCTET_STRING: u32 = 4;
    pub const NULL: u32 = 5;
    pub const ENUMERATED: u32 = 10;
    pub const SEQUENCE: u32 = 16;
    pub const SET: u32 = 17;
}

/// A decoded value: either the raw content octets of a primitive, or the
/// list of nested `Tlv`s of a constructed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Primitive(Vec<u8>),
    Constructed(Vec<Tlv>),
}

/// One BER tag-length-value unit: the identifier's class and number, plus
/// its decoded value.
#[derive(Clone, Debug, PartialEq)]
pub struct Tlv {
    pub class: TagClass,
    pub tag: u32,
    pub value: Value,
}

impl Tlv {
    pub fn is_constructed(&self) -> bool {
        matches!(self.value, Value::Constructed(_))
    }

    pub fn as_primitive(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Primitive(b) => Some(b),
            Value::Constructed(_) => None,
        }
    }

    pub fn into_primitive(self) -> Option<Vec<u8>> {
        match self.value {
            Value::Primitive(b) => Some(b),
            Value::Constructed(_) => None,
        }
    }

    pub fn as_constructed(&self) -> Option<&[Tlv]> {
        match &self.value {
            Value::Constructed(v) => Some(v),
            Value::Primitive(_) => None,
        }
    }

    pub fn into_constructed(self) -> Option<Vec<Tlv>> {
        match self.value {
            Value::Constructed(v) => Some(v),
            Value::Primitive(_) => None,
        }
    }

    pub fn matches(&self, class: TagClass, tag: u32) -> bool {
        self.class == class && self.tag == tag
    }
}

/// A convenience builder enum mirroring the handful of ASN.1 shapes the
/// protocol layer constructs; it lowers into a `Tlv` via [`Tag::into_tlv`].
///
/// This plays the role the teacher's `lber::structures::Tag` enum played,
/// minus the universal types LDAP never sends (real, object identifier,
/// bit string, UTC time, ...).
#[derive(Clone, Debug)]
pub enum Tag {
    Boolean(bool),
    Integer(i64),
    Enumerated(i64),
    OctetString(Vec<u8>),
    Null,
    Sequence(Vec<Tag>),
    Set(Vec<Tag>),
    /// An explicitly context-tagged value, constructed form, e.g. the
    /// `[0] SEQUENCE` controls envelope or the `NOT` filter choice.
    ContextConstructed(u32, Vec<Tag>),
    /// An explicitly context-tagged primitive octet string, e.g. a simple
    /// bind password or a `userIdentity` field in PasswordModify.
    ContextPrimitive(u32, Vec<u8>),
    /// A tag already fully decoded/assembled, passed through unchanged.
    Raw(Tlv),
}

impl Tag {
    pub fn into_tlv(self) -> Tlv {
        match self {
            Tag::Boolean(b) => Tlv {
                class: TagClass::Universal,
                tag: universal::BOOLEAN,
                value: Value::Primitive(vec![if b { 0xff } else { 0x00 }]),
            },
            Tag::Integer(n) => Tlv {
                class: TagClass::Universal,
                tag: universal::INTEGER,
                value: Value::Primitive(encode_integer(n)),
            },
            Tag::Enumerated(n) => Tlv {
                class: TagClass::Universal,
                tag: universal::ENUMERATED,
                value: Value::Primitive(encode_integer(n)),
            },
            Tag::OctetString(bytes) => Tlv {
                class: TagClass::Universal,
                tag: universal::OCTET_STRING,
                value: Value::Primitive(bytes),
            },
            Tag::Null => Tlv {
                class: TagClass::Universal,
                tag: universal::NULL,
                value: Value::Primitive(Vec::new()),
            },
            Tag::Sequence(inner) => Tlv {
                class: TagClass::Universal,
                tag: universal::SEQUENCE,
                value: Value::Constructed(inner.into_iter().map(Tag::into_tlv).collect()),
            },
            Tag::Set(inner) => Tlv {
                class: TagClass::Universal,
                tag: universal::SET,
                value: Value::Constructed(inner.into_iter().map(Tag::into_tlv).collect()),
            },
            Tag::ContextConstructed(tag, inner) => Tlv {
                class: TagClass::Context,
                tag,
                value: Value::Constructed(inner.into_iter().map(Tag::into_tlv).collect()),
            },
            Tag::ContextPrimitive(tag, bytes) => Tlv {
                class: TagClass::Context,
                tag,
                value: Value::Primitive(bytes),
            },
            Tag::Raw(tlv) => tlv,
        }
    }
}

/// Minimal-length two's-complement encoding, per spec: the codec always
/// emits the shortest valid form on write.
pub(crate) fn encode_integer(n: i64) -> Vec<u8> {
    if n == 0 {
        return vec![0];
    }
    let mut bytes = n.to_be_bytes().to_vec();
    while bytes.len() > 1 {
        let keep = if n < 0 {
            bytes[0] == 0xff && (bytes[1] & 0x80) != 0
        } else {
            bytes[0] == 0x00 && (bytes[1] & 0x80) == 0
        };
        if keep {
            bytes.remove(0);
        } else {
            break;
        }
    }
    bytes
}
