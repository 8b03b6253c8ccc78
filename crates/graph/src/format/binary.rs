//! Binary format adapter
//!
//! The raw shape encoded with bincode. Compact and fast, not
//! self-describing: both ends must agree on this crate's `RawValue` layout.
//!
//! Encoding goes through the derived `Serialize`. Decoding walks the same
//! layout by hand so every list and node spends nesting budget; the derived
//! `Deserialize` would recurse as deep as the input asks.

use super::nesting::{self, Nesting};
use crate::error::Result;
use crate::kind::Kind;
use crate::raw::{Fields, Node, RawValue, SelfRef};
use bincode::Options;
use serde::de::{self, DeserializeSeed, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use std::fmt;

/// Serialize to binary format (bincode)
pub fn to_bytes(raw: &RawValue) -> Result<Vec<u8>> {
    Ok(bincode::serialize(raw)?)
}

/// Deserialize from binary format (bincode), refusing nesting beyond what
/// `max_depth` allows
pub fn from_bytes(bytes: &[u8], max_depth: usize) -> Result<RawValue> {
    nesting::bounded(max_depth, |budget| {
        // Same settings as `bincode::serialize`
        let options = bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        Ok(options.deserialize_seed(RawSeed(budget), bytes)?)
    })
}

const VARIANTS: &[&str] = &[
    "None",
    "Ellipsis",
    "Bool",
    "Int",
    "Float",
    "Complex",
    "Str",
    "List",
    "Node",
    "Placeholder",
];

/// `RawValue` variant, in declaration order
enum Tag {
    None,
    Ellipsis,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    List,
    Node,
    Placeholder,
}

impl Tag {
    const ALL: [Tag; 10] = [
        Tag::None,
        Tag::Ellipsis,
        Tag::Bool,
        Tag::Int,
        Tag::Float,
        Tag::Complex,
        Tag::Str,
        Tag::List,
        Tag::Node,
        Tag::Placeholder,
    ];
}

impl<'de> de::Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Tag, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_identifier(TagVisitor)
    }
}

struct TagVisitor;

impl<'de> Visitor<'de> for TagVisitor {
    type Value = Tag;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a raw value variant")
    }

    fn visit_u64<E: de::Error>(self, index: u64) -> std::result::Result<Tag, E> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Tag::ALL.into_iter().nth(i))
            .ok_or_else(|| {
                E::invalid_value(de::Unexpected::Unsigned(index), &"variant index 0 <= i < 10")
            })
    }

    fn visit_str<E: de::Error>(self, name: &str) -> std::result::Result<Tag, E> {
        VARIANTS
            .iter()
            .position(|v| *v == name)
            .and_then(|i| Tag::ALL.into_iter().nth(i))
            .ok_or_else(|| E::unknown_variant(name, VARIANTS))
    }
}

/// One raw value
struct RawSeed<'a>(Nesting<'a>);

impl<'de> DeserializeSeed<'de> for RawSeed<'_> {
    type Value = RawValue;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<RawValue, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_enum("RawValue", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for RawSeed<'_> {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a raw value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> std::result::Result<RawValue, A::Error> {
        let (tag, variant) = data.variant::<Tag>()?;
        match tag {
            Tag::None => variant.unit_variant().map(|()| RawValue::None),
            Tag::Ellipsis => variant.unit_variant().map(|()| RawValue::Ellipsis),
            Tag::Bool => variant.newtype_variant().map(RawValue::Bool),
            Tag::Int => variant.newtype_variant().map(RawValue::Int),
            Tag::Float => variant.newtype_variant().map(RawValue::Float),
            Tag::Complex => variant.struct_variant(&["re", "im"], ComplexVisitor),
            Tag::Str => variant.newtype_variant().map(RawValue::Str),
            Tag::List => variant
                .newtype_variant_seed(ListSeed(self.0.descend::<A::Error>()?))
                .map(RawValue::List),
            Tag::Node => variant
                .newtype_variant_seed(NodeSeed(self.0.descend::<A::Error>()?))
                .map(RawValue::Node),
            Tag::Placeholder => variant
                .newtype_variant::<SelfRef>()
                .map(RawValue::Placeholder),
        }
    }
}

struct ComplexVisitor;

impl<'de> Visitor<'de> for ComplexVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a complex number")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<RawValue, A::Error> {
        let re = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let im = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(RawValue::Complex { re, im })
    }
}

/// Items of a list, one budget level below the list itself
struct ListSeed<'a>(Nesting<'a>);

impl<'de> DeserializeSeed<'de> for ListSeed<'_> {
    type Value = Vec<RawValue>;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Vec<RawValue>, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed<'_> {
    type Value = Vec<RawValue>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of raw values")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Vec<RawValue>, A::Error>
    where
        A: SeqAccess<'de>,
    {
        // Length prefixes are untrusted
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(RawSeed(self.0))? {
            items.push(item);
        }
        Ok(items)
    }
}

/// A node's kind and fields
struct NodeSeed<'a>(Nesting<'a>);

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = Node;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Node, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_struct("Node", &["kind", "fields"], self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a node")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Node, A::Error> {
        let kind: Kind = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let fields = seq
            .next_element_seed(FieldsSeed(self.0))?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok(Node { kind, fields })
    }
}

struct FieldsSeed<'a>(Nesting<'a>);

impl<'de> DeserializeSeed<'de> for FieldsSeed<'_> {
    type Value = Fields;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Fields, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for FieldsSeed<'_> {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("node fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Fields, A::Error> {
        let mut fields = Fields::with_capacity(access.size_hint().unwrap_or(0).min(64));
        while let Some(name) = access.next_key::<String>()? {
            let value = access.next_value_seed(RawSeed(self.0))?;
            fields.insert(name, value);
        }
        Ok(fields)
    }
}
