//! JSON format adapter
//!
//! # Layout
//!
//! - None, bools, ints, finite floats, strings: JSON literals
//! - Lists: JSON arrays
//! - Nodes: objects with a `.type` key followed by their fields,
//!   e.g. `{".type": "tuple", "items": [1, 2]}`
//! - Placeholders: `{".placeholder": 0}`
//! - Ellipsis: `{".literal": "ellipsis"}`
//! - Complex numbers: `{".literal": "complex", "re": 1.0, "im": 2.0}`
//! - Non-finite floats: `{".float": "nan"}`, `"inf"` or `"-inf"`
//!
//! Field names never start with a dot, so the marker keys cannot collide.

use super::nesting::{self, Nesting};
use crate::error::{GraphError, Result};
use crate::kind::Kind;
use crate::raw::{Fields, Node, RawValue, SelfRef};
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Number, Value as Json};
use std::fmt;

pub const TYPE_KEY: &str = ".type";
pub const PLACEHOLDER_KEY: &str = ".placeholder";
pub const LITERAL_KEY: &str = ".literal";
pub const FLOAT_KEY: &str = ".float";

/// Render a raw value as a JSON tree
pub fn to_json(raw: &RawValue) -> Json {
    match raw {
        RawValue::None => Json::Null,
        RawValue::Bool(b) => Json::Bool(*b),
        RawValue::Int(n) => Json::from(*n),
        RawValue::Float(x) => float_to_json(*x),
        RawValue::Str(s) => Json::String(s.clone()),
        RawValue::Ellipsis => marker(LITERAL_KEY, "ellipsis".into()),
        RawValue::Complex { re, im } => {
            let mut map = Map::new();
            map.insert(LITERAL_KEY.to_string(), "complex".into());
            map.insert("re".to_string(), float_to_json(*re));
            map.insert("im".to_string(), float_to_json(*im));
            Json::Object(map)
        }
        RawValue::List(items) => Json::Array(items.iter().map(to_json).collect()),
        RawValue::Node(node) => {
            let mut map = Map::new();
            map.insert(TYPE_KEY.to_string(), node.kind.as_str().into());
            for (name, value) in &node.fields {
                map.insert(name.clone(), to_json(value));
            }
            Json::Object(map)
        }
        RawValue::Placeholder(selfref) => marker(PLACEHOLDER_KEY, selfref.depth.into()),
    }
}

fn marker(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

fn float_to_json(x: f64) -> Json {
    match Number::from_f64(x) {
        Some(n) => Json::Number(n),
        None if x.is_nan() => marker(FLOAT_KEY, "nan".into()),
        None if x > 0.0 => marker(FLOAT_KEY, "inf".into()),
        None => marker(FLOAT_KEY, "-inf".into()),
    }
}

/// Parse a JSON tree back into a raw value
pub fn from_json(json: &Json) -> Result<RawValue> {
    match json {
        Json::Null => Ok(RawValue::None),
        Json::Bool(b) => Ok(RawValue::Bool(*b)),
        Json::Number(n) => number(n),
        Json::String(s) => Ok(RawValue::Str(s.clone())),
        Json::Array(items) => Ok(RawValue::List(
            items.iter().map(from_json).collect::<Result<_>>()?,
        )),
        Json::Object(map) => object(map),
    }
}

fn number(n: &Number) -> Result<RawValue> {
    if let Some(i) = n.as_i64() {
        return Ok(RawValue::Int(i));
    }
    if n.is_u64() {
        return Err(GraphError::Format(format!(
            "integer {} does not fit in 64 signed bits",
            n
        )));
    }
    n.as_f64()
        .map(RawValue::Float)
        .ok_or_else(|| GraphError::Format(format!("unrepresentable number {}", n)))
}

fn object(map: &Map<String, Json>) -> Result<RawValue> {
    if let Some(tag) = map.get(TYPE_KEY) {
        let tag = tag
            .as_str()
            .ok_or_else(|| GraphError::Format(format!("{} must be a string", TYPE_KEY)))?;
        let kind: Kind = tag.parse()?;
        let mut fields = Fields::with_capacity(map.len().saturating_sub(1));
        for (name, value) in map.iter().filter(|(name, _)| name.as_str() != TYPE_KEY) {
            fields.insert(name.clone(), from_json(value)?);
        }
        return Ok(RawValue::Node(Node { kind, fields }));
    }
    if let Some(depth) = map.get(PLACEHOLDER_KEY) {
        let depth = depth
            .as_u64()
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| {
                GraphError::Format(format!("{} must be a small integer", PLACEHOLDER_KEY))
            })?;
        return Ok(RawValue::Placeholder(SelfRef { depth }));
    }
    if let Some(literal) = map.get(LITERAL_KEY) {
        return match literal.as_str() {
            Some("ellipsis") => Ok(RawValue::Ellipsis),
            Some("complex") => Ok(RawValue::Complex {
                re: float_from_json(map.get("re"))?,
                im: float_from_json(map.get("im"))?,
            }),
            _ => Err(GraphError::Format(format!("unknown literal {}", literal))),
        };
    }
    if map.contains_key(FLOAT_KEY) {
        return Ok(RawValue::Float(float_marker(map)?));
    }
    Err(GraphError::Format(format!(
        "object without a {} key",
        TYPE_KEY
    )))
}

fn float_from_json(json: Option<&Json>) -> Result<f64> {
    match json {
        Some(Json::Number(n)) => n
            .as_f64()
            .ok_or_else(|| GraphError::Format(format!("not a float: {}", n))),
        Some(Json::Object(map)) => float_marker(map),
        _ => Err(GraphError::Format("expected a float".to_string())),
    }
}

fn float_marker(map: &Map<String, Json>) -> Result<f64> {
    match map.get(FLOAT_KEY).and_then(Json::as_str) {
        Some("nan") => Ok(f64::NAN),
        Some("inf") => Ok(f64::INFINITY),
        Some("-inf") => Ok(f64::NEG_INFINITY),
        _ => Err(GraphError::Format("malformed float marker".to_string())),
    }
}

pub fn to_string(raw: &RawValue, pretty: bool) -> Result<String> {
    let json = to_json(raw);
    Ok(if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    })
}

pub fn to_vec(raw: &RawValue, pretty: bool) -> Result<Vec<u8>> {
    Ok(to_string(raw, pretty)?.into_bytes())
}

/// Parse JSON text, refusing nesting beyond what `max_depth` allows
pub fn from_str(text: &str, max_depth: usize) -> Result<RawValue> {
    from_slice(text.as_bytes(), max_depth)
}

/// Parse JSON bytes, refusing nesting beyond what `max_depth` allows
///
/// serde_json's own recursion limit is off: it would reject graphs well
/// inside `max_depth`, since every graph level costs two or more JSON levels.
pub fn from_slice(bytes: &[u8], max_depth: usize) -> Result<RawValue> {
    let json = nesting::bounded(max_depth, |budget| {
        let mut de = serde_json::Deserializer::from_slice(bytes);
        de.disable_recursion_limit();
        let json = JsonSeed(budget).deserialize(&mut de)?;
        de.end()?;
        Ok(json)
    })?;
    from_json(&json)
}

/// Builds a JSON tree, spending one level of budget per array or object
struct JsonSeed<'a>(Nesting<'a>);

impl<'de> DeserializeSeed<'de> for JsonSeed<'_> {
    type Value = Json;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Json, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for JsonSeed<'_> {
    type Value = Json;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Json, E> {
        Ok(Json::Null)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> std::result::Result<Json, E> {
        Ok(Json::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> std::result::Result<Json, E> {
        Ok(Json::from(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> std::result::Result<Json, E> {
        Ok(Json::from(n))
    }

    fn visit_f64<E: de::Error>(self, x: f64) -> std::result::Result<Json, E> {
        Number::from_f64(x)
            .map(Json::Number)
            .ok_or_else(|| E::custom(format!("unrepresentable number {}", x)))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> std::result::Result<Json, E> {
        Ok(Json::String(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> std::result::Result<Json, E> {
        Ok(Json::String(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Json, A::Error> {
        let inner = self.0.descend::<A::Error>()?;
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(JsonSeed(inner))? {
            items.push(item);
        }
        Ok(Json::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Json, A::Error> {
        let inner = self.0.descend::<A::Error>()?;
        let mut map = Map::new();
        while let Some(key) = access.next_key::<String>()? {
            let value = access.next_value_seed(JsonSeed(inner))?;
            map.insert(key, value);
        }
        Ok(Json::Object(map))
    }
}
