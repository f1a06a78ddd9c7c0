/// Case-insensitive JSON decoder
///
/// The upstream does not guarantee field casing, so the body is parsed into a
/// `serde_json::Value` first and then fed through a deserializer that matches
/// object keys against the target struct's declared field names, ignoring
/// ASCII case and underscores. Nested structs are matched the same way.

use crate::entity::FeedEntity;
use crate::error::DecodeError;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Returns true for bodies that carry no payload at all (absent, empty or whitespace)
pub fn is_blank(body: Option<&str>) -> bool {
    body.map_or(true, |b| b.trim().is_empty())
}

pub struct Decoder;

impl Decoder {
    /// Decode `body` into `T`, matching field names case-insensitively
    pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        Self::decode_value(value)
    }

    pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
        T::deserialize(Folded(value))
    }

    /// Decode a feed entity body. Blank bodies are reported as `DecodeError::Empty`
    pub fn decode_entity<T: FeedEntity>(body: Option<&str>) -> DecodeResult<T> {
        match body {
            Some(text) if !is_blank(body) => {
                Self::decode(text).map_err(|source| DecodeError::Malformed {
                    entity: T::entity_name(),
                    source,
                })
            }
            _ => Err(DecodeError::Empty),
        }
    }
}

/// A JSON value whose object keys are folded onto struct field names on the way in
struct Folded(Value);

impl<'de> IntoDeserializer<'de, serde_json::Error> for Folded {
    type Deserializer = Folded;

    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> Deserializer<'de> for Folded {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visit_object(map, None, visitor),
            Value::Array(items) => visit_array(items, visitor),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(Folded(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visit_object(map, Some(fields), visitor),
            other => Err(de::Error::invalid_type(unexpected(&other), &visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier ignored_any
    }
}

fn visit_object<'de, V: Visitor<'de>>(
    map: Map<String, Value>,
    fields: Option<&'static [&'static str]>,
    visitor: V,
) -> Result<V::Value, serde_json::Error> {
    let entries = map.into_iter().map(move |(key, value)| {
        let key = match fields {
            Some(fields) => canonical_key(fields, key),
            None => key,
        };
        (key, Folded(value))
    });
    let mut deserializer: MapDeserializer<'de, _, serde_json::Error> = MapDeserializer::new(entries);
    let value = visitor.visit_map(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn visit_array<'de, V: Visitor<'de>>(
    items: Vec<Value>,
    visitor: V,
) -> Result<V::Value, serde_json::Error> {
    let mut deserializer: SeqDeserializer<_, serde_json::Error> =
        SeqDeserializer::new(items.into_iter().map(Folded));
    let value = visitor.visit_seq(&mut deserializer)?;
    deserializer.end()?;
    Ok(value)
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => Unexpected::Unsigned(u),
            (None, Some(i)) => Unexpected::Signed(i),
            _ => Unexpected::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn canonical_key(fields: &'static [&'static str], key: String) -> String {
    if fields.contains(&key.as_str()) {
        return key;
    }
    match fields.iter().find(|field| fold_eq(field, &key)) {
        Some(field) => (*field).to_string(),
        None => key,
    }
}

/// ASCII case-insensitive comparison that also skips `_` and `-`
fn fold_eq(a: &str, b: &str) -> bool {
    let mut a = a.bytes().filter(|c| *c != b'_' && *c != b'-');
    let mut b = b.bytes().filter(|c| *c != b'_' && *c != b'-');
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x.eq_ignore_ascii_case(&y) => continue,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Outer {
        fixture_id: i64,
        name: Option<String>,
        inner: Option<Inner>,
        #[serde(default)]
        items: Vec<Inner>,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct Inner {
        start_price: String,
    }

    fn expected() -> Outer {
        Outer {
            fixture_id: 42,
            name: Some("Final".to_string()),
            inner: Some(Inner { start_price: "1.5".to_string() }),
            items: vec![Inner { start_price: "2.0".to_string() }],
        }
    }

    #[test]
    fn test_decode_casing_variants() {
        let bodies = [
            r#"{"fixture_id":42,"name":"Final","inner":{"start_price":"1.5"},"items":[{"start_price":"2.0"}]}"#,
            r#"{"fixtureid":42,"name":"Final","inner":{"startprice":"1.5"},"items":[{"startprice":"2.0"}]}"#,
            r#"{"FIXTUREID":42,"NAME":"Final","INNER":{"STARTPRICE":"1.5"},"ITEMS":[{"STARTPRICE":"2.0"}]}"#,
            r#"{"FixtureId":42,"Name":"Final","Inner":{"StartPrice":"1.5"},"Items":[{"StartPrice":"2.0"}]}"#,
            r#"{"fixtureId":42,"nAmE":"Final","iNNer":{"Start_PRICE":"1.5"},"items":[{"startPrice":"2.0"}]}"#,
        ];

        for body in bodies {
            let decoded: Outer = Decoder::decode(body).unwrap();
            assert_eq!(decoded, expected(), "body: {}", body);
        }
    }

    #[test]
    fn test_decode_missing_optional_fields() {
        let decoded: Outer = Decoder::decode(r#"{"FixtureId": 7}"#).unwrap();
        assert_eq!(decoded.fixture_id, 7);
        assert_eq!(decoded.name, None);
        assert_eq!(decoded.inner, None);
        assert!(decoded.items.is_empty());
    }

    #[test]
    fn test_decode_null_option() {
        let decoded: Outer = Decoder::decode(r#"{"FixtureId": 7, "Inner": null}"#).unwrap();
        assert_eq!(decoded.inner, None);
    }

    #[test]
    fn test_decode_malformed_syntax() {
        assert!(Decoder::decode::<Outer>(r#"{"FixtureId": "#).is_err());
    }

    #[test]
    fn test_decode_shape_mismatch() {
        // object where an array is expected
        let result = Decoder::decode::<Outer>(r#"{"FixtureId": 1, "Items": {"StartPrice": "1"}}"#);
        assert!(result.is_err());

        let result = Decoder::decode::<Vec<Inner>>(r#"{"StartPrice": "1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_struct_from_non_object() {
        for body in ["[]", r#"[[{"FixtureId":1}]]"#, "42", r#""text""#, "true"] {
            let err = Decoder::decode::<Outer>(body).unwrap_err();
            assert!(err.to_string().contains("invalid type"), "body: {}", body);
        }

        let err = Decoder::decode_entity::<crate::entities::MarketUpdate>(Some("[]")).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { entity: "MarketUpdate", .. }));
    }

    #[test]
    fn test_decode_untyped_value_keeps_keys() {
        let value: Value = Decoder::decode(r#"{"Header": {"Type": 3}}"#).unwrap();
        assert_eq!(value["Header"]["Type"], 3);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some("")));
        assert!(is_blank(Some("  \n\t ")));
        assert!(!is_blank(Some("{}")));
    }

    #[test]
    fn test_fold_eq() {
        assert!(fold_eq("fixture_id", "FixtureId"));
        assert!(fold_eq("fixture_id", "FIXTURE-ID"));
        assert!(!fold_eq("fixture_id", "fixture"));
        assert!(!fold_eq("id", "ids"));
    }
}
