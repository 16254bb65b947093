use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};

use crate::config::DecoderLimits;
use crate::events::{EventType, SecurityEventCounter};

/// A decoded JSON value tree. Numbers are kept as i64 when integral (the
/// NumericDate case) and f64 otherwise; arbitrary precision is not supported.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Array(Vec<JsonValue>),
	Object(IndexMap<String, JsonValue>),
}

pub type JsonObject = IndexMap<String, JsonValue>;

impl JsonValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			JsonValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_i64(&self) -> Option<i64> {
		match self {
			JsonValue::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[JsonValue]> {
		match self {
			JsonValue::Array(a) => Some(a),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&JsonObject> {
		match self {
			JsonValue::Object(o) => Some(o),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, JsonValue::Null)
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			JsonValue::Null => "null",
			JsonValue::Bool(_) => "boolean",
			JsonValue::Int(_) | JsonValue::Float(_) => "number",
			JsonValue::String(_) => "string",
			JsonValue::Array(_) => "array",
			JsonValue::Object(_) => "object",
		}
	}

	/// Re-emit the value as JSON text. Used to preserve the source form of a
	/// claim alongside its typed representation.
	pub fn to_json_string(&self) -> String {
		serde_json::to_string(self).expect("JSON value tree is always serializable")
	}
}

impl serde::Serialize for JsonValue {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		match self {
			JsonValue::Null => serializer.serialize_unit(),
			JsonValue::Bool(b) => serializer.serialize_bool(*b),
			JsonValue::Int(i) => serializer.serialize_i64(*i),
			JsonValue::Float(f) => serializer.serialize_f64(*f),
			JsonValue::String(s) => serializer.serialize_str(s),
			JsonValue::Array(a) => serializer.collect_seq(a),
			JsonValue::Object(o) => serializer.collect_map(o),
		}
	}
}

impl fmt::Display for JsonValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_json_string())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonError {
	#[error("decoded part of {size} bytes exceeds the {limit} byte ceiling")]
	PayloadTooLarge { size: usize, limit: usize },
	#[error("top-level JSON value must be an object")]
	NotAnObject,
	#[error("{0}")]
	Parse(String),
}

/// Decode `bytes` into an ordered claim map, enforcing the configured
/// ceilings. Duplicate keys take the last value and are counted as
/// [`EventType::DuplicateJsonKey`].
pub fn decode_object(
	bytes: &[u8],
	limits: &DecoderLimits,
	events: &SecurityEventCounter,
) -> Result<JsonObject, JsonError> {
	if bytes.len() > limits.max_payload_size {
		return Err(JsonError::PayloadTooLarge {
			size: bytes.len(),
			limit: limits.max_payload_size,
		});
	}
	let mut de = serde_json::Deserializer::from_slice(bytes);
	let seed = ValueSeed {
		limits,
		events,
		depth: 0,
	};
	let value = seed
		.deserialize(&mut de)
		.map_err(|e| JsonError::Parse(e.to_string()))?;
	de.end().map_err(|e| JsonError::Parse(e.to_string()))?;
	match value {
		JsonValue::Object(map) => Ok(map),
		_ => Err(JsonError::NotAnObject),
	}
}

/// Stateful deserialization seed: carries the limits and the current nesting
/// depth so ceilings are enforced while streaming, before the value tree is
/// ever materialized.
struct ValueSeed<'c> {
	limits: &'c DecoderLimits,
	events: &'c SecurityEventCounter,
	depth: usize,
}

impl<'c> ValueSeed<'c> {
	fn child(&self) -> ValueSeed<'c> {
		ValueSeed {
			limits: self.limits,
			events: self.events,
			depth: self.depth + 1,
		}
	}

	fn check_string<E: de::Error>(&self, s: &str) -> Result<(), E> {
		if s.len() > self.limits.max_string_size {
			return Err(E::custom(format!(
				"string of {} bytes exceeds the {} byte ceiling",
				s.len(),
				self.limits.max_string_size
			)));
		}
		Ok(())
	}

	fn check_depth<E: de::Error>(&self) -> Result<(), E> {
		if self.depth >= self.limits.max_depth {
			return Err(E::custom(format!(
				"nesting exceeds the maximum depth of {}",
				self.limits.max_depth
			)));
		}
		Ok(())
	}
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
	type Value = JsonValue;

	fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
	where
		D: de::Deserializer<'de>,
	{
		deserializer.deserialize_any(self)
	}
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
	type Value = JsonValue;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("a JSON value")
	}

	fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
		Ok(JsonValue::Null)
	}

	fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
		Ok(JsonValue::Bool(v))
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
		Ok(JsonValue::Int(v))
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
		// NumericDate never needs more than i64; larger magnitudes degrade to f64
		match i64::try_from(v) {
			Ok(i) => Ok(JsonValue::Int(i)),
			Err(_) => Ok(JsonValue::Float(v as f64)),
		}
	}

	fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
		Ok(JsonValue::Float(v))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
		self.check_string(v)?;
		Ok(JsonValue::String(v.to_owned()))
	}

	fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
		self.check_string(&v)?;
		Ok(JsonValue::String(v))
	}

	fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
	where
		A: SeqAccess<'de>,
	{
		self.check_depth()?;
		let mut out = Vec::new();
		while let Some(value) = seq.next_element_seed(self.child())? {
			if out.len() >= self.limits.max_array_size {
				return Err(de::Error::custom(format!(
					"array exceeds the maximum of {} elements",
					self.limits.max_array_size
				)));
			}
			out.push(value);
		}
		Ok(JsonValue::Array(out))
	}

	fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
	where
		A: MapAccess<'de>,
	{
		self.check_depth()?;
		let mut out = IndexMap::new();
		while let Some(key) = map.next_key::<String>()? {
			self.check_string(&key)?;
			let value = map.next_value_seed(self.child())?;
			// last value wins; the event is observable for strict deployments
			if out.insert(key, value).is_some() {
				self.events.increment(EventType::DuplicateJsonKey);
			}
		}
		Ok(JsonValue::Object(out))
	}
}

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;
