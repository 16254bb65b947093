use chrono::{DateTime, Utc};

use crate::json::{JsonObject, JsonValue};

/// A typed claim, carrying the original JSON text alongside the typed value
/// so downstream code can re-emit or hash the source form.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
	/// Claim key not present in the payload, or explicit JSON null.
	Absent,
	String {
		value: String,
		original: String,
	},
	StringList {
		values: Vec<String>,
		original: String,
	},
	DateTime {
		value: DateTime<Utc>,
		original: String,
	},
	Number {
		value: ClaimNumber,
		original: String,
	},
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClaimNumber {
	Int(i64),
	Float(f64),
}

impl ClaimValue {
	pub fn is_absent(&self) -> bool {
		matches!(self, ClaimValue::Absent)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			ClaimValue::String { value, .. } => Some(value),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&[String]> {
		match self {
			ClaimValue::StringList { values, .. } => Some(values),
			_ => None,
		}
	}

	pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
		match self {
			ClaimValue::DateTime { value, .. } => Some(*value),
			_ => None,
		}
	}

	pub fn original(&self) -> Option<&str> {
		match self {
			ClaimValue::Absent => None,
			ClaimValue::String { original, .. }
			| ClaimValue::StringList { original, .. }
			| ClaimValue::DateTime { original, .. }
			| ClaimValue::Number { original, .. } => Some(original),
		}
	}

	/// Best-effort typing for claims no dedicated mapper covers: strings,
	/// string arrays, and numbers come out typed, anything else keeps only
	/// its source form as a string claim.
	pub fn of(value: &JsonValue) -> ClaimValue {
		let original = value.to_json_string();
		match value {
			JsonValue::Null => ClaimValue::Absent,
			JsonValue::String(s) => ClaimValue::String {
				value: s.clone(),
				original,
			},
			JsonValue::Int(i) => ClaimValue::Number {
				value: ClaimNumber::Int(*i),
				original,
			},
			JsonValue::Float(f) => ClaimValue::Number {
				value: ClaimNumber::Float(*f),
				original,
			},
			JsonValue::Array(items) if items.iter().all(|i| i.as_str().is_some()) => {
				ClaimValue::StringList {
					values: items
						.iter()
						.filter_map(|i| i.as_str().map(str::to_owned))
						.collect(),
					original,
				}
			},
			other => ClaimValue::String {
				value: other.to_json_string(),
				original,
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("claim {claim:?} has JSON type {found}, expected {expected}")]
pub struct ClaimShapeError {
	pub claim: String,
	pub expected: &'static str,
	pub found: &'static str,
}

/// Converts the raw JSON value at a named claim into a [`ClaimValue`] of a
/// declared semantic type. Missing input is never an error; a wrong JSON
/// shape always is.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimMapper {
	/// string -> string
	Identity,
	/// array of strings -> list; a lone string wraps to a singleton
	Collection,
	/// single delimited string -> list (the OAuth `scope` form)
	StringSplitter { delimiter: char },
	/// NumericDate (seconds since epoch) -> instant; strings are rejected
	DateTime,
	/// Keycloak `realm_access.roles`
	KeycloakRoles,
	/// Keycloak top-level `groups`
	KeycloakGroups,
}

impl ClaimMapper {
	pub fn scope_splitter() -> ClaimMapper {
		ClaimMapper::StringSplitter { delimiter: ' ' }
	}

	pub fn map(&self, payload: &JsonObject, claim: &str) -> Result<ClaimValue, ClaimShapeError> {
		match self {
			ClaimMapper::KeycloakRoles => return map_keycloak_roles(payload),
			ClaimMapper::KeycloakGroups => return map_collection_at(payload, "groups"),
			_ => {},
		}
		let value = match payload.get(claim) {
			None => return Ok(ClaimValue::Absent),
			Some(v) if v.is_null() => return Ok(ClaimValue::Absent),
			Some(v) => v,
		};
		let shape_error = |expected: &'static str| ClaimShapeError {
			claim: claim.to_owned(),
			expected,
			found: value.type_name(),
		};
		match self {
			ClaimMapper::Identity => match value {
				JsonValue::String(s) => Ok(ClaimValue::String {
					value: s.clone(),
					original: value.to_json_string(),
				}),
				_ => Err(shape_error("string")),
			},
			ClaimMapper::Collection => collect_strings(value).map_err(|found| ClaimShapeError {
				claim: claim.to_owned(),
				expected: "array of strings",
				found,
			}),
			ClaimMapper::StringSplitter { delimiter } => match value {
				JsonValue::String(s) => Ok(ClaimValue::StringList {
					values: s
						.split(*delimiter)
						.filter(|part| !part.is_empty())
						.map(str::to_owned)
						.collect(),
					original: value.to_json_string(),
				}),
				_ => Err(shape_error("string")),
			},
			ClaimMapper::DateTime => {
				let seconds = match value {
					JsonValue::Int(i) => *i,
					// RFC 7519 allows fractional NumericDate; truncate
					JsonValue::Float(f) if f.is_finite() => *f as i64,
					_ => return Err(shape_error("NumericDate")),
				};
				match DateTime::from_timestamp(seconds, 0) {
					Some(instant) => Ok(ClaimValue::DateTime {
						value: instant,
						original: value.to_json_string(),
					}),
					None => Err(shape_error("NumericDate")),
				}
			},
			ClaimMapper::KeycloakRoles | ClaimMapper::KeycloakGroups => {
				unreachable!("handled before value lookup")
			},
		}
	}
}

fn collect_strings(value: &JsonValue) -> Result<ClaimValue, &'static str> {
	match value {
		JsonValue::Array(items) => {
			let mut values = Vec::with_capacity(items.len());
			for item in items {
				match item.as_str() {
					Some(s) => values.push(s.to_owned()),
					None => return Err(item.type_name()),
				}
			}
			Ok(ClaimValue::StringList {
				values,
				original: value.to_json_string(),
			})
		},
		// a lone string is a singleton collection
		JsonValue::String(s) => Ok(ClaimValue::StringList {
			values: vec![s.clone()],
			original: value.to_json_string(),
		}),
		other => Err(other.type_name()),
	}
}

fn map_collection_at(payload: &JsonObject, claim: &str) -> Result<ClaimValue, ClaimShapeError> {
	let value = match payload.get(claim) {
		None => return Ok(ClaimValue::Absent),
		Some(v) if v.is_null() => return Ok(ClaimValue::Absent),
		Some(v) => v,
	};
	match value {
		JsonValue::Array(_) => collect_strings(value).map_err(|found| ClaimShapeError {
			claim: claim.to_owned(),
			expected: "array of strings",
			found,
		}),
		other => Err(ClaimShapeError {
			claim: claim.to_owned(),
			expected: "array",
			found: other.type_name(),
		}),
	}
}

fn map_keycloak_roles(payload: &JsonObject) -> Result<ClaimValue, ClaimShapeError> {
	let realm_access = match payload.get("realm_access") {
		None => return Ok(ClaimValue::Absent),
		Some(v) if v.is_null() => return Ok(ClaimValue::Absent),
		Some(v) => v,
	};
	let object = realm_access.as_object().ok_or(ClaimShapeError {
		claim: "realm_access".to_owned(),
		expected: "object",
		found: realm_access.type_name(),
	})?;
	match object.get("roles") {
		None => Ok(ClaimValue::Absent),
		Some(v) if v.is_null() => Ok(ClaimValue::Absent),
		Some(roles @ JsonValue::Array(_)) => {
			collect_strings(roles).map_err(|found| ClaimShapeError {
				claim: "realm_access.roles".to_owned(),
				expected: "array of strings",
				found,
			})
		},
		Some(other) => Err(ClaimShapeError {
			claim: "realm_access.roles".to_owned(),
			expected: "array",
			found: other.type_name(),
		}),
	}
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
