use assert_matches::assert_matches;
use chrono::DateTime;

use super::*;
use crate::config::DecoderLimits;
use crate::events::SecurityEventCounter;
use crate::json::decode_object;

fn payload(json: &str) -> JsonObject {
	decode_object(
		json.as_bytes(),
		&DecoderLimits::default(),
		&SecurityEventCounter::new(),
	)
	.unwrap()
}

#[test]
fn identity_maps_strings_and_keeps_original() {
	let p = payload(r#"{"sub":"user-1"}"#);
	let v = ClaimMapper::Identity.map(&p, "sub").unwrap();
	assert_eq!(v.as_str(), Some("user-1"));
	assert_eq!(v.original(), Some(r#""user-1""#));
}

#[test]
fn missing_and_null_claims_are_absent_not_errors() {
	let p = payload(r#"{"explicit":null}"#);
	for mapper in [
		ClaimMapper::Identity,
		ClaimMapper::Collection,
		ClaimMapper::scope_splitter(),
		ClaimMapper::DateTime,
	] {
		assert!(mapper.map(&p, "missing").unwrap().is_absent());
		assert!(mapper.map(&p, "explicit").unwrap().is_absent());
	}
	assert!(ClaimMapper::KeycloakRoles.map(&p, "roles").unwrap().is_absent());
	assert!(ClaimMapper::KeycloakGroups.map(&p, "groups").unwrap().is_absent());
}

#[test]
fn identity_rejects_non_strings() {
	let p = payload(r#"{"sub":42}"#);
	let err = ClaimMapper::Identity.map(&p, "sub").unwrap_err();
	assert_eq!(err.expected, "string");
	assert_eq!(err.found, "number");
}

#[test]
fn collection_maps_arrays_and_wraps_lone_strings() {
	let p = payload(r#"{"aud":["a","b"],"single":"only"}"#);
	let v = ClaimMapper::Collection.map(&p, "aud").unwrap();
	assert_eq!(v.as_list(), Some(&["a".to_string(), "b".to_string()][..]));
	assert_eq!(v.original(), Some(r#"["a","b"]"#));
	let v = ClaimMapper::Collection.map(&p, "single").unwrap();
	assert_eq!(v.as_list(), Some(&["only".to_string()][..]));
}

#[test]
fn collection_rejects_mixed_arrays() {
	let p = payload(r#"{"aud":["a",1]}"#);
	let err = ClaimMapper::Collection.map(&p, "aud").unwrap_err();
	assert_eq!(err.found, "number");
}

#[test]
fn scope_splitter_splits_on_spaces() {
	let p = payload(r#"{"scope":"read  write openid"}"#);
	let v = ClaimMapper::scope_splitter().map(&p, "scope").unwrap();
	// repeated delimiters do not produce empty scopes
	assert_eq!(
		v.as_list(),
		Some(&["read".to_string(), "write".to_string(), "openid".to_string()][..])
	);
	assert_eq!(v.original(), Some(r#""read  write openid""#));
}

#[test]
fn scope_splitter_rejects_arrays() {
	let p = payload(r#"{"scope":["read"]}"#);
	assert!(ClaimMapper::scope_splitter().map(&p, "scope").is_err());
}

#[test]
fn date_time_maps_numeric_date() {
	let p = payload(r#"{"exp":1700000000,"frac":1700000000.75}"#);
	let v = ClaimMapper::DateTime.map(&p, "exp").unwrap();
	assert_eq!(
		v.as_date_time(),
		Some(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
	);
	assert_eq!(v.original(), Some("1700000000"));
	// fractional NumericDate truncates
	let v = ClaimMapper::DateTime.map(&p, "frac").unwrap();
	assert_eq!(
		v.as_date_time(),
		Some(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
	);
}

#[test]
fn date_time_rejects_strings_per_rfc() {
	let p = payload(r#"{"exp":"1700000000"}"#);
	let err = ClaimMapper::DateTime.map(&p, "exp").unwrap_err();
	assert_eq!(err.expected, "NumericDate");
	assert_eq!(err.found, "string");
}

#[test]
fn keycloak_roles_extracts_nested_array() {
	let p = payload(r#"{"realm_access":{"roles":["admin","user"],"other":1}}"#);
	let v = ClaimMapper::KeycloakRoles.map(&p, "roles").unwrap();
	assert_eq!(
		v.as_list(),
		Some(&["admin".to_string(), "user".to_string()][..])
	);
}

#[test]
fn keycloak_roles_tolerates_missing_roles_member() {
	let p = payload(r#"{"realm_access":{}}"#);
	assert!(ClaimMapper::KeycloakRoles.map(&p, "roles").unwrap().is_absent());
}

#[test]
fn keycloak_roles_rejects_wrong_shapes() {
	let p = payload(r#"{"realm_access":"nope"}"#);
	let err = ClaimMapper::KeycloakRoles.map(&p, "roles").unwrap_err();
	assert_eq!(err.claim, "realm_access");
	let p = payload(r#"{"realm_access":{"roles":"admin"}}"#);
	let err = ClaimMapper::KeycloakRoles.map(&p, "roles").unwrap_err();
	assert_eq!(err.claim, "realm_access.roles");
}

#[test]
fn keycloak_groups_extracts_top_level_array() {
	let p = payload(r#"{"groups":["/staff","/ops"]}"#);
	let v = ClaimMapper::KeycloakGroups.map(&p, "groups").unwrap();
	assert_eq!(
		v.as_list(),
		Some(&["/staff".to_string(), "/ops".to_string()][..])
	);
	// groups must be an array, unlike generic collections
	let p = payload(r#"{"groups":"/staff"}"#);
	assert!(ClaimMapper::KeycloakGroups.map(&p, "groups").is_err());
}

#[test]
fn generic_typing_covers_numbers_and_mixed_values() {
	let p = payload(r#"{"n":3,"f":1.5,"s":"x","l":["a"],"o":{"k":1},"null":null}"#);
	assert_matches!(
		ClaimValue::of(&p["n"]),
		ClaimValue::Number { value: ClaimNumber::Int(3), .. }
	);
	assert_matches!(
		ClaimValue::of(&p["f"]),
		ClaimValue::Number { value: ClaimNumber::Float(_), .. }
	);
	assert_eq!(ClaimValue::of(&p["s"]).as_str(), Some("x"));
	assert_eq!(ClaimValue::of(&p["l"]).as_list(), Some(&["a".to_string()][..]));
	// objects keep their source form
	assert_eq!(ClaimValue::of(&p["o"]).as_str(), Some(r#"{"k":1}"#));
	assert!(ClaimValue::of(&p["null"]).is_absent());
}
