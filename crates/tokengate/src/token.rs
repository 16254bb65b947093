use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

use crate::claims::ClaimValue;
use crate::json::JsonObject;

/// The compact token string, kept out of Debug output and logs.
#[derive(Clone)]
pub struct RawToken(SecretString);

impl RawToken {
	pub(crate) fn new(raw: &str) -> Self {
		Self(SecretString::new(raw.to_string().into_boxed_str()))
	}

	pub fn expose(&self) -> &str {
		self.0.expose_secret()
	}
}

impl std::fmt::Debug for RawToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "<redacted>")
	}
}

/// A fully validated OAuth access token. Constructed only after every
/// mandatory claim has been checked, so accessors never surprise the caller.
#[derive(Debug, Clone)]
pub struct AccessToken {
	pub issuer: String,
	/// Absent only when the issuer waives the subject claim.
	pub subject: Option<String>,
	pub expiration: DateTime<Utc>,
	pub issued_at: DateTime<Utc>,
	pub not_before: Option<DateTime<Utc>>,
	/// Normalized from `scope` or `scp`.
	pub scopes: Vec<String>,
	pub roles: Vec<String>,
	pub groups: Vec<String>,
	pub audience: Vec<String>,
	pub authorized_party: Option<String>,
	pub claims: JsonObject,
	pub raw: RawToken,
}

impl AccessToken {
	pub fn has_scope(&self, scope: &str) -> bool {
		self.scopes.iter().any(|s| s == scope)
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r == role)
	}

	pub fn in_group(&self, group: &str) -> bool {
		self.groups.iter().any(|g| g == group)
	}

	/// Typed access to any payload claim.
	pub fn claim(&self, name: &str) -> ClaimValue {
		self
			.claims
			.get(name)
			.map(ClaimValue::of)
			.unwrap_or(ClaimValue::Absent)
	}

	pub fn raw_token(&self) -> &str {
		self.raw.expose()
	}
}

/// A fully validated OpenID Connect ID token.
#[derive(Debug, Clone)]
pub struct IdToken {
	pub issuer: String,
	pub subject: String,
	pub audience: Vec<String>,
	pub authorized_party: Option<String>,
	pub nonce: Option<String>,
	pub expiration: DateTime<Utc>,
	pub issued_at: DateTime<Utc>,
	pub not_before: Option<DateTime<Utc>>,
	pub claims: JsonObject,
	pub raw: RawToken,
}

impl IdToken {
	pub fn claim(&self, name: &str) -> ClaimValue {
		self
			.claims
			.get(name)
			.map(ClaimValue::of)
			.unwrap_or(ClaimValue::Absent)
	}

	pub fn raw_token(&self) -> &str {
		self.raw.expose()
	}
}

/// A refresh token. These are opaque to everyone but the issuing IDP, so the
/// raw string is the payload; claims are attached only when the token
/// happens to be JWT-formatted.
#[derive(Debug, Clone)]
pub struct RefreshToken {
	pub issuer: Option<String>,
	pub expiration: Option<DateTime<Utc>>,
	pub claims: Option<JsonObject>,
	pub raw: RawToken,
}

impl RefreshToken {
	pub fn is_opaque(&self) -> bool {
		self.claims.is_none()
	}

	pub fn raw_token(&self) -> &str {
		self.raw.expose()
	}
}
