use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::claims::{ClaimMapper, ClaimShapeError};
use crate::codec;
use crate::config::ValidatorConfig;
use crate::crypto::{self, Algorithm, CryptoError, HeaderAlg, KeyMaterial};
use crate::discovery::DiscoveryError;
use crate::error::{ConfigError, ValidationError};
use crate::events::{EventType, SecurityEventCounter};
use crate::issuer::{Issuer, IssuerConfig, IssuerRegistry};
use crate::json::{self, JsonObject, JsonValue};
use crate::jwks::SelectionError;
use crate::loader::{LoadError, LoaderStatus};
use crate::token::{AccessToken, IdToken, RawToken, RefreshToken};

/// Clock source for temporal claim checks, injected so tests can pin time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenType {
	Access,
	Id,
}

/// The validation entry point: a compact token string in, a typed token (or
/// one taxonomy error) out. Safe for concurrent use; the only suspension
/// happens when a JWKS source must be (re)loaded.
pub struct TokenValidator {
	config: ValidatorConfig,
	registry: IssuerRegistry,
	events: Arc<SecurityEventCounter>,
	clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenValidator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TokenValidator")
			.field("issuers", &self.registry.statuses())
			.finish_non_exhaustive()
	}
}

impl TokenValidator {
	/// Construct with the system clock and start background JWKS loading for
	/// every remote source. Must run inside a tokio runtime when remote
	/// sources are configured.
	pub fn new(config: ValidatorConfig, issuers: Vec<IssuerConfig>) -> Result<Self, ConfigError> {
		Self::with_clock(config, issuers, Arc::new(SystemClock))
	}

	pub fn with_clock(
		config: ValidatorConfig,
		issuers: Vec<IssuerConfig>,
		clock: Arc<dyn Clock>,
	) -> Result<Self, ConfigError> {
		let events = Arc::new(SecurityEventCounter::new());
		let registry = IssuerRegistry::new(&config, issuers, events.clone())?;
		registry.spawn_background_loading(config.startup_delay);
		Ok(Self {
			config,
			registry,
			events,
			clock,
		})
	}

	pub fn events(&self) -> &SecurityEventCounter {
		&self.events
	}

	pub fn issuer_status(&self, issuer: &str) -> Option<LoaderStatus> {
		self.registry.status(issuer)
	}

	pub fn issuer_statuses(&self) -> std::collections::HashMap<String, LoaderStatus> {
		self.registry.statuses()
	}

	/// Cache-clearing reload of one issuer's keys, for ops-triggered
	/// rollover. Does not touch the event counters.
	pub async fn force_reload(&self, issuer: &str) -> Result<(), ValidationError> {
		let issuer = self.registry.resolve(issuer).ok_or_else(|| {
			ValidationError::new(EventType::UnknownIssuer, format!("issuer {issuer:?} is not registered"))
		})?;
		issuer
			.provider
			.force_reload()
			.await
			.map(|_| ())
			.map_err(|e| ValidationError::new(load_error_kind(&e), e.to_string()))
	}

	pub async fn validate_access(&self, raw: &str) -> Result<AccessToken, ValidationError> {
		let validated = self.validate_signed(raw, TokenType::Access).await?;
		self.assemble_access(validated)
	}

	pub async fn validate_id(&self, raw: &str) -> Result<IdToken, ValidationError> {
		let validated = self.validate_signed(raw, TokenType::Id).await?;
		self.assemble_id(validated)
	}

	/// Refresh tokens are opaque to everyone but the IDP that minted them:
	/// any non-empty string within the size cap is accepted, and claims are
	/// attached (and temporally checked) only when the token happens to be
	/// JWT-formatted with a registered issuer.
	pub async fn validate_refresh(&self, raw: &str) -> Result<RefreshToken, ValidationError> {
		if raw.is_empty() {
			return Err(self.reject(EventType::TokenEmpty, "empty token"));
		}
		if raw.len() > self.config.max_token_size {
			return Err(self.reject(
				EventType::TokenTooLarge,
				format!("{} bytes exceeds the {} byte cap", raw.len(), self.config.max_token_size),
			));
		}
		let Some(payload) = self.try_decode_payload(raw) else {
			return Ok(RefreshToken {
				issuer: None,
				expiration: None,
				claims: None,
				raw: RawToken::new(raw),
			});
		};
		// JWT-shaped refresh tokens must at least name a registered issuer
		let issuer_name = match payload.get("iss") {
			None => {
				return Err(self.reject(EventType::MissingIssuerClaim, "refresh token has no iss claim"));
			},
			Some(v) if v.is_null() => {
				return Err(self.reject(EventType::MissingIssuerClaim, "iss claim is null"));
			},
			Some(JsonValue::String(s)) => s.clone(),
			Some(other) => {
				return Err(self.reject(
					EventType::InvalidClaimShape,
					format!("iss claim has JSON type {}", other.type_name()),
				));
			},
		};
		if self.registry.resolve(&issuer_name).is_none() {
			return Err(self.reject(
				EventType::UnknownIssuer,
				format!("issuer {issuer_name:?} is not registered"),
			));
		}
		let expiration = self.map_date_time(&payload, "exp", false)?;
		if let Some(exp) = expiration {
			self.check_expiration(exp)?;
		}
		Ok(RefreshToken {
			issuer: Some(issuer_name),
			expiration,
			claims: Some(payload),
			raw: RawToken::new(raw),
		})
	}

	/// Single failure edge of the pipeline: counts the event and produces
	/// the terminal error. Exactly one counter increments per rejection.
	fn reject(&self, kind: EventType, message: impl Into<String>) -> ValidationError {
		self.events.increment(kind);
		let err = ValidationError::new(kind, message);
		debug!(kind = %err.kind, msg = %err.message, "token rejected");
		err
	}

	fn try_decode_payload(&self, raw: &str) -> Option<JsonObject> {
		let parts = codec::split(raw).ok()?;
		let bytes = codec::decode_segment(1, parts.payload).ok()?;
		json::decode_object(&bytes, &self.config.decoder, &self.events).ok()
	}

	async fn validate_signed(
		&self,
		raw: &str,
		token_type: TokenType,
	) -> Result<Validated, ValidationError> {
		// FormatChecked
		if raw.is_empty() {
			return Err(self.reject(EventType::TokenEmpty, "empty token"));
		}
		if raw.len() > self.config.max_token_size {
			return Err(self.reject(
				EventType::TokenTooLarge,
				format!("{} bytes exceeds the {} byte cap", raw.len(), self.config.max_token_size),
			));
		}
		let parts = codec::split(raw)
			.map_err(|e| self.reject(EventType::MalformedToken, e.to_string()))?;

		// HeaderDecoded
		let header_bytes = codec::decode_segment(0, parts.header)
			.map_err(|e| self.reject(EventType::MalformedToken, e.to_string()))?;
		let header = json::decode_object(&header_bytes, &self.config.decoder, &self.events)
			.map_err(|e| self.reject(EventType::JsonParseFailed, format!("header: {e}")))?;

		// PayloadDecoded
		let payload_bytes = codec::decode_segment(1, parts.payload)
			.map_err(|e| self.reject(EventType::MalformedToken, e.to_string()))?;
		let payload = json::decode_object(&payload_bytes, &self.config.decoder, &self.events)
			.map_err(|e| self.reject(EventType::JsonParseFailed, format!("payload: {e}")))?;
		let signature = codec::decode_segment(2, parts.signature)
			.map_err(|e| self.reject(EventType::MalformedToken, e.to_string()))?;
		let decoded = codec::DecodedJwt {
			header,
			payload,
			signature,
			signing_input: parts.signing_input.to_string(),
		};

		// IssuerResolved
		let issuer_name = match decoded.payload.get("iss") {
			None => return Err(self.reject(EventType::MissingIssuerClaim, "no iss claim")),
			Some(v) if v.is_null() => {
				return Err(self.reject(EventType::MissingIssuerClaim, "iss claim is null"));
			},
			Some(JsonValue::String(s)) => s.clone(),
			Some(other) => {
				return Err(self.reject(
					EventType::InvalidClaimShape,
					format!("iss claim has JSON type {}", other.type_name()),
				));
			},
		};
		let issuer = self
			.registry
			.resolve(&issuer_name)
			.ok_or_else(|| {
				self.reject(
					EventType::UnknownIssuer,
					format!("issuer {issuer_name:?} is not registered"),
				)
			})?
			.clone();

		// HeaderValidated
		let alg = self.check_header(&decoded.header, &issuer, token_type)?;
		let kid = match decoded.header.get("kid") {
			None => None,
			Some(JsonValue::String(s)) => Some(s.clone()),
			Some(other) => {
				return Err(self.reject(
					EventType::MalformedToken,
					format!("kid header has JSON type {}", other.type_name()),
				));
			},
		};

		// KeyResolved
		let key = self.resolve_key(&issuer, kid.as_deref(), alg).await?;

		// SignatureVerified
		crypto::verify(alg, &key, decoded.signing_input.as_bytes(), &decoded.signature).map_err(
			|e| match e {
				CryptoError::KeyMismatch { .. } => {
					self.reject(EventType::KeyAlgorithmMismatch, e.to_string())
				},
				CryptoError::SignatureLength { .. } | CryptoError::Invalid { .. } => self.reject(
					EventType::SignatureInvalid,
					format!("{e} (kid {kid:?})"),
				),
			},
		)?;

		Ok(Validated {
			issuer,
			payload: decoded.payload,
			raw: RawToken::new(raw),
		})
	}

	fn check_header(
		&self,
		header: &JsonObject,
		issuer: &Issuer,
		token_type: TokenType,
	) -> Result<Algorithm, ValidationError> {
		let raw_alg = match header.get("alg") {
			Some(JsonValue::String(s)) => s.as_str(),
			Some(other) => {
				return Err(self.reject(
					EventType::UnsupportedAlgorithm,
					format!("alg header has JSON type {}", other.type_name()),
				));
			},
			None => {
				return Err(self.reject(EventType::UnsupportedAlgorithm, "no alg header"));
			},
		};
		let alg = match crypto::classify_alg(raw_alg) {
			HeaderAlg::Supported(alg) => alg,
			HeaderAlg::None => {
				return Err(self.reject(EventType::NoneAlgorithm, "alg none is never accepted"));
			},
			HeaderAlg::Symmetric(name) => {
				return Err(self.reject(
					EventType::UnsupportedAlgorithm,
					format!("{name} is symmetric; only asymmetric algorithms are accepted"),
				));
			},
			HeaderAlg::Unknown(name) => {
				return Err(self.reject(
					EventType::UnsupportedAlgorithm,
					format!("unknown algorithm {name}"),
				));
			},
		};
		if !issuer.algorithms.contains(&alg) {
			return Err(self.reject(
				EventType::UnsupportedAlgorithm,
				format!("{alg} is not allowed for issuer {}", issuer.config.issuer),
			));
		}
		match header.get("typ") {
			None => {},
			Some(JsonValue::String(typ)) => {
				let accepted = typ.eq_ignore_ascii_case("JWT")
					|| (token_type == TokenType::Access
						&& (typ.eq_ignore_ascii_case("at+jwt")
							|| typ.eq_ignore_ascii_case("application/at+jwt")));
				if !accepted {
					return Err(self.reject(
						EventType::UnsupportedTokenType,
						format!("typ {typ:?} is not acceptable here"),
					));
				}
			},
			Some(other) => {
				return Err(self.reject(
					EventType::UnsupportedTokenType,
					format!("typ header has JSON type {}", other.type_name()),
				));
			},
		}
		Ok(alg)
	}

	/// JWKS selection with the at-most-one-reload retry: a miss triggers a
	/// single conditional reload, but only when the snapshot has outlived
	/// the refresh interval. A miss against a fresh snapshot fails
	/// immediately, so unknown `kid` values cannot be used to hammer the
	/// IDP with one fetch per validation.
	async fn resolve_key(
		&self,
		issuer: &Issuer,
		kid: Option<&str>,
		alg: Algorithm,
	) -> Result<KeyMaterial, ValidationError> {
		let snapshot = issuer
			.provider
			.ensure()
			.await
			.map_err(|e| self.reject_load_error(e))?;
		let first_miss = match snapshot.select(kid, alg) {
			Ok(key) => return self.check_key_alg(key.material.clone(), key.alg, alg),
			Err(e) => e,
		};
		if !issuer.provider.is_remote() || !issuer.provider.is_stale() {
			return Err(self.reject_selection(first_miss));
		}
		debug!(
			issuer = %issuer.config.issuer,
			?kid,
			generation = snapshot.generation,
			"key selection missed against a stale snapshot, reloading JWKS once"
		);
		let fresh = issuer
			.provider
			.reload_for_miss(snapshot.generation)
			.await
			.map_err(|e| self.reject_load_error(e))?;
		match fresh.select(kid, alg) {
			Ok(key) => self.check_key_alg(key.material.clone(), key.alg, alg),
			Err(e) => Err(self.reject_selection(e)),
		}
	}

	fn check_key_alg(
		&self,
		material: KeyMaterial,
		key_alg: Option<Algorithm>,
		alg: Algorithm,
	) -> Result<KeyMaterial, ValidationError> {
		// a key pinned to an algorithm must not verify any other
		if let Some(pinned) = key_alg
			&& pinned != alg
		{
			return Err(self.reject(
				EventType::KeyAlgorithmMismatch,
				format!("key is pinned to {pinned}, token uses {alg}"),
			));
		}
		if material.key_type() != alg.key_type() {
			return Err(self.reject(
				EventType::KeyAlgorithmMismatch,
				format!("{} key cannot verify {alg}", material.type_name()),
			));
		}
		Ok(material)
	}

	fn reject_selection(&self, e: SelectionError) -> ValidationError {
		match e {
			SelectionError::NoKeyForKid(_) => self.reject(EventType::NoKeyForKid, e.to_string()),
			SelectionError::Ambiguous { .. } => {
				self.reject(EventType::AmbiguousKeySelection, e.to_string())
			},
		}
	}

	fn reject_load_error(&self, e: LoadError) -> ValidationError {
		self.reject(load_error_kind(&e), e.to_string())
	}

	// Claim mapping helpers; absence is only an error when `mandatory`.

	fn map_shape_error(&self, e: ClaimShapeError) -> ValidationError {
		self.reject(EventType::InvalidClaimShape, e.to_string())
	}

	fn missing(&self, claim: &str) -> ValidationError {
		self.reject(EventType::MissingClaim, format!("required claim {claim:?} is missing"))
	}

	fn map_date_time(
		&self,
		payload: &JsonObject,
		claim: &str,
		mandatory: bool,
	) -> Result<Option<DateTime<Utc>>, ValidationError> {
		let value = ClaimMapper::DateTime
			.map(payload, claim)
			.map_err(|e| self.map_shape_error(e))?;
		match value.as_date_time() {
			Some(instant) => Ok(Some(instant)),
			None if mandatory => Err(self.missing(claim)),
			None => Ok(None),
		}
	}

	fn map_string(
		&self,
		payload: &JsonObject,
		claim: &str,
		mandatory: bool,
	) -> Result<Option<String>, ValidationError> {
		let value = ClaimMapper::Identity
			.map(payload, claim)
			.map_err(|e| self.map_shape_error(e))?;
		match value.as_str() {
			Some(s) => Ok(Some(s.to_owned())),
			None if mandatory => Err(self.missing(claim)),
			None => Ok(None),
		}
	}

	fn map_collection(
		&self,
		payload: &JsonObject,
		claim: &str,
	) -> Result<Vec<String>, ValidationError> {
		let value = ClaimMapper::Collection
			.map(payload, claim)
			.map_err(|e| self.map_shape_error(e))?;
		Ok(value.as_list().map(<[String]>::to_vec).unwrap_or_default())
	}

	fn leeway(&self) -> chrono::Duration {
		chrono::Duration::from_std(self.config.leeway).unwrap_or(chrono::Duration::MAX)
	}

	fn check_expiration(&self, exp: DateTime<Utc>) -> Result<(), ValidationError> {
		let now = self.clock.now();
		if exp < now - self.leeway() {
			return Err(self.reject(
				EventType::TokenExpired,
				format!("exp {exp} is more than {:?} in the past", self.config.leeway),
			));
		}
		Ok(())
	}

	fn check_temporal(
		&self,
		exp: DateTime<Utc>,
		iat: Option<DateTime<Utc>>,
		nbf: Option<DateTime<Utc>>,
	) -> Result<(), ValidationError> {
		self.check_expiration(exp)?;
		let horizon = self.clock.now() + self.leeway();
		if let Some(nbf) = nbf
			&& nbf > horizon
		{
			return Err(self.reject(
				EventType::TokenNotYetValid,
				format!("nbf {nbf} is more than {:?} in the future", self.config.leeway),
			));
		}
		if let Some(iat) = iat
			&& iat > horizon
		{
			return Err(self.reject(
				EventType::TokenNotYetValid,
				format!("iat {iat} is more than {:?} in the future", self.config.leeway),
			));
		}
		Ok(())
	}

	fn check_audience(&self, issuer: &Issuer, audience: &[String]) -> Result<(), ValidationError> {
		let expected = &issuer.config.audiences;
		if expected.is_empty() {
			return Ok(());
		}
		if audience.iter().any(|a| expected.contains(a)) {
			return Ok(());
		}
		Err(self.reject(
			EventType::AudienceMismatch,
			format!("audience {audience:?} contains none of {expected:?}"),
		))
	}

	fn check_azp(
		&self,
		issuer: &Issuer,
		azp: Option<&str>,
	) -> Result<(), ValidationError> {
		let Some(expected) = &issuer.config.client_id else {
			return Ok(());
		};
		match azp {
			None => Err(self.reject(
				EventType::MissingClaim,
				format!("azp is required when a client id ({expected}) is configured"),
			)),
			Some(azp) if azp == expected => Ok(()),
			Some(azp) => Err(self.reject(
				EventType::AzpMismatch,
				format!("azp {azp:?} does not match expected client {expected:?}"),
			)),
		}
	}

	fn assemble_access(&self, validated: Validated) -> Result<AccessToken, ValidationError> {
		let Validated {
			issuer,
			payload,
			raw,
		} = validated;

		// ClaimsMapped
		let exp = self
			.map_date_time(&payload, "exp", true)?
			.expect("mandatory claim is present after mapping");
		let iat = self
			.map_date_time(&payload, "iat", true)?
			.expect("mandatory claim is present after mapping");
		let nbf = self.map_date_time(&payload, "nbf", false)?;
		let subject = match self.map_string(&payload, "sub", false)? {
			Some(sub) => Some(sub),
			None if issuer.config.subject_optional => {
				// observable waiver so missing subjects stay diagnosable
				self.events.increment(EventType::SubjectWaived);
				None
			},
			None => return Err(self.missing("sub")),
		};
		let scopes = self.map_scopes(&payload)?;
		let audience = self.map_collection(&payload, "aud")?;
		let authorized_party = self.map_string(&payload, "azp", false)?;
		let roles = if issuer.map_roles {
			self.map_keycloak(&payload, ClaimMapper::KeycloakRoles)?
		} else {
			Vec::new()
		};
		let groups = if issuer.map_groups {
			self.map_keycloak(&payload, ClaimMapper::KeycloakGroups)?
		} else {
			Vec::new()
		};

		// ClaimsValidated
		self.check_temporal(exp, Some(iat), nbf)?;
		self.check_audience(&issuer, &audience)?;
		self.check_azp(&issuer, authorized_party.as_deref())?;

		// Accepted
		Ok(AccessToken {
			issuer: issuer.config.issuer.clone(),
			subject,
			expiration: exp,
			issued_at: iat,
			not_before: nbf,
			scopes,
			roles,
			groups,
			audience,
			authorized_party,
			claims: payload,
			raw,
		})
	}

	fn assemble_id(&self, validated: Validated) -> Result<IdToken, ValidationError> {
		let Validated {
			issuer,
			payload,
			raw,
		} = validated;

		// ClaimsMapped
		let exp = self
			.map_date_time(&payload, "exp", true)?
			.expect("mandatory claim is present after mapping");
		let iat = self
			.map_date_time(&payload, "iat", true)?
			.expect("mandatory claim is present after mapping");
		let nbf = self.map_date_time(&payload, "nbf", false)?;
		let subject = self
			.map_string(&payload, "sub", true)?
			.expect("mandatory claim is present after mapping");
		let audience = self.map_collection(&payload, "aud")?;
		if audience.is_empty() {
			return Err(self.missing("aud"));
		}
		let authorized_party = self.map_string(&payload, "azp", false)?;
		let nonce = self.map_string(&payload, "nonce", false)?;

		// ClaimsValidated
		self.check_temporal(exp, Some(iat), nbf)?;
		self.check_audience(&issuer, &audience)?;
		self.check_azp(&issuer, authorized_party.as_deref())?;

		// Accepted
		Ok(IdToken {
			issuer: issuer.config.issuer.clone(),
			subject,
			audience,
			authorized_party,
			nonce,
			expiration: exp,
			issued_at: iat,
			not_before: nbf,
			claims: payload,
			raw,
		})
	}

	/// `scope` (space-delimited string) or `scp` (array or lone string); at
	/// least one must be present on an access token.
	fn map_scopes(&self, payload: &JsonObject) -> Result<Vec<String>, ValidationError> {
		let scope = ClaimMapper::scope_splitter()
			.map(payload, "scope")
			.map_err(|e| self.map_shape_error(e))?;
		if let Some(scopes) = scope.as_list() {
			return Ok(scopes.to_vec());
		}
		let scp = ClaimMapper::Collection
			.map(payload, "scp")
			.map_err(|e| self.map_shape_error(e))?;
		match scp.as_list() {
			Some(scopes) => Ok(scopes.to_vec()),
			None => Err(self.missing("scope")),
		}
	}

	fn map_keycloak(
		&self,
		payload: &JsonObject,
		mapper: ClaimMapper,
	) -> Result<Vec<String>, ValidationError> {
		let value = mapper
			.map(payload, "")
			.map_err(|e| self.map_shape_error(e))?;
		Ok(value.as_list().map(<[String]>::to_vec).unwrap_or_default())
	}
}

/// Output of the signature-verified stages, before per-type claim assembly.
struct Validated {
	issuer: Arc<Issuer>,
	payload: JsonObject,
	raw: RawToken,
}

fn load_error_kind(e: &LoadError) -> EventType {
	match e {
		LoadError::Fetch(_) => EventType::JwksFetchFailed,
		LoadError::Parse(_) => EventType::JwksParseFailed,
		LoadError::Discovery(DiscoveryError::IssuerMismatch { .. }) => EventType::IssuerMismatch,
		LoadError::Discovery(_) => EventType::JwksFetchFailed,
		LoadError::Unavailable => EventType::KeyUnavailable,
	}
}

/// Fixed clock for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		self.0
	}
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
