use std::time::Duration;

use rand::RngExt as _;

use crate::crypto::Algorithm;

/// Policy knobs for the validator as a whole. Per-issuer settings live on
/// [`crate::issuer::IssuerConfig`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ValidatorConfig {
	/// Raw tokens above this byte length are rejected before any decoding.
	pub max_token_size: usize,
	pub decoder: DecoderLimits,
	/// Global algorithm allow-list. Issuers may narrow it, never widen it.
	pub allowed_algorithms: Vec<Algorithm>,
	/// Tolerance applied to temporal claims to absorb clock skew.
	#[serde(with = "serde_secs")]
	pub leeway: Duration,
	/// Extract `realm_access.roles` into `roles` for every issuer that does
	/// not override the toggle.
	pub keycloak_default_roles_mapper: bool,
	/// Extract the `groups` array for every issuer that does not override
	/// the toggle.
	pub keycloak_default_groups_mapper: bool,
	pub http: HttpConfig,
	pub retry: RetryConfig,
	/// Optional delay before background JWKS loading starts, to let external
	/// IDPs become ready.
	#[serde(with = "serde_opt_secs")]
	pub startup_delay: Option<Duration>,
}

impl Default for ValidatorConfig {
	fn default() -> Self {
		Self {
			max_token_size: 16 * 1024,
			decoder: DecoderLimits::default(),
			allowed_algorithms: Algorithm::ALL.to_vec(),
			leeway: Duration::from_secs(30),
			keycloak_default_roles_mapper: false,
			keycloak_default_groups_mapper: false,
			http: HttpConfig::default(),
			retry: RetryConfig::default(),
			startup_delay: None,
		}
	}
}

/// Ceilings enforced while decoding header and payload JSON.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DecoderLimits {
	/// Decoded-part byte ceiling.
	pub max_payload_size: usize,
	/// Single-string ceiling, applied to keys and values.
	pub max_string_size: usize,
	/// Element-count ceiling per array.
	pub max_array_size: usize,
	/// Container nesting ceiling; the top-level object sits at depth 1.
	pub max_depth: usize,
}

impl Default for DecoderLimits {
	fn default() -> Self {
		Self {
			max_payload_size: 8 * 1024,
			max_string_size: 4 * 1024,
			max_array_size: 64,
			max_depth: 10,
		}
	}
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct HttpConfig {
	#[serde(with = "serde_secs")]
	pub connect_timeout: Duration,
	#[serde(with = "serde_secs")]
	pub read_timeout: Duration,
	/// A snapshot older than this is considered stale and refreshed lazily
	/// on access with a conditional GET.
	#[serde(with = "serde_secs")]
	pub refresh_interval: Duration,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			connect_timeout: Duration::from_secs(5),
			read_timeout: Duration::from_secs(5),
			refresh_interval: Duration::from_secs(600),
		}
	}
}

/// Exponential backoff with jitter, applied to retryable JWKS load failures.
/// Delay for attempt `n` (1-based) is
/// `min(initial_delay * multiplier^(n-1) * (1 + U[-jitter, +jitter]), max_delay)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	#[serde(with = "serde_secs")]
	pub initial_delay: Duration,
	pub multiplier: f64,
	#[serde(with = "serde_secs")]
	pub max_delay: Duration,
	pub jitter_factor: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			initial_delay: Duration::from_secs(1),
			multiplier: 2.0,
			max_delay: Duration::from_secs(60),
			jitter_factor: 0.1,
		}
	}
}

impl RetryConfig {
	/// Backoff before retry `attempt` (1-based), jitter already applied.
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
		let jitter = if self.jitter_factor > 0.0 {
			1.0 + rand::rng().random_range(-self.jitter_factor..=self.jitter_factor)
		} else {
			1.0
		};
		let raw = self.initial_delay.as_secs_f64() * exp * jitter;
		// cap in f64 space: the exponential overflows Duration long before
		// max_attempts does
		let capped = raw.clamp(0.0, self.max_delay.as_secs_f64());
		Duration::from_secs_f64(capped)
	}
}

mod serde_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

mod serde_opt_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
		match d {
			Some(d) => s.serialize_some(&d.as_secs()),
			None => s.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
		Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
	}
}
