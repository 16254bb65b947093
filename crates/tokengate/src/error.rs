use crate::events::EventType;

/// Terminal outcome of a failed validation. Carries the taxonomy kind for
/// decision-making plus a short message for logging. Never contains token
/// material; header-derived fields (`kid`, `alg`) and the issuer identifier
/// are allowed in the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ValidationError {
	pub kind: EventType,
	pub message: String,
}

impl ValidationError {
	pub fn new(kind: EventType, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}
}

/// Rejected configuration, detected once at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("issuer {issuer:?} configures more than one JWKS source")]
	MultipleJwksSources { issuer: String },
	#[error("issuer {issuer:?} configures no JWKS source")]
	NoJwksSource { issuer: String },
	#[error("issuer {issuer:?} has invalid inline JWKS: {reason}")]
	InvalidInlineJwks { issuer: String, reason: String },
	#[error("issuer {issuer:?} is registered twice")]
	DuplicateIssuer { issuer: String },
	#[error("issuer {issuer:?} allows no signature algorithms")]
	EmptyAlgorithmAllowList { issuer: String },
	#[error("issuer {issuer:?} has invalid URL {url:?}: {reason}")]
	InvalidUrl {
		issuer: String,
		url: String,
		reason: String,
	},
	#[error("failed to construct HTTP client: {0}")]
	HttpClient(String),
}
