//! JWT validation core for server-side authorization gateways.
//!
//! An HTTP handler extracts a `Bearer` credential, hands the compact string
//! to [`TokenValidator`], and on success obtains an immutable, typed claim
//! set ([`AccessToken`], [`IdToken`], or [`RefreshToken`]) for authorization
//! decisions. Every rejection maps to exactly one [`EventType`], observable
//! through the validator's [`SecurityEventCounter`].
//!
//! Trusted issuers are registered up front; their keys come from inline
//! JWKS content, a file, a JWKS URL, or OpenID discovery. Remote sources are
//! loaded in the background with retry and refreshed with ETag-aware
//! conditional GETs; key rotation is a lock-free snapshot swap.
//!
//! ```no_run
//! # async fn example() -> anyhow::Result<()> {
//! use tokengate::{IssuerConfig, JwksSourceConfig, TokenValidator, ValidatorConfig};
//!
//! let issuer = IssuerConfig {
//! 	audiences: vec!["my-api".into()],
//! 	..IssuerConfig::new(
//! 		"https://idp.example.com/realms/prod",
//! 		JwksSourceConfig::well_known(
//! 			"https://idp.example.com/realms/prod/.well-known/openid-configuration",
//! 		),
//! 	)
//! };
//! let validator = TokenValidator::new(ValidatorConfig::default(), vec![issuer])?;
//! let token = validator.validate_access("eyJhbGciOiJSUzI1NiJ9...").await?;
//! assert!(token.has_scope("read"));
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod error;
pub mod events;
pub mod issuer;
pub mod json;
pub mod jwks;
pub mod loader;
pub mod token;
pub mod validate;

#[cfg(test)]
pub mod tests_common;

pub use claims::{ClaimMapper, ClaimNumber, ClaimValue};
pub use config::{DecoderLimits, HttpConfig, RetryConfig, ValidatorConfig};
pub use crypto::Algorithm;
pub use error::{ConfigError, ValidationError};
pub use events::{EventType, SecurityEventCounter};
pub use issuer::{IssuerConfig, JwksSourceConfig};
pub use loader::LoaderStatus;
pub use token::{AccessToken, IdToken, RefreshToken};
pub use validate::{Clock, FixedClock, SystemClock, TokenValidator};
