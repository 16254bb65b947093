use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Closed taxonomy of security-relevant events. Every rejection produced by
/// the validation pipeline maps to exactly one of these; the remaining
/// variants are observability-only and never appear in a `ValidationError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum EventType {
	// Structural
	TokenEmpty,
	TokenTooLarge,
	MalformedToken,
	JsonParseFailed,
	// Header
	UnsupportedAlgorithm,
	NoneAlgorithm,
	UnsupportedTokenType,
	// Issuer
	MissingIssuerClaim,
	UnknownIssuer,
	IssuerMismatch,
	// Key / JWKS
	NoKeyForKid,
	AmbiguousKeySelection,
	KeyAlgorithmMismatch,
	JwksFetchFailed,
	JwksParseFailed,
	KeyUnavailable,
	// Signature
	SignatureInvalid,
	// Claims
	MissingClaim,
	InvalidClaimShape,
	TokenExpired,
	TokenNotYetValid,
	AudienceMismatch,
	AzpMismatch,
	// Observability-only; never a rejection
	DuplicateJsonKey,
	JwksKeyDropped,
	DuplicateKeyId,
	SubjectWaived,
}

impl EventType {
	pub const ALL: [EventType; 27] = [
		EventType::TokenEmpty,
		EventType::TokenTooLarge,
		EventType::MalformedToken,
		EventType::JsonParseFailed,
		EventType::UnsupportedAlgorithm,
		EventType::NoneAlgorithm,
		EventType::UnsupportedTokenType,
		EventType::MissingIssuerClaim,
		EventType::UnknownIssuer,
		EventType::IssuerMismatch,
		EventType::NoKeyForKid,
		EventType::AmbiguousKeySelection,
		EventType::KeyAlgorithmMismatch,
		EventType::JwksFetchFailed,
		EventType::JwksParseFailed,
		EventType::KeyUnavailable,
		EventType::SignatureInvalid,
		EventType::MissingClaim,
		EventType::InvalidClaimShape,
		EventType::TokenExpired,
		EventType::TokenNotYetValid,
		EventType::AudienceMismatch,
		EventType::AzpMismatch,
		EventType::DuplicateJsonKey,
		EventType::JwksKeyDropped,
		EventType::DuplicateKeyId,
		EventType::SubjectWaived,
	];

	pub fn name(&self) -> &'static str {
		match self {
			EventType::TokenEmpty => "token_empty",
			EventType::TokenTooLarge => "token_too_large",
			EventType::MalformedToken => "malformed_token",
			EventType::JsonParseFailed => "json_parse_failed",
			EventType::UnsupportedAlgorithm => "unsupported_algorithm",
			EventType::NoneAlgorithm => "none_algorithm",
			EventType::UnsupportedTokenType => "unsupported_token_type",
			EventType::MissingIssuerClaim => "missing_issuer_claim",
			EventType::UnknownIssuer => "unknown_issuer",
			EventType::IssuerMismatch => "issuer_mismatch",
			EventType::NoKeyForKid => "no_key_for_kid",
			EventType::AmbiguousKeySelection => "ambiguous_key_selection",
			EventType::KeyAlgorithmMismatch => "key_algorithm_mismatch",
			EventType::JwksFetchFailed => "jwks_fetch_failed",
			EventType::JwksParseFailed => "jwks_parse_failed",
			EventType::KeyUnavailable => "key_unavailable",
			EventType::SignatureInvalid => "signature_invalid",
			EventType::MissingClaim => "missing_claim",
			EventType::InvalidClaimShape => "invalid_claim_shape",
			EventType::TokenExpired => "token_expired",
			EventType::TokenNotYetValid => "token_not_yet_valid",
			EventType::AudienceMismatch => "audience_mismatch",
			EventType::AzpMismatch => "azp_mismatch",
			EventType::DuplicateJsonKey => "duplicate_json_key",
			EventType::JwksKeyDropped => "jwks_key_dropped",
			EventType::DuplicateKeyId => "duplicate_key_id",
			EventType::SubjectWaived => "subject_waived",
		}
	}
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Monotone per-event counters, observable without blocking the validation
/// path. Increments are `fetch_add(Relaxed)`; readers may lag but never see
/// a count decrease.
#[derive(Debug)]
pub struct SecurityEventCounter {
	counters: [AtomicU64; EventType::ALL.len()],
}

impl Default for SecurityEventCounter {
	fn default() -> Self {
		Self::new()
	}
}

impl SecurityEventCounter {
	pub fn new() -> Self {
		Self {
			counters: std::array::from_fn(|_| AtomicU64::new(0)),
		}
	}

	pub fn increment(&self, event: EventType) {
		self.counters[event as usize].fetch_add(1, Ordering::Relaxed);
	}

	pub fn get(&self, event: EventType) -> u64 {
		self.counters[event as usize].load(Ordering::Relaxed)
	}

	/// Full taxonomy -> count map, for external telemetry exporters.
	pub fn snapshot(&self) -> Vec<(EventType, u64)> {
		EventType::ALL.iter().map(|e| (*e, self.get(*e))).collect()
	}

	/// Sum across the whole taxonomy.
	pub fn total(&self) -> u64 {
		self.counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn increments_are_isolated_per_event() {
		let c = SecurityEventCounter::new();
		c.increment(EventType::TokenExpired);
		c.increment(EventType::TokenExpired);
		c.increment(EventType::SignatureInvalid);
		assert_eq!(c.get(EventType::TokenExpired), 2);
		assert_eq!(c.get(EventType::SignatureInvalid), 1);
		assert_eq!(c.get(EventType::AudienceMismatch), 0);
		assert_eq!(c.total(), 3);
	}

	#[test]
	fn snapshot_covers_whole_taxonomy() {
		let c = SecurityEventCounter::new();
		let snap = c.snapshot();
		assert_eq!(snap.len(), EventType::ALL.len());
		assert!(snap.iter().all(|(_, n)| *n == 0));
	}

	#[test]
	fn concurrent_increments_are_not_lost() {
		let c = std::sync::Arc::new(SecurityEventCounter::new());
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let c = c.clone();
				std::thread::spawn(move || {
					for _ in 0..1000 {
						c.increment(EventType::SignatureInvalid);
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(c.get(EventType::SignatureInvalid), 8000);
	}
}
