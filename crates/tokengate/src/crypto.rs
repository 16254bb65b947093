use std::fmt;
use std::str::FromStr;

use aws_lc_rs::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey, VerificationAlgorithm};

/// The asymmetric signature algorithms this library will ever accept. `none`
/// and the HMAC family are recognized during header parsing but permanently
/// rejected; see [`HeaderAlg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Algorithm {
	RS256,
	RS384,
	RS512,
	PS256,
	PS384,
	PS512,
	ES256,
	ES384,
	ES512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
	Rsa,
	Ec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
	P256,
	P384,
	P521,
}

impl EcCurve {
	/// Fixed-width R || S length in JOSE form.
	pub fn jose_signature_len(&self) -> usize {
		match self {
			EcCurve::P256 => 64,
			EcCurve::P384 => 96,
			EcCurve::P521 => 132,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			EcCurve::P256 => "P-256",
			EcCurve::P384 => "P-384",
			EcCurve::P521 => "P-521",
		}
	}
}

impl FromStr for EcCurve {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"P-256" => Ok(EcCurve::P256),
			"P-384" => Ok(EcCurve::P384),
			"P-521" => Ok(EcCurve::P521),
			_ => Err(()),
		}
	}
}

impl Algorithm {
	pub const ALL: [Algorithm; 9] = [
		Algorithm::RS256,
		Algorithm::RS384,
		Algorithm::RS512,
		Algorithm::PS256,
		Algorithm::PS384,
		Algorithm::PS512,
		Algorithm::ES256,
		Algorithm::ES384,
		Algorithm::ES512,
	];

	pub fn name(&self) -> &'static str {
		match self {
			Algorithm::RS256 => "RS256",
			Algorithm::RS384 => "RS384",
			Algorithm::RS512 => "RS512",
			Algorithm::PS256 => "PS256",
			Algorithm::PS384 => "PS384",
			Algorithm::PS512 => "PS512",
			Algorithm::ES256 => "ES256",
			Algorithm::ES384 => "ES384",
			Algorithm::ES512 => "ES512",
		}
	}

	pub fn key_type(&self) -> KeyType {
		match self {
			Algorithm::RS256
			| Algorithm::RS384
			| Algorithm::RS512
			| Algorithm::PS256
			| Algorithm::PS384
			| Algorithm::PS512 => KeyType::Rsa,
			Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 => KeyType::Ec,
		}
	}

	/// The curve an ECDSA algorithm is pinned to, per RFC 7518.
	pub fn ec_curve(&self) -> Option<EcCurve> {
		match self {
			Algorithm::ES256 => Some(EcCurve::P256),
			Algorithm::ES384 => Some(EcCurve::P384),
			Algorithm::ES512 => Some(EcCurve::P521),
			_ => None,
		}
	}

	fn rsa_params(&self) -> Option<&'static signature::RsaParameters> {
		match self {
			Algorithm::RS256 => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
			Algorithm::RS384 => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
			Algorithm::RS512 => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
			Algorithm::PS256 => Some(&signature::RSA_PSS_2048_8192_SHA256),
			Algorithm::PS384 => Some(&signature::RSA_PSS_2048_8192_SHA384),
			Algorithm::PS512 => Some(&signature::RSA_PSS_2048_8192_SHA512),
			_ => None,
		}
	}

	/// JOSE form only: the `*_FIXED` algorithms consume R || S directly, so
	/// DER-encoded signatures fail the length gate instead of being
	/// converted.
	fn ecdsa_params(&self) -> Option<&'static dyn VerificationAlgorithm> {
		match self {
			Algorithm::ES256 => Some(&signature::ECDSA_P256_SHA256_FIXED),
			Algorithm::ES384 => Some(&signature::ECDSA_P384_SHA384_FIXED),
			Algorithm::ES512 => Some(&signature::ECDSA_P521_SHA512_FIXED),
			_ => None,
		}
	}
}

impl fmt::Display for Algorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Algorithm {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Algorithm::ALL
			.iter()
			.find(|a| a.name() == s)
			.copied()
			.ok_or(())
	}
}

/// Classification of the raw `alg` header value, before any allow-list is
/// consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderAlg {
	Supported(Algorithm),
	/// `alg: none`, always rejected and counted separately.
	None,
	/// HMAC family; the library is asymmetric-only.
	Symmetric(String),
	Unknown(String),
}

pub fn classify_alg(raw: &str) -> HeaderAlg {
	if raw.eq_ignore_ascii_case("none") {
		return HeaderAlg::None;
	}
	if raw.starts_with("HS") {
		return HeaderAlg::Symmetric(raw.to_owned());
	}
	match Algorithm::from_str(raw) {
		Ok(alg) => HeaderAlg::Supported(alg),
		Err(()) => HeaderAlg::Unknown(raw.to_owned()),
	}
}

/// Public key material as extracted from a JWK. RSA keys keep their raw
/// big-endian components; EC keys keep the uncompressed SEC1 point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
	Rsa { n: Vec<u8>, e: Vec<u8> },
	Ec { curve: EcCurve, point: Vec<u8> },
}

impl KeyMaterial {
	pub fn key_type(&self) -> KeyType {
		match self {
			KeyMaterial::Rsa { .. } => KeyType::Rsa,
			KeyMaterial::Ec { .. } => KeyType::Ec,
		}
	}

	pub fn type_name(&self) -> &'static str {
		match self {
			KeyMaterial::Rsa { .. } => "RSA",
			KeyMaterial::Ec { .. } => "EC",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
	#[error("{key} key is incompatible with {alg}")]
	KeyMismatch { alg: Algorithm, key: &'static str },
	#[error("signature length {len} is invalid for {alg}, expected {expected}")]
	SignatureLength {
		alg: Algorithm,
		len: usize,
		expected: usize,
	},
	#[error("signature verification failed for {alg}")]
	Invalid { alg: Algorithm },
}

/// Verify `signature` over `message` with `key` under `alg`.
///
/// The caller has already passed the allow-list gate; this only checks the
/// key/algorithm pairing and the cryptographic validity of the signature.
pub fn verify(
	alg: Algorithm,
	key: &KeyMaterial,
	message: &[u8],
	signature: &[u8],
) -> Result<(), CryptoError> {
	match key {
		KeyMaterial::Rsa { n, e } => {
			let params = alg.rsa_params().ok_or(CryptoError::KeyMismatch {
				alg,
				key: key.type_name(),
			})?;
			RsaPublicKeyComponents { n, e }
				.verify(params, message, signature)
				.map_err(|_| CryptoError::Invalid { alg })
		},
		KeyMaterial::Ec { curve, point } => {
			let verifier = alg.ecdsa_params().ok_or(CryptoError::KeyMismatch {
				alg,
				key: key.type_name(),
			})?;
			let expected_curve = alg.ec_curve().expect("ECDSA algorithm always has a curve");
			if *curve != expected_curve {
				return Err(CryptoError::KeyMismatch {
					alg,
					key: curve.name(),
				});
			}
			let expected = curve.jose_signature_len();
			if signature.len() != expected {
				return Err(CryptoError::SignatureLength {
					alg,
					len: signature.len(),
					expected,
				});
			}
			UnparsedPublicKey::new(verifier, point)
				.verify(message, signature)
				.map_err(|_| CryptoError::Invalid { alg })
		},
	}
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
