use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{debug, warn};

use crate::crypto::{Algorithm, EcCurve, KeyMaterial};
use crate::events::{EventType, SecurityEventCounter};

/// One usable verification key out of a JWKS document.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInfo {
	pub kid: Option<String>,
	/// The `alg` the JWKS pinned this key to, when present.
	pub alg: Option<Algorithm>,
	pub material: KeyMaterial,
}

/// Immutable view of a JWKS source at one point in time. Rotation replaces
/// the whole snapshot; a snapshot is never mutated after construction.
#[derive(Debug)]
pub struct JwksSnapshot {
	keys: Vec<KeyInfo>,
	by_kid: HashMap<String, usize>,
	pub etag: Option<String>,
	/// Monotonic per-source counter, bumped on every replacement.
	pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JWKS document: {0}")]
pub struct JwksParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
	#[error("no key with kid {0:?}")]
	NoKeyForKid(String),
	#[error("no unambiguous key for {alg}: {candidates} candidates and no kid")]
	Ambiguous { alg: Algorithm, candidates: usize },
}

// RFC 7517 key object; unknown members are ignored.
#[derive(Debug, serde::Deserialize)]
struct JwkEntry {
	#[serde(default)]
	kty: Option<String>,
	#[serde(default)]
	kid: Option<String>,
	#[serde(default, rename = "use")]
	key_use: Option<String>,
	#[serde(default)]
	alg: Option<String>,
	#[serde(default)]
	n: Option<String>,
	#[serde(default)]
	e: Option<String>,
	#[serde(default)]
	crv: Option<String>,
	#[serde(default)]
	x: Option<String>,
	#[serde(default)]
	y: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct JwksDoc {
	#[serde(default)]
	keys: Vec<JwkEntry>,
}

impl JwksSnapshot {
	/// Parse a JWKS JSON document. Unusable key objects (wrong `use`,
	/// unsupported `kty`/`alg`, missing or undecodable parameters) are
	/// dropped with a counted event; only a structurally invalid document is
	/// an error.
	pub fn parse(
		body: &[u8],
		etag: Option<String>,
		generation: u64,
		events: &SecurityEventCounter,
	) -> Result<JwksSnapshot, JwksParseError> {
		let doc: JwksDoc =
			serde_json::from_slice(body).map_err(|e| JwksParseError(e.to_string()))?;
		let mut keys: Vec<KeyInfo> = Vec::with_capacity(doc.keys.len());
		let mut by_kid = HashMap::new();
		for entry in doc.keys {
			let info = match build_key(&entry) {
				Ok(info) => info,
				Err(reason) => {
					events.increment(EventType::JwksKeyDropped);
					warn!(
						kid = ?entry.kid,
						kty = ?entry.kty,
						alg = ?entry.alg,
						reason,
						"dropping unusable JWKS key; tokens signed by it will not be accepted"
					);
					continue;
				},
			};
			if let Some(kid) = &info.kid {
				// first occurrence wins on duplicate kid
				if by_kid.contains_key(kid) {
					events.increment(EventType::DuplicateKeyId);
					debug!(%kid, "duplicate kid in JWKS, keeping first occurrence");
					continue;
				}
				by_kid.insert(kid.clone(), keys.len());
			}
			keys.push(info);
		}
		Ok(JwksSnapshot {
			keys,
			by_kid,
			etag,
			generation,
		})
	}

	pub fn keys(&self) -> &[KeyInfo] {
		&self.keys
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	pub fn kids(&self) -> impl Iterator<Item = &str> {
		self.keys.iter().filter_map(|k| k.kid.as_deref())
	}

	/// Key selection, given the header's `kid` and resolved algorithm:
	/// an explicit `kid` must match exactly; otherwise a unique key of the
	/// matching type, then a unique key overall, is accepted. Everything
	/// else, the empty key set included, is ambiguous.
	pub fn select(&self, kid: Option<&str>, alg: Algorithm) -> Result<&KeyInfo, SelectionError> {
		if let Some(kid) = kid {
			return match self.by_kid.get(kid) {
				Some(index) => Ok(&self.keys[*index]),
				None => Err(SelectionError::NoKeyForKid(kid.to_owned())),
			};
		}
		let mut matching = self
			.keys
			.iter()
			.filter(|k| k.material.key_type() == alg.key_type());
		if let (Some(only), None) = (matching.next(), matching.next()) {
			return Ok(only);
		}
		if self.keys.len() == 1 {
			return Ok(&self.keys[0]);
		}
		Err(SelectionError::Ambiguous {
			alg,
			candidates: self.keys.len(),
		})
	}
}

fn build_key(entry: &JwkEntry) -> Result<KeyInfo, &'static str> {
	if let Some(key_use) = &entry.key_use
		&& key_use != "sig"
	{
		return Err("key use is not sig");
	}
	let alg = match &entry.alg {
		None => None,
		Some(raw) => match raw.parse::<Algorithm>() {
			Ok(alg) => Some(alg),
			Err(()) => return Err("unsupported algorithm"),
		},
	};
	let material = match entry.kty.as_deref() {
		Some("RSA") => {
			let n = decode_param(entry.n.as_deref()).ok_or("missing or invalid n")?;
			let e = decode_param(entry.e.as_deref()).ok_or("missing or invalid e")?;
			KeyMaterial::Rsa { n, e }
		},
		Some("EC") => {
			let curve: EcCurve = entry
				.crv
				.as_deref()
				.and_then(|c| c.parse().ok())
				.ok_or("missing or unsupported crv")?;
			let x = decode_param(entry.x.as_deref()).ok_or("missing or invalid x")?;
			let y = decode_param(entry.y.as_deref()).ok_or("missing or invalid y")?;
			let point = uncompressed_point(curve, &x, &y).ok_or("coordinate length mismatch")?;
			KeyMaterial::Ec { curve, point }
		},
		Some(_) => return Err("unsupported kty"),
		None => return Err("missing kty"),
	};
	if let Some(alg) = alg
		&& alg.key_type() != material.key_type()
	{
		return Err("alg does not match kty");
	}
	Ok(KeyInfo {
		kid: entry.kid.clone(),
		alg,
		material,
	})
}

fn decode_param(param: Option<&str>) -> Option<Vec<u8>> {
	URL_SAFE_NO_PAD.decode(param?.as_bytes()).ok()
}

/// SEC1 uncompressed point. Coordinates shorter than the field size are
/// left-padded; longer ones are rejected.
fn uncompressed_point(curve: EcCurve, x: &[u8], y: &[u8]) -> Option<Vec<u8>> {
	let coord_len = match curve {
		EcCurve::P256 => 32,
		EcCurve::P384 => 48,
		EcCurve::P521 => 66,
	};
	if x.len() > coord_len || y.len() > coord_len {
		return None;
	}
	let mut point = Vec::with_capacity(1 + 2 * coord_len);
	point.push(0x04);
	point.extend(std::iter::repeat_n(0u8, coord_len - x.len()));
	point.extend_from_slice(x);
	point.extend(std::iter::repeat_n(0u8, coord_len - y.len()));
	point.extend_from_slice(y);
	Some(point)
}

#[cfg(test)]
#[path = "jwks_tests.rs"]
mod tests;
