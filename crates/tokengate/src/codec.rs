use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::json::JsonObject;

/// The three compact-serialization segments of a token, still encoded, plus
/// the canonical signing input. All slices borrow from the original string so
/// the signing input is byte-for-byte what was signed, regardless of decoder
/// idiosyncrasies.
#[derive(Debug, Clone, Copy)]
pub struct RawJwt<'a> {
	pub header: &'a str,
	pub payload: &'a str,
	pub signature: &'a str,
	/// `segments[0] + "." + segments[1]`, taken from the original string.
	pub signing_input: &'a str,
}

/// A structurally decoded token, before any validation. The decoded maps
/// are derived from the segments but never replace them: `signing_input` is
/// byte-for-byte what was signed.
#[derive(Debug, Clone)]
pub struct DecodedJwt {
	pub header: JsonObject,
	pub payload: JsonObject,
	pub signature: Vec<u8>,
	pub signing_input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
	#[error("expected 3 segments, found {0}")]
	SegmentCount(usize),
	#[error("segment {0} is empty")]
	EmptySegment(usize),
	#[error("segment {index} is not valid base64url: {reason}")]
	Base64 { index: usize, reason: String },
}

/// Split a compact JWT into its three segments without decoding anything.
pub fn split(raw: &str) -> Result<RawJwt<'_>, CodecError> {
	let mut iter = raw.split('.');
	let header = iter.next().unwrap_or("");
	let payload = iter.next().ok_or(CodecError::SegmentCount(1))?;
	let signature = iter.next().ok_or(CodecError::SegmentCount(2))?;
	let extra = iter.count();
	if extra != 0 {
		return Err(CodecError::SegmentCount(3 + extra));
	}
	for (index, segment) in [header, payload, signature].into_iter().enumerate() {
		if segment.is_empty() {
			return Err(CodecError::EmptySegment(index));
		}
	}
	// signing input is the original prefix, not a re-encoding
	let signing_input = &raw[..header.len() + 1 + payload.len()];
	Ok(RawJwt {
		header,
		payload,
		signature,
		signing_input,
	})
}

/// Base64URL without padding (RFC 4648 §5). Rejects padded and non-URL-safe
/// input.
pub fn decode_segment(index: usize, segment: &str) -> Result<Vec<u8>, CodecError> {
	URL_SAFE_NO_PAD
		.decode(segment.as_bytes())
		.map_err(|e| CodecError::Base64 {
			index,
			reason: e.to_string(),
		})
}

pub fn encode_segment(bytes: &[u8]) -> String {
	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
