use tracing::debug;
use url::Url;

/// The two members of the well-known document this library consumes; the
/// rest of the metadata is ignored.
#[derive(Debug, Clone)]
pub struct DiscoveryDocument {
	pub issuer: String,
	pub jwks_uri: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
	#[error("failed to fetch discovery document: {0}")]
	Fetch(String),
	#[error("invalid discovery document: {0}")]
	Parse(String),
	#[error("discovery document names issuer {issuer:?}, inconsistent with {well_known}")]
	IssuerMismatch { issuer: String, well_known: String },
}

#[derive(Debug, serde::Deserialize)]
struct RawDocument {
	issuer: String,
	jwks_uri: String,
}

/// Fetch the OpenID configuration and return its JWKS endpoint, after
/// checking the document's `issuer` is the one the well-known URL belongs
/// to. A document claiming a foreign issuer is rejected so a compromised or
/// misconfigured endpoint cannot redirect key resolution.
pub async fn discover(
	client: &reqwest::Client,
	well_known: &Url,
) -> Result<DiscoveryDocument, DiscoveryError> {
	let response = client
		.get(well_known.clone())
		.send()
		.await
		.map_err(|e| DiscoveryError::Fetch(e.to_string()))?;
	let status = response.status();
	if !status.is_success() {
		return Err(DiscoveryError::Fetch(format!("{status} from {well_known}")));
	}
	let body = response
		.bytes()
		.await
		.map_err(|e| DiscoveryError::Fetch(e.to_string()))?;
	let raw: RawDocument =
		serde_json::from_slice(&body).map_err(|e| DiscoveryError::Parse(e.to_string()))?;
	let issuer_url = Url::parse(&raw.issuer)
		.map_err(|e| DiscoveryError::Parse(format!("issuer is not a URL: {e}")))?;
	if !issuer_consistent(well_known, &issuer_url) {
		return Err(DiscoveryError::IssuerMismatch {
			issuer: raw.issuer,
			well_known: well_known.to_string(),
		});
	}
	let jwks_uri = Url::parse(&raw.jwks_uri)
		.map_err(|e| DiscoveryError::Parse(format!("jwks_uri is not a URL: {e}")))?;
	debug!(issuer = %raw.issuer, jwks_uri = %jwks_uri, "resolved JWKS endpoint via discovery");
	Ok(DiscoveryDocument {
		issuer: raw.issuer,
		jwks_uri,
	})
}

/// The OpenID Connect consistency rule: same scheme, host, and port, and the
/// well-known path is the issuer path with `/.well-known/openid-configuration`
/// appended (directly under the root when the issuer has no path).
pub fn issuer_consistent(well_known: &Url, issuer: &Url) -> bool {
	if well_known.scheme() != issuer.scheme()
		|| well_known.host_str() != issuer.host_str()
		|| well_known.port_or_known_default() != issuer.port_or_known_default()
	{
		return false;
	}
	let issuer_path = match issuer.path() {
		"/" => "",
		p => p.trim_end_matches('/'),
	};
	let expected = format!("{issuer_path}/.well-known/openid-configuration");
	well_known.path() == expected
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
