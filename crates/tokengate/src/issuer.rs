use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::ValidatorConfig;
use crate::crypto::Algorithm;
use crate::error::ConfigError;
use crate::events::SecurityEventCounter;
use crate::jwks::JwksSnapshot;
use crate::loader::{JwksProvider, LoaderStatus, SourceKind};

/// Where an issuer's keys come from. At most one member may be set; exactly
/// one must be, checked at registry construction.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct JwksSourceConfig {
	/// JWKS JSON inline in the configuration.
	pub content: Option<String>,
	/// JWKS endpoint URL.
	pub url: Option<String>,
	/// OpenID well-known URL; the JWKS endpoint is discovered from it.
	pub well_known_url: Option<String>,
	/// Path to a JWKS file.
	pub file: Option<PathBuf>,
}

impl JwksSourceConfig {
	pub fn inline(content: impl Into<String>) -> Self {
		Self {
			content: Some(content.into()),
			..Default::default()
		}
	}

	pub fn url(url: impl Into<String>) -> Self {
		Self {
			url: Some(url.into()),
			..Default::default()
		}
	}

	pub fn well_known(url: impl Into<String>) -> Self {
		Self {
			well_known_url: Some(url.into()),
			..Default::default()
		}
	}

	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self {
			file: Some(path.into()),
			..Default::default()
		}
	}

	fn resolve(&self, issuer: &str) -> Result<SourceKind, ConfigError> {
		let mut sources = Vec::new();
		if let Some(content) = &self.content {
			sources.push(SourceKind::Inline(content.clone()));
		}
		if let Some(url) = &self.url {
			sources.push(SourceKind::Http(parse_url(issuer, url)?));
		}
		if let Some(url) = &self.well_known_url {
			sources.push(SourceKind::WellKnown(parse_url(issuer, url)?));
		}
		if let Some(path) = &self.file {
			sources.push(SourceKind::File(path.clone()));
		}
		match sources.len() {
			0 => Err(ConfigError::NoJwksSource {
				issuer: issuer.to_owned(),
			}),
			1 => Ok(sources.remove(0)),
			_ => Err(ConfigError::MultipleJwksSources {
				issuer: issuer.to_owned(),
			}),
		}
	}
}

fn parse_url(issuer: &str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
		issuer: issuer.to_owned(),
		url: raw.to_owned(),
		reason: e.to_string(),
	})
}

/// Per-issuer validation policy.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IssuerConfig {
	/// Matched against the token's `iss` claim.
	pub issuer: String,
	/// Expected audiences; empty disables the audience check.
	#[serde(default)]
	pub audiences: Vec<String>,
	/// Expected authorized party; tokens must carry a matching `azp` when
	/// set.
	#[serde(default)]
	pub client_id: Option<String>,
	/// Narrows the global algorithm allow-list for this issuer.
	#[serde(default)]
	pub algorithms: Option<Vec<Algorithm>>,
	/// Tolerate IDPs that omit `sub` from access tokens.
	#[serde(default)]
	pub subject_optional: bool,
	/// Override the global Keycloak roles-mapper toggle.
	#[serde(default)]
	pub keycloak_roles: Option<bool>,
	/// Override the global Keycloak groups-mapper toggle.
	#[serde(default)]
	pub keycloak_groups: Option<bool>,
	pub jwks: JwksSourceConfig,
}

impl IssuerConfig {
	pub fn new(issuer: impl Into<String>, jwks: JwksSourceConfig) -> Self {
		Self {
			issuer: issuer.into(),
			audiences: Vec::new(),
			client_id: None,
			algorithms: None,
			subject_optional: false,
			keycloak_roles: None,
			keycloak_groups: None,
			jwks,
		}
	}
}

/// A registered issuer with its policy resolved against the global config
/// and its JWKS provider attached.
#[derive(Debug)]
pub struct Issuer {
	pub config: IssuerConfig,
	/// Issuer allow-list intersected with the global one.
	pub algorithms: Vec<Algorithm>,
	pub map_roles: bool,
	pub map_groups: bool,
	pub provider: Arc<JwksProvider>,
}

/// Issuer-identifier -> issuer map, populated once at construction and
/// immutable afterwards. HTTP-backed providers load in the background; the
/// registry is usable before those loads complete.
#[derive(Debug)]
pub struct IssuerRegistry {
	issuers: HashMap<String, Arc<Issuer>>,
}

impl IssuerRegistry {
	pub fn new(
		config: &ValidatorConfig,
		issuer_configs: Vec<IssuerConfig>,
		events: Arc<SecurityEventCounter>,
	) -> Result<Self, ConfigError> {
		let http = reqwest::Client::builder()
			.connect_timeout(config.http.connect_timeout)
			.read_timeout(config.http.read_timeout)
			.build()
			.map_err(|e| ConfigError::HttpClient(e.to_string()))?;
		let mut issuers = HashMap::with_capacity(issuer_configs.len());
		for issuer_config in issuer_configs {
			let name = issuer_config.issuer.clone();
			if issuers.contains_key(&name) {
				return Err(ConfigError::DuplicateIssuer { issuer: name });
			}
			let algorithms: Vec<Algorithm> = match &issuer_config.algorithms {
				None => config.allowed_algorithms.clone(),
				Some(narrowed) => narrowed
					.iter()
					.filter(|a| config.allowed_algorithms.contains(a))
					.copied()
					.collect(),
			};
			if algorithms.is_empty() {
				return Err(ConfigError::EmptyAlgorithmAllowList { issuer: name });
			}
			let source = issuer_config.jwks.resolve(&name)?;
			let provider = Arc::new(JwksProvider::new(
				name.clone(),
				source,
				http.clone(),
				config.retry.clone(),
				config.http.refresh_interval,
				events.clone(),
			));
			// inline content must be valid up front; everything else loads
			// lazily or in the background
			if let Some(content) = &issuer_config.jwks.content {
				let snapshot = JwksSnapshot::parse(content.as_bytes(), None, 1, &events).map_err(
					|e| ConfigError::InvalidInlineJwks {
						issuer: name.clone(),
						reason: e.to_string(),
					},
				)?;
				provider.install(snapshot);
			}
			let issuer = Issuer {
				map_roles: issuer_config
					.keycloak_roles
					.unwrap_or(config.keycloak_default_roles_mapper),
				map_groups: issuer_config
					.keycloak_groups
					.unwrap_or(config.keycloak_default_groups_mapper),
				algorithms,
				config: issuer_config,
				provider,
			};
			issuers.insert(name, Arc::new(issuer));
		}
		Ok(Self { issuers })
	}

	pub fn resolve(&self, issuer: &str) -> Option<&Arc<Issuer>> {
		self.issuers.get(issuer)
	}

	pub fn issuers(&self) -> impl Iterator<Item = &Arc<Issuer>> {
		self.issuers.values()
	}

	/// Per-issuer loader health, for embedding health checks.
	pub fn status(&self, issuer: &str) -> Option<LoaderStatus> {
		self.issuers.get(issuer).map(|i| i.provider.status())
	}

	pub fn statuses(&self) -> HashMap<String, LoaderStatus> {
		self
			.issuers
			.iter()
			.map(|(name, issuer)| (name.clone(), issuer.provider.status()))
			.collect()
	}

	/// Kick off background loading for every provider that has I/O to do.
	/// Failures are logged and visible through [`IssuerRegistry::status`];
	/// they never abort the registry. Validations against an unready issuer
	/// coalesce with the load still in flight.
	pub fn spawn_background_loading(&self, startup_delay: Option<Duration>) {
		let pending: Vec<Arc<Issuer>> = self
			.issuers
			.values()
			.filter(|i| i.provider.current().is_none())
			.cloned()
			.collect();
		if pending.is_empty() {
			return;
		}
		tokio::spawn(async move {
			if let Some(delay) = startup_delay {
				debug!(delay_secs = delay.as_secs(), "delaying JWKS startup loading");
				tokio::time::sleep(delay).await;
			}
			for issuer in pending {
				match issuer.provider.ensure().await {
					Ok(snapshot) => info!(
						issuer = %issuer.config.issuer,
						keys = snapshot.keys().len(),
						"issuer keys loaded"
					),
					Err(e) => warn!(
						issuer = %issuer.config.issuer,
						error = %e,
						"background JWKS load failed; validations for this issuer will retry on demand"
					),
				}
			}
		});
	}
}

#[cfg(test)]
#[path = "issuer_tests.rs"]
mod tests;
