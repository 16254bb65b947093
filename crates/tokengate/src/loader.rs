use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::RetryConfig;
use crate::discovery::{self, DiscoveryError};
use crate::events::SecurityEventCounter;
use crate::jwks::{JwksParseError, JwksSnapshot};

/// Where a provider's keys come from. Exactly one source per issuer,
/// validated at configuration time.
#[derive(Debug, Clone)]
pub enum SourceKind {
	/// JWKS JSON given directly in configuration.
	Inline(String),
	/// JWKS JSON on the local filesystem.
	File(PathBuf),
	/// A JWKS endpoint.
	Http(Url),
	/// An OpenID well-known document pointing at the JWKS endpoint.
	WellKnown(Url),
}

impl SourceKind {
	fn is_remote(&self) -> bool {
		matches!(self, SourceKind::Http(_) | SourceKind::WellKnown(_))
	}
}

/// Health of one JWKS source, published after the snapshot it refers to so a
/// reader never observes a status ahead of the keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
	/// No load finished yet.
	Undefined,
	Ok,
	Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadMode {
	/// Preserve ETag and snapshot; issue a conditional GET.
	Conditional,
	/// Drop ETag and snapshot; the response is authoritative.
	Forced,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
	#[error("failed to fetch JWKS: {0}")]
	Fetch(String),
	#[error(transparent)]
	Parse(#[from] JwksParseError),
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	#[error("JWKS source has no keys loaded")]
	Unavailable,
}

/// Result of one HTTP exchange against the JWKS endpoint, before the state
/// transition is applied.
enum HttpOutcome {
	Fresh { body: Vec<u8>, etag: Option<String> },
	NotModified,
}

struct FetchFailure {
	retryable: bool,
	message: String,
}

/// Loader-owned mutable state. Single-writer discipline: only the task
/// holding the lock mutates these fields; readers go through the atomics.
struct LoaderInner {
	etag: Option<String>,
	generation: u64,
	/// Discovery result, resolved once per provider lifetime.
	resolved_jwks_url: Option<Url>,
}

/// One JWKS source with cache-coherent concurrent access: readers take the
/// current snapshot through an atomic pointer, the loader publishes
/// successors under a mutex that doubles as the load-coalescing point.
pub struct JwksProvider {
	source: SourceKind,
	issuer: String,
	http: reqwest::Client,
	retry: RetryConfig,
	refresh_interval: Duration,
	events: Arc<SecurityEventCounter>,
	snapshot: ArcSwapOption<JwksSnapshot>,
	status: ArcSwap<LoaderStatus>,
	/// Completion time of the last successful exchange, readable without
	/// taking the loader lock so the staleness probe never serializes
	/// validations behind an in-flight load.
	last_load_at: ArcSwapOption<Instant>,
	inner: Mutex<LoaderInner>,
}

impl std::fmt::Debug for JwksProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JwksProvider")
			.field("issuer", &self.issuer)
			.field("source", &self.source)
			.field("status", &self.status())
			.finish_non_exhaustive()
	}
}

impl JwksProvider {
	pub fn new(
		issuer: String,
		source: SourceKind,
		http: reqwest::Client,
		retry: RetryConfig,
		refresh_interval: Duration,
		events: Arc<SecurityEventCounter>,
	) -> Self {
		Self {
			source,
			issuer,
			http,
			retry,
			refresh_interval,
			events,
			snapshot: ArcSwapOption::from(None),
			status: ArcSwap::from_pointee(LoaderStatus::Undefined),
			last_load_at: ArcSwapOption::from(None),
			inner: Mutex::new(LoaderInner {
				etag: None,
				generation: 0,
				resolved_jwks_url: None,
			}),
		}
	}

	pub fn status(&self) -> LoaderStatus {
		**self.status.load()
	}

	pub fn current(&self) -> Option<Arc<JwksSnapshot>> {
		self.snapshot.load_full()
	}

	pub fn is_remote(&self) -> bool {
		self.source.is_remote()
	}

	/// Return a usable snapshot, loading it first if none exists yet and
	/// refreshing it lazily once it is older than the refresh interval.
	/// Concurrent callers coalesce: whoever acquires the lock first performs
	/// the load, everyone else observes the published successor.
	pub async fn ensure(&self) -> Result<Arc<JwksSnapshot>, LoadError> {
		if let Some(snapshot) = self.current()
			&& !self.is_stale()
		{
			return Ok(snapshot);
		}
		let mut inner = self.inner.lock().await;
		// re-check under the lock: a coalesced load may have finished while
		// this task waited
		if let Some(snapshot) = self.current()
			&& !self.is_stale()
		{
			return Ok(snapshot);
		}
		let had_snapshot = self.current();
		match self.load_locked(&mut inner, ReloadMode::Conditional).await {
			Ok(snapshot) => Ok(snapshot),
			Err(e) => match had_snapshot {
				// refresh failed but the previous keys are still servable
				Some(stale_snapshot) => {
					warn!(issuer = %self.issuer, error = %e, "JWKS refresh failed, serving previous snapshot");
					Ok(stale_snapshot)
				},
				None => Err(e),
			},
		}
	}

	/// Reload after a key-selection miss against a stale snapshot; callers
	/// gate on [`JwksProvider::is_stale`] first. At most one fetch happens
	/// per rotation: if the generation advanced past what the caller
	/// observed, another task already rotated the snapshot and that
	/// successor is returned as-is.
	pub async fn reload_for_miss(&self, observed_generation: u64) -> Result<Arc<JwksSnapshot>, LoadError> {
		let mut inner = self.inner.lock().await;
		if let Some(snapshot) = self.current()
			&& snapshot.generation > observed_generation
		{
			return Ok(snapshot);
		}
		self.load_locked(&mut inner, ReloadMode::Conditional).await
	}

	/// Cache-clearing reload: the ETag and the published snapshot are
	/// dropped before the fetch, so the response is authoritative.
	pub async fn force_reload(&self) -> Result<Arc<JwksSnapshot>, LoadError> {
		let mut inner = self.inner.lock().await;
		self.load_locked(&mut inner, ReloadMode::Forced).await
	}

	/// Whether the current snapshot has outlived the refresh interval.
	/// Lock-free; this is the gate for both the lazy refresh on access and
	/// the key-selection-miss reload.
	pub fn is_stale(&self) -> bool {
		match self.last_load_at.load_full() {
			Some(at) => at.elapsed() >= self.refresh_interval,
			// inline snapshots are installed without a load timestamp and
			// never go stale
			None => false,
		}
	}

	async fn load_locked(
		&self,
		inner: &mut LoaderInner,
		mode: ReloadMode,
	) -> Result<Arc<JwksSnapshot>, LoadError> {
		if mode == ReloadMode::Forced {
			inner.etag = None;
			self.snapshot.store(None);
		}
		let (body, new_etag) = match &self.source {
			SourceKind::Inline(content) => {
				// inline content never changes after construction
				if let Some(existing) = self.current() {
					return Ok(existing);
				}
				(content.clone().into_bytes(), None)
			},
			SourceKind::File(path) => {
				let bytes = fs_err::tokio::read(path)
					.await
					.map_err(|e| self.fail(LoadError::Fetch(e.to_string())))?;
				(bytes, None)
			},
			SourceKind::Http(url) => {
				let url = url.clone();
				match self.fetch_with_retry(&url, inner.etag.as_deref()).await {
					Ok(HttpOutcome::Fresh { body, etag }) => (body, etag),
					Ok(HttpOutcome::NotModified) => return self.handle_not_modified(inner),
					Err(failure) => {
						return Err(self.fail(LoadError::Fetch(failure.message)));
					},
				}
			},
			SourceKind::WellKnown(well_known) => {
				let jwks_url = match &inner.resolved_jwks_url {
					Some(url) => url.clone(),
					None => {
						let document = discovery::discover(&self.http, well_known)
							.await
							.map_err(|e| self.fail(LoadError::Discovery(e)))?;
						inner.resolved_jwks_url = Some(document.jwks_uri.clone());
						document.jwks_uri
					},
				};
				match self.fetch_with_retry(&jwks_url, inner.etag.as_deref()).await {
					Ok(HttpOutcome::Fresh { body, etag }) => (body, etag),
					Ok(HttpOutcome::NotModified) => return self.handle_not_modified(inner),
					Err(failure) => {
						return Err(self.fail(LoadError::Fetch(failure.message)));
					},
				}
			},
		};
		let generation = inner.generation + 1;
		let snapshot = JwksSnapshot::parse(&body, new_etag.clone(), generation, &self.events)
			.map_err(|e| self.fail(LoadError::Parse(e)))?;
		// commit loader state only for a snapshot that actually parsed
		inner.etag = new_etag;
		inner.generation = generation;
		self.last_load_at.store(Some(Arc::new(Instant::now())));
		let snapshot = Arc::new(snapshot);
		// snapshot first, status second: a reader that sees OK also sees the keys
		self.snapshot.store(Some(snapshot.clone()));
		self.status.store(Arc::new(LoaderStatus::Ok));
		debug!(
			issuer = %self.issuer,
			generation,
			keys = snapshot.keys().len(),
			"published JWKS snapshot"
		);
		Ok(snapshot)
	}

	fn handle_not_modified(&self, _inner: &mut LoaderInner) -> Result<Arc<JwksSnapshot>, LoadError> {
		self.last_load_at.store(Some(Arc::new(Instant::now())));
		match self.current() {
			Some(snapshot) => {
				self.status.store(Arc::new(LoaderStatus::Ok));
				Ok(snapshot)
			},
			// 304 without a cached snapshot: the server honored an ETag we no
			// longer hold state for
			None => Err(self.fail(LoadError::Unavailable)),
		}
	}

	fn fail(&self, error: LoadError) -> LoadError {
		self.status.store(Arc::new(LoaderStatus::Error));
		error
	}

	async fn fetch_with_retry(
		&self,
		url: &Url,
		etag: Option<&str>,
	) -> Result<HttpOutcome, FetchFailure> {
		let mut attempt = 1u32;
		loop {
			match self.fetch_once(url, etag).await {
				Ok(outcome) => return Ok(outcome),
				Err(failure) if !failure.retryable => return Err(failure),
				Err(failure) if attempt >= self.retry.max_attempts => return Err(failure),
				Err(failure) => {
					let delay = self.retry.delay_for_attempt(attempt);
					debug!(
						issuer = %self.issuer,
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %failure.message,
						"retryable JWKS fetch failure, backing off"
					);
					tokio::time::sleep(delay).await;
					attempt += 1;
				},
			}
		}
	}

	async fn fetch_once(&self, url: &Url, etag: Option<&str>) -> Result<HttpOutcome, FetchFailure> {
		let mut request = self.http.get(url.clone());
		if let Some(etag) = etag {
			request = request.header(IF_NONE_MATCH, etag);
		}
		let response = request.send().await.map_err(|e| FetchFailure {
			// connection errors and timeouts are worth retrying
			retryable: true,
			message: e.to_string(),
		})?;
		let status = response.status();
		if status == StatusCode::NOT_MODIFIED {
			return Ok(HttpOutcome::NotModified);
		}
		if status.is_server_error() {
			return Err(FetchFailure {
				retryable: true,
				message: format!("{status} from {url}"),
			});
		}
		if !status.is_success() {
			return Err(FetchFailure {
				retryable: false,
				message: format!("{status} from {url}"),
			});
		}
		let etag = response
			.headers()
			.get(ETAG)
			.and_then(|v| v.to_str().ok())
			.map(|v| v.to_string());
		let body = response.bytes().await.map_err(|e| FetchFailure {
			retryable: true,
			message: e.to_string(),
		})?;
		Ok(HttpOutcome::Fresh {
			body: body.to_vec(),
			etag,
		})
	}
}

impl JwksProvider {
	/// Install a pre-parsed snapshot, used for inline sources at
	/// construction time.
	pub(crate) fn install(&self, snapshot: JwksSnapshot) {
		self.snapshot.store(Some(Arc::new(snapshot)));
		self.status.store(Arc::new(LoaderStatus::Ok));
	}
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
