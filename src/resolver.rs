// src/resolver.rs

//! Proxy connector resolution engine
//!
//! The resolver is the single public entry point of this crate: given a
//! managed repository and an artifact coordinate, it walks the ordered
//! list of eligible proxy connectors, runs pre-download policies, drives
//! the injected transport, runs post-download policies against the
//! fetched bytes, and commits the artifact plus its side-cars through a
//! [`FileTransaction`]. Per-connector failures never abort the loop; they
//! are recorded and the next connector is tried.
//!
//! # Request lifecycle
//!
//! ```text
//! Pending -> { Found | Exhausted }
//! ```
//!
//! `Found` returns the committed local file; `Exhausted` returns
//! [`Error::NotFound`] carrying one record per attempted connector.

use crate::checksum::ChecksumAlgorithm;
use crate::config::{Configuration, ConfigurationProvider, ManagedRepository, ProxyConnector};
use crate::coordinate::ArtifactCoordinate;
use crate::error::{Error, Result};
use crate::failure_cache::UrlFailureCache;
use crate::layout::{Maven2Layout, RepositoryLayout};
use crate::policy::{PhaseResult, PolicyContext, PolicyPhase, PolicyRegistry};
use crate::transaction::FileTransaction;
use crate::transport::{DEFAULT_TIMEOUT, FetchRequest, Transport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Side-car extensions fetched next to an artifact after a successful
/// transfer: remote checksums for the checksum policy, plus a detached
/// signature the transaction carries into the repository.
const FETCHED_SIDECARS: [&str; 3] = ["sha1", "md5", "asc"];

/// Phase of a connector attempt, for observability events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    PreDownload,
    Transfer,
    PostDownload,
    Commit,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreDownload => write!(f, "pre-download"),
            Self::Transfer => write!(f, "transfer"),
            Self::PostDownload => write!(f, "post-download"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Outcome of a connector attempt (or of one of its phases)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The connector is about to be tried
    Attempted,
    /// A policy denied the attempt
    Denied,
    /// The transport failed (network error, 404, timeout)
    TransportFailed,
    /// The transaction commit failed and was rolled back
    CommitFailed,
    /// The connector is misconfigured (dangling remote or proxy id)
    Misconfigured,
    /// The artifact was committed into the managed repository
    Committed,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attempted => write!(f, "attempted"),
            Self::Denied => write!(f, "denied-by-policy"),
            Self::TransportFailed => write!(f, "transport-failed"),
            Self::CommitFailed => write!(f, "commit-failed"),
            Self::Misconfigured => write!(f, "misconfigured"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

/// Structured event emitted for every connector attempt phase
#[derive(Debug, Clone)]
pub struct ConnectorEvent {
    pub connector_id: String,
    pub phase: AttemptPhase,
    pub outcome: AttemptOutcome,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Collaborator receiving connector attempt events
pub trait ResolutionObserver: Send + Sync {
    fn on_event(&self, event: &ConnectorEvent);
}

/// Default observer forwarding events to tracing
pub struct TracingObserver;

impl ResolutionObserver for TracingObserver {
    fn on_event(&self, event: &ConnectorEvent) {
        info!(
            connector = %event.connector_id,
            phase = %event.phase,
            outcome = %event.outcome,
            reason = event.reason.as_deref().unwrap_or(""),
            "connector attempt"
        );
    }
}

/// Observer collecting events in memory, for tests and diagnostics
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ConnectorEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConnectorEvent> {
        self.events.lock().clone()
    }
}

impl ResolutionObserver for CollectingObserver {
    fn on_event(&self, event: &ConnectorEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Terminal record of one connector attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub connector_id: String,
    pub outcome: AttemptOutcome,
    pub reason: String,
}

/// Diagnostic payload of [`Error::NotFound`]
///
/// Lists every connector tried and why it did not produce the artifact.
/// Reasons carry URLs but never credentials.
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    pub repository_id: String,
    pub path: String,
    pub attempts: Vec<AttemptRecord>,
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "artifact '{}' not found in repository '{}'",
            self.path, self.repository_id
        )?;
        if self.attempts.is_empty() {
            return write!(f, " (no eligible proxy connectors)");
        }
        write!(f, " after {} connector attempt(s):", self.attempts.len())?;
        for attempt in &self.attempts {
            write!(
                f,
                " [{}: {}: {}]",
                attempt.connector_id, attempt.outcome, attempt.reason
            )?;
        }
        Ok(())
    }
}

/// Per-(repository, destination path) commit locks
///
/// Serializes the final commit so two concurrent resolutions of the same
/// artifact cannot interleave their writes; the second acquirer re-checks
/// the destination and reuses the first's committed result.
struct PathLocks {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, repository_id: &str, path: &str) -> Arc<Mutex<()>> {
        let key = (repository_id.to_string(), path.to_string());
        Arc::clone(self.locks.lock().entry(key).or_default())
    }
}

/// Internal result of a single connector attempt
enum ConnectorResult {
    Resolved(PathBuf),
    Skipped(AttemptRecord),
}

/// The resolution engine
pub struct ProxyResolver {
    provider: Arc<dyn ConfigurationProvider>,
    transport: Arc<dyn Transport>,
    layout: Arc<dyn RepositoryLayout>,
    failure_cache: Arc<UrlFailureCache>,
    policies: PolicyRegistry,
    observers: Vec<Arc<dyn ResolutionObserver>>,
    commit_locks: PathLocks,
}

impl ProxyResolver {
    /// Create a resolver with the standard policy set, the Maven 2
    /// layout, a fresh failure cache, and a tracing observer
    pub fn new(provider: Arc<dyn ConfigurationProvider>, transport: Arc<dyn Transport>) -> Self {
        let failure_cache = Arc::new(UrlFailureCache::new());
        Self {
            provider,
            transport,
            layout: Arc::new(Maven2Layout),
            policies: PolicyRegistry::standard(Arc::clone(&failure_cache)),
            failure_cache,
            observers: vec![Arc::new(TracingObserver)],
            commit_locks: PathLocks::new(),
        }
    }

    /// Replace the layout implementation
    pub fn with_layout(mut self, layout: Arc<dyn RepositoryLayout>) -> Self {
        self.layout = layout;
        self
    }

    /// Share an externally owned failure cache
    ///
    /// Rebuilds the standard policy registry around the new cache, so any
    /// custom policies must be added afterwards.
    pub fn with_failure_cache(mut self, cache: Arc<UrlFailureCache>) -> Self {
        self.policies = PolicyRegistry::standard(Arc::clone(&cache));
        self.failure_cache = cache;
        self
    }

    /// Replace the policy registry
    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Append an observer for connector attempt events
    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn failure_cache(&self) -> &Arc<UrlFailureCache> {
        &self.failure_cache
    }

    fn emit(
        &self,
        connector_id: &str,
        phase: AttemptPhase,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) {
        let event = ConnectorEvent {
            connector_id: connector_id.to_string(),
            phase,
            outcome,
            reason,
            at: Utc::now(),
        };
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    /// Resolve an artifact by coordinate
    ///
    /// The single public entry point consumed by front ends. Computes the
    /// layout path and delegates to [`ProxyResolver::resolve_path`].
    pub fn resolve(
        &self,
        managed_repo_id: &str,
        coordinate: &ArtifactCoordinate,
    ) -> Result<PathBuf> {
        let path = self.layout.artifact_path(coordinate);
        self.resolve_path(managed_repo_id, coordinate, &path)
    }

    /// Resolve a repository path for a coordinate
    ///
    /// Returns the local file inside the managed repository, fetching it
    /// through the configured proxy connectors when missing.
    pub fn resolve_path(
        &self,
        managed_repo_id: &str,
        coordinate: &ArtifactCoordinate,
        path: &str,
    ) -> Result<PathBuf> {
        // Configuration may change at runtime; re-read on every request.
        let config = self.provider.snapshot()?;
        let managed = config
            .managed(managed_repo_id)
            .ok_or_else(|| Error::UnknownRepository(managed_repo_id.to_string()))?
            .clone();

        let destination = managed.root.join(path.trim_start_matches('/'));
        if destination.exists() {
            debug!("local hit for {} in '{}'", path, managed_repo_id);
            return Ok(destination);
        }

        let connectors = config.connectors_for(managed_repo_id, path);
        debug!(
            "resolving {} in '{}' via {} eligible connector(s)",
            path,
            managed_repo_id,
            connectors.len()
        );

        let mut attempts = Vec::new();
        for connector in &connectors {
            match self.try_connector(&config, &managed, connector, coordinate, path, &destination)?
            {
                ConnectorResult::Resolved(file) => return Ok(file),
                ConnectorResult::Skipped(record) => attempts.push(record),
            }
        }

        Err(Error::NotFound(ResolutionReport {
            repository_id: managed_repo_id.to_string(),
            path: path.to_string(),
            attempts,
        }))
    }

    /// Attempt a single connector
    ///
    /// `Err` is reserved for fatal conditions (a failed rollback or a
    /// broken local environment); everything connector-scoped comes back
    /// as `ConnectorResult::Skipped`.
    fn try_connector(
        &self,
        config: &Configuration,
        managed: &ManagedRepository,
        connector: &ProxyConnector,
        coordinate: &ArtifactCoordinate,
        path: &str,
        destination: &std::path::Path,
    ) -> Result<ConnectorResult> {
        let connector_id = connector.id();
        let skipped = |outcome: AttemptOutcome, reason: String| {
            ConnectorResult::Skipped(AttemptRecord {
                connector_id: connector_id.clone(),
                outcome,
                reason,
            })
        };

        let Some(remote) = config.remote(&connector.target_repo_id) else {
            let reason = format!(
                "target remote repository '{}' is not configured",
                connector.target_repo_id
            );
            self.emit(
                &connector_id,
                AttemptPhase::PreDownload,
                AttemptOutcome::Misconfigured,
                Some(reason.clone()),
            );
            return Ok(skipped(AttemptOutcome::Misconfigured, reason));
        };

        let proxy = match connector.proxy_id.as_deref() {
            Some(proxy_id) => match config.proxy(proxy_id) {
                Some(proxy) => Some(proxy),
                None => {
                    let reason = format!("network proxy '{}' is not configured", proxy_id);
                    self.emit(
                        &connector_id,
                        AttemptPhase::PreDownload,
                        AttemptOutcome::Misconfigured,
                        Some(reason.clone()),
                    );
                    return Ok(skipped(AttemptOutcome::Misconfigured, reason));
                }
            },
            None => None,
        };

        let url = remote.artifact_url(path);
        let ctx = PolicyContext {
            url: &url,
            coordinate,
        };

        self.emit(
            &connector_id,
            AttemptPhase::PreDownload,
            AttemptOutcome::Attempted,
            None,
        );

        // Pre-download policy phase: no network traffic before this.
        if let PhaseResult::Denied { policy_id, reason } =
            self.policies
                .evaluate(PolicyPhase::PreDownload, &connector.policies, &ctx, None)
        {
            let reason = format!("denied by policy '{}': {}", policy_id, reason);
            self.emit(
                &connector_id,
                AttemptPhase::PreDownload,
                AttemptOutcome::Denied,
                Some(reason.clone()),
            );
            return Ok(skipped(AttemptOutcome::Denied, reason));
        }

        // Transfer into per-attempt staging; dropped on any skip.
        let staging = tempfile::tempdir()?;
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let temp_artifact = staging.path().join(file_name);
        let timeout = remote
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let request = FetchRequest {
            url: url.clone(),
            proxy,
            credentials: remote.credentials.as_ref(),
            timeout,
        };

        match self.transport.fetch(&request, &temp_artifact) {
            Ok(bytes) => {
                debug!("transferred {} bytes from {}", bytes, url);
            }
            Err(e) => {
                self.failure_cache.record_failure(&url);
                let reason = e.to_string();
                self.emit(
                    &connector_id,
                    AttemptPhase::Transfer,
                    AttemptOutcome::TransportFailed,
                    Some(reason.clone()),
                );
                return Ok(skipped(AttemptOutcome::TransportFailed, reason));
            }
        }
        self.failure_cache.clear_failure(&url);

        // Companion side-cars: remote checksums for the checksum policy
        // and a detached signature for the commit. Absence is fine.
        for ext in FETCHED_SIDECARS {
            let sidecar_request = FetchRequest {
                url: format!("{}.{}", url, ext),
                proxy,
                credentials: remote.credentials.as_ref(),
                timeout,
            };
            let sidecar_dest = staging.path().join(format!("{}.{}", file_name, ext));
            match self.transport.fetch_optional(&sidecar_request, &sidecar_dest) {
                Ok(Some(_)) => debug!("fetched side-car {}", sidecar_request.url),
                Ok(None) => {}
                Err(e) => warn!("side-car fetch {} failed: {}", sidecar_request.url, e),
            }
        }

        // Post-download policy phase against the fetched bytes.
        if let PhaseResult::Denied { policy_id, reason } = self.policies.evaluate(
            PolicyPhase::PostDownload,
            &connector.policies,
            &ctx,
            Some(&temp_artifact),
        ) {
            let reason = format!("denied by policy '{}': {}", policy_id, reason);
            self.emit(
                &connector_id,
                AttemptPhase::PostDownload,
                AttemptOutcome::Denied,
                Some(reason.clone()),
            );
            return Ok(skipped(AttemptOutcome::Denied, reason));
        }

        // Serialize the final commit per destination; a concurrent
        // resolver that lost the race reuses the committed result.
        let lock = self.commit_locks.get(&managed.id, path);
        let _guard = lock.lock();
        if destination.exists() {
            info!(
                "reusing concurrently committed {} in '{}'",
                path, managed.id
            );
            self.emit(
                &connector_id,
                AttemptPhase::Commit,
                AttemptOutcome::Committed,
                Some("reused concurrent commit".to_string()),
            );
            return Ok(ConnectorResult::Resolved(destination.to_path_buf()));
        }

        let mut txn = FileTransaction::new()?;
        txn.add_copy(
            &temp_artifact,
            destination,
            &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5],
        )?;

        match txn.commit() {
            Ok(()) => {
                info!(
                    "committed {} into '{}' from connector {}",
                    path, managed.id, connector_id
                );
                self.emit(
                    &connector_id,
                    AttemptPhase::Commit,
                    AttemptOutcome::Committed,
                    None,
                );
                Ok(ConnectorResult::Resolved(destination.to_path_buf()))
            }
            Err(e @ Error::Rollback { .. }) => {
                // The repository tree may be inconsistent; do not try
                // further connectors.
                self.emit(
                    &connector_id,
                    AttemptPhase::Commit,
                    AttemptOutcome::CommitFailed,
                    Some(e.to_string()),
                );
                Err(e)
            }
            Err(e) => {
                let reason = e.to_string();
                self.emit(
                    &connector_id,
                    AttemptPhase::Commit,
                    AttemptOutcome::CommitFailed,
                    Some(reason.clone()),
                );
                Ok(skipped(AttemptOutcome::CommitFailed, reason))
            }
        }
    }
}
