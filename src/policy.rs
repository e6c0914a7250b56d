// src/policy.rs

//! Pre/post-download policy pipeline
//!
//! Policies are pluggable rules evaluated around a remote fetch. Each
//! policy has a stable string id, a finite set of recognized option
//! values, and one configured option per connector. Denial is an expected
//! outcome of the resolution loop, so it is modeled as a result value
//! ([`PolicyDecision`]), never as an error.
//!
//! Per phase, policies run in fixed registration order and the first
//! denial aborts the phase. An option value a policy does not recognize
//! always denies.

use crate::checksum::{self, ChecksumAlgorithm};
use crate::coordinate::ArtifactCoordinate;
use crate::failure_cache::UrlFailureCache;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Option value shared by every policy: do not apply the policy
pub const OPTION_IGNORED: &str = "ignored";
/// `cache-failures`: consult the negative cache before fetching
pub const OPTION_CACHED: &str = "cached";
/// `checksum`: log verification failures but let the download proceed
pub const OPTION_WARN: &str = "warn";
/// `checksum`: verification failures deny the download
pub const OPTION_FAIL: &str = "fail";
/// Admission policies: unconditionally allow
pub const OPTION_ALWAYS: &str = "always";
/// Admission policies: unconditionally deny
pub const OPTION_NEVER: &str = "never";

/// When a policy runs relative to the network fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPhase {
    PreDownload,
    PostDownload,
}

impl fmt::Display for PolicyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreDownload => write!(f, "pre-download"),
            Self::PostDownload => write!(f, "post-download"),
        }
    }
}

/// Result of applying one policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
}

impl PolicyDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Request context a policy may consult
pub struct PolicyContext<'a> {
    /// Candidate URL of the fetch
    pub url: &'a str,
    /// Coordinate being resolved
    pub coordinate: &'a ArtifactCoordinate,
}

/// A pluggable download policy
pub trait DownloadPolicy: Send + Sync {
    /// Stable id used in connector configuration
    fn id(&self) -> &'static str;

    fn phase(&self) -> PolicyPhase;

    /// The recognized option values; anything else fails closed
    fn options(&self) -> &'static [&'static str];

    /// Option applied when a connector carries no assignment for this policy
    fn default_option(&self) -> &'static str;

    /// Apply the policy. `local_file` is the fetched temporary file for
    /// post-download policies and `None` before any transfer.
    fn apply(
        &self,
        option: &str,
        ctx: &PolicyContext<'_>,
        local_file: Option<&Path>,
    ) -> PolicyDecision;
}

/// Deny for an option value outside the policy's recognized set
fn unrecognized(policy_id: &str, option: &str) -> PolicyDecision {
    PolicyDecision::deny(format!(
        "unrecognized option '{}' for policy '{}'",
        option, policy_id
    ))
}

// =============================================================================
// Policy implementations
// =============================================================================

/// Pre-download policy consulting the URL failure cache
pub struct CachedFailuresPolicy {
    cache: Arc<UrlFailureCache>,
}

impl CachedFailuresPolicy {
    pub fn new(cache: Arc<UrlFailureCache>) -> Self {
        Self { cache }
    }
}

impl DownloadPolicy for CachedFailuresPolicy {
    fn id(&self) -> &'static str {
        "cache-failures"
    }

    fn phase(&self) -> PolicyPhase {
        PolicyPhase::PreDownload
    }

    fn options(&self) -> &'static [&'static str] {
        &[OPTION_IGNORED, OPTION_CACHED]
    }

    fn default_option(&self) -> &'static str {
        OPTION_CACHED
    }

    fn apply(
        &self,
        option: &str,
        ctx: &PolicyContext<'_>,
        _local_file: Option<&Path>,
    ) -> PolicyDecision {
        match option {
            OPTION_IGNORED => PolicyDecision::Allow,
            OPTION_CACHED => {
                if self.cache.has_failed(ctx.url) {
                    PolicyDecision::deny(format!(
                        "url {} failed recently and is still cached",
                        ctx.url
                    ))
                } else {
                    PolicyDecision::Allow
                }
            }
            other => unrecognized(self.id(), other),
        }
    }
}

/// Post-download policy verifying the fetched file against its side-cars
///
/// Verification prefers the SHA-1 side-car and falls back to MD5. Under
/// `fail`, a mismatch, a malformed side-car, or the absence of any
/// side-car denies the download; under `warn` the failure is logged and
/// the download proceeds.
pub struct ChecksumPolicy;

enum ChecksumCheck {
    Valid,
    Failed(String),
    NoSidecar,
}

impl ChecksumPolicy {
    fn check(file: &Path) -> ChecksumCheck {
        for algorithm in ChecksumAlgorithm::all() {
            match checksum::verify(file, algorithm) {
                Ok(outcome) if outcome.is_valid() => return ChecksumCheck::Valid,
                Ok(checksum::VerifyOutcome::MissingSidecar) => continue,
                Ok(outcome) => {
                    return ChecksumCheck::Failed(format!("{}: {}", algorithm, outcome.describe()));
                }
                Err(e) => return ChecksumCheck::Failed(e.to_string()),
            }
        }
        ChecksumCheck::NoSidecar
    }
}

impl DownloadPolicy for ChecksumPolicy {
    fn id(&self) -> &'static str {
        "checksum"
    }

    fn phase(&self) -> PolicyPhase {
        PolicyPhase::PostDownload
    }

    fn options(&self) -> &'static [&'static str] {
        &[OPTION_IGNORED, OPTION_WARN, OPTION_FAIL]
    }

    fn default_option(&self) -> &'static str {
        OPTION_FAIL
    }

    fn apply(
        &self,
        option: &str,
        ctx: &PolicyContext<'_>,
        local_file: Option<&Path>,
    ) -> PolicyDecision {
        if option == OPTION_IGNORED {
            return PolicyDecision::Allow;
        }
        if !matches!(option, OPTION_WARN | OPTION_FAIL) {
            return unrecognized(self.id(), option);
        }

        let Some(file) = local_file else {
            return PolicyDecision::deny("checksum policy requires a downloaded file");
        };

        let failure = match Self::check(file) {
            ChecksumCheck::Valid => return PolicyDecision::Allow,
            ChecksumCheck::Failed(detail) => detail,
            ChecksumCheck::NoSidecar => "no checksum side-car available".to_string(),
        };

        if option == OPTION_WARN {
            warn!("checksum verification failed for {}: {}", ctx.url, failure);
            PolicyDecision::Allow
        } else {
            PolicyDecision::deny(failure)
        }
    }
}

/// Admission policy constraining artifacts of one version class
///
/// The `releases` policy only constrains release versions and the
/// `snapshots` policy only snapshot versions; artifacts of the other
/// class pass through untouched.
pub struct VersionAdmissionPolicy {
    id: &'static str,
    constrains_snapshots: bool,
}

impl VersionAdmissionPolicy {
    pub fn releases() -> Self {
        Self {
            id: "releases",
            constrains_snapshots: false,
        }
    }

    pub fn snapshots() -> Self {
        Self {
            id: "snapshots",
            constrains_snapshots: true,
        }
    }
}

impl DownloadPolicy for VersionAdmissionPolicy {
    fn id(&self) -> &'static str {
        self.id
    }

    fn phase(&self) -> PolicyPhase {
        PolicyPhase::PostDownload
    }

    fn options(&self) -> &'static [&'static str] {
        &[OPTION_IGNORED, OPTION_ALWAYS, OPTION_NEVER]
    }

    fn default_option(&self) -> &'static str {
        OPTION_ALWAYS
    }

    fn apply(
        &self,
        option: &str,
        ctx: &PolicyContext<'_>,
        _local_file: Option<&Path>,
    ) -> PolicyDecision {
        if ctx.coordinate.is_snapshot() != self.constrains_snapshots {
            return PolicyDecision::Allow;
        }
        match option {
            OPTION_IGNORED | OPTION_ALWAYS => PolicyDecision::Allow,
            OPTION_NEVER => PolicyDecision::deny(format!(
                "{} versions are not admitted by this connector",
                ctx.coordinate.version_class()
            )),
            other => unrecognized(self.id(), other),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Outcome of evaluating one policy phase for a connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    Allowed,
    Denied { policy_id: String, reason: String },
}

/// Ordered set of policies, built explicitly at startup
///
/// Registration order is evaluation order within each phase.
pub struct PolicyRegistry {
    policies: Vec<Arc<dyn DownloadPolicy>>,
}

impl PolicyRegistry {
    /// Empty registry; prefer [`PolicyRegistry::standard`]
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// The canonical policy set: cache-failures, checksum, releases,
    /// snapshots
    pub fn standard(cache: Arc<UrlFailureCache>) -> Self {
        Self::new()
            .with_policy(Arc::new(CachedFailuresPolicy::new(cache)))
            .with_policy(Arc::new(ChecksumPolicy))
            .with_policy(Arc::new(VersionAdmissionPolicy::releases()))
            .with_policy(Arc::new(VersionAdmissionPolicy::snapshots()))
    }

    /// Append a policy; evaluation order follows registration order
    pub fn with_policy(mut self, policy: Arc<dyn DownloadPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policy(&self, id: &str) -> Option<&Arc<dyn DownloadPolicy>> {
        self.policies.iter().find(|p| p.id() == id)
    }

    /// Evaluate one phase for a connector's policy assignments
    ///
    /// The first denial aborts the phase; remaining policies do not run.
    /// A policy with no assignment uses its default option.
    pub fn evaluate(
        &self,
        phase: PolicyPhase,
        options: &BTreeMap<String, String>,
        ctx: &PolicyContext<'_>,
        local_file: Option<&Path>,
    ) -> PhaseResult {
        for policy in self.policies.iter().filter(|p| p.phase() == phase) {
            let option = options
                .get(policy.id())
                .map(String::as_str)
                .unwrap_or_else(|| policy.default_option());

            match policy.apply(option, ctx, local_file) {
                PolicyDecision::Allow => {
                    debug!("policy '{}' ({}) allowed {}", policy.id(), option, ctx.url);
                }
                PolicyDecision::Deny { reason } => {
                    debug!("policy '{}' ({}) denied {}: {}", policy.id(), option, ctx.url, reason);
                    return PhaseResult::Denied {
                        policy_id: policy.id().to_string(),
                        reason,
                    };
                }
            }
        }
        PhaseResult::Allowed
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn release_coord() -> ArtifactCoordinate {
        ArtifactCoordinate::new("org.example", "lib", "1.0", None, "jar").unwrap()
    }

    fn snapshot_coord() -> ArtifactCoordinate {
        ArtifactCoordinate::new("org.example", "lib", "1.0-SNAPSHOT", None, "jar").unwrap()
    }

    fn ctx<'a>(url: &'a str, coordinate: &'a ArtifactCoordinate) -> PolicyContext<'a> {
        PolicyContext { url, coordinate }
    }

    const URL: &str = "https://repo.example.com/org/example/lib/1.0/lib-1.0.jar";

    #[test]
    fn test_cache_failures_ignored_always_allows() {
        let cache = Arc::new(UrlFailureCache::new());
        cache.record_failure(URL);
        let policy = CachedFailuresPolicy::new(Arc::clone(&cache));
        let coordinate = release_coord();

        assert!(policy
            .apply(OPTION_IGNORED, &ctx(URL, &coordinate), None)
            .is_allow());
    }

    #[test]
    fn test_cache_failures_cached_denies_known_bad_url() {
        let cache = Arc::new(UrlFailureCache::new());
        let policy = CachedFailuresPolicy::new(Arc::clone(&cache));
        let coordinate = release_coord();

        assert!(policy
            .apply(OPTION_CACHED, &ctx(URL, &coordinate), None)
            .is_allow());

        cache.record_failure(URL);
        assert!(!policy
            .apply(OPTION_CACHED, &ctx(URL, &coordinate), None)
            .is_allow());
    }

    #[test]
    fn test_unknown_option_fails_closed() {
        let cache = Arc::new(UrlFailureCache::new());
        let coordinate = release_coord();
        let context = ctx(URL, &coordinate);

        let policies: Vec<Box<dyn DownloadPolicy>> = vec![
            Box::new(CachedFailuresPolicy::new(cache)),
            Box::new(ChecksumPolicy),
            Box::new(VersionAdmissionPolicy::releases()),
            Box::new(VersionAdmissionPolicy::snapshots()),
        ];

        for policy in &policies {
            let decision = policy.apply("whatever", &context, None);
            assert!(
                !decision.is_allow(),
                "policy '{}' allowed an unrecognized option",
                policy.id()
            );
        }
    }

    #[test]
    fn test_checksum_fail_with_valid_sidecar() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"artifact bytes").unwrap();
        let digest = checksum::compute(&file, ChecksumAlgorithm::Sha1).unwrap();
        checksum::write_sidecar(&file, &digest).unwrap();

        let coordinate = release_coord();
        let decision = ChecksumPolicy.apply(OPTION_FAIL, &ctx(URL, &coordinate), Some(&file));
        assert!(decision.is_allow());
    }

    #[test]
    fn test_checksum_fail_denies_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"artifact bytes").unwrap();
        fs::write(
            checksum::sidecar_path(&file, ChecksumAlgorithm::Sha1),
            format!("{}\n", "0".repeat(40)),
        )
        .unwrap();

        let coordinate = release_coord();
        let decision = ChecksumPolicy.apply(OPTION_FAIL, &ctx(URL, &coordinate), Some(&file));
        assert!(!decision.is_allow());
    }

    #[test]
    fn test_checksum_warn_allows_mismatch() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"artifact bytes").unwrap();
        fs::write(
            checksum::sidecar_path(&file, ChecksumAlgorithm::Sha1),
            format!("{}\n", "0".repeat(40)),
        )
        .unwrap();

        let coordinate = release_coord();
        let decision = ChecksumPolicy.apply(OPTION_WARN, &ctx(URL, &coordinate), Some(&file));
        assert!(decision.is_allow());
    }

    #[test]
    fn test_checksum_fail_denies_when_no_sidecar() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"artifact bytes").unwrap();

        let coordinate = release_coord();
        let decision = ChecksumPolicy.apply(OPTION_FAIL, &ctx(URL, &coordinate), Some(&file));
        assert!(!decision.is_allow());
    }

    #[test]
    fn test_checksum_falls_back_to_md5_sidecar() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"artifact bytes").unwrap();
        let digest = checksum::compute(&file, ChecksumAlgorithm::Md5).unwrap();
        checksum::write_sidecar(&file, &digest).unwrap();

        let coordinate = release_coord();
        let decision = ChecksumPolicy.apply(OPTION_FAIL, &ctx(URL, &coordinate), Some(&file));
        assert!(decision.is_allow());
    }

    #[test]
    fn test_snapshots_never_denies_snapshot_only() {
        let policy = VersionAdmissionPolicy::snapshots();
        let snapshot = snapshot_coord();
        let release = release_coord();

        assert!(!policy
            .apply(OPTION_NEVER, &ctx(URL, &snapshot), None)
            .is_allow());
        // A release artifact is not this policy's subject.
        assert!(policy
            .apply(OPTION_NEVER, &ctx(URL, &release), None)
            .is_allow());
    }

    #[test]
    fn test_releases_never_denies_release_only() {
        let policy = VersionAdmissionPolicy::releases();
        let snapshot = snapshot_coord();
        let release = release_coord();

        assert!(!policy
            .apply(OPTION_NEVER, &ctx(URL, &release), None)
            .is_allow());
        assert!(policy
            .apply(OPTION_NEVER, &ctx(URL, &snapshot), None)
            .is_allow());
    }

    #[test]
    fn test_registry_first_denial_aborts_phase() {
        let cache = Arc::new(UrlFailureCache::new());
        cache.record_failure(URL);
        let registry = PolicyRegistry::standard(cache);

        let coordinate = release_coord();
        let mut options = BTreeMap::new();
        options.insert("cache-failures".to_string(), OPTION_CACHED.to_string());

        match registry.evaluate(
            PolicyPhase::PreDownload,
            &options,
            &ctx(URL, &coordinate),
            None,
        ) {
            PhaseResult::Denied { policy_id, .. } => assert_eq!(policy_id, "cache-failures"),
            PhaseResult::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn test_registry_uses_default_option_when_unassigned() {
        let cache = Arc::new(UrlFailureCache::new());
        cache.record_failure(URL);
        let registry = PolicyRegistry::standard(cache);
        let coordinate = release_coord();

        // No assignment: cache-failures defaults to "cached" and denies.
        let result = registry.evaluate(
            PolicyPhase::PreDownload,
            &BTreeMap::new(),
            &ctx(URL, &coordinate),
            None,
        );
        assert!(matches!(result, PhaseResult::Denied { .. }));
    }

    #[test]
    fn test_registry_post_phase_admission() {
        let cache = Arc::new(UrlFailureCache::new());
        let registry = PolicyRegistry::standard(cache);

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("lib-1.0-SNAPSHOT.jar");
        fs::write(&file, b"bytes").unwrap();
        let digest = checksum::compute(&file, ChecksumAlgorithm::Sha1).unwrap();
        checksum::write_sidecar(&file, &digest).unwrap();

        let coordinate = snapshot_coord();
        let mut options = BTreeMap::new();
        options.insert("snapshots".to_string(), OPTION_NEVER.to_string());

        match registry.evaluate(
            PolicyPhase::PostDownload,
            &options,
            &ctx(URL, &coordinate),
            Some(&file),
        ) {
            PhaseResult::Denied { policy_id, .. } => assert_eq!(policy_id, "snapshots"),
            PhaseResult::Allowed => panic!("expected snapshot denial"),
        }
    }

    #[test]
    fn test_default_options_are_recognized() {
        let registry = PolicyRegistry::standard(Arc::new(UrlFailureCache::new()));
        for id in ["cache-failures", "checksum", "releases", "snapshots"] {
            let policy = registry.policy(id).unwrap();
            assert!(
                policy.options().contains(&policy.default_option()),
                "default option of '{}' is not in its recognized set",
                id
            );
        }
    }

    #[test]
    fn test_registry_lookup_by_id() {
        let registry = PolicyRegistry::standard(Arc::new(UrlFailureCache::new()));
        assert!(registry.policy("checksum").is_some());
        assert!(registry.policy("releases").is_some());
        assert!(registry.policy("nonexistent").is_none());
    }
}
