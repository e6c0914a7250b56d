// src/config.rs

//! Repository, proxy, and connector configuration
//!
//! Records are owned by an external configuration source and may change at
//! runtime; the resolver re-reads them through a [`ConfigurationProvider`]
//! on every resolution instead of caching a snapshot indefinitely.
//! Filtering and ordering of connectors always produce new sequences -
//! a snapshot is never mutated in place.

use crate::error::{Error, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// A local, writable artifact store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedRepository {
    pub id: String,
    /// Filesystem root of the repository tree
    pub root: PathBuf,
}

/// Username/password pair for a remote repository or network proxy
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// Credentials must never leak into logs or error reports.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A read-only upstream artifact source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepository {
    pub id: String,
    /// Base URL of the remote repository
    pub url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Per-remote fetch timeout; the transport default applies when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RemoteRepository {
    /// Full URL for an artifact path under this remote
    pub fn artifact_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check that the base URL parses
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url).map_err(|e| {
            Error::Config(format!(
                "remote repository '{}' has invalid url '{}': {}",
                self.id, self.url, e
            ))
        })?;
        Ok(())
    }
}

/// HTTP proxy configuration referenced from connectors by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProxy {
    pub id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl NetworkProxy {
    /// Proxy endpoint URL
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Configured edge from a managed repository to a remote repository
///
/// Many connectors may share a source; resolution order is the explicit
/// `order` field, ties broken by configuration insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConnector {
    pub source_repo_id: String,
    pub target_repo_id: String,
    #[serde(default)]
    pub proxy_id: Option<String>,
    #[serde(default)]
    pub order: u32,
    /// Glob patterns a path must match (empty = everything allowed)
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Glob patterns that exclude a path, checked before the whitelist
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    /// Policy id -> option value assignments for this connector
    #[serde(default)]
    pub policies: BTreeMap<String, String>,
}

impl ProxyConnector {
    /// Stable identifier for events and reports
    pub fn id(&self) -> String {
        format!("{}->{}", self.source_repo_id, self.target_repo_id)
    }

    /// Path eligibility: blacklist first and short-circuit, then the path
    /// must match the whitelist unless the whitelist is empty.
    pub fn allows_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');

        for pattern in &self.blacklist {
            if matches_pattern(pattern, path) {
                debug!("path {} blacklisted by {} on {}", path, pattern, self.id());
                return false;
            }
        }

        if self.whitelist.is_empty() {
            return true;
        }
        self.whitelist
            .iter()
            .any(|pattern| matches_pattern(pattern, path))
    }
}

/// Match a repository path against a glob pattern
///
/// An invalid pattern never matches; it is reported once per call site
/// rather than failing the whole connector list.
fn matches_pattern(pattern: &str, path: &str) -> bool {
    match Pattern::new(pattern.trim_start_matches('/')) {
        Ok(compiled) => compiled.matches(path),
        Err(e) => {
            warn!("ignoring invalid path pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// A point-in-time view of all configuration records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub managed: Vec<ManagedRepository>,
    #[serde(default)]
    pub remotes: Vec<RemoteRepository>,
    #[serde(default)]
    pub proxies: Vec<NetworkProxy>,
    #[serde(default)]
    pub connectors: Vec<ProxyConnector>,
}

impl Configuration {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Configuration = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check referential integrity and URL syntax
    pub fn validate(&self) -> Result<()> {
        for remote in &self.remotes {
            remote.validate()?;
        }
        for connector in &self.connectors {
            if self.remote(&connector.target_repo_id).is_none() {
                return Err(Error::Config(format!(
                    "connector {} references unknown remote repository '{}'",
                    connector.id(),
                    connector.target_repo_id
                )));
            }
            if let Some(ref proxy_id) = connector.proxy_id
                && self.proxy(proxy_id).is_none()
            {
                return Err(Error::Config(format!(
                    "connector {} references unknown network proxy '{}'",
                    connector.id(),
                    proxy_id
                )));
            }
        }
        Ok(())
    }

    pub fn managed(&self, id: &str) -> Option<&ManagedRepository> {
        self.managed.iter().find(|r| r.id == id)
    }

    pub fn remote(&self, id: &str) -> Option<&RemoteRepository> {
        self.remotes.iter().find(|r| r.id == id)
    }

    pub fn proxy(&self, id: &str) -> Option<&NetworkProxy> {
        self.proxies.iter().find(|p| p.id == id)
    }

    /// Eligible connectors for a managed repository and path
    ///
    /// Disabled connectors are excluded, path filters applied, and the
    /// result sorted by `order` ascending. The sort is stable, so equal
    /// orders preserve configuration insertion order and resolution stays
    /// deterministic for identical configuration.
    pub fn connectors_for(&self, managed_id: &str, path: &str) -> Vec<ProxyConnector> {
        let mut eligible: Vec<ProxyConnector> = self
            .connectors
            .iter()
            .filter(|c| c.source_repo_id == managed_id && !c.disabled && c.allows_path(path))
            .cloned()
            .collect();
        eligible.sort_by_key(|c| c.order);
        eligible
    }
}

/// Source of current configuration records
///
/// Implementations must return the current state on every call; the
/// resolver never caches a snapshot across resolutions.
pub trait ConfigurationProvider: Send + Sync {
    fn snapshot(&self) -> Result<Configuration>;
}

/// Fixed in-memory configuration, for embedders and tests
pub struct StaticProvider {
    config: Configuration,
}

impl StaticProvider {
    pub fn new(config: Configuration) -> Self {
        Self { config }
    }
}

impl ConfigurationProvider for StaticProvider {
    fn snapshot(&self) -> Result<Configuration> {
        Ok(self.config.clone())
    }
}

/// File-backed provider that re-reads its TOML file on every snapshot,
/// picking up runtime edits
pub struct TomlProvider {
    path: PathBuf,
}

impl TomlProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigurationProvider for TomlProvider {
    fn snapshot(&self) -> Result<Configuration> {
        Configuration::load(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(source: &str, target: &str, order: u32) -> ProxyConnector {
        ProxyConnector {
            source_repo_id: source.to_string(),
            target_repo_id: target.to_string(),
            proxy_id: None,
            order,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            disabled: false,
            policies: BTreeMap::new(),
        }
    }

    fn remote(id: &str) -> RemoteRepository {
        RemoteRepository {
            id: id.to_string(),
            url: format!("https://{}.example.com/repo", id),
            credentials: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn test_artifact_url_slash_handling() {
        let mut r = remote("central");
        r.url = "https://repo.example.com/maven2/".to_string();
        assert_eq!(
            r.artifact_url("/org/example/lib/1.0/lib-1.0.jar"),
            "https://repo.example.com/maven2/org/example/lib/1.0/lib-1.0.jar"
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "deploy".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("deploy"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_empty_whitelist_allows_everything() {
        let c = connector("internal", "central", 1);
        assert!(c.allows_path("org/example/lib/1.0/lib-1.0.jar"));
    }

    #[test]
    fn test_whitelist_restricts() {
        let mut c = connector("internal", "central", 1);
        c.whitelist = vec!["org/example/**".to_string()];
        assert!(c.allows_path("org/example/lib/1.0/lib-1.0.jar"));
        assert!(!c.allows_path("com/other/lib/1.0/lib-1.0.jar"));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let mut c = connector("internal", "central", 1);
        c.whitelist = vec!["org/**".to_string()];
        c.blacklist = vec!["org/secret/**".to_string()];
        assert!(c.allows_path("org/example/lib-1.0.jar"));
        assert!(!c.allows_path("org/secret/lib-1.0.jar"));
    }

    #[test]
    fn test_leading_slash_normalized() {
        let mut c = connector("internal", "central", 1);
        c.blacklist = vec!["**/*-SNAPSHOT/**".to_string()];
        assert!(!c.allows_path("/org/example/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let mut c = connector("internal", "central", 1);
        c.blacklist = vec!["[".to_string()];
        // The broken blacklist entry cannot match, so the path stays allowed.
        assert!(c.allows_path("org/example/lib-1.0.jar"));
    }

    #[test]
    fn test_connectors_for_filters_and_sorts() {
        let mut c_disabled = connector("internal", "r1", 0);
        c_disabled.disabled = true;
        let mut c_filtered = connector("internal", "r2", 0);
        c_filtered.blacklist = vec!["org/**".to_string()];
        let c_late = connector("internal", "r3", 5);
        let c_early = connector("internal", "r4", 1);
        let c_other_source = connector("staging", "r5", 0);

        let config = Configuration {
            managed: Vec::new(),
            remotes: vec![remote("r1"), remote("r2"), remote("r3"), remote("r4"), remote("r5")],
            proxies: Vec::new(),
            connectors: vec![c_disabled, c_filtered, c_late, c_early, c_other_source],
        };

        let eligible = config.connectors_for("internal", "org/example/lib-1.0.jar");
        let targets: Vec<&str> = eligible.iter().map(|c| c.target_repo_id.as_str()).collect();
        assert_eq!(targets, vec!["r4", "r3"]);
    }

    #[test]
    fn test_equal_order_preserves_insertion_order() {
        let config = Configuration {
            managed: Vec::new(),
            remotes: vec![remote("first"), remote("second"), remote("third")],
            proxies: Vec::new(),
            connectors: vec![
                connector("internal", "first", 2),
                connector("internal", "second", 2),
                connector("internal", "third", 1),
            ],
        };

        let eligible = config.connectors_for("internal", "any/path.jar");
        let targets: Vec<&str> = eligible.iter().map(|c| c.target_repo_id.as_str()).collect();
        assert_eq!(targets, vec!["third", "first", "second"]);
    }

    #[test]
    fn test_validate_rejects_dangling_remote() {
        let config = Configuration {
            managed: Vec::new(),
            remotes: Vec::new(),
            proxies: Vec::new(),
            connectors: vec![connector("internal", "missing", 0)],
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_dangling_proxy() {
        let mut c = connector("internal", "central", 0);
        c.proxy_id = Some("corp".to_string());
        let config = Configuration {
            managed: Vec::new(),
            remotes: vec![remote("central")],
            proxies: Vec::new(),
            connectors: vec![c],
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_text = r#"
            [[managed]]
            id = "internal"
            root = "/var/lib/quarry/internal"

            [[remotes]]
            id = "central"
            url = "https://repo.maven.apache.org/maven2"
            timeout_secs = 60

            [[proxies]]
            id = "corp"
            host = "proxy.corp.example.com"
            port = 3128

            [[connectors]]
            source_repo_id = "internal"
            target_repo_id = "central"
            proxy_id = "corp"
            order = 1
            blacklist = ["**/*-SNAPSHOT/**"]

            [connectors.policies]
            cache-failures = "cached"
            checksum = "fail"
        "#;

        let config: Configuration = toml::from_str(toml_text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.managed.len(), 1);
        let connector = &config.connectors[0];
        assert_eq!(connector.proxy_id.as_deref(), Some("corp"));
        assert_eq!(
            connector.policies.get("checksum").map(String::as_str),
            Some("fail")
        );
        assert_eq!(config.remote("central").unwrap().timeout_secs, Some(60));
    }
}
