// src/lib.rs

//! Quarry - Maven-style artifact repository proxy engine
//!
//! When a requested artifact is missing from a locally managed
//! repository, the engine decides which remote repositories to query, in
//! what order, under what network-proxy configuration, applies pluggable
//! pre/post-download policies, and commits the fetched bytes plus their
//! checksum side-cars into local storage with transactional rollback.
//!
//! # Architecture
//!
//! - Connector-ordered resolution: many remotes per managed repository,
//!   explicit ordering, whitelist/blacklist path filtering
//! - Policy pipeline: named, pluggable pre/post-download rules with one
//!   configured option per connector; denial is a value, not an error
//! - Negative caching: recently failed URLs are skipped without network
//!   traffic until the entry expires
//! - Transactional commit: artifact and side-car writes succeed together
//!   or are rolled back together
//! - Injected collaborators: configuration, transport, and layout are
//!   traits supplied by the embedder

pub mod checksum;
pub mod config;
pub mod coordinate;
mod error;
pub mod failure_cache;
pub mod layout;
pub mod policy;
pub mod resolver;
pub mod transaction;
pub mod transport;

pub use checksum::{ChecksumAlgorithm, ChecksumDigest, VerifyOutcome};
pub use config::{
    Configuration, ConfigurationProvider, Credentials, ManagedRepository, NetworkProxy,
    ProxyConnector, RemoteRepository, StaticProvider, TomlProvider,
};
pub use coordinate::{ArtifactCoordinate, VersionClass};
pub use error::{Error, Result};
pub use failure_cache::UrlFailureCache;
pub use layout::{Maven2Layout, RepositoryLayout};
pub use policy::{DownloadPolicy, PolicyContext, PolicyDecision, PolicyPhase, PolicyRegistry};
pub use resolver::{
    AttemptOutcome, AttemptPhase, CollectingObserver, ConnectorEvent, ProxyResolver,
    ResolutionObserver, ResolutionReport, TracingObserver,
};
pub use transaction::{FileTransaction, TransactionState};
pub use transport::{FetchRequest, HttpTransport, Transport, TransportError};
