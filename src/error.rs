// src/error.rs

//! Error taxonomy for the proxy resolution engine
//!
//! Per-connector failures (transport errors, policy denials, commit
//! failures that rolled back cleanly) are recorded against the attempt and
//! never abort a resolution; only coordinate validation and a failed
//! rollback propagate as fatal. Policy denial itself is not an error at
//! all - see [`crate::policy::PolicyDecision`].

use crate::resolver::ResolutionReport;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the resolution engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed artifact coordinate. Fatal, never retried.
    #[error("invalid artifact coordinate: {0}")]
    Validation(String),

    /// The requested managed repository is not configured.
    #[error("unknown managed repository '{0}'")]
    UnknownRepository(String),

    /// Configuration could not be loaded or is internally inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Side-car content matched none of the supported checksum dialects.
    #[error("unrecognized checksum format in {path}: {detail}")]
    ChecksumFormat { path: PathBuf, detail: String },

    /// A transaction method was called in a state that does not allow it.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Commit failed and every previously applied event was rolled back.
    /// Non-fatal to a resolution - the next connector is tried.
    #[error("transaction commit failed (changes rolled back): {cause}")]
    Commit { cause: String },

    /// Commit failed and the rollback could not fully restore the tree.
    /// The managed repository may be inconsistent; this is always fatal.
    #[error(
        "rollback failed after commit error '{cause}': {detail}; \
         the managed repository may be in an inconsistent state"
    )]
    Rollback { cause: String, detail: String },

    /// Transport failure surfaced outside the resolution loop (inside the
    /// loop these are recorded per connector instead).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every eligible connector was tried and none produced the artifact.
    #[error("{0}")]
    NotFound(ResolutionReport),
}
