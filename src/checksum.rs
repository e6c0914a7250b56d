// src/checksum.rs

//! Checksum computation, side-car files, and dialect parsing
//!
//! Artifact integrity is tracked through side-car files at
//! `<artifact-path>.<ext>` holding a textual digest. Side-cars written by
//! this crate use the canonical bare-hex form; side-cars fetched from
//! remote repositories come in several historical dialects, all of which
//! are accepted on read:
//!
//! - bare hex: `5eb63bbbe01eeed093cb22bb8f5acdc3`
//! - OpenSSL:  `MD5(artifact.jar)= 5eb63bbb...`
//! - BSD:      `MD5 (artifact.jar) = 5eb63bbb...`
//! - GNU:      `5eb63bbb... *artifact.jar` (or with plain spaces)
//!
//! When a dialect embeds a filename it must match the verified file's
//! name; a differing name fails verification.

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use sha1::Sha1;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Buffer size for streaming digests (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Digest algorithm for artifact side-car files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
}

impl ChecksumAlgorithm {
    /// Side-car file extension
    #[inline]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
        }
    }

    /// Tag used by the OpenSSL and BSD textual dialects
    #[inline]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
        }
    }

    /// Length of the digest as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
        }
    }

    /// All supported algorithms, in side-car preference order
    pub const fn all() -> [ChecksumAlgorithm; 2] {
        [Self::Sha1, Self::Md5]
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            _ => Err(Error::Config(format!("unknown checksum algorithm: {}", s))),
        }
    }
}

/// A computed digest with its algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDigest {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex value
    pub hex: String,
}

impl ChecksumDigest {
    /// Case-insensitive comparison against another hex string
    pub fn matches(&self, other_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(other_hex)
    }
}

impl fmt::Display for ChecksumDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Incremental hasher over the supported algorithms
struct Hasher {
    state: HasherState,
}

enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        let state = match algorithm {
            ChecksumAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => HasherState::Sha1(Sha1::new()),
        };
        Self { state }
    }

    fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Md5(hasher) => hasher.update(data),
            HasherState::Sha1(hasher) => hasher.update(data),
        }
    }

    fn finalize(self, algorithm: ChecksumAlgorithm) -> ChecksumDigest {
        let hex = match self.state {
            HasherState::Md5(hasher) => hex::encode(hasher.finalize()),
            HasherState::Sha1(hasher) => hex::encode(hasher.finalize()),
        };
        ChecksumDigest { algorithm, hex }
    }
}

/// Compute the digest of a file, streaming its content
///
/// Never loads the whole file into memory.
pub fn compute(path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize(algorithm))
}

/// Compute the digest of a byte slice
pub fn compute_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumDigest {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize(algorithm)
}

/// Append an extension to a path without replacing the existing one
/// (`artifact.jar` + `sha1` -> `artifact.jar.sha1`)
pub(crate) fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".{}", ext));
    PathBuf::from(os)
}

/// Side-car path for a file and algorithm
pub fn sidecar_path(file: &Path, algorithm: ChecksumAlgorithm) -> PathBuf {
    append_extension(file, algorithm.extension())
}

/// Write the canonical bare-hex side-car next to a file
pub fn write_sidecar(file: &Path, digest: &ChecksumDigest) -> Result<PathBuf> {
    let sidecar = sidecar_path(file, digest.algorithm);
    fs::write(&sidecar, format!("{}\n", digest.hex))?;
    debug!("wrote {} side-car {}", digest.algorithm, sidecar.display());
    Ok(sidecar)
}

/// Outcome of verifying a file against its side-car
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Digest and (when embedded) filename match
    Valid,
    /// Digest differs from the side-car value
    Mismatch { expected: String, actual: String },
    /// The side-car embeds a filename that is not the verified file's name
    FilenameMismatch { embedded: String },
    /// No side-car file exists; distinct from a mismatch
    MissingSidecar,
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Human-readable failure reason; empty for `Valid`
    pub fn describe(&self) -> String {
        match self {
            Self::Valid => String::new(),
            Self::Mismatch { expected, actual } => {
                format!("checksum mismatch: expected {}, actual {}", expected, actual)
            }
            Self::FilenameMismatch { embedded } => {
                format!("side-car names a different file: '{}'", embedded)
            }
            Self::MissingSidecar => "no checksum side-car present".to_string(),
        }
    }
}

/// A digest parsed out of side-car text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSidecar {
    /// Lowercase hex digest
    pub hex: String,
    /// Filename embedded by the dialect, when it has one
    pub file_name: Option<String>,
}

fn is_valid_hex(s: &str, algorithm: ChecksumAlgorithm) -> bool {
    s.len() == algorithm.hex_len() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// OpenSSL `ALG(name)= hex` and BSD `ALG (name) = hex` dialects
fn parse_labeled(line: &str, algorithm: ChecksumAlgorithm) -> Option<ParsedSidecar> {
    let label = algorithm.label();
    let prefix = line.get(..label.len())?;
    if !prefix.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start();
    let rest = rest.strip_prefix('(')?;
    let (name, rest) = rest.split_once(')')?;
    let rest = rest.trim_start();
    let hex = rest.strip_prefix('=')?.trim();
    if !is_valid_hex(hex, algorithm) {
        return None;
    }
    Some(ParsedSidecar {
        hex: hex.to_lowercase(),
        file_name: Some(name.trim().to_string()),
    })
}

/// GNU `hex *name` / `hex name` dialect
fn parse_gnu(line: &str, algorithm: ChecksumAlgorithm) -> Option<ParsedSidecar> {
    let (hex, name) = line.split_once(char::is_whitespace)?;
    if !is_valid_hex(hex, algorithm) {
        return None;
    }
    let name = name.trim_start().trim_start_matches('*').trim();
    if name.is_empty() {
        return None;
    }
    Some(ParsedSidecar {
        hex: hex.to_lowercase(),
        file_name: Some(name.to_string()),
    })
}

/// Bare hex dialect, the canonical form this crate writes
fn parse_bare(line: &str, algorithm: ChecksumAlgorithm) -> Option<ParsedSidecar> {
    if !is_valid_hex(line, algorithm) {
        return None;
    }
    Some(ParsedSidecar {
        hex: line.to_lowercase(),
        file_name: None,
    })
}

/// Parse side-car text against the four supported dialects
///
/// Returns `None` when the content matches none of them.
pub fn parse_sidecar(content: &str, algorithm: ChecksumAlgorithm) -> Option<ParsedSidecar> {
    // Only the first non-empty line carries the digest.
    let line = content.lines().find(|l| !l.trim().is_empty())?.trim();

    parse_labeled(line, algorithm)
        .or_else(|| parse_gnu(line, algorithm))
        .or_else(|| parse_bare(line, algorithm))
}

/// Verify a file against its side-car
///
/// A missing side-car is a distinct outcome, not a mismatch. Malformed
/// side-car content that matches no dialect is an error; so are I/O
/// failures reading either file.
pub fn verify(file: &Path, algorithm: ChecksumAlgorithm) -> Result<VerifyOutcome> {
    let sidecar = sidecar_path(file, algorithm);
    if !sidecar.exists() {
        return Ok(VerifyOutcome::MissingSidecar);
    }

    let content = fs::read_to_string(&sidecar)?;
    let parsed = parse_sidecar(&content, algorithm).ok_or_else(|| Error::ChecksumFormat {
        path: sidecar.clone(),
        detail: format!("content matches no known {} dialect", algorithm.label()),
    })?;

    // Strict filename policy: an embedded name must match the target file.
    if let Some(ref embedded) = parsed.file_name {
        let actual_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if *embedded != actual_name {
            return Ok(VerifyOutcome::FilenameMismatch {
                embedded: embedded.clone(),
            });
        }
    }

    let computed = compute(file, algorithm)?;
    if computed.matches(&parsed.hex) {
        Ok(VerifyOutcome::Valid)
    } else {
        Ok(VerifyOutcome::Mismatch {
            expected: parsed.hex,
            actual: computed.hex,
        })
    }
}
