// src/transport.rs

//! Injected transport capability and the default HTTP implementation
//!
//! The resolution engine never talks to the network directly; it drives a
//! [`Transport`] that fetches a URL into a local file. [`HttpTransport`]
//! is the default implementation on blocking reqwest, with per-request
//! timeout, HTTP proxy, and basic-auth support. Tests inject scripted
//! transports instead.

use crate::config::{Credentials, NetworkProxy};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default timeout for remote fetches (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for fetches failing with network errors
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Failure of a single fetch attempt
///
/// Always non-fatal to a resolution: the engine records the URL in the
/// failure cache and advances to the next connector.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote answered 404
    #[error("not found at {0}")]
    NotFound(String),

    /// Any other non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The configured timeout elapsed
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    /// Connection-level failure
    #[error("network error fetching {url}: {detail}")]
    Network { url: String, detail: String },

    /// Local failure storing the fetched bytes
    #[error("I/O error storing fetched data: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// One fetch to perform
pub struct FetchRequest<'a> {
    pub url: String,
    pub proxy: Option<&'a NetworkProxy>,
    pub credentials: Option<&'a Credentials>,
    pub timeout: Duration,
}

/// Capability of moving bytes from a URL to a local file
pub trait Transport: Send + Sync {
    /// Fetch the URL into `dest`, returning the number of bytes written
    ///
    /// `dest` must not be left partially written on error.
    fn fetch(&self, request: &FetchRequest<'_>, dest: &Path)
        -> std::result::Result<u64, TransportError>;

    /// Fetch a companion side-car file; absence is not an error
    fn fetch_optional(
        &self,
        request: &FetchRequest<'_>,
        dest: &Path,
    ) -> std::result::Result<Option<u64>, TransportError> {
        match self.fetch(request, dest) {
            Ok(written) => Ok(Some(written)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Default transport over blocking reqwest
pub struct HttpTransport {
    max_retries: u32,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            max_retries: MAX_RETRIES,
        }
    }

    /// Build a client honoring the request's timeout and proxy
    fn build_client(
        &self,
        request: &FetchRequest<'_>,
    ) -> std::result::Result<reqwest::blocking::Client, TransportError> {
        let mut builder = reqwest::blocking::Client::builder().timeout(request.timeout);

        if let Some(proxy) = request.proxy {
            let mut configured = reqwest::Proxy::all(proxy.endpoint()).map_err(|e| {
                TransportError::Network {
                    url: request.url.clone(),
                    detail: format!("invalid proxy endpoint {}: {}", proxy.endpoint(), e),
                }
            })?;
            if let Some(ref creds) = proxy.credentials {
                configured = configured.basic_auth(&creds.username, &creds.password);
            }
            builder = builder.proxy(configured);
        }

        builder.build().map_err(|e| TransportError::Network {
            url: request.url.clone(),
            detail: format!("failed to build HTTP client: {}", e),
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        dest: &Path,
    ) -> std::result::Result<u64, TransportError> {
        let client = self.build_client(request)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut builder = client.get(&request.url);
            if let Some(creds) = request.credentials {
                builder = builder.basic_auth(&creds.username, Some(&creds.password));
            }

            match builder.send() {
                Ok(mut response) => {
                    let status = response.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(TransportError::NotFound(request.url.clone()));
                    }
                    if !status.is_success() {
                        return Err(TransportError::Status {
                            status: status.as_u16(),
                            url: request.url.clone(),
                        });
                    }

                    // Write to a temporary file first so an interrupted
                    // transfer never leaves a partial destination.
                    let temp_path = dest.with_extension("part");
                    let mut file = File::create(&temp_path)?;
                    let written = match io::copy(&mut response, &mut file) {
                        Ok(n) => n,
                        Err(e) => {
                            let _ = fs::remove_file(&temp_path);
                            return Err(TransportError::Io(e));
                        }
                    };
                    fs::rename(&temp_path, dest)?;

                    debug!("fetched {} bytes from {}", written, request.url);
                    return Ok(written);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(TransportError::Timeout {
                            url: request.url.clone(),
                        });
                    }
                    if attempt >= self.max_retries {
                        return Err(TransportError::Network {
                            url: request.url.clone(),
                            detail: e.to_string(),
                        });
                    }
                    warn!(
                        "fetch attempt {} for {} failed: {}, retrying...",
                        attempt, request.url, e
                    );
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = TransportError::NotFound("https://repo.example.com/x.jar".to_string());
        assert!(err.is_not_found());

        let err = TransportError::Status {
            status: 500,
            url: "https://repo.example.com/x.jar".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_fetch_optional_maps_not_found_to_none() {
        struct AlwaysMissing;
        impl Transport for AlwaysMissing {
            fn fetch(
                &self,
                request: &FetchRequest<'_>,
                _dest: &Path,
            ) -> std::result::Result<u64, TransportError> {
                Err(TransportError::NotFound(request.url.clone()))
            }
        }

        let request = FetchRequest {
            url: "https://repo.example.com/x.jar.sha1".to_string(),
            proxy: None,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        };
        let result = AlwaysMissing
            .fetch_optional(&request, Path::new("/tmp/unused"))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_fetch_optional_propagates_other_errors() {
        struct AlwaysDown;
        impl Transport for AlwaysDown {
            fn fetch(
                &self,
                request: &FetchRequest<'_>,
                _dest: &Path,
            ) -> std::result::Result<u64, TransportError> {
                Err(TransportError::Network {
                    url: request.url.clone(),
                    detail: "connection refused".to_string(),
                })
            }
        }

        let request = FetchRequest {
            url: "https://repo.example.com/x.jar.sha1".to_string(),
            proxy: None,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        };
        assert!(AlwaysDown
            .fetch_optional(&request, Path::new("/tmp/unused"))
            .is_err());
    }
}
