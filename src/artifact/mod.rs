//! Artifact resolution and fetching.
//!
//! The loader never hard-codes where an artifact lives. A resolver hook
//! hands it a location string, which is parsed into an [`ArtifactLocation`]
//! and fetched through a [`Fetch`] implementation.

mod manifest;

pub use manifest::{FuncSignature, Manifest, ManifestError, ManifestExport, ManifestImport};

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Unsupported artifact location scheme in '{0}'")]
    UnsupportedScheme(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Failed to read artifact {uri}: {message}")]
    Io { uri: String, message: String },
}

/// Where an artifact lives, as parsed from the resolver's string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// `file:///abs/path` or a bare path.
    File(PathBuf),
    /// `mem:<name>`: a blob registered with a [`MemoryFetcher`].
    Memory(String),
}

impl ArtifactLocation {
    pub fn parse(uri: &str) -> Result<Self, FetchError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(ArtifactLocation::File(PathBuf::from(path)));
        }
        if let Some(name) = uri.strip_prefix("mem:") {
            return Ok(ArtifactLocation::Memory(name.to_string()));
        }
        match uri.split_once("://") {
            Some(_) => Err(FetchError::UnsupportedScheme(uri.to_string())),
            None if uri.is_empty() => Err(FetchError::NotFound(uri.to_string())),
            None => Ok(ArtifactLocation::File(PathBuf::from(uri))),
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::File(path) => write!(f, "file://{}", path.display()),
            ArtifactLocation::Memory(name) => write!(f, "mem:{name}"),
        }
    }
}

/// SHA-256 of an artifact's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactDigest([u8; 32]);

impl ArtifactDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Boxed future returned by [`Fetch::fetch`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'static>>;

/// Retrieves artifact bytes for a location.
pub trait Fetch: Send + Sync {
    fn fetch(&self, location: &ArtifactLocation) -> FetchFuture;
}

/// Reads `file` locations from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFetcher;

impl FsFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Fetch for FsFetcher {
    fn fetch(&self, location: &ArtifactLocation) -> FetchFuture {
        match location {
            ArtifactLocation::File(path) => {
                let path = path.clone();
                Box::pin(async move {
                    tokio::fs::read(&path).await.map_err(|e| {
                        let uri = format!("file://{}", path.display());
                        if e.kind() == std::io::ErrorKind::NotFound {
                            FetchError::NotFound(uri)
                        } else {
                            FetchError::Io {
                                uri,
                                message: e.to_string(),
                            }
                        }
                    })
                })
            }
            ArtifactLocation::Memory(_) => {
                let err = FetchError::UnsupportedScheme(location.to_string());
                Box::pin(async move { Err(err) })
            }
        }
    }
}

/// Serves preregistered artifacts by name (`mem:<name>`).
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.blobs.insert(name.into(), Arc::from(bytes.into()));
        self
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, location: &ArtifactLocation) -> FetchFuture {
        let result = match location {
            ArtifactLocation::Memory(name) => self
                .blobs
                .get(name)
                .map(|b| b.to_vec())
                .ok_or_else(|| FetchError::NotFound(location.to_string())),
            ArtifactLocation::File(_) => Err(FetchError::UnsupportedScheme(location.to_string())),
        };
        Box::pin(async move { result })
    }
}
