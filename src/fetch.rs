//! Fetching project resources.
//!
//! DrEdGE projects are addressed by URLs relative to the project root.
//! [`Fetcher`] abstracts over where those bytes come from; [`FsFetcher`]
//! serves them from a local directory, tests plug in an in-memory map.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::error::{DredgeError, Result};

/// A fetched resource: status code plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Response { status, body }
    }

    pub fn not_found() -> Self {
        Response::new(404, Vec::new())
    }

    /// 2xx
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|e| DredgeError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

/// Anything that turns a URL into a [`Response`].
///
/// Transport-level failures are `Err`, a resource that does not exist is an
/// `Ok` response with a non-OK status.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Response>;
}

/// Serves URLs from a directory on disk; absolute paths are used as is.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl AsRef<Path>) -> Self {
        FsFetcher { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&self, url: &str) -> Result<Response> {
        let path = self.root.join(url.trim_start_matches("./"));
        match std::fs::read(&path) {
            Ok(body) => Ok(Response::new(200, body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Response::not_found()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory fetcher, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        MemoryFetcher::default()
    }

    pub fn insert(&mut self, url: &str, body: impl Into<Vec<u8>>) {
        self.files.insert(url.to_string(), body.into());
    }

    pub fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.insert(url, body);
        self
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Response> {
        match self.files.get(url) {
            Some(body) => Ok(Response::new(200, body.clone())),
            None => Ok(Response::not_found()),
        }
    }
}

/// Substitutes `%A` / `%B` in a pairwise URL template
pub fn pairwise_url(template: &str, treatment_a: &str, treatment_b: &str) -> String {
    // go through a placeholder so a treatment key containing "%B" is left alone
    template
        .replace("%A", "\u{0}")
        .replace("%B", treatment_b)
        .replace('\u{0}', treatment_a)
}
