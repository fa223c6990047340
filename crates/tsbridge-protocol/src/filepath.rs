//! URI ↔ tsserver path mapping
//!
//! tsserver addresses buffers by filesystem path. Editors address them by
//! URI, and not every URI has a filesystem home (untitled buffers, library
//! zips, virtual workspaces). `file://` URIs map to their POSIX path; every
//! other scheme is encoded under the reserved `^/` prefix in a form tsserver
//! treats as an ordinary in-memory path and that we can invert exactly:
//!
//! ```text
//! ^/<scheme>/<authority-or-empty>/<path>[#<fragment>]
//! ```

use thiserror::Error;
use url::Url;

/// Prefix marking a server path that does not exist on disk.
pub const INMEMORY_PREFIX: &str = "^/";

#[derive(Debug, Error, PartialEq)]
pub enum PathMappingError {
    #[error("path {0:?} is not a valid file path or encoded URI")]
    Unmappable(String),
    #[error("URI {0:?} cannot be represented as a server path")]
    UnmappableUri(String),
}

/// The canonical tsserver path for a document URI. Total over all URIs.
pub fn path_from_uri(uri: &Url) -> String {
    if uri.scheme() == "file" {
        if let Ok(path) = uri.to_file_path() {
            return path.to_string_lossy().into_owned();
        }
    }
    let authority = uri.host_str().unwrap_or_default();
    let path = uri.path().trim_start_matches('/');
    let mut encoded = format!("{INMEMORY_PREFIX}{}/{authority}/{path}", uri.scheme());
    if let Some(fragment) = uri.fragment() {
        encoded.push('#');
        encoded.push_str(fragment);
    }
    encoded
}

/// Invert [`path_from_uri`]. Fails only on strings that were never produced
/// by it (a relative path, a truncated encoding).
pub fn uri_from_path(path: &str) -> Result<Url, PathMappingError> {
    if let Some(encoded) = path.strip_prefix(INMEMORY_PREFIX) {
        let (scheme, rest) = encoded
            .split_once('/')
            .ok_or_else(|| PathMappingError::Unmappable(path.to_string()))?;
        let (authority, rest) = rest
            .split_once('/')
            .ok_or_else(|| PathMappingError::Unmappable(path.to_string()))?;
        let (tail, fragment) = match rest.split_once('#') {
            Some((tail, fragment)) => (tail, Some(fragment)),
            None => (rest, None),
        };
        let mut text = format!("{scheme}://{authority}/{tail}");
        if let Some(fragment) = fragment {
            text.push('#');
            text.push_str(fragment);
        }
        return Url::parse(&text).map_err(|_| PathMappingError::Unmappable(path.to_string()));
    }
    if path.starts_with('/') {
        return Url::from_file_path(path)
            .map_err(|()| PathMappingError::Unmappable(path.to_string()));
    }
    Err(PathMappingError::Unmappable(path.to_string()))
}
