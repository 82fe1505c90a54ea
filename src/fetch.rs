//! Transport fetcher abstraction
//!
//! The cache never talks to the network itself; the validator hands it a
//! `Fetcher` and the cache decides when (and whether) to invoke it. Both
//! operations block until the transfer finishes; timeouts are the fetcher's
//! concern.

use crate::uri::RpkiUri;
use thiserror::Error;

/// Failure reported by a transport fetcher.
///
/// The numeric code is persisted in the cache metadata and replayed when the
/// same URI is consulted again within a run, so it must stay meaningful
/// across calls.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transfer failed with code {code}")]
pub struct FetchError {
    /// Transport-specific error code; never zero.
    pub code: i32,
}

impl FetchError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

/// Abstract transport interface
///
/// Implementations mirror files from remote publication points into the
/// local repository directory, at the path `RpkiUri::local` names.
pub trait Fetcher {
    /// Synchronously fetch the whole subtree behind an rsync URI.
    fn fetch_subtree(&mut self, uri: &RpkiUri) -> Result<(), FetchError>;

    /// Synchronously fetch a single object over HTTPS.
    ///
    /// Returns whether the object's bytes differ from a previous fetch.
    fn fetch_object(&mut self, uri: &RpkiUri) -> Result<bool, FetchError>;
}

/// Convenience: treat a plain closure pair as a fetcher in tests and tools.
pub struct FnFetcher<S, O>
where
    S: FnMut(&RpkiUri) -> Result<(), FetchError>,
    O: FnMut(&RpkiUri) -> Result<bool, FetchError>,
{
    pub subtree: S,
    pub object: O,
}

impl<S, O> Fetcher for FnFetcher<S, O>
where
    S: FnMut(&RpkiUri) -> Result<(), FetchError>,
    O: FnMut(&RpkiUri) -> Result<bool, FetchError>,
{
    fn fetch_subtree(&mut self, uri: &RpkiUri) -> Result<(), FetchError> {
        (self.subtree)(uri)
    }

    fn fetch_object(&mut self, uri: &RpkiUri) -> Result<bool, FetchError> {
        (self.object)(uri)
    }
}
