//! Error types for Rampart
//!
//! All modules use `RampartResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Rampart operations
pub type RampartResult<T> = Result<T, RampartError>;

/// All errors that can occur in Rampart
#[derive(Error, Debug)]
pub enum RampartError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // URI errors
    #[error("URI '{uri}' does not begin with '{scheme}'")]
    UriScheme { uri: String, scheme: &'static str },

    #[error("URI '{uri}' has non-printable character code {code}")]
    UriBadCharacter { uri: String, code: u8 },

    #[error("URI '{0}' seems to be dot-dotting to its scheme")]
    UriDotDot(String),

    #[error("URI '{0}' has no path after its scheme")]
    UriEmptyPath(String),

    // Cache errors
    #[error("Path too long while appending '{segment}' ({length} > {limit} bytes)")]
    PathTooLong {
        segment: String,
        length: usize,
        limit: usize,
    },

    // Overlay errors
    #[error("SLURM file {path} could not be read: {source}")]
    OverlayRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SLURM JSON error: {0}")]
    OverlayJson(#[source] serde_json::Error),

    #[error("The root of the SLURM file is not a JSON object")]
    OverlayRootNotObject,

    #[error("SLURM member '{0}' is required")]
    OverlayMissingMember(&'static str),

    #[error("The '{name}' element is not a JSON {expected}")]
    OverlayMemberType {
        name: &'static str,
        expected: &'static str,
    },

    #[error("'slurmVersion' must be 1, found {0}")]
    OverlayVersion(i64),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl RampartError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RampartError::OverlayVersion(2);
        assert!(err.to_string().contains("must be 1"));

        let err = RampartError::OverlayMissingMember("prefixFilters");
        assert!(err.to_string().contains("prefixFilters"));
    }

    #[test]
    fn io_constructor() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RampartError::io("reading metadata", source);
        assert!(err.to_string().contains("reading metadata"));
    }
}
