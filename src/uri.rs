//! RPKI URI handling
//!
//! Maps a "global" URI (`rsync://a.b.c/d/e.cer`) to the "local" path of its
//! mirror inside the repository directory (`rsync/a.b.c/d/e.cer`). The local
//! path is always normalized: empty segments and `.` are dropped, `..` folds
//! into its parent, and a URI that would escape its transport prefix is
//! rejected outright.
//!
//! Global URIs are IA5-encoded on the wire, so anything outside printable
//! ASCII is refused before it can reach a filename.

use crate::error::{RampartError, RampartResult};
use std::fmt;

/// Transport family a URI is fetched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// rsync; a successful fetch covers the whole subtree below the path.
    Rsync,
    /// HTTPS; fetches exactly one object.
    Https,
}

impl Transport {
    /// URI scheme prefix, including the separator
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Rsync => "rsync://",
            Self::Https => "https://",
        }
    }

    /// Basename of this transport's cache root
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rsync => "rsync",
            Self::Https => "https",
        }
    }

    /// Whether a successful fetch of a path also covers its descendants
    pub fn is_recursive(&self) -> bool {
        matches!(self, Self::Rsync)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A validated RPKI URI and its local mirror path.
///
/// Instances are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpkiUri {
    /// The URI as published, always starting with `rsync://` or `https://`
    global: String,
    /// Normalized mirror path relative to the repository root,
    /// e.g. `rsync/a.b.c/d/e.cer`
    local: String,
    transport: Transport,
}

impl RpkiUri {
    /// Parse a global URI, inferring the transport from its scheme.
    pub fn parse(global: &str) -> RampartResult<Self> {
        let transport = if global.starts_with(Transport::Rsync.scheme()) {
            Transport::Rsync
        } else if global.starts_with(Transport::Https.scheme()) {
            Transport::Https
        } else {
            return Err(RampartError::UriScheme {
                uri: global.to_string(),
                scheme: "rsync:// or https://",
            });
        };
        Self::with_transport(global, transport)
    }

    /// Parse a global URI that must use the given transport.
    pub fn with_transport(global: &str, transport: Transport) -> RampartResult<Self> {
        if let Some(byte) = global.bytes().find(|b| !(0x20..=0x7e).contains(b)) {
            return Err(RampartError::UriBadCharacter {
                uri: global.to_string(),
                code: byte,
            });
        }

        let rest = global
            .strip_prefix(transport.scheme())
            .ok_or_else(|| RampartError::UriScheme {
                uri: global.to_string(),
                scheme: transport.scheme(),
            })?;

        let local = map_local(global, rest, transport)?;

        Ok(Self {
            global: global.to_string(),
            local,
            transport,
        })
    }

    /// The URI as published
    pub fn global(&self) -> &str {
        &self.global
    }

    /// Mirror path relative to the repository root
    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Whether the global URI ends with `ext`. `ext` must include the period.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.global.len() >= ext.len() && self.global.ends_with(ext)
    }

    pub fn is_certificate(&self) -> bool {
        self.has_extension(".cer")
    }
}

impl fmt::Display for RpkiUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.global)
    }
}

/// Build the normalized local path `<label>/<host>/<path...>`.
///
/// "Global" URI `https://a.b.c/d/..///./d` names the same mirror file as
/// `https://a.b.c/d`, so the mapping folds the path before it ever touches
/// the filesystem.
fn map_local(global: &str, rest: &str, transport: Transport) -> RampartResult<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in rest.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(RampartError::UriDotDot(global.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(RampartError::UriEmptyPath(global.to_string()));
    }

    let mut local = String::with_capacity(transport.label().len() + 1 + rest.len());
    local.push_str(transport.label());
    for segment in segments {
        local.push('/');
        local.push_str(segment);
    }

    Ok(local)
}
