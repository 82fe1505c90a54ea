//! SLURM overlay loader
//!
//! Parses the locally-authored exception document: validation-output
//! filters and locally-added assertions (RFC 8416). The document skeleton
//! is strict (wrong version, missing sections or duplicate members fail
//! the whole load), while individual elements are forgiving: an invalid
//! filter or assertion is warned about and skipped.
//!
//! Validated records are retained in the returned [`Overlay`] for whoever
//! consumes them downstream.

mod json;
mod record;

pub use self::record::{BgpsecRecord, Prefix, PrefixRecord, RecordMode};

use self::json::Json;
use self::record::{parse_bgpsec_element, parse_prefix_element};
use crate::config::Config;
use crate::error::{RampartError, RampartResult};
use std::fs;
use tracing::warn;

/// Every record that survived validation, split by family and mode.
#[derive(Debug, Default)]
pub struct Overlay {
    pub prefix_filters: Vec<PrefixRecord>,
    pub bgpsec_filters: Vec<BgpsecRecord>,
    pub prefix_assertions: Vec<PrefixRecord>,
    pub bgpsec_assertions: Vec<BgpsecRecord>,
}

impl Overlay {
    /// Total number of retained records.
    pub fn len(&self) -> usize {
        self.prefix_filters.len()
            + self.bgpsec_filters.len()
            + self.prefix_assertions.len()
            + self.bgpsec_assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load the overlay named by the configuration.
///
/// No configured location means no overlay: an empty `Overlay` and no I/O.
/// A configured-but-unreadable file is an error, as is a structurally
/// invalid document.
pub fn load(config: &Config) -> RampartResult<Overlay> {
    let Some(path) = &config.slurm else {
        return Ok(Overlay::default());
    };

    let text = fs::read_to_string(path).map_err(|e| RampartError::OverlayRead {
        path: path.clone(),
        source: e,
    })?;

    let root: Json = serde_json::from_str(&text).map_err(RampartError::OverlayJson)?;
    handle_document(&root)
}

fn handle_document(root: &Json) -> RampartResult<Overlay> {
    if !root.is_object() {
        return Err(RampartError::OverlayRootNotObject);
    }

    check_version(root)?;

    let filters = required_object(root, "validationOutputFilters")?;
    let prefix_filters = required_array(filters, "prefixFilters")?;
    let bgpsec_filters = required_array(filters, "bgpsecFilters")?;

    let assertions = required_object(root, "locallyAddedAssertions")?;
    let prefix_assertions = required_array(assertions, "prefixAssertions")?;
    let bgpsec_assertions = required_array(assertions, "bgpsecAssertions")?;

    Ok(Overlay {
        prefix_filters: load_prefix_array(prefix_filters, RecordMode::Filter),
        bgpsec_filters: load_bgpsec_array(bgpsec_filters, RecordMode::Filter),
        prefix_assertions: load_prefix_array(prefix_assertions, RecordMode::Assertion),
        bgpsec_assertions: load_bgpsec_array(bgpsec_assertions, RecordMode::Assertion),
    })
}

fn check_version(root: &Json) -> RampartResult<()> {
    let version = match root.member("slurmVersion") {
        // An absent member reads as zero, which the range check throws out.
        None => 0,
        Some(Json::Int(version)) => *version,
        Some(_) => {
            return Err(RampartError::OverlayMemberType {
                name: "slurmVersion",
                expected: "integer",
            })
        }
    };

    if version != 1 {
        return Err(RampartError::OverlayVersion(version));
    }
    Ok(())
}

fn required_object<'a>(parent: &'a Json, name: &'static str) -> RampartResult<&'a Json> {
    match parent.member(name) {
        None => Err(RampartError::OverlayMissingMember(name)),
        Some(child) if child.is_object() => Ok(child),
        Some(_) => Err(RampartError::OverlayMemberType {
            name,
            expected: "object",
        }),
    }
}

fn required_array<'a>(parent: &'a Json, name: &'static str) -> RampartResult<&'a [Json]> {
    match parent.member(name) {
        None => Err(RampartError::OverlayMissingMember(name)),
        Some(Json::Array(elements)) => Ok(elements),
        Some(_) => Err(RampartError::OverlayMemberType {
            name,
            expected: "array",
        }),
    }
}

fn load_prefix_array(elements: &[Json], mode: RecordMode) -> Vec<PrefixRecord> {
    let mut records = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        match parse_prefix_element(element, mode) {
            Some(record) => records.push(record),
            None => warn!(
                target: "rampart::op",
                "Error at prefix {}, element {}, ignoring content",
                mode.plural(),
                index + 1
            ),
        }
    }
    records
}

fn load_bgpsec_array(elements: &[Json], mode: RecordMode) -> Vec<BgpsecRecord> {
    let mut records = Vec::with_capacity(elements.len());
    for (index, element) in elements.iter().enumerate() {
        match parse_bgpsec_element(element, mode) {
            Some(record) => records.push(record),
            None => warn!(
                target: "rampart::op",
                "Error at bgpsec {}, element {}, ignoring content",
                mode.plural(),
                index + 1
            ),
        }
    }
    records
}
