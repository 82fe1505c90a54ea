//! Overlay record types and element validation
//!
//! One function per SLURM member, each either producing the validated
//! field or warning at the exact point of failure. An element that fails
//! any member is dropped whole; the caller keeps loading the rest of the
//! document.

use super::json::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::net::IpAddr;
use tracing::warn;

/// Whether an element suppresses validator output or injects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Partially-optional fields; matches and suppresses output.
    Filter,
    /// Mandatory identifying fields; injected as if validated.
    Assertion,
}

impl RecordMode {
    pub fn is_assertion(self) -> bool {
        matches!(self, Self::Assertion)
    }

    /// Noun used in skip warnings ("filters" / "assertions").
    pub(super) fn plural(self) -> &'static str {
        match self {
            Self::Filter => "filters",
            Self::Assertion => "assertions",
        }
    }
}

/// An address prefix: the network bits and their count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub addr: IpAddr,
    pub length: u8,
}

impl Prefix {
    /// Longest representable length in this prefix's address family.
    pub fn family_max(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }
}

/// A prefix-origin filter or assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRecord {
    pub asn: Option<u32>,
    pub prefix: Option<Prefix>,
    /// Only ever present on assertions.
    pub max_prefix_length: Option<u8>,
    pub comment: Option<String>,
}

/// A BGPsec router-key filter or assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpsecRecord {
    pub asn: Option<u32>,
    pub ski: Option<Vec<u8>>,
    /// Only ever present on assertions; the member is ignored on filters.
    pub router_public_key: Option<Vec<u8>>,
    pub comment: Option<String>,
}

/// Validate one prefix element. `None` means "warned and skipped".
pub(super) fn parse_prefix_element(object: &Json, mode: RecordMode) -> Option<PrefixRecord> {
    if !object.is_object() {
        warn!(target: "rampart::op", "Not a valid JSON object");
        return None;
    }

    let asn = member_asn(object, mode).ok()?;
    let prefix = member_prefix(object, mode).ok()?;
    let comment = member_comment(object).ok()?;
    let max_prefix_length = match (mode, &prefix) {
        (RecordMode::Assertion, Some(prefix)) => member_max_prefix_length(object, prefix).ok()?,
        // Ignored for filters.
        _ => None,
    };

    if let (Some(prefix), Some(max)) = (&prefix, max_prefix_length) {
        if prefix.length > max {
            warn!(target: "rampart::op", "Prefix length is greater than max prefix length");
            return None;
        }
    }

    Some(PrefixRecord {
        asn,
        prefix,
        max_prefix_length,
        comment,
    })
}

/// Validate one BGPsec element. `None` means "warned and skipped".
pub(super) fn parse_bgpsec_element(object: &Json, mode: RecordMode) -> Option<BgpsecRecord> {
    if !object.is_object() {
        warn!(target: "rampart::op", "Not a valid JSON object");
        return None;
    }

    let asn = member_asn(object, mode).ok()?;
    let ski = member_key(object, "SKI", mode.is_assertion()).ok()?;
    let router_public_key = match mode {
        // Filters never carry a router key; the member is ignored outright.
        RecordMode::Filter => None,
        RecordMode::Assertion => member_key(object, "routerPublicKey", true).ok()?,
    };
    let comment = member_comment(object).ok()?;

    Some(BgpsecRecord {
        asn,
        ski,
        router_public_key,
        comment,
    })
}

fn member_str<'a>(object: &'a Json, name: &str) -> Result<Option<&'a str>, ()> {
    match object.member(name) {
        None => Ok(None),
        Some(Json::Str(value)) => Ok(Some(value)),
        Some(_) => {
            warn!(target: "rampart::op", "The '{}' element is not a JSON string.", name);
            Err(())
        }
    }
}

fn member_int(object: &Json, name: &str) -> Result<Option<i64>, ()> {
    match object.member(name) {
        None => Ok(None),
        Some(Json::Int(value)) => Ok(Some(*value)),
        Some(_) => {
            warn!(target: "rampart::op", "The '{}' element is not a JSON integer.", name);
            Err(())
        }
    }
}

fn member_asn(object: &Json, mode: RecordMode) -> Result<Option<u32>, ()> {
    let value = match member_int(object, "asn")? {
        // A literal zero is indistinguishable from an absent member in the
        // original wire format; both mean "no ASN".
        None | Some(0) => {
            if mode.is_assertion() {
                warn!(target: "rampart::op", "ASN is required");
                return Err(());
            }
            return Ok(None);
        }
        Some(value) => value,
    };

    if !(1..=i64::from(u32::MAX)).contains(&value) {
        warn!(
            target: "rampart::op",
            "ASN ({}) is out of range [1 - {}].", value, u32::MAX
        );
        return Err(());
    }

    Ok(Some(value as u32))
}

fn member_comment(object: &Json) -> Result<Option<String>, ()> {
    Ok(member_str(object, "comment")?.map(str::to_string))
}

fn member_prefix(object: &Json, mode: RecordMode) -> Result<Option<Prefix>, ()> {
    let Some(text) = member_str(object, "prefix")? else {
        if mode.is_assertion() {
            warn!(target: "rampart::op", "SLURM assertion prefix is required");
            return Err(());
        }
        return Ok(None);
    };

    parse_prefix(text).map(Some)
}

/// Parse and validate an "address/length" prefix string.
pub(crate) fn parse_prefix(text: &str) -> Result<Prefix, ()> {
    let Some((addr_text, length_text)) = text.split_once('/') else {
        warn!(target: "rampart::op", "Prefix '{}' is not in address/length form.", text);
        return Err(());
    };

    // v4 unless the address part has a colon in it.
    let addr: IpAddr = if addr_text.contains(':') {
        match addr_text.parse() {
            Ok(addr) => IpAddr::V6(addr),
            Err(_) => {
                warn!(target: "rampart::op", "'{}' is not a valid IPv6 address.", addr_text);
                return Err(());
            }
        }
    } else {
        match addr_text.parse() {
            Ok(addr) => IpAddr::V4(addr),
            Err(_) => {
                warn!(target: "rampart::op", "'{}' is not a valid IPv4 address.", addr_text);
                return Err(());
            }
        }
    };

    let family_max: u8 = if addr.is_ipv4() { 32 } else { 128 };
    let length = match length_text.parse::<u8>() {
        Ok(length) if length <= family_max => length,
        _ => {
            warn!(
                target: "rampart::op",
                "Prefix length '{}' is out of range [0 - {}].", length_text, family_max
            );
            return Err(());
        }
    };
    let prefix = Prefix { addr, length };

    if !host_bits_zero(&prefix) {
        warn!(
            target: "rampart::op",
            "Prefix '{}' has nonzero bits below its length.", text
        );
        return Err(());
    }

    Ok(prefix)
}

fn host_bits_zero(prefix: &Prefix) -> bool {
    match prefix.addr {
        IpAddr::V4(addr) => {
            let mask = if prefix.length == 0 {
                0
            } else {
                u32::MAX << (32 - u32::from(prefix.length))
            };
            u32::from(addr) & !mask == 0
        }
        IpAddr::V6(addr) => {
            let mask = if prefix.length == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix.length))
            };
            u128::from(addr) & !mask == 0
        }
    }
}

fn member_max_prefix_length(object: &Json, prefix: &Prefix) -> Result<Option<u8>, ()> {
    let value = match member_int(object, "maxPrefixLength")? {
        // Same absent-vs-zero collapse as the ASN member.
        None | Some(0) => return Ok(None),
        Some(value) => value,
    };

    if !(1..=i64::from(prefix.family_max())).contains(&value) {
        warn!(
            target: "rampart::op",
            "Max prefix length ({}) is out of range [1 - {}].",
            value,
            prefix.family_max()
        );
        return Err(());
    }

    Ok(Some(value as u8))
}

fn member_key(object: &Json, name: &str, required: bool) -> Result<Option<Vec<u8>>, ()> {
    let Some(text) = member_str(object, name)? else {
        if required {
            warn!(target: "rampart::op", "SLURM assertion {} is required", name);
            return Err(());
        }
        return Ok(None);
    };

    decode_base64url(text).map(Some)
}

/// Decode the SLURM flavor of base64: the RFC 4648 §5 URL-safe alphabet
/// with the trailing pad dropped (RFC 8416 §3.3.2 and §3.4.2). A pad
/// character anywhere in the input is an error, and so is an empty result.
pub(crate) fn decode_base64url(encoded: &str) -> Result<Vec<u8>, ()> {
    if encoded.contains('=') {
        warn!(target: "rampart::op", "The base64 encoded value has trailing '='");
        return Err(());
    }

    let decoded = match URL_SAFE_NO_PAD.decode(encoded) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(target: "rampart::op", "'{}' couldn't be decoded: {}", encoded, e);
            return Err(());
        }
    };

    if decoded.is_empty() {
        warn!(target: "rampart::op", "'{}' couldn't be decoded", encoded);
        return Err(());
    }

    Ok(decoded)
}
