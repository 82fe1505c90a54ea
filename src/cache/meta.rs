//! Metadata codec
//!
//! Persists the node tree as `metadata.json`: a JSON array of node objects,
//! each carrying `basename`, `flags`, `ts_success`, `ts_attempt`, `error`
//! and an optional recursive `children` array.
//!
//! The document is just a cache of a cache, so loading forgives: a
//! malformed node is warned about and dropped together with its subtree,
//! while its siblings and ancestors survive; nothing in here ever aborts
//! the run.

use crate::cache::node::{flags, NodeId, Tree};
use chrono::{DateTime, Local, Utc};
use serde_json::{json, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Timestamp wire format. The offset makes the document self-describing
/// even though dumps use the local timezone.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Format a timestamp for the metadata document, in the local offset.
pub(crate) fn ts_to_json(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TS_FORMAT).to_string()
}

/// Parse a metadata timestamp back to UTC. Inverse of `ts_to_json` over
/// the whole representable (second-precision) range.
pub(crate) fn ts_from_json(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TS_FORMAT)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Top-level nodes recovered from a metadata document.
#[derive(Debug, Default)]
pub(crate) struct LoadedRoots {
    pub rsync: Option<NodeId>,
    pub https: Option<NodeId>,
}

/// A node record that survived validation, not yet grafted into a tree.
struct ParsedNode {
    basename: String,
    flags: u8,
    ts_success: DateTime<Utc>,
    ts_attempt: DateTime<Utc>,
    error: i32,
    children: Vec<ParsedNode>,
}

/// Load `metadata.json`, grafting recognized top-level trees into `tree`.
///
/// A missing file is a silent fresh start; any other failure is an
/// operational warning and an empty result.
pub(crate) fn load(path: &Path, tree: &mut Tree) -> LoadedRoots {
    let mut roots = LoadedRoots::default();

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return roots,
        Err(e) => {
            warn!(target: "rampart::op", "Cannot read {}: {}", path.display(), e);
            return roots;
        }
    };

    let document: Value = match serde_json::from_str(&text) {
        Ok(document) => document,
        Err(e) => {
            warn!(target: "rampart::op", "Json parsing failure at {}: {}", path.display(), e);
            return roots;
        }
    };

    let Value::Array(elements) = document else {
        warn!(target: "rampart::op", "The root tag of metadata.json is not an array.");
        return roots;
    };

    for element in &elements {
        let Some(parsed) = parse_node(element) else {
            continue;
        };

        if parsed.basename.eq_ignore_ascii_case("rsync") && roots.rsync.is_none() {
            roots.rsync = Some(graft(tree, &parsed, None));
        } else if parsed.basename.eq_ignore_ascii_case("https") && roots.https.is_none() {
            roots.https = Some(graft(tree, &parsed, None));
        } else {
            warn!(target: "rampart::op", "Ignoring unrecognized json node '{}'.", parsed.basename);
        }
    }

    roots
}

/// Validate one node object. `None` drops the node and its subtree; the
/// caller keeps going.
fn parse_node(value: &Value) -> Option<ParsedNode> {
    let Some(object) = value.as_object() else {
        warn!(target: "rampart::op", "A metadata.json download node is not an object; skipping.");
        return None;
    };

    let Some(basename) = object.get("basename").and_then(Value::as_str) else {
        warn!(
            target: "rampart::op",
            "Tag 'basename' of a metadata.json download node cannot be parsed as a string; skipping."
        );
        return None;
    };

    let Some(raw_flags) = object.get("flags").and_then(Value::as_i64) else {
        warn!(
            target: "rampart::op",
            "Tag 'flags' of metadata.json download node '{}' cannot be parsed as an integer; skipping.",
            basename
        );
        return None;
    };
    // FOUND is a sweep-local marker; a crashed run must not leak it into
    // the next one.
    let node_flags = (raw_flags as u8) & flags::ALL & !flags::FOUND;

    let Some(ts_success) = object
        .get("ts_success")
        .and_then(Value::as_str)
        .and_then(ts_from_json)
    else {
        warn!(
            target: "rampart::op",
            "Tag 'ts_success' of metadata.json download node '{}' cannot be parsed as a date; skipping.",
            basename
        );
        return None;
    };

    let Some(ts_attempt) = object
        .get("ts_attempt")
        .and_then(Value::as_str)
        .and_then(ts_from_json)
    else {
        warn!(
            target: "rampart::op",
            "Tag 'ts_attempt' of metadata.json download node '{}' cannot be parsed as a date; skipping.",
            basename
        );
        return None;
    };

    let Some(error) = object.get("error").and_then(Value::as_i64).map(|v| v as i32) else {
        warn!(
            target: "rampart::op",
            "Tag 'error' of metadata.json download node '{}' cannot be parsed as an integer; skipping.",
            basename
        );
        return None;
    };

    let mut children = Vec::new();
    match object.get("children") {
        None => {}
        Some(Value::Array(elements)) => {
            // Per-child validation: a bad child drops only its own subtree.
            children.extend(elements.iter().filter_map(parse_node));
        }
        Some(_) => {
            warn!(
                target: "rampart::op",
                "Tag 'children' of metadata.json download node '{}' cannot be parsed as an array; skipping.",
                basename
            );
            return None;
        }
    }

    debug!(target: "rampart::op", "Node '{}' successfully loaded from metadata.json.", basename);
    Some(ParsedNode {
        basename: basename.to_string(),
        flags: node_flags,
        ts_success,
        ts_attempt,
        error,
        children,
    })
}

/// Graft a validated record (and its subtree) into the arena.
fn graft(tree: &mut Tree, parsed: &ParsedNode, parent: Option<NodeId>) -> NodeId {
    let id = match parent {
        None => tree.insert_root(&parsed.basename),
        Some(parent) => tree.add_child(parent, &parsed.basename),
    };

    {
        let node = tree.node_mut(id);
        node.flags = parsed.flags;
        node.ts_success = parsed.ts_success;
        node.ts_attempt = parsed.ts_attempt;
        node.error = parsed.error;
    }

    for child in &parsed.children {
        graft(tree, child, Some(id));
    }

    id
}

/// Serialize the trees below `roots` to `path`, compactly.
///
/// Failures are operational warnings; the cache keeps working without its
/// side-car document.
pub(crate) fn dump(path: &Path, tree: &Tree, roots: &[NodeId]) {
    let document = Value::Array(roots.iter().map(|&root| node_to_value(tree, root)).collect());

    let text = match serde_json::to_string(&document) {
        Ok(text) => text,
        Err(e) => {
            warn!(target: "rampart::op", "Unable to serialize metadata.json: {}", e);
            return;
        }
    };

    if let Err(e) = fs::write(path, text) {
        warn!(target: "rampart::op", "Unable to write {}: {}", path.display(), e);
    }
}

fn node_to_value(tree: &Tree, id: NodeId) -> Value {
    let node = tree.node(id);
    let mut object = json!({
        "basename": node.basename,
        "flags": node.flags,
        "ts_success": ts_to_json(node.ts_success),
        "ts_attempt": ts_to_json(node.ts_attempt),
        "error": node.error,
    });

    if !node.children.is_empty() {
        let children: Vec<Value> = node
            .children
            .values()
            .map(|&child| node_to_value(tree, child))
            .collect();
        object["children"] = Value::Array(children);
    }

    object
}
