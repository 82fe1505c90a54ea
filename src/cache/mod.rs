//! Local artifact cache
//!
//! Remote publication points are mirrored under the repository directory,
//! one subtree per transport (`rsync/`, `https/`). The cache tracks every
//! mirrored path as a node with download flags and timestamps, so that
//! within one run a URI (or, for rsync, any descendant of a fetched URI)
//! is fetched at most once, and so that files left over from previous runs
//! can be garbage-collected at shutdown.
//!
//! Node state survives between runs in a `metadata.json` side-car document.
//! Losing that document only costs a re-fetch; it is a cache of a cache.
//!
//! The cache is single-threaded by contract: every operation takes
//! `&mut self`, no locks are held, and two validator processes sharing a
//! repository directory are not supported. Dropping the value is the
//! teardown.

pub mod node;

mod meta;
mod sweep;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::path::PathBuilder;
use crate::uri::{RpkiUri, Transport};
use chrono::{DateTime, Utc};
use self::node::{flags, NodeId, Tree};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// What `Cache::download` reports back to the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Zero on success; otherwise the fetcher's error code, possibly
    /// replayed from an earlier attempt within this run.
    pub code: i32,
    /// Whether the object's bytes changed. Only meaningful for HTTPS URIs.
    pub changed: bool,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    fn cached(code: i32) -> Self {
        Self {
            code,
            changed: false,
        }
    }
}

/// The local artifact cache of one validator run.
#[derive(Debug)]
pub struct Cache {
    tree: Tree,
    rsync: NodeId,
    https: NodeId,
    /// When this run started; anchors the freshness predicate.
    startup_time: DateTime<Utc>,
    repository: PathBuf,
}

impl Cache {
    /// Stamp the run's startup time and load the persisted metadata.
    ///
    /// Roots missing from the metadata document (or the whole document)
    /// are synthesized empty.
    pub fn prepare(config: &Config) -> Self {
        let startup_time = now_second_precision();

        let mut tree = Tree::new();
        let roots = meta::load(&config.metadata_path(), &mut tree);
        let rsync = roots
            .rsync
            .unwrap_or_else(|| tree.insert_root(Transport::Rsync.label()));
        let https = roots
            .https
            .unwrap_or_else(|| tree.insert_root(Transport::Https.label()));

        Self {
            tree,
            rsync,
            https,
            startup_time,
            repository: config.local_repository.clone(),
        }
    }

    /// Ensure the object (or subtree) behind `uri` is present and current
    /// in the local mirror, fetching it if this run has not already tried.
    ///
    /// The returned code is the fetcher's; a URI already attempted this run
    /// replays its stored code without touching the network. For rsync, a
    /// successfully fetched ancestor covers every descendant.
    pub fn download(&mut self, uri: &RpkiUri, fetcher: &mut dyn Fetcher) -> DownloadOutcome {
        let (root, recursive) = match uri.transport() {
            Transport::Rsync => (self.rsync, true),
            Transport::Https => (self.https, false),
        };

        let mut segments = uri.local().split('/');
        let _ = segments.next(); // the transport label; root selection already covered it

        let mut node = root;
        let mut created = false;

        while let Some(token) = segments.next() {
            if self.tree.node(node).has(flags::FILE) {
                // node used to be a file, now it's a dir.
                self.remove_from_disk(node, true);
                self.tree.node_mut(node).flags = 0;
            }

            match self.tree.child(node, token) {
                None => {
                    // Materialize the rest of the path and fetch the leaf.
                    node = self.tree.add_child(node, token);
                    for token in segments.by_ref() {
                        node = self.tree.add_child(node, token);
                    }
                    created = true;
                    break;
                }
                Some(child) => {
                    if recursive && self.is_fresh(child) && self.tree.node(child).error == 0 {
                        // An ancestor fetch already covered this URI.
                        return DownloadOutcome::cached(0);
                    }
                    node = child;
                }
            }
        }

        if !created {
            if self.is_fresh(node) {
                return DownloadOutcome::cached(self.tree.node(node).error);
            }

            if !recursive && !self.tree.node(node).has(flags::FILE) {
                // node used to be a dir, now it's a file.
                self.remove_from_disk(node, false);
            }
        }

        let mut changed = false;
        let code = match uri.transport() {
            Transport::Rsync => match fetcher.fetch_subtree(uri) {
                Ok(()) => 0,
                Err(e) => e.code,
            },
            Transport::Https => match fetcher.fetch_object(uri) {
                Ok(new_bytes) => {
                    changed = new_bytes;
                    0
                }
                Err(e) => e.code,
            },
        };
        debug!(target: "rampart::val", "Downloaded '{}': code {}", uri, code);

        let now = now_second_precision();
        let target = self.tree.node_mut(node);
        target.error = code;
        target.flags = flags::DIRECT;
        target.ts_attempt = now;
        if code == 0 {
            target.flags |= flags::SUCCESS;
            if !recursive {
                target.flags |= flags::FILE;
            }
            target.ts_success = now;
        }
        // A direct fetch covers (or invalidates) everything below it.
        self.tree.drop_children(node);

        DownloadOutcome { code, changed }
    }

    /// A node is fresh when its last direct attempt happened during this
    /// run. Non-strict: an attempt stamped exactly at startup still counts.
    fn is_fresh(&self, id: NodeId) -> bool {
        let node = self.tree.node(id);
        node.has(flags::DIRECT) && self.startup_time <= node.ts_attempt
    }

    /// Absolute filesystem path of `id`'s mirror location.
    fn node_path(&self, id: NodeId) -> Option<PathBuf> {
        let mut pb = PathBuilder::new();

        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.tree.node(current);
            if let Err(e) = pb.append(&node.basename) {
                error!(
                    target: "rampart::val",
                    "Cannot build path for '{}': {}", node.basename, e
                );
                return None;
            }
            cursor = node.parent;
        }
        if let Err(e) = pb.append(&self.repository.to_string_lossy()) {
            error!(target: "rampart::val", "Cannot build path under repository: {}", e);
            return None;
        }

        pb.reverse();
        Some(pb.compile())
    }

    /// Best-effort removal of a node's on-disk counterpart during a mode
    /// flip. Failures are logged and the download proceeds; the sweep gets
    /// another chance at shutdown.
    fn remove_from_disk(&self, id: NodeId, is_file: bool) {
        let Some(path) = self.node_path(id) else {
            return;
        };

        let result = if is_file {
            fs::remove_file(&path)
        } else {
            fs::remove_dir_all(&path)
        };

        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                let kind = if is_file { "file" } else { "directory" };
                error!(
                    target: "rampart::val",
                    "Cannot override {} '{}': {}", kind, path.display(), e
                );
            }
        }
    }

    #[cfg(test)]
    fn tree(&self) -> &Tree {
        &self.tree
    }
}

/// Wall-clock now, truncated to whole seconds so that in-memory timestamps
/// survive the metadata round-trip unchanged.
fn now_second_precision() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

/// Remove a path of unknown kind, whole subtree included.
fn remove_any(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
