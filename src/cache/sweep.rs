//! Cleanup sweeper
//!
//! One depth-first pass per transport root at shutdown, reconciling the
//! node tree with what is actually on disk: nodes without files go away,
//! files without nodes go away, and everything the current run did not use
//! is garbage. The pass is best-effort throughout; any I/O error is logged
//! and the sweep moves on. The surviving tree is then persisted.

use super::node::{flags, NodeId};
use super::{meta, remove_any, Cache};
use crate::path::PathBuilder;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::error;

impl Cache {
    /// Reconcile the mirror with this run's usage, then persist the
    /// surviving tree to `metadata.json`.
    pub fn cleanup(&mut self) {
        let mut pb = PathBuilder::new();
        if let Err(e) = pb.append(&self.repository.to_string_lossy()) {
            error!(target: "rampart::op", "Cannot clean up repository: {}", e);
            return;
        }

        let (rsync, https) = (self.rsync, self.https);
        self.clean_node(rsync, &mut pb);
        self.clean_node(https, &mut pb);

        if let Err(e) = pb.append("metadata.json") {
            error!(target: "rampart::op", "Cannot create metadata.json: {}", e);
            return;
        }
        meta::dump(&pb.peek(), &self.tree, &[self.rsync, self.https]);
    }

    fn clean_node(&mut self, id: NodeId, pb: &mut PathBuilder) {
        if let Err(e) = pb.append(&self.tree.node(id).basename) {
            error!(
                target: "rampart::op",
                "Cannot clean up directory (basename is '{}'): {}",
                self.tree.node(id).basename,
                e
            );
            return;
        }
        let path = pb.peek();

        match fs::symlink_metadata(&path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Node exists but file doesn't: delete node.
                self.tree.delete(id, false);
            }
            Err(e) => {
                error!(target: "rampart::op", "Cannot clean up '{}': {}", path.display(), e);
            }
            Ok(disk) => {
                if self.is_fresh(id) && self.tree.node(id).error == 0 {
                    // Node is active (ie. used recently): keep it.
                } else if disk.is_file() {
                    // Both node and file exist, but inactive: delete.
                    if let Err(e) = fs::remove_file(&path) {
                        error!(target: "rampart::op", "Cannot delete {}: {}", path.display(), e);
                    }
                    self.tree.delete(id, false);
                } else if disk.is_dir() {
                    // A child might still be fresh, so recurse.
                    self.clean_directory(id, pb, &path);
                } else {
                    // Outdated, not file nor directory: delete.
                    if let Err(e) = remove_any(&path) {
                        error!(target: "rampart::op", "Cannot delete {}: {}", path.display(), e);
                    }
                    self.tree.delete(id, false);
                }
            }
        }

        pb.pop();
    }

    fn clean_directory(&mut self, id: NodeId, pb: &mut PathBuilder, path: &Path) {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                error!(target: "rampart::op", "Cannot clean up '{}': {}", path.display(), e);
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(
                        target: "rampart::op",
                        "Cannot clean up directory (basename is '{}'): {}",
                        self.tree.node(id).basename,
                        e
                    );
                    continue;
                }
            };

            let name = entry.file_name();
            let child = name.to_str().and_then(|name| self.tree.child(id, name));
            match child {
                Some(child) => {
                    // File child's node does exist: recurse.
                    self.tree.node_mut(child).flags |= flags::FOUND;
                    self.clean_node(child, pb);
                }
                None => {
                    // File child's node does not exist: delete.
                    if let Err(e) = remove_any(&entry.path()) {
                        error!(
                            target: "rampart::op",
                            "Cannot delete {}: {}",
                            entry.path().display(),
                            e
                        );
                    }
                }
            }
        }

        // Children the walk did not find lost their files; delete them.
        // Survivors get the marker cleared before the next subtree runs.
        let children: Vec<NodeId> = self.tree.node(id).children.values().copied().collect();
        for child in children {
            if self.tree.node(child).has(flags::FOUND) {
                self.tree.node_mut(child).flags &= !flags::FOUND;
            } else {
                self.tree.delete(child, false);
            }
        }

        if self.tree.node(id).children.is_empty() && !self.tree.node(id).is_root() {
            // Node is inactive and we rm'd its children: delete.
            if let Err(e) = remove_any(path) {
                error!(target: "rampart::op", "Cannot delete {}: {}", path.display(), e);
            }
            self.tree.delete(id, false);
        }
    }
}
