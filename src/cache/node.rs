//! Cache node tree
//!
//! One node per path segment of the mirror, held in an arena and addressed
//! by `NodeId` handles. Parent links are plain handles; children are owned
//! through a basename-keyed map, so deleting a node frees its whole
//! subtree.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Node flag bits, persisted as an integer in `metadata.json`.
pub mod flags {
    /// The node itself was the target of a fetch, not merely an ancestor of
    /// one. Directly downloaded nodes are retained along with their
    /// ancestors; when the download succeeded they should have no children,
    /// as a subtree fetch already covers those.
    pub const DIRECT: u8 = 1 << 0;
    /// The last direct attempt succeeded.
    pub const SUCCESS: u8 = 1 << 1;
    /// Visited by the disk walk of an in-progress cleanup. Always cleared
    /// again before the cleanup finishes.
    pub const FOUND: u8 = 1 << 2;
    /// The node designates a file rather than a directory. Only ever set
    /// under the https root; rsync never reveals what it downloaded.
    pub const FILE: u8 = 1 << 3;

    /// Every bit above; anything else in a persisted flags word is noise.
    pub const ALL: u8 = DIRECT | SUCCESS | FOUND | FILE;
}

/// Handle to a node in a `Tree` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One path segment of the cache mirror.
#[derive(Debug)]
pub struct CacheNode {
    /// Simple file name, parents not included
    pub basename: String,

    /// `flags::*` bits
    pub flags: u8,
    /// Last successful download timestamp. (Only if `DIRECT | SUCCESS`.)
    pub ts_success: DateTime<Utc>,
    /// Last download attempt timestamp. (Only if `DIRECT`.)
    /// Decides whether the file needs to be updated.
    pub ts_attempt: DateTime<Utc>,
    /// Last download attempt's result status. (Only if `DIRECT`.)
    pub error: i32,

    pub parent: Option<NodeId>,
    pub children: HashMap<String, NodeId>,
}

impl CacheNode {
    fn new(basename: &str, parent: Option<NodeId>) -> Self {
        Self {
            basename: basename.to_string(),
            flags: 0,
            ts_success: DateTime::UNIX_EPOCH,
            ts_attempt: DateTime::UNIX_EPOCH,
            error: 0,
            parent,
            children: HashMap::new(),
        }
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Arena of cache nodes with free-slot reuse.
#[derive(Debug, Default)]
pub struct Tree {
    slots: Vec<Option<CacheNode>>,
    free: Vec<usize>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, node: CacheNode) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Create a parentless node. Roots are never reclaimed by `delete`
    /// unless forced.
    pub fn insert_root(&mut self, basename: &str) -> NodeId {
        let node = CacheNode::new(basename, None);
        self.alloc(node)
    }

    /// Create a child of `parent`, replacing any previous child with the
    /// same basename in the parent's map.
    pub fn add_child(&mut self, parent: NodeId, basename: &str) -> NodeId {
        let child = self.alloc(CacheNode::new(basename, Some(parent)));
        self.node_mut(parent)
            .children
            .insert(basename.to_string(), child);
        child
    }

    /// Look up a child of `parent` by basename.
    pub fn child(&self, parent: NodeId, basename: &str) -> Option<NodeId> {
        self.node(parent).children.get(basename).copied()
    }

    pub fn node(&self, id: NodeId) -> &CacheNode {
        self.slots[id.0].as_ref().expect("stale cache node handle")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CacheNode {
        self.slots[id.0].as_mut().expect("stale cache node handle")
    }

    /// Destroy every node below `id`, keeping `id` itself.
    pub fn drop_children(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();
        self.node_mut(id).children.clear();
        self.free_subtrees(children);
    }

    /// Destroy the subtree rooted at `id`.
    ///
    /// With `force = false` a parentless node survives (its children are
    /// still destroyed); with `force = true` the node goes too. The node is
    /// unlinked from its parent's children map before its slot is freed.
    pub fn delete(&mut self, id: NodeId, force: bool) {
        self.drop_children(id);

        if force || !self.node(id).is_root() {
            if let Some(parent) = self.node(id).parent {
                let basename = self.node(id).basename.clone();
                self.node_mut(parent).children.remove(&basename);
            }
            self.slots[id.0] = None;
            self.free.push(id.0);
        }
    }

    // Iterative teardown; an explicit stack instead of call recursion.
    fn free_subtrees(&mut self, roots: Vec<NodeId>) {
        let mut stack = roots;
        while let Some(id) = stack.pop() {
            if let Some(node) = self.slots[id.0].take() {
                stack.extend(node.children.values().copied());
                self.free.push(id.0);
            }
        }
    }

    /// Number of live nodes, roots included.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
