//! Path builder for cache tree traversals
//!
//! Accumulates path segments while walking the node tree, so the full
//! filesystem path of a node never has to be recomputed from scratch.
//! Appends are length-checked; the builder reports an error instead of
//! truncating.

use crate::error::{RampartError, RampartResult};
use std::path::PathBuf;

/// Upper bound on the byte length of a compiled path, separators included.
pub const MAX_PATH_LEN: usize = 4096;

/// Segment accumulator for filesystem paths.
///
/// `append`/`pop` are O(1) amortized; `peek` and `compile` join the
/// segments with the platform separator and are O(total length).
/// Dropping the builder discards it.
#[derive(Debug, Default)]
pub struct PathBuilder {
    segments: Vec<String>,
    // Byte length of the compiled result, separators included.
    len: usize,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a segment onto the end of the path.
    pub fn append(&mut self, segment: &str) -> RampartResult<()> {
        let extra = segment.len() + usize::from(!self.segments.is_empty());
        if self.len + extra > MAX_PATH_LEN {
            return Err(RampartError::PathTooLong {
                segment: segment.to_string(),
                length: self.len + extra,
                limit: MAX_PATH_LEN,
            });
        }

        self.segments.push(segment.to_string());
        self.len += extra;
        Ok(())
    }

    /// Remove the last segment. No-op on an empty builder.
    pub fn pop(&mut self) {
        if let Some(segment) = self.segments.pop() {
            self.len -= segment.len() + usize::from(!self.segments.is_empty());
        }
    }

    /// Reverse the segment order.
    ///
    /// Used after an ascent from a node to its root, to turn the
    /// child-to-root segment list into a root-to-child path.
    pub fn reverse(&mut self) {
        self.segments.reverse();
    }

    /// Join the accumulated segments without consuming the builder.
    pub fn peek(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Join the accumulated segments, consuming the builder.
    pub fn compile(self) -> PathBuf {
        self.segments.iter().collect()
    }
}
