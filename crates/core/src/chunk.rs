//! Chunk bookkeeping for server-mode uploads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tracks which chunks of a server-mode upload have landed.
///
/// Chunk indexes are zero-based. The sets are ordered so that serialized
/// sessions are deterministic and resume scans walk chunks in index order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Total number of chunks for the file.
    pub total_chunks: u32,
    /// Size of each chunk in bytes (the final chunk may be smaller).
    pub chunk_size: u64,
    /// Indexes of chunks that have been written to staging.
    pub uploaded_chunks: BTreeSet<u32>,
    /// Indexes of chunks that failed or went missing and need re-upload.
    pub failed_chunks: BTreeSet<u32>,
}

impl ChunkInfo {
    /// Create tracking state for a known chunk count.
    pub fn new(total_chunks: u32, chunk_size: u64) -> Self {
        Self {
            total_chunks,
            chunk_size,
            uploaded_chunks: BTreeSet::new(),
            failed_chunks: BTreeSet::new(),
        }
    }

    /// Create tracking state for a file, deriving the chunk count.
    pub fn for_file(file_size: u64, chunk_size: u64) -> Self {
        let total = file_size.div_ceil(chunk_size);
        Self::new(total as u32, chunk_size)
    }

    /// Whether `index` is a valid chunk index for this upload.
    pub fn contains_index(&self, index: u32) -> bool {
        index < self.total_chunks
    }

    /// Record a chunk as uploaded. Clears any earlier failure for the same
    /// index. Re-recording an already uploaded chunk is a no-op.
    pub fn record_uploaded(&mut self, index: u32) {
        self.uploaded_chunks.insert(index);
        self.failed_chunks.remove(&index);
    }

    /// Record a chunk write failure so resume knows what to re-request.
    pub fn record_failed(&mut self, index: u32) {
        if !self.uploaded_chunks.contains(&index) {
            self.failed_chunks.insert(index);
        }
    }

    /// Whether every chunk has been uploaded.
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks.len() as u32 >= self.total_chunks
    }

    /// Number of chunks still missing.
    pub fn remaining(&self) -> u32 {
        self.total_chunks
            .saturating_sub(self.uploaded_chunks.len() as u32)
    }

    /// Upload completion as a whole percentage, rounded.
    pub fn progress_percent(&self) -> u8 {
        if self.total_chunks == 0 {
            return 100;
        }
        let ratio = self.uploaded_chunks.len() as f64 / self.total_chunks as f64;
        (ratio * 100.0).round() as u8
    }
}
