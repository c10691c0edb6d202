use std::collections::HashSet;

use crate::tile_system::types::TileId;

/// Notification that a requested tile is now cached, called as `(level, col, row)`.
///
/// Runs on a download worker thread.
pub type TileCallback = Box<dyn FnOnce(u8, u32, u32) + Send + 'static>;

/// A tile waiting for, or undergoing, download
pub struct DownloadRequest {
    pub id: TileId,
    pub callback: Option<TileCallback>,
}

impl DownloadRequest {
    pub fn new(id: TileId, callback: Option<TileCallback>) -> Self {
        Self { id, callback }
    }
}

/// Pending and in-flight downloads.
///
/// Pending requests form a stack: the most recently queued tile is dispatched
/// first, since it reflects what the viewer looks at now. A tile ID is in at
/// most one of the two sets at any time.
#[derive(Default)]
pub struct TileDownloadQueue {
    /// Requests waiting for a worker, newest last
    stack: Vec<DownloadRequest>,
    /// Tiles that are queued for download
    queued: HashSet<TileId>,
    /// Tiles that are currently being downloaded
    downloading: HashSet<TileId>,
}

impl TileDownloadQueue {
    /// Create a new, empty download queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a tile for download if not already queued or downloading.
    ///
    /// Returns `false` when the request was dropped as a duplicate.
    pub fn queue(&mut self, request: DownloadRequest) -> bool {
        if self.is_pending(&request.id) {
            return false;
        }
        self.queued.insert(request.id);
        self.stack.push(request);
        true
    }

    /// Take the newest queued request and mark it as downloading
    pub fn pop_next(&mut self) -> Option<DownloadRequest> {
        let request = self.stack.pop()?;
        self.queued.remove(&request.id);
        self.downloading.insert(request.id);
        Some(request)
    }

    /// Mark a tile as completed (no longer downloading)
    pub fn mark_completed(&mut self, id: &TileId) {
        self.downloading.remove(id);
    }

    /// Check if a tile is pending (queued or actively downloading)
    pub fn is_pending(&self, id: &TileId) -> bool {
        self.queued.contains(id) || self.downloading.contains(id)
    }

    /// Get the number of queued tiles
    pub fn queued_count(&self) -> usize {
        self.stack.len()
    }

    /// Get the number of tiles currently downloading
    pub fn downloading_count(&self) -> usize {
        self.downloading.len()
    }

    /// Drop every queued request; in-flight downloads stay tracked
    pub fn clear_queue(&mut self) {
        for request in self.stack.drain(..) {
            self.queued.remove(&request.id);
        }
    }
}
