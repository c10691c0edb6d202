use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::tile_system::cache::TileCache;
use crate::tile_system::downloader::{DownloadRequest, TileCallback, TileDownloadQueue};
use crate::tile_system::loader::TileFetcher;
use crate::tile_system::storage::TileStorage;
use crate::tile_system::types::{MapDescriptor, TileId, TileImage};

struct SchedulerState {
    queue: TileDownloadQueue,
    closed: bool,
}

/// State shared by the monitor thread and the download workers
struct SchedulerShared {
    state: Mutex<SchedulerState>,
    /// Signalled on a new request, a freed worker slot and on close
    wakeup: Condvar,
    max_workers: usize,
    descriptor: Arc<MapDescriptor>,
    fetcher: Arc<dyn TileFetcher>,
    cache: Arc<TileCache>,
    storage: Arc<dyn TileStorage>,
}

impl SchedulerShared {
    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Bounded-concurrency tile downloader.
///
/// A monitor thread waits until a request is queued and a worker slot is
/// free, then hands the newest request to a fresh worker thread. Requests
/// for a tile that is already queued or downloading are ignored.
pub struct TileScheduler {
    shared: Arc<SchedulerShared>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl TileScheduler {
    pub fn new(
        descriptor: Arc<MapDescriptor>,
        fetcher: Arc<dyn TileFetcher>,
        cache: Arc<TileCache>,
        storage: Arc<dyn TileStorage>,
        max_workers: usize,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                state: Mutex::new(SchedulerState {
                    queue: TileDownloadQueue::new(),
                    closed: false,
                }),
                wakeup: Condvar::new(),
                max_workers: max_workers.max(1),
                descriptor,
                fetcher,
                cache,
                storage,
            }),
            monitor: Mutex::new(None),
        }
    }

    /// Spawn the monitor thread
    pub fn start(&self) -> std::io::Result<()> {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() || self.shared.is_closed() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("tile-monitor-{}", self.shared.descriptor.map_id))
            .spawn(move || run_monitor(shared))?;
        *monitor = Some(handle);
        Ok(())
    }

    /// Queue a tile for download; a no-op if it is already queued or downloading.
    ///
    /// Returns whether the request was accepted.
    pub fn request(&self, id: TileId, callback: Option<TileCallback>) -> bool {
        let mut state = self.shared.state.lock();
        if state.closed {
            return false;
        }
        let accepted = state.queue.queue(DownloadRequest::new(id, callback));
        if accepted {
            debug!("Queued tile {} for download", id);
            self.shared.wakeup.notify_all();
        }
        accepted
    }

    /// Check if a tile is queued or downloading
    pub fn is_pending(&self, id: &TileId) -> bool {
        self.shared.state.lock().queue.is_pending(id)
    }

    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.queued_count()
    }

    /// Number of workers currently downloading
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().queue.downloading_count()
    }

    /// Stop dispatching and wait for the monitor to exit.
    ///
    /// Workers already downloading are not interrupted; they skip their side
    /// effects once they see the closed flag.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.queue.clear_queue();
            self.shared.wakeup.notify_all();
        }

        if let Some(handle) = self.monitor.lock().take() {
            if handle.join().is_err() {
                warn!("Tile monitor for {} panicked", self.shared.descriptor.map_id);
            }
        }
    }
}

impl Drop for TileScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_monitor(shared: Arc<SchedulerShared>) {
    loop {
        let request = {
            let mut state = shared.state.lock();
            // Re-check both conditions after every wakeup
            while !state.closed
                && (state.queue.queued_count() == 0
                    || state.queue.downloading_count() >= shared.max_workers)
            {
                shared.wakeup.wait(&mut state);
            }
            if state.closed {
                break;
            }
            match state.queue.pop_next() {
                Some(request) => request,
                None => continue,
            }
        };

        let id = request.id;
        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(format!("tile-dl-{}", id))
            .spawn(move || run_worker(worker_shared, request));
        if let Err(e) = spawned {
            warn!("Failed to spawn download worker for {}: {}", id, e);
            release_slot(&shared, &id);
        }
    }
    info!("Tile monitor for {} stopped", shared.descriptor.map_id);
}

/// Frees the worker slot when the worker ends, panics included
struct SlotGuard<'a> {
    shared: &'a SchedulerShared,
    id: TileId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        release_slot(self.shared, &self.id);
    }
}

fn release_slot(shared: &SchedulerShared, id: &TileId) {
    let mut state = shared.state.lock();
    state.queue.mark_completed(id);
    shared.wakeup.notify_all();
}

fn run_worker(shared: Arc<SchedulerShared>, request: DownloadRequest) {
    let DownloadRequest { id, callback } = request;
    let _slot = SlotGuard {
        shared: &shared,
        id,
    };

    let url = shared.descriptor.tile_url(id);
    debug!("DL {}", url);

    let downloaded = shared.fetcher.fetch(&url).and_then(|bytes| {
        let tile = TileImage::decode(&bytes, shared.descriptor.tile_side)?;
        Ok((bytes, tile))
    });
    let (bytes, tile) = match downloaded {
        Ok(result) => result,
        Err(e) => {
            warn!("Failed to download tile {} from {}: {}", id, url, e);
            return;
        }
    };
    debug!("DL {} [SUCCESS]", url);

    if shared.is_closed() {
        return;
    }
    shared.cache.put(id, tile);

    if shared.is_closed() {
        return;
    }
    if let Some(callback) = callback {
        callback(id.level, id.col, id.row);
    }

    if shared.is_closed() {
        return;
    }
    shared.storage.put(id, bytes);
}
