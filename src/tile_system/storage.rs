//! Durable per-map tile storage.
//!
//! [`SqliteTileStore`] keeps tiles in an MBTiles-style SQLite file. A SQLite
//! connection is owned by one actor thread for its whole life; every other
//! thread talks to it through channels, so the connection itself never needs
//! to be shared or locked. [`FileTileStore`] is the plain directory tree
//! alternative.

use crossbeam_channel::{
    bounded, select, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[cfg(feature = "tile_debug")]
use tracing::trace;

use crate::resources::constants::STORE_READ_QUEUE;
use crate::tile_system::types::{MapDescriptor, TileId};

/// Error type for persistent store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The actor didn't take or answer the request in time
    #[error("tile store is busy")]
    Busy,
    #[error("tile store has not been started")]
    NotStarted,
    #[error("tile store is closed")]
    Closed,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Durable tile bytes for one map, keyed by (level, column, row).
pub trait TileStorage: Send + Sync {
    /// Open or create the store. Calling it again on a running store is a no-op.
    fn start(&self) -> Result<(), StoreError>;

    /// Store tile bytes. Never blocks on the storage and never reports back:
    /// failures are logged and the tile is dropped.
    fn put(&self, id: TileId, data: Vec<u8>);

    /// Read tile bytes, `None` if the tile isn't stored
    fn get(&self, id: TileId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Flush pending writes and release the storage; blocks until done
    fn close(&self);
}

struct ReadRequest {
    id: TileId,
    reply: Sender<Result<Option<Vec<u8>>, StoreError>>,
}

enum WriteCommand {
    Put { id: TileId, data: Vec<u8> },
    Shutdown,
}

struct ActorHandle {
    reads: Sender<ReadRequest>,
    writes: Sender<WriteCommand>,
    thread: JoinHandle<()>,
}

enum ActorState {
    Idle,
    Running(ActorHandle),
    Closed,
}

/// SQLite-backed store in the MBTiles layout
pub struct SqliteTileStore {
    path: PathBuf,
    descriptor: Arc<MapDescriptor>,
    read_timeout: Duration,
    state: Mutex<ActorState>,
}

impl SqliteTileStore {
    /// A store for `descriptor` at `<cache_dir>/<map_id>.mbtiles`; nothing is
    /// opened until [`TileStorage::start`].
    pub fn new(cache_dir: &Path, descriptor: Arc<MapDescriptor>, read_timeout: Duration) -> Self {
        let path = cache_dir.join(format!("{}.mbtiles", descriptor.map_id));
        Self {
            path,
            descriptor,
            read_timeout,
            state: Mutex::new(ActorState::Idle),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TileStorage for SqliteTileStore {
    fn start(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        match *state {
            ActorState::Running(_) => return Ok(()),
            ActorState::Closed => return Err(StoreError::Closed),
            ActorState::Idle => {}
        }

        let (reads_tx, reads_rx) = bounded::<ReadRequest>(STORE_READ_QUEUE);
        let (writes_tx, writes_rx) = unbounded::<WriteCommand>();
        let (ready_tx, ready_rx) = bounded::<Result<(), StoreError>>(1);

        let path = self.path.clone();
        let descriptor = Arc::clone(&self.descriptor);
        let thread = thread::Builder::new()
            .name(format!("tile-store-{}", descriptor.map_id))
            .spawn(move || {
                let conn = match open_database(&path, &descriptor) {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_actor(conn, reads_rx, writes_rx);
            })?;

        // The actor reports once the connection is open
        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(StoreError::Closed);
            }
        }

        info!("Opened tile store {}", self.path.display());
        *state = ActorState::Running(ActorHandle {
            reads: reads_tx,
            writes: writes_tx,
            thread,
        });
        Ok(())
    }

    fn put(&self, id: TileId, data: Vec<u8>) {
        let state = self.state.lock();
        let ActorState::Running(handle) = &*state else {
            debug!("Tile store {} not running, dropping tile {}", self.descriptor.map_id, id);
            return;
        };
        if handle.writes.send(WriteCommand::Put { id, data }).is_err() {
            warn!("Tile store actor for {} is gone, dropping tile {}", self.descriptor.map_id, id);
        }
    }

    fn get(&self, id: TileId) -> Result<Option<Vec<u8>>, StoreError> {
        let reads = match &*self.state.lock() {
            ActorState::Running(handle) => handle.reads.clone(),
            ActorState::Idle => return Err(StoreError::NotStarted),
            ActorState::Closed => return Err(StoreError::Closed),
        };

        let (reply_tx, reply_rx) = bounded(1);
        reads
            .send_timeout(ReadRequest { id, reply: reply_tx }, self.read_timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => StoreError::Busy,
                SendTimeoutError::Disconnected(_) => StoreError::Closed,
            })?;

        match reply_rx.recv_timeout(self.read_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::Busy),
            Err(RecvTimeoutError::Disconnected) => Err(StoreError::Closed),
        }
    }

    fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ActorState::Closed);
        let ActorState::Running(handle) = previous else {
            return;
        };

        // Queued behind every pending write, so those land first
        let _ = handle.writes.send(WriteCommand::Shutdown);
        if handle.thread.join().is_err() {
            warn!("Tile store actor for {} panicked", self.descriptor.map_id);
        }
        info!("Closed tile store {}", self.path.display());
    }
}

impl Drop for SqliteTileStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// The actor loop: sole owner of the connection
fn run_actor(conn: Connection, reads: Receiver<ReadRequest>, writes: Receiver<WriteCommand>) {
    loop {
        // Readers are blocked waiting, serve them before writes
        while let Ok(request) = reads.try_recv() {
            serve_read(&conn, request);
        }

        select! {
            recv(reads) -> msg => match msg {
                Ok(request) => serve_read(&conn, request),
                Err(_) => break,
            },
            recv(writes) -> msg => match msg {
                Ok(WriteCommand::Put { id, data }) => {
                    if let Err(e) = write_tile(&conn, id, &data) {
                        warn!("Failed to store tile {}: {}", id, e);
                    }
                }
                Ok(WriteCommand::Shutdown) | Err(_) => break,
            },
        }
    }
    // Answer whoever is still waiting; their replies would otherwise time out
    while let Ok(request) = reads.try_recv() {
        let _ = request.reply.send(Err(StoreError::Closed));
    }
}

fn serve_read(conn: &Connection, request: ReadRequest) {
    let result = read_tile(conn, request.id).map_err(StoreError::from);
    // The caller may have timed out already
    let _ = request.reply.send(result);
}

fn open_database(path: &Path, descriptor: &MapDescriptor) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;

    let tables: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'tiles'",
        [],
        |row| row.get(0),
    )?;
    if tables == 0 {
        init_schema(&mut conn, descriptor)?;
        info!("Created tile store schema for {}", descriptor.map_id);
    }
    Ok(conn)
}

fn init_schema(conn: &mut Connection, descriptor: &MapDescriptor) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TABLE metadata (name TEXT PRIMARY KEY, value TEXT);
         CREATE TABLE tiles (
             zoom_level  INTEGER,
             tile_column INTEGER,
             tile_row    INTEGER,
             tile_data   BLOB NOT NULL,
             PRIMARY KEY (zoom_level, tile_column, tile_row)
         );",
    )?;
    {
        let mut insert = tx.prepare("INSERT INTO metadata (name, value) VALUES (?1, ?2)")?;
        for (name, value) in metadata_entries(descriptor) {
            insert.execute(params![name, value])?;
        }
    }
    tx.commit()
}

fn metadata_entries(descriptor: &MapDescriptor) -> [(&'static str, String); 6] {
    [
        ("name", descriptor.map_id.clone()),
        ("type", "overlay".to_string()),
        ("version", "1.0".to_string()),
        ("description", descriptor.title.clone()),
        ("format", descriptor.tile_format.clone()),
        ("bounds", descriptor.bounds_text()),
    ]
}

fn write_tile(conn: &Connection, id: TileId, data: &[u8]) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
        params![id.level, id.col, id.row, data],
    )?;
    #[cfg(feature = "tile_debug")]
    trace!("Stored tile {} ({} bytes)", id, data.len());
    Ok(())
}

fn read_tile(conn: &Connection, id: TileId) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        params![id.level, id.col, id.row],
        |row| row.get(0),
    )
    .optional()
}

/// Tiles as individual files under `<cache_dir>/<map_id>/<col>/`.
///
/// The column directory keeps the number of files per folder down.
pub struct FileTileStore {
    root: PathBuf,
    extension: String,
}

impl FileTileStore {
    pub fn new(cache_dir: &Path, descriptor: &MapDescriptor) -> Self {
        Self {
            root: descriptor.cache_path(cache_dir),
            extension: descriptor.tile_format.clone(),
        }
    }

    /// Get cache file path for a tile
    pub fn tile_path(&self, id: TileId) -> PathBuf {
        self.root
            .join(id.col.to_string())
            .join(format!("{}-{}-{}.{}", id.level, id.col, id.row, self.extension))
    }
}

impl TileStorage for FileTileStore {
    fn start(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        info!("Using tile directory {}", self.root.display());
        Ok(())
    }

    fn put(&self, id: TileId, data: Vec<u8>) {
        let path = self.tile_path(id);
        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&path, &data));
        match written {
            Ok(()) => debug!("Saved tile {} to {}", id, path.display()),
            Err(e) => warn!("Failed to cache tile {}: {}", id, e),
        }
    }

    fn get(&self, id: TileId) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.tile_path(id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&self) {}
}
