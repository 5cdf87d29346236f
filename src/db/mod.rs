pub mod schema;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{Connection, InterruptHandle};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

/// One connection per store file, shared by every request.
pub type SharedConnection = Arc<Mutex<Connection>>;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) a store file at the given path with extensions loaded and
/// `schema_meta` initialized. Store tables are created by each adapter.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_meta(&conn).context("failed to initialize schema_meta")?;

    tracing::info!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Open an in-memory store, used by tests and throwaway runs.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_meta(&conn).context("failed to initialize schema_meta")?;
    Ok(conn)
}

pub fn shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Run a blocking closure against a shared connection on the blocking pool.
///
/// Dropping the returned future cancels the work: a closure still waiting for
/// the lock bails without touching the database, and a statement already
/// running is interrupted, rolling back its transaction.
pub async fn with_conn<T, F>(db: &SharedConnection, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    let cancel = CancelOnDrop::default();
    let state = Arc::clone(&cancel.state);

    let result = tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|e| anyhow!("db lock poisoned: {e}"))?;
        state.arm(conn.get_interrupt_handle())?;
        let result = f(&mut *conn);
        state.disarm();
        result
    })
    .await
    .context("db task failed");

    cancel.finish();
    result?
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    finished: AtomicBool,
    handle: Mutex<Option<InterruptHandle>>,
}

impl CancelState {
    /// Publish the interrupt handle, then refuse to start if already cancelled.
    fn arm(&self, handle: InterruptHandle) -> Result<()> {
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        if self.cancelled.load(Ordering::SeqCst) {
            bail!("db call cancelled before it started");
        }
        Ok(())
    }

    fn disarm(&self) {
        if let Ok(mut slot) = self.handle.lock() {
            slot.take();
        }
    }
}

#[derive(Default)]
struct CancelOnDrop {
    state: Arc<CancelState>,
}

impl CancelOnDrop {
    fn finish(&self) {
        self.state.finished.store(true, Ordering::SeqCst);
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.state.finished.load(Ordering::SeqCst) {
            return;
        }
        self.state.cancelled.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.state.handle.lock() {
            if let Some(handle) = slot.as_ref() {
                handle.interrupt();
            }
        }
    }
}

/// Result of [`check_database_health`] for one store file.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub embedding_model: Option<String>,
}

/// Run `PRAGMA integrity_check` and collect schema metadata.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let rows: Vec<String> = conn
        .prepare("PRAGMA integrity_check")?
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    let integrity_ok = rows.len() == 1 && rows[0] == "ok";

    let sqlite_vec_version: String = conn
        .query_row("SELECT vec_version()", [], |r| r.get(0))
        .unwrap_or_else(|_| "unavailable".to_string());

    Ok(HealthReport {
        integrity_ok,
        integrity_details: rows.join("; "),
        schema_version: schema::get_schema_version(conn)?,
        sqlite_vec_version,
        embedding_model: schema::get_embedding_model(conn)?,
    })
}
