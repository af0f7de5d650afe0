//! The durable decision log.
//!
//! State machine: CLOSED → OPEN (via `open`) → CLOSED (via `close`). Every
//! other operation requires OPEN and fails with `LogClosed` otherwise.
//!
//! While open, appended decisions sit in an in-memory buffer. A background
//! ticker checks the buffer on a fixed schedule and flushes when it has
//! reached `batch_size` decisions or has been sitting longer than
//! `write_frequency`. A flush swaps the buffer for an empty one under a
//! single lock, splits it into sub-batches of at most `batch_size`, and
//! hands each sub-batch to a pool of writer workers. Each worker opens its
//! own connection and commits its sub-batch in one transaction; workers may
//! commit out of sequence order, which is why `read_range` sorts by
//! sequence. A failed sub-batch is logged and does not affect its siblings.
//!
//! `decide`-side durability is therefore bounded, not immediate: a crash
//! between append and flush loses at most one flush window of decisions.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quarry_core::{Decision, LogConfig, MutationKind, Record, StoreError, StoreResult};
use rusqlite::{params, Connection};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS DECISION_LOG (
    SEQUENCE_ID   INTEGER PRIMARY KEY,
    DECISION_TIME TEXT NOT NULL,
    REQUEST_TYPE  TEXT NOT NULL,
    DATA_ID       TEXT NOT NULL,
    DATA          TEXT NOT NULL
)";

const INSERT_SQL: &str = "INSERT OR REPLACE INTO DECISION_LOG
    (SEQUENCE_ID, DECISION_TIME, REQUEST_TYPE, DATA_ID, DATA)
    VALUES (?1, ?2, ?3, ?4, ?5)";

/// Map a rusqlite error into the store's error surface.
fn persist(err: rusqlite::Error) -> StoreError {
    StoreError::Persistence(err.to_string())
}

/// Open a connection to the log database with a sane busy timeout, so
/// concurrently committing workers wait on the file lock instead of
/// failing immediately.
fn connect(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path).map_err(persist)?;
    conn.busy_timeout(Duration::from_secs(5)).map_err(persist)?;
    Ok(conn)
}

/// Insert one sub-batch of decisions inside a single transaction.
fn write_batch(path: &Path, rows: &[Decision]) -> StoreResult<()> {
    let mut conn = connect(path)?;
    let tx = conn.transaction().map_err(persist)?;
    {
        let mut stmt = tx.prepare(INSERT_SQL).map_err(persist)?;
        for decision in rows {
            let data = serde_json::to_string(&decision.record)?;
            stmt.execute(params![
                decision.sequence as i64,
                decision.decided_at.to_rfc3339(),
                decision.kind.as_str(),
                decision.record_id,
                data,
            ])
            .map_err(persist)?;
        }
    }
    tx.commit().map_err(persist)?;
    Ok(())
}

/// Decode one persisted row back into a `Decision`.
fn decode_row(
    sequence: i64,
    decided_at: String,
    request_type: String,
    record_id: String,
    data: String,
) -> StoreResult<Decision> {
    let kind = MutationKind::parse(&request_type).ok_or_else(|| {
        StoreError::Serialization(format!("unknown request type '{request_type}'"))
    })?;
    let decided_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&decided_at)
        .map_err(|e| StoreError::Serialization(format!("bad decision time: {e}")))?
        .with_timezone(&Utc);
    let record: Record = serde_json::from_str(&data)?;
    Ok(Decision {
        sequence: sequence as u64,
        kind,
        record_id,
        decided_at,
        record,
    })
}

/// Bounded pool of writer workers draining sub-batches off a shared queue.
struct WriterPool {
    tx: mpsc::Sender<Vec<Decision>>,
    workers: Vec<JoinHandle<()>>,
}

impl WriterPool {
    fn spawn(threads: usize, path: PathBuf) -> StoreResult<Self> {
        let (tx, rx) = mpsc::channel::<Vec<Decision>>();
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(threads.max(1));
        for worker in 0..threads.max(1) {
            let rx = Arc::clone(&rx);
            let path = path.clone();
            let handle = thread::Builder::new()
                .name(format!("quarry-log-writer-{worker}"))
                .spawn(move || loop {
                    // Hold the receiver lock only for the recv itself.
                    let job = rx.lock().recv();
                    match job {
                        Ok(rows) => {
                            if let Err(e) = write_batch(&path, &rows) {
                                tracing::error!(
                                    target: "quarry::log",
                                    error = %e,
                                    rows = rows.len(),
                                    "flush sub-batch failed"
                                );
                            }
                        }
                        // Channel closed: the log is shutting down.
                        Err(_) => break,
                    }
                })
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            workers.push(handle);
        }
        Ok(Self { tx, workers })
    }

    fn queue(&self) -> mpsc::Sender<Vec<Decision>> {
        self.tx.clone()
    }

    /// Close the queue and wait for every in-flight sub-batch to commit.
    fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Shared state between the log handle, the ticker, and `close`.
struct LogInner {
    cfg: LogConfig,
    buffer: Mutex<Vec<Decision>>,
    last_flush: Mutex<Instant>,
    open: AtomicBool,
    shutdown: AtomicBool,
}

impl LogInner {
    /// Swap the buffer out if a flush trigger fired; returns the drained
    /// decisions. Appends and the swap serialize on the buffer lock.
    fn take_if_ready(&self) -> Option<Vec<Decision>> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return None;
        }
        let stale = self.last_flush.lock().elapsed() > self.cfg.write_frequency;
        if buffer.len() >= self.cfg.batch_size || stale {
            let drained = std::mem::take(&mut *buffer);
            *self.last_flush.lock() = Instant::now();
            return Some(drained);
        }
        None
    }

    /// Unconditionally drain the buffer.
    fn take_all(&self) -> Vec<Decision> {
        let drained = std::mem::take(&mut *self.buffer.lock());
        *self.last_flush.lock() = Instant::now();
        drained
    }
}

/// The sequenced, persisted history of decisions.
pub struct DecisionLog {
    inner: Arc<LogInner>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    pool: Mutex<Option<WriterPool>>,
}

impl DecisionLog {
    /// Create a closed log. Nothing touches the disk until `open`.
    pub fn new(cfg: LogConfig) -> Self {
        Self {
            inner: Arc::new(LogInner {
                cfg,
                buffer: Mutex::new(Vec::new()),
                last_flush: Mutex::new(Instant::now()),
                open: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
            }),
            ticker: Mutex::new(None),
            pool: Mutex::new(None),
        }
    }

    /// CLOSED → OPEN: create the table if absent, start the flush ticker
    /// and the writer pool. Opening an already-open log is a no-op.
    pub fn open(&self) -> StoreResult<()> {
        if self.inner.open.load(Ordering::Acquire) {
            tracing::debug!(target: "quarry::log", "open called on an open log");
            return Ok(());
        }

        if let Some(parent) = self.inner.cfg.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Persistence(e.to_string()))?;
            }
        }
        let conn = connect(&self.inner.cfg.db_path)?;
        conn.execute(CREATE_TABLE_SQL, []).map_err(persist)?;

        let pool = WriterPool::spawn(
            self.inner.cfg.writer_threads,
            self.inner.cfg.db_path.clone(),
        )?;

        self.inner.shutdown.store(false, Ordering::Release);
        *self.inner.last_flush.lock() = Instant::now();
        self.inner.open.store(true, Ordering::Release);

        // The ticker checks the flush triggers well inside one
        // write-frequency interval, so a full buffer never waits a whole
        // interval to hit the disk.
        let tick = (self.inner.cfg.write_frequency / 8).max(Duration::from_millis(5));
        let inner = Arc::clone(&self.inner);
        let batch_size = self.inner.cfg.batch_size.max(1);
        let pool_tx = pool.queue();
        let ticker = thread::Builder::new()
            .name("quarry-log-ticker".to_string())
            .spawn(move || {
                while !inner.shutdown.load(Ordering::Acquire) {
                    thread::park_timeout(tick);
                    if let Some(drained) = inner.take_if_ready() {
                        tracing::debug!(
                            target: "quarry::log",
                            decisions = drained.len(),
                            "dispatching flush"
                        );
                        for chunk in drained.chunks(batch_size) {
                            let _ = pool_tx.send(chunk.to_vec());
                        }
                    }
                }
            })
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        *self.ticker.lock() = Some(ticker);
        *self.pool.lock() = Some(pool);
        tracing::info!(
            target: "quarry::log",
            path = %self.inner.cfg.db_path.display(),
            "decision log opened"
        );
        Ok(())
    }

    /// OPEN → CLOSED: stop the ticker, wait for in-flight sub-batches,
    /// then drain whatever is still buffered synchronously.
    pub fn close(&self) -> StoreResult<()> {
        if !self.inner.open.load(Ordering::Acquire) {
            return Ok(());
        }
        self.inner.shutdown.store(true, Ordering::Release);
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.thread().unpark();
            let _ = ticker.join();
        }
        if let Some(pool) = self.pool.lock().take() {
            pool.shutdown();
        }

        let remaining = self.inner.take_all();
        let mut result = Ok(());
        for chunk in remaining.chunks(self.inner.cfg.batch_size.max(1)) {
            if let Err(e) = write_batch(&self.inner.cfg.db_path, chunk) {
                tracing::error!(target: "quarry::log", error = %e, "final drain failed");
                result = Err(e);
            }
        }
        self.inner.open.store(false, Ordering::Release);
        tracing::info!(target: "quarry::log", "decision log closed");
        result
    }

    /// Whether the log is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    fn require_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::LogClosed)
        }
    }

    /// Buffer a decision for the next flush. Returns as soon as the
    /// decision is buffered, not when it is durable.
    pub fn append(&self, decision: Decision) -> StoreResult<()> {
        self.require_open()?;
        self.inner.buffer.lock().push(decision);
        Ok(())
    }

    /// Number of decisions currently buffered and not yet persisted.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Synchronously persist everything currently buffered, on the calling
    /// thread. Each sub-batch is attempted even if an earlier one failed;
    /// the first error is returned after all attempts.
    pub fn flush(&self) -> StoreResult<usize> {
        self.require_open()?;
        let drained = self.inner.take_all();
        let count = drained.len();
        let mut first_err = None;
        for chunk in drained.chunks(self.inner.cfg.batch_size.max(1)) {
            if let Err(e) = write_batch(&self.inner.cfg.db_path, chunk) {
                tracing::error!(target: "quarry::log", error = %e, "flush sub-batch failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Point delete: remove the persisted record for one sequence number.
    /// A buffered, unflushed copy of that sequence is scrubbed too, so a
    /// later flush cannot resurrect the row.
    pub fn wipe(&self, sequence: u64) -> StoreResult<()> {
        self.require_open()?;
        self.inner
            .buffer
            .lock()
            .retain(|d| d.sequence != sequence);
        let conn = connect(&self.inner.cfg.db_path)?;
        conn.execute(
            "DELETE FROM DECISION_LOG WHERE SEQUENCE_ID = ?1",
            params![sequence as i64],
        )
        .map_err(persist)?;
        Ok(())
    }

    /// Full delete: remove every persisted record and the whole buffer.
    pub fn wipe_all(&self) -> StoreResult<()> {
        self.require_open()?;
        self.inner.buffer.lock().clear();
        let conn = connect(&self.inner.cfg.db_path)?;
        conn.execute("DELETE FROM DECISION_LOG", [])
            .map_err(persist)?;
        tracing::info!(target: "quarry::log", "decision log wiped");
        Ok(())
    }

    /// All persisted decisions with sequence in `[start, end]`, ascending
    /// by sequence. Logical order, not physical write order, is what
    /// callers may rely on.
    pub fn read_range(&self, start: u64, end: u64) -> StoreResult<Vec<Decision>> {
        self.require_open()?;
        let conn = connect(&self.inner.cfg.db_path)?;
        let mut stmt = conn
            .prepare(
                "SELECT SEQUENCE_ID, DECISION_TIME, REQUEST_TYPE, DATA_ID, DATA
                 FROM DECISION_LOG
                 WHERE SEQUENCE_ID >= ?1 AND SEQUENCE_ID <= ?2
                 ORDER BY SEQUENCE_ID ASC",
            )
            .map_err(persist)?;
        let rows = stmt
            .query_map(params![start as i64, end as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(persist)?;

        let mut decisions = Vec::new();
        for row in rows {
            let (seq, time, kind, id, data) = row.map_err(persist)?;
            decisions.push(decode_row(seq, time, kind, id, data)?);
        }
        Ok(decisions)
    }

    /// Highest persisted sequence number, or 0 when the log is empty.
    pub fn last_sequence(&self) -> StoreResult<u64> {
        self.require_open()?;
        let conn = connect(&self.inner.cfg.db_path)?;
        let max: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(SEQUENCE_ID), 0) FROM DECISION_LOG",
                [],
                |row| row.get(0),
            )
            .map_err(persist)?;
        Ok(max as u64)
    }

    /// The configuration this log was built with.
    pub fn config(&self) -> &LogConfig {
        &self.inner.cfg
    }
}

impl Drop for DecisionLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for DecisionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionLog")
            .field("path", &self.inner.cfg.db_path)
            .field("open", &self.is_open())
            .field("buffered", &self.buffered())
            .finish()
    }
}
