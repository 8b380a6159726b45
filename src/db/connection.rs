use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Command {
    Run(Job),
    Shutdown,
}

struct Worker {
    commands: mpsc::Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };
        if self.commands.send(Command::Shutdown).is_err() {
            warn!("Database thread already gone at shutdown");
        }
        if handle.join().is_err() {
            error!("Database thread panicked");
        }
    }
}

/// Handle to the SQLite connection owned by the `postura-db` worker thread.
///
/// Every statement runs on that one thread, so writes from the ingestion loop
/// and reads from request handlers are serialized without extra locking.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Arc<PathBuf>,
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path).context("failed to open SQLite database")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal mode unavailable: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    run_migrations(&mut conn).context("failed to run database migrations")?;
    Ok(conn)
}

fn serve(mut conn: Connection, commands: mpsc::Receiver<Command>) {
    for command in commands {
        match command {
            Command::Run(job) => job(&mut conn),
            Command::Shutdown => break,
        }
    }
    info!("Database thread shutting down");
}

impl Database {
    /// Opens (creating if needed) the database at `db_path` and migrates it
    /// before returning.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = db_path.clone();

        let thread = thread::Builder::new()
            .name("postura-db".into())
            .spawn(move || match open_connection(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, command_rx);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;
        info!("Database ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                commands: command_tx,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `task` on the worker thread and awaits its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .commands
            .send(Command::Run(job))
            .map_err(|_| anyhow!("database thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("postura.sqlite3");

        let db = Database::new(path.clone()).unwrap();

        assert_eq!(db.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_execute_returns_task_result() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();

        let version: i32 = db
            .execute(|conn| {
                Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
            })
            .await
            .unwrap();

        assert!(version > 0);
    }

    #[tokio::test]
    async fn test_execute_propagates_task_error() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("db.sqlite3")).unwrap();

        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("SELECT * FROM missing_table", [])?;
                Ok(())
            })
            .await;

        assert!(result.is_err());
    }
}
