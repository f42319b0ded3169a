//! File-backed session registry.
//!
//! The registry is a single JSON array, overwritten wholesale through a temp
//! file and rename. Every mutation goes through [`RegistryStore::update`],
//! which holds an exclusive advisory lock on `<registry>.lock` for the whole
//! load-mutate-save, so concurrent writers (poll cycles, pokes,
//! acknowledgements, possibly in different processes) serialize instead of
//! losing each other's updates. The OS drops the lock when its holder exits,
//! so a crashed writer never leaves the registry locked.
//! Plain [`RegistryStore::load`] takes no lock.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::fs::{self, OpenOptions};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{MonitorError, MonitorResult};
use crate::session::Registry;

const LOCK_RETRY: Duration = Duration::from_millis(25);

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Load/save access to the persisted registry snapshot.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.registry_path())
            .with_lock_timeout(Duration::from_millis(config.store.lock_timeout_ms))
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the current snapshot.
    ///
    /// Never fails: a missing, empty, unreadable or malformed file is an
    /// empty registry, and history is lost.
    pub async fn load(&self) -> Registry {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "registry unreadable, starting fresh");
                return Vec::new();
            }
        };

        match parse_registry(&raw) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "registry corrupt, starting fresh");
                Vec::new()
            }
        }
    }

    /// Atomically replace the snapshot. Does not take the lock; use
    /// [`update`](Self::update) for read-modify-write.
    pub async fn save(&self, registry: &Registry) -> MonitorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(registry)
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;

        let mut temp = self.path.as_os_str().to_owned();
        temp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let temp = PathBuf::from(temp);

        fs::write(&temp, &json).await?;
        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), sessions = registry.len(), "registry saved");
        Ok(())
    }

    /// Load, mutate and save under the registry lock.
    pub async fn update<F, R>(&self, mutate: F) -> MonitorResult<R>
    where
        F: FnOnce(&mut Registry) -> R,
    {
        let _guard = self.acquire_lock().await?;
        let mut registry = self.load().await;
        let result = mutate(&mut registry);
        self.save(&registry).await?;
        Ok(result)
    }

    async fn acquire_lock(&self) -> MonitorResult<LockGuard> {
        let lock = self.lock_path();
        if let Some(parent) = lock.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // The file itself is never removed; only the advisory lock on it matters.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock)
            .await?
            .into_std()
            .await;

        let started = Instant::now();
        loop {
            if try_lock_exclusive(&file)? {
                return Ok(LockGuard { _file: file });
            }
            if started.elapsed() >= self.lock_timeout {
                return Err(MonitorError::LockTimeout {
                    path: lock.display().to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }
}

/// Holds the registry lock; closing the file releases it.
struct LockGuard {
    _file: File,
}

/// Non-blocking exclusive lock. `Ok(false)` means another holder has it.
#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor comes from `file`, which stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => Ok(false),
        _ => Err(err),
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(std::fs::TryLockError::WouldBlock) => Ok(false),
        Err(std::fs::TryLockError::Error(e)) => Err(e),
    }
}

fn parse_registry(raw: &[u8]) -> Result<Registry, serde_json::Error> {
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionRecord, SessionStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RegistryStore {
        RegistryStore::new(dir.path().join("consoles.json"))
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        std::fs::write(s.path(), "[{\"pid\": 1, \"status\": ").unwrap();
        assert!(s.load().await.is_empty());

        std::fs::write(s.path(), "   \n").unwrap();
        assert!(s.load().await.is_empty());

        std::fs::write(s.path(), "{\"not\": \"an array\"}").unwrap();
        assert!(s.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_by_next_update() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        std::fs::write(s.path(), "garbage").unwrap();

        s.update(|reg| reg.push(SessionRecord::new(1, "a", None, "x", Utc::now())))
            .await
            .unwrap();

        let reg = s.load().await;
        assert_eq!(reg.len(), 1);
        assert_eq!(reg[0].id, 1);
    }

    #[tokio::test]
    async fn save_writes_pretty_array_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(&vec![SessionRecord::new(9, "t", None, "hello", Utc::now())])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(s.path()).unwrap();
        assert!(raw.starts_with("[\n"));
        assert!(raw.contains("\"pid\": 9"));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["consoles.json"]);
    }

    #[tokio::test]
    async fn update_releases_lock() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.update(|_| ()).await.unwrap();
        // A second update would time out if the lock leaked.
        s.clone()
            .with_lock_timeout(Duration::from_millis(50))
            .update(|_| ())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir).with_lock_timeout(Duration::from_millis(100));
        let _held = s.acquire_lock().await.unwrap();

        let err = s.update(|_| ()).await.unwrap_err();
        assert_eq!(err.kind(), "LOCK_TIMEOUT");
        // Nothing was written.
        assert!(!s.path().exists());
    }

    #[tokio::test]
    async fn leftover_lock_file_does_not_block() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir).with_lock_timeout(Duration::from_millis(100));
        // What a writer that died mid-update leaves behind.
        std::fs::write(s.lock_path(), "12345").unwrap();

        s.update(|reg| {
            let mut r = SessionRecord::new(3, "", None, "", Utc::now());
            r.status = SessionStatus::Handled;
            reg.push(r);
        })
        .await
        .unwrap();
        assert_eq!(s.load().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiters_on_a_leftover_lock_keep_every_write() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir).with_lock_timeout(Duration::from_secs(30));
        std::fs::write(s.lock_path(), "12345").unwrap();

        let mut tasks = Vec::new();
        for pid in 1..=40u32 {
            let s = s.clone();
            tasks.push(tokio::spawn(async move {
                s.update(move |reg| {
                    // Widen the window between load and save.
                    std::thread::sleep(Duration::from_millis(5));
                    reg.push(SessionRecord::new(pid, "", None, "", Utc::now()));
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut pids: Vec<u32> = s.load().await.iter().map(|r| r.id).collect();
        pids.sort_unstable();
        assert_eq!(pids, (1..=40).collect::<Vec<_>>());
    }
}
