//! 按键加锁 - 每个 (severity, fingerprint) 一个锁文件
//!
//! 两种实现在启动时选定一次：
//! - `FileLock`: fs2 独占锁（flock），同一个键的判断严格串行
//! - `NoopLock`: 平台不支持文件锁时的降级模式，先读后写，存在竞争窗口

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;
use tracing::{debug, warn};

pub use crate::error::LockError;

/// 锁模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// 独占文件锁可用
    Exclusive,
    /// 降级：无锁的 check-then-write
    Degraded,
}

impl LockMode {
    /// 探测目录所在文件系统是否支持文件锁
    ///
    /// 只有明确的"不支持"才降级；其他 IO 错误留到运行时按失败放行处理。
    pub fn detect(dir: &Path) -> LockMode {
        let probe = dir.join(".lock_probe");
        let result = std::fs::create_dir_all(dir).and_then(|_| {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&probe)?;
            file.lock_exclusive()?;
            file.unlock()
        });

        match result {
            Ok(()) => LockMode::Exclusive,
            Err(e) if is_lock_unsupported(&e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "File locking unavailable, cooldown store running in degraded mode"
                );
                LockMode::Degraded
            }
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Lock probe failed, keeping exclusive mode");
                LockMode::Exclusive
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Exclusive => "exclusive",
            LockMode::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 持有期间保持锁，drop 时释放
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
}

impl LockGuard {
    /// 不持有任何锁的 guard（降级模式）
    pub fn unlocked() -> Self {
        Self { file: None }
    }

    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            let _ = file.unlock();
        }
    }
}

/// 按键加锁的抽象
pub trait KeyLock: Send + Sync {
    /// 当前实现对应的模式
    fn mode(&self) -> LockMode;

    /// 阻塞直到拿到 `lock_path` 对应的锁
    fn acquire(&self, lock_path: &Path) -> Result<LockGuard, LockError>;
}

/// fs2 独占锁
#[derive(Debug, Default)]
pub struct FileLock;

impl KeyLock for FileLock {
    fn mode(&self) -> LockMode {
        LockMode::Exclusive
    }

    fn acquire(&self, lock_path: &Path) -> Result<LockGuard, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(LockError::Io)?;

        match file.lock_exclusive() {
            Ok(()) => Ok(LockGuard { file: Some(file) }),
            Err(e) if is_lock_unsupported(&e) => Err(LockError::Unavailable(e)),
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

/// 降级模式：不加锁
#[derive(Debug, Default)]
pub struct NoopLock;

impl KeyLock for NoopLock {
    fn mode(&self) -> LockMode {
        LockMode::Degraded
    }

    fn acquire(&self, _lock_path: &Path) -> Result<LockGuard, LockError> {
        Ok(LockGuard::unlocked())
    }
}

/// 根据模式选择实现
pub fn lock_for(mode: LockMode) -> Box<dyn KeyLock> {
    match mode {
        LockMode::Exclusive => Box::new(FileLock),
        LockMode::Degraded => Box::new(NoopLock),
    }
}

// ENOLCK / EOPNOTSUPP
#[cfg(target_os = "linux")]
const UNSUPPORTED_LOCK_ERRNOS: &[i32] = &[37, 95];
#[cfg(target_os = "macos")]
const UNSUPPORTED_LOCK_ERRNOS: &[i32] = &[77, 102];
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const UNSUPPORTED_LOCK_ERRNOS: &[i32] = &[];

fn is_lock_unsupported(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    e.raw_os_error()
        .is_some_and(|code| UNSUPPORTED_LOCK_ERRNOS.contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detect_on_local_tmp_is_exclusive() {
        let temp = tempdir().unwrap();
        assert_eq!(LockMode::detect(temp.path()), LockMode::Exclusive);
    }

    #[test]
    fn test_file_lock_guard_holds_lock() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("key.lock");

        let guard = FileLock.acquire(&path).unwrap();
        assert!(guard.is_locked());

        // 另一个文件句柄无法拿到锁
        let other = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(guard);
        assert!(other.try_lock_exclusive().is_ok());
    }

    #[test]
    fn test_noop_lock_never_locks() {
        let temp = tempdir().unwrap();
        let guard = NoopLock.acquire(&temp.path().join("key.lock")).unwrap();
        assert!(!guard.is_locked());
        assert_eq!(NoopLock.mode(), LockMode::Degraded);
    }

    #[test]
    fn test_unsupported_error_classification() {
        let e = io::Error::new(io::ErrorKind::Unsupported, "no locks here");
        assert!(is_lock_unsupported(&e));

        let e = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(!is_lock_unsupported(&e));
    }

    #[test]
    fn test_lock_error_keeps_io_source() {
        use std::error::Error;

        let err = LockError::Unavailable(io::Error::new(io::ErrorKind::Unsupported, "nfs"));
        assert_eq!(err.to_string(), "file lock unavailable: nfs");
        assert!(err.source().is_some());

        let err = LockError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(err.to_string().contains("denied"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_lock_for_mode() {
        assert_eq!(lock_for(LockMode::Exclusive).mode(), LockMode::Exclusive);
        assert_eq!(lock_for(LockMode::Degraded).mode(), LockMode::Degraded);
    }
}
