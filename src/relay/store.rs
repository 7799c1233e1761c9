//! 持久化存储 - 跨进程重启存活的键值状态
//!
//! 只有三个键：待重发消息、上次停止时间、上次连通状态。
//! 不提供跨键事务，同一键的并发写入以最后写入者为准。

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// 待重发消息（最多一条，后失败的覆盖先失败的）
pub const PENDING_MESSAGE_KEY: &str = "pending_message";
/// 上次停止时间（Unix 毫秒）
pub const LAST_STOPPED_TIME_KEY: &str = "last_stopped_time";
/// 上次观察到的连通状态
pub const WAS_CONNECTED_KEY: &str = "was_connected";

/// 键值存储接口
pub trait PersistentStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>>;
    fn put_string(&self, key: &str, value: &str) -> Result<()>;
    fn get_i64(&self, key: &str) -> Result<Option<i64>>;
    fn put_i64(&self, key: &str, value: i64) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get_i64(key)?.map(|v| v != 0))
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put_i64(key, i64::from(value))
    }
}

/// 内存存储（测试与 dry-run 用）
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Value>) -> T) -> T {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut entries)
    }
}

impl PersistentStore for MemoryStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_entries(|e| e.get(key).and_then(|v| v.as_str().map(str::to_string))))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|e| e.insert(key.to_string(), Value::from(value)));
        Ok(())
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.with_entries(|e| e.get(key).and_then(Value::as_i64)))
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.with_entries(|e| e.insert(key.to_string(), Value::from(value)));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_entries(|e| e.remove(key));
        Ok(())
    }
}

/// JSON 文件存储
///
/// 所有键保存在一个 `state.json` 中；每次操作都持有 `state.lock` 的独占文件锁，
/// 写入经临时文件 + rename 原子替换。
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 在数据目录下创建存储
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// 持锁执行一次读-改-写
    fn locked<T>(&self, mutate: bool, f: impl FnOnce(&mut Map<String, Value>) -> T) -> Result<T> {
        use fs2::FileExt;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result: Result<T> = (|| {
            let mut state = self.load();
            let value = f(&mut state);
            if mutate {
                self.save(&state)?;
            }
            Ok(value)
        })();

        lock.unlock()?;
        result
    }

    fn load(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Map::new(),
        };

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file is corrupt, starting empty");
                Map::new()
            }
        }
    }

    fn save(&self, state: &Map<String, Value>) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            serde_json::to_writer_pretty(&file, state)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.locked(false, |s| s.get(key).and_then(|v| v.as_str().map(str::to_string)))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.locked(true, |s| {
            s.insert(key.to_string(), Value::from(value));
        })
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.locked(false, |s| s.get(key).and_then(Value::as_i64))
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.locked(true, |s| {
            s.insert(key.to_string(), Value::from(value));
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.locked(true, |s| {
            s.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), None);

        store.put_string(PENDING_MESSAGE_KEY, "A").unwrap();
        store.put_string(PENDING_MESSAGE_KEY, "B").unwrap();
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("B".to_string()));

        store.remove(PENDING_MESSAGE_KEY).unwrap();
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_bool_is_stored_as_integer() {
        let store = MemoryStore::new();
        assert_eq!(store.get_bool(WAS_CONNECTED_KEY).unwrap(), None);
        store.put_bool(WAS_CONNECTED_KEY, false).unwrap();
        assert_eq!(store.get_bool(WAS_CONNECTED_KEY).unwrap(), Some(false));
        assert_eq!(store.get_i64(WAS_CONNECTED_KEY).unwrap(), Some(0));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::in_dir(dir.path());

        store.put_string(PENDING_MESSAGE_KEY, "대기 중").unwrap();
        store.put_i64(LAST_STOPPED_TIME_KEY, 1_700_000_000_000).unwrap();

        let reopened = JsonFileStore::in_dir(dir.path());
        assert_eq!(reopened.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("대기 중".to_string()));
        assert_eq!(reopened.get_i64(LAST_STOPPED_TIME_KEY).unwrap(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::in_dir(&dir.path().join("nested"));
        assert_eq!(store.get_i64(LAST_STOPPED_TIME_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), None);
        store.put_string(PENDING_MESSAGE_KEY, "x").unwrap();
        assert_eq!(store.get_string(PENDING_MESSAGE_KEY).unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_type_mismatch_reads_as_absent() {
        let store = MemoryStore::new();
        store.put_string(LAST_STOPPED_TIME_KEY, "yesterday").unwrap();
        assert_eq!(store.get_i64(LAST_STOPPED_TIME_KEY).unwrap(), None);
    }
}
