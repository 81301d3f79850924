use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Tasks,
    Reminders,
    Settings,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [
        StorageKey::Tasks,
        StorageKey::Reminders,
        StorageKey::Settings,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            StorageKey::Tasks => "calendarTasks",
            StorageKey::Reminders => "calendarReminders",
            StorageKey::Settings => "calendarSettings",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_key())
    }
}

/// Keyed record storage. Records are opaque serialized strings; the adapter
/// has no knowledge of what they contain.
pub trait StorageAdapter {
    fn get(&self, key: StorageKey) -> anyhow::Result<Option<String>>;

    fn set(&mut self, key: StorageKey, record: &str) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: StorageKey) -> PathBuf {
        self.data_dir.join(key.file_name())
    }
}

impl StorageAdapter for FileStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: StorageKey) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no record on disk");
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    #[tracing::instrument(skip(self, record))]
    fn set(&mut self, key: StorageKey, record: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        write_atomic(&path, record).with_context(|| format!("failed to save {}", key.as_key()))
    }
}

/// In-process storage for tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<StorageKey, String>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, key: StorageKey, record: impl Into<String>) -> Self {
        self.records.insert(key, record.into());
        self
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn record(&self, key: StorageKey) -> Option<&str> {
        self.records.get(&key).map(String::as_str)
    }
}

impl StorageAdapter for MemoryStore {
    fn get(&self, key: StorageKey) -> anyhow::Result<Option<String>> {
        Ok(self.records.get(&key).cloned())
    }

    fn set(&mut self, key: StorageKey, record: &str) -> anyhow::Result<()> {
        if self.fail_writes {
            bail!("storage rejected write for {}", key.as_key());
        }
        self.records.insert(key, record.to_string());
        Ok(())
    }
}

pub fn load_record<T, S>(store: &S, key: StorageKey) -> anyhow::Result<Option<T>>
where
    T: DeserializeOwned,
    S: StorageAdapter + ?Sized,
{
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing stored {}", key.as_key()))?;
    Ok(Some(value))
}

pub fn save_record<T, S>(store: &mut S, key: StorageKey, value: &T) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    S: StorageAdapter + ?Sized,
{
    let serialized = serde_json::to_string(value)
        .with_context(|| format!("failed serializing {}", key.as_key()))?;
    store.set(key, &serialized)
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "saving record atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
