use std::fmt;
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::settings::Settings;
use crate::sync_area::SyncArea;
use crate::task::{Task, decode_tasks};

/// Named blobs shared by every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKey {
    Todos,
    Categories,
    Settings,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todos => "todos",
            Self::Categories => "categories",
            Self::Settings => "settings",
        }
    }

    fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Inverse of the on-disk naming; temp files and strangers map to `None`.
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_name()?.to_str()?.strip_suffix(".json")?;
        [Self::Todos, Self::Categories, Self::Settings]
            .into_iter()
            .find(|key| key.as_str() == stem)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attached to every write a surface makes to the sync area, so the change
/// event that write produces can be recognized as an echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteToken {
    pub surface: SurfaceId,
    pub seq: u64,
}

#[derive(Debug)]
pub struct WriteOrigin {
    surface: SurfaceId,
    issued: AtomicU64,
}

impl WriteOrigin {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            issued: AtomicU64::new(0),
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn issue(&self) -> WriteToken {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        WriteToken {
            surface: self.surface,
            seq,
        }
    }

    pub fn last_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn issued(&self, token: &WriteToken) -> bool {
        token.surface == self.surface && token.seq > 0 && token.seq <= self.last_issued()
    }
}

/// Key-value storage reachable by the adapter.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn read(&self, key: StorageKey) -> impl Future<Output = anyhow::Result<Option<Value>>> + Send;

    fn write(
        &self,
        key: StorageKey,
        value: Value,
        origin: Option<WriteToken>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Local-only fallback: one JSON file per key, no change events.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened local storage");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn read(&self, key: StorageKey) -> anyhow::Result<Option<Value>> {
        read_json_file(&key_path(&self.dir, key)).await
    }

    async fn write(
        &self,
        key: StorageKey,
        value: Value,
        _origin: Option<WriteToken>,
    ) -> anyhow::Result<()> {
        write_json_atomic(key_path(&self.dir, key), &value).await
    }
}

pub(crate) fn key_path(dir: &Path, key: StorageKey) -> PathBuf {
    dir.join(key.file_name())
}

pub(crate) async fn read_json_file(path: &Path) -> anyhow::Result<Option<Value>> {
    debug!(file = %path.display(), "reading json");
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };

    decode_json_text(&text, path)
}

/// Same as [`read_json_file`], for callers outside the runtime (the file
/// watcher thread).
pub(crate) fn read_json_file_blocking(path: &Path) -> anyhow::Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };
    decode_json_text(&text, path)
}

fn decode_json_text(text: &str, path: &Path) -> anyhow::Result<Option<Value>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    Ok((!value.is_null()).then_some(value))
}

pub(crate) async fn write_json_atomic(path: PathBuf, value: &Value) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(value)?;
    debug!(file = %path.display(), bytes = payload.len(), "writing json atomically");

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&payload)?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    })
    .await
    .context("blocking write task failed")?
}

/// Stateless pass-through over a primary (syncing) backend and a local
/// fallback. Nothing here ever reports failure to the caller: writes are
/// best effort and reads degrade to "nothing stored".
#[derive(Debug)]
pub struct PersistenceAdapter<P = SyncArea, F = LocalBackend> {
    primary: Option<P>,
    fallback: F,
    origin: Arc<WriteOrigin>,
}

impl<P, F> PersistenceAdapter<P, F>
where
    P: Backend,
    F: Backend,
{
    pub fn new(primary: Option<P>, fallback: F) -> Self {
        Self::with_origin(primary, fallback, SurfaceId::new())
    }

    pub fn with_origin(primary: Option<P>, fallback: F, surface: SurfaceId) -> Self {
        Self {
            primary,
            fallback,
            origin: Arc::new(WriteOrigin::new(surface)),
        }
    }

    pub fn origin(&self) -> Arc<WriteOrigin> {
        Arc::clone(&self.origin)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    #[cfg(test)]
    pub(crate) fn primary(&self) -> Option<&P> {
        self.primary.as_ref()
    }

    #[tracing::instrument(skip(self, value))]
    pub async fn save<T>(&self, key: StorageKey, value: &T)
    where
        T: Serialize + ?Sized,
    {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                error!(error = %err, "failed to serialize value; dropping write");
                return;
            }
        };

        if let Some(primary) = &self.primary {
            let token = self.origin.issue();
            match primary.write(key, value.clone(), Some(token)).await {
                Ok(()) => {
                    debug!(backend = primary.name(), seq = token.seq, "saved");
                    return;
                }
                Err(err) => {
                    let detail = format!("{err:#}");
                    warn!(
                        backend = primary.name(),
                        error = %detail,
                        "primary write failed; retrying on fallback"
                    );
                }
            }
        }

        match self.fallback.write(key, value, None).await {
            Ok(()) => debug!(backend = self.fallback.name(), "saved"),
            Err(err) => {
                let detail = format!("{err:#}");
                error!(
                    backend = self.fallback.name(),
                    error = %detail,
                    "fallback write failed; dropping write"
                );
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn load<T>(&self, key: StorageKey) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if let Some(primary) = &self.primary {
            match read_decoded(primary, key).await {
                Ok(found) => return found,
                Err(err) => {
                    let detail = format!("{err:#}");
                    warn!(
                        backend = primary.name(),
                        error = %detail,
                        "primary read failed; reading fallback"
                    );
                }
            }
        }

        match read_decoded(&self.fallback, key).await {
            Ok(found) => found,
            Err(err) => {
                let detail = format!("{err:#}");
                error!(
                    backend = self.fallback.name(),
                    error = %detail,
                    "fallback read failed; using default"
                );
                None
            }
        }
    }

    pub async fn save_tasks(&self, tasks: &[Task]) {
        self.save(StorageKey::Todos, tasks).await;
    }

    pub async fn load_tasks(&self) -> Vec<Task> {
        let records: Vec<Value> = self.load(StorageKey::Todos).await.unwrap_or_default();
        let mut tasks = decode_tasks(records);
        tasks.iter_mut().for_each(Task::normalize);
        tasks
    }

    pub async fn save_categories(&self, categories: &[String]) {
        self.save(StorageKey::Categories, categories).await;
    }

    pub async fn load_categories(&self) -> Vec<String> {
        self.load(StorageKey::Categories).await.unwrap_or_default()
    }

    pub async fn save_settings(&self, settings: &Settings) {
        self.save(StorageKey::Settings, settings).await;
    }

    /// `None` when nothing usable is stored; otherwise the stored blob
    /// defaulted field by field.
    pub async fn load_settings(&self) -> Option<Settings> {
        let raw: Value = self.load(StorageKey::Settings).await?;
        Some(Settings::merged(&Settings::default(), &raw))
    }
}

async fn read_decoded<T, B>(backend: &B, key: StorageKey) -> anyhow::Result<Option<T>>
where
    T: DeserializeOwned,
    B: Backend,
{
    let Some(raw) = backend.read(key).await? else {
        return Ok(None);
    };
    let decoded = serde_json::from_value(raw)
        .with_context(|| format!("failed decoding {key} from {} storage", backend.name()))?;
    Ok(Some(decoded))
}


#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::testing::{BrokenBackend, MemoryBackend};
    use super::{PersistenceAdapter, StorageKey};
    use crate::task::Task;

    #[tokio::test]
    async fn primary_write_failure_lands_in_fallback() {
        let adapter = PersistenceAdapter::new(Some(BrokenBackend), MemoryBackend::default());
        let task = Task::new_active("Buy milk".to_string(), Utc::now());

        adapter.save_tasks(std::slice::from_ref(&task)).await;

        let loaded = adapter.load_tasks().await;
        assert_eq!(loaded, vec![task]);
    }

    #[tokio::test]
    async fn one_bad_task_record_does_not_hide_the_others() {
        let primary = MemoryBackend::default();
        primary.values.lock().expect("lock").insert(
            StorageKey::Todos,
            json!([
                {"id": "a1", "title": "valid", "createdAt": "2026-03-01T08:00:00Z"},
                {"id": "a2", "title": "odd", "priority": "urgent", "createdAt": "2026-03-01T09:00:00Z"},
                {"id": "a3", "title": "no createdAt"}
            ]),
        );
        let adapter = PersistenceAdapter::new(Some(primary), MemoryBackend::default());

        let loaded = adapter.load_tasks().await;
        let ids: Vec<&str> = loaded.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(loaded[1].priority, tasko_shared::Priority::Medium);
    }

    #[tokio::test]
    async fn double_failure_yields_defaults() {
        let adapter: PersistenceAdapter<BrokenBackend, BrokenBackend> =
            PersistenceAdapter::new(Some(BrokenBackend), BrokenBackend);

        adapter.save_categories(&["work".to_string()]).await;

        assert!(adapter.load_tasks().await.is_empty());
        assert!(adapter.load_categories().await.is_empty());
        assert!(adapter.load_settings().await.is_none());
    }

    #[tokio::test]
    async fn without_primary_everything_goes_local() {
        let adapter: PersistenceAdapter<MemoryBackend, MemoryBackend> =
            PersistenceAdapter::new(None, MemoryBackend::default());

        adapter.save_categories(&["errands".to_string()]).await;
        assert_eq!(adapter.load_categories().await, vec!["errands".to_string()]);
        assert!(!adapter.has_primary());
    }

    #[tokio::test]
    async fn undecodable_primary_value_reads_fallback() {
        let primary = MemoryBackend::default();
        primary.put(StorageKey::Categories, json!({"not": "a list"}));
        let fallback = MemoryBackend::default();
        fallback.put(StorageKey::Categories, json!(["home"]));

        let adapter = PersistenceAdapter::new(Some(primary), fallback);
        assert_eq!(adapter.load_categories().await, vec!["home".to_string()]);
    }

    #[tokio::test]
    async fn missing_primary_key_does_not_consult_fallback() {
        let fallback = MemoryBackend::default();
        fallback.put(StorageKey::Categories, json!(["stale"]));

        let adapter = PersistenceAdapter::new(Some(MemoryBackend::default()), fallback);
        assert!(adapter.load_categories().await.is_empty());
    }

    #[tokio::test]
    async fn primary_writes_carry_increasing_tokens() {
        let adapter: PersistenceAdapter<MemoryBackend, MemoryBackend> =
            PersistenceAdapter::new(Some(MemoryBackend::default()), MemoryBackend::default());

        adapter.save_categories(&[]).await;
        adapter.save_categories(&["a".to_string()]).await;

        let origin = adapter.origin();
        assert_eq!(origin.last_issued(), 2);
        let primary = adapter.primary().expect("primary backend");
        let tokens = primary.tokens.lock().expect("memory lock").clone();
        assert_eq!(tokens.iter().map(|t| t.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert!(tokens.iter().all(|t| origin.issued(t)));
    }

    #[tokio::test]
    async fn settings_blob_is_defaulted_on_load() {
        let primary = MemoryBackend::default();
        primary.put(StorageKey::Settings, json!({"theme": "dark", "name": "Ada"}));
        let adapter = PersistenceAdapter::new(Some(primary), MemoryBackend::default());

        let settings = adapter.load_settings().await.expect("settings stored");
        assert_eq!(settings.name, "Ada");
        assert!(settings.widgets.is_empty());
        assert_eq!(settings.shortcuts.new_task, "n");
        assert!(!settings.search_engines.is_empty());
    }
}
