use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::storage::{
    Backend, StorageKey, WriteToken, key_path, read_json_file, read_json_file_blocking,
    write_json_atomic,
};

const EVENT_CAPACITY: usize = 64;
const KEYS: [StorageKey; 3] = [StorageKey::Todos, StorageKey::Categories, StorageKey::Settings];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Sync,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub area: StorageArea,
    pub changes: BTreeMap<StorageKey, ValueChange>,
    pub origin: Option<WriteToken>,
}

/// Shared syncing store. Every clone writes to the same directory and
/// publishes to the same change channel, so surfaces opened from one clone
/// family see each other's writes. Writes made by anyone else (another
/// process on the same directory) are picked up by a file watcher and
/// published without an origin.
#[derive(Debug, Clone)]
pub struct SyncArea {
    inner: Arc<SyncAreaInner>,
}

struct SyncAreaInner {
    shared: Arc<Shared>,
    // Dropping the watcher stops its thread.
    watcher: Option<notify::RecommendedWatcher>,
}

impl fmt::Debug for SyncAreaInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncAreaInner")
            .field("shared", &self.shared)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Shared {
    dir: PathBuf,
    events: broadcast::Sender<ChangeEvent>,
    /// Last value this clone family wrote or observed per key. Held across
    /// every write so the watcher never compares against a half-done one.
    known: Mutex<BTreeMap<StorageKey, Option<Value>>>,
}

impl Shared {
    fn publish(&self, key: StorageKey, change: ValueChange, origin: Option<WriteToken>) {
        let event = ChangeEvent {
            area: StorageArea::Sync,
            changes: BTreeMap::from([(key, change)]),
            origin,
        };
        match self.events.send(event) {
            Ok(receivers) => debug!(key = %key, receivers, "published change event"),
            Err(_) => debug!(key = %key, "no live subscribers for change event"),
        }
    }

    /// Runs on the watcher thread. A file that now differs from the last
    /// known value was written by someone outside this clone family.
    fn file_touched(&self, key: StorageKey) {
        // Read under the lock so a concurrent own write cannot slip between
        // the read and the comparison.
        let mut known = self.known.blocking_lock();
        let current = match read_json_file_blocking(&key_path(&self.dir, key)) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %format!("{err:#}"), "ignoring unreadable external change");
                return;
            }
        };
        let previous = known.get(&key).cloned().flatten();
        if previous == current {
            return;
        }
        known.insert(key, current.clone());
        drop(known);

        debug!(key = %key, "external change detected");
        self.publish(
            key,
            ValueChange {
                old_value: previous,
                new_value: current,
            },
            None,
        );
    }
}

impl SyncArea {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let mut known = BTreeMap::new();
        for key in KEYS {
            let value = read_json_file_blocking(&key_path(dir, key)).unwrap_or_else(|err| {
                warn!(key = %key, error = %format!("{err:#}"), "stored value unreadable; treating as empty");
                None
            });
            known.insert(key, value);
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            dir: dir.to_path_buf(),
            events,
            known: Mutex::new(known),
        });

        let watcher = match watch(dir, Arc::downgrade(&shared)) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!(
                    dir = %dir.display(),
                    error = %err,
                    "file watching unavailable; changes from other processes will not be seen"
                );
                None
            }
        };

        info!(dir = %dir.display(), watching = watcher.is_some(), "opened sync area");
        Ok(Self {
            inner: Arc::new(SyncAreaInner { shared, watcher }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.shared.events.subscribe()
    }

    pub fn dir(&self) -> &Path {
        &self.inner.shared.dir
    }
}

fn watch(dir: &Path, shared: Weak<Shared>) -> notify::Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        use notify::EventKind as K;

        let event = match event {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "file watcher error");
                return;
            }
        };
        if !matches!(event.kind, K::Create(_) | K::Modify(_) | K::Remove(_)) {
            return;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        for key in event.paths.iter().filter_map(|path| StorageKey::from_path(path)) {
            shared.file_touched(key);
        }
    })?;
    notify::Watcher::watch(&mut watcher, dir, notify::RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

impl Backend for SyncArea {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn read(&self, key: StorageKey) -> anyhow::Result<Option<Value>> {
        read_json_file(&key_path(self.dir(), key)).await
    }

    async fn write(
        &self,
        key: StorageKey,
        value: Value,
        origin: Option<WriteToken>,
    ) -> anyhow::Result<()> {
        let shared = &self.inner.shared;
        let mut known = shared.known.lock().await;
        let path = key_path(&shared.dir, key);

        let old_value = read_json_file(&path).await.unwrap_or_else(|err| {
            warn!(key = %key, error = %err, "previous value unreadable; reporting none");
            None
        });
        write_json_atomic(path, &value).await?;

        let new_value = (!value.is_null()).then_some(value);
        known.insert(key, new_value.clone());
        drop(known);

        if old_value == new_value {
            debug!(key = %key, "value unchanged; no change event");
            return Ok(());
        }
        shared.publish(
            key,
            ValueChange {
                old_value,
                new_value,
            },
            origin,
        );
        Ok(())
    }
}
