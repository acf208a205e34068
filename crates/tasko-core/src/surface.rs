use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tasko_shared::{TaskStats, Theme};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::notifier::{ChangeNotifier, SyncUpdate};
use crate::quick_input::QuickAction;
use crate::settings::Settings;
use crate::storage::{LocalBackend, PersistenceAdapter, StorageKey, SurfaceId};
use crate::store::TaskStore;
use crate::sync_area::SyncArea;
use crate::task::Task;

const SYNC_DIR: &str = "sync";
const LOCAL_DIR: &str = "local";
const POPUP_ACTIVE: usize = 5;
const POPUP_COMPLETED: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    FullPage,
    Popup,
}

/// One user's storage: the shared sync area and the local fallback. Every
/// surface opened from the same profile sees the others' writes.
#[derive(Debug, Clone)]
pub struct Profile {
    data_dir: PathBuf,
    sync: Option<SyncArea>,
    local: LocalBackend,
    tz: Tz,
}

impl Profile {
    #[tracing::instrument(skip(cfg))]
    pub fn open(cfg: &Config) -> anyhow::Result<Self> {
        let data_dir = cfg
            .resolve_data_dir()
            .context("failed to resolve data directory")?;

        let local = LocalBackend::open(&data_dir.join(LOCAL_DIR))
            .with_context(|| format!("failed to open local storage in {}", data_dir.display()))?;

        let sync = if cfg.sync.enabled {
            match SyncArea::open(&data_dir.join(SYNC_DIR)) {
                Ok(area) => Some(area),
                Err(err) => {
                    let detail = format!("{err:#}");
                    warn!(error = %detail, "sync storage unavailable; using local only");
                    None
                }
            }
        } else {
            info!("sync disabled by config");
            None
        };

        let tz = cfg.timezone();
        info!(
            data_dir = %data_dir.display(),
            sync = sync.is_some(),
            timezone = %tz,
            "opened profile"
        );
        Ok(Self {
            data_dir,
            sync,
            local,
            tz,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn sync_available(&self) -> bool {
        self.sync.is_some()
    }

    pub fn sync_area(&self) -> Option<&SyncArea> {
        self.sync.as_ref()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    #[tracing::instrument(skip(self))]
    pub async fn open_surface(&self, kind: SurfaceKind) -> Surface {
        let surface = SurfaceId::new();
        let adapter = PersistenceAdapter::with_origin(self.sync.clone(), self.local.clone(), surface);

        // Subscribe before loading so nothing written in between is missed.
        let notifier = self
            .sync
            .as_ref()
            .map(|area| ChangeNotifier::new(area.subscribe(), adapter.origin()));

        let settings = adapter.load_settings().await.unwrap_or_default();
        let store = TaskStore::open(adapter, self.tz).await;

        info!(surface = %surface, "opened surface");
        Surface {
            kind,
            id: surface,
            store,
            settings,
            notifier,
        }
    }
}

/// What the popup shows: a short slice of each list plus the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSummary {
    pub active: Vec<Task>,
    pub completed: Vec<Task>,
    pub stats: TaskStats,
}

/// One open UI: its own store, settings and change feed.
#[derive(Debug)]
pub struct Surface {
    kind: SurfaceKind,
    id: SurfaceId,
    store: TaskStore,
    settings: Settings,
    notifier: Option<ChangeNotifier>,
}

impl Surface {
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TaskStore {
        &mut self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutates the settings and writes the whole blob back.
    pub async fn update_settings<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut Settings),
    {
        edit(&mut self.settings);
        self.store.adapter().save_settings(&self.settings).await;
    }

    pub async fn toggle_theme(&mut self) -> Theme {
        let theme = self.settings.toggle_theme();
        self.store.adapter().save_settings(&self.settings).await;
        debug!(?theme, "toggled theme");
        theme
    }

    /// Handles a line from the quick-add box. The popup only ever adds
    /// tasks; the full page also understands search shortcuts.
    pub async fn submit_quick_input(&mut self, input: &str, now: DateTime<Utc>) -> Option<QuickAction> {
        let action = match self.kind {
            SurfaceKind::FullPage => QuickAction::parse(input, &self.settings)?,
            SurfaceKind::Popup => QuickAction::AddTask {
                title: input.trim().to_string(),
            },
        };

        if let QuickAction::AddTask { title } = &action {
            self.store.quick_add(title, now).await?;
        }
        Some(action)
    }

    /// Applies every queued foreign change. Returns the keys that changed.
    pub fn sync_pending(&mut self) -> Vec<StorageKey> {
        let updates = match self.notifier.as_mut() {
            Some(notifier) => notifier.try_updates(),
            None => return Vec::new(),
        };
        self.apply(updates)
    }

    /// Waits for the next foreign change and applies it. `None` when this
    /// surface has no sync feed or the feed closed.
    pub async fn wait_for_sync(&mut self) -> Option<Vec<StorageKey>> {
        let updates = self.notifier.as_mut()?.next_updates().await?;
        Some(self.apply(updates))
    }

    fn apply(&mut self, updates: Vec<SyncUpdate>) -> Vec<StorageKey> {
        let mut changed = Vec::with_capacity(updates.len());
        for update in updates {
            let key = match update {
                SyncUpdate::Tasks(tasks) => {
                    self.store.replace_tasks(tasks);
                    StorageKey::Todos
                }
                SyncUpdate::Categories(categories) => {
                    self.store.replace_categories(categories);
                    StorageKey::Categories
                }
                SyncUpdate::Settings(raw) => {
                    self.settings = Settings::merged(&self.settings, &raw);
                    StorageKey::Settings
                }
            };
            if !changed.contains(&key) {
                changed.push(key);
            }
        }
        if !changed.is_empty() {
            debug!(surface = %self.id, ?changed, "applied foreign changes");
        }
        changed
    }

    pub fn popup_summary(&self) -> PopupSummary {
        let tasks = self.store.tasks();
        let active = tasks
            .iter()
            .filter(|task| !task.completed)
            .take(POPUP_ACTIVE)
            .cloned()
            .collect();
        let completed = tasks
            .iter()
            .filter(|task| task.completed)
            .take(POPUP_COMPLETED)
            .cloned()
            .collect();
        PopupSummary {
            active,
            completed,
            stats: self.store.stats(),
        }
    }
}
