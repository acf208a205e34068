use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::storage::{StorageKey, WriteOrigin};
use crate::sync_area::{ChangeEvent, StorageArea};
use crate::task::{Task, decode_tasks};

/// A foreign write, decoded and ready to apply to a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    Tasks(Vec<Task>),
    Categories(Vec<String>),
    /// Raw blob; the surface merges it into its current settings.
    Settings(Value),
}

/// Turns sync-area change events into updates for one surface, dropping the
/// echoes of that surface's own writes.
#[derive(Debug)]
pub struct ChangeNotifier {
    receiver: broadcast::Receiver<ChangeEvent>,
    origin: Arc<WriteOrigin>,
}

impl ChangeNotifier {
    pub fn new(receiver: broadcast::Receiver<ChangeEvent>, origin: Arc<WriteOrigin>) -> Self {
        Self { receiver, origin }
    }

    /// Waits for the next event carrying foreign changes. `None` once the
    /// sync area is gone.
    pub async fn next_updates(&mut self) -> Option<Vec<SyncUpdate>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    let updates = self.translate(event);
                    if !updates.is_empty() {
                        return Some(updates);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change notifier lagged; older events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("change channel closed");
                    return None;
                }
            }
        }
    }

    /// Drains whatever is queued without waiting.
    pub fn try_updates(&mut self) -> Vec<SyncUpdate> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => out.extend(self.translate(event)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "change notifier lagged; older events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out
    }

    pub fn translate(&self, event: ChangeEvent) -> Vec<SyncUpdate> {
        if event.area != StorageArea::Sync {
            return Vec::new();
        }

        if let Some(token) = &event.origin
            && self.origin.issued(token)
        {
            debug!(seq = token.seq, "ignoring echo of own write");
            return Vec::new();
        }

        event
            .changes
            .into_iter()
            .filter_map(|(key, change)| decode_change(key, change.new_value))
            .collect()
    }
}

fn decode_change(key: StorageKey, new_value: Option<Value>) -> Option<SyncUpdate> {
    match key {
        StorageKey::Todos => decode_list::<Value>(key, new_value)
            .map(|records| SyncUpdate::Tasks(decode_tasks(records))),
        StorageKey::Categories => decode_list(key, new_value).map(SyncUpdate::Categories),
        StorageKey::Settings => new_value.map(SyncUpdate::Settings),
    }
}

fn decode_list<T>(key: StorageKey, new_value: Option<Value>) -> Option<Vec<T>>
where
    T: DeserializeOwned,
{
    let Some(value) = new_value else {
        return Some(Vec::new());
    };
    match serde_json::from_value(value) {
        Ok(list) => Some(list),
        Err(err) => {
            warn!(key = %key, error = %err, "ignoring undecodable change");
            None
        }
    }
}
