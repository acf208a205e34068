use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tasko_shared::{Priority, Recurrence};
use tracing::warn;
use uuid::Uuid;

use crate::datetime::due_date_serde;

const ID_SUFFIX_LEN: u32 = 10;

static LAST_ID_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Opaque task identifier. Older popup builds wrote bare millisecond numbers,
/// so numeric ids are accepted and kept as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Base-36 millisecond clock (never moves backwards within the process)
    /// followed by a random base-36 suffix.
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let prev = LAST_ID_MILLIS.fetch_max(now, Ordering::Relaxed);
        let millis = prev.max(now);

        let modulus = 36_u128.pow(ID_SUFFIX_LEN);
        let suffix = Uuid::new_v4().as_u128() % modulus;

        Self(format!(
            "{}{:0>width$}",
            to_base36(u128::from(millis)),
            to_base36(suffix),
            width = ID_SUFFIX_LEN as usize
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "unknown_as_default")]
    pub priority: Priority,

    #[serde(default, deserialize_with = "blank_as_none")]
    pub category: Option<String>,

    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,

    #[serde(default, deserialize_with = "unknown_as_default")]
    pub recurrence: Recurrence,

    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,

    #[serde(default, deserialize_with = "unparseable_as_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new_active(title: String, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::generate(),
            title,
            description: None,
            priority: Priority::default(),
            category: None,
            due_date: None,
            recurrence: Recurrence::None,
            completed: false,
            completed_at: None,
            created_at: now,
            extra: BTreeMap::new(),
        }
    }

    /// Next occurrence of a recurring task. Shares nothing with `self` but
    /// copied values.
    pub fn successor(&self, due_date: Option<NaiveDate>, now: DateTime<Utc>) -> Self {
        let mut next = Self::new_active(self.title.clone(), now);
        next.description = self.description.clone();
        next.priority = self.priority;
        next.category = self.category.clone();
        next.due_date = due_date;
        next.recurrence = self.recurrence;
        next
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.map(|due| due < today).unwrap_or(false)
    }

    /// Restores the `completed` / `completedAt` pairing on data written by
    /// builds that toggled without stamping a time.
    pub fn normalize(&mut self) {
        if !self.completed {
            self.completed_at = None;
        } else if self.completed_at.is_none() {
            self.completed_at = Some(self.created_at);
        }
    }
}

/// Decodes a stored task list one record at a time. Records that are not
/// tasks are logged and dropped so the rest still load.
pub fn decode_tasks(values: Vec<Value>) -> Vec<Task> {
    let total = values.len();
    let tasks: Vec<Task> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<Task>(value) {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(index, error = %err, "skipping undecodable task record");
                None
            }
        })
        .collect();
    if tasks.len() < total {
        warn!(kept = tasks.len(), total, "task list partially decoded");
    }
    tasks
}

pub(crate) fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(non_blank))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Enum fields written by newer or foreign builds: an unknown value takes
/// the default instead of failing the whole record.
fn unknown_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(T::default());
    };
    Ok(serde_json::from_value(raw.clone()).unwrap_or_else(|err| {
        warn!(value = %raw, error = %err, "unknown value; using default");
        T::default()
    }))
}

fn unparseable_as_none<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(serde_json::from_value(raw.clone()).unwrap_or_else(|err| {
        warn!(value = %raw, error = %err, "unparseable timestamp; dropping it");
        None
    }))
}
