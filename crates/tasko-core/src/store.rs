use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tasko_shared::{Priority, TaskDraft, TaskPatch, TaskQuery, TaskStats};
use tracing::{debug, info};

use crate::datetime::{local_date, parse_due_date};
use crate::filter::Filter;
use crate::recurrence::next_due_date;
use crate::storage::{Backend, LocalBackend, PersistenceAdapter};
use crate::sync_area::SyncArea;
use crate::task::{Task, TaskId, non_blank};

/// Sole owner and mutator of one surface's task collection and category list.
///
/// Mutations change memory first and then write the whole collection through
/// the adapter. Unknown ids and empty titles are silent no-ops.
#[derive(Debug)]
pub struct TaskStore<P = SyncArea, F = LocalBackend> {
    tasks: Vec<Task>,
    categories: Vec<String>,
    adapter: PersistenceAdapter<P, F>,
    tz: Tz,
}

impl<P, F> TaskStore<P, F>
where
    P: Backend,
    F: Backend,
{
    #[tracing::instrument(skip(adapter))]
    pub async fn open(adapter: PersistenceAdapter<P, F>, tz: Tz) -> Self {
        let tasks = adapter.load_tasks().await;
        let categories = adapter.load_categories().await;
        info!(
            tasks = tasks.len(),
            categories = categories.len(),
            "opened task store"
        );
        Self {
            tasks,
            categories,
            adapter,
            tz,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn adapter(&self) -> &PersistenceAdapter<P, F> {
        &self.adapter
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, &self.tz)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| &task.id == id)
    }

    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn add(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Option<TaskId> {
        let Some(title) = non_blank(&draft.title) else {
            debug!("ignoring add with empty title");
            return None;
        };

        let mut task = Task::new_active(title, now);
        task.description = non_blank(&draft.description);
        task.priority = draft.priority;
        task.category = non_blank(&draft.category);
        task.due_date = draft.due_date.as_deref().and_then(parse_due_date);
        task.recurrence = draft.recurrence;

        let id = task.id.clone();
        let category = task.category.clone();
        self.tasks.insert(0, task);
        self.persist_tasks().await;

        if let Some(category) = category {
            self.remember_category(category).await;
        }

        info!(id = %id, "added task");
        Some(id)
    }

    /// Single-line add used by the popup and the quick input: medium
    /// priority, nothing else set.
    pub async fn quick_add(&mut self, title: &str, now: DateTime<Utc>) -> Option<TaskId> {
        let draft = TaskDraft {
            priority: Priority::Medium,
            ..TaskDraft::titled(title)
        };
        self.add(draft, now).await
    }

    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&mut self, id: &TaskId, patch: TaskPatch) -> bool {
        let Some(idx) = self.position(id) else {
            debug!("update for unknown task");
            return false;
        };

        let title = match patch.title.as_deref() {
            Some(raw) => match non_blank(raw) {
                Some(title) => Some(title),
                None => {
                    debug!("ignoring update with empty title");
                    return false;
                }
            },
            None => None,
        };

        let task = &mut self.tasks[idx];
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description.as_deref() {
            task.description = non_blank(description);
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category.as_deref() {
            task.category = non_blank(category);
        }
        if let Some(due) = patch.due_date.as_deref() {
            task.due_date = parse_due_date(due);
        }
        if let Some(recurrence) = patch.recurrence {
            task.recurrence = recurrence;
        }

        self.persist_tasks().await;

        if let Some(category) = patch.category.as_deref().and_then(non_blank) {
            self.remember_category(category).await;
        }

        debug!("updated task");
        true
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove(&mut self, id: &TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| &task.id != id);
        if self.tasks.len() == before {
            debug!("remove for unknown task");
            return false;
        }

        self.persist_tasks().await;
        info!("removed task");
        true
    }

    /// Flips completion and returns the new state. Completing a recurring
    /// task puts its successor at the front of the list.
    #[tracing::instrument(skip(self, now))]
    pub async fn toggle_complete(&mut self, id: &TaskId, now: DateTime<Utc>) -> Option<bool> {
        let Some(idx) = self.position(id) else {
            debug!("toggle for unknown task");
            return None;
        };
        let today = self.today(now);

        let task = &mut self.tasks[idx];
        let completed = !task.completed;
        task.set_completed(completed, now);

        let successor = (completed && task.recurrence.is_recurring()).then(|| {
            let due = next_due_date(task.due_date, task.recurrence, today);
            task.successor(due, now)
        });

        if let Some(next) = successor {
            info!(
                successor = %next.id,
                due = ?next.due_date,
                "created next occurrence"
            );
            self.tasks.insert(0, next);
        }

        self.persist_tasks().await;
        Some(completed)
    }

    /// Moves `from` to the index `to` occupied before the move. Returns
    /// whether the order changed.
    #[tracing::instrument(skip(self))]
    pub async fn reorder(&mut self, from: &TaskId, to: &TaskId) -> bool {
        let (Some(from_idx), Some(to_idx)) = (self.position(from), self.position(to)) else {
            debug!("reorder with unknown task");
            return false;
        };
        if from_idx == to_idx {
            return false;
        }

        let task = self.tasks.remove(from_idx);
        self.tasks.insert(to_idx, task);
        self.persist_tasks().await;
        debug!(from_idx, to_idx, "reordered tasks");
        true
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.completed);
        let removed = before - self.tasks.len();
        if removed > 0 {
            self.persist_tasks().await;
        }
        info!(removed, "cleared completed tasks");
        removed
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        self.persist_tasks().await;
        info!(removed, "cleared all tasks");
        removed
    }

    pub fn filter(&self, query: &TaskQuery) -> Vec<Task> {
        Filter::new(query).apply(&self.tasks)
    }

    pub fn stats(&self) -> TaskStats {
        let completed = self.tasks.iter().filter(|task| task.completed).count();
        TaskStats::from_counts(self.tasks.len(), completed)
    }

    /// Known categories plus any used on a task, first-seen order.
    pub fn category_suggestions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let used = self.tasks.iter().filter_map(|task| task.category.as_ref());
        for category in self.categories.iter().chain(used) {
            if !out.contains(category) {
                out.push(category.clone());
            }
        }
        out
    }

    /// Adopts a collection written by another surface. Nothing is persisted.
    pub fn replace_tasks(&mut self, mut tasks: Vec<Task>) {
        tasks.iter_mut().for_each(Task::normalize);
        debug!(count = tasks.len(), "replaced tasks from storage");
        self.tasks = tasks;
    }

    pub fn replace_categories(&mut self, categories: Vec<String>) {
        debug!(count = categories.len(), "replaced categories from storage");
        self.categories = categories;
    }

    async fn persist_tasks(&self) {
        self.adapter.save_tasks(&self.tasks).await;
    }

    async fn remember_category(&mut self, category: String) {
        if self.categories.contains(&category) {
            return;
        }
        debug!(category = %category, "new category");
        self.categories.push(category);
        self.adapter.save_categories(&self.categories).await;
    }
}
