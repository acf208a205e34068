use tasko_shared::{Priority, StatusFilter, TaskQuery};

use crate::task::Task;

/// A `TaskQuery` prepared for matching. All predicates are AND-combined.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    status: StatusFilter,
    priority: Option<Priority>,
    needle: Option<String>,
}

impl Filter {
    pub fn new(query: &TaskQuery) -> Self {
        let needle = query.search.trim().to_lowercase();
        Self {
            status: query.status,
            priority: query.priority,
            needle: (!needle.is_empty()).then_some(needle),
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        let status_match = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        };
        if !status_match {
            return false;
        }

        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }

        match &self.needle {
            Some(needle) => text_matches(task, needle),
            None => true,
        }
    }

    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        tasks.iter().filter(|task| self.matches(task)).cloned().collect()
    }
}

fn text_matches(task: &Task, needle: &str) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);

    contains(&task.title)
        || task.description.as_deref().is_some_and(contains)
        || task.category.as_deref().is_some_and(contains)
}
