use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High
}

impl Priority {
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Low => "low",
      | Self::Medium => "medium",
      | Self::High => "high"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
  #[default]
  None,
  Daily,
  Weekly,
  Monthly
}

impl Recurrence {
  pub fn is_recurring(self) -> bool {
    self != Self::None
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
  #[default]
  Light,
  Dark
}

impl Theme {
  #[must_use]
  pub fn toggled(self) -> Self {
    match self {
      | Self::Light => Self::Dark,
      | Self::Dark => Self::Light
    }
  }
}

/// Input for creating a task. Dates
/// stay raw here; the store normalizes
/// them.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub priority:    Priority,
  #[serde(default)]
  pub category:    String,
  #[serde(default)]
  pub due_date:    Option<String>,
  #[serde(default)]
  pub recurrence:  Recurrence
}

impl TaskDraft {
  pub fn titled(
    title: impl Into<String>
  ) -> Self {
    Self {
      title: title.into(),
      ..Self::default()
    }
  }
}

/// Partial update for a task. `None`
/// leaves a field alone; an empty
/// string clears an optional text or
/// date field.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  pub title:       Option<String>,
  pub description: Option<String>,
  pub priority:    Option<Priority>,
  pub category:    Option<String>,
  pub due_date:    Option<String>,
  pub recurrence:  Option<Recurrence>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct TaskQuery {
  pub status:   StatusFilter,
  pub priority: Option<Priority>,
  pub search:   String
}

impl TaskQuery {
  pub fn with_status(
    status: StatusFilter
  ) -> Self {
    Self {
      status,
      ..Self::default()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
  pub total:            usize,
  pub active:           usize,
  pub completed:        usize,
  pub percent_complete: u8
}

impl TaskStats {
  pub fn from_counts(
    total: usize,
    completed: usize
  ) -> Self {
    let completed = completed.min(total);
    let percent_complete = if total == 0
    {
      0
    } else {
      ((completed * 100 + total / 2)
        / total) as u8
    };

    Self {
      total,
      active: total - completed,
      completed,
      percent_complete
    }
  }
}
