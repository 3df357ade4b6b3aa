use serde::{
  Deserialize,
  Serialize
};

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
  #[default]
  Tasks,
  Completed
}

impl ActiveView {
  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::Tasks => "tasks",
      | Self::Completed => "completed"
    }
  }

  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw.trim() {
      | "tasks" => Some(Self::Tasks),
      | "completed" => {
        Some(Self::Completed)
      }
      | _ => None
    }
  }

  pub fn includes(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | Self::Tasks => !task.completed,
      | Self::Completed => task.completed
    }
  }
}

/// Template filter applied inside the active tab.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum ActiveFilter {
  #[default]
  All,
  NoTemplate,
  Template(String)
}

impl ActiveFilter {
  /// Stored form: `all`, `none`, or the template label itself.
  pub fn as_str(&self) -> &str {
    match self {
      | Self::All => "all",
      | Self::NoTemplate => "none",
      | Self::Template(label) => label
    }
  }

  /// Decodes the stored form. The `all`/`none` keywords take precedence
  /// over a template with the same spelling.
  pub fn from_stored(
    raw: &str
  ) -> Self {
    match raw {
      | "" | "all" => Self::All,
      | "none" => Self::NoTemplate,
      | label => {
        Self::Template(label.to_string())
      }
    }
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::NoTemplate => {
        task.template.is_none()
      }
      | Self::Template(label) => {
        task.has_template(label)
      }
    }
  }

  pub fn references(
    &self,
    label: &str
  ) -> bool {
    matches!(
      self,
      Self::Template(current)
        if current.to_lowercase() == label.to_lowercase()
    )
  }
}

impl From<String> for ActiveFilter {
  fn from(raw: String) -> Self {
    Self::from_stored(&raw)
  }
}

impl From<ActiveFilter> for String {
  fn from(filter: ActiveFilter) -> Self {
    filter.as_str().to_string()
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
)]
pub struct ViewState {
  pub active_view:   ActiveView,
  pub active_filter: ActiveFilter
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum EmptyKind {
  NoTasks,
  NoCompleted,
  Filtered
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
)]
pub struct EmptyState {
  pub kind:  EmptyKind,
  pub title: &'static str,
  pub copy:  &'static str
}

impl EmptyState {
  fn of(kind: EmptyKind) -> Self {
    let (title, copy) = match kind {
      | EmptyKind::NoTasks => (
        "No tasks yet",
        "Write something above and press \
         Enter to add your first task."
      ),
      | EmptyKind::NoCompleted => (
        "Nothing completed yet",
        "Tasks you check off will show \
         up here."
      ),
      | EmptyKind::Filtered => (
        "No tasks match this filter",
        "Pick another template or switch \
         back to All."
      )
    };
    Self {
      kind,
      title,
      copy
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct TabCounts {
  pub active:    usize,
  pub completed: usize
}

/// Tasks in the active tab that pass the active filter, in collection
/// order.
pub fn visible_tasks<'a>(
  tasks: &'a [Task],
  view: &ViewState
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      view.active_view.includes(task)
    })
    .filter(|task| {
      view.active_filter.matches(task)
    })
    .collect()
}

pub fn tab_counts(
  tasks: &[Task]
) -> TabCounts {
  let completed = tasks
    .iter()
    .filter(|task| task.completed)
    .count();
  TabCounts {
    active: tasks.len() - completed,
    completed
  }
}

/// Message for an empty list, telling apart an empty tab from a filter
/// that hid everything. `tab_count` is the tab size before filtering.
pub fn empty_state_for(
  view: &ViewState,
  visible: &[&Task],
  tab_count: usize
) -> Option<EmptyState> {
  if !visible.is_empty() {
    return None;
  }

  let kind = if tab_count > 0 {
    EmptyKind::Filtered
  } else {
    match view.active_view {
      | ActiveView::Tasks => {
        EmptyKind::NoTasks
      }
      | ActiveView::Completed => {
        EmptyKind::NoCompleted
      }
    }
  };

  Some(EmptyState::of(kind))
}
