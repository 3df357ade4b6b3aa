use std::collections::HashSet;

use chrono::NaiveDate;

use crate::datetime::{completion_status, format_date_display, is_overdue_on};
use crate::sanitize::escape_attribute;
use crate::task::{Task, TaskId};
use crate::view::{EmptyKind, EmptyState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub empty_state: Option<EmptyState>,
    pub today: NaiveDate,
    /// Tasks whose completion is scheduled but not yet committed.
    pub pending: HashSet<TaskId>,
}

/// Projects the visible tasks into a container. Each call replaces whatever
/// was rendered before.
pub trait Renderer {
    fn render(&mut self, tasks: &[&Task], options: &RenderOptions);
}

/// Renders to an owned HTML string.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    markup: String,
    renders: usize,
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }
}

impl Renderer for HtmlRenderer {
    #[tracing::instrument(skip_all, fields(tasks = tasks.len()))]
    fn render(&mut self, tasks: &[&Task], options: &RenderOptions) {
        self.renders += 1;
        self.markup = if tasks.is_empty() {
            options
                .empty_state
                .as_ref()
                .map(empty_state_markup)
                .unwrap_or_default()
        } else {
            task_list_markup(tasks, options)
        };
    }
}

fn task_list_markup(tasks: &[&Task], options: &RenderOptions) -> String {
    let mut out = String::from("<ul class=\"task-list\">");
    for task in tasks {
        let pending = options.pending.contains(&task.id);
        out.push_str(&task_markup(task, options.today, pending));
    }
    out.push_str("</ul>");
    out
}

fn task_markup(task: &Task, today: NaiveDate, pending: bool) -> String {
    let overdue = is_overdue_on(task, today);

    let mut classes = vec!["task"];
    if task.completed {
        classes.push("completed");
    } else if pending {
        classes.push("pending");
    }
    if overdue {
        classes.push("overdue");
    }

    let mut out = format!(
        "<li class=\"{}\" data-id=\"{}\"><div class=\"task-content\">{}</div>",
        classes.join(" "),
        escape_attribute(task.id.as_str()),
        task.content_html
    );

    if let Some(template) = &task.template {
        out.push_str(&format!(
            "<span class=\"task-template\">{}</span>",
            escape_attribute(template)
        ));
    }

    if let Some(due) = task.due_date {
        let class = if overdue { "task-due overdue" } else { "task-due" };
        out.push_str(&format!(
            "<span class=\"{class}\">{}</span>",
            format_date_display(due)
        ));
    }

    if let Some(status) = completion_status(task.due_date, task.completed_at) {
        out.push_str(&format!(
            "<span class=\"task-status {0}\">{0}</span>",
            status.as_str()
        ));
    }

    out.push_str("</li>");
    out
}

fn empty_state_markup(state: &EmptyState) -> String {
    let kind = match state.kind {
        EmptyKind::NoTasks => "no-tasks",
        EmptyKind::NoCompleted => "no-completed",
        EmptyKind::Filtered => "filtered",
    };
    format!(
        "<div class=\"empty-state\" data-kind=\"{kind}\"><h2>{}</h2><p>{}</p></div>",
        escape_attribute(state.title),
        escape_attribute(state.copy)
    )
}
