use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::datetime::{is_overdue_on, parse_iso};
use crate::error::TaskError;
use crate::sanitize::{is_blank_html, sanitize};
use crate::snapshot::{CURRENT_VERSION, Snapshot};
use crate::task::{Task, TaskId};
use crate::templates::{DEFAULT_TEMPLATE_MAX_LENGTH, TemplateSet, clean_template_name};
use crate::view::{
    ActiveFilter, ActiveView, EmptyState, TabCounts, ViewState, empty_state_for, tab_counts,
    visible_tasks,
};

/// Template and due date picked in the composer for the next task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerDraft {
    pub template: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub template_max_length: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            template_max_length: DEFAULT_TEMPLATE_MAX_LENGTH,
        }
    }
}

/// Owner of the task collection, the template set and the view state.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    templates: TemplateSet,
    view: ViewState,
    draft: ComposerDraft,
    limits: StoreLimits,
}

impl TaskStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a decoded snapshot. Template references are
    /// re-registered so none of them can dangle.
    pub fn from_snapshot(snapshot: Snapshot, limits: StoreLimits) -> Self {
        let mut store = Self::new(limits);

        for label in &snapshot.templates {
            store.register_template(label);
        }

        for mut task in snapshot.tasks {
            task.template = task
                .template
                .as_deref()
                .and_then(|raw| store.register_template(raw));
            store.tasks.push(task);
        }

        store.view.active_view = snapshot.active_view;
        store.set_filter(snapshot.active_filter);

        debug!(
            tasks = store.tasks.len(),
            templates = store.templates.len(),
            "store restored from snapshot"
        );
        store
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: CURRENT_VERSION,
            tasks: self.tasks.clone(),
            templates: self.templates.as_slice().to_vec(),
            active_filter: self.view.active_filter.clone(),
            active_view: self.view.active_view,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == *id)
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn draft(&self) -> &ComposerDraft {
        &self.draft
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Creates a task from editor markup. The markup is sanitized again,
    /// a bad due date is dropped silently, and a new template name is
    /// registered on the fly.
    #[tracing::instrument(skip(self, html, now))]
    pub fn create_task(
        &mut self,
        html: &str,
        template: Option<&str>,
        due_date: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let due = due_date.and_then(|raw| parse_iso(raw.trim()));
        if due.is_none() && due_date.is_some_and(|raw| !raw.trim().is_empty()) {
            debug!(?due_date, "ignoring unparseable due date");
        }
        self.insert_task(html, template, due, now)
    }

    /// Creates a task with the composer draft's template and due date, then
    /// resets the draft. A rejected task leaves the draft untouched.
    pub fn create_task_from_draft(
        &mut self,
        html: &str,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let draft = self.draft.clone();
        let task = self.insert_task(html, draft.template.as_deref(), draft.due_date, now)?;
        self.reset_draft();
        Ok(task)
    }

    fn insert_task(
        &mut self,
        html: &str,
        template: Option<&str>,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let content_html = sanitize(html);
        if is_blank_html(&content_html) {
            debug!("rejecting task with empty content");
            return Err(TaskError::EmptyContent);
        }

        let template = template.and_then(|raw| self.register_template(raw));
        let task = Task::new(content_html, template, due_date, now);

        info!(id = %task.id, template = ?task.template, due = ?task.due_date, "created task");
        self.tasks.push(task.clone());
        Ok(task)
    }

    #[tracing::instrument(skip(self, now), fields(id = %id))]
    pub fn toggle_complete(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Task, TaskError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == *id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        if task.completed {
            task.mark_active();
        } else {
            task.mark_completed(now);
        }

        debug!(completed = task.completed, "toggled task");
        Ok(task.clone())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete_task(&mut self, id: &TaskId) -> Result<Task, TaskError> {
        let idx = self
            .tasks
            .iter()
            .position(|task| task.id == *id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        let removed = self.tasks.remove(idx);
        info!("deleted task");
        Ok(removed)
    }

    /// Moves a task to `to_index` (clamped) in the underlying order.
    pub fn move_task(&mut self, id: &TaskId, to_index: usize) -> Result<(), TaskError> {
        let from = self
            .tasks
            .iter()
            .position(|task| task.id == *id)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        let task = self.tasks.remove(from);
        let to = to_index.min(self.tasks.len());
        self.tasks.insert(to, task);
        Ok(())
    }

    /// Registers a template from a raw name. Returns the canonical label, or
    /// `None` when nothing is left after cleaning.
    pub fn add_template(&mut self, name: &str) -> Option<String> {
        self.register_template(name)
    }

    fn register_template(&mut self, raw: &str) -> Option<String> {
        let cleaned = clean_template_name(raw, self.limits.template_max_length)?;
        Some(self.templates.insert(&cleaned))
    }

    /// Removes a template and clears every reference to it. Returns how many
    /// tasks lost the template; unknown labels are a no-op.
    #[tracing::instrument(skip(self))]
    pub fn delete_template(&mut self, label: &str) -> usize {
        let Some(removed) = self.templates.remove(label) else {
            debug!("template not present; nothing to delete");
            return 0;
        };

        let mut cleared = 0;
        for task in &mut self.tasks {
            if task.has_template(&removed) {
                task.template = None;
                cleared += 1;
            }
        }

        if self.draft.template.as_deref() == Some(removed.as_str()) {
            self.draft.template = None;
        }
        if self.view.active_filter.references(&removed) {
            self.view.active_filter = ActiveFilter::All;
        }

        info!(label = %removed, cleared, "deleted template");
        cleared
    }

    /// Applies a filter. A template filter is resolved to its canonical
    /// spelling and falls back to `All` when the template does not exist.
    pub fn set_filter(&mut self, filter: ActiveFilter) -> &ActiveFilter {
        self.view.active_filter = match filter {
            ActiveFilter::Template(label) => match self.templates.resolve(&label) {
                Some(canonical) => ActiveFilter::Template(canonical.to_string()),
                None => {
                    debug!(label = %label, "unknown template filter; showing all");
                    ActiveFilter::All
                }
            },
            other => other,
        };
        &self.view.active_filter
    }

    pub fn set_view(&mut self, view: ActiveView) {
        self.view.active_view = view;
    }

    /// Sets the draft template, registering a new one if needed. `None` or a
    /// name that cleans to nothing clears the selection.
    /// Picks the template for the next task. Known labels resolve to their
    /// stored spelling; new names are only registered once a task uses them.
    pub fn set_draft_template(&mut self, name: Option<&str>) -> Option<String> {
        self.draft.template = name
            .and_then(|raw| clean_template_name(raw, self.limits.template_max_length))
            .map(|cleaned| match self.templates.resolve(&cleaned) {
                Some(label) => label.to_string(),
                None => cleaned,
            });
        self.draft.template.clone()
    }

    pub fn set_draft_due_date(&mut self, due_date: Option<NaiveDate>) {
        self.draft.due_date = due_date;
    }

    pub fn reset_draft(&mut self) {
        self.draft = ComposerDraft::default();
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        visible_tasks(&self.tasks, &self.view)
    }

    pub fn empty_state(&self) -> Option<EmptyState> {
        let visible = self.visible_tasks();
        let counts = self.tab_counts();
        let tab_count = match self.view.active_view {
            ActiveView::Tasks => counts.active,
            ActiveView::Completed => counts.completed,
        };
        empty_state_for(&self.view, &visible, tab_count)
    }

    pub fn tab_counts(&self) -> TabCounts {
        tab_counts(&self.tasks)
    }

    pub fn overdue_count(&self, today: NaiveDate) -> usize {
        self.tasks
            .iter()
            .filter(|task| is_overdue_on(task, today))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::view::EmptyKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 30, 0)
            .single()
            .expect("valid now")
    }

    fn store() -> TaskStore {
        TaskStore::new(StoreLimits::default())
    }

    #[test]
    fn creation_sanitizes_and_registers_template() {
        let mut store = store();
        let task = store
            .create_task(
                "<div onclick=\"x()\">Ship <strong>it</strong></div>",
                Some(" [Work] "),
                Some("2026-04-10"),
                now(),
            )
            .expect("task created");

        assert_eq!(task.content_html, "<p>Ship <b>it</b></p>");
        assert_eq!(task.template.as_deref(), Some("Work"));
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 4, 10));
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
        assert_eq!(store.templates().iter().collect::<Vec<_>>(), vec!["Work"]);
    }

    #[test]
    fn empty_content_is_rejected_without_side_effects() {
        let mut store = store();
        let result = store.create_task("<p><br></p>", Some("Work"), None, now());

        assert_eq!(result, Err(TaskError::EmptyContent));
        assert!(store.tasks().is_empty());
        assert!(store.templates().is_empty());
    }

    #[test]
    fn bad_due_date_becomes_none() {
        let mut store = store();
        let task = store
            .create_task("x", None, Some("2023-02-30"), now())
            .expect("task created");
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn template_reuses_canonical_spelling() {
        let mut store = store();
        assert_eq!(store.add_template("Work").as_deref(), Some("Work"));
        assert_eq!(store.add_template("work").as_deref(), Some("Work"));
        assert_eq!(store.add_template("[ ]"), None);

        let task = store
            .create_task("x", Some("WORK"), None, now())
            .expect("task created");
        assert_eq!(task.template.as_deref(), Some("Work"));
        assert_eq!(store.templates().len(), 1);
    }

    #[test]
    fn toggle_round_trip_restores_invariant() {
        let mut store = store();
        let id = store.create_task("x", None, None, now()).expect("task").id;

        let done = store.toggle_complete(&id, now() + Duration::minutes(5)).expect("toggle");
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(now() + Duration::minutes(5)));

        let back = store.toggle_complete(&id, now()).expect("toggle back");
        assert!(!back.completed);
        assert!(back.completed_at.is_none());
        assert!(store.tasks().iter().all(Task::is_consistent));
    }

    #[test]
    fn missing_ids_report_not_found() {
        let mut store = store();
        let ghost = TaskId::from("ghost");
        assert_eq!(
            store.toggle_complete(&ghost, now()),
            Err(TaskError::NotFound(ghost.clone()))
        );
        assert_eq!(store.delete_task(&ghost), Err(TaskError::NotFound(ghost.clone())));
        assert_eq!(store.move_task(&ghost, 0), Err(TaskError::NotFound(ghost)));
    }

    #[test]
    fn deleting_template_cascades() {
        let mut store = store();
        let work = store.create_task("a", Some("Work"), None, now()).expect("a").id;
        let home = store.create_task("b", Some("Home"), None, now()).expect("b").id;
        store.set_filter(ActiveFilter::Template("work".to_string()));
        store.set_draft_template(Some("Work"));
        assert_eq!(store.view().active_filter, ActiveFilter::Template("Work".to_string()));

        let cleared = store.delete_template("WORK");

        assert_eq!(cleared, 1);
        assert_eq!(store.task(&work).and_then(|t| t.template.clone()), None);
        assert_eq!(store.task(&home).and_then(|t| t.template.clone()).as_deref(), Some("Home"));
        assert_eq!(store.view().active_filter, ActiveFilter::All);
        assert_eq!(store.draft().template, None);
        assert!(!store.templates().contains("Work"));

        assert_eq!(store.delete_template("Nope"), 0);
    }

    #[test]
    fn filter_with_unknown_template_falls_back_to_all() {
        let mut store = store();
        let applied = store.set_filter(ActiveFilter::Template("Ghost".to_string()));
        assert_eq!(*applied, ActiveFilter::All);
    }

    #[test]
    fn draft_is_consumed_by_creation() {
        let mut store = store();
        assert_eq!(store.set_draft_template(Some("  Errands ")).as_deref(), Some("Errands"));
        store.set_draft_due_date(NaiveDate::from_ymd_opt(2026, 5, 1));
        assert!(store.templates().is_empty());

        assert_eq!(store.create_task_from_draft("  ", now()), Err(TaskError::EmptyContent));
        assert_eq!(store.draft().template.as_deref(), Some("Errands"));

        assert!(store.templates().is_empty());

        let task = store.create_task_from_draft("milk", now()).expect("task");
        assert_eq!(task.template.as_deref(), Some("Errands"));
        assert_eq!(store.templates().iter().collect::<Vec<_>>(), vec!["Errands"]);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 5, 1));
        assert_eq!(*store.draft(), ComposerDraft::default());
    }

    #[test]
    fn draft_template_resolves_known_spelling() {
        let mut store = store();
        store.add_template("Work");
        assert_eq!(store.set_draft_template(Some("WORK")).as_deref(), Some("Work"));
        assert_eq!(store.set_draft_template(Some("   ")), None);
        assert_eq!(store.templates().len(), 1);
    }

    #[test]
    fn visible_tasks_and_empty_state_follow_view() {
        let mut store = store();
        assert_eq!(store.empty_state().map(|e| e.kind), Some(EmptyKind::NoTasks));

        let a = store.create_task("a", Some("Work"), None, now()).expect("a").id;
        store.create_task("b", None, None, now()).expect("b");
        store.toggle_complete(&a, now()).expect("toggle");

        assert_eq!(store.visible_tasks().len(), 1);

        store.set_filter(ActiveFilter::Template("Work".to_string()));
        assert!(store.visible_tasks().is_empty());
        assert_eq!(store.empty_state().map(|e| e.kind), Some(EmptyKind::Filtered));

        store.set_view(ActiveView::Completed);
        assert_eq!(store.visible_tasks().len(), 1);
        assert_eq!(store.empty_state(), None);
    }

    #[test]
    fn move_task_reorders_and_clamps() {
        let mut store = store();
        let a = store.create_task("a", None, None, now()).expect("a").id;
        let b = store.create_task("b", None, None, now()).expect("b").id;
        let c = store.create_task("c", None, None, now()).expect("c").id;

        store.move_task(&c, 0).expect("move");
        store.move_task(&a, 99).expect("move");

        let order: Vec<_> = store.tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn overdue_count_skips_completed() {
        let mut store = store();
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).expect("date");
        let late = store
            .create_task("a", None, Some("2026-03-01"), now())
            .expect("a")
            .id;
        store.create_task("b", None, Some("2026-03-02"), now()).expect("b");
        store.create_task("c", None, Some("2026-04-01"), now()).expect("c");
        assert_eq!(store.overdue_count(today), 2);

        store.toggle_complete(&late, now()).expect("toggle");
        assert_eq!(store.overdue_count(today), 1);
    }

    #[test]
    fn snapshot_round_trips_through_store() {
        let mut store = store();
        store.create_task("a", Some("Work"), Some("2026-04-02"), now()).expect("a");
        store.add_template("Home");
        store.set_filter(ActiveFilter::Template("Home".to_string()));
        store.set_view(ActiveView::Completed);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.version, CURRENT_VERSION);

        let restored = TaskStore::from_snapshot(snapshot, StoreLimits::default());
        assert_eq!(restored.tasks(), store.tasks());
        assert_eq!(restored.templates(), store.templates());
        assert_eq!(restored.view(), store.view());
    }
}
