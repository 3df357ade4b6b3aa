use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::config::TaskletConfig;
use crate::datetime::{DisplayDate, parse_display, today};
use crate::editor::Editor;
use crate::error::TaskError;
use crate::pending::PendingCommits;
use crate::render::{RenderOptions, Renderer};
use crate::storage::{Persistence, StorageBackend};
use crate::store::{StoreLimits, TaskStore};
use crate::task::{Task, TaskId};
use crate::view::{ActiveFilter, ActiveView};

/// Result of asking to flip a task's completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The store changed now.
    Applied(Task),
    /// Completion will be committed by a later `tick`.
    Scheduled,
    /// A pending completion was withdrawn; the task stays active.
    Cancelled,
}

/// Owns the store and drives persistence and rendering. Every mutation is
/// saved and then re-rendered; a failed save leaves the controller dirty
/// until a later save succeeds.
pub struct Controller<B, R, E> {
    store: TaskStore,
    persistence: Persistence<B>,
    renderer: R,
    editor: E,
    pending: PendingCommits,
    dirty: bool,
    today: fn() -> NaiveDate,
}

impl<B, R, E> Controller<B, R, E>
where
    B: StorageBackend,
    R: Renderer,
    E: Editor,
{
    #[tracing::instrument(skip_all)]
    pub fn new(
        persistence: Persistence<B>,
        renderer: R,
        editor: E,
        limits: StoreLimits,
        commit_delay: Duration,
    ) -> Self {
        let store = TaskStore::from_snapshot(persistence.load(), limits);
        info!(
            tasks = store.tasks().len(),
            delay_ms = commit_delay.num_milliseconds(),
            "controller ready"
        );

        let mut controller = Self {
            store,
            persistence,
            renderer,
            editor,
            pending: PendingCommits::new(commit_delay),
            dirty: false,
            today,
        };
        controller.refresh();
        controller
    }

    pub fn from_config(backend: B, renderer: R, editor: E, cfg: &TaskletConfig) -> Self {
        Self::new(
            Persistence::new(backend, cfg.migration_rules()),
            renderer,
            editor,
            cfg.store_limits(),
            cfg.commit_delay(),
        )
    }

    /// Replaces the local-date source used for overdue markers.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self.refresh();
        self
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn pending(&self) -> &PendingCommits {
        &self.pending
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    pub fn persistence(&self) -> &Persistence<B> {
        &self.persistence
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Creates a task from the editor and the composer draft, then clears
    /// and refocuses the editor.
    #[tracing::instrument(skip(self, now))]
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<Task, TaskError> {
        if self.editor.is_empty() {
            debug!("editor is empty; nothing to submit");
            return Err(TaskError::EmptyContent);
        }

        let content = self.editor.content();
        let task = self.store.create_task_from_draft(&content.html, now)?;
        self.editor.clear();
        self.editor.focus();
        self.commit();
        Ok(task)
    }

    /// Completing is deferred by the configured delay; a second request
    /// while pending cancels it. Reopening a task is immediate.
    #[tracing::instrument(skip(self, now), fields(id = %id))]
    pub fn request_toggle(
        &mut self,
        id: &TaskId,
        now: DateTime<Utc>,
    ) -> Result<ToggleOutcome, TaskError> {
        let completed = self
            .store
            .task(id)
            .map(|task| task.completed)
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;

        if self.pending.cancel(id) {
            self.refresh();
            return Ok(ToggleOutcome::Cancelled);
        }

        if completed || self.pending.delay() <= Duration::zero() {
            let task = self.store.toggle_complete(id, now)?;
            self.commit();
            return Ok(ToggleOutcome::Applied(task));
        }

        self.pending.schedule(id.clone(), now);
        self.refresh();
        Ok(ToggleOutcome::Scheduled)
    }

    /// Commits every deferred completion due at `now`. Returns how many
    /// tasks changed.
    #[tracing::instrument(skip(self, now))]
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let due = self.pending.take_due(now);
        let mut applied = 0;
        for id in &due {
            let still_active = self.store.task(id).is_some_and(|task| !task.completed);
            if !still_active {
                debug!(%id, "deferred commit target gone or already completed");
                continue;
            }
            match self.store.toggle_complete(id, now) {
                Ok(_) => applied += 1,
                Err(err) => warn!(%id, error = %err, "deferred commit failed"),
            }
        }

        if applied > 0 {
            self.commit();
        } else if !due.is_empty() {
            self.refresh();
        }
        applied
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: &TaskId) -> Result<Task, TaskError> {
        self.pending.cancel(id);
        let removed = self.store.delete_task(id)?;
        self.commit();
        Ok(removed)
    }

    pub fn add_template(&mut self, name: &str) -> Option<String> {
        let label = self.store.add_template(name)?;
        self.commit();
        Some(label)
    }

    pub fn delete_template(&mut self, label: &str) -> usize {
        let cleared = self.store.delete_template(label);
        self.commit();
        cleared
    }

    pub fn set_filter(&mut self, filter: ActiveFilter) -> ActiveFilter {
        let applied = self.store.set_filter(filter).clone();
        self.commit();
        applied
    }

    pub fn set_view(&mut self, view: ActiveView) {
        self.store.set_view(view);
        self.commit();
    }

    /// Drafts live outside the snapshot; nothing is written until a task
    /// is submitted.
    pub fn set_draft_template(&mut self, name: Option<&str>) -> Option<String> {
        self.store.set_draft_template(name)
    }

    /// Reads a typed due date into the draft. Empty input clears it and
    /// invalid input leaves the draft unchanged.
    pub fn set_draft_due(&mut self, raw: &str) -> DisplayDate {
        let parsed = parse_display(raw);
        match parsed {
            DisplayDate::Empty => self.store.set_draft_due_date(None),
            DisplayDate::Valid(date) => self.store.set_draft_due_date(Some(date)),
            DisplayDate::Invalid => debug!(input = raw, "ignoring invalid due date"),
        }
        parsed
    }

    /// Re-renders the visible tasks from current state.
    pub fn refresh(&mut self) {
        let options = RenderOptions {
            empty_state: self.store.empty_state(),
            today: (self.today)(),
            pending: self.pending.ids().cloned().collect(),
        };
        let visible = self.store.visible_tasks();
        self.renderer.render(&visible, &options);
    }

    /// Retries a failed save. Returns whether storage is now up to date.
    pub fn flush(&mut self) -> bool {
        if self.dirty {
            self.save();
        }
        !self.dirty
    }

    fn commit(&mut self) {
        self.save();
        self.refresh();
    }

    fn save(&mut self) {
        match self.persistence.save(&self.store.snapshot()) {
            Ok(()) => {
                if self.dirty {
                    info!("storage caught up after earlier failure");
                }
                self.dirty = false;
            }
            Err(err) => {
                warn!(error = %err, "failed to persist snapshot; will retry");
                self.dirty = true;
            }
        }
    }
}
