use std::cell::RefCell;
use std::rc::Rc;

use chrono::{
  DateTime,
  Utc
};
use gloo::timers::callback::Interval;
use tasklet_core::config::TaskletConfig;
use tasklet_core::datetime::today_iso;
use tasklet_core::editor::{
  Editor,
  EditorContent
};
use tasklet_core::render::{
  HtmlRenderer,
  RenderOptions,
  Renderer
};
use tasklet_core::storage::StorageBackend;
use tasklet_core::task::{
  Task,
  TaskId
};
use tasklet_core::view::{
  ActiveFilter,
  ActiveView
};
use tasklet_core::{
  Controller,
  StorageError,
  ToggleOutcome
};
use tracing::{
  debug,
  info,
  warn
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
  Element,
  HtmlElement,
  Storage
};

#[wasm_bindgen(start)]
pub fn start() {
  console_error_panic_hook::set_once();
  wasm_tracing::set_as_global_default();
  info!("tasklet web shell loaded");
}

fn js_err(
  err: impl std::fmt::Display
) -> JsValue {
  JsValue::from_str(&err.to_string())
}

fn element_by_id(
  id: &str
) -> Result<Element, JsValue> {
  web_sys::window()
    .and_then(|window| {
      window.document()
    })
    .and_then(|document| {
      document.get_element_by_id(id)
    })
    .ok_or_else(|| {
      js_err(format!(
        "missing #{id} element"
      ))
    })
}

/// Snapshot kept under one localStorage key.
#[derive(Debug, Clone)]
pub struct LocalStorageBackend {
  key: String
}

impl LocalStorageBackend {
  pub fn new(
    key: impl Into<String>
  ) -> Self {
    Self {
      key: key.into()
    }
  }

  fn storage(
    &self
  ) -> Result<Storage, StorageError> {
    web_sys::window()
      .ok_or_else(|| {
        StorageError::Unavailable(
          "no window".to_string()
        )
      })?
      .local_storage()
      .map_err(|err| {
        StorageError::Unavailable(
          format!("{err:?}")
        )
      })?
      .ok_or_else(|| {
        StorageError::Unavailable(
          "localStorage disabled"
            .to_string()
        )
      })
  }
}

impl StorageBackend for LocalStorageBackend {
  fn read(
    &self
  ) -> Result<Option<String>, StorageError>
  {
    self
      .storage()?
      .get_item(&self.key)
      .map_err(|err| {
        StorageError::Read {
          location: self.key.clone(),
          message:  format!("{err:?}")
        }
      })
  }

  fn write(
    &self,
    contents: &str
  ) -> Result<(), StorageError> {
    self
      .storage()?
      .set_item(&self.key, contents)
      .map_err(|err| {
        StorageError::Write {
          location: self.key.clone(),
          message:  format!("{err:?}")
        }
      })
  }
}

/// Writes the rendered list into a container element, replacing its
/// contents on every call.
pub struct DomRenderer {
  container: Element,
  html:      HtmlRenderer
}

impl DomRenderer {
  pub fn new(container: Element) -> Self {
    Self {
      container,
      html: HtmlRenderer::new()
    }
  }
}

impl Renderer for DomRenderer {
  fn render(
    &mut self,
    tasks: &[&Task],
    options: &RenderOptions
  ) {
    self.html.render(tasks, options);
    self
      .container
      .set_inner_html(self.html.markup());
  }
}

/// Adapter over a contenteditable element.
pub struct ContentEditableEditor {
  element: HtmlElement
}

impl ContentEditableEditor {
  pub fn new(
    element: HtmlElement
  ) -> Self {
    Self {
      element
    }
  }
}

impl Editor for ContentEditableEditor {
  fn content(&self) -> EditorContent {
    EditorContent::from_raw(
      &self.element.inner_html()
    )
  }

  fn clear(&mut self) {
    self.element.set_inner_html("");
  }

  fn focus(&mut self) {
    if let Err(err) = self.element.focus()
    {
      warn!(error = ?err, "failed to focus editor");
    }
  }
}

type WebController = Controller<
  LocalStorageBackend,
  DomRenderer,
  ContentEditableEditor
>;

/// How often the shell checks for deferred completions that came due.
const TICK_INTERVAL_MS: u32 = 50;

/// Commits deferred completions due at `now`. A controller that is
/// already borrowed, or has nothing pending, is left alone.
fn drive_pending<B, R, E>(
  controller: &RefCell<Controller<B, R, E>>,
  now: DateTime<Utc>
) -> usize
where
  B: StorageBackend,
  R: Renderer,
  E: Editor
{
  let Ok(mut controller) =
    controller.try_borrow_mut()
  else {
    debug!(
      "controller busy; deferring tick"
    );
    return 0;
  };
  if controller.pending().is_empty() {
    return 0;
  }
  controller.tick(now)
}

/// Facade the page script drives. Deferred completions are committed by
/// an interval owned by the app and cancelled when it is dropped.
#[wasm_bindgen]
pub struct TaskletApp {
  controller: Rc<RefCell<WebController>>,
  config:     TaskletConfig,
  _ticker:    Interval
}

#[wasm_bindgen]
impl TaskletApp {
  #[wasm_bindgen(constructor)]
  pub fn new(
    list_id: &str,
    editor_id: &str,
    config_toml: Option<String>
  ) -> Result<TaskletApp, JsValue> {
    let config = match config_toml {
      | Some(raw) => {
        TaskletConfig::from_toml_str(&raw)
          .map_err(|err| {
            js_err(format!("{err:#}"))
          })?
      }
      | None => TaskletConfig::default()
    };

    let container =
      element_by_id(list_id)?;
    let editor = element_by_id(editor_id)?
      .dyn_into::<HtmlElement>()
      .map_err(|_| {
        js_err(format!(
          "#{editor_id} is not an HTML \
           element"
        ))
      })?;

    let controller =
      Rc::new(RefCell::new(
        Controller::from_config(
          LocalStorageBackend::new(
            config.storage.key.clone()
          ),
          DomRenderer::new(container),
          ContentEditableEditor::new(
            editor
          ),
          &config
        )
      ));

    let shared = Rc::clone(&controller);
    let ticker = Interval::new(
      TICK_INTERVAL_MS,
      move || {
        drive_pending(
          &shared,
          Utc::now()
        );
      }
    );

    info!(
      key = %config.storage.key,
      "tasklet app mounted"
    );
    Ok(Self {
      controller,
      config,
      _ticker: ticker
    })
  }

  /// Creates a task from the editor; returns its id.
  pub fn submit(
    &mut self
  ) -> Result<String, JsValue> {
    self
      .controller
      .borrow_mut()
      .submit(Utc::now())
      .map(|task| task.id.to_string())
      .map_err(js_err)
  }

  /// Returns `applied`, `scheduled` or `cancelled`.
  pub fn toggle(
    &mut self,
    id: &str
  ) -> Result<String, JsValue> {
    let outcome = self
      .controller
      .borrow_mut()
      .request_toggle(
        &TaskId::from(id),
        Utc::now()
      )
      .map_err(js_err)?;
    let label = match outcome {
      | ToggleOutcome::Applied(_) => {
        "applied"
      }
      | ToggleOutcome::Scheduled => {
        "scheduled"
      }
      | ToggleOutcome::Cancelled => {
        "cancelled"
      }
    };
    Ok(label.to_string())
  }

  /// Commits due completions right away instead of waiting for the
  /// next interval.
  pub fn tick(&mut self) -> usize {
    drive_pending(
      &self.controller,
      Utc::now()
    )
  }

  pub fn delete(
    &mut self,
    id: &str
  ) -> Result<(), JsValue> {
    self
      .controller
      .borrow_mut()
      .delete(&TaskId::from(id))
      .map(|_| ())
      .map_err(js_err)
  }

  #[wasm_bindgen(js_name = addTemplate)]
  pub fn add_template(
    &mut self,
    name: &str
  ) -> Option<String> {
    self
      .controller
      .borrow_mut()
      .add_template(name)
  }

  #[wasm_bindgen(js_name = deleteTemplate)]
  pub fn delete_template(
    &mut self,
    label: &str
  ) -> usize {
    self
      .controller
      .borrow_mut()
      .delete_template(label)
  }

  /// Accepts `all`, `none` or a template label; returns the filter
  /// actually applied.
  #[wasm_bindgen(js_name = setFilter)]
  pub fn set_filter(
    &mut self,
    filter: &str
  ) -> String {
    self
      .controller
      .borrow_mut()
      .set_filter(
        ActiveFilter::from_stored(
          filter.trim()
        )
      )
      .as_str()
      .to_string()
  }

  #[wasm_bindgen(js_name = setView)]
  pub fn set_view(
    &mut self,
    view: &str
  ) -> Result<(), JsValue> {
    let view = ActiveView::parse(view)
      .ok_or_else(|| {
        js_err(format!(
          "unknown view: {view}"
        ))
      })?;
    self
      .controller
      .borrow_mut()
      .set_view(view);
    Ok(())
  }

  #[wasm_bindgen(js_name = setDraftTemplate)]
  pub fn set_draft_template(
    &mut self,
    name: Option<String>
  ) -> Option<String> {
    self
      .controller
      .borrow_mut()
      .set_draft_template(name.as_deref())
  }

  /// Returns `empty`, `invalid` or `valid`.
  #[wasm_bindgen(js_name = setDraftDue)]
  pub fn set_draft_due(
    &mut self,
    raw: &str
  ) -> String {
    self
      .controller
      .borrow_mut()
      .set_draft_due(raw)
      .status()
      .to_string()
  }

  pub fn templates(&self) -> js_sys::Array {
    self
      .controller
      .borrow()
      .store()
      .templates()
      .iter()
      .map(JsValue::from_str)
      .collect()
  }

  #[wasm_bindgen(js_name = commitDelayMs)]
  pub fn commit_delay_ms(&self) -> u32 {
    u32::try_from(
      self.config.completion.commit_delay_ms
    )
    .unwrap_or(u32::MAX)
  }

  pub fn today(&self) -> String {
    today_iso()
  }

  /// Retries a failed save; true when storage is current.
  pub fn flush(&mut self) -> bool {
    self.controller.borrow_mut().flush()
  }
}
