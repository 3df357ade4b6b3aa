use crate::sanitize::{extract_plain_text, sanitize};

/// What the composer currently holds, already sanitized.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditorContent {
  pub html:       String,
  pub plain_text: String
}

impl EditorContent {
  pub fn from_raw(raw: &str) -> Self {
    let html = sanitize(raw);
    let plain_text =
      extract_plain_text(&html);
    Self {
      html,
      plain_text
    }
  }
}

/// Rich text input the controller reads new tasks from.
pub trait Editor {
  fn content(&self) -> EditorContent;

  fn is_empty(&self) -> bool {
    self.content().plain_text.is_empty()
  }

  fn clear(&mut self);

  fn focus(&mut self);
}

/// Editor backed by a markup buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferEditor {
  raw:     String,
  focused: bool
}

impl BufferEditor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_raw(
    &mut self,
    raw: impl Into<String>
  ) {
    self.raw = raw.into();
  }

  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn is_focused(&self) -> bool {
    self.focused
  }
}

impl Editor for BufferEditor {
  fn content(&self) -> EditorContent {
    EditorContent::from_raw(&self.raw)
  }

  fn clear(&mut self) {
    self.raw.clear();
  }

  fn focus(&mut self) {
    self.focused = true;
  }
}
