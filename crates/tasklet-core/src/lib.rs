pub mod config;
pub mod controller;
pub mod datetime;
pub mod editor;
pub mod error;
pub mod logging;
pub mod pending;
pub mod render;
pub mod sanitize;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod task;
pub mod templates;
pub mod view;

pub use controller::{
  Controller,
  ToggleOutcome
};
pub use error::{
  StorageError,
  TaskError
};
pub use task::{
  Task,
  TaskId
};

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context;
#[cfg(not(target_arch = "wasm32"))]
use tracing::info;

/// Controller backed by the snapshot file named in `cfg`, with tracing
/// installed from the same configuration.
#[cfg(not(target_arch = "wasm32"))]
#[tracing::instrument(skip_all)]
pub fn open_native<R, E>(
  cfg: &config::TaskletConfig,
  renderer: R,
  editor: E
) -> anyhow::Result<
  Controller<
    storage::JsonFileBackend,
    R,
    E
  >
>
where
  R: render::Renderer,
  E: editor::Editor
{
  logging::init_tracing(&cfg.logging)
    .context(
      "failed to initialise tracing"
    )?;

  let path = cfg.storage_path().context(
    "failed to resolve snapshot \
     path; set storage.path"
  )?;
  info!(
    snapshot = %path.display(),
    "opening tasklet"
  );

  Ok(Controller::from_config(
    storage::JsonFileBackend::new(path),
    renderer,
    editor,
    cfg
  ))
}
