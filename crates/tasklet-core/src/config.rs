use std::path::{
  Path,
  PathBuf
};

use anyhow::Context;
use chrono::Duration;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::snapshot::MigrationRules;
use crate::store::StoreLimits;
use crate::templates::DEFAULT_TEMPLATE_MAX_LENGTH;

pub const DEFAULT_STORAGE_KEY: &str =
  "tasklet.snapshot";
pub const DEFAULT_LEGACY_TEMPLATE: &str =
  "General";
pub const DEFAULT_COMMIT_DELAY_MS: u64 =
  350;
pub const DEFAULT_LOG_FILTER: &str =
  "warn";

#[derive(
  Debug, Clone, PartialEq, Eq, Default, Deserialize,
)]
#[serde(default)]
pub struct TaskletConfig {
  pub storage:    StorageConfig,
  pub templates:  TemplatesConfig,
  pub completion: CompletionConfig,
  pub logging:    LoggingConfig
}

#[derive(
  Debug, Clone, PartialEq, Eq, Deserialize,
)]
#[serde(default)]
pub struct StorageConfig {
  /// localStorage key in the browser.
  pub key:  String,
  /// Snapshot file for native hosts.
  pub path: Option<PathBuf>
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      key:  DEFAULT_STORAGE_KEY
        .to_string(),
      path: None
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Deserialize,
)]
#[serde(default)]
pub struct TemplatesConfig {
  pub max_length:     usize,
  pub legacy_default: String
}

impl Default for TemplatesConfig {
  fn default() -> Self {
    Self {
      max_length:
        DEFAULT_TEMPLATE_MAX_LENGTH,
      legacy_default:
        DEFAULT_LEGACY_TEMPLATE
          .to_string()
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Deserialize,
)]
#[serde(default)]
pub struct CompletionConfig {
  /// 0 commits completions immediately.
  pub commit_delay_ms: u64
}

impl Default for CompletionConfig {
  fn default() -> Self {
    Self {
      commit_delay_ms:
        DEFAULT_COMMIT_DELAY_MS
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq, Deserialize,
)]
#[serde(default)]
pub struct LoggingConfig {
  pub filter: String
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      filter: DEFAULT_LOG_FILTER
        .to_string()
    }
  }
}

impl TaskletConfig {
  /// Reads a TOML file. A missing file yields the defaults.
  #[tracing::instrument]
  pub fn load(
    path: &Path
  ) -> anyhow::Result<Self> {
    if !path.exists() {
      info!(
        config = %path.display(),
        "no config file; using defaults"
      );
      return Ok(Self::default());
    }

    let raw = std::fs::read_to_string(
      path
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;

    let cfg = Self::from_toml_str(&raw)
      .with_context(|| {
        format!(
          "failed to load {}",
          path.display()
        )
      })?;
    info!(config = %path.display(), "loaded config");
    Ok(cfg)
  }

  pub fn from_toml_str(
    raw: &str
  ) -> anyhow::Result<Self> {
    let cfg = toml::from_str::<Self>(raw)
      .map_err(anyhow::Error::new)
      .context("failed to parse TOML")?;
    Ok(cfg.sanitized())
  }

  fn sanitized(mut self) -> Self {
    if self.templates.max_length == 0 {
      warn!(
        "templates.max_length must be \
         positive; using default"
      );
      self.templates.max_length =
        DEFAULT_TEMPLATE_MAX_LENGTH;
    }
    if self.storage.key.trim().is_empty()
    {
      warn!(
        "storage.key is blank; using \
         default"
      );
      self.storage.key =
        DEFAULT_STORAGE_KEY.to_string();
    }
    self.templates.legacy_default = self
      .templates
      .legacy_default
      .trim()
      .to_string();
    if self.logging.filter.trim().is_empty()
    {
      self.logging.filter =
        DEFAULT_LOG_FILTER.to_string();
    }
    debug!(?self, "config sanitized");
    self
  }

  /// Configured snapshot path, or the per-user data directory.
  pub fn storage_path(
    &self
  ) -> Option<PathBuf> {
    self.storage.path.clone().or_else(
      || {
        dirs::data_local_dir().map(|dir| {
          dir
            .join("tasklet")
            .join("snapshot.json")
        })
      }
    )
  }

  pub fn store_limits(&self) -> StoreLimits {
    StoreLimits {
      template_max_length: self
        .templates
        .max_length
    }
  }

  pub fn migration_rules(
    &self
  ) -> MigrationRules {
    let legacy = Some(
      self.templates.legacy_default.clone()
    )
    .filter(|label| !label.is_empty());
    MigrationRules::new(
      legacy,
      self.templates.max_length
    )
  }

  pub fn commit_delay(&self) -> Duration {
    let millis = i64::try_from(
      self.completion.commit_delay_ms
    )
    .unwrap_or(i64::MAX);
    Duration::try_milliseconds(millis)
      .unwrap_or(Duration::MAX)
  }
}
