use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  warn
};

use crate::datetime::parse_timezone;

pub const CONFIG_ENV: &str =
  "TASKO_CONFIG";
pub const DATA_ENV: &str = "TASKO_DATA";
pub const TIMEZONE_ENV: &str =
  "TASKO_TIMEZONE";

const CONFIG_FILE: &str = "tasko.toml";
const APP_DIR: &str = "tasko";

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct SyncConfig {
  pub enabled: bool
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      enabled: true
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(default)]
pub struct Config {
  pub data_dir:     Option<PathBuf>,
  pub timezone:     String,
  pub log_filter:   Option<String>,
  pub sync:         SyncConfig,
  #[serde(skip)]
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_dir:     None,
      timezone:     "UTC".to_string(),
      log_filter:   None,
      sync:         SyncConfig::default(),
      loaded_files: vec![]
    }
  }
}

impl Config {
  /// Reads `tasko.toml` from the
  /// explicit path, `$TASKO_CONFIG`, or
  /// the user config dir, then applies
  /// the environment overrides.
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let env_path =
      std::env::var(CONFIG_ENV).ok();
    let path = resolve_config_path(
      config_override,
      env_path.as_deref()
    );

    let mut cfg = match path {
      | Some(path) => {
        info!(config = %path.display(), "loading config");
        Self::load_file(&path)?
      }
      | None => {
        warn!(
          "no tasko.toml found; using \
           defaults"
        );
        Self::default()
      }
    };

    cfg.apply_env(|name| {
      std::env::var(name).ok()
    });
    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    toml::from_str(text).context(
      "failed to parse tasko config"
    )
  }

  #[tracing::instrument]
  fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;

    let mut cfg =
      Self::from_toml_str(&text)
        .with_context(|| {
          format!(
            "invalid config file {}",
            path.display()
          )
        })?;
    cfg.loaded_files.push(path);
    Ok(cfg)
  }

  /// `TASKO_DATA` and `TASKO_TIMEZONE`
  /// win over the file.
  pub fn apply_env<F>(
    &mut self,
    lookup: F
  ) where
    F: Fn(&str) -> Option<String>
  {
    if let Some(dir) = lookup(DATA_ENV)
      .filter(|v| !v.trim().is_empty())
    {
      debug!(data_dir = %dir, "data dir from environment");
      self.data_dir =
        Some(PathBuf::from(dir));
    }
    if let Some(tz) =
      lookup(TIMEZONE_ENV)
        .filter(|v| !v.trim().is_empty())
    {
      debug!(timezone = %tz, "timezone from environment");
      self.timezone = tz;
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k.trim();
      debug!(key = %key, value = %v, "applying override");
      match key {
        | "data.location" => {
          self.data_dir =
            Some(PathBuf::from(v.trim()));
        }
        | "sync.enabled" => {
          self.sync.enabled =
            parse_bool(&v);
        }
        | "timezone" => {
          self.timezone =
            v.trim().to_string();
        }
        | "log.filter" => {
          self.log_filter = Some(v);
        }
        | other => {
          warn!(key = %other, "unknown config override; ignoring");
        }
      }
    }
  }

  /// Project timezone used for "today".
  /// Falls back to UTC.
  pub fn timezone(&self) -> Tz {
    parse_timezone(&self.timezone)
      .unwrap_or_else(|| {
        warn!(
          timezone = %self.timezone,
          "falling back to UTC"
        );
        Tz::UTC
      })
  }

  #[tracing::instrument(skip(self))]
  pub fn resolve_data_dir(
    &self
  ) -> anyhow::Result<PathBuf> {
    let dir = match &self.data_dir {
      | Some(path) => expand_tilde(path),
      | None => default_data_dir()?
    };

    if !dir.exists() {
      info!(dir = %dir.display(), "creating data directory");
      fs::create_dir_all(&dir)
        .with_context(|| {
          format!(
            "failed to create {}",
            dir.display()
          )
        })?;
    }

    Ok(dir)
  }
}

fn resolve_config_path(
  override_path: Option<&Path>,
  env_path: Option<&str>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Some(raw) = env_path {
    if raw == "/dev/null" {
      return None;
    }
    return Some(PathBuf::from(raw));
  }

  let candidate = dirs::config_dir()?
    .join(APP_DIR)
    .join(CONFIG_FILE);
  candidate.exists().then_some(candidate)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join(APP_DIR))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
