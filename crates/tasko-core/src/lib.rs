pub mod config;
pub mod datetime;
pub mod filter;
pub mod logging;
pub mod notifier;
pub mod quick_input;
pub mod recurrence;
pub mod settings;
pub mod storage;
pub mod store;
pub mod surface;
pub mod sync_area;
pub mod task;

use std::path::Path;

use anyhow::Context;
use tracing::{
  debug,
  info
};

pub use crate::config::Config;
pub use crate::surface::{
  Profile,
  Surface,
  SurfaceKind
};

/// Loads config, installs logging and
/// opens the profile every surface is
/// opened from.
#[tracing::instrument(skip_all)]
pub fn start<I>(
  config_path: Option<&Path>,
  overrides: I,
  verbose: u8,
  quiet: u8
) -> anyhow::Result<Profile>
where
  I: IntoIterator<
    Item = (String, String)
  >
{
  let mut cfg =
    Config::load(config_path)?;
  cfg.apply_overrides(overrides);

  logging::init_tracing(
    verbose,
    quiet,
    cfg.log_filter.as_deref()
  )?;

  info!(
    verbose,
    quiet,
    "starting tasko"
  );
  debug!(?cfg.loaded_files, "loaded config files");

  Profile::open(&cfg).context(
    "failed to open tasko profile"
  )
}
