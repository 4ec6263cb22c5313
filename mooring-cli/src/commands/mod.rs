pub mod daemon;
pub mod pause;
pub mod plan;
pub mod source;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home() -> Result<PathBuf> {
    mooring_core::paths::home().context("could not determine home directory")
}
