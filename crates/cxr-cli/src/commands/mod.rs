//! CLI subcommands.

pub mod analyze;
pub mod models;

use cxr_core::CxrConfig;

/// Load configuration from the given path, or use defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<CxrConfig> {
    match config_path {
        Some(path) => Ok(CxrConfig::from_file(std::path::Path::new(path))?),
        None => Ok(CxrConfig::default()),
    }
}
