pub mod check_config;
pub mod paper;

pub use check_config::CheckConfigArgs;
pub use paper::PaperArgs;

use anyhow::Result;
use delta_neutral_core::{AppConfig, ConfigLoader};

/// Loads `path`, layering `Config.<profile>.toml` when a profile is given.
fn load_config(path: &str, profile: Option<&str>) -> Result<AppConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load(path),
    }
}
