// Configuration management module
// TOML settings on disk plus the store connection string from the environment

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, IngestionConfig, OllamaConfig, RetrievalConfig, STORE_URI_ENV,
    StoreConfig, StoreSettings,
};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(
    override_dir: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Config::config_dir(),
    }
}
