//! Config-file source discovery and the top-level loading pipeline.
//!
//! Source order: explicit path > local file > global file > built-in defaults.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use super::env::apply_runtime_env_overrides;
use super::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ConfigSource {
    /// Config loaded from explicit `--config` path.
    Explicit(PathBuf),
    /// Config loaded from `./opsdesk.toml`.
    Local,
    /// Config loaded from `<config root>/opsdesk/opsdesk.toml`.
    Global(PathBuf),
    /// No file found; runtime defaults were used.
    BuiltInDefaults,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        dirs::config_dir,
    )
}

pub(super) fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<Config, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    debug!(?source, "loaded config source");
    let mut config: Config = toml::from_str(&config_text)?;
    apply_runtime_env_overrides(&mut config, &env_lookup)?;
    validate_config(&config)?;
    Ok(config)
}

/// Read config text from the highest-precedence available source.
pub(super) fn read_config_text_with_sources<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<(String, ConfigSource), ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(p) = path_override {
        let path = PathBuf::from(p);
        let text = read_file(&path)?;
        return Ok((text, ConfigSource::Explicit(path)));
    }

    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok((text, ConfigSource::Local));
    }
    if let Some(dir) = config_root() {
        let global = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            return Ok((text, ConfigSource::Global(global)));
        }
    }

    Ok((String::new(), ConfigSource::BuiltInDefaults))
}

/// Reject settings that would make polling or reporting meaningless.
pub(super) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let scrollback = &config.scrollback;
    if scrollback.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "scrollback.poll_interval_ms must be greater than zero".into(),
        ));
    }
    if scrollback.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "scrollback.timeout_secs must be greater than zero".into(),
        ));
    }
    if scrollback.poll_interval() > scrollback.timeout() {
        return Err(ConfigError::Invalid(
            "scrollback.poll_interval_ms must not exceed scrollback.timeout_secs".into(),
        ));
    }
    if config.exec.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "exec.timeout_secs must be greater than zero".into(),
        ));
    }
    if config.queue.output_head_chars == 0 && config.queue.output_tail_chars == 0 {
        return Err(ConfigError::Invalid(
            "queue.output_head_chars and queue.output_tail_chars cannot both be zero".into(),
        ));
    }
    Ok(())
}
