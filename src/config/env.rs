//! Environment overrides applied after the config file is parsed.

use crate::error::ConfigError;

use super::Config;

pub(super) const ENV_ASSISTANT_URL: &str = "OPSDESK_ASSISTANT_URL";
pub(super) const ENV_EXEC_URL: &str = "OPSDESK_EXEC_URL";
pub(super) const ENV_AUTO_APPROVE: &str = "OPSDESK_AUTO_APPROVE";
pub(super) const ENV_STATE_DIR: &str = "OPSDESK_STATE_DIR";

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(url) = non_empty(env_lookup(ENV_ASSISTANT_URL)) {
        config.assistant.base_url = url;
    }
    if let Some(url) = non_empty(env_lookup(ENV_EXEC_URL)) {
        config.exec.base_url = url;
    }
    if let Some(dir) = non_empty(env_lookup(ENV_STATE_DIR)) {
        config.session.state_dir = dir.into();
    }
    if let Some(raw) = non_empty(env_lookup(ENV_AUTO_APPROVE)) {
        config.agent.auto_approve = parse_bool(&raw).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "invalid {ENV_AUTO_APPROVE} value `{raw}`: expected true/false"
            ))
        })?;
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
