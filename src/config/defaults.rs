//! Default configuration constants.
//!
//! Callers share these constants instead of repeating literals.

/// File name searched in the working directory and the global config root.
pub(super) const CONFIG_FILE_NAME: &str = "opsdesk.toml";
/// Subdirectory of the platform config root holding the global config.
pub(super) const CONFIG_DIR_NAME: &str = "opsdesk";
/// Default assistant chat service endpoint.
pub(super) const DEFAULT_ASSISTANT_URL: &str = "http://127.0.0.1:8080";
/// Default remote-exec service endpoint.
pub(super) const DEFAULT_EXEC_URL: &str = "http://127.0.0.1:8081";
/// Default request timeout for one assistant turn.
pub(super) const DEFAULT_ASSISTANT_TIMEOUT_SECS: u64 = 300;
/// Default server-side timeout passed with each remote-exec request.
pub(super) const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;
/// Default scrollback poll tick.
pub(super) const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Default bound on scrollback polling before reporting a timeout.
pub(super) const DEFAULT_SCROLLBACK_TIMEOUT_SECS: u64 = 30;
/// Characters kept from the start and end of an output in queue reports.
pub(super) const DEFAULT_OUTPUT_HEAD_CHARS: usize = 400;
pub(super) const DEFAULT_OUTPUT_TAIL_CHARS: usize = 400;
/// Local directory for client-side state (session id).
pub(super) const DEFAULT_STATE_DIR: &str = ".opsdesk";

/// Prompt endings recognized on top of `$`, `#` and `>`.
pub(super) fn default_prompt_suffixes() -> Vec<String> {
    ["❯", "%", "»", "$ ", "# "]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Internal assistant tool names that are never valid shell commands.
pub(super) fn default_tool_deny_list() -> Vec<String> {
    [
        "query_grafana_metrics",
        "query_prometheus",
        "query_loki_logs",
        "search_logs",
        "get_alerts",
        "list_dashboards",
        "execute_command",
        "run_command",
        "suggest_command",
        "open_file",
        "create_changeset",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
