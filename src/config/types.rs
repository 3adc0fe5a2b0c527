use serde::{Deserialize, Serialize};

/// Process-wide configuration, read once at boot and read-only thereafter.
///
/// Per-request overrides never mutate this — they flow exclusively through
/// [`crate::jobs::RunOptions`], layered on top of a clone of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the upstream proxy router's control API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// JSON-API probe endpoint (the `ippure`-shaped provider).
    #[serde(default = "default_check_url")]
    pub check_url: String,

    /// Default per-probe / per-fetch HTTP timeout, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Mixed listener port enforced on the router before probing.
    #[serde(default = "default_mixed_port")]
    pub mixed_port: u16,

    /// User-Agent sent by the subscription fetcher and probe providers.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Substrings that cause a node to be skipped (informational nodes,
    /// announcements, etc. bundled into subscriptions alongside real proxies).
    #[serde(default = "default_skip_keywords")]
    pub skip_keywords: Vec<String>,

    /// Cache freshness window, in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Maximum combined queue depth + running job before admission rejects.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Primary probe provider name ("ping0" or "ippure").
    #[serde(default = "default_source")]
    pub source: String,

    /// Whether to fall through to the remaining providers on primary failure.
    #[serde(default = "default_fallback")]
    pub fallback: bool,

    /// Sleep after `load_config` before the router is assumed stable, ms.
    #[serde(default = "default_load_grace_ms")]
    pub load_grace_ms: u64,

    /// Sleep after `switch_global` before probing, ms.
    #[serde(default = "default_switch_settle_ms")]
    pub switch_settle_ms: u64,

    /// Persist the document to disk every N completed proxies.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            check_url: default_check_url(),
            request_timeout_secs: default_request_timeout(),
            mixed_port: default_mixed_port(),
            user_agent: default_user_agent(),
            skip_keywords: default_skip_keywords(),
            max_age_secs: default_max_age(),
            max_queue_size: default_max_queue_size(),
            source: default_source(),
            fallback: default_fallback(),
            load_grace_ms: default_load_grace_ms(),
            switch_settle_ms: default_switch_settle_ms(),
            save_every: default_save_every(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_check_url() -> String {
    "https://my.123169.xyz/v1/info".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_mixed_port() -> u16 {
    7890
}

fn default_user_agent() -> String {
    "ClashVerge/2.4.3 Mihomo/1.19.17".to_string()
}

fn default_skip_keywords() -> Vec<String> {
    ["剩余", "到期", "有效期", "重置", "官网", "网址", "更新", "公告", "建议"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_age() -> u64 {
    3600
}

fn default_max_queue_size() -> usize {
    10
}

fn default_source() -> String {
    "ping0".to_string()
}

fn default_fallback() -> bool {
    true
}

fn default_load_grace_ms() -> u64 {
    1000
}

fn default_switch_settle_ms() -> u64 {
    500
}

fn default_save_every() -> usize {
    5
}
