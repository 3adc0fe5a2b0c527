#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
const LOAD_CONFIG_TIMEOUT: Duration = Duration::from_secs(30);

/// A proxy selector or node as reported by `GET /proxies`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub all: Vec<String>,
}

/// Thin client of the upstream proxy router's HTTP control API.
///
/// Every operation is a short-timeout HTTP call; any non-2xx response or
/// transport error is surfaced as `false`/`None` rather than an error type,
/// matching the "never aborts the run over a single control call" policy of
/// the checker that drives this trait.
#[async_trait]
pub trait RouterDriver: Send + Sync {
    async fn alive(&self) -> bool;
    async fn load_config(&self, absolute_path: &str) -> bool;
    async fn set_global_mode(&self) -> bool;
    async fn set_log_level(&self, level: &str) -> bool;
    async fn enforce_mixed_port(&self, port: u16) -> bool;
    async fn get_mixed_port(&self) -> Option<u16>;
    async fn list_proxies(&self) -> Option<HashMap<String, ProxyEntry>>;
    async fn switch_global(&self, name: &str) -> bool;
}

/// `RouterDriver` implementation over a Clash/Mihomo-style control API.
#[derive(Clone)]
pub struct HttpRouterDriver {
    base_url: String,
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpRouterDriver {
    pub fn new(base_url: impl Into<String>, bearer: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build router control HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            bearer,
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Record a control-API call's outcome and latency under a common
    /// `operation` label.
    fn record_call(operation: &'static str, start: Instant, ok: bool) {
        metrics::counter!(
            "auditor_router_call_total",
            "operation" => operation,
            "result" => if ok { "ok" } else { "error" }
        )
        .increment(1);
        metrics::histogram!("auditor_router_call_duration_seconds", "operation" => operation)
            .record(start.elapsed().as_secs_f64());
    }

    async fn patch_configs(&self, body: serde_json::Value, timeout: Duration) -> bool {
        let url = format!("{}/configs", self.base_url);
        let result = self
            .authed(self.client.patch(&url).json(&body))
            .timeout(timeout)
            .send()
            .await;

        match result {
            Ok(resp) => resp.status() == reqwest::StatusCode::NO_CONTENT,
            Err(e) => {
                tracing::warn!("router: PATCH /configs failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl RouterDriver for HttpRouterDriver {
    async fn alive(&self) -> bool {
        let start = Instant::now();
        let url = format!("{}/version", self.base_url);
        let ok = match self
            .authed(self.client.get(&url))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        };
        Self::record_call("alive", start, ok);
        ok
    }

    async fn load_config(&self, absolute_path: &str) -> bool {
        let start = Instant::now();
        let url = format!("{}/configs", self.base_url);
        let payload = serde_json::json!({ "path": absolute_path });

        let result = self
            .authed(self.client.put(&url).json(&payload))
            .timeout(LOAD_CONFIG_TIMEOUT)
            .send()
            .await;

        let ok = match result {
            Ok(resp) => resp.status() == reqwest::StatusCode::NO_CONTENT,
            Err(e) => {
                tracing::warn!("router: PUT /configs failed: {}", e);
                false
            }
        };
        Self::record_call("load_config", start, ok);

        if ok {
            // Quiet the router's own logging once our run takes over.
            self.set_log_level("error").await;
        }

        ok
    }

    async fn set_global_mode(&self) -> bool {
        let start = Instant::now();
        let ok = self
            .patch_configs(serde_json::json!({ "mode": "global" }), CONTROL_TIMEOUT)
            .await;
        Self::record_call("set_global_mode", start, ok);
        ok
    }

    async fn set_log_level(&self, level: &str) -> bool {
        let start = Instant::now();
        let ok = self
            .patch_configs(serde_json::json!({ "log-level": level }), CONTROL_TIMEOUT)
            .await;
        Self::record_call("set_log_level", start, ok);
        ok
    }

    async fn enforce_mixed_port(&self, port: u16) -> bool {
        let start = Instant::now();
        let ok = self
            .patch_configs(
                serde_json::json!({ "mixed-port": port, "allow-lan": false }),
                CONTROL_TIMEOUT,
            )
            .await;
        Self::record_call("enforce_mixed_port", start, ok);
        ok
    }

    async fn get_mixed_port(&self) -> Option<u16> {
        let start = Instant::now();
        let url = format!("{}/configs", self.base_url);
        let result: Option<u16> = async {
            let resp = self
                .authed(self.client.get(&url))
                .timeout(CONTROL_TIMEOUT)
                .send()
                .await
                .ok()?;

            if !resp.status().is_success() {
                return None;
            }

            let body: serde_json::Value = resp.json().await.ok()?;
            body.get("mixed-port")
                .or_else(|| body.get("port"))
                .and_then(|v| v.as_u64())
                .map(|p| p as u16)
        }
        .await;
        Self::record_call("get_mixed_port", start, result.is_some());
        result
    }

    async fn list_proxies(&self) -> Option<HashMap<String, ProxyEntry>> {
        let start = Instant::now();
        let url = format!("{}/proxies", self.base_url);
        let result: Option<HashMap<String, ProxyEntry>> = async {
            let resp = self
                .authed(self.client.get(&url))
                .timeout(CONTROL_TIMEOUT)
                .send()
                .await
                .ok()?;

            if !resp.status().is_success() {
                return None;
            }

            #[derive(Deserialize)]
            struct ProxiesResponse {
                proxies: HashMap<String, ProxyEntry>,
            }

            resp.json::<ProxiesResponse>().await.ok().map(|r| r.proxies)
        }
        .await;
        Self::record_call("list_proxies", start, result.is_some());
        result
    }

    async fn switch_global(&self, name: &str) -> bool {
        let start = Instant::now();
        let selector = self.resolve_global_selector().await;
        let url = format!(
            "{}/proxies/{}",
            self.base_url,
            url_encode_segment(&selector)
        );
        let payload = serde_json::json!({ "name": name });

        let result = self
            .authed(self.client.put(&url).json(&payload))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await;

        let ok = match result {
            Ok(resp) => resp.status() == reqwest::StatusCode::NO_CONTENT,
            Err(e) => {
                tracing::warn!("router: switch to {} via {} failed: {}", name, selector, e);
                false
            }
        };
        Self::record_call("switch_global", start, ok);
        ok
    }
}

impl HttpRouterDriver {
    /// `switch_global` targets the selector literally named `GLOBAL`; if the
    /// router has none (some configurations disable the synthetic selector),
    /// fall back to the first selector of kind `Selector`/`URLTest`/`FallBack`.
    async fn resolve_global_selector(&self) -> String {
        const GLOBAL: &str = "GLOBAL";

        let Some(proxies) = self.list_proxies().await else {
            return GLOBAL.to_string();
        };

        if proxies.contains_key(GLOBAL) {
            return GLOBAL.to_string();
        }

        proxies
            .iter()
            .find(|(_, entry)| {
                matches!(entry.kind.as_str(), "Selector" | "URLTest" | "FallBack")
            })
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| GLOBAL.to_string())
    }
}

/// Percent-encode a single path segment (space -> `%20`, not `+`).
fn url_encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
