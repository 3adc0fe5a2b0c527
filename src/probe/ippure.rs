use super::{score_emoji, IpClass, IpOrigin, ProbeProvider, ProbeResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// JSON-API probe provider (`ippure`-shaped: a small `/v1/info` mirror that
/// answers with a fraud score and residential/broadcast flags).
pub struct IpPureProvider {
    check_url: String,
    user_agent: String,
}

impl IpPureProvider {
    pub fn new(check_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            check_url: check_url.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Deserialize)]
struct InfoResponse {
    ip: Option<String>,
    #[serde(rename = "fraudScore")]
    fraud_score: Option<f64>,
    #[serde(rename = "isResidential", default)]
    is_residential: bool,
    #[serde(rename = "isBroadcast", default)]
    is_broadcast: bool,
}

#[async_trait]
impl ProbeProvider for IpPureProvider {
    fn name(&self) -> &'static str {
        "ippure"
    }

    async fn check(&self, local_proxy_url: &str, timeout: Duration) -> ProbeResult {
        let client = match reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(local_proxy_url).unwrap())
            .timeout(timeout)
            .user_agent(&self.user_agent)
            .build()
        {
            Ok(c) => c,
            Err(e) => return ProbeResult::err("ippure", e.to_string()),
        };

        let resp = match client.get(&self.check_url).send().await {
            Ok(r) => r,
            Err(e) => return ProbeResult::err("ippure", e.to_string()),
        };

        if !resp.status().is_success() {
            return ProbeResult::err("ippure", format!("HTTP {}", resp.status()));
        }

        let body: InfoResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) => return ProbeResult::err("ippure", e.to_string()),
        };

        let score_pct = body.fraud_score.map(|v| v.round().clamp(0.0, 100.0) as u8);

        ProbeResult {
            ip: body.ip.unwrap_or_else(|| "❓".to_string()),
            score_pct,
            class: if body.is_residential {
                IpClass::Residential
            } else {
                IpClass::Datacenter
            },
            origin: if body.is_broadcast {
                IpOrigin::Broadcast
            } else {
                IpOrigin::Native
            },
            shared_users: None,
            provider: "ippure",
            full_string: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_info_response() {
        let json = r#"{"ip":"1.2.3.4","fraudScore":42,"isResidential":true,"isBroadcast":false}"#;
        let body: InfoResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(body.fraud_score, Some(42.0));
        assert!(body.is_residential);
        assert!(!body.is_broadcast);
        assert_eq!(score_emoji(Some(42)), "🟡");
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let json = r#"{}"#;
        let body: InfoResponse = serde_json::from_str(json).unwrap();
        assert!(body.ip.is_none());
        assert!(body.fraud_score.is_none());
        assert!(!body.is_residential);
    }
}
