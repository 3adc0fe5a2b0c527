use super::{score_emoji, shared_users_emoji, IpClass, IpOrigin, ProbeProvider, ProbeResult};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

const PROBE_URL: &str = "https://ping0.cc/";

/// HTML-scraping probe provider (`ping0`-shaped: a reputation page that
/// embeds IP type, risk score and shared-user-count in its markup).
pub struct Ping0Provider {
    user_agent: String,
}

impl Ping0Provider {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::compile)
}

struct Patterns {
    window_ip: Regex,
    ping_href: Regex,
    iptype: Regex,
    score: Regex,
    native: Regex,
    shared_attr: Regex,
    shared_bar: Regex,
}

impl Patterns {
    fn compile() -> Self {
        Self {
            window_ip: Regex::new(r"window\.ip\s*=\s*'([^']+)'").unwrap(),
            ping_href: Regex::new(r#"href="[^"]*?/ping/([0-9.]+)""#).unwrap(),
            iptype: Regex::new(
                r#"(?s)<div class="line line-iptype">.*?<span class="label[^>]*>(.*?)</span>"#,
            )
            .unwrap(),
            score: Regex::new(
                r#"class="riskitem riskcurrent"[^>]*><span class="value">(\d+)%</span>"#,
            )
            .unwrap(),
            native: Regex::new(
                r#"(?s)<div class="line line-nativeip">.*?<span class="label[^>]*>(.*?)</span>"#,
            )
            .unwrap(),
            shared_attr: Regex::new(r#"usecount="([^"]+)""#).unwrap(),
            shared_bar: Regex::new(r#"(?s)class="usecountbar"[^>]*>\s*(.*?)\s*</div>"#).unwrap(),
        }
    }
}

/// Parse the ping0.cc reputation page. Returns `None` if the page looks like
/// a Cloudflare interstitial rather than the real response.
fn parse_page(html: &str) -> Option<ProbeResult> {
    if html.contains("<title>Just a moment...</title>")
        || html.contains("challenge-platform")
        || html.contains("cf-turnstile")
    {
        return None;
    }

    let p = patterns();

    let ip = p
        .window_ip
        .captures(html)
        .or_else(|| p.ping_href.captures(html))
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| "❓".to_string());

    let class = p
        .iptype
        .captures(html)
        .map(|c| c[1].trim().to_string())
        .map(|raw| {
            if raw.contains("机房") || raw.contains("IDC") {
                IpClass::Datacenter
            } else if raw.contains("家庭") || raw.contains("住宅") {
                IpClass::Residential
            } else {
                IpClass::Unknown
            }
        })
        .unwrap_or(IpClass::Unknown);

    let score_pct = p
        .score
        .captures(html)
        .and_then(|c| c[1].parse::<u8>().ok());

    let origin = p
        .native
        .captures(html)
        .map(|c| c[1].trim().to_string())
        .map(|raw| {
            if raw.contains("广播") {
                IpOrigin::Broadcast
            } else if raw.contains("原生") {
                IpOrigin::Native
            } else {
                IpOrigin::Unknown
            }
        })
        .unwrap_or(IpOrigin::Unknown);

    let shared_users = p
        .shared_attr
        .captures(html)
        .or_else(|| p.shared_bar.captures(html))
        .map(|c| c[1].trim().to_string());

    let class_label = match class {
        IpClass::Residential => "住宅",
        IpClass::Datacenter => "机房",
        IpClass::Unknown => "",
    };
    let origin_label = match origin {
        IpOrigin::Native => "原生",
        IpOrigin::Broadcast => "广播",
        IpOrigin::Unknown => "",
    };
    let info = match (class_label.is_empty(), origin_label.is_empty()) {
        (true, true) => "未知".to_string(),
        _ => format!("{class_label}|{origin_label}"),
    };

    let full_string = format!(
        "【{}{} {}】",
        score_emoji(score_pct),
        shared_users_emoji(shared_users.as_deref()),
        info
    );

    Some(ProbeResult {
        ip,
        score_pct,
        class,
        origin,
        shared_users,
        provider: "ping0",
        full_string: Some(full_string),
        error: None,
    })
}

#[async_trait]
impl ProbeProvider for Ping0Provider {
    fn name(&self) -> &'static str {
        "ping0"
    }

    async fn check(&self, local_proxy_url: &str, timeout: Duration) -> ProbeResult {
        let client = match reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(local_proxy_url).unwrap())
            .timeout(timeout)
            .user_agent(&self.user_agent)
            .build()
        {
            Ok(c) => c,
            Err(e) => return ProbeResult::err("ping0", e.to_string()),
        };

        let resp = match client.get(PROBE_URL).send().await {
            Ok(r) => r,
            Err(e) => return ProbeResult::err("ping0", e.to_string()),
        };

        if !resp.status().is_success() {
            return ProbeResult::err("ping0", format!("HTTP {}", resp.status()));
        }

        let html = match resp.text().await {
            Ok(t) => t,
            Err(e) => return ProbeResult::err("ping0", e.to_string()),
        };

        match parse_page(&html) {
            Some(result) => result,
            None => ProbeResult::err("ping0", "anti-bot interstitial detected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_cloudflare_interstitial() {
        let html = "<html><head><title>Just a moment...</title></head></html>";
        assert!(parse_page(html).is_none());
    }

    #[test]
    fn parses_a_representative_page() {
        let html = r#"
            <script>window.ip = '203.0.113.9';</script>
            <div class="line line-iptype">
              <span class="label">住宅</span>
            </div>
            <span class="riskitem riskcurrent"><span class="value">5%</span></span>
            <div class="line line-nativeip">
              <span class="label">原生IP</span>
            </div>
            <div class="usecountbar" usecount="87">bar</div>
        "#;
        let result = parse_page(html).expect("page should parse");
        assert_eq!(result.ip, "203.0.113.9");
        assert_eq!(result.class, IpClass::Residential);
        assert_eq!(result.origin, IpOrigin::Native);
        assert_eq!(result.score_pct, Some(5));
        assert_eq!(result.shared_users.as_deref(), Some("87"));
        assert!(result.full_string.unwrap().starts_with('【'));
    }

    #[test]
    fn falls_back_to_unknown_for_unrecognized_markup() {
        let html = "<html><body>nothing here</body></html>";
        let result = parse_page(html).expect("should still parse, just unknown");
        assert_eq!(result.class, IpClass::Unknown);
        assert_eq!(result.origin, IpOrigin::Unknown);
        assert_eq!(result.score_pct, None);
    }
}
