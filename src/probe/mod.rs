pub mod dispatcher;
pub mod ippure;
pub mod ping0;

use async_trait::async_trait;
use std::time::Duration;

/// IP class as classified by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpClass {
    Residential,
    Datacenter,
    Unknown,
}

/// Origin type (how the IP is routed to the egress network) as classified
/// by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpOrigin {
    Native,
    Broadcast,
    Unknown,
}

/// Result of probing one egress IP through one provider.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ip: String,
    /// Reputation score, 0-100. `None` when the provider couldn't determine one.
    pub score_pct: Option<u8>,
    pub class: IpClass,
    pub origin: IpOrigin,
    /// Raw shared-user-count string, when the provider reports one.
    pub shared_users: Option<String>,
    pub provider: &'static str,
    /// A provider may hand back a fully-formatted `【…】` annotation instead of
    /// leaving the caller to synthesize one from `class`/`origin`.
    pub full_string: Option<String>,
    pub error: Option<String>,
}

impl ProbeResult {
    fn err(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            ip: "?".to_string(),
            score_pct: None,
            class: IpClass::Unknown,
            origin: IpOrigin::Unknown,
            shared_users: None,
            provider,
            full_string: None,
            error: Some(message.into()),
        }
    }
}

/// Pluggable IP-reputation source. Implementations never panic or return
/// `Err` for a failed probe — failure is represented in `ProbeResult::error`
/// so the dispatcher can try the next provider uniformly.
#[async_trait]
pub trait ProbeProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self, local_proxy_url: &str, timeout: Duration) -> ProbeResult;
}

/// Fixed emoji ladder for the reputation score.
pub fn score_emoji(score_pct: Option<u8>) -> &'static str {
    match score_pct {
        None => "❓",
        Some(v) if v <= 10 => "⚪",
        Some(v) if v <= 30 => "🟢",
        Some(v) if v <= 50 => "🟡",
        Some(v) if v <= 70 => "🟠",
        Some(v) if v <= 90 => "🔴",
        Some(_) => "⚫",
    }
}

/// Emoji ladder for the shared-user count, used only by providers that
/// surface a numeric-ish "shared users" figure (e.g. "120+").
pub fn shared_users_emoji(shared_users: Option<&str>) -> &'static str {
    let Some(raw) = shared_users else {
        return "❓";
    };
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return "❓";
    }

    let digits: Vec<&str> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .collect();
    if digits.is_empty() {
        return "❓";
    }

    let mut upper: i64 = if digits.len() > 1 {
        digits.last().unwrap().parse().unwrap_or(0)
    } else {
        digits[0].parse().unwrap_or(0)
    };
    if raw.contains('+') {
        upper += 1;
    }

    if upper <= 10 {
        "🟢"
    } else if upper <= 100 {
        "🟡"
    } else if upper <= 1000 {
        "🟠"
    } else if upper <= 10000 {
        "🔴"
    } else {
        "⚫"
    }
}

pub(crate) fn class_label(class: IpClass) -> &'static str {
    match class {
        IpClass::Residential => "住宅",
        IpClass::Datacenter => "机房",
        IpClass::Unknown => "未知",
    }
}

pub(crate) fn origin_label(origin: IpOrigin) -> &'static str {
    match origin {
        IpOrigin::Native => "原生",
        IpOrigin::Broadcast => "广播",
        IpOrigin::Unknown => "未知",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_ladder_boundaries() {
        assert_eq!(score_emoji(Some(0)), "⚪");
        assert_eq!(score_emoji(Some(10)), "⚪");
        assert_eq!(score_emoji(Some(11)), "🟢");
        assert_eq!(score_emoji(Some(30)), "🟢");
        assert_eq!(score_emoji(Some(31)), "🟡");
        assert_eq!(score_emoji(Some(50)), "🟡");
        assert_eq!(score_emoji(Some(51)), "🟠");
        assert_eq!(score_emoji(Some(70)), "🟠");
        assert_eq!(score_emoji(Some(71)), "🔴");
        assert_eq!(score_emoji(Some(90)), "🔴");
        assert_eq!(score_emoji(Some(91)), "⚫");
        assert_eq!(score_emoji(Some(100)), "⚫");
        assert_eq!(score_emoji(None), "❓");
    }

    #[test]
    fn shared_users_ladder() {
        assert_eq!(shared_users_emoji(None), "❓");
        assert_eq!(shared_users_emoji(Some("N/A")), "❓");
        assert_eq!(shared_users_emoji(Some("5")), "🟢");
        assert_eq!(shared_users_emoji(Some("10")), "🟢");
        assert_eq!(shared_users_emoji(Some("50")), "🟡");
        assert_eq!(shared_users_emoji(Some("500")), "🟠");
        assert_eq!(shared_users_emoji(Some("5000")), "🔴");
        assert_eq!(shared_users_emoji(Some("50000")), "⚫");
        assert_eq!(shared_users_emoji(Some("10+")), "🟡");
        assert_eq!(shared_users_emoji(Some("10-20")), "🟡");
    }
}
