use crate::probe::{class_label, origin_label, score_emoji, ProbeResult};
use regex::Regex;
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*【[^】]*】").unwrap())
}

/// Strip every trailing `【…】` annotation from a node name. A name may
/// accumulate more than one tag across repeated runs of an earlier
/// implementation, so idempotence requires removing all of them, not just
/// the last.
pub fn strip_tag(name: &str) -> String {
    tag_pattern().replace_all(name, "").trim().to_string()
}

/// Render the annotation appended after the stripped base name.
///
/// When the probe result carries a provider-formatted `full_string`, it is
/// used verbatim (it already includes the `【…】` wrapping). Otherwise one is
/// synthesized from `class`/`origin`, or `【❌ 失败】` on error.
pub fn format_tag(result: &ProbeResult) -> String {
    if let Some(err) = &result.error {
        let _ = err;
        return "【❌ 失败】".to_string();
    }

    if let Some(full) = &result.full_string {
        return full.clone();
    }

    format!(
        "【{} {}|{}】",
        score_emoji(result.score_pct),
        class_label(result.class),
        origin_label(result.origin)
    )
}

/// `strip_tag(name) + " " + format_tag(result)`, the full rename computation
/// applied to one proxy.
pub fn rename_for(name: &str, result: &ProbeResult) -> String {
    format!("{} {}", strip_tag(name), format_tag(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{IpClass, IpOrigin};

    #[test]
    fn strip_tag_removes_single_segment() {
        assert_eq!(strip_tag("HK-01 【⚪ 住宅|原生】"), "HK-01");
    }

    #[test]
    fn strip_tag_removes_multiple_segments() {
        assert_eq!(strip_tag("HK-01 【⚪ 住宅|原生】【❌ 失败】"), "HK-01");
    }

    #[test]
    fn strip_tag_is_noop_on_untagged_name() {
        assert_eq!(strip_tag("HK-01"), "HK-01");
    }

    #[test]
    fn format_tag_uses_full_string_verbatim() {
        let result = ProbeResult {
            ip: "1.2.3.4".to_string(),
            score_pct: Some(5),
            class: IpClass::Residential,
            origin: IpOrigin::Native,
            shared_users: None,
            provider: "ping0",
            full_string: Some("【⚪🟢 住宅|原生】".to_string()),
            error: None,
        };
        assert_eq!(format_tag(&result), "【⚪🟢 住宅|原生】");
    }

    #[test]
    fn format_tag_synthesizes_without_full_string() {
        let result = ProbeResult {
            ip: "1.2.3.4".to_string(),
            score_pct: Some(85),
            class: IpClass::Datacenter,
            origin: IpOrigin::Broadcast,
            shared_users: None,
            provider: "ippure",
            full_string: None,
            error: None,
        };
        assert_eq!(format_tag(&result), "【🔴 机房|广播】");
    }

    #[test]
    fn format_tag_on_error_is_failure_marker() {
        let result = ProbeResult {
            ip: "?".to_string(),
            score_pct: None,
            class: IpClass::Unknown,
            origin: IpOrigin::Unknown,
            shared_users: None,
            provider: "dispatcher",
            full_string: None,
            error: Some("all sources failed".to_string()),
        };
        assert_eq!(format_tag(&result), "【❌ 失败】");
    }

    #[test]
    fn rename_is_idempotent_under_repeated_application() {
        let result = ProbeResult {
            ip: "1.2.3.4".to_string(),
            score_pct: Some(5),
            class: IpClass::Residential,
            origin: IpOrigin::Native,
            shared_users: None,
            provider: "ping0",
            full_string: None,
            error: None,
        };
        let once = rename_for("HK-01", &result);
        let twice = rename_for(&once, &result);
        assert_eq!(once, twice);
    }
}
