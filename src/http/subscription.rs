use std::time::Duration;
use url::Url;

/// Result of fetching and validating a subscription body.
pub enum FetchOutcome {
    Valid(Vec<u8>),
    Invalid { last_body: Vec<u8> },
}

/// Fetch `target_url` with the configured User-Agent and timeout.
async fn fetch_url(target_url: &str, user_agent: &str, timeout: Duration) -> Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let resp = client.get(target_url).header("User-Agent", user_agent).send().await?;
    let resp = resp.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// `is_valid_clash`: the body parses as YAML and has a `proxies` key.
pub fn is_valid_clash(bytes: &[u8]) -> bool {
    match serde_yaml::from_slice::<serde_yaml::Value>(bytes) {
        Ok(serde_yaml::Value::Mapping(m)) => m.contains_key("proxies"),
        _ => false,
    }
}

/// Append `target=clash&ver=meta&flag=clash` to the query string, per the
/// auto-conversion retry contract of the `/check` behavior table.
fn with_conversion_params(target_url: &str) -> Option<String> {
    let mut url = Url::parse(target_url).ok()?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("target", "clash");
        pairs.append_pair("ver", "meta");
        pairs.append_pair("flag", "clash");
    }
    Some(url.to_string())
}

/// Fetch `url`, validating the body as a Clash-shaped document. On a first
/// failure, retry once with auto-conversion query parameters appended.
pub async fn fetch_url_with_retry(
    url: &str,
    user_agent: &str,
    timeout: Duration,
) -> Result<FetchOutcome, reqwest::Error> {
    let content = fetch_url(url, user_agent, timeout).await?;
    if is_valid_clash(&content) {
        return Ok(FetchOutcome::Valid(content));
    }

    tracing::info!("subscription: content not valid Clash YAML, attempting auto-conversion retry");

    let Some(retry_url) = with_conversion_params(url) else {
        return Ok(FetchOutcome::Invalid { last_body: content });
    };

    match fetch_url(&retry_url, user_agent, timeout).await {
        Ok(retry_content) if is_valid_clash(&retry_content) => {
            tracing::info!("subscription: auto-conversion retry succeeded");
            Ok(FetchOutcome::Valid(retry_content))
        }
        Ok(retry_content) => Ok(FetchOutcome::Invalid { last_body: retry_content }),
        Err(e) => {
            tracing::warn!("subscription: auto-conversion retry failed: {}", e);
            Ok(FetchOutcome::Invalid { last_body: content })
        }
    }
}

/// Produce the specific "unrecognized subscription" error message, checking
/// whether the rejected body looks like a raw base64 node list.
pub fn unrecognized_message(last_body: &[u8]) -> String {
    use base64::Engine;
    let default_msg = "Invalid Clash Configuration. Expected YAML with 'proxies' key.";

    let looks_like_node_list = base64::engine::general_purpose::STANDARD
        .decode(last_body)
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .map(|decoded| decoded.contains("vmess://") || decoded.contains("vless://"))
        .unwrap_or(false);

    if looks_like_node_list {
        format!(
            "不支持的订阅类型： Received Base64/Raw Node List. Please use a 'Clash' target subscription link."
        )
    } else {
        format!("不支持的订阅类型： {default_msg}")
    }
}
