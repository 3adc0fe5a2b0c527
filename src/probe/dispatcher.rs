use super::{ProbeProvider, ProbeResult};
use std::time::Duration;

/// Orders providers per request and returns the first non-error result.
///
/// Primary is `config.source` (or the per-run override); when fallback is
/// enabled, the remaining known providers are appended in a stable order.
pub struct Dispatcher {
    providers: Vec<Box<dyn ProbeProvider>>,
}

impl Dispatcher {
    /// `known` is the full provider set in the stable fallback order. `primary`
    /// selects which one leads; if it doesn't match a known provider name,
    /// the known order is used unchanged.
    pub fn new(known: Vec<Box<dyn ProbeProvider>>, primary: &str, fallback: bool) -> Self {
        let mut ordered = Vec::with_capacity(known.len());
        let mut rest = Vec::with_capacity(known.len());

        for p in known {
            if p.name() == primary {
                ordered.push(p);
            } else {
                rest.push(p);
            }
        }

        if ordered.is_empty() {
            // Primary name unrecognized: fall through to the known stable order.
            ordered = rest;
        } else if fallback {
            ordered.extend(rest);
        }

        Self { providers: ordered }
    }

    pub async fn dispatch(&self, local_proxy_url: &str, timeout: Duration) -> ProbeResult {
        let mut last_error: Option<String> = None;

        for provider in &self.providers {
            let result = provider.check(local_proxy_url, timeout).await;
            match &result.error {
                None => return result,
                Some(e) => {
                    last_error = Some(e.clone());
                    continue;
                }
            }
        }

        ProbeResult::err(
            "dispatcher",
            format!(
                "all sources failed: {}",
                last_error.unwrap_or_else(|| "no providers configured".to_string())
            ),
        )
    }
}
