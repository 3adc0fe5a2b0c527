use super::{full_body, BoxBody};
use crate::cache::CacheIndex;
use crate::checker::RunOptions;
use crate::http::subscription::{self, FetchOutcome};
use crate::error::AppError;
use crate::jobs::{AdmissionError, JobState};
use crate::server::state::AppState;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Parse a request's query string into a flat map. Last value wins on
/// duplicate keys, matching `serde_urlencoded`-style consumers.
fn query_map(req: &Request<Incoming>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<HashMap<String, String>>()
        })
        .unwrap_or_default()
}

fn plain(status: StatusCode, body: impl Into<String>) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(full_body(body.into()))
        .unwrap()
}

fn json(status: StatusCode, value: serde_json::Value) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(value.to_string()))
        .unwrap()
}

fn yaml_file(status: StatusCode, bytes: Vec<u8>, queue_full: bool) -> Response<BoxBody> {
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", "application/x-yaml");
    if queue_full {
        builder = builder.header("X-QC-Queue-Full", "1");
    }
    builder.body(full_body(bytes)).unwrap()
}

fn run_options_from_query(q: &HashMap<String, String>) -> RunOptions {
    RunOptions {
        source: q.get("source").cloned(),
        fallback: q.get("fallback").map(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        request_timeout_secs: q.get("request_timeout").and_then(|v| v.parse().ok()),
        skip_keywords: q
            .get("skip_keywords")
            .map(|v| v.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect()),
        max_queue_size: q.get("max_queue_size").and_then(|v| v.parse().ok()),
        max_age_secs: q.get("max_age").and_then(|v| v.parse().ok()),
    }
}

/// Client identity for exclusivity tracking: honor a reverse proxy's
/// `X-Forwarded-For` when present, else the direct peer address.
fn client_id(req: &Request<Incoming>, peer_addr: SocketAddr) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|v| v.parse::<IpAddr>().ok())
        .unwrap_or(peer_addr.ip())
        .to_string()
}

/// `GET /check` — the admission and cache-serving contract in full.
pub async fn check(req: Request<Incoming>, state: AppState, peer_addr: SocketAddr) -> Response<BoxBody> {
    let query = query_map(&req);
    let Some(url) = query.get("url").cloned() else {
        return plain(StatusCode::BAD_REQUEST, "missing required query parameter: url");
    };
    let request_id = query.get("request_id").cloned();
    let client = client_id(&req, peer_addr);
    let options = run_options_from_query(&query);

    let max_age = Duration::from_secs(options.max_age_secs.unwrap_or(state.config.max_age_secs));
    let max_queue_size = options.max_queue_size.unwrap_or(state.config.max_queue_size);

    let content = match subscription::fetch_url_with_retry(
        &url,
        &state.config.user_agent,
        Duration::from_secs(state.config.request_timeout_secs),
    )
    .await
    {
        Ok(FetchOutcome::Valid(bytes)) => bytes,
        Ok(FetchOutcome::Invalid { last_body }) => {
            let msg = subscription::unrecognized_message(&last_body);
            return plain(StatusCode::BAD_REQUEST, msg);
        }
        Err(e) => {
            tracing::warn!("http: /check: fetch failed for {}: {}", url, e);
            return plain(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}"));
        }
    };

    let content_hash = CacheIndex::content_hash_of(&content);
    let file_path = state.cache.content_path(&content_hash);
    state.cache.point(&url, &content_hash);

    let exists = file_path.exists();
    let lookup = state.cache.lookup(&url, max_age);
    let existing_record = state.jobs.record(&url);
    let not_cancelled = existing_record
        .as_ref()
        .map(|r| r.state() != JobState::Cancelled)
        .unwrap_or(true);
    let request_id_unchanged = existing_record
        .as_ref()
        .map(|r| r.request_id == request_id)
        .unwrap_or(true);

    if exists && lookup.fresh && not_cancelled && request_id_unchanged {
        if existing_record.is_none() {
            state.jobs.register_completed(&url);
        }
        let bytes = std::fs::read(&file_path).unwrap_or_default();
        metrics::counter!("auditor_check_requests_total", "outcome" => "cache_hit").increment(1);
        return yaml_file(StatusCode::OK, bytes, false);
    }

    let info = state.jobs.queue_info();
    let total_active = info.depth + if info.running_url.is_some() { 1 } else { 0 };

    if total_active >= max_queue_size {
        if exists {
            let bytes = std::fs::read(&file_path).unwrap_or_default();
            metrics::counter!("auditor_check_requests_total", "outcome" => "queue_full_cached").increment(1);
            return yaml_file(StatusCode::OK, bytes, true);
        }
        metrics::counter!("auditor_check_requests_total", "outcome" => "queue_full_no_cache").increment(1);
        return Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("content-type", "text/plain; charset=utf-8")
            .header("X-QC-Queue-Full", "1")
            .body(full_body("server busy, the check queue is currently full"))
            .unwrap();
    }

    if !exists {
        if let Err(e) = state.cache.store_bytes(&content_hash, &content) {
            tracing::error!("http: /check: failed to persist new content file: {}", e);
            let err = AppError::Internal("Internal Write Error".to_string());
            return plain(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
        tracing::info!("http: /check: new task for {}", content_hash);
    } else {
        tracing::info!("http: /check: cache stale for {}, re-triggering", content_hash);
    }

    match state.jobs.submit(url.clone(), file_path.clone(), Some(client), options, request_id) {
        Ok(()) => {
            metrics::counter!("auditor_check_requests_total", "outcome" => "submitted").increment(1);
            let bytes = std::fs::read(&file_path).unwrap_or_default();
            yaml_file(StatusCode::OK, bytes, false)
        }
        Err(AdmissionError::ClientBusy) => {
            metrics::counter!("auditor_check_requests_total", "outcome" => "client_busy").increment(1);
            plain(StatusCode::TOO_MANY_REQUESTS, AdmissionError::ClientBusy.to_string())
        }
    }
}

/// `POST /cancel`.
pub async fn cancel(req: Request<Incoming>, state: AppState) -> Response<BoxBody> {
    let query = query_map(&req);
    let Some(url) = query.get("url").cloned() else {
        return plain(StatusCode::BAD_REQUEST, "missing required query parameter: url");
    };
    let request_id = query.get("request_id").map(String::as_str);

    if state.jobs.cancel(&url, request_id) {
        json(StatusCode::OK, serde_json::json!({"status": "cancelled"}))
    } else {
        json(StatusCode::OK, serde_json::json!({"status": "not_found_or_ignored"}))
    }
}

/// The `job_status` object alone — current/total/message/error/timestamps,
/// or `{"status": "unknown"}` for a URL with no record.
fn job_status_value(state: &AppState, url: &str) -> serde_json::Value {
    match state.jobs.status(url) {
        Some(snapshot) => {
            let submit_time = snapshot
                .submit_time
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let finish_time = snapshot.finish_time.and_then(|t| {
                t.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_secs_f64())
            });
            serde_json::json!({
                "status": snapshot.status,
                "current": snapshot.current,
                "total": snapshot.total,
                "message": snapshot.message,
                "error": snapshot.error,
                "submit_time": submit_time,
                "finish_time": finish_time,
            })
        }
        None => serde_json::json!({"status": "unknown"}),
    }
}

/// `GET /api/status`.
pub async fn api_status(req: Request<Incoming>, state: AppState) -> Response<BoxBody> {
    let query = query_map(&req);
    let Some(url) = query.get("url").cloned() else {
        return plain(StatusCode::BAD_REQUEST, "missing required query parameter: url");
    };

    let job_status = job_status_value(&state, &url);
    let queued = job_status.get("status").and_then(|v| v.as_str()) == Some("queued");
    let info = state.jobs.queue_info();

    let mut payload = serde_json::json!({
        "job_status": job_status,
        "global_queue_size": info.depth,
        "running_job": info.running_url,
    });
    if queued {
        payload["message"] = serde_json::json!(format!("In Queue. Total waiting: {}", info.depth));
    }
    json(StatusCode::OK, payload)
}

/// `GET /status/stream` — SSE. Not a long-lived handler spawned per
/// connection here: hyper's single-shot `service_fn` response model means
/// we build the whole event body up front by polling until a terminal
/// state, one second at a time, matching the 1 Hz polling contract.
pub async fn status_stream(req: Request<Incoming>, state: AppState) -> Response<BoxBody> {
    let query = query_map(&req);
    let Some(url) = query.get("url").cloned() else {
        return plain(StatusCode::BAD_REQUEST, "missing required query parameter: url");
    };

    let mut body = String::new();
    loop {
        let record = state.jobs.record(&url);
        let info = state.jobs.queue_info();

        let logs = record.as_ref().map(|r| r.drain_logs()).unwrap_or_default();
        let base_status = job_status_value(&state, &url);

        if logs.is_empty() {
            body.push_str(&format!(
                "data: {}\n\n",
                serde_json::json!({"job_status": base_status, "global_queue_size": info.depth})
            ));
        } else {
            for message in logs {
                let mut status = base_status.clone();
                if let serde_json::Value::Object(ref mut obj) = status {
                    obj.insert("message".to_string(), serde_json::json!(message));
                }
                body.push_str(&format!(
                    "data: {}\n\n",
                    serde_json::json!({"job_status": status, "global_queue_size": info.depth})
                ));
            }
        }

        let terminal = record
            .as_ref()
            .map(|r| r.state().is_terminal())
            .unwrap_or(true);
        if terminal {
            break;
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .body(full_body(body))
        .unwrap()
}

/// `GET /download` — resolve via the URL-pointer file.
pub async fn download(req: Request<Incoming>, state: AppState) -> Response<BoxBody> {
    let query = query_map(&req);
    let Some(url) = query.get("url").cloned() else {
        return plain(StatusCode::BAD_REQUEST, "missing required query parameter: url");
    };

    let lookup = state.cache.lookup(&url, Duration::from_secs(u64::MAX));
    if lookup.present {
        if let Ok(bytes) = std::fs::read(&lookup.path) {
            return yaml_file(StatusCode::OK, bytes, false);
        }
    }
    plain(StatusCode::NOT_FOUND, AppError::NotFound.to_string())
}

const IPCHECK_HTML: &str = include_str!("../../assets/ipcheck.html");

/// `GET /ipcheck` — static HTML.
pub async fn ipcheck() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/html; charset=utf-8")
        .body(full_body(IPCHECK_HTML))
        .unwrap()
}

pub async fn metrics(state: AppState) -> Response<BoxBody> {
    let body = state.metrics.render();
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(full_body(body))
        .unwrap()
}

pub async fn health() -> Response<BoxBody> {
    json(StatusCode::OK, serde_json::json!({"status": "ok"}))
}

pub fn not_found() -> Response<BoxBody> {
    plain(StatusCode::NOT_FOUND, "not found")
}
