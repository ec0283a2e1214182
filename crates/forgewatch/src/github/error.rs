//! Mapping GitHub HTTP failures onto [`PlatformError`].

use chrono::{DateTime, Duration, Utc};

use crate::http::{HttpError, HttpResponse};
use crate::platform::PlatformError;

/// Translate a transport failure. Timeouts and resets are network errors.
pub fn from_http_error(e: HttpError) -> PlatformError {
    PlatformError::network(e.to_string())
}

/// Translate a non-2xx response.
///
/// `resource` names what was requested, for not-found messages.
pub fn error_from_response(resp: &HttpResponse, resource: &str) -> PlatformError {
    let message = api_message(&resp.body);

    match resp.status {
        401 => PlatformError::AuthRequired,
        403 | 429 if is_rate_limit_response(resp, &message) => PlatformError::RateLimited {
            reset_at: reset_time(resp, Utc::now()),
        },
        404 => PlatformError::not_found(resource),
        422 => PlatformError::QueryRejected { message },
        status => PlatformError::api(status, message),
    }
}

/// 403/429 responses are rate limits when GitHub says so through headers or
/// the message; other 403s are permission problems.
fn is_rate_limit_response(resp: &HttpResponse, message: &str) -> bool {
    resp.status == 429
        || resp.header("x-ratelimit-remaining") == Some("0")
        || resp.header("retry-after").is_some()
        || message.to_ascii_lowercase().contains("rate limit")
}

/// When the limit lifts: `retry-after` wins, then `x-ratelimit-reset`,
/// else one minute from now.
fn reset_time(resp: &HttpResponse, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(secs) = resp
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return now + Duration::seconds(secs);
    }
    resp.header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .unwrap_or_else(|| now + Duration::seconds(60))
}

/// Pull `message` out of a GitHub error body, falling back to the raw text.
fn api_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body)
        && let Some(msg) = value.get("message").and_then(|m| m.as_str())
    {
        return msg.to_string();
    }
    let text = String::from_utf8_lossy(body);
    text.chars().take(200).collect()
}
