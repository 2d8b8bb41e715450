//! HTTP transport and the retry loop.
//!
//! [`send_request`] performs one POST with the cancellation scope raced
//! against both the response head and, for error statuses, the body.
//! [`run_with_retry`] drives any attempt function through the
//! [`RetryState`] machine, sleeping between attempts unless the scope ends
//! first.

use std::collections::BTreeMap;
use std::future::Future;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::cancel::CancelScope;
use crate::config::resolve_env;
use crate::error::{AgentError, Result};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};

// ---------------------------------------------------------------------------
// Endpoint and headers
// ---------------------------------------------------------------------------

/// Resolve `$VAR` references in `base_url` and make sure it ends with
/// `path`.
pub fn resolve_endpoint(base_url: &str, path: &str) -> Result<Url> {
    if base_url.trim().is_empty() {
        return Err(AgentError::RequestBuild {
            reason: "base URL is required".into(),
        });
    }

    let resolved = resolve_env(base_url.trim())?;
    let path = path.trim_start_matches('/');
    let full = if resolved.trim_end_matches('/').ends_with(path) {
        resolved
    } else {
        format!("{}/{path}", resolved.trim_end_matches('/'))
    };

    Url::parse(&full).map_err(|e| AgentError::RequestBuild {
        reason: format!("invalid endpoint URL `{full}`: {e}"),
    })
}

/// Standard headers plus caller-supplied extras.
///
/// The bearer token is only set when `api_key` resolves to something
/// non-empty.  Extra headers are applied last and may override anything.
pub fn request_headers(
    api_key: &str,
    accept: Option<&'static str>,
    extra: &BTreeMap<String, String>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(accept) = accept {
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
    }

    let api_key = resolve_env(api_key)?;
    if !api_key.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            AgentError::RequestBuild {
                reason: format!("invalid authorization header: {e}"),
            }
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| AgentError::RequestBuild {
            reason: format!("invalid header name `{name}`: {e}"),
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| AgentError::RequestBuild {
            reason: format!("invalid value for header `{name}`: {e}"),
        })?;
        headers.insert(name, value);
    }

    Ok(headers)
}

// ---------------------------------------------------------------------------
// Single attempt
// ---------------------------------------------------------------------------

/// POST `body` and return the response once it has a 2xx status.
///
/// Connection failures become [`AgentError::Transport`]; other statuses
/// become [`AgentError::HttpStatus`] carrying the response body.
pub async fn send_request(
    http: &reqwest::Client,
    url: &Url,
    headers: &HeaderMap,
    body: &Value,
    scope: &CancelScope,
) -> Result<reqwest::Response> {
    let request = http.post(url.clone()).headers(headers.clone()).json(body);

    let response = scope.run(request.send()).await??;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = scope
        .run(response.text())
        .await?
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    Err(AgentError::HttpStatus {
        status: status.as_u16(),
        body: text,
    })
}

/// Map a body read error into the retryable stream error.
pub fn stream_read_error(err: reqwest::Error) -> AgentError {
    AgentError::StreamRead {
        reason: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Run `attempt` until it succeeds, fails fatally or exhausts `policy`.
///
/// `attempt` receives the 1-based attempt number and must redo the whole
/// send-and-decode cycle.  The backoff sleep is raced against `scope`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    scope: &CancelScope,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new(policy.clone());

    loop {
        let number = state.begin_attempt();
        let err = match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match state.on_failure(err) {
            RetryDecision::Fail(err) => return Err(err),
            RetryDecision::Retry {
                next_attempt,
                delay,
                cause,
            } => {
                tracing::warn!(
                    attempt = number,
                    next_attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "retrying provider request"
                );
                scope.run(tokio::time::sleep(delay)).await?;
            }
        }
    }
}
