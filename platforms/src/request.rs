//! Request plumbing shared by the platform clients: endpoint construction,
//! retry on transport failure, and status classification.

use crate::errors::PlatformError;
use crate::metrics_defs::{UPSTREAM_REQUESTS, UPSTREAM_RETRIES, UPSTREAM_UNAVAILABLE};
use crate::types::Platform;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::counter;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Appends percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, PlatformError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PlatformError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// A fully read upstream response.
#[derive(Debug)]
pub(crate) struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Timeouts, connection failures and bodies cut off mid-read are transient. Anything else is
/// not worth repeating.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

async fn read_response(request: RequestBuilder) -> Result<UpstreamResponse, reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?.to_vec();
    Ok(UpstreamResponse { status, body })
}

/// Sends the request produced by `build` and reads its body, retrying transport-level
/// failures up to the policy's attempt budget. Any complete HTTP response, successful or
/// not, ends the loop.
pub(crate) async fn send_with_retry<F>(
    platform: Platform,
    operation: &'static str,
    policy: &RetryPolicy,
    build: F,
) -> Result<UpstreamResponse, PlatformError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        counter!(UPSTREAM_REQUESTS, "platform" => platform.as_str(), "operation" => operation)
            .increment(1);

        match read_response(build()).await {
            Ok(response) => return Ok(response),
            Err(err) if is_transient(&err) => {
                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        %platform,
                        operation,
                        attempts = attempt,
                        "Upstream unavailable: {err}"
                    );
                    counter!(UPSTREAM_UNAVAILABLE, "platform" => platform.as_str(), "operation" => operation)
                        .increment(1);
                    return Err(PlatformError::Unavailable {
                        platform,
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    %platform,
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying upstream request: {err}"
                );
                counter!(UPSTREAM_RETRIES, "platform" => platform.as_str(), "operation" => operation)
                    .increment(1);
                sleep(delay).await;
            }
            Err(source) => return Err(PlatformError::Request { platform, source }),
        }
    }
}

/// Maps a non-2xx response to a terminal error. 400 and 404 mean the identifier does not exist.
pub(crate) fn check_status(
    platform: Platform,
    identifier: &str,
    response: UpstreamResponse,
) -> Result<UpstreamResponse, PlatformError> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
            Err(PlatformError::not_found(platform, identifier))
        }
        _ => Err(PlatformError::Upstream { platform, status }),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(
    platform: Platform,
    response: &UpstreamResponse,
) -> Result<T, PlatformError> {
    serde_json::from_slice(&response.body)
        .map_err(|source| PlatformError::Decode { platform, source })
}
