//! Shared HTTP plumbing: client construction, status mapping, retries.

use std::future::Future;
use std::time::Duration;

use kgagent_config::TransportConfig;
use kgagent_core::error::BackendError;
use tracing::warn;

/// Build a `reqwest` client honouring the configured timeouts.
pub fn build_client(transport: &TransportConfig) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(transport.connect_timeout_secs))
        .timeout(Duration::from_secs(transport.request_timeout_secs))
        .build()
        .map_err(|e| BackendError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Classify a `reqwest` send failure.
pub fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else {
        BackendError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status and its body to a backend error.
///
/// OpenAI-style APIs report an exhausted quota as 429 with an
/// `insufficient_quota` code, so that body is checked before rate limiting.
pub fn map_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> BackendError {
    match status {
        429 if body.contains("insufficient_quota") => BackendError::QuotaExceeded(body.to_string()),
        429 => BackendError::RateLimited {
            retry_after_secs: retry_after_secs.unwrap_or(5),
        },
        401 | 403 => {
            BackendError::AuthenticationFailed("Invalid API key or insufficient permissions".into())
        }
        402 => BackendError::QuotaExceeded(body.to_string()),
        _ => BackendError::ApiError {
            status_code: status,
            message: body.to_string(),
        },
    }
}

/// Read the `Retry-After` header as whole seconds.
pub fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
///
/// Only transient errors are retried. The delay doubles after each failure,
/// starting at `retry_backoff_ms`; a rate-limit hint from the server wins when
/// it is longer.
pub async fn with_retries<T, F, Fut>(
    backend: &str,
    transport: &TransportConfig,
    mut attempt: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut delay = Duration::from_millis(transport.retry_backoff_ms);
    let mut tries = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && tries < transport.max_retries => {
                tries += 1;
                let wait = match &e {
                    BackendError::RateLimited { retry_after_secs } => {
                        delay.max(Duration::from_secs(*retry_after_secs))
                    }
                    _ => delay,
                };
                warn!(
                    backend,
                    attempt = tries,
                    max_retries = transport.max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Transient backend failure, retrying"
                );
                tokio::time::sleep(wait).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> TransportConfig {
        TransportConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            map_status(429, "slow down", Some(7)),
            BackendError::RateLimited { retry_after_secs: 7 }
        ));
        assert!(matches!(
            map_status(429, r#"{"error":{"code":"insufficient_quota"}}"#, None),
            BackendError::QuotaExceeded(_)
        ));
        assert!(matches!(map_status(401, "", None), BackendError::AuthenticationFailed(_)));
        assert!(matches!(map_status(402, "", None), BackendError::QuotaExceeded(_)));
        assert!(matches!(
            map_status(500, "boom", None),
            BackendError::ApiError { status_code: 500, .. }
        ));
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(build_client(&TransportConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", &quick(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(BackendError::Network("reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", &quick(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Timeout("slow".into())) }
        })
        .await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries("test", &quick(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::AuthenticationFailed("bad key".into())) }
        })
        .await;
        assert!(matches!(result, Err(BackendError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
