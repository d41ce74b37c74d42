//! JSON POST with retry and exponential backoff, shared by the hosted
//! providers.

use std::time::Duration;

use crate::config::LlmConfig;

/// Build the HTTP client. Without `timeout_secs` the reqwest default
/// (no overall timeout) applies.
pub(crate) fn build_client(config: &LlmConfig) -> Result<reqwest::Client, String> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().map_err(|e| e.to_string())
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value, String> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| format!("{} returned invalid JSON: {}", service, e));
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(service, %status, "transient API error");
                    last_err = Some(format!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                // Client error (not 429), do not retry
                return Err(format!("{} API error {}: {}", service, status, body_text));
            }
            Err(e) => {
                tracing::warn!(service, "request failed: {}", e);
                last_err = Some(format!("{} request failed: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| format!("{} request failed after retries", service)))
}
