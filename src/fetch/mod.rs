mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::TransitError;
use serde_json::Value;
use std::time::Duration;

/// Sends `req` and decodes the body as JSON.
///
/// The whole exchange is bounded by `timeout` regardless of how the client
/// is configured. Non-2xx statuses become [`TransitError::Api`], except 404
/// which is reported through `on_not_found`.
pub async fn fetch_json<C: HttpClient + ?Sized>(
    client: &C,
    req: reqwest::Request,
    timeout: Duration,
    on_not_found: impl FnOnce() -> TransitError,
) -> Result<Value, TransitError> {
    let url = req.url().to_string();

    let exchange = async {
        let resp = client
            .execute(req)
            .await
            .map_err(|e| TransitError::from_reqwest("Request failed", e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(on_not_found());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransitError::Api(format!(
                "API returned status {}: {}",
                status, body
            )));
        }

        resp.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                TransitError::from_reqwest("Reading response body", e)
            } else {
                TransitError::Api(format!("Failed to parse response: {}", e))
            }
        })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(TransitError::Timeout(format!(
            "No response from {} within {}s",
            url,
            timeout.as_secs()
        ))),
    }
}
