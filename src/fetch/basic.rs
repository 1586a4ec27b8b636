use super::client::HttpClient;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Plain reqwest-backed client.
///
/// The underlying `reqwest::Client` (and its connection pool) is built on
/// first use and reused until [`HttpClient::close`] drops it; a request after
/// `close` starts a fresh one.
pub struct BasicClient {
    timeout: Duration,
    session: Mutex<Option<reqwest::Client>>,
}

impl BasicClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            session: Mutex::new(None),
        }
    }

    fn session(&self) -> reqwest::Result<reqwest::Client> {
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        debug!(timeout_secs = self.timeout.as_secs(), "Creating HTTP session");
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub fn is_open(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.session()?.execute(req).await
    }

    fn close(&self) {
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!("HTTP session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_is_lazy_and_close_is_idempotent() {
        let client = BasicClient::new();
        assert!(!client.is_open());

        client.session().unwrap();
        assert!(client.is_open());

        client.close();
        assert!(!client.is_open());
        client.close();
        assert!(!client.is_open());

        client.session().unwrap();
        assert!(client.is_open());
    }
}
