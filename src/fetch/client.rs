use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport seam for the transit client. Tests swap in canned responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends one request; status handling is left to the caller.
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;

    /// Releases pooled connections. Safe to call more than once.
    fn close(&self) {}
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for std::sync::Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }

    fn close(&self) {
        (**self).close()
    }
}
