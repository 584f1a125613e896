use async_trait::async_trait;
use reqwest::{Request, StatusCode};

/// Executes a request and reads the whole body as text.
///
/// Implementations decide how requests share connections; callers only see
/// the status and the decoded body.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get_text(&self, req: Request) -> reqwest::Result<(StatusCode, String)>;
}
