use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::trace;

use super::client::HttpClient;

/// A [`reqwest::Client`] that never has more than `max_connections` requests
/// in flight.
///
/// Each request holds a slot from connect until its body is fully read.
/// Callers beyond the limit wait for a slot, so every fetch task can be
/// spawned up front.
pub struct PooledClient {
    inner: reqwest::Client,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl PooledClient {
    pub fn new(max_connections: usize) -> reqwest::Result<Self> {
        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()?;

        Ok(Self {
            inner,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Slots not currently held by a request.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl HttpClient for PooledClient {
    async fn get_text(
        &self,
        req: reqwest::Request,
    ) -> reqwest::Result<(reqwest::StatusCode, String)> {
        // The semaphore is private and never closed, so acquire cannot fail.
        let _slot = self.slots.acquire().await.ok();
        trace!(url = %req.url(), available = self.available(), "Connection slot acquired");

        let resp = self.inner.execute(req).await?;
        let status = resp.status();
        let text = resp.text().await?;
        Ok((status, text))
    }
}
