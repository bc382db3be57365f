use async_trait::async_trait;
use reqwest::Method;
use tracing::info;

use crate::core::client::ApiClient;
use crate::core::error::ApiError;
use crate::core::task::{ApiResponse, HealthStatus, StatsResponse};

/// Queue-wide operations the sync store depends on.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn get_stats(&self) -> Result<StatsResponse, ApiError>;

    /// Moves tasks stuck in `processing` for longer than `timeout_minutes`
    /// back to a recoverable state.
    async fn reset_stale(&self, timeout_minutes: u32) -> Result<ApiResponse, ApiError>;

    /// Purges finished tasks older than `days`.
    async fn cleanup(&self, days: u32) -> Result<ApiResponse, ApiError>;

    async fn health_check(&self) -> Result<HealthStatus, ApiError>;
}

/// HTTP implementation of [`QueueService`].
#[derive(Debug, Clone)]
pub struct QueueApi {
    client: ApiClient,
}

impl QueueApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueueService for QueueApi {
    async fn get_stats(&self) -> Result<StatsResponse, ApiError> {
        let builder = self.client.request(Method::GET, &["queue", "stats"])?;
        self.client.send_json(builder).await
    }

    async fn reset_stale(&self, timeout_minutes: u32) -> Result<ApiResponse, ApiError> {
        let builder = self
            .client
            .request(Method::POST, &["admin", "reset-stale"])?
            .query(&[("timeout_minutes", timeout_minutes)]);
        let resp: ApiResponse = self.client.send_json(builder).await?;
        info!(timeout_minutes, reset = ?resp.count("reset_count"), "Stale tasks reset");
        Ok(resp)
    }

    async fn cleanup(&self, days: u32) -> Result<ApiResponse, ApiError> {
        let builder = self
            .client
            .request(Method::POST, &["admin", "cleanup"])?
            .query(&[("days", days)]);
        let resp: ApiResponse = self.client.send_json(builder).await?;
        info!(days, deleted = ?resp.count("deleted_count"), "Old tasks cleaned up");
        Ok(resp)
    }

    async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        let builder = self.client.request(Method::GET, &["health"])?;
        self.client.send_json(builder).await
    }
}
