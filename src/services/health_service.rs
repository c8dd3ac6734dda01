use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report degraded mode, pinging the store so failures show up in the logs.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.catalog_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    let status = if state.is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        cached_queries: state.query_cache().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;

    #[tokio::test]
    async fn reports_degraded_once_the_store_is_gone() {
        let (state, _) = test_support::memory_state().await;
        assert_eq!(health_status(&state).await.status, HealthStatus::Ok);

        state.clear_catalog_store().await;
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);
    }
}
