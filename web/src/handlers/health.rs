//! Liveness endpoint for load balancers.

use axum::http::StatusCode;

/// `GET /health`
///
/// Returns 200 `ok` while the process is serving. Does not touch Redis: a
/// store outage degrades individual requests, it does not make the instance
/// unhealthy.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
