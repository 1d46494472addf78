//! HTTP error envelope and the assembled application router.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use partsage_agent::AgentRuntime;
use partsage_core::errors::InterfaceError;
use partsage_db::{CatalogRepository, DbPool};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{chat, health, parts};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// User-safe error response. Internal detail goes to the log only.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(
            event_name = "http.request.failed",
            correlation_id = %self.0.correlation_id(),
            status = status.as_u16(),
            error = %self.0,
            "request failed"
        );
        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(db_pool: DbPool, runtime: Arc<AgentRuntime>, catalog: Arc<dyn CatalogRepository>) -> Router {
    health::router(db_pool).merge(chat::router(runtime)).merge(parts::router(catalog))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use partsage_agent::{AgentRuntime, OracleDecision, ScriptedOracle, TracingAuditSink};
    use partsage_core::config::AppConfig;
    use partsage_db::{
        connect_with_settings, migrations, seed_demo_catalog, CatalogRepository, SqlCatalogRepository,
        SqlContentIndex,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;

    struct FlatEmbedder;

    #[async_trait::async_trait]
    impl partsage_db::QueryEmbedder for FlatEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, partsage_db::EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn app() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repository = SqlCatalogRepository::new(pool.clone());
        seed_demo_catalog(&repository).await.expect("seed");
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repository);

        let oracle = Arc::new(ScriptedOracle::from_fn(|_| {
            Ok(OracleDecision::FinalAnswer("Part PS11752778 is in stock.".to_string()))
        }));
        let runtime = AgentRuntime::from_config(
            &AppConfig::default(),
            Arc::clone(&catalog),
            Arc::new(SqlContentIndex::new(pool.clone(), Arc::new(FlatEmbedder))),
            oracle,
            Arc::new(TracingAuditSink),
        );
        router(pool, Arc::new(runtime), catalog)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn chat_returns_reply_with_metadata() {
        let (status, body) =
            send(app().await, chat_request(r#"{"message":"Is part PS11752778 in stock?"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], json!("Part PS11752778 is in stock."));
        assert_eq!(body["metadata"]["type"], json!("product_search"));
        assert_eq!(body["metadata"]["products"], json!([]));
    }

    #[tokio::test]
    async fn empty_chat_message_is_a_json_bad_request() {
        let (status, body) = send(app().await, chat_request(r#"{"message":"   "}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            json!("The request could not be processed. Check inputs and try again.")
        );
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn malformed_chat_body_is_a_json_bad_request() {
        let (status, body) = send(app().await, chat_request("not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].is_string());
    }

    #[tokio::test]
    async fn out_of_scope_chat_gets_the_fixed_reply() {
        let (status, body) =
            send(app().await, chat_request(r#"{"message":"How do I fix my car stereo?"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], json!(partsage_agent::OUT_OF_SCOPE_REPLY));
        assert_eq!(body["metadata"]["count"], json!(0));
    }

    #[tokio::test]
    async fn part_detail_includes_compatible_models() {
        let request =
            Request::builder().uri("/api/part/PS11750057").body(Body::empty()).expect("request");
        let (status, body) = send(app().await, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!("PS11750057"));
        assert_eq!(body["compatible_models"], json!(["KDTE334GPS0", "WDT780SAEM1"]));
    }

    #[tokio::test]
    async fn unknown_part_is_not_found() {
        let request =
            Request::builder().uri("/api/part/PS00000000").body(Body::empty()).expect("request");
        let (status, body) = send(app().await, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("The requested part was not found."));
    }

    #[tokio::test]
    async fn root_and_health_are_served() {
        let app = app().await;
        let (status, info) = send(
            app.clone(),
            Request::builder().uri("/").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["service"], json!("partsage-server"));

        let (status, health) =
            send(app, Request::builder().uri("/health").body(Body::empty()).expect("request"))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["database"]["status"], json!("ready"));
    }
}
