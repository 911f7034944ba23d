//! HTTP API gateway for Iris.
//!
//! Artemis triggers pipeline runs here and receives progress through the
//! status callback of each run. Run requests are answered with 202 right
//! away; the pipeline itself runs on a spawned worker.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use iris_agent::PipelineContext;
use iris_config::AppConfig;
use iris_core::provider::Provider;
use iris_memory::DatabaseHandle;
use iris_pipelines::{ExerciseChatPipeline, PromptUserPipeline};
use iris_status::{HttpStatusTransport, RecordingTransport, StatusTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub context: PipelineContext,
    pub exercise_chat: Arc<ExerciseChatPipeline>,
    pub prompt_user: Arc<PromptUserPipeline>,
    pub transport: Arc<dyn StatusTransport>,
    workers: Mutex<JoinSet<()>>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(context: PipelineContext, transport: Arc<dyn StatusTransport>) -> Self {
        Self {
            exercise_chat: Arc::new(ExerciseChatPipeline::new(context.clone())),
            prompt_user: Arc::new(PromptUserPipeline::new(context.clone())),
            context,
            transport,
            workers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.context.config
    }

    /// Run `worker` in the background. Finished workers are reaped here.
    pub async fn spawn_worker<F>(&self, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut workers = self.workers.lock().await;
        while let Some(finished) = workers.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Pipeline worker panicked");
            }
        }
        workers.spawn(worker);
    }

    /// Wait for every running worker.
    pub async fn drain(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            info!(running = workers.len(), "Waiting for pipeline workers");
        }
        while let Some(finished) = workers.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "Pipeline worker panicked");
            }
        }
    }
}

/// Options of `iris serve` that are not part of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Record status updates in memory instead of sending them to Artemis.
    pub dry_run: bool,
}

/// Build the router with all gateway routes.
///
/// - `/health` is open
/// - `/api/v1/pipelines/*` requires one of the configured API keys
/// - bodies are limited to `gateway.body_limit`
pub fn build_router(state: SharedState) -> Router {
    let pipelines = api_v1::pipelines_router()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    // Artemis calls server-to-server; no browser origin is allowed.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1/pipelines", pipelines)
        .layer(DefaultBodyLimit::max(state.config().gateway.body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and serve until Ctrl-C.
///
/// Running workers are awaited and the database is flushed before
/// returning.
pub async fn start(config: AppConfig, options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let llm: Arc<dyn Provider> = Arc::new(iris_providers::build_from_config(&config)?);
    let database = DatabaseHandle::from_config(&config.memory, &config.retrieval);
    let transport: Arc<dyn StatusTransport> = if options.dry_run {
        info!("Dry run: status updates are recorded, not sent");
        Arc::new(RecordingTransport::new())
    } else {
        Arc::new(HttpStatusTransport::new(Duration::from_secs(config.status.timeout_secs))?)
    };

    let context = PipelineContext::new(config.clone(), llm, database.clone());
    let state = Arc::new(GatewayState::new(context, transport));
    let app = build_router(state.clone());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.drain().await;
    database.shutdown().await;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Accepts `Authorization: <key>` and `Authorization: Bearer <key>`.
/// With no keys configured every request passes.
async fn require_api_key(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let keys = &state.config().api_keys;
    if keys.is_empty() {
        return Ok(next.run(req).await);
    }

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(key) if keys.iter().any(|k| k == key) => {
            debug!(path = %req.uri().path(), "Authorized request");
            Ok(next.run(req).await)
        }
        _ => {
            warn!(path = %req.uri().path(), "Rejected request without a valid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use iris_core::error::ProviderError;
    use iris_core::message::Message;
    use iris_core::provider::{ProviderRequest, ProviderResponse, Usage};
    use iris_memory::VectorDatabase;
    use tower::ServiceExt;

    /// Answers every completion with the same text.
    pub(crate) struct FixedProvider(pub &'static str);

    #[async_trait::async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(self.0),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: request.model,
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["gpt-4.1-mini".into()])
        }
    }

    /// Serves the default model but fails every completion.
    pub(crate) struct UnreachableProvider;

    #[async_trait::async_trait]
    impl Provider for UnreachableProvider {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }

        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["gpt-4.1-mini".into()])
        }
    }

    pub(crate) fn test_state(api_keys: &[&str]) -> (SharedState, RecordingTransport) {
        state_with_provider(api_keys, Arc::new(FixedProvider("Look at your loop condition.")))
    }

    pub(crate) fn state_with_provider(
        api_keys: &[&str],
        provider: Arc<dyn Provider>,
    ) -> (SharedState, RecordingTransport) {
        let mut config = AppConfig::default();
        config.api_keys = api_keys.iter().map(|k| k.to_string()).collect();
        config.memory.creation_enabled = false;
        let context = PipelineContext::new(
            Arc::new(config),
            provider,
            DatabaseHandle::with_database(VectorDatabase::in_memory()),
        );
        let transport = RecordingTransport::new();
        let state = Arc::new(GatewayState::new(context, Arc::new(transport.clone())));
        (state, transport)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (state, _) = test_state(&["secret"]);
        let app = build_router(state);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pipeline_routes_require_an_api_key() {
        let (state, _) = test_state(&["secret"]);
        let uri = "/api/v1/pipelines/PROGRAMMING_EXERCISE_CHAT/variants";

        let cases = [
            (None, StatusCode::UNAUTHORIZED),
            (Some("wrong"), StatusCode::UNAUTHORIZED),
            (Some("secret"), StatusCode::OK),
            (Some("Bearer secret"), StatusCode::OK),
        ];
        for (header_value, expected) in cases {
            let mut req = Request::builder().uri(uri);
            if let Some(value) = header_value {
                req = req.header(header::AUTHORIZATION, value);
            }
            let response = build_router(state.clone())
                .oneshot(req.body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "header {header_value:?}");
        }
    }

    #[tokio::test]
    async fn empty_key_list_disables_the_check() {
        let (state, _) = test_state(&[]);
        let req = Request::builder()
            .uri("/api/v1/pipelines/PROMPT_USER/variants")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
