//! Pipeline routes of the v1 API, nested under `/api/v1/pipelines`.
//!
//! - `POST /programming-exercise-chat/run?event=`        start an exercise chat run
//! - `POST /programming-exercise-prompt-user/run?event=` start a prompt-user run
//! - `GET  /{feature}/variants`                          variants usable right now

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use iris_agent::pipeline::FATAL_ERROR;
use iris_agent::{AgentVariant, VariantInfo, available_variants};
use iris_core::Stage;
use iris_core::domain::{ExerciseChatRequest, PipelineSettings, PromptUserRequest};
use iris_pipelines::{ExerciseChatVariant, PromptUserVariant};
use iris_status::{PipelineFeature, StatusCallback};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::SharedState;

const DEFAULT_VARIANT: &str = "default";

pub fn pipelines_router() -> Router<SharedState> {
    Router::new()
        .route("/programming-exercise-chat/run", post(run_exercise_chat))
        .route("/programming-exercise-prompt-user/run", post(run_prompt_user))
        .route("/{feature}/variants", get(list_variants))
}

#[derive(Debug, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub event: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(error: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}

fn variant_id(settings: Option<&PipelineSettings>) -> &str {
    settings.map(|s| s.variant.as_str()).unwrap_or(DEFAULT_VARIANT)
}

/// Fails with 400 unless `id` names a variant whose models are all served.
async fn check_variant<V: AgentVariant>(state: &SharedState, variants: &[V], id: &str) -> Result<(), ApiError> {
    let models = state.context.available_models().await;
    if available_variants(variants, &models).iter().any(|v| v.id() == id) {
        Ok(())
    } else {
        Err(bad_request(format!("Variant '{id}' is unknown or not available")))
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn run_exercise_chat(
    State(state): State<SharedState>,
    Query(params): Query<RunParams>,
    Json(request): Json<ExerciseChatRequest>,
) -> Result<StatusCode, ApiError> {
    check_variant(&state, &ExerciseChatVariant::all(), variant_id(request.settings.as_ref())).await?;
    info!(course = request.course.id, event = ?params.event, "Exercise chat run accepted");

    let worker = exercise_chat_worker(state.clone(), request, params.event);
    state.spawn_worker(worker).await;
    Ok(StatusCode::ACCEPTED)
}

async fn run_prompt_user(
    State(state): State<SharedState>,
    Query(params): Query<RunParams>,
    Json(request): Json<PromptUserRequest>,
) -> Result<StatusCode, ApiError> {
    check_variant(&state, &PromptUserVariant::all(), variant_id(request.settings.as_ref())).await?;
    info!(course = request.course.id, exercise = request.exercise.id, event = ?params.event, "Prompt-user run accepted");

    let worker = prompt_user_worker(state.clone(), request, params.event);
    state.spawn_worker(worker).await;
    Ok(StatusCode::ACCEPTED)
}

async fn list_variants(
    State(state): State<SharedState>,
    Path(feature_name): Path<String>,
) -> Result<Json<Vec<VariantInfo>>, ApiError> {
    let feature = PipelineFeature::from_name(&feature_name)
        .ok_or_else(|| bad_request(format!("Unknown feature: {feature_name}")))?;
    let models = state.context.available_models().await;

    let variants = match feature {
        PipelineFeature::ExerciseChat => available_variants(&ExerciseChatVariant::all(), &models)
            .iter()
            .map(AgentVariant::info)
            .collect(),
        PipelineFeature::PromptUser => available_variants(&PromptUserVariant::all(), &models)
            .iter()
            .map(AgentVariant::info)
            .collect(),
    };
    Ok(Json(variants))
}

// ── Workers ───────────────────────────────────────────────────────────────

/// The run's status callback, or `None` (logged) when Artemis sent no
/// usable settings. Without a callback nobody could hear about the run.
fn status_callback(
    state: &SharedState,
    feature: PipelineFeature,
    settings: Option<&PipelineSettings>,
    initial_stages: Vec<Stage>,
) -> Option<StatusCallback> {
    let Some(settings) = settings else {
        error!(%feature, "Run request has no settings; dropping it");
        return None;
    };
    let callback = StatusCallback::new(
        feature,
        settings.authentication_token.clone(),
        &settings.artemis_base_url,
        initial_stages,
        state.transport.clone(),
    );
    match callback {
        Ok(callback) => Some(callback),
        Err(e) => {
            error!(%feature, error = %e, "Could not create status callback; dropping run");
            None
        }
    }
}

async fn exercise_chat_worker(state: SharedState, request: ExerciseChatRequest, event: Option<String>) {
    let stages = request.initial_stages.clone();
    let Some(callback) = status_callback(&state, PipelineFeature::ExerciseChat, request.settings.as_ref(), stages)
    else {
        return;
    };
    let Some(variant) = ExerciseChatVariant::find(variant_id(request.settings.as_ref())) else {
        error!(run_id = callback.run_id(), "Unknown exercise chat variant");
        callback.error(FATAL_ERROR, None).await;
        return;
    };

    if let Err(e) = state.exercise_chat.run(request, variant, callback.clone(), event).await {
        error!(run_id = callback.run_id(), error = %e, "Exercise chat run could not start");
        callback.error(FATAL_ERROR, Some(&e)).await;
    }
}

async fn prompt_user_worker(state: SharedState, request: PromptUserRequest, event: Option<String>) {
    let stages = request.initial_stages.clone();
    let Some(callback) = status_callback(&state, PipelineFeature::PromptUser, request.settings.as_ref(), stages)
    else {
        return;
    };
    let Some(variant) = PromptUserVariant::find(variant_id(request.settings.as_ref())) else {
        error!(run_id = callback.run_id(), "Unknown prompt-user variant");
        callback.error(FATAL_ERROR, None).await;
        return;
    };

    if let Err(e) = state.prompt_user.run(request, variant, callback.clone(), event).await {
        error!(run_id = callback.run_id(), error = %e, "Prompt-user run could not start");
        callback.error(FATAL_ERROR, Some(&e)).await;
    }
}
