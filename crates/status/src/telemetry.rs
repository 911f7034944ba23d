//! Where run failures go besides the status endpoint.

/// Receives the cause of every reported run error.
pub trait ErrorTelemetry: Send + Sync {
    fn capture(
        &self,
        run_id: &str,
        stage: &str,
        message: &str,
        cause: Option<&(dyn std::error::Error + Send + Sync + 'static)>,
    );
}

/// Emits a structured error event on the `iris::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl ErrorTelemetry for TracingTelemetry {
    fn capture(
        &self,
        run_id: &str,
        stage: &str,
        message: &str,
        cause: Option<&(dyn std::error::Error + Send + Sync + 'static)>,
    ) {
        match cause {
            Some(cause) => tracing::error!(
                target: "iris::telemetry",
                run_id,
                stage,
                error = %cause,
                "{message}"
            ),
            None => tracing::error!(target: "iris::telemetry", run_id, stage, "{message}"),
        }
    }
}
