//! # Iris Status
//!
//! Progress reporting for pipeline runs. Each run owns one
//! [`StatusCallback`]; it walks a fixed list of [`Stage`]s and POSTs the
//! full status to Artemis after every transition.
//!
//! Publishing is best-effort: transport failures are logged and never
//! surface to the pipeline. Only contract violations (for example calling
//! `done` on a finished stage) return an error.
//!
//! [`Stage`]: iris_core::Stage

pub mod callback;
pub mod feature;
pub mod telemetry;
pub mod transport;
pub mod update;

pub use callback::StatusCallback;
pub use feature::{MEMORY_STAGE, PipelineFeature};
pub use telemetry::{ErrorTelemetry, TracingTelemetry};
pub use transport::{HttpStatusTransport, RecordingTransport, StatusTransport, TransportError};
pub use update::{StatusExtras, StatusUpdate};
