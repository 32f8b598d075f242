//! API surface for an outer service layer.

pub mod api;

pub use api::{health_report, submit_request, HealthReport, SubmissionRequest};
