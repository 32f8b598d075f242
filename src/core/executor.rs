//! Resolver trait run inside execution units, and result interpretation helpers.

use async_trait::async_trait;

use super::{AppResult, TaskContext};

/// The work an execution unit performs for each task.
///
/// The scheduler never looks inside payloads or results; it only decides when
/// and where `resolve` runs. Returning `Err` is an explicit task failure: the
/// caller sees [`SchedulerError::TaskFailed`](super::SchedulerError::TaskFailed)
/// and the unit stays in service. Panicking is a unit fault: the unit is
/// replaced.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use metadata_offload::core::{AppResult, Resolver, TaskContext, TaskKind};
///
/// #[derive(Clone)]
/// struct SongSource;
///
/// #[async_trait]
/// impl Resolver<String, serde_json::Value> for SongSource {
///     async fn resolve(&self, query: String, ctx: TaskContext) -> AppResult<serde_json::Value> {
///         match ctx.kind {
///             TaskKind::VerifyAvailability => Ok(serde_json::json!({ "available": true })),
///             _ => Ok(serde_json::json!({ "title": query })),
///         }
///     }
/// }
/// ```
///
/// # Threading
///
/// Each unit calls `resolve` from its own OS thread on a single-threaded
/// tokio runtime, one task at a time. A stuck call is abandoned at its next
/// await point once the task deadline fires.
#[async_trait]
pub trait Resolver<P, R>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Resolve one task payload.
    async fn resolve(&self, payload: P, ctx: TaskContext) -> AppResult<R>;
}

/// Interprets a successful `verify` result as available or not.
pub trait Availability {
    /// Whether the probed song can be played.
    fn is_available(&self) -> bool;
}

impl Availability for bool {
    fn is_available(&self) -> bool {
        *self
    }
}

impl<T> Availability for Option<T> {
    fn is_available(&self) -> bool {
        self.is_some()
    }
}

/// `true`, or an object with `"available": true`.
impl Availability for serde_json::Value {
    fn is_available(&self) -> bool {
        match self {
            Self::Bool(available) => *available,
            Self::Object(fields) => fields
                .get("available")
                .and_then(Self::as_bool)
                .unwrap_or(false),
            _ => false,
        }
    }
}
