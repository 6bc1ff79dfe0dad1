pub const MISC_TAG: &str = "Miscellaneous";

/// Liveness check. Does not touch the database.
#[tracing::instrument]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Liveness check",
    responses(
        (status = 200, description = "The process is serving requests", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
