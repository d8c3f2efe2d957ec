//! Operational endpoints.

use axum::extract::State;

use crate::cleanup::{self, SweepReport};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;

/// Trigger one cleanup sweep immediately and report what it did.
pub async fn run_cleanup(State(state): State<AppState>) -> Result<Json<SweepReport>> {
    let report = cleanup::sweep_once(&state).await?;
    Ok(Json(report))
}
