//! Background sweeper for stale and unretired checkout sessions.
//!
//! Two kinds of debt are swept: pending sessions past their expiry, and
//! completed sessions whose post-payment artifact retirement failed. In
//! both cases the provider-side artifacts (plans, checkout sessions) are
//! retired first; only then is the local row archived (if pending) and
//! stamped retired. Failures are counted and the session stays in the
//! sweep set, so every missed artifact is retried on the next run.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{CheckoutSession, SessionStatus};

/// Sessions handled per sweep.
const SWEEP_BATCH: i64 = 50;
/// Concurrent provider calls per chunk.
const SWEEP_CONCURRENCY: usize = 5;

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub archived: u64,
    pub failed: u64,
}

/// Run one sweep: retire provider artifacts for expired pending sessions
/// and for completed sessions the immediate retirement missed, then settle
/// the local rows. Per-session failures are logged and counted, never
/// propagated.
pub async fn sweep_once(state: &AppState) -> Result<SweepReport> {
    let due = {
        let conn = state.db.get()?;
        queries::list_sessions_needing_retirement(&conn, queries::now_ms(), SWEEP_BATCH)?
    };

    if due.is_empty() {
        return Ok(SweepReport::default());
    }
    tracing::info!(count = due.len(), "sweeping checkout sessions");

    let mut report = SweepReport::default();
    for chunk in due.chunks(SWEEP_CONCURRENCY) {
        let mut tasks = JoinSet::new();
        for session in chunk {
            let state = state.clone();
            let session = session.clone();
            tasks.spawn(async move { retire_one(&state, &session).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => report.archived += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "sweep task panicked");
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(
        archived = report.archived,
        failed = report.failed,
        "sweep finished"
    );
    Ok(report)
}

async fn retire_one(state: &AppState, session: &CheckoutSession) -> bool {
    if let Err(e) = state.providers.retire_session(session).await {
        tracing::warn!(
            checkout_id = %session.checkout_id,
            provider = %session.provider,
            error = %e,
            "failed to retire provider artifacts, will retry next sweep"
        );
        return false;
    }

    let settled = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|conn| {
            queries::mark_session_retired(&conn, &session.checkout_id)?;
            if session.status == SessionStatus::Pending {
                queries::archive_checkout_session(&conn, &session.checkout_id)?;
            }
            Ok(())
        });
    match settled {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                checkout_id = %session.checkout_id,
                error = %e,
                "failed to settle swept session"
            );
            false
        }
    }
}

/// Retire the provider artifacts behind a just-paid session and stamp the
/// row retired on success. Best-effort: a failure is logged and the session
/// stays in the sweeper's retry set.
pub async fn retire_after_payment(state: &AppState, checkout_id: &str) {
    let session = match state.db.get() {
        Ok(conn) => queries::get_checkout_session(&conn, checkout_id),
        Err(e) => Err(e.into()),
    };
    match session {
        Ok(Some(session)) => {
            if let Err(e) = state.providers.retire_session(&session).await {
                tracing::warn!(
                    checkout_id,
                    error = %e,
                    "failed to retire artifacts after payment, sweeper will retry"
                );
                return;
            }
            let marked = state
                .db
                .get()
                .map_err(AppError::from)
                .and_then(|conn| queries::mark_session_retired(&conn, checkout_id));
            if let Err(e) = marked {
                tracing::warn!(checkout_id, error = %e, "failed to stamp session retired");
            }
        }
        Ok(None) => {
            tracing::debug!(checkout_id, "no local session to retire");
        }
        Err(e) => {
            tracing::warn!(checkout_id, error = %e, "session lookup failed after payment");
        }
    }
}

/// Spawn the periodic sweep loop.
pub fn spawn_cleanup_task(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = sweep_once(&state).await {
                tracing::error!(error = %e, "cleanup sweep failed");
            }
        }
    });
}
