mod handlers;


use axum::{
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", post(handlers::start_run))
        .route("/runs/:run_id", get(handlers::run_progress))
        .route("/runs/:run_id/cancel", post(handlers::cancel_run))
}
