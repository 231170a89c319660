use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// `POST /v1/shutdown` (spec §4.1): asks the daemon to exit gracefully.
/// Actually stopping the listener happens in `lib::serve`'s shutdown
/// future, which this just signals via the watch channel it holds.
pub async fn shutdown(State(state): State<AppState>) -> StatusCode {
    state.request_shutdown();
    StatusCode::ACCEPTED
}
