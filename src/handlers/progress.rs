use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProgressFilter {
    pub user_id: Option<String>,
    pub goal_id: Option<String>,
}

/// Server-sent stream of goal progress updates, optionally narrowed to one
/// user or goal. Updates missed by a slow client are skipped.
pub async fn progress_stream(
    State(state): State<AppState>,
    Query(filter): Query<ProgressFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = BroadcastStream::new(state.notifier.subscribe());

    let stream = updates.filter_map(move |update| {
        let event = match update {
            Ok(update)
                if filter.user_id.as_deref().map_or(true, |u| u == update.user_id)
                    && filter.goal_id.as_deref().map_or(true, |g| g == update.goal_id) =>
            {
                Event::default().event("goal_progress").json_data(&update).ok()
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Progress subscriber lagged");
                None
            }
        };
        futures::future::ready(event.map(Ok))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
