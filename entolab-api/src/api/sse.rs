//! Server-Sent Events for case activity streaming
//!
//! Authenticated clients receive events for their own cases only. The
//! ownership set is cached at connect time and refreshed when an event
//! arrives for an unknown case, so cases created after connecting still
//! stream without a reconnect.

use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::AppState;

/// GET /api/events - SSE event stream for the current user's cases
///
/// Streams events:
/// - AnalysisStarted / AnalysisCompleted / AnalysisFailed
/// - DetectionsSaved
/// - PmiUpdated
/// - ExportCompleted
pub async fn event_stream(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user = %current.user.username, "New SSE client connected");

    let mut rx = state.event_bus.subscribe();
    let user_guid = current.user.guid;

    let stream = async_stream::stream! {
        let mut owned: HashSet<Uuid> = match db::cases::owned_case_guids(&state.db, user_guid).await {
            Ok(guids) => guids.into_iter().collect(),
            Err(e) => {
                warn!("SSE: Failed to load owned cases: {}", e);
                HashSet::new()
            }
        };

        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                Ok(event) = rx.recv() => {
                    let case_id = event.case_id();

                    if !owned.contains(&case_id) {
                        // Possibly a case created after connect
                        match db::cases::owned_case_guids(&state.db, user_guid).await {
                            Ok(guids) => owned = guids.into_iter().collect(),
                            Err(e) => warn!("SSE: Ownership refresh failed: {}", e),
                        }
                        if !owned.contains(&case_id) {
                            continue;
                        }
                    }

                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(event_json) => {
                            debug!("SSE: Broadcasting event: {}", event_type);
                            yield Ok(Event::default()
                                .event(event_type)
                                .data(event_json));
                        }
                        Err(e) => {
                            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
