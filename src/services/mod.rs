/// OpenAPI documentation generation.
pub mod documentation;
/// Debounced draft ratings of a voting session.
pub mod draft_buffer;
/// Catalog lookups and current event resolution.
pub mod event_service;
/// Health check service.
pub mod health_service;
/// Party creation, membership and lookups.
pub mod party_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Party rankings, leaderboard and agreement statistics.
pub mod stats_service;
/// Background re-resolution of the current event.
pub mod status_ticker;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Optimistic retry loop over versioned documents.
pub mod transaction;
/// Ballot submission and vote projections.
pub mod vote_service;
/// Draft session WebSocket handling.
pub mod websocket_service;

#[cfg(test)]
mod test_support;
