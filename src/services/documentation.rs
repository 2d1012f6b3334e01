use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Mello Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::events::list_events,
        crate::routes::events::current_event,
        crate::routes::events::list_entries,
        crate::routes::parties::create_party,
        crate::routes::parties::list_parties,
        crate::routes::parties::get_party,
        crate::routes::parties::join_party,
        crate::routes::parties::remove_member,
        crate::routes::votes::submit_ballot,
        crate::routes::votes::submit_rating,
        crate::routes::votes::submit_favorite,
        crate::routes::votes::own_ballot,
        crate::routes::votes::votes_view,
        crate::routes::stats::event_results,
        crate::routes::stats::leaderboard,
        crate::routes::stats::party_stats,
        crate::routes::sse::status_stream,
        crate::routes::sse::votes_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::events::EventSummary,
            crate::dto::events::EventKindDto,
            crate::dto::events::CurrentEventResponse,
            crate::dto::events::EntrySummary,
            crate::dto::parties::CreatePartyRequest,
            crate::dto::parties::JoinPartyRequest,
            crate::dto::parties::MemberSummary,
            crate::dto::parties::PartySummary,
            crate::dto::votes::SubmitBallotRequest,
            crate::dto::votes::SubmitRatingRequest,
            crate::dto::votes::SubmitFavoriteRequest,
            crate::dto::votes::BallotView,
            crate::dto::votes::AggregateView,
            crate::dto::votes::MemberProgress,
            crate::dto::votes::VoteProgress,
            crate::dto::votes::EventVotesView,
            crate::dto::stats::RankedEntryView,
            crate::dto::stats::FavoriteCount,
            crate::dto::stats::EventResultsResponse,
            crate::dto::stats::LeaderboardResponse,
            crate::dto::stats::EntryAgreement,
            crate::dto::stats::PartyStatsResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::StatusChangedEvent,
            crate::dto::ws::DraftInboundMessage,
            crate::dto::ws::DraftOutboundMessage,
            crate::dto::ws::SavingStatusDto,
            crate::state::schedule::EventStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Season catalog and current event"),
        (name = "parties", description = "Party membership"),
        (name = "votes", description = "Ballots and vote progress"),
        (name = "stats", description = "Results, leaderboard and agreement"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "drafts", description = "WebSocket draft sessions"),
    )
)]
pub struct ApiDoc;
