use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the LAN game list.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::games::list_games,
        crate::routes::games::count_games,
        crate::routes::games::top_voted,
        crate::routes::games::get_game,
        crate::routes::games::voting_stats,
        crate::routes::games::toggle_vote,
        crate::routes::games::vote_status,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::auth::update_email,
        crate::routes::admin::save_game,
        crate::routes::admin::update_game,
        crate::routes::admin::delete_game,
        crate::routes::admin::import_games,
        crate::routes::admin::download_image,
        crate::routes::admin::search_igdb,
        crate::routes::admin::igdb_details,
        crate::routes::admin::delete_user,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::games::GameSummary,
            crate::dto::games::GameListResponse,
            crate::dto::games::CountResponse,
            crate::dto::games::GameInput,
            crate::dto::games::ImportRowInput,
            crate::dto::games::ImportRequest,
            crate::dto::games::ImportReportResponse,
            crate::dto::games::ImageDownloadRequest,
            crate::dto::games::ImageDownloadResponse,
            crate::dto::votes::VoteResponse,
            crate::dto::votes::VoteStatusResponse,
            crate::dto::votes::VotingStatsResponse,
            crate::dto::votes::MostVotedGame,
            crate::services::vote_service::VoteAction,
            crate::dto::auth::RegisterRequest,
            crate::dto::auth::LoginRequest,
            crate::dto::auth::UpdateEmailRequest,
            crate::dto::auth::UserResponse,
            crate::dto::auth::SessionResponse,
            crate::dto::auth::CurrentUserResponse,
            crate::dto::metadata::CandidateResponse,
            crate::dto::metadata::WebsiteResponse,
            crate::dto::metadata::GameDraftResponse,
            crate::dto::metadata::IgdbDetailsResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "Catalog browsing"),
        (name = "votes", description = "One toggleable vote per user and game"),
        (name = "auth", description = "Accounts and sessions"),
        (name = "admin", description = "Catalog administration, restricted to administrators"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/games",
            "/games/{id}/vote",
            "/auth/login",
            "/admin/games/{id}/image",
            "/admin/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
