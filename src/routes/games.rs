use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};

use crate::{
    dao::models::GameId,
    dto::{
        games::{CountResponse, GameListParams, GameListResponse, GameSummary, TopVotedParams},
        votes::{VoteResponse, VoteStatusResponse, VotingStatsResponse},
    },
    error::AppError,
    routes::auth::{Caller, RequireUser},
    services::{query_service, vote_service},
    state::SharedState,
};

/// Public catalog browsing and per-user voting.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", get(list_games))
        .route("/games/count", get(count_games))
        .route("/games/top", get(top_voted))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/vote", get(vote_status).post(toggle_vote))
        .route("/votes/stats", get(voting_stats))
}

/// Filtered and sorted catalog listing.
#[utoipa::path(
    get,
    path = "/games",
    tag = "games",
    params(GameListParams),
    responses((status = 200, description = "Matching games", body = GameListResponse))
)]
pub async fn list_games(
    State(state): State<SharedState>,
    Query(params): Query<GameListParams>,
) -> Json<GameListResponse> {
    let games = query_service::list_games(&state, params.into_query()).await;
    Json(GameListResponse::new(games.iter()))
}

#[utoipa::path(
    get,
    path = "/games/count",
    tag = "games",
    responses((status = 200, description = "Number of games in the catalog", body = CountResponse))
)]
pub async fn count_games(State(state): State<SharedState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: query_service::count_games(&state).await,
    })
}

/// Most voted games first.
#[utoipa::path(
    get,
    path = "/games/top",
    tag = "games",
    params(TopVotedParams),
    responses((status = 200, description = "Games ranked by votes", body = [GameSummary]))
)]
pub async fn top_voted(
    State(state): State<SharedState>,
    Query(params): Query<TopVotedParams>,
) -> Json<Vec<GameSummary>> {
    let games = query_service::top_voted(&state, params.limit).await;
    Json(games.into_iter().map(GameSummary::from).collect())
}

#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "games",
    params(("id" = i64, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Game found", body = GameSummary),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<GameId>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(query_service::get_game(&state, id).await?.into()))
}

#[utoipa::path(
    get,
    path = "/votes/stats",
    tag = "votes",
    responses((status = 200, description = "Aggregate voting figures", body = VotingStatsResponse))
)]
pub async fn voting_stats(State(state): State<SharedState>) -> Json<VotingStatsResponse> {
    Json(query_service::voting_statistics(&state).await.into())
}

/// Add the caller's vote, or take it back when already cast.
#[utoipa::path(
    post,
    path = "/games/{id}/vote",
    tag = "votes",
    params(
        ("id" = i64, Path, description = "Game identifier"),
        ("Authorization" = Option<String>, Header, description = "`Bearer <token>`; the session cookie works too")
    ),
    responses(
        (status = 200, description = "Vote toggled", body = VoteResponse),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn toggle_vote(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<GameId>,
) -> Result<Json<VoteResponse>, AppError> {
    let caller = caller.map(|user| user.user_id());
    let outcome = vote_service::toggle_vote(&state, caller, id).await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    get,
    path = "/games/{id}/vote",
    tag = "votes",
    params(
        ("id" = i64, Path, description = "Game identifier"),
        ("Authorization" = Option<String>, Header, description = "`Bearer <token>`; the session cookie works too")
    ),
    responses(
        (status = 200, description = "Whether the caller voted for the game", body = VoteStatusResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn vote_status(
    State(state): State<SharedState>,
    RequireUser(caller): RequireUser,
    Path(id): Path<GameId>,
) -> Result<Json<VoteStatusResponse>, AppError> {
    let voted = vote_service::user_vote(&state, caller.user_id(), id).await?;
    Ok(Json(VoteStatusResponse { voted }))
}
