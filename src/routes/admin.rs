use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
};
use tracing::warn;
use validator::Validate;

use crate::{
    dao::models::{GameId, UserId},
    dto::{
        games::{
            GameInput, GameSummary, ImageDownloadRequest, ImageDownloadResponse, ImportReportResponse,
            ImportRequest,
        },
        metadata::{CandidateResponse, IgdbDetailsResponse, IgdbSearchParams},
    },
    error::{AppError, ServiceError},
    routes::auth::Caller,
    services::{auth_service, game_service, image_service, metadata_service},
    state::SharedState,
};

/// Catalog editing, metadata lookup and account removal, reserved to administrators.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/games", post(save_game))
        .route("/admin/games/import", post(import_games))
        .route("/admin/games/{id}", put(update_game).delete(delete_game))
        .route("/admin/games/{id}/image", post(download_image))
        .route("/admin/igdb/search", get(search_igdb))
        .route("/admin/igdb/games/{id}", get(igdb_details))
        .route("/admin/users/{id}", delete(delete_user))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

/// Create a game, or replace the one already holding its slug.
#[utoipa::path(
    post,
    path = "/admin/games",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator")),
    request_body = GameInput,
    responses(
        (status = 200, description = "Game saved", body = GameSummary),
        (status = 400, description = "Invalid game attributes")
    )
)]
pub async fn save_game(
    State(state): State<SharedState>,
    Json(payload): Json<GameInput>,
) -> Result<Json<GameSummary>, AppError> {
    payload.validate()?;
    let game = game_service::insert_game(&state, payload.into()).await?;
    Ok(Json(game.into()))
}

#[utoipa::path(
    put,
    path = "/admin/games/{id}",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    ("id" = i64, Path, description = "Identifier of the game to update")),
    request_body = GameInput,
    responses(
        (status = 200, description = "Game updated", body = GameSummary),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Slug already used by another game")
    )
)]
pub async fn update_game(
    State(state): State<SharedState>,
    Path(id): Path<GameId>,
    Json(payload): Json<GameInput>,
) -> Result<Json<GameSummary>, AppError> {
    payload.validate()?;
    let game = game_service::update_game(&state, id, payload.into()).await?;
    Ok(Json(game.into()))
}

/// Delete a game along with its votes.
#[utoipa::path(
    delete,
    path = "/admin/games/{id}",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    ("id" = i64, Path, description = "Identifier of the game to delete")),
    responses((status = 204, description = "Game deleted"))
)]
pub async fn delete_game(
    State(state): State<SharedState>,
    Path(id): Path<GameId>,
) -> Result<StatusCode, AppError> {
    game_service::delete_game(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Bulk insert spreadsheet rows; slugs already in the catalog are left untouched.
#[utoipa::path(
    post,
    path = "/admin/games/import",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator")),
    request_body = ImportRequest,
    responses((status = 200, description = "Import summary", body = ImportReportResponse))
)]
pub async fn import_games(
    State(state): State<SharedState>,
    Json(payload): Json<ImportRequest>,
) -> Result<Json<ImportReportResponse>, AppError> {
    let rows = payload.rows.into_iter().map(Into::into).collect();
    let report = game_service::import_games(&state, rows).await?;
    Ok(Json(report.into()))
}

/// Download a cover image next to the server and drop the remote URL.
#[utoipa::path(
    post,
    path = "/admin/games/{id}/image",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    ("id" = i64, Path, description = "Identifier of the game")),
    request_body = ImageDownloadRequest,
    responses(
        (status = 200, description = "Image stored", body = ImageDownloadResponse),
        (status = 502, description = "Download failed or not an image")
    )
)]
pub async fn download_image(
    State(state): State<SharedState>,
    Path(id): Path<GameId>,
    Json(payload): Json<ImageDownloadRequest>,
) -> Result<Json<ImageDownloadResponse>, AppError> {
    payload.validate()?;
    let stored = image_service::download_game_image(&state, id, &payload.image_url).await?;
    Ok(Json(stored.into()))
}

#[utoipa::path(
    get,
    path = "/admin/igdb/search",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    IgdbSearchParams),
    responses(
        (status = 200, description = "Matching IGDB records", body = [CandidateResponse]),
        (status = 502, description = "Metadata service unavailable")
    )
)]
pub async fn search_igdb(
    State(state): State<SharedState>,
    Query(params): Query<IgdbSearchParams>,
) -> Result<Json<Vec<CandidateResponse>>, AppError> {
    let candidates = state
        .metadata()
        .search(&params.query, params.limit)
        .await
        .map_err(|err| {
            warn!(query = %params.query, error = %err, "IGDB search failed");
            ServiceError::from(err)
        })?;
    Ok(Json(candidates.iter().map(CandidateResponse::from).collect()))
}

/// Full IGDB record plus the game form pre-filled from it.
#[utoipa::path(
    get,
    path = "/admin/igdb/games/{id}",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    ("id" = u64, Path, description = "IGDB game identifier")),
    responses(
        (status = 200, description = "IGDB record", body = IgdbDetailsResponse),
        (status = 404, description = "Unknown IGDB game")
    )
)]
pub async fn igdb_details(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<IgdbDetailsResponse>, AppError> {
    let candidate = state.metadata().details(id).await.map_err(|err| {
        warn!(igdb_id = id, error = %err, "IGDB details failed");
        ServiceError::from(err)
    })?;
    Ok(Json(IgdbDetailsResponse {
        game: CandidateResponse::from(candidate.as_ref()),
        draft: metadata_service::map_to_game_draft(&candidate).into(),
    }))
}

/// Remove an account with its sessions and votes.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "admin",
    params(("Authorization" = String, Header, description = "`Bearer <token>` of an administrator"),
    ("id" = i64, Path, description = "Identifier of the user to delete")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "User is the last administrator")
    )
)]
pub async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, AppError> {
    auth_service::delete_user(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn require_admin(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let caller = caller.ok_or_else(|| AppError::Unauthorized("login required".into()))?;

    // The role is read back from the store so a demotion takes effect immediately.
    if auth_service::is_admin(&state, caller.user_id()).await? {
        Ok(next.run(req).await)
    } else {
        warn!(user_id = caller.user_id(), "admin route refused");
        Err(AppError::Forbidden("administrator role required".into()))
    }
}
