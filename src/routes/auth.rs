use std::{net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE, USER_AGENT},
        request::Parts,
    },
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::auth::{
        CurrentUserResponse, LoginRequest, RegisterRequest, SessionResponse, UpdateEmailRequest,
        UserResponse,
    },
    error::{AppError, ServiceError},
    services::auth_service::{self, AuthenticatedUser, ClientInfo},
    state::SharedState,
};

pub const SESSION_COOKIE: &str = "session_token";
pub const REMEMBER_COOKIE: &str = "remember_token";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Account and session endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/me/email", put(update_email))
}

/// Every session token presented with the request, most explicit first:
/// `Authorization: Bearer`, then the session cookie, then the remember-me cookie.
pub fn presented_tokens(headers: &HeaderMap) -> Vec<String> {
    let mut tokens = Vec::new();

    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        tokens.push(token.to_owned());
    }

    for name in [SESSION_COOKIE, REMEMBER_COOKIE] {
        if let Some(token) = cookie_value(headers, name) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

fn session_cookie(name: &str, token: &str, max_age: Duration) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    ))
    .map_err(|err| AppError::Internal(format!("invalid cookie: {err}")))
}

/// The caller behind the request's session token, if any.
///
/// Unknown and expired tokens resolve to an anonymous caller.
pub struct Caller(pub Option<AuthenticatedUser>);

impl FromRequestParts<SharedState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let tokens = presented_tokens(&parts.headers);
        Ok(Caller(auth_service::current_user(state, &tokens).await?))
    }
}

/// Like [`Caller`] but rejects anonymous requests with 401.
pub struct RequireUser(pub AuthenticatedUser);

impl FromRequestParts<SharedState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        match Caller::from_request_parts(parts, state).await? {
            Caller(Some(user)) => Ok(RequireUser(user)),
            Caller(None) => Err(AppError::Unauthorized("login required".into())),
        }
    }
}

/// Best-effort client address and user agent, recorded with new sessions.
pub struct ClientMeta(pub ClientInfo);

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let ip_address = header(FORWARDED_FOR)
            .and_then(|list| list.split(',').next().map(|ip| ip.trim().to_owned()))
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(ClientMeta(ClientInfo {
            ip_address,
            user_agent: header(USER_AGENT.as_str()),
        }))
    }
}

/// Create an account.
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid sign-up form"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = auth_service::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Log in and receive a session token, also set as cookies.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    ClientMeta(client): ClientMeta,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<SessionResponse>), AppError> {
    let user = auth_service::login(&state, &payload.username, &payload.password)
        .await
        .map_err(|err| match err {
            // Never tell which half of the credentials was wrong.
            ServiceError::NotFound(_) => ServiceError::InvalidCredential,
            other => other,
        })?;
    let session = auth_service::create_session(&state, user.id, client).await?;

    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        session_cookie(SESSION_COOKIE, &session.token, state.config().session_ttl)?,
    );
    if payload.remember_me {
        headers.append(
            SET_COOKIE,
            session_cookie(REMEMBER_COOKIE, &session.token, state.config().remember_me)?,
        );
    }

    Ok((headers, Json(SessionResponse::new(&session, user))))
}

/// Revoke the presented session and clear both cookies.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<(StatusCode, HeaderMap), AppError> {
    for token in presented_tokens(&headers) {
        auth_service::logout(&state, &token).await?;
    }

    let mut cleared = HeaderMap::new();
    for name in [SESSION_COOKIE, REMEMBER_COOKIE] {
        cleared.append(SET_COOKIE, session_cookie(name, "", Duration::ZERO)?);
    }
    Ok((StatusCode::NO_CONTENT, cleared))
}

/// Identity behind the presented session.
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    params(("Authorization" = Option<String>, Header, description = "`Bearer <token>`; the session cookie works too")),
    responses(
        (status = 200, description = "Current user", body = CurrentUserResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn me(RequireUser(caller): RequireUser) -> Json<CurrentUserResponse> {
    Json(caller.into())
}

/// Change the caller's email address.
#[utoipa::path(
    put,
    path = "/auth/me/email",
    tag = "auth",
    params(("Authorization" = Option<String>, Header, description = "`Bearer <token>`; the session cookie works too")),
    request_body = UpdateEmailRequest,
    responses(
        (status = 200, description = "Email updated", body = UserResponse),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn update_email(
    State(state): State<SharedState>,
    RequireUser(caller): RequireUser,
    Json(payload): Json<UpdateEmailRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;
    let user = auth_service::update_email(&state, caller.user_id(), &payload.email).await?;
    Ok(Json(user.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_comes_before_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session_token=def; remember_token=abc"),
        );
        assert_eq!(presented_tokens(&headers), ["abc", "def"]);
    }

    #[test]
    fn remember_cookie_alone_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("remember_token=xyz"));
        assert_eq!(presented_tokens(&headers), ["xyz"]);
    }

    #[test]
    fn empty_or_foreign_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        headers.insert(COOKIE, HeaderValue::from_static("session_token=; other=1"));
        assert!(presented_tokens(&headers).is_empty());
    }
}
