//! Accounts, credentials and the session lifecycle.
//!
//! A session token is handed to the client once and only its SHA-256 digest is
//! stored. Sessions carry an absolute expiry fixed at issuance; expired rows are
//! ignored by [`verify_session`] and purged by the background sweeper.

use std::time::{Duration, SystemTime};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use validator::{Validate, ValidateEmail};

use crate::{
    dao::{
        models::{NewUserEntity, SessionEntity, UserEntity, UserId, UserRole},
        storage::StorageError,
    },
    dto::auth::RegisterRequest,
    error::ServiceError,
    state::SharedState,
};

/// Raw token length in bytes before hex encoding.
const TOKEN_BYTES: usize = 32;
const SALT_BYTES: usize = 16;

/// Public identity of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl From<UserEntity> for AccountIdentity {
    fn from(user: UserEntity) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

/// Best-effort details about the client opening a session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A freshly created session. `token` is the only copy of the raw secret.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: SystemTime,
}

/// Caller resolved from a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub identity: AccountIdentity,
    pub session_expires_at: SystemTime,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> UserId {
        self.identity.id
    }

    pub fn is_admin(&self) -> bool {
        self.identity.role == UserRole::Admin
    }
}

/// Hex-encoded SHA-256 of a session token, as stored.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let mut salt = [0u8; SALT_BYTES];
        rand::rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|err| ServiceError::Internal(format!("password salt: {err}")))?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| ServiceError::Internal(format!("password hashing: {err}")))
    })
    .await
    .map_err(|err| ServiceError::Internal(format!("password hashing task: {err}")))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(error = %err, "stored password hash is malformed");
            false
        }
    })
    .await
    .map_err(|err| ServiceError::Internal(format!("password verification task: {err}")))
}

fn duplicate_identity() -> ServiceError {
    ServiceError::DuplicateIdentity("username or email already registered".into())
}

/// Create an active account. The store makes the first account the administrator.
pub async fn register(
    state: &SharedState,
    request: RegisterRequest,
) -> Result<AccountIdentity, ServiceError> {
    let request = request.normalized();
    request.validate()?;

    let store = state.require_catalog_store().await?;
    if store
        .identity_taken(request.username.clone(), request.email.clone())
        .await?
    {
        return Err(duplicate_identity());
    }

    let password_hash = hash_password(request.password).await?;

    let user = store
        .insert_user(NewUserEntity {
            username: request.username,
            email: request.email,
            password_hash,
        })
        .await
        .map_err(|err| match err {
            StorageError::Conflict(_) => duplicate_identity(),
            other => other.into(),
        })?;

    info!(user_id = user.id, role = ?user.role, "user registered");
    Ok(user.into())
}

/// Check a username/password pair and stamp the last-login time.
///
/// Fails with [`ServiceError::NotFound`] when no active account has that username
/// and with [`ServiceError::InvalidCredential`] when the password does not match.
pub async fn login(
    state: &SharedState,
    username: &str,
    password: &str,
) -> Result<AccountIdentity, ServiceError> {
    let username = username.trim();
    let store = state.require_catalog_store().await?;

    let Some(user) = store
        .find_user_by_username(username.to_owned())
        .await?
        .filter(|user| user.active)
    else {
        warn!(username, "login failed: unknown or inactive account");
        return Err(ServiceError::NotFound("account not found".into()));
    };

    if !verify_password(password.to_owned(), user.password_hash.clone()).await? {
        warn!(username, "login failed: wrong password");
        return Err(ServiceError::InvalidCredential);
    }

    store.record_login(user.id, SystemTime::now()).await?;
    info!(user_id = user.id, "user logged in");
    Ok(user.into())
}

/// Issue a new session for `user_id`, valid for the configured session TTL.
pub async fn create_session(
    state: &SharedState,
    user_id: UserId,
    client: ClientInfo,
) -> Result<IssuedSession, ServiceError> {
    let store = state.require_catalog_store().await?;
    let token = generate_token();
    let now = SystemTime::now();
    let expires_at = now + state.config().session_ttl;

    store
        .insert_session(SessionEntity {
            token_hash: token_digest(&token),
            user_id,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
            created_at: now,
            expires_at,
        })
        .await?;

    debug!(user_id, "session created");
    Ok(IssuedSession { token, expires_at })
}

/// Resolve a session token to its user, or `None` when it is unknown, expired or
/// belongs to an inactive account.
pub async fn verify_session(
    state: &SharedState,
    token: &str,
) -> Result<Option<AuthenticatedUser>, ServiceError> {
    verify_session_at(state, token, SystemTime::now()).await
}

/// [`verify_session`] evaluated at an explicit instant.
pub async fn verify_session_at(
    state: &SharedState,
    token: &str,
    now: SystemTime,
) -> Result<Option<AuthenticatedUser>, ServiceError> {
    if token.is_empty() {
        return Ok(None);
    }
    let store = state.require_catalog_store().await?;

    let Some(session) = store.find_session(token_digest(token)).await? else {
        return Ok(None);
    };
    if session.expires_at <= now {
        debug!(user_id = session.user_id, "session expired");
        return Ok(None);
    }

    let user = store
        .find_user(session.user_id)
        .await?
        .filter(|user| user.active);

    Ok(user.map(|user| AuthenticatedUser {
        identity: user.into(),
        session_expires_at: session.expires_at,
    }))
}

/// Resolve the caller from every token it presented; the first valid one wins.
pub async fn current_user(
    state: &SharedState,
    tokens: &[String],
) -> Result<Option<AuthenticatedUser>, ServiceError> {
    for token in tokens {
        if let Some(user) = verify_session(state, token).await? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// Revoke a session. Unknown tokens are not an error.
pub async fn logout(state: &SharedState, token: &str) -> Result<(), ServiceError> {
    if token.is_empty() {
        return Ok(());
    }
    let store = state.require_catalog_store().await?;
    if store.delete_session(token_digest(token)).await? {
        debug!("session revoked");
    }
    Ok(())
}

/// Whether `user_id` is an active administrator.
pub async fn is_admin(state: &SharedState, user_id: UserId) -> Result<bool, ServiceError> {
    let store = state.require_catalog_store().await?;
    Ok(store
        .find_user(user_id)
        .await?
        .is_some_and(|user| user.is_active_admin()))
}

/// Change the email address of an account.
pub async fn update_email(
    state: &SharedState,
    user_id: UserId,
    email: &str,
) -> Result<AccountIdentity, ServiceError> {
    let email = email.trim().to_owned();
    if !email.validate_email() {
        return Err(ServiceError::ValidationFailure(
            "email address is not valid".into(),
        ));
    }

    let store = state.require_catalog_store().await?;
    if store.email_taken(email.clone(), user_id).await? {
        return Err(ServiceError::DuplicateIdentity(
            "email already registered".into(),
        ));
    }

    let updated = store
        .update_user_email(user_id, email)
        .await
        .map_err(|err| match err {
            StorageError::Conflict(_) => {
                ServiceError::DuplicateIdentity("email already registered".into())
            }
            other => other.into(),
        })?;
    if !updated {
        return Err(ServiceError::NotFound(format!("user `{user_id}` not found")));
    }

    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user `{user_id}` not found")))?;
    info!(user_id, "email updated");
    Ok(user.into())
}

/// Delete an account together with its sessions and votes.
///
/// The last active administrator cannot be deleted.
pub async fn delete_user(state: &SharedState, user_id: UserId) -> Result<(), ServiceError> {
    let store = state.require_catalog_store().await?;
    let deleted = store.delete_user(user_id).await.map_err(|err| match err {
        StorageError::Conflict(_) => {
            ServiceError::Conflict("cannot delete the last administrator".into())
        }
        other => other.into(),
    })?;
    if !deleted {
        return Err(ServiceError::NotFound(format!("user `{user_id}` not found")));
    }
    // Vote counters of the games this user voted on changed.
    state.query_cache().invalidate_all();
    info!(user_id, "user deleted");
    Ok(())
}

/// Remove every session whose expiry has passed.
pub async fn sweep_expired_sessions(state: &SharedState) -> Result<u64, ServiceError> {
    let store = state.require_catalog_store().await?;
    let removed = store.delete_expired_sessions(SystemTime::now()).await?;
    if removed > 0 {
        info!(removed, "expired sessions purged");
    }
    Ok(removed)
}

/// Periodically purge expired sessions. Runs until the task is dropped.
pub async fn run_session_sweeper(state: SharedState) {
    let period = state.config().session_sweep_interval.max(Duration::from_secs(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if state.is_degraded() {
            debug!("session sweep skipped: storage unavailable (degraded mode)");
            continue;
        }
        if let Err(err) = sweep_expired_sessions(&state).await {
            warn!(error = %err, "session sweep failed");
        }
    }
}
