//! Account, login and session payloads.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{UserId, UserRole},
    dto::format_system_time,
    services::auth_service::{AccountIdentity, AuthenticatedUser, IssuedSession},
};

/// Sign-up form.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, message = "username must be at least 3 characters"))]
    pub username: String,
    #[validate(email(message = "email address is not valid"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "passwords do not match"))]
    pub password_confirmation: String,
}

impl RegisterRequest {
    /// Trim the identity fields. Passwords are kept verbatim.
    pub fn normalized(self) -> Self {
        Self {
            username: self.username.trim().to_owned(),
            email: self.email.trim().to_owned(),
            ..self
        }
    }
}

/// Credentials submitted to `/auth/login`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Also set a long-lived `remember_token` cookie.
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateEmailRequest {
    #[validate(email(message = "email address is not valid"))]
    pub email: String,
}

/// Public projection of an account. The password hash never leaves the server.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[schema(value_type = String, example = "member")]
    pub role: UserRole,
}

impl From<AccountIdentity> for UserResponse {
    fn from(identity: AccountIdentity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            email: identity.email,
            role: identity.role,
        }
    }
}

/// Returned by a successful login. The token is also set as a cookie.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    /// RFC 3339 absolute expiry.
    pub expires_at: String,
    pub user: UserResponse,
}

impl SessionResponse {
    pub fn new(session: &IssuedSession, user: AccountIdentity) -> Self {
        Self {
            token: session.token.clone(),
            expires_at: format_system_time(session.expires_at),
            user: user.into(),
        }
    }
}

/// Identity behind the presented session token.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
    pub session_expires_at: String,
}

impl From<AuthenticatedUser> for CurrentUserResponse {
    fn from(caller: AuthenticatedUser) -> Self {
        Self {
            session_expires_at: format_system_time(caller.session_expires_at),
            user: caller.identity.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            password_confirmation: confirmation.into(),
        }
    }

    #[test]
    fn accepts_well_formed_sign_up() {
        let form = request("alice", "alice@example.com", "hunter22", "hunter22");
        assert!(form.validate().is_ok());
    }

    #[test]
    fn reports_each_invalid_field() {
        let errors = request("al", "not-an-email", "short", "other")
            .validate()
            .unwrap_err();
        let fields = errors.field_errors();
        for field in ["username", "email", "password", "password_confirmation"] {
            assert!(fields.contains_key(field), "missing error for {field}");
        }
    }

    #[test]
    fn normalization_trims_identity_only() {
        let form = request("  bob ", " bob@example.com ", " pass word ", " pass word ").normalized();
        assert_eq!(form.username, "bob");
        assert_eq!(form.email, "bob@example.com");
        assert_eq!(form.password, " pass word ");
    }
}
