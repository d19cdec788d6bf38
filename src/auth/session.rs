//! Explicit session lookup for handlers.
//!
//! Protected handlers call [`current_user`] first and decide themselves what
//! to do with an anonymous visitor; nothing is injected behind their back.

use crate::error::AppError;
use crate::flash::{self, Level};
use crate::models::user::User;
use crate::services::auth_service::{AuthService, AuthServiceError};
use axum::response::{IntoResponse, Redirect, Response};
use tower_sessions::{Expiry, Session};
use tracing::{debug, info, warn};

pub const USER_ID_KEY: &str = "user_id";
pub const EMAIL_KEY: &str = "email";
pub const AUTH_TIMESTAMP_KEY: &str = "auth_timestamp";

#[derive(Debug, Clone)]
pub enum SessionUser {
    Authenticated(User),
    Anonymous,
}

impl SessionUser {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionUser::Authenticated(_))
    }
}

/// Resolves the session's user. A session pointing at a user that no
/// longer exists counts as anonymous, and its login keys are dropped.
pub async fn current_user(
    session: &Session,
    auth_service: &AuthService,
) -> Result<SessionUser, AppError> {
    let Some(user_id) = session.get::<i64>(USER_ID_KEY).await? else {
        return Ok(SessionUser::Anonymous);
    };

    match auth_service.get_user_by_id(user_id).await {
        Ok(user) => Ok(SessionUser::Authenticated(user)),
        Err(AuthServiceError::UserNotFound) => {
            debug!(user_id, "Session refers to a missing user");
            session.remove::<i64>(USER_ID_KEY).await?;
            session.remove::<String>(EMAIL_KEY).await?;
            session.remove::<i64>(AUTH_TIMESTAMP_KEY).await?;
            Ok(SessionUser::Anonymous)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn is_logged_in(
    session: &Session,
    auth_service: &AuthService,
) -> Result<bool, AppError> {
    Ok(current_user(session, auth_service).await?.is_authenticated())
}

/// Logs `user` in on this session, issuing a fresh session id.
pub async fn start(session: &Session, user: &User) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await?;
    session.insert(EMAIL_KEY, &user.email).await?;
    session
        .insert(AUTH_TIMESTAMP_KEY, chrono::Utc::now().timestamp())
        .await?;
    session.set_expiry(Some(Expiry::OnInactivity(
        crate::config::session::REMEMBER_FOR,
    )));

    info!(user_id = user.id, "User logged in");
    Ok(())
}

pub async fn end(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

/// Response for anonymous visitors of a protected page.
pub async fn login_required(session: &Session) -> Response {
    if let Err(e) = flash::push(session, Level::Info, "Please log in to access this page.").await {
        warn!("Failed to store login notice: {}", e);
    }
    Redirect::to("/login").into_response()
}
