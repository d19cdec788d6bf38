use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CSRF_TOKEN_KEY: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";

const TOKEN_TTL_SECS: i64 = 86400; // 24 hours

/// CSRF Token structure for session storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    pub value: String,
    pub created_at: i64,
}

impl CsrfToken {
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() - self.created_at > TOKEN_TTL_SECS
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

/// First characters of a token, for log lines.
fn prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Generate a new CSRF token and store in session
pub async fn generate_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token = CsrfToken::new();
    let value = token.value.clone();

    session.insert(CSRF_TOKEN_KEY, token).await?;

    debug!("Generated new CSRF token: {}", prefix(&value));
    Ok(value)
}

/// Get or create a CSRF token for the session
pub async fn get_or_create_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await?;

    match token {
        Some(existing_token) if !existing_token.is_expired() => Ok(existing_token.value),
        _ => generate_csrf_token(session).await,
    }
}

async fn stored_token(session: &Session) -> Result<CsrfToken, StatusCode> {
    let stored: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await.map_err(|e| {
        warn!("Failed to get CSRF token from session: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match stored {
        Some(token) if token.is_expired() => {
            warn!("CSRF token expired");
            Err(StatusCode::FORBIDDEN)
        }
        Some(token) => Ok(token),
        None => {
            warn!("No CSRF token in session");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Compares `provided` with the session token and rotates it on success.
async fn check_token(session: &Session, provided: &str) -> Result<(), StatusCode> {
    let stored = stored_token(session).await?;

    if provided != stored.value {
        warn!(
            "CSRF token mismatch: expected {}, got {}",
            prefix(&stored.value),
            prefix(provided)
        );
        return Err(StatusCode::FORBIDDEN);
    }

    // Token is valid - regenerate for next request (replay protection)
    let _ = generate_csrf_token(session).await;
    Ok(())
}

/// Validates `X-CSRF-Token` on state-changing requests that carry it.
///
/// Form posts carry the token in the body instead; their handlers call
/// [`validate_csrf_form_field`].
pub async fn csrf_validation_middleware(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if let Some(token) = provided {
        debug!(
            "Validating CSRF header for {} {}",
            request.method(),
            request.uri().path()
        );
        check_token(&session, &token).await?;
    }

    Ok(next.run(request).await)
}

/// Helper function for handlers to validate CSRF tokens from form fields
pub async fn validate_csrf_form_field(
    session: &Session,
    form_token: &str,
) -> Result<(), StatusCode> {
    check_token(session, form_token).await
}
