use crate::auth::session;
use crate::error::AppError;
use crate::flash::{self, Flash};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
struct HomeTemplate {
    title: &'static str,
    logged_in: bool,
    flashes: Vec<Flash>,
}

/// GET / and /home
pub async fn home_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let template = HomeTemplate {
        title: "Home",
        logged_in: session::is_logged_in(&session, &state.auth_service).await?,
        flashes: flash::take(&session).await,
    };
    Ok(template.into_response())
}
