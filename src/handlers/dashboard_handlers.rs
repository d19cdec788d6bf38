use crate::auth::session::{self, SessionUser};
use crate::error::AppError;
use crate::flash::{self, Flash};
use crate::models::User;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    title: &'static str,
    logged_in: bool,
    flashes: Vec<Flash>,
    user: User,
}

/// GET /dashboard - Show user dashboard
pub async fn dashboard_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let user = match session::current_user(&session, &state.auth_service).await? {
        SessionUser::Authenticated(user) => user,
        SessionUser::Anonymous => return Ok(session::login_required(&session).await),
    };

    let template = DashboardTemplate {
        title: "Dashboard",
        logged_in: true,
        flashes: flash::take(&session).await,
        user,
    };

    Ok(template.into_response())
}
