use crate::{
    auth, config::session::SessionLayer, handlers, middleware as app_middleware, AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Assembles every page, the picture directory and the static assets behind
/// the session, CSRF, security header and tracing layers.
pub fn build_router(state: AppState, session_layer: SessionLayer) -> Router {
    let profile_routes = Router::new()
        .route(
            "/profile",
            get(handlers::profile_page).post(handlers::update_profile_handler),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .route("/", get(handlers::home_handler))
        .route("/home", get(handlers::home_handler))
        .route(
            "/register",
            get(auth::handlers::register_page).post(auth::handlers::register_handler),
        )
        .route(
            "/login",
            get(auth::handlers::login_page).post(auth::handlers::login_handler),
        )
        .route("/logout", get(auth::handlers::logout_handler))
        .route("/dashboard", get(handlers::dashboard_handler))
        .merge(profile_routes)
        .nest_service("/pictures", ServeDir::new(&state.config.picture_dir))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(middleware::from_fn(app_middleware::csrf_validation_middleware))
        .layer(session_layer)
        .layer(middleware::from_fn(app_middleware::add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
