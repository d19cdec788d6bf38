use crate::auth::session;
use crate::error::AppError;
use crate::flash::{self, Flash, Level};
use crate::forms::{FormErrors, LoginForm, RegistrationForm};
use crate::middleware::csrf::{get_or_create_csrf_token, validate_csrf_form_field};
use crate::services::auth_service::AuthServiceError;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::warn;

const INVALID_CSRF: &str = "Invalid security token. Please refresh the page and try again.";
const LOGIN_FAILED: &str = "Login unsuccessful. Please check email and password.";

#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
struct RegisterTemplate {
    title: &'static str,
    logged_in: bool,
    flashes: Vec<Flash>,
    csrf_token: String,
    full_name: String,
    username: String,
    email: String,
    errors: FormErrors,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    title: &'static str,
    logged_in: bool,
    flashes: Vec<Flash>,
    csrf_token: String,
    email: String,
    errors: FormErrors,
}

async fn render_register(
    session: &Session,
    status: StatusCode,
    form: &RegistrationForm,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let template = RegisterTemplate {
        title: "Register",
        logged_in: false,
        flashes: flash::take(session).await,
        csrf_token: get_or_create_csrf_token(session).await?,
        full_name: form.full_name.clone(),
        username: form.username.clone(),
        email: form.email.clone(),
        errors,
    };
    Ok((status, template).into_response())
}

async fn render_login(
    session: &Session,
    status: StatusCode,
    email: &str,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let template = LoginTemplate {
        title: "Login",
        logged_in: false,
        flashes: flash::take(session).await,
        csrf_token: get_or_create_csrf_token(session).await?,
        email: email.to_string(),
        errors,
    };
    Ok((status, template).into_response())
}

pub async fn register_page(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    if session::is_logged_in(&session, &app_state.auth_service).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render_register(
        &session,
        StatusCode::OK,
        &RegistrationForm::default(),
        FormErrors::new(),
    )
    .await
}

pub async fn register_handler(
    State(app_state): State<AppState>,
    session: Session,
    Form(form): Form<RegistrationForm>,
) -> Result<Response, AppError> {
    if session::is_logged_in(&session, &app_state.auth_service).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        flash::push(&session, Level::Danger, INVALID_CSRF).await?;
        return render_register(&session, StatusCode::FORBIDDEN, &form, FormErrors::new()).await;
    }

    let request = match form.validate() {
        Ok(request) => request,
        Err(errors) => return render_register(&session, StatusCode::OK, &form, errors).await,
    };

    match app_state.user_service.register(request).await {
        Ok(_) => {
            flash::push(
                &session,
                Level::Success,
                "Your account has been created! You can now log in.",
            )
            .await?;
            Ok(Redirect::to("/login").into_response())
        }
        Err(err) => match err.field_error() {
            Some((field, message)) => {
                render_register(
                    &session,
                    StatusCode::OK,
                    &form,
                    FormErrors::single(field, message),
                )
                .await
            }
            None => Err(err.into()),
        },
    }
}

pub async fn login_page(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    if session::is_logged_in(&session, &app_state.auth_service).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render_login(&session, StatusCode::OK, "", FormErrors::new()).await
}

pub async fn login_handler(
    State(app_state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if session::is_logged_in(&session, &app_state.auth_service).await? {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        flash::push(&session, Level::Danger, INVALID_CSRF).await?;
        return render_login(&session, StatusCode::FORBIDDEN, &form.email, FormErrors::new())
            .await;
    }

    let request = match form.validate() {
        Ok(request) => request,
        Err(errors) => return render_login(&session, StatusCode::OK, &form.email, errors).await,
    };

    match app_state.auth_service.authenticate(request).await {
        Ok(user) => {
            session::start(&session, &user).await?;
            Ok(Redirect::to("/dashboard").into_response())
        }
        Err(AuthServiceError::InvalidCredentials) => {
            warn!("Failed login attempt");
            flash::push(&session, Level::Danger, LOGIN_FAILED).await?;
            render_login(&session, StatusCode::OK, &form.email, FormErrors::new()).await
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn logout_handler(session: Session) -> impl IntoResponse {
    if let Err(e) = session::end(&session).await {
        warn!("Failed to clear session on logout: {}", e);
    }
    Redirect::to("/home")
}
