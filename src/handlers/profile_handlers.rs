use crate::auth::session::{self, SessionUser};
use crate::error::AppError;
use crate::flash::{self, Flash, Level};
use crate::forms::{FormErrors, ProfileForm};
use crate::middleware::csrf::{get_or_create_csrf_token, validate_csrf_form_field};
use crate::models::User;
use crate::services::picture_service::PictureUpload;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{debug, warn};

#[derive(Template, WebTemplate)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    title: &'static str,
    logged_in: bool,
    flashes: Vec<Flash>,
    csrf_token: String,
    user: User,
    full_name: String,
    username: String,
    email: String,
    bio: String,
    errors: FormErrors,
}

fn prefilled(user: &User) -> ProfileForm {
    ProfileForm {
        full_name: user.full_name.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        bio: user.bio.clone().unwrap_or_default(),
        picture: None,
        csrf_token: String::new(),
    }
}

async fn render_profile(
    session: &Session,
    status: StatusCode,
    user: User,
    form: &ProfileForm,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let template = ProfileTemplate {
        title: "Profile",
        logged_in: true,
        flashes: flash::take(session).await,
        csrf_token: get_or_create_csrf_token(session).await?,
        user,
        full_name: form.full_name.clone(),
        username: form.username.clone(),
        email: form.email.clone(),
        bio: form.bio.clone(),
        errors,
    };
    Ok((status, template).into_response())
}

/// Collects the multipart profile form. A file part without a filename or
/// without content means no new picture.
pub async fn read_profile_form(mut multipart: Multipart) -> Result<ProfileForm, AppError> {
    let mut form = ProfileForm::default();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "picture" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(upload_error)?;
                if filename.is_empty() || bytes.is_empty() {
                    continue;
                }
                debug!(filename = %filename, size = bytes.len(), "Received picture upload");
                form.picture = Some(PictureUpload { filename, bytes });
            }
            "full_name" => form.full_name = field.text().await.map_err(upload_error)?,
            "username" => form.username = field.text().await.map_err(upload_error)?,
            "email" => form.email = field.text().await.map_err(upload_error)?,
            "bio" => form.bio = field.text().await.map_err(upload_error)?,
            "csrf_token" => form.csrf_token = field.text().await.map_err(upload_error)?,
            _ => {}
        }
    }

    Ok(form)
}

fn upload_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge
    } else {
        AppError::Upload(err.body_text())
    }
}

/// GET /profile
pub async fn profile_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let user = match session::current_user(&session, &state.auth_service).await? {
        SessionUser::Authenticated(user) => user,
        SessionUser::Anonymous => return Ok(session::login_required(&session).await),
    };

    let form = prefilled(&user);
    render_profile(&session, StatusCode::OK, user, &form, FormErrors::new()).await
}

/// POST /profile
pub async fn update_profile_handler(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let user = match session::current_user(&session, &state.auth_service).await? {
        SessionUser::Authenticated(user) => user,
        SessionUser::Anonymous => return Ok(session::login_required(&session).await),
    };

    let form = read_profile_form(multipart).await?;

    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        flash::push(
            &session,
            Level::Danger,
            "Invalid security token. Please refresh the page and try again.",
        )
        .await?;
        return render_profile(&session, StatusCode::FORBIDDEN, user, &form, FormErrors::new())
            .await;
    }

    let update = match form.validate() {
        Ok(update) => update,
        Err(errors) => {
            return render_profile(&session, StatusCode::OK, user, &form, errors).await;
        }
    };

    match state.user_service.update_profile(&user, update).await {
        Ok(_) => {
            flash::push(&session, Level::Success, "Your profile has been updated!").await?;
            Ok(Redirect::to("/profile").into_response())
        }
        Err(err) => match err.field_error() {
            Some((field, message)) => {
                warn!(user_id = user.id, error = %err, "Profile update rejected");
                render_profile(
                    &session,
                    StatusCode::OK,
                    user,
                    &form,
                    FormErrors::single(field, message),
                )
                .await
            }
            None => Err(err.into()),
        },
    }
}
