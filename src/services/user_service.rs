use crate::models::user::User;
use crate::repositories::user_repository::{
    NewUser, ProfileChanges, RepositoryError, UserRepository,
};
use crate::services::picture_service::{PictureError, PictureService, PictureUpload};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Username already taken")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("Password hashing failed: {0}")]
    HashingError(String),
    #[error("Picture error: {0}")]
    Picture(#[from] PictureError),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl UserServiceError {
    /// The form field and message to show when the user can fix the problem.
    pub fn field_error(&self) -> Option<(&'static str, String)> {
        match self {
            UserServiceError::UsernameTaken => Some((
                "username",
                "That username is taken. Please choose a different one.".to_string(),
            )),
            UserServiceError::EmailTaken => Some((
                "email",
                "That email is taken. Please choose a different one.".to_string(),
            )),
            UserServiceError::Picture(PictureError::UnsupportedExtension) => Some((
                "picture",
                "File does not have an approved extension: jpg, png, jpeg".to_string(),
            )),
            UserServiceError::Picture(
                PictureError::ImageDecode(_) | PictureError::ImageEncode(_),
            ) => Some((
                "picture",
                "The picture could not be read as an image.".to_string(),
            )),
            UserServiceError::Picture(_) => Some((
                "picture",
                "The picture could not be saved. Please try again.".to_string(),
            )),
            _ => None,
        }
    }
}

fn map_repository_error(err: RepositoryError) -> UserServiceError {
    match err {
        RepositoryError::DuplicateUsername => UserServiceError::UsernameTaken,
        RepositoryError::DuplicateEmail => UserServiceError::EmailTaken,
        RepositoryError::NotFound => UserServiceError::UserNotFound,
        e => UserServiceError::RepositoryError(e),
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub picture: Option<PictureUpload>,
}

pub struct UserService {
    repository: Arc<dyn UserRepository>,
    pictures: Arc<PictureService>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>, pictures: Arc<PictureService>) -> Self {
        Self {
            repository,
            pictures,
        }
    }

    pub async fn register(&self, request: CreateUserRequest) -> Result<User, UserServiceError> {
        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .repository
            .create_user(NewUser {
                full_name: request.full_name,
                username: request.username,
                email: request.email,
                password_hash,
            })
            .await
            .map_err(map_repository_error)?;

        info!(user_id = user.id, username = %user.username, "Registered new user");
        Ok(user)
    }

    /// Applies a profile edit for `user`.
    ///
    /// A new picture is written before the row is updated and the replaced
    /// picture is removed only after the update succeeded, so a failure at any
    /// step leaves the stored record pointing at a file that exists.
    pub async fn update_profile(
        &self,
        user: &User,
        update: ProfileUpdate,
    ) -> Result<User, UserServiceError> {
        self.ensure_available(user.id, &update.username, &update.email)
            .await?;

        let new_picture = match update.picture {
            Some(upload) => Some(self.pictures.store(upload).await?),
            None => None,
        };

        let changes = ProfileChanges {
            full_name: update.full_name,
            username: update.username,
            email: update.email,
            bio: update.bio,
            picture: new_picture
                .clone()
                .unwrap_or_else(|| user.picture.clone()),
        };

        let updated = match self.repository.update_profile(user.id, changes).await {
            Ok(updated) => updated,
            Err(err) => {
                if let Some(filename) = &new_picture {
                    self.pictures.discard(filename).await;
                }
                return Err(map_repository_error(err));
            }
        };

        if new_picture.is_some() {
            // The row already points at the new file; a leftover old file is
            // unreferenced, so it is logged rather than reported.
            if let Err(err) = self.pictures.retire(&user.picture).await {
                error!(user_id = user.id, error = %err, "Failed to remove replaced picture");
            }
        }

        info!(user_id = user.id, "Updated profile");
        Ok(updated)
    }

    async fn ensure_available(
        &self,
        user_id: i64,
        username: &str,
        email: &str,
    ) -> Result<(), UserServiceError> {
        if let Some(existing) = self.repository.find_by_username(username).await? {
            if existing.id != user_id {
                return Err(UserServiceError::UsernameTaken);
            }
        }
        if let Some(existing) = self.repository.find_by_email(email).await? {
            if existing.id != user_id {
                return Err(UserServiceError::EmailTaken);
            }
        }
        Ok(())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_email(email).await?)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn count_users(&self) -> Result<i64, UserServiceError> {
        Ok(self.repository.count_users().await?)
    }

    pub async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<User>, UserServiceError> {
        Ok(self.repository.list_users(limit, offset).await?)
    }

    fn hash_password(&self, password: &str) -> Result<String, UserServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| UserServiceError::HashingError(e.to_string()))
    }
}
