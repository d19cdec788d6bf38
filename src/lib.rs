pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod flash;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use config::AppConfig;
use repositories::user_repository::SqliteUserRepository;
use services::{AuthService, PictureService, PictureStore, UserService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub user_service: Arc<UserService>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: sqlx::SqlitePool,
        picture_store: Arc<dyn PictureStore>,
    ) -> Self {
        let user_repository = Arc::new(SqliteUserRepository::new(pool));
        let picture_service = Arc::new(PictureService::new(picture_store));

        Self {
            config: Arc::new(config),
            user_service: Arc::new(UserService::new(
                user_repository.clone(),
                picture_service,
            )),
            auth_service: Arc::new(AuthService::new(user_repository)),
        }
    }
}
